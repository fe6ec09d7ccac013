use std::sync::Arc;
use std::time::Duration;

use hostlink_protocol::{Call, ErrorPayload, Operation};
use parking_lot::Mutex;
use serde_json::json;

use super::*;
use crate::host::{HostPeer, HostResult};
use crate::session::Session;
use crate::test_support::{ScriptedHost, async_session, sync_session};

/// Listener attached on the host side by the most recent activation.
#[derive(Default)]
struct Attached(Mutex<Option<(HostPeer, String)>>);

impl Attached {
	fn fire(&self, method: &str, args: Vec<Value>) {
		let attached = self.0.lock().clone();
		let (peer, proxy) = attached.expect("listener attached");
		peer.invoke_proxy(&proxy, method, args);
	}
}

fn listener_host(attached: Arc<Attached>, state: Value) -> Arc<ScriptedHost> {
	ScriptedHost::new(move |call: &Call, peer: &HostPeer| -> HostResult {
		assert_eq!(call.op, Operation::Call);
		if call.member.starts_with("activateOn") {
			let proxy = call.args[0]["proxy"].as_str().unwrap_or_default().to_string();
			*attached.0.lock() = Some((peer.clone(), proxy));
			Ok(state.clone().into())
		} else if call.member.starts_with("deactivateOn") {
			*attached.0.lock() = None;
			Ok(ReturnValue::Void)
		} else {
			Err(ErrorPayload::new("unexpected"))
		}
	})
}

fn recorder() -> (Arc<Mutex<Vec<Vec<Value>>>>, EventCallback) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	(seen, Arc::new(move |args: &[Value]| sink.lock().push(args.to_vec())))
}

fn channel(session: &Arc<Session>, event: EventSpec) -> EventChannel {
	EventChannel::new(session.dispatcher(), "media@1", event)
}

async fn eventually(mut condition: impl FnMut() -> bool) {
	for _ in 0..200 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not reached");
}

#[test]
fn listener_tracks_subscriber_count() {
	let attached = Arc::new(Attached::default());
	let host = listener_host(attached.clone(), Value::Null);
	let session = sync_session(host.clone());
	let channel = channel(&session, EventSpec::instant("click"));

	let (_, first) = recorder();
	let (_, second) = recorder();
	let a = channel.subscribe(first).unwrap();
	let b = channel.subscribe(second).unwrap();

	assert_eq!(channel.state(), ChannelState::Active);
	assert_eq!(host.call_ids(), vec!["media@1.activateOnClick"]);
	let activation = &host.calls()[0];
	assert_eq!(activation.args[0]["proxy"], json!(channel.proxy_id().unwrap()));
	assert_eq!(activation.args[1], json!(true));

	assert!(channel.unsubscribe(a));
	assert_eq!(channel.state(), ChannelState::Active);
	assert!(channel.unsubscribe(b));
	assert!(!channel.unsubscribe(b));

	assert_eq!(channel.state(), ChannelState::Inactive);
	assert_eq!(channel.proxy_id(), None);
	assert_eq!(
		host.call_ids(),
		vec!["media@1.activateOnClick", "media@1.deactivateOnClick"]
	);
	assert!(session.connection().proxies().is_empty());
}

#[test]
fn instant_events_reach_subscribers_in_order() {
	let attached = Arc::new(Attached::default());
	let session = sync_session(listener_host(attached.clone(), Value::Null));
	let channel = channel(&session, EventSpec::instant("click"));

	let order = Arc::new(Mutex::new(Vec::new()));
	for tag in ["first", "second"] {
		let order = Arc::clone(&order);
		channel
			.subscribe(Arc::new(move |args: &[Value]| order.lock().push((tag, args[0].clone()))))
			.unwrap();
	}

	attached.fire("InvokeClick", vec![json!({"x": 3})]);

	assert_eq!(
		order.lock().as_slice(),
		&[("first", json!({"x": 3})), ("second", json!({"x": 3}))]
	);
}

#[test]
fn stateful_activation_replays_current_state_once() {
	let attached = Arc::new(Attached::default());
	let session = sync_session(listener_host(attached.clone(), json!(["ended"])));
	let channel = channel(&session, EventSpec::stateful("ended"));

	let (seen, callback) = recorder();
	channel.subscribe(callback).unwrap();
	assert_eq!(seen.lock().as_slice(), &[vec![json!("ended")]]);

	let (late, callback) = recorder();
	channel.subscribe(callback).unwrap();
	assert_eq!(late.lock().as_slice(), &[vec![json!("ended")]]);
	assert_eq!(seen.lock().len(), 1);
}

#[test]
fn stateful_latch_follows_deliveries() {
	let attached = Arc::new(Attached::default());
	let session = sync_session(listener_host(attached.clone(), Value::Null));
	let channel = channel(&session, EventSpec::stateful("fullscreenChange"));

	let (first, callback) = recorder();
	channel.subscribe(callback).unwrap();
	assert!(first.lock().is_empty());

	attached.fire("InvokeFullscreenChange", vec![json!(true)]);
	let (late, callback) = recorder();
	channel.subscribe(callback).unwrap();

	assert_eq!(first.lock().as_slice(), &[vec![json!(true)]]);
	assert_eq!(late.lock().as_slice(), &[vec![json!(true)]]);
}

#[test]
fn instant_events_are_never_replayed() {
	let attached = Arc::new(Attached::default());
	let session = sync_session(listener_host(attached.clone(), json!("ignored")));
	let channel = channel(&session, EventSpec::instant("click"));

	let (first, callback) = recorder();
	channel.subscribe(callback).unwrap();
	attached.fire("InvokeClick", vec![json!(1)]);

	let (late, callback) = recorder();
	channel.subscribe(callback).unwrap();

	assert_eq!(first.lock().len(), 1);
	assert!(late.lock().is_empty());
}

#[test]
fn failed_activation_is_reported_and_still_converges() {
	let host = ScriptedHost::new(|call, _| {
		if call.member.starts_with("activateOn") {
			Err(ErrorPayload::new("no such event"))
		} else {
			Ok(ReturnValue::Void)
		}
	});
	let session = sync_session(host.clone());
	let mut faults = session.faults();
	let channel = channel(&session, EventSpec::instant("error"));

	let (_, callback) = recorder();
	let id = channel.subscribe(callback).unwrap();
	assert_eq!(channel.state(), ChannelState::Active);

	let fault = faults.try_recv().unwrap();
	assert_eq!(fault.operation, "activateOnError");
	assert_eq!(fault.target, "media@1");

	channel.unsubscribe(id);
	assert_eq!(channel.state(), ChannelState::Inactive);
	assert_eq!(host.call_ids().len(), 2);
}

#[test]
fn unknown_callback_method_is_rejected() {
	let attached = Arc::new(Attached::default());
	let session = sync_session(listener_host(attached.clone(), Value::Null));
	let channel = channel(&session, EventSpec::instant("click"));

	let (seen, callback) = recorder();
	channel.subscribe(callback).unwrap();
	let proxy = channel.proxy_id().unwrap();

	let err = session
		.connection()
		.proxies()
		.deliver(&proxy, "InvokeScroll", vec![])
		.unwrap_err();
	assert!(matches!(err, Error::UnknownCallback { .. }));
	assert!(seen.lock().is_empty());
}

#[test]
fn close_detaches_and_rejects_new_subscribers() {
	let attached = Arc::new(Attached::default());
	let session = sync_session(listener_host(attached.clone(), Value::Null));
	let channel = channel(&session, EventSpec::instant("click"));

	let (_, callback) = recorder();
	channel.subscribe(callback.clone()).unwrap();

	let deactivation = channel.close().expect("listener attached");
	assert_eq!(deactivation.call_id(), "media@1.deactivateOnClick");
	assert_eq!(channel.state(), ChannelState::Inactive);
	assert_eq!(channel.subscriber_count(), 0);
	assert!(channel.close().is_none());
	assert!(channel.subscribe(callback).unwrap_err().is_disconnected());
}

#[test]
fn close_of_inactive_channel_needs_no_deactivation() {
	let session = sync_session(listener_host(Arc::new(Attached::default()), Value::Null));
	let channel = channel(&session, EventSpec::instant("click"));
	assert!(channel.close().is_none());
}

#[tokio::test]
async fn async_subscribe_returns_before_activation_completes() {
	let attached = Arc::new(Attached::default());
	let host = listener_host(attached.clone(), json!([42]));
	let session = async_session(host.clone());
	let channel = channel(&session, EventSpec::stateful("progress"));

	let (seen, callback) = recorder();
	channel.subscribe(callback).unwrap();
	assert_eq!(channel.state(), ChannelState::Activating);

	eventually(|| channel.state() == ChannelState::Active).await;
	assert_eq!(seen.lock().as_slice(), &[vec![json!(42)]]);
	assert_eq!(host.calls()[0].args[1], json!(false));
}

#[tokio::test]
async fn async_unsubscribe_during_activation_converges_to_inactive() {
	let attached = Arc::new(Attached::default());
	let host = listener_host(attached.clone(), Value::Null);
	let session = async_session(host.clone());
	let channel = channel(&session, EventSpec::instant("click"));

	let (_, callback) = recorder();
	let id = channel.subscribe(callback).unwrap();
	assert!(channel.unsubscribe(id));
	assert_eq!(channel.state(), ChannelState::Activating);

	eventually(|| channel.state() == ChannelState::Inactive).await;
	assert_eq!(
		host.call_ids(),
		vec!["media@1.activateOnClick", "media@1.deactivateOnClick"]
	);
	assert!(session.connection().proxies().is_empty());
}

#[tokio::test]
async fn async_resubscribe_during_deactivation_reactivates() {
	let attached = Arc::new(Attached::default());
	let host = listener_host(attached.clone(), Value::Null);
	let session = async_session(host.clone());
	let channel = channel(&session, EventSpec::instant("click"));

	let (_, callback) = recorder();
	let id = channel.subscribe(callback.clone()).unwrap();
	eventually(|| channel.state() == ChannelState::Active).await;

	channel.unsubscribe(id);
	assert_eq!(channel.state(), ChannelState::Deactivating);
	channel.subscribe(callback).unwrap();

	eventually(|| channel.state() == ChannelState::Active && host.calls().len() == 3).await;
	assert_eq!(
		host.call_ids(),
		vec![
			"media@1.activateOnClick",
			"media@1.deactivateOnClick",
			"media@1.activateOnClick"
		]
	);
}

#[tokio::test]
async fn async_events_are_delivered_over_the_wire() {
	let attached = Arc::new(Attached::default());
	let session = async_session(listener_host(attached.clone(), Value::Null));
	let channel = channel(&session, EventSpec::instant("timeUpdate"));

	let (seen, callback) = recorder();
	channel.subscribe(callback).unwrap();
	eventually(|| channel.state() == ChannelState::Active).await;

	attached.fire("InvokeTimeUpdate", vec![json!(1.5), json!("seek")]);
	eventually(|| !seen.lock().is_empty()).await;
	assert_eq!(seen.lock().as_slice(), &[vec![json!(1.5), json!("seek")]]);
}
