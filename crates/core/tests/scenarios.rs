//! Event channel lifecycle against the mock platform, in both modes.

mod common;

use std::sync::Arc;

use common::{MODES, MediaError, MediaFailure, MockPlatform, Mode, Play, VolumeChange, new_media, quiesce, session, settle};
use hostlink::{ChannelState, EventSpec, HostEvent};
use parking_lot::Mutex;

#[tokio::test]
async fn scenarios_a_b_c_share_one_host_listener() {
	common::init_tracing();
	for mode in MODES {
		let platform = MockPlatform::new();
		let session = session(mode, platform.clone());
		let media = new_media(&session).await.unwrap();
		let activate = format!("{}.activateOnPlay", media.id());
		let deactivate = format!("{}.deactivateOnPlay", media.id());

		// A: two subscribers, one activation.
		let s1 = media.on::<Play, _>(|()| {}).unwrap();
		let s2 = media.on::<Play, _>(|()| {}).unwrap();
		let channel = media.handle().channel(&Play::spec()).unwrap();
		settle(|| channel.state() == ChannelState::Active).await;
		assert_eq!(platform.count(&activate), 1, "{mode:?}");
		assert_eq!(channel.subscriber_count(), 2);

		// B: one leaves, listener stays.
		s1.unsubscribe();
		quiesce().await;
		assert_eq!(platform.count(&deactivate), 0, "{mode:?}");
		assert_eq!(channel.subscriber_count(), 1);
		assert_eq!(channel.state(), ChannelState::Active);

		// C: last one leaves, exactly one deactivation.
		drop(s2);
		settle(|| channel.state() == ChannelState::Inactive).await;
		assert_eq!(platform.count(&deactivate), 1, "{mode:?}");
		assert_eq!(channel.subscriber_count(), 0);
		assert_eq!(platform.listeners(media.id()), 0);
	}
}

#[tokio::test]
async fn scenario_d_existing_error_is_replayed_on_activation() {
	for mode in MODES {
		let platform = MockPlatform::new();
		let session = session(mode, platform.clone());
		let media = new_media(&session).await.unwrap();
		platform.break_media(media.id(), "decode failed");

		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let _sub = media.on::<MediaError, _>(move |failure| sink.lock().push(failure)).unwrap();

		settle(|| !seen.lock().is_empty()).await;
		quiesce().await;
		assert_eq!(
			seen.lock().as_slice(),
			&[MediaFailure {
				message: "decode failed".into()
			}],
			"{mode:?}"
		);
	}
}

#[tokio::test]
async fn late_subscriber_gets_latched_state_once() {
	for mode in MODES {
		let platform = MockPlatform::new();
		let session = session(mode, platform.clone());
		let media = new_media(&session).await.unwrap();

		let first = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&first);
		let _first = media.on::<MediaError, _>(move |f| sink.lock().push(f.message)).unwrap();
		let channel = media.handle().channel(&MediaError::spec()).unwrap();
		settle(|| channel.state() == ChannelState::Active).await;
		assert!(first.lock().is_empty(), "no error yet");

		media.call_void("fail", [serde_json::json!("network")]).await.unwrap();
		settle(|| first.lock().len() == 1).await;

		let late = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&late);
		let _late = media.on::<MediaError, _>(move |f| sink.lock().push(f.message)).unwrap();

		// Replay happens in-line on subscribe: the channel is already active.
		assert_eq!(late.lock().as_slice(), &["network".to_string()], "{mode:?}");
		quiesce().await;
		assert_eq!(first.lock().len(), 1);
		assert_eq!(late.lock().len(), 1);
	}
}

#[tokio::test]
async fn events_carry_decoded_payloads_in_subscription_order() {
	for mode in MODES {
		let platform = MockPlatform::new();
		let session = session(mode, platform.clone());
		let media = new_media(&session).await.unwrap();

		let order = Arc::new(Mutex::new(Vec::new()));
		let mut subs = Vec::new();
		for tag in ["a", "b", "c"] {
			let order = Arc::clone(&order);
			subs.push(media.on::<VolumeChange, _>(move |v| order.lock().push((tag, v))).unwrap());
		}
		let channel = media.handle().channel(&VolumeChange::spec()).unwrap();
		settle(|| channel.state() == ChannelState::Active).await;

		media.set("volume", 0.5).await.unwrap();
		settle(|| order.lock().len() == 3).await;
		assert_eq!(order.lock().as_slice(), &[("a", 0.5), ("b", 0.5), ("c", 0.5)], "{mode:?}");
	}
}

#[tokio::test]
async fn churn_converges_to_one_listener_per_observed_event() {
	for mode in MODES {
		let platform = MockPlatform::new();
		let session = session(mode, platform.clone());
		let media = new_media(&session).await.unwrap();
		let spec = EventSpec::instant("play");

		let mut subs = Vec::new();
		for round in 0..6 {
			subs.push(media.on::<Play, _>(|()| {}).unwrap());
			if round % 2 == 1 {
				subs.clear();
			}
		}
		let channel = media.handle().channel(&spec).unwrap();
		settle(|| channel.state() == ChannelState::Inactive).await;
		assert_eq!(platform.listeners(media.id()), 0, "{mode:?}");

		let _keep = media.on::<Play, _>(|()| {}).unwrap();
		settle(|| channel.state() == ChannelState::Active).await;
		assert_eq!(platform.listeners(media.id()), 1, "{mode:?}");

		let activations = platform.count(&format!("{}.activateOnPlay", media.id()));
		let deactivations = platform.count(&format!("{}.deactivateOnPlay", media.id()));
		assert_eq!(activations, deactivations + 1, "{mode:?}");
	}
}

#[tokio::test]
async fn sync_mode_activates_before_subscribe_returns() {
	let platform = MockPlatform::new();
	let session = session(Mode::Sync, platform.clone());
	let media = new_media(&session).await.unwrap();

	let _sub = media.on::<Play, _>(|()| {}).unwrap();
	assert_eq!(platform.listeners(media.id()), 1);
}
