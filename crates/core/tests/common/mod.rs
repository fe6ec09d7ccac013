//! Mock platform and wiring shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hostlink::protocol::{Call, ErrorPayload, Operation, ReturnValue};
use hostlink::{Host, HostEndpoint, HostObject, HostPeer, HostResult, Result, Scope, Session, SessionConfig, connect, host_event};
use hostlink_runtime::PipeTransport;
use parking_lot::Mutex;
use serde_json::{Value, json};

host_event!(pub Play = "play", Instant, ());
host_event!(pub VolumeChange = "volumeChange", Instant, f64);
host_event!(pub MediaError = "error", Stateful, MediaFailure);

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MediaFailure {
	pub message: String,
}

/// Both ways of reaching the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	Sync,
	Async,
}

pub const MODES: [Mode; 2] = [Mode::Sync, Mode::Async];

#[derive(Default)]
struct MediaState {
	volume: f64,
	error: Option<Value>,
	listeners: HashMap<String, String>,
}

#[derive(Default)]
struct PlatformState {
	next_handle: u32,
	media: HashMap<String, MediaState>,
	log: Vec<String>,
}

/// Host owning media elements and a `Screen` namespace.
#[derive(Default)]
pub struct MockPlatform {
	state: Mutex<PlatformState>,
}

impl MockPlatform {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// `target.member` of every call received, in order.
	pub fn log(&self) -> Vec<String> {
		self.state.lock().log.clone()
	}

	pub fn count(&self, call_id: &str) -> usize {
		self.state.lock().log.iter().filter(|id| id.as_str() == call_id).count()
	}

	/// Number of host-side listeners attached to `handle`.
	pub fn listeners(&self, handle: &str) -> usize {
		self.state
			.lock()
			.media
			.get(handle)
			.map_or(0, |media| media.listeners.len())
	}

	pub fn is_alive(&self, handle: &str) -> bool {
		self.state.lock().media.contains_key(handle)
	}

	/// Sets the error condition directly, as the platform would on its own.
	pub fn break_media(&self, handle: &str, message: &str) {
		if let Some(media) = self.state.lock().media.get_mut(handle) {
			media.error = Some(json!({ "message": message }));
		}
	}
}

fn event_of(member: &str, prefix: &str) -> String {
	let rest = &member[prefix.len()..];
	let mut chars = rest.chars();
	match chars.next() {
		Some(first) => first.to_lowercase().chain(chars).collect(),
		None => String::new(),
	}
}

fn callback_of(event: &str) -> String {
	let mut chars = event.chars();
	match chars.next() {
		Some(first) => format!("Invoke{}{}", first.to_uppercase(), chars.as_str()),
		None => "Invoke".to_string(),
	}
}

impl Host for MockPlatform {
	fn handle(&self, call: Call, peer: &HostPeer) -> HostResult {
		let mut fire: Option<(String, String, Vec<Value>)> = None;
		let result = {
			let mut state = self.state.lock();
			state.log.push(call.call_id());

			match (call.op, call.target.clone()) {
				(Operation::Construct, None) if call.member == "Media.new" => {
					state.next_handle += 1;
					let id = format!("media@{}", state.next_handle);
					state.media.insert(
						id.clone(),
						MediaState {
							volume: 1.0,
							..MediaState::default()
						},
					);
					Ok(json!({ "handle": id }).into())
				}
				(Operation::Get, None) if call.member == "Screen.width" => Ok(json!(1920).into()),
				(op, Some(target)) => {
					let media = state
						.media
						.get_mut(&target)
						.ok_or_else(|| ErrorPayload::new(format!("{target} is gone")).with_name("ReferenceError"))?;
					match (op, call.member.as_str()) {
						(Operation::Release, _) => {
							state.media.remove(&target);
							Ok(ReturnValue::Void)
						}
						(Operation::Get, "volume") => Ok(json!(media.volume).into()),
						(Operation::Set, "volume") => {
							media.volume = call.args.first().and_then(Value::as_f64).unwrap_or_default();
							if let Some(proxy) = media.listeners.get("volumeChange") {
								fire = Some((proxy.clone(), callback_of("volumeChange"), vec![json!(media.volume)]));
							}
							Ok(ReturnValue::Void)
						}
						(Operation::Call, "play") => {
							if let Some(proxy) = media.listeners.get("play") {
								fire = Some((proxy.clone(), callback_of("play"), vec![]));
							}
							Ok(ReturnValue::Void)
						}
						(Operation::Call, "fail") => {
							let message = call.args.first().and_then(Value::as_str).unwrap_or("failed");
							let error = json!({ "message": message });
							media.error = Some(error.clone());
							if let Some(proxy) = media.listeners.get("error") {
								fire = Some((proxy.clone(), callback_of("error"), vec![error]));
							}
							Ok(ReturnValue::Void)
						}
						(Operation::Call, member) if member.starts_with("activateOn") => {
							let event = event_of(member, "activateOn");
							let proxy = call.args[0]["proxy"].as_str().unwrap_or_default().to_string();
							media.listeners.insert(event.clone(), proxy);
							match (event.as_str(), &media.error) {
								("error", Some(error)) => Ok(error.clone().into()),
								_ => Ok(ReturnValue::Void),
							}
						}
						(Operation::Call, member) if member.starts_with("deactivateOn") => {
							media.listeners.remove(&event_of(member, "deactivateOn"));
							Ok(ReturnValue::Void)
						}
						_ => Err(ErrorPayload::new(format!("{} is not a function", call.member)).with_name("TypeError")),
					}
				}
				_ => Err(ErrorPayload::new(format!("{} is not defined", call.member)).with_name("ReferenceError")),
			}
		};

		if let Some((proxy, method, args)) = fire {
			peer.invoke_proxy(&proxy, &method, args);
		}
		result
	}
}

/// Opens a session to `platform` in the given mode. Needs a tokio runtime.
pub fn session(mode: Mode, platform: Arc<MockPlatform>) -> Arc<Session> {
	match mode {
		Mode::Sync => connect::in_process(platform, SessionConfig::default()),
		Mode::Async => {
			let (host_read, runtime_write) = tokio::io::duplex(64 * 1024);
			let (runtime_read, host_write) = tokio::io::duplex(64 * 1024);

			let (host_transport, host_rx) = PipeTransport::new(host_write, host_read);
			let endpoint = HostEndpoint::new(platform);
			tokio::spawn(async move { endpoint.serve(host_transport.into_transport_parts(host_rx)).await });

			let (session, _task) = connect::over_pipe(runtime_write, runtime_read, SessionConfig::default());
			session
		}
	}
}

pub async fn new_media(session: &Arc<Session>) -> Result<HostObject> {
	Scope::new(session.dispatcher(), "Media").construct("new", []).await
}

/// Polls until `condition` holds; async background work needs a few turns.
pub async fn settle(mut condition: impl FnMut() -> bool) {
	for _ in 0..400 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("state did not settle");
}

/// Gives detached tasks a chance to run, then returns.
pub async fn quiesce() {
	for _ in 0..10 {
		tokio::time::sleep(Duration::from_millis(2)).await;
	}
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}
