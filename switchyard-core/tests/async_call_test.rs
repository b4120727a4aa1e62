//! Integration tests for background calls and listener notification.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use switchyard_core::*;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

fn target(host: &str) -> Descriptor {
    Target::parse(&format!("http://{}", host), &ProtocolSet::default())
        .unwrap()
        .into()
}

fn ok_transport() -> impl Transport {
    FnTransport::new(|target: &Target, _: &AttemptConfig, _: &CallRequest| {
        let host = target.url().host_str().unwrap_or_default().to_string();
        async move {
            if host.starts_with("down") {
                Err(TransportError::connection_refused("connection refused"))
            } else {
                Ok(RawResponse::new(200, host))
            }
        }
    })
}

/// Transport that blocks every attempt until released.
struct GatedTransport {
    gate: Arc<Notify>,
}

#[async_trait::async_trait]
impl Transport for GatedTransport {
    async fn perform(
        &self,
        _target: &Target,
        _config: &AttemptConfig,
        _request: &CallRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        self.gate.notified().await;
        Ok(RawResponse::new(200, "released"))
    }
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl CallListener + 'static {
    let log = Arc::clone(log);
    move |event: &CallEvent| -> std::result::Result<(), ListenerError> {
        log.lock().push(format!("{}:{}", name, event.event_name()));
        Ok(())
    }
}

#[tokio::test]
async fn test_listeners_notified_in_registration_order() {
    let caller = AsyncCaller::new(ok_transport()).with_source("orders");
    let log = Arc::new(Mutex::new(Vec::new()));
    caller.add_listener(recorder(&log, "first"));
    caller.add_listener(recorder(&log, "second"));

    let handle = caller.call(target("up.example"), CallConfig::default(), CallRequest::empty()).unwrap();
    let event = assert_ok!(handle.wait().await);

    assert!(event.is_success());
    assert_eq!(event.source(), "orders");
    assert_eq!(event.metadata().call_id, handle.id());
    assert_eq!(handle.state(), CallState::Succeeded);
    assert_eq!(
        *log.lock(),
        vec!["first:call_succeeded".to_string(), "second:call_succeeded".to_string()]
    );
}

#[tokio::test]
async fn test_listener_removed_mid_flight_is_still_notified() {
    let gate = Arc::new(Notify::new());
    let caller = AsyncCaller::new(GatedTransport { gate: Arc::clone(&gate) });
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = caller.add_listener(recorder(&log, "first"));
    caller.add_listener(recorder(&log, "second"));

    let handle = caller.call(target("svc.example"), CallConfig::default(), CallRequest::empty()).unwrap();

    assert!(caller.remove_listener(first));
    caller.add_listener(recorder(&log, "late"));
    gate.notify_one();

    assert_ok!(handle.wait().await);
    assert_eq!(
        *log.lock(),
        vec!["first:call_succeeded".to_string(), "second:call_succeeded".to_string()]
    );
}

#[tokio::test]
async fn test_state_transitions() {
    let gate = Arc::new(Notify::new());
    let caller = AsyncCaller::new(GatedTransport { gate: Arc::clone(&gate) });

    let handle = caller.call(target("svc.example"), CallConfig::default(), CallRequest::empty()).unwrap();
    assert!(!handle.state().is_terminal());

    gate.notify_one();
    assert_ok!(handle.wait().await);
    assert_eq!(handle.state(), CallState::Succeeded);
}

#[tokio::test]
async fn test_failed_call_delivers_chain() {
    let caller = AsyncCaller::new(ok_transport());
    let (listener, mut events) = ChannelListener::new();
    caller.add_listener(listener);

    let descriptor: Descriptor = Group::ordered(vec![target("down-1.example"), target("down-2.example")])
        .unwrap()
        .into();
    let handle = caller.call(descriptor, CallConfig::default(), CallRequest::empty()).unwrap();

    let event = events.recv().await.unwrap();
    assert!(!event.is_success());
    let chain = event.error().unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.target().url().host_str(), Some("down-1.example"));

    assert_ok!(handle.wait().await);
    assert_eq!(handle.state(), CallState::Failed);
    assert!(events.try_recv().is_err(), "exactly one event per call");
}

#[tokio::test]
async fn test_wait_is_idempotent() {
    let caller = AsyncCaller::new(ok_transport());
    let handle = caller.call(target("up.example"), CallConfig::default(), CallRequest::empty()).unwrap();

    let first = assert_ok!(handle.wait().await);
    let second = assert_ok!(handle.wait().await);
    assert!(Arc::ptr_eq(&first, &second));

    let cloned = handle.clone();
    let third = assert_ok!(cloned.wait().await);
    assert!(Arc::ptr_eq(&first, &third));
}

#[tokio::test]
async fn test_failing_listener_does_not_stop_others() {
    let caller = AsyncCaller::new(ok_transport());
    let log = Arc::new(Mutex::new(Vec::new()));
    caller.add_listener(|_: &CallEvent| -> std::result::Result<(), ListenerError> {
        Err(ListenerError::Failed("boom".to_string()))
    });
    caller.add_listener(|_: &CallEvent| -> std::result::Result<(), ListenerError> {
        panic!("listener bug");
    });
    caller.add_listener(recorder(&log, "after"));

    let handle = caller.call(target("up.example"), CallConfig::default(), CallRequest::empty()).unwrap();
    assert_ok!(handle.wait().await);

    assert_eq!(handle.listener_failures(), 2);
    assert_eq!(*log.lock(), vec!["after:call_succeeded".to_string()]);
}

#[tokio::test]
async fn test_explicit_listener_snapshot() {
    let caller = AsyncCaller::new(ok_transport());
    let log = Arc::new(Mutex::new(Vec::new()));
    caller.add_listener(recorder(&log, "registered"));

    let explicit: Arc<dyn CallListener> = Arc::new(recorder(&log, "explicit"));
    let handle = caller.call_with_listeners(
        target("up.example"),
        CallConfig::default(),
        CallRequest::empty(),
        vec![explicit],
    )
    .unwrap();
    assert_ok!(handle.wait().await);

    assert_eq!(*log.lock(), vec!["explicit:call_succeeded".to_string()]);
}

#[tokio::test]
async fn test_call_blocking() {
    let caller = AsyncCaller::new(ok_transport());
    let log = Arc::new(Mutex::new(Vec::new()));
    caller.add_listener(recorder(&log, "ignored"));

    let descriptor: Descriptor = Group::ordered(vec![target("down.example"), target("up.example")])
        .unwrap()
        .into();
    let result = assert_ok!(
        caller
            .call_blocking(descriptor, CallConfig::default(), CallRequest::empty())
            .await
    );
    assert_eq!(result.attempts, 2);

    let err = assert_err!(
        caller
            .call_blocking(target("down.example"), CallConfig::default(), CallRequest::empty())
            .await
    );
    assert!(matches!(err, DispatchError::Call(ref chain) if chain.kind() == FailureKind::ConnectionRefused));

    assert!(log.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_calls_each_notify_once() {
    let caller = Arc::new(AsyncCaller::new(ok_transport()));
    let (listener, mut events) = ChannelListener::new();
    caller.add_listener(listener);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            caller
                .call(
                    target(&format!("node-{}.example", i)),
                    CallConfig::default(),
                    CallRequest::empty(),
                )
                .unwrap()
        })
        .collect();

    for handle in &handles {
        assert_ok!(handle.wait().await);
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.metadata().call_id);
    }
    seen.sort();
    let mut expected: Vec<_> = handles.iter().map(CallHandle::id).collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[test]
fn test_call_from_outside_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let caller = AsyncCaller::new(ok_transport()).with_runtime(runtime.handle().clone());

    let handle = caller.call(target("up.example"), CallConfig::default(), CallRequest::empty()).unwrap();
    let event = runtime.block_on(async {
        tokio::time::timeout(Duration::from_secs(5), handle.wait()).await
    });

    let event = event.unwrap().unwrap();
    assert!(event.is_success());
}

#[test]
fn test_call_without_runtime_is_an_error() {
    let caller = AsyncCaller::new(ok_transport());
    let (listener, mut events) = ChannelListener::new();
    caller.add_listener(listener);

    let err = assert_err!(caller.call(target("up.example"), CallConfig::default(), CallRequest::empty()));
    assert!(matches!(err, DispatchError::NoRuntime(_)));
    assert!(events.try_recv().is_err());
}
