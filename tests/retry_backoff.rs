use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use nexray_http::{
    transport::{HttpResponse, PreparedRequest, Transport, TransportError, TransportErrorKind},
    ClientConfig, FormFields, FormValue, NexRayClient, Reply, NETWORK_MESSAGE, TIMEOUT_MESSAGE,
};
use serde_json::json;
use tokio::time::Instant;

type Scripted = Result<HttpResponse, TransportError>;

/// Replays scripted outcomes and records when each attempt was made.
#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    attempts: Arc<Mutex<Vec<(Instant, PreparedRequest)>>>,
}

impl ScriptedTransport {
    fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            attempts: Arc::default(),
        }
    }

    fn attempts(&self) -> Vec<(Instant, PreparedRequest)> {
        self.attempts
            .lock()
            .expect("attempt log mutex must not be poisoned")
            .clone()
    }

    fn gaps(&self) -> Vec<Duration> {
        self.attempts()
            .windows(2)
            .map(|pair| pair[1].0 - pair[0].0)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<HttpResponse, TransportError> {
        self.attempts
            .lock()
            .expect("attempt log mutex must not be poisoned")
            .push((Instant::now(), request));
        self.script
            .lock()
            .expect("script mutex must not be poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(refused()))
    }
}

/// Paused time advances in whole-millisecond timer ticks.
fn assert_gaps(actual: Vec<Duration>, expected_ms: &[u64]) {
    assert_eq!(actual.len(), expected_ms.len(), "gaps: {actual:?}");
    for (gap, expected) in actual.iter().zip(expected_ms) {
        let expected = Duration::from_millis(*expected);
        assert!(
            *gap >= expected && *gap < expected + Duration::from_millis(1),
            "expected {expected:?}, got {gap:?}"
        );
    }
}

fn refused() -> TransportError {
    TransportError::new(TransportErrorKind::Connect, "connection refused")
}

fn json_response(status: u16, body: serde_json::Value) -> Scripted {
    Ok(HttpResponse::new(status, body.to_string().into_bytes()))
}

fn config(max_retries: u32, retry_delay_ms: u64) -> ClientConfig {
    let mut config = ClientConfig::new("https://api.example.test");
    config.max_retries = max_retries;
    config.retry_delay = Duration::from_millis(retry_delay_ms);
    config.retry_status_codes = [429, 503].into_iter().collect();
    config.author = "tester".to_owned();
    config
}

#[tokio::test(start_paused = true)]
async fn failing_call_is_attempted_n_plus_one_times_with_doubling_delays() {
    let transport = ScriptedTransport::default();
    let client = NexRayClient::with_transport(config(3, 100), transport.clone());

    let reply = client.get("anything", (), ()).await;

    assert_eq!(transport.attempts().len(), 4);
    assert_gaps(transport.gaps(), &[100, 200, 400]);
    assert_eq!(
        reply.into_json(),
        json!({"status": false, "author": "tester", "error": NETWORK_MESSAGE})
    );
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_a_single_attempt() {
    let transport = ScriptedTransport::new([json_response(503, json!({"busy": true}))]);
    let client = NexRayClient::with_transport(config(0, 100), transport.clone());

    let reply = client.get("anything", (), ()).await;

    assert_eq!(transport.attempts().len(), 1);
    assert_eq!(reply.into_json(), json!({"busy": true}));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retry_status_returns_last_body() {
    let transport = ScriptedTransport::new(
        (0..3).map(|n| json_response(503, json!({"attempt": n}))),
    );
    let client = NexRayClient::with_transport(config(2, 50), transport.clone());

    let reply = client.post("jobs", &json!({"id": 1}), ()).await;

    assert_eq!(transport.attempts().len(), 3);
    assert_gaps(transport.gaps(), &[50, 100]);
    assert_eq!(reply.status(), Some(503));
    assert_eq!(reply.into_json(), json!({"attempt": 2}));
}

#[tokio::test(start_paused = true)]
async fn status_outside_retry_set_stops_the_loop() {
    let transport = ScriptedTransport::new([
        json_response(429, json!({"error": "slow down"})),
        json_response(404, json!({"error": "gone"})),
        json_response(200, json!({"never": "reached"})),
    ]);
    let client = NexRayClient::with_transport(config(5, 10), transport.clone());

    let reply = client.get("thing", (), ()).await;

    assert_eq!(transport.attempts().len(), 2);
    assert_eq!(reply.into_json(), json!({"error": "gone"}));
}

#[tokio::test(start_paused = true)]
async fn timeout_is_reported_distinctly() {
    let transport = ScriptedTransport::new([Err(TransportError::new(
        TransportErrorKind::Timeout,
        "operation timed out",
    ))]);
    let client = NexRayClient::with_transport(config(0, 10), transport);

    let reply = client.get("slow", (), ()).await;

    assert_eq!(
        reply.into_json(),
        json!({"status": false, "author": "tester", "error": TIMEOUT_MESSAGE})
    );
}

#[tokio::test(start_paused = true)]
async fn header_change_during_backoff_reaches_the_next_attempt() {
    let transport = ScriptedTransport::new([
        json_response(503, json!({"busy": true})),
        json_response(200, json!({"ok": true})),
    ]);
    let client = NexRayClient::with_transport(config(1, 100), transport.clone());

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move { client.get("me", (), ()).await })
    };

    // The call is now backing off for 100ms.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.attempts().len(), 1);
    client.set_auth_token("abc");

    let reply = in_flight.await.expect("call task must not panic");

    assert_eq!(reply.into_json(), json!({"ok": true}));
    let attempts = transport.attempts();
    assert_eq!(attempts[0].1.header("Authorization"), None);
    assert_eq!(attempts[1].1.header("Authorization"), Some("Bearer abc"));
}

#[tokio::test(start_paused = true)]
async fn malformed_form_is_rejected_without_any_attempt() {
    let transport = ScriptedTransport::new([json_response(200, json!({"ok": true}))]);
    let client = NexRayClient::with_transport(config(3, 100), transport.clone());
    let fields = FormFields::new()
        .field("prompt", "a cat")
        .field("image", FormValue::file("cat.png", vec![1, 2, 3]).with_mime("not a mime"));

    let started = Instant::now();
    let reply = client.post_form("upload", fields, ()).await;

    assert!(transport.attempts().is_empty());
    assert_eq!(Instant::now(), started);
    match reply {
        Reply::Failure(failure) => {
            assert_eq!(failure.author, "tester");
            assert!(failure.error.contains("invalid request"), "{}", failure.error);
            assert_ne!(failure.error, NETWORK_MESSAGE);
        }
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_keep_independent_attempt_counts() {
    let transport = ScriptedTransport::new([
        json_response(503, json!({"call": "a", "n": 0})),
        json_response(200, json!({"call": "b"})),
        json_response(200, json!({"call": "a", "n": 1})),
    ]);
    let client = NexRayClient::with_transport(config(1, 100), transport.clone());

    let (first, second) = tokio::join!(client.get("a", (), ()), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.get("b", (), ()).await
    });

    assert_eq!(first.into_json(), json!({"call": "a", "n": 1}));
    assert_eq!(second.into_json(), json!({"call": "b"}));
    assert_eq!(transport.attempts().len(), 3);
}
