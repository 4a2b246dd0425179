use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use smart_fetch::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Backoff, CancellationToken, ClientOptions, ErrorKind, FetchClient, FetchError, RawResponse,
    RequestOptions, ResponseData, StatusCode, Transport, TransportError, TransportRequest,
};

#[derive(Debug, thiserror::Error)]
#[error("dns lookup failed for {0}")]
struct DnsFailure(String);

enum Step {
    Respond(StatusCode, serde_json::Value),
    Fail(TransportError),
    /// Never settles; resolves only once its token is cancelled.
    Hang,
}

/// Plays back a fixed script; repeats the last step when the script runs out.
struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: fn() -> Step,
    calls: AtomicUsize,
    tokens: Mutex<Vec<CancellationToken>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>, fallback: fn() -> Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            fallback,
            calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .expect("token log mutex must not be poisoned")
            .push(cancel.clone());
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .push(request);

        let step = self
            .script
            .lock()
            .expect("script mutex must not be poisoned")
            .pop_front()
            .unwrap_or_else(self.fallback);

        match step {
            Step::Respond(status, body) => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(RawResponse::new(status, headers, body.to_string()))
            }
            Step::Fail(err) => Err(err),
            Step::Hang => {
                cancel.cancelled().await;
                Err(TransportError::aborted("aborted by token"))
            }
        }
    }
}

fn server_error() -> Step {
    Step::Respond(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}))
}

fn hang() -> Step {
    Step::Hang
}

fn client(transport: &Arc<ScriptedTransport>, retries: usize) -> FetchClient {
    FetchClient::new()
        .with_base_url("https://api.example.com")
        .with_transport(Arc::clone(transport))
        .with_options(ClientOptions {
            timeout: Duration::from_millis(100),
            retries,
            backoff: Backoff::none(),
        })
}

#[tokio::test(start_paused = true)]
async fn always_failing_server_is_called_retries_plus_one_times() {
    for retries in 0..=3 {
        let transport = ScriptedTransport::new(Vec::new(), server_error);
        let err = client(&transport, retries)
            .get("/boom", RequestOptions::new())
            .await
            .expect_err("500 must fail");

        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.kind(), ErrorKind::HttpServer);
        assert_eq!(err.attempts(), Some(retries + 1));
        assert_eq!(transport.calls(), retries + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limit_then_success_returns_second_body() {
    let transport = ScriptedTransport::new(
        vec![
            Step::Respond(StatusCode::TOO_MANY_REQUESTS, json!({"slow": "down"})),
            Step::Respond(StatusCode::OK, json!({"attempt": 2})),
        ],
        server_error,
    );

    let response = client(&transport, 1)
        .get("/limited", RequestOptions::new())
        .await
        .expect("second attempt must succeed");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data, ResponseData::Json(json!({"attempt": 2})));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn bad_request_is_terminal_with_budget_left() {
    let transport = ScriptedTransport::new(
        vec![Step::Respond(StatusCode::BAD_REQUEST, json!({"field": "name"}))],
        server_error,
    );

    let err = client(&transport, 3)
        .post("/users", json!({}), RequestOptions::new())
        .await
        .expect_err("400 must fail");

    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.kind(), ErrorKind::HttpClient);
    assert_eq!(
        err.response().map(|raw| raw.status),
        Some(StatusCode::BAD_REQUEST)
    );
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_transport_times_out_and_is_cancelled() {
    let transport = ScriptedTransport::new(Vec::new(), hang);

    let err = client(&transport, 0)
        .get("/hang", RequestOptions::new())
        .await
        .expect_err("hanging call must time out");

    assert!(err.is_timeout());
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(transport.calls(), 1);
    let tokens = transport.tokens.lock().expect("token log mutex must not be poisoned");
    assert!(tokens[0].is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn timeout_is_retried_with_a_fresh_token() {
    let transport = ScriptedTransport::new(
        vec![Step::Hang, Step::Respond(StatusCode::OK, json!({"ok": true}))],
        server_error,
    );

    let response = client(&transport, 1)
        .get("/eventually", RequestOptions::new())
        .await
        .expect("retry after timeout must succeed");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(transport.calls(), 2);
    let tokens = transport.tokens.lock().expect("token log mutex must not be poisoned");
    assert!(tokens[0].is_cancelled());
    assert!(tokens[1].is_cancelled(), "token is released after success too");
}

#[tokio::test(start_paused = true)]
async fn abort_error_is_treated_as_timeout() {
    let transport = ScriptedTransport::new(
        vec![
            Step::Fail(TransportError::aborted("AbortError")),
            Step::Respond(StatusCode::OK, json!({"ok": true})),
        ],
        server_error,
    );

    client(&transport, 1)
        .get("/aborted", RequestOptions::new())
        .await
        .expect("aborted attempt must be retried");
    assert_eq!(transport.calls(), 2);

    let transport = ScriptedTransport::new(
        vec![Step::Fail(TransportError::aborted("AbortError"))],
        server_error,
    );
    let err = client(&transport, 0)
        .get("/aborted", RequestOptions::new())
        .await
        .expect_err("abort without budget must fail");
    assert!(err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn network_error_is_retried_then_returned_unchanged() {
    let transport = ScriptedTransport::new(
        vec![
            Step::Fail(TransportError::network(DnsFailure("api.example.com".to_owned()))),
            Step::Fail(TransportError::network(DnsFailure("api.example.com".to_owned()))),
        ],
        server_error,
    );

    let err = client(&transport, 1)
        .get("/dns", RequestOptions::new())
        .await
        .expect_err("dns failure must surface");

    assert_eq!(transport.calls(), 2);
    assert_eq!(err.kind(), ErrorKind::Network);
    match err {
        FetchError::Transport(inner) => {
            let dns = inner
                .downcast_ref::<DnsFailure>()
                .expect("original error must be preserved");
            assert_eq!(dns.0, "api.example.com");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn invalid_transport_request_is_not_retried() {
    let transport = ScriptedTransport::new(
        vec![Step::Fail(TransportError::invalid("unsupported method"))],
        server_error,
    );

    let err = client(&transport, 3)
        .get("/invalid", RequestOptions::new())
        .await
        .expect_err("invalid request must fail");

    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_without_another_attempt() {
    let transport = ScriptedTransport::new(Vec::new(), server_error);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = client(&transport, 5)
        .get(
            "/slow-retry",
            RequestOptions::new()
                .backoff(Backoff::constant(Duration::from_secs(60)))
                .cancel_with(cancel),
        )
        .await
        .expect_err("cancelled call must fail");

    assert!(err.is_cancelled());
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_attempt_is_not_retried() {
    let transport = ScriptedTransport::new(Vec::new(), hang);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = client(&transport, 3)
        .get(
            "/hang",
            RequestOptions::new()
                .timeout(Duration::from_secs(30))
                .cancel_with(cancel),
        )
        .await
        .expect_err("cancelled call must fail");

    assert!(err.is_cancelled());
    assert_eq!(transport.calls(), 1);
    let tokens = transport.tokens.lock().expect("token log mutex must not be poisoned");
    assert!(tokens[0].is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn already_cancelled_call_makes_no_attempt() {
    let transport = ScriptedTransport::new(Vec::new(), server_error);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client(&transport, 2)
        .get("/never", RequestOptions::new().cancel_with(cancel))
        .await
        .expect_err("cancelled call must fail");

    assert_eq!(err.attempts(), Some(0));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn backoff_receives_one_based_attempt_numbers() {
    let transport = ScriptedTransport::new(Vec::new(), server_error);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let record = Arc::clone(&seen);
    let backoff = Backoff::custom(move |attempt| {
        record
            .lock()
            .expect("attempt log mutex must not be poisoned")
            .push(attempt);
        Duration::from_millis(5)
    });

    client(&transport, 2)
        .get("/boom", RequestOptions::new().backoff(backoff))
        .await
        .expect_err("500 must fail");

    assert_eq!(
        *seen.lock().expect("attempt log mutex must not be poisoned"),
        vec![1, 2]
    );
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn malformed_input_never_reaches_transport() {
    let transport = ScriptedTransport::new(Vec::new(), server_error);

    let err = FetchClient::new()
        .with_base_url("::not a url::")
        .with_transport(Arc::clone(&transport))
        .get("relative", RequestOptions::new())
        .await
        .expect_err("bad base must fail");
    assert_eq!(err.kind(), ErrorKind::MalformedInput);

    let err = client(&transport, 2)
        .get("/x", RequestOptions::new().header("bad header", "v"))
        .await
        .expect_err("bad header must fail");
    assert!(matches!(err, FetchError::InvalidHeader { .. }));

    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn request_carries_built_url_headers_and_body() {
    let transport = ScriptedTransport::new(
        vec![Step::Respond(StatusCode::OK, json!({}))],
        server_error,
    );

    client(&transport, 0)
        .post(
            "/v1/users?source=old",
            json!({"name": "Kit"}),
            RequestOptions::new()
                .query("source", "import")
                .query("dry_run", true)
                .header("X-Request-Id", "abc"),
        )
        .await
        .expect("post must succeed");

    let requests = transport
        .requests
        .lock()
        .expect("request log mutex must not be poisoned");
    let request = &requests[0];
    assert_eq!(
        request.url.as_str(),
        "https://api.example.com/v1/users?source=import&dry_run=true"
    );
    assert_eq!(
        request.headers.get(CONTENT_TYPE),
        Some(&HeaderValue::from_static("application/json"))
    );
    assert_eq!(
        request.headers.get("x-request-id"),
        Some(&HeaderValue::from_static("abc"))
    );
    let body = request.body.as_ref().expect("body must be present");
    assert_eq!(body.to_bytes(), br#"{"name":"Kit"}"#.to_vec());
}

#[tokio::test(start_paused = true)]
async fn json_parsing_can_be_disabled() {
    let transport = ScriptedTransport::new(
        vec![Step::Respond(StatusCode::OK, json!({"ok": true}))],
        server_error,
    );

    let response = client(&transport, 0)
        .get("/raw", RequestOptions::new().parse_json(false))
        .await
        .expect("get must succeed");

    assert_eq!(response.data, ResponseData::Text(r#"{"ok":true}"#.to_owned()));
    let typed: serde_json::Value = response.json().expect("text still converts on demand");
    assert_eq!(typed, json!({"ok": true}));
}
