#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP target client against a local listener.
//!
//! Covers:
//! - login body, token extraction, and rejected logins
//! - bearer and correlation headers on session calls
//! - resource calls under the API prefix with their query strings
//! - preflight status handling
//! - timeout, transport, and decode failures mapped to `ApiError`

use brrtprobe::client::{ApiError, CallContext, HttpTargetApi, Session, TargetApi};
use brrtprobe::config::TargetConfig;
use brrtprobe::load::LoadLevel;
use brrtprobe::scenario::{plan_for, ScenarioKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One request as seen by the listener.
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    headers: HashMap<String, String>,
    body: String,
}

struct Reply {
    status: u16,
    body: String,
    delay: Duration,
}

impl Reply {
    fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }
}

type Handler = dyn Fn(&Recorded) -> Reply + Send + Sync;

struct MockTarget {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockTarget {
    fn start(handler: impl Fn(&Recorded) -> Reply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let recorded = recorded.clone();
                let handler = handler.clone();
                thread::spawn(move || serve(stream, &recorded, handler.as_ref()));
            }
        });

        Self { addr, requests }
    }

    fn api(&self) -> HttpTargetApi {
        self.api_with(|_| {})
    }

    fn api_with(&self, tweak: impl FnOnce(&mut TargetConfig)) -> HttpTargetApi {
        let mut config = TargetConfig {
            base_url: format!("http://{}", self.addr),
            api_prefix: "/api".to_string(),
            timeout: Duration::from_secs(5),
            username: Some("loadtest".to_string()),
            password: Some("s3cret".to_string()),
            ..TargetConfig::default()
        };
        tweak(&mut config);
        HttpTargetApi::new(&config).unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }
}

fn serve(stream: TcpStream, recorded: &Mutex<Vec<Recorded>>, handler: &Handler) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok();

    let request = Recorded {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let reply = handler(&request);
    recorded.lock().push(request);

    thread::sleep(reply.delay);
    let response = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    );
    let mut stream = stream;
    stream.write_all(response.as_bytes()).ok();
    stream.flush().ok();
}

fn ctx() -> CallContext {
    CallContext {
        vu_id: 7,
        iteration: 3,
        load_level: LoadLevel(50),
    }
}

#[tokio::test]
async fn test_login_sends_credentials_and_reads_token() {
    let target = MockTarget::start(|_| Reply::new(200, r#"{"access_token":"abc"}"#));

    let session = target.api().authenticate(&ctx()).await.unwrap();
    assert_eq!(session.token.as_deref(), Some("abc"));

    let requests = target.requests();
    assert_eq!(requests.len(), 1);
    let login = &requests[0];
    assert_eq!(login.method, "POST");
    assert_eq!(login.target, "/auth/login");
    let body: serde_json::Value = serde_json::from_str(&login.body).unwrap();
    assert_eq!(body["username"], "loadtest");
    assert_eq!(body["password"], "s3cret");
    assert_eq!(login.headers["x-probe-vu"], "7");
    assert!(!login.headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_rejected_login() {
    let target = MockTarget::start(|_| Reply::new(401, r#"{"error":"bad credentials"}"#));

    let err = target.api().authenticate(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 401 }));
}

#[tokio::test]
async fn test_login_with_unparseable_body() {
    let target = MockTarget::start(|_| Reply::new(200, "<html>oops</html>"));

    let err = target.api().authenticate(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_session_check_carries_bearer_and_context() {
    let target = MockTarget::start(|req| match req.target.as_str() {
        "/auth/login" => Reply::new(200, r#"{"data":{"token":"xyz"}}"#),
        _ => Reply::new(200, r#"{"valid":true}"#),
    });
    let api = target.api();

    let session = api.authenticate(&ctx()).await.unwrap();
    let resp = api.verify_session(&ctx(), &session).await.unwrap();
    assert!(resp.is_success());
    assert_eq!(resp.body_bytes, r#"{"valid":true}"#.len());

    let requests = target.requests();
    let check = &requests[1];
    assert_eq!(check.method, "GET");
    assert_eq!(check.target, "/auth/session");
    assert_eq!(check.headers["authorization"], "Bearer xyz");
    assert_eq!(check.headers["x-probe-vu"], "7");
    assert_eq!(check.headers["x-probe-iteration"], "3");
    assert_eq!(check.headers["x-probe-load-level"], "50");
}

#[tokio::test]
async fn test_resource_call_under_prefix() {
    let target = MockTarget::start(|_| Reply::new(200, "[]"));
    let session = Session {
        token: Some("tkn".to_string()),
    };
    let op = &plan_for(ScenarioKind::Core).operations[1];

    let resp = target.api().call(&ctx(), &session, op).await.unwrap();
    assert_eq!(resp.status, 200);

    let requests = target.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/api/documents?page=1&limit=10");
    assert_eq!(requests[0].headers["authorization"], "Bearer tkn");
}

#[tokio::test]
async fn test_server_error_is_a_response_not_an_error() {
    let target = MockTarget::start(|_| Reply::new(503, r#"{"error":"overloaded"}"#));
    let op = &plan_for(ScenarioKind::Core).operations[0];

    let resp = target
        .api()
        .call(&ctx(), &Session::default(), op)
        .await
        .unwrap();
    assert_eq!(resp.status, 503);
    assert!(!resp.is_success());
}

#[tokio::test]
async fn test_logout_posts() {
    let target = MockTarget::start(|_| Reply::new(204, ""));
    let session = Session {
        token: Some("tkn".to_string()),
    };

    let resp = target.api().logout(&ctx(), &session).await.unwrap();
    assert_eq!(resp.status, 204);

    let requests = target.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/auth/logout");
}

#[tokio::test]
async fn test_preflight_status_handling() {
    let target = MockTarget::start(|req| match req.target.as_str() {
        "/health" => Reply::new(200, r#"{"status":"ok"}"#),
        "/missing" => Reply::new(404, ""),
        _ => Reply::new(503, ""),
    });

    target.api().preflight().await.unwrap();
    target
        .api_with(|c| c.health_path = "/missing".to_string())
        .preflight()
        .await
        .unwrap();
    let err = target
        .api_with(|c| c.health_path = "/down".to_string())
        .preflight()
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 503 }));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let target = MockTarget::start(|_| Reply {
        delay: Duration::from_secs(2),
        ..Reply::new(200, "{}")
    });
    let api = target.api_with(|c| c.timeout = Duration::from_millis(200));

    let err = api
        .verify_session(&ctx(), &Session::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn test_closed_port_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = HttpTargetApi::new(&TargetConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_secs(2),
        ..TargetConfig::default()
    })
    .unwrap();

    let err = api.preflight().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
}
