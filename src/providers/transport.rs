use std::error::Error as StdError;
use std::io::ErrorKind;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::InvocationError;

/// Where one provider call goes and how long the client waits for it.
pub(crate) struct Endpoint<'a> {
    pub provider: &'static str,
    pub api_url: &'a str,
    pub bearer: Option<&'a str>,
    pub timeout_secs: u64,
}

/// Single-shot JSON POST. Transport failures, non-success statuses and
/// undecodable bodies all come back as [`InvocationError`].
pub(crate) async fn post_json<B, R>(
    client: &Client,
    endpoint: &Endpoint<'_>,
    body: &B,
) -> Result<R, InvocationError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut request = client.post(endpoint.api_url).json(body);
    if let Some(token) = endpoint.bearer {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|err| {
        warn!(
            provider = endpoint.provider,
            api_url = %endpoint.api_url,
            error = %err,
            "model request failed"
        );
        classify_request_error(&err, endpoint.api_url, endpoint.timeout_secs)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            provider = endpoint.provider,
            api_url = %endpoint.api_url,
            status = %status,
            response_body_len = body.len(),
            "model returned non-success status"
        );
        return Err(InvocationError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let parsed = response
        .json::<R>()
        .await
        .map_err(|err| InvocationError::Parse(err.to_string()))?;
    debug!(provider = endpoint.provider, status = %status, "model response decoded");
    Ok(parsed)
}

fn chain_contains(err: &(dyn StdError + 'static), kind: ErrorKind, phrase: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        let kind_matches = source
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io_err| io_err.kind() == kind);
        if kind_matches || source.to_string().to_ascii_lowercase().contains(phrase) {
            return true;
        }
        current = source.source();
    }
    false
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    chain_contains(err, ErrorKind::TimedOut, "timed out")
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    chain_contains(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn classify_request_error(
    err: &reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> InvocationError {
    let api_url = api_url.to_string();

    if err.is_timeout() || is_timeout(err) {
        InvocationError::Timeout {
            api_url,
            timeout_secs,
        }
    } else if err.is_connect() && is_connection_refused(err) {
        InvocationError::ConnectionRefused { api_url }
    } else if err.is_connect() {
        InvocationError::Connect { api_url }
    } else {
        InvocationError::Request {
            api_url,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use reqwest::Client;
    use serde_json::{Value, json};

    use super::{Endpoint, is_connection_refused, is_timeout, post_json};
    use crate::error::InvocationError;

    fn unused_local_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        listener.local_addr().expect("address should be available")
    }

    /// Answers exactly one request with the given raw HTTP response.
    fn one_shot_server(raw_response: &'static str) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept should succeed");
            stream
                .set_read_timeout(Some(Duration::from_millis(500)))
                .expect("read timeout should apply");
            let mut buf = [0_u8; 8192];
            let read = stream.read(&mut buf).unwrap_or(0);
            stream
                .write_all(raw_response.as_bytes())
                .expect("response should be written");
            String::from_utf8_lossy(&buf[..read]).into_owned()
        });
        (addr, handle)
    }

    fn client(timeout: Duration) -> Client {
        Client::builder()
            .timeout(timeout)
            .build()
            .expect("client should build")
    }

    fn endpoint<'a>(api_url: &'a str, bearer: Option<&'a str>) -> Endpoint<'a> {
        Endpoint {
            provider: "test",
            api_url,
            bearer,
            timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn decodes_json_and_sends_bearer_token() {
        let (addr, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 11\r\nconnection: close\r\n\r\n{\"ok\":true}",
        );
        let api_url = format!("http://{addr}/chat/completions");

        let parsed: Value = post_json(
            &client(Duration::from_secs(2)),
            &endpoint(&api_url, Some("secret")),
            &json!({"q": 1}),
        )
        .await
        .expect("request should succeed");

        assert_eq!(parsed["ok"], true);
        let request = server.join().expect("server thread should join");
        assert!(
            request.to_ascii_lowercase().contains("authorization: bearer secret"),
            "unexpected request: {request}"
        );
    }

    #[tokio::test]
    async fn non_success_status_keeps_the_body() {
        let (addr, server) = one_shot_server(
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 15\r\nconnection: close\r\n\r\ninvalid api key",
        );
        let api_url = format!("http://{addr}/chat/completions");

        let err = post_json::<_, Value>(
            &client(Duration::from_secs(2)),
            &endpoint(&api_url, None),
            &json!({}),
        )
        .await
        .expect_err("401 should fail");

        match err {
            InvocationError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.join().expect("server thread should join");
    }

    #[tokio::test]
    async fn undecodable_body_is_a_parse_error() {
        let (addr, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\ncontent-length: 8\r\nconnection: close\r\n\r\nnot json",
        );
        let api_url = format!("http://{addr}/chat/completions");

        let err = post_json::<_, Value>(
            &client(Duration::from_secs(2)),
            &endpoint(&api_url, None),
            &json!({}),
        )
        .await
        .expect_err("garbage body should fail");

        assert!(matches!(err, InvocationError::Parse(_)), "unexpected error: {err:?}");
        server.join().expect("server thread should join");
    }

    #[tokio::test]
    async fn refused_connection_points_at_the_base_url() {
        let api_url = format!("http://{}/chat/completions", unused_local_addr());

        let err = post_json::<_, Value>(
            &client(Duration::from_millis(300)),
            &endpoint(&api_url, None),
            &json!({}),
        )
        .await
        .expect_err("request should fail with connection-refused");

        assert!(
            matches!(err, InvocationError::ConnectionRefused { .. }),
            "unexpected error: {err:?}"
        );
        assert!(err.to_string().contains("MODEL_BASE_URL"));
    }

    #[tokio::test]
    async fn slow_server_maps_to_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let server = thread::spawn(move || {
            let (_stream, _) = listener.accept().expect("accept should succeed");
            thread::sleep(Duration::from_secs(1));
        });
        let api_url = format!("http://{addr}/chat/completions");

        let err = post_json::<_, Value>(
            &client(Duration::from_millis(100)),
            &endpoint(&api_url, None),
            &json!({}),
        )
        .await
        .expect_err("request should time out");

        let msg = err.to_string();
        assert!(msg.contains("timed out after 2s"), "unexpected message: {msg}");
        assert!(msg.contains("MODEL_TIMEOUT_SECS"), "unexpected message: {msg}");
        server.join().expect("server thread should join");
    }

    #[test]
    fn error_chain_detection_uses_kind_or_message() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline");
        assert!(is_timeout(&timed_out));

        let refused = std::io::Error::other("tcp connect error: Connection refused (os error 111)");
        assert!(is_connection_refused(&refused));
        assert!(!is_timeout(&refused));
    }
}
