//! Authenticated blocking HTTP.
//!
//! [`Transport`] is the seam between the fetcher and the network. The
//! production stack is [`http_transport`]: a certificate-verifying client
//! wrapped in [`RelaxedFallback`], which repeats a request exactly once on a
//! client that accepts invalid certificates when the first attempt fails
//! below HTTP.

use crate::credentials::Credentials;
use crate::TransportError;
use reqwest::blocking::{Client, Response};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::{debug, warn};
use wacollect_metrics::metric_defs;

/// Blocking GET with basic authentication.
pub trait Transport: Send + Sync {
    /// Fetch `url` and return the whole body.
    fn get(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn get(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>, TransportError> {
        (**self).get(url, credentials)
    }
}

/// A reqwest client that follows at most one redirect, re-sending credentials.
pub struct ReqwestTransport {
    client: Client,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Client verifying certificates.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(timeout, false)
    }

    /// Client accepting invalid certificates.
    pub fn relaxed(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(timeout, true)
    }

    fn build(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, TransportError> {
        // Redirects are followed by hand so credentials reach the target host
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn send(&self, url: &str, credentials: &Credentials) -> Result<Response, TransportError> {
        self.client
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .map_err(|e| TransportError::Connection {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>, TransportError> {
        let mut response = self.send(url, credentials)?;

        if response.status().is_redirection() {
            let target = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| TransportError::Redirect {
                    url: url.to_string(),
                    reason: "missing Location header".to_string(),
                })
                .and_then(|location| {
                    response.url().join(location).map_err(|e| TransportError::Redirect {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                })?;
            debug!(from = url, to = %target, "Following redirect");
            response = self.send(target.as_str(), credentials)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().map_err(|e| TransportError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Repeats a request once on `fallback` after a transport-level failure of
/// `primary`. HTTP status errors are returned unchanged.
#[derive(Debug)]
pub struct RelaxedFallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Transport, F: Transport> RelaxedFallback<P, F> {
    /// Combine a primary transport with its one-shot fallback.
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: Transport, F: Transport> Transport for RelaxedFallback<P, F> {
    fn get(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>, TransportError> {
        match self.primary.get(url, credentials) {
            Err(err) if err.is_transport_level() => {
                warn!(
                    url,
                    error = %err,
                    "Request failed, retrying without certificate verification"
                );
                metrics::counter!(metric_defs::TRANSPORT_RELAXED_FALLBACKS.name).increment(1);
                self.fallback.get(url, credentials)
            }
            other => other,
        }
    }
}

/// The production transport: verified client with a relaxed fallback.
pub type HttpTransport = RelaxedFallback<ReqwestTransport, ReqwestTransport>;

/// Build the production transport with a per-request `timeout`.
pub fn http_transport(timeout: Duration) -> Result<HttpTransport, TransportError> {
    Ok(RelaxedFallback::new(
        ReqwestTransport::new(timeout)?,
        ReqwestTransport::relaxed(timeout)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::{self, JoinHandle};

    struct Scripted {
        calls: AtomicUsize,
        result: fn(&str) -> Result<Vec<u8>, TransportError>,
    }

    impl Scripted {
        fn new(result: fn(&str) -> Result<Vec<u8>, TransportError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for Scripted {
        fn get(&self, url: &str, _credentials: &Credentials) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)(url)
        }
    }

    fn tls_failure(url: &str) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Connection {
            url: url.to_string(),
            message: "invalid peer certificate".to_string(),
        })
    }

    fn not_found(url: &str) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Status {
            url: url.to_string(),
            status: 404,
        })
    }

    fn ok(_url: &str) -> Result<Vec<u8>, TransportError> {
        Ok(b"payload".to_vec())
    }

    fn creds() -> Credentials {
        Credentials::new("u", "p")
    }

    #[test]
    fn test_fallback_attempted_once_on_transport_error() {
        let transport = RelaxedFallback::new(Scripted::new(tls_failure), Scripted::new(ok));
        let body = transport.get("https://archive.test/a", &creds()).unwrap();
        assert_eq!(body, b"payload");
        assert_eq!(transport.primary.calls(), 1);
        assert_eq!(transport.fallback.calls(), 1);
    }

    #[test]
    fn test_fallback_failure_is_final() {
        let transport =
            RelaxedFallback::new(Scripted::new(tls_failure), Scripted::new(tls_failure));
        let err = transport.get("https://archive.test/a", &creds()).unwrap_err();
        assert!(err.is_transport_level());
        assert_eq!(transport.primary.calls(), 1);
        assert_eq!(transport.fallback.calls(), 1);
    }

    #[test]
    fn test_status_error_skips_fallback() {
        let transport = RelaxedFallback::new(Scripted::new(not_found), Scripted::new(ok));
        let err = transport.get("https://archive.test/a", &creds()).unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 404, .. }));
        assert_eq!(transport.fallback.calls(), 0);
    }

    #[test]
    fn test_success_skips_fallback() {
        let transport = RelaxedFallback::new(Scripted::new(ok), Scripted::new(ok));
        transport.get("https://archive.test/a", &creds()).unwrap();
        assert_eq!(transport.primary.calls(), 1);
        assert_eq!(transport.fallback.calls(), 0);
    }

    /// Answer one connection per entry of `responses`, in order, and hand
    /// back the request heads that were received.
    fn serve(responses: Vec<&'static str>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                requests.push(String::from_utf8_lossy(&head).into_owned());
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
            requests
        });
        (base, handle)
    }

    const REDIRECT_NEXT: &str = "HTTP/1.1 302 Found\r\nLocation: /next\r\n\
        Content-Length: 0\r\nConnection: close\r\n\r\n";

    const REDIRECT_AGAIN: &str = "HTTP/1.1 302 Found\r\nLocation: /again\r\n\
        Content-Length: 0\r\nConnection: close\r\n\r\n";

    const BODY: &str =
        "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\npayload";

    fn has_basic_auth(request: &str) -> bool {
        request.to_ascii_lowercase().contains("authorization: basic ")
    }

    #[test]
    fn test_redirect_followed_once_with_credentials() {
        let (base, server) = serve(vec![REDIRECT_NEXT, BODY]);
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

        let body = transport.get(&format!("{base}/start"), &creds()).unwrap();
        assert_eq!(body, b"payload");

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("GET /start "));
        assert!(requests[1].starts_with("GET /next "));
        assert!(requests.iter().all(|r| has_basic_auth(r)));
    }

    #[test]
    fn test_second_redirect_is_not_followed() {
        let (base, server) = serve(vec![REDIRECT_NEXT, REDIRECT_AGAIN]);
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport.get(&format!("{base}/start"), &creds()).unwrap_err();
        match err {
            TransportError::Status { url, status } => {
                assert_eq!(status, 302);
                assert!(url.ends_with("/next"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(http_transport(Duration::from_secs(5)).is_ok());
    }
}
