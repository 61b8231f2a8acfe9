// One-shot localhost listener for the authorization code redirect

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use url::Url;

const SUCCESS_HTML: &str = "<html><body><h1>Authentication successful</h1><p>Please return to the console.</p></body></html>";
const ERROR_HTML: &str = "<html><body><h1>Authentication failed</h1><p>You may close this window and retry.</p></body></html>";

/// How long a connection may stay silent before it is dropped
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters delivered to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Listener bound on the loopback interface
///
/// `localhost` may resolve to either address family, so the IPv6 loopback
/// is served on the same port when the host supports it.
#[derive(Debug)]
pub struct CallbackListener {
    listener_v4: TcpListener,
    listener_v6: Option<TcpListener>,
    port: u16,
    path: String,
}

impl CallbackListener {
    /// Bind on 127.0.0.1 (and ::1 when available); port 0 picks a free port
    pub async fn bind(port: u16, path: &str) -> Result<Self> {
        let listener_v4 = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("Failed to bind callback listener on 127.0.0.1:{}", port))?;
        let port = listener_v4
            .local_addr()
            .context("Failed to read callback listener address")?
            .port();

        let listener_v6 = match TcpListener::bind(("::1", port)).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::debug!(port, "IPv6 loopback unavailable for callback: {}", e);
                None
            }
        };

        let path = if path.is_empty() { "/" } else { path };

        tracing::debug!(port, path, ipv6 = listener_v6.is_some(), "OAuth callback listener bound");

        Ok(Self {
            listener_v4,
            listener_v6,
            port,
            path: path.to_string(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI registered with the authorization request
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.port, self.path)
    }

    /// Wait for the browser redirect and answer it
    ///
    /// Requests for other paths (such as favicon lookups) get a 404 and
    /// the listener keeps waiting. Connections are read concurrently, so an
    /// idle preconnect cannot hold up the redirect.
    pub async fn wait_for_callback(
        self,
        expected_state: &str,
        timeout: Duration,
    ) -> Result<CallbackPayload> {
        tokio::time::timeout(timeout, self.accept_loop(expected_state))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Timed out after {}s waiting for the authorization redirect",
                    timeout.as_secs()
                )
            })?
    }

    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        match &self.listener_v6 {
            Some(v6) => {
                tokio::select! {
                    result = self.listener_v4.accept() => result,
                    result = v6.accept() => result,
                }
            }
            None => self.listener_v4.accept().await,
        }
    }

    async fn accept_loop(&self, expected_state: &str) -> Result<CallbackPayload> {
        let mut pending = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.accept() => {
                    let (socket, peer) = accepted.context("OAuth callback accept failed")?;
                    pending.spawn(read_request(socket, peer));
                }
                Some(joined) = pending.join_next() => {
                    let Ok(Some((mut socket, peer, request))) = joined else {
                        continue;
                    };
                    if let Some(result) = self
                        .handle_request(&mut socket, peer, &request, expected_state)
                        .await
                    {
                        return result;
                    }
                }
            }
        }
    }

    /// Answer one request; `None` means keep waiting
    async fn handle_request(
        &self,
        socket: &mut TcpStream,
        peer: SocketAddr,
        request: &str,
        expected_state: &str,
    ) -> Option<Result<CallbackPayload>> {
        let target = match extract_request_target(request) {
            Ok(target) => target,
            Err(e) => {
                tracing::debug!(%peer, "Ignoring malformed callback request: {}", e);
                respond(socket, "HTTP/1.1 400 Bad Request", ERROR_HTML).await;
                return None;
            }
        };

        let payload = match parse_callback_target(target, &self.path) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                respond(socket, "HTTP/1.1 404 Not Found", "").await;
                return None;
            }
            Err(e) => {
                respond(socket, "HTTP/1.1 400 Bad Request", ERROR_HTML).await;
                return Some(Err(e));
            }
        };

        if let Err(e) = validate_state(&payload, expected_state) {
            respond(socket, "HTTP/1.1 400 Bad Request", ERROR_HTML).await;
            return Some(Err(e));
        }

        if payload.error.is_some() {
            respond(socket, "HTTP/1.1 400 Bad Request", ERROR_HTML).await;
        } else {
            respond(socket, "HTTP/1.1 200 OK", SUCCESS_HTML).await;
        }

        Some(Ok(payload))
    }
}

/// Read the request head of one connection; silent or closed peers yield `None`
async fn read_request(
    mut socket: TcpStream,
    peer: SocketAddr,
) -> Option<(TcpStream, SocketAddr, String)> {
    let mut buffer = vec![0u8; 8192];
    let size = match tokio::time::timeout(REQUEST_READ_TIMEOUT, socket.read(&mut buffer)).await {
        Ok(Ok(size)) if size > 0 => size,
        Ok(Ok(_)) => return None,
        Ok(Err(e)) => {
            tracing::debug!(%peer, "OAuth callback read failed: {}", e);
            return None;
        }
        Err(_) => {
            tracing::debug!(%peer, "Dropping idle callback connection");
            return None;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..size]).into_owned();
    Some((socket, peer, request))
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "{status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    // The browser may already be gone; the payload is what matters
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn extract_request_target(request: &str) -> Result<&str> {
    let first = request
        .lines()
        .next()
        .context("OAuth callback request is empty")?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || target.is_empty() {
        anyhow::bail!("OAuth callback must be a GET request");
    }
    Ok(target)
}

/// Parse the request target; `None` when it is not the callback path
pub fn parse_callback_target(target: &str, callback_path: &str) -> Result<Option<CallbackPayload>> {
    let url = Url::parse(&format!("http://localhost{}", target))
        .with_context(|| format!("Invalid OAuth callback target: {}", target))?;

    if url.path() != callback_path {
        return Ok(None);
    }

    let mut payload = CallbackPayload {
        code: None,
        state: None,
        error: None,
        error_description: None,
    };

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => payload.code = Some(value.into_owned()),
            "state" => payload.state = Some(value.into_owned()),
            "error" => payload.error = Some(value.into_owned()),
            "error_description" => payload.error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if payload.code.is_none() && payload.error.is_none() {
        anyhow::bail!("OAuth callback carries neither code nor error");
    }

    Ok(Some(payload))
}

fn validate_state(payload: &CallbackPayload, expected_state: &str) -> Result<()> {
    let state = payload
        .state
        .as_deref()
        .context("OAuth callback is missing state")?;
    if state != expected_state {
        anyhow::bail!("OAuth callback state mismatch");
    }
    Ok(())
}
