//! TCP query server.
//!
//! Clients send request lines such as `GET ?dev=10.0.0.7&time=days` and get
//! one framed response per request. Each connection runs in its own task;
//! queries run on the blocking pool because aggregation reads whole log
//! files.
//!
//! Requests are `\n`-terminated lines and may span several socket reads. A
//! client that never sends the newline is answered once its request has sat
//! idle for `server.request_idle_ms`, when it closes its write side, or when
//! the request reaches `server.read_buffer` bytes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use snse_store::LogStore;

use crate::response::{POST_REPLY, Response, UNSUPPORTED_METHOD_REPLY};
use crate::router::{Query, execute, route};
use crate::state::AppState;

/// Query server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A bound query server.
pub struct QueryServer {
    state: Arc<AppState>,
    listener: TcpListener,
}

impl QueryServer {
    /// Bind to the address in `server.bind`.
    pub async fn bind(state: Arc<AppState>) -> Result<Self, ServerError> {
        let address = state.config.server.bind.clone();
        Self::bind_to(&address, state).await
    }

    /// Bind to `address`, ignoring the configured bind address.
    pub async fn bind_to(address: &str, state: Arc<AppState>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Bind {
                address: address.to_string(),
                source: e,
            })?;
        Ok(Self { state, listener })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        info!(
            address = %self.local_addr()?,
            root = %self.state.store.root().display(),
            "Query server listening"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            self.state.stats.connection_opened();
                            let state = Arc::clone(&self.state);
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(state, stream, peer, cancel).await {
                                    debug!(peer = %peer, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "Accept error"),
                    }
                }
            }
        }

        let stats = self.state.stats.snapshot();
        info!(
            connections = stats.connections,
            requests = stats.requests,
            ok = stats.ok,
            not_found = stats.not_found,
            bad_request = stats.bad_request,
            "Query server stopped"
        );
        Ok(())
    }
}

/// Serve one client until it disconnects or the server shuts down.
async fn handle_connection(
    state: Arc<AppState>,
    mut stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
) -> io::Result<()> {
    debug!(peer = %peer, "Client connected");
    let idle = Duration::from_millis(state.config.server.request_idle_ms);
    let mut framer = RequestFramer::new(state.config.server.read_buffer);

    loop {
        while let Some(request) = framer.next_request() {
            respond(&state, &mut stream, request).await?;
        }

        let pending = framer.has_pending();
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(idle), if pending => None,
            read = stream.read_buf(framer.read_buf()) => Some(read?),
        };

        match read {
            Some(0) => {
                if let Some(request) = framer.take_pending() {
                    respond(&state, &mut stream, request).await?;
                }
                break;
            }
            Some(_) => {}
            None => {
                debug!(peer = %peer, "Answering unterminated request");
                if let Some(request) = framer.take_pending() {
                    respond(&state, &mut stream, request).await?;
                }
            }
        }
    }

    debug!(peer = %peer, "Client disconnected");
    Ok(())
}

async fn respond(
    state: &Arc<AppState>,
    stream: &mut TcpStream,
    request: String,
) -> io::Result<()> {
    let response = dispatch(Arc::clone(state), request).await;
    state.stats.record(&response);
    stream.write_all(response.encode().as_bytes()).await
}

/// Splits a connection's byte stream into request lines.
///
/// Bytes after the last `\n` stay buffered until more input completes the
/// line. A buffered line that reaches `limit` bytes is released as-is.
pub struct RequestFramer {
    buf: BytesMut,
    limit: usize,
}

impl RequestFramer {
    /// Create a framer releasing unterminated input at `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit),
            limit,
        }
    }

    /// Buffer for the next socket read.
    pub fn read_buf(&mut self) -> &mut BytesMut {
        self.buf.reserve(self.limit);
        &mut self.buf
    }

    /// Append received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Whether part of a request is buffered.
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Pop the next complete request, skipping blank lines.
    pub fn next_request(&mut self) -> Option<String> {
        loop {
            let end = match self.buf.iter().position(|&b| b == b'\n') {
                Some(pos) => pos + 1,
                None if self.buf.len() >= self.limit => self.buf.len(),
                None => return None,
            };
            let line = self.buf.split_to(end);
            if let Some(request) = to_request(&line) {
                return Some(request);
            }
        }
    }

    /// Release whatever is buffered as one request.
    pub fn take_pending(&mut self) -> Option<String> {
        let line = self.buf.split();
        to_request(&line)
    }
}

fn to_request(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);
    (!text.is_empty()).then(|| text.to_string())
}

async fn dispatch(state: Arc<AppState>, line: String) -> Response {
    match tokio::task::spawn_blocking(move || handle_request(&state, &line)).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Query task failed");
            Response::not_found()
        }
    }
}

/// Answer one request line.
///
/// The method is the text before the first space. A `GET` carries the query
/// after the space, with an optional leading `?`.
pub fn handle_request(state: &AppState, line: &str) -> Response {
    let (method, rest) = line.split_once(' ').unwrap_or((line, ""));
    match method {
        "GET" => {
            let query = rest.strip_prefix('?').unwrap_or(rest);
            answer_query(&state.store, query, state.config.server.frame_missing_dev)
        }
        "POST" => Response::Unframed(POST_REPLY.to_string()),
        _ => {
            debug!(method, "Unsupported method");
            Response::Unframed(UNSUPPORTED_METHOD_REPLY.to_string())
        }
    }
}

/// Parse, route and execute a query string against `store`.
///
/// This performs blocking file I/O.
pub fn answer_query(store: &LogStore, text: &str, frame_missing_dev: bool) -> Response {
    let query = Query::parse(text);
    let request = match route(&query) {
        Ok(request) => request,
        Err(e) => {
            debug!(query = text, error = %e, "Rejected query");
            return Response::from_route_error(&e, frame_missing_dev);
        }
    };
    debug!(?request, "Query");

    match execute(store, &request) {
        Ok(outcome) => Response::from_outcome(&outcome),
        Err(e) => Response::from_store_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::response::{MISSING_DEVICE_REPLY, Status};

    fn state_in(dir: &std::path::Path) -> Arc<AppState> {
        AppState::new(LogStore::new(dir), Config::default())
    }

    fn write_log(dir: &std::path::Path) {
        std::fs::write(
            dir.join("10.0.0.7.txt"),
            "01/06/2025;00:00;10:graph_P;\n01/06/2025;01:00;20:graph_P;\n02/06/2025;00:00;5:graph_P;\n",
        )
        .unwrap();
    }

    #[test]
    fn test_framer_splits_lines() {
        let mut framer = RequestFramer::new(1024);
        framer.extend(b"GET ?a\r\nGET ?b\n\n\r\n");
        assert_eq!(framer.next_request().as_deref(), Some("GET ?a"));
        assert_eq!(framer.next_request().as_deref(), Some("GET ?b"));
        assert_eq!(framer.next_request(), None);
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_framer_joins_split_request() {
        let mut framer = RequestFramer::new(1024);
        framer.extend(b"GET ?dev=d&ti");
        assert_eq!(framer.next_request(), None);
        assert!(framer.has_pending());

        framer.extend(b"me=years\r\nGET ?dev");
        assert_eq!(
            framer.next_request().as_deref(),
            Some("GET ?dev=d&time=years")
        );
        assert_eq!(framer.next_request(), None);
        assert_eq!(framer.take_pending().as_deref(), Some("GET ?dev"));
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_framer_releases_long_unterminated_input() {
        let mut framer = RequestFramer::new(8);
        framer.extend(b"GET ?dev=");
        assert_eq!(framer.next_request().as_deref(), Some("GET ?dev="));
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_framer_take_pending_ignores_blank() {
        let mut framer = RequestFramer::new(64);
        framer.extend(b"\r");
        assert_eq!(framer.take_pending(), None);
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_handle_get_days() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path());
        let state = state_in(dir.path());

        let response = handle_request(&state, "GET ?dev=10.0.0.7&time=days");
        assert_eq!(response.encode(), "200 OK\n01/06/2025\n02/06/2025\r\n");

        // The leading '?' is optional.
        let response = handle_request(&state, "GET dev=10.0.0.7&time=years");
        assert_eq!(response.encode(), "200 OK\n2025\r\n");
    }

    #[test]
    fn test_handle_get_month_total() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path());
        let state = state_in(dir.path());

        let response = handle_request(&state, "GET ?dev=10.0.0.7&time=months&data=06/2025");
        assert_eq!(
            response.encode(),
            "200 OK\n01/06/2025;30.000000:graph_P;\n02/06/2025;5.000000:graph_P;\n\r\n"
        );
    }

    #[test]
    fn test_handle_unknown_device() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let response = handle_request(&state, "GET ?dev=10.0.0.9&time=days");
        assert_eq!(response.status(), Some(Status::NotFound));
    }

    #[test]
    fn test_handle_invalid_device_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let response = handle_request(&state, "GET ?dev=../etc/passwd&time=days");
        assert_eq!(response, Response::not_found());
    }

    #[test]
    fn test_handle_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());

        let missing = handle_request(&state, "GET ?time=days");
        assert_eq!(missing.encode(), MISSING_DEVICE_REPLY);

        let bad_time = handle_request(&state, "GET ?dev=a&time=weeks");
        assert_eq!(bad_time.status(), Some(Status::BadRequest));

        let unknown = handle_request(&state, "GET ?dev=a&time=days&foo=1");
        assert_eq!(unknown.encode(), "400 Invalid request\nUnknown command\r\n");
    }

    #[test]
    fn test_handle_other_methods() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        assert_eq!(handle_request(&state, "POST /x").encode(), POST_REPLY);
        assert_eq!(
            handle_request(&state, "DELETE ?dev=a").encode(),
            UNSUPPORTED_METHOD_REPLY
        );
        assert_eq!(
            handle_request(&state, "garbage").encode(),
            UNSUPPORTED_METHOD_REPLY
        );
    }

    #[test]
    fn test_frame_missing_dev_option() {
        let dir = tempfile::tempdir().unwrap();
        let response = answer_query(&LogStore::new(dir.path()), "time=days", true);
        assert_eq!(response.encode(), "400 Invalid request\ndev key required\r\n");
    }

    #[tokio::test]
    async fn test_bind_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = QueryServer::bind_to("not an address", state_in(dir.path())).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}
