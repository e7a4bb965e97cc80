//! [`ApiServer`] – hand-rolled HTTP/1.1 server for the control surface.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use aerolink_control::CommandExecutor;
use aerolink_net::Connection;
use aerolink_stream::{FramePipeline, StreamConfig, StreamHealth};
use aerolink_types::AeroError;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Default TCP port of the control API.
pub const DEFAULT_PORT: u16 = 5000;

/// Request head + body size cap. Commands are tiny; anything larger is
/// malformed or hostile.
const MAX_REQUEST_BYTES: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// ApiServer
// ---------------------------------------------------------------------------

/// HTTP server exposing command execution and the MJPEG video feed.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use aerolink_control::CommandExecutor;
/// use aerolink_net::{Connection, EndpointResolver};
/// use aerolink_rpc::StubFactory;
/// use aerolink_server::ApiServer;
///
/// #[tokio::main]
/// async fn main() {
///     let connection = Arc::new(Connection::new(
///         EndpointResolver::default(),
///         StubFactory::new(),
///     ));
///     let executor = Arc::new(CommandExecutor::new(Arc::clone(&connection)));
///     ApiServer::new(connection, executor)
///         .run()
///         .await
///         .expect("api server failed");
/// }
/// ```
pub struct ApiServer {
    connection: Arc<Connection>,
    executor: Arc<CommandExecutor>,
    stream_config: StreamConfig,
    port: u16,
}

impl ApiServer {
    /// Create a server on the [`DEFAULT_PORT`].
    pub fn new(connection: Arc<Connection>, executor: Arc<CommandExecutor>) -> Self {
        Self {
            connection,
            executor,
            stream_config: StreamConfig::default(),
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the video pipeline tuning (builder-style).
    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept connections forever, one task per client.
    ///
    /// # Errors
    ///
    /// Returns [`AeroError::Connection`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), AeroError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AeroError::Connection(format!("bind error on {addr}: {e}")))?;
        info!(port = self.port, "control API listening");

        let ctx = Arc::new(ServerContext {
            connection: self.connection,
            executor: self.executor,
            stream_config: self.stream_config,
            latest_stream: Mutex::new(None),
        });

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, ctx).await {
                            debug!(peer = %peer, error = %e, "client connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared per-connection context
// ---------------------------------------------------------------------------

struct ServerContext {
    connection: Arc<Connection>,
    executor: Arc<CommandExecutor>,
    stream_config: StreamConfig,
    /// Health counters of the most recently started video pipeline, for the
    /// diagnostics endpoint.
    latest_stream: Mutex<Option<Arc<StreamHealth>>>,
}

impl ServerContext {
    async fn health_payload(&self) -> Value {
        let stream = self.latest_stream.lock().unwrap().clone();
        json!({
            "service": "aerolink control api",
            "status": "running",
            "simulator": {
                "connected": self.connection.is_connected(),
                "host": self.connection.host().await,
            },
            "vehicle": {
                "initialized": self.executor.is_initialized(),
            },
            "stream": stream.map(|h| json!({
                "last_frame_bytes": h.last_frame_len(),
                "consecutive_failures": h.consecutive_failures(),
            })),
            "endpoints": {
                "/command": "POST JSON {\"command\": \"...\"} text commands",
                "/video_feed": "live MJPEG stream from the vehicle camera",
            },
        })
    }

    /// Route body for `POST /command`. Returns `(status_code, body)`.
    async fn command_response(&self, body: &[u8]) -> (u16, Value) {
        if !self.connection.is_connected() {
            return (
                503,
                json!({
                    "status": "error",
                    "message": "cannot process command, simulator is not connected",
                }),
            );
        }

        let Ok(payload) = serde_json::from_slice::<Value>(body) else {
            return (
                400,
                json!({"status": "error", "message": "invalid request: body must be JSON"}),
            );
        };
        let Some(command) = payload.get("command").and_then(Value::as_str) else {
            return (
                400,
                json!({"status": "error", "message": "invalid JSON payload: missing 'command' key"}),
            );
        };

        debug!(command, "received text command");
        let result = self.executor.execute(command).await;
        let code = if result.is_success() { 200 } else { 500 };
        let body = serde_json::to_value(&result).unwrap_or_else(|_| {
            json!({"status": "error", "message": "result serialization failed"})
        });
        (code, body)
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
) -> Result<(), AeroError> {
    let request = read_request(&mut stream, peer).await?;
    debug!(peer = %peer, method = %request.method, path = %request.path, "request");

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_json(&mut stream, 200, &ctx.health_payload().await).await,
        ("POST", "/command") => {
            let (code, body) = ctx.command_response(&request.body).await;
            write_json(&mut stream, code, &body).await
        }
        ("GET", "/video_feed") => serve_video(stream, ctx).await,
        _ => {
            write_json(
                &mut stream,
                404,
                &json!({"status": "error", "message": "unknown endpoint"}),
            )
            .await
        }
    }
}

// ---------------------------------------------------------------------------
// MJPEG video feed
// ---------------------------------------------------------------------------

async fn serve_video(mut stream: TcpStream, ctx: Arc<ServerContext>) -> Result<(), AeroError> {
    if !ctx.connection.is_connected() {
        return write_json(
            &mut stream,
            503,
            &json!({"status": "error", "message": "simulator not connected"}),
        )
        .await;
    }

    let head = "HTTP/1.1 200 OK\r\n\
         Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
         Connection: close\r\n\
         \r\n";
    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|e| AeroError::Connection(format!("video header write error: {e}")))?;

    let pipeline = FramePipeline::with_config(
        Arc::clone(&ctx.connection),
        ctx.stream_config.clone(),
    );
    *ctx.latest_stream.lock().unwrap() = Some(pipeline.health());
    let (mut rx, _producer) = pipeline.spawn();

    // Each frame is a self-contained JPEG part. The loop ends when the
    // breaker closes the channel or the viewer disconnects; dropping the
    // receiver releases the producer either way.
    while let Some(frame) = rx.recv().await {
        if stream.write_all(&multipart_chunk(&frame)).await.is_err() {
            debug!("video viewer disconnected");
            break;
        }
    }
    Ok(())
}

/// Wrap one JPEG frame in the `multipart/x-mixed-replace` framing.
fn multipart_chunk(frame: &[u8]) -> Vec<u8> {
    let mut chunk =
        Vec::with_capacity(frame.len() + 64);
    chunk.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.extend_from_slice(frame);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

// ---------------------------------------------------------------------------
// Minimal HTTP/1.1 parsing
// ---------------------------------------------------------------------------

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

async fn read_request(stream: &mut TcpStream, peer: SocketAddr) -> Result<Request, AeroError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    // Read until the blank line separating head from body.
    let head_end = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| AeroError::Connection(format!("read error from {peer}: {e}")))?;
        if n == 0 {
            return Err(AeroError::Connection(format!("{peer} closed mid-request")));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(AeroError::Connection(format!("{peer} request head too large")));
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let (method, path, content_length) = parse_head(&head)
        .ok_or_else(|| AeroError::Connection(format!("malformed request from {peer}")))?;
    if content_length > MAX_REQUEST_BYTES {
        return Err(AeroError::Connection(format!("{peer} request body too large")));
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| AeroError::Connection(format!("read error from {peer}: {e}")))?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Request { method, path, body })
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse the request line and `Content-Length`. Returns
/// `(method, path, content_length)`.
fn parse_head(head: &str) -> Option<(String, String, usize)> {
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    Some((method, path, content_length))
}

async fn write_json(stream: &mut TcpStream, code: u16, body: &Value) -> Result<(), AeroError> {
    let payload = body.to_string();
    let response = format!(
        "HTTP/1.1 {code} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {payload}",
        status_text(code),
        payload.len(),
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| AeroError::Connection(format!("response write error: {e}")))
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
