//! Raw-socket HTTP server for the ingest endpoint.
//!
//! A `tokio::net::TcpListener` accept loop, one task per connection, manual
//! request-line and header parsing, no web framework dependency. Shutdown
//! is a shared `Arc<AtomicBool>` flag checked between accepts, with the
//! accept call itself wrapped in a bounded `tokio::time::timeout` so the
//! loop notices the flag promptly instead of blocking forever on `accept`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::breaker::CircuitBreaker;
use crate::consumer::LogConsumer;
use crate::entry::ContentType;
use crate::ingest::handle_ingest;
use crate::key_index::KeyIndex;
use crate::kv::KvStore;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared handles every connection task needs. Cheap to clone — everything
/// inside is already an `Arc`.
#[derive(Clone)]
pub struct IngestHandlers {
    pub store: Arc<dyn KvStore>,
    pub index: Arc<KeyIndex>,
    pub consumer: Arc<dyn LogConsumer>,
    pub breaker: Arc<CircuitBreaker>,
}

fn is_ingest_path(path: &str) -> bool {
    matches!(path, "/v1/logs" | "/v1/logs/" | "/v1/logs/export")
}

/// Run the accept loop until `stop` is set. Returns once the listener has
/// stopped accepting new connections; in-flight connection tasks are not
/// awaited here (the caller drains them as part of shutdown).
pub async fn run_server(
    listener: TcpListener,
    handlers: IngestHandlers,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }
        match tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((socket, _addr))) => {
                let handlers = handlers.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, &handlers).await {
                        log::debug!("connection error: {e}");
                    }
                });
            }
            Ok(Err(e)) => {
                log::warn!("accept error: {e}");
            }
            Err(_elapsed) => {
                // No connection within the poll window; loop back to check `stop`.
            }
        }
    }
}

struct ParsedRequest {
    method: String,
    path: String,
    content_length: usize,
    content_type: Option<String>,
}

fn parse_request_head(head: &str) -> Option<ParsedRequest> {
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0usize;
    let mut content_type = None;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "content-type" => content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    Some(ParsedRequest {
        method,
        path,
        content_length,
        content_type,
    })
}

/// A request that never reaches `route`: either the socket died outright
/// (`Io`, connection is dropped) or the client sent something malformed
/// (`BadRequest`, answered with a 400 instead of closing the socket).
enum ReadError {
    Io(io::Error),
    BadRequest(String),
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        ReadError::Io(e)
    }
}

async fn read_request(socket: &mut TcpStream) -> Result<(ParsedRequest, Vec<u8>), ReadError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed").into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_HEADER_BYTES && find_header_end(&buf).is_none() {
            return Err(ReadError::BadRequest("headers too large".to_string()));
        }
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let parsed = parse_request_head(&head)
        .ok_or_else(|| ReadError::BadRequest("malformed request line".to_string()))?;

    if parsed.content_length > MAX_BODY_BYTES {
        return Err(ReadError::BadRequest("body too large".to_string()));
    }

    let body_start = header_end + 4;
    let mut body = buf[body_start..].to_vec();
    while body.len() < parsed.content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(parsed.content_length);

    Ok((parsed, body))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn handle_connection(mut socket: TcpStream, handlers: &IngestHandlers) -> io::Result<()> {
    let response = match read_request(&mut socket).await {
        Ok((request, body)) => route(handlers, &request, &body).await,
        Err(ReadError::BadRequest(message)) => error_response(400, &message),
        Err(ReadError::Io(e)) => return Err(e),
    };

    write_response(&mut socket, response).await
}

struct HttpResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

async fn route(handlers: &IngestHandlers, request: &ParsedRequest, body: &[u8]) -> HttpResponse {
    if !is_ingest_path(&request.path) {
        return error_response(404, "not found");
    }
    if request.method != "POST" {
        return error_response(405, "method not allowed");
    }

    let content_type = match request
        .content_type
        .as_deref()
        .and_then(ContentType::from_header)
    {
        Some(ct) => ct,
        None => {
            return error_response(
                400,
                "unsupported content-type, expected application/x-protobuf or application/json",
            )
        }
    };

    match handle_ingest(
        &handlers.store,
        &handlers.index,
        &handlers.consumer,
        &handlers.breaker,
        content_type,
        body,
    )
    .await
    {
        Ok(outcome) => HttpResponse {
            status: 200,
            content_type: outcome.response_content_type,
            body: outcome.response_body,
        },
        Err(e) => error_response(e.status_code(), &e.to_string()),
    }
}

fn error_response(status: u16, message: &str) -> HttpResponse {
    HttpResponse {
        status,
        content_type: "text/plain",
        body: message.as_bytes().to_vec(),
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

async fn write_response(socket: &mut TcpStream, response: HttpResponse) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        status_text(response.status),
        response.content_type,
        response.body.len(),
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(&response.body).await?;
    socket.shutdown().await?;
    Ok(())
}
