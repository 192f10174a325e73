//! Upstream connection and request forwarding
//!
//! Each forwarded request gets its own connection to the upstream. The
//! response head is read and parsed for logging, then the raw bytes are
//! relayed to the client as they arrive.

use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::proxy::rule::ProxyRule;
use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};

const BUFFER_SIZE: usize = 8192;

/// Upper bound on an upstream status line plus headers.
const MAX_RESPONSE_HEAD: usize = 64 * 1024;

/// Dropped from forwarded requests. `Expect` is included because the
/// gateway has already answered `100 Continue` and sends the body at once.
const HOP_BY_HOP: [&str; 6] = [
    "Connection",
    "Expect",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
    "Upgrade",
];

/// How the relayed body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    Empty,
    Exact(u64),
    /// Until the upstream closes the connection
    UntilClose,
}

/// An upstream response whose head has been read but whose body is still
/// on the wire.
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    body_length: BodyLength,
    /// Head bytes plus whatever body bytes arrived with them
    buffered: BytesMut,
    head_len: usize,
    stream: TcpStream,
}

impl UpstreamResponse {
    /// Writes the response to `client` verbatim. Returns the bytes relayed.
    pub async fn relay<W>(mut self, client: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let already = (self.buffered.len() - self.head_len) as u64;

        let (prefix_len, remaining) = match self.body_length {
            BodyLength::Empty => (self.head_len, Some(0)),
            BodyLength::Exact(n) if already >= n => (self.head_len + n as usize, Some(0)),
            BodyLength::Exact(n) => (self.buffered.len(), Some(n - already)),
            BodyLength::UntilClose => (self.buffered.len(), None),
        };

        client.write_all(&self.buffered[..prefix_len]).await?;
        let mut relayed = prefix_len as u64;

        relayed += match remaining {
            Some(0) => 0,
            Some(n) => {
                let copied = tokio::io::copy(&mut (&mut self.stream).take(n), client).await?;
                if copied < n {
                    anyhow::bail!("Upstream closed before complete body was relayed");
                }
                copied
            }
            None => tokio::io::copy(&mut self.stream, client).await?,
        };

        client.flush().await?;
        Ok(relayed)
    }
}

/// Forwards requests to the upstream named by a matched [`ProxyRule`].
#[derive(Debug, Clone, Default)]
pub struct ProxyHandler {
    /// Connect timeout; `None` waits as long as the OS does
    connect_timeout: Option<Duration>,
}

impl ProxyHandler {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }

    /// Forward `request` to the upstream of `rule`.
    ///
    /// Returns once the upstream's response head has arrived. No retries.
    pub async fn forward(&self, rule: &ProxyRule, request: &Request) -> Result<UpstreamResponse> {
        let outbound = self.prepare(rule, request);
        let addr = rule
            .upstream_addr()
            .context("Upstream URL missing host")?;

        tracing::info!(
            rule = %rule.name,
            upstream = %addr,
            method = request.method.as_str(),
            path = %request.path,
            outbound_path = %outbound.path,
            "Forwarding request"
        );

        let mut stream = match self.connect_timeout {
            Some(limit) => timeout(limit, TcpStream::connect(&addr))
                .await
                .context("Connection timeout")?,
            None => TcpStream::connect(&addr).await,
        }
        .with_context(|| format!("Failed to connect to upstream {}", addr))?;

        tracing::trace!(upstream = %addr, "Connected to upstream");

        stream.write_all(&build_http_request(&outbound)).await?;
        stream.flush().await?;

        let response = read_response_head(stream, &request.method).await?;

        tracing::info!(
            rule = %rule.name,
            status = response.status,
            method = request.method.as_str(),
            path = %request.path,
            "Upstream responded"
        );

        Ok(response)
    }

    /// Build the outbound request for `rule`: rewritten target, upstream
    /// Host, hop-by-hop headers dropped, rule defaults filled in.
    pub fn prepare(&self, rule: &ProxyRule, request: &Request) -> Request {
        let mut outbound = request.clone();
        outbound.path = rule.rewrite_target(&request.path);
        outbound.version = "HTTP/1.1".to_string();

        for name in HOP_BY_HOP {
            outbound.remove_header(name);
        }
        outbound.set_header("Connection", "close");

        if let Some(host) = rule.upstream_host() {
            outbound.set_header("Host", host);
        }

        if !rule.default_headers.is_empty() {
            rule.default_headers.apply(&mut outbound);
        }

        if rule.log_outbound_headers {
            let mut headers: Vec<_> = outbound.headers.iter().collect();
            headers.sort();
            tracing::info!(rule = %rule.name, headers = ?headers, "Headers being sent to upstream");
        }

        outbound
    }

    /// Map a forwarding failure to the response sent to the caller.
    pub fn error_response(&self, error: &anyhow::Error) -> Response {
        if error.downcast_ref::<Elapsed>().is_some() {
            Response::text(
                StatusCode::GatewayTimeout,
                "504 Gateway Timeout\r\n\r\nThe upstream server did not respond in time.",
            )
        } else {
            Response::text(
                StatusCode::BadGateway,
                "502 Bad Gateway\r\n\r\nFailed to reach the upstream server.",
            )
        }
    }
}

/// Serialize an outbound request.
pub fn build_http_request(request: &Request) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(256 + request.body.len());

    let path = if request.path.is_empty() {
        "/"
    } else {
        &request.path
    };

    buffer.extend_from_slice(
        format!("{} {} {}\r\n", request.method.as_str(), path, request.version).as_bytes(),
    );

    for (key, value) in &request.headers {
        buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
    }

    buffer.extend_from_slice(b"\r\n");
    buffer.extend_from_slice(&request.body);

    buffer
}

/// Reads up to the end of the final response head. Interim 1xx heads
/// (other than `101 Switching Protocols`) are dropped.
async fn read_response_head(mut stream: TcpStream, method: &Method) -> Result<UpstreamResponse> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        if let Some(headers_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            let head_len = headers_end + 4;
            let (status, headers) = parse_response_head(&buffer[..head_len])?;

            if (100..200).contains(&status) && status != 101 {
                tracing::debug!(status, "Skipping interim upstream response");
                buffer.advance(head_len);
                continue;
            }

            let body_length = body_length(method, status, &headers)?;

            return Ok(UpstreamResponse {
                status,
                headers,
                body_length,
                buffered: buffer,
                head_len,
                stream,
            });
        }

        if buffer.len() > MAX_RESPONSE_HEAD {
            anyhow::bail!("Response headers too large");
        }

        if stream.read_buf(&mut buffer).await? == 0 {
            anyhow::bail!("Connection closed before complete response received");
        }
    }
}

/// Parse an upstream status line and headers.
pub fn parse_response_head(head: &[u8]) -> Result<(u16, HashMap<String, String>)> {
    let head = std::str::from_utf8(head).context("Invalid UTF-8 in response headers")?;

    let mut lines = head.lines();

    let status_line = lines.next().context("Empty response")?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();

    if parts.len() < 2 || !parts[0].starts_with("HTTP/") {
        anyhow::bail!("Invalid status line: {}", status_line);
    }

    let status: u16 = parts[1].parse().context("Invalid status code")?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok((status, headers))
}

fn body_length(
    method: &Method,
    status: u16,
    headers: &HashMap<String, String>,
) -> Result<BodyLength> {
    if *method == Method::HEAD || (100..200).contains(&status) || status == 204 || status == 304 {
        return Ok(BodyLength::Empty);
    }

    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    // Chunked bodies end when the upstream closes, since it was sent Connection: close
    if lookup("Transfer-Encoding").is_some() {
        return Ok(BodyLength::UntilClose);
    }

    match lookup("Content-Length") {
        Some(len) => {
            let len: u64 = len.trim().parse().context("Invalid upstream Content-Length")?;
            Ok(if len == 0 {
                BodyLength::Empty
            } else {
                BodyLength::Exact(len)
            })
        }
        None => Ok(BodyLength::UntilClose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_requests_have_no_relayed_body() {
        let mut headers = HashMap::new();
        headers.insert("Content-Length".to_string(), "120".to_string());

        assert_eq!(body_length(&Method::HEAD, 200, &headers).unwrap(), BodyLength::Empty);
        assert_eq!(
            body_length(&Method::GET, 200, &headers).unwrap(),
            BodyLength::Exact(120)
        );
    }

    #[test]
    fn missing_length_reads_until_close() {
        let headers = HashMap::new();
        assert_eq!(
            body_length(&Method::GET, 200, &headers).unwrap(),
            BodyLength::UntilClose
        );
        assert_eq!(body_length(&Method::GET, 204, &headers).unwrap(), BodyLength::Empty);
    }

    #[test]
    fn parses_any_status_code() {
        let (status, headers) =
            parse_response_head(b"HTTP/1.1 418 I'm a teapot\r\nX-Brew: tea\r\n\r\n").unwrap();

        assert_eq!(status, 418);
        assert_eq!(headers.get("X-Brew").unwrap(), "tea");
    }

    #[test]
    fn rejects_garbage_status_line() {
        assert!(parse_response_head(b"hello\r\n\r\n").is_err());
    }

    #[tokio::test]
    async fn elapsed_connect_maps_to_gateway_timeout() {
        let error = timeout(Duration::from_millis(1), std::future::pending::<()>())
            .await
            .context("Connection timeout")
            .unwrap_err();

        let response = ProxyHandler::default().error_response(&error);
        assert_eq!(response.status, StatusCode::GatewayTimeout);
    }

    #[tokio::test]
    async fn refused_connect_maps_to_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to upstream {}", addr))
            .unwrap_err();

        let response = ProxyHandler::default().error_response(&error);
        assert_eq!(response.status, StatusCode::BadGateway);
    }

    #[tokio::test]
    async fn interim_responses_are_skipped() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let response = read_response_head(stream, &Method::POST).await.unwrap();
        assert_eq!(response.status, 201);

        let mut relayed = Vec::new();
        response.relay(&mut relayed).await.unwrap();
        assert_eq!(relayed, b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok");
    }
}
