use crate::http::request::{Method, Request};

/// Upper bound on the request line plus headers.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    /// Chunked request bodies are not decoded
    UnsupportedTransferEncoding,
    HeadersTooLarge,
    Incomplete,
}

/// Parses one request from the front of `buf`.
///
/// On success returns the request and the number of bytes it occupied, so
/// pipelined data after it stays in the caller's buffer.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() > MAX_HEADER_BYTES => return Err(ParseError::HeadersTooLarge),
        None => return Err(ParseError::Incomplete),
    };
    if headers_end > MAX_HEADER_BYTES {
        return Err(ParseError::HeadersTooLarge);
    }

    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str =
        std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut headers = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        headers.push((key.to_string(), value.trim().to_string()));
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: Vec::new(),
    };

    if request.has_header("Transfer-Encoding") {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    let content_length = content_length(&request)?;

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let request = Request {
        body: body_bytes[..content_length].to_vec(),
        ..request
    };

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))
}

/// Body length from Content-Length. Repeated headers must all agree.
fn content_length(request: &Request) -> Result<usize, ParseError> {
    let mut length = None;

    for value in request.header_values("Content-Length") {
        let parsed = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength)?;

        match length {
            Some(seen) if seen != parsed => return Err(ParseError::InvalidContentLength),
            _ => length = Some(parsed),
        }
    }

    Ok(length.unwrap_or(0))
}

/// Whether `buf` starts with a complete request head carrying
/// `Expect: 100-continue`.
pub fn awaiting_continue(buf: &[u8]) -> bool {
    let Some(headers_end) = find_headers_end(buf) else {
        return false;
    };
    let Ok(head) = std::str::from_utf8(&buf[..headers_end]) else {
        return false;
    };

    head.split("\r\n").skip(1).any(|line| {
        line.split_once(':').is_some_and(|(k, v)| {
            k.trim().eq_ignore_ascii_case("Expect") && v.trim().eq_ignore_ascii_case("100-continue")
        })
    })
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
