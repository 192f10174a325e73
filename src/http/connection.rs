use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::gateway::{Gateway, Outcome};
use crate::http::parser::{ParseError, awaiting_continue, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::proxy::upstream::UpstreamResponse;

pub struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
    state: ConnectionState,
    gateway: Arc<Gateway>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Relaying(UpstreamResponse),
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, gateway: Arc<Gateway>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            gateway,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => match self.read_request().await {
                    Ok(Some(req)) => {
                        self.state = ConnectionState::Processing(req);
                    }
                    Ok(None) => {
                        self.state = ConnectionState::Closed;
                    }
                    Err(e) => {
                        tracing::warn!("Rejecting malformed request: {:?}", e);
                        let writer = ResponseWriter::new(&Response::bad_request(), false);
                        self.state = ConnectionState::Writing(writer, false);
                    }
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let head_only = req.method == Method::HEAD;

                    self.state = match self.gateway.handle(req).await {
                        Outcome::Local(response) => {
                            let writer = ResponseWriter::new(&response, head_only);
                            ConnectionState::Writing(writer, keep_alive)
                        }
                        Outcome::Relay(upstream) => ConnectionState::Relaying(upstream),
                    };
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    self.state = if keep_alive {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    };
                }

                // The relayed response carries the upstream's own framing, so
                // the client connection ends with it.
                ConnectionState::Relaying(upstream) => {
                    let relayed = upstream.relay(&mut self.stream).await?;
                    tracing::trace!(bytes = relayed, "Relayed upstream response");
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Read until one full request is buffered. `Ok(None)` means the client
    /// closed the connection between requests.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ParseError> {
        let mut continue_sent = false;

        loop {
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => return Err(e),
            }

            // The whole body is buffered before forwarding, so the client is
            // told to go ahead here rather than by the upstream.
            if !continue_sent && awaiting_continue(&self.buffer) {
                continue_sent = true;
                if let Err(e) = self.stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await {
                    tracing::debug!("Write error: {}", e);
                    return Ok(None);
                }
            }

            let mut temp = [0u8; 4096];
            let n = match self.stream.read(&mut temp).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("Read error: {}", e);
                    0
                }
            };

            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        pending = self.buffer.len(),
                        "Client closed connection mid-request"
                    );
                }
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}
