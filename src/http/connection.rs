use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::server::router::Router;

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    buffer: Vec<u8>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, router: Arc<Router>) -> Self {
        Self {
            stream,
            peer,
            router,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => match self.read_request().await {
                    Ok(Some(mut req)) => {
                        req.peer_addr = Some(self.peer);
                        self.state = ConnectionState::Processing(req);
                    }
                    Ok(None) => {
                        self.state = ConnectionState::Closed;
                    }
                    Err(ReadError::Io(e)) => return Err(e.into()),
                    Err(ReadError::Parse(e)) => {
                        // Malformed request: answer once, then drop the connection
                        tracing::debug!(peer = %self.peer, error = %e, "Rejecting malformed request");
                        let mut response = match e {
                            ParseError::BodyTooLarge => Response::payload_too_large(),
                            _ => Response::bad_request(),
                        };
                        response.headers.insert("Connection", "close");
                        self.state = ConnectionState::Writing(ResponseWriter::new(&response), false);
                    }
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let mut response = self.router.dispatch(req).await;
                    if !keep_alive {
                        response.headers.insert("Connection", "close");
                    }

                    let writer = ResponseWriter::new(&response);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        self.state = ConnectionState::Reading; // go back for next request
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reads the next request off the connection. `Ok(None)` means the client
    /// closed the connection cleanly between requests.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ReadError> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => return Err(ReadError::Parse(e)),
            }

            let mut temp = [0u8; 4096];
            let n = self.stream.read(&mut temp).await.map_err(ReadError::Io)?;

            if n == 0 {
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("HTTP parse error: {0}")]
    Parse(ParseError),
    #[error("read failed: {0}")]
    Io(std::io::Error),
}
