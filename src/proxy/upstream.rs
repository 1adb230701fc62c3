//! Upstream connection and request forwarding
//!
//! `UpstreamForwarder` is the default forwarding engine. It opens one plain
//! TCP connection per request to its fixed target, writes the rewritten
//! request, and reads the upstream response back into a `Response`.

use crate::error::ProxyError;
use crate::http::headers::Headers;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::proxy::engine::ForwardingEngine;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};
use url::Url;

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

/// Largest response head or chunk-size line accepted from upstream
const MAX_HEAD_SIZE: usize = 64 * 1024;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers that only apply to a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
    "Upgrade",
    "TE",
    "Trailer",
];

/// Forwards requests to a single upstream over plain HTTP/1.1.
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    /// `host:port` the forwarder connects to
    addr: String,

    /// Connection timeout duration
    connection_timeout: Duration,

    /// Request timeout duration
    request_timeout: Duration,
}

impl UpstreamForwarder {
    /// Binds a forwarder to `target`.
    ///
    /// Only `http` targets are supported; anything else is a configuration
    /// error so a mount that could never succeed is rejected at startup.
    pub fn new(target: &Url) -> std::result::Result<Self, ProxyError> {
        if target.scheme() != "http" {
            return Err(ProxyError::configuration(
                target.as_str(),
                format!("unsupported scheme {:?}, only http is supported", target.scheme()),
            ));
        }

        let host = target
            .host_str()
            .ok_or_else(|| ProxyError::configuration(target.as_str(), "target URL has no host"))?;
        let port = target.port_or_known_default().unwrap_or(80);

        Ok(Self {
            addr: format!("{}:{}", host, port),
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, connection_timeout: Duration, request_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self.request_timeout = request_timeout;
        self
    }

    /// The `host:port` this forwarder connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Proxy a request to the upstream
    async fn proxy_to_upstream(&self, request: &Request) -> Result<Response> {
        // Connect to upstream with timeout
        let stream = timeout(self.connection_timeout, TcpStream::connect(&self.addr))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to upstream")?;

        tracing::trace!(upstream = %self.addr, "Connected to upstream");

        // Forward request and get response with timeout
        timeout(
            self.request_timeout,
            self.send_request_and_receive_response(stream, request),
        )
        .await
        .context("Request timeout")?
    }

    /// Send request to upstream and receive response
    async fn send_request_and_receive_response(
        &self,
        mut stream: TcpStream,
        request: &Request,
    ) -> Result<Response> {
        let request_bytes = self.build_http_request(request);
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        tracing::trace!("Request sent to upstream");

        Self::read_http_response(&mut stream, request.method == Method::HEAD).await
    }

    /// Build HTTP request bytes to send upstream.
    ///
    /// The request line uses the request's own path and query; the `Host`
    /// header set by the rewrite is kept. Hop-by-hop headers, and any header
    /// named in `Connection`, are dropped.
    pub fn build_http_request(&self, request: &Request) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(256 + request.body.len());

        // Request line
        buffer.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                request.method,
                request.request_uri(),
                request.version
            )
            .as_bytes(),
        );

        let mut headers = request.headers.clone();

        let named_by_connection: Vec<String> = request
            .header("Connection")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        headers.retain(|key, _| {
            !HOP_BY_HOP.iter().any(|h| key.eq_ignore_ascii_case(h))
                && !named_by_connection
                    .iter()
                    .any(|h| key.eq_ignore_ascii_case(h))
        });

        if !headers.contains("Host") {
            let host = request.authority.clone().unwrap_or_else(|| self.addr.clone());
            headers.insert("Host", host);
        }

        if let Some(peer) = request.peer_addr {
            // Every prior hop, across repeated header lines, then this client
            let mut hops: Vec<String> = request
                .headers
                .get_all("X-Forwarded-For")
                .map(str::to_string)
                .collect();
            hops.push(peer.ip().to_string());
            headers.insert("X-Forwarded-For", hops.join(", "));
        }

        if !request.body.is_empty() && !headers.contains("Content-Length") {
            headers.insert("Content-Length", request.body.len().to_string());
        }

        // One request per upstream connection
        headers.insert("Connection", "close");

        for (key, value) in headers.iter() {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        buffer.extend_from_slice(b"\r\n");

        if !request.body.is_empty() {
            buffer.extend_from_slice(&request.body);
        }

        buffer
    }

    /// Read an HTTP response from upstream.
    ///
    /// Interim `1xx` responses are skipped. Chunked bodies are decoded and
    /// re-framed with a Content-Length. `head_only` marks responses to HEAD
    /// requests, which never carry a body.
    pub async fn read_http_response<S>(stream: &mut S, head_only: bool) -> Result<Response>
    where
        S: AsyncRead + Unpin,
    {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        loop {
            if let Some(headers_end) = find_crlf_crlf(&buffer) {
                let headers_bytes = buffer.split_to(headers_end + 4);
                let (status, mut headers) = Self::parse_response_headers(&headers_bytes)?;

                let code = status.as_u16();
                if (100..200).contains(&code) && code != 101 {
                    tracing::trace!(status = code, "Skipping interim response");
                    continue;
                }

                let chunked = headers
                    .get("Transfer-Encoding")
                    .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));

                let body = if head_only || status.forbids_body() {
                    Vec::new()
                } else if chunked {
                    headers.remove("Content-Length");
                    Self::read_chunked_body(stream, &mut buffer).await?
                } else {
                    Self::read_response_body(stream, &mut buffer, &headers).await?
                };

                headers.retain(|k, _| !HOP_BY_HOP.iter().any(|h| k.eq_ignore_ascii_case(h)));

                return Ok(ResponseBuilder::new(status)
                    .headers(headers)
                    .body(body)
                    .build());
            }

            // Prevent unbounded header growth
            if buffer.len() > MAX_HEAD_SIZE {
                anyhow::bail!("Response headers too large");
            }

            let n = stream.read_buf(&mut buffer).await?;

            if n == 0 {
                anyhow::bail!("Connection closed before complete response received");
            }
        }
    }

    /// Parse response status line and headers
    fn parse_response_headers(headers_bytes: &[u8]) -> Result<(StatusCode, Headers)> {
        let headers_str =
            std::str::from_utf8(headers_bytes).context("Invalid UTF-8 in response headers")?;

        let mut lines = headers_str.lines();

        let status_line = lines.next().context("Empty response")?;
        let parts: Vec<&str> = status_line.splitn(3, ' ').collect();

        if parts.len() < 2 || !parts[0].starts_with("HTTP/") {
            anyhow::bail!("Invalid status line: {}", status_line);
        }

        let status_code: u16 = parts[1].parse().context("Invalid status code")?;

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            if let Some((key, value)) = line.split_once(':') {
                headers.append(key.trim(), value.trim());
            }
        }

        Ok((StatusCode::from_u16(status_code), headers))
    }

    /// Read a response body framed by Content-Length, or by connection close
    /// when no length is given.
    async fn read_response_body<S>(
        stream: &mut S,
        buffer: &mut BytesMut,
        headers: &Headers,
    ) -> Result<Vec<u8>>
    where
        S: AsyncRead + Unpin,
    {
        let content_length = match headers.get("Content-Length") {
            Some(cl) => cl.parse::<usize>().context("Invalid Content-Length")?,
            None => {
                let mut body = buffer.to_vec();
                loop {
                    buffer.clear();
                    let n = stream.read_buf(buffer).await?;
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&buffer[..n]);
                }
                return Ok(body);
            }
        };

        let mut body = Vec::with_capacity(content_length);

        // Use existing buffer data first
        let from_buffer = buffer.len().min(content_length);
        body.extend_from_slice(&buffer[..from_buffer]);
        buffer.advance(from_buffer);

        while body.len() < content_length {
            buffer.clear();
            let n = stream.read_buf(buffer).await?;

            if n == 0 {
                anyhow::bail!("Connection closed before complete body received");
            }

            let take = n.min(content_length - body.len());
            body.extend_from_slice(&buffer[..take]);
        }

        Ok(body)
    }

    /// Decode a `Transfer-Encoding: chunked` body. Trailers are discarded.
    async fn read_chunked_body<S>(stream: &mut S, buffer: &mut BytesMut) -> Result<Vec<u8>>
    where
        S: AsyncRead + Unpin,
    {
        let mut body = Vec::new();

        loop {
            let line = read_line(stream, buffer).await?;
            let size_str = line.split(';').next().unwrap_or_default().trim();
            let size = usize::from_str_radix(size_str, 16)
                .with_context(|| format!("Invalid chunk size {:?}", size_str))?;

            if size == 0 {
                while !read_line(stream, buffer).await?.is_empty() {}
                return Ok(body);
            }

            fill_buffer(stream, buffer, size + 2).await?;
            if &buffer[size..size + 2] != b"\r\n" {
                anyhow::bail!("Chunk not terminated by CRLF");
            }
            body.extend_from_slice(&buffer[..size]);
            buffer.advance(size + 2);
        }
    }

    /// Map a forwarding failure to the response the client receives.
    fn handle_proxy_error(&self, error: &anyhow::Error) -> Response {
        if error.downcast_ref::<Elapsed>().is_some() {
            Response::gateway_timeout()
        } else {
            Response::bad_gateway()
        }
    }
}

#[async_trait]
impl ForwardingEngine for UpstreamForwarder {
    async fn forward(&self, request: Request) -> Response {
        tracing::debug!(
            upstream = %self.addr,
            method = %request.method,
            uri = %request.request_uri(),
            "Forwarding request to upstream"
        );

        match self.proxy_to_upstream(&request).await {
            Ok(response) => {
                tracing::info!(
                    upstream = %self.addr,
                    status = response.status.as_u16(),
                    method = %request.method,
                    uri = %request.request_uri(),
                    "Request forwarded successfully"
                );
                response
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(
                    upstream = %self.addr,
                    error = %error,
                    method = %request.method,
                    uri = %request.request_uri(),
                    "Failed to proxy request to upstream"
                );
                self.handle_proxy_error(&e)
            }
        }
    }
}

fn find_crlf_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Read until `buffer` holds at least `len` bytes.
async fn fill_buffer<S>(stream: &mut S, buffer: &mut BytesMut, len: usize) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    while buffer.len() < len {
        if stream.read_buf(buffer).await? == 0 {
            anyhow::bail!("Connection closed before complete body received");
        }
    }
    Ok(())
}

/// Read one CRLF-terminated line, without the terminator.
async fn read_line<S>(stream: &mut S, buffer: &mut BytesMut) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buffer.windows(2).position(|w| w == b"\r\n") {
            let line = buffer.split_to(pos + 2);
            return Ok(String::from_utf8_lossy(&line[..pos]).into_owned());
        }

        if buffer.len() > MAX_HEAD_SIZE {
            anyhow::bail!("Chunk header too large");
        }

        if stream.read_buf(buffer).await? == 0 {
            anyhow::bail!("Connection closed before complete body received");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: t\r\n\r\n";
        let mut stream = &raw[..];

        let response = UpstreamForwarder::read_http_response(&mut stream, false)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::Ok);
        assert_eq!(response.body, b"hello world".to_vec());
        assert_eq!(response.header("Content-Length"), Some("11"));
        assert_eq!(response.header("Transfer-Encoding"), None);
    }

    #[tokio::test]
    async fn repeated_response_headers_are_kept() {
        let raw = b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\nContent-Length: 0\r\n\r\n";
        let mut stream = &raw[..];

        let response = UpstreamForwarder::read_http_response(&mut stream, false)
            .await
            .unwrap();

        assert_eq!(
            response.headers.get_all("Set-Cookie").collect::<Vec<_>>(),
            vec!["a=1", "b=2"]
        );

        let written = String::from_utf8(crate::http::writer::serialize_response(&response)).unwrap();
        assert!(written.contains("Set-Cookie: a=1\r\nSet-Cookie: b=2\r\n"));
    }

    #[test]
    fn repeated_request_headers_are_forwarded() {
        let url = Url::parse("http://upstream.local/").unwrap();
        let forwarder = UpstreamForwarder::new(&url).unwrap();
        let request = crate::http::request::RequestBuilder::new()
            .method(Method::Extension("PROPFIND".to_string()))
            .path("/dav/")
            .header("Host", "upstream.local")
            .header("X-Forwarded-For", "10.0.0.1")
            .header("Accept", "text/xml")
            .header("X-Forwarded-For", "10.0.0.2")
            .header("Accept", "application/xml")
            .peer_addr("192.0.2.7:5000".parse().unwrap())
            .build()
            .unwrap();

        let text = String::from_utf8(forwarder.build_http_request(&request)).unwrap();

        assert!(text.starts_with("PROPFIND /dav/ HTTP/1.1\r\n"));
        assert!(text.contains("Accept: text/xml\r\nAccept: application/xml\r\n"));
        assert!(text.contains("X-Forwarded-For: 10.0.0.1, 10.0.0.2, 192.0.2.7\r\n"));
    }

    #[tokio::test]
    async fn reads_until_close_without_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nstreamed body";
        let mut stream = &raw[..];

        let response = UpstreamForwarder::read_http_response(&mut stream, false)
            .await
            .unwrap();

        assert_eq!(response.body, b"streamed body".to_vec());
    }

    #[tokio::test]
    async fn skips_interim_continue() {
        let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok";
        let mut stream = &raw[..];

        let response = UpstreamForwarder::read_http_response(&mut stream, false)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::Created);
        assert_eq!(response.body, b"ok".to_vec());
    }

    #[tokio::test]
    async fn head_response_keeps_length_without_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n";
        let mut stream = &raw[..];

        let response = UpstreamForwarder::read_http_response(&mut stream, true)
            .await
            .unwrap();

        assert!(response.body.is_empty());
        assert_eq!(response.header("Content-Length"), Some("42"));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort";
        let mut stream = &raw[..];

        let result = UpstreamForwarder::read_http_response(&mut stream, false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn silent_upstream_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without answering
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let forwarder = UpstreamForwarder::new(&url)
            .unwrap()
            .with_timeouts(Duration::from_secs(1), Duration::from_millis(100));

        let request = crate::http::request::RequestBuilder::new()
            .method(Method::GET)
            .path("/")
            .build()
            .unwrap();

        let response = forwarder.forward(request).await;
        assert_eq!(response.status, StatusCode::GatewayTimeout);
    }

    #[test]
    fn rejects_non_http_targets() {
        let url = Url::parse("https://secure.example").unwrap();
        assert!(matches!(
            UpstreamForwarder::new(&url),
            Err(ProxyError::Configuration { .. })
        ));
    }

    #[test]
    fn uses_default_port() {
        let url = Url::parse("http://upstream.local/api").unwrap();
        assert_eq!(UpstreamForwarder::new(&url).unwrap().addr(), "upstream.local:80");
    }
}
