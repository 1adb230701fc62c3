use std::fmt;
use std::net::SocketAddr;

use crate::http::headers::Headers;

/// HTTP request methods.
///
/// `OPTIONS` is the CORS preflight method and is answered by the proxy
/// handler itself; every other method, registered or not, is forwarded
/// upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// TRACE - Loop-back test
    TRACE,
    /// Any other method token (PROPFIND, MKCOL, custom verbs)
    Extension(String),
}

impl Method {
    /// Parses one of the standard HTTP methods.
    ///
    /// Method names are case-sensitive. Use [`Method::from_token`] to also
    /// accept extension methods.
    ///
    /// # Example
    ///
    /// ```
    /// # use prefix_proxy::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "CONNECT" => Some(Method::CONNECT),
            "TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }

    /// Parses any valid method token, standard or extension.
    ///
    /// ```
    /// # use prefix_proxy::http::request::Method;
    /// assert_eq!(Method::from_token("PUT"), Some(Method::PUT));
    /// assert_eq!(Method::from_token("PROPFIND"), Some(Method::Extension("PROPFIND".into())));
    /// assert_eq!(Method::from_token("BAD(METHOD)"), None);
    /// ```
    pub fn from_token(s: &str) -> Option<Self> {
        if let Some(method) = Self::from_str(s) {
            return Some(method);
        }

        let is_tchar = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
        if !s.is_empty() && s.chars().all(is_tchar) {
            Some(Method::Extension(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
            Method::Extension(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request as seen by the proxy.
///
/// The request target is kept split into its URL parts so the proxy handler
/// can rewrite each one in place. `path` and `query` are raw: nothing is
/// percent-decoded.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// URL scheme; set for absolute-form targets and after rewriting
    pub scheme: Option<String>,
    /// `host[:port]`; set for absolute-form targets and after rewriting
    pub authority: Option<String>,
    /// Raw path component (e.g. "/proxy/users")
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers in arrival order
    pub headers: Headers,
    /// Request body for POST/PUT requests
    pub body: Vec<u8>,
    /// Address of the client that sent the request, when known
    pub peer_addr: Option<SocketAddr>,
}

/// The URL parts of a request target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestTarget {
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: String,
    pub query: String,
}

impl RequestTarget {
    /// Splits a request-line target into its parts.
    ///
    /// Handles origin-form (`/a/b?x=1`) and absolute-form
    /// (`http://host/a/b?x=1`). A fragment, if a client sends one, is dropped.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.split_once('#').map_or(raw, |(before, _)| before);

        let (scheme, authority, rest) = match raw.split_once("://") {
            Some((scheme, after)) if !scheme.is_empty() && !scheme.contains('/') => {
                let end = after.find(['/', '?']).unwrap_or(after.len());
                (
                    Some(scheme.to_string()),
                    Some(after[..end].to_string()),
                    &after[end..],
                )
            }
            _ => (None, None, raw),
        };

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };

        Self {
            scheme,
            authority,
            path: path.to_string(),
            query: query.to_string(),
        }
    }
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    target: RequestTarget,
    version: Option<String>,
    headers: Headers,
    body: Vec<u8>,
    peer_addr: Option<SocketAddr>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            target: RequestTarget::default(),
            version: None,
            headers: Headers::new(),
            body: Vec::new(),
            peer_addr: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets path and query from a request target such as `/users?x=1`.
    pub fn target(mut self, target: &str) -> Self {
        self.target = RequestTarget::parse(target);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.target.path = path.into();
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.target.query = query.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            scheme: self.target.scheme,
            authority: self.target.authority,
            path: self.target.path,
            query: self.target.query,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
            peer_addr: self.peer_addr,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Sets a header, replacing every existing entry whose name matches
    /// ignoring case.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key, value);
    }

    /// Removes every entry whose name matches `key` ignoring case.
    pub fn remove_header(&mut self, key: &str) {
        self.headers.remove(key);
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is sent;
    /// HTTP/1.0 only keeps the connection with an explicit `keep-alive`.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version != "HTTP/1.0",
        }
    }

    /// The origin-form request URI: path plus `?query` when the query is
    /// non-empty. An empty path is sent as `/`.
    pub fn request_uri(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        if self.query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, self.query)
        }
    }

    /// The request URL, absolute when scheme and authority are known.
    pub fn url(&self) -> String {
        match (&self.scheme, &self.authority) {
            (Some(scheme), Some(authority)) => {
                format!("{}://{}{}", scheme, authority, self.request_uri())
            }
            _ => self.request_uri(),
        }
    }

    pub fn is_preflight(&self) -> bool {
        self.method == Method::OPTIONS
    }
}
