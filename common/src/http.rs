use std::{
    io::{self, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::debug;
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("host {host} is unreachable: {source}")]
    Unreachable {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("server answered {status} {reason}")]
    Rejected { status: u16, reason: String },
}

/// Plain `http://host[:port]/path?query` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrl {
    pub host: String,
    pub port: u16,
    /// Path plus query, always starting with `/`.
    pub path: String,
}

impl HttpUrl {
    pub fn parse(url: &str) -> Result<Self, UploadError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| UploadError::InvalidUrl(url.to_string()))?;
        if !scheme.eq_ignore_ascii_case("http") {
            return Err(UploadError::UnsupportedScheme(scheme.to_ascii_lowercase()));
        }

        let (authority, path) = match rest.find(['/', '?']) {
            Some(index) if rest[index..].starts_with('?') => {
                (&rest[..index], format!("/{}", &rest[index..]))
            }
            Some(index) => (&rest[..index], rest[index..].to_string()),
            None => (rest, "/".to_string()),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse()
                    .map_err(|_| UploadError::InvalidUrl(url.to_string()))?,
            ),
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(UploadError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path,
        })
    }

    fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// A GET request; every field travels in the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: HttpUrl,
}

impl HttpRequest {
    pub fn get(url: &str) -> Result<Self, UploadError> {
        Ok(Self {
            url: HttpUrl::parse(url)?,
        })
    }

    /// HTTP/1.0 wire form; the server closes the connection after answering.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.0\r\nHost: {}\r\n\r\n",
            self.url.path,
            self.url.host_header()
        )
        .into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn parse(raw: &[u8]) -> Result<Self, UploadError> {
        let line_end = raw
            .windows(2)
            .position(|window| window == b"\r\n")
            .unwrap_or(raw.len());
        let status_line = std::str::from_utf8(&raw[..line_end])
            .map_err(|_| UploadError::MalformedResponse("status line is not utf-8".to_string()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/1.") {
            return Err(UploadError::MalformedResponse(format!(
                "unexpected status line `{status_line}`"
            )));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .filter(|code| (100..1000).contains(code))
            .ok_or_else(|| {
                UploadError::MalformedResponse(format!("no status code in `{status_line}`"))
            })?;
        let reason = parts.next().unwrap_or_default().trim().to_string();

        let body = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| raw[index + 4..].to_vec())
            .unwrap_or_default();

        Ok(Self {
            status,
            reason,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request and returns whatever the server answered.
pub trait Transport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, UploadError>;
}

/// A fresh TCP connection per request.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for TcpTransport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, UploadError> {
        let url = &request.url;
        let unreachable = |source: io::Error| UploadError::Unreachable {
            host: url.host.clone(),
            source,
        };

        let address = (url.host.as_str(), url.port)
            .to_socket_addrs()
            .map_err(unreachable)?
            .next()
            .ok_or_else(|| {
                unreachable(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no address for host",
                ))
            })?;

        debug!("GET http://{}:{}{}", url.host, url.port, url.path);
        let mut stream = TcpStream::connect_timeout(&address, self.timeout).map_err(unreachable)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        stream.write_all(&request.to_bytes())?;
        stream.flush()?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw)?;
        HttpResponse::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::BufRead, io::BufReader, net::TcpListener, thread};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_urls() {
        assert_eq!(
            HttpUrl::parse("http://m33x7:8888/input/abc?x=1").unwrap(),
            HttpUrl {
                host: "m33x7".to_string(),
                port: 8888,
                path: "/input/abc?x=1".to_string(),
            }
        );
        assert_eq!(
            HttpUrl::parse("HTTP://logger.local").unwrap(),
            HttpUrl {
                host: "logger.local".to_string(),
                port: 80,
                path: "/".to_string(),
            }
        );
        assert_eq!(HttpUrl::parse("http://host?a=b").unwrap().path, "/?a=b");
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            HttpUrl::parse("https://secure"),
            Err(UploadError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            HttpUrl::parse("logger.local/update"),
            Err(UploadError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpUrl::parse("http://host:port/"),
            Err(UploadError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpUrl::parse("http:///path"),
            Err(UploadError::InvalidUrl(_))
        ));
    }

    #[test]
    fn get_wire_format() {
        let request = HttpRequest::get("http://api.local/input/k?f=1").unwrap();
        assert_eq!(
            String::from_utf8(request.to_bytes()).unwrap(),
            "GET /input/k?f=1 HTTP/1.0\r\nHost: api.local\r\n\r\n"
        );

        let request = HttpRequest::get("http://api.local:8080/update?api_key=k").unwrap();
        assert_eq!(
            String::from_utf8(request.to_bytes()).unwrap(),
            "GET /update?api_key=k HTTP/1.0\r\nHost: api.local:8080\r\n\r\n"
        );
    }

    #[test]
    fn status_parsing_accepts_any_http1_version() {
        let response = HttpResponse::parse(b"HTTP/1.0 200 OK\r\nServer: x\r\n\r\n1").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.body, b"1");
        assert!(response.is_success());

        assert!(HttpResponse::parse(b"HTTP/1.1 204 No Content\r\n\r\n")
            .unwrap()
            .is_success());
        assert!(!HttpResponse::parse(b"HTTP/1.1 400 Bad Request\r\n\r\n")
            .unwrap()
            .is_success());
    }

    #[test]
    fn malformed_responses() {
        assert!(matches!(
            HttpResponse::parse(b""),
            Err(UploadError::MalformedResponse(_))
        ));
        assert!(matches!(
            HttpResponse::parse(b"HTTP/1.1 OK\r\n\r\n"),
            Err(UploadError::MalformedResponse(_))
        ));
        assert!(matches!(
            HttpResponse::parse(b"SSH-2.0-OpenSSH\r\n"),
            Err(UploadError::MalformedResponse(_))
        ));
    }

    #[test]
    fn tcp_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" {
                    break;
                }
            }
            reader
                .get_mut()
                .write_all(b"HTTP/1.0 200 OK\r\n\r\n1")
                .unwrap();
            request_line
        });

        let request = HttpRequest::get(&format!("http://127.0.0.1:{port}/input/k?t=1")).unwrap();
        let response = TcpTransport::default().execute(&request).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(server.join().unwrap(), "GET /input/k?t=1 HTTP/1.0\r\n");
    }

    #[test]
    fn unreachable_host() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = HttpRequest::get(&format!("http://127.0.0.1:{port}/")).unwrap();
        assert!(matches!(
            TcpTransport::new(Duration::from_secs(1)).execute(&request),
            Err(UploadError::Unreachable { .. })
        ));
    }
}
