//! Hand-framed HTTP/1.1 over TLS.
//!
//! Requests are written as literal CRLF-joined lines on a stream obtained
//! from [`Transport::connect`], so they inherit whatever proxy tunnel the
//! transport negotiated. Responses are read to EOF (`Connection: close`) and
//! split at the blank line after the headers.

use crate::error::NetError;
use crate::proxy::Purpose;
use crate::transport::Transport;
use rustls::pki_types::ServerName;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Sentinel carried when no `HTTP/1.1` status line could be parsed.
/// Distinct from every real HTTP status.
pub const UNPARSEABLE_STATUS: u16 = 520;

/// A request assembled line by line.
#[derive(Debug, Clone)]
pub struct RawRequest {
    method: &'static str,
    host: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl RawRequest {
    pub fn get(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: "GET",
            host: host.into(),
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(
        host: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: "POST",
            host: host.into(),
            path: path.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body.into()),
        }
    }

    pub fn post_form(
        host: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: "POST",
            host: host.into(),
            path: path.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The literal request lines, CRLF-joined by the writer.
    pub fn to_lines(&self, user_agent: &str) -> Vec<String> {
        let mut lines = vec![
            format!("{} {} HTTP/1.1", self.method, self.path),
            format!("Host: {}", self.host),
            format!("User-Agent: {user_agent}"),
        ];
        for (name, value) in &self.headers {
            lines.push(format!("{name}: {value}"));
        }
        match &self.body {
            Some(body) => {
                lines.push(format!("Content-Length: {}", body.len()));
                lines.push("Connection: close".to_string());
                lines.push(String::new());
                lines.push(body.clone());
            }
            None => {
                lines.push("Connection: close".to_string());
                lines.push(String::new());
                lines.push(String::new());
            }
        }
        lines
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// First header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every header value with the given name (e.g. repeated `Set-Cookie`).
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub(crate) fn parse_response(raw: &str) -> Result<HttpResponse, NetError> {
    if !raw.starts_with("HTTP/1.1") {
        return Err(NetError::MalformedResponse {
            status: UNPARSEABLE_STATUS,
        });
    }

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or(NetError::MalformedResponse {
            status: UNPARSEABLE_STATUS,
        })?;

    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let headers = head
        .lines()
        .skip(1)
        .filter_map(|line| {
            line.split_once(':')
                .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    Ok(HttpResponse {
        status,
        headers,
        body: body.to_string(),
    })
}

impl Transport {
    /// Perform one HTTPS exchange: connect (login purpose), wrap in TLS,
    /// write the request lines verbatim, read the whole response.
    pub async fn https_request(&self, request: RawRequest) -> Result<HttpResponse, NetError> {
        debug!(host = %request.host(), path = %request.path, "raw HTTPS request");

        let stream = self.connect(request.host(), 443, Purpose::Login).await?;
        let server_name = ServerName::try_from(request.host().to_string())
            .map_err(|e| NetError::tls(e.to_string()))?;
        let mut tls = self
            .tls_connector()
            .connect(server_name, stream)
            .await
            .map_err(|e| NetError::tls(e.to_string()))?;

        let payload = request.to_lines(self.user_agent()).join("\r\n");
        tls.write_all(payload.as_bytes()).await?;

        let mut raw = Vec::new();
        let read = tokio::time::timeout(self.config().read_timeout, tls.read_to_end(&mut raw));
        tokio::select! {
            _ = self.cancellation_token().cancelled() => return Err(NetError::Cancelled),
            result = read => match result {
                Err(_) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "response read timed out").into());
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(_)) => {}
            }
        }

        parse_response(&String::from_utf8_lossy(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_lines_include_exact_framing() {
        let body = r#"{"user":"alice"}"#;
        let request = RawRequest::post_json("authserver.example.com", "/authenticate", body);
        let lines = request.to_lines("craft/0.1.0");
        assert_eq!(lines[0], "POST /authenticate HTTP/1.1");
        assert_eq!(lines[1], "Host: authserver.example.com");
        assert_eq!(lines[2], "User-Agent: craft/0.1.0");
        assert_eq!(lines[3], "Content-Type: application/json");
        assert_eq!(lines[4], format!("Content-Length: {}", body.len()));
        assert_eq!(lines[5], "Connection: close");
        assert_eq!(lines[6], "");
        assert_eq!(lines[7], body);
    }

    #[test]
    fn get_lines_carry_cookie_and_no_body_framing() {
        let request = RawRequest::get("realms.example.com", "/worlds")
            .with_header("Cookie", "sid=token:abc");
        let lines = request.to_lines("craft/0.1.0");
        assert_eq!(lines[0], "GET /worlds HTTP/1.1");
        assert!(lines.contains(&"Cookie: sid=token:abc".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("Content-Length")));
        // Terminates with an empty line pair so the wire ends in CRLFCRLF.
        assert_eq!(&lines[lines.len() - 2..], ["", ""]);
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let request = RawRequest::post_json("h", "/p", "héllo");
        let lines = request.to_lines("ua");
        assert!(lines.contains(&"Content-Length: 6".to_string()));
    }

    #[test]
    fn response_is_split_at_blank_line() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n{\"ok\":true}";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{\"ok\":true}");
        assert_eq!(response.header("content-type"), Some("application/json"));
        let cookies: Vec<_> = response.headers_named("set-cookie").collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }

    #[test]
    fn garbage_yields_sentinel_status() {
        let err = parse_response("not http at all").unwrap_err();
        match err {
            NetError::MalformedResponse { status } => assert_eq!(status, UNPARSEABLE_STATUS),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            parse_response("HTTP/1.1 banana\r\n\r\n"),
            Err(NetError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn headerless_response_still_parses_status() {
        let response = parse_response("HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
    }
}
