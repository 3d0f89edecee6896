//! Minimal blocking HTTP/1.1 primitives over any Read + Write stream
//!
//! httparse-based parsing for a GET-only demo surface:
//! - One request per connection (no keep-alive)
//! - Request bodies are ignored; GET carries none
//! - Header cap: 32 KiB
//! - Request targets are split into path + percent-decoded query params

use std::io::{Read, Write};

use serde::Serialize;

/// Maximum header section size (32 KiB)
const MAX_HEADER_SIZE: usize = 32 * 1024;

/// Parsed HTTP request (transport-free)
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    /// First query parameter with the given name, if present
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP response to write back
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// JSON response with the right content type
    pub fn json(status: u16, value: &impl Serialize) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    /// Raw bytes with an explicit content type
    pub fn bytes(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Reason phrase for the status codes this server emits
fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Read and parse one HTTP request head from a stream.
///
/// Returns None if the connection closed before any bytes arrived.
/// Returns Some(Err) for malformed requests (caller writes a 400).
/// Anything after the header terminator is ignored - this surface is
/// GET-only and never consumes a body.
pub fn read_request(stream: &mut impl Read) -> Option<Result<HttpRequest, String>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 512];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                if buf.is_empty() {
                    return None; // clean close
                }
                return Some(Err("Connection closed mid-request".to_string()));
            }
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > MAX_HEADER_SIZE {
                    return Some(Err("Headers too large".to_string()));
                }
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(e) => {
                if buf.is_empty() {
                    return None; // read error on fresh connection = closed
                }
                return Some(Err(format!("Read error: {}", e)));
            }
        }
    }

    let mut parsed_headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut parsed_headers);

    match req.parse(&buf) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Some(Err("Incomplete HTTP request".to_string()));
        }
        Err(e) => {
            return Some(Err(format!("HTTP parse error: {}", e)));
        }
    }

    let method = req.method.unwrap_or("").to_string();
    let target = req.path.unwrap_or("/");
    let (path, raw_query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    Some(Ok(HttpRequest {
        method,
        path: path.to_string(),
        params: parse_query(raw_query),
    }))
}

/// Split a raw query string into decoded key/value pairs
pub fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (percent_decode(key), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

/// Decode %XX escapes and '+' as space. Invalid escapes pass through
/// literally rather than failing the whole request.
pub fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi * 16 + lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Write an HTTP response to a stream.
pub fn write_response(stream: &mut impl Write, response: &HttpResponse) {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason(response.status),
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    // Ignore write errors - the client may have disconnected
    let _ = stream.write_all(head.as_bytes());
    if !response.body.is_empty() {
        let _ = stream.write_all(&response.body);
    }
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_get_request() {
        let raw = b"GET /api HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let mut stream = Cursor::new(raw.to_vec());
        let req = read_request(&mut stream).unwrap().unwrap();

        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api");
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_query_string_is_split_and_decoded() {
        let raw = b"GET /api?query=who+invented%20the%20web&k=5 HTTP/1.1\r\n\r\n";
        let mut stream = Cursor::new(raw.to_vec());
        let req = read_request(&mut stream).unwrap().unwrap();

        assert_eq!(req.path, "/api");
        assert_eq!(req.param("query"), Some("who invented the web"));
        assert_eq!(req.param("k"), Some("5"));
        assert_eq!(req.param("missing"), None);
    }

    #[test]
    fn test_percent_decode_keeps_invalid_escapes() {
        assert_eq!(percent_decode("100%25"), "100%");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
        assert_eq!(percent_decode("a+b"), "a b");
    }

    #[test]
    fn test_parse_query_without_value() {
        let params = parse_query("filter&query=x");
        assert_eq!(
            params,
            vec![
                ("filter".to_string(), String::new()),
                ("query".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_stream_returns_none() {
        let mut stream = Cursor::new(Vec::<u8>::new());
        assert!(read_request(&mut stream).is_none());
    }

    #[test]
    fn test_truncated_request_is_an_error() {
        let raw = b"GET /api HTTP/1.1\r\nHost: local";
        let mut stream = Cursor::new(raw.to_vec());
        assert!(read_request(&mut stream).unwrap().is_err());
    }

    #[test]
    fn test_headers_too_large() {
        let huge = format!(
            "GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n",
            "A".repeat(MAX_HEADER_SIZE)
        );
        let mut stream = Cursor::new(huge.into_bytes());
        let result = read_request(&mut stream).unwrap();
        assert!(result.unwrap_err().contains("too large"));
    }

    #[test]
    fn test_write_response() {
        let resp = HttpResponse::json(200, &serde_json::json!({"ok": true}))
            .with_header("Access-Control-Allow-Origin", "*");
        let mut buf = Vec::new();
        write_response(&mut buf, &resp);

        let output = String::from_utf8_lossy(&buf);
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.contains("Content-Type: application/json\r\n"));
        assert!(output.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(output.contains("Connection: close\r\n"));
        assert!(output.ends_with("{\"ok\":true}"));
    }

    #[test]
    fn test_write_response_sets_content_length() {
        let resp = HttpResponse::bytes(200, "text/plain", b"hello".to_vec());
        let mut buf = Vec::new();
        write_response(&mut buf, &resp);

        let output = String::from_utf8_lossy(&buf);
        assert!(output.contains("Content-Length: 5\r\n"));
        assert!(output.contains("Content-Type: text/plain\r\n"));
    }
}
