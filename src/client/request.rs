//! NTRIP request and response head
//!
//! Casters answer in one of three dialects:
//!
//! ```text
//! ICY 200 OK\r\n                      NTRIP 1.0 stream, data follows the line
//! SOURCETABLE 200 OK\r\n...\r\n\r\n    sourcetable (also sent for unknown mountpoints)
//! HTTP/1.1 200 OK\r\n...\r\n\r\n       NTRIP 2.0, possibly chunked
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::config::MountpointUrl;
use crate::error::ClientError;

/// Upper bound on the response head before giving up
pub const MAX_HEAD_LEN: usize = 8 * 1024;

/// Build the GET request for a mountpoint (or the sourcetable)
pub fn build_request(url: &MountpointUrl, user_agent: &str) -> String {
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nNtrip-Version: NTRIP/2.0\r\nUser-Agent: {}\r\n",
        url.path, url.host, user_agent
    );
    if let Some(user) = &url.user {
        let password = url.password.as_deref().unwrap_or("");
        let token = STANDARD.encode(format!("{user}:{password}"));
        request.push_str(&format!("Authorization: Basic {token}\r\n"));
    }
    request.push_str("Connection: close\r\n\r\n");
    request
}

/// Response dialect, from the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Icy,
    Sourcetable,
    Http,
}

/// Parsed status line and headers
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub kind: ResponseKind,
    pub status: u16,
    pub status_line: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Length of the head at the start of `buf`, once it is complete.
    ///
    /// An `ICY` head is the status line alone; other heads end with an
    /// empty line.
    pub fn find_end(buf: &[u8]) -> Result<Option<usize>, ClientError> {
        let Some(line_end) = find(buf, b"\n") else {
            return check_len(buf.len()).map(|_| None);
        };
        if buf.starts_with(b"ICY") {
            return Ok(Some(line_end + 1));
        }
        match find(buf, b"\r\n\r\n") {
            Some(idx) => Ok(Some(idx + 4)),
            None => check_len(buf.len()).map(|_| None),
        }
    }

    pub fn parse(head: &[u8]) -> Result<Self, ClientError> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.split("\r\n").flat_map(|l| l.split('\n'));
        let status_line = lines.next().unwrap_or("").trim().to_string();
        let unexpected = || ClientError::UnexpectedResponse(status_line.clone());

        let mut parts = status_line.split_whitespace();
        let proto = parts.next().ok_or_else(unexpected)?;
        let kind = match proto {
            "ICY" => ResponseKind::Icy,
            "SOURCETABLE" => ResponseKind::Sourcetable,
            p if p.starts_with("HTTP/1.") => ResponseKind::Http,
            _ => return Err(unexpected()),
        };
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(unexpected)?;

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Ok(Self {
            kind,
            status,
            status_line,
            headers,
        })
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length").and_then(|v| v.parse().ok())
    }

    /// Map the status to success or the matching client error
    pub fn check(&self, mountpoint: &str) -> Result<(), ClientError> {
        match self.status {
            200 => Ok(()),
            401 | 403 => Err(ClientError::AuthenticationRejected(mountpoint.to_string())),
            _ => Err(ClientError::UnexpectedResponse(self.status_line.clone())),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn check_len(len: usize) -> Result<(), ClientError> {
    if len > MAX_HEAD_LEN {
        return Err(ClientError::UnexpectedResponse(format!(
            "response head exceeds {MAX_HEAD_LEN} bytes"
        )));
    }
    Ok(())
}
