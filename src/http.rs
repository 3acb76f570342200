//! One-shot HTTP/1.1 POST used to carry XML-RPC calls.
//!
//! supervisord serves `/RPC2` over both TCP and its Unix socket, so this is
//! generic over any async byte stream. Each request uses a fresh connection
//! with `Connection: close`; the daemon's responses always carry a
//! Content-Length, but read-to-EOF is supported as a fallback.

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) const RPC_PATH: &str = "/RPC2";

/// Sends `body` as a POST to [`RPC_PATH`] and returns the response body.
pub(crate) async fn post_rpc<S>(
    stream: &mut S,
    host: &str,
    authorization: Option<&str>,
    body: &str,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format_request(host, authorization, body);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut raw = Vec::with_capacity(4096);
    let header_end = loop {
        let mut chunk = [0u8; 2048];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Protocol(
                "connection closed before response headers".to_string(),
            ));
        }
        raw.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&raw) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    let status = parse_status(&head)?;
    if status != 200 {
        return Err(Error::Http { status });
    }

    let mut payload = raw.split_off(header_end + 4);
    match content_length(&head) {
        Some(length) => {
            while payload.len() < length {
                let mut chunk = [0u8; 4096];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::Protocol(
                        "connection closed before response body".to_string(),
                    ));
                }
                payload.extend_from_slice(&chunk[..n]);
            }
            payload.truncate(length);
        }
        None => {
            // No Content-Length: the body runs until the server closes.
            stream.read_to_end(&mut payload).await?;
        }
    }

    String::from_utf8(payload)
        .map_err(|_| Error::Protocol("response body is not valid UTF-8".to_string()))
}

fn format_request(host: &str, authorization: Option<&str>, body: &str) -> String {
    let mut request = String::with_capacity(body.len() + 256);
    request.push_str("POST ");
    request.push_str(RPC_PATH);
    request.push_str(" HTTP/1.1\r\nHost: ");
    request.push_str(host);
    request.push_str("\r\nContent-Type: text/xml\r\nContent-Length: ");
    request.push_str(&body.len().to_string());
    request.push_str("\r\n");
    if let Some(credentials) = authorization {
        request.push_str("Authorization: Basic ");
        request.push_str(credentials);
        request.push_str("\r\n");
    }
    request.push_str("Connection: close\r\n\r\n");
    request.push_str(body);
    request
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_status(head: &str) -> Result<u16> {
    let status_line = head.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(Error::Protocol(format!("bad status line '{status_line}'")));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| Error::Protocol(format!("bad status line '{status_line}'")))
}

fn content_length(head: &str) -> Option<usize> {
    head.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
