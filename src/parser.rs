//! Request parser driver (SPEC_FULL §4.3).
//!
//! Only the request path is consumed, mirroring the reference
//! implementation's `on_path` callback (`examples/original_source/aws.c`):
//! the parser exists to answer two questions — "what path was requested"
//! and "have all the headers arrived yet" — nothing else about the request
//! is load-bearing for this server (method is unchecked, body is ignored,
//! SPEC_FULL Non-goals exclude request bodies).

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("request incomplete")]
    Incomplete,
    #[error("malformed request line")]
    InvalidFormat,
}

pub struct ParsedRequest<'a> {
    pub path: &'a str,
    pub consumed: usize,
}

/// Scan `buf[scanned_from..]` for the end of headers (`\r\n\r\n`), resuming
/// from `scanned_from` so a byte-at-a-time client (SPEC_FULL §8 scenario 5)
/// doesn't cause a quadratic rescan of the whole receive buffer on every
/// single-byte receive. Returns the offset of the byte just past the
/// terminator, if found.
pub fn find_headers_end(buf: &[u8], scanned_from: usize) -> Option<usize> {
    const TERMINATOR: &[u8; 4] = b"\r\n\r\n";
    if buf.len() < TERMINATOR.len() {
        return None;
    }
    let start = scanned_from.saturating_sub(TERMINATOR.len() - 1);
    buf[start..]
        .windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
        .map(|rel| start + rel + TERMINATOR.len())
}

/// Parse the request line out of `buf`, which must already contain a full
/// `\r\n\r\n`-terminated header block (the driver only invokes this once
/// `find_headers_end` has fired — see `state_machine::Receiving`).
///
/// Returns the path and the number of bytes consumed. Per §4.3: if the
/// parser would consume fewer bytes than supplied, or can't find a path at
/// all, the caller must treat this as a parse failure (→ 404), not retry.
pub fn parse_request(buf: &[u8]) -> Result<ParsedRequest<'_>, ParseError> {
    let line_end = find_crlf(buf, 0).ok_or(ParseError::Incomplete)?;
    let line = &buf[..line_end];

    let mut parts = line.split(|&b| b == b' ').filter(|s| !s.is_empty());
    let _method = parts.next().ok_or(ParseError::InvalidFormat)?;
    let path_bytes = parts.next().ok_or(ParseError::InvalidFormat)?;
    let _version = parts.next().ok_or(ParseError::InvalidFormat)?;

    let path = std::str::from_utf8(path_bytes).map_err(|_| ParseError::InvalidFormat)?;
    if !path.starts_with('/') {
        return Err(ParseError::InvalidFormat);
    }

    let headers_end =
        find_headers_end(buf, 0).ok_or(ParseError::Incomplete)?;

    Ok(ParsedRequest {
        path,
        consumed: headers_end,
    })
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|rel| from + rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_get() {
        let req = b"GET /static/hello.html HTTP/1.0\r\nHost: x\r\n\r\n";
        let parsed = parse_request(req).unwrap();
        assert_eq!(parsed.path, "/static/hello.html");
        assert_eq!(parsed.consumed, req.len());
    }

    #[test]
    fn incomplete_without_terminator() {
        let req = b"GET /static/hello.html HTTP/1.0\r\nHost: x\r\n";
        assert!(matches!(parse_request(req), Err(ParseError::Incomplete)));
    }

    #[test]
    fn find_headers_end_incremental_matches_full_scan() {
        let full = b"GET / HTTP/1.0\r\n\r\n";
        let full_pos = find_headers_end(full, 0);
        // Feed it one byte at a time, re-scanning only from the previous
        // high-water mark, and check we land on the same answer once the
        // terminator has fully arrived.
        let mut scanned = 0;
        let mut found = None;
        for i in 1..=full.len() {
            found = find_headers_end(&full[..i], scanned);
            scanned = i;
            if found.is_some() {
                break;
            }
        }
        assert_eq!(found, full_pos);
    }

    #[test]
    fn rejects_path_missing_leading_slash() {
        let req = b"GET static/hello.html HTTP/1.0\r\n\r\n";
        assert!(matches!(parse_request(req), Err(ParseError::InvalidFormat)));
    }
}
