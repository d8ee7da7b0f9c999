//! Response builder (SPEC_FULL §4.5).
//!
//! Grounded on `aws.c::connection_prepare_send_reply_header` /
//! `_send_404`, translated line-for-line into the header set the spec
//! fixes, with `httpdate` (already a `chopin` dependency) supplying RFC
//! 1123 date formatting instead of `strftime`.

use std::io::Write;
use std::time::SystemTime;

const SERVER_TOKEN: &str = "reactor-httpd";

/// Write the `200 OK` header into `out`, returning the number of bytes
/// written. Panics if `out` is too small — per §4.5, "buffer overflow is a
/// programming error (header fits within B)"; `--buffer-size` validation in
/// `config` exists specifically so this can never fire in production.
pub fn build_200_header(out: &mut [u8], file_size: u64, last_modified: SystemTime) -> usize {
    let now = httpdate::fmt_http_date(SystemTime::now());
    let modified = httpdate::fmt_http_date(last_modified);

    let mut cursor = std::io::Cursor::new(out);
    write!(
        cursor,
        "HTTP/1.1 200 OK\r\n\
         Date: {now}\r\n\
         Server: {SERVER_TOKEN}\r\n\
         Last-Modified: {modified}\r\n\
         Accept-Ranges: bytes\r\n\
         Vary: Accept-Encoding\r\n\
         Connection: close\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {file_size}\r\n\r\n"
    )
    .expect("response header must fit the connection's send buffer");
    cursor.position() as usize
}

/// Write the `404 Not Found` header into `out` (no body).
pub fn build_404_header(out: &mut [u8]) -> usize {
    const HEADER: &[u8] = b"HTTP/1.1 404 Not Found\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\r\n";
    out[..HEADER.len()].copy_from_slice(HEADER);
    HEADER.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_200_contains_required_fields() {
        let mut buf = [0u8; 512];
        let n = build_200_header(&mut buf, 12, SystemTime::UNIX_EPOCH);
        let text = std::str::from_utf8(&buf[..n]).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 12\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn header_404_has_no_body() {
        let mut buf = [0u8; 128];
        let n = build_404_header(&mut buf);
        let text = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
