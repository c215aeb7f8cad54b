//! Incremental Line Framing
//!
//! TCP is a stream protocol: a single read may carry half a command, or
//! several commands at once. The framer works against whatever bytes have
//! accumulated so far and reports either a complete line or "need more
//! data", letting the caller resume after the next read.
//!
//! ## Terminators
//!
//! A line ends at the first CR or LF. When the terminator is CR and the
//! very next byte is LF, both are consumed so that CRLF counts as a single
//! terminator. A bare CR at the end of the buffer terminates the line on
//! its own; if an LF then arrives with the next read it produces an empty
//! line, which the connection handler ignores.
//!
//! There is no terminator requirement for the last line of a stream: when
//! the peer closes the connection, the caller flushes any remaining
//! buffered bytes as a final line.

/// Splits one line off the front of `buf`.
///
/// Returns the line (without its terminator) and the number of bytes
/// consumed including the terminator, or `None` if no terminator has
/// arrived yet and the caller must read more data first.
pub fn split_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let pos = buf.iter().position(|&b| b == b'\r' || b == b'\n')?;

    let mut consumed = pos + 1;
    if buf[pos] == b'\r' && buf.get(consumed) == Some(&b'\n') {
        consumed += 1;
    }

    Some((&buf[..pos], consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lf_terminated() {
        let (line, consumed) = split_line(b"GET k\n").unwrap();
        assert_eq!(line, b"GET k");
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_cr_terminated() {
        let (line, consumed) = split_line(b"GET k\r").unwrap();
        assert_eq!(line, b"GET k");
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_crlf_terminated() {
        let (line, consumed) = split_line(b"GET k\r\n").unwrap();
        assert_eq!(line, b"GET k");
        assert_eq!(consumed, 7);
    }

    #[test]
    fn test_all_terminators_yield_identical_lines() {
        let lf = split_line(b"GET k\n").unwrap().0;
        let cr = split_line(b"GET k\r").unwrap().0;
        let crlf = split_line(b"GET k\r\n").unwrap().0;
        assert_eq!(lf, cr);
        assert_eq!(cr, crlf);
    }

    #[test]
    fn test_no_terminator_is_incomplete() {
        assert!(split_line(b"GET k").is_none());
        assert!(split_line(b"").is_none());
    }

    #[test]
    fn test_consumes_only_first_line() {
        let buf = b"SET a 1\nGET a\n";
        let (line, consumed) = split_line(buf).unwrap();
        assert_eq!(line, b"SET a 1");

        let (line, rest_consumed) = split_line(&buf[consumed..]).unwrap();
        assert_eq!(line, b"GET a");
        assert_eq!(consumed + rest_consumed, buf.len());
    }

    #[test]
    fn test_crlf_split_across_reads() {
        // The CR arrives first; the line is complete without waiting.
        let (line, consumed) = split_line(b"GET k\r").unwrap();
        assert_eq!(line, b"GET k");
        assert_eq!(consumed, 6);

        // The LF from the next read forms an empty line on its own.
        let (line, consumed) = split_line(b"\nGET j\n").unwrap();
        assert_eq!(line, b"");
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_empty_line() {
        let (line, consumed) = split_line(b"\r\n").unwrap();
        assert_eq!(line, b"");
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_terminator_mid_buffer() {
        let (line, consumed) = split_line(b"DEL a\rrest").unwrap();
        assert_eq!(line, b"DEL a");
        assert_eq!(consumed, 6);
    }
}
