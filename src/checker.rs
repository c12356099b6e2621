//! Output normalizer and comparator
//!
//! Comparison is byte-exact after one normalization: line endings are unified
//! to LF and leading/trailing whitespace of the whole output is dropped.
//! Interior whitespace is significant.

/// Canonical form of a program's output
pub fn normalize(output: &[u8]) -> Vec<u8> {
    let mut unified = Vec::with_capacity(output.len());
    let mut bytes = output.iter().peekable();
    while let Some(&b) = bytes.next() {
        if b == b'\r' {
            // CRLF collapses to a single LF, a lone CR becomes LF
            if bytes.peek() == Some(&&b'\n') {
                bytes.next();
            }
            unified.push(b'\n');
        } else {
            unified.push(b);
        }
    }
    unified.trim_ascii().to_vec()
}

/// Whether `actual` matches `expected` after normalization
pub fn compare(actual: &[u8], expected: &[u8]) -> bool {
    normalize(actual) == normalize(expected)
}
