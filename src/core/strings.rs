//! Pascal-string and C-string helpers for payload parsing.

/// Number of bytes before the first NUL (or the whole slice).
#[inline]
pub fn c_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

/// Read one length-prefixed string, returning it and the unread remainder.
///
/// A length byte that overruns the buffer yields whatever bytes are left.
pub fn read_pascal_string(input: &[u8]) -> (Vec<u8>, &[u8]) {
    match input.split_first() {
        None => (Vec::new(), input),
        Some((&len, rest)) => {
            let len = usize::from(len).min(rest.len());
            let (value, rest) = rest.split_at(len);
            (value.to_vec(), rest)
        }
    }
}

/// Append `value` as a pascal string, truncated to 255 bytes.
pub fn write_pascal_string(out: &mut Vec<u8>, value: &[u8]) {
    let len = value.len().min(usize::from(u8::MAX));
    out.push(len as u8);
    out.extend_from_slice(&value[..len]);
}

/// Lossy text view of a raw byte field.
pub fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
