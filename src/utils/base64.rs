//! Base64 as produced by `System.Convert.ToBase64String`.
//!
//! Virtualized method stubs carry their stream position as Base64 text; this is
//! the only place the engine needs it, so a small local codec is used.

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn sextet(c: u8) -> Option<u32> {
    let value = match c {
        b'A'..=b'Z' => c - b'A',
        b'a'..=b'z' => c - b'a' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(u32::from(value))
}

/// Encodes binary data to padded Base64.
///
/// # Examples
///
/// ```rust
/// use eazdevirt::utils::base64_encode;
///
/// assert_eq!(base64_encode(b"Hello"), "SGVsbG8=");
/// ```
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let n = chunk
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, b)| acc | u32::from(*b) << (16 - 8 * i));
        for i in 0..4 {
            if i <= chunk.len() {
                out.push(char::from(ALPHABET[(n >> (18 - 6 * i) & 0x3F) as usize]));
            } else {
                out.push('=');
            }
        }
    }
    out
}

/// Decodes padded Base64, ignoring surrounding whitespace and line breaks.
///
/// Returns `None` for characters outside the alphabet, misplaced padding, or a
/// length that is not a multiple of four.
///
/// # Examples
///
/// ```rust
/// use eazdevirt::utils::base64_decode;
///
/// assert_eq!(base64_decode("SGVsbG8="), Some(b"Hello".to_vec()));
/// assert_eq!(base64_decode("SGVsbG8"), None);
/// ```
#[must_use]
pub fn base64_decode(s: &str) -> Option<Vec<u8>> {
    let bytes: Vec<u8> = s
        .trim()
        .bytes()
        .filter(|&b| b != b'\n' && b != b'\r')
        .collect();
    if bytes.len() % 4 != 0 {
        return None;
    }

    let mut out = Vec::with_capacity(bytes.len() / 4 * 3);
    let quads = bytes.len() / 4;
    for (index, quad) in bytes.chunks(4).enumerate() {
        let padding = quad.iter().rev().take_while(|&&b| b == b'=').count();
        if padding > 2 || (padding > 0 && index + 1 != quads) {
            return None;
        }

        let mut n = 0u32;
        for (i, &c) in quad[..4 - padding].iter().enumerate() {
            n |= sextet(c)? << (18 - 6 * i);
        }

        #[allow(clippy::cast_possible_truncation)]
        out.extend(
            [(n >> 16) as u8, (n >> 8) as u8, n as u8]
                .into_iter()
                .take(3 - padding),
        );
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_known_values() {
        assert_eq!(base64_encode(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(base64_encode(b""), "");
        assert_eq!(
            base64_decode("SGVsbG8sIFdvcmxkIQ=="),
            Some(b"Hello, World!".to_vec())
        );
        assert_eq!(base64_decode(""), Some(Vec::new()));
    }

    #[test]
    fn test_base64_eight_byte_keys() {
        let key = [0x10, 0x00, 0x00, 0x00, 0xEF, 0xBE, 0xAD, 0xDE];
        let encoded = base64_encode(&key);
        assert_eq!(encoded.len(), 12);
        assert_eq!(base64_decode(&encoded), Some(key.to_vec()));
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert_eq!(base64_decode("SGVs!G8="), None);
        assert_eq!(base64_decode("SG=sbG8="), None);
        assert_eq!(base64_decode("SGVs===="), None);
        assert_eq!(base64_decode("SGU=SGVs"), None);
    }
}
