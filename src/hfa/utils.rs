//! Low-level text helpers shared by the cursor and the record decoder.

use encoding_rs::Encoding;

/// Resolves an encoding label (`"latin1"`, `"utf-8"`, `"GBK"`, ...).
pub fn parse_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Decodes an 8-bit string field, stopping at the first NUL.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (text, _) = encoding.decode_without_bom_handling(&bytes[..end]);
    text.into_owned()
}

/// Up to `max` bytes of `bytes` starting at `pos`, decoded for error messages.
pub fn fragment(bytes: &[u8], pos: usize, max: usize, encoding: &'static Encoding) -> String {
    let start = pos.min(bytes.len());
    let end = start.saturating_add(max).min(bytes.len());
    decode_text(&bytes[start..end], encoding)
}
