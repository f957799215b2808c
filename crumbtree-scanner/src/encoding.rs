//! Turn response bytes into text before any parsing happens.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1251, WINDOWS_1252};
use std::borrow::Cow;
use tracing::debug;

/// How far into the document to look for a `<meta charset>` declaration.
const META_SNIFF_BYTES: usize = 2048;

/// Codepages tried, in order, when the body is not UTF-8 and no declared
/// charset decodes it cleanly.
fn fallback_chain() -> [&'static Encoding; 2] {
    [WINDOWS_1251, WINDOWS_1252]
}

/// Decode a response body.
///
/// Valid UTF-8 wins outright. Otherwise the charset from the `Content-Type`
/// header or a `<meta>` tag is tried, then the fallback chain, and finally a
/// lossy UTF-8 decode so callers always get a string.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let declared = content_type
        .and_then(charset_from_content_type)
        .or_else(|| sniff_meta_charset(bytes));

    if let Some(encoding) = declared.filter(|e| *e != UTF_8)
        && let Some(text) = strict_decode(encoding, bytes)
    {
        return text;
    }

    for encoding in fallback_chain() {
        if let Some(text) = strict_decode(encoding, bytes) {
            debug!("Decoded body through fallback codepage {}", encoding.name());
            return text;
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}

fn strict_decode(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| Encoding::for_label(value.trim().trim_matches('"').as_bytes()))
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    Encoding::for_label(label.as_bytes())
}
