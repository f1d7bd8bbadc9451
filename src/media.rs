//! Pasted image sniffing and data-URL encoding.

use crate::error::{Result, StoreError};

/// Detect an image MIME type from magic bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, ..] => Some("image/png"),
        [0xff, 0xd8, 0xff, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [b'B', b'M', ..] => Some("image/bmp"),
        _ => None,
    }
}

/// Encode pasted bytes as a `data:` URL.
///
/// The sniffed type wins; a declared `image/*` type is the fallback for
/// formats the sniffer does not know. Anything else is rejected.
pub fn encode_data_url(bytes: &[u8], declared: Option<&str>) -> Result<String> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    if bytes.is_empty() {
        return Err(StoreError::UnsupportedMedia("empty paste".into()));
    }

    let mime = match sniff_image_mime(bytes) {
        Some(mime) => mime.to_string(),
        None => match declared.map(str::trim) {
            Some(d) if d.starts_with("image/") && d.len() > "image/".len() => d.to_string(),
            Some(d) => return Err(StoreError::UnsupportedMedia(format!("not an image: {d}"))),
            None => return Err(StoreError::UnsupportedMedia("unrecognized image data".into())),
        },
    };

    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

/// MIME type of a `data:` URL, if it has one.
pub fn data_url_mime(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("data:")?;
    let end = rest.find([';', ','])?;
    Some(&rest[..end]).filter(|m| !m.is_empty())
}
