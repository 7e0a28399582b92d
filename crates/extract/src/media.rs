use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// Browsers and screenshot tools disagree on padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const DEFAULT_MIME: &str = "image/png";

/// Image ready to be sent as an inline part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Canonical padded base64.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("image payload is empty")]
    Empty,
    #[error("data URL is not base64 encoded")]
    NotBase64DataUrl,
    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Decode an uploaded image given as raw base64 or a `data:` URL.
pub fn decode_image(payload: &str, max_bytes: usize) -> Result<InlineImage, MediaError> {
    let payload = payload.trim();
    let (declared_mime, body) = split_data_url(payload)?;

    let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if body.is_empty() {
        return Err(MediaError::Empty);
    }

    let bytes = LENIENT
        .decode(body.as_bytes())
        .map_err(|e| MediaError::InvalidBase64(e.to_string()))?;

    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(MediaError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let mime_type = sniff_mime(&bytes)
        .or(declared_mime)
        .unwrap_or(DEFAULT_MIME)
        .to_string();

    Ok(InlineImage {
        mime_type,
        data: STANDARD.encode(&bytes),
    })
}

/// Returns the declared MIME type (if any) and the base64 body.
fn split_data_url(payload: &str) -> Result<(Option<&str>, &str), MediaError> {
    let Some(rest) = payload.strip_prefix("data:") else {
        return Ok((None, payload));
    };

    let (header, body) = rest.split_once(',').ok_or(MediaError::NotBase64DataUrl)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(MediaError::NotBase64DataUrl)?;

    let mime = if mime.starts_with("image/") { Some(mime) } else { None };
    Ok((mime, body))
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
