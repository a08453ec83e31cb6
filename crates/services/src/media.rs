//! Data URLs and MIME detection for files sent to the capability endpoints.

use base64::Engine;
use image::ImageFormat;

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Lowercased extension without the dot.
pub fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// JPEG or PNG, sniffed from the bytes first and the extension second.
/// Anything else is not accepted for site photos.
pub fn image_mime(name: &str, bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => return Some("image/jpeg"),
        Ok(ImageFormat::Png) => return Some("image/png"),
        Ok(other) => {
            tracing::debug!(name, format = ?other, "unsupported image format");
            return None;
        }
        Err(_) => {}
    }
    match extension(name).as_deref() {
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("png") => Some("image/png"),
        _ => None,
    }
}

pub fn audio_mime(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "audio/mp4",
    }
}

/// MIME type implied by a document's extension.
pub fn document_mime(name: &str) -> Option<&'static str> {
    let mime = match extension(name)?.as_str() {
        "pdf" => "application/pdf",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        _ => return None,
    };
    Some(mime)
}
