//! OCR text extraction from post images.
//!
//! Post image references come in two shapes: an http(s) URL (the common case
//! for Reddit image posts) or an inline base64 payload. Either way the image
//! is normalized to a fixed-size RGB PNG before being handed to Tesseract,
//! which is invoked as a subprocess (`tesseract <file> stdout -l eng`). The
//! binary can be overridden with the `TESSERACT_CMD` environment variable.
//!
//! Every failure mode here degrades to an empty string with a log line; a bad
//! image never fails the batch.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use image::imageops::FilterType;
use rand::{Rng, rng};
use std::io::Cursor;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Width and height the image is resized to before OCR, matching what the
/// ticker matching downstream was tuned against.
const TARGET_SIZE: (u32, u32) = (800, 800);

/// Extract text from an image reference (URL or base64 payload).
///
/// Returns an empty string when there is no usable image or OCR fails.
#[instrument(level = "debug", skip_all)]
pub async fn extract_text_from_image(image_ref: &str) -> String {
    let image_ref = image_ref.trim();
    if image_ref.is_empty() {
        debug!("No image data provided");
        return String::new();
    }

    let bytes = match fetch_or_decode(image_ref).await {
        Some(bytes) => bytes,
        None => return String::new(),
    };

    let png = match normalize_for_ocr(&bytes) {
        Ok(png) => png,
        Err(e) => {
            warn!(error = %e, "Failed to decode image; skipping OCR");
            return String::new();
        }
    };

    let temp_path = std::env::temp_dir().join(format!(
        "ticker_trawler_ocr_{}_{:016x}.png",
        std::process::id(),
        rng().random::<u64>()
    ));
    if let Err(e) = tokio::fs::write(&temp_path, &png).await {
        warn!(error = %e, "Failed to write OCR temp file");
        return String::new();
    }

    let text = run_tesseract(&temp_path).await.unwrap_or_default();
    let _ = tokio::fs::remove_file(&temp_path).await;
    text
}

/// Resolve an image reference to raw bytes.
///
/// http(s) references are downloaded; anything else is treated as a base64
/// payload with the padding repaired first.
async fn fetch_or_decode(image_ref: &str) -> Option<Vec<u8>> {
    if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
        match reqwest::get(image_ref).await {
            Ok(resp) => match resp.bytes().await {
                Ok(bytes) => Some(bytes.to_vec()),
                Err(e) => {
                    warn!(url = %image_ref, error = %e, "Failed to read image body");
                    None
                }
            },
            Err(e) => {
                warn!(url = %image_ref, error = %e, "Failed to fetch image");
                None
            }
        }
    } else {
        match STANDARD.decode(fix_base64_padding(image_ref)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Base64 decoding error");
                None
            }
        }
    }
}

/// Strip whitespace and repair missing `=` padding so lenient payloads decode.
pub(crate) fn fix_base64_padding(data: &str) -> String {
    let mut cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let missing = cleaned.len() % 4;
    if missing != 0 {
        cleaned.extend(std::iter::repeat_n('=', 4 - missing));
    }
    cleaned
}

/// Decode an image and normalize it to a fixed-size RGB PNG.
pub(crate) fn normalize_for_ocr(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let resized = rgb.resize_exact(TARGET_SIZE.0, TARGET_SIZE.1, FilterType::Triangle);

    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Run the Tesseract binary against an image file.
async fn run_tesseract(image_path: &Path) -> Option<String> {
    let tesseract_cmd = std::env::var("TESSERACT_CMD").unwrap_or_else(|_| "tesseract".to_string());
    let output = Command::new(&tesseract_cmd)
        .arg(image_path.as_os_str())
        .arg("stdout")
        .arg("-l")
        .arg("eng")
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %stderr.trim(), "Tesseract failed");
            None
        }
        Err(e) => {
            warn!(cmd = %tesseract_cmd, error = %e, "Tesseract failed to start");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_base64_padding_adds_missing() {
        // "ab" needs two '=' to reach a multiple of four.
        assert_eq!(fix_base64_padding("ab"), "ab==");
        assert_eq!(fix_base64_padding("abc"), "abc=");
        assert_eq!(fix_base64_padding("abcd"), "abcd");
    }

    #[test]
    fn test_fix_base64_padding_strips_whitespace() {
        assert_eq!(fix_base64_padding("ab\ncd"), "abcd");
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([255, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_normalize_for_ocr_resizes_to_target() {
        let png = normalize_for_ocr(&tiny_png()).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), TARGET_SIZE.0);
        assert_eq!(decoded.height(), TARGET_SIZE.1);
    }

    #[test]
    fn test_normalize_for_ocr_rejects_garbage() {
        assert!(normalize_for_ocr(b"definitely not an image").is_err());
    }

    #[tokio::test]
    async fn test_extract_empty_reference_is_empty() {
        assert_eq!(extract_text_from_image("").await, "");
        assert_eq!(extract_text_from_image("   ").await, "");
    }

    #[tokio::test]
    async fn test_extract_invalid_base64_is_empty() {
        assert_eq!(extract_text_from_image("!!!not-base64!!!").await, "");
    }
}
