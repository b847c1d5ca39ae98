//! Utility functions for logging, JSON error classification, and file system checks.

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the nearest char boundary at or below `max`
/// bytes, with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the completion response is cut off (e.g., due to token limits), the
/// resulting JSON fails to parse with an EOF error. Used to trigger the
/// single re-ask in the filter pipeline.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_cut_inside_multibyte_char() {
        // Byte 300 lands inside the two-byte 'é'; the cut must back up to
        // the previous char boundary instead of panicking.
        let s = format!("{}é", "a".repeat(299));
        let result = truncate_for_log(&s, 300);
        assert!(result.starts_with(&"a".repeat(299)));
        assert!(result.contains("(+2 bytes)"));
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"[{"ticker": "AAPL"#; // Missing closing braces
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_eof);
        if let Err(e) = result {
            assert!(looks_truncated(&e));
        }
    }

    #[test]
    fn test_looks_truncated_rejects_syntax_errors() {
        let bad = "not json at all";
        let result: Result<serde_json::Value, _> = serde_json::from_str(bad);
        let e = result.unwrap_err();
        assert!(!looks_truncated(&e));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable_dir(nested.to_str().unwrap()).await.unwrap();
        assert!(nested.exists());
    }
}
