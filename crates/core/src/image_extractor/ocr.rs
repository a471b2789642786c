use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::Command;

const OCR_TIMEOUT_SECS: u64 = 30;

/// Invokes the external `tesseract` binary (§6). Once the binary is found
/// to be missing (`ENOENT`), OCR disables itself for the remainder of the
/// process lifetime rather than retrying on every image.
pub struct OcrRunner {
    language: String,
    disabled: Arc<AtomicBool>,
}

impl OcrRunner {
    pub fn new(language: String) -> Self {
        Self {
            language,
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs OCR on raw image bytes via a temp file, returning extracted
    /// text or `None` on any failure (OCR failure is non-fatal — §4.3, §7).
    pub async fn run_on_bytes(&self, image_bytes: &[u8]) -> Option<String> {
        if self.disabled.load(Ordering::Relaxed) {
            return None;
        }

        let temp_dir = std::env::temp_dir();
        let in_path = temp_dir.join(format!("docgraph-ocr-{}.png", uuid::Uuid::new_v4()));
        let out_base = temp_dir.join(format!("docgraph-ocr-{}", uuid::Uuid::new_v4()));

        if std::fs::File::create(&in_path)
            .and_then(|mut f| f.write_all(image_bytes))
            .is_err()
        {
            return None;
        }

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(OCR_TIMEOUT_SECS),
            Command::new("tesseract")
                .arg(&in_path)
                .arg(&out_base)
                .arg("-l")
                .arg(&self.language)
                .arg("--dpi")
                .arg("150")
                .output(),
        )
        .await;

        let _ = std::fs::remove_file(&in_path);

        let text = match result {
            Ok(Ok(output)) if output.status.success() => {
                let txt_path = out_base.with_extension("txt");
                std::fs::read_to_string(&txt_path).ok()
            }
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    tracing::warn!("tesseract binary not found; disabling OCR for this process");
                    self.disabled.store(true, Ordering::Relaxed);
                }
                None
            }
            Err(_) => {
                tracing::warn!("OCR subprocess timed out after {OCR_TIMEOUT_SECS}s");
                None
            }
        };

        let _ = std::fs::remove_file(out_base.with_extension("txt"));
        text
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }
}
