use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::errors::SinanResult;

/// Encoded screen capture as returned by a device (PNG on Android, JPEG on HarmonyOS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub image_bytes: Vec<u8>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl Screenshot {
    pub fn new(image_bytes: Vec<u8>) -> Self {
        Self {
            image_bytes,
            captured_at: chrono::Utc::now(),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.image_bytes)
    }

    pub fn extension(&self) -> &'static str {
        match image::guess_format(&self.image_bytes) {
            Ok(image::ImageFormat::Jpeg) => "jpeg",
            Ok(image::ImageFormat::WebP) => "webp",
            _ => "png",
        }
    }

    /// Writes `fail_step{step}_{target}.{ext}` under `dir` for post-mortem inspection.
    pub fn save_diagnostic(&self, dir: &Path, step: usize, target: &str) -> SinanResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "fail_step{step}_{}.{}",
            sanitize_file_stem(target),
            self.extension()
        ));
        std::fs::write(&path, &self.image_bytes)?;
        tracing::info!(path = %path.display(), "diagnostic screenshot saved");
        Ok(path)
    }
}

fn sanitize_file_stem(raw: &str) -> String {
    let stem: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .take(48)
        .collect();
    if stem.is_empty() {
        "target".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_file_name_is_filesystem_safe() {
        let dir = tempfile::tempdir().unwrap();
        let shot = Screenshot::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F']);
        let path = shot.save_diagnostic(dir.path(), 3, "加入/购物车 now").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "fail_step3_加入_购物车_now.jpeg"
        );
        assert_eq!(std::fs::read(&path).unwrap(), shot.image_bytes);
    }

    #[test]
    fn base64_round_trips_bytes() {
        let shot = Screenshot::new(b"png".to_vec());
        assert_eq!(shot.to_base64(), "cG5n");
        assert_eq!(shot.extension(), "png");
    }
}
