//! Media conversion through an external transcoder (ffmpeg).
//!
//! The upload is written to a scratch file, the transcoder is invoked as
//! `<ffmpeg> -i <input> <output> -y`, and the result is read back into memory.
//! Scratch files are removed whether or not the conversion succeeds.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use uuid::Uuid;

use crate::error::AppError;

pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3";

/// Converted media ready to return to the caller.
#[derive(Debug)]
pub struct ConvertedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Converter {
    ffmpeg_path: PathBuf,
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl Converter {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        upload_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create the scratch directories if they do not exist.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await
    }

    /// Convert `data` (uploaded as `filename`) to `output_format`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: unsupported output format
    /// - `ConversionFailed`: transcoder missing or exited non-zero
    /// - `Io`: scratch files could not be written or read
    pub async fn convert(
        &self,
        filename: &str,
        data: &[u8],
        output_format: &str,
    ) -> Result<ConvertedFile, AppError> {
        validate_output_format(output_format)?;
        self.ensure_dirs().await?;

        let file_id = Uuid::new_v4();
        let filename = sanitize_filename(filename);
        let stem = Path::new(&filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");

        let input_path = self.upload_dir.join(format!("{file_id}_{filename}"));
        let output_name = format!("{stem}_{file_id}.{output_format}");
        let output_path = self.output_dir.join(&output_name);

        tokio::fs::write(&input_path, data).await?;
        tracing::info!(filename = %filename, input = %input_path.display(), "Received file");

        let result = self.transcode(&input_path, &output_path).await;

        remove_scratch(&input_path).await;
        if let Err(e) = result {
            remove_scratch(&output_path).await;
            return Err(e);
        }

        let bytes = tokio::fs::read(&output_path).await;
        remove_scratch(&output_path).await;

        tracing::info!(filename = %filename, output_format, "Converted file");
        Ok(ConvertedFile {
            filename: output_name,
            bytes: bytes?,
        })
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), AppError> {
        let outcome = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .arg(output)
            .arg("-y")
            .output()
            .await
            .map_err(|e| {
                AppError::ConversionFailed(format!(
                    "could not run {}: {e}",
                    self.ffmpeg_path.display()
                ))
            })?;

        if !outcome.status.success() {
            let stderr = String::from_utf8_lossy(&outcome.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(AppError::ConversionFailed(format!(
                "{} exited with {}: {tail}",
                self.ffmpeg_path.display(),
                outcome.status
            )));
        }

        Ok(())
    }
}

async fn remove_scratch(path: &Path) {
    if tokio::fs::remove_file(path).await.is_ok() {
        tracing::debug!(path = %path.display(), "Deleted temp file");
    }
}

/// Accept short alphanumeric extensions only (`mp3`, `wav`, `mp4`...).
pub fn validate_output_format(format: &str) -> Result<(), AppError> {
    if format.is_empty() || format.len() > 10 || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidRequest(format!(
            "Unsupported output format '{format}'"
        )));
    }
    Ok(())
}

/// Strip any directory components a client may have put in the filename.
pub fn sanitize_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("upload")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_converter(ffmpeg: &str) -> (Converter, PathBuf) {
        let root = std::env::temp_dir().join(format!("mcg-convert-{}", Uuid::new_v4()));
        (
            Converter::new(ffmpeg, root.join("uploads"), root.join("converted")),
            root,
        )
    }

    #[test]
    fn output_format_must_be_short_alphanumeric() {
        assert!(validate_output_format("mp3").is_ok());
        assert!(validate_output_format("").is_err());
        assert!(validate_output_format("../etc").is_err());
        assert!(validate_output_format("averyverylongext").is_err());
    }

    #[test]
    fn filenames_lose_directory_components() {
        assert_eq!(sanitize_filename("song.wav"), "song.wav");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[tokio::test]
    async fn failing_transcoder_reports_conversion_failed_and_cleans_up() {
        let (converter, root) = scratch_converter("false");

        let err = converter.convert("clip.wav", b"RIFF", "mp3").await.unwrap_err();
        assert!(matches!(err, AppError::ConversionFailed(_)));

        let leftovers = std::fs::read_dir(root.join("uploads")).unwrap().count();
        assert_eq!(leftovers, 0);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_transcoder_reports_conversion_failed() {
        let (converter, root) = scratch_converter("/nonexistent/ffmpeg-binary");

        let err = converter.convert("clip.wav", b"RIFF", "mp3").await.unwrap_err();
        assert!(matches!(err, AppError::ConversionFailed(_)));
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn bad_format_is_rejected_before_touching_disk() {
        let (converter, root) = scratch_converter("false");

        let err = converter.convert("clip.wav", b"RIFF", "m p3").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(!root.exists());
    }
}
