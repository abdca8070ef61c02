//! Lossless reassembly and integrity verification via an external media tool
//!
//! Segments are concatenated byte-wise into one intermediate transport stream,
//! then stream-copy remuxed into the final MP4 (no re-encode). Verification is
//! a full decode-check of the output: the tool reads every frame and any error
//! output fails the file.

use crate::config::ToolsConfig;
use crate::error::{AssemblyError, Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// External media tool operations the assembler depends on
///
/// Implemented by [`FfmpegTool`] for production; alternative implementations
/// can be injected for environments without ffmpeg.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Stream-copy remux `input` into the container format implied by `output`
    async fn remux(&self, input: &Path, output: &Path) -> Result<()>;

    /// Decode-check `file`, failing if any frame cannot be read cleanly
    async fn verify(&self, file: &Path) -> Result<()>;

    /// Short identifier for logs
    fn name(&self) -> &'static str;
}

/// [`MediaTool`] backed by the external `ffmpeg` binary
#[derive(Debug)]
pub struct FfmpegTool {
    binary_path: PathBuf,
    timeout: Duration,
}

impl FfmpegTool {
    /// Create a tool with an explicit binary path
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Attempt to find `ffmpeg` in PATH
    pub fn from_path(timeout: Duration) -> Option<Self> {
        which::which("ffmpeg").ok().map(|p| Self::new(p, timeout))
    }

    /// Resolve the tool from configuration
    ///
    /// An explicit `ffmpeg_path` wins; otherwise PATH discovery runs when
    /// `search_path` is enabled. Failing both is a hard error because
    /// assembly and verification cannot proceed without the tool.
    pub fn from_config(config: &ToolsConfig) -> Result<Self> {
        if let Some(path) = &config.ffmpeg_path {
            return Ok(Self::new(path.clone(), config.tool_timeout));
        }
        if config.search_path
            && let Some(tool) = Self::from_path(config.tool_timeout)
        {
            return Ok(tool);
        }
        Err(Error::ExternalTool(
            "ffmpeg not found: set an explicit path or install it on PATH".to_string(),
        ))
    }

    async fn run(&self, args: &[&std::ffi::OsStr]) -> Result<std::process::Output> {
        let future = Command::new(&self.binary_path).args(args).output();
        match tokio::time::timeout(self.timeout, future).await {
            Ok(output) => output
                .map_err(|e| Error::ExternalTool(format!("Failed to execute ffmpeg: {e}"))),
            Err(_) => Err(Error::ExternalTool(format!(
                "ffmpeg timeout after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn remux(&self, input: &Path, output: &Path) -> Result<()> {
        use std::ffi::OsStr;
        let args = [
            OsStr::new("-y"),
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-c"),
            OsStr::new("copy"),
            output.as_os_str(),
        ];
        let result = self.run(&args).await?;
        if !result.status.success() {
            return Err(AssemblyError::RemuxFailed {
                output: output.to_path_buf(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn verify(&self, file: &Path) -> Result<()> {
        use std::ffi::OsStr;
        let args = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-i"),
            file.as_os_str(),
            OsStr::new("-f"),
            OsStr::new("null"),
            OsStr::new("-"),
        ];
        let result = self.run(&args).await?;
        // With `-v error`, any stderr output means decode problems even when
        // the exit code is zero
        if !result.status.success() || !result.stderr.is_empty() {
            tracing::warn!(
                file = %file.display(),
                stderr = %String::from_utf8_lossy(&result.stderr).trim(),
                "Decode-check failed"
            );
            return Err(Error::Verification {
                path: file.to_path_buf(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Concatenate segment files, in order, into one intermediate file
///
/// MPEG-TS segments are byte-concatenable. Every listed segment must exist;
/// a zero-byte result is rejected before it can reach the remux step.
pub async fn concat_segments(segment_paths: &[PathBuf], intermediate: &Path) -> Result<()> {
    let mut out = tokio::fs::File::create(intermediate).await?;
    let mut written: u64 = 0;

    for path in segment_paths {
        if !tokio::fs::try_exists(path).await? {
            return Err(AssemblyError::SegmentMissing { path: path.clone() }.into());
        }
        let bytes = tokio::fs::read(path).await?;
        written += bytes.len() as u64;
        out.write_all(&bytes).await?;
    }
    out.flush().await?;

    if written == 0 {
        return Err(AssemblyError::EmptyIntermediate {
            path: intermediate.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

/// Concat the segments and remux the result into the final output file
pub async fn assemble(
    tool: &dyn MediaTool,
    segment_paths: &[PathBuf],
    temp_dir: &Path,
    output: &Path,
) -> Result<()> {
    let intermediate = temp_dir.join("combined.ts");
    concat_segments(segment_paths, &intermediate).await?;

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    tracing::debug!(
        tool = tool.name(),
        output = %output.display(),
        segments = segment_paths.len(),
        "Remuxing intermediate stream"
    );
    tool.remux(&intermediate, output).await
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn from_config_prefers_explicit_path() {
        let config = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            search_path: true,
            ..ToolsConfig::default()
        };
        let tool = FfmpegTool::from_config(&config).unwrap();
        assert_eq!(tool.binary_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn from_config_without_path_or_search_is_an_error() {
        let config = ToolsConfig {
            ffmpeg_path: None,
            search_path: false,
            ..ToolsConfig::default()
        };
        let err = FfmpegTool::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::ExternalTool(_)));
    }

    #[test]
    fn from_path_agrees_with_which() {
        let found = which::which("ffmpeg").is_ok();
        assert_eq!(
            FfmpegTool::from_path(Duration::from_secs(1)).is_some(),
            found
        );
    }

    #[tokio::test]
    async fn remux_with_invalid_binary_is_external_tool_error() {
        let tool = FfmpegTool::new(
            PathBuf::from("/nonexistent/path/to/ffmpeg"),
            Duration::from_secs(5),
        );
        let err = tool
            .remux(Path::new("in.ts"), Path::new("out.mp4"))
            .await
            .unwrap_err();
        match err {
            Error::ExternalTool(msg) => assert!(msg.contains("Failed to execute ffmpeg")),
            other => panic!("expected ExternalTool error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concat_preserves_segment_order() {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for (i, data) in ["alpha-", "beta-", "gamma"].iter().enumerate() {
            let p = dir.path().join(format!("segment_{i:05}.ts"));
            std::fs::write(&p, data).unwrap();
            paths.push(p);
        }
        let out = dir.path().join("combined.ts");

        concat_segments(&paths, &out).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "alpha-beta-gamma");
    }

    #[tokio::test]
    async fn concat_fails_on_missing_segment() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("segment_00000.ts");
        std::fs::write(&present, "data").unwrap();
        let missing = dir.path().join("segment_00001.ts");
        let out = dir.path().join("combined.ts");

        let err = concat_segments(&[present, missing.clone()], &out)
            .await
            .unwrap_err();
        match err {
            Error::Assembly(AssemblyError::SegmentMissing { path }) => {
                assert_eq!(path, missing);
            }
            other => panic!("expected SegmentMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concat_rejects_zero_byte_result() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("segment_00000.ts");
        std::fs::write(&empty, "").unwrap();
        let out = dir.path().join("combined.ts");

        let err = concat_segments(&[empty], &out).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Assembly(AssemblyError::EmptyIntermediate { .. })
        ));
    }

    // Requires a real ffmpeg binary, so it only runs when explicitly asked
    #[tokio::test]
    #[ignore]
    async fn verify_rejects_garbage_file() {
        let tool = match FfmpegTool::from_path(Duration::from_secs(30)) {
            Some(t) => t,
            None => return,
        };
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.mp4");
        std::fs::write(&bogus, b"not a real mp4").unwrap();

        let err = tool.verify(&bogus).await.unwrap_err();
        assert!(matches!(err, Error::Verification { .. }));
    }
}
