//! External-process decoder.
//!
//! Runs a command-line QR reader (ZXing's `CommandLineRunner` by default)
//! with the staged file as its last argument and scrapes the decoded text
//! from standard output.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::DecoderConfig;
use crate::decode::{DecodeError, Decoder};

#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    args: Vec<String>,
    result_marker: String,
    timeout: Duration,
}

impl CommandDecoder {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        result_marker: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            result_marker: result_marker.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.result_marker.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl Decoder for CommandDecoder {
    async fn decode(&self, payload: &Path) -> Result<Option<String>, DecodeError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(DecodeError::Spawn)?,
            Err(_) => return Err(DecodeError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            tracing::debug!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Decoder exited unsuccessfully"
            );
        }

        Ok(extract_result(
            &String::from_utf8_lossy(&output.stdout),
            &self.result_marker,
        ))
    }
}

/// Text after `marker`, on the same line or, when that is empty, the next one.
pub fn extract_result(output: &str, marker: &str) -> Option<String> {
    let start = output.find(marker)? + marker.len();
    let line = output[start..].trim_start().lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZXING_OUTPUT: &str = "file:///tmp/qr.png (format: QR_CODE, type: URI):\n\
        Raw result:\n\
        https://example.com/a\n\
        Parsed result:\n\
        https://example.com/a\n\
        Found 4 result points.\n";

    #[test]
    fn extracts_result_on_next_line() {
        assert_eq!(
            extract_result(ZXING_OUTPUT, "Parsed result:"),
            Some("https://example.com/a".to_string())
        );
    }

    #[test]
    fn extracts_result_on_same_line() {
        assert_eq!(
            extract_result("Parsed result: hello world\n", "Parsed result:"),
            Some("hello world".to_string())
        );
    }

    #[test]
    fn missing_marker_is_no_result() {
        assert_eq!(extract_result("No barcode found\n", "Parsed result:"), None);
        assert_eq!(extract_result("Parsed result:\n\n", "Parsed result:"), None);
    }

    #[cfg(unix)]
    fn shell(script: &str, timeout: Duration) -> CommandDecoder {
        CommandDecoder::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "decoder".to_string()],
            "Parsed result:",
            timeout,
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn payload_path_is_passed_as_last_argument() {
        let decoder = shell(r#"printf 'Parsed result:\n%s\n' "$1""#, Duration::from_secs(5));
        let decoded = decoder.decode(Path::new("/tmp/some-payload.img")).await.unwrap();
        assert_eq!(decoded.as_deref(), Some("/tmp/some-payload.img"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_yields_no_result() {
        let decoder = shell("echo 'No barcode found' >&2; exit 1", Duration::from_secs(5));
        assert_eq!(decoder.decode(Path::new("/tmp/x")).await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let decoder = shell("sleep 5", Duration::from_millis(100));
        assert!(matches!(
            decoder.decode(Path::new("/tmp/x")).await,
            Err(DecodeError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let decoder = CommandDecoder::new(
            "qr-gateway-no-such-decoder",
            Vec::new(),
            "Parsed result:",
            Duration::from_secs(1),
        );
        assert!(matches!(
            decoder.decode(Path::new("/tmp/x")).await,
            Err(DecodeError::Spawn(_))
        ));
    }
}
