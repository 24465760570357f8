//! Screen capture through an external command

use crate::error::{Error, Result};
use std::process::{Command, Stdio};

/// Run `command` and return the image it writes to stdout
pub fn capture(command: &[String]) -> Result<Vec<u8>> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| Error::Tool("no screenshot command configured".to_string()))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Tool(format!("screenshot command '{}' failed to start: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Tool(format!(
            "screenshot command exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    if output.stdout.is_empty() {
        return Err(Error::Tool("screenshot command produced no image".to_string()));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_empty_command() {
        assert_eq!(capture(&[]).unwrap_err().code(), "ToolError");
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_stdout() {
        let bytes = capture(&argv(&["sh", "-c", "printf 'PNGDATA'"])).unwrap();
        assert_eq!(bytes, b"PNGDATA");
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_failures() {
        let err = capture(&argv(&["sh", "-c", "echo 'no display' >&2; exit 1"])).unwrap_err();
        assert!(err.to_string().contains("no display"));

        let err = capture(&argv(&["sh", "-c", "true"])).unwrap_err();
        assert!(err.to_string().contains("no image"));

        let err = capture(&argv(&["pocketclaw-no-such-capture-tool"])).unwrap_err();
        assert_eq!(err.code(), "ToolError");
    }
}
