//! Script execution seam
//!
//! Production code runs scripts through `osascript`; tests substitute a fake
//! runner so send paths can be exercised off macOS.

use std::process::Command;

use crate::error::IMessageError;

/// Why a script did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptFailure {
    /// The interpreter could not be started at all
    Spawn(String),
    /// The script ran and failed
    Exit { code: Option<i32>, stderr: String },
}

/// Runs an AppleScript source and returns its trimmed stdout
pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str) -> std::result::Result<String, ScriptFailure>;
}

/// Runs scripts with `osascript -e`
#[derive(Debug, Clone)]
pub struct OsascriptRunner {
    program: String,
}

impl OsascriptRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OsascriptRunner {
    fn default() -> Self {
        Self::new("osascript")
    }
}

impl ScriptRunner for OsascriptRunner {
    fn run(&self, script: &str) -> std::result::Result<String, ScriptFailure> {
        let output = Command::new(&self.program)
            .arg("-e")
            .arg(script)
            .output()
            .map_err(|e| ScriptFailure::Spawn(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(ScriptFailure::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Map a script failure onto the error taxonomy.
///
/// AppleScript reports errors as `... (-NNNN)` on stderr:
/// -1728 means the buddy or chat reference did not resolve, -600 the
/// application is not running, -1743 automation permission was denied.
pub fn classify_failure(failure: &ScriptFailure, target: &str) -> IMessageError {
    let stderr = match failure {
        ScriptFailure::Spawn(reason) => {
            return IMessageError::Unavailable(format!(
                "cannot run AppleScript ({}); sending requires macOS with osascript",
                reason
            ));
        }
        ScriptFailure::Exit { stderr, .. } => stderr,
    };

    let normalized = stderr.replace('\u{2019}', "'").to_lowercase();

    if normalized.contains("(-1728)")
        || normalized.contains("can't get buddy")
        || normalized.contains("can't get participant")
        || normalized.contains("can't get chat")
    {
        return IMessageError::InvalidArgument(format!(
            "Messages could not resolve destination {}: {}",
            target, stderr
        ));
    }

    if normalized.contains("(-600)")
        || normalized.contains("(-1743)")
        || normalized.contains("(-10810)")
        || normalized.contains("isn't running")
        || normalized.contains("not authorized")
    {
        return IMessageError::Unavailable(format!(
            "Messages.app is not reachable: {}",
            stderr
        ));
    }

    if stderr.is_empty() {
        IMessageError::Automation("Unknown AppleScript error".to_string())
    } else {
        IMessageError::Automation(stderr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn exit(stderr: &str) -> ScriptFailure {
        ScriptFailure::Exit {
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_classify_unknown_buddy() {
        let err = classify_failure(
            &exit("execution error: Messages got an error: Can\u{2019}t get buddy \"x\". (-1728)"),
            "x",
        );
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_classify_not_running() {
        let err = classify_failure(
            &exit("execution error: Messages got an error: Application isn\u{2019}t running. (-600)"),
            "x",
        );
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let err = classify_failure(&exit("Not authorized to send Apple events to Messages. (-1743)"), "x");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_classify_spawn_and_other() {
        let err = classify_failure(&ScriptFailure::Spawn("osascript: not found".into()), "x");
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let err = classify_failure(&exit("execution error: timeout (-1712)"), "x");
        assert_eq!(err.kind(), ErrorKind::Automation);

        let err = classify_failure(&exit(""), "x");
        assert!(matches!(err, IMessageError::Automation(ref m) if m == "Unknown AppleScript error"));
    }

    #[test]
    fn test_missing_interpreter_is_spawn_failure() {
        let runner = OsascriptRunner::new("/nonexistent/osascript");
        assert!(matches!(runner.run("return 1"), Err(ScriptFailure::Spawn(_))));
    }
}
