//! Prompt execution: terminal and external-program mechanisms

use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::{AskpassPolicy, PromptMechanism};

/// Ask for a password (or anything else secret).
///
/// Resolves the mechanism from the environment for `variable` (e.g.
/// `SSH_ASKPASS`), then prompts. Returns `None` when the user cancels or the
/// chosen mechanism is unavailable; callers treat that as a failed attempt.
pub fn ask_pass(prompt: &str, variable: &str) -> Option<String> {
    let policy = AskpassPolicy::from_env(variable);
    match policy.decide() {
        PromptMechanism::Terminal => prompt_terminal(prompt),
        PromptMechanism::Program => {
            let program = policy.program.as_deref()?;
            prompt_program(prompt, program)
        }
    }
}

/// Read a password from the controlling terminal, without echo.
pub fn prompt_terminal(prompt: &str) -> Option<String> {
    rpassword::prompt_password(prompt).ok()
}

/// Run an askpass-style program: prompt as the single argument, password on
/// stdout, non-zero exit means cancelled.
pub fn prompt_program(prompt: &str, program: &Path) -> Option<String> {
    let output = match Command::new(program).arg(prompt).output() {
        Ok(output) => output,
        Err(e) => {
            debug!(program = %program.display(), error = %e, "askpass program failed to run");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    let mut password = String::from_utf8(output.stdout).ok()?;
    if password.ends_with('\n') {
        password.pop();
    }
    Some(password)
}
