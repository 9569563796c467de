//! Prompt mechanism decision policy
//!
//! Environment-driven branching, modeled as a pure function over an explicit
//! configuration struct so the whole table is unit-testable without touching
//! a terminal or spawning a process.

use std::path::PathBuf;

/// How strongly the external askpass program is required.
///
/// Parsed from `<VAR>_REQUIRE`; unknown or absent values mean [`Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireMode {
    /// Always use the terminal
    Never,
    /// Use the program when a display is available
    Prefer,
    /// Always use the program
    Force,
    /// Terminal when one is usable, program as the graphical fallback
    Auto,
}

impl RequireMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("never") => Self::Never,
            Some("prefer") => Self::Prefer,
            Some("force") => Self::Force,
            _ => Self::Auto,
        }
    }
}

/// Which mechanism to prompt with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMechanism {
    Terminal,
    Program,
}

/// Everything the decision depends on, captured explicitly.
#[derive(Debug, Clone)]
pub struct AskpassPolicy {
    /// External askpass program, from `<VAR>`
    pub program: Option<PathBuf>,
    /// From `<VAR>_REQUIRE`
    pub require: RequireMode,
    /// `DISPLAY` is set
    pub has_display: bool,
    /// `/dev/tty` can be opened
    pub tty_available: bool,
}

impl AskpassPolicy {
    /// Capture the policy from the environment for the given variable name
    /// (e.g. `SSH_ASKPASS` or `MIMIKEEPASS_SSH_ASKPASS`).
    pub fn from_env(variable: &str) -> Self {
        let require_var = format!("{variable}_REQUIRE");
        let require = std::env::var(&require_var).ok();
        Self {
            program: std::env::var_os(variable).map(PathBuf::from),
            require: RequireMode::parse(require.as_deref()),
            has_display: std::env::var_os("DISPLAY").is_some(),
            tty_available: tty_available(),
        }
    }

    /// Decide which mechanism to use. No program configured always means
    /// the terminal, whatever the other knobs say.
    pub fn decide(&self) -> PromptMechanism {
        if self.program.is_none() {
            return PromptMechanism::Terminal;
        }
        match self.require {
            RequireMode::Never => PromptMechanism::Terminal,
            RequireMode::Force => PromptMechanism::Program,
            RequireMode::Prefer => {
                if self.has_display {
                    PromptMechanism::Program
                } else {
                    PromptMechanism::Terminal
                }
            }
            RequireMode::Auto => {
                if !self.has_display || self.tty_available {
                    PromptMechanism::Terminal
                } else {
                    PromptMechanism::Program
                }
            }
        }
    }
}

/// Whether the process has a controlling terminal to prompt on.
pub fn tty_available() -> bool {
    std::fs::File::open("/dev/tty").is_ok()
}
