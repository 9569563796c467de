//! SSH password-prompt parsing
//!
//! SSH invokes its askpass helper with the prompt text as the only argument.
//! For plain password authentication that prompt is
//! `user@host's password: `, which carries everything needed for a daemon
//! lookup (`url = ssh://host`, `username = user`).

use regex::Regex;
use std::sync::OnceLock;

/// A parsed `user@host's password: ` prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordAuthPrompt {
    pub username: String,
    pub host: String,
}

impl PasswordAuthPrompt {
    /// The lookup URL for this host
    pub fn url(&self) -> String {
        format!("ssh://{}", self.host)
    }

    /// Bastion gateways (WALLIX and friends) pack routing into the username,
    /// like `target_user@target_host:SSH:proxy:real_user@auth_system`; the
    /// segment after the last `:` is the username worth retrying with.
    pub fn fallback_username(&self) -> Option<&str> {
        if self.username.contains(':') {
            self.username.rsplit(':').next()
        } else {
            None
        }
    }
}

/// Parse an SSH password-authentication prompt, or `None` for any other
/// prompt text (host key confirmations, passphrase prompts, ...).
pub fn parse_password_auth_prompt(prompt: &str) -> Option<PasswordAuthPrompt> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(\S+)@([^@\s]+)'s password: $").unwrap());

    let captures = re.captures(prompt)?;
    Some(PasswordAuthPrompt {
        username: captures[1].to_string(),
        host: captures[2].to_string(),
    })
}
