//! Password prompting for mimikeepass
//!
//! Two halves:
//! - a pure decision policy choosing between the terminal and an external
//!   askpass program, driven by `<VAR>` / `<VAR>_REQUIRE` / `DISPLAY` and
//!   tty availability
//! - the SSH password-prompt parser used by the ssh-askpass wrapper to turn
//!   `user@host's password: ` into a daemon lookup

mod policy;
mod prompt;
mod ssh;

pub use policy::*;
pub use prompt::*;
pub use ssh::*;
