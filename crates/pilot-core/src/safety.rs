//! Command safety filter.
//!
//! A denylist of catastrophic command patterns checked before every launch.
//! This is a best-effort filter, not a sandbox: anything not matching a
//! rule passes, including plenty of destructive commands.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A denylist entry.
#[derive(Debug)]
struct Rule {
    name: &'static str,
    pattern: Regex,
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    [
        ("recursive deletion of filesystem root", r"rm\s+-rf\s+/"),
        ("truncating redirection", r":\s*>"),
        ("system shutdown", r"(^|\s)shutdown(\s|$)"),
        ("system reboot", r"(^|\s)reboot(\s|$)"),
        ("system halt", r"(^|\s)init\s+0(\s|$)"),
    ]
    .into_iter()
    .map(|(name, pattern)| Rule {
        name,
        pattern: Regex::new(pattern).expect("valid safety rule"),
    })
    .collect()
});

/// A command matched a denylist rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{rule}: {command}")]
pub struct UnsafeCommand {
    pub rule: &'static str,
    pub command: String,
}

/// Check a command against the denylist, naming the first matched rule.
pub fn check(command: &str) -> Result<(), UnsafeCommand> {
    match RULES.iter().find(|rule| rule.pattern.is_match(command)) {
        Some(rule) => Err(UnsafeCommand {
            rule: rule.name,
            command: command.to_string(),
        }),
        None => Ok(()),
    }
}

pub fn is_safe(command: &str) -> bool {
    check(command).is_ok()
}
