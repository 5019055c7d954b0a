//! Command extraction from collaborator replies.
//!
//! Collaborators wrap each proposed command in `<COMMAND>` and `</COMMAND>`
//! tags; everything outside the tags is commentary and ignored.

use once_cell::sync::Lazy;
use regex::Regex;

static COMMAND_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<COMMAND>(.*?)</COMMAND>").expect("valid command tag regex"));

/// Extract tagged commands in order, trimmed, dropping empty ones.
pub fn extract_commands(reply: &str) -> Vec<String> {
    COMMAND_TAG_RE
        .captures_iter(reply)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|cmd| !cmd.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse a plain command listing: tagged commands if any tags are present,
/// otherwise one command per non-empty line, skipping `#` comments.
pub fn parse_command_list(content: &str) -> Vec<String> {
    let tagged = extract_commands(content);
    if !tagged.is_empty() {
        return tagged;
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tagged_commands_in_order() {
        let reply = "Run these:\n<COMMAND>echo a</COMMAND>\nthen\n<COMMAND> ls -la </COMMAND>";
        assert_eq!(extract_commands(reply), vec!["echo a", "ls -la"]);
    }

    #[test]
    fn multiline_command_bodies_are_kept() {
        let reply = "<COMMAND>cat <<EOF\nhello\nEOF</COMMAND>";
        assert_eq!(extract_commands(reply), vec!["cat <<EOF\nhello\nEOF"]);
    }

    #[test]
    fn empty_tags_are_dropped() {
        let reply = "<COMMAND>  </COMMAND><COMMAND>whoami</COMMAND>";
        assert_eq!(extract_commands(reply), vec!["whoami"]);
    }

    #[test]
    fn untagged_reply_yields_nothing() {
        assert!(extract_commands("I would suggest checking your PATH.").is_empty());
        assert!(extract_commands("").is_empty());
    }

    #[test]
    fn command_list_falls_back_to_lines() {
        let content = "# setup\necho one\n\n  echo two  \n";
        assert_eq!(parse_command_list(content), vec!["echo one", "echo two"]);
    }

    #[test]
    fn command_list_prefers_tags() {
        let content = "echo ignored\n<COMMAND>echo kept</COMMAND>";
        assert_eq!(parse_command_list(content), vec!["echo kept"]);
    }
}
