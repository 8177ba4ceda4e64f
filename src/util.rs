use std::env;
use std::process::Command as ProcessCommand;

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    match env_optional(name) {
        Some(value) => parse_bool_flag(&value),
        None => default,
    }
}

fn parse_bool_flag(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    matches!(v.as_str(), "1" | "true" | "yes" | "y" | "on")
}

pub(crate) fn command_wrapper() -> Option<Vec<String>> {
    env_optional("FRIDAY_COMMAND_WRAPPER").map(|raw| {
        raw.split_whitespace()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
    })
}

pub(crate) fn build_external_command(program: &str, args: &[String]) -> ProcessCommand {
    let mut cmd = if let Some(wrapper) = command_wrapper() {
        let mut c = ProcessCommand::new(&wrapper[0]);
        c.args(&wrapper[1..]).arg(program).args(args);
        c
    } else {
        let mut c = ProcessCommand::new(program);
        c.args(args);
        c
    };

    // Own process group, so a timed-out hook can be killed without touching us.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd
}

/// Lowercase and squeeze runs of whitespace to single spaces.
pub(crate) fn normalize_utterance(text: &str) -> String {
    collapse_whitespace(&text.to_lowercase())
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove HTML tags and decode the handful of entities search APIs emit.
pub(crate) fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    let decoded = out
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    collapse_whitespace(&decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_squeezes() {
        assert_eq!(normalize_utterance("  Friday   WHAT\ttime "), "friday what time");
    }

    #[test]
    fn strip_html_removes_tags_and_entities() {
        assert_eq!(
            strip_html("How to <span class=\"searchmatch\">Tie</span> a &quot;Tie&quot;"),
            "How to Tie a \"Tie\""
        );
    }

    #[test]
    fn bool_flags() {
        assert!(parse_bool_flag("Yes"));
        assert!(parse_bool_flag(" 1 "));
        assert!(!parse_bool_flag("off"));
    }
}
