//! Commit message trailers that steer export
//!
//! `Gbp: <Command> [args]` and `Gbp-Pq: <Command> [args]` lines in a commit
//! message are consumed during export. `Ignore` keeps the commit out of the
//! series and `Topic <name>` files the patch under a topic directory.

use regex::Regex;
use tracing::warn;

/// Default regex for legacy topic lines
pub const DEFAULT_TOPIC_REGEX: &str = r"(?i)^gbp-pq-topic:\s*(?P<topic>\S.*)$";

/// Trailer-derived export instructions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrailerCommands {
    pub ignore: bool,
    pub topic: Option<String>,
    /// Message body with consumed lines removed
    pub body: String,
}

/// Whether `line` is a structured `Gbp:`/`Gbp-Pq:` command line
fn parse_command(line: &str) -> Option<(String, String)> {
    let (key, rest) = line.split_once(':')?;
    let key = key.trim();
    if !key.eq_ignore_ascii_case("gbp") && !key.eq_ignore_ascii_case("gbp-pq") {
        return None;
    }
    let rest = rest.trim();
    let (cmd, args) = match rest.split_once(char::is_whitespace) {
        Some((cmd, args)) => (cmd, args.trim()),
        None => (rest, ""),
    };
    if cmd.is_empty() {
        return None;
    }
    Some((cmd.to_ascii_lowercase(), args.to_string()))
}

/// Parse trailer commands out of a commit body.
///
/// Structured commands win over the legacy topic form when both name a
/// topic. Unknown commands are reported and left in the body.
pub fn parse_trailers(body: &str, topic_regex: Option<&Regex>) -> TrailerCommands {
    let mut commands = TrailerCommands::default();
    let mut kept = Vec::new();
    let mut legacy_topic = None;

    for line in body.lines() {
        if let Some((cmd, args)) = parse_command(line) {
            match cmd.as_str() {
                "ignore" => {
                    commands.ignore = true;
                    continue;
                }
                "topic" if !args.is_empty() => {
                    commands.topic = Some(args);
                    continue;
                }
                _ => warn!("Ignoring unknown trailer command '{}'", line.trim()),
            }
        } else if let Some(topic) = topic_regex
            .and_then(|re| re.captures(line.trim()))
            .and_then(|caps| caps.name("topic"))
        {
            warn!(
                "Deprecated topic line '{}', use 'Gbp-Pq: Topic <topic>' instead",
                line.trim()
            );
            legacy_topic = Some(topic.as_str().trim().to_string());
            continue;
        }
        kept.push(line);
    }

    if commands.topic.is_none() {
        commands.topic = legacy_topic;
    }

    commands.body = kept.join("\n").trim_end().to_string();
    if !commands.body.is_empty() {
        commands.body.push('\n');
    }
    commands
}

/// Trailer line recording a topic on a commit created from a patch
pub fn topic_trailer(topic: &str) -> String {
    format!("Gbp-Pq: Topic {}", topic)
}
