// investigation-rs/src/parser.rs
// Extracts the planner's verdict from an investigation summary.
//
// Markers are matched case-insensitively; the first one found decides:
//   PROPOSED_FIX: <command> | PROPOSED_FIX: ```lang\n<commands>\n```
//   TARGET_HOST: <host>          (defaults to "local")
//   CANNOT_FIX: <reason>
//   NEEDS_ATTENTION: <reason>
// Anything unparseable is treated as needing attention.

use shared_types::InvestigationOutcome;
use tracing::{debug, warn};

use crate::model::{Fix, MAX_COMMANDS_PER_FIX, MAX_COMMAND_LENGTH};

const PROPOSED_FIX: &str = "PROPOSED_FIX:";
const TARGET_HOST: &str = "TARGET_HOST:";
const CANNOT_FIX: &str = "CANNOT_FIX:";
const NEEDS_ATTENTION: &str = "NEEDS_ATTENTION:";
const FENCE: &str = "```";

/// Parsed verdict of an investigation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSummary {
    pub fix: Option<Fix>,
    pub outcome: InvestigationOutcome,
}

impl ParsedSummary {
    fn verdict(outcome: InvestigationOutcome) -> Self {
        Self { fix: None, outcome }
    }
}

fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default()
}

/// Strips a surrounding triple-backtick fence (with optional language tag)
/// or single-backtick wrapping.
pub fn strip_code_fences(text: &str) -> &str {
    let s = text.trim();

    if let Some(mut body) = s.strip_prefix(FENCE) {
        if let Some(newline) = body.find('\n') {
            let tag = body[..newline].trim();
            if tag.is_empty() || (!tag.contains(' ') && tag.len() < 20) {
                body = &body[newline + 1..];
            }
        }
        if let Some(close) = body.rfind(FENCE) {
            body = &body[..close];
        }
        return body.trim();
    }

    if s.len() >= 2 && s.starts_with('`') && s.ends_with('`') {
        return s[1..s.len() - 1].trim();
    }

    s
}

// Body following PROPOSED_FIX: either a fenced block or the rest of the line.
fn proposed_command_text(remaining: &str) -> &str {
    let trimmed = remaining.trim_start();
    if let Some(after_open) = trimmed.strip_prefix(FENCE) {
        if let Some(close) = after_open.find(FENCE) {
            let fenced = &trimmed[..FENCE.len() + close + FENCE.len()];
            return strip_code_fences(fenced);
        }
        // Unterminated fence: first line only.
        return first_line(remaining).trim();
    }
    strip_code_fences(first_line(remaining).trim())
}

fn split_commands(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .map(|line| line.strip_prefix('$').map(str::trim).unwrap_or(line))
        .filter(|line| !line.is_empty())
        .take(MAX_COMMANDS_PER_FIX)
        .map(str::to_string)
        .collect()
}

/// Parses an investigation summary into a fix proposal or a verdict.
pub fn parse_investigation_summary(summary: &str) -> ParsedSummary {
    // ASCII uppercasing keeps byte offsets aligned with `summary`.
    let upper = summary.to_ascii_uppercase();

    if let Some(idx) = upper.find(PROPOSED_FIX) {
        let command_text = proposed_command_text(&summary[idx + PROPOSED_FIX.len()..]);
        let commands = split_commands(command_text);
        debug!(marker_pos = idx, command_count = commands.len(), "Found PROPOSED_FIX marker");

        let target_host = upper
            .find(TARGET_HOST)
            .map(|host_idx| first_line(&summary[host_idx + TARGET_HOST.len()..]).trim())
            .filter(|host| !host.is_empty())
            .unwrap_or("local");

        if commands.is_empty() {
            warn!("PROPOSED_FIX marker found but command is empty, falling back to needs_attention");
            return ParsedSummary::verdict(InvestigationOutcome::NeedsAttention);
        }
        if let Some(long) = commands.iter().find(|c| c.len() > MAX_COMMAND_LENGTH) {
            warn!(
                command_length = long.len(),
                max_length = MAX_COMMAND_LENGTH,
                "PROPOSED_FIX command exceeds max length, falling back to needs_attention"
            );
            return ParsedSummary::verdict(InvestigationOutcome::NeedsAttention);
        }

        return ParsedSummary {
            fix: Some(Fix::new(commands, target_host, summary)),
            outcome: InvestigationOutcome::FixQueued,
        };
    }

    if upper.contains(CANNOT_FIX) {
        debug!("Found CANNOT_FIX marker");
        return ParsedSummary::verdict(InvestigationOutcome::CannotFix);
    }
    if upper.contains(NEEDS_ATTENTION) {
        debug!("Found NEEDS_ATTENTION marker");
    }
    ParsedSummary::verdict(InvestigationOutcome::NeedsAttention)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(summary: &str) -> Vec<String> {
        parse_investigation_summary(summary)
            .fix
            .map(|f| f.commands)
            .unwrap_or_default()
    }

    #[test]
    fn fenced_block_with_language_tag() {
        let parsed = parse_investigation_summary("PROPOSED_FIX: ```bash\nsystemctl restart x\n```");
        assert_eq!(parsed.outcome, InvestigationOutcome::FixQueued);
        assert_eq!(parsed.fix.unwrap().commands, vec!["systemctl restart x"]);
    }

    #[test]
    fn lowercase_marker_and_single_backticks() {
        assert_eq!(commands("proposed_fix: `ls`"), vec!["ls"]);
    }

    #[test]
    fn multi_line_fence_strips_prompts_and_blanks() {
        let summary = "### Proposed Fix\nPROPOSED_FIX:\n```\n$ df -h\n\n$ systemctl restart nginx\n```\nTARGET_HOST: web-01\n";
        let parsed = parse_investigation_summary(summary);
        let fix = parsed.fix.unwrap();
        assert_eq!(fix.commands, vec!["df -h", "systemctl restart nginx"]);
        assert_eq!(fix.target_host, "web-01");
        assert_eq!(fix.rationale, summary);
    }

    #[test]
    fn single_line_stops_at_newline_and_defaults_host() {
        let fix = parse_investigation_summary("PROPOSED_FIX: systemctl restart app\nmore text")
            .fix
            .unwrap();
        assert_eq!(fix.commands, vec!["systemctl restart app"]);
        assert_eq!(fix.target_host, "local");
    }

    #[test]
    fn commands_are_capped() {
        let body: String = (0..15).map(|i| format!("echo {i}\n")).collect();
        let summary = format!("PROPOSED_FIX: ```sh\n{body}```");
        assert_eq!(commands(&summary).len(), MAX_COMMANDS_PER_FIX);
    }

    #[test]
    fn empty_or_oversized_command_needs_attention() {
        let empty = parse_investigation_summary("PROPOSED_FIX:   \nTARGET_HOST: web-01");
        assert_eq!(empty.outcome, InvestigationOutcome::NeedsAttention);
        assert!(empty.fix.is_none());

        let long = format!("PROPOSED_FIX: echo {}", "a".repeat(MAX_COMMAND_LENGTH));
        let parsed = parse_investigation_summary(&long);
        assert_eq!(parsed.outcome, InvestigationOutcome::NeedsAttention);
        assert!(parsed.fix.is_none());
    }

    #[test]
    fn verdict_markers() {
        assert_eq!(
            parse_investigation_summary("CANNOT_FIX: hardware").outcome,
            InvestigationOutcome::CannotFix
        );
        assert_eq!(
            parse_investigation_summary("needs_attention: disk replacement").outcome,
            InvestigationOutcome::NeedsAttention
        );
        assert_eq!(
            parse_investigation_summary("I looked around and everything is fine").outcome,
            InvestigationOutcome::NeedsAttention
        );
    }

    #[test]
    fn fence_stripping() {
        assert_eq!(strip_code_fences("```bash\nls -la\n```"), "ls -la");
        assert_eq!(strip_code_fences("```ls -la```"), "ls -la");
        assert_eq!(strip_code_fences("`uptime`"), "uptime");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }
}
