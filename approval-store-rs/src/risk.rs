// approval-store-rs/src/risk.rs
// Risk grading for approval requests that arrive without one, and the
// replay-protection hash that binds an approval to its command.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use shared_types::RiskLevel;

// Destructive or system-wide impact.
static HIGH_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\brm\s+(-rf?|--recursive)\s",
        r"(?i)\bdd\s+.*of=/dev/",
        r"(?i)\bmkfs\b",
        r"(?i)\bchmod\s+(-R\s+)?777\b",
        r"(?i)\bapt(-get)?\s+(remove|purge)\b",
        r"(?i)\byum\s+(remove|erase)\b",
        r"(?i)\bdnf\s+remove\b",
        r"(?i)\bpacman\s+-R",
        r"(?i)\biptables\s+-F\b",
        r"(?i)\bsystemctl\s+(disable|mask)\b",
        r"(?i)\bkill\s+-9\s",
        r"(?i)\bpkill\s+-9\b",
        r"(?i)\bdocker\s+rm\s+-f",
        r"(?i)\bdocker\s+system\s+prune",
        r"(?i)\bpct\s+destroy\b",
        r"(?i)\bqm\s+destroy\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

// Service impact, recoverable.
static MEDIUM_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bsystemctl\s+(restart|stop|start)\b",
        r"(?i)\bservice\s+\S+\s+(restart|stop|start)\b",
        r"(?i)\bdocker\s+(restart|stop|start|kill)\b",
        r"(?i)\bapt(-get)?\s+(update|upgrade|install)\b",
        r"(?i)\byum\s+(update|install)\b",
        r"(?i)\bdnf\s+(update|install)\b",
        r"(?i)\bpct\s+(start|stop|reboot|resize)\b",
        r"(?i)\bqm\s+(start|stop|reboot|resize)\b",
        r"(?i)\bkill\b",
        r"(?i)\bpkill\b",
        r"(?i)\bchmod\b",
        r"(?i)\bchown\b",
        r"(?i)\bmv\s",
        r"(?i)\bcp\s+-r",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Grades a command for the approval queue.
///
/// Medium-risk commands aimed at a hypervisor node are escalated to high.
pub fn assess_risk_level(command: &str, target_type: &str) -> RiskLevel {
    if HIGH_RISK_PATTERNS.iter().any(|re| re.is_match(command)) {
        return RiskLevel::High;
    }
    if MEDIUM_RISK_PATTERNS.iter().any(|re| re.is_match(command)) {
        if target_type.eq_ignore_ascii_case("node") {
            return RiskLevel::High;
        }
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

/// Lowercase hex SHA-256 of `command|target_type|target_id`.
pub fn compute_command_hash(command: &str, target_type: &str, target_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    hasher.update(b"|");
    hasher.update(target_type.as_bytes());
    hasher.update(b"|");
    hasher.update(target_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Shortens a command for log lines.
pub(crate) fn truncate_command(command: &str, max_chars: usize) -> String {
    match command.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &command[..idx]),
        None => command.to_string(),
    }
}
