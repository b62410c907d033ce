// safety-rs/src/guardrails.rs
// Policy layer over the classifier: risk grading, command validation and
// the approval gate per autonomy level.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use error_handling::{Classify, ErrorKind};
use shared_types::{AutonomyLevel, FindingSeverity, RiskLevel};

use crate::classifier::{contains_at_word_start, is_blocked_command, is_read_only_command};
use crate::normalize_command;

/// Longest command `validate_command` accepts.
pub const MAX_VALIDATED_COMMAND_LENGTH: usize = 4096;

lazy_static! {
    static ref HIGH_RISK_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(restart|reboot|shutdown|poweroff|halt)\b").unwrap(),
        Regex::new(r"(?i)\binit\s+[06]\b").unwrap(),
        Regex::new(r"(?i)\b(qm|pct)\s+(stop|reset|suspend)\b").unwrap(),
    ];

    static ref CONFIG_MUTATION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bsed\b.*\s-(i|-in-place)").unwrap(),
        Regex::new(r"(?i)\bchmod\b").unwrap(),
        Regex::new(r"(?i)\bchown\b").unwrap(),
        Regex::new(r"(?i)\btee\b").unwrap(),
        Regex::new(r"(?i)\b(cp|mv)\b.*\s/etc/").unwrap(),
        Regex::new(r"(?i)\btruncate\b").unwrap(),
        Regex::new(r"(?i)\bcrontab\b").unwrap(),
        Regex::new(r"(?i)\bsysctl\s+-w\b").unwrap(),
        Regex::new(r"(?i)\b(qm|pct)\s+set\b").unwrap(),
        Regex::new(r">").unwrap(),
    ];

    /// Command chains that smuggle a destructive tail behind a harmless head.
    /// Compared with all whitespace removed.
    static ref INJECTION_CHAINS: Vec<&'static str> = vec![
        ";rm-rf",
        "|rm-rf",
        "&&rm-rf",
        "||rm-rf",
        "$(rm-rf",
        "`rm-rf",
        ";ddif=",
        "|ddif=",
        "&&ddif=",
    ];
}

/// Reasons `validate_command` rejects a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardrailViolation {
    #[error("command is empty")]
    Empty,

    #[error("command is too long ({length} > {max} characters)")]
    TooLong { length: usize, max: usize },

    #[error("command contains an injection chain: {0}")]
    InjectionChain(String),
}

impl Classify for GuardrailViolation {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Autonomy policy engine.
///
/// Stateless apart from the operator-supplied destructive patterns and the
/// critical-severity switch; safe to share behind an `Arc`.
#[derive(Debug)]
pub struct Guardrails {
    custom_destructive: RwLock<Vec<String>>,
    critical_requires_approval: AtomicBool,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self::new()
    }
}

impl Guardrails {
    pub fn new() -> Self {
        Self {
            custom_destructive: RwLock::new(Vec::new()),
            critical_requires_approval: AtomicBool::new(true),
        }
    }

    /// Whether `assisted` mode still gates fixes for critical findings.
    pub fn with_critical_requires_approval(self, enabled: bool) -> Self {
        self.set_critical_requires_approval(enabled);
        self
    }

    pub fn set_critical_requires_approval(&self, enabled: bool) {
        self.critical_requires_approval.store(enabled, Ordering::Relaxed);
    }

    pub fn critical_requires_approval(&self) -> bool {
        self.critical_requires_approval.load(Ordering::Relaxed)
    }

    /// Adds an operator-defined destructive fragment (matched like the
    /// built-in blocked list).
    pub fn add_destructive_pattern(&self, pattern: &str) {
        let normalized = normalize_command(pattern);
        if normalized.is_empty() {
            return;
        }
        let mut patterns = self
            .custom_destructive
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if !patterns.contains(&normalized) {
            patterns.push(normalized);
        }
    }

    /// Blocked by the built-in list or by an operator-defined pattern.
    pub fn is_destructive(&self, command: &str) -> bool {
        if is_blocked_command(command) {
            return true;
        }
        let normalized = normalize_command(command);
        let patterns = self
            .custom_destructive
            .read()
            .unwrap_or_else(|e| e.into_inner());
        patterns
            .iter()
            .any(|p| contains_at_word_start(&normalized, p))
    }

    /// Grades a single command.
    ///
    /// critical: destructive; high: restarts, reboots, shutdowns; medium:
    /// configuration mutation; low: read-only; anything else is medium.
    pub fn classify_risk(&self, command: &str) -> RiskLevel {
        if self.is_destructive(command) {
            RiskLevel::Critical
        } else if HIGH_RISK_PATTERNS.iter().any(|re| re.is_match(command)) {
            RiskLevel::High
        } else if CONFIG_MUTATION_PATTERNS.iter().any(|re| re.is_match(command)) {
            RiskLevel::Medium
        } else if is_read_only_command(command) {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        }
    }

    /// Structural validation applied before a command is considered at all.
    pub fn validate_command(&self, command: &str) -> Result<(), GuardrailViolation> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(GuardrailViolation::Empty);
        }
        let length = trimmed.chars().count();
        if length > MAX_VALIDATED_COMMAND_LENGTH {
            return Err(GuardrailViolation::TooLong {
                length,
                max: MAX_VALIDATED_COMMAND_LENGTH,
            });
        }

        let compact: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if let Some(chain) = INJECTION_CHAINS.iter().find(|chain| compact.contains(*chain)) {
            return Err(GuardrailViolation::InjectionChain(chain.to_string()));
        }

        Ok(())
    }

    /// Approval gate.
    ///
    /// Destructive commands always need approval. Otherwise `full` runs
    /// unattended, `assisted` gates only critical findings, and `approval`,
    /// `monitor` and unknown levels always gate.
    pub fn requires_approval(
        &self,
        severity: FindingSeverity,
        level: AutonomyLevel,
        command: &str,
    ) -> bool {
        if self.is_destructive(command) {
            debug!(command = %command, "destructive command always requires approval");
            return true;
        }

        match level {
            AutonomyLevel::Full => false,
            AutonomyLevel::Assisted => {
                severity == FindingSeverity::Critical && self.critical_requires_approval()
            }
            AutonomyLevel::Approval | AutonomyLevel::Monitor | AutonomyLevel::Unknown => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(s: &str) -> AutonomyLevel {
        AutonomyLevel::from(s)
    }

    #[test]
    fn approval_gate_per_level() {
        let g = Guardrails::new();
        let warning = FindingSeverity::Warning;
        let critical = FindingSeverity::Critical;

        assert!(!g.requires_approval(warning, level("full"), "echo ok"));
        assert!(!g.requires_approval(critical, level("full"), "echo ok"));
        assert!(g.requires_approval(critical, level("full"), "rm -rf /tmp/x"));
        assert!(!g.requires_approval(warning, level("assisted"), "echo ok"));
        assert!(g.requires_approval(critical, level("assisted"), "echo ok"));
        assert!(g.requires_approval(warning, level("assisted"), "rm -rf /tmp/x"));
        assert!(g.requires_approval(warning, level("approval"), "echo ok"));
        assert!(g.requires_approval(warning, level(""), "echo ok"));
        assert!(g.requires_approval(warning, level("monitor"), "df -h"));
    }

    #[test]
    fn assisted_critical_gate_can_be_disabled() {
        let g = Guardrails::new().with_critical_requires_approval(false);
        assert!(!g.requires_approval(FindingSeverity::Critical, AutonomyLevel::Assisted, "echo ok"));
    }

    #[test]
    fn risk_grades() {
        let g = Guardrails::new();
        assert_eq!(g.classify_risk("rm -rf /var/lib/x"), RiskLevel::Critical);
        assert_eq!(g.classify_risk("systemctl restart nginx"), RiskLevel::High);
        assert_eq!(g.classify_risk("qm reboot 101"), RiskLevel::High);
        assert_eq!(g.classify_risk("sed -i s/a/b/ /etc/app.conf"), RiskLevel::Medium);
        assert_eq!(g.classify_risk("chown www-data /srv/app"), RiskLevel::Medium);
        assert_eq!(g.classify_risk("df -h"), RiskLevel::Low);
        assert_eq!(g.classify_risk("ps aux | grep nginx"), RiskLevel::Low);
        assert_eq!(g.classify_risk("apt-get clean"), RiskLevel::Medium);
    }

    #[test]
    fn custom_patterns_are_destructive() {
        let g = Guardrails::new();
        assert!(!g.is_destructive("pvecm expected 1"));
        g.add_destructive_pattern("PVECM   expected");
        assert!(g.is_destructive("pvecm expected 1"));
        assert_eq!(g.classify_risk("pvecm expected 1"), RiskLevel::Critical);
    }

    #[test]
    fn validation_rejects_empty_long_and_chained() {
        let g = Guardrails::new();
        assert_eq!(g.validate_command("   "), Err(GuardrailViolation::Empty));

        let long = "a".repeat(MAX_VALIDATED_COMMAND_LENGTH + 1);
        assert!(matches!(
            g.validate_command(&long),
            Err(GuardrailViolation::TooLong { length, .. }) if length == MAX_VALIDATED_COMMAND_LENGTH + 1
        ));

        assert!(matches!(
            g.validate_command("ls /tmp;  rm -rf /"),
            Err(GuardrailViolation::InjectionChain(_))
        ));
        assert!(matches!(
            g.validate_command("echo $(rm -rf ~)"),
            Err(GuardrailViolation::InjectionChain(_))
        ));
        assert!(g.validate_command("cat x | dd if=/dev/zero").is_err());
        assert!(g.validate_command("systemctl restart nginx").is_ok());
        assert_eq!(GuardrailViolation::Empty.kind(), ErrorKind::Validation);
    }
}
