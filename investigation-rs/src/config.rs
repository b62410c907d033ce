// investigation-rs/src/config.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_CONCURRENT: usize = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_TURNS: u32 = 15;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60 * 60);
const DEFAULT_TIMEOUT_COOLDOWN: Duration = Duration::from_secs(10 * 60);
const DEFAULT_VERIFICATION_DELAY: Duration = Duration::from_secs(30);

/// Orchestrator limits and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationConfig {
    /// Investigations allowed to run at once.
    pub max_concurrent: usize,
    /// Wall-clock bound on one planner conversation.
    pub timeout: Duration,
    /// Tool turns per conversation.
    pub max_turns: u32,
    /// Investigations started per finding before giving up on it.
    pub max_attempts_per_finding: u32,
    /// Wait between investigations of the same finding.
    pub cooldown: Duration,
    /// Shorter wait used after an investigation timed out.
    pub timeout_cooldown: Duration,
    /// In assisted mode, fixes for critical findings still need approval.
    pub critical_requires_approval: bool,
    /// Pause between executing a fix and verifying it.
    pub verification_delay: Duration,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: DEFAULT_TIMEOUT,
            max_turns: DEFAULT_MAX_TURNS,
            max_attempts_per_finding: DEFAULT_MAX_ATTEMPTS,
            cooldown: DEFAULT_COOLDOWN,
            timeout_cooldown: DEFAULT_TIMEOUT_COOLDOWN,
            critical_requires_approval: true,
            verification_delay: DEFAULT_VERIFICATION_DELAY,
        }
    }
}

impl InvestigationConfig {
    /// Reads the `INVESTIGATION_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        config_rs::load_dotenv();
        let defaults = Self::default();

        Self {
            max_concurrent: config_rs::env_parse("INVESTIGATION_MAX_CONCURRENT", defaults.max_concurrent),
            timeout: config_rs::env_duration_secs("INVESTIGATION_TIMEOUT_SECS", defaults.timeout),
            max_turns: config_rs::env_parse("INVESTIGATION_MAX_TURNS", defaults.max_turns),
            max_attempts_per_finding: config_rs::env_parse(
                "INVESTIGATION_MAX_ATTEMPTS",
                defaults.max_attempts_per_finding,
            ),
            cooldown: config_rs::env_duration_secs("INVESTIGATION_COOLDOWN_SECS", defaults.cooldown),
            timeout_cooldown: config_rs::env_duration_secs(
                "INVESTIGATION_TIMEOUT_COOLDOWN_SECS",
                defaults.timeout_cooldown,
            ),
            critical_requires_approval: config_rs::env_bool(
                "INVESTIGATION_CRITICAL_REQUIRES_APPROVAL",
                defaults.critical_requires_approval,
            ),
            verification_delay: config_rs::env_duration_secs(
                "INVESTIGATION_VERIFICATION_DELAY_SECS",
                defaults.verification_delay,
            ),
        }
        .normalized()
    }

    /// Replaces zero limits with defaults and keeps the timeout cooldown
    /// below the regular one.
    pub fn normalized(mut self) -> Self {
        if self.max_concurrent == 0 {
            self.max_concurrent = DEFAULT_MAX_CONCURRENT;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.max_turns == 0 {
            self.max_turns = DEFAULT_MAX_TURNS;
        }
        if self.max_attempts_per_finding == 0 {
            self.max_attempts_per_finding = DEFAULT_MAX_ATTEMPTS;
        }
        if self.timeout_cooldown >= self.cooldown {
            self.timeout_cooldown = self.cooldown / 2;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back() {
        let cfg = InvestigationConfig {
            max_concurrent: 0,
            timeout: Duration::ZERO,
            max_turns: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.max_concurrent, 3);
        assert_eq!(cfg.timeout, Duration::from_secs(300));
        assert_eq!(cfg.max_turns, 15);
    }

    #[test]
    fn timeout_cooldown_stays_below_cooldown() {
        let cfg = InvestigationConfig {
            cooldown: Duration::from_secs(600),
            timeout_cooldown: Duration::from_secs(900),
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.timeout_cooldown, Duration::from_secs(300));
    }

    #[test]
    fn reads_environment() {
        std::env::set_var("INVESTIGATION_MAX_CONCURRENT", "5");
        std::env::set_var("INVESTIGATION_CRITICAL_REQUIRES_APPROVAL", "false");
        std::env::set_var("INVESTIGATION_VERIFICATION_DELAY_SECS", "not-a-number");

        let cfg = InvestigationConfig::from_env();
        assert_eq!(cfg.max_concurrent, 5);
        assert!(!cfg.critical_requires_approval);
        assert_eq!(cfg.verification_delay, Duration::from_secs(30));

        std::env::remove_var("INVESTIGATION_MAX_CONCURRENT");
        std::env::remove_var("INVESTIGATION_CRITICAL_REQUIRES_APPROVAL");
        std::env::remove_var("INVESTIGATION_VERIFICATION_DELAY_SECS");
    }
}
