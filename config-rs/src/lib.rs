//! config-rs/lib.rs
//! Shared configuration utilities for consistent component configuration
//! Provides typed readers over environment variables and `.env` loading

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;

static DOTENV: Once = Once::new();

/// Load a `.env` file from the working directory (or a parent) once per process.
///
/// Variables already present in the environment win over the file.
pub fn load_dotenv() {
    DOTENV.call_once(|| {
        if let Err(err) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {}", err);
        }
    });
}

/// Get a non-empty string variable
pub fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get a boolean variable; `1`, `true`, `yes` and `on` are truthy
///
/// # Arguments
/// * `name` - The environment variable name
/// * `default` - The value to use when the variable is unset or empty
pub fn env_bool(name: &str, default: bool) -> bool {
    env_string(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Get a variable parsed into `T`, falling back to `default` when unset or invalid
pub fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match env_string(name) {
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value {:?} in {}, using default", raw, name);
            default
        }),
        None => default,
    }
}

/// Get a duration expressed in whole seconds
pub fn env_duration_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(name, default.as_secs()))
}

/// Root directory for persisted state
///
/// Reads `REMEDIATION_DATA_DIR`, defaulting to `./data`.
pub fn data_dir() -> PathBuf {
    env_string("REMEDIATION_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_bool() {
        std::env::set_var("CFG_TEST_BOOL_ON", "On");
        assert!(env_bool("CFG_TEST_BOOL_ON", false));

        std::env::set_var("CFG_TEST_BOOL_OFF", "0");
        assert!(!env_bool("CFG_TEST_BOOL_OFF", true));

        std::env::remove_var("CFG_TEST_BOOL_UNSET");
        assert!(env_bool("CFG_TEST_BOOL_UNSET", true));
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("CFG_TEST_PARSE", "not-a-number");
        assert_eq!(env_parse("CFG_TEST_PARSE", 7usize), 7);

        std::env::set_var("CFG_TEST_PARSE_OK", " 42 ");
        assert_eq!(env_parse("CFG_TEST_PARSE_OK", 7usize), 42);
    }

    #[test]
    fn test_env_durations() {
        std::env::set_var("CFG_TEST_SECS", "90");
        assert_eq!(
            env_duration_secs("CFG_TEST_SECS", Duration::from_secs(1)),
            Duration::from_secs(90)
        );

        std::env::remove_var("CFG_TEST_SECS_UNSET");
        assert_eq!(
            env_duration_secs("CFG_TEST_SECS_UNSET", Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_empty_string_is_unset() {
        std::env::set_var("CFG_TEST_EMPTY", "   ");
        assert_eq!(env_string("CFG_TEST_EMPTY"), None);
    }
}
