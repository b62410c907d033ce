// safety-rs/src/sensitive.rs
// Secret and credential path detection.

use once_cell::sync::Lazy;

const SYSTEM_CREDENTIAL_FILES: &[&str] = &["/etc/shadow", "/etc/gshadow", "/etc/sudoers"];

const SECRET_MOUNT_PREFIXES: &[&str] = &[
    "/run/secrets/",
    "/var/run/secrets/",
    "/etc/secrets/",
    "/secrets/",
];

const KEY_SUFFIXES: &[&str] = &[".pem", ".key", ".p12", ".pfx"];

const CREDENTIAL_DOTFILES: &[&str] = &[".env", ".npmrc", ".pypirc", ".netrc"];

/// Encrypted node-credential store and its key, wherever they are installed.
const ENCRYPTED_CONFIG_FILES: &[&str] = &["nodes.enc", ".encryption.key"];

static SECRET_MOUNT_ROOTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    SECRET_MOUNT_PREFIXES
        .iter()
        .map(|p| p.trim_end_matches('/'))
        .collect()
});

/// Lexically cleans a path: collapses repeated separators, drops `.`
/// elements and resolves `..` against preceding elements.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Reports why a path is sensitive, or `None` when it is not.
pub fn is_sensitive_path(path: &str) -> Option<&'static str> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned = clean_path(trimmed);
    let lower = cleaned.to_lowercase();
    let base = lower.rsplit('/').next().unwrap_or(lower.as_str());

    if SYSTEM_CREDENTIAL_FILES.contains(&cleaned.as_str()) || cleaned.starts_with("/etc/sudoers.d/") {
        return Some("system credential file");
    }
    if cleaned.contains("/.ssh/")
        || cleaned.ends_with("/.ssh")
        || cleaned.starts_with(".ssh/")
        || cleaned == ".ssh"
    {
        return Some("ssh key material");
    }
    if SECRET_MOUNT_PREFIXES.iter().any(|p| cleaned.starts_with(p))
        || SECRET_MOUNT_ROOTS.iter().any(|r| cleaned == *r)
    {
        return Some("secrets mount");
    }
    if cleaned.starts_with("/proc/") && cleaned.ends_with("/environ") {
        return Some("process environment");
    }
    if ENCRYPTED_CONFIG_FILES.contains(&base) {
        return Some("encrypted credential store");
    }
    if KEY_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return Some("private key or certificate bundle");
    }
    if CREDENTIAL_DOTFILES.contains(&base) || base.starts_with(".env.") || lower.ends_with(".aws/credentials") {
        return Some("credential dotfile");
    }

    None
}

/// Scans every token of a command for a sensitive path.
///
/// Quotes, redirection operators and `--flag=` prefixes are stripped from
/// each token before checking. Returns `"<path> (<reason>)"` for the first hit.
pub fn command_touches_sensitive_path(command: &str) -> Option<String> {
    command
        .split(|c: char| c.is_whitespace() || c == '|' || c == ';')
        .filter_map(|raw| {
            let token = raw.trim_matches(|c| c == '\'' || c == '"' || c == '<' || c == '>');
            let candidate = token.rsplit('=').next().unwrap_or(token);
            let candidate = candidate.trim_matches(|c| c == '\'' || c == '"');
            if candidate.is_empty() || !(candidate.contains('/') || candidate.starts_with('.')) {
                return None;
            }
            is_sensitive_path(candidate).map(|reason| format!("{} ({})", candidate, reason))
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_resolves_dots() {
        assert_eq!(clean_path("/etc//ssh/../shadow"), "/etc/shadow");
        assert_eq!(clean_path("/../../etc/./gshadow"), "/etc/gshadow");
        assert_eq!(clean_path("a/../../b"), "../b");
        assert_eq!(clean_path(""), ".");
    }

    #[test]
    fn detects_system_and_secret_paths() {
        assert_eq!(is_sensitive_path("/etc/shadow"), Some("system credential file"));
        assert_eq!(is_sensitive_path("/etc/sudoers.d/admins"), Some("system credential file"));
        assert_eq!(is_sensitive_path("/root/.ssh/id_ed25519"), Some("ssh key material"));
        assert_eq!(is_sensitive_path("/run/secrets/db_password"), Some("secrets mount"));
        assert_eq!(is_sensitive_path("/var/run/secrets/kubernetes.io/token"), Some("secrets mount"));
        assert_eq!(is_sensitive_path("/proc/1234/environ"), Some("process environment"));
    }

    #[test]
    fn detects_key_files_and_dotfiles() {
        assert!(is_sensitive_path("/etc/pve/priv/authkey.key").is_some());
        assert!(is_sensitive_path("certs/server.PEM").is_some());
        assert!(is_sensitive_path("/home/app/.env").is_some());
        assert!(is_sensitive_path("/srv/app/.env.production").is_some());
        assert!(is_sensitive_path("/root/.aws/credentials").is_some());
        assert!(is_sensitive_path("/etc/pulse/nodes.enc").is_some());
    }

    #[test]
    fn ordinary_paths_are_not_sensitive() {
        assert_eq!(is_sensitive_path("/var/log/syslog"), None);
        assert_eq!(is_sensitive_path("/etc/hosts"), None);
        assert_eq!(is_sensitive_path("/proc/meminfo"), None);
        assert_eq!(is_sensitive_path("   "), None);
    }

    #[test]
    fn traversal_cannot_hide_sensitive_path() {
        assert!(is_sensitive_path("/var/log/../../etc/shadow").is_some());
    }

    #[test]
    fn command_scan_strips_quotes_and_flags() {
        let hit = command_touches_sensitive_path("cat '/etc/shadow'").unwrap();
        assert!(hit.starts_with("/etc/shadow"));

        assert!(command_touches_sensitive_path("grep x --file=/root/.ssh/config").is_some());
        assert!(command_touches_sensitive_path("tr '\\0' '\\n' </proc/1/environ").is_some());
        assert!(command_touches_sensitive_path("tail -n 50 /var/log/syslog").is_none());
    }
}
