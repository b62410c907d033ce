// safety-rs/src/classifier.rs
// Blocked and read-only command detection.
//
// Both checks run on the normalized command (lowercase, single spaces), so
// "RM  -RF /tmp" and "rm -rf /tmp" are the same command here.

use std::collections::HashSet;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::normalize_command;
use crate::sensitive::command_touches_sensitive_path;

lazy_static! {
    /// Destructive fragments. A match anywhere in the command (at a word
    /// start) vetoes execution, even after human approval.
    static ref BLOCKED_PATTERNS: Vec<&'static str> = vec![
        // Filesystem destruction
        "rm -rf",
        "rm -fr",
        "rm -r /",
        "rm --recursive",
        "rm --no-preserve-root",
        "dd if=/dev/",
        "dd of=/dev/",
        "mkfs",
        "wipefs",
        "shred /dev/",
        "> /dev/sd",
        "chmod -r 777 /",
        "chmod 777 /",
        // Storage and guest destruction
        "zpool destroy",
        "zpool labelclear",
        "zfs destroy",
        "lvremove",
        "vgremove",
        "pvremove",
        "qm destroy",
        "pct destroy",
        "pvesm remove",
        "docker rm -f",
        "docker system prune",
        "docker volume prune",
        // Package removal
        "apt purge",
        "apt-get purge",
        "apt remove",
        "apt-get remove",
        "apt autoremove",
        "yum remove",
        "yum erase",
        "dnf remove",
        "pacman -r",
        // Service and process disruption
        "systemctl stop",
        "systemctl disable",
        "systemctl mask",
        "kill -9",
        "pkill -9",
        "killall",
        // Network disruption
        "iptables -f",
        "iptables --flush",
        "nft flush ruleset",
        "ip link delete",
        "ip link del",
        "ip link set down",
        // Fork bomb
        ":(){",
    ];

    /// Inspection commands that never change state.
    ///
    /// Entries ending in a space or `/` are plain prefixes; all others must be
    /// followed by a space or end of command (so `ls` does not admit `lsof`).
    static ref READ_ONLY_PREFIXES: Vec<&'static str> = vec![
        "cat", "ls", "ll", "df", "du", "free", "uptime", "ps", "pgrep", "top -b",
        "uname", "hostname", "hostnamectl", "whoami", "id", "date", "w", "who",
        "lsblk", "lscpu", "lsmem", "lspci", "lsusb", "blkid", "findmnt", "stat",
        "head", "tail", "grep", "wc", "vmstat", "iostat", "mpstat", "sensors",
        "ip addr", "ip a", "ip route", "ip r", "ip link show", "ss", "netstat",
        "ping -c", "dig", "nslookup",
        "systemctl status", "systemctl is-active", "systemctl is-enabled",
        "systemctl is-failed", "systemctl list-units", "systemctl list-timers",
        "systemctl show", "service --status-all", "journalctl", "dmesg",
        "docker ps", "docker logs", "docker inspect", "docker stats --no-stream",
        "docker images", "docker info", "docker version", "docker compose ps",
        "kubectl get", "kubectl describe", "kubectl logs", "kubectl top",
        "pct list", "pct status", "pct config", "pct df",
        "qm list", "qm status", "qm config",
        "pvesh get", "pvesm status", "pvecm status", "pvecm nodes", "pveversion",
        "zpool status", "zpool list", "zpool iostat", "zfs list", "zfs get",
        "smartctl -a", "smartctl -h", "smartctl -i",
        "proxmox-backup-manager datastore list", "proxmox-backup-manager task list",
        "cat /proc/", "cat /sys/",
    ];

    /// Filters allowed on the right-hand side of a pipe.
    static ref PIPE_TARGETS: HashSet<&'static str> = [
        "grep", "egrep", "fgrep", "awk", "sed", "sort", "uniq", "wc", "head",
        "tail", "cut", "tr", "jq", "yq", "column",
    ]
    .into_iter()
    .collect();

    /// Shell constructs that chain, substitute, or redirect. Their presence
    /// disqualifies a command from the read-only class.
    static ref UNSAFE_SHELL_TOKENS: Vec<&'static str> = vec![
        ";", "&&", "||", "$(", "`", ">", "<(", "&",
    ];
}

/// Strictest class a command falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandClass {
    ReadOnly,
    Mutating,
    Sensitive,
    Blocked,
}

impl CommandClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandClass::ReadOnly => "read_only",
            CommandClass::Mutating => "mutating",
            CommandClass::Sensitive => "sensitive",
            CommandClass::Blocked => "blocked",
        }
    }
}

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// True when `needle` occurs in `haystack` at a position not preceded by a
/// word character, so `kill -9` does not fire inside `skill -9x`.
pub(crate) fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .map(|c| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(true)
    })
}

/// Case-insensitive check against the destructive pattern list.
pub fn is_blocked_command(command: &str) -> bool {
    let normalized = normalize_command(command);
    BLOCKED_PATTERNS
        .iter()
        .any(|pattern| contains_at_word_start(&normalized, pattern))
}

fn matches_read_only_prefix(segment: &str) -> bool {
    READ_ONLY_PREFIXES.iter().any(|prefix| {
        if prefix.ends_with(' ') || prefix.ends_with('/') {
            segment.starts_with(prefix)
        } else {
            segment == *prefix
                || segment
                    .strip_prefix(prefix)
                    .map(|rest| rest.starts_with(' '))
                    .unwrap_or(false)
        }
    })
}

fn is_safe_pipe_target(segment: &str) -> bool {
    let mut tokens = segment.split(' ');
    let program = match tokens.next() {
        Some(p) if PIPE_TARGETS.contains(p) => p,
        _ => return false,
    };

    match program {
        // In-place editing turns sed into a writer.
        "sed" => !tokens.any(|t| {
            t == "--in-place"
                || t.starts_with("--in-place=")
                || (t.starts_with('-') && !t.starts_with("--") && t.contains('i'))
        }),
        "awk" => !segment.contains("system(") && !segment.contains("print >"),
        _ => true,
    }
}

/// Whether the command only inspects state.
///
/// Piped commands qualify when the first segment is read-only and every
/// later segment is read-only or an allow-listed filter (`sed -i` is not).
pub fn is_read_only_command(command: &str) -> bool {
    let normalized = normalize_command(command);
    if normalized.is_empty() {
        return false;
    }
    if UNSAFE_SHELL_TOKENS.iter().any(|t| normalized.contains(t)) {
        return false;
    }

    let mut segments = normalized.split('|').map(str::trim);
    match segments.next() {
        Some(first) if !first.is_empty() && matches_read_only_prefix(first) => {}
        _ => return false,
    }

    segments.all(|segment| {
        !segment.is_empty() && (matches_read_only_prefix(segment) || is_safe_pipe_target(segment))
    })
}

/// Returns the strictest class matching the command: blocked overrides
/// everything, then sensitive-path access, then read-only; anything else
/// mutates state.
pub fn classify_command(command: &str) -> CommandClass {
    if is_blocked_command(command) {
        CommandClass::Blocked
    } else if command_touches_sensitive_path(command).is_some() {
        CommandClass::Sensitive
    } else if is_read_only_command(command) {
        CommandClass::ReadOnly
    } else {
        CommandClass::Mutating
    }
}
