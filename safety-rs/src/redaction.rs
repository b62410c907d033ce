// safety-rs/src/redaction.rs
// Scrubs secrets from command output before it is handed back to the planner.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const REDACTED: &str = "[REDACTED]";

static PEM_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)-----BEGIN ([A-Z0-9 ]+)-----.*?-----END [A-Z0-9 ]+-----").unwrap()
});

static BEARER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(authorization\s*:\s*bearer\s+)\S+").unwrap());

static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^(.*?(?:password|passwd|passphrase|secret|token|api[_-]?key|client[_-]?secret|private[_-]?key)\S*?\s*[:=]\s*)(\S.*)$",
    )
    .unwrap()
});

static AWS_ACCESS_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b").unwrap());

static JWT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").unwrap());

/// Replaces every match for which `rewrite` returns `Some`, counting them.
fn replace_counting<F>(re: &Regex, text: &str, count: &mut usize, mut rewrite: F) -> String
where
    F: FnMut(&Captures<'_>) -> Option<String>,
{
    re.replace_all(text, |caps: &Captures<'_>| match rewrite(caps) {
        Some(replacement) => {
            *count += 1;
            replacement
        }
        None => caps[0].to_string(),
    })
    .into_owned()
}

/// Redacts PEM blocks, secret-looking assignments, bearer tokens, AWS access
/// keys and JWTs. Returns the scrubbed text and the number of redactions.
pub fn redact_sensitive_text(text: &str) -> (String, usize) {
    let mut count = 0usize;

    let out = replace_counting(&PEM_BLOCK, text, &mut count, |caps| {
        Some(format!("-----BEGIN {}-----\n{}\n-----END {}-----", &caps[1], REDACTED, &caps[1]))
    });
    let out = replace_counting(&BEARER_HEADER, &out, &mut count, |caps| {
        Some(format!("{}{}", &caps[1], REDACTED))
    });
    let out = replace_counting(&SECRET_ASSIGNMENT, &out, &mut count, |caps| {
        // Values scrubbed by an earlier pass are left alone.
        (!caps[2].starts_with(REDACTED)).then(|| format!("{}{}", &caps[1], REDACTED))
    });
    let out = replace_counting(&AWS_ACCESS_KEY, &out, &mut count, |_| Some(REDACTED.to_string()));
    let out = replace_counting(&JWT, &out, &mut count, |_| Some(REDACTED.to_string()));

    (out, count)
}
