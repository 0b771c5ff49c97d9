//! Secret scrubbing for anything written to the invocation audit trail.
//!
//! Provider CLIs are routinely called with tokens in their argument vector
//! (`--token`, `--api-key=…`) and echo credentials in error output. Audit
//! events pass through here before they touch disk.

use regex::Regex;
use std::sync::LazyLock;

/// Flags whose following argument is a credential.
const SECRET_FLAGS: &[&str] = &[
    "--token",
    "--api-key",
    "--api-token",
    "--secret",
    "--password",
    "--client-secret",
    "--access-key",
    "--secret-access-key",
    "--auth-token",
];

static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"(A3T[A-Z0-9]|AKIA|AGPA|AIDA|AROA|AIPA|ANPA|ANVA|ASIA)[0-9A-Z]{16}",
            "[AWS_KEY_REDACTED]",
        ),
        (r"(ghp|gho|ghu|ghs|ghr)_[a-zA-Z0-9_]{36,255}", "[GITHUB_TOKEN_REDACTED]"),
        (r"github_pat_[a-zA-Z0-9_]{22,255}", "[GITHUB_TOKEN_REDACTED]"),
        (r"ya29\.[0-9A-Za-z_\-]{20,}", "[GCP_TOKEN_REDACTED]"),
        (r"(?i)bearer\s+[a-zA-Z0-9_\-\.]{20,}", "[BEARER_REDACTED]"),
        (
            r"-----BEGIN (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----[\s\S]*?-----END (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----",
            "[PEM_KEY_REDACTED]",
        ),
        (
            r#"(?i)(postgres|mysql|mongodb|redis)://[^\s'"]+:[^\s'"]+@[^\s'"]+"#,
            "[CONNECTION_STRING_REDACTED]",
        ),
        (
            r#"(?i)(api[_-]?key|api[_-]?token|secret[_-]?key|client[_-]?secret)['"]?\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{16,}['"]?"#,
            "[API_KEY_REDACTED]",
        ),
        (
            r#"(?i)(password|passwd|pwd)['"]?\s*[:=]\s*['"]?[^\s'"]{8,}['"]?"#,
            "[PASSWORD_REDACTED]",
        ),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("secret pattern"), replacement))
    .collect()
});

/// Replace every recognizable secret in `input`.
pub fn redact_string(input: &str) -> String {
    let mut result = input.to_string();
    for (pattern, replacement) in SECRET_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).into_owned();
    }
    result
}

fn is_secret_flag(arg: &str) -> bool {
    let lower = arg.to_ascii_lowercase();
    SECRET_FLAGS.contains(&lower.as_str())
}

/// Redact an argument vector: values following a credential flag are masked
/// entirely, `--flag=value` forms are masked after the `=`, and every other
/// argument is pattern-scanned.
pub fn redact_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("[REDACTED]".to_string());
            mask_next = false;
            continue;
        }
        if is_secret_flag(arg) {
            out.push(arg.clone());
            mask_next = true;
            continue;
        }
        match arg.split_once('=') {
            Some((flag, _)) if is_secret_flag(flag) => out.push(format!("{}=[REDACTED]", flag)),
            _ => out.push(redact_string(arg)),
        }
    }
    out
}
