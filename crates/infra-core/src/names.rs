use crate::error::{InfraError, Result};
use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Stack names
// ---------------------------------------------------------------------------

static STACK_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn stack_name_re() -> &'static Regex {
    STACK_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9\-]*$").unwrap())
}

/// CloudFormation stack names start with a letter, contain only
/// alphanumerics and hyphens, and are at most 128 characters long.
pub fn validate_stack_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 || !stack_name_re().is_match(name) {
        return Err(InfraError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Logical ids
// ---------------------------------------------------------------------------

/// Strip everything that is not ASCII alphanumeric. Logical ids in a
/// template may only contain `[A-Za-z0-9]`.
pub fn sanitize_logical_id(raw: &str) -> Result<String> {
    let id: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if id.is_empty() || id.len() > 255 {
        return Err(InfraError::InvalidName(raw.to_string()));
    }
    Ok(id)
}

// ---------------------------------------------------------------------------
// Domain names
// ---------------------------------------------------------------------------

static LABEL_RE: OnceLock<Regex> = OnceLock::new();

fn label_re() -> &'static Regex {
    LABEL_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?$").unwrap())
}

/// Validate a fully qualified domain name for certificate requests and
/// alias records. A single wildcard is allowed, and only as the first label.
pub fn validate_domain(domain: &str) -> Result<()> {
    let invalid = |reason: &str| InfraError::InvalidDomain {
        domain: domain.to_string(),
        reason: reason.to_string(),
    };

    if domain.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if domain.ends_with('.') {
        return Err(invalid("must not end with a dot"));
    }
    if domain.len() > 253 {
        return Err(invalid("longer than 253 characters"));
    }
    let wildcards = domain.matches('*').count();
    if wildcards > 1 {
        return Err(invalid("only one wildcard is allowed"));
    }
    if wildcards == 1 && !domain.starts_with("*.") {
        return Err(invalid("a wildcard must be the first label, e.g. *.example.com"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("must contain at least two labels"));
    }
    for (i, label) in labels.iter().enumerate() {
        if i == 0 && *label == "*" {
            continue;
        }
        if !label_re().is_match(label) {
            return Err(invalid(&format!("label '{label}' is not a valid DNS label")));
        }
    }
    Ok(())
}

/// True when `hostname` is the zone apex or a name inside `zone`.
pub fn is_within_zone(hostname: &str, zone: &str) -> bool {
    let host = hostname.trim_end_matches('.').to_ascii_lowercase();
    let zone = zone.trim_end_matches('.').to_ascii_lowercase();
    host == zone || host.ends_with(&format!(".{zone}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
