//! Package name validation following npm naming rules.

use crate::error::{GraftError, GraftResult};

/// Longest name the registry accepts
pub const MAX_NAME_LENGTH: usize = 214;

const RESERVED_NAMES: &[&str] = &["node_modules", "favicon.ico"];

/// Validate an npm package name, optionally scoped (`@scope/name`)
pub fn validate_package_name(name: &str) -> GraftResult<()> {
    let invalid = |reason: &str| {
        Err(GraftError::InvalidPackageName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("name cannot be empty");
    }
    if name.len() > MAX_NAME_LENGTH {
        return invalid("name cannot be longer than 214 characters");
    }
    if name.trim() != name {
        return invalid("name cannot contain leading or trailing spaces");
    }
    if name.starts_with('.') {
        return invalid("name cannot start with a period");
    }
    if name.starts_with('_') {
        return invalid("name cannot start with an underscore");
    }
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return invalid("name cannot contain capital letters");
    }
    if RESERVED_NAMES.contains(&name) {
        return invalid("name is reserved");
    }

    let bare = match name.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, bare)) if !scope.is_empty() && !bare.is_empty() => {
                if !scope.chars().all(is_url_safe) {
                    return invalid("scope contains characters that are not URL-safe");
                }
                if bare.starts_with('.') || bare.starts_with('_') {
                    return invalid("name cannot start with a period or underscore");
                }
                bare
            },
            _ => return invalid("scoped names must have the form @scope/name"),
        },
        None => name,
    };

    if bare.chars().any(|c| matches!(c, '~' | '\'' | '!' | '(' | ')' | '*')) {
        return invalid("name cannot contain special characters (\"~'!()*\")");
    }
    if !bare.chars().all(is_url_safe) {
        return invalid("name can only contain URL-friendly characters");
    }

    Ok(())
}

fn is_url_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '!' | '*' | '\'' | '(' | ')')
}
