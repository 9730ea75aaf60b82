//! Environment variable interpolation for config files.
//!
//! Supports `${VAR}` (error if unset) and `${VAR:-default}` (default when
//! unset or empty). Errors are accumulated so a user sees every missing
//! variable at once.

use regex::Regex;
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid var pattern")
});

/// Interpolate environment variables in the given text.
///
/// Returns the substituted text, or the accumulated list of problems.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            match env::var(name) {
                Ok(value) if value.is_empty() => default.unwrap_or_default().to_string(),
                Ok(value) => value,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        errors.push(format!("environment variable '{name}' is not set"));
                        caps[0].to_string()
                    }
                },
            }
        })
        .to_string();

    if errors.is_empty() { Ok(text) } else { Err(errors) }
}
