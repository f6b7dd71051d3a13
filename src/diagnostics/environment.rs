//! Environment Check Module
//!
//! Sanity checks on the backend settings: presence, leftover template values
//! and obviously malformed values. Each issue names the variable it concerns.

use reqwest::Url;

use crate::diagnostics::EnvironmentStatus;

/// Variable holding the backend project URL.
pub const URL_VAR: &str = "SUPABASE_URL";

/// Variable holding the backend anonymous API key.
pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";

/// Fragments of the values shipped in the sample configuration.
pub const PLACEHOLDER_MARKERS: &[&str] = &[
    "your-project-ref",
    "your-anon-key",
    "your_supabase",
    "placeholder",
];

// == Backend Settings ==
/// Backend connection values as read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl BackendSettings {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            anon_key: Some(anon_key.into()),
        }
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var(URL_VAR).ok(),
            anon_key: std::env::var(ANON_KEY_VAR).ok(),
        }
    }
}

// == Verify ==
/// Checks the settings and lists every problem found.
pub fn verify_environment(settings: &BackendSettings) -> EnvironmentStatus {
    let mut issues = Vec::new();

    if let Some(url) = present(URL_VAR, settings.url.as_deref(), &mut issues) {
        if !has_placeholder(URL_VAR, url, &mut issues) {
            check_url(url, &mut issues);
        }
    }

    if let Some(key) = present(ANON_KEY_VAR, settings.anon_key.as_deref(), &mut issues) {
        if !has_placeholder(ANON_KEY_VAR, key, &mut issues) && !looks_like_jwt(key) {
            issues.push(format!(
                "{ANON_KEY_VAR} does not look like a JWT (expected three dot-separated parts)"
            ));
        }
    }

    EnvironmentStatus {
        valid: issues.is_empty(),
        issues,
    }
}

fn present<'a>(name: &str, value: Option<&'a str>, issues: &mut Vec<String>) -> Option<&'a str> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Some(value),
        _ => {
            issues.push(format!("{name} is not set"));
            None
        }
    }
}

fn has_placeholder(name: &str, value: &str, issues: &mut Vec<String>) -> bool {
    let lowered = value.to_ascii_lowercase();
    match PLACEHOLDER_MARKERS
        .iter()
        .find(|marker| lowered.contains(*marker))
    {
        Some(marker) => {
            issues.push(format!("{name} still contains the placeholder value '{marker}'"));
            true
        }
        None => false,
    }
}

fn check_url(url: &str, issues: &mut Vec<String>) {
    match Url::parse(url) {
        Ok(parsed) => {
            let local = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1"));
            if parsed.scheme() != "https" && !local {
                issues.push(format!(
                    "{URL_VAR} must use https (found '{}')",
                    parsed.scheme()
                ));
            }
        }
        Err(err) => issues.push(format!("{URL_VAR} is not a valid URL: {err}")),
    }
}

fn looks_like_jwt(key: &str) -> bool {
    let parts: Vec<&str> = key.split('.').collect();
    parts.len() == 3 && parts.iter().all(|part| !part.is_empty())
}
