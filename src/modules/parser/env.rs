//! `{{ env.NAME }}` placeholder substitution for action files

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;
use switchyard_core::SwitchyardError;

static ENV_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap()
});

/// Load a `.env` file from the working directory, if one exists
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Load a specific env file; a missing file is a configuration error
pub fn load_env_file(path: &Path) -> Result<(), SwitchyardError> {
    dotenvy::from_path(path).map_err(|e| {
        SwitchyardError::Config(format!(
            "Failed to load env file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Replaces `{{ env.NAME }}` placeholders with process environment values
pub struct EnvSubstitutor {
    /// Fail on missing variables instead of leaving the placeholder
    strict: bool,
}

impl EnvSubstitutor {
    pub fn new() -> Self {
        Self { strict: true }
    }

    /// Leaves placeholders for unset variables untouched
    pub fn lenient() -> Self {
        Self { strict: false }
    }

    /// Substitute placeholders using the process environment
    pub fn substitute(&self, content: &str) -> Result<String, SwitchyardError> {
        self.substitute_with(content, |name| std::env::var(name).ok())
    }

    /// Substitute placeholders using an arbitrary lookup
    pub fn substitute_with<F>(&self, content: &str, lookup: F) -> Result<String, SwitchyardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing: Vec<String> = Vec::new();

        let replaced = ENV_PATTERN.replace_all(content, |caps: &Captures<'_>| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });

        if self.strict && !missing.is_empty() {
            return Err(SwitchyardError::EnvVarNotFound(missing.join(", ")));
        }

        Ok(replaced.into_owned())
    }

    /// Check if a string contains environment variable placeholders
    pub fn has_placeholders(content: &str) -> bool {
        ENV_PATTERN.is_match(content)
    }

    /// Names referenced by placeholders, in order of first appearance
    pub fn extract_var_names(content: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in ENV_PATTERN.captures_iter(content) {
            let name = &caps[1];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

impl Default for EnvSubstitutor {
    fn default() -> Self {
        Self::new()
    }
}
