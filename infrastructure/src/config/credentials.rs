//! Credential resolution.
//!
//! Secrets are named by environment variable in the model descriptor file and
//! resolved once at startup. The store only ever exposes masked values for
//! display; adapters get the raw secret through [`CredentialStore::resolve`].

use std::collections::HashMap;

/// Startup-resolved secrets keyed by their environment variable name.
#[derive(Debug, Default)]
pub struct CredentialStore {
    secrets: HashMap<String, String>,
}

impl CredentialStore {
    /// Resolve every named reference from the process environment. Empty
    /// values count as absent.
    pub fn from_env<I>(refs: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut secrets = HashMap::new();
        for name in refs {
            let name = name.as_ref();
            if let Ok(value) = std::env::var(name) {
                let value = value.trim().to_string();
                if !value.is_empty() {
                    secrets.insert(name.to_string(), value);
                }
            }
        }
        Self { secrets }
    }

    /// Insert a secret directly. Test and wiring helper.
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    /// Raw secret for a reference, if configured.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.secrets.contains_key(name)
    }

    /// Masked form for display: first and last four characters survive.
    pub fn masked(&self, name: &str) -> String {
        match self.secrets.get(name) {
            None => "not configured".to_string(),
            Some(value) if value.len() > 8 => {
                format!("{}****{}", &value[..4], &value[value.len() - 4..])
            }
            Some(_) => "****".to_string(),
        }
    }
}
