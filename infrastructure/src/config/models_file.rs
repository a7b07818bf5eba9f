//! Model descriptor file loader.
//!
//! The file is a YAML (or JSON) document with one `models:` map and a
//! `default_models:` list. Invalid or duplicate ids abort startup; an entry
//! whose credential does not resolve to a non-empty secret is forced to
//! `enabled = false` so it is listed but never called.

use crate::config::credentials::CredentialStore;
use crate::providers::ernie::ernie_secret_ref;
use crossmind_domain::{CatalogError, ModelDescriptor, ProviderKind};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading the descriptor file
#[derive(Error, Debug)]
pub enum ModelsFileError {
    #[error("cannot read model file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse model file {path}: {message}")]
    Parse { path: String, message: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f64 {
    0.6
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelEntry {
    provider_kind: ProviderKind,
    model_name: String,
    endpoint: String,
    credential_ref: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    cost_per_1k_tokens: f64,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    specialties: BTreeSet<String>,
}

/// Parsed but not yet credential-checked descriptor file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsFile {
    models: BTreeMap<String, ModelEntry>,
    #[serde(default)]
    default_models: Vec<String>,
}

impl ModelsFile {
    /// Parse the file; format follows the extension (`.json` is JSON,
    /// anything else is YAML).
    pub fn load(path: &Path) -> Result<Self, ModelsFileError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelsFileError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let parse_err = |message: String| ModelsFileError::Parse {
            path: path.display().to_string(),
            message,
        };
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&raw).map_err(|e| parse_err(e.to_string()))
        } else {
            serde_yaml::from_str(&raw).map_err(|e| parse_err(e.to_string()))
        }
    }

    /// Every credential reference the file names, including the derived
    /// secondary secret for ERNIE entries.
    pub fn credential_refs(&self) -> Vec<String> {
        let mut refs = BTreeSet::new();
        for entry in self.models.values() {
            refs.insert(entry.credential_ref.clone());
            if entry.provider_kind == ProviderKind::BaiduErnie {
                refs.insert(ernie_secret_ref(&entry.credential_ref));
            }
        }
        refs.into_iter().collect()
    }

    /// Turn the parsed file into catalog parts, forcing `enabled = false`
    /// where the credential is absent.
    pub fn into_catalog_parts(
        self,
        credentials: &CredentialStore,
    ) -> (Vec<ModelDescriptor>, Vec<String>) {
        let mut descriptors = Vec::with_capacity(self.models.len());
        for (id, entry) in self.models {
            let mut enabled = entry.enabled;
            if enabled && !credentials.has(&entry.credential_ref) {
                warn!(
                    model = %id,
                    credential = %entry.credential_ref,
                    "credential not configured, disabling model"
                );
                enabled = false;
            }
            if enabled
                && entry.provider_kind == ProviderKind::BaiduErnie
                && !credentials.has(&ernie_secret_ref(&entry.credential_ref))
            {
                warn!(model = %id, "secondary secret not configured, disabling model");
                enabled = false;
            }

            descriptors.push(ModelDescriptor {
                display_name: entry.display_name.unwrap_or_else(|| id.clone()),
                id,
                provider_kind: entry.provider_kind,
                endpoint_url: entry.endpoint,
                model_name: entry.model_name,
                credential_ref: entry.credential_ref,
                max_tokens: entry.max_tokens,
                default_temperature: entry.temperature,
                enabled,
                cost_per_1k_tokens: entry.cost_per_1k_tokens,
                specialties: entry.specialties,
            });
        }
        (descriptors, self.default_models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
models:
  gpt4o:
    provider_kind: openai-chat
    model_name: gpt-4o
    endpoint: https://api.openai.com/v1/chat/completions
    credential_ref: OPENAI_API_KEY
    max_tokens: 1024
    cost_per_1k_tokens: 0.01
    display_name: GPT-4o
  claude:
    provider_kind: anthropic-messages
    model_name: claude-sonnet-4-5
    endpoint: https://api.anthropic.com/v1/messages
    credential_ref: ANTHROPIC_API_KEY
  ernie:
    provider_kind: baidu-ernie
    model_name: ernie-bot
    endpoint: https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions
    credential_ref: ERNIE_API_KEY
default_models: [gpt4o, claude]
"#;

    fn write_sample(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_yaml_and_collects_credential_refs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "models.yaml", SAMPLE);

        let file = ModelsFile::load(&path).unwrap();
        let refs = file.credential_refs();
        assert!(refs.contains(&"OPENAI_API_KEY".to_string()));
        assert!(refs.contains(&"ANTHROPIC_API_KEY".to_string()));
        assert!(refs.contains(&"ERNIE_API_KEY".to_string()));
        assert!(refs.contains(&"ERNIE_SECRET_KEY".to_string()));
    }

    #[test]
    fn missing_credential_forces_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "models.yaml", SAMPLE);
        let file = ModelsFile::load(&path).unwrap();

        let credentials = CredentialStore::default().with_secret("OPENAI_API_KEY", "sk-test");
        let (descriptors, defaults) = file.into_catalog_parts(&credentials);

        let gpt = descriptors.iter().find(|d| d.id == "gpt4o").unwrap();
        assert!(gpt.enabled);
        assert_eq!(gpt.max_tokens, 1024);
        assert_eq!(gpt.display_name, "GPT-4o");

        let claude = descriptors.iter().find(|d| d.id == "claude").unwrap();
        assert!(!claude.enabled, "missing credential must disable the model");

        let ernie = descriptors.iter().find(|d| d.id == "ernie").unwrap();
        assert!(!ernie.enabled);

        assert_eq!(defaults, vec!["gpt4o", "claude"]);
    }

    #[test]
    fn ernie_needs_both_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "models.yaml", SAMPLE);
        let file = ModelsFile::load(&path).unwrap();

        let credentials = CredentialStore::default()
            .with_secret("ERNIE_API_KEY", "ak")
            .with_secret("ERNIE_SECRET_KEY", "sk");
        let (descriptors, _) = file.into_catalog_parts(&credentials);
        let ernie = descriptors.iter().find(|d| d.id == "ernie").unwrap();
        assert!(ernie.enabled);
    }

    #[test]
    fn duplicate_model_ids_fail_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        let duplicated = r#"
models:
  same:
    provider_kind: openai-chat
    model_name: a
    endpoint: https://x
    credential_ref: K
  same:
    provider_kind: openai-chat
    model_name: b
    endpoint: https://y
    credential_ref: K
"#;
        let path = write_sample(&dir, "models.yaml", duplicated);
        assert!(matches!(
            ModelsFile::load(&path),
            Err(ModelsFileError::Parse { .. })
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = r#"
models:
  m:
    provider_kind: openai-chat
    model_name: a
    endpoint: https://x
    credential_ref: K
    surprise: true
"#;
        let path = write_sample(&dir, "models.yaml", bad);
        assert!(ModelsFile::load(&path).is_err());
    }

    #[test]
    fn json_files_parse_too() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{
  "models": {
    "m": {
      "provider_kind": "mistral-chat",
      "model_name": "mistral-large",
      "endpoint": "https://api.mistral.ai/v1/chat/completions",
      "credential_ref": "MISTRAL_API_KEY"
    }
  },
  "default_models": ["m"]
}"#;
        let path = write_sample(&dir, "models.json", json);
        let file = ModelsFile::load(&path).unwrap();
        assert_eq!(file.credential_refs(), vec!["MISTRAL_API_KEY".to_string()]);
    }
}
