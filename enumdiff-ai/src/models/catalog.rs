//! Known-vocabulary catalog
//!
//! Read-only for the duration of a run. The catalog version is part of every
//! cache fingerprint, so editing the catalog invalidates cached analyses.

use crate::models::VocabularyType;
use enumdiff_common::hash::sha256_hex;
use enumdiff_common::text::normalize_vocabulary;
use enumdiff_common::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Known values per vocabulary type
#[derive(Debug, Clone)]
pub struct VocabularyCatalog {
    version: String,
    values: BTreeMap<VocabularyType, Vec<String>>,
    /// normalized value → catalog spelling
    index: HashMap<VocabularyType, HashMap<String, String>>,
}

impl VocabularyCatalog {
    /// Build a catalog; without an explicit version, the version is the
    /// SHA-256 of the canonical JSON of `values`
    pub fn new(values: BTreeMap<VocabularyType, Vec<String>>, version: Option<String>) -> Self {
        let version = version.unwrap_or_else(|| {
            let canonical = serde_json::to_string(&values).unwrap_or_default();
            sha256_hex(&canonical)
        });

        let index = values
            .iter()
            .map(|(ty, vals)| {
                let by_norm = vals
                    .iter()
                    .map(|v| (normalize_vocabulary(v), v.clone()))
                    .collect::<HashMap<_, _>>();
                (*ty, by_norm)
            })
            .collect();

        Self { version, values, index }
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidInput(format!("Read catalog {} failed: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    /// Parse `{ "version"?: "...", "<type>": ["value", ...], ... }`
    ///
    /// Type keys accept the German aliases (`aktivitaet`, `ort`). Unknown
    /// keys are skipped with a warning.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(content)?;
        let object = root
            .as_object()
            .ok_or_else(|| Error::InvalidInput("Catalog must be a JSON object".to_string()))?;

        let mut version = None;
        let mut values: BTreeMap<VocabularyType, Vec<String>> = BTreeMap::new();

        for (key, value) in object {
            if key == "version" {
                version = match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => {
                        return Err(Error::InvalidInput(
                            "Catalog version must be a string or number".to_string(),
                        ))
                    }
                };
                continue;
            }

            let Some(ty) = VocabularyType::parse(key) else {
                tracing::warn!(key = %key, "Skipping unknown vocabulary type in catalog");
                continue;
            };

            let entries = value.as_array().ok_or_else(|| {
                Error::InvalidInput(format!("Catalog entry `{}` must be an array", key))
            })?;

            let list = values.entry(ty).or_default();
            for entry in entries {
                match entry {
                    Value::String(s) if !s.trim().is_empty() => list.push(s.trim().to_string()),
                    Value::String(_) => {}
                    other => {
                        return Err(Error::InvalidInput(format!(
                            "Catalog entry `{}` contains non-string value {}",
                            key, other
                        )))
                    }
                }
            }
        }

        for list in values.values_mut() {
            list.sort();
            list.dedup();
        }

        Ok(Self::new(values, version))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Vocabulary types present in the catalog, in fixed order
    pub fn types(&self) -> impl Iterator<Item = VocabularyType> + '_ {
        self.values.keys().copied()
    }

    pub fn values(&self, ty: VocabularyType) -> &[String] {
        self.values.get(&ty).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Catalog spelling of a value matching `candidate` after normalization
    pub fn find_existing(&self, ty: VocabularyType, candidate: &str) -> Option<&str> {
        let normalized = normalize_vocabulary(candidate);
        self.index
            .get(&ty)
            .and_then(|m| m.get(&normalized))
            .map(String::as_str)
    }

    /// Pretty JSON embedded in the analysis prompt
    pub fn to_prompt_json(&self) -> String {
        let map: BTreeMap<&str, &Vec<String>> =
            self.values.iter().map(|(ty, v)| (ty.as_str(), v)).collect();
        serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
    }
}
