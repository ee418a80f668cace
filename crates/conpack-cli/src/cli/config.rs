//! Config layering: defaults, then the YAML file, then `CONPACK_*`
//! environment variables, then command-line flags.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use conpack_core::providers::InferenceConfig;
use conpack_core::{GenerationConfig, GenerationConfigOverrides};

/// On-disk config file.
///
/// ```yaml
/// generation:
///   max_rules_per_bundle: 100
///   pack_prefix: essential-eight
/// inference:
///   model: gpt-4o-mini
///   api_key_env: OPENAI_API_KEY
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub generation: GenerationConfigOverrides,
    pub inference: InferenceConfig,
}

impl ConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Fully resolved settings for one command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub generation: GenerationConfig,
    pub inference: InferenceConfig,
}

pub fn resolve(path: Option<&Path>, flags: GenerationConfigOverrides) -> anyhow::Result<Settings> {
    let file = match path {
        Some(p) => ConfigFile::load(p)?,
        None => ConfigFile::default(),
    };
    let overrides = file
        .generation
        .merge(GenerationConfigOverrides::from_env())
        .merge(flags);
    let generation = GenerationConfig::default().apply(overrides);
    generation.validate()?;
    Ok(Settings {
        generation,
        inference: file.inference,
    })
}
