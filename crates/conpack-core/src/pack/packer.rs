//! Greedy single-pass bin-packing of enriched rules into bounded bundles.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::naming::{bundle_file_name, pack_name};
use super::render::{render_rule, DocumentBody, RuleFragment};
use crate::config::GenerationConfig;
use crate::errors::AssemblyError;
use crate::model::RuleDescriptor;

/// Size bounds applied to every bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackLimits {
    pub max_bytes: usize,
    pub max_rules: usize,
}

impl PackLimits {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_bytes: config.max_bundle_bytes,
            max_rules: config.max_rules_per_bundle,
        }
    }
}

/// One serialized conformance pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// 1-based, contiguous.
    pub sequence: u32,
    pub name: String,
    pub rules: Vec<RuleDescriptor>,
    pub serialized: String,
    /// A single rule larger than the byte budget on its own.
    pub oversized: bool,
}

impl Bundle {
    pub fn byte_len(&self) -> usize {
        self.serialized.len()
    }

    pub fn file_name(&self) -> String {
        bundle_file_name(&self.name)
    }

    /// Hex-encoded SHA-256 of the serialized document.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.serialized.as_bytes()))
    }
}

struct OpenBundle {
    sequence: u32,
    name: String,
    rules: Vec<RuleDescriptor>,
    used_names: HashSet<String>,
    body: DocumentBody,
}

impl OpenBundle {
    fn new(prefix: &str, sequence: u32) -> Self {
        Self {
            sequence,
            name: pack_name(prefix, sequence),
            rules: Vec::new(),
            used_names: HashSet::new(),
            body: DocumentBody::default(),
        }
    }

    fn render(&self, rule: &RuleDescriptor) -> Result<RuleFragment, AssemblyError> {
        render_rule(rule, &self.used_names).map_err(|e| AssemblyError::Render {
            name: self.name.clone(),
            message: format!("{}: {e}", rule.rule_identifier),
        })
    }

    fn bytes_with(&self, fragment: &RuleFragment) -> usize {
        self.body
            .len_with(&self.name, self.rules.len() + 1, Some(fragment))
    }

    fn push(&mut self, rule: &RuleDescriptor, fragment: RuleFragment) {
        self.body.push(&fragment);
        self.used_names.insert(fragment.resource_name);
        self.used_names.extend(fragment.parameter_keys);
        self.rules.push(rule.clone());
    }

    fn close(self, limits: PackLimits) -> Bundle {
        let serialized = self.body.render(&self.name, self.rules.len());
        let oversized = serialized.len() > limits.max_bytes;
        if oversized {
            warn!(
                bundle = %self.name,
                bytes = serialized.len(),
                max_bytes = limits.max_bytes,
                "rule exceeds bundle byte budget on its own, placed alone"
            );
        }
        debug!(
            bundle = %self.name,
            rules = self.rules.len(),
            bytes = serialized.len(),
            "closed bundle"
        );
        Bundle {
            sequence: self.sequence,
            name: self.name,
            rules: self.rules,
            serialized,
            oversized,
        }
    }
}

/// Pack `rules` in the given order.
///
/// The current bundle is closed before a rule that would push it past
/// `max_rules` or `max_bytes`. Rules are never reordered, so the same input
/// always yields the same bundles, byte for byte.
pub fn pack_rules(
    rules: &[RuleDescriptor],
    prefix: &str,
    limits: PackLimits,
) -> Result<Vec<Bundle>, AssemblyError> {
    let mut bundles = Vec::new();
    let mut current = OpenBundle::new(prefix, 1);

    for rule in rules {
        let mut fragment = current.render(rule)?;
        let fits = current.rules.len() < limits.max_rules
            && current.bytes_with(&fragment) <= limits.max_bytes;

        if !fits && !current.rules.is_empty() {
            let next = current.sequence + 1;
            bundles.push(std::mem::replace(&mut current, OpenBundle::new(prefix, next)).close(limits));
            fragment = current.render(rule)?;
        }
        current.push(rule, fragment);
    }

    if !current.rules.is_empty() {
        bundles.push(current.close(limits));
    }
    Ok(bundles)
}
