//! Conformance-pack YAML rendering.
//!
//! A document is the plain concatenation of a comment header and the
//! `Parameters`, `Conditions` and `Resources` sections, each built from
//! per-rule fragments rendered by `serde_yaml`. Because nothing is
//! re-formatted after concatenation, the length of a document can be computed
//! exactly from its parts before it is produced.

use std::collections::HashSet;

use serde_yaml::{Mapping, Value};

use super::naming::{bundle_file_name, condition_name, to_pascal_case, unique_name};
use crate::model::RuleDescriptor;

const PARAMETERS_HEADER: &str = "Parameters:\n";
const CONDITIONS_HEADER: &str = "Conditions:\n";
const RESOURCES_HEADER: &str = "Resources:\n";
const DEFAULT_DESCRIPTION: &str = "AWS Config Rule";

/// Rendered YAML for one rule, each part already indented for its section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFragment {
    pub resource_name: String,
    /// Parameter keys introduced by this rule.
    pub parameter_keys: Vec<String>,
    pub parameters: String,
    pub conditions: String,
    pub resource: String,
}

/// Render `rule`, choosing logical names not already in `used`.
pub fn render_rule(
    rule: &RuleDescriptor,
    used: &HashSet<String>,
) -> Result<RuleFragment, serde_yaml::Error> {
    let resource_name = unique_name(&to_pascal_case(&rule.rule_identifier), used);

    let mut taken = used.clone();
    taken.insert(resource_name.clone());

    let mut parameter_keys = Vec::new();
    let mut parameters = String::new();
    let mut conditions = String::new();
    let mut input_parameters = Mapping::new();

    for param in &rule.parameters {
        if param.default.is_none() && !param.required {
            continue;
        }
        let key = unique_name(
            &format!("{resource_name}Param{}", to_pascal_case(&param.name)),
            &taken,
        );
        taken.insert(key.clone());

        let mut declaration = Mapping::new();
        let reference = ref_to(&key);
        match &param.default {
            Some(default) => {
                declaration.insert("Default".into(), default.as_str().into());
                declaration.insert("Type".into(), "String".into());

                let condition = condition_name(&key);
                conditions.push_str(&entry(&condition, not_empty(&key))?);
                input_parameters.insert(
                    param.name.as_str().into(),
                    single(
                        "Fn::If",
                        Value::Sequence(vec![
                            condition.into(),
                            reference,
                            ref_to("AWS::NoValue"),
                        ]),
                    ),
                );
            }
            None => {
                declaration.insert("Type".into(), "String".into());
                input_parameters.insert(param.name.as_str().into(), reference);
            }
        }
        parameters.push_str(&entry(&key, Value::Mapping(declaration))?);
        parameter_keys.push(key);
    }

    let mut source = Mapping::new();
    source.insert("Owner".into(), rule.source_owner.as_str().into());
    source.insert(
        "SourceIdentifier".into(),
        rule.source_identifier.as_str().into(),
    );

    let description = if rule.description.is_empty() {
        DEFAULT_DESCRIPTION
    } else {
        rule.description.as_str()
    };

    let mut properties = Mapping::new();
    properties.insert("ConfigRuleName".into(), rule.display_name.as_str().into());
    properties.insert("Description".into(), description.into());
    properties.insert("Source".into(), Value::Mapping(source));
    if !input_parameters.is_empty() {
        properties.insert("InputParameters".into(), Value::Mapping(input_parameters));
    }

    let mut resource = Mapping::new();
    resource.insert("Type".into(), "AWS::Config::ConfigRule".into());
    resource.insert("Properties".into(), Value::Mapping(properties));

    Ok(RuleFragment {
        resource: entry(&resource_name, Value::Mapping(resource))?,
        resource_name,
        parameter_keys,
        parameters,
        conditions,
    })
}

pub fn render_header(pack_name: &str, rule_count: usize) -> String {
    format!(
        "# AWS Config Conformance Pack: {pack_name}\n\
         # Rules: {rule_count}\n\
         # Source: control mappings enriched by conpack\n\
         #\n\
         # Deploy with:\n\
         #   aws configservice put-conformance-pack --conformance-pack-name {pack_name} --template-body file://{file}\n\n",
        file = bundle_file_name(pack_name),
    )
}

/// Section bodies of a document under construction.
#[derive(Debug, Clone, Default)]
pub struct DocumentBody {
    parameters: String,
    conditions: String,
    resources: String,
}

impl DocumentBody {
    pub fn push(&mut self, fragment: &RuleFragment) {
        self.parameters.push_str(&fragment.parameters);
        self.conditions.push_str(&fragment.conditions);
        self.resources.push_str(&fragment.resource);
    }

    /// Exact length of `render(pack_name, rule_count)` if `extra` were pushed.
    pub fn len_with(&self, pack_name: &str, rule_count: usize, extra: Option<&RuleFragment>) -> usize {
        let section = |header: &str, body: &str, more: usize| {
            let len = body.len() + more;
            if len == 0 {
                0
            } else {
                header.len() + len
            }
        };
        let (p, c, r) = extra.map_or((0, 0, 0), |f| {
            (f.parameters.len(), f.conditions.len(), f.resource.len())
        });

        render_header(pack_name, rule_count).len()
            + section(PARAMETERS_HEADER, &self.parameters, p)
            + section(CONDITIONS_HEADER, &self.conditions, c)
            + RESOURCES_HEADER.len()
            + self.resources.len()
            + r
    }

    pub fn render(&self, pack_name: &str, rule_count: usize) -> String {
        let mut out = render_header(pack_name, rule_count);
        if !self.parameters.is_empty() {
            out.push_str(PARAMETERS_HEADER);
            out.push_str(&self.parameters);
        }
        if !self.conditions.is_empty() {
            out.push_str(CONDITIONS_HEADER);
            out.push_str(&self.conditions);
        }
        out.push_str(RESOURCES_HEADER);
        out.push_str(&self.resources);
        out
    }
}

fn ref_to(name: &str) -> Value {
    single("Ref", name.into())
}

fn not_empty(parameter_key: &str) -> Value {
    let equals = single(
        "Fn::Equals",
        Value::Sequence(vec!["".into(), ref_to(parameter_key)]),
    );
    single("Fn::Not", Value::Sequence(vec![equals]))
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Mapping::new();
    map.insert(key.into(), value);
    Value::Mapping(map)
}

/// `key: value` rendered as YAML and indented one level.
fn entry(key: &str, value: Value) -> Result<String, serde_yaml::Error> {
    let mut map = Mapping::new();
    map.insert(key.into(), value);
    let text = serde_yaml::to_string(&map)?;

    let mut out = String::with_capacity(text.len() + 32);
    for line in text.lines() {
        if !line.is_empty() {
            out.push_str("  ");
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}
