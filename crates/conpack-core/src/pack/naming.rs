//! Names used inside and around conformance-pack documents.

use std::collections::HashSet;

/// `my-rule-name` / `MY_RULE_NAME` -> `MyRuleName`; `myRuleName` -> `MyRuleName`.
///
/// Characters that are not ASCII alphanumeric are dropped so the result is a
/// valid template logical id. Falls back to `Rule` when nothing is left.
pub fn to_pascal_case(text: &str) -> String {
    let text = text.trim();
    let camel = !text.contains(['-', '_']) && text.starts_with(|c: char| c.is_lowercase());

    let out: String = if camel {
        let mut chars = text.chars();
        chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect())
            .unwrap_or_default()
    } else {
        text.split(['-', '_'])
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect::<String>(),
                    None => String::new(),
                }
            })
            .collect()
    };

    let out: String = out.chars().filter(char::is_ascii_alphanumeric).collect();
    if out.is_empty() {
        "Rule".to_string()
    } else {
        out
    }
}

/// Condition key for a parameter key: first letter lower-cased.
pub fn condition_name(parameter_key: &str) -> String {
    let mut chars = parameter_key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `base`, or `base2`, `base3`, ... whichever is not yet in `used`.
pub fn unique_name(base: &str, used: &HashSet<String>) -> String {
    if !used.contains(base) {
        return base.to_string();
    }
    (2u32..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Pack names are always numbered: `{prefix}-01`, `{prefix}-02`, ...
pub fn pack_name(prefix: &str, sequence: u32) -> String {
    format!("{prefix}-{sequence:02}")
}

pub fn bundle_file_name(pack_name: &str) -> String {
    format!("conformance-pack-{pack_name}.yaml")
}
