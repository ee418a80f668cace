//! Bin-packing scenarios for conformance pack bundles.

mod common;

use common::{descriptor, rule_id};
use conpack_core::{pack_rules, PackLimits, RuleDescriptor};

fn rules(n: usize, description_len: usize) -> Vec<RuleDescriptor> {
    (0..n).map(|i| descriptor(&rule_id(i), description_len)).collect()
}

fn default_limits() -> PackLimits {
    PackLimits {
        max_bytes: 51_200,
        max_rules: 130,
    }
}

#[test]
fn test_exactly_max_rules_fit_in_one_bundle() {
    let bundles = pack_rules(&rules(130, 20), "ism-controls", default_limits()).unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].rules.len(), 130);
    assert_eq!(bundles[0].name, "ism-controls-01");
    assert!(!bundles[0].oversized);
    assert!(bundles[0].byte_len() <= 51_200);
}

#[test]
fn test_one_rule_over_count_limit_spills_into_second_bundle() {
    let bundles = pack_rules(&rules(131, 20), "ism-controls", default_limits()).unwrap();
    assert_eq!(bundles.len(), 2);
    assert_eq!(bundles[0].rules.len(), 130);
    assert_eq!(bundles[1].rules.len(), 1);
    assert_eq!(bundles[1].rules[0].rule_identifier, rule_id(130));
    assert_eq!(bundles[1].name, "ism-controls-02");
    assert_eq!(bundles[1].sequence, 2);
}

#[test]
fn test_byte_budget_overflow_at_seventh_rule() {
    let input = rules(10, 500);

    // budget = exact size of a bundle holding the first six rules
    let six = pack_rules(
        &input[..6],
        "p",
        PackLimits {
            max_bytes: usize::MAX,
            max_rules: 130,
        },
    )
    .unwrap();
    assert_eq!(six.len(), 1);
    let budget = six[0].byte_len();

    let bundles = pack_rules(
        &input,
        "p",
        PackLimits {
            max_bytes: budget,
            max_rules: 130,
        },
    )
    .unwrap();
    assert_eq!(bundles.len(), 2);
    assert_eq!(bundles[0].rules.len(), 6);
    assert_eq!(bundles[1].rules.len(), 4);
    assert_eq!(bundles[0].serialized, six[0].serialized);
    assert!(bundles.iter().all(|b| b.byte_len() <= budget && !b.oversized));
}

#[test]
fn test_bounds_hold_and_every_rule_lands_exactly_once() {
    let input: Vec<RuleDescriptor> = (0..200)
        .map(|i| descriptor(&rule_id(i), (i * 37) % 900))
        .collect();
    let limits = PackLimits {
        max_bytes: 8_000,
        max_rules: 17,
    };
    let bundles = pack_rules(&input, "p", limits).unwrap();

    for (idx, bundle) in bundles.iter().enumerate() {
        assert_eq!(bundle.sequence as usize, idx + 1);
        assert!(bundle.rules.len() <= limits.max_rules);
        assert!(bundle.byte_len() <= limits.max_bytes || bundle.oversized);
        assert_eq!(bundle.byte_len(), bundle.serialized.len());
    }

    let packed: Vec<&str> = bundles
        .iter()
        .flat_map(|b| b.rules.iter().map(|r| r.rule_identifier.as_str()))
        .collect();
    let expected: Vec<&str> = input.iter().map(|r| r.rule_identifier.as_str()).collect();
    assert_eq!(packed, expected);
}

#[test]
fn test_oversized_rule_gets_its_own_flagged_bundle() {
    let mut input = rules(3, 10);
    input.insert(1, descriptor("huge-rule", 10_000));
    let bundles = pack_rules(
        &input,
        "p",
        PackLimits {
            max_bytes: 4_000,
            max_rules: 130,
        },
    )
    .unwrap();

    assert_eq!(bundles.len(), 3);
    assert_eq!(bundles[1].rules.len(), 1);
    assert_eq!(bundles[1].rules[0].rule_identifier, "huge-rule");
    assert!(bundles[1].oversized);
    assert!(bundles[1].byte_len() > 4_000);
    assert_eq!(bundles[0].rules.len(), 1);
    assert_eq!(bundles[2].rules.len(), 2);
}

#[test]
fn test_packing_is_byte_identical_across_runs() {
    let input = rules(300, 120);
    let first = pack_rules(&input, "ism-controls", default_limits()).unwrap();
    let second = pack_rules(&input, "ism-controls", default_limits()).unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.serialized, b.serialized);
        assert_eq!(a.digest(), b.digest());
    }
}

#[test]
fn test_bundle_documents_parse_as_yaml() {
    let bundles = pack_rules(&rules(5, 30), "p", default_limits()).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&bundles[0].serialized).unwrap();
    let resources = doc["Resources"].as_mapping().unwrap();
    assert_eq!(resources.len(), 5);
    assert!(bundles[0].serialized.starts_with("# AWS Config Conformance Pack: p-01\n# Rules: 5\n"));
}
