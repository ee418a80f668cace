//! Environment layering for generation and inference settings.

use conpack_core::config::{GenerationConfig, GenerationConfigOverrides};
use conpack_core::providers::InferenceConfig;
use serial_test::serial;

const VARS: &[&str] = &[
    "CONPACK_BATCH_SIZE",
    "CONPACK_MAX_BUNDLE_BYTES",
    "CONPACK_ENRICHMENT_MAX_RETRIES",
    "CONPACK_PACK_PREFIX",
    "CONPACK_TEST_API_KEY",
];

fn clear() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    clear();
    std::env::set_var("CONPACK_BATCH_SIZE", "25");
    std::env::set_var("CONPACK_MAX_BUNDLE_BYTES", " 40000 ");
    std::env::set_var("CONPACK_PACK_PREFIX", "essential-eight");

    let cfg = GenerationConfig::from_env();
    assert_eq!(cfg.batch_size, 25);
    assert_eq!(cfg.max_bundle_bytes, 40_000);
    assert_eq!(cfg.pack_prefix, "essential-eight");
    assert_eq!(cfg.max_rules_per_bundle, 130);
    clear();
}

#[test]
#[serial]
fn test_unparseable_env_values_are_ignored() {
    clear();
    std::env::set_var("CONPACK_ENRICHMENT_MAX_RETRIES", "lots");
    std::env::set_var("CONPACK_PACK_PREFIX", "   ");

    let overrides = GenerationConfigOverrides::from_env();
    assert_eq!(overrides.enrichment_max_retries, None);
    assert_eq!(overrides.pack_prefix, None);
    clear();
}

#[test]
#[serial]
fn test_inference_client_needs_api_key() {
    clear();
    let config = InferenceConfig {
        api_key_env: "CONPACK_TEST_API_KEY".into(),
        ..InferenceConfig::default()
    };
    let err = config.build_client().err().expect("missing key must fail");
    assert_eq!(err.field, "inference.api_key_env");

    std::env::set_var("CONPACK_TEST_API_KEY", "sk-test");
    let client = config.build_client().unwrap();
    assert_eq!(client.model, config.model);
    clear();
}
