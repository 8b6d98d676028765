//! Property-based tests for route derivation and configuration validation.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use proptest::prelude::*;

use spacecopy_cli::domain::config::{
    CopyConfig, VALID_CONFIG_KEYS, apply_config_value, validate_config_key, validate_config_value,
};
use spacecopy_cli::domain::route::{DomainChoice, HostTemplate, HostVars, choose_domain, first_label};
use spacecopy_common::Domain;

fn label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,10}"
}

fn domain_name() -> impl Strategy<Value = String> {
    prop::collection::vec(label(), 1..4).prop_map(|labels| labels.join("."))
}

fn domains() -> impl Strategy<Value = Vec<Domain>> {
    prop::collection::vec(domain_name(), 0..6).prop_map(|names| {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Domain {
                guid: format!("d{i}"),
                name,
                shared: i % 2 == 0,
            })
            .collect()
    })
}

fn setting(config: &CopyConfig, key: &str) -> u64 {
    match key {
        "retry.attempts" => u64::from(config.retry.attempts),
        "retry.base_delay_ms" => config.retry.base_delay_ms,
        "start.timeout_secs" => config.start.timeout_secs,
        "start.poll_interval_ms" => config.start.poll_interval_ms,
        "http.timeout_secs" => config.http.timeout_secs,
        other => panic!("unexpected key {other}"),
    }
}

// ============================================================================
// choose_domain() property tests
// ============================================================================

proptest! {
    /// The source default always maps to the destination default, whatever
    /// the destination lists.
    #[test]
    fn prop_source_default_maps_to_destination_default(
        name in domain_name(),
        candidates in domains(),
    ) {
        prop_assert_eq!(
            choose_domain(&name, &name.to_uppercase(), &candidates),
            DomainChoice::DestinationDefault
        );
    }

    /// A match shares the source's leading label and is the first such
    /// candidate in listing order.
    #[test]
    fn prop_match_is_first_candidate_with_same_label(
        source in domain_name(),
        default in domain_name(),
        candidates in domains(),
    ) {
        prop_assume!(!source.eq_ignore_ascii_case(&default));
        let expected = candidates
            .iter()
            .position(|d| first_label(&d.name).eq_ignore_ascii_case(first_label(&source)));
        match choose_domain(&source, &default, &candidates) {
            DomainChoice::Matched(found) => {
                let idx = candidates.iter().position(|d| d.guid == found.guid);
                prop_assert_eq!(idx, expected);
            }
            DomainChoice::NoMatch => prop_assert!(expected.is_none()),
            DomainChoice::DestinationDefault => prop_assert!(false, "not the source default"),
        }
    }
}

// ============================================================================
// HostTemplate property tests
// ============================================================================

proptest! {
    /// Text without braces renders to itself.
    #[test]
    fn prop_literal_format_renders_verbatim(text in "[a-z0-9-]{1,30}") {
        let template = HostTemplate::parse(&text).expect("literal parses");
        let vars = HostVars { org: "o", space: "s", app: "a", host: "h" };
        prop_assert_eq!(template.render(&vars), text);
    }

    /// Every variable substitutes its value and nothing else.
    #[test]
    fn prop_variables_substitute_their_values(
        org in label(),
        space in label(),
        app in label(),
        host in label(),
    ) {
        let template = HostTemplate::parse("{{.host}}-{{.app}}-{{.space}}-{{.org}}")
            .expect("parses");
        let vars = HostVars { org: &org, space: &space, app: &app, host: &host };
        prop_assert_eq!(template.render(&vars), format!("{host}-{app}-{space}-{org}"));
    }

    /// Unknown variables are rejected.
    #[test]
    fn prop_unknown_variables_rejected(name in "[a-z]{1,12}") {
        prop_assume!(!["org", "space", "app", "host"].contains(&name.as_str()));
        let format = format!("{{{{.{name}}}}}");
        prop_assert!(HostTemplate::parse(&format).is_err(), "accepted {}", format);
    }
}

// ============================================================================
// validate_config_key() and validate_config_value() property tests
// ============================================================================

proptest! {
    /// Arbitrary keys (not in whitelist) are rejected.
    #[test]
    fn prop_arbitrary_keys_rejected(key in "[a-z]{1,20}\\.[a-z_]{1,20}") {
        if !VALID_CONFIG_KEYS.contains(&key.as_str()) {
            prop_assert!(validate_config_key(&key).is_err(), "accepted invalid key: {key}");
        }
    }

    /// Positive integers are accepted for every key and land in the config.
    #[test]
    fn prop_positive_values_apply(idx in 0..VALID_CONFIG_KEYS.len(), value in 1u32..100_000) {
        let key = VALID_CONFIG_KEYS[idx];
        let mut config = CopyConfig::default();
        prop_assert!(validate_config_value(key, &value.to_string()).is_ok());
        apply_config_value(&mut config, key, &value.to_string()).expect("applies");
        prop_assert_eq!(setting(&config, key), u64::from(value));
    }

    /// Non-numeric values are rejected.
    #[test]
    fn prop_non_numeric_values_rejected(idx in 0..VALID_CONFIG_KEYS.len(), value in "[a-z]{1,10}") {
        prop_assert!(validate_config_value(VALID_CONFIG_KEYS[idx], &value).is_err());
    }
}

#[test]
fn test_config_key_whitelist() {
    assert!(validate_config_key("retry.attempts").is_ok());
    assert!(validate_config_key("http.timeout_secs").is_ok());
    assert!(validate_config_key("unknown.key").is_err());
    assert!(validate_config_key("").is_err());
}

#[test]
fn test_zero_and_negative_values_rejected() {
    assert!(validate_config_value("start.timeout_secs", "0").is_err());
    assert!(validate_config_value("start.timeout_secs", "-5").is_err());
    assert!(validate_config_value("retry.attempts", "4294967296").is_err());
}
