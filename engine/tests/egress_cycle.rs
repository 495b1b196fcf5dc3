//! Dynamic egress cycle behavior: strict validation, atomic installs,
//! and the loud zero-address failure mode.

use engine::egress::run_egress_cycle;
use engine::io::config::{EgressConfig, EngineConfig};
use engine::test_support::{RecordingFirewall, ScriptedResolver};

fn config_with_domains(domains: &[&str]) -> EngineConfig {
    EngineConfig {
        egress: EgressConfig {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            ..EgressConfig::default()
        },
        ..EngineConfig::default()
    }
}

#[test]
fn installs_valid_addresses_and_drops_garbage() {
    let config = config_with_domains(&["api.example.test"]);
    let resolver = ScriptedResolver::default().with(
        "api.example.test",
        &["160.79.104.10", "not-an-address", "2607:6bc0::1"],
    );
    let firewall = RecordingFirewall::default();

    let report = run_egress_cycle(&config, &resolver, &firewall).expect("cycle");

    assert_eq!(report.v4, 1);
    assert_eq!(report.v6, 1);
    assert_eq!(report.rejected, 1);

    let scripts = firewall.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("flush set inet engine-egress allow4"));
    assert!(scripts[0].contains("add element inet engine-egress allow4 { 160.79.104.10 }"));
    assert!(scripts[0].contains("add element inet engine-egress allow6 { 2607:6bc0::1 }"));
}

#[test]
fn zero_valid_addresses_fails_loudly_and_installs_nothing() {
    let config = config_with_domains(&["api.example.test", "cdn.example.test"]);
    let resolver = ScriptedResolver::default()
        .with("api.example.test", &["garbage", ""])
        .with("cdn.example.test", &[]);
    let firewall = RecordingFirewall::default();

    let err = run_egress_cycle(&config, &resolver, &firewall).unwrap_err();

    assert!(err.to_string().contains("zero valid addresses"));
    assert!(firewall.scripts().is_empty());
}

#[test]
fn one_failing_domain_does_not_abort_the_cycle() {
    let config = config_with_domains(&["dead.example.test", "api.example.test"]);
    // dead.example.test has no scripted answer, so resolution errors.
    let resolver =
        ScriptedResolver::default().with("api.example.test", &["160.79.104.10"]);
    let firewall = RecordingFirewall::default();

    let report = run_egress_cycle(&config, &resolver, &firewall).expect("cycle");
    assert_eq!(report.v4, 1);
    assert_eq!(firewall.scripts().len(), 1);
}

#[test]
fn single_family_resolution_leaves_the_other_set_untouched() {
    let config = config_with_domains(&["api.example.test"]);
    let resolver =
        ScriptedResolver::default().with("api.example.test", &["160.79.104.10"]);
    let firewall = RecordingFirewall::default();

    run_egress_cycle(&config, &resolver, &firewall).expect("cycle");

    let scripts = firewall.scripts();
    assert!(scripts[0].contains("allow4"));
    assert!(!scripts[0].contains("allow6"));
}
