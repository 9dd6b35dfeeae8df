use super::*;
use serde_json::json;

fn sample_event(event_type: &str, data: &[(&str, serde_json::Value)]) -> Event {
    Event {
        event_type: event_type.to_string(),
        data: data
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        agent: AgentId::new("worker-1"),
        run: RunId::new("run-abc"),
        timestamp: 1_000,
    }
}

#[test]
fn matches_requires_exact_event_type() {
    let event = sample_event("tool-completed", &[("tool", json!("Bash"))]);
    assert!(!event.matches("tool-started", &HashMap::new()));
}

#[test]
fn matches_is_a_subset_match_on_data() {
    let event = sample_event(
        "tool-completed",
        &[("tool", json!("Bash")), ("exit_code", json!(0))],
    );
    let mut filter = HashMap::new();
    filter.insert("tool".to_string(), json!("Bash"));
    assert!(event.matches("tool-completed", &filter));
}

#[test]
fn matches_rejects_differing_filter_value() {
    let event = sample_event("tool-completed", &[("tool", json!("Read"))]);
    let mut filter = HashMap::new();
    filter.insert("tool".to_string(), json!("Bash"));
    assert!(!event.matches("tool-completed", &filter));
}

#[test]
fn empty_filter_matches_any_data() {
    let event = sample_event("tool-completed", &[("tool", json!("Bash"))]);
    assert!(event.matches("tool-completed", &HashMap::new()));
}

#[test]
fn matches_compares_numbers_and_strings_as_equal() {
    let event = sample_event("tool-completed", &[("exit_code", json!(0))]);
    let mut filter = HashMap::new();
    filter.insert("exit_code".to_string(), json!("0"));
    assert!(event.matches("tool-completed", &filter));
}

#[test]
fn matches_compares_strings_and_numbers_as_equal_either_direction() {
    let event = sample_event("tool-completed", &[("exit_code", json!("0"))]);
    let mut filter = HashMap::new();
    filter.insert("exit_code".to_string(), json!(0));
    assert!(event.matches("tool-completed", &filter));
}

#[test]
fn matches_compares_booleans_and_strings_as_equal() {
    let event = sample_event("done", &[("ok", json!(true))]);
    let mut filter = HashMap::new();
    filter.insert("ok".to_string(), json!("true"));
    assert!(event.matches("done", &filter));
}
