use super::*;

#[test]
fn agent_id_roundtrips_through_serde() {
    let id = AgentId::new("worker-1");
    let json = serde_json::to_string(&id).unwrap();
    let back: AgentId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}

#[test]
fn agent_error_display_messages() {
    assert_eq!(AgentError::NotFound.to_string(), "agent not found");
    assert_eq!(
        AgentError::SpawnFailed("tmux missing".into()).to_string(),
        "spawn failed: tmux missing"
    );
    assert_eq!(
        AgentError::DeliveryFailed("pane gone".into()).to_string(),
        "prompt delivery failed: pane gone"
    );
    assert_eq!(AgentError::Other("boom".into()).to_string(), "boom");
}
