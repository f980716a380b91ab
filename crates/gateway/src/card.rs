//! The agent card served at `/{agent_id}/.well-known/agent-card.json`.

use serde::Serialize;

const TEXT_PLAIN: &str = "text/plain";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    pub url: String,
    pub capabilities: AgentCapabilities,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub skills: Vec<AgentSkill>,
    pub preferred_transport: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl AgentCard {
    /// The supervisor's card, advertising `url` as its JSON-RPC endpoint.
    pub fn supervisor(url: impl Into<String>) -> Self {
        Self {
            name: "Supervisor".into(),
            description: "A supervisor agent that can oversee the execution of other agents".into(),
            version: "1.0.0".into(),
            url: url.into(),
            capabilities: AgentCapabilities {
                streaming: true,
                push_notifications: false,
                state_transition_history: false,
            },
            default_input_modes: vec![TEXT_PLAIN.into()],
            default_output_modes: vec![TEXT_PLAIN.into()],
            skills: vec![AgentSkill {
                id: "chat".into(),
                name: "Chat".into(),
                description: "General conversation and task supervision".into(),
                tags: vec!["chat".into(), "supervision".into()],
            }],
            preferred_transport: "JSONRPC".into(),
        }
    }
}

/// Public endpoint URL for an agent served by this gateway.
pub fn endpoint_url(host: &str, port: u16, agent_id: &str) -> String {
    format!("http://{host}:{port}/{agent_id}/")
}
