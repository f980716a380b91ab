//! Tool adapters for the Statecraft agent.
//!
//! Tools are how the model acts: it reads and edits the agent state document
//! (`state_query`, `state_modify`), asks the user for more input
//! (`request_input`), and has a couple of small utilities (`get_current_time`,
//! `calculate`). Every tool receives an exclusive [`ToolContext`] for the call.

pub mod calculate;
pub mod clock;
pub mod interrupt;
pub mod registry;
pub mod request_input;
pub mod state_modify;
pub mod state_query;

pub use interrupt::{InterruptError, InterruptSlot};
pub use registry::{Tool, ToolContext, ToolRegistry};

/// Create a registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(state_query::StateQueryTool));
    registry.register(Box::new(state_modify::StateModifyTool));
    registry.register(Box::new(request_input::RequestInputTool));
    registry.register(Box::new(clock::CurrentTimeTool));
    registry.register(Box::new(calculate::CalculateTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_tools() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec![
                "calculate",
                "get_current_time",
                "request_input",
                "state_modify",
                "state_query"
            ]
        );
    }
}
