//! Bridge from remote function calls to the lead record

use crate::lead::LeadRecord;
use crate::live::{ToolAck, ToolInvocation, CAPTURE_LEAD_TOOL};
use crate::messages::Message;
use crate::ParleyError;
use serde_json::json;
use tracing::{debug, info, warn};

pub const LEAD_UPDATED_NOTE: &str = "AI Analysis: Updated lead parameters detected.";

/// Result of handling one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Always sent back, exactly once
    pub ack: ToolAck,
    /// Wire names of the lead fields that were set
    pub updated_fields: Vec<&'static str>,
    /// System message to append, if the lead changed
    pub note: Option<Message>,
}

impl ToolOutcome {
    pub fn lead_changed(&self) -> bool {
        !self.updated_fields.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ToolCallBridge;

impl ToolCallBridge {
    pub fn new() -> Self {
        Self
    }

    /// Apply an invocation to `lead` and build its acknowledgement
    pub fn handle(&self, invocation: &ToolInvocation, lead: &mut LeadRecord) -> ToolOutcome {
        if invocation.name != CAPTURE_LEAD_TOOL {
            debug!("Acknowledging unknown function '{}'", invocation.name);
            return ignored(invocation, format!("unknown function '{}'", invocation.name));
        }

        let update = match LeadRecord::from_tool_args(&invocation.args) {
            Ok(update) => update,
            Err(e) => {
                warn!("Rejected {} call {}: {}", invocation.name, invocation.id, e);
                let reason = match e {
                    ParleyError::ToolValidationError(msg) => msg,
                    other => other.to_string(),
                };
                return ignored(invocation, reason);
            }
        };

        let updated_fields = lead.merge(&update);
        info!("Lead updated: {}", updated_fields.join(", "));

        ToolOutcome {
            ack: ToolAck {
                invocation_id: invocation.id.clone(),
                function_name: invocation.name.clone(),
                result: json!({ "result": "Success" }),
            },
            note: (!updated_fields.is_empty()).then(|| Message::system(LEAD_UPDATED_NOTE)),
            updated_fields,
        }
    }
}

fn ignored(invocation: &ToolInvocation, reason: String) -> ToolOutcome {
    ToolOutcome {
        ack: ToolAck {
            invocation_id: invocation.id.clone(),
            function_name: invocation.name.clone(),
            result: json!({ "result": "Ignored", "error": reason }),
        },
        updated_fields: Vec::new(),
        note: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::{AgentPersona, LeadType};
    use crate::messages::Role;
    use serde_json::Value;

    fn invocation(name: &str, args: Value) -> ToolInvocation {
        ToolInvocation {
            id: "call-7".into(),
            name: name.into(),
            args,
        }
    }

    #[test]
    fn test_valid_call_merges_and_acks_success() {
        let bridge = ToolCallBridge::new();
        let mut lead = LeadRecord::new();
        lead.phone = Some("555-0100".into());

        let outcome = bridge.handle(
            &invocation(
                CAPTURE_LEAD_TOOL,
                json!({"type": "emergency", "agentPersona": "mike"}),
            ),
            &mut lead,
        );

        assert_eq!(outcome.ack.invocation_id, "call-7");
        assert_eq!(outcome.ack.result, json!({"result": "Success"}));
        assert_eq!(lead.lead_type, Some(LeadType::Emergency));
        assert_eq!(lead.agent_persona, Some(AgentPersona::Mike));
        assert_eq!(lead.phone.as_deref(), Some("555-0100"));
        assert!(outcome.lead_changed());

        let note = outcome.note.unwrap();
        assert_eq!(note.role, Role::System);
        assert_eq!(note.text, LEAD_UPDATED_NOTE);
    }

    #[test]
    fn test_unknown_function_is_acked_without_change() {
        let bridge = ToolCallBridge::new();
        let mut lead = LeadRecord::new();
        let outcome = bridge.handle(&invocation("bookVisit", json!({})), &mut lead);

        assert_eq!(outcome.ack.function_name, "bookVisit");
        assert_eq!(outcome.ack.result["result"], "Ignored");
        assert!(lead.is_empty());
        assert!(outcome.note.is_none());
    }

    #[test]
    fn test_invalid_enum_is_acked_without_change() {
        let bridge = ToolCallBridge::new();
        let mut lead = LeadRecord::new();
        let outcome = bridge.handle(
            &invocation(
                CAPTURE_LEAD_TOOL,
                json!({"agentPersona": "sarah", "heatingSource": "wood"}),
            ),
            &mut lead,
        );

        assert_eq!(outcome.ack.result["result"], "Ignored");
        assert!(outcome.ack.result["error"].is_string());
        assert!(lead.is_empty());
    }

    #[test]
    fn test_missing_persona_is_rejected() {
        let bridge = ToolCallBridge::new();
        let mut lead = LeadRecord::new();
        let outcome = bridge.handle(
            &invocation(CAPTURE_LEAD_TOOL, json!({"name": "Ana"})),
            &mut lead,
        );
        assert_eq!(outcome.ack.result["result"], "Ignored");
        assert!(lead.name.is_none());
    }
}
