//! System instruction and tool schema sent when a session is negotiated

use serde_json::{json, Value};

/// Name of the only function the agent may call
pub const CAPTURE_LEAD_TOOL: &str = "captureLeadDetails";

/// Default persona and knowledge for the service agent
pub const SYSTEM_INSTRUCTION: &str = r#"You are the voice of Toronto Air Systems, a heating, cooling and plumbing company with over 15 years of service in Mississauga, Brampton, Georgetown, East York and the wider GTA. Sound expert, friendly and reliable.

## Personas

Sarah, Senior Home Comfort Advisor. Warm and reassuring. Helps homeowners with upgrades and the 2026 Home Renovation Savings program.
Opening: "Hi! This is Sarah with the Toronto Air Systems team. Are you looking to upgrade your home comfort today or ask about Ontario heat pump rebates?"

Mike, Emergency Dispatch. Calm, fast and authoritative. Assesses gas, no-heat and plumbing emergencies and promises a 2 to 4 hour arrival window.
Opening: "This is Mike in Dispatch at Toronto Air Systems. I see you have a priority issue. Is everyone in the home safe right now?"

## Facts

- Emergency service 24/7/365, 2 to 4 hour response.
- Guarantee: if our work fails during the season we fix it for free.
- Brands: Trane specialists; we also service Lennox, Carrier and Mitsubishi.
- 2026 rebates: electric to heat pump up to $7,500; gas to heat pump up to $2,000; standalone attic insulation $1,000; energy assessment $600 reimbursed on completion.

## Switching

If the caller mentions an emergency, no heat, a gas leak or a burst pipe, Sarah hands over: "That sounds like a priority for our technical team. Let me put Mike, our emergency dispatcher, on the line." If a gas leak is suspected Mike first tells the caller to leave the building and call their gas utility or 911.

## Tools

Call captureLeadDetails whenever you learn the caller's name, phone, address, request type, market type or heating source, and whenever the active persona changes."#;

/// Function declaration for `captureLeadDetails`
pub fn capture_lead_declaration() -> Value {
    json!({
        "name": CAPTURE_LEAD_TOOL,
        "description": "Update the service ticket with real-time customer data.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING" },
                "phone": { "type": "STRING" },
                "address": { "type": "STRING" },
                "type": { "type": "STRING", "enum": ["emergency", "rebate", "general"] },
                "agentPersona": { "type": "STRING", "enum": ["sarah", "mike"] },
                "marketType": { "type": "STRING", "enum": ["residential", "commercial"] },
                "heatingSource": { "type": "STRING", "enum": ["gas", "oil", "electric"] }
            },
            "required": ["agentPersona"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_lists_every_lead_field() {
        let decl = capture_lead_declaration();
        let props = decl["parameters"]["properties"].as_object().unwrap();
        for field in [
            "name",
            "phone",
            "address",
            "type",
            "agentPersona",
            "marketType",
            "heatingSource",
        ] {
            assert!(props.contains_key(field), "missing {}", field);
        }
        assert_eq!(decl["parameters"]["required"], json!(["agentPersona"]));
    }

    #[test]
    fn test_instruction_mentions_tool() {
        assert!(SYSTEM_INSTRUCTION.contains(CAPTURE_LEAD_TOOL));
    }
}
