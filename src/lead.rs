//! Lead record captured by the remote agent through tool calls
//!
//! The record is sparse: every field is optional and a merge only touches the
//! fields the update actually carries.

use crate::{ParleyError, Result};
use serde::{Deserialize, Serialize};

/// Kind of service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadType {
    Emergency,
    Rebate,
    General,
}

/// Which agent persona is handling the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPersona {
    /// Home comfort and rebates advisor
    Sarah,
    /// Emergency dispatch
    Mike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Residential,
    Commercial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatingSource {
    Gas,
    Oil,
    Electric,
}

/// Partial customer record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub lead_type: Option<LeadType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_persona: Option<AgentPersona>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_type: Option<MarketType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heating_source: Option<HeatingSource>,
}

impl LeadRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate `captureLeadDetails` arguments
    ///
    /// Unknown keys are ignored. Known keys must carry the declared type or
    /// enum value, and `agentPersona` is required.
    pub fn from_tool_args(args: &serde_json::Value) -> Result<Self> {
        if !args.is_object() {
            return Err(ParleyError::ToolValidationError(format!(
                "arguments must be an object, got {}",
                args
            )));
        }

        let update: LeadRecord = serde_json::from_value(args.clone())
            .map_err(|e| ParleyError::ToolValidationError(e.to_string()))?;

        if update.agent_persona.is_none() {
            return Err(ParleyError::ToolValidationError(
                "missing required field `agentPersona`".into(),
            ));
        }

        Ok(update)
    }

    /// Merge `update` into this record, returning the names of fields it set
    pub fn merge(&mut self, update: &LeadRecord) -> Vec<&'static str> {
        let mut changed = Vec::new();

        fn apply<T: Clone>(
            slot: &mut Option<T>,
            value: &Option<T>,
            field: &'static str,
            changed: &mut Vec<&'static str>,
        ) {
            if let Some(v) = value {
                *slot = Some(v.clone());
                changed.push(field);
            }
        }

        apply(&mut self.name, &update.name, "name", &mut changed);
        apply(&mut self.phone, &update.phone, "phone", &mut changed);
        apply(&mut self.address, &update.address, "address", &mut changed);
        apply(&mut self.lead_type, &update.lead_type, "type", &mut changed);
        apply(
            &mut self.agent_persona,
            &update.agent_persona,
            "agentPersona",
            &mut changed,
        );
        apply(
            &mut self.market_type,
            &update.market_type,
            "marketType",
            &mut changed,
        );
        apply(
            &mut self.heating_source,
            &update.heating_source,
            "heatingSource",
            &mut changed,
        );

        changed
    }

    pub fn is_empty(&self) -> bool {
        *self == LeadRecord::default()
    }

    /// Emergency dispatch is on the line or the request is an emergency
    pub fn is_emergency(&self) -> bool {
        self.agent_persona == Some(AgentPersona::Mike) || self.lead_type == Some(LeadType::Emergency)
    }

    pub fn is_commercial(&self) -> bool {
        self.market_type == Some(MarketType::Commercial)
    }

    /// Older property: address mentions "heritage" or the home burns oil
    pub fn is_heritage(&self) -> bool {
        let heritage_address = self
            .address
            .as_deref()
            .map(|a| a.to_lowercase().contains("heritage"))
            .unwrap_or(false);
        heritage_address || self.heating_source == Some(HeatingSource::Oil)
    }
}
