use crate::messages::Message;

/// Accumulates transcript fragments for the current turn
#[derive(Debug, Default, Clone)]
pub struct TranscriptAssembler {
    caller: String,
    agent: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_caller(&mut self, fragment: &str) {
        self.caller.push_str(fragment);
    }

    pub fn push_agent(&mut self, fragment: &str) {
        self.agent.push_str(fragment);
    }

    pub fn caller_text(&self) -> &str {
        &self.caller
    }

    pub fn agent_text(&self) -> &str {
        &self.agent
    }

    /// Close the turn: caller message first, then agent; empty sides skipped
    pub fn complete_turn(&mut self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        let caller = std::mem::take(&mut self.caller);
        let agent = std::mem::take(&mut self.agent);

        if !caller.is_empty() {
            messages.push(Message::user(caller));
        }
        if !agent.is_empty() {
            messages.push(Message::agent(agent));
        }
        messages
    }

    pub fn clear(&mut self) {
        self.caller.clear();
        self.agent.clear();
    }
}
