//! Conversation state types

/// Controller phase. Anything other than `Idle` means a send is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConvState {
    #[default]
    Idle,
    /// Waiting on the model for `prompt`
    Sending { prompt: String },
    /// Cleared mid-send; the cancelled request has not handed the session
    /// back yet and its reply will be discarded
    Clearing,
}

impl ConvState {
    /// The in-flight flag exposed to renderers
    pub fn is_loading(&self) -> bool {
        !matches!(self, ConvState::Idle)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConvState::Idle => "idle",
            ConvState::Sending { .. } => "sending",
            ConvState::Clearing => "clearing",
        }
    }
}
