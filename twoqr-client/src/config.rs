use std::time::Duration;

/// How long the user has to answer a prompt before the request is declined.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// How many answered challenges a session remembers.
pub const DEFAULT_ANSWERED_CAPACITY: usize = 1024;

/// Settings of a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Name of this device, sent along registrations.
    pub device_name: String,
    /// Token relying parties can push authentication requests to, sent along registrations.
    pub push_token: Option<String>,
    /// Local timeout for approval prompts. An expired prompt declines the request, it is never
    /// signed late.
    pub approval_timeout: Duration,
    /// Wrap successful payloads in `{"successful": true, "data": ..}` for relying parties that
    /// expect it. Decline notices are always wrapped.
    pub envelope: bool,
    /// Number of answered challenges remembered to refuse answering them twice. The oldest are
    /// forgotten first. A forgotten authentication challenge is still caught by its counter
    /// once the relying party accepted an answer to it.
    pub answered_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: "2Q2R device".into(),
            push_token: None,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            envelope: false,
            answered_capacity: DEFAULT_ANSWERED_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Builder method for the device name.
    pub fn device_name(mut self, device_name: impl Into<String>) -> Self {
        self.device_name = device_name.into();
        self
    }

    /// Builder method for the push token.
    pub fn push_token(mut self, push_token: impl Into<String>) -> Self {
        self.push_token = Some(push_token.into());
        self
    }

    /// Builder method for the approval timeout.
    pub fn approval_timeout(mut self, approval_timeout: Duration) -> Self {
        self.approval_timeout = approval_timeout;
        self
    }

    /// Builder method for enveloping successful payloads.
    pub fn envelope(mut self, envelope: bool) -> Self {
        self.envelope = envelope;
        self
    }

    /// Builder method for the number of answered challenges remembered. At least one is kept.
    pub fn answered_capacity(mut self, answered_capacity: usize) -> Self {
        self.answered_capacity = answered_capacity.max(1);
        self
    }
}
