#[cfg(doc)]
use crate::Authenticator;

/// From this many missed authentications on, a prompt should be shown as suspicious.
pub const SUSPICIOUS_MISSED: u32 = 5;

/// What the user is shown before registering with a relying party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPrompt {
    /// Name the relying party gave itself.
    pub app_name: String,
    /// Base URL of the relying party.
    pub app_url: String,
    /// The account being registered.
    pub user_id: String,
}

/// What the user is shown before authenticating to a relying party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPrompt {
    /// Name of the relying party, from the stored server record.
    pub app_name: String,
    /// Base URL of the relying party.
    pub app_url: String,
    /// The account the key is registered for.
    pub user_id: String,
    /// Challenges the relying party issued for this key which never reached the device.
    pub missed: u32,
}

impl ApprovalPrompt {
    /// A large gap between the relying party's counter and the device's means someone else
    /// may be requesting authentications for this account.
    pub fn is_suspicious(&self) -> bool {
        self.missed >= SUSPICIOUS_MISSED
    }
}

/// The user's answer to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// Go ahead.
    Approved,
    /// Refuse the request.
    Declined,
}

/// Pluggable trait for asking the user to approve protocol operations, typically with a dialog.
///
/// The [`Authenticator`] itself never prompts, the session calls this before asking the
/// authenticator to sign anything.
#[cfg_attr(any(test, feature = "testable"), mockall::automock)]
#[async_trait::async_trait]
pub trait UserApproval {
    /// Ask whether to register with a relying party.
    async fn confirm_registration(&self, prompt: &RegistrationPrompt) -> Approval;

    /// Ask whether to authenticate. Implementations should warn about
    /// [`ApprovalPrompt::missed`] challenges, especially when the prompt
    /// [`is_suspicious`](ApprovalPrompt::is_suspicious).
    async fn approve_authentication(&self, prompt: &ApprovalPrompt) -> Approval;
}

#[cfg(any(test, feature = "testable"))]
impl MockUserApproval {
    /// Sets up the mock for approving `times` registrations and `times` authentications.
    pub fn approving(times: usize) -> Self {
        let mut user_mock = MockUserApproval::new();
        user_mock
            .expect_confirm_registration()
            .returning(|_| Approval::Approved)
            .times(..=times);
        user_mock
            .expect_approve_authentication()
            .returning(|_| Approval::Approved)
            .times(..=times);
        user_mock
    }

    /// Sets up the mock for approving registrations but declining every authentication.
    pub fn declining_authentication() -> Self {
        let mut user_mock = MockUserApproval::new();
        user_mock
            .expect_confirm_registration()
            .returning(|_| Approval::Approved)
            .times(..);
        user_mock
            .expect_approve_authentication()
            .returning(|_| Approval::Declined)
            .times(..);
        user_mock
    }

    /// Sets up the mock for approving an authentication only if the prompt reports `missed`
    /// missed challenges.
    pub fn approving_with_missed(missed: u32) -> Self {
        let mut user_mock = MockUserApproval::new();
        user_mock
            .expect_approve_authentication()
            .withf(move |prompt| prompt.missed == missed)
            .returning(|_| Approval::Approved)
            .once();
        user_mock
    }
}
