use std::{
    cell::RefCell,
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use serde_json::{json, Value};
use twoqr_authenticator::{
    ApprovalPrompt, MemoryStore, MockUserApproval, RegistrationPrompt, SoftwareKeyProvider,
};
use twoqr_types::{
    encoding::{base64url, try_from_base64url},
    u2f::PublicKey,
    ErrorClass, KeyProviderError,
};

use super::*;

const APP_URL: &str = "https://rp.example/";

fn app_id() -> String {
    base64url(&[0x42; 32])
}

fn challenge(seed: u8) -> String {
    base64url(&[seed; 32])
}

fn registration_qr() -> String {
    format!("R {} {APP_URL} alice", challenge(1))
}

fn authentication_qr(key_id: &str, counter: u32, seed: u8) -> String {
    format!("A {} {} {key_id} {counter}", app_id(), challenge(seed))
}

/// A relying party answering from canned responses and recording what it was sent.
struct FakeRelyingParty {
    info: RelyingPartyResponse,
    responses: RefCell<VecDeque<RelyingPartyResponse>>,
    offline: bool,
    fetched: RefCell<Vec<Url>>,
    posted: RefCell<Vec<(Url, Value)>>,
}

impl Default for FakeRelyingParty {
    fn default() -> Self {
        FakeRelyingParty {
            info: RelyingPartyResponse::ok(
                json!({
                    "appID": app_id(),
                    "appName": "Example",
                    "appURL": APP_URL,
                })
                .to_string(),
            ),
            responses: RefCell::default(),
            offline: false,
            fetched: RefCell::default(),
            posted: RefCell::default(),
        }
    }
}

impl FakeRelyingParty {
    fn answering(self, response: RelyingPartyResponse) -> Self {
        self.responses.borrow_mut().push_back(response);
        self
    }

    fn posted(&self) -> Vec<(Url, Value)> {
        self.posted.borrow().clone()
    }
}

impl RelyingPartyTransport for FakeRelyingParty {
    async fn fetch_info(&self, url: Url) -> Result<RelyingPartyResponse, ProtocolError> {
        self.fetched.borrow_mut().push(url);
        Ok(self.info.clone())
    }

    async fn post_json<P>(&self, url: Url, body: &P) -> Result<RelyingPartyResponse, ProtocolError>
    where
        P: Serialize + Sync,
    {
        if self.offline {
            return Err(ProtocolError::NetworkFailure("connection refused".into()));
        }
        self.posted
            .borrow_mut()
            .push((url, serde_json::to_value(body).unwrap()));
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| RelyingPartyResponse::ok("")))
    }
}

/// Software keys that count signing calls.
#[derive(Default)]
struct CountingKeys {
    keys: SoftwareKeyProvider,
    signed: AtomicUsize,
}

#[async_trait::async_trait]
impl KeyProvider for CountingKeys {
    async fn has_key(&self, key_id: &str) -> bool {
        self.keys.has_key(key_id).await
    }

    async fn generate_key(&mut self, key_id: &str) -> Result<PublicKey, KeyProviderError> {
        self.keys.generate_key(key_id).await
    }

    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        self.keys.sign(key_id, message).await
    }

    async fn export_certificate(&self, key_id: &str) -> Result<Vec<u8>, KeyProviderError> {
        self.keys.export_certificate(key_id).await
    }

    async fn delete_key(&mut self, key_id: &str) -> Result<(), KeyProviderError> {
        self.keys.delete_key(key_id).await
    }

    async fn clear(&mut self) -> Result<(), KeyProviderError> {
        self.keys.clear().await
    }
}

/// Approval that never answers within the timeout.
struct AbsentUser;

#[async_trait::async_trait]
impl UserApproval for AbsentUser {
    async fn confirm_registration(&self, _prompt: &RegistrationPrompt) -> Approval {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Approval::Approved
    }

    async fn approve_authentication(&self, _prompt: &ApprovalPrompt) -> Approval {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Approval::Approved
    }
}

type TestSession<U> = Session<MemoryStore, CountingKeys, U, FakeRelyingParty>;

fn session<U: UserApproval>(approval: U, relying_party: FakeRelyingParty) -> TestSession<U> {
    Session::new(
        Authenticator::new(MemoryStore::new(), CountingKeys::default()),
        approval,
        relying_party,
    )
}

async fn registered_session() -> (TestSession<MockUserApproval>, String) {
    let mut session = session(MockUserApproval::approving(10), FakeRelyingParty::default());
    let Outcome::Registered { key_id, .. } = session.process(&registration_qr()).await.unwrap()
    else {
        panic!("expected a registration");
    };
    (session, key_id)
}

fn keys_held(session: &TestSession<impl UserApproval>) -> usize {
    session.authenticator().key_provider().keys.len()
}

fn signatures(session: &TestSession<impl UserApproval>) -> usize {
    session.authenticator().key_provider().signed.load(Ordering::SeqCst)
}

#[tokio::test]
async fn scenario_registration_stores_server_and_key() {
    let relying_party = FakeRelyingParty::default();
    let mut session = session(MockUserApproval::approving(1), relying_party)
        .config(SessionConfig::default().device_name("phone").push_token("tok"));

    let outcome = session.process(&registration_qr()).await.unwrap();
    let Outcome::Registered { app_id: registered_app, key_id } = outcome else {
        panic!("expected a registration");
    };
    assert_eq!(registered_app, app_id());

    let fetched = session.transport().fetched.borrow().clone();
    assert_eq!(fetched, [Url::parse(APP_URL).unwrap()]);

    let posted = session.transport().posted();
    assert_eq!(posted.len(), 1);
    let (url, body) = &posted[0];
    assert_eq!(url.as_str(), "https://rp.example/register");
    assert_eq!(body["deviceName"], "phone");
    assert_eq!(body["fcmToken"], "tok");

    let data = try_from_base64url(body["registrationData"].as_str().unwrap()).unwrap();
    assert_eq!(data[0], 0x05);
    assert_eq!(data[1], 0x04);
    assert!(data.len() > 1 + 65 + 1 + 16);

    let store = session.authenticator().store();
    assert!(store.has_server(&app_id()).await.unwrap());
    assert_eq!(store.get_counter(&key_id).await, Ok(0));
    assert_eq!(session.list_keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_authentication_advances_counter() {
    let (mut session, key_id) = registered_session().await;

    let outcome = session
        .process(&authentication_qr(&key_id, 1, 2))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Authenticated {
            app_id: app_id(),
            key_id: key_id.clone(),
            counter: 1
        }
    );

    let posted = session.transport().posted();
    let (url, body) = posted.last().unwrap();
    assert_eq!(url.as_str(), "https://rp.example/auth");
    let signature_data = try_from_base64url(body["signatureData"].as_str().unwrap()).unwrap();
    assert_eq!(&signature_data[..5], &[0x01, 0, 0, 0, 1]);
    assert_eq!(
        session.authenticator().store().get_counter(&key_id).await,
        Ok(1)
    );
}

#[tokio::test]
async fn scenario_replay_is_rejected_without_signing() {
    let (mut session, key_id) = registered_session().await;
    session
        .process(&authentication_qr(&key_id, 1, 2))
        .await
        .unwrap();
    let signed = signatures(&session);
    let posted = session.transport().posted().len();

    let result = session.process(&authentication_qr(&key_id, 1, 3)).await;
    assert_eq!(
        result,
        Err(ProtocolError::ReplayOrStaleChallenge {
            local_counter: 1,
            server_counter: 1
        })
    );
    assert_eq!(signatures(&session), signed);
    assert_eq!(session.transport().posted().len(), posted);
    assert_eq!(
        session.authenticator().store().get_counter(&key_id).await,
        Ok(1)
    );
}

#[tokio::test]
async fn malformed_messages_never_reach_the_network() {
    let mut session = session(MockUserApproval::new(), FakeRelyingParty::default());
    for raw in ["", "R", "Z a b c", "R abc https://rp.example/ alice"] {
        let err = session.process(raw).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Input, "{raw:?}");
    }
    assert!(session.transport().fetched.borrow().is_empty());
    assert!(session.transport().posted().is_empty());
}

#[tokio::test]
async fn rejected_registration_stores_nothing() {
    let relying_party = FakeRelyingParty::default().answering(RelyingPartyResponse {
        status: 400,
        body: "bad attestation".into(),
    });
    let mut session = session(MockUserApproval::approving(1), relying_party);

    let result = session.process(&registration_qr()).await;
    assert_eq!(
        result,
        Err(ProtocolError::RelyingPartyRejected {
            status: 400,
            message: "bad attestation".into()
        })
    );
    assert!(session.list_keys().await.unwrap().is_empty());
    assert!(!session
        .authenticator()
        .store()
        .has_server(&app_id())
        .await
        .unwrap());
    assert_eq!(keys_held(&session), 0);
}

#[tokio::test]
async fn declined_registrations_leave_no_keys_behind() {
    let mut approval = MockUserApproval::new();
    approval
        .expect_confirm_registration()
        .returning(|_| Approval::Declined)
        .times(3);
    let mut session = session(approval, FakeRelyingParty::default());

    for seed in 1..=3 {
        let raw = format!("R {} {APP_URL} alice", challenge(seed));
        assert_eq!(
            session.process(&raw).await,
            Err(ProtocolError::UserDeclined)
        );
    }
    assert_eq!(keys_held(&session), 0);
    assert!(session.list_keys().await.unwrap().is_empty());
    assert!(session.transport().posted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unanswered_registration_prompt_leaves_no_key() {
    let mut session = session(AbsentUser, FakeRelyingParty::default());

    let result = session.process(&registration_qr()).await;
    assert_eq!(result, Err(ProtocolError::ApprovalTimedOut));
    assert_eq!(keys_held(&session), 0);
}

#[tokio::test]
async fn unreachable_relying_party_leaves_counter_alone() {
    let (session, key_id) = registered_session().await;
    let mut session = Session::new(
        session.authenticator,
        MockUserApproval::approving(1),
        FakeRelyingParty {
            offline: true,
            ..FakeRelyingParty::default()
        },
    );

    let result = session.process(&authentication_qr(&key_id, 1, 2)).await;
    assert!(matches!(result, Err(ProtocolError::NetworkFailure(_))));
    assert_eq!(result.unwrap_err().class(), ErrorClass::Transient);
    assert_eq!(keys_held(&session), 1);
    assert_eq!(
        session.authenticator().store().get_counter(&key_id).await,
        Ok(0)
    );
}

#[tokio::test]
async fn missing_transport_is_a_network_failure() {
    let mut session = Session::new(
        Authenticator::new(MemoryStore::new(), SoftwareKeyProvider::new()),
        MockUserApproval::new(),
        (),
    );
    let result = session.process(&registration_qr()).await;
    assert!(matches!(result, Err(ProtocolError::NetworkFailure(_))));
}

#[tokio::test]
async fn enveloped_payloads() {
    let mut session = session(MockUserApproval::approving(1), FakeRelyingParty::default())
        .config(SessionConfig::default().envelope(true));
    assert!(session.session_config().envelope);
    session.process(&registration_qr()).await.unwrap();

    let (_, body) = &session.transport().posted()[0];
    assert_eq!(body["successful"], true);
    assert!(body["data"]["registrationData"].is_string());
}

#[tokio::test]
async fn legacy_base_url_info_is_accepted() {
    let relying_party = FakeRelyingParty {
        info: RelyingPartyResponse::ok(
            json!({"appID": app_id(), "appName": "Example", "baseURL": "https://rp.example"})
                .to_string(),
        ),
        ..FakeRelyingParty::default()
    };
    let mut session = session(MockUserApproval::approving(1), relying_party);
    session.process(&registration_qr()).await.unwrap();

    let (url, _) = &session.transport().posted()[0];
    assert_eq!(url.as_str(), "https://rp.example/register");
}

#[tokio::test]
async fn unusable_relying_party_info() {
    let relying_party = FakeRelyingParty {
        info: RelyingPartyResponse::ok("{\"appName\": \"no id\"}"),
        ..FakeRelyingParty::default()
    };
    let mut session = session(MockUserApproval::new(), relying_party);
    let err = session.process(&registration_qr()).await.unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidRelyingPartyInfo(_)));
    assert_eq!(err.class(), ErrorClass::RelyingParty);
}

#[tokio::test]
async fn declined_authentication_sends_a_failure_notice() {
    let (session, key_id) = registered_session().await;
    let mut session = Session::new(
        session.authenticator,
        MockUserApproval::declining_authentication(),
        FakeRelyingParty::default(),
    );

    let result = session.process(&authentication_qr(&key_id, 1, 2)).await;
    assert_eq!(result, Err(ProtocolError::UserDeclined));
    assert_eq!(signatures(&session), 1, "only the registration was signed");

    let (url, body) = &session.transport().posted()[0];
    assert_eq!(url.as_str(), "https://rp.example/auth");
    assert_eq!(
        body,
        &json!({
            "successful": false,
            "data": {
                "challenge": challenge(2),
                "errorStatus": 401,
                "errorMessage": "the user declined the request",
            }
        })
    );
    assert_eq!(
        session.authenticator().store().get_counter(&key_id).await,
        Ok(0)
    );

    // never a second answer for the same challenge, however it is padded
    let again = session.process(&authentication_qr(&key_id, 1, 2)).await;
    assert_eq!(again, Err(ProtocolError::ChallengeAlreadyAnswered));
    let padded = format!("A {} {}= {key_id} 1", app_id(), challenge(2));
    assert_eq!(
        session.process(&padded).await,
        Err(ProtocolError::ChallengeAlreadyAnswered)
    );
}

#[tokio::test]
async fn only_the_latest_answered_challenges_are_remembered() {
    let (session, key_id) = registered_session().await;
    let mut session = Session::new(
        session.authenticator,
        MockUserApproval::declining_authentication(),
        FakeRelyingParty::default(),
    )
    .config(SessionConfig::default().answered_capacity(2));

    for seed in [2, 3, 4] {
        let result = session.process(&authentication_qr(&key_id, 1, seed)).await;
        assert_eq!(result, Err(ProtocolError::UserDeclined));
    }
    assert_eq!(
        session.process(&authentication_qr(&key_id, 1, 4)).await,
        Err(ProtocolError::ChallengeAlreadyAnswered)
    );
    // the oldest one was forgotten, the counter still guards it
    assert_eq!(
        session.process(&authentication_qr(&key_id, 1, 2)).await,
        Err(ProtocolError::UserDeclined)
    );
    assert_eq!(
        session.authenticator().store().get_counter(&key_id).await,
        Ok(0)
    );
}

#[tokio::test(start_paused = true)]
async fn unanswered_prompt_times_out_into_a_decline() {
    let (session, key_id) = registered_session().await;
    let mut session = Session::new(session.authenticator, AbsentUser, FakeRelyingParty::default())
        .config(SessionConfig::default().approval_timeout(Duration::from_secs(5)));

    let result = session.process(&authentication_qr(&key_id, 4, 2)).await;
    assert_eq!(result, Err(ProtocolError::ApprovalTimedOut));
    assert_eq!(signatures(&session), 1);

    let (_, body) = &session.transport().posted()[0];
    assert_eq!(body["data"]["errorStatus"], 408);
}

#[tokio::test]
async fn prompt_reports_missed_authentications() {
    let (session, key_id) = registered_session().await;
    let mut session = Session::new(
        session.authenticator,
        MockUserApproval::approving_with_missed(3),
        FakeRelyingParty::default(),
    );

    let outcome = session
        .process(&authentication_qr(&key_id, 4, 2))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Authenticated { counter: 4, .. }));
}

#[tokio::test]
async fn duplicate_registration_is_refused_before_sending() {
    let (mut session, _) = registered_session().await;
    let posted = session.transport().posted().len();

    let raw = format!("R {} {APP_URL} alice", challenge(9));
    let result = session.process(&raw).await;
    assert_eq!(result, Err(ProtocolError::DuplicateRegistration));
    assert_eq!(session.transport().posted().len(), posted);
    assert_eq!(session.list_keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn push_only_carries_authentications() {
    let (mut session, key_id) = registered_session().await;

    let result = session.handle_push(&registration_qr()).await;
    assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));

    let outcome = session
        .handle_push(&authentication_qr(&key_id, 1, 2))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Authenticated { counter: 1, .. }));
}

#[tokio::test]
async fn keystore_errors_surface_as_device_errors() {
    let mut session = Session::new(
        Authenticator::new(MemoryStore::new(), SoftwareKeyProvider::insecure()),
        MockUserApproval::new(),
        FakeRelyingParty::default(),
    );
    let err = session.process(&registration_qr()).await.unwrap_err();
    assert_eq!(err, ProtocolError::InsecureDevice);
    assert_eq!(err.class(), ErrorClass::Device);
    assert!(session.transport().posted().is_empty());
}

#[tokio::test]
async fn wipe_forgets_everything() {
    let (mut session, key_id) = registered_session().await;
    session.wipe().await.unwrap();

    assert!(session.list_keys().await.unwrap().is_empty());
    let result = session.process(&authentication_qr(&key_id, 1, 2)).await;
    assert_eq!(result, Err(ProtocolError::UnknownCredential));
}
