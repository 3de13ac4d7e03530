use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use twoqr_types::{
    crypto::sha256,
    encoding::{base64url, try_from_base64url},
    message::{AuthenticationMessage, RegistrationMessage},
    relying_party::RelyingPartyInfo,
    u2f::PublicKey,
    ClientData, KeyProviderError, KeyRecord, ProtocolError, ServerRecord,
};

use super::{AppParameter, Authenticator};
use crate::{
    key_provider::MockKeyProvider, CredentialStore, KeyProvider, MemoryStore, SoftwareKeyProvider,
};

const APP_URL: &str = "https://rp.example.com/";

fn app_id() -> String {
    base64url(&[0x42; 32])
}

fn info() -> RelyingPartyInfo {
    RelyingPartyInfo {
        app_id: app_id(),
        app_name: "Example".into(),
        app_url: "https://rp.example.com".into(),
    }
}

fn registration(user_id: &str) -> RegistrationMessage {
    format!("R {} {APP_URL}info {user_id}", base64url(&[1; 32]))
        .parse()
        .expect("valid registration message")
}

fn authentication(key_id: &str, counter: u32) -> AuthenticationMessage {
    format!("A {} {} {key_id} {counter}", app_id(), base64url(&[2; 32]))
        .parse()
        .expect("valid authentication message")
}

fn authenticator() -> Authenticator<MemoryStore, SoftwareKeyProvider> {
    Authenticator::new(MemoryStore::new(), SoftwareKeyProvider::new())
}

/// Split a registration response into its public key, key handle and signature.
fn split_registration(data: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    assert_eq!(data[0], 0x05);
    let public_key = data[1..66].to_vec();
    let handle_len = usize::from(data[66]);
    let key_handle = data[67..67 + handle_len].to_vec();
    // no attestation certificate by default
    let signature = data[67 + handle_len..].to_vec();
    (public_key, key_handle, signature)
}

async fn registered(
    authenticator: &mut Authenticator<MemoryStore, SoftwareKeyProvider>,
    user_id: &str,
) -> (String, VerifyingKey) {
    let pending = authenticator
        .register(&registration(user_id), info())
        .await
        .expect("registration builds");
    let data = try_from_base64url(&pending.payload("phone", None).registration_data).unwrap();
    let (public_key, _, _) = split_registration(&data);
    let key_id = pending.key().key_id.clone();
    authenticator
        .commit_registration(pending)
        .await
        .expect("commit succeeds");
    (key_id, VerifyingKey::from_sec1_bytes(&public_key).unwrap())
}

#[tokio::test]
async fn registration_response_is_signed_over_u2f_layout() {
    let mut authenticator = authenticator();
    let pending = authenticator
        .register(&registration("alice"), info())
        .await
        .expect("registration builds");

    let payload = pending.payload("phone", Some("push-token".into()));
    assert_eq!(payload.device_name, "phone");
    assert_eq!(payload.fcm_token.as_deref(), Some("push-token"));

    let client_data = try_from_base64url(&payload.client_data).unwrap();
    let expected = ClientData::enrollment(base64url(&[1; 32]), APP_URL);
    assert_eq!(client_data, expected.to_json().into_bytes());

    let data = try_from_base64url(&payload.registration_data).unwrap();
    let (public_key, key_handle, signature) = split_registration(&data);
    assert_eq!(public_key.len(), 65);
    assert_eq!(key_handle.len(), 16);
    assert_eq!(base64url(&key_handle), pending.key().key_id);

    let mut target = vec![0x00];
    target.extend(sha256(APP_URL.as_bytes()));
    target.extend(sha256(&client_data));
    target.extend(&key_handle);
    target.extend(&public_key);

    let verifying_key = VerifyingKey::from_sec1_bytes(&public_key).unwrap();
    let signature = Signature::from_der(&signature).expect("DER signature");
    assert!(verifying_key.verify(&target, &signature).is_ok());

    // nothing is stored before the relying party accepted
    assert!(!authenticator.store().has_server(&app_id()).await.unwrap());
    assert!(authenticator.store().list_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn committed_registration_starts_at_zero() {
    let mut authenticator = authenticator();
    let (key_id, _) = registered(&mut authenticator, "alice").await;

    let server = authenticator.store().get_server(&app_id()).await.unwrap();
    assert_eq!(
        server,
        Some(ServerRecord {
            app_id: app_id(),
            app_name: "Example".into(),
            app_url: APP_URL.into(),
        })
    );
    let key = authenticator.store().get_key(&key_id).await.unwrap().unwrap();
    assert_eq!(key.counter, 0);
    assert_eq!(key.user_id, "alice");
    assert!(authenticator.key_provider().has_key(&key_id).await);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let mut authenticator = authenticator();
    registered(&mut authenticator, "alice").await;

    let result = authenticator.register(&registration("alice"), info()).await;
    assert!(matches!(result, Err(ProtocolError::DuplicateRegistration)));
    assert_eq!(authenticator.store().list_keys().await.unwrap().len(), 1);
    assert_eq!(authenticator.key_provider().len(), 1);
}

#[tokio::test]
async fn relying_party_info_must_carry_a_32_byte_app_id() {
    let mut authenticator = authenticator();
    let info = RelyingPartyInfo {
        app_id: base64url(b"short"),
        ..info()
    };
    let result = authenticator.register(&registration("alice"), info).await;
    assert!(matches!(
        result,
        Err(ProtocolError::InvalidRelyingPartyInfo(_))
    ));
}

#[tokio::test]
async fn keystore_failures_are_reported() {
    let mut authenticator =
        Authenticator::new(MemoryStore::new(), SoftwareKeyProvider::insecure());
    let result = authenticator.register(&registration("alice"), info()).await;
    assert!(matches!(result, Err(ProtocolError::InsecureDevice)));

    let mut authenticator = Authenticator::new(
        MemoryStore::new(),
        MockKeyProvider::failing_generation(KeyProviderError::KeyGenUnsupported),
    );
    let result = authenticator.register(&registration("alice"), info()).await;
    assert!(matches!(result, Err(ProtocolError::KeyGenUnsupported)));
    assert!(authenticator.store().list_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_signing_deletes_the_new_key() {
    let mut keys = MockKeyProvider::new();
    keys.expect_generate_key()
        .returning(|_| Ok(PublicKey::from_coordinates(&[1; 32], &[2; 32])))
        .once();
    keys.expect_sign()
        .returning(|_, _| Err(KeyProviderError::SigningUnavailable))
        .once();
    keys.expect_delete_key().returning(|_| Ok(())).once();
    let mut authenticator = Authenticator::new(MemoryStore::new(), keys);

    let result = authenticator.register(&registration("alice"), info()).await;
    assert!(matches!(result, Err(ProtocolError::SigningUnavailable)));
}

#[tokio::test]
async fn discarded_registration_deletes_its_key() {
    let mut authenticator = authenticator();
    let pending = authenticator
        .register(&registration("alice"), info())
        .await
        .unwrap();
    let key_id = pending.key().key_id.clone();
    assert!(authenticator.key_provider().has_key(&key_id).await);

    authenticator.discard_registration(pending).await.unwrap();
    assert!(authenticator.key_provider().is_empty());
    assert!(authenticator.store().list_keys().await.unwrap().is_empty());

    // the same user can register again
    registered(&mut authenticator, "alice").await;
}

#[tokio::test]
async fn assertion_is_signed_over_u2f_layout() {
    let mut authenticator = authenticator();
    let (key_id, verifying_key) = registered(&mut authenticator, "alice").await;

    let message = authentication(&key_id, 1);
    let context = authenticator.check_counter(&message).await.unwrap();
    assert_eq!(context.missed(), 0);
    let pending = authenticator.authenticate(&context).await.unwrap();

    let client_data = try_from_base64url(&pending.payload().client_data).unwrap();
    assert_eq!(
        client_data,
        ClientData::assertion(base64url(&[2; 32]), APP_URL)
            .to_json()
            .into_bytes()
    );

    let data = try_from_base64url(&pending.payload().signature_data).unwrap();
    assert_eq!(&data[..5], &[0x01, 0, 0, 0, 1]);

    let mut target = sha256(APP_URL.as_bytes()).to_vec();
    target.push(0x01);
    target.extend(1u32.to_be_bytes());
    target.extend(sha256(&client_data));
    let signature = Signature::from_der(&data[5..]).expect("DER signature");
    assert!(verifying_key.verify(&target, &signature).is_ok());

    // the counter only moves once confirmed
    assert_eq!(authenticator.store().get_counter(&key_id).await, Ok(0));
    authenticator.confirm_assertion(&pending).await.unwrap();
    assert_eq!(authenticator.store().get_counter(&key_id).await, Ok(1));
}

#[tokio::test]
async fn app_id_parameter_is_used_for_both_operations() {
    let mut authenticator = authenticator().app_parameter(AppParameter::AppId);
    assert_eq!(authenticator.app_parameter_kind(), AppParameter::AppId);
    let (key_id, verifying_key) = registered(&mut authenticator, "alice").await;

    let message = authentication(&key_id, 3);
    let context = authenticator.check_counter(&message).await.unwrap();
    let pending = authenticator.authenticate(&context).await.unwrap();

    let client_data = try_from_base64url(&pending.payload().client_data).unwrap();
    let data = try_from_base64url(&pending.payload().signature_data).unwrap();
    let mut target = sha256(&[0x42; 32]).to_vec();
    target.push(0x01);
    target.extend(3u32.to_be_bytes());
    target.extend(sha256(&client_data));
    let signature = Signature::from_der(&data[5..]).unwrap();
    assert!(verifying_key.verify(&target, &signature).is_ok());
}

#[tokio::test]
async fn replayed_counter_is_rejected() {
    let mut authenticator = authenticator();
    let (key_id, _) = registered(&mut authenticator, "alice").await;
    authenticator.store_mut().set_counter(&key_id, 5).await.unwrap();

    for counter in [5, 4, 0] {
        let result = authenticator
            .check_counter(&authentication(&key_id, counter))
            .await;
        assert_eq!(
            result.map(|c| c.missed()),
            Err(ProtocolError::ReplayOrStaleChallenge {
                local_counter: 5,
                server_counter: counter
            })
        );
    }
    assert_eq!(authenticator.store().get_counter(&key_id).await, Ok(5));
}

#[tokio::test]
async fn replay_check_happens_before_any_signing() {
    let mut store = MemoryStore::new();
    store
        .insert_server(ServerRecord::from(info()))
        .await
        .unwrap();
    let mut key = KeyRecord::new("kid", app_id(), "alice");
    key.counter = 7;
    store.insert_key(key).await.unwrap();
    store.set_counter("kid", 7).await.unwrap();

    let mut keys = MockKeyProvider::new();
    keys.expect_sign().never();
    let authenticator = Authenticator::new(store, keys);

    let result = authenticator.check_counter(&authentication("kid", 7)).await;
    assert!(matches!(
        result,
        Err(ProtocolError::ReplayOrStaleChallenge { .. })
    ));
}

#[tokio::test]
async fn counter_advanced_during_approval_is_not_signed() {
    let mut authenticator = authenticator();
    let (key_id, _) = registered(&mut authenticator, "alice").await;

    let context = authenticator
        .check_counter(&authentication(&key_id, 5))
        .await
        .unwrap();
    // another session answered a newer challenge while the user was being asked
    authenticator.store_mut().set_counter(&key_id, 6).await.unwrap();

    let result = authenticator.authenticate(&context).await;
    assert_eq!(
        result.map(|pending| pending.counter()),
        Err(ProtocolError::ReplayOrStaleChallenge {
            local_counter: 6,
            server_counter: 5
        })
    );
    assert_eq!(authenticator.store().get_counter(&key_id).await, Ok(6));
}

#[tokio::test]
async fn context_carries_the_challenge() {
    let mut authenticator = authenticator();
    let (key_id, _) = registered(&mut authenticator, "alice").await;

    let context = authenticator
        .check_counter(&authentication(&key_id, 1))
        .await
        .unwrap();
    assert_eq!(context.challenge(), base64url(&[2; 32]));
}

#[tokio::test]
async fn missed_challenges_are_counted() {
    let mut authenticator = authenticator();
    let (key_id, _) = registered(&mut authenticator, "alice").await;
    authenticator.store_mut().set_counter(&key_id, 2).await.unwrap();

    let context = authenticator
        .check_counter(&authentication(&key_id, 9))
        .await
        .unwrap();
    assert_eq!(context.missed(), 6);
    assert_eq!(context.server_counter(), 9);

    let prompt = context.prompt();
    assert_eq!(prompt.app_name, "Example");
    assert_eq!(prompt.user_id, "alice");
    assert!(prompt.is_suspicious());
}

#[tokio::test]
async fn unknown_or_mismatched_keys() {
    let mut authenticator = authenticator();
    let result = authenticator
        .check_counter(&authentication("unknown", 1))
        .await;
    assert!(matches!(result, Err(ProtocolError::UnknownCredential)));

    let (key_id, _) = registered(&mut authenticator, "alice").await;
    let other_app: AuthenticationMessage = format!(
        "A {} {} {key_id} 1",
        base64url(&[0x43; 32]),
        base64url(&[2; 32])
    )
    .parse()
    .unwrap();
    let result = authenticator.check_counter(&other_app).await;
    assert!(matches!(result, Err(ProtocolError::UnknownCredential)));
}

#[tokio::test]
async fn wipe_forgets_servers_and_keys() {
    let mut authenticator = authenticator();
    let (key_id, _) = registered(&mut authenticator, "alice").await;

    authenticator.wipe().await.unwrap();
    assert!(!authenticator.store().has_key(&key_id).await.unwrap());
    assert!(!authenticator.store().has_server(&app_id()).await.unwrap());
    assert!(authenticator.key_provider().is_empty());
}
