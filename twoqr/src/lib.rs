//! # 2Q2R
//!
//! The `twoqr` libraries turn a device into a second factor for the 2Q2R protocol. A relying
//! party shows a QR code, the device scans it, asks its user, and answers with a U2F style
//! signed response. It is comprised of three sub-libraries:
//!
//! - `twoqr-client` - a library, usable as [`client`], which drives a session: it parses
//!   scanned and pushed messages, talks to the relying party and asks the user for approval.
//! - `twoqr-authenticator` - a library, usable as [`authenticator`], which builds the signed
//!   registration and authentication responses and keeps the credential store consistent.
//! - `twoqr-types` - type definitions, usable as [`types`], for the messages, the U2F byte
//!   layouts and the JSON documents exchanged with relying parties.
//!
//! ## Basic Concepts
//!
//! Two messages exist. Both are plain text, space delimited, and usually arrive in a QR code:
//!
//! ```text
//! R <challenge> <infoURL> <userID>            register this device
//! A <appID> <challenge> <keyID> <counter>     authenticate with a key
//! ```
//!
//! The pieces fit together the following way:
//!
//! RelyingParty <-> [`Session`](client::Session) <-> [`Authenticator`](authenticator::Authenticator) <-> [`CredentialStore`](authenticator::CredentialStore) + [`KeyProvider`](authenticator::KeyProvider)
//!
//! The [`Session`](client::Session) owns the network side through a
//! [`RelyingPartyTransport`](client::RelyingPartyTransport) and the user side through a
//! [`UserApproval`](authenticator::UserApproval). Its entry points are:
//!
//! - [`process()`](client::Session::process()) - handle the text of a scanned QR code.
//! - [`handle_push()`](client::Session::handle_push()) - handle an authentication request
//!   delivered by a push notification.
//!
//! The [`Authenticator`](authenticator::Authenticator) never talks to the network. Each
//! operation is split in two, so that nothing is written before the relying party accepted the
//! response:
//!
//! - [`register()`](authenticator::Authenticator::register()) then
//!   [`commit_registration()`](authenticator::Authenticator::commit_registration()).
//! - [`check_counter()`](authenticator::Authenticator::check_counter()),
//!   [`authenticate()`](authenticator::Authenticator::authenticate()) then
//!   [`confirm_assertion()`](authenticator::Authenticator::confirm_assertion()).
//!
//! ### Example: Using the Authenticator directly
//!
//! ```
//! use twoqr::{
//!     authenticator::{Authenticator, CredentialStore, MemoryStore, SoftwareKeyProvider},
//!     types::{
//!         encoding::base64url,
//!         message::{AuthenticationMessage, RegistrationMessage},
//!         relying_party::RelyingPartyInfo,
//!         ProtocolError,
//!     },
//! };
//!
//! # tokio_test::block_on(async {
//! let app_id = base64url(&[7; 32]);
//! let mut authenticator = Authenticator::new(MemoryStore::new(), SoftwareKeyProvider::new());
//!
//! // The relying party's QR code and the document at its info URL.
//! let scanned = format!("R {} https://rp.example/info jdoe", base64url(&[1; 32]));
//! let message: RegistrationMessage = scanned.parse().unwrap();
//! let info = RelyingPartyInfo {
//!     app_id: app_id.clone(),
//!     app_name: "Example".into(),
//!     app_url: "https://rp.example".into(),
//! };
//!
//! let pending = authenticator.register(&message, info).await.unwrap();
//! let key_id = pending.key().key_id.clone();
//! // Post `pending.payload(..)` to the relying party, and on success:
//! authenticator.commit_registration(pending).await.unwrap();
//!
//! let scanned = format!("A {app_id} {} {key_id} 1", base64url(&[2; 32]));
//! let message: AuthenticationMessage = scanned.parse().unwrap();
//! let context = authenticator.check_counter(&message).await.unwrap();
//! let assertion = authenticator.authenticate(&context).await.unwrap();
//! // Post `assertion.payload()` to the relying party, and on success:
//! authenticator.confirm_assertion(&assertion).await.unwrap();
//! assert_eq!(authenticator.store().get_counter(&key_id).await, Ok(1));
//!
//! // The same challenge counter can never be signed twice.
//! assert!(matches!(
//!     authenticator.check_counter(&message).await,
//!     Err(ProtocolError::ReplayOrStaleChallenge { .. })
//! ));
//! # })
//! ```

pub use twoqr_authenticator as authenticator;
pub use twoqr_client as client;
pub use twoqr_types as types;
