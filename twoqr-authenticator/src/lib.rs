//! # 2Q2R Authenticator
//!
//! This crate defines an [`Authenticator`] type implementing the device side of the 2Q2R
//! protocol: it builds [U2F] registration and authentication responses for the messages a
//! device scans or receives, and enforces the anti-replay counter of every credential.
//!
//! Storage, key material and user interaction are defined through traits so only the parts that
//! vary between platforms need to be provided:
//!
//! * [`CredentialStore`] keeps the registered servers and keys. [`MemoryStore`] is provided.
//!   The `tokio` feature adds `FileStore`, a JSON file written through `tokio::fs`, and lets a
//!   store be shared behind a tokio `Mutex` or `RwLock`. `SqliteStore` needs the `sqlite`
//!   feature.
//! * [`KeyProvider`] holds the P-256 private keys, ideally in a hardware keystore.
//!   [`SoftwareKeyProvider`] keeps them in memory.
//! * [`UserApproval`] asks the user before anything is signed.
//!
//! The authenticator never talks to relying parties. Every operation is split into building a
//! response and committing it once the relying party accepted it, so a rejected or failed
//! exchange never changes the store.
//!
//! ## Why RustCrypto?
//!
//! The software keystore uses the pure Rust [RustCrypto] `p256` implementation, which compiles
//! to every target including WASM.
//!
//! [U2F]: https://fidoalliance.org/specs/fido-u2f-v1.2-ps-20170411/fido-u2f-raw-message-formats-v1.2-ps-20170411.html
//! [RustCrypto]: https://github.com/RustCrypto

mod authenticator;
mod credential_store;
mod key_provider;
mod user_approval;

pub use self::{
    authenticator::{
        AppParameter, AuthenticationContext, Authenticator, PendingAssertion, PendingRegistration,
    },
    credential_store::{CredentialStore, MemoryStore},
    key_provider::{KeyProvider, SoftwareKeyProvider},
    user_approval::{
        Approval, ApprovalPrompt, RegistrationPrompt, UserApproval, SUSPICIOUS_MISSED,
    },
};

#[cfg(any(feature = "tokio", test))]
pub use self::credential_store::FileStore;

#[cfg(feature = "sqlite")]
pub use self::credential_store::SqliteStore;

#[cfg(feature = "testable")]
pub use self::{key_provider::MockKeyProvider, user_approval::MockUserApproval};
