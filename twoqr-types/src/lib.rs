//! # 2Q2R Types
//!
//! Rust type definitions for the 2Q2R protocol: the text messages carried by QR codes and push
//! notifications, the [U2F raw message formats] a device answers them with, the JSON payloads
//! exchanged with relying parties and the records a device keeps about its registrations.
//!
//! This crate does not perform any I/O.
//!
//! [U2F raw message formats]: https://fidoalliance.org/specs/fido-u2f-v1.2-ps-20170411/fido-u2f-raw-message-formats-v1.2-ps-20170411.html

#[macro_use]
mod utils;

mod client_data;
mod error;
mod records;

pub mod message;
pub mod relying_party;
pub mod u2f;

pub use self::{client_data::*, error::*, records::*};

// Re-exports
pub use utils::{crypto, encoding, rand, status_enum::UnknownStatus};
