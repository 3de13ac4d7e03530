#[macro_use]
pub(crate) mod status_enum;

pub mod crypto;
pub mod encoding;
pub mod rand;
