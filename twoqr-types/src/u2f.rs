//! U2F raw message formats produced by a 2Q2R device.
//!
//! Unlike a USB or NFC token, a 2Q2R device never frames its responses in APDUs, so none of the
//! encodings in this module carry ISO 7816-4 status words.
//!
//! Byte layouts are taken from <https://fidoalliance.org/specs/fido-u2f-v1.2-ps-20170411/fido-u2f-raw-message-formats-v1.2-ps-20170411.html>
mod authenticate;
mod register;

pub use {authenticate::*, register::*};


/// Length of a SHA-256 application or challenge parameter.
pub const PARAMETER_LEN: usize = 32;

/// Length of an uncompressed P-256 public key, `0x04 | x | y`.
pub const PUBLIC_KEY_LEN: usize = 65;

const COORDINATE_LEN: usize = 32;

/// U2F public key is the concatenation of `0x04 | x | y` where `0x04` signifies ecc uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    // magic 0x04 byte which is added in the `encode` method
    /// X coordinate of the ECC public key
    pub x: [u8; 32],
    /// Y coordinate of the ECC public key
    pub y: [u8; 32],
}

impl PublicKey {
    /// Build a public key from big endian affine coordinates.
    ///
    /// Some keystores hand out coordinates as minimal big integers, which can be shorter than 32
    /// bytes, or with a leading sign byte, which makes them longer. Short coordinates are left
    /// padded with zeros and extra leading bytes are dropped.
    pub fn from_coordinates(x: &[u8], y: &[u8]) -> Self {
        Self {
            x: fit_coordinate(x),
            y: fit_coordinate(y),
        }
    }

    /// Parse an uncompressed SEC1 point.
    pub fn from_uncompressed(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x04, rest @ ..] if rest.len() == 2 * COORDINATE_LEN => {
                let (x, y) = rest.split_at(COORDINATE_LEN);
                Some(Self {
                    x: x.try_into().ok()?,
                    y: y.try_into().ok()?,
                })
            }
            _ => None,
        }
    }

    /// Encode a Public key into an iterator
    pub fn encode(self) -> impl Iterator<Item = u8> {
        [0x04].into_iter().chain(self.x).chain(self.y)
    }

    /// The 65 byte uncompressed representation.
    pub fn to_bytes(self) -> [u8; PUBLIC_KEY_LEN] {
        let mut bytes = [0; PUBLIC_KEY_LEN];
        for (slot, byte) in bytes.iter_mut().zip(self.encode()) {
            *slot = byte;
        }
        bytes
    }
}

fn fit_coordinate(value: &[u8]) -> [u8; COORDINATE_LEN] {
    let mut out = [0; COORDINATE_LEN];
    let value = &value[value.len().saturating_sub(COORDINATE_LEN)..];
    out[COORDINATE_LEN - value.len()..].copy_from_slice(value);
    out
}
