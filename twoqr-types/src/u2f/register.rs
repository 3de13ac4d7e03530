use super::{PublicKey, PARAMETER_LEN, PUBLIC_KEY_LEN};

const RESERVED_RESPONSE_BYTE: u8 = 0x05;
const RESERVED_SIGNATURE_BYTE: u8 = 0x00;

/// Register response payload
///
/// This message is output once the device created a new keypair in response to a registration
/// request. The device only builds it after the user approved the registration.
#[derive(Debug, Clone)]
pub struct RegisterResponse {
    // Reserved byte, value 0x05 which is added in the `encode` method
    /// This is the (uncompressed) x,y-representation of a curve point on the P-256 NIST elliptic
    /// curve. User's new public key
    pub public_key: PublicKey,

    // Key handle length byte which specifies the length of the key handle (see below). The value is
    // unsigned (range 0-255)
    /// This a handle that allows the device to identify the generated key pair.
    pub key_handle: Vec<u8>,

    /// This is a certificate in X.509 DER format. Parsing of the X.509 certificate unambiguously
    /// establishes its ending. May be empty when the keystore has no attestation to offer.
    pub attestation_certificate: Vec<u8>,

    /// This is a ECDSA signature (on P-256) over the bytes returned by
    /// [`RegisterResponse::signature_target`].
    pub signature: Vec<u8>,
}

impl RegisterResponse {
    /// The byte string a registration signature covers:
    /// 1. A byte reserved for future use [1 byte] with the value 0x00.
    /// 2. The application parameter [32 bytes].
    /// 3. The challenge parameter [32 bytes].
    /// 4. The key handle [variable length]. The key handle length is not included.
    /// 5. The user public key [65 bytes].
    pub fn signature_target(
        application: &[u8; PARAMETER_LEN],
        challenge: &[u8; PARAMETER_LEN],
        key_handle: &[u8],
        public_key: PublicKey,
    ) -> Vec<u8> {
        let mut target =
            Vec::with_capacity(1 + 2 * PARAMETER_LEN + key_handle.len() + PUBLIC_KEY_LEN);
        target.push(RESERVED_SIGNATURE_BYTE);
        target.extend_from_slice(application);
        target.extend_from_slice(challenge);
        target.extend_from_slice(key_handle);
        target.extend(public_key.encode());
        target
    }

    /// Encode the Response to it's binary format for a successfull response
    ///
    /// The key handle must fit its one byte length prefix, see [`MAX_KEY_HANDLE_LEN`].
    #[allow(clippy::as_conversions)]
    pub fn encode(self) -> Vec<u8> {
        debug_assert!(self.key_handle.len() <= MAX_KEY_HANDLE_LEN);
        [RESERVED_RESPONSE_BYTE]
            .into_iter()
            .chain(self.public_key.encode())
            .chain([self.key_handle.len() as u8])
            .chain(self.key_handle)
            .chain(self.attestation_certificate)
            .chain(self.signature)
            .collect()
    }
}

/// The longest key handle a registration response can describe.
pub const MAX_KEY_HANDLE_LEN: usize = 255;
