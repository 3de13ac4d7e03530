use super::PARAMETER_LEN;

bitflags::bitflags! {
    /// The user presence byte of an authentication response.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserPresence: u8 {
        /// The user approved the request on the device.
        const PRESENT = 1 << 0;
    }
}

impl From<UserPresence> for u8 {
    fn from(src: UserPresence) -> Self {
        src.bits()
    }
}

/// This message is output by the device after the user approved an authentication. Its raw
/// representation is the concatenation of its fields.
#[derive(Debug, Clone)]
pub struct AuthenticationResponse {
    /// Whether user presence was verified or not
    pub user_presence: UserPresence,
    /// The counter value after this authentication. It must be transported as big endian
    /// representation.
    pub counter: u32,
    /// This is a ECDSA signature (on P-256) over the bytes returned by
    /// [`AuthenticationResponse::signature_target`].
    ///
    /// The signature is encoded in ANSI X9.62 format. It is verified by the relying party using
    /// the public key obtained during registration.
    pub signature: Vec<u8>,
}

impl AuthenticationResponse {
    /// The byte string an authentication signature covers:
    /// 1. The application parameter [32 bytes].
    /// 2. The user presence byte [1 byte].
    /// 3. The counter [4 bytes].
    /// 4. The challenge parameter [32 bytes].
    pub fn signature_target(
        application: &[u8; PARAMETER_LEN],
        user_presence: UserPresence,
        counter: u32,
        challenge: &[u8; PARAMETER_LEN],
    ) -> Vec<u8> {
        application
            .iter()
            .copied()
            .chain([user_presence.into()])
            .chain(counter.to_be_bytes())
            .chain(challenge.iter().copied())
            .collect()
    }

    /// Encode the response to its successfull binary representation
    pub fn encode(self) -> Vec<u8> {
        [self.user_presence.into()]
            .into_iter()
            .chain(self.counter.to_be_bytes())
            .chain(self.signature)
            .collect()
    }
}
