use serde::Serialize;
use twoqr_types::ProtocolError;
use url::Url;

#[cfg(feature = "reqwest")]
mod reqwest_transport;

/// A trait to implement the HTTP exchanges with relying parties.
///
/// The implementer should take the following into consideration:
/// * Ensure an appropriate timeout is set
/// * Only follow HTTPS links and redirects
/// * Set the `Accept` header to `application/json`
/// * Never retry on its own, a request that failed may still have reached the relying party
///
/// Connection level failures are reported as [`ProtocolError::NetworkFailure`]. Any response
/// the relying party produced, whatever its status, is returned as a [`RelyingPartyResponse`].
#[expect(async_fn_in_trait)]
pub trait RelyingPartyTransport {
    /// `GET` the relying party's info document.
    async fn fetch_info(&self, url: Url) -> Result<RelyingPartyResponse, ProtocolError>;

    /// `POST` `body` as JSON.
    async fn post_json<P>(&self, url: Url, body: &P) -> Result<RelyingPartyResponse, ProtocolError>
    where
        P: Serialize + Sync;
}

/// What a relying party answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingPartyResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl RelyingPartyResponse {
    /// A `200 OK` response with `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Relying parties signal success with `200` and nothing else.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Turn anything but a success into [`ProtocolError::RelyingPartyRejected`], keeping the body
    /// verbatim.
    pub fn accepted(self) -> Result<String, ProtocolError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(ProtocolError::RelyingPartyRejected {
                status: self.status,
                message: self.body,
            })
        }
    }
}

impl RelyingPartyTransport for () {
    async fn fetch_info(&self, _url: Url) -> Result<RelyingPartyResponse, ProtocolError> {
        Err(ProtocolError::NetworkFailure("no transport configured".into()))
    }

    async fn post_json<P>(&self, _url: Url, _body: &P) -> Result<RelyingPartyResponse, ProtocolError>
    where
        P: Serialize + Sync,
    {
        Err(ProtocolError::NetworkFailure("no transport configured".into()))
    }
}
