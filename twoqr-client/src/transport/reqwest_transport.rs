use reqwest::{header::ACCEPT, Client, Response};
use serde::Serialize;
use twoqr_types::ProtocolError;
use url::Url;

use super::{RelyingPartyResponse, RelyingPartyTransport};

fn network(err: reqwest::Error) -> ProtocolError {
    ProtocolError::NetworkFailure(err.to_string())
}

async fn into_response(response: Response) -> Result<RelyingPartyResponse, ProtocolError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(network)?;
    Ok(RelyingPartyResponse { status, body })
}

impl RelyingPartyTransport for Client {
    async fn fetch_info(&self, url: Url) -> Result<RelyingPartyResponse, ProtocolError> {
        let response = self
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(network)?;
        into_response(response).await
    }

    async fn post_json<P>(&self, url: Url, body: &P) -> Result<RelyingPartyResponse, ProtocolError>
    where
        P: Serialize + Sync,
    {
        let response = self
            .post(url)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(network)?;
        into_response(response).await
    }
}
