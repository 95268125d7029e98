//! Http client for the mint endpoints the ledger uses

use std::time::Duration;

use async_trait::async_trait;
use cdk_ledger_common::{
    Amount, CheckStateRequest, CheckStateResponse, Error, ErrorResponse, MeltQuoteBolt11Request,
    MeltQuoteBolt11Response, MeltQuoteState, MeltRequest, MintConnector, MintUrl,
};
use reqwest::{Client, IntoUrl};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Default timeout of a single request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct HttpClientCore {
    inner: Client,
    timeout: Duration,
}

impl HttpClientCore {
    fn new(timeout: Duration) -> Self {
        Self {
            inner: Client::new(),
            timeout,
        }
    }

    async fn http_post<U: IntoUrl + Send, P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: U,
        payload: &P,
    ) -> Result<R, Error> {
        let response = self
            .inner
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::MintTransport(e.to_string()))?;

        let status = response.status();

        let body = response
            .text()
            .await
            .map_err(|e| Error::MintTransport(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => err.into(),
                Err(_) => Error::MintTransport(format!("HTTP status {status}: {body}")),
            });
        }

        serde_json::from_str::<R>(&body).map_err(|err| {
            tracing::warn!("Http Response error: {}", err);
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(ok) => ok.into(),
                Err(_) => Error::MintTransport(format!("Unexpected response: {err}")),
            }
        })
    }
}

/// Melt response as sent by the mint
///
/// Older mints only report `paid`. Change signatures are dropped since no blank outputs are
/// ever sent.
#[derive(Debug, Deserialize)]
struct MeltResponseWire {
    quote: String,
    amount: Amount,
    fee_reserve: Amount,
    #[serde(default)]
    state: Option<MeltQuoteState>,
    #[serde(default)]
    paid: Option<bool>,
    #[serde(default)]
    expiry: u64,
    #[serde(default)]
    payment_preimage: Option<String>,
}

impl From<MeltResponseWire> for MeltQuoteBolt11Response {
    fn from(wire: MeltResponseWire) -> Self {
        let state = match (wire.state, wire.paid) {
            (Some(state), _) => state,
            (None, Some(true)) => MeltQuoteState::Paid,
            (None, _) => MeltQuoteState::Unpaid,
        };

        Self {
            quote: wire.quote,
            amount: wire.amount,
            fee_reserve: wire.fee_reserve,
            state,
            expiry: wire.expiry,
            payment_preimage: wire.payment_preimage,
            change: None,
        }
    }
}

/// Http Client
#[derive(Debug, Clone)]
pub struct HttpClient {
    core: HttpClientCore,
    mint_url: MintUrl,
}

impl HttpClient {
    /// Create new [`HttpClient`]
    pub fn new(mint_url: MintUrl) -> Self {
        Self::with_timeout(mint_url, DEFAULT_TIMEOUT)
    }

    /// Create new [`HttpClient`] with a request timeout
    pub fn with_timeout(mint_url: MintUrl, timeout: Duration) -> Self {
        Self {
            core: HttpClientCore::new(timeout),
            mint_url,
        }
    }

    /// Mint url
    pub fn mint_url(&self) -> &MintUrl {
        &self.mint_url
    }
}

#[async_trait]
impl MintConnector for HttpClient {
    /// Melt Quote [NUT-05]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url))]
    async fn post_melt_quote(
        &self,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        let url = self
            .mint_url
            .join_paths(&["v1", "melt", "quote", "bolt11"])?;

        let response: MeltResponseWire = self.core.http_post(url, &request).await?;
        Ok(response.into())
    }

    /// Melt [NUT-05]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url, quote = %request.quote))]
    async fn post_melt(&self, request: MeltRequest) -> Result<MeltQuoteBolt11Response, Error> {
        let url = self.mint_url.join_paths(&["v1", "melt", "bolt11"])?;

        let response: MeltResponseWire = self.core.http_post(url, &request).await?;
        Ok(response.into())
    }

    /// Spendable check [NUT-07]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url))]
    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        let url = self.mint_url.join_paths(&["v1", "checkstate"])?;
        self.core.http_post(url, &request).await
    }
}
