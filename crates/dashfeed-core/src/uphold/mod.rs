//! Uphold account client: OAuth login, the Dash card and withdrawals.

mod error;

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::preferences::Preferences;
use crate::rate_source::SourceErrorKind;
use crate::{CoreError, ValidationError};

pub use error::{UpholdApiError, UpholdErrorReason};

pub const DEFAULT_BASE_URL: &str = "https://api.uphold.com";
const OTP_HEADER: &str = "OTP-Token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpholdConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl UpholdConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: HttpRequest::DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpholdCard {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub available: Decimal,
    /// Deposit addresses keyed by network.
    #[serde(default)]
    pub address: BTreeMap<String, String>,
}

impl UpholdCard {
    pub fn dash_address(&self) -> Option<&str> {
        self.address.get("dash").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denomination {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpholdTransaction {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub denomination: Option<Denomination>,
}

#[derive(Debug, Error)]
pub enum UpholdError {
    #[error("not logged in to Uphold")]
    NotAuthenticated,

    #[error("a one-time password is required")]
    OtpRequired,

    #[error("uphold authentication failed: {0}")]
    Auth(String),

    #[error("uphold request rejected: {0}")]
    Api(UpholdApiError),

    #[error("uphold is unreachable: {0}")]
    Network(HttpError),

    #[error("unexpected uphold response: {0}")]
    Parse(String),

    #[error("no Dash card is available on the Uphold account")]
    NoDashCard,

    #[error("withdrawal amount must be positive: {0}")]
    InvalidAmount(Decimal),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Preferences(#[from] CoreError),
}

impl UpholdError {
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            Self::NotAuthenticated | Self::Auth(_) => SourceErrorKind::Auth,
            Self::OtpRequired => SourceErrorKind::OtpRequired,
            Self::Api(error) => match error.status {
                401 => SourceErrorKind::Auth,
                429 | 500..=599 => SourceErrorKind::Fetch,
                _ => SourceErrorKind::InvalidRequest,
            },
            Self::Network(_) => SourceErrorKind::Network,
            Self::Parse(_) => SourceErrorKind::Fetch,
            Self::InvalidAmount(_) | Self::Validation(_) => SourceErrorKind::InvalidRequest,
            Self::NoDashCard | Self::Preferences(_) => SourceErrorKind::Internal,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    otp_token: Option<String>,
    dash_card: Option<UpholdCard>,
}

pub struct UpholdClient {
    config: UpholdConfig,
    http: Arc<dyn HttpClient>,
    prefs: Preferences,
    session: Mutex<Session>,
}

impl UpholdClient {
    pub fn new(config: UpholdConfig, http: Arc<dyn HttpClient>, prefs: Preferences) -> Self {
        Self {
            config,
            http,
            prefs,
            session: Mutex::new(Session::default()),
        }
    }

    pub fn config(&self) -> &UpholdConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> Result<bool, UpholdError> {
        Ok(self.prefs.uphold_access_token()?.is_some())
    }

    /// Exchange an OAuth authorization code, store the token and load the Dash card.
    pub async fn authorize(&self, code: &str) -> Result<UpholdCard, UpholdError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(UpholdError::Auth(String::from("authorization code is empty")));
        }

        let request = HttpRequest::post(self.url("/oauth2/token")).with_form(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ]);
        let response = self.send(request).await?;
        if !response.is_success() {
            let error = UpholdApiError::new(response.status, &response.body);
            return Err(UpholdError::Auth(error.description()));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }
        let token: TokenResponse = parse_body(&response)?;
        self.prefs.set_uphold_access_token(&token.access_token)?;
        self.session.lock().await.dash_card = None;
        info!("uphold access token stored");

        self.dash_card().await
    }

    /// Revoke the stored token; succeeds only when Uphold answers `OK`.
    pub async fn revoke(&self) -> Result<(), UpholdError> {
        let token = self.access_token()?;
        let request = HttpRequest::post(self.url("/oauth2/revoke"))
            .with_auth(&HttpAuth::BearerToken(token.clone()))
            .with_form(&[("token", token.as_str())]);
        let response = self.send(request).await?;

        if !response.is_success() {
            return Err(UpholdError::Api(UpholdApiError::new(response.status, &response.body)));
        }
        if response.body.trim().trim_matches('"') != "OK" {
            return Err(UpholdError::Parse(format!(
                "revoke answered '{}'",
                response.body.trim()
            )));
        }

        self.prefs.clear_uphold_access_token()?;
        let mut session = self.session.lock().await;
        session.dash_card = None;
        session.otp_token = None;
        info!("uphold access token revoked");
        Ok(())
    }

    /// The account's Dash card, creating it and its deposit address when missing.
    pub async fn dash_card(&self) -> Result<UpholdCard, UpholdError> {
        if let Some(card) = self.session.lock().await.dash_card.clone() {
            return Ok(card);
        }
        self.load_dash_card().await
    }

    /// Available Dash on the card, always fetched fresh.
    pub async fn dash_balance(&self) -> Result<Decimal, UpholdError> {
        self.load_dash_card().await.map(|card| card.available)
    }

    /// OTP sent with subsequent requests until the next commit.
    pub async fn set_otp_token(&self, otp: Option<String>) {
        self.session.lock().await.otp_token = otp
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
    }

    pub async fn create_withdrawal(
        &self,
        amount: Decimal,
        address: &str,
    ) -> Result<UpholdTransaction, UpholdError> {
        if amount <= Decimal::ZERO {
            return Err(UpholdError::InvalidAmount(amount));
        }
        let address = address.trim();
        if address.is_empty() {
            return Err(ValidationError::EmptyAddress.into());
        }

        let card = self.dash_card().await?;
        let body = json!({
            "denomination": { "amount": amount.normalize().to_string(), "currency": "DASH" },
            "destination": address,
        });
        let request = HttpRequest::post(self.url(&format!("/v0/me/cards/{}/transactions", card.id)))
            .with_json(&body);
        let response = self.authorized(request).await?;

        if otp_required(&response) {
            return Err(UpholdError::OtpRequired);
        }
        if !response.is_success() {
            return Err(UpholdError::Api(UpholdApiError::new(response.status, &response.body)));
        }

        let transaction: UpholdTransaction = parse_body(&response)?;
        info!(transaction = %transaction.id, "uphold withdrawal created");
        Ok(transaction)
    }

    /// Commit a created withdrawal. The OTP token is consumed either way.
    pub async fn commit_transaction(&self, transaction_id: &str) -> Result<UpholdTransaction, UpholdError> {
        let card = self.dash_card().await?;
        let had_otp = self.session.lock().await.otp_token.is_some();

        let request = HttpRequest::post(self.url(&format!(
            "/v0/me/cards/{}/transactions/{}/commit",
            card.id,
            urlencoding::encode(transaction_id.trim())
        )))
        .with_json(&json!({}));
        let result = self.authorized(request).await;
        self.session.lock().await.otp_token = None;
        let response = result?;

        if !response.is_success() {
            if otp_required(&response) {
                return Err(UpholdError::OtpRequired);
            }
            let error = UpholdApiError::new(response.status, &response.body);
            if had_otp && error.is_token_error() {
                return Err(UpholdError::OtpRequired);
            }
            return Err(UpholdError::Api(error));
        }

        let transaction: UpholdTransaction = parse_body(&response)?;
        info!(transaction = %transaction.id, "uphold withdrawal committed");
        Ok(transaction)
    }

    async fn load_dash_card(&self) -> Result<UpholdCard, UpholdError> {
        let response = self
            .authorized(HttpRequest::get(self.url("/v0/me/cards")))
            .await?;
        if !response.is_success() {
            return Err(api_error(&response));
        }

        let cards: Vec<UpholdCard> = parse_body(&response)?;
        let mut card = match cards
            .into_iter()
            .find(|card| card.currency.eq_ignore_ascii_case("dash"))
        {
            Some(card) => card,
            None => self.create_dash_card().await?,
        };

        if card.dash_address().is_none() {
            match self.create_dash_address(&card.id).await {
                Ok(address) => {
                    card.address.insert(String::from("dash"), address);
                }
                Err(error) => warn!(card = %card.id, "cannot create dash deposit address: {error}"),
            }
        }

        self.session.lock().await.dash_card = Some(card.clone());
        Ok(card)
    }

    async fn create_dash_card(&self) -> Result<UpholdCard, UpholdError> {
        debug!("no dash card found, creating one");
        let request = HttpRequest::post(self.url("/v0/me/cards"))
            .with_json(&json!({ "label": "Dash Card", "currency": "DASH" }));
        let response = self.authorized(request).await?;
        if !response.is_success() {
            return Err(match api_error(&response) {
                UpholdError::Api(error) if error.status == 404 => UpholdError::NoDashCard,
                other => other,
            });
        }
        parse_body(&response)
    }

    async fn create_dash_address(&self, card_id: &str) -> Result<String, UpholdError> {
        let request = HttpRequest::post(self.url(&format!("/v0/me/cards/{card_id}/addresses")))
            .with_json(&json!({ "network": "dash" }));
        let response = self.authorized(request).await?;
        if !response.is_success() {
            return Err(api_error(&response));
        }

        #[derive(Deserialize)]
        struct CreatedAddress {
            id: String,
        }
        parse_body::<CreatedAddress>(&response).map(|created| created.id)
    }

    fn access_token(&self) -> Result<String, UpholdError> {
        self.prefs
            .uphold_access_token()?
            .ok_or(UpholdError::NotAuthenticated)
    }

    /// Send with bearer auth and any OTP. A 401 that is not an OTP challenge
    /// forgets the stored token.
    async fn authorized(&self, request: HttpRequest) -> Result<HttpResponse, UpholdError> {
        let mut request = request.with_auth(&HttpAuth::BearerToken(self.access_token()?));
        let otp = self.session.lock().await.otp_token.clone();
        let sent_otp = otp.is_some();
        if let Some(otp) = otp {
            request = request.with_header(OTP_HEADER, otp);
        }

        let response = self.send(request).await?;
        if response.status == 401 && !sent_otp && !otp_required(&response) {
            warn!("uphold rejected the access token, clearing it");
            self.prefs.clear_uphold_access_token()?;
            self.session.lock().await.dash_card = None;
        }
        Ok(response)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, UpholdError> {
        self.http
            .execute(request.with_timeout_ms(self.config.timeout_ms))
            .await
            .map_err(UpholdError::Network)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }
}

fn otp_required(response: &HttpResponse) -> bool {
    response
        .header(OTP_HEADER)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("required"))
}

fn api_error(response: &HttpResponse) -> UpholdError {
    UpholdError::Api(UpholdApiError::new(response.status, &response.body))
}

fn parse_body<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, UpholdError> {
    serde_json::from_str(&response.body).map_err(|error| UpholdError::Parse(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ScriptedHttpClient;
    use rust_decimal_macros::dec;

    const BASE: &str = "https://uphold.test";

    fn client(http: Arc<ScriptedHttpClient>, prefs: Preferences) -> UpholdClient {
        UpholdClient::new(
            UpholdConfig::new("client", "secret").with_base_url(BASE),
            http,
            prefs,
        )
    }

    fn logged_in() -> Preferences {
        let prefs = Preferences::in_memory();
        prefs.set_uphold_access_token("tok").expect("token");
        prefs
    }

    const CARDS: &str = r#"[
        {"id":"usd-1","label":"USD","currency":"USD","available":"3.00","address":{}},
        {"id":"card-1","label":"Dash Card","currency":"DASH","available":"1.25","address":{"dash":"XdashAddr"}}
    ]"#;

    #[tokio::test]
    async fn authorize_stores_token_and_loads_card() {
        let http = Arc::new(
            ScriptedHttpClient::new()
                .respond(
                    format!("{BASE}/oauth2/token"),
                    HttpResponse::ok_json(r#"{"access_token":"fresh","token_type":"bearer"}"#),
                )
                .respond(format!("{BASE}/v0/me/cards"), HttpResponse::ok_json(CARDS)),
        );
        let prefs = Preferences::in_memory();
        let uphold = client(http.clone(), prefs.clone());

        let card = uphold.authorize("auth-code").await.expect("authorized");

        assert_eq!(card.id, "card-1");
        assert_eq!(prefs.uphold_access_token().expect("read").as_deref(), Some("fresh"));
        let requests = http.requests();
        assert!(requests[0]
            .body
            .as_deref()
            .is_some_and(|body| body.contains("grant_type=authorization_code")));
        assert_eq!(
            requests[1].headers.get("authorization").map(String::as_str),
            Some("Bearer fresh")
        );
    }

    #[tokio::test]
    async fn missing_token_is_not_authenticated() {
        let uphold = client(Arc::new(ScriptedHttpClient::new()), Preferences::in_memory());
        assert!(matches!(
            uphold.dash_balance().await,
            Err(UpholdError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn unauthorized_response_clears_token() {
        let http = Arc::new(ScriptedHttpClient::new().respond(
            format!("{BASE}/v0/me/cards"),
            HttpResponse::new(401, r#"{"errors":{"token":[{"code":"invalid"}]}}"#),
        ));
        let prefs = logged_in();
        let uphold = client(http, prefs.clone());

        let error = uphold.dash_balance().await.expect_err("rejected");
        assert_eq!(error.kind(), SourceErrorKind::Auth);
        assert_eq!(prefs.uphold_access_token().expect("read"), None);
    }

    #[tokio::test]
    async fn creates_missing_dash_address() {
        let http = Arc::new(
            ScriptedHttpClient::new()
                .respond(
                    format!("{BASE}/v0/me/cards"),
                    HttpResponse::ok_json(
                        r#"[{"id":"card-9","label":"Dash","currency":"dash","available":"0"}]"#,
                    ),
                )
                .respond(
                    format!("{BASE}/v0/me/cards/card-9/addresses"),
                    HttpResponse::ok_json(r#"{"id":"XnewAddr","network":"dash"}"#),
                ),
        );
        let uphold = client(http, logged_in());

        let card = uphold.dash_card().await.expect("card");
        assert_eq!(card.dash_address(), Some("XnewAddr"));
    }

    #[tokio::test]
    async fn withdrawal_requiring_otp_is_reported() {
        let http = Arc::new(
            ScriptedHttpClient::new()
                .respond(format!("{BASE}/v0/me/cards"), HttpResponse::ok_json(CARDS))
                .respond(
                    format!("{BASE}/v0/me/cards/card-1/transactions"),
                    HttpResponse::new(401, "{}").with_header("OTP-Token", "required"),
                ),
        );
        let prefs = logged_in();
        let uphold = client(http, prefs.clone());

        let error = uphold
            .create_withdrawal(dec!(0.5), "XdestAddr")
            .await
            .expect_err("otp");
        assert!(matches!(error, UpholdError::OtpRequired));
        assert_eq!(error.kind(), SourceErrorKind::OtpRequired);
        assert!(prefs.uphold_access_token().expect("read").is_some());
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let uphold = client(Arc::new(ScriptedHttpClient::new()), logged_in());
        assert!(matches!(
            uphold.create_withdrawal(dec!(0), "Xaddr").await,
            Err(UpholdError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn commit_consumes_otp_token() {
        let http = Arc::new(
            ScriptedHttpClient::new()
                .respond(format!("{BASE}/v0/me/cards"), HttpResponse::ok_json(CARDS))
                .respond(
                    format!("{BASE}/v0/me/cards/card-1/transactions/tx-7/commit"),
                    HttpResponse::ok_json(
                        r#"{"id":"tx-7","status":"completed","denomination":{"amount":"0.5","currency":"DASH"}}"#,
                    ),
                ),
        );
        let uphold = client(http.clone(), logged_in());
        uphold.set_otp_token(Some(String::from(" 123456 "))).await;

        let transaction = uphold.commit_transaction("tx-7").await.expect("committed");

        assert_eq!(transaction.status.as_deref(), Some("completed"));
        let commit = http
            .requests()
            .into_iter()
            .find(|request| request.url.ends_with("/commit"))
            .expect("commit request");
        assert_eq!(commit.headers.get("otp-token").map(String::as_str), Some("123456"));
        assert!(uphold.session.lock().await.otp_token.is_none());
    }

    #[tokio::test]
    async fn revoke_requires_ok_body() {
        let http = Arc::new(
            ScriptedHttpClient::new()
                .respond(format!("{BASE}/oauth2/revoke"), HttpResponse::ok_json("NOPE")),
        );
        let prefs = logged_in();
        let uphold = client(http.clone(), prefs.clone());

        assert!(matches!(uphold.revoke().await, Err(UpholdError::Parse(_))));
        assert!(prefs.uphold_access_token().expect("read").is_some());

        http.route(format!("{BASE}/oauth2/revoke"), Ok(HttpResponse::ok_json("OK")));
        uphold.revoke().await.expect("revoked");
        assert_eq!(prefs.uphold_access_token().expect("read"), None);
    }
}
