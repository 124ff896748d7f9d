//! Behavior-driven tests for the Uphold withdrawal journey.

use std::sync::Arc;

use dashfeed_core::uphold::UpholdErrorReason;
use dashfeed_core::{
    HttpResponse, Preferences, ScriptedHttpClient, SourceErrorKind, UpholdClient, UpholdConfig,
    UpholdError,
};
use dashfeed_store::{Store, StoreConfig};
use rust_decimal_macros::dec;

const BASE: &str = "https://uphold.test";

const CARDS: &str = r#"[
    {"id":"card-1","label":"Dash Card","currency":"DASH","available":"2.50","address":{"dash":"XcardAddr"}}
]"#;

fn client(http: Arc<ScriptedHttpClient>, prefs: Preferences) -> UpholdClient {
    UpholdClient::new(
        UpholdConfig::new("client", "secret").with_base_url(format!("{BASE}/")),
        http,
        prefs,
    )
}

// =============================================================================
// Login and withdrawal
// =============================================================================

#[tokio::test]
async fn a_withdrawal_needing_two_factor_completes_after_the_code_is_given() {
    // Given: a store-backed session and an account demanding OTP for transfers
    let temp = tempfile::tempdir().expect("tempdir");
    let store = Store::open(StoreConfig::in_home(temp.path())).expect("store");
    let prefs = Preferences::new(Arc::new(store.clone()));
    let transactions = format!("{BASE}/v0/me/cards/card-1/transactions");
    let http = Arc::new(
        ScriptedHttpClient::new()
            .respond(
                format!("{BASE}/oauth2/token"),
                HttpResponse::ok_json(r#"{"access_token":"tok-1","token_type":"bearer"}"#),
            )
            .respond(format!("{BASE}/v0/me/cards"), HttpResponse::ok_json(CARDS))
            .respond(
                transactions.clone(),
                HttpResponse::new(401, "{}").with_header("OTP-Token", "required"),
            )
            .respond(
                format!("{transactions}/tx-9/commit"),
                HttpResponse::ok_json(r#"{"id":"tx-9","status":"completed"}"#),
            ),
    );
    let uphold = client(Arc::clone(&http), prefs.clone());

    // When: the user logs in and asks for a withdrawal without a code
    let card = uphold.authorize("code-1").await.expect("login");
    let first = uphold.create_withdrawal(dec!(1.5), "XdestAddr").await;

    // Then: a second factor is requested and the session survives
    assert_eq!(card.dash_address(), Some("XcardAddr"));
    assert!(matches!(first, Err(UpholdError::OtpRequired)));
    assert_eq!(
        Preferences::new(Arc::new(store.clone()))
            .uphold_access_token()
            .expect("read")
            .as_deref(),
        Some("tok-1")
    );

    // When: the code is supplied, the withdrawal is retried and committed
    http.route(
        transactions.clone(),
        Ok(HttpResponse::ok_json(
            r#"{"id":"tx-9","status":"pending","denomination":{"amount":"1.5","currency":"DASH"}}"#,
        )),
    );
    uphold.set_otp_token(Some(String::from("424242"))).await;
    let created = uphold
        .create_withdrawal(dec!(1.5), "XdestAddr")
        .await
        .expect("created");
    let committed = uphold.commit_transaction(&created.id).await.expect("committed");

    // Then: the transfer completes with the code attached to both calls
    assert_eq!(created.denomination.map(|value| value.amount), Some(dec!(1.5)));
    assert_eq!(committed.status.as_deref(), Some("completed"));
    let with_otp = http
        .requests()
        .into_iter()
        .filter(|request| request.headers.get("otp-token").map(String::as_str) == Some("424242"))
        .count();
    assert_eq!(with_otp, 2);
}

#[tokio::test]
async fn an_expired_token_logs_the_user_out() {
    // Given: a stored token the server no longer accepts
    let prefs = Preferences::in_memory();
    prefs.set_uphold_access_token("stale").expect("token");
    let http = Arc::new(ScriptedHttpClient::new().respond(
        format!("{BASE}/v0/me/cards"),
        HttpResponse::new(401, r#"{"errors":{"token":[{"code":"invalid_token"}]}}"#),
    ));
    let uphold = client(http, prefs.clone());

    // When: the balance is requested
    let error = uphold.dash_balance().await.expect_err("rejected");

    // Then: the token is forgotten and later calls need a new login
    assert_eq!(error.kind(), SourceErrorKind::Auth);
    assert!(!uphold.is_authenticated().expect("read"));
    assert!(matches!(
        uphold.dash_balance().await,
        Err(UpholdError::NotAuthenticated)
    ));
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn insufficient_funds_are_classified_for_the_user() {
    // Given: an account without enough balance for the transfer
    let prefs = Preferences::in_memory();
    prefs.set_uphold_access_token("tok").expect("token");
    let http = Arc::new(
        ScriptedHttpClient::new()
            .respond(format!("{BASE}/v0/me/cards"), HttpResponse::ok_json(CARDS))
            .respond(
                format!("{BASE}/v0/me/cards/card-1/transactions"),
                HttpResponse::new(
                    400,
                    r#"{"code":"validation_failed","errors":{"denomination":{"code":"validation_failed",
                        "errors":{"amount":[{"code":"sufficient_funds","message":"Not enough funds"}]}}}}"#,
                ),
            ),
    );
    let uphold = client(http, prefs);

    // When: a withdrawal larger than the balance is requested
    let error = uphold
        .create_withdrawal(dec!(99), "XdestAddr")
        .await
        .expect_err("rejected");

    // Then: the reason is recognised and the request is not retryable
    let UpholdError::Api(api) = &error else {
        panic!("expected an api error");
    };
    assert_eq!(api.classify(), Some(UpholdErrorReason::InsufficientFunds));
    assert_eq!(api.description(), "insufficient funds");
    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
}

#[tokio::test]
async fn unrecognised_rejections_fall_back_to_a_status_description() {
    let prefs = Preferences::in_memory();
    prefs.set_uphold_access_token("tok").expect("token");
    let http = Arc::new(ScriptedHttpClient::new().respond(
        format!("{BASE}/v0/me/cards"),
        HttpResponse::new(429, "slow down"),
    ));
    let uphold = client(http, prefs);

    let error = uphold.dash_card().await.expect_err("throttled");

    assert_eq!(error.kind(), SourceErrorKind::Fetch);
    assert_eq!(
        error.to_string(),
        "uphold request rejected: too many requests, try again later (status 429)"
    );
}
