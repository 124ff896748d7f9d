//! Behavior-driven tests for exchange-rate refresh through the source chain.
//!
//! Every upstream is served by `ScriptedHttpClient`; unscripted URLs behave
//! like unreachable hosts.

use std::sync::Arc;
use std::time::Duration;

use dashfeed_core::sources::dash_rates::DASH_RATES_URL;
use dashfeed_core::sources::dash_retail::DASH_RETAIL_URL;
use dashfeed_core::sources::default_sources;
use dashfeed_core::sources::feeds::{BITPAY_URL, DASHCENTRAL_URL};
use dashfeed_core::{
    BackgroundWorker, CurrencyCode, HttpResponse, RateCache, RateRepository, RefreshMode,
    RefreshOutcome, ScriptedHttpClient, SourceId,
};
use dashfeed_store::{Store, StoreConfig};
use rust_decimal_macros::dec;

const RETAIL_BODY: &str = r#"[
    {"baseCurrency":"DASH","quoteCurrency":"USD","price":"31.50"},
    {"baseCurrency":"DASH","quoteCurrency":"EUR","price":"29.10"},
    {"baseCurrency":"BTC","quoteCurrency":"USD","price":"60000"}
]"#;

const RATES_BODY: &str = r#"{"USD": 30.25, "EUR": 28.0, "GBP": 24.5, "DASH": 1}"#;

fn repository(http: Arc<ScriptedHttpClient>, store: &Store) -> RateRepository {
    let cache = RateCache::new(Arc::new(store.clone()), Duration::from_secs(30));
    cache.restore().expect("restore");
    let (worker, _handle) = BackgroundWorker::spawn("rates-test");
    RateRepository::new(
        cache,
        default_sources(http, 1_000),
        worker,
        CurrencyCode::parse("USD").expect("valid"),
    )
    .with_auto_refresh(false)
}

fn open_store(temp: &tempfile::TempDir) -> Store {
    Store::open(StoreConfig::in_home(temp.path())).expect("store")
}

// =============================================================================
// Source ordering
// =============================================================================

#[tokio::test]
async fn when_primary_source_answers_later_sources_are_never_called() {
    // Given: every source scripted to succeed
    let temp = tempfile::tempdir().expect("tempdir");
    let http = Arc::new(
        ScriptedHttpClient::new()
            .respond(DASH_RETAIL_URL, HttpResponse::ok_json(RETAIL_BODY))
            .respond(DASH_RATES_URL, HttpResponse::ok_json(RATES_BODY)),
    );
    let repository = repository(Arc::clone(&http), &open_store(&temp));

    // When: the rates are refreshed
    let outcome = repository.refresh(RefreshMode::Forced).await;

    // Then: the first source wins and nothing else is contacted
    let RefreshOutcome::Updated(report) = outcome else {
        panic!("expected an update");
    };
    assert_eq!(report.source, SourceId::DashRetail);
    assert_eq!(report.source_chain, vec![String::from("dashretail")]);
    assert!(report.warnings.is_empty());
    assert_eq!(http.request_count(DASH_RATES_URL), 0);
    assert_eq!(repository.get_rate("eur").map(|rate| rate.rate), Some(dec!(29.1)));
}

#[tokio::test]
async fn when_primary_source_fails_the_next_source_serves_rates() {
    // Given: the primary source returning a server error
    let temp = tempfile::tempdir().expect("tempdir");
    let http = Arc::new(
        ScriptedHttpClient::new()
            .respond(DASH_RETAIL_URL, HttpResponse::new(503, "maintenance"))
            .respond(DASH_RATES_URL, HttpResponse::ok_json(RATES_BODY)),
    );
    let repository = repository(http, &open_store(&temp));

    // When: the rates are refreshed
    let outcome = repository.refresh(RefreshMode::Forced).await;

    // Then: the second source serves, with a fallback warning
    let RefreshOutcome::Updated(report) = outcome else {
        panic!("expected an update");
    };
    assert_eq!(report.source, SourceId::DashRates);
    assert_eq!(
        report.source_chain,
        vec![String::from("dashretail"), String::from("dashrates")]
    );
    assert_eq!(
        report.warnings,
        vec![String::from(
            "fallback succeeded with 'dashrates' after 1 failed attempt(s)"
        )]
    );
    assert!(repository.get_rate("DASH").is_none(), "non-fiat codes are dropped");
}

#[tokio::test]
async fn when_both_dash_feeds_fail_the_btc_composite_serves_rates() {
    // Given: only the BitPay and DashCentral feeds reachable
    let temp = tempfile::tempdir().expect("tempdir");
    let http = Arc::new(
        ScriptedHttpClient::new()
            .respond(
                BITPAY_URL,
                HttpResponse::ok_json(r#"[{"code":"USD","rate":60000},{"code":"JPY","rate":9000000}]"#),
            )
            .respond(
                DASHCENTRAL_URL,
                HttpResponse::ok_json(r#"{"exchange_rates":{"btc_dash":0.0005}}"#),
            ),
    );
    let repository = repository(http, &open_store(&temp));

    // When: the rates are refreshed
    let outcome = repository.refresh(RefreshMode::Forced).await;

    // Then: rates are the BTC table times the DASH/BTC price
    let RefreshOutcome::Updated(report) = outcome else {
        panic!("expected an update");
    };
    assert_eq!(report.source, SourceId::FirstFallback);
    assert_eq!(repository.get_rate("USD").map(|rate| rate.rate), Some(dec!(30)));
    assert_eq!(repository.get_rate("JPY").map(|rate| rate.rate), Some(dec!(4500)));
}

#[tokio::test]
async fn every_cycle_starts_again_from_the_primary_source() {
    // Given: a primary that failed once and then recovered
    let temp = tempfile::tempdir().expect("tempdir");
    let http = Arc::new(
        ScriptedHttpClient::new()
            .respond(DASH_RETAIL_URL, HttpResponse::new(500, "boom"))
            .respond(DASH_RATES_URL, HttpResponse::ok_json(RATES_BODY)),
    );
    let repository = repository(Arc::clone(&http), &open_store(&temp));
    repository.refresh(RefreshMode::Forced).await;

    http.route(
        String::from(DASH_RETAIL_URL),
        Ok(HttpResponse::ok_json(RETAIL_BODY)),
    );

    // When: the next cycle runs
    let outcome = repository.refresh(RefreshMode::Forced).await;

    // Then: the primary is tried first again and wins
    let RefreshOutcome::Updated(report) = outcome else {
        panic!("expected an update");
    };
    assert_eq!(report.source, SourceId::DashRetail);
    assert_eq!(http.request_count(DASH_RETAIL_URL), 2);
}

// =============================================================================
// Exhaustion and persistence
// =============================================================================

#[tokio::test]
async fn when_every_source_fails_with_an_empty_cache_an_error_is_reported() {
    // Given: no upstream reachable and nothing stored
    let temp = tempfile::tempdir().expect("tempdir");
    let repository = repository(Arc::new(ScriptedHttpClient::new()), &open_store(&temp));

    // When: the rates are refreshed
    let outcome = repository.refresh(RefreshMode::Forced).await;

    // Then: every source was tried and the status carries an error
    let RefreshOutcome::Exhausted(failure) = outcome else {
        panic!("expected exhaustion");
    };
    assert_eq!(
        failure.source_chain,
        SourceId::ALL.iter().map(|id| id.as_str().to_owned()).collect::<Vec<_>>()
    );
    let status = repository.status();
    assert!(status.error.is_some());
    assert!(!status.serving_stale);
    assert!(!status.loading);
}

#[tokio::test]
async fn stored_rates_survive_a_restart_and_are_served_when_sources_fail() {
    // Given: one successful refresh persisted to the store
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(&temp);
    let online = Arc::new(
        ScriptedHttpClient::new().respond(DASH_RATES_URL, HttpResponse::ok_json(RATES_BODY)),
    );
    let first = repository(online, &store);
    let RefreshOutcome::Updated(report) = first.refresh(RefreshMode::Forced).await else {
        panic!("first refresh should succeed");
    };
    assert!(report.persisted);

    // When: a fresh cache over the same store starts with every source down
    drop(first);
    let restarted = repository(Arc::new(ScriptedHttpClient::new()), &store);
    let outcome = restarted.refresh(RefreshMode::Forced).await;

    // Then: the stored rates are served and flagged as stale
    assert!(matches!(outcome, RefreshOutcome::Exhausted(_)));
    let status = restarted.status();
    assert!(status.serving_stale);
    assert!(status.error.is_none());
    assert_eq!(restarted.get_rate("GBP").map(|rate| rate.rate), Some(dec!(24.5)));
    assert_eq!(restarted.cache().snapshot().source, Some(SourceId::DashRates));
}

#[tokio::test]
async fn best_rate_prefers_the_requested_code_then_the_default() {
    let temp = tempfile::tempdir().expect("tempdir");
    let http = Arc::new(
        ScriptedHttpClient::new().respond(DASH_RETAIL_URL, HttpResponse::ok_json(RETAIL_BODY)),
    );
    let repository = repository(http, &open_store(&temp));
    repository.refresh(RefreshMode::Forced).await;

    assert_eq!(
        repository.best_rate(Some("EUR")).map(|rate| rate.currency_code.to_string()),
        Some(String::from("EUR"))
    );
    assert_eq!(
        repository.best_rate(Some("CHF")).map(|rate| rate.currency_code.to_string()),
        Some(String::from("USD"))
    );
    assert_eq!(repository.search("u").len(), 2);
}
