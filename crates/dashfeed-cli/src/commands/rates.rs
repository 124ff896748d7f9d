use std::sync::Arc;
use std::time::Instant;

use dashfeed_core::sources::default_sources;
use dashfeed_core::{
    BackgroundWorker, CurrencyCode, ExchangeRate, RateCache, RateRepository, RefreshMode,
    RefreshOutcome, SourceId, UtcDateTime,
};
use serde::Serialize;
use tracing::info;

use crate::cli::{RateArgs, RatesArgs};
use crate::error::CliError;

use super::{attempt_errors, CommandResult, Context};

#[derive(Debug, Serialize)]
struct RatesResponseData {
    source: Option<SourceId>,
    fetched_at: Option<UtcDateTime>,
    serving_stale: bool,
    count: usize,
    rates: Vec<ExchangeRate>,
}

#[derive(Debug, Serialize)]
struct RateResponseData {
    requested: Option<String>,
    rate: Option<ExchangeRate>,
}

#[derive(Debug, Serialize)]
struct SourceInfo {
    id: SourceId,
    position: usize,
    upstreams: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    sources: Vec<SourceInfo>,
}

fn repository(context: &Context) -> Result<RateRepository, CliError> {
    let cache = RateCache::new(Arc::new(context.store.clone()), context.config.refresh_interval);
    let restored = cache.restore()?;
    info!(restored, "loaded cached rates");

    // One-shot process: refreshes happen inline, never on stale reads.
    let (worker, _handle) = BackgroundWorker::spawn("rates");
    Ok(RateRepository::new(
        cache,
        default_sources(Arc::clone(&context.http), context.config.http_timeout_ms),
        worker,
        context.config.default_currency.clone(),
    )
    .with_auto_refresh(false))
}

/// Refresh when needed and report what the cache now serves.
async fn refreshed(
    context: &Context,
    force: bool,
) -> Result<(RateRepository, CommandResult), CliError> {
    let started = Instant::now();
    let repository = repository(context)?;
    let source_chain = repository
        .canonical_order()
        .iter()
        .map(|id| id.as_str().to_owned())
        .collect();
    let mut result = CommandResult::ok(serde_json::Value::Null).with_source_chain(source_chain);

    if context.offline {
        return Ok((repository, result));
    }

    let outcome = if force {
        repository.refresh(RefreshMode::Forced).await
    } else {
        repository.ensure_fresh().await
    };

    match outcome {
        RefreshOutcome::Updated(report) => {
            if !report.persisted {
                result = result.with_warning("refreshed rates could not be saved to the store");
            }
            result = result.with_warnings(report.warnings);
        }
        RefreshOutcome::Fresh | RefreshOutcome::AlreadyInFlight => {}
        RefreshOutcome::Exhausted(failure) => {
            result = result.with_warnings(failure.warnings);
            if repository.cache().is_empty() {
                result = result.with_errors(attempt_errors(&failure.errors));
            } else {
                result = result
                    .with_warning("every rate source failed; serving previously stored rates");
            }
        }
    }

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok((repository, result.with_latency(latency_ms)))
}

pub async fn run_rates(args: &RatesArgs, context: &Context) -> Result<CommandResult, CliError> {
    let (repository, mut result) = refreshed(context, args.refresh).await?;

    let snapshot = repository.get_rates();
    let rates = match &args.query {
        Some(query) => repository.search(query),
        None => snapshot.rates.clone(),
    };

    result.data = serde_json::to_value(RatesResponseData {
        source: snapshot.source,
        fetched_at: snapshot.fetched_at,
        serving_stale: repository.status().serving_stale || snapshot.last_updated_ms == 0,
        count: rates.len(),
        rates,
    })?;
    Ok(result)
}

pub async fn run_rate(args: &RateArgs, context: &Context) -> Result<CommandResult, CliError> {
    let preferred = match &args.code {
        Some(code) => Some(CurrencyCode::parse(code)?.as_str().to_owned()),
        None => context
            .prefs
            .exchange_currency()?
            .map(|code| code.as_str().to_owned()),
    };

    let (repository, mut result) = refreshed(context, false).await?;
    let rate = repository.best_rate(preferred.as_deref());

    if let (Some(requested), Some(found)) = (&preferred, &rate) {
        if found.currency_code.as_str() != requested {
            result = result.with_warning(format!(
                "no rate for {requested}; showing default currency {}",
                found.currency_code
            ));
        }
    }

    result.data = serde_json::to_value(RateResponseData {
        requested: preferred,
        rate,
    })?;
    Ok(result)
}

pub fn run_sources(_context: &Context) -> Result<CommandResult, CliError> {
    let sources = SourceId::ALL
        .into_iter()
        .enumerate()
        .map(|(position, id)| SourceInfo {
            id,
            position,
            upstreams: id.upstreams(),
        })
        .collect::<Vec<_>>();
    let source_chain = sources.iter().map(|info| info.id.as_str().to_owned()).collect();

    Ok(CommandResult::ok(serde_json::to_value(SourcesResponseData { sources })?)
        .with_source_chain(source_chain))
}
