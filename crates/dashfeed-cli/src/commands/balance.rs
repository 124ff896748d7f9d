use std::fs;
use std::sync::Arc;
use std::time::Instant;

use dashfeed_core::balance::electrum::parse_server_list;
use dashfeed_core::balance::explorer::explorers_for;
use dashfeed_core::{AddressBalance, BalanceError, BalanceService, ElectrumClient, EnvelopeError};
use serde::Serialize;

use crate::cli::BalanceArgs;
use crate::error::CliError;

use super::{attempt_errors, CommandResult, Context};

#[derive(Debug, Serialize)]
struct BalanceResponseData {
    #[serde(flatten)]
    balance: AddressBalance,
    utxo_count: usize,
}

pub async fn run(args: &BalanceArgs, context: &Context) -> Result<CommandResult, CliError> {
    context.require_online("balance lookup")?;
    let started = Instant::now();
    let config = &context.config;

    let servers = match &args.servers {
        Some(path) => parse_server_list(&fs::read_to_string(path)?, &config.network)?,
        None => config.electrum_servers()?,
    };
    let explorers = explorers_for(
        &config.network,
        Arc::clone(&context.http),
        config.cryptoid_key.clone(),
        config.http_timeout_ms,
    );

    let mut source_chain = Vec::with_capacity(explorers.len() + 1);
    if !servers.is_empty() {
        source_chain.push(String::from("electrum"));
    }
    source_chain.extend(explorers.iter().map(|explorer| explorer.api().as_str().to_owned()));

    let service = BalanceService::new(
        config.network.clone(),
        servers,
        ElectrumClient::new(config.electrum_timeout),
        explorers,
    );

    let result = service.request_balance(&args.address).await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(balance) => {
            let warnings = balance.warnings.clone();
            let data = serde_json::to_value(BalanceResponseData {
                utxo_count: balance.utxos.len(),
                balance,
            })?;
            Ok(CommandResult::ok(data)
                .with_warnings(warnings)
                .with_source_chain(source_chain)
                .with_latency(latency_ms))
        }
        Err(BalanceError::Exhausted { electrum, failure }) => {
            let mut errors = Vec::new();
            if let Some(error) = &electrum {
                errors.push(EnvelopeError::from_source("electrum", error));
            }
            errors.extend(attempt_errors(&failure.errors));
            Ok(CommandResult::ok(serde_json::Value::Null)
                .with_warnings(failure.warnings)
                .with_warning("cannot connect to any block explorer for unspent outputs")
                .with_errors(errors)
                .with_source_chain(source_chain)
                .with_latency(latency_ms))
        }
        Err(other) => Err(other.into()),
    }
}
