use std::sync::Arc;
use std::time::Instant;

use dashfeed_core::{parse_decimal, UpholdClient};
use serde_json::json;
use tracing::info;

use crate::cli::{UpholdArgs, UpholdCommand};
use crate::error::CliError;

use super::{CommandResult, Context};

fn client(context: &Context) -> Result<UpholdClient, CliError> {
    let config = context.config.uphold().ok_or_else(|| {
        CliError::Command(String::from(
            "uphold is not configured; set DASHFEED_UPHOLD_CLIENT_ID and DASHFEED_UPHOLD_CLIENT_SECRET",
        ))
    })?;
    Ok(UpholdClient::new(
        config,
        Arc::clone(&context.http),
        context.prefs.clone(),
    ))
}

pub async fn run(args: &UpholdArgs, context: &Context) -> Result<CommandResult, CliError> {
    context.require_online("uphold")?;
    let uphold = client(context)?;
    let started = Instant::now();

    let data = match &args.command {
        UpholdCommand::Login { code } => {
            let card = uphold.authorize(code).await?;
            info!(card = %card.id, "logged in to uphold");
            json!({ "authenticated": true, "card": card })
        }
        UpholdCommand::Logout => {
            uphold.revoke().await?;
            json!({ "authenticated": false })
        }
        UpholdCommand::Balance => {
            let available = uphold.dash_balance().await?;
            json!({ "currency": "DASH", "available": available.to_string() })
        }
        UpholdCommand::Withdraw { amount, address, otp } => {
            let amount = parse_decimal(amount)?;
            uphold.set_otp_token(otp.clone()).await;
            let transaction = uphold.create_withdrawal(amount, address).await?;
            json!({ "transaction": transaction, "committed": false })
        }
        UpholdCommand::Commit { transaction, otp } => {
            uphold.set_otp_token(otp.clone()).await;
            let transaction = uphold.commit_transaction(transaction).await?;
            json!({ "transaction": transaction, "committed": true })
        }
    };

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(CommandResult::ok(data)
        .with_source_chain(vec![String::from("uphold")])
        .with_latency(latency_ms))
}
