//! CLI argument definitions for dashfeed.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rates` | Cached Dash exchange rates, refreshed through the source chain |
//! | `rate` | Best rate for the preferred or default currency |
//! | `sources` | Rate sources in fallback order |
//! | `balance` | Unspent outputs and balance for an address |
//! | `uphold` | Uphold login, balance and withdrawals |
//! | `prefs` | Stored preferences |
//!
//! # Examples
//!
//! ```bash
//! dashfeed rates --query eu --pretty
//! dashfeed rate EUR
//! dashfeed --network testnet balance yQ8Tb...
//! dashfeed uphold commit 5f1e... --otp 123456
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Dash exchange rates, wallet balances and Uphold from the terminal.
#[derive(Debug, Parser)]
#[command(name = "dashfeed", author, version, about)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Network: mainnet, testnet or devnet-<name>. Overrides DASHFEED_NETWORK.
    #[arg(long, global = true)]
    pub network: Option<String>,

    /// Serve cached data only; never touch the network.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List exchange rates, refreshing them when stale.
    Rates(RatesArgs),

    /// Best rate for CODE, the preferred currency or the default currency.
    Rate(RateArgs),

    /// Rate sources in fallback order.
    Sources,

    /// Balance of an address from Electrum or block explorers.
    Balance(BalanceArgs),

    /// Uphold account operations.
    Uphold(UpholdArgs),

    /// Stored preferences.
    Prefs(PrefsArgs),
}

#[derive(Debug, Args)]
pub struct RatesArgs {
    /// Refresh even inside the freshness window.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Only codes containing this text.
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(Debug, Args)]
pub struct RateArgs {
    /// Currency code; defaults to the `exchange_currency` preference.
    pub code: Option<String>,
}

#[derive(Debug, Args)]
pub struct BalanceArgs {
    /// Dash address.
    pub address: String,

    /// Electrum server list, one `type:host[:port[:fingerprint]]` per line.
    #[arg(long)]
    pub servers: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct UpholdArgs {
    #[command(subcommand)]
    pub command: UpholdCommand,
}

#[derive(Debug, Subcommand)]
pub enum UpholdCommand {
    /// Exchange an OAuth authorization code for an access token.
    Login { code: String },
    /// Revoke and forget the access token.
    Logout,
    /// Available Dash on the Uphold card.
    Balance,
    /// Create a withdrawal to a Dash address.
    Withdraw {
        amount: String,
        address: String,
        #[arg(long)]
        otp: Option<String>,
    },
    /// Commit a created withdrawal.
    Commit {
        transaction: String,
        #[arg(long)]
        otp: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub command: PrefsCommand,
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    List,
    Get { key: String },
    Set { key: String, value: String },
    Unset { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "dashfeed", "rates", "--query", "eu", "--offline", "--format", "table", "-vv",
        ])
        .expect("parses");

        assert!(cli.offline);
        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Rates(RatesArgs { query: Some(ref q), refresh: false }) if q == "eu"
        ));
    }

    #[test]
    fn parses_uphold_commit_with_otp() {
        let cli = Cli::try_parse_from(["dashfeed", "uphold", "commit", "tx-1", "--otp", "000111"])
            .expect("parses");
        let Command::Uphold(UpholdArgs {
            command: UpholdCommand::Commit { transaction, otp },
        }) = cli.command
        else {
            panic!("expected uphold commit");
        };
        assert_eq!(transaction, "tx-1");
        assert_eq!(otp.as_deref(), Some("000111"));
    }
}
