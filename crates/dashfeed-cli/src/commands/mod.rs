mod balance;
mod prefs;
mod rates;
mod uphold;

use std::sync::Arc;

use dashfeed_core::{
    AppConfig, AttemptError, Envelope, EnvelopeError, HttpClient, NetworkFlavor, Preferences,
    ReqwestHttpClient,
};
use dashfeed_store::Store;
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub source_chain: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            source_chain: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_source_chain(mut self, source_chain: Vec<String>) -> Self {
        self.source_chain = source_chain;
        self
    }
}

/// Everything a command needs, resolved once per invocation.
pub struct Context {
    pub config: AppConfig,
    pub store: Store,
    pub prefs: Preferences,
    pub http: Arc<dyn HttpClient>,
    pub offline: bool,
}

impl Context {
    pub fn load(cli: &Cli) -> Result<Self, CliError> {
        let mut config = AppConfig::from_env()?;
        if let Some(network) = &cli.network {
            config = config.with_network(network.parse::<NetworkFlavor>()?);
        }

        let store = Store::open(config.store_config())?;
        debug!(db = %store.db_path().display(), network = %config.network, "context ready");

        Ok(Self {
            prefs: Preferences::new(Arc::new(store.clone())),
            store,
            http: Arc::new(ReqwestHttpClient::new()),
            offline: cli.offline,
            config,
        })
    }

    /// Fail commands that cannot work from cached data.
    pub fn require_online(&self, what: &str) -> Result<(), CliError> {
        if self.offline {
            return Err(CliError::Command(format!("{what} needs network access; drop --offline")));
        }
        Ok(())
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let context = Context::load(cli)?;

    let command_result = match &cli.command {
        Command::Rates(args) => rates::run_rates(args, &context).await?,
        Command::Rate(args) => rates::run_rate(args, &context).await?,
        Command::Sources => rates::run_sources(&context)?,
        Command::Balance(args) => balance::run(args, &context).await?,
        Command::Uphold(args) => uphold::run(args, &context).await?,
        Command::Prefs(args) => prefs::run(args, &context)?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        source_chain,
    } = command_result;

    let mut metadata = Metadata::new(context.config.network.to_string(), source_chain, latency_ms);
    if context.offline {
        metadata.push_warning("offline mode: no upstream was contacted");
    }
    for warning in warnings {
        metadata.push_warning(warning);
    }

    Envelope::with_errors(metadata.into_envelope_meta()?, data, errors).map_err(CliError::from)
}

pub(crate) fn attempt_errors(errors: &[AttemptError]) -> Vec<EnvelopeError> {
    errors
        .iter()
        .map(|attempt| EnvelopeError {
            code: attempt.code.clone(),
            message: attempt.message.clone(),
            retryable: Some(attempt.retryable),
            source: Some(attempt.member.clone()),
        })
        .collect()
}
