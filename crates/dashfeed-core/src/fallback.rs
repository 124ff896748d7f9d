//! Ordered fallback chain with an index cursor.
//!
//! Members are tried front to back. A failed member is skipped for the rest
//! of the cycle only; every cycle, including the one after an exhausted
//! cycle, starts again from the canonical first member.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::rate_source::{RateSource, SourceError};

pub type InvokeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Anything that can sit in a chain needs a stable display name.
pub trait ChainMember: Send + Sync {
    fn member_name(&self) -> String;
}

impl ChainMember for dyn RateSource {
    fn member_name(&self) -> String {
        self.id().as_str().to_owned()
    }
}

/// Cursor position of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ChainState {
    Ready,
    Attempting { index: usize },
    Exhausted,
}

/// One failed attempt within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptError {
    pub member: String,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl AttemptError {
    pub fn from_source(member: impl Into<String>, error: &SourceError) -> Self {
        Self {
            member: member.into(),
            code: error.code().to_owned(),
            message: error.message().to_owned(),
            retryable: error.retryable(),
        }
    }
}

/// Successful cycle.
#[derive(Debug, Clone)]
pub struct ChainSuccess<T> {
    pub data: T,
    pub selected: String,
    pub selected_index: usize,
    pub source_chain: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<AttemptError>,
    pub latency_ms: u64,
}

/// Cycle that ran out of members.
#[derive(Debug, Clone)]
pub struct ChainFailure {
    pub source_chain: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<AttemptError>,
    pub latency_ms: u64,
}

impl ChainFailure {
    /// The last attempt's error, which is what callers usually surface.
    pub fn last_error(&self) -> Option<&AttemptError> {
        self.errors.last()
    }
}

pub type ChainResult<T> = Result<ChainSuccess<T>, ChainFailure>;

pub struct FallbackChain<S: ?Sized> {
    members: Vec<Arc<S>>,
    cursor: usize,
    state: ChainState,
}

impl<S> FallbackChain<S>
where
    S: ChainMember + ?Sized,
{
    pub fn new(members: Vec<Arc<S>>) -> Self {
        Self {
            members,
            cursor: 0,
            state: ChainState::Ready,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn canonical_order(&self) -> Vec<String> {
        self.members.iter().map(|member| member.member_name()).collect()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.state = ChainState::Ready;
    }

    /// Run one cycle, returning the first member result that succeeds.
    pub async fn run_cycle<T, F>(&mut self, mut invoke: F) -> ChainResult<T>
    where
        F: for<'a> FnMut(&'a S) -> InvokeFuture<'a, T>,
    {
        let started = Instant::now();
        self.reset();

        let mut source_chain = Vec::with_capacity(self.members.len());
        let mut errors = Vec::new();

        while self.cursor < self.members.len() {
            let index = self.cursor;
            let member = Arc::clone(&self.members[index]);
            let name = member.member_name();
            self.state = ChainState::Attempting { index };
            source_chain.push(name.clone());
            debug!(member = %name, index, "attempting chain member");

            match invoke(member.as_ref()).await {
                Ok(data) => {
                    let mut warnings = Vec::new();
                    if !errors.is_empty() {
                        warnings.push(format!(
                            "fallback succeeded with '{}' after {} failed attempt(s)",
                            name,
                            errors.len()
                        ));
                    }

                    let latency_ms = elapsed_ms(started);
                    info!(member = %name, attempts = index + 1, latency_ms, "chain member succeeded");
                    self.reset();

                    return Ok(ChainSuccess {
                        data,
                        selected: name,
                        selected_index: index,
                        source_chain,
                        warnings,
                        errors,
                        latency_ms,
                    });
                }
                Err(failure) => {
                    warn!(member = %name, code = failure.code(), retryable = failure.retryable(), "chain member failed: {}", failure.message());
                    errors.push(AttemptError::from_source(name, &failure));
                    self.cursor += 1;
                }
            }
        }

        self.state = ChainState::Exhausted;

        if errors.is_empty() {
            errors.push(AttemptError {
                member: String::new(),
                code: String::from("chain.no_candidate"),
                message: String::from("fallback chain has no members"),
                retryable: false,
            });
        }

        let latency_ms = elapsed_ms(started);
        error!(attempts = source_chain.len(), latency_ms, "fallback chain exhausted");

        Err(ChainFailure {
            source_chain,
            warnings: vec![String::from("all fallback members failed")],
            errors,
            latency_ms,
        })
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
