//! Failover call engine.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::config::{CallConfig, CallMethod};
use crate::descriptor::{Descriptor, Target};
use crate::error::{CallError, FailureKind};
use crate::transport::{CallRequest, RawResponse, Transport, TransportError};

/// A successful call.
#[derive(Debug, Clone)]
pub struct CallResult {
    /// The target that answered.
    pub target: Target,
    /// Duration of the whole call, from the first attempt to the answer.
    pub duration: Duration,
    /// Duration of the successful attempt alone.
    pub attempt_duration: Duration,
    /// Number of targets tried, including the successful one.
    pub attempts: usize,
    /// Method the call was made with.
    pub method: CallMethod,
    /// The raw response, for the payload decoder.
    pub response: RawResponse,
    /// Failures of the targets tried before the successful one.
    pub prior_failures: Option<CallError>,
}

impl CallResult {
    /// True when an earlier attempt may have been processed and the method is
    /// not idempotent, so the operation may have happened more than once.
    pub fn ambiguous(&self) -> bool {
        !self.method.is_idempotent()
            && self
                .prior_failures
                .as_ref()
                .is_some_and(CallError::any_possibly_processed)
    }
}

/// Walks a descriptor tree, trying one target at a time until one succeeds.
///
/// Attempt order is depth-first and left-to-right; random groups are permuted
/// once per call. Every failure is recorded, and no target is tried twice
/// within a call.
pub struct FailoverEngine<T> {
    transport: T,
}

impl<T: Transport> FailoverEngine<T> {
    /// Create an engine over a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Perform one logical call.
    ///
    /// Returns the first success, or the chain of every failed attempt with
    /// the first attempted target at its head.
    pub async fn call(
        &self,
        descriptor: &Descriptor,
        config: Arc<CallConfig>,
        request: Arc<CallRequest>,
    ) -> Result<CallResult, CallError> {
        let plan = {
            let mut rng = rand::rng();
            descriptor.plan(&mut rng)
        };

        let span = tracing::debug_span!(
            "call",
            id = %Uuid::new_v4(),
            method = %config.method(),
            targets = plan.len()
        );

        self.run_plan(&plan, &config, &request).instrument(span).await
    }

    async fn run_plan(
        &self,
        plan: &[&Target],
        config: &CallConfig,
        request: &Arc<CallRequest>,
    ) -> Result<CallResult, CallError> {
        let mut failures: Vec<CallError> = Vec::new();
        let call_started = Instant::now();

        for (index, target) in plan.iter().enumerate() {
            let attempt = config.merged_for(target);
            debug!(attempt = index + 1, endpoint = %target, "Attempting call");

            let started = Instant::now();
            let outcome = self.transport.perform(target, &attempt, request).await;
            let elapsed = started.elapsed();

            let failure = match outcome {
                Ok(response) if config.accepts(response.status) => {
                    if failures.is_empty() {
                        debug!(endpoint = %target, elapsed_ms = elapsed.as_millis() as u64, "Call succeeded");
                    } else {
                        info!(
                            endpoint = %target,
                            attempts = index + 1,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Call succeeded after failover"
                        );
                    }
                    return Ok(CallResult {
                        target: (*target).clone(),
                        duration: call_started.elapsed(),
                        attempt_duration: elapsed,
                        attempts: index + 1,
                        method: config.method(),
                        response,
                        prior_failures: CallError::chain(failures),
                    });
                }
                Ok(response) => {
                    let range = config.accept_status();
                    TransportError::status(
                        response.status,
                        format!(
                            "expected status in {}..={}",
                            range.start(),
                            range.end()
                        ),
                    )
                }
                Err(err) => err,
            };

            // Schemes are checked when the descriptor is built, so a transport
            // refusing one mid-call is an ordinary attempt failure.
            let kind = match failure.kind() {
                FailureKind::UnsupportedProtocol => FailureKind::Other,
                kind => kind,
            };
            let record = CallError::new(
                (*target).clone(),
                Arc::clone(request),
                if failure.is_untimed() { None } else { Some(elapsed) },
                kind,
                failure.possibly_processed(),
                failure.message(),
            );
            warn!(
                attempt = index + 1,
                endpoint = %target,
                kind = %record.kind(),
                possibly_processed = record.possibly_processed(),
                elapsed_ms = record.duration_ms(),
                "Call attempt failed"
            );

            let unsafe_to_continue =
                record.possibly_processed() && !config.method().is_idempotent();
            failures.push(record);

            if unsafe_to_continue {
                if config.abort_on_possibly_processed() {
                    warn!(
                        endpoint = %target,
                        method = %config.method(),
                        "Stopping failover: non-idempotent request may already have been processed"
                    );
                    break;
                }
                warn!(
                    endpoint = %target,
                    method = %config.method(),
                    "Continuing failover although a non-idempotent request may already have been processed"
                );
            }
        }

        let Some(chain) = CallError::chain(failures) else {
            unreachable!("a descriptor always plans at least one target");
        };
        warn!(attempts = chain.len(), "All call attempts failed");
        Err(chain)
    }
}
