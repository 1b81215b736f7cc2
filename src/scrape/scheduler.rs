//! Race/waterfall execution of a fallback list.
//!
//! The first engine starts right away. Each time an engine has run past its
//! reasonable time (plus the configured buffer) without finishing, the next
//! one is started alongside it. The first attempt to produce an accepted
//! result wins; every other attempt is cancelled and awaited before the
//! scheduler returns, so no attempt outlives the run that launched it.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::abort::{AbortError, AbortManager, AbortReason, AbortTier};
use crate::config::ScrapeConfig;
use crate::engines::{Engine, EngineContext, EngineError, EngineResult, PdfPrefetch};
use crate::features::FeatureSet;
use crate::observability::Metrics;

use super::error::{AttemptOutcome, EngineFailure, ScrapeError};
use super::evaluator::{SuccessEvaluator, Verdict};
use super::fallback::FallbackEntry;
use super::meta::ScrapeMeta;

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Extra slack added to every engine's reasonable time
    pub waterfall_buffer: Duration,
    /// Hard limit for a single attempt
    pub engine_timeout: Option<Duration>,
}

impl From<&ScrapeConfig> for SchedulerConfig {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            waterfall_buffer: config.waterfall_buffer.as_duration(),
            engine_timeout: config.engine_timeout.map(|t| t.as_duration()),
        }
    }
}

/// Accepted result together with the engine that produced it
#[derive(Debug)]
pub struct EngineWin {
    pub engine: String,
    pub unsupported_features: FeatureSet,
    pub result: EngineResult,
}

/// Why a scheduler run ended without a winner
#[derive(Debug)]
pub enum SchedulerError {
    Fatal(ScrapeError),
    AddFeature {
        flags: FeatureSet,
        pdf_prefetch: Option<PdfPrefetch>,
    },
    RemoveFeature {
        flags: FeatureSet,
    },
}

struct LaunchedAttempt {
    engine: String,
    unsupported_features: FeatureSet,
    abort: AbortManager,
}

type AttemptSet = JoinSet<Result<EngineResult, EngineError>>;

/// Attempts launched so far, addressable by launch order and by task id
#[derive(Default)]
struct Launched {
    attempts: Vec<LaunchedAttempt>,
    by_task: HashMap<task::Id, usize>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    evaluator: Arc<SuccessEvaluator>,
    metrics: Arc<Metrics>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        evaluator: Arc<SuccessEvaluator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            evaluator,
            metrics,
        }
    }

    /// Run the fallback list until one attempt wins or nothing is left.
    pub async fn run(
        &self,
        meta: &ScrapeMeta,
        fallback: Vec<FallbackEntry>,
    ) -> Result<EngineWin, SchedulerError> {
        if fallback.is_empty() {
            return Err(SchedulerError::Fatal(ScrapeError::NoEnginesLeft {
                failures: Vec::new(),
            }));
        }

        let snipe = CancellationToken::new();
        let mut attempts = AttemptSet::new();

        let outcome = self.race(meta, fallback, &snipe, &mut attempts).await;

        snipe.cancel();
        let still_running = attempts.len() as u64;
        attempts.abort_all();
        while attempts.join_next().await.is_some() {}
        self.metrics.attempts_sniped(still_running);

        outcome
    }

    async fn race(
        &self,
        meta: &ScrapeMeta,
        fallback: Vec<FallbackEntry>,
        snipe: &CancellationToken,
        attempts: &mut AttemptSet,
    ) -> Result<EngineWin, SchedulerError> {
        let mut remaining: VecDeque<FallbackEntry> = fallback.into();
        let mut launched = Launched::default();
        let mut failures: Vec<EngineFailure> = Vec::new();
        let mut waterfall: Option<Pin<Box<Sleep>>> = None;

        loop {
            if attempts.is_empty() {
                match remaining.pop_front() {
                    Some(entry) => {
                        waterfall = Some(self.launch(meta, entry, snipe, attempts, &mut launched));
                        continue;
                    }
                    None => {
                        return Err(SchedulerError::Fatal(ScrapeError::NoEnginesLeft {
                            failures,
                        }));
                    }
                }
            }

            tokio::select! {
                biased;

                error = meta.abort.aborted() => {
                    debug!(tier = %error.tier, "Scrape aborted while engines were running");
                    return Err(SchedulerError::Fatal(meta.abort_error(error)));
                }

                joined = attempts.join_next_with_id() => {
                    let Some(joined) = joined else { continue };
                    let (id, outcome) = match joined {
                        Ok(finished) => finished,
                        Err(e) => {
                            let engine = launched
                                .by_task
                                .get(&e.id())
                                .map(|&index| launched.attempts[index].engine.clone())
                                .unwrap_or_else(|| "unknown".to_string());
                            warn!(engine = %engine, error = %e, "Engine attempt task failed");
                            failures.push(EngineFailure {
                                engine,
                                error: e.to_string(),
                            });
                            continue;
                        }
                    };

                    let Some(&index) = launched.by_task.get(&id) else { continue };
                    let attempt = &launched.attempts[index];
                    attempt.abort.cancel();

                    match AttemptOutcome::classify(outcome, meta) {
                        AttemptOutcome::Success(result) => {
                            info!(
                                engine = %attempt.engine,
                                status_code = result.status_code,
                                "Engine attempt won"
                            );
                            return Ok(EngineWin {
                                engine: attempt.engine.clone(),
                                unsupported_features: attempt.unsupported_features.clone(),
                                result,
                            });
                        }
                        AttemptOutcome::EngineExhausted(error) => {
                            info!(engine = %attempt.engine, error = %error, "Engine attempt failed, moving on");
                            failures.push(EngineFailure {
                                engine: attempt.engine.clone(),
                                error: error.to_string(),
                            });
                        }
                        AttemptOutcome::Fatal(error) => {
                            warn!(engine = %attempt.engine, error = %error, "Engine attempt failed fatally");
                            return Err(SchedulerError::Fatal(error));
                        }
                        AttemptOutcome::FeatureAdd { flags, pdf_prefetch } => {
                            debug!(engine = %attempt.engine, flags = %flags, "Engine requested additional features");
                            return Err(SchedulerError::AddFeature { flags, pdf_prefetch });
                        }
                        AttemptOutcome::FeatureRemove { flags } => {
                            debug!(engine = %attempt.engine, flags = %flags, "Engine requested feature removal");
                            return Err(SchedulerError::RemoveFeature { flags });
                        }
                    }
                }

                _ = waterfall_elapsed(&mut waterfall), if waterfall.is_some() && !remaining.is_empty() => {
                    // the abort branch reports it on the next turn
                    if meta.abort.is_aborted() {
                        continue;
                    }
                    if let Some(entry) = remaining.pop_front() {
                        debug!(engine = %entry.name(), "Waterfall delay elapsed, starting next engine");
                        waterfall = Some(self.launch(meta, entry, snipe, attempts, &mut launched));
                    }
                }
            }
        }
    }

    /// Start one attempt and return the timer for the next waterfall step.
    fn launch(
        &self,
        meta: &ScrapeMeta,
        entry: FallbackEntry,
        snipe: &CancellationToken,
        attempts: &mut AttemptSet,
        launched: &mut Launched,
    ) -> Pin<Box<Sleep>> {
        let index = launched.attempts.len();
        let name = entry.engine.spec.name.clone();
        let abort = meta.abort.child(AbortTier::Engine, self.config.engine_timeout);
        let ctx = meta.engine_context(abort.clone());
        let delay = self.waterfall_delay(&entry, &ctx);

        self.metrics.engine_attempt();
        debug!(
            engine = %name,
            index,
            unsupported = %entry.unsupported_features,
            waterfall_ms = delay.as_millis() as u64,
            "Launching engine attempt"
        );

        let engine = Arc::clone(&entry.engine.engine);
        let evaluator = Arc::clone(&self.evaluator);
        let snipe = snipe.clone();
        let task_name = name.clone();
        let handle = attempts.spawn(async move {
            tokio::select! {
                biased;
                _ = snipe.cancelled() => Err(EngineError::Aborted(AbortError {
                    tier: AbortTier::Engine,
                    reason: AbortReason::Cancelled,
                })),
                error = ctx.abort.aborted() => Err(EngineError::Aborted(error)),
                result = run_attempt(engine.as_ref(), &evaluator, &ctx, &task_name) => result,
            }
        });

        launched.by_task.insert(handle.id(), index);
        launched.attempts.push(LaunchedAttempt {
            engine: name,
            unsupported_features: entry.unsupported_features,
            abort,
        });

        Box::pin(tokio::time::sleep(delay))
    }

    fn waterfall_delay(&self, entry: &FallbackEntry, ctx: &EngineContext) -> Duration {
        let estimate_ms = entry
            .engine
            .engine
            .max_reasonable_time(ctx)
            .unwrap_or_else(|| entry.engine.spec.estimate_max_reasonable_time_ms(&ctx.options));
        let delay_ms = estimate_ms + self.config.waterfall_buffer.as_millis() as f64;

        if !delay_ms.is_finite() || delay_ms <= 0.0 {
            warn!(
                engine = %entry.name(),
                delay_ms,
                "Engine reported an unusable reasonable time, next engine starts immediately"
            );
            return Duration::ZERO;
        }

        // float to int casts saturate
        Duration::from_micros((delay_ms * 1000.0).round() as u64)
    }
}

async fn waterfall_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Scrape with one engine and judge the result inside the attempt.
async fn run_attempt(
    engine: &dyn Engine,
    evaluator: &SuccessEvaluator,
    ctx: &EngineContext,
    name: &str,
) -> Result<EngineResult, EngineError> {
    ctx.abort.throw_if_aborted()?;
    let result = engine.scrape(ctx).await?;

    match evaluator.evaluate(ctx, &result).await {
        Verdict::Accept { reason } => {
            debug!(engine = %name, %reason, "Result accepted");
            Ok(result)
        }
        Verdict::Reject { reason } => Err(EngineError::Unsuccessful {
            engine: name.to_string(),
            reason,
        }),
        Verdict::AddFeature(flags) => Err(EngineError::add_feature(flags)),
    }
}
