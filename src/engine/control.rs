//! Lifecycle controller: fetch → execute → acknowledge | report failure.
//!
//! Strictly sequential. One item is in flight at a time, and the only place
//! the controller waits on the outside world without a program running is
//! the source's `fetch`.

use crate::config::Settings;
use crate::engine::exec::Executor;
use crate::error::{Error, Result};
use crate::model::work::{State, WorkItem};
use crate::source::WorkSource;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_iteration_span};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{Instrument, Span, debug, error, info, warn};
use uuid::Uuid;

/// Single iteration or loop forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Daemon,
}

/// Configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub mode: RunMode,
    /// Daemon mode: pause after an empty poll or a fetch error.
    /// Zero polls again immediately.
    pub idle_interval: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Once,
            idle_interval: Duration::from_secs(1),
        }
    }
}

impl ControlConfig {
    /// Read `daemon` and `idle-interval-ms` from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let defaults = Self::default();
        let daemon = settings.switch("daemon", false)?;
        let idle_ms = settings.parse_or("idle-interval-ms", defaults.idle_interval.as_millis() as u64)?;
        Ok(Self {
            mode: if daemon { RunMode::Daemon } else { RunMode::Once },
            idle_interval: Duration::from_millis(idle_ms),
        })
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// Nothing was pending.
    Idle,
    /// Program succeeded; acknowledge was attempted.
    Acknowledged,
    /// Program failed; report-failure was attempted.
    Failed,
}

impl Iteration {
    fn as_str(self) -> &'static str {
        match self {
            Iteration::Idle => "idle",
            Iteration::Acknowledged => "acknowledged",
            Iteration::Failed => "failed",
        }
    }
}

/// Overall result of [`Controller::run`], mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failure => 1,
        }
    }
}

/// Drives one work source through its lifecycle.
pub struct Controller {
    source: Box<dyn WorkSource>,
    executor: Box<dyn Executor>,
    config: ControlConfig,
    shutdown: Arc<Notify>,
    state: State,
}

impl Controller {
    pub fn new(
        source: Box<dyn WorkSource>,
        executor: Box<dyn Executor>,
        config: ControlConfig,
    ) -> Self {
        Self {
            source,
            executor,
            config,
            shutdown: Arc::new(Notify::new()),
            state: State::Init,
        }
    }

    /// Notifying this stops the controller between iterations, or while it
    /// waits in fetch or idles. A fetched item is always carried through to
    /// acknowledge or report-failure first.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Connect, run in the configured mode, and release the source.
    ///
    /// A connection failure is returned as an error (after release). Fetch
    /// errors and failed executions are reflected in the returned status.
    pub async fn run(mut self) -> Result<RunStatus> {
        if let Err(e) = self.connect().await {
            self.release_source().await;
            return Err(e);
        }

        let status = match self.config.mode {
            RunMode::Once => self.single_run().await,
            RunMode::Daemon => self.daemon().await,
        };

        self.release_source().await;
        Ok(status)
    }

    /// Connect the source. Only valid once, from the initial state.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != State::Init {
            return Err(Error::Connection(format!(
                "connect called in state {}",
                self.state
            )));
        }

        let driver = self.source.name();
        match self.source.connect().await {
            Ok(()) => {
                self.state = State::Ready;
                info!(driver, "source connected");
                Ok(())
            }
            Err(e) => {
                self.state = State::Fatal;
                error!(driver, error = %e, "connect failed");
                Err(match e {
                    Error::Connection(_) => e,
                    other => Error::Connection(other.to_string()),
                })
            }
        }
    }

    /// One fetch → execute → ack/fail pass. The source must be connected.
    pub async fn run_once(&mut self) -> Result<Iteration> {
        let span = start_iteration_span(self.source.name(), &Uuid::new_v4());
        let started = Instant::now();

        let iteration = match self.fetch(&span).await? {
            Some(item) => self.process(item, &span).await,
            None => Iteration::Idle,
        };
        self.record_duration(started, iteration.as_str());
        Ok(iteration)
    }

    /// Release the source and consume the controller.
    pub async fn release(mut self) -> Result<()> {
        let result = self.source.release().await;
        self.state = State::Terminal;
        result
    }

    async fn single_run(&mut self) -> RunStatus {
        let span = start_iteration_span(self.source.name(), &Uuid::new_v4());
        let started = Instant::now();

        let iteration = match self.fetch_until_shutdown(&span).await {
            None => {
                info!("shutdown requested before any work was fetched");
                return RunStatus::Success;
            }
            Some(Err(e)) => {
                error!(error = %e, "fetch failed");
                self.record_duration(started, "error");
                return RunStatus::Failure;
            }
            Some(Ok(None)) => {
                info!(driver = self.source.name(), "no work available");
                Iteration::Idle
            }
            Some(Ok(Some(item))) => self.process(item, &span).await,
        };
        self.record_duration(started, iteration.as_str());

        match iteration {
            Iteration::Idle | Iteration::Acknowledged => RunStatus::Success,
            Iteration::Failed => RunStatus::Failure,
        }
    }

    async fn daemon(&mut self) -> RunStatus {
        info!(
            driver = self.source.name(),
            idle_interval_ms = self.config.idle_interval.as_millis() as u64,
            "daemon loop started"
        );
        let shutdown = Arc::clone(&self.shutdown);

        loop {
            let span = start_iteration_span(self.source.name(), &Uuid::new_v4());
            let started = Instant::now();

            let idle = match self.fetch_until_shutdown(&span).await {
                None => break,
                Some(Ok(Some(item))) => {
                    let iteration = self.process(item, &span).await;
                    self.record_duration(started, iteration.as_str());
                    false
                }
                Some(Ok(None)) => {
                    self.record_duration(started, Iteration::Idle.as_str());
                    true
                }
                Some(Err(e)) => {
                    error!(error = %e, "fetch failed, continuing");
                    self.record_duration(started, "error");
                    true
                }
            };

            if idle && !self.config.idle_interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(self.config.idle_interval) => {}
                }
            }
        }

        info!("daemon loop stopped");
        RunStatus::Success
    }

    /// Fetch unless shutdown is signalled first. None means shutdown.
    async fn fetch_until_shutdown(&mut self, span: &Span) -> Option<Result<Option<WorkItem>>> {
        let shutdown = Arc::clone(&self.shutdown);
        tokio::select! {
            biased;
            _ = shutdown.notified() => None,
            fetched = self.fetch(span) => Some(fetched),
        }
    }

    async fn fetch(&mut self, span: &Span) -> Result<Option<WorkItem>> {
        if self.state != State::Ready {
            return Err(Error::Fetch(format!("fetch called in state {}", self.state)));
        }

        let driver = self.source.name();
        let fetched = self.source.fetch().instrument(span.clone()).await;
        let result = match &fetched {
            Ok(Some(_)) => "item",
            Ok(None) => "empty",
            Err(_) => "error",
        };
        metrics::fetches().add(
            1,
            &[
                KeyValue::new("driver", driver),
                KeyValue::new("result", result),
            ],
        );

        match fetched {
            Ok(Some(item)) => {
                span.record("work.key", item.key.as_deref().unwrap_or("-"));
                self.transition(span, State::Executing);
                Ok(Some(item))
            }
            Ok(None) => {
                span.in_scope(|| debug!("no work pending"));
                self.transition(span, State::Ready);
                Ok(None)
            }
            Err(e @ Error::Fetch(_)) => Err(e),
            Err(other) => Err(Error::Fetch(other.to_string())),
        }
    }

    /// Execute the item, then acknowledge or report failure, exactly one of
    /// the two. Errors from either are logged and never change the result.
    async fn process(&mut self, item: WorkItem, span: &Span) -> Iteration {
        let driver = self.source.name();
        let outcome = self.executor.execute(&item).instrument(span.clone()).await;

        let iteration = match outcome {
            Ok(()) => {
                metrics::executions().add(
                    1,
                    &[
                        KeyValue::new("driver", driver),
                        KeyValue::new("result", "success"),
                    ],
                );
                span.in_scope(|| info!(key = ?item.key, "work succeeded"));
                self.transition(span, State::Ack);

                let result = self.source.acknowledge(&item).instrument(span.clone()).await;
                if let Err(ref e) = result {
                    span.in_scope(|| error!(key = ?item.key, error = %e, "acknowledge failed"));
                }
                metrics::acknowledgements().add(
                    1,
                    &[
                        KeyValue::new("driver", driver),
                        KeyValue::new("result", if result.is_ok() { "ok" } else { "error" }),
                    ],
                );
                Iteration::Acknowledged
            }
            Err(failure) => {
                metrics::executions().add(
                    1,
                    &[
                        KeyValue::new("driver", driver),
                        KeyValue::new("result", "failure"),
                    ],
                );
                span.in_scope(|| warn!(key = ?item.key, error = %failure, "work failed"));
                self.transition(span, State::Fail);

                let result = self
                    .source
                    .report_failure(&item)
                    .instrument(span.clone())
                    .await;
                if let Err(ref e) = result {
                    span.in_scope(|| error!(key = ?item.key, error = %e, "report-failure failed"));
                }
                metrics::failure_reports().add(
                    1,
                    &[
                        KeyValue::new("driver", driver),
                        KeyValue::new("result", if result.is_ok() { "ok" } else { "error" }),
                    ],
                );
                Iteration::Failed
            }
        };

        self.transition(span, State::Ready);
        iteration
    }

    async fn release_source(&mut self) {
        if let Err(e) = self.source.release().await {
            warn!(driver = self.source.name(), error = %e, "release failed");
        }
        self.state = State::Terminal;
        debug!("source released");
    }

    fn transition(&mut self, span: &Span, to: State) {
        record_state_transition(span, self.state, to);
        self.state = to;
    }

    fn record_duration(&self, started: Instant, outcome: &'static str) {
        metrics::iteration_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[
                KeyValue::new("driver", self.source.name()),
                KeyValue::new("outcome", outcome),
            ],
        );
    }
}
