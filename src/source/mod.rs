//! Work sources: the contract every backend adapter implements, and the
//! registry that picks one by name.
//!
//! A source is used in a fixed order: [`Configure::configure`] once,
//! [`WorkSource::connect`] once, then any number of
//! fetch → acknowledge | report_failure rounds, and finally
//! [`WorkSource::release`] exactly once.

pub mod directory;
pub mod pgmq;
pub mod postgres;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::model::work::WorkItem;
use async_trait::async_trait;
use std::str::FromStr;

/// Backend adapter capability interface.
#[async_trait]
pub trait WorkSource: Send {
    /// Driver name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Establish client handles. Called once, before the first fetch.
    async fn connect(&mut self) -> Result<()>;

    /// Retrieve at most one item. `Ok(None)` means nothing is pending and is
    /// not an error. Push-style sources may block here until an item arrives.
    async fn fetch(&mut self) -> Result<Option<WorkItem>>;

    /// Mark the item as processed. Called only after a successful execution.
    async fn acknowledge(&mut self, item: &WorkItem) -> Result<()>;

    /// Record that processing failed. Called only after a failed execution.
    /// Errors are logged by the caller and never change the run's outcome.
    async fn report_failure(&mut self, item: &WorkItem) -> Result<()>;

    /// Close connections. Called exactly once, whatever happened before.
    async fn release(&mut self) -> Result<()>;
}

/// Construction from layered settings. Configuration is immutable once built.
pub trait Configure: Sized {
    fn configure(settings: &Settings) -> Result<Self>;
}

/// Documentation for one setting an adapter reads.
#[derive(Debug, Clone, Copy)]
pub struct SettingDoc {
    pub key: &'static str,
    pub required: bool,
    pub help: &'static str,
}

/// Registry of available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    Pgmq,
    Postgres,
    Directory,
}

impl Driver {
    pub const ALL: [Driver; 3] = [Driver::Pgmq, Driver::Postgres, Driver::Directory];

    pub fn name(self) -> &'static str {
        match self {
            Driver::Pgmq => "pgmq",
            Driver::Postgres => "postgres",
            Driver::Directory => "directory",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Driver::Pgmq => "Postgres message queue (pgmq extension)",
            Driver::Postgres => "SQL query against Postgres, templated ack/fail statements",
            Driver::Directory => "Files in a local directory",
        }
    }

    pub fn settings(self) -> &'static [SettingDoc] {
        match self {
            Driver::Pgmq => pgmq::SETTINGS,
            Driver::Postgres => postgres::SETTINGS,
            Driver::Directory => directory::SETTINGS,
        }
    }

    /// Configure the selected adapter. Fails before any connection attempt.
    pub fn build(self, settings: &Settings) -> Result<Box<dyn WorkSource>> {
        Ok(match self {
            Driver::Pgmq => Box::new(pgmq::PgmqSource::configure(settings)?),
            Driver::Postgres => Box::new(postgres::PostgresSource::configure(settings)?),
            Driver::Directory => Box::new(directory::DirectorySource::configure(settings)?),
        })
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Driver::ALL
            .into_iter()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Driver::ALL.iter().map(|d| d.name()).collect();
                Error::Config(format!(
                    "unknown driver {s:?} (available: {})",
                    known.join(", ")
                ))
            })
    }
}
