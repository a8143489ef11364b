//! pgmq source: one message per fetch, acknowledged by message id.
//!
//! A read hides the message for the visibility timeout. If the item is never
//! acknowledged (crash, or `on-failure=leave`), pgmq makes it visible again
//! once the timeout expires.

use super::{Configure, SettingDoc, WorkSource};
use crate::config::Settings;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::work::WorkItem;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use tracing::{debug, warn};

pub const SETTINGS: &[SettingDoc] = &[
    SettingDoc {
        key: "database-url",
        required: true,
        help: "Postgres connection URL",
    },
    SettingDoc {
        key: "queue",
        required: true,
        help: "pgmq queue name",
    },
    SettingDoc {
        key: "visibility-timeout",
        required: false,
        help: "seconds a read message stays hidden (default 30)",
    },
    SettingDoc {
        key: "on-success",
        required: false,
        help: "archive | delete (default archive)",
    },
    SettingDoc {
        key: "on-failure",
        required: false,
        help: "leave | archive | delete (default leave)",
    },
];

/// What to do with a message once its outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave it; the visibility timeout returns it to the queue.
    Leave,
    Archive,
    Delete,
}

impl FromStr for Disposition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leave" => Ok(Disposition::Leave),
            "archive" => Ok(Disposition::Archive),
            "delete" => Ok(Disposition::Delete),
            other => Err(format!("expected leave, archive or delete, got {other:?}")),
        }
    }
}

#[derive(Debug)]
pub struct PgmqConfig {
    pub database_url: SecretString,
    pub queue: String,
    pub visibility_timeout: i32,
    pub on_success: Disposition,
    pub on_failure: Disposition,
}

pub struct PgmqSource {
    config: PgmqConfig,
    db: Option<Db>,
}

impl PgmqSource {
    pub fn new(config: PgmqConfig) -> Self {
        Self { config, db: None }
    }

    fn db(&self) -> Result<&Db> {
        self.db
            .as_ref()
            .ok_or_else(|| Error::Other("pgmq source used before connect".to_string()))
    }

    async fn dispose(&self, item: &WorkItem, disposition: Disposition) -> Result<bool> {
        let msg_id = message_id(item)?;
        let queue = &self.config.queue;
        match disposition {
            Disposition::Leave => Ok(true),
            Disposition::Archive => self.db()?.archive_message(queue, msg_id).await,
            Disposition::Delete => self.db()?.delete_message(queue, msg_id).await,
        }
    }
}

impl Configure for PgmqSource {
    fn configure(settings: &Settings) -> Result<Self> {
        let on_success = settings.parse_or("on-success", Disposition::Archive)?;
        if on_success == Disposition::Leave {
            return Err(Error::Config(
                "on-success=leave would redeliver every processed message".to_string(),
            ));
        }
        Ok(Self::new(PgmqConfig {
            database_url: settings.secret("database-url")?,
            queue: settings.required("queue")?,
            visibility_timeout: settings.parse_or("visibility-timeout", 30)?,
            on_success,
            on_failure: settings.parse_or("on-failure", Disposition::Leave)?,
        }))
    }
}

#[async_trait]
impl WorkSource for PgmqSource {
    fn name(&self) -> &'static str {
        "pgmq"
    }

    async fn connect(&mut self) -> Result<()> {
        let db = Db::connect(self.config.database_url.expose_secret()).await?;
        db.health_check()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        self.db = Some(db);
        Ok(())
    }

    async fn fetch(&mut self) -> Result<Option<WorkItem>> {
        let msg = self
            .db()?
            .read_from_queue(&self.config.queue, self.config.visibility_timeout)
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        Ok(msg.map(|msg| {
            debug!(msg_id = msg.msg_id, read_ct = msg.read_ct, "pgmq message read");
            let item = WorkItem::from_payload(msg.message.to_string()).with_key(msg.msg_id.to_string());
            match msg.message {
                serde_json::Value::Object(record) => item.with_record(record),
                _ => item,
            }
        }))
    }

    async fn acknowledge(&mut self, item: &WorkItem) -> Result<()> {
        let found = self
            .dispose(item, self.config.on_success)
            .await
            .map_err(|e| Error::Acknowledge(e.to_string()))?;
        if !found {
            warn!(key = ?item.key, "message already gone when acknowledging");
        }
        Ok(())
    }

    async fn report_failure(&mut self, item: &WorkItem) -> Result<()> {
        if self.config.on_failure == Disposition::Leave {
            debug!(key = ?item.key, "leaving failed message for redelivery");
            return Ok(());
        }
        let found = self
            .dispose(item, self.config.on_failure)
            .await
            .map_err(|e| Error::ReportFailure(e.to_string()))?;
        if !found {
            warn!(key = ?item.key, "message already gone when reporting failure");
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(db) = self.db.take() {
            db.close().await;
        }
        Ok(())
    }
}

fn message_id(item: &WorkItem) -> Result<i64> {
    item.key
        .as_deref()
        .and_then(|k| k.parse().ok())
        .ok_or_else(|| Error::Other(format!("work item has no pgmq message id: {:?}", item.key)))
}
