//! SQL source: fetch a row with a query, then run templated acknowledge and
//! failure statements against it.
//!
//! ```text
//! -o fetch-query="UPDATE jobs SET state='running' WHERE id = (
//!       SELECT id FROM jobs WHERE state='pending' ORDER BY id
//!       LIMIT 1 FOR UPDATE SKIP LOCKED) RETURNING id, body"
//! -o ack-query="DELETE FROM jobs WHERE id = {{id}}"
//! -o fail-query="UPDATE jobs SET state='failed' WHERE id = $1"
//! -o fail-params='["{{id}}"]'
//! ```
//!
//! A statement with a parameter list is sent as written and its parameters
//! are bound from the row. A statement without one has its placeholders
//! substituted into the text.

use super::{Configure, SettingDoc, WorkSource};
use crate::config::Settings;
use crate::db::Db;
use crate::db::row::row_to_record;
use crate::error::{Error, Result};
use crate::model::work::WorkItem;
use crate::template::{Param, Template, lookup, stringify};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use tracing::debug;

pub const SETTINGS: &[SettingDoc] = &[
    SettingDoc {
        key: "database-url",
        required: true,
        help: "Postgres connection URL",
    },
    SettingDoc {
        key: "fetch-query",
        required: true,
        help: "query returning the next row of work; only the first row is used",
    },
    SettingDoc {
        key: "fetch-params",
        required: false,
        help: "parameters for fetch-query (JSON array or comma-separated)",
    },
    SettingDoc {
        key: "ack-query",
        required: false,
        help: "statement run after success; {{column}} and {{payload}} placeholders",
    },
    SettingDoc {
        key: "ack-params",
        required: false,
        help: "parameters for ack-query",
    },
    SettingDoc {
        key: "fail-query",
        required: false,
        help: "statement run after failure",
    },
    SettingDoc {
        key: "fail-params",
        required: false,
        help: "parameters for fail-query",
    },
    SettingDoc {
        key: "payload-column",
        required: false,
        help: "column handed to the program (default: the whole row as JSON)",
    },
    SettingDoc {
        key: "key-column",
        required: false,
        help: "column identifying the row in logs and WORK_KEY",
    },
];

#[derive(Debug)]
pub struct PostgresConfig {
    pub database_url: SecretString,
    pub fetch: Template,
    pub ack: Option<Template>,
    pub fail: Option<Template>,
    pub payload_column: Option<String>,
    pub key_column: Option<String>,
}

pub struct PostgresSource {
    config: PostgresConfig,
    db: Option<Db>,
}

impl PostgresSource {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config, db: None }
    }

    fn db(&self) -> Result<&Db> {
        self.db
            .as_ref()
            .ok_or_else(|| Error::Other("postgres source used before connect".to_string()))
    }

    /// Run a follow-up statement. Returns the number of affected rows.
    async fn run_statement(&self, template: &Template, item: &WorkItem) -> Result<u64> {
        let db = self.db()?;
        let result = if template.params().is_empty() {
            let sql = template.render_or_empty(item);
            debug!(sql = %sql, "running follow-up statement");
            sqlx::query(&sql).execute(db.pool()).await?
        } else {
            let query = bind_params(sqlx::query(template.text()), template.resolve_params(item));
            query.execute(db.pool()).await?
        };
        Ok(result.rows_affected())
    }

    fn item_from_row(&self, record: crate::model::work::Record) -> WorkItem {
        let mut item = match self.config.payload_column.as_deref() {
            Some(column) => {
                let payload = lookup(&record, column).map(stringify).unwrap_or_default();
                WorkItem::from_payload(payload).with_record(record)
            }
            None => WorkItem::from_record(record),
        };
        if let Some(column) = self.config.key_column.as_deref() {
            if let Some(key) = item.record.as_ref().and_then(|r| lookup(r, column)) {
                item.key = Some(stringify(key));
            }
        }
        item
    }
}

impl Configure for PostgresSource {
    fn configure(settings: &Settings) -> Result<Self> {
        let fetch = settings
            .template("fetch-query", "fetch-params")?
            .ok_or_else(|| Error::Config("fetch-query is required".to_string()))?;
        Ok(Self::new(PostgresConfig {
            database_url: settings.secret("database-url")?,
            fetch,
            ack: settings.template("ack-query", "ack-params")?,
            fail: settings.template("fail-query", "fail-params")?,
            payload_column: settings.get("payload-column").map(str::to_string),
            key_column: settings.get("key-column").map(str::to_string),
        }))
    }
}

#[async_trait]
impl WorkSource for PostgresSource {
    fn name(&self) -> &'static str {
        "postgres"
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
        let fetch = &self.config.fetch;
        let params = fetch.resolve_params(&WorkItem::from_payload(Vec::new()));
        let row = bind_params(sqlx::query(fetch.text()), params)
            .fetch_optional(self.db()?.pool())
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        Ok(row.map(|row| self.item_from_row(row_to_record(&row))))
    }

    async fn acknowledge(&mut self, item: &WorkItem) -> Result<()> {
        let Some(ack) = self.config.ack.as_ref() else {
            return Ok(());
        };
        let rows = self
            .run_statement(ack, item)
            .await
            .map_err(|e| Error::Acknowledge(e.to_string()))?;
        debug!(key = ?item.key, rows, "acknowledged");
        Ok(())
    }

    async fn report_failure(&mut self, item: &WorkItem) -> Result<()> {
        let Some(fail) = self.config.fail.as_ref() else {
            return Ok(());
        };
        let rows = self
            .run_statement(fail, item)
            .await
            .map_err(|e| Error::ReportFailure(e.to_string()))?;
        debug!(key = ?item.key, rows, "failure recorded");
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(db) = self.db.take() {
            db.close().await;
        }
        Ok(())
    }
}

/// Bind resolved parameters in order, each with its natural Postgres type.
fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: Vec<Param>,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Param::Literal(text) => query.bind(text),
            Param::Payload(bytes) => match String::from_utf8(bytes) {
                Ok(text) => query.bind(text),
                Err(e) => query.bind(e.into_bytes()),
            },
            Param::Value(value) => bind_value(query, value),
        };
    }
    query
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s),
        other => query.bind(other),
    }
}
