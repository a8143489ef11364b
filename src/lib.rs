//! # workpull
//!
//! Pulls one unit of work from a backend (pgmq queue, SQL table, directory),
//! hands it to an external program, and acknowledges or reports the failure
//! back to the backend depending on the program's exit status.
//!
//! Backends implement [`source::WorkSource`]; [`engine::Controller`] drives
//! the fetch → execute → acknowledge cycle; [`template`] builds follow-up
//! requests from fetched records.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod source;
pub mod telemetry;
pub mod template;
