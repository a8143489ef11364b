//! Core data model.
//!
//! A work item is the payload pulled from a source plus whatever the source
//! needs to acknowledge it later.

pub mod work;
