//! Task CRUD over a sparse attribute-row table.
//!
//! Each task attribute is one row keyed by `(id, DataType)`; reads fold the
//! rows of an id back into a [`models::Task`].

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod materializer;
pub mod models;
pub mod service;
pub mod store;
pub mod telemetry;
