//! A concurrent workload generator for a key-value HTTP service.
//!
//! The harness drives a configurable mix of SET/GET/DELETE calls against the
//! service from a fixed pool of workers, after a sequential warm-up pass
//! over the keyspace. Every call lands in a shared accumulator as a
//! `(kind, outcome)` count; successes are classified per operation (200 for
//! SET, 200 or 404 for GET and DELETE, since absence is a legitimate
//! answer); the final report prints per-phase totals, outcome breakdowns,
//! latencies and throughput.
//!
//! The key-value store itself is an external collaborator. Only its HTTP
//! contract is assumed: `POST /set`, `GET /get/{key}`, `DELETE
//! /delete/{key}` and `POST /compact`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod executor;
pub mod http;
pub mod keyspace;
pub mod metrics;
pub mod stress;
pub mod workload;

pub use crate::config::Config;
pub use crate::http::Transport;
pub use crate::stress::{RunSummary, run};
