//! Issues single operations against the service and classifies their
//! outcomes.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Method;
use serde_json::json;

use crate::http::{Exchange, Transport, TransportError};
use crate::metrics::{Metrics, Outcome};
use crate::workload::{Action, OpKind};

/// Executes one action at a time and records every result in the aggregate
/// it was created with.
///
/// One call maps to exactly one recorded outcome. Transport failures are
/// caught here, tagged and counted; nothing propagates to the worker loop.
#[derive(Clone)]
pub struct Executor {
    transport: Transport,
    metrics: Arc<Metrics>,
}

impl Executor {
    /// Creates an executor recording into `metrics`.
    pub fn new(transport: Transport, metrics: Arc<Metrics>) -> Self {
        Self { transport, metrics }
    }

    /// Runs one action to completion and returns its outcome tag.
    ///
    /// The measured latency covers the whole call including any transport
    /// retries.
    pub async fn execute(&self, action: &Action) -> Outcome {
        let kind = action.kind();
        let start = Instant::now();
        let result = self.dispatch(action).await;
        let latency = start.elapsed();

        let outcome = match result {
            Ok(exchange) => Outcome::Status(exchange.status.as_u16()),
            Err(error) => {
                tracing::warn!(%kind, key = action.key(), %error, "request failed");
                Outcome::Error
            }
        };

        self.metrics
            .record(kind, outcome, is_success(kind, outcome), latency);
        outcome
    }

    async fn dispatch(&self, action: &Action) -> Result<Exchange, TransportError> {
        match action {
            Action::Set { key, value } => {
                let body = json!({ "key": key, "value": value });
                self.transport.send(Method::POST, "/set", Some(&body)).await
            }
            Action::Get { key } => {
                self.transport
                    .send(Method::GET, &format!("/get/{key}"), None)
                    .await
            }
            Action::Delete { key } => {
                self.transport
                    .send(Method::DELETE, &format!("/delete/{key}"), None)
                    .await
            }
        }
    }
}

/// Success classification: SET needs a 200; GET and DELETE also accept 404,
/// absence being a legitimate answer rather than an error.
fn is_success(kind: OpKind, outcome: Outcome) -> bool {
    match (kind, outcome) {
        (OpKind::Set, Outcome::Status(200)) => true,
        (OpKind::Get | OpKind::Delete, Outcome::Status(200 | 404)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_200_succeeds_a_set() {
        assert!(is_success(OpKind::Set, Outcome::Status(200)));
        assert!(!is_success(OpKind::Set, Outcome::Status(404)));
        assert!(!is_success(OpKind::Set, Outcome::Status(500)));
        assert!(!is_success(OpKind::Set, Outcome::Error));
    }

    #[test]
    fn absent_keys_still_succeed_reads_and_deletes() {
        for kind in [OpKind::Get, OpKind::Delete] {
            assert!(is_success(kind, Outcome::Status(200)));
            assert!(is_success(kind, Outcome::Status(404)));
            assert!(!is_success(kind, Outcome::Status(500)));
            assert!(!is_success(kind, Outcome::Status(503)));
            assert!(!is_success(kind, Outcome::Error));
        }
    }
}
