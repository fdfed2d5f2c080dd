//! Programmable transport.
//!
//! Plays back one [`Step`] per dispatch, then repeats a fallback step. Every
//! dispatched request is recorded, so tests can count attempts and inspect
//! what was sent.

use crate::domain::envelope::Envelope;
use crate::ports::{OutboundRequest, Transport};
use crate::registry::Inbound;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Behaviour of one attempt
#[derive(Debug, Clone)]
pub enum Step {
    /// Settle with this envelope immediately
    Respond(Envelope),
    /// Settle with this envelope after a delay
    RespondAfter(Duration, Envelope),
    /// After a delay, succeed with `{operation, params}` of the request
    Echo(Duration),
    /// Decode this raw body
    Raw(String),
    /// The channel could not be established
    Fail(String),
    /// Never settle
    Hang,
    /// Never settle in-band; deliver the envelope later from a detached task
    Straggle(Duration, Envelope),
    /// Settle twice with the same envelope
    Duplicate(Envelope),
}

/// Transport that replays a script of steps
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    dispatched: AtomicUsize,
    requests: Mutex<Vec<OutboundRequest>>,
    late: Arc<Mutex<Vec<bool>>>,
}

impl ScriptedTransport {
    /// Play `steps` in order, then hang.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: Step::Hang,
            dispatched: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            late: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Repeat `step` for every dispatch.
    pub fn always(step: Step) -> Self {
        Self::new([]).then(step)
    }

    /// Step used once the script is exhausted.
    pub fn then(mut self, fallback: Step) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Requests dispatched so far, in order
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }

    /// Whether each out-of-band or duplicate delivery settled anything
    pub fn late_deliveries(&self) -> Vec<bool> {
        self.late.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn dispatch(&self, request: OutboundRequest, inbound: Inbound) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let id = request.correlation_id;

        match step {
            Step::Respond(envelope) => {
                inbound.settle(id, Ok(envelope));
            }
            Step::RespondAfter(delay, envelope) => {
                tokio::time::sleep(delay).await;
                inbound.settle(id, Ok(envelope));
            }
            Step::Echo(delay) => {
                tokio::time::sleep(delay).await;
                let mut data = Map::new();
                data.insert("operation".into(), Value::String(request.operation));
                data.insert("params".into(), Value::Object(request.params));
                inbound.settle(id, Ok(Envelope::ok(data)));
            }
            Step::Raw(body) => {
                inbound.deliver(id, body.as_bytes());
            }
            Step::Fail(cause) => {
                inbound.fail(id, cause);
            }
            Step::Hang => std::future::pending::<()>().await,
            Step::Straggle(delay, envelope) => {
                let late = Arc::clone(&self.late);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let accepted = inbound.settle(id, Ok(envelope));
                    late.lock().push(accepted);
                });
                std::future::pending::<()>().await
            }
            Step::Duplicate(envelope) => {
                inbound.settle(id, Ok(envelope.clone()));
                let accepted = inbound.settle(id, Ok(envelope));
                self.late.lock().push(accepted);
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
