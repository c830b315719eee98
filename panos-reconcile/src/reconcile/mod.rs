//! Reconcilers: entry (C3), collection and uuid-keyed rules (C4/C5),
//! co-tenant singletons (C6).
//!
//! Every RPC goes through a [`Session`], which checks the cancellation token
//! before and after each call and remembers the last completed step.

pub mod collection;
pub mod entry;
pub mod ordering;
pub mod singleton;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::drift::reconcile_state;
use crate::error::{Error, Result};
use crate::schema::ResourceSchema;
use crate::transport::{Target, Transport, TransportError};

/// One provider operation against one transport.
pub struct Session<'a> {
    transport: &'a dyn Transport,
    cancel: CancellationToken,
    skip_verify: bool,
    last_step: String,
}

impl<'a> Session<'a> {
    pub fn new(transport: &'a dyn Transport, cancel: CancellationToken) -> Self {
        Self {
            transport,
            cancel,
            skip_verify: false,
            last_step: "start".to_string(),
        }
    }

    /// Skip post-apply ordering verification.
    pub fn skip_verify(mut self, skip: bool) -> Self {
        self.skip_verify = skip;
        self
    }

    pub fn verifies(&self) -> bool {
        !self.skip_verify
    }

    pub fn last_step(&self) -> &str {
        &self.last_step
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                last_step: self.last_step.clone(),
            });
        }
        Ok(())
    }

    /// Run one RPC.
    pub fn rpc<T>(
        &mut self,
        step: &str,
        target: &Target,
        call: impl FnOnce(&dyn Transport) -> Result<T, TransportError>,
    ) -> Result<T> {
        self.checkpoint()?;
        debug!(resource = %target.resource, scope = %target.scope, step, "rpc");
        let outcome = call(self.transport);
        if outcome.is_ok() {
            self.last_step = format!("{step} ({target})");
        }
        self.checkpoint()?;
        outcome.map_err(Error::from)
    }
}

pub(crate) fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::Transport(e) if e.is_not_found())
}

pub(crate) fn is_unsupported(err: &Error) -> bool {
    matches!(err, Error::Transport(e) if e.is_unsupported())
}

/// State of one named entry: its name plus the reconciled body.
pub(crate) fn entry_state(
    schema: &ResourceSchema,
    name: &str,
    declared: &Map<String, Value>,
    observed: &Map<String, Value>,
    prior: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut state = Map::new();
    state.insert("name".to_string(), Value::String(name.to_string()));
    state.extend(reconcile_state(&schema.body, declared, observed, prior));
    state
}
