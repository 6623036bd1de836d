use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    number::CallerNumber,
    policy::{Decision, PolicyStore},
};

pub const FILTER_NAME: &str = "number-based-filter";
pub const DEFAULT_FILTER_PRIORITY: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingResult {
    Continue,
    Ignore,
    Hangup,
}

impl From<Decision> for IncomingResult {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Continue => IncomingResult::Continue,
            Decision::Ignore => IncomingResult::Ignore,
            Decision::Hangup => IncomingResult::Hangup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialResult {
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCall {
    pub id: u32,
    pub number: CallerNumber,
}

/// Hooks a call router invokes on every dial attempt and incoming call.
pub trait CallFilter: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        DEFAULT_FILTER_PRIORITY
    }

    fn filter_dial(&self, number: &CallerNumber) -> DialResult;

    fn filter_incoming(&self, call: &IncomingCall) -> IncomingResult;

    /// Aborts a pending filter request.
    fn filter_cancel(&self, request_id: u32);
}

/// Filters incoming calls against the ignored and blocked number lists.
/// Outgoing calls are never touched.
#[derive(Clone)]
pub struct NumberFilter {
    store: Arc<PolicyStore>,
}

impl NumberFilter {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }
}

impl CallFilter for NumberFilter {
    fn name(&self) -> &str {
        FILTER_NAME
    }

    fn filter_dial(&self, _number: &CallerNumber) -> DialResult {
        DialResult::Continue
    }

    #[instrument(skip(self, call), fields(call_id = call.id))]
    fn filter_incoming(&self, call: &IncomingCall) -> IncomingResult {
        let number = call.number.to_string();
        debug!(number = %number, "incoming call, checking number lists");
        self.store.evaluate(&number).into()
    }

    // Every decision is synchronous, nothing is ever pending.
    fn filter_cancel(&self, _request_id: u32) {}
}
