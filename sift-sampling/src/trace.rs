use chrono::{DateTime, Utc};
use sift_protocol::{Span, TraceId};

/// The buffered state of a trace awaiting a sampling decision.
///
/// Policies evaluate against this accumulated state and never mutate it.
#[derive(Clone, Debug)]
pub struct TraceData {
    /// The trace id.
    pub trace_id: TraceId,
    /// When the first span of this trace arrived.
    pub arrival: DateTime<Utc>,
    /// The spans buffered so far.
    pub spans: Vec<Span>,
}

impl TraceData {
    /// Creates a new buffer for the given trace.
    pub fn new(trace_id: TraceId, arrival: DateTime<Utc>) -> Self {
        Self {
            trace_id,
            arrival,
            spans: Vec::new(),
        }
    }

    /// Returns the number of buffered spans.
    pub fn span_count(&self) -> u64 {
        self.spans.len() as u64
    }
}
