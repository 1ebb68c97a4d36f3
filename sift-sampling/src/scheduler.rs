//! The trace decision scheduler.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use sift_protocol::{Span, TraceId};
use sift_system::ShutdownHandle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{Policy, TraceData};

/// Configuration for the trace decision scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamplerConfig {
    /// Seconds to wait after the first span of a trace before deciding.
    ///
    /// The wait gives the remaining spans of the trace time to arrive, so
    /// policies see the whole trace.
    pub decision_wait: u64,

    /// Seconds between decision passes.
    pub tick_interval: u64,

    /// Maximum number of traces tracked at once, decided or pending.
    ///
    /// When exceeded, the oldest tracked trace is evicted. An evicted
    /// pending trace never receives a decision; its late spans re-enter as
    /// a new trace.
    pub num_traces: usize,

    /// Capacity of the inbound span channel.
    pub queue_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            decision_wait: 30,
            tick_interval: 1,
            num_traces: 50_000,
            queue_size: 1024,
        }
    }
}

/// The terminal sampling decision for a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceDecision {
    /// The trace is kept; all its spans are forwarded.
    Sampled,
    /// The trace is dropped; all its spans are discarded.
    Dropped,
}

/// The spans of a trace the scheduler decided to keep.
#[derive(Clone, Debug)]
pub struct SampledSpans {
    /// The trace id.
    pub trace_id: TraceId,
    /// The kept spans.
    pub spans: Vec<Span>,
}

enum TraceStatus {
    Pending(TraceData),
    Decided(TraceDecision),
}

/// Buffers spans per trace and promotes traces to a terminal decision.
///
/// Traces start pending. On every tick, pending traces old enough to have
/// received all their spans are evaluated against the configured policies;
/// the trace is kept if any policy samples it. The decision is final: spans
/// arriving afterwards are routed according to it without re-evaluating any
/// policy, and the buffers of decided traces are released immediately.
pub struct Sampler {
    config: SamplerConfig,
    policies: Vec<Policy>,
    traces: HashMap<TraceId, TraceStatus>,
    arrival_order: VecDeque<TraceId>,
    output: mpsc::Sender<SampledSpans>,
}

impl Sampler {
    /// Creates a new sampler forwarding kept spans to `output`.
    pub fn new(
        config: SamplerConfig,
        policies: Vec<Policy>,
        output: mpsc::Sender<SampledSpans>,
    ) -> Self {
        Self {
            config,
            policies,
            traces: HashMap::new(),
            arrival_order: VecDeque::new(),
            output,
        }
    }

    /// Spawns the decision loop.
    ///
    /// Returns the sender for inbound span batches and the join handle of
    /// the loop. The loop exits within one tick of the shutdown signal.
    pub fn spawn(mut self, mut shutdown: ShutdownHandle) -> (mpsc::Sender<Vec<Span>>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(self.config.queue_size.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(self.config.tick_interval.max(1)));
            sift_log::info!("trace sampler started");

            loop {
                tokio::select! {
                    biased;

                    _ = ticker.tick() => self.make_decisions(Utc::now()).await,
                    Some(spans) = rx.recv() => self.handle_spans(spans).await,
                    _ = shutdown.notified() => break,
                }
            }

            sift_log::info!("trace sampler stopped");
        });

        (tx, handle)
    }

    async fn handle_spans(&mut self, spans: Vec<Span>) {
        let now = Utc::now();

        for span in spans {
            let trace_id = span.trace_id;
            match self.traces.get_mut(&trace_id) {
                Some(TraceStatus::Pending(data)) => data.spans.push(span),
                Some(TraceStatus::Decided(TraceDecision::Sampled)) => {
                    // Late span for a kept trace: forward with the recorded
                    // decision, no policy runs again.
                    Self::forward(
                        &self.output,
                        SampledSpans {
                            trace_id,
                            spans: vec![span],
                        },
                    )
                    .await;
                }
                Some(TraceStatus::Decided(TraceDecision::Dropped)) => {}
                None => {
                    let mut data = TraceData::new(trace_id, now);
                    data.spans.push(span);
                    self.traces.insert(trace_id, TraceStatus::Pending(data));
                    self.arrival_order.push_back(trace_id);
                    self.enforce_trace_bound();
                }
            }
        }
    }

    async fn make_decisions(&mut self, now: DateTime<Utc>) {
        let wait = chrono::Duration::seconds(self.config.decision_wait as i64);

        let ready: Vec<TraceId> = self
            .traces
            .iter()
            .filter_map(|(trace_id, status)| match status {
                TraceStatus::Pending(data) if data.arrival + wait <= now => Some(*trace_id),
                _ => None,
            })
            .collect();

        for trace_id in ready {
            let Some(TraceStatus::Pending(data)) = self.traces.remove(&trace_id) else {
                continue;
            };

            let decision = self.decide(&data);
            self.traces.insert(trace_id, TraceStatus::Decided(decision));

            if decision == TraceDecision::Sampled {
                Self::forward(
                    &self.output,
                    SampledSpans {
                        trace_id,
                        spans: data.spans,
                    },
                )
                .await;
            }
        }
    }

    fn decide(&self, trace: &TraceData) -> TraceDecision {
        let mut sampled = false;
        for policy in &self.policies {
            let evaluation = policy.evaluate(trace);
            sift_log::debug!(
                policy = policy.name(),
                trace_id = %trace.trace_id,
                decision = ?evaluation.decision,
                reason = evaluation.reason.as_deref().unwrap_or_default(),
                "policy evaluated"
            );
            sampled |= evaluation.is_sampled();
        }

        if sampled {
            TraceDecision::Sampled
        } else {
            TraceDecision::Dropped
        }
    }

    fn enforce_trace_bound(&mut self) {
        while self.traces.len() > self.config.num_traces {
            let Some(oldest) = self.arrival_order.pop_front() else {
                break;
            };

            if let Some(TraceStatus::Pending(_)) = self.traces.remove(&oldest) {
                sift_log::debug!(
                    trace_id = %oldest,
                    "dropping undecided trace to stay within the trace limit"
                );
            }
        }
    }

    async fn forward(output: &mpsc::Sender<SampledSpans>, sampled: SampledSpans) {
        if output.send(sampled).await.is_err() {
            sift_log::debug!("span consumer closed, discarding sampled spans");
        }
    }
}
