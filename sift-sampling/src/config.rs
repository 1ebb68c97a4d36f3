//! Sampling policy configuration.

use serde::{Deserialize, Serialize};

/// The set of sampling policies applied to every buffered trace.
///
/// Policies are evaluated independently; a trace is kept if any policy
/// decides to sample it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// The named policies, in configuration order.
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}

/// A single named policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicySpec {
    /// The name of the policy, used in logs and decision reasons.
    pub name: String,

    /// The policy type and its parameters.
    #[serde(flatten)]
    pub kind: PolicyKind,
}

/// A policy type together with its type-specific parameters.
///
/// Unknown types fail deserialization; an invalid policy list is a startup
/// error, not a runtime one.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PolicyKind {
    /// Samples every trace.
    AlwaysSample,

    /// Samples traces carrying a numeric attribute within a range.
    NumericAttribute {
        /// The attribute key to inspect on every span.
        key: String,
        /// The inclusive lower bound.
        min_value: f64,
        /// The inclusive upper bound.
        max_value: f64,
    },

    /// Samples traces carrying a string attribute matching a value set.
    StringAttribute {
        /// The attribute key to inspect on every span.
        key: String,
        /// The accepted values. Treated as regular expressions when
        /// `enabled_regex_matching` is set.
        values: Vec<String>,
        /// Interpret `values` as regular expressions.
        #[serde(default)]
        enabled_regex_matching: bool,
        /// Bound of the match result cache used with regex matching.
        /// `0` disables the cache.
        #[serde(default)]
        cache_max_size: usize,
        /// Invert the match result.
        #[serde(default)]
        invert_match: bool,
    },

    /// Samples traces as long as the span rate stays within an allowance.
    RateLimiting {
        /// The allowed number of spans per second.
        spans_per_second: u64,
    },

    /// Samples traces containing a span with one of the given statuses.
    StatusCode {
        /// Accepted statuses, spelled `OK`, `ERROR` or `UNSET`.
        status_codes: Vec<String>,
    },

    /// Samples a deterministic percentage of traces.
    Probabilistic {
        /// Salt mixed into the trace id hash.
        #[serde(default = "default_hash_salt")]
        hash_salt: String,
        /// The percentage of traces to sample, on a `0..100` scale.
        sampling_percentage: f64,
    },

    /// Samples traces whose trace state carries one of the given values.
    TraceState {
        /// The trace state key.
        key: String,
        /// The accepted values.
        values: Vec<String>,
    },

    /// Samples traces with at least the given number of spans.
    SpanCount {
        /// The minimum number of buffered spans.
        min_spans: u64,
    },

    /// Samples only if every sub-policy samples.
    And {
        /// The sub-policies.
        sub_policies: Vec<PolicySpec>,
    },

    /// Samples if at least one sub-policy samples.
    Or {
        /// The sub-policies.
        sub_policies: Vec<PolicySpec>,
    },
}

fn default_hash_salt() -> String {
    "default-hash-seed".to_owned()
}
