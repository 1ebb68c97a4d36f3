//! Evaluation of sampling policies.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Instant;

use hash32::Hasher;
use lru::LruCache;
use parking_lot::Mutex;
use rand::Rng;
use rand_pcg::Pcg32;
use regex::Regex;
use sift_protocol::{AttrValue, SpanStatus, TraceId};

use crate::{PolicyConfig, PolicyKind, PolicySpec, TraceData};

/// The sampling decision of a single policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Keep the trace.
    Sampled,
    /// Do not keep the trace.
    NotSampled,
    /// Keep the trace, produced by an inverted match that did not apply.
    InvertSampled,
    /// Drop the trace, produced by an inverted match that applied.
    InvertNotSampled,
}

impl Decision {
    /// Returns `true` if this decision keeps the trace.
    pub fn is_sampled(self) -> bool {
        matches!(self, Decision::Sampled | Decision::InvertSampled)
    }
}

/// The outcome of evaluating a policy: a [`Decision`] plus an optional
/// human readable reason.
///
/// Reasons are surfaced in decision logs; most evaluators leave them empty
/// where the decision speaks for itself.
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// The sampling decision.
    pub decision: Decision,
    /// Why the evaluator decided this way, when it provides one.
    pub reason: Option<String>,
}

impl Evaluation {
    /// Attaches a reason to a decision.
    pub fn with_reason(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: Some(reason.into()),
        }
    }

    /// Returns `true` if the decision keeps the trace.
    pub fn is_sampled(&self) -> bool {
        self.decision.is_sampled()
    }
}

impl From<Decision> for Evaluation {
    fn from(decision: Decision) -> Self {
        Self {
            decision,
            reason: None,
        }
    }
}

/// An error building policies from configuration.
///
/// Construction errors are fatal for the whole policy set; the component
/// using the policies must not start.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A string attribute policy contains an invalid regular expression.
    #[error("invalid regex in policy {name:?}")]
    InvalidRegex {
        /// The name of the offending policy.
        name: String,
        /// The regex compilation failure.
        #[source]
        source: regex::Error,
    },

    /// A status code policy names a status outside `OK`/`ERROR`/`UNSET`.
    #[error("unknown status code {code:?} in policy {name:?}")]
    UnknownStatusCode {
        /// The name of the offending policy.
        name: String,
        /// The unrecognized status code.
        code: String,
    },

    /// An `and`/`or` policy has an empty sub-policy list.
    #[error("combinator policy {name:?} has no sub-policies")]
    EmptyCombinator {
        /// The name of the offending policy.
        name: String,
    },
}

/// A single sampling predicate evaluated against a buffered trace.
///
/// Evaluators never mutate the trace. Evaluators with shared state (the
/// rate limiter's token bucket, the string matcher's result cache)
/// serialize access to that state internally, so evaluation can run from
/// concurrent decision passes.
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluates the policy against the given trace.
    fn evaluate(&self, trace: &TraceData) -> Evaluation;
}

/// A named, ready-to-run sampling policy.
pub struct Policy {
    name: String,
    evaluator: Box<dyn PolicyEvaluator>,
}

impl Policy {
    /// Creates a policy from a name and an evaluator.
    ///
    /// This is the escape hatch for evaluators that are not expressible in
    /// configuration; policies from configuration go through
    /// [`from_spec`](Self::from_spec).
    pub fn new(name: impl Into<String>, evaluator: Box<dyn PolicyEvaluator>) -> Self {
        Self {
            name: name.into(),
            evaluator,
        }
    }

    /// Builds the policy for a single spec.
    pub fn from_spec(spec: &PolicySpec) -> Result<Self, PolicyError> {
        Ok(Self::new(spec.name.clone(), build_evaluator(spec)?))
    }

    /// Returns the configured name of the policy.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the policy against the given trace.
    pub fn evaluate(&self, trace: &TraceData) -> Evaluation {
        self.evaluator.evaluate(trace)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builds all policies of a configuration.
///
/// Any invalid spec fails the whole set.
pub fn build_policies(config: &PolicyConfig) -> Result<Vec<Policy>, PolicyError> {
    config.policies.iter().map(Policy::from_spec).collect()
}

fn build_evaluator(spec: &PolicySpec) -> Result<Box<dyn PolicyEvaluator>, PolicyError> {
    Ok(match &spec.kind {
        PolicyKind::AlwaysSample => Box::new(AlwaysSample),
        PolicyKind::NumericAttribute {
            key,
            min_value,
            max_value,
        } => Box::new(NumericAttributeFilter {
            key: key.clone(),
            min: *min_value,
            max: *max_value,
        }),
        PolicyKind::StringAttribute {
            key,
            values,
            enabled_regex_matching,
            cache_max_size,
            invert_match,
        } => Box::new(StringAttributeFilter::new(
            &spec.name,
            key,
            values,
            *enabled_regex_matching,
            *cache_max_size,
            *invert_match,
        )?),
        PolicyKind::RateLimiting { spans_per_second } => {
            Box::new(RateLimiter::new(*spans_per_second))
        }
        PolicyKind::StatusCode { status_codes } => {
            Box::new(StatusCodeFilter::new(&spec.name, status_codes)?)
        }
        PolicyKind::Probabilistic {
            hash_salt,
            sampling_percentage,
        } => Box::new(ProbabilisticSampler::new(hash_salt, *sampling_percentage)),
        PolicyKind::TraceState { key, values } => Box::new(TraceStateFilter {
            key: key.clone(),
            values: values.clone(),
        }),
        PolicyKind::SpanCount { min_spans } => Box::new(SpanCountFilter {
            min_spans: *min_spans,
        }),
        PolicyKind::And { sub_policies } => Box::new(AndPolicy::new(&spec.name, sub_policies)?),
        PolicyKind::Or { sub_policies } => Box::new(OrPolicy::new(&spec.name, sub_policies)?),
    })
}

/// Samples every trace.
struct AlwaysSample;

impl PolicyEvaluator for AlwaysSample {
    fn evaluate(&self, _trace: &TraceData) -> Evaluation {
        Decision::Sampled.into()
    }
}

/// Samples traces carrying a numeric attribute within the configured range.
struct NumericAttributeFilter {
    key: String,
    min: f64,
    max: f64,
}

impl PolicyEvaluator for NumericAttributeFilter {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        let matched = trace.spans.iter().any(|span| {
            span.attributes
                .get(&self.key)
                .and_then(AttrValue::as_f64)
                .is_some_and(|value| value >= self.min && value <= self.max)
        });

        if matched {
            Decision::Sampled.into()
        } else {
            Decision::NotSampled.into()
        }
    }
}

/// Samples traces carrying a string attribute matching the configured set.
struct StringAttributeFilter {
    key: String,
    matcher: ValueMatcher,
    invert: bool,
}

enum ValueMatcher {
    Exact(HashSet<String>),
    Regex {
        patterns: Vec<Regex>,
        // Maps already seen values to their match result, so identical
        // values are not re-matched against every pattern. Bounded, never
        // grows past the configured size.
        cache: Option<Mutex<LruCache<String, bool>>>,
    },
}

impl StringAttributeFilter {
    fn new(
        policy_name: &str,
        key: &str,
        values: &[String],
        enabled_regex_matching: bool,
        cache_max_size: usize,
        invert_match: bool,
    ) -> Result<Self, PolicyError> {
        let matcher = if enabled_regex_matching {
            let patterns = values
                .iter()
                .map(|value| Regex::new(value))
                .collect::<Result<_, _>>()
                .map_err(|source| PolicyError::InvalidRegex {
                    name: policy_name.to_owned(),
                    source,
                })?;

            let cache =
                NonZeroUsize::new(cache_max_size).map(|size| Mutex::new(LruCache::new(size)));

            ValueMatcher::Regex { patterns, cache }
        } else {
            ValueMatcher::Exact(values.iter().cloned().collect())
        };

        Ok(Self {
            key: key.to_owned(),
            matcher,
            invert: invert_match,
        })
    }

    fn matches(&self, value: &str) -> bool {
        match &self.matcher {
            ValueMatcher::Exact(values) => values.contains(value),
            ValueMatcher::Regex { patterns, cache } => {
                if let Some(cache) = cache {
                    if let Some(matched) = cache.lock().get(value) {
                        return *matched;
                    }
                }

                let matched = patterns.iter().any(|pattern| pattern.is_match(value));

                if let Some(cache) = cache {
                    cache.lock().put(value.to_owned(), matched);
                }

                matched
            }
        }
    }
}

impl PolicyEvaluator for StringAttributeFilter {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        let matched = trace.spans.iter().any(|span| {
            span.attributes
                .get(&self.key)
                .and_then(AttrValue::as_str)
                .is_some_and(|value| self.matches(value))
        });

        let decision = match (matched, self.invert) {
            (true, false) => Decision::Sampled,
            (false, false) => Decision::NotSampled,
            (true, true) => Decision::InvertNotSampled,
            (false, true) => Decision::InvertSampled,
        };

        decision.into()
    }
}

/// Samples traces as long as the span rate stays within the allowance.
///
/// The token bucket is shared across all evaluations of this policy, which
/// makes it a global rate limit rather than a per-trace one.
struct RateLimiter {
    spans_per_second: u64,
    bucket: Mutex<TokenBucket>,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(spans_per_second: u64) -> Self {
        Self {
            spans_per_second,
            bucket: Mutex::new(TokenBucket {
                tokens: spans_per_second as f64,
                last_refill: Instant::now(),
            }),
        }
    }
}

impl PolicyEvaluator for RateLimiter {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        let rate = self.spans_per_second as f64;
        let cost = trace.span_count() as f64;

        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        // Refill up to the bucket capacity, which equals one second worth
        // of spans. Tokens are deducted only when the trace is admitted.
        bucket.tokens = (bucket.tokens + elapsed * rate).min(rate);
        bucket.last_refill = now;

        if cost <= bucket.tokens {
            bucket.tokens -= cost;
            Decision::Sampled.into()
        } else {
            Evaluation::with_reason(
                Decision::NotSampled,
                format!("trace of {} spans exceeds the remaining allowance", cost as u64),
            )
        }
    }
}

/// Samples traces containing a span with one of the configured statuses.
struct StatusCodeFilter {
    statuses: Vec<SpanStatus>,
}

impl StatusCodeFilter {
    fn new(policy_name: &str, status_codes: &[String]) -> Result<Self, PolicyError> {
        let statuses = status_codes
            .iter()
            .map(|code| {
                code.parse().map_err(|_| PolicyError::UnknownStatusCode {
                    name: policy_name.to_owned(),
                    code: code.clone(),
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { statuses })
    }
}

impl PolicyEvaluator for StatusCodeFilter {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        let matched = trace
            .spans
            .iter()
            .any(|span| self.statuses.contains(&span.status));

        if matched {
            Decision::Sampled.into()
        } else {
            Decision::NotSampled.into()
        }
    }
}

/// Samples a deterministic percentage of traces.
struct ProbabilisticSampler {
    salt_hash: u64,
    percentage: f64,
}

impl ProbabilisticSampler {
    fn new(hash_salt: &str, sampling_percentage: f64) -> Self {
        Self {
            salt_hash: fnv32(hash_salt) as u64,
            percentage: sampling_percentage,
        }
    }
}

impl PolicyEvaluator for ProbabilisticSampler {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        if dice_roll(trace.trace_id, self.salt_hash) < self.percentage {
            Decision::Sampled.into()
        } else {
            Decision::NotSampled.into()
        }
    }
}

fn fnv32(s: &str) -> u32 {
    let mut hasher = hash32::FnvHasher::default();
    s.hash(&mut hasher);
    hasher.finish32()
}

/// Generates a roll on `[0, 100)` by seeding the generator with the trace
/// id bytes and the salt.
///
/// The return is deterministic, the same trace id and salt always generate
/// the same roll, across calls and across process restarts.
fn dice_roll(trace_id: TraceId, salt_hash: u64) -> f64 {
    let big_seed = u128::from_be_bytes(*trace_id.as_bytes());
    let mut generator = Pcg32::new(
        (big_seed >> 64) as u64 ^ salt_hash,
        big_seed as u64 ^ salt_hash,
    );
    generator.random_range(0.0..100.0)
}

/// Samples traces whose trace state carries one of the configured values.
struct TraceStateFilter {
    key: String,
    values: Vec<String>,
}

impl PolicyEvaluator for TraceStateFilter {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        let matched = trace.spans.iter().any(|span| {
            span.trace_state
                .as_ref()
                .and_then(|state| state.get(&self.key))
                .is_some_and(|value| self.values.iter().any(|accepted| accepted == value))
        });

        if matched {
            Decision::Sampled.into()
        } else {
            Decision::NotSampled.into()
        }
    }
}

/// Samples traces with at least the configured number of spans.
struct SpanCountFilter {
    min_spans: u64,
}

impl PolicyEvaluator for SpanCountFilter {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        if trace.span_count() >= self.min_spans {
            Decision::Sampled.into()
        } else {
            Decision::NotSampled.into()
        }
    }
}

/// Samples only if every sub-policy samples.
struct AndPolicy {
    subs: Vec<Policy>,
}

impl AndPolicy {
    fn new(policy_name: &str, sub_policies: &[PolicySpec]) -> Result<Self, PolicyError> {
        if sub_policies.is_empty() {
            return Err(PolicyError::EmptyCombinator {
                name: policy_name.to_owned(),
            });
        }

        let subs = sub_policies
            .iter()
            .map(Policy::from_spec)
            .collect::<Result<_, _>>()?;

        Ok(Self { subs })
    }
}

impl PolicyEvaluator for AndPolicy {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        // Every sub-policy runs, even once the outcome is settled; the
        // combined decision is the logical AND.
        let mut veto = None;
        for policy in &self.subs {
            let evaluation = policy.evaluate(trace);
            if !evaluation.is_sampled() && veto.is_none() {
                veto = Some(policy.name().to_owned());
            }
        }

        match veto {
            Some(name) => Evaluation::with_reason(
                Decision::NotSampled,
                format!("sub-policy {name} did not sample"),
            ),
            None => Decision::Sampled.into(),
        }
    }
}

/// Samples if at least one sub-policy samples.
struct OrPolicy {
    subs: Vec<Policy>,
}

impl OrPolicy {
    fn new(policy_name: &str, sub_policies: &[PolicySpec]) -> Result<Self, PolicyError> {
        if sub_policies.is_empty() {
            return Err(PolicyError::EmptyCombinator {
                name: policy_name.to_owned(),
            });
        }

        let subs = sub_policies
            .iter()
            .map(Policy::from_spec)
            .collect::<Result<_, _>>()?;

        Ok(Self { subs })
    }
}

impl PolicyEvaluator for OrPolicy {
    fn evaluate(&self, trace: &TraceData) -> Evaluation {
        let mut sampled = false;
        for policy in &self.subs {
            sampled |= policy.evaluate(trace).is_sampled();
        }

        if sampled {
            Decision::Sampled.into()
        } else {
            Decision::NotSampled.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sift_protocol::{Span, SpanStatus, TraceState};

    use super::*;

    fn span(attributes: &[(&str, AttrValue)]) -> Span {
        Span {
            trace_id: TraceId::from_u128(1),
            name: "operation".to_owned(),
            status: SpanStatus::Unset,
            attributes: attributes
                .iter()
                .map(|(key, value)| ((*key).to_owned(), value.clone()))
                .collect(),
            trace_state: None,
            start_time: Utc::now(),
            peer_addr: None,
        }
    }

    fn trace(spans: Vec<Span>) -> TraceData {
        let mut data = TraceData::new(TraceId::from_u128(1), Utc::now());
        data.spans = spans;
        data
    }

    fn policy(json: serde_json::Value) -> Policy {
        let spec: PolicySpec = serde_json::from_value(json).unwrap();
        Policy::from_spec(&spec).unwrap()
    }

    fn decision(policy: &Policy, trace: &TraceData) -> Decision {
        policy.evaluate(trace).decision
    }

    fn always() -> serde_json::Value {
        serde_json::json!({"name": "always", "type": "always_sample"})
    }

    fn never() -> serde_json::Value {
        // A span count threshold no test trace reaches.
        serde_json::json!({"name": "never", "type": "span_count", "minSpans": 10_000})
    }

    #[test]
    fn test_numeric_attribute_inclusive_bounds() {
        let policy = policy(serde_json::json!({
            "name": "range",
            "type": "numeric_attribute",
            "key": "duration_ms",
            "minValue": 100.0,
            "maxValue": 200.0,
        }));

        for (value, expected) in [
            (AttrValue::I64(100), Decision::Sampled),
            (AttrValue::I64(200), Decision::Sampled),
            (AttrValue::F64(150.5), Decision::Sampled),
            (AttrValue::I64(99), Decision::NotSampled),
            (AttrValue::I64(201), Decision::NotSampled),
            (AttrValue::from("150"), Decision::NotSampled),
        ] {
            let data = trace(vec![span(&[("duration_ms", value)])]);
            assert_eq!(decision(&policy, &data), expected);
        }

        // Absent attribute contributes a non-sampling decision.
        let data = trace(vec![span(&[])]);
        assert_eq!(decision(&policy, &data), Decision::NotSampled);
    }

    #[test]
    fn test_string_attribute_exact() {
        let policy = policy(serde_json::json!({
            "name": "env",
            "type": "string_attribute",
            "key": "deployment.environment",
            "values": ["production", "staging"],
        }));

        let matching = trace(vec![span(&[(
            "deployment.environment",
            AttrValue::from("staging"),
        )])]);
        assert_eq!(decision(&policy, &matching), Decision::Sampled);

        let missing = trace(vec![span(&[(
            "deployment.environment",
            AttrValue::from("dev"),
        )])]);
        assert_eq!(decision(&policy, &missing), Decision::NotSampled);
    }

    #[test]
    fn test_string_attribute_regex_inverted() {
        let policy = policy(serde_json::json!({
            "name": "drop-healthchecks",
            "type": "string_attribute",
            "key": "http.target",
            "values": ["/health.*"],
            "enabledRegexMatching": true,
            "invertMatch": true,
        }));

        let healthcheck = trace(vec![span(&[("http.target", AttrValue::from("/healthz"))])]);
        assert_eq!(decision(&policy, &healthcheck), Decision::InvertNotSampled);

        let checkout = trace(vec![span(&[("http.target", AttrValue::from("/checkout"))])]);
        assert_eq!(decision(&policy, &checkout), Decision::InvertSampled);
    }

    #[test]
    fn test_string_attribute_cache_stays_bounded() {
        let filter =
            StringAttributeFilter::new("cached", "k", &["v.*".to_owned()], true, 3, false).unwrap();

        for i in 0..100 {
            filter.matches(&format!("value-{i}"));
        }

        match &filter.matcher {
            ValueMatcher::Regex {
                cache: Some(cache), ..
            } => assert_eq!(cache.lock().len(), 3),
            _ => panic!("expected a bounded regex cache"),
        }

        // Cached results agree with fresh matches.
        assert!(filter.matches("value-99"));
        assert!(!filter.matches("other"));
        assert!(!filter.matches("other"));
    }

    #[test]
    fn test_invalid_regex_fails_whole_set() {
        let config: PolicyConfig = serde_json::from_value(serde_json::json!({
            "policies": [
                {"name": "fine", "type": "always_sample"},
                {"name": "broken", "type": "string_attribute", "key": "k", "values": ["(unclosed"], "enabledRegexMatching": true},
            ]
        }))
        .unwrap();

        assert!(matches!(
            build_policies(&config),
            Err(PolicyError::InvalidRegex { name, .. }) if name == "broken"
        ));
    }

    #[test]
    fn test_status_code_filter() {
        let policy = policy(serde_json::json!({
            "name": "errors",
            "type": "status_code",
            "statusCodes": ["ERROR"],
        }));

        let mut error_span = span(&[]);
        error_span.status = SpanStatus::Error;

        let matching = trace(vec![span(&[]), error_span]);
        assert_eq!(decision(&policy, &matching), Decision::Sampled);

        let missing = trace(vec![span(&[])]);
        assert_eq!(decision(&policy, &missing), Decision::NotSampled);
    }

    #[test]
    fn test_unknown_status_code_is_a_config_error() {
        let spec: PolicySpec = serde_json::from_value(serde_json::json!({
            "name": "errors",
            "type": "status_code",
            "statusCodes": ["ERROR", "CANCELLED"],
        }))
        .unwrap();

        assert!(matches!(
            Policy::from_spec(&spec),
            Err(PolicyError::UnknownStatusCode { code, .. }) if code == "CANCELLED"
        ));
    }

    #[test]
    fn test_probabilistic_is_deterministic() {
        let policy = policy(serde_json::json!({
            "name": "half",
            "type": "probabilistic",
            "hashSalt": "x",
            "samplingPercentage": 50.0,
        }));

        let data = trace(vec![span(&[])]);
        let first = decision(&policy, &data);
        for _ in 0..10 {
            assert_eq!(decision(&policy, &data), first);
        }
    }

    #[test]
    fn test_probabilistic_edges() {
        let all = policy(serde_json::json!({
            "name": "all",
            "type": "probabilistic",
            "samplingPercentage": 100.0,
        }));
        let none = policy(serde_json::json!({
            "name": "none",
            "type": "probabilistic",
            "samplingPercentage": 0.0,
        }));

        for seed in 0..64u128 {
            let mut data = trace(vec![span(&[])]);
            data.trace_id = TraceId::from_u128(seed);
            assert_eq!(decision(&all, &data), Decision::Sampled);
            assert_eq!(decision(&none, &data), Decision::NotSampled);
        }
    }

    #[test]
    fn test_probabilistic_salt_changes_the_roll() {
        // Not every id flips, but across many ids the two salts must
        // disagree somewhere.
        let with_salt_a = ProbabilisticSampler::new("a", 50.0);
        let with_salt_b = ProbabilisticSampler::new("b", 50.0);

        let disagreements = (0..256u128)
            .filter(|seed| {
                let data = {
                    let mut data = trace(vec![]);
                    data.trace_id = TraceId::from_u128(*seed);
                    data
                };
                with_salt_a.evaluate(&data).decision != with_salt_b.evaluate(&data).decision
            })
            .count();

        assert!(disagreements > 0);
    }

    #[test]
    fn test_rate_limiter_budget() {
        let policy = policy(serde_json::json!({
            "name": "cap",
            "type": "rate_limiting",
            "spansPerSecond": 10,
        }));

        let big = trace(std::iter::repeat_with(|| span(&[])).take(11).collect());
        let evaluation = policy.evaluate(&big);
        assert_eq!(evaluation.decision, Decision::NotSampled);
        assert!(evaluation.reason.is_some());

        let small = trace(std::iter::repeat_with(|| span(&[])).take(5).collect());
        assert_eq!(decision(&policy, &small), Decision::Sampled);

        // Only five tokens remain, a six span trace exceeds the budget.
        let six = trace(std::iter::repeat_with(|| span(&[])).take(6).collect());
        assert_eq!(decision(&policy, &six), Decision::NotSampled);
    }

    #[test]
    fn test_trace_state_filter() {
        let policy = policy(serde_json::json!({
            "name": "vendor",
            "type": "trace_state",
            "key": "vendor",
            "values": ["abc"],
        }));

        let mut matching = span(&[]);
        matching.trace_state = Some(TraceState::parse("vendor=abc,other=x"));
        assert_eq!(decision(&policy, &trace(vec![matching])), Decision::Sampled);

        let mut other = span(&[]);
        other.trace_state = Some(TraceState::parse("vendor=def"));
        assert_eq!(decision(&policy, &trace(vec![other])), Decision::NotSampled);

        assert_eq!(
            decision(&policy, &trace(vec![span(&[])])),
            Decision::NotSampled
        );
    }

    #[test]
    fn test_span_count_threshold() {
        let policy = policy(serde_json::json!({
            "name": "min",
            "type": "span_count",
            "minSpans": 3,
        }));

        let two = trace(std::iter::repeat_with(|| span(&[])).take(2).collect());
        assert_eq!(decision(&policy, &two), Decision::NotSampled);

        let three = trace(std::iter::repeat_with(|| span(&[])).take(3).collect());
        assert_eq!(decision(&policy, &three), Decision::Sampled);
    }

    #[test]
    fn test_and_combinator() {
        let both = policy(serde_json::json!({
            "name": "and",
            "type": "and",
            "subPolicies": [always(), always()],
        }));
        assert_eq!(decision(&both, &trace(vec![span(&[])])), Decision::Sampled);

        let mixed = policy(serde_json::json!({
            "name": "and",
            "type": "and",
            "subPolicies": [always(), never()],
        }));
        let evaluation = mixed.evaluate(&trace(vec![span(&[])]));
        assert_eq!(evaluation.decision, Decision::NotSampled);
        assert_eq!(
            evaluation.reason.as_deref(),
            Some("sub-policy never did not sample")
        );
    }

    #[test]
    fn test_and_combinator_treats_inverted_drop_as_not_sampled() {
        let policy = policy(serde_json::json!({
            "name": "and",
            "type": "and",
            "subPolicies": [
                always(),
                {
                    "name": "not-health",
                    "type": "string_attribute",
                    "key": "http.target",
                    "values": ["/healthz"],
                    "invertMatch": true,
                },
            ],
        }));

        let health = trace(vec![span(&[("http.target", AttrValue::from("/healthz"))])]);
        assert_eq!(decision(&policy, &health), Decision::NotSampled);

        let other = trace(vec![span(&[("http.target", AttrValue::from("/pay"))])]);
        assert_eq!(decision(&policy, &other), Decision::Sampled);
    }

    #[test]
    fn test_or_combinator() {
        let one = policy(serde_json::json!({
            "name": "or",
            "type": "or",
            "subPolicies": [never(), always()],
        }));
        assert_eq!(decision(&one, &trace(vec![span(&[])])), Decision::Sampled);

        let none = policy(serde_json::json!({
            "name": "or",
            "type": "or",
            "subPolicies": [never(), never()],
        }));
        assert_eq!(decision(&none, &trace(vec![span(&[])])), Decision::NotSampled);
    }

    #[test]
    fn test_empty_combinator_is_a_config_error() {
        let spec: PolicySpec = serde_json::from_value(serde_json::json!({
            "name": "and",
            "type": "and",
            "subPolicies": [],
        }))
        .unwrap();

        assert!(matches!(
            Policy::from_spec(&spec),
            Err(PolicyError::EmptyCombinator { .. })
        ));
    }
}
