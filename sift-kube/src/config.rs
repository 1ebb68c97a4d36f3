//! Configuration for the pod cache and enrichment.

use serde::{Deserialize, Serialize};

use crate::AssociationRule;

/// Configuration of the pod cache, its watch loop and enrichment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KubeConfig {
    /// Only tag entries with their connection address, skipping all cache
    /// lookups. Useful when the metadata is attached by a later stage.
    pub passthrough: bool,

    /// Which pod and namespace metadata to extract into record attributes.
    pub extract: ExtractionRules,

    /// How entries and pods are associated. When empty, only the implicit
    /// pod uid and connection address identifiers apply.
    pub associations: Vec<AssociationRule>,

    /// Pods to ignore while tagging.
    pub exclude: ExcludeRules,

    /// Seconds between eviction sweeps.
    pub sweep_interval: u64,

    /// Seconds a deleted pod stays resolvable before its identifiers are
    /// evicted. Absorbs watch event reordering around pod churn.
    pub grace_period: u64,

    /// Capacity of the watch event channel.
    pub queue_size: usize,
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            passthrough: false,
            extract: ExtractionRules::default(),
            associations: Vec::new(),
            exclude: ExcludeRules::default(),
            sweep_interval: 30,
            grace_period: 3600,
            queue_size: 1024,
        }
    }
}

/// Which pod metadata is extracted into the record's attribute map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionRules {
    /// Extract the pod name.
    pub pod_name: bool,
    /// Extract the namespace name.
    pub namespace: bool,
    /// Extract the pod uid.
    pub pod_uid: bool,
    /// Extract the pod start time.
    pub start_time: bool,
    /// Extract the deployment name, parsed from the pod name.
    pub deployment: bool,
    /// Extract the node name.
    pub node: bool,
    /// Extract container image names.
    pub container_image_name: bool,
    /// Extract container image tags.
    pub container_image_tag: bool,
    /// Extract container ids, keyed by restart count.
    pub container_id: bool,
    /// Label extraction rules.
    pub labels: Vec<FieldExtractionRule>,
    /// Annotation extraction rules.
    pub annotations: Vec<FieldExtractionRule>,
}

impl ExtractionRules {
    pub(crate) fn needs_containers(&self) -> bool {
        self.container_image_name || self.container_image_tag || self.container_id
    }

    pub(crate) fn needs_namespaces(&self) -> bool {
        self.labels
            .iter()
            .chain(&self.annotations)
            .any(|rule| rule.from == MetadataSource::Namespace)
    }
}

/// Extracts one label or annotation into a record attribute.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldExtractionRule {
    /// The attribute name to write. Defaults to a name derived from the
    /// key, such as `k8s.pod.labels.<key>`.
    #[serde(default)]
    pub tag_name: Option<String>,

    /// The label or annotation key to read.
    pub key: String,

    /// Optional regular expression extracting a sub-string of the value.
    /// Must contain exactly one capture group named `value`.
    #[serde(default)]
    pub regex: Option<String>,

    /// Whether the field is read from the pod or from its namespace.
    #[serde(default)]
    pub from: MetadataSource,
}

/// The object a label or annotation is read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// Read from the pod metadata.
    #[default]
    Pod,
    /// Read from the metadata of the pod's namespace.
    Namespace,
}

/// Pods excluded from tagging.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Name patterns of pods to ignore.
    #[serde(default)]
    pub pods: Vec<ExcludePod>,
}

/// A pod name pattern to ignore.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExcludePod {
    /// A regular expression matched against the pod name.
    pub name: String,
}

/// An error building the pod cache from configuration.
#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    /// An exclude rule contains an invalid regular expression.
    #[error("invalid exclude pattern {pattern:?}")]
    InvalidExcludePattern {
        /// The offending pattern.
        pattern: String,
        /// The regex compilation failure.
        #[source]
        source: regex::Error,
    },

    /// A field extraction rule contains an invalid regular expression.
    #[error("invalid extraction regex for key {key:?}")]
    InvalidExtractionRegex {
        /// The key of the offending rule.
        key: String,
        /// The regex compilation failure.
        #[source]
        source: regex::Error,
    },

    /// A field extraction regex is missing the `value` capture group.
    #[error("extraction regex for key {key:?} is missing the `value` capture group")]
    MissingValueGroup {
        /// The key of the offending rule.
        key: String,
    },

    /// An association rule has more sources than an identifier can hold.
    #[error("association has {count} sources, the limit is {limit}")]
    TooManySources {
        /// The number of configured sources.
        count: usize,
        /// The maximum number of sources an identifier can hold.
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use crate::AttributeSource;

    use super::*;

    #[test]
    fn test_config_deserialize() {
        let json = serde_json::json!({
            "extract": {
                "podName": true,
                "namespace": true,
                "deployment": true,
                "labels": [
                    {"key": "app"},
                    {"tagName": "git.sha", "key": "ci.revision", "regex": "sha=(?P<value>\\w+)"}
                ],
                "annotations": [
                    {"key": "team", "from": "namespace"}
                ]
            },
            "associations": [
                {"sources": [{"from": "resource_attribute", "name": "k8s.pod.uid"}]},
                {"sources": [{"from": "connection"}]}
            ],
            "exclude": {"pods": [{"name": "agent-.*"}]},
            "gracePeriod": 60
        });

        let config: KubeConfig = serde_json::from_value(json).unwrap();

        assert!(config.extract.pod_name);
        assert!(config.extract.needs_namespaces());
        assert!(!config.extract.needs_containers());
        assert_eq!(config.associations.len(), 2);
        assert_eq!(config.associations[1].sources[0].from, AttributeSource::Connection);
        assert_eq!(config.grace_period, 60);
        assert_eq!(config.sweep_interval, 30);
    }
}
