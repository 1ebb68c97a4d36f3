//! Pod and namespace records and the boundary objects they are built from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The pod object delivered by the external informer layer.
///
/// This is the boundary shape of the watch stream; the cache turns it into
/// a [`Pod`] record by applying the configured extraction rules.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodObject {
    /// The pod name.
    pub name: String,
    /// The namespace the pod runs in.
    pub namespace: String,
    /// The unique id of the pod.
    pub uid: String,
    /// The pod ip address. Empty until assigned.
    pub address: String,
    /// Whether the pod shares the node's network namespace.
    pub host_network: bool,
    /// When the pod was started.
    pub start_time: Option<DateTime<Utc>>,
    /// The node the pod is scheduled on.
    pub node: String,
    /// The pod labels.
    pub labels: BTreeMap<String, String>,
    /// The pod annotations.
    pub annotations: BTreeMap<String, String>,
    /// The declared containers, including init containers.
    pub containers: Vec<ContainerSpec>,
    /// The observed container statuses.
    pub container_statuses: Vec<ContainerStatusObject>,
}

/// A declared container of a [`PodObject`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerSpec {
    /// The container name.
    pub name: String,
    /// The image reference, `name[:tag]`.
    pub image: String,
}

/// An observed container status of a [`PodObject`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerStatusObject {
    /// The container name.
    pub name: String,
    /// The container id, optionally prefixed with the runtime scheme.
    pub container_id: String,
    /// How often the container restarted.
    pub restart_count: u32,
}

/// The namespace object delivered by the external informer layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NamespaceObject {
    /// The namespace name.
    pub name: String,
    /// The unique id of the namespace.
    pub uid: String,
    /// When the namespace was created.
    pub start_time: Option<DateTime<Utc>>,
    /// The namespace labels.
    pub labels: BTreeMap<String, String>,
    /// The namespace annotations.
    pub annotations: BTreeMap<String, String>,
}

/// A cached pod record.
///
/// Owned exclusively by the cache; consumers receive shared read-only
/// handles and never mutate a record.
#[derive(Clone, Debug, Default)]
pub struct Pod {
    /// The pod name.
    pub name: String,
    /// The namespace the pod runs in.
    pub namespace: String,
    /// The pod ip address.
    pub address: String,
    /// The unique id of the pod.
    pub uid: String,
    /// Whether the pod shares the node's network namespace.
    pub host_network: bool,
    /// When the pod was started. Used as the tie-break against stale
    /// writes when identifiers collide.
    pub start_time: Option<DateTime<Utc>>,
    /// The attributes extracted per the configured rules.
    pub attributes: BTreeMap<String, String>,
    /// Extracted container information, keyed by container name.
    pub containers: BTreeMap<String, Container>,
    /// Whether the pod matched an exclusion rule. Ignored pods are
    /// reported as not found by lookups.
    pub ignore: bool,
}

/// Extracted information about one container of a pod.
#[derive(Clone, Debug, Default)]
pub struct Container {
    /// The image name, without the tag.
    pub image_name: String,
    /// The image tag, when present in the image reference.
    pub image_tag: String,
    /// Container ids keyed by restart count.
    pub container_ids: BTreeMap<u32, String>,
}

/// A cached namespace record.
#[derive(Clone, Debug, Default)]
pub struct Namespace {
    /// The namespace name.
    pub name: String,
    /// The unique id of the namespace.
    pub uid: String,
    /// When the namespace was created.
    pub start_time: Option<DateTime<Utc>>,
    /// The attributes extracted per the configured rules.
    pub attributes: BTreeMap<String, String>,
}
