//! Attribute keys written and read by the enrichment stage.

/// The namespace a pod runs in.
pub const ATTR_NAMESPACE_NAME: &str = "k8s.namespace.name";

/// The name of a pod.
pub const ATTR_POD_NAME: &str = "k8s.pod.name";

/// The unique id of a pod.
pub const ATTR_POD_UID: &str = "k8s.pod.uid";

/// The ip address of a pod.
pub const ATTR_POD_IP: &str = "k8s.pod.ip";

/// The start time of a pod.
pub const ATTR_POD_START_TIME: &str = "k8s.pod.start_time";

/// The deployment a pod belongs to, derived from the pod name.
pub const ATTR_DEPLOYMENT_NAME: &str = "k8s.deployment.name";

/// The node a pod is scheduled on.
pub const ATTR_NODE_NAME: &str = "k8s.node.name";

/// The host name reported by an entry, accepted as an alias for the pod
/// address in association rules.
pub const ATTR_HOST_NAME: &str = "host.name";

/// Pods carrying this annotation with the value `true` are ignored by the
/// cache: their records stay indexed but lookups report them as not found.
pub const IGNORE_ANNOTATION: &str = "sift.dev/ignore";
