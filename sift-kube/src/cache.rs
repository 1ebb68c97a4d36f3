//! The multi-key-indexed pod metadata cache.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;

use crate::conventions;
use crate::{
    pod_identifiers, AssociationRule, Container, ExtractionRules, FieldExtractionRule, Identifier,
    KubeConfig, KubeError, MetadataSource, Namespace, NamespaceObject, Pod, PodObject,
    IDENTIFIER_MAX_SOURCES,
};

// Pod names follow `<deployment>-<replicaset suffix>-<pod suffix>`.
static DEPLOYMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)-[0-9a-zA-Z]*-[0-9a-zA-Z]*$").unwrap());

#[derive(Default)]
struct Maps {
    pods: HashMap<Identifier, Arc<Pod>>,
    namespaces: HashMap<String, Arc<Namespace>>,
}

#[derive(Debug)]
struct DeleteRequest {
    id: Identifier,
    pod_name: String,
    enqueued_at: DateTime<Utc>,
}

/// The concurrent, multi-key-indexed cache of pod and namespace metadata.
///
/// Pod records are indexed under every identifier resolved from the
/// configured association rules, plus the implicit pod uid and connection
/// address identifiers. Records are owned by the cache and only mutated by
/// its event handlers; lookups hand out shared read-only records.
///
/// Deletions are deferred: a delete event only schedules the eviction of
/// the record's identifiers, and the periodic [`sweep`](Self::sweep)
/// applies them once the grace period has elapsed. The deferral absorbs
/// out-of-order and duplicate event delivery around pod churn.
pub struct PodCache {
    maps: RwLock<Maps>,
    // Separate from the map lock so scheduling a deletion never blocks a
    // lookup on the enrichment hot path.
    delete_queue: Mutex<VecDeque<DeleteRequest>>,
    extract: ExtractionRules,
    associations: Vec<AssociationRule>,
    label_extractors: Vec<FieldExtractor>,
    annotation_extractors: Vec<FieldExtractor>,
    excludes: Vec<Regex>,
}

impl PodCache {
    /// Creates a cache from configuration.
    ///
    /// Fails on invalid exclude patterns, invalid extraction regexes and
    /// association rules exceeding the identifier arity.
    pub fn new(config: &KubeConfig) -> Result<Self, KubeError> {
        for association in &config.associations {
            if association.sources.len() > IDENTIFIER_MAX_SOURCES {
                return Err(KubeError::TooManySources {
                    count: association.sources.len(),
                    limit: IDENTIFIER_MAX_SOURCES,
                });
            }
        }

        let label_extractors = config
            .extract
            .labels
            .iter()
            .map(FieldExtractor::new)
            .collect::<Result<_, _>>()?;
        let annotation_extractors = config
            .extract
            .annotations
            .iter()
            .map(FieldExtractor::new)
            .collect::<Result<_, _>>()?;

        let excludes = config
            .exclude
            .pods
            .iter()
            .map(|pod| {
                Regex::new(&pod.name).map_err(|source| KubeError::InvalidExcludePattern {
                    pattern: pod.name.clone(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            maps: RwLock::new(Maps::default()),
            delete_queue: Mutex::new(VecDeque::new()),
            extract: config.extract.clone(),
            associations: config.associations.clone(),
            label_extractors,
            annotation_extractors,
            excludes,
        })
    }

    /// Indexes the pod under every identifier resolved from the
    /// association rules.
    ///
    /// An identifier already holding a record whose start time is not
    /// earlier than the incoming one keeps its record; the remaining
    /// identifiers of the incoming pod are still written. This protects
    /// against out-of-order update events re-attaching a stale record to a
    /// re-used address.
    pub fn upsert(&self, object: &PodObject) {
        let record = Arc::new(self.pod_from_object(object));
        let ids = pod_identifiers(&record, &self.associations);

        if ids.is_empty() {
            // Unreachable by lookup, but not an error.
            sift_log::debug!(pod = record.name.as_str(), "pod has no resolvable identifiers");
            return;
        }

        let mut maps = self.maps.write();
        for id in ids {
            if let Some(existing) = maps.pods.get(&id) {
                let incoming_is_stale = match (existing.start_time, record.start_time) {
                    (Some(existing_start), Some(incoming_start)) => {
                        existing_start >= incoming_start
                    }
                    (Some(_), None) => true,
                    _ => false,
                };

                if incoming_is_stale {
                    continue;
                }
            }

            maps.pods.insert(id, Arc::clone(&record));
        }
    }

    /// Returns the pod record for the given identifier.
    ///
    /// Records flagged as ignored are reported as not found.
    pub fn lookup(&self, id: &Identifier) -> Option<Arc<Pod>> {
        let maps = self.maps.read();
        let pod = maps.pods.get(id)?;

        if pod.ignore {
            return None;
        }

        Some(Arc::clone(pod))
    }

    /// Schedules the pod's identifiers for eviction.
    ///
    /// The maps are not touched here; [`sweep`](Self::sweep) applies the
    /// deletions once the grace period has passed, and only for
    /// identifiers still resolving to a record with the same name.
    pub fn forget(&self, object: &PodObject, now: DateTime<Utc>) {
        let record = self.pod_from_object(object);
        let ids = pod_identifiers(&record, &self.associations);

        let matching: Vec<Identifier> = {
            let maps = self.maps.read();
            ids.into_iter()
                .filter(|id| {
                    maps.pods
                        .get(id)
                        .is_some_and(|stored| stored.name == record.name)
                })
                .collect()
        };

        let mut queue = self.delete_queue.lock();
        for id in matching {
            queue.push_back(DeleteRequest {
                id,
                pod_name: record.name.clone(),
                enqueued_at: now,
            });
        }
    }

    /// Applies scheduled deletions whose grace period has elapsed.
    ///
    /// Requests are popped in order; enqueue timestamps are non-decreasing,
    /// so the first request still within the grace period ends the scan.
    /// The map lock is only taken for the already-computed removals.
    pub fn sweep(&self, now: DateTime<Utc>, grace_period: Duration) {
        let due: Vec<DeleteRequest> = {
            let mut queue = self.delete_queue.lock();
            let mut due = Vec::new();
            while queue
                .front()
                .is_some_and(|request| request.enqueued_at + grace_period <= now)
            {
                due.extend(queue.pop_front());
            }
            due
        };

        if due.is_empty() {
            return;
        }

        let mut maps = self.maps.write();
        for request in due {
            // The identifier may have been re-used by a newer pod in the
            // meantime; that write wins and the stale deletion is dropped.
            if maps
                .pods
                .get(&request.id)
                .is_some_and(|stored| stored.name == request.pod_name)
            {
                maps.pods.remove(&request.id);
            }
        }
    }

    /// Inserts or replaces a namespace record.
    ///
    /// Namespace events bypass the delete queue entirely: updates overwrite
    /// immediately and [`forget_namespace`](Self::forget_namespace) removes
    /// immediately.
    pub fn upsert_namespace(&self, object: &NamespaceObject) {
        if object.name.is_empty() {
            return;
        }

        // Namespace metadata is only resolved when a rule asks for it.
        let mut attributes = BTreeMap::new();
        if self.extract.needs_namespaces() {
            for extractor in namespace_extractors(&self.label_extractors) {
                extractor.extract_into(&object.labels, &mut attributes, "k8s.namespace.labels.");
            }
            for extractor in namespace_extractors(&self.annotation_extractors) {
                extractor.extract_into(
                    &object.annotations,
                    &mut attributes,
                    "k8s.namespace.annotations.",
                );
            }
        }

        let record = Namespace {
            name: object.name.clone(),
            uid: object.uid.clone(),
            start_time: object.start_time,
            attributes,
        };

        self.maps
            .write()
            .namespaces
            .insert(record.name.clone(), Arc::new(record));
    }

    /// Removes a namespace record immediately, with no grace period.
    pub fn forget_namespace(&self, name: &str) {
        self.maps.write().namespaces.remove(name);
    }

    /// Returns the namespace record for the given name.
    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.maps.read().namespaces.get(name).cloned()
    }

    /// Returns the number of identifier entries in the pod map.
    pub fn pod_count(&self) -> usize {
        self.maps.read().pods.len()
    }

    fn pod_from_object(&self, object: &PodObject) -> Pod {
        let mut pod = Pod {
            name: object.name.clone(),
            namespace: object.namespace.clone(),
            address: object.address.clone(),
            uid: object.uid.clone(),
            host_network: object.host_network,
            start_time: object.start_time,
            ..Default::default()
        };

        if self.should_ignore(object) {
            pod.ignore = true;
            return pod;
        }

        pod.attributes = self.extract_pod_attributes(object);
        if self.extract.needs_containers() {
            pod.containers = extract_container_attributes(&self.extract, object);
        }

        pod
    }

    fn should_ignore(&self, object: &PodObject) -> bool {
        if object
            .annotations
            .get(conventions::IGNORE_ANNOTATION)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
        {
            return true;
        }

        self.excludes
            .iter()
            .any(|pattern| pattern.is_match(&object.name))
    }

    fn extract_pod_attributes(&self, object: &PodObject) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();

        if self.extract.pod_name {
            tags.insert(conventions::ATTR_POD_NAME.to_owned(), object.name.clone());
        }

        if self.extract.namespace {
            tags.insert(
                conventions::ATTR_NAMESPACE_NAME.to_owned(),
                object.namespace.clone(),
            );
        }

        if self.extract.pod_uid {
            tags.insert(conventions::ATTR_POD_UID.to_owned(), object.uid.clone());
        }

        if self.extract.start_time {
            if let Some(start_time) = object.start_time {
                tags.insert(
                    conventions::ATTR_POD_START_TIME.to_owned(),
                    start_time.to_rfc3339(),
                );
            }
        }

        if self.extract.deployment {
            if let Some(deployment) = DEPLOYMENT_REGEX
                .captures(&object.name)
                .and_then(|captures| captures.get(1))
            {
                tags.insert(
                    conventions::ATTR_DEPLOYMENT_NAME.to_owned(),
                    deployment.as_str().to_owned(),
                );
            }
        }

        if self.extract.node && !object.node.is_empty() {
            tags.insert(conventions::ATTR_NODE_NAME.to_owned(), object.node.clone());
        }

        for extractor in pod_extractors(&self.label_extractors) {
            extractor.extract_into(&object.labels, &mut tags, "k8s.pod.labels.");
        }
        for extractor in pod_extractors(&self.annotation_extractors) {
            extractor.extract_into(&object.annotations, &mut tags, "k8s.pod.annotations.");
        }

        tags
    }
}

fn pod_extractors(extractors: &[FieldExtractor]) -> impl Iterator<Item = &FieldExtractor> {
    extractors
        .iter()
        .filter(|extractor| extractor.from == MetadataSource::Pod)
}

fn namespace_extractors(extractors: &[FieldExtractor]) -> impl Iterator<Item = &FieldExtractor> {
    extractors
        .iter()
        .filter(|extractor| extractor.from == MetadataSource::Namespace)
}

fn extract_container_attributes(
    rules: &ExtractionRules,
    object: &PodObject,
) -> BTreeMap<String, Container> {
    let mut containers: BTreeMap<String, Container> = BTreeMap::new();

    if rules.container_image_name || rules.container_image_tag {
        for spec in &object.containers {
            let container = containers.entry(spec.name.clone()).or_default();
            let (image_name, image_tag) = match spec.image.split_once(':') {
                Some((name, tag)) => (name, tag),
                None => (spec.image.as_str(), ""),
            };

            if rules.container_image_name {
                container.image_name = image_name.to_owned();
            }
            if rules.container_image_tag && !image_tag.is_empty() {
                container.image_tag = image_tag.to_owned();
            }
        }
    }

    if rules.container_id {
        for status in &object.container_statuses {
            let container = containers.entry(status.name.clone()).or_default();
            // Strip the container runtime prefix, e.g. `containerd://`.
            let id = match status.container_id.split_once("://") {
                Some((_, id)) => id,
                None => status.container_id.as_str(),
            };
            container
                .container_ids
                .insert(status.restart_count, id.to_owned());
        }
    }

    containers
}

struct FieldExtractor {
    tag_name: Option<String>,
    key: String,
    regex: Option<Regex>,
    from: MetadataSource,
}

impl FieldExtractor {
    fn new(rule: &FieldExtractionRule) -> Result<Self, KubeError> {
        let regex = match &rule.regex {
            Some(pattern) => {
                let regex =
                    Regex::new(pattern).map_err(|source| KubeError::InvalidExtractionRegex {
                        key: rule.key.clone(),
                        source,
                    })?;

                if !regex.capture_names().flatten().any(|name| name == "value") {
                    return Err(KubeError::MissingValueGroup {
                        key: rule.key.clone(),
                    });
                }

                Some(regex)
            }
            None => None,
        };

        Ok(Self {
            tag_name: rule.tag_name.clone(),
            key: rule.key.clone(),
            regex,
            from: rule.from,
        })
    }

    fn extract_into(
        &self,
        metadata: &BTreeMap<String, String>,
        tags: &mut BTreeMap<String, String>,
        prefix: &str,
    ) {
        let Some(raw) = metadata.get(&self.key) else {
            return;
        };

        let value = match &self.regex {
            Some(regex) => match regex.captures(raw).and_then(|captures| captures.name("value")) {
                Some(matched) => matched.as_str().to_owned(),
                None => return,
            },
            None => raw.clone(),
        };

        let tag = self
            .tag_name
            .clone()
            .unwrap_or_else(|| format!("{prefix}{}", self.key));
        tags.insert(tag, value);
    }
}
