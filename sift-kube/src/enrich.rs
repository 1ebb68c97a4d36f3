//! Merging cached pod metadata into entries.

use std::sync::Arc;

use sift_protocol::{AttrValue, Entry};

use crate::conventions;
use crate::{AttributeSource, Identifier, IdentifierAttr, KubeConfig, PodCache, Pod};

/// Enriches entries with the metadata of the pod they originate from.
///
/// The enricher resolves lookup identifiers from the entry through the same
/// association rules the cache indexes pods under: resource attribute
/// sources read the entry's attributes, connection sources read the peer
/// address the entry arrived on. The first identifier that resolves wins.
///
/// Merging never overwrites attributes the entry already carries.
pub struct Enricher {
    cache: Arc<PodCache>,
    config: KubeConfig,
}

impl Enricher {
    /// Creates an enricher reading from the given cache.
    pub fn new(cache: Arc<PodCache>, config: KubeConfig) -> Self {
        Self { cache, config }
    }

    /// Annotates the entry with pod and namespace metadata.
    ///
    /// In passthrough mode only the connection address is attached and no
    /// lookup is performed.
    pub fn enrich<E: Entry + ?Sized>(&self, entry: &mut E) {
        if self.config.passthrough {
            if let Some(address) = entry.peer_addr().filter(|addr| !addr.is_empty()) {
                let address = address.to_owned();
                entry.set_attribute(conventions::ATTR_POD_IP, AttrValue::from(address));
            }
            return;
        }

        let Some(pod) = self.find_pod(entry) else {
            return;
        };

        merge(entry, &pod.attributes);

        if let Some(namespace) = self.cache.namespace(&pod.namespace) {
            merge(entry, &namespace.attributes);
        }
    }

    /// Returns the cached pod record for the entry, if any.
    pub fn find_pod<E: Entry + ?Sized>(&self, entry: &E) -> Option<Arc<Pod>> {
        self.identifiers(entry)
            .into_iter()
            .find_map(|id| self.cache.lookup(&id))
    }

    fn identifiers<E: Entry + ?Sized>(&self, entry: &E) -> Vec<Identifier> {
        let mut ids = Vec::new();

        for rule in &self.config.associations {
            let mut attrs = Vec::with_capacity(rule.sources.len());
            let mut skip = false;

            for source in &rule.sources {
                let value = match source.from {
                    AttributeSource::Connection => {
                        entry.peer_addr().map(str::to_owned).unwrap_or_default()
                    }
                    AttributeSource::ResourceAttribute => entry
                        .attribute(&source.name)
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                };

                if value.is_empty() {
                    skip = true;
                    break;
                }

                attrs.push(IdentifierAttr::new(source.from, &source.name, &value));
            }

            if !skip {
                ids.push(Identifier::from_attrs(attrs));
            }
        }

        // The implicit identifiers mirror the cache side, preserving
        // lookups that work without any configured association.
        if let Some(uid) = entry
            .attribute(conventions::ATTR_POD_UID)
            .and_then(AttrValue::as_str)
        {
            ids.push(Identifier::resource_attribute(conventions::ATTR_POD_UID, uid));
        }

        if let Some(address) = entry.peer_addr().filter(|addr| !addr.is_empty()) {
            ids.push(Identifier::connection(address));
        }

        ids
    }
}

fn merge<E: Entry + ?Sized>(entry: &mut E, attributes: &std::collections::BTreeMap<String, String>) {
    for (key, value) in attributes {
        if entry.attribute(key).is_none() {
            entry.set_attribute(key, AttrValue::from(value.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use sift_protocol::{LogRecord, Span, SpanStatus, TraceId};
    use similar_asserts::assert_eq;

    use crate::{
        AssociationRule, AssociationSource, ExtractionRules, FieldExtractionRule, MetadataSource,
        NamespaceObject, PodObject,
    };

    use super::*;

    fn config() -> KubeConfig {
        KubeConfig {
            extract: ExtractionRules {
                pod_name: true,
                namespace: true,
                annotations: vec![FieldExtractionRule {
                    tag_name: None,
                    key: "team".to_owned(),
                    regex: None,
                    from: MetadataSource::Namespace,
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn populated_cache(config: &KubeConfig) -> Arc<PodCache> {
        let cache = Arc::new(PodCache::new(config).unwrap());

        cache.upsert(&PodObject {
            name: "web-1".to_owned(),
            namespace: "shop".to_owned(),
            uid: "uid-1".to_owned(),
            address: "10.0.0.1".to_owned(),
            start_time: Some(Utc::now()),
            ..Default::default()
        });

        let mut namespace = NamespaceObject {
            name: "shop".to_owned(),
            ..Default::default()
        };
        namespace
            .annotations
            .insert("team".to_owned(), "payments".to_owned());
        cache.upsert_namespace(&namespace);

        cache
    }

    fn span(peer_addr: Option<&str>) -> Span {
        Span {
            trace_id: TraceId::from_u128(1),
            name: "GET /checkout".to_owned(),
            status: SpanStatus::Unset,
            attributes: BTreeMap::new(),
            trace_state: None,
            start_time: Utc::now(),
            peer_addr: peer_addr.map(str::to_owned),
        }
    }

    #[test]
    fn test_enrich_by_connection_address() {
        let config = config();
        let enricher = Enricher::new(populated_cache(&config), config);

        let mut span = span(Some("10.0.0.1"));
        enricher.enrich(&mut span);

        assert_eq!(
            span.attributes["k8s.pod.name"],
            AttrValue::from("web-1")
        );
        assert_eq!(
            span.attributes["k8s.namespace.annotations.team"],
            AttrValue::from("payments")
        );
    }

    #[test]
    fn test_enrich_keeps_existing_attributes() {
        let config = config();
        let enricher = Enricher::new(populated_cache(&config), config);

        let mut span = span(Some("10.0.0.1"));
        span.attributes.insert(
            "k8s.pod.name".to_owned(),
            AttrValue::from("already-set"),
        );
        enricher.enrich(&mut span);

        assert_eq!(
            span.attributes["k8s.pod.name"],
            AttrValue::from("already-set")
        );
    }

    #[test]
    fn test_enrich_by_resource_attribute_association() {
        let mut config = config();
        config.associations = vec![AssociationRule {
            sources: vec![AssociationSource {
                from: AttributeSource::ResourceAttribute,
                name: "k8s.pod.uid".to_owned(),
            }],
        }];
        let enricher = Enricher::new(populated_cache(&config), config);

        // No usable connection address, only the uid attribute.
        let mut record = LogRecord {
            body: "payment failed".to_owned(),
            attributes: BTreeMap::new(),
            timestamp: Utc::now(),
            peer_addr: None,
        };
        record
            .attributes
            .insert("k8s.pod.uid".to_owned(), AttrValue::from("uid-1"));

        enricher.enrich(&mut record);

        assert_eq!(
            record.attributes["k8s.pod.name"],
            AttrValue::from("web-1")
        );
    }

    #[test]
    fn test_unknown_entry_is_left_unchanged() {
        let config = config();
        let enricher = Enricher::new(populated_cache(&config), config);

        let mut span = span(Some("10.9.9.9"));
        enricher.enrich(&mut span);

        assert!(span.attributes.is_empty());
    }

    #[test]
    fn test_passthrough_only_tags_the_address() {
        let mut config = config();
        config.passthrough = true;
        let enricher = Enricher::new(populated_cache(&config), config);

        let mut span = span(Some("10.0.0.1"));
        enricher.enrich(&mut span);

        assert_eq!(
            span.attributes,
            BTreeMap::from([("k8s.pod.ip".to_owned(), AttrValue::from("10.0.0.1"))])
        );
    }
}
