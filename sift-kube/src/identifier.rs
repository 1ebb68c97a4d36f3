use serde::{Deserialize, Serialize};

use crate::conventions;
use crate::record::Pod;

/// The maximum number of sources in a single association rule.
pub const IDENTIFIER_MAX_SOURCES: usize = 4;

/// Where an identifier attribute value is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    /// The network address of the connection the entry arrived on.
    Connection,
    /// An attribute carried by the entry itself.
    ResourceAttribute,
}

/// One (source kind, attribute name, value) element of an [`Identifier`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentifierAttr {
    source: AttributeSource,
    name: String,
    value: String,
}

impl IdentifierAttr {
    /// Creates a new identifier attribute.
    pub fn new(source: AttributeSource, name: &str, value: &str) -> Self {
        Self {
            source,
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }
}

/// A cache lookup key: an ordered, fixed-length tuple of identifier
/// attributes.
///
/// Identifiers compare by the full ordered tuple. Two identifiers holding
/// the same attributes in a different order are distinct keys; the order of
/// sources in the association rule is part of the identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Identifier([Option<IdentifierAttr>; IDENTIFIER_MAX_SOURCES]);

impl Identifier {
    /// Creates an identifier from attributes, in order.
    ///
    /// Attributes beyond [`IDENTIFIER_MAX_SOURCES`] are not representable;
    /// association rules are validated against that limit at construction.
    pub fn from_attrs(attrs: impl IntoIterator<Item = IdentifierAttr>) -> Self {
        let mut slots: [Option<IdentifierAttr>; IDENTIFIER_MAX_SOURCES] = Default::default();
        for (slot, attr) in slots.iter_mut().zip(attrs) {
            *slot = Some(attr);
        }
        Self(slots)
    }

    /// The implicit single-attribute identifier for a connection address.
    pub fn connection(address: &str) -> Self {
        Self::from_attrs([IdentifierAttr::new(
            AttributeSource::Connection,
            "connection",
            address,
        )])
    }

    /// The implicit single-attribute identifier for a resource attribute.
    pub fn resource_attribute(name: &str, value: &str) -> Self {
        Self::from_attrs([IdentifierAttr::new(
            AttributeSource::ResourceAttribute,
            name,
            value,
        )])
    }
}

/// A configured rule describing how a lookup identifier is derived.
///
/// A rule only emits an identifier when every source resolves to a
/// non-empty value; otherwise the whole rule is skipped for that resource
/// or entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssociationRule {
    /// The ordered sources making up the identifier.
    pub sources: Vec<AssociationSource>,
}

/// A single source of an [`AssociationRule`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssociationSource {
    /// Where the value is taken from.
    pub from: AttributeSource,

    /// The attribute name. Unused for connection sources.
    #[serde(default)]
    pub name: String,
}

/// Resolves the identifiers a pod record is indexed under.
///
/// In addition to the configured associations, two implicit identifiers are
/// appended when resolvable, the pod uid and the bare connection address,
/// to preserve backward compatible lookups.
pub fn pod_identifiers(pod: &Pod, rules: &[AssociationRule]) -> Vec<Identifier> {
    let mut ids = Vec::new();

    for rule in rules {
        let mut attrs = Vec::with_capacity(rule.sources.len());
        let mut skip = false;

        for source in &rule.sources {
            let value = match source.from {
                // Host network pods share the node address, so address
                // based association is not usable for them.
                AttributeSource::Connection if pod.address.is_empty() || pod.host_network => None,
                AttributeSource::Connection => Some(pod.address.clone()),
                AttributeSource::ResourceAttribute => resource_attribute(pod, &source.name),
            };

            match value {
                Some(value) if !value.is_empty() => {
                    attrs.push(IdentifierAttr::new(source.from, &source.name, &value))
                }
                // An unresolved source skips the whole rule instead of
                // emitting an identifier with an empty slot.
                _ => {
                    skip = true;
                    break;
                }
            }
        }

        if !skip {
            ids.push(Identifier::from_attrs(attrs));
        }
    }

    if !pod.uid.is_empty() {
        ids.push(Identifier::resource_attribute(
            conventions::ATTR_POD_UID,
            &pod.uid,
        ));
    }

    if !pod.address.is_empty() && !pod.host_network {
        ids.push(Identifier::connection(&pod.address));
    }

    ids
}

fn resource_attribute(pod: &Pod, name: &str) -> Option<String> {
    match name {
        conventions::ATTR_NAMESPACE_NAME => Some(pod.namespace.clone()),
        conventions::ATTR_POD_NAME => Some(pod.name.clone()),
        conventions::ATTR_POD_UID => Some(pod.uid.clone()),
        conventions::ATTR_HOST_NAME => Some(pod.address.clone()),
        _ => pod.attributes.get(name).cloned(),
    }
}
