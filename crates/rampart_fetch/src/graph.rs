//! Fetched-resource model.
//!
//! A [`Graph`] is the merged result of one fetch cycle: every
//! [`Resource`] produced by every fetch function, keyed by resource
//! type and id. Merging tolerates arbitrary arrival order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One fetched cloud resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type, e.g. `instance`.
    pub resource_type: String,
    /// Provider-assigned identifier.
    pub id: String,
    /// Attributes reported by the provider.
    pub properties: IndexMap<String, Json>,
}

impl Resource {
    /// Create a resource with no attributes.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            properties: IndexMap::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Json) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

fn qualified_key(resource_type: &str, id: &str) -> String {
    format!("{}|{}", resource_type, id)
}

/// The merged result of a fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    resources: IndexMap<String, Resource>,
}

impl Graph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one resource, replacing any previous resource with the
    /// same type and id.
    pub fn add_resource(&mut self, resource: Resource) {
        let key = qualified_key(&resource.resource_type, &resource.id);
        self.resources.insert(key, resource);
    }

    /// Insert many resources.
    pub fn add_resources(&mut self, resources: Vec<Resource>) {
        for resource in resources {
            self.add_resource(resource);
        }
    }

    /// All resources of the given type, in insertion order.
    #[must_use]
    pub fn find(&self, resource_type: &str) -> Vec<&Resource> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    /// The resource with the given type and id, if present.
    #[must_use]
    pub fn find_one(&self, resource_type: &str, id: &str) -> Option<&Resource> {
        self.resources.get(&qualified_key(resource_type, id))
    }

    /// Total number of resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Whether the graph holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Absorb every resource of `other`.
    pub fn merge(&mut self, other: Graph) {
        for (key, resource) in other.resources {
            self.resources.insert(key, resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_and_find_one() {
        let mut graph = Graph::new();
        graph.add_resource(Resource::new("instance", "inst_1"));

        assert!(graph.find_one("instance", "inst_1").is_some());
        assert!(graph.find_one("instance", "inst_2").is_none());
        assert!(graph.find_one("subnet", "inst_1").is_none());
    }

    #[test]
    fn test_find_filters_by_type() {
        let mut graph = Graph::new();
        graph.add_resources(vec![
            Resource::new("instance", "inst_1"),
            Resource::new("instance", "inst_2"),
            Resource::new("subnet", "sub_1"),
        ]);

        assert_eq!(graph.find("instance").len(), 2);
        assert_eq!(graph.find("subnet").len(), 1);
        assert!(graph.find("vpc").is_empty());
    }

    #[test]
    fn test_same_id_different_type_are_distinct() {
        let mut graph = Graph::new();
        graph.add_resource(Resource::new("instance", "shared"));
        graph.add_resource(Resource::new("subnet", "shared"));
        assert_eq!(graph.resource_count(), 2);
    }

    #[test]
    fn test_duplicate_insert_replaces() {
        let mut graph = Graph::new();
        graph.add_resource(Resource::new("instance", "inst_1"));
        graph.add_resource(
            Resource::new("instance", "inst_1").with_property("state", json!("running")),
        );

        assert_eq!(graph.resource_count(), 1);
        let res = graph.find_one("instance", "inst_1").unwrap();
        assert_eq!(res.properties.get("state"), Some(&json!("running")));
    }

    #[test]
    fn test_merge_is_order_tolerant() {
        let mut a = Graph::new();
        a.add_resource(Resource::new("instance", "inst_1"));
        let mut b = Graph::new();
        b.add_resource(Resource::new("subnet", "sub_1"));

        let mut forward = a.clone();
        forward.merge(b.clone());
        let mut backward = b;
        backward.merge(a);

        assert_eq!(forward.resource_count(), 2);
        assert_eq!(backward.resource_count(), 2);
        assert!(forward.find_one("subnet", "sub_1").is_some());
        assert!(backward.find_one("instance", "inst_1").is_some());
    }
}
