//! Label → attribute node lookup, used when clauses match occurrences
//! through the ontology rather than by raw label.

use crate::graph::{AttrId, AttrNode};
use crate::store::Store;
use crate::Result;
use ahash::AHashMap;

/// Snapshot of every node's label and examples, keyed case-insensitively.
/// A label claimed by several nodes maps to the earliest one.
#[derive(Debug, Clone, Default)]
pub struct AttributeIndex {
    by_label: AHashMap<String, AttrId>,
}

impl AttributeIndex {
    pub fn from_nodes(nodes: &[AttrNode]) -> Self {
        let mut by_label = AHashMap::new();
        for node in nodes {
            for label in std::iter::once(&node.label).chain(node.examples.iter()) {
                by_label.entry(normalize(label)).or_insert(node.id);
            }
        }
        Self { by_label }
    }

    pub fn load(store: &dyn Store) -> Result<Self> {
        Ok(Self::from_nodes(&store.attr_nodes()?))
    }

    pub fn node_for(&self, label: &str) -> Option<AttrId> {
        self.by_label.get(&normalize(label)).copied()
    }

    /// True when both labels are known and belong to the same node
    pub fn same_attribute(&self, a: &str, b: &str) -> bool {
        match (self.node_for(a), self.node_for(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

/// Key under which labels compare equal: trimmed and lower-cased
pub fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Vector;

    #[test]
    fn test_examples_share_node() {
        let mut cross_section = AttrNode::new(1, "Площадь сечения".to_string(), Vector::new(vec![1.0]));
        cross_section.add_example("сечение");
        let color = AttrNode::new(2, "цвет".to_string(), Vector::new(vec![0.0]));

        let index = AttributeIndex::from_nodes(&[cross_section, color]);
        assert_eq!(index.node_for("площадь сечения"), Some(1));
        assert!(index.same_attribute("СЕЧЕНИЕ", "площадь сечения"));
        assert!(!index.same_attribute("сечение", "цвет"));
        assert!(!index.same_attribute("сечение", "unknown"));
    }

    #[test]
    fn test_earliest_node_claims_shared_label() {
        let mut a = AttrNode::new(1, "a".to_string(), Vector::new(vec![1.0]));
        a.add_example("shared");
        let mut b = AttrNode::new(2, "b".to_string(), Vector::new(vec![1.0]));
        b.add_example("shared");

        let index = AttributeIndex::from_nodes(&[a, b]);
        assert_eq!(index.node_for("shared"), Some(1));
    }
}
