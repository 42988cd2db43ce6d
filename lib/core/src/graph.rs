// Attribute ontology graph - canonical attribute nodes and the reserved edge relation
use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AttrId = u64;
pub type EdgeId = u64;

/// A canonical attribute cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttrNode {
    pub id: AttrId,
    pub label: String,
    pub centroid: Vector,
    /// Distinct labels merged into this node, in insertion order
    pub examples: Vec<String>,
}

impl AttrNode {
    #[inline]
    #[must_use]
    pub fn new(id: AttrId, label: String, centroid: Vector) -> Self {
        Self {
            id,
            examples: vec![label.clone()],
            label,
            centroid,
        }
    }

    /// Append `label` to the examples unless it is already present.
    /// Returns true if it was appended.
    pub fn add_example(&mut self, label: &str) -> bool {
        if label.is_empty() || self.examples.iter().any(|e| e == label) {
            return false;
        }
        self.examples.push(label.to_string());
        true
    }
}

/// Relation between two attribute nodes, also the tag an arbiter attaches
/// to its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    SimilarTo,
    AliasOf,
    #[default]
    None,
}

impl Relation {
    /// Lenient parse of an arbiter tag; anything unrecognised is `None`
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "SIMILAR_TO" => Relation::SimilarTo,
            "ALIAS_OF" => Relation::AliasOf,
            _ => Relation::None,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::SimilarTo => write!(f, "SIMILAR_TO"),
            Relation::AliasOf => write!(f, "ALIAS_OF"),
            Relation::None => write!(f, "NONE"),
        }
    }
}

/// Node-to-node relation. Persisted but not written by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub src: AttrId,
    pub dst: AttrId,
    pub relation: Relation,
    pub weight: f32,
    pub payload: Option<serde_json::Value>,
}

impl Edge {
    #[inline]
    #[must_use]
    pub fn new(id: EdgeId, src: AttrId, dst: AttrId, relation: Relation, weight: f32) -> Self {
        Self {
            id,
            src,
            dst,
            relation,
            weight,
            payload: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_examples_are_distinct_and_ordered() {
        let mut node = AttrNode::new(1, "сечение".into(), Vector::new(vec![1.0]));
        assert!(node.add_example("площадь сечения"));
        assert!(!node.add_example("сечение"));
        assert!(node.add_example("cross section"));
        assert_eq!(node.examples, vec!["сечение", "площадь сечения", "cross section"]);
    }

    #[test]
    fn test_relation_parse() {
        assert_eq!(Relation::parse("alias_of"), Relation::AliasOf);
        assert_eq!(Relation::parse(" SIMILAR_TO "), Relation::SimilarTo);
        assert_eq!(Relation::parse("whatever"), Relation::None);
        assert_eq!(Relation::AliasOf.to_string(), "ALIAS_OF");
    }
}
