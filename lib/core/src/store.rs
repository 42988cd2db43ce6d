//! Repository interface over items, occurrences, attribute nodes, edges and
//! saved filters, plus an in-memory implementation.
//!
//! Backends must return attribute nodes and saved filters in storage order
//! (creation order; a replaced filter keeps its position). Resolver
//! tie-breaks and SINGLE_BEST assignment depend on it.

use crate::filter::{FilterId, SavedFilter};
use crate::graph::{AttrId, AttrNode, Edge, EdgeId, Relation};
use crate::item::{Item, Occurrence};
use crate::vector::Vector;
use crate::{Error, Result};
use ahash::AHashMap;
use parking_lot::RwLock;

pub trait Store: Send + Sync {
    /// Insert or fully replace an item
    fn upsert_item(&self, item: Item) -> Result<()>;

    fn item(&self, id: &str) -> Result<Option<Item>>;

    fn items(&self) -> Result<Vec<Item>>;

    /// Append occurrences; existing rows are never touched
    fn add_occurrences(&self, occurrences: Vec<Occurrence>) -> Result<()>;

    fn occurrences(&self, item_id: &str) -> Result<Vec<Occurrence>>;

    /// All attribute nodes in storage order
    fn attr_nodes(&self) -> Result<Vec<AttrNode>>;

    fn attr_node(&self, id: AttrId) -> Result<Option<AttrNode>>;

    /// Create a node whose examples are `[label]`
    fn create_attr_node(&self, label: &str, centroid: Vector) -> Result<AttrId>;

    /// Replace the centroid and append `example` if it is new
    fn update_attr_node(&self, id: AttrId, centroid: Vector, example: &str) -> Result<()>;

    /// Both endpoints must be existing attribute nodes, otherwise
    /// `Error::NotFound` and nothing is written
    fn add_edge(
        &self,
        src: AttrId,
        dst: AttrId,
        relation: Relation,
        weight: f32,
        payload: Option<serde_json::Value>,
    ) -> Result<EdgeId>;

    fn edges(&self) -> Result<Vec<Edge>>;

    /// Insert or fully replace a saved filter
    fn save_filter(&self, filter: SavedFilter) -> Result<()>;

    fn filter(&self, id: &str) -> Result<Option<SavedFilter>>;

    /// All saved filters in storage order
    fn filters(&self) -> Result<Vec<SavedFilter>>;
}

#[derive(Default)]
struct MemoryTables {
    items: Vec<Item>,
    item_index: AHashMap<String, usize>,
    occurrences: AHashMap<String, Vec<Occurrence>>,
    nodes: Vec<AttrNode>,
    edges: Vec<Edge>,
    filters: Vec<SavedFilter>,
    filter_index: AHashMap<FilterId, usize>,
}

/// Process-local store; node ids start at 1 and follow creation order
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn upsert_item(&self, item: Item) -> Result<()> {
        let mut t = self.tables.write();
        let existing = t.item_index.get(&item.id).copied();
        match existing {
            Some(pos) => t.items[pos] = item,
            None => {
                let pos = t.items.len();
                t.item_index.insert(item.id.clone(), pos);
                t.items.push(item);
            }
        }
        Ok(())
    }

    fn item(&self, id: &str) -> Result<Option<Item>> {
        let t = self.tables.read();
        Ok(t.item_index.get(id).map(|&pos| t.items[pos].clone()))
    }

    fn items(&self) -> Result<Vec<Item>> {
        Ok(self.tables.read().items.clone())
    }

    fn add_occurrences(&self, occurrences: Vec<Occurrence>) -> Result<()> {
        let mut t = self.tables.write();
        for occ in occurrences {
            t.occurrences.entry(occ.item_id.clone()).or_default().push(occ);
        }
        Ok(())
    }

    fn occurrences(&self, item_id: &str) -> Result<Vec<Occurrence>> {
        Ok(self
            .tables
            .read()
            .occurrences
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    fn attr_nodes(&self) -> Result<Vec<AttrNode>> {
        Ok(self.tables.read().nodes.clone())
    }

    fn attr_node(&self, id: AttrId) -> Result<Option<AttrNode>> {
        Ok(self.tables.read().nodes.iter().find(|n| n.id == id).cloned())
    }

    fn create_attr_node(&self, label: &str, centroid: Vector) -> Result<AttrId> {
        let mut t = self.tables.write();
        let id = t.nodes.len() as AttrId + 1;
        t.nodes.push(AttrNode::new(id, label.to_string(), centroid));
        Ok(id)
    }

    fn update_attr_node(&self, id: AttrId, centroid: Vector, example: &str) -> Result<()> {
        let mut t = self.tables.write();
        let node = t
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::NotFound(format!("attribute node {}", id)))?;
        node.centroid = centroid;
        node.add_example(example);
        Ok(())
    }

    fn add_edge(
        &self,
        src: AttrId,
        dst: AttrId,
        relation: Relation,
        weight: f32,
        payload: Option<serde_json::Value>,
    ) -> Result<EdgeId> {
        let mut t = self.tables.write();
        if let Some(missing) = [src, dst].into_iter().find(|&n| !t.nodes.iter().any(|node| node.id == n)) {
            return Err(Error::NotFound(format!("attribute node {}", missing)));
        }
        let id = t.edges.len() as EdgeId + 1;
        let mut edge = Edge::new(id, src, dst, relation, weight);
        edge.payload = payload;
        t.edges.push(edge);
        Ok(id)
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self.tables.read().edges.clone())
    }

    fn save_filter(&self, filter: SavedFilter) -> Result<()> {
        let mut t = self.tables.write();
        let existing = t.filter_index.get(&filter.id).copied();
        match existing {
            Some(pos) => t.filters[pos] = filter,
            None => {
                let pos = t.filters.len();
                t.filter_index.insert(filter.id.clone(), pos);
                t.filters.push(filter);
            }
        }
        Ok(())
    }

    fn filter(&self, id: &str) -> Result<Option<SavedFilter>> {
        let t = self.tables.read();
        Ok(t.filter_index.get(id).map(|&pos| t.filters[pos].clone()))
    }

    fn filters(&self) -> Result<Vec<SavedFilter>> {
        Ok(self.tables.read().filters.clone())
    }
}
