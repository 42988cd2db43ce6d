// LMDB-backed Store: one environment, one named database per table
use anyhow::Context as _;
use heed::byteorder::BE;
use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use ontomatch_core::{
    AttrId, AttrNode, Edge, EdgeId, Error, Item, Occurrence, Relation, Result,
    SavedFilter, Store, Vector,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DB_ITEMS: &str = "items";
const DB_ITEM_INDEX: &str = "item_index";
const DB_OCCURRENCES: &str = "occurrences";
const DB_ATTR_NODES: &str = "attr_nodes";
const DB_EDGES: &str = "edges";
const DB_FILTERS: &str = "filters";
const DB_FILTER_INDEX: &str = "filter_index";
const DB_META: &str = "meta";

const SEQ_ITEMS: &str = "items";
const SEQ_OCCURRENCES: &str = "occurrences";
const SEQ_NODES: &str = "attr_nodes";
const SEQ_EDGES: &str = "edges";
const SEQ_FILTERS: &str = "filters";

/// Separates item id from sequence number in occurrence keys
const KEY_SEPARATOR: char = '\u{1f}';

pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024; // 1GB

type BEU64 = U64<BE>;

/// Items and filters are keyed by a sequence number and found through an
/// id index, so iteration follows insertion order and a replaced row keeps
/// its position. Occurrences are keyed `{item_id}\x1f{seq:020}`.
pub struct LmdbStore {
    env: Env,
    path: PathBuf,
    items_db: Database<BEU64, Bytes>,
    item_index: Database<Str, BEU64>,
    occurrences_db: Database<Str, Bytes>,
    nodes_db: Database<BEU64, Bytes>,
    edges_db: Database<BEU64, Bytes>,
    filters_db: Database<BEU64, Bytes>,
    filter_index: Database<Str, BEU64>,
    meta_db: Database<Str, BEU64>,
}

impl LmdbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size<P: AsRef<Path>>(path: P, map_size: usize) -> Result<Self> {
        Self::open_inner(path.as_ref(), map_size).map_err(storage)
    }

    fn open_inner(path: &Path, map_size: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating {}", path.display()))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(16)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let items_db = env.create_database(&mut wtxn, Some(DB_ITEMS))?;
        let item_index = env.create_database(&mut wtxn, Some(DB_ITEM_INDEX))?;
        let occurrences_db = env.create_database(&mut wtxn, Some(DB_OCCURRENCES))?;
        let nodes_db = env.create_database(&mut wtxn, Some(DB_ATTR_NODES))?;
        let edges_db = env.create_database(&mut wtxn, Some(DB_EDGES))?;
        let filters_db = env.create_database(&mut wtxn, Some(DB_FILTERS))?;
        let filter_index = env.create_database(&mut wtxn, Some(DB_FILTER_INDEX))?;
        let meta_db = env.create_database(&mut wtxn, Some(DB_META))?;
        wtxn.commit()?;

        info!(path = %path.display(), "opened LMDB store");

        Ok(Self {
            env,
            path: path.to_path_buf(),
            items_db,
            item_index,
            occurrences_db,
            nodes_db,
            edges_db,
            filters_db,
            filter_index,
            meta_db,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the memory map to disk
    pub fn sync(&self) -> Result<()> {
        self.env.force_sync().map_err(|e| storage(e.into()))
    }

    fn next_seq(&self, wtxn: &mut RwTxn, counter: &str) -> anyhow::Result<u64> {
        let next = self.meta_db.get(wtxn, counter)?.unwrap_or(0) + 1;
        self.meta_db.put(wtxn, counter, &next)?;
        Ok(next)
    }

    /// Write `bytes` under the sequence number of `key`, allocating one if new
    fn put_ordered(
        &self,
        wtxn: &mut RwTxn,
        data: Database<BEU64, Bytes>,
        index: Database<Str, BEU64>,
        counter: &str,
        key: &str,
        bytes: &[u8],
    ) -> anyhow::Result<()> {
        let seq = match index.get(wtxn, key)? {
            Some(seq) => seq,
            None => {
                let seq = self.next_seq(wtxn, counter)?;
                index.put(wtxn, key, &seq)?;
                seq
            }
        };
        data.put(wtxn, &seq, bytes)?;
        Ok(())
    }

    fn get_ordered(
        &self,
        rtxn: &RoTxn,
        data: Database<BEU64, Bytes>,
        index: Database<Str, BEU64>,
        key: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        match index.get(rtxn, key)? {
            Some(seq) => Ok(data.get(rtxn, &seq)?.map(<[u8]>::to_vec)),
            None => Ok(None),
        }
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RwTxn) -> anyhow::Result<T>,
    {
        let run = || -> anyhow::Result<T> {
            let mut wtxn = self.env.write_txn()?;
            let value = f(&mut wtxn)?;
            wtxn.commit()?;
            Ok(value)
        };
        run().map_err(storage)
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RoTxn) -> anyhow::Result<T>,
    {
        let run = || -> anyhow::Result<T> {
            let rtxn = self.env.read_txn()?;
            f(&rtxn)
        };
        run().map_err(storage)
    }
}

fn storage(e: anyhow::Error) -> Error {
    Error::Storage(format!("{:#}", e))
}

fn encode<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

// Edges and filters carry untyped JSON, which bincode cannot read back
fn encode_json<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn occurrence_prefix(item_id: &str) -> String {
    format!("{}{}", item_id, KEY_SEPARATOR)
}

impl Store for LmdbStore {
    fn upsert_item(&self, item: Item) -> Result<()> {
        self.write(|wtxn| {
            let bytes = encode(&item)?;
            self.put_ordered(wtxn, self.items_db, self.item_index, SEQ_ITEMS, &item.id, &bytes)
        })
    }

    fn item(&self, id: &str) -> Result<Option<Item>> {
        self.read(|rtxn| {
            self.get_ordered(rtxn, self.items_db, self.item_index, id)?
                .map(|bytes| decode(&bytes))
                .transpose()
        })
    }

    fn items(&self) -> Result<Vec<Item>> {
        self.read(|rtxn| {
            let mut items = Vec::new();
            for entry in self.items_db.iter(rtxn)? {
                let (_, bytes) = entry?;
                items.push(decode(bytes)?);
            }
            Ok(items)
        })
    }

    fn add_occurrences(&self, occurrences: Vec<Occurrence>) -> Result<()> {
        if occurrences.is_empty() {
            return Ok(());
        }
        let count = occurrences.len();
        self.write(|wtxn| {
            for occ in &occurrences {
                let seq = self.next_seq(wtxn, SEQ_OCCURRENCES)?;
                let key = format!("{}{:020}", occurrence_prefix(&occ.item_id), seq);
                self.occurrences_db.put(wtxn, &key, &encode(occ)?)?;
            }
            Ok(())
        })?;
        debug!(count, "appended occurrences");
        Ok(())
    }

    fn occurrences(&self, item_id: &str) -> Result<Vec<Occurrence>> {
        self.read(|rtxn| {
            let prefix = occurrence_prefix(item_id);
            let mut occurrences = Vec::new();
            for entry in self.occurrences_db.prefix_iter(rtxn, &prefix)? {
                let (_, bytes) = entry?;
                occurrences.push(decode(bytes)?);
            }
            Ok(occurrences)
        })
    }

    fn attr_nodes(&self) -> Result<Vec<AttrNode>> {
        self.read(|rtxn| {
            let mut nodes = Vec::new();
            for entry in self.nodes_db.iter(rtxn)? {
                let (_, bytes) = entry?;
                nodes.push(decode(bytes)?);
            }
            Ok(nodes)
        })
    }

    fn attr_node(&self, id: AttrId) -> Result<Option<AttrNode>> {
        self.read(|rtxn| self.nodes_db.get(rtxn, &id)?.map(decode).transpose())
    }

    fn create_attr_node(&self, label: &str, centroid: Vector) -> Result<AttrId> {
        self.write(|wtxn| {
            let id = self.next_seq(wtxn, SEQ_NODES)?;
            let node = AttrNode::new(id, label.to_string(), centroid);
            self.nodes_db.put(wtxn, &id, &encode(&node)?)?;
            Ok(id)
        })
    }

    fn update_attr_node(&self, id: AttrId, centroid: Vector, example: &str) -> Result<()> {
        let found = self.write(|wtxn| {
            let Some(bytes) = self.nodes_db.get(wtxn, &id)? else {
                return Ok(false);
            };
            let mut node: AttrNode = decode(bytes)?;
            node.centroid = centroid;
            node.add_example(example);
            self.nodes_db.put(wtxn, &id, &encode(&node)?)?;
            Ok(true)
        })?;
        if found {
            Ok(())
        } else {
            Err(Error::NotFound(format!("attribute node {}", id)))
        }
    }

    fn add_edge(
        &self,
        src: AttrId,
        dst: AttrId,
        relation: Relation,
        weight: f32,
        payload: Option<serde_json::Value>,
    ) -> Result<EdgeId> {
        let added = self.write(|wtxn| {
            for node in [src, dst] {
                if self.nodes_db.get(wtxn, &node)?.is_none() {
                    return Ok(Err(node));
                }
            }
            let id = self.next_seq(wtxn, SEQ_EDGES)?;
            let mut edge = Edge::new(id, src, dst, relation, weight);
            edge.payload = payload;
            self.edges_db.put(wtxn, &id, &encode_json(&edge)?)?;
            Ok(Ok(id))
        })?;
        added.map_err(|missing| Error::NotFound(format!("attribute node {}", missing)))
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        self.read(|rtxn| {
            let mut edges = Vec::new();
            for entry in self.edges_db.iter(rtxn)? {
                let (_, bytes) = entry?;
                edges.push(decode_json(bytes)?);
            }
            Ok(edges)
        })
    }

    fn save_filter(&self, filter: SavedFilter) -> Result<()> {
        self.write(|wtxn| {
            let bytes = encode_json(&filter)?;
            self.put_ordered(wtxn, self.filters_db, self.filter_index, SEQ_FILTERS, &filter.id, &bytes)
        })
    }

    fn filter(&self, id: &str) -> Result<Option<SavedFilter>> {
        self.read(|rtxn| {
            self.get_ordered(rtxn, self.filters_db, self.filter_index, id)?
                .map(|bytes| decode_json(&bytes))
                .transpose()
        })
    }

    fn filters(&self) -> Result<Vec<SavedFilter>> {
        self.read(|rtxn| {
            let mut filters: Vec<SavedFilter> = Vec::new();
            for entry in self.filters_db.iter(rtxn)? {
                let (_, bytes) = entry?;
                filters.push(decode_json(bytes)?);
            }
            Ok(filters)
        })
    }
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontomatch_core::{Clause, FilterPlan};
    use serde_json::json;
    use tempfile::TempDir;

    fn open() -> (TempDir, LmdbStore) {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        (dir, store)
    }

    #[test]
    fn test_items_keep_insertion_order() {
        let (_dir, store) = open();
        store.upsert_item(Item::new("zeta", "Z", "")).unwrap();
        store.upsert_item(Item::new("alpha", "A", "")).unwrap();
        store.upsert_item(Item::new("zeta", "Z2", "updated")).unwrap();

        let items = store.items().unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
        assert_eq!(store.item("zeta").unwrap().unwrap().title, "Z2");
        assert!(store.item("missing").unwrap().is_none());
    }

    #[test]
    fn test_occurrences_are_scoped_by_item() {
        let (_dir, store) = open();
        store
            .add_occurrences(vec![
                Occurrence::new("a", "сечение", "2.5").with_number(2.5, Some("мм2")),
                Occurrence::new("ab", "цвет", "синий"),
                Occurrence::new("a", "материал", "медь"),
            ])
            .unwrap();

        let a = store.occurrences("a").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].name, "сечение");
        assert_eq!(a[0].number, Some(2.5));
        assert_eq!(a[1].name, "материал");
        assert_eq!(store.occurrences("ab").unwrap().len(), 1);
        assert!(store.occurrences("b").unwrap().is_empty());
    }

    #[test]
    fn test_attr_node_lifecycle() {
        let (_dir, store) = open();
        let a = store.create_attr_node("сечение", Vector::new(vec![1.0, 0.0])).unwrap();
        let b = store.create_attr_node("цвет", Vector::new(vec![0.0, 1.0])).unwrap();
        assert_eq!((a, b), (1, 2));

        store.update_attr_node(a, Vector::new(vec![0.5, 0.5]), "площадь сечения").unwrap();
        store.update_attr_node(a, Vector::new(vec![0.5, 0.5]), "сечение").unwrap();

        let node = store.attr_node(a).unwrap().unwrap();
        assert_eq!(node.centroid.as_slice(), &[0.5, 0.5]);
        assert_eq!(node.examples, vec!["сечение", "площадь сечения"]);

        let labels: Vec<String> = store.attr_nodes().unwrap().into_iter().map(|n| n.label).collect();
        assert_eq!(labels, vec!["сечение", "цвет"]);

        let err = store.update_attr_node(99, Vector::new(vec![0.0, 0.0]), "x").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_edges_with_payload() {
        let (_dir, store) = open();
        let a = store.create_attr_node("a", Vector::new(vec![1.0])).unwrap();
        let b = store.create_attr_node("b", Vector::new(vec![1.0])).unwrap();

        let id = store
            .add_edge(a, b, Relation::AliasOf, 0.9, Some(json!({"source": "arbiter"})))
            .unwrap();
        let edges = store.edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, id);
        assert_eq!(edges[0].relation, Relation::AliasOf);
        assert_eq!(edges[0].payload, Some(json!({"source": "arbiter"})));

        let err = store.add_edge(a, 42, Relation::SimilarTo, 1.0, None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(store.edges().unwrap().len(), 1);
    }

    #[test]
    fn test_replaced_filter_keeps_position() {
        let (_dir, store) = open();
        let plan = |v: f64| FilterPlan::new().must(Clause::gte("сечение", v));
        store.save_filter(SavedFilter::new("b", "B", plan(1.0))).unwrap();
        store.save_filter(SavedFilter::new("a", "A", plan(2.0))).unwrap();
        store.save_filter(SavedFilter::new("b", "B2", plan(3.0))).unwrap();

        let filters = store.filters().unwrap();
        let ids: Vec<&str> = filters.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(filters[0].name, "B2");
        assert_eq!(filters[0].plan, plan(3.0));
    }

    #[test]
    fn test_reopen_preserves_data_and_counters() {
        let dir = TempDir::new().unwrap();
        {
            let store = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
            store.upsert_item(Item::new("sku-1", "Кабель", "ВВГ")).unwrap();
            store.create_attr_node("сечение", Vector::new(vec![1.0, 0.0])).unwrap();
            store
                .save_filter(SavedFilter::new("f", "F", FilterPlan::new().must(Clause::range("сечение", 1.5, 4.0))))
                .unwrap();
            store.sync().unwrap();
        }

        let store = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        assert_eq!(store.item("sku-1").unwrap().unwrap().description, "ВВГ");
        assert_eq!(store.filter("f").unwrap().unwrap().plan.must[0], Clause::range("сечение", 1.5, 4.0));
        let next = store.create_attr_node("цвет", Vector::new(vec![0.0, 1.0])).unwrap();
        assert_eq!(next, 2);
    }
}
