// Catalog index: the static pathway taxonomy roots are selected from.
//
// The node index is a JSON object `{ version, nodes: { id: node } }` where
// each node lists its children by id. Parents and top-level ids are derived
// on load. Path snapshots walk the raw tree; no wrapper-node collapsing.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Nodes at this depth or deeper may be logged even when they have children.
pub const LOGGABLE_LEVEL: u32 = 4;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog node `{0}` not found")]
    NotFound(String),

    #[error("invalid node index JSON: {0}")]
    InvalidIndex(&'static str),

    #[error("node index JSON could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
}

/// One selectable topic in the taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogNode {
    pub label: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub selectable: bool,
}

impl CatalogNode {
    /// Whether a root may be logged against this node.
    pub fn is_loggable(&self) -> bool {
        self.selectable || self.level >= LOGGABLE_LEVEL
    }
}

/// Domain and path captured when a root is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSnapshot {
    pub domain: String,
    pub path: Vec<String>,
}

/// Read-only node lookup consumed by root creation.
pub trait CatalogLookup {
    fn node(&self, node_id: &str) -> Option<&CatalogNode>;

    fn parent_of(&self, node_id: &str) -> Option<&str>;

    /// Labels from the top-level ancestor down to `node_id`.
    fn path_labels(&self, node_id: &str) -> Result<Vec<String>, CatalogError> {
        if self.node(node_id).is_none() {
            return Err(CatalogError::NotFound(node_id.to_string()));
        }

        let mut labels = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(node_id);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            let Some(node) = self.node(id) else { break };
            labels.push(node.label.clone());
            cursor = self.parent_of(id);
        }
        labels.reverse();
        Ok(labels)
    }

    /// Snapshot the node's domain and label path.
    fn snapshot(&self, node_id: &str) -> Result<PathSnapshot, CatalogError> {
        let node = self.node(node_id).ok_or_else(|| CatalogError::NotFound(node_id.to_string()))?;
        let domain = node.domain.clone();
        Ok(PathSnapshot { domain, path: self.path_labels(node_id)? })
    }
}

#[derive(Debug, Serialize)]
struct NodeIndexFile<'a> {
    version: &'a str,
    nodes: &'a BTreeMap<String, CatalogNode>,
}

/// Loaded catalog with derived parent links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogIndex {
    version: String,
    nodes: BTreeMap<String, CatalogNode>,
    root_ids: Vec<String>,
    parent_by_id: HashMap<String, String>,
}

impl CatalogIndex {
    /// Parse and validate a node index document.
    pub fn from_json(input: &str) -> Result<Self, CatalogError> {
        let raw: Value = serde_json::from_str(input)?;
        let Some(nodes_raw) = raw.get("nodes").and_then(Value::as_object) else {
            return Err(CatalogError::InvalidIndex("missing nodes"));
        };
        let Some((_, sample)) = nodes_raw.iter().next() else {
            return Err(CatalogError::InvalidIndex("nodes is empty"));
        };
        let sample_ok = sample.get("label").is_some_and(Value::is_string)
            && sample.get("children").is_some_and(Value::is_array);
        if !sample_ok {
            return Err(CatalogError::InvalidIndex("unexpected node shape"));
        }

        let version = raw.get("version").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let mut nodes = BTreeMap::new();
        for (id, value) in nodes_raw {
            let node: CatalogNode = serde_json::from_value(value.clone())?;
            nodes.insert(id.clone(), node);
        }

        Ok(Self::from_nodes(version, nodes))
    }

    /// Build an index from already-decoded nodes.
    pub fn from_nodes(version: impl Into<String>, nodes: BTreeMap<String, CatalogNode>) -> Self {
        let mut parent_by_id = HashMap::new();
        for (parent_id, node) in &nodes {
            for child in &node.children {
                parent_by_id.insert(child.clone(), parent_id.clone());
            }
        }

        let mut root_ids: Vec<String> =
            nodes.keys().filter(|id| !parent_by_id.contains_key(*id)).cloned().collect();
        root_ids.sort_by(|a, b| {
            let (na, nb) = (&nodes[a], &nodes[b]);
            na.domain.cmp(&nb.domain).then_with(|| na.label.cmp(&nb.label))
        });

        Self { version: version.into(), nodes, root_ids, parent_by_id }
    }

    /// Serialize back to the node index document format.
    pub fn to_json(&self) -> Result<String, CatalogError> {
        let file = NodeIndexFile { version: &self.version, nodes: &self.nodes };
        Ok(serde_json::to_string(&file)?)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level node ids ordered by domain, then label.
    pub fn root_ids(&self) -> &[String] {
        &self.root_ids
    }

    /// Children of `node_id` as `(id, node)` pairs in declared order.
    pub fn children(&self, node_id: &str) -> Result<Vec<(&str, &CatalogNode)>, CatalogError> {
        let node = self.node(node_id).ok_or_else(|| CatalogError::NotFound(node_id.to_string()))?;
        Ok(node
            .children
            .iter()
            .filter_map(|id| self.nodes.get_key_value(id))
            .map(|(id, child)| (id.as_str(), child))
            .collect())
    }

    /// Replace a node's label. Roots captured earlier keep their old path.
    pub fn relabel(&mut self, node_id: &str, label: impl Into<String>) -> Result<(), CatalogError> {
        let node =
            self.nodes.get_mut(node_id).ok_or_else(|| CatalogError::NotFound(node_id.to_string()))?;
        node.label = label.into();
        Ok(())
    }
}

impl CatalogLookup for CatalogIndex {
    fn node(&self, node_id: &str) -> Option<&CatalogNode> {
        self.nodes.get(node_id)
    }

    fn parent_of(&self, node_id: &str) -> Option<&str> {
        self.parent_by_id.get(node_id).map(String::as_str)
    }
}
