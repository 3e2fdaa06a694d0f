//! Secondary index for memrel
//!
//! A binary search tree over composite column values. Nodes live in an arena and
//! refer to each other by slot number; every node remembers whether it hangs from
//! the root slot or from its parent's left or right slot, which is the pointer a
//! removal patches. Each node owns the set of row keys sharing its composite value.

use indexmap::IndexSet;
use std::cmp::Ordering;

use super::value::Value;
use crate::error::{Error, Result};

/// Comparison used by index lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    Superior,
    SuperiorOrEqual,
    Inferior,
    InferiorOrEqual,
}

impl Operator {
    /// All operators, in declaration order
    pub const ALL: [Operator; 5] = [
        Operator::Equal,
        Operator::Superior,
        Operator::SuperiorOrEqual,
        Operator::Inferior,
        Operator::InferiorOrEqual,
    ];

    /// Resolve an operator from its name
    pub fn find_by_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| Error::OperatorNotFound(name.to_string()))
    }

    /// Operator name
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Equal => "equal",
            Operator::Superior => "superior",
            Operator::SuperiorOrEqual => "superiorOrEqual",
            Operator::Inferior => "inferior",
            Operator::InferiorOrEqual => "inferiorOrEqual",
        }
    }

    /// Whether a stored value ordered `ord` against the probe satisfies the operator
    pub fn matches(&self, ord: Ordering) -> bool {
        match self {
            Operator::Equal => ord == Ordering::Equal,
            Operator::Superior => ord == Ordering::Greater,
            Operator::SuperiorOrEqual => ord != Ordering::Less,
            Operator::Inferior => ord == Ordering::Less,
            Operator::InferiorOrEqual => ord != Ordering::Greater,
        }
    }

    /// Whether the left subtree of a node ordered `ord` against the probe can match
    fn descend_left(&self, ord: Ordering) -> bool {
        match self {
            Operator::Equal | Operator::SuperiorOrEqual => ord != Ordering::Less,
            Operator::Superior => ord == Ordering::Greater,
            Operator::Inferior | Operator::InferiorOrEqual => true,
        }
    }

    /// Whether the right subtree of a node ordered `ord` against the probe can match
    fn descend_right(&self, ord: Ordering) -> bool {
        match self {
            Operator::Equal | Operator::InferiorOrEqual => ord != Ordering::Greater,
            Operator::Inferior => ord == Ordering::Less,
            Operator::Superior | Operator::SuperiorOrEqual => true,
        }
    }
}

/// A composite key in the index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    /// Create a new index key from a single value
    pub fn new(value: Value) -> Self {
        Self(vec![value])
    }

    /// Create a new composite index key
    pub fn composite(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Lexicographic comparison over the fields, then by length
    pub fn compare(&self, other: &IndexKey) -> Ordering {
        match self.compare_prefix(other) {
            Ordering::Equal => self.0.len().cmp(&other.0.len()),
            ord => ord,
        }
    }

    /// Lexicographic comparison over the fields both keys have
    pub fn compare_prefix(&self, probe: &IndexKey) -> Ordering {
        for (a, b) in self.0.iter().zip(probe.0.iter()) {
            match a.sort_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

type NodeId = usize;

/// Which slot a node hangs from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeFrom {
    Root,
    Left,
    Right,
}

#[derive(Debug, Clone)]
struct IndexNode {
    key: IndexKey,
    owners: IndexSet<String>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
    from: NodeFrom,
}

/// Secondary index over one or more columns
#[derive(Debug, Clone)]
pub struct Index {
    /// Index name
    name: String,
    /// Indexed fields, in key order
    fields: Vec<String>,
    /// Node arena; `None` marks a recycled slot
    nodes: Vec<Option<IndexNode>>,
    /// Free arena slots
    free: Vec<NodeId>,
    /// Root node
    root: Option<NodeId>,
    /// Number of (row key, value) entries
    size: usize,
}

impl Index {
    /// Create a new empty index
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            size: 0,
        }
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of entries in the index
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of distinct composite values
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn node(&self, id: NodeId) -> &IndexNode {
        self.nodes[id]
            .as_ref()
            .unwrap_or_else(|| unreachable!("index node {} was freed", id))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut IndexNode {
        self.nodes[id]
            .as_mut()
            .unwrap_or_else(|| unreachable!("index node {} was freed", id))
    }

    fn alloc(&mut self, node: IndexNode) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Add `key` under the composite value; rows sharing a value coexist
    pub fn insert(&mut self, key: &str, values: Vec<Value>) {
        let probe = IndexKey::composite(values);
        let mut owners = IndexSet::new();
        owners.insert(key.to_string());

        let Some(mut current) = self.root else {
            let id = self.alloc(IndexNode {
                key: probe,
                owners,
                left: None,
                right: None,
                parent: None,
                from: NodeFrom::Root,
            });
            self.root = Some(id);
            self.size += 1;
            return;
        };

        loop {
            let node = self.node(current);
            let (next, from) = match probe.compare(&node.key) {
                Ordering::Equal => {
                    if self.node_mut(current).owners.insert(key.to_string()) {
                        self.size += 1;
                    }
                    return;
                }
                Ordering::Less => (node.left, NodeFrom::Left),
                Ordering::Greater => (node.right, NodeFrom::Right),
            };

            match next {
                Some(child) => current = child,
                None => {
                    let id = self.alloc(IndexNode {
                        key: probe,
                        owners,
                        left: None,
                        right: None,
                        parent: Some(current),
                        from,
                    });
                    let parent = self.node_mut(current);
                    match from {
                        NodeFrom::Left => parent.left = Some(id),
                        _ => parent.right = Some(id),
                    }
                    self.size += 1;
                    return;
                }
            }
        }
    }

    /// Remove `key` from the composite value; returns whether it was present
    pub fn remove(&mut self, key: &str, values: Vec<Value>) -> bool {
        let probe = IndexKey::composite(values);
        let Some(id) = self.find(&probe) else {
            return false;
        };

        let node = self.node_mut(id);
        if !node.owners.shift_remove(key) {
            return false;
        }
        let now_empty = node.owners.is_empty();
        self.size -= 1;

        if now_empty {
            self.unlink(id);
        }
        true
    }

    fn find(&self, probe: &IndexKey) -> Option<NodeId> {
        let mut current = self.root;
        while let Some(id) = current {
            let node = self.node(id);
            current = match probe.compare(&node.key) {
                Ordering::Equal => return Some(id),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    /// Detach a node whose owner set is empty
    fn unlink(&mut self, id: NodeId) {
        let (left, right) = {
            let node = self.node(id);
            (node.left, node.right)
        };

        if let (Some(_), Some(right)) = (left, right) {
            // Pull the in-order successor's payload up, then drop the successor
            let mut successor = right;
            while let Some(next) = self.node(successor).left {
                successor = next;
            }
            let successor_node = self.node_mut(successor);
            let key = std::mem::replace(&mut successor_node.key, IndexKey(Vec::new()));
            let owners = std::mem::take(&mut successor_node.owners);

            let node = self.node_mut(id);
            node.key = key;
            node.owners = owners;
            self.unlink(successor);
            return;
        }

        let child = left.or(right);
        let (parent, from) = {
            let node = self.node(id);
            (node.parent, node.from)
        };

        match (from, parent) {
            (NodeFrom::Root, _) => self.root = child,
            (NodeFrom::Left, Some(parent)) => self.node_mut(parent).left = child,
            (NodeFrom::Right, Some(parent)) => self.node_mut(parent).right = child,
            (_, None) => unreachable!("non-root index node {} without parent", id),
        }
        if let Some(child) = child {
            let child_node = self.node_mut(child);
            child_node.parent = parent;
            child_node.from = from;
        }

        self.nodes[id] = None;
        self.free.push(id);
    }

    /// Row keys whose composite value satisfies `operator` against `values`.
    ///
    /// A probe with fewer values than the index has fields compares on that prefix.
    /// Keys come back in index order.
    pub fn get_keys(&self, operator: Operator, values: &[Value]) -> IndexSet<String> {
        let probe = IndexKey::composite(values.to_vec());
        let mut result = IndexSet::new();
        let mut stack: Vec<(NodeId, Ordering)> = Vec::new();
        let mut current = self.root;

        loop {
            while let Some(id) = current {
                let node = self.node(id);
                let ord = node.key.compare_prefix(&probe);
                stack.push((id, ord));
                current = if operator.descend_left(ord) {
                    node.left
                } else {
                    None
                };
            }

            let Some((id, ord)) = stack.pop() else {
                break;
            };
            let node = self.node(id);
            if operator.matches(ord) {
                result.extend(node.owners.iter().cloned());
            }
            current = if operator.descend_right(ord) {
                node.right
            } else {
                None
            };
        }

        result
    }

    /// All (value, row keys) entries in key order
    pub fn entries(&self) -> Vec<(IndexKey, Vec<String>)> {
        let mut entries = Vec::with_capacity(self.node_count());
        let mut stack = Vec::new();
        let mut current = self.root;

        loop {
            while let Some(id) = current {
                stack.push(id);
                current = self.node(id).left;
            }
            let Some(id) = stack.pop() else {
                break;
            };
            let node = self.node(id);
            entries.push((node.key.clone(), node.owners.iter().cloned().collect()));
            current = node.right;
        }

        entries
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.size = 0;
    }
}
