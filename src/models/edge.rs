use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Label problems that make an edge set unusable as a working set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("edge ({item_id}, {user_id}) has label {label}, expected 0 or 1")]
    OutOfRange {
        item_id: i64,
        user_id: i64,
        label: i32,
    },
    #[error("pair ({item_id}, {user_id}) carries both label 0 and label 1")]
    Conflicting { item_id: i64, user_id: i64 },
}

/// One "sample" relationship between two songs
///
/// `item_id` is the sampled song, `user_id` is the song that contains the sample.
/// `label` is 1 for an observed connection and 0 for a synthesized non-edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Edge {
    pub item_id: i64,
    pub user_id: i64,
    pub label: i32,
}

impl Edge {
    pub fn new(item_id: i64, user_id: i64, label: i32) -> Self {
        Self {
            item_id,
            user_id,
            label,
        }
    }

    /// An observed connection (label 1)
    pub fn positive(item_id: i64, user_id: i64) -> Self {
        Self::new(item_id, user_id, 1)
    }

    /// A synthesized non-edge (label 0)
    pub fn negative(item_id: i64, user_id: i64) -> Self {
        Self::new(item_id, user_id, 0)
    }

    pub fn is_positive(&self) -> bool {
        self.label > 0
    }

    /// The `(item_id, user_id)` pair identifying this edge
    pub fn pair(&self) -> (i64, i64) {
        (self.item_id, self.user_id)
    }
}

/// Ordered, append-only collection of edges
///
/// Rows are never relabelled or removed; negatives are appended after the
/// rows they were synthesized from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeSet {
    edges: Vec<Edge>,
}

impl EdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            edges: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn append(&mut self, other: Vec<Edge>) {
        self.edges.extend(other);
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edge> {
        self.edges.iter()
    }

    pub fn as_slice(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of edges with a positive label
    pub fn positive_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_positive()).count()
    }

    /// Distinct item ids in first-seen order
    pub fn distinct_items(&self) -> Vec<i64> {
        first_seen(self.edges.iter().map(|e| e.item_id))
    }

    /// Distinct user ids in first-seen order
    pub fn distinct_users(&self) -> Vec<i64> {
        first_seen(self.edges.iter().map(|e| e.user_id))
    }

    /// Fails on the first label outside {0, 1} or pair seen with both labels
    ///
    /// Repeated rows with the same label are accepted.
    pub fn check_labels(&self) -> Result<(), LabelError> {
        let mut labels: HashMap<(i64, i64), i32> = HashMap::with_capacity(self.edges.len());
        for edge in &self.edges {
            if edge.label != 0 && edge.label != 1 {
                return Err(LabelError::OutOfRange {
                    item_id: edge.item_id,
                    user_id: edge.user_id,
                    label: edge.label,
                });
            }
            if let Some(previous) = labels.insert(edge.pair(), edge.label) {
                if previous != edge.label {
                    return Err(LabelError::Conflicting {
                        item_id: edge.item_id,
                        user_id: edge.user_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Every `(item_id, user_id)` pair present, regardless of label
    pub fn pairs(&self) -> HashSet<(i64, i64)> {
        self.edges.iter().map(Edge::pair).collect()
    }
}

impl From<Vec<Edge>> for EdgeSet {
    fn from(edges: Vec<Edge>) -> Self {
        Self { edges }
    }
}

impl FromIterator<Edge> for EdgeSet {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a EdgeSet {
    type Item = &'a Edge;
    type IntoIter = std::slice::Iter<'a, Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

fn first_seen(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Positive `(item_id, user_id)` pairs a recommendation must never re-surface
///
/// Built once from the full known-edge table and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct KnownEdges {
    pairs: HashSet<(i64, i64)>,
}

impl KnownEdges {
    pub fn from_edges(edges: &EdgeSet) -> Self {
        let pairs = edges
            .iter()
            .filter(|e| e.is_positive())
            .map(Edge::pair)
            .collect();
        Self { pairs }
    }

    pub fn contains(&self, item_id: i64, user_id: i64) -> bool {
        self.pairs.contains(&(item_id, user_id))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
