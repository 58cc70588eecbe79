//! # Levelled Forest
//!
//! Every proposed block that has not been pruned, indexed three ways:
//! by identifier, by level (view) and by parent.
//!
//! ## Parent Resolution
//!
//! A vertex whose parent sits above `lowest_level` must find that parent in
//! the forest. A vertex whose parent sits at or below `lowest_level` becomes a
//! dangling root: its ancestry was pruned (or is the genesis certificate) and
//! can no longer be checked.
//!
//! ## Pruning
//!
//! `prune_up_to_level(L)` drops every vertex with level `<= L`. Levels live in
//! a `BTreeMap`, so pruning touches only the removed levels, never the rest
//! of the graph.

use super::{ForestError, ForestResult};
use shared_types::{Block, BlockId};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// A node of the forest.
pub trait Vertex {
    /// Unique identifier of the vertex.
    fn vertex_id(&self) -> BlockId;

    /// Level of the vertex. For blocks this is the view.
    fn level(&self) -> u64;

    /// Identifier and level of the parent vertex.
    fn parent(&self) -> (BlockId, u64);
}

impl Vertex for Block {
    fn vertex_id(&self) -> BlockId {
        self.id
    }

    fn level(&self) -> u64 {
        self.view
    }

    fn parent(&self) -> (BlockId, u64) {
        (self.parent, self.parent_view())
    }
}

impl<V: Vertex> Vertex for Arc<V> {
    fn vertex_id(&self) -> BlockId {
        (**self).vertex_id()
    }

    fn level(&self) -> u64 {
        (**self).level()
    }

    fn parent(&self) -> (BlockId, u64) {
        (**self).parent()
    }
}

/// Forest of vertices organised by level.
#[derive(Debug)]
pub struct LevelledForest<V> {
    /// Vertices indexed by identifier
    vertices: HashMap<BlockId, V>,
    /// Level -> identifiers, in insertion order
    levels: BTreeMap<u64, Vec<BlockId>>,
    /// Parent -> children, in insertion order
    children: HashMap<BlockId, Vec<BlockId>>,
    /// Everything at or below this level has been pruned
    lowest_level: u64,
}

impl<V: Vertex> LevelledForest<V> {
    pub fn new() -> Self {
        Self {
            vertices: HashMap::new(),
            levels: BTreeMap::new(),
            children: HashMap::new(),
            lowest_level: 0,
        }
    }

    /// Highest level pruned so far.
    pub fn lowest_level(&self) -> u64 {
        self.lowest_level
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.vertices.contains_key(id)
    }

    /// Number of non-empty levels above `lowest_level`.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Insert a vertex.
    ///
    /// Returns `Ok(false)` when a vertex with the same identifier is already
    /// present; the forest is left unchanged.
    pub fn add_vertex(&mut self, vertex: V) -> ForestResult<bool> {
        let id = vertex.vertex_id();
        if self.vertices.contains_key(&id) {
            return Ok(false);
        }

        let level = vertex.level();
        if level <= self.lowest_level {
            return Err(ForestError::BelowPrunedLevel {
                vertex: id,
                level,
                lowest: self.lowest_level,
            });
        }

        let (parent, parent_level) = vertex.parent();
        if parent_level >= level {
            return Err(ForestError::InvalidParentLevel {
                vertex: id,
                level,
                parent_level,
            });
        }

        if parent_level > self.lowest_level {
            match self.vertices.get(&parent) {
                None => {
                    return Err(ForestError::UnknownParent {
                        vertex: id,
                        parent,
                        parent_level,
                    });
                }
                Some(known) if known.level() != parent_level => {
                    return Err(ForestError::InvalidParentLevel {
                        vertex: id,
                        level,
                        parent_level,
                    });
                }
                Some(_) => {}
            }
        }

        self.children.entry(parent).or_default().push(id);
        self.levels.entry(level).or_default().push(id);
        self.vertices.insert(id, vertex);
        Ok(true)
    }

    pub fn get_vertex(&self, id: &BlockId) -> Option<&V> {
        self.vertices.get(id)
    }

    /// Parent of `id`, if both are in the forest.
    pub fn get_parent(&self, id: &BlockId) -> Option<&V> {
        let (parent, _) = self.vertices.get(id)?.parent();
        self.vertices.get(&parent)
    }

    /// Children of `id` in insertion order. Empty when `id` is unknown.
    pub fn get_children<'a>(&'a self, id: &BlockId) -> impl Iterator<Item = &'a V> + 'a {
        let known = self.vertices.contains_key(id);
        self.children
            .get(id)
            .filter(|_| known)
            .into_iter()
            .flatten()
            .filter_map(move |child| self.vertices.get(child))
    }

    pub fn has_children(&self, id: &BlockId) -> bool {
        self.get_children(id).next().is_some()
    }

    /// Vertices at `level` in insertion order.
    pub fn get_vertices_at_level(&self, level: u64) -> impl Iterator<Item = &V> + '_ {
        self.levels
            .get(&level)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.vertices.get(id))
    }

    /// Remove every vertex with level `<= level` and return how many went.
    ///
    /// Pruning below the current `lowest_level` is rejected and changes
    /// nothing.
    pub fn prune_up_to_level(&mut self, level: u64) -> ForestResult<usize> {
        if level < self.lowest_level {
            warn!(
                requested = level,
                lowest = self.lowest_level,
                "Pruning below the already pruned level"
            );
            return Err(ForestError::AlreadyPruned {
                requested: level,
                lowest: self.lowest_level,
            });
        }

        let retained = match level.checked_add(1) {
            Some(first_kept) => self.levels.split_off(&first_kept),
            None => BTreeMap::new(),
        };
        let pruned = std::mem::replace(&mut self.levels, retained);

        let mut removed = 0;
        for id in pruned.into_values().flatten() {
            let Some(vertex) = self.vertices.remove(&id) else {
                continue;
            };
            let (parent, _) = vertex.parent();
            if let Entry::Occupied(mut siblings) = self.children.entry(parent) {
                siblings.get_mut().retain(|child| *child != id);
                if siblings.get().is_empty() {
                    siblings.remove();
                }
            }
            self.children.remove(&id);
            removed += 1;
        }

        self.lowest_level = level;
        debug!(level, removed, remaining = self.vertices.len(), "Forest pruned");
        Ok(removed)
    }
}

impl<V: Vertex> Default for LevelledForest<V> {
    fn default() -> Self {
        Self::new()
    }
}
