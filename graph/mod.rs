/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Canonical tag forests, one per zone.
//!
//! Core structures:
//! - `NodeStore`: owns every zone's forest and fans out structural
//!   change events to subscribers
//! - `TagForest`: per-zone arena backed by petgraph::StableGraph
//! - `TagNode`: a tag with selection, visibility, and layout state
//! - `TagEdge`: typed relation (`Child` ownership order lives on the
//!   parent; `HybridSource` is reference-only lineage)
//!
//! Boundary: mutators are `pub(crate)` — all writes funnel through the
//! reducer path in `app`, so observers only ever see complete
//! post-mutation states. Every mutation re-derives `hidden` for the
//! affected subtree before returning.

use crossbeam_channel::{Receiver, Sender, unbounded};
use euclid::default::{Point2D, Vector2D};
use petgraph::Directed;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Stable node handle (petgraph NodeIndex — survives other deletions)
pub type NodeKey = NodeIndex;

/// Stable edge handle (petgraph EdgeIndex)
pub type EdgeKey = EdgeIndex;

/// Zone identifier — an independent tag namespace (Subject, Mood, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Where a tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagOrigin {
    /// Shipped with the zone's starter palette.
    Predefined,
    /// Typed in by the user.
    User,
    /// Produced by the external generator (suggested children, hybrids).
    Generated,
}

/// Typed relation between tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEdge {
    /// Parent-to-child ownership relation; display order lives in the
    /// parent's `children` list.
    Child,
    /// Hybrid-to-source lineage; reference only, never ownership.
    HybridSource,
}

/// A tag in a zone's forest.
#[derive(Debug, Clone)]
pub struct TagNode {
    /// Stable tag identity within its zone.
    pub id: Uuid,

    /// Display label.
    pub text: String,

    /// Owning zone; a tag never moves zones.
    pub zone: ZoneId,

    /// Selection drives child visibility and layout anchoring.
    pub selected: bool,

    /// Derived: true iff some ancestor is unselected, or the tag is
    /// currently merged into a live hybrid.
    pub hidden: bool,

    /// A generation request for this tag's children is in flight.
    pub loading: bool,

    /// Dynamic tags are removed (not merely hidden) when an ancestor is
    /// deselected.
    pub dynamic: bool,

    pub origin: TagOrigin,

    /// Back-reference only; ownership is the parent's `children` list.
    pub parent: Option<Uuid>,

    /// Ordered children; insertion order is display order.
    pub children: Vec<Uuid>,

    /// Non-empty iff this tag is a hybrid; the sibling tags it was
    /// synthesized from, mirrored by `HybridSource` edges.
    pub source_tags: Vec<Uuid>,

    /// Set while this tag is a source of a live hybrid; keeps the tag
    /// hidden (but retained) until the hybrid is torn down.
    pub merged_into: Option<Uuid>,

    /// Layout position; None until first placed by the layout pass.
    pub position: Option<Point2D<f32>>,

    /// Velocity for the layout integrator.
    pub velocity: Vector2D<f32>,

    /// Fixed layout point; None means free to move.
    pub pinned: Option<Point2D<f32>>,
}

impl TagNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_hybrid(&self) -> bool {
        !self.source_tags.is_empty()
    }
}

/// Recipe for a new tag; everything else starts at its default.
#[derive(Debug, Clone)]
pub struct TagSeed {
    pub text: String,
    pub origin: TagOrigin,
    pub dynamic: bool,
}

impl TagSeed {
    pub fn predefined(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: TagOrigin::Predefined,
            dynamic: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: TagOrigin::User,
            dynamic: false,
        }
    }

    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: TagOrigin::Generated,
            dynamic: true,
        }
    }
}

/// Declarative starter-palette tree used to seed a zone.
#[derive(Debug, Clone)]
pub struct TagTemplate {
    pub text: String,
    pub children: Vec<TagTemplate>,
}

impl TagTemplate {
    pub fn leaf(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn branch(text: impl Into<String>, children: Vec<TagTemplate>) -> Self {
        Self {
            text: text.into(),
            children,
        }
    }
}

/// Read-only view of a relation (built from petgraph edge references)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeView {
    pub from: Uuid,
    pub to: Uuid,
    pub kind: TagEdge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Operation targeted a stale or unknown id; callers treat this as
    /// a no-op.
    NodeNotFound(Uuid),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::NodeNotFound(id) => write!(f, "tag not found: {id}"),
        }
    }
}

/// Structural mutation notification, consumed by the layout controller
/// (and any other subscriber) through explicit registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    NodeAdded { zone: ZoneId, id: Uuid },
    SubtreeRemoved { zone: ZoneId, id: Uuid },
    SelectionChanged { zone: ZoneId, id: Uuid, selected: bool },
}

impl StoreEvent {
    pub fn zone(&self) -> &ZoneId {
        match self {
            StoreEvent::NodeAdded { zone, .. }
            | StoreEvent::SubtreeRemoved { zone, .. }
            | StoreEvent::SelectionChanged { zone, .. } => zone,
        }
    }
}

/// One zone's forest: a StableGraph arena plus uuid index and ordered
/// root list.
pub struct TagForest {
    zone: ZoneId,
    inner: StableGraph<TagNode, TagEdge, Directed>,
    id_to_node: HashMap<Uuid, NodeKey>,
    roots: Vec<Uuid>,
    last_clicked: Option<Uuid>,
    revision: u64,
}

impl TagForest {
    pub fn new(zone: ZoneId) -> Self {
        Self {
            zone,
            inner: StableGraph::new(),
            id_to_node: HashMap::new(),
            roots: Vec::new(),
            last_clicked: None,
            revision: 0,
        }
    }

    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// Monotonic counter bumped on every structural mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Gesture context: the tag the user most recently acted on.
    pub fn last_clicked(&self) -> Option<Uuid> {
        self.last_clicked
    }

    pub(crate) fn set_last_clicked(&mut self, id: Option<Uuid>) {
        self.last_clicked = id;
    }

    pub fn key_of(&self, id: Uuid) -> Option<NodeKey> {
        self.id_to_node.get(&id).copied()
    }

    pub fn find(&self, id: Uuid) -> Option<&TagNode> {
        let key = self.key_of(id)?;
        self.inner.node_weight(key)
    }

    pub(crate) fn find_mut(&mut self, id: Uuid) -> Option<&mut TagNode> {
        let key = self.key_of(id)?;
        self.inner.node_weight_mut(key)
    }

    /// Iterate over all tags as (key, node) pairs
    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &TagNode)> {
        self.inner
            .node_indices()
            .map(move |idx| (idx, &self.inner[idx]))
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Root ids in display order.
    pub fn roots(&self) -> &[Uuid] {
        &self.roots
    }

    /// The selected root, if any. The store never holds more than one.
    pub fn selected_root(&self) -> Option<Uuid> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.find(*id).is_some_and(|node| node.selected))
    }

    /// Ordered children of a tag.
    pub fn children_of(&self, id: Uuid) -> Vec<Uuid> {
        self.find(id).map(|node| node.children.clone()).unwrap_or_default()
    }

    /// Preorder descendant ids (not including `id` itself).
    pub fn descendants(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut stack: Vec<Uuid> = self
            .find(id)
            .map(|node| node.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.find(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Iterate over all relations as EdgeView
    pub fn edges(&self) -> impl Iterator<Item = EdgeView> + '_ {
        self.inner.edge_references().filter_map(|e| {
            let from = self.inner.node_weight(e.source())?.id;
            let to = self.inner.node_weight(e.target())?.id;
            Some(EdgeView {
                from,
                to,
                kind: *e.weight(),
            })
        })
    }

    /// All selected tags, flat (derived traversal, not a second index).
    pub fn selected_ids(&self) -> Vec<Uuid> {
        self.nodes()
            .filter(|(_, node)| node.selected)
            .map(|(_, node)| node.id)
            .collect()
    }

    fn new_node(&self, id: Uuid, seed: TagSeed, parent: Option<Uuid>, hidden: bool) -> TagNode {
        TagNode {
            id,
            text: seed.text,
            zone: self.zone.clone(),
            selected: false,
            hidden,
            loading: false,
            dynamic: seed.dynamic,
            origin: seed.origin,
            parent,
            children: Vec::new(),
            source_tags: Vec::new(),
            merged_into: None,
            position: None,
            velocity: Vector2D::zero(),
            pinned: None,
        }
    }

    pub(crate) fn add_root(&mut self, seed: TagSeed) -> Uuid {
        self.add_root_with_id(Uuid::new_v4(), seed)
    }

    pub(crate) fn add_root_with_id(&mut self, id: Uuid, seed: TagSeed) -> Uuid {
        let node = self.new_node(id, seed, None, false);
        let key = self.inner.add_node(node);
        self.id_to_node.insert(id, key);
        self.roots.push(id);
        self.revision += 1;
        id
    }

    pub(crate) fn add_child(&mut self, parent: Uuid, seed: TagSeed) -> Result<Uuid, GraphError> {
        self.add_child_with_id(parent, Uuid::new_v4(), seed)
    }

    pub(crate) fn add_child_with_id(
        &mut self,
        parent: Uuid,
        id: Uuid,
        seed: TagSeed,
    ) -> Result<Uuid, GraphError> {
        let parent_key = self
            .key_of(parent)
            .ok_or(GraphError::NodeNotFound(parent))?;
        let (parent_hidden, parent_selected) = {
            let parent_node = &self.inner[parent_key];
            (parent_node.hidden, parent_node.selected)
        };
        // A child is hidden unless its whole parent chain is selected.
        let hidden = parent_hidden || !parent_selected;
        let node = self.new_node(id, seed, Some(parent), hidden);
        let key = self.inner.add_node(node);
        self.id_to_node.insert(id, key);
        self.inner.add_edge(parent_key, key, TagEdge::Child);
        self.inner[parent_key].children.push(id);
        self.revision += 1;
        Ok(id)
    }

    /// Remove a tag and every descendant. Returns the removed ids
    /// (target first, then preorder descendants).
    pub(crate) fn remove_subtree(&mut self, id: Uuid) -> Result<Vec<Uuid>, GraphError> {
        let key = self.key_of(id).ok_or(GraphError::NodeNotFound(id))?;

        let mut removed = vec![id];
        removed.extend(self.descendants(id));

        // Detach from the parent's ordered child list (or the root list).
        let parent = self.inner[key].parent;
        match parent {
            Some(parent_id) => {
                if let Some(parent_node) = self.find_mut(parent_id) {
                    parent_node.children.retain(|child| *child != id);
                }
            },
            None => self.roots.retain(|root| *root != id),
        }

        for gone in &removed {
            if let Some(gone_key) = self.id_to_node.remove(gone) {
                // Incident edges (Child and HybridSource) go with the node.
                self.inner.remove_node(gone_key);
            }
        }

        // Scrub lineage references that pointed into the removed subtree.
        let node_keys: Vec<NodeKey> = self.inner.node_indices().collect();
        for node_key in node_keys {
            let node = &mut self.inner[node_key];
            if !node.source_tags.is_empty() {
                node.source_tags.retain(|source| !removed.contains(source));
            }
        }

        self.revision += 1;
        Ok(removed)
    }

    /// Flip selection and re-derive `hidden` for the affected subtree in
    /// the same operation. Deselecting releases any held pin.
    pub(crate) fn set_selected(&mut self, id: Uuid, selected: bool) -> Result<bool, GraphError> {
        let node = self.find_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        if node.selected == selected {
            return Ok(false);
        }
        node.selected = selected;
        if !selected {
            node.pinned = None;
            node.loading = false;
        }
        self.refresh_hidden_below(id);
        self.revision += 1;
        Ok(true)
    }

    /// Record hybrid lineage: the `source_tags` list plus mirrored
    /// `HybridSource` edges.
    pub(crate) fn link_sources(
        &mut self,
        hybrid: Uuid,
        sources: &[Uuid],
    ) -> Result<(), GraphError> {
        let hybrid_key = self.key_of(hybrid).ok_or(GraphError::NodeNotFound(hybrid))?;
        for source in sources {
            let source_key = self
                .key_of(*source)
                .ok_or(GraphError::NodeNotFound(*source))?;
            self.inner
                .add_edge(hybrid_key, source_key, TagEdge::HybridSource);
        }
        self.inner[hybrid_key].source_tags = sources.to_vec();
        Ok(())
    }

    /// Mark (or clear) a tag as merged into a hybrid, re-deriving
    /// `hidden` for it and its subtree in the same operation.
    pub(crate) fn set_merged(&mut self, id: Uuid, into: Option<Uuid>) -> Result<(), GraphError> {
        let parent = {
            let node = self.find_mut(id).ok_or(GraphError::NodeNotFound(id))?;
            node.merged_into = into;
            node.parent
        };
        let ancestor_hidden = parent
            .and_then(|parent| self.find(parent))
            .map(|parent| parent.hidden || !parent.selected)
            .unwrap_or(false);
        if let Some(node) = self.find_mut(id) {
            node.hidden = ancestor_hidden || node.merged_into.is_some();
            if node.hidden {
                node.pinned = None;
            }
        }
        self.refresh_hidden_below(id);
        self.revision += 1;
        Ok(())
    }

    /// Re-derive `hidden` for the subtree below `id` (the node's own
    /// flag only changes through its ancestors' selection or its own
    /// merge state).
    pub(crate) fn refresh_hidden_below(&mut self, id: Uuid) {
        let mut stack = self.children_of(id);
        while let Some(next) = stack.pop() {
            let parent_state = self
                .find(next)
                .and_then(|node| node.parent)
                .and_then(|parent| self.find(parent))
                .map(|parent| (parent.hidden, parent.selected));
            let Some((parent_hidden, parent_selected)) = parent_state else {
                continue;
            };
            let ancestor_hidden = parent_hidden || !parent_selected;
            if let Some(node) = self.find_mut(next) {
                node.hidden = ancestor_hidden || node.merged_into.is_some();
                if node.hidden {
                    node.pinned = None;
                }
            }
            stack.extend(self.children_of(next));
        }
    }

    /// Re-derive `hidden` for the whole forest from the roots down.
    /// Used after bulk restore, where per-mutation derivation is not
    /// available.
    pub(crate) fn refresh_hidden_all(&mut self) {
        for root in self.roots.clone() {
            if let Some(node) = self.find_mut(root) {
                node.hidden = node.merged_into.is_some();
            }
            self.refresh_hidden_below(root);
        }
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }
}

/// Owns every zone's forest; the single source of truth for tag state.
pub struct NodeStore {
    zones: HashMap<ZoneId, TagForest>,
    subscribers: Vec<Sender<StoreEvent>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self {
            zones: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    /// Register a structural-event observer. Dropped receivers are
    /// pruned on the next emission.
    pub fn subscribe(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: StoreEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = &ZoneId> {
        self.zones.keys()
    }

    pub fn forest(&self, zone: &ZoneId) -> Option<&TagForest> {
        self.zones.get(zone)
    }

    pub(crate) fn forest_mut(&mut self, zone: &ZoneId) -> Option<&mut TagForest> {
        self.zones.get_mut(zone)
    }

    pub(crate) fn ensure_zone(&mut self, zone: &ZoneId) -> &mut TagForest {
        self.zones
            .entry(zone.clone())
            .or_insert_with(|| TagForest::new(zone.clone()))
    }

    pub fn find_node(&self, zone: &ZoneId, id: Uuid) -> Option<&TagNode> {
        self.forest(zone)?.find(id)
    }

    pub(crate) fn add_root(&mut self, zone: &ZoneId, seed: TagSeed) -> Uuid {
        let id = self.ensure_zone(zone).add_root(seed);
        self.emit(StoreEvent::NodeAdded {
            zone: zone.clone(),
            id,
        });
        id
    }

    pub(crate) fn add_child(
        &mut self,
        zone: &ZoneId,
        parent: Uuid,
        seed: TagSeed,
    ) -> Result<Uuid, GraphError> {
        let forest = self
            .forest_mut(zone)
            .ok_or(GraphError::NodeNotFound(parent))?;
        let id = forest.add_child(parent, seed)?;
        self.emit(StoreEvent::NodeAdded {
            zone: zone.clone(),
            id,
        });
        Ok(id)
    }

    pub(crate) fn remove_subtree(&mut self, zone: &ZoneId, id: Uuid) -> Result<(), GraphError> {
        let forest = self.forest_mut(zone).ok_or(GraphError::NodeNotFound(id))?;
        forest.remove_subtree(id)?;
        self.emit(StoreEvent::SubtreeRemoved {
            zone: zone.clone(),
            id,
        });
        Ok(())
    }

    pub(crate) fn set_selected(
        &mut self,
        zone: &ZoneId,
        id: Uuid,
        selected: bool,
    ) -> Result<(), GraphError> {
        let forest = self.forest_mut(zone).ok_or(GraphError::NodeNotFound(id))?;
        if forest.set_selected(id, selected)? {
            self.emit(StoreEvent::SelectionChanged {
                zone: zone.clone(),
                id,
                selected,
            });
        }
        Ok(())
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}
