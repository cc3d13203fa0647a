//! Identity cache for hierarchy nodes and origins
//!
//! Nodes live in an arena addressed by [`NodeHandle`]. A node whose provisional
//! id is later replaced keeps its handle; a node merged into another becomes an
//! alias, and every handle is resolved through aliases before use. Ancestor
//! chains are therefore computed from parent handles at flush time and always
//! reflect the current ids.

use crate::types::{AncestorRef, ArchiveNode, Origin, RecordId};
use std::collections::HashMap;

/// Index of a node inside an [`IdentityCache`]
pub type NodeHandle = usize;

#[derive(Debug)]
struct CachedNode {
    node: ArchiveNode,
    parent: Option<NodeHandle>,
    merged_into: Option<NodeHandle>,
    /// Changed since the last flush
    dirty: bool,
    /// Written to the backend, or referenced by a written record; its id is final
    pinned: bool,
}

/// What happened when a provisional node was given its real id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassignment {
    /// The node now carries the real id
    Renamed,
    /// A node with the real id already existed and absorbed this one
    Merged(NodeHandle),
    /// The id could not change (already written, or the merge would create a cycle)
    Refused,
}

/// Node-by-id and origin-by-name cache for one walk
#[derive(Debug, Default)]
pub struct IdentityCache {
    nodes: Vec<CachedNode>,
    by_id: HashMap<RecordId, NodeHandle>,
    origins: HashMap<RecordId, Origin>,
    new_origins: Vec<RecordId>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct (non-merged) nodes
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.merged_into.is_none()).count()
    }

    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }

    /// Follow merge aliases to the surviving node
    pub fn resolve(&self, mut handle: NodeHandle) -> NodeHandle {
        let mut steps = 0;
        while let Some(target) = self.nodes[handle].merged_into {
            handle = target;
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }
        }
        handle
    }

    /// Handle of the node currently known under `id`, including former provisional ids
    pub fn lookup(&self, id: &str) -> Option<NodeHandle> {
        self.by_id.get(id).map(|&h| self.resolve(h))
    }

    pub fn insert(&mut self, node: ArchiveNode, parent: Option<NodeHandle>) -> NodeHandle {
        let handle = self.nodes.len();
        let parent = parent.map(|p| self.resolve(p));
        self.by_id.insert(node.id.clone(), handle);
        self.nodes.push(CachedNode {
            node,
            parent,
            merged_into: None,
            dirty: true,
            pinned: false,
        });
        handle
    }

    pub fn node(&self, handle: NodeHandle) -> &ArchiveNode {
        &self.nodes[self.resolve(handle)].node
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.nodes[self.resolve(handle)]
            .parent
            .map(|p| self.resolve(p))
    }

    pub fn is_pinned(&self, handle: NodeHandle) -> bool {
        self.nodes[self.resolve(handle)].pinned
    }

    /// Ancestors of `handle` from the root down, excluding the node itself
    pub fn chain(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut chain = Vec::new();
        let mut current = self.parent(handle);
        while let Some(h) = current {
            if chain.len() > self.nodes.len() {
                break;
            }
            chain.push(h);
            current = self.parent(h);
        }
        chain.reverse();
        chain
    }

    /// Ancestor references from the root down, excluding the node itself
    pub fn ancestors(&self, handle: NodeHandle) -> Vec<AncestorRef> {
        self.chain(handle)
            .into_iter()
            .map(|h| self.node(h).as_ancestor())
            .collect()
    }

    /// Ancestor references from the root down, including the node itself
    pub fn lineage(&self, handle: NodeHandle) -> Vec<AncestorRef> {
        let mut refs = self.ancestors(handle);
        refs.push(self.node(handle).as_ancestor());
        refs
    }

    /// Freeze the ids of a node and all of its ancestors
    pub fn pin_lineage(&mut self, handle: NodeHandle) {
        let handle = self.resolve(handle);
        for h in self.chain(handle) {
            self.nodes[h].pinned = true;
        }
        self.nodes[handle].pinned = true;
    }

    /// Replace the id of a provisional node with its real id
    pub fn reassign(&mut self, handle: NodeHandle, real_id: &str) -> Reassignment {
        let handle = self.resolve(handle);
        if self.nodes[handle].node.id == real_id {
            return Reassignment::Renamed;
        }
        if self.nodes[handle].pinned {
            return Reassignment::Refused;
        }

        match self.lookup(real_id) {
            Some(existing) if existing == handle => Reassignment::Renamed,
            Some(existing) => {
                if self.chain(existing).contains(&handle) || self.chain(handle).contains(&existing) {
                    return Reassignment::Refused;
                }
                let provisional = self.nodes[handle].node.clone();
                let target = &mut self.nodes[existing];
                target.node.fill_gaps_from(&provisional);
                target.dirty = true;

                let discarded = &mut self.nodes[handle];
                discarded.merged_into = Some(existing);
                discarded.dirty = false;
                // The provisional id keeps resolving, now to the surviving node
                self.by_id.insert(provisional.id, existing);
                Reassignment::Merged(existing)
            }
            None => {
                let entry = &mut self.nodes[handle];
                entry.node.id = real_id.to_string();
                entry.node.provisional = false;
                entry.dirty = true;
                self.by_id.insert(real_id.to_string(), handle);
                Reassignment::Renamed
            }
        }
    }

    /// Handles of nodes changed since the last call, parents before children
    pub fn take_dirty(&mut self) -> Vec<NodeHandle> {
        let mut dirty = Vec::new();
        for (handle, entry) in self.nodes.iter_mut().enumerate() {
            if entry.dirty && entry.merged_into.is_none() {
                entry.dirty = false;
                dirty.push(handle);
            }
        }
        dirty
    }

    /// Id of the origin with this name, registering it on first sight
    pub fn origin(&mut self, name: &str, label: Option<&str>) -> RecordId {
        let origin = Origin::new(name.trim(), label.map(str::to_string));
        let id = origin.id.clone();
        if !self.origins.contains_key(&id) {
            self.origins.insert(id.clone(), origin);
            self.new_origins.push(id.clone());
        }
        id
    }

    /// Origins first seen since the last call
    pub fn take_new_origins(&mut self) -> Vec<Origin> {
        std::mem::take(&mut self.new_origins)
            .into_iter()
            .filter_map(|id| self.origins.get(&id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, name: &str) -> ArchiveNode {
        ArchiveNode::new(id, name, "series")
    }

    #[test]
    fn test_lookup_and_chain() {
        let mut cache = IdentityCache::new();
        let root = cache.insert(node("root", "Bestand"), None);
        let mid = cache.insert(node("mid", "Serie"), Some(root));
        let leaf = cache.insert(node("leaf", "Akten"), Some(mid));

        assert_eq!(cache.lookup("mid"), Some(mid));
        assert_eq!(cache.chain(leaf), vec![root, mid]);
        let ids: Vec<String> = cache.lineage(leaf).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["root", "mid", "leaf"]);
    }

    #[test]
    fn test_rename_keeps_handle_and_old_key() {
        let mut cache = IdentityCache::new();
        let h = cache.insert(node("gen-abc", "Bestand"), None);
        cache.take_dirty();

        assert_eq!(cache.reassign(h, "real1"), Reassignment::Renamed);
        assert_eq!(cache.node(h).id, "real1");
        assert!(!cache.node(h).provisional);
        assert_eq!(cache.lookup("real1"), Some(h));
        assert_eq!(cache.lookup("gen-abc"), Some(h));
        assert_eq!(cache.take_dirty(), vec![h]);
    }

    #[test]
    fn test_merge_into_existing_fills_gaps() {
        let mut cache = IdentityCache::new();
        let mut real = node("real1", "Bestand");
        real.unit_id = "B 1".into();
        let existing = cache.insert(real, None);

        let mut provisional = node("gen-abc", "Anderer Titel");
        provisional.scope_content = Some("Inhalt".into());
        let h = cache.insert(provisional, None);
        let child = cache.insert(node("child", "Serie"), Some(h));

        assert_eq!(cache.reassign(h, "real1"), Reassignment::Merged(existing));
        assert_eq!(cache.resolve(h), existing);
        assert_eq!(cache.node(h).name, "Bestand");
        assert_eq!(cache.node(h).scope_content.as_deref(), Some("Inhalt"));
        assert_eq!(cache.parent(child), Some(existing));
        assert_eq!(cache.lookup("gen-abc"), Some(existing));
        assert_eq!(cache.node_count(), 2);

        let dirty = cache.take_dirty();
        assert!(dirty.contains(&existing));
        assert!(!dirty.contains(&h));
    }

    #[test]
    fn test_pinned_nodes_keep_their_id() {
        let mut cache = IdentityCache::new();
        let h = cache.insert(node("gen-abc", "Bestand"), None);
        let child = cache.insert(node("child", "Serie"), Some(h));
        cache.pin_lineage(child);

        assert!(cache.is_pinned(h));
        assert_eq!(cache.reassign(h, "real1"), Reassignment::Refused);
        assert_eq!(cache.node(h).id, "gen-abc");
    }

    #[test]
    fn test_merge_refused_for_descendant() {
        let mut cache = IdentityCache::new();
        let h = cache.insert(node("gen-abc", "Bestand"), None);
        cache.insert(node("real1", "Serie"), Some(h));
        assert_eq!(cache.reassign(h, "real1"), Reassignment::Refused);
    }

    #[test]
    fn test_origins_registered_once() {
        let mut cache = IdentityCache::new();
        let a = cache.origin(" Reichskanzlei ", Some("final"));
        let b = cache.origin("Reichskanzlei", None);
        assert_eq!(a, b);
        let origins = cache.take_new_origins();
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].name, "Reichskanzlei");
        assert_eq!(origins[0].label.as_deref(), Some("final"));
        assert!(cache.take_new_origins().is_empty());
    }
}
