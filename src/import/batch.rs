//! Pending records and their flush to a [`RecordSink`]
//!
//! Files are queued with the handle of their owning node. Ancestor chains,
//! facets and parent ids are filled in only when the batch is flushed, from the
//! identity cache's state at that moment.

use super::cache::{IdentityCache, NodeHandle};
use super::source::ImportError;
use crate::backend::RecordSink;
use crate::types::{ArchiveFile, ArchiveNode};
use tracing::debug;

/// Record counts written by one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub nodes: usize,
    pub files: usize,
    pub origins: usize,
}

impl FlushSummary {
    pub fn total(&self) -> usize {
        self.nodes + self.files + self.origins
    }

    pub fn add(&mut self, other: FlushSummary) {
        self.nodes += other.nodes;
        self.files += other.files;
        self.origins += other.origins;
    }
}

/// Files waiting to be written, each tied to its owning node
#[derive(Debug, Default)]
pub struct PendingBatch {
    files: Vec<(ArchiveFile, NodeHandle)>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: ArchiveFile, owner: NodeHandle) {
        self.files.push((file, owner));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn take_files(&mut self) -> Vec<(ArchiveFile, NodeHandle)> {
        std::mem::take(&mut self.files)
    }

    /// Resolve pending records against the cache and write them
    ///
    /// Every node that ends up in a written chain is pinned, so its id can no
    /// longer be reassigned.
    pub fn flush(
        &mut self,
        cache: &mut IdentityCache,
        sink: &RecordSink,
    ) -> Result<FlushSummary, ImportError> {
        let nodes: Vec<ArchiveNode> = cache
            .take_dirty()
            .into_iter()
            .map(|handle| {
                let ancestors = cache.ancestors(handle);
                let mut node = cache.node(handle).clone();
                node.ancestor_ids = ancestors.iter().map(|a| a.id.clone()).collect();
                node.parent_id = ancestors.last().map(|a| a.id.clone());
                node.ancestors = ancestors;
                cache.pin_lineage(handle);
                node
            })
            .collect();

        let files: Vec<ArchiveFile> = self
            .files
            .drain(..)
            .map(|(mut file, owner)| {
                file.parents = cache.lineage(owner);
                file.archive_node_id = cache.node(owner).id.clone();
                file.derive_facets();
                cache.pin_lineage(owner);
                file
            })
            .collect();

        let origins = cache.take_new_origins();

        let summary = FlushSummary {
            nodes: sink.upsert_nodes(&nodes)?,
            origins: sink.upsert_origins(&origins)?,
            files: sink.upsert_files(&files)?,
        };
        debug!(
            nodes = summary.nodes,
            files = summary.files,
            origins = summary.origins,
            "Flushed batch"
        );
        Ok(summary)
    }
}
