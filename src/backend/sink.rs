//! Typed record sink over a search backend
//!
//! Nodes, files and origins are validated here before they are serialized.
//! A sink writes to one generation of indexes (live or shadow) and remembers
//! the tasks it enqueued so callers can confirm them before a swap.

use super::schema::{Entity, IndexNames};
use super::traits::{
    expect_task, BackendError, BackendResult, IndexStats, SearchBackend, SearchRequest,
    SearchResponse, TaskId,
};
use crate::types::{ArchiveFile, ArchiveNode, Origin};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest id the backend accepts
const MAX_ID_BYTES: usize = 511;

/// Which copy of the indexes a sink reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Live,
    Shadow,
}

/// Record-level gateway to the search backend
#[derive(Debug)]
pub struct RecordSink {
    backend: Arc<dyn SearchBackend>,
    names: IndexNames,
    generation: Generation,
    enqueued: Mutex<Vec<TaskId>>,
}

impl RecordSink {
    pub fn new(backend: Arc<dyn SearchBackend>, names: IndexNames, generation: Generation) -> Self {
        Self {
            backend,
            names,
            generation,
            enqueued: Mutex::new(Vec::new()),
        }
    }

    /// Index name this sink uses for `entity`
    pub fn index(&self, entity: Entity) -> String {
        match self.generation {
            Generation::Live => self.names.live(entity),
            Generation::Shadow => self.names.shadow(entity),
        }
    }

    /// Upsert nodes by id
    pub fn upsert_nodes(&self, nodes: &[ArchiveNode]) -> BackendResult<usize> {
        for node in nodes {
            validate_node(node)?;
        }
        self.write(Entity::Node, nodes)
    }

    /// Upsert files by id
    pub fn upsert_files(&self, files: &[ArchiveFile]) -> BackendResult<usize> {
        for file in files {
            validate_file(file)?;
        }
        self.write(Entity::File, files)
    }

    /// Upsert origins by id
    pub fn upsert_origins(&self, origins: &[Origin]) -> BackendResult<usize> {
        for origin in origins {
            validate_id("origin", &origin.id)?;
            if origin.name.trim().is_empty() {
                return Err(BackendError::InvalidRecord(format!(
                    "origin {} has an empty name",
                    origin.id
                )));
            }
        }
        self.write(Entity::Origin, origins)
    }

    /// Remove a node document
    pub fn delete_node(&self, id: &str) -> BackendResult<()> {
        validate_id("node", id)?;
        let task = self.backend.delete_document(&self.index(Entity::Node), id)?;
        self.enqueued.lock().push(task);
        Ok(())
    }

    fn write<T: Serialize>(&self, entity: Entity, records: &[T]) -> BackendResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let documents = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        let index = self.index(entity);
        let task = self.backend.add_documents(&index, &documents)?;
        debug!(index = %index, task, count = documents.len(), "Enqueued upsert");
        self.enqueued.lock().push(task);
        Ok(documents.len())
    }

    /// Wait until every task enqueued so far has succeeded
    pub fn confirm_writes(&self, timeout: Duration, interval: Duration) -> BackendResult<usize> {
        let tasks: Vec<TaskId> = std::mem::take(&mut *self.enqueued.lock());
        for &task in &tasks {
            expect_task(self.backend.as_ref(), task, timeout, interval)?;
        }
        Ok(tasks.len())
    }

    pub fn get_node(&self, id: &str) -> BackendResult<Option<ArchiveNode>> {
        self.get(Entity::Node, id)
    }

    pub fn get_file(&self, id: &str) -> BackendResult<Option<ArchiveFile>> {
        self.get(Entity::File, id)
    }

    pub fn get_origin(&self, id: &str) -> BackendResult<Option<Origin>> {
        self.get(Entity::Origin, id)
    }

    fn get<T: DeserializeOwned>(&self, entity: Entity, id: &str) -> BackendResult<Option<T>> {
        match self.backend.get_document(&self.index(entity), id)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Raw search against one entity's index
    pub fn search(&self, entity: Entity, request: &SearchRequest) -> BackendResult<SearchResponse> {
        self.backend.search(&self.index(entity), request)
    }

    /// Fonds-level nodes, optionally restricted to one first letter, sorted by name
    pub fn root_nodes(
        &self,
        letter: Option<&str>,
        page: usize,
        per_page: usize,
    ) -> BackendResult<(Vec<ArchiveNode>, usize)> {
        let mut filter = "level = \"fonds\"".to_string();
        if let Some(letter) = letter {
            filter.push_str(&format!(" AND first_letter = \"{}\"", letter));
        }
        let request = SearchRequest::default()
            .with_filter(filter)
            .with_sort("name:asc")
            .with_page(page, per_page);
        let response = self.search(Entity::Node, &request)?;
        let nodes = response
            .hits
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ArchiveNode>, _>>()?;
        Ok((nodes, response.total_hits))
    }

    /// First letters present in fonds names
    pub fn fonds_letters(&self) -> BackendResult<Vec<String>> {
        self.letters(Entity::Node, Some("level = \"fonds\""))
    }

    /// First letters present in origin names
    pub fn origin_letters(&self) -> BackendResult<Vec<String>> {
        self.letters(Entity::Origin, None)
    }

    fn letters(&self, entity: Entity, filter: Option<&str>) -> BackendResult<Vec<String>> {
        let mut request = SearchRequest::default()
            .with_facet("first_letter")
            .with_page(1, 0);
        request.filter = filter.map(str::to_string);
        let response = self.search(entity, &request)?;
        let mut letters: Vec<String> = response
            .facet_distribution
            .get("first_letter")
            .map(|counts| counts.keys().cloned().collect())
            .unwrap_or_default();
        letters.sort();
        Ok(letters)
    }

    pub fn stats(&self, entity: Entity) -> BackendResult<IndexStats> {
        self.backend.index_stats(&self.index(entity))
    }
}

/// Ids may only contain ASCII alphanumerics, `-` and `_`
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_BYTES
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn validate_id(kind: &str, id: &str) -> BackendResult<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(BackendError::InvalidRecord(format!("{} id {:?} is not a valid document id", kind, id)))
    }
}

fn validate_node(node: &ArchiveNode) -> BackendResult<()> {
    validate_id("node", &node.id)?;
    let chain: Vec<&str> = node.ancestors.iter().map(|a| a.id.as_str()).collect();
    if chain != node.ancestor_ids.iter().map(String::as_str).collect::<Vec<_>>() {
        return Err(BackendError::InvalidRecord(format!(
            "node {} ancestor ids disagree with its ancestor chain",
            node.id
        )));
    }
    if node.parent_id.as_deref() != chain.last().copied() {
        return Err(BackendError::InvalidRecord(format!(
            "node {} parent {:?} is not the last ancestor",
            node.id, node.parent_id
        )));
    }
    if chain.contains(&node.id.as_str()) {
        return Err(BackendError::InvalidRecord(format!(
            "node {} is its own ancestor",
            node.id
        )));
    }
    chain.iter().try_for_each(|id| validate_id("ancestor", id))
}

fn validate_file(file: &ArchiveFile) -> BackendResult<()> {
    validate_id("file", &file.id)?;
    validate_id("node", &file.archive_node_id)?;
    let last = file.parents.last().map(|p| p.id.as_str());
    if last != Some(file.archive_node_id.as_str()) {
        return Err(BackendError::InvalidRecord(format!(
            "file {} is attached to {} but its ancestor chain ends at {:?}",
            file.id, file.archive_node_id, last
        )));
    }
    for id in &file.origin_ids {
        validate_id("origin", id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::types::AncestorRef;

    fn sink() -> RecordSink {
        RecordSink::new(
            Arc::new(MemoryBackend::new()),
            IndexNames::new("test"),
            Generation::Live,
        )
    }

    fn node(id: &str, parent: Option<&ArchiveNode>) -> ArchiveNode {
        let mut node = ArchiveNode::new(id, format!("Node {id}"), "fonds");
        if let Some(parent) = parent {
            node.level = "series".into();
            node.ancestors = parent.ancestors.clone();
            node.ancestors.push(parent.as_ancestor());
            node.ancestor_ids = node.ancestors.iter().map(|a| a.id.clone()).collect();
            node.parent_id = Some(parent.id.clone());
        }
        node
    }

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id("DE-1958_abc"));
        assert!(is_valid_id("gen-0123abcd"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a.b"));
        assert!(!is_valid_id("ä"));
    }

    #[test]
    fn test_upsert_and_read_back() {
        let sink = sink();
        let root = node("root", None);
        let child = node("child", Some(&root));
        assert_eq!(sink.upsert_nodes(&[root.clone(), child.clone()]).unwrap(), 2);
        assert_eq!(
            sink.confirm_writes(Duration::from_secs(1), Duration::from_millis(1))
                .unwrap(),
            1
        );

        assert_eq!(sink.get_node("child").unwrap(), Some(child));
        let (roots, total) = sink.root_nodes(None, 1, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(roots[0].id, "root");
        assert_eq!(sink.fonds_letters().unwrap(), vec!["N".to_string()]);
    }

    #[test]
    fn test_delete_node_removes_document() {
        let sink = sink();
        let wait = (Duration::from_secs(1), Duration::from_millis(1));
        sink.upsert_nodes(&[node("root", None)]).unwrap();
        sink.confirm_writes(wait.0, wait.1).unwrap();
        assert!(sink.get_node("root").unwrap().is_some());

        sink.delete_node("root").unwrap();
        assert_eq!(sink.confirm_writes(wait.0, wait.1).unwrap(), 1);
        assert_eq!(sink.get_node("root").unwrap(), None);
        assert!(matches!(sink.delete_node("a.b"), Err(BackendError::InvalidRecord(_))));
    }

    #[test]
    fn test_rejects_inconsistent_chain() {
        let sink = sink();
        let root = node("root", None);
        let mut child = node("child", Some(&root));
        child.parent_id = Some("other".into());
        assert!(matches!(
            sink.upsert_nodes(&[child]),
            Err(BackendError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_rejects_file_outside_its_chain() {
        let sink = sink();
        let mut file: ArchiveFile = serde_json::from_value(serde_json::json!({
            "id": "f1", "title": "Akte", "archive_node_id": "n2",
            "source_date_start": null, "source_date_end": null,
            "source_date_start_uncorrected": null, "source_date_end_uncorrected": null,
            "source_date_start_unix": null, "source_date_end_unix": null,
            "parents": [], "parent_names": "", "ancestor_ids": [], "depth": 0,
            "fonds_id": null, "fonds_name": null, "fonds_unitid": null,
            "fonds_unitid_prefix": null, "decade": null, "period": null
        }))
        .unwrap();
        assert!(sink.upsert_files(&[file.clone()]).is_err());

        file.parents = vec![AncestorRef { id: "n2".into(), name: "Serie".into(), unit_id: String::new() }];
        file.derive_facets();
        assert_eq!(sink.upsert_files(&[file]).unwrap(), 1);
    }
}
