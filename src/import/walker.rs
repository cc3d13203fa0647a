//! Tree walker: finding-aid document to nodes, files and origins
//!
//! Walks every fonds of an inventory depth-first. A node's files are handled
//! first in fixed-size slices, then its group children. A child whose title
//! merely repeats the current node's title or unit-id ("double header") does
//! not become a node of its own; its contents are attributed to the current
//! node, and a real id it carries replaces the current node's provisional id.

use super::batch::{FlushSummary, PendingBatch};
use super::cache::{IdentityCache, NodeHandle, Reassignment};
use super::ead::{EadDocument, Element};
use super::progress::ImportProgress;
use super::source::{ImportConfig, ImportError};
use super::unit_date::{max_plausible_year, UnitDate};
use crate::backend::RecordSink;
use crate::types::{
    normalize_key, ArchiveFile, ArchiveNode, OriginationEntry, PhysicalDescription, Repository,
    PROVISIONAL_ID_PREFIX,
};
use regex_lite::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::{debug, info};

static RE_LEADING_CALL_NUMBER: OnceLock<Regex> = OnceLock::new();

/// Extra normalized characters a unit-id-prefixed child title may carry and
/// still count as a repeat of its parent
const COLLAPSE_SLACK: usize = 5;

/// Unit-id type marking an explicit call number
const CALL_NUMBER_TYPE: &str = "call number";

/// Result of walking one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Nodes and files visited (some may be cache hits)
    Walked { nodes: usize, files: usize },
    /// Not an inventory; nothing was queued
    Skipped { description_type: Option<String> },
}

/// Converts documents into records, queueing them for a sink
pub struct TreeWalker<'a> {
    config: &'a ImportConfig,
    cache: &'a mut IdentityCache,
    progress: &'a ImportProgress,
    batch: PendingBatch,
    /// Sink written whenever the batch reaches the flush threshold
    streaming: Option<&'a RecordSink>,
    written: FlushSummary,
    max_year: i32,
    nodes_seen: usize,
    files_seen: usize,
}

impl<'a> TreeWalker<'a> {
    pub fn new(
        config: &'a ImportConfig,
        cache: &'a mut IdentityCache,
        progress: &'a ImportProgress,
    ) -> Self {
        Self {
            config,
            cache,
            progress,
            batch: PendingBatch::new(),
            streaming: None,
            written: FlushSummary::default(),
            max_year: max_plausible_year(),
            nodes_seen: 0,
            files_seen: 0,
        }
    }

    /// Flush to `sink` during the walk whenever the flush threshold is reached
    pub fn streaming_to(mut self, sink: &'a RecordSink) -> Self {
        self.streaming = Some(sink);
        self
    }

    /// Override the upper bound for plausible years
    pub fn with_max_year(mut self, max_year: i32) -> Self {
        self.max_year = max_year;
        self
    }

    /// Totals written by flushes so far
    pub fn written(&self) -> FlushSummary {
        self.written
    }

    /// Walk one document, queueing its records
    pub fn walk(&mut self, doc: &EadDocument) -> Result<WalkOutcome, ImportError> {
        if !doc.is_inventory() {
            return Ok(WalkOutcome::Skipped {
                description_type: doc.description_type().map(str::to_string),
            });
        }

        let (nodes_before, files_before) = (self.nodes_seen, self.files_seen);
        for fonds in doc.fonds() {
            self.process_node(fonds, None)?;
        }

        Ok(WalkOutcome::Walked {
            nodes: self.nodes_seen - nodes_before,
            files: self.files_seen - files_before,
        })
    }

    /// Write everything queued so far
    pub fn flush(&mut self, sink: &RecordSink) -> Result<FlushSummary, ImportError> {
        let summary = self.batch.flush(self.cache, sink)?;
        self.written.add(summary);
        self.progress.records_written(summary.total());
        Ok(summary)
    }

    fn process_node(&mut self, element: &Element, parent: Option<NodeHandle>) -> Result<(), ImportError> {
        let handle = self.resolve_node(element, parent);
        self.nodes_seen += 1;
        self.progress.node_processed();
        self.process_contents(element, handle)
    }

    /// Files and group children of `element`, attributed to `handle`
    fn process_contents(&mut self, element: &Element, handle: NodeHandle) -> Result<(), ImportError> {
        let files: Vec<&Element> = element.file_components().collect();
        let slice_size = self.config.slice_size.max(1);
        for (index, slice) in files.chunks(slice_size).enumerate() {
            for (offset, file) in slice.iter().enumerate() {
                let record = self.build_file(file, handle, index * slice_size + offset);
                self.batch.push(record, handle);
            }
            self.files_seen += slice.len();
            self.progress.files_processed(slice.len());
            self.maybe_flush()?;
        }

        for child in element.group_components() {
            if self.is_redundant(child, handle) {
                self.absorb(child, handle);
                let handle = self.cache.resolve(handle);
                self.process_contents(child, handle)?;
            } else {
                self.process_node(child, Some(handle))?;
            }
        }
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<(), ImportError> {
        if let Some(sink) = self.streaming {
            if self.batch.len() >= self.config.flush_threshold {
                self.flush(sink)?;
            }
        }
        Ok(())
    }

    /// Cached node for this element, or a new one
    fn resolve_node(&mut self, element: &Element, parent: Option<NodeHandle>) -> NodeHandle {
        let raw_title = element.text_at("did/unittitle").map(|t| clean_text(&t));
        let explicit = element
            .text_at("did/unitid")
            .map(|u| strip_call_number_prefix(&u, &self.config.call_number_prefix));
        let (title, unit_id) = split_call_number(explicit, raw_title);

        let id = match element
            .attr("id")
            .and_then(|raw| source_id(raw, &self.config.id_prefix))
        {
            Some(id) => id,
            None => {
                let parent_id = parent.map(|p| self.cache.node(p).id.clone()).unwrap_or_default();
                provisional_id(&[&parent_id, &normalize_key(&unit_id), &normalize_key(&title)])
            }
        };

        if let Some(handle) = self.cache.lookup(&id) {
            return handle;
        }

        let mut node = ArchiveNode::new(id, title, element.level());
        node.unit_id = unit_id;
        fill_node_details(&mut node, element);
        self.cache.insert(node, parent)
    }

    fn build_file(&mut self, element: &Element, owner: NodeHandle, position: usize) -> ArchiveFile {
        let raw_title = element.text_at("did/unittitle").map(|t| clean_text(&t));
        let explicit = element
            .all("did/unitid")
            .into_iter()
            .find(|u| u.attr("type") == Some(CALL_NUMBER_TYPE))
            .map(|u| u.text().trim().to_string())
            .filter(|u| !u.is_empty())
            .map(|u| strip_call_number_prefix(&u, &self.config.call_number_prefix));
        let (title, call_number) = split_call_number(explicit, raw_title);

        let id = element
            .attr("id")
            .and_then(|raw| source_id(raw, &self.config.id_prefix))
            .unwrap_or_else(|| {
                let owner_id = self.cache.node(owner).id.clone();
                provisional_id(&[
                    &owner_id,
                    &normalize_key(&call_number),
                    &normalize_key(&title),
                    &position.to_string(),
                ])
            });

        let date_element = element.at("did/unitdate");
        let date = UnitDate::parse_with_max_year(
            date_element.and_then(|d| d.attr("normal")),
            date_element.map(|d| d.text()).as_deref().map(str::trim).filter(|t| !t.is_empty()),
            self.max_year,
        );

        let mut origin_ids = Vec::new();
        let mut origin_names = Vec::new();
        for origination in element.all("did/origination") {
            let name = clean_text(&origination.text());
            if name.is_empty() {
                continue;
            }
            let id = self.cache.origin(&name, origination.attr("label"));
            if !origin_ids.contains(&id) {
                origin_ids.push(id);
                origin_names.push(name);
            }
        }

        ArchiveFile {
            id,
            title,
            call_number,
            archive_node_id: String::new(),
            source_date_text: date.text().map(str::to_string),
            source_date_start: date.start_date(),
            source_date_end: date.end_date(),
            source_date_start_uncorrected: date.start_uncorrected(),
            source_date_end_uncorrected: date.end_uncorrected(),
            source_date_start_unix: None,
            source_date_end_unix: None,
            location: element.text_at("did/physloc").map(|t| clean_text(&t)),
            language_code: element
                .at("did/langmaterial/language")
                .and_then(|l| l.attr("langcode"))
                .map(str::to_string),
            summary: element
                .all("scopecontent")
                .into_iter()
                .find(|s| s.attr("encodinganalog") == Some("summary"))
                .and_then(|s| s.text_at("p"))
                .map(|t| clean_text(&t)),
            link: element
                .at("otherfindaid/p/extref")
                .and_then(|e| e.attr("href"))
                .map(str::to_string),
            parents: Vec::new(),
            parent_names: String::new(),
            ancestor_ids: Vec::new(),
            depth: 0,
            fonds_id: None,
            fonds_name: None,
            fonds_unitid: None,
            fonds_unitid_prefix: None,
            decade: None,
            period: None,
            period_span: None,
            origin_ids,
            origin_names,
        }
    }

    /// Whether `child` only repeats the title or unit-id of the node at `handle`
    fn is_redundant(&self, child: &Element, handle: NodeHandle) -> bool {
        let Some(child_title) = child.text_at("did/unittitle") else {
            return false;
        };
        let node = self.cache.node(handle);
        is_double_header(&child_title, &node.name, &node.unit_id)
    }

    /// Give a provisional node the real id carried by its double-header child
    fn absorb(&mut self, child: &Element, handle: NodeHandle) {
        let Some(real_id) = child
            .attr("id")
            .and_then(|raw| source_id(raw, &self.config.id_prefix))
        else {
            return;
        };
        let current = self.cache.node(handle);
        if !current.provisional {
            return;
        }
        let provisional = current.id.clone();

        match self.cache.reassign(handle, &real_id) {
            Reassignment::Renamed => {
                debug!(from = %provisional, to = %real_id, "Renamed provisional node");
            }
            Reassignment::Merged(_) => {
                info!(from = %provisional, into = %real_id, "Merged provisional node into existing node");
            }
            Reassignment::Refused => {
                debug!(id = %provisional, real = %real_id, "Kept provisional id");
            }
        }
    }
}

/// Collapse rule for a child title against its parent's title and unit-id
pub fn is_double_header(child_title: &str, parent_title: &str, parent_unit_id: &str) -> bool {
    let child = normalize_key(child_title);
    if child.is_empty() {
        return false;
    }
    let title = normalize_key(parent_title);
    let unit = normalize_key(parent_unit_id);

    if !title.is_empty() && child == title {
        return true;
    }
    if !unit.is_empty() && !title.is_empty() && child.contains(&unit) && child.contains(&title) {
        return true;
    }
    !unit.is_empty()
        && child.starts_with(&unit)
        && child.chars().count() <= title.chars().count() + unit.chars().count() + COLLAPSE_SLACK
}

/// Split a call number off the title when no explicit one exists
///
/// A leading short upper-case letter code followed by digits (`B 153`,
/// `NS 19/1234`) is taken as the call number when the rest of the title has
/// more than two characters.
pub fn split_call_number(explicit: Option<String>, title: Option<String>) -> (String, String) {
    let title = title.unwrap_or_default();
    if let Some(call_number) = explicit.filter(|c| !c.is_empty()) {
        return (title, call_number);
    }

    let re = RE_LEADING_CALL_NUMBER.get_or_init(|| {
        Regex::new(r"^([A-Z]{1,4} ?\d+(?:[/.\-]\d+)*)\s*[:\-–]?\s*(.*)$").unwrap()
    });
    if let Some(caps) = re.captures(&title) {
        let code = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if rest.chars().count() > 2 {
            return (rest.to_string(), code.to_string());
        }
    }
    (title, String::new())
}

fn strip_call_number_prefix(value: &str, prefix: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix(prefix)
        .unwrap_or(value)
        .trim()
        .to_string()
}

/// Source id without the source-system prefix, restricted to id-safe characters
pub fn source_id(raw: &str, prefix: &str) -> Option<String> {
    let raw = raw.trim();
    let stripped = raw.strip_prefix(prefix).unwrap_or(raw);
    if stripped.is_empty() {
        return None;
    }
    Some(
        stripped
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect(),
    )
}

/// Deterministic id for an element without a source id
pub fn provisional_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    format!("{}{}", PROVISIONAL_ID_PREFIX, &hex::encode(digest)[..16])
}

/// Collapse internal whitespace runs to single spaces
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_of(element: &Element, path: &str) -> Option<String> {
    element.text_at(path).map(|t| clean_text(&t))
}

/// Descriptive metadata of a group component
fn fill_node_details(node: &mut ArchiveNode, element: &Element) {
    node.unit_date = text_of(element, "did/unitdate");

    if let Some(physdesc) = element.at("did/physdesc") {
        node.physdesc = PhysicalDescription {
            extent: text_of(physdesc, "extent"),
            genreform: text_of(physdesc, "genreform"),
            dimensions: text_of(physdesc, "dimensions"),
        };
        if node.physdesc.is_empty() {
            let text = clean_text(&physdesc.text());
            node.physdesc.extent = Some(text).filter(|t| !t.is_empty());
        }
    }

    node.language = text_of(element, "did/langmaterial").or_else(|| {
        element
            .at("did/langmaterial/language")
            .and_then(|l| l.attr("langcode"))
            .map(str::to_string)
    });

    node.origination = element
        .all("did/origination")
        .into_iter()
        .filter_map(|o| {
            let name = clean_text(&o.text());
            (!name.is_empty()).then(|| OriginationEntry {
                name,
                label: o.attr("label").map(str::to_string),
            })
        })
        .collect();

    if let Some(repository) = element.at("did/repository") {
        node.repository = Repository {
            name: text_of(repository, "corpname").or_else(|| {
                let text = clean_text(&repository.own_text);
                Some(text).filter(|t| !t.is_empty())
            }),
            address: text_of(repository, "address"),
        };
    }

    node.scope_content = text_of(element, "scopecontent");
    node.related_material = text_of(element, "relatedmaterial");
    node.prefer_cite = text_of(element, "prefercite");
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_YEAR: i32 = 2027;

    fn walk(xml: &str) -> (IdentityCache, Vec<(ArchiveFile, NodeHandle)>, WalkOutcome) {
        let doc = EadDocument::parse_str(xml).unwrap();
        let config = ImportConfig::default();
        let progress = ImportProgress::quiet();
        let mut cache = IdentityCache::new();
        let (outcome, files) = {
            let mut walker = TreeWalker::new(&config, &mut cache, &progress).with_max_year(MAX_YEAR);
            let outcome = walker.walk(&doc).unwrap();
            (outcome, walker.batch.take_files())
        };
        (cache, files, outcome)
    }

    fn wrap(body: &str) -> String {
        format!(
            r#"<ead xmlns="urn:isbn:1-931666-22-9"><archdesc level="collection" type="inventory"><dsc>{body}</dsc></archdesc></ead>"#
        )
    }

    #[test]
    fn test_double_header_rules() {
        assert!(is_double_header("Familie", "Familie", "B 153"));
        assert!(is_double_header("B 153 - Familie", "Familie", "B 153"));
        assert!(is_double_header("B 153 Fam.", "Familie", "B 153"));
        assert!(!is_double_header("B 153 Familie und Jugend und Senioren", "Haushalt", "B 153"));
        assert!(!is_double_header("Personal", "Familie", "B 153"));
        assert!(!is_double_header("", "Familie", ""));
    }

    #[test]
    fn test_split_call_number() {
        assert_eq!(
            split_call_number(None, Some("B 153 Bundesministerium".into())),
            ("Bundesministerium".to_string(), "B 153".to_string())
        );
        assert_eq!(
            split_call_number(None, Some("NS 19/1234: Persönlicher Stab".into())),
            ("Persönlicher Stab".to_string(), "NS 19/1234".to_string())
        );
        // Remainder too short to be a title
        assert_eq!(
            split_call_number(None, Some("B 153 AB".into())),
            ("B 153 AB".to_string(), String::new())
        );
        assert_eq!(
            split_call_number(Some("R 43".into()), Some("Reichskanzlei".into())),
            ("Reichskanzlei".to_string(), "R 43".to_string())
        );
        assert_eq!(split_call_number(None, None), (String::new(), String::new()));
    }

    #[test]
    fn test_source_id_normalization() {
        assert_eq!(source_id("DE-1958_abc-1", "DE-1958_").as_deref(), Some("abc-1"));
        assert_eq!(source_id("other.id", "DE-1958_").as_deref(), Some("other_id"));
        assert_eq!(source_id("DE-1958_", "DE-1958_"), None);
    }

    #[test]
    fn test_provisional_id_is_deterministic() {
        let a = provisional_id(&["p", "b153", "familie"]);
        assert_eq!(a, provisional_id(&["p", "b153", "familie"]));
        assert_ne!(a, provisional_id(&["p", "b153f", "amilie"]));
        assert!(a.starts_with(PROVISIONAL_ID_PREFIX));
    }

    #[test]
    fn test_extracts_file_fields() {
        let xml = wrap(
            r#"<c level="fonds" id="DE-1958_f1">
              <did><unittitle>Bundesministerium für Familie</unittitle><unitid>B 153</unitid></did>
              <c level="file" id="DE-1958_a1">
                <did>
                  <unittitle>Haushalt 1961</unittitle>
                  <unitid type="call number">BArch B 153/1</unitid>
                  <unitdate normal="1040-01-01/1941-12-31">1940-1941</unitdate>
                  <physloc>Koblenz</physloc>
                  <langmaterial><language langcode="ger">Deutsch</language></langmaterial>
                  <origination label="final">Bundesministerium für Familie</origination>
                  <origination>  </origination>
                </did>
                <scopecontent encodinganalog="summary"><p>Enthält:   Vermerke</p></scopecontent>
                <otherfindaid><p><extref href="https://invenio.example/a1">Link</extref></p></otherfindaid>
              </c>
            </c>"#,
        );
        let (cache, files, outcome) = walk(&xml);
        assert_eq!(outcome, WalkOutcome::Walked { nodes: 1, files: 1 });

        let (file, owner) = &files[0];
        assert_eq!(cache.node(*owner).id, "f1");
        assert_eq!(cache.node(*owner).unit_id, "B 153");
        assert_eq!(file.id, "a1");
        assert_eq!(file.call_number, "B 153/1");
        assert_eq!(file.title, "Haushalt 1961");
        assert_eq!(file.source_date_start.map(|d| d.to_string()).as_deref(), Some("1940-01-01"));
        assert_eq!(file.source_date_start_uncorrected.map(|d| d.to_string()).as_deref(), Some("1040-01-01"));
        assert_eq!(file.source_date_text.as_deref(), Some("1940-1941"));
        assert_eq!(file.location.as_deref(), Some("Koblenz"));
        assert_eq!(file.language_code.as_deref(), Some("ger"));
        assert_eq!(file.summary.as_deref(), Some("Enthält: Vermerke"));
        assert_eq!(file.link.as_deref(), Some("https://invenio.example/a1"));
        assert_eq!(file.origin_names, vec!["Bundesministerium für Familie".to_string()]);
        assert_eq!(cache.origin_count(), 1);
    }

    #[test]
    fn test_duplicate_title_child_is_collapsed() {
        let xml = wrap(
            r#"<c level="fonds" id="DE-1958_f1">
              <did><unittitle>Familie</unittitle><unitid>B 153</unitid></did>
              <c level="series">
                <did><unittitle>Familie</unittitle></did>
                <c level="file" id="DE-1958_a1"><did><unittitle>Akte 1</unittitle></did></c>
                <c level="series" id="DE-1958_s2">
                  <did><unittitle>Haushalt</unittitle></did>
                  <c level="file" id="DE-1958_a2"><did><unittitle>Akte 2</unittitle></did></c>
                </c>
              </c>
            </c>"#,
        );
        let (cache, files, outcome) = walk(&xml);
        assert_eq!(outcome, WalkOutcome::Walked { nodes: 2, files: 2 });
        assert_eq!(cache.node_count(), 2);

        let owner_of = |id: &str| {
            let (_, h) = files.iter().find(|(f, _)| f.id == id).unwrap();
            cache.node(*h).id.clone()
        };
        assert_eq!(owner_of("a1"), "f1");
        assert_eq!(owner_of("a2"), "s2");
        let s2 = cache.lookup("s2").unwrap();
        assert_eq!(cache.parent(s2).map(|p| cache.node(p).id.clone()).as_deref(), Some("f1"));
    }

    #[test]
    fn test_provisional_fonds_takes_real_id_of_double_header() {
        let xml = wrap(
            r#"<c level="fonds">
              <did><unittitle>B 153 Familie</unittitle></did>
              <c level="series" id="DE-1958_real">
                <did><unittitle>B 153 Familie</unittitle></did>
                <c level="file" id="DE-1958_a1"><did><unittitle>Akte 1</unittitle></did></c>
              </c>
            </c>"#,
        );
        let (cache, files, _) = walk(&xml);
        assert_eq!(cache.node_count(), 1);
        let (_, owner) = &files[0];
        let node = cache.node(*owner);
        assert_eq!(node.id, "real");
        assert!(!node.provisional);
        assert_eq!(node.name, "Familie");
        assert_eq!(node.unit_id, "B 153");
    }

    #[test]
    fn test_provisional_merges_into_existing_real_node() {
        let first = wrap(
            r#"<c level="fonds" id="DE-1958_real">
              <did><unittitle>Familie</unittitle><unitid>B 153</unitid></did>
            </c>"#,
        );
        let second = wrap(
            r#"<c level="fonds">
              <did><unittitle>Familie</unittitle><unitid>B 153</unitid></did>
              <scopecontent><p>Nachtrag</p></scopecontent>
              <c level="series" id="DE-1958_real">
                <did><unittitle>Familie</unittitle></did>
                <c level="file" id="DE-1958_a1"><did><unittitle>Akte 1</unittitle></did></c>
              </c>
            </c>"#,
        );

        let config = ImportConfig::default();
        let progress = ImportProgress::quiet();
        let mut cache = IdentityCache::new();
        let mut walker = TreeWalker::new(&config, &mut cache, &progress);
        walker.walk(&EadDocument::parse_str(&first).unwrap()).unwrap();
        walker.walk(&EadDocument::parse_str(&second).unwrap()).unwrap();
        drop(walker);

        assert_eq!(cache.node_count(), 1);
        let real = cache.lookup("real").unwrap();
        assert_eq!(cache.node(real).scope_content.as_deref(), Some("Nachtrag"));
    }

    #[test]
    fn test_node_details() {
        let xml = wrap(
            r#"<c01 level="fonds" id="DE-1958_f1">
              <did>
                <unittitle>Reichskanzlei</unittitle><unitid>R 43</unitid>
                <unitdate>1878-1945</unitdate>
                <physdesc><extent>1200 lfm</extent><genreform>Akten</genreform></physdesc>
                <langmaterial>Deutsch</langmaterial>
                <origination label="pre">Reichskanzlei</origination>
                <repository><corpname>Bundesarchiv</corpname><address><addressline>Koblenz</addressline></address></repository>
              </did>
              <relatedmaterial><p>R 43 I</p></relatedmaterial>
              <prefercite><p>BArch R 43</p></prefercite>
            </c01>"#,
        );
        let (cache, _, _) = walk(&xml);
        let node = cache.node(cache.lookup("f1").unwrap());
        assert_eq!(node.level, "fonds");
        assert_eq!(node.unit_date.as_deref(), Some("1878-1945"));
        assert_eq!(node.physdesc.extent.as_deref(), Some("1200 lfm"));
        assert_eq!(node.physdesc.genreform.as_deref(), Some("Akten"));
        assert_eq!(node.language.as_deref(), Some("Deutsch"));
        assert_eq!(node.origination[0].label.as_deref(), Some("pre"));
        assert_eq!(node.repository.name.as_deref(), Some("Bundesarchiv"));
        assert_eq!(node.repository.address.as_deref(), Some("Koblenz"));
        assert_eq!(node.related_material.as_deref(), Some("R 43 I"));
        assert_eq!(node.prefer_cite.as_deref(), Some("BArch R 43"));
        assert_eq!(node.first_letter, "R");
    }

    #[test]
    fn test_non_inventory_is_skipped() {
        let (cache, files, outcome) = walk(
            r#"<ead><archdesc type="findbuch"><dsc><c level="fonds" id="x"/></dsc></archdesc></ead>"#,
        );
        assert_eq!(
            outcome,
            WalkOutcome::Skipped { description_type: Some("findbuch".into()) }
        );
        assert!(files.is_empty());
        assert_eq!(cache.node_count(), 0);
    }

    #[test]
    fn test_files_without_ids_get_distinct_provisional_ids() {
        let xml = wrap(
            r#"<c level="fonds" id="f1"><did><unittitle>Bestand</unittitle></did>
              <c level="file"><did><unittitle>Akte</unittitle></did></c>
              <c level="file"><did><unittitle>Akte</unittitle></did></c>
            </c>"#,
        );
        let (_, files, _) = walk(&xml);
        assert_eq!(files.len(), 2);
        assert_ne!(files[0].0.id, files[1].0.id);
        assert!(files[0].0.id.starts_with(PROVISIONAL_ID_PREFIX));
    }
}
