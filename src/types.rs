//! Core record types for the archive index
//!
//! These are the three document shapes written to the search backend. Their
//! field sets are fixed; the sink validates them before anything leaves the
//! process.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of an archive node, file or origin inside the search backend
pub type RecordId = String;

/// Prefix marking node ids synthesized from unit-id/title rather than taken from the source
pub const PROVISIONAL_ID_PREFIX: &str = "gen-";

/// Prefix of origin ids (derived from the origin name)
pub const ORIGIN_ID_PREFIX: &str = "origin-";

// ============================================================================
// Ancestors
// ============================================================================

/// One entry of a denormalized ancestor chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorRef {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub unit_id: String,
}

// ============================================================================
// Archive nodes
// ============================================================================

/// Physical description of a node (`did/physdesc`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genreform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
}

impl PhysicalDescription {
    pub fn is_empty(&self) -> bool {
        self.extent.is_none() && self.genreform.is_none() && self.dimensions.is_none()
    }

    /// Fill unset fields from `other`, keeping values already present
    pub fn fill_from(&mut self, other: &PhysicalDescription) {
        fill(&mut self.extent, &other.extent);
        fill(&mut self.genreform, &other.genreform);
        fill(&mut self.dimensions, &other.dimensions);
    }
}

/// Holding repository of a node (`did/repository`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Repository {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none()
    }
}

/// Originating body as recorded on a node or file (`did/origination`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginationEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A hierarchy node: fonds, series or any intermediate grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveNode {
    pub id: RecordId,
    /// True while the id is synthesized rather than taken from the source
    #[serde(default)]
    pub provisional: bool,
    pub name: String,
    pub level: String,
    #[serde(default)]
    pub unit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_date: Option<String>,
    #[serde(default, skip_serializing_if = "PhysicalDescription::is_empty")]
    pub physdesc: PhysicalDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub origination: Vec<OriginationEntry>,
    #[serde(default, skip_serializing_if = "Repository::is_empty")]
    pub repository: Repository,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_cite: Option<String>,
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub ancestors: Vec<AncestorRef>,
    #[serde(default)]
    pub ancestor_ids: Vec<RecordId>,
    #[serde(default)]
    pub first_letter: String,
}

impl ArchiveNode {
    /// Create a node with only identity and display fields set
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>, level: impl Into<String>) -> Self {
        let name = name.into();
        let id = id.into();
        Self {
            provisional: id.starts_with(PROVISIONAL_ID_PREFIX),
            first_letter: first_letter(&name),
            id,
            name,
            level: level.into(),
            unit_id: String::new(),
            unit_date: None,
            physdesc: PhysicalDescription::default(),
            language: None,
            origination: Vec::new(),
            repository: Repository::default(),
            scope_content: None,
            related_material: None,
            prefer_cite: None,
            parent_id: None,
            ancestors: Vec::new(),
            ancestor_ids: Vec::new(),
        }
    }

    /// Reference to this node as it appears in a descendant's ancestor chain
    pub fn as_ancestor(&self) -> AncestorRef {
        AncestorRef {
            id: self.id.clone(),
            name: self.name.clone(),
            unit_id: self.unit_id.clone(),
        }
    }

    /// Field-by-field merge: values already on `self` win, gaps are filled from `other`
    pub fn fill_gaps_from(&mut self, other: &ArchiveNode) {
        if self.name.is_empty() {
            self.name = other.name.clone();
            self.first_letter = first_letter(&self.name);
        }
        if self.level.is_empty() {
            self.level = other.level.clone();
        }
        if self.unit_id.is_empty() {
            self.unit_id = other.unit_id.clone();
        }
        fill(&mut self.unit_date, &other.unit_date);
        self.physdesc.fill_from(&other.physdesc);
        fill(&mut self.language, &other.language);
        if self.origination.is_empty() {
            self.origination = other.origination.clone();
        }
        fill(&mut self.repository.name, &other.repository.name);
        fill(&mut self.repository.address, &other.repository.address);
        fill(&mut self.scope_content, &other.scope_content);
        fill(&mut self.related_material, &other.related_material);
        fill(&mut self.prefer_cite, &other.prefer_cite);
    }
}

fn fill<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if target.is_none() {
        *target = source.clone();
    }
}

// ============================================================================
// Archive files
// ============================================================================

/// A leaf record (`c[@level='file']`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveFile {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub call_number: String,
    pub archive_node_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_date_text: Option<String>,
    pub source_date_start: Option<NaiveDate>,
    pub source_date_end: Option<NaiveDate>,
    pub source_date_start_uncorrected: Option<NaiveDate>,
    pub source_date_end_uncorrected: Option<NaiveDate>,
    pub source_date_start_unix: Option<i64>,
    pub source_date_end_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Ancestor chain from the fonds down to the owning node
    pub parents: Vec<AncestorRef>,
    pub parent_names: String,
    pub ancestor_ids: Vec<RecordId>,
    pub depth: usize,
    pub fonds_id: Option<RecordId>,
    pub fonds_name: Option<String>,
    pub fonds_unitid: Option<String>,
    pub fonds_unitid_prefix: Option<String>,
    pub decade: Option<i32>,
    pub period: Option<i32>,
    /// Years covered by `period`: 100 for centuries, 10 for decades
    #[serde(default)]
    pub period_span: Option<i32>,
    #[serde(default)]
    pub origin_ids: Vec<RecordId>,
    #[serde(default)]
    pub origin_names: Vec<String>,
}

impl ArchiveFile {
    /// Recompute every field derived from the ancestor chain and start date
    pub fn derive_facets(&mut self) {
        let fonds = self.parents.first();
        self.fonds_id = fonds.map(|f| f.id.clone());
        self.fonds_name = fonds.map(|f| f.name.clone());
        self.fonds_unitid = fonds.map(|f| f.unit_id.clone()).filter(|u| !u.is_empty());
        self.fonds_unitid_prefix = self.fonds_unitid.as_deref().and_then(unit_id_prefix);
        self.ancestor_ids = self.parents.iter().map(|p| p.id.clone()).collect();
        self.parent_names = self
            .parents
            .iter()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        self.depth = self.parents.len();

        let year = self.source_date_start.map(|d| chrono::Datelike::year(&d));
        self.decade = year.map(decade_of);
        self.period = year.map(period_of);
        self.period_span = self.period.map(period_span);
        self.source_date_start_unix = self.source_date_start.map(unix_seconds);
        self.source_date_end_unix = self.source_date_end.map(unix_seconds);
    }
}

// ============================================================================
// Origins
// ============================================================================

/// An originating organization or person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub first_letter: String,
}

impl Origin {
    /// Build an origin whose id is derived from its name
    pub fn new(name: impl Into<String>, label: Option<String>) -> Self {
        let name = name.into();
        Self {
            id: origin_id(&name),
            first_letter: first_letter(&name),
            name,
            label,
        }
    }
}

/// Deterministic origin id: the same name always yields the same id, across
/// runs and across concurrently running imports
pub fn origin_id(name: &str) -> RecordId {
    let mut hasher = Sha256::new();
    hasher.update(name.trim().as_bytes());
    let digest = hasher.finalize();
    format!("{}{}", ORIGIN_ID_PREFIX, &hex::encode(digest)[..16])
}

// ============================================================================
// Facet helpers
// ============================================================================

/// Lower-case and keep only alphanumeric characters
pub fn normalize_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Upper-cased first alphanumeric character; `#` for digits or empty names
pub fn first_letter(name: &str) -> String {
    match name.chars().find(|c| c.is_alphanumeric()) {
        Some(c) if c.is_alphabetic() => c.to_uppercase().collect(),
        _ => "#".to_string(),
    }
}

/// Leading letter code of a unit-id, e.g. `B` for `B 153` or `NS` for `NS 19`
pub fn unit_id_prefix(unit_id: &str) -> Option<String> {
    let prefix: String = unit_id
        .trim()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    }
}

/// Decade bucket of a year: ⌊year/10⌋×10
pub fn decade_of(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

/// Period bucket: centuries before 1800, decades afterwards
pub fn period_of(year: i32) -> i32 {
    if year < 1800 {
        year.div_euclid(100) * 100
    } else {
        decade_of(year)
    }
}

/// Width in years of the period bucket starting at `period`
pub fn period_span(period: i32) -> i32 {
    if period < 1800 {
        100
    } else {
        10
    }
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
