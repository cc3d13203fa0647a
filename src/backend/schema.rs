//! Index names and per-entity index settings

use serde_json::{json, Value};

/// Suffix of the shadow copy built during a full reimport
pub const SHADOW_SUFFIX: &str = "new";

/// Stop words for German-language holdings
pub const GERMAN_STOP_WORDS: &[&str] = &[
    "aber", "alle", "allem", "allen", "aller", "allerdings", "alles", "also", "am", "an",
    "ander", "andere", "anderem", "anderen", "anderer", "anderes", "anderm", "andern", "anderr",
    "anders", "auch", "auf", "aus", "bei", "beim", "bin", "bis", "bist", "da", "damit", "dann",
    "das", "dass", "dasselbe", "dazu", "dein", "deine", "deinem", "deinen", "deiner", "dem",
    "den", "denn", "der", "des", "desselben", "dessen", "die", "dies", "diese", "dieselbe",
    "dieselben", "diesem", "diesen", "dieser", "dieses", "doch", "dort", "du", "durch", "ein",
    "eine", "einem", "einen", "einer", "einige", "einigem", "einigen", "einiger", "einiges",
    "einmal", "er", "es", "etwas", "euch", "euer", "eure", "eurem", "euren", "eurer", "für",
    "gegen", "gewesen", "hab", "habe", "haben", "hat", "hatte", "hätte", "hier", "hin",
    "hinter", "ich", "ihm", "ihn", "ihnen", "ihr", "ihre", "ihrem", "ihren", "ihrer", "im",
    "in", "indem", "ins", "ist", "jede", "jedem", "jeden", "jeder", "jedes", "jedoch", "jenem",
    "jenen", "jener", "jenes", "jetzt", "kann", "kein", "keine", "keinem", "keinen", "keiner",
    "könnte", "machen", "man", "manche", "manchem", "manchen", "mancher", "manches", "mein",
    "meine", "meinem", "meinen", "meiner", "mit", "muss", "musste", "nach", "nicht", "nichts",
    "noch", "nun", "nur", "ob", "oder", "ohne", "sehr", "sein", "seine", "seinem", "seinen",
    "seiner", "seit", "sich", "sie", "sind", "so", "solche", "solchem", "solchen", "solcher",
    "soll", "sollte", "sondern", "sonst", "über", "um", "und", "uns", "unser", "unsere",
    "unserem", "unseren", "unserer", "unter", "viel", "vom", "von", "vor", "während", "war",
    "warum", "was", "weil", "welch", "welche", "welchem", "welchen", "welcher", "wenn", "wer",
    "werde", "werden", "wie", "wieder", "will", "wir", "wird", "wirst", "wo", "wollen", "wollt",
    "würde", "würden", "zu", "zum", "zur", "zwar", "zwischen",
];

/// The three record kinds stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Node,
    File,
    Origin,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::File, Entity::Node, Entity::Origin];

    /// Environment-independent part of the index name
    pub fn base_name(&self) -> &'static str {
        match self {
            Entity::Node => "ArchiveNode",
            Entity::File => "ArchiveFile",
            Entity::Origin => "Origin",
        }
    }

    /// Settings applied when the index is (re)created
    pub fn schema(&self) -> IndexSchema {
        match self {
            Entity::File => IndexSchema {
                searchable: fields(&["title", "summary", "call_number", "parent_names", "origin_names"]),
                filterable: fields(&[
                    "archive_node_id",
                    "ancestor_ids",
                    "fonds_id",
                    "fonds_name",
                    "fonds_unitid",
                    "fonds_unitid_prefix",
                    "decade",
                    "period",
                    "period_span",
                    "origin_ids",
                    "source_date_start_unix",
                    "source_date_end_unix",
                ]),
                sortable: fields(&["call_number", "source_date_start_unix", "title"]),
                ..IndexSchema::default()
            },
            Entity::Node => IndexSchema {
                searchable: fields(&["name", "unit_id", "scope_content"]),
                filterable: fields(&["parent_id", "ancestor_ids", "level", "first_letter", "unit_id"]),
                sortable: fields(&["name", "unit_id"]),
                ..IndexSchema::default()
            },
            Entity::Origin => IndexSchema {
                searchable: fields(&["name"]),
                filterable: fields(&["first_letter", "label"]),
                sortable: fields(&["name"]),
                ..IndexSchema::default()
            },
        }
    }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Searchable, filterable and sortable fields plus ranking limits of one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub primary_key: String,
    pub searchable: Vec<String>,
    pub filterable: Vec<String>,
    pub sortable: Vec<String>,
    pub stop_words: Vec<String>,
    /// Minimum word length tolerating one typo
    pub one_typo_min_len: u32,
    /// Minimum word length tolerating two typos
    pub two_typos_min_len: u32,
    pub max_values_per_facet: usize,
    pub max_total_hits: usize,
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self {
            primary_key: "id".to_string(),
            searchable: Vec::new(),
            filterable: Vec::new(),
            sortable: Vec::new(),
            stop_words: fields(GERMAN_STOP_WORDS),
            one_typo_min_len: 4,
            two_typos_min_len: 8,
            max_values_per_facet: 100,
            max_total_hits: 100_000,
        }
    }
}

impl IndexSchema {
    /// Settings payload in the shape the HTTP backend expects
    pub fn to_settings(&self) -> Value {
        json!({
            "searchableAttributes": self.searchable,
            "filterableAttributes": self.filterable,
            "sortableAttributes": self.sortable,
            "stopWords": self.stop_words,
            "typoTolerance": {
                "enabled": true,
                "minWordSizeForTypos": {
                    "oneTypo": self.one_typo_min_len,
                    "twoTypos": self.two_typos_min_len,
                },
            },
            "faceting": { "maxValuesPerFacet": self.max_values_per_facet },
            "pagination": { "maxTotalHits": self.max_total_hits },
        })
    }
}

/// Live and shadow index names for one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    environment: String,
}

impl IndexNames {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// Production index read by consumers, e.g. `ArchiveFile_production`
    pub fn live(&self, entity: Entity) -> String {
        format!("{}_{}", entity.base_name(), self.environment)
    }

    /// Shadow copy written during a full reimport, e.g. `ArchiveFile_production_new`
    pub fn shadow(&self, entity: Entity) -> String {
        format!("{}_{}", self.live(entity), SHADOW_SUFFIX)
    }

    /// (shadow, live) pairs for a single swap operation
    pub fn swap_pairs(&self) -> Vec<(String, String)> {
        Entity::ALL
            .iter()
            .map(|&e| (self.shadow(e), self.live(e)))
            .collect()
    }
}
