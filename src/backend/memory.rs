//! In-process search backend
//!
//! Keeps every index in memory behind one lock. Tasks complete synchronously,
//! so a swap is observed by readers either entirely or not at all. Used by the
//! test suite and for dry runs without a search server.

use super::schema::IndexSchema;
use super::traits::{
    BackendError, BackendResult, IndexStats, SearchBackend, SearchRequest, SearchResponse, TaskId,
    TaskState,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Hit cap applied when an index has no schema
const DEFAULT_MAX_TOTAL_HITS: usize = 1000;

/// Task history kept before observed tasks are pruned, oldest first
const TASK_HISTORY: usize = 1024;

#[derive(Debug, Default)]
struct MemoryIndex {
    primary_key: String,
    schema: Option<IndexSchema>,
    documents: BTreeMap<String, Value>,
    /// Remaining stats polls that report ongoing indexing
    indexing_polls: u32,
}

#[derive(Debug, Default)]
struct State {
    indexes: HashMap<String, MemoryIndex>,
    /// Task outcome and whether a caller has read it
    tasks: BTreeMap<TaskId, (TaskState, bool)>,
    next_task: TaskId,
}

impl State {
    fn finish(&mut self, outcome: Result<(), String>) -> TaskId {
        let task = self.next_task;
        self.next_task += 1;
        let state = match outcome {
            Ok(()) => TaskState::Succeeded,
            Err(reason) => TaskState::Failed(reason),
        };
        self.tasks.insert(task, (state, false));
        self.prune_tasks();
        task
    }

    /// Drop the oldest observed tasks once the history is over its bound
    fn prune_tasks(&mut self) {
        let excess = self.tasks.len().saturating_sub(TASK_HISTORY);
        if excess == 0 {
            return;
        }
        let observed: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, (_, seen))| *seen)
            .map(|(&id, _)| id)
            .take(excess)
            .collect();
        for id in observed {
            self.tasks.remove(&id);
        }
    }
}

/// Search backend held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all existing indexes, sorted
    pub fn index_names(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.indexes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of documents in an index, zero when it does not exist
    pub fn document_count(&self, uid: &str) -> usize {
        self.state
            .lock()
            .indexes
            .get(uid)
            .map(|i| i.documents.len())
            .unwrap_or(0)
    }

    /// Make the next `polls` stats requests for `uid` report ongoing indexing
    pub fn simulate_indexing(&self, uid: &str, polls: u32) {
        if let Some(index) = self.state.lock().indexes.get_mut(uid) {
            index.indexing_polls = polls;
        }
    }
}

impl SearchBackend for MemoryBackend {
    fn create_index(&self, uid: &str, primary_key: &str) -> BackendResult<TaskId> {
        let mut state = self.state.lock();
        let outcome = if state.indexes.contains_key(uid) {
            Err(format!("index_already_exists: Index `{}` already exists.", uid))
        } else {
            state.indexes.insert(
                uid.to_string(),
                MemoryIndex {
                    primary_key: primary_key.to_string(),
                    ..Default::default()
                },
            );
            Ok(())
        };
        Ok(state.finish(outcome))
    }

    fn delete_index(&self, uid: &str) -> BackendResult<Option<TaskId>> {
        let mut state = self.state.lock();
        if state.indexes.remove(uid).is_none() {
            return Ok(None);
        }
        Ok(Some(state.finish(Ok(()))))
    }

    fn configure_index(&self, uid: &str, schema: &IndexSchema) -> BackendResult<TaskId> {
        let mut state = self.state.lock();
        let index = state.indexes.entry(uid.to_string()).or_default();
        index.primary_key = schema.primary_key.clone();
        index.schema = Some(schema.clone());
        Ok(state.finish(Ok(())))
    }

    fn add_documents(&self, uid: &str, documents: &[Value]) -> BackendResult<TaskId> {
        let mut state = self.state.lock();
        let index = state.indexes.entry(uid.to_string()).or_insert_with(|| MemoryIndex {
            primary_key: "id".to_string(),
            ..Default::default()
        });

        let mut keyed = Vec::with_capacity(documents.len());
        for doc in documents {
            match doc.get(&index.primary_key).and_then(key_string) {
                Some(key) => keyed.push((key, doc.clone())),
                None => {
                    let reason = format!(
                        "missing_document_id: Document doesn't have a `{}` attribute",
                        index.primary_key
                    );
                    return Ok(state.finish(Err(reason)));
                }
            }
        }
        // Replace by primary key, last write wins
        index.documents.extend(keyed);
        Ok(state.finish(Ok(())))
    }

    fn delete_document(&self, uid: &str, id: &str) -> BackendResult<TaskId> {
        let mut state = self.state.lock();
        let outcome = match state.indexes.get_mut(uid) {
            Some(index) => {
                index.documents.remove(id);
                Ok(())
            }
            None => Err(format!("index_not_found: Index `{}` not found.", uid)),
        };
        Ok(state.finish(outcome))
    }

    fn get_document(&self, uid: &str, id: &str) -> BackendResult<Option<Value>> {
        let state = self.state.lock();
        let index = state.indexes.get(uid).ok_or_else(|| index_not_found(uid))?;
        Ok(index.documents.get(id).cloned())
    }

    fn search(&self, uid: &str, request: &SearchRequest) -> BackendResult<SearchResponse> {
        let state = self.state.lock();
        let index = state.indexes.get(uid).ok_or_else(|| index_not_found(uid))?;

        let filter = match &request.filter {
            Some(expr) => parse_filter(expr)?,
            None => Vec::new(),
        };
        let terms: Vec<String> = request
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let searchable = index.schema.as_ref().map(|s| s.searchable.as_slice());

        let mut matched: Vec<&Value> = index
            .documents
            .values()
            .filter(|doc| filter.iter().all(|c| c.matches(doc)))
            .filter(|doc| matches_terms(doc, &terms, searchable))
            .collect();

        let sort = parse_sort(&request.sort);
        if !sort.is_empty() {
            matched.sort_by(|a, b| {
                sort.iter()
                    .map(|(field, descending)| {
                        let ord = compare_values(a.get(field), b.get(field));
                        if *descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let cap = index
            .schema
            .as_ref()
            .map(|s| s.max_total_hits)
            .unwrap_or(DEFAULT_MAX_TOTAL_HITS);
        matched.truncate(cap);

        let mut facet_distribution = BTreeMap::new();
        for field in &request.facets {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for doc in &matched {
                for value in field_values(doc, field) {
                    if let Some(key) = key_string(value) {
                        *counts.entry(key).or_default() += 1;
                    }
                }
            }
            facet_distribution.insert(field.clone(), counts);
        }

        let per_page = request.hits_per_page;
        let skip = request.page.saturating_sub(1).saturating_mul(per_page);
        let hits = matched
            .iter()
            .skip(skip)
            .take(per_page)
            .map(|v| (*v).clone())
            .collect();

        Ok(SearchResponse {
            hits,
            total_hits: matched.len(),
            facet_distribution,
        })
    }

    fn swap_indexes(&self, pairs: &[(String, String)]) -> BackendResult<TaskId> {
        let mut state = self.state.lock();
        let missing = pairs
            .iter()
            .flat_map(|(a, b)| [a, b])
            .find(|uid| !state.indexes.contains_key(uid.as_str()))
            .cloned();
        if let Some(uid) = missing {
            return Ok(state.finish(Err(format!("index_not_found: Index `{}` not found.", uid))));
        }

        for (a, b) in pairs.iter().filter(|(a, b)| a != b) {
            if let (Some(first), Some(second)) = (state.indexes.remove(a), state.indexes.remove(b)) {
                state.indexes.insert(a.clone(), second);
                state.indexes.insert(b.clone(), first);
            }
        }
        Ok(state.finish(Ok(())))
    }

    fn index_stats(&self, uid: &str) -> BackendResult<IndexStats> {
        let mut state = self.state.lock();
        let index = state.indexes.get_mut(uid).ok_or_else(|| index_not_found(uid))?;
        let is_indexing = index.indexing_polls > 0;
        index.indexing_polls = index.indexing_polls.saturating_sub(1);
        Ok(IndexStats {
            number_of_documents: index.documents.len() as u64,
            is_indexing,
        })
    }

    fn task_state(&self, task: TaskId) -> BackendResult<TaskState> {
        let mut state = self.state.lock();
        let observed = state.tasks.get_mut(&task).map(|(task_state, seen)| {
            *seen = true;
            task_state.clone()
        });
        observed.ok_or_else(|| BackendError::Api {
            status: 404,
            code: Some("task_not_found".to_string()),
            message: format!("Task `{}` not found.", task),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn index_not_found(uid: &str) -> BackendError {
    BackendError::Api {
        status: 404,
        code: Some("index_not_found".to_string()),
        message: format!("Index `{}` not found.", uid),
    }
}

/// Scalar value as a string key (ids, facet values)
fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Scalar values of a field; arrays contribute each element
fn field_values<'a>(doc: &'a Value, field: &str) -> Vec<&'a Value> {
    match doc.get(field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(value) => vec![value],
    }
}

fn matches_terms(doc: &Value, terms: &[String], searchable: Option<&[String]>) -> bool {
    if terms.is_empty() {
        return true;
    }
    let mut haystack = String::new();
    match searchable {
        Some(fields) if !fields.is_empty() => {
            for field in fields {
                collect_text(doc.get(field), &mut haystack);
            }
        }
        _ => collect_text(Some(doc), &mut haystack),
    }
    let haystack = haystack.to_lowercase();
    terms.iter().all(|t| haystack.contains(t.as_str()))
}

fn collect_text(value: Option<&Value>, out: &mut String) {
    match value {
        Some(Value::String(s)) => {
            out.push_str(s);
            out.push(' ');
        }
        Some(Value::Array(items)) => items.iter().for_each(|v| collect_text(Some(v), out)),
        Some(Value::Object(map)) => map.values().for_each(|v| collect_text(Some(v), out)),
        _ => {}
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        // Missing values sort last
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn parse_sort(rules: &[String]) -> Vec<(String, bool)> {
    rules
        .iter()
        .map(|rule| match rule.rsplit_once(':') {
            Some((field, dir)) => (field.to_string(), dir.eq_ignore_ascii_case("desc")),
            None => (rule.clone(), false),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
struct Condition {
    field: String,
    op: Op,
    value: Value,
}

impl Condition {
    fn matches(&self, doc: &Value) -> bool {
        let values = field_values(doc, &self.field);
        match self.op {
            Op::Ne => !values.iter().any(|v| scalar_eq(v, &self.value)),
            Op::Eq => values.iter().any(|v| scalar_eq(v, &self.value)),
            op => values.iter().any(|&v| {
                let ord = compare_values(Some(v), Some(&self.value));
                match (v, &self.value) {
                    (Value::Number(_), Value::Number(_)) => match op {
                        Op::Lt => ord == Ordering::Less,
                        Op::Le => ord != Ordering::Greater,
                        Op::Gt => ord == Ordering::Greater,
                        _ => ord != Ordering::Less,
                    },
                    _ => false,
                }
            }),
        }
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => key_string(a).is_some() && key_string(a) == key_string(b),
    }
}

/// Parse `field OP value` clauses joined with `AND`
fn parse_filter(expr: &str) -> BackendResult<Vec<Condition>> {
    let invalid = |clause: &str| BackendError::Api {
        status: 400,
        code: Some("invalid_search_filter".to_string()),
        message: format!("Unsupported filter clause `{}`", clause),
    };

    let mut conditions = Vec::new();
    for clause in expr.split(" AND ").map(str::trim).filter(|c| !c.is_empty()) {
        let op_start = clause.find(&['=', '!', '<', '>'][..]).ok_or_else(|| invalid(clause))?;
        let (field, rest) = clause.split_at(op_start);
        let (op, value) = [
            ("!=", Op::Ne),
            (">=", Op::Ge),
            ("<=", Op::Le),
            ("=", Op::Eq),
            (">", Op::Gt),
            ("<", Op::Lt),
        ]
        .iter()
        .find_map(|&(token, op)| rest.strip_prefix(token).map(|v| (op, v.trim())))
        .ok_or_else(|| invalid(clause))?;

        let field = field.trim();
        if field.is_empty() || value.is_empty() {
            return Err(invalid(clause));
        }
        let value = if let Some(quoted) = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        {
            Value::String(quoted.replace("\\\"", "\""))
        } else {
            serde_json::from_str::<serde_json::Number>(value)
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(value.to_string()))
        };

        conditions.push(Condition {
            field: field.to_string(),
            op,
            value,
        });
    }
    Ok(conditions)
}
