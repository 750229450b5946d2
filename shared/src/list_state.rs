//! One screen's resource collection and the derived table view.
//!
//! Selectors are synchronous and never touch the network. Loads are split
//! into [`ListState::begin_load`] and [`ListState::finish_load`] so that
//! overlapping fetches resolve last-request-wins: every ticket carries a
//! sequence number and only the most recently issued one may land.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, instrument, warn};

use crate::config::ConsoleConfig;
use crate::model::{Resource, ResourceId};
use crate::{AppResult, ErrorInfo, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListStatus {
    #[default]
    Idle,
    Loading,
    Error,
    Ready,
}

// ============================================================================
// Query
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuerySpec")]
pub struct QuerySpec {
    search_term: String,
    page: usize,
    page_size: usize,
    predicates: BTreeMap<String, Value>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            predicates: BTreeMap::new(),
        }
    }
}

/// Wire form of [`QuerySpec`], checked before it becomes one.
#[derive(Deserialize)]
struct RawQuerySpec {
    #[serde(default)]
    search_term: String,
    #[serde(default = "first_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
    #[serde(default)]
    predicates: BTreeMap<String, Value>,
}

fn first_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl TryFrom<RawQuerySpec> for QuerySpec {
    type Error = ErrorInfo;

    fn try_from(raw: RawQuerySpec) -> AppResult<Self> {
        let query = Self {
            search_term: raw.search_term,
            page: raw.page.max(1),
            page_size: raw.page_size,
            predicates: raw.predicates,
        };
        query.validate()?;
        Ok(query)
    }
}

impl QuerySpec {
    pub fn validate(&self) -> AppResult<()> {
        validate_page_size(self.page_size)
    }

    pub fn with_page_size(page_size: usize) -> AppResult<Self> {
        validate_page_size(page_size)?;
        Ok(Self {
            page_size,
            ..Self::default()
        })
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// 1-indexed.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn predicates(&self) -> &BTreeMap<String, Value> {
        &self.predicates
    }

    pub fn predicate(&self, key: &str) -> Option<&Value> {
        self.predicates.get(key)
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.page_size
    }

    /// Query parameters for backends that filter server-side.
    pub fn to_query_pairs(&self, config: &ConsoleConfig) -> Vec<(String, String)> {
        let mut pairs = vec![
            (config.page_param.clone(), self.page.to_string()),
            (config.page_size_param.clone(), self.page_size.to_string()),
        ];
        let term = self.search_term.trim();
        if !term.is_empty() {
            pairs.push((config.search_param.clone(), term.to_string()));
        }
        for (key, value) in &self.predicates {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.push((key.clone(), rendered));
        }
        pairs
    }
}

fn validate_page_size(page_size: usize) -> AppResult<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ErrorInfo::validation(format!(
            "page size must be in 1..={MAX_PAGE_SIZE}, got {page_size}"
        )));
    }
    Ok(())
}

// ============================================================================
// Field extractors
// ============================================================================

type TextExtractor<T> = Box<dyn Fn(&T) -> String + Send + Sync>;
type ValueExtractor<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;

/// Text the free-text search looks at.
pub struct SearchField<T> {
    name: String,
    extract: TextExtractor<T>,
}

impl<T> SearchField<T> {
    pub fn new(
        name: impl Into<String>,
        extract: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            extract: Box::new(extract),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Value an exact-match predicate compares against.
pub struct PredicateField<T> {
    key: String,
    extract: ValueExtractor<T>,
}

impl<T> PredicateField<T> {
    pub fn new(
        key: impl Into<String>,
        extract: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            extract: Box::new(extract),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

// ============================================================================
// View
// ============================================================================

#[derive(Debug, PartialEq)]
pub struct FilteredView<'a, T> {
    pub rows: Vec<&'a Resource<T>>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket {
    seq: u64,
}

impl LoadTicket {
    pub fn seq(self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Ready { count: usize },
    Failed(ErrorInfo),
    /// A newer load was issued; this result was dropped.
    Stale,
}

// ============================================================================
// ListState
// ============================================================================

pub struct ListState<T> {
    items: Vec<Resource<T>>,
    status: ListStatus,
    error: Option<ErrorInfo>,
    query: QuerySpec,
    search_fields: Vec<SearchField<T>>,
    predicate_fields: Vec<PredicateField<T>>,
    issued_seq: u64,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListState<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            status: ListStatus::Idle,
            error: None,
            query: QuerySpec::default(),
            search_fields: Vec::new(),
            predicate_fields: Vec::new(),
            issued_seq: 0,
        }
    }

    pub fn with_query(mut self, query: QuerySpec) -> AppResult<Self> {
        query.validate()?;
        self.query = query;
        Ok(self)
    }

    #[must_use]
    pub fn with_search_field(
        mut self,
        name: impl Into<String>,
        extract: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        self.search_fields.push(SearchField::new(name, extract));
        self
    }

    #[must_use]
    pub fn with_predicate_field(
        mut self,
        key: impl Into<String>,
        extract: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.predicate_fields.push(PredicateField::new(key, extract));
        self
    }

    pub fn items(&self) -> &[Resource<T>] {
        &self.items
    }

    pub fn status(&self) -> ListStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn query(&self) -> &QuerySpec {
        &self.query
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource<T>> {
        self.items.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.get(id).is_some()
    }

    pub fn search_fields(&self) -> impl Iterator<Item = &str> {
        self.search_fields.iter().map(SearchField::name)
    }

    fn position(&self, id: &ResourceId) -> Option<usize> {
        self.items.iter().position(|r| &r.id == id)
    }
}

impl<T: Serialize> ListState<T> {
    /// Convenience for single-owner callers; `&mut self` rules out overlap.
    pub async fn load<F>(&mut self, fetch: F) -> LoadOutcome
    where
        F: Future<Output = AppResult<Vec<Resource<T>>>>,
    {
        let ticket = self.begin_load();
        let result = fetch.await;
        self.finish_load(ticket, result)
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.issued_seq += 1;
        self.status = ListStatus::Loading;
        debug!(seq = self.issued_seq, "load started");
        LoadTicket {
            seq: self.issued_seq,
        }
    }

    /// Retires every ticket issued so far. Called after a confirmed write so
    /// a fetch that started before it cannot bring back the old rows.
    pub fn supersede_loads(&mut self) {
        self.issued_seq += 1;
        if self.status == ListStatus::Loading {
            self.status = if self.error.is_some() {
                ListStatus::Error
            } else {
                ListStatus::Ready
            };
        }
    }

    pub fn is_latest(&self, ticket: LoadTicket) -> bool {
        ticket.seq == self.issued_seq
    }

    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: AppResult<Vec<Resource<T>>>,
    ) -> LoadOutcome {
        if !self.is_latest(ticket) {
            debug!(
                seq = ticket.seq,
                latest = self.issued_seq,
                "discarding stale load result"
            );
            return LoadOutcome::Stale;
        }

        match result {
            Ok(items) => {
                self.items = dedupe_by_id(items);
                self.status = ListStatus::Ready;
                self.error = None;
                self.clamp_page();
                LoadOutcome::Ready {
                    count: self.items.len(),
                }
            }
            Err(error) => {
                warn!(seq = ticket.seq, code = error.code(), "load failed, keeping previous items");
                self.status = ListStatus::Error;
                self.error = Some(error.clone());
                LoadOutcome::Failed(error)
            }
        }
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.query.search_term = term.into();
        self.clamp_page();
    }

    pub fn set_page(&mut self, page: usize) {
        self.query.page = page.max(1);
        self.clamp_page();
    }

    pub fn set_page_size(&mut self, page_size: usize) -> AppResult<()> {
        validate_page_size(page_size)?;
        self.query.page_size = page_size;
        self.clamp_page();
        Ok(())
    }

    /// `Value::Null` clears the predicate (the "all" choice in a filter menu).
    pub fn set_predicate(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.query.predicates.remove(&key);
        } else {
            self.query.predicates.insert(key, value);
        }
        self.clamp_page();
    }

    pub fn clear_predicate(&mut self, key: &str) {
        self.query.predicates.remove(key);
        self.clamp_page();
    }

    pub fn filtered_view(&self) -> FilteredView<'_, T> {
        let matching: Vec<&Resource<T>> = self
            .items
            .iter()
            .filter(|r| self.matches(&r.data))
            .collect();

        let total_count = matching.len();
        let total_pages = pages_for(total_count, self.query.page_size);
        let page = self.query.page.clamp(1, total_pages);
        let rows = matching
            .into_iter()
            .skip((page - 1) * self.query.page_size)
            .take(self.query.page_size)
            .collect();

        FilteredView {
            rows,
            total_count,
            total_pages,
            page,
        }
    }

    pub fn filtered_count(&self) -> usize {
        self.items.iter().filter(|r| self.matches(&r.data)).count()
    }

    pub fn patch(&mut self, id: &ResourceId, updater: impl FnOnce(&mut T)) -> AppResult<()> {
        let index = self.position(id).ok_or_else(|| ErrorInfo::not_found(id))?;
        updater(&mut self.items[index].data);
        self.clamp_page();
        Ok(())
    }

    /// Appends a new id; an id already present is replaced where it stands.
    pub fn insert(&mut self, resource: Resource<T>) {
        match self.position(&resource.id) {
            Some(index) => self.items[index] = resource,
            None => self.items.push(resource),
        }
        self.clamp_page();
    }

    pub fn remove(&mut self, id: &ResourceId) -> AppResult<Resource<T>> {
        let index = self.position(id).ok_or_else(|| ErrorInfo::not_found(id))?;
        let removed = self.items.remove(index);
        self.clamp_page();
        Ok(removed)
    }

    fn clamp_page(&mut self) {
        let total_pages = pages_for(self.filtered_count(), self.query.page_size);
        self.query.page = self.query.page.clamp(1, total_pages);
    }

    fn matches(&self, data: &T) -> bool {
        let mut serialized: Option<Option<Value>> = None;
        let mut as_json = || {
            serialized
                .get_or_insert_with(|| serde_json::to_value(data).ok())
                .clone()
        };

        let term = self.query.search_term.trim().to_lowercase();
        if !term.is_empty() {
            let hit = if self.search_fields.is_empty() {
                as_json().is_some_and(|v| any_top_level_text_contains(&v, &term))
            } else {
                self.search_fields
                    .iter()
                    .any(|field| (field.extract)(data).to_lowercase().contains(&term))
            };
            if !hit {
                return false;
            }
        }

        self.query.predicates.iter().all(|(key, expected)| {
            match self.predicate_fields.iter().find(|f| &f.key == key) {
                Some(field) => &(field.extract)(data) == expected,
                None => as_json()
                    .and_then(|v| v.get(key).cloned())
                    .is_some_and(|actual| &actual == expected),
            }
        })
    }
}

fn pages_for(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1)).max(1)
}

fn any_top_level_text_contains(value: &Value, term: &str) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.values().any(|v| match v {
        Value::String(s) => s.to_lowercase().contains(term),
        Value::Number(n) => n.to_string().contains(term),
        _ => false,
    })
}

/// Later duplicates overwrite earlier ones in the earlier slot.
fn dedupe_by_id<T>(items: Vec<Resource<T>>) -> Vec<Resource<T>> {
    let mut out: Vec<Resource<T>> = Vec::with_capacity(items.len());
    let mut index: std::collections::HashMap<ResourceId, usize> =
        std::collections::HashMap::with_capacity(items.len());
    for item in items {
        if let Some(&at) = index.get(&item.id) {
            warn!(id = %item.id, "duplicate id in fetched collection");
            out[at] = item;
        } else {
            index.insert(item.id.clone(), out.len());
            out.push(item);
        }
    }
    out
}

// ============================================================================
// Shared handle
// ============================================================================

/// A `ListState` shared between a screen and its in-flight requests.
/// The lock is only held around the synchronous halves of a load, never
/// across the fetch itself.
pub struct ListHandle<T> {
    inner: Arc<RwLock<ListState<T>>>,
}

impl<T> Clone for ListHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ListHandle<T> {
    pub fn new(state: ListState<T>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ListState<T>> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ListState<T>> {
        self.inner.write().await
    }
}

impl<T: Serialize> ListHandle<T> {
    #[instrument(skip_all)]
    pub async fn load<F>(&self, fetch: F) -> LoadOutcome
    where
        F: Future<Output = AppResult<Vec<Resource<T>>>>,
    {
        let ticket = self.inner.write().await.begin_load();
        let result = fetch.await;
        self.inner.write().await.finish_load(ticket, result)
    }
}
