//! Queries over the document index.
//!
//! Queries read the asynchronously maintained index, not the transaction
//! buffer, so by default they may miss the latest commits. Call
//! [`Query::wait_for_non_stale_results`] when a query must observe every commit
//! that happened before it started.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::DateTime;
use serde_json::Value;

use crate::document::{Document, DocumentId};
use crate::errors::{FolioError, Result};
use crate::model::Entity;
use crate::store::DocumentStore;

/// Pseudo-field that matches a document's id.
pub const ID_FIELD: &str = "id()";

#[derive(Debug, Clone)]
enum Predicate {
    Equals { field: String, value: Value },
    Search { field: String, term: String },
}

impl Predicate {
    fn matches(&self, id: &str, document: &Document) -> bool {
        match self {
            Predicate::Equals { field, value } if field == ID_FIELD => value.as_str() == Some(id),
            Predicate::Equals { field, value } => {
                document.field(field).unwrap_or(&Value::Null) == value
            }
            Predicate::Search { field, term } => document
                .field(field)
                .is_some_and(|candidate| term_matches(candidate, term)),
        }
    }
}

/// Term match: array elements are matched individually, strings by whole
/// word, all case-insensitively.
fn term_matches(value: &Value, term: &str) -> bool {
    match value {
        Value::String(text) => {
            text.eq_ignore_ascii_case(term)
                || text
                    .split_whitespace()
                    .any(|word| word.eq_ignore_ascii_case(term))
        }
        Value::Array(items) => items.iter().any(|item| term_matches(item, term)),
        Value::Number(number) => number.to_string() == term,
        Value::Bool(flag) => flag.to_string().eq_ignore_ascii_case(term),
        Value::Null | Value::Object(_) => false,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Orders field values for `order_by`. Missing fields sort first; RFC 3339
/// timestamps compare chronologically.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.unwrap_or(&Value::Null);
    let right = right.unwrap_or(&Value::Null);
    match (left, right) {
        (Value::String(a), Value::String(b)) => {
            match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

#[derive(Debug, Clone)]
struct OrderBy {
    field: String,
    descending: bool,
}

/// A query over the documents of `T`'s collection.
///
/// All `where_equals` and `search` clauses must match.
pub struct Query<'a, T> {
    store: &'a DocumentStore,
    predicates: Vec<Predicate>,
    order_by: Option<OrderBy>,
    wait_for_non_stale: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Entity> Query<'a, T> {
    pub(crate) fn new(store: &'a DocumentStore) -> Self {
        Self {
            store,
            predicates: Vec::new(),
            order_by: None,
            wait_for_non_stale: false,
            _entity: PhantomData,
        }
    }

    /// Requires `field` to equal `value`. Use [`ID_FIELD`] to match the id.
    pub fn where_equals(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Equals {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    /// Readability connector between clauses; clauses are always conjunctive.
    pub fn and_also(self) -> Self {
        self
    }

    /// Requires `field` to contain `term` (array element or whole word).
    pub fn search(mut self, field: &str, term: &str) -> Self {
        self.predicates.push(Predicate::Search {
            field: field.to_string(),
            term: term.to_string(),
        });
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_descending(mut self, field: &str) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    /// Waits for the index to include every commit made before the query runs.
    pub fn wait_for_non_stale_results(mut self) -> Self {
        self.wait_for_non_stale = true;
        self
    }

    /// Projects a single field of every match.
    pub fn select_field(self, field: &str) -> Projection<'a, T> {
        Projection {
            query: self,
            field: field.to_string(),
        }
    }

    fn candidates(&self) -> Vec<(DocumentId, Arc<Document>)> {
        let by_id = self.predicates.iter().find_map(|predicate| match predicate {
            Predicate::Equals { field, value } if field == ID_FIELD => Some(value.as_str()),
            _ => None,
        });
        match by_id {
            Some(Some(id)) => self
                .store
                .indexer()
                .get(T::COLLECTION, id)
                .map(|document| vec![(id.to_string(), document)])
                .unwrap_or_default(),
            Some(None) => Vec::new(),
            None => self.store.indexer().documents(T::COLLECTION),
        }
    }

    fn execute(&self) -> Result<Vec<(DocumentId, Arc<Document>)>> {
        if self.wait_for_non_stale {
            self.store
                .indexer()
                .wait_for_non_stale(self.store.options().non_stale_timeout)?;
        }

        let mut matches: Vec<(DocumentId, Arc<Document>)> = self
            .candidates()
            .into_iter()
            .filter(|(id, document)| {
                self.predicates
                    .iter()
                    .all(|predicate| predicate.matches(id, document))
            })
            .collect();

        match &self.order_by {
            Some(order) => matches.sort_by(|(left_id, left), (right_id, right)| {
                let ordering = compare_values(left.field(&order.field), right.field(&order.field))
                    .then_with(|| left_id.cmp(right_id));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }),
            None => matches.sort_by(|(left_id, _), (right_id, _)| left_id.cmp(right_id)),
        }
        Ok(matches)
    }

    /// All matching entities.
    ///
    /// # Errors
    ///
    /// Fails on a non-stale timeout or a document that does not deserialize.
    pub fn to_list(self) -> Result<Vec<T>> {
        self.execute()?
            .iter()
            .map(|(id, document)| document.to_entity(id))
            .collect()
    }

    /// The single match, or `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::MultipleResults` when more than one document
    /// matches.
    pub fn single_or_default(self) -> Result<Option<T>> {
        let matches = self.execute()?;
        match matches.as_slice() {
            [] => Ok(None),
            [(id, document)] => Ok(Some(document.to_entity(id)?)),
            _ => Err(FolioError::MultipleResults {
                collection: T::COLLECTION.to_string(),
                found: matches.len(),
            }),
        }
    }

    /// The first match in query order, or `None`.
    pub fn first_or_default(self) -> Result<Option<T>> {
        self.execute()?
            .first()
            .map(|(id, document)| document.to_entity(id))
            .transpose()
    }

    pub fn count(self) -> Result<u64> {
        Ok(self.execute()?.len() as u64)
    }
}

/// A query returning one field per match instead of whole entities.
pub struct Projection<'a, T> {
    query: Query<'a, T>,
    field: String,
}

impl<T: Entity> Projection<'_, T> {
    /// The projected field of every match; missing fields project to `null`.
    pub fn to_list(self) -> Result<Vec<Value>> {
        Ok(self
            .query
            .execute()?
            .iter()
            .map(|(_, document)| document.field(&self.field).cloned().unwrap_or(Value::Null))
            .collect())
    }

    /// The projected field of the single match, `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::MultipleResults` when more than one document
    /// matches.
    pub fn single_or_default(self) -> Result<Option<Value>> {
        let mut values = self.to_list_checked()?;
        Ok(values.pop())
    }

    fn to_list_checked(self) -> Result<Vec<Value>> {
        let values = self.to_list()?;
        if values.len() > 1 {
            return Err(FolioError::MultipleResults {
                collection: T::COLLECTION.to_string(),
                found: values.len(),
            });
        }
        Ok(values)
    }
}
