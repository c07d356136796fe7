use crate::{error::AuthzError, models::*};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Repository interface for storing relationship tuples
#[async_trait]
pub trait TupleRepository: Send + Sync {
    /// Write a single tuple, replacing any tuple with the same key
    async fn write_tuple(&self, tuple: Tuple) -> Result<(), AuthzError>;

    /// Delete a single tuple. Deleting a missing tuple is not an error.
    async fn delete_tuple(&self, tuple: Tuple) -> Result<(), AuthzError>;

    /// Apply all deletes, then all writes
    async fn batch_write(&self, request: WriteRequest) -> Result<(), AuthzError>;

    /// Read tuples matching the given filter
    async fn read_tuples(&self, filter: &TupleFilter) -> Result<Vec<Tuple>, AuthzError>;

    /// Tuples for one relation on one object
    async fn list_relation_tuples(
        &self,
        object: &ObjectRef,
        relation: &str,
    ) -> Result<Vec<Tuple>, AuthzError> {
        self.read_tuples(&TupleFilter::for_relation(object, relation))
            .await
    }

    /// Tuples for every relation on one object
    async fn list_object_tuples(&self, object: &ObjectRef) -> Result<Vec<Tuple>, AuthzError> {
        self.read_tuples(&TupleFilter::for_object(object)).await
    }

    /// Check if a tuple with the same key exists
    async fn tuple_exists(&self, tuple: &Tuple) -> Result<bool, AuthzError> {
        let candidates = self
            .read_tuples(
                &TupleFilter::for_relation(&tuple.object, &tuple.relation)
                    .with_subject_type(&tuple.subject.subject_type),
            )
            .await?;
        Ok(candidates.iter().any(|t| t.subject == tuple.subject))
    }
}

/// In-memory tuple repository for testing and development.
///
/// Tuples are indexed by object, so every read the checker issues touches a
/// single shard. Writes to one object are visible to the next read.
pub struct InMemoryTupleRepository {
    tuples: Arc<DashMap<ObjectRef, Vec<Tuple>>>,
}

impl InMemoryTupleRepository {
    pub fn new() -> Self {
        Self {
            tuples: Arc::new(DashMap::new()),
        }
    }

    /// Build a repository pre-populated with tuples
    pub fn with_tuples(tuples: impl IntoIterator<Item = Tuple>) -> Self {
        let repo = Self::new();
        for tuple in tuples {
            repo.upsert(tuple);
        }
        repo
    }

    pub fn len(&self) -> usize {
        self.tuples.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn upsert(&self, tuple: Tuple) {
        let mut entry = self.tuples.entry(tuple.object.clone()).or_default();
        let key = tuple.key();
        match entry.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => *existing = tuple,
            None => entry.push(tuple),
        }
    }

    fn remove(&self, tuple: &Tuple) {
        let key = tuple.key();
        let now_empty = match self.tuples.get_mut(&tuple.object) {
            Some(mut entry) => {
                entry.retain(|existing| existing.key() != key);
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.tuples.remove_if(&tuple.object, |_, tuples| tuples.is_empty());
        }
    }
}

impl Default for InMemoryTupleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleRepository for InMemoryTupleRepository {
    async fn write_tuple(&self, tuple: Tuple) -> Result<(), AuthzError> {
        self.upsert(tuple);
        Ok(())
    }

    async fn delete_tuple(&self, tuple: Tuple) -> Result<(), AuthzError> {
        self.remove(&tuple);
        Ok(())
    }

    async fn batch_write(&self, request: WriteRequest) -> Result<(), AuthzError> {
        // Group by object so each object's change set is applied under a
        // single shard lock and readers never see it half-applied.
        let mut by_object: BTreeMap<ObjectRef, (Vec<Tuple>, Vec<Tuple>)> = BTreeMap::new();
        for tuple in request.deletes {
            by_object.entry(tuple.object.clone()).or_default().0.push(tuple);
        }
        for tuple in request.writes {
            by_object.entry(tuple.object.clone()).or_default().1.push(tuple);
        }

        for (object, (deletes, writes)) in by_object {
            let mut entry = self.tuples.entry(object.clone()).or_default();
            for tuple in &deletes {
                let key = tuple.key();
                entry.retain(|existing| existing.key() != key);
            }
            for tuple in writes {
                let key = tuple.key();
                match entry.iter_mut().find(|existing| existing.key() == key) {
                    Some(existing) => *existing = tuple,
                    None => entry.push(tuple),
                }
            }
            drop(entry);

            self.tuples.remove_if(&object, |_, tuples| tuples.is_empty());
        }

        Ok(())
    }

    async fn read_tuples(&self, filter: &TupleFilter) -> Result<Vec<Tuple>, AuthzError> {
        if let (Some(object_type), Some(object_id)) = (&filter.object_type, &filter.object_id) {
            let object = ObjectRef::new(object_type, object_id);
            return Ok(self
                .tuples
                .get(&object)
                .map(|entry| {
                    entry
                        .iter()
                        .filter(|tuple| filter.matches(tuple))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default());
        }

        let tuples: Vec<Tuple> = self
            .tuples
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|tuple| filter.matches(tuple))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(tuples)
    }
}
