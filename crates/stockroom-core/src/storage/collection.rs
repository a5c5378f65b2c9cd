//! Reactive document collections
//!
//! A [`Collection`] keeps an in-memory copy of one collection on top of
//! [`SqlitePersistence`]. Every mutation is persisted before it returns;
//! subscribers then receive the collection's full contents through an
//! unbounded channel, so a slow subscriber never blocks a writer.
//!
//! Mutations on the same collection are serialized by the collection's
//! lock. The persistence lock is only ever taken while holding it, never
//! the other way around. [`restore_both`] holds two collection locks, the
//! first collection's before the second's.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::error::{StoreError, StoreResult};
use super::persistence::SqlitePersistence;
use crate::gateway::RemoteDocument;
use crate::models::{Document, Revision, SyncMeta};

/// Snapshot of a collection's documents in insertion order
pub type Snapshot<T> = Arc<Vec<T>>;

/// Result of applying a remote document locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The document was unknown locally
    Inserted,
    /// Local fields and revision were overwritten
    Updated,
    /// The local copy already carried this revision
    Unchanged,
}

struct State<T> {
    docs: Snapshot<T>,
    observers: Vec<(u64, mpsc::UnboundedSender<Snapshot<T>>)>,
    next_observer: u64,
}

impl<T: Document> State<T> {
    fn position(&self, id: &str) -> Option<usize> {
        self.docs.iter().position(|doc| doc.id() == id)
    }

    fn notify(&mut self) {
        let snapshot = Arc::clone(&self.docs);
        self.observers
            .retain(|(_, sender)| sender.send(Arc::clone(&snapshot)).is_ok());
        trace!(
            collection = %T::COLLECTION,
            observers = self.observers.len(),
            "Notified observers"
        );
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    persistence: Arc<SqlitePersistence>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A durable, observable collection of documents
pub struct Collection<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Document> Collection<T> {
    /// Load the collection from persistence
    pub fn open(persistence: Arc<SqlitePersistence>) -> StoreResult<Self> {
        let docs: Vec<T> = persistence.load()?;
        debug!(collection = %T::COLLECTION, count = docs.len(), "Loaded collection");

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    docs: Arc::new(docs),
                    observers: Vec::new(),
                    next_observer: 0,
                }),
                persistence,
            }),
        })
    }

    /// Insert a new document as pending
    ///
    /// Any metadata on `doc` is reset: the stored copy has no revision and
    /// is not tombstoned.
    pub fn insert(&self, mut doc: T) -> StoreResult<T> {
        *doc.meta_mut() = SyncMeta::default();
        self.validate(&doc)?;

        let mut state = self.shared.lock();
        if state.position(doc.id()).is_some() {
            return Err(StoreError::DuplicateKey {
                collection: T::COLLECTION,
                id: doc.id().to_string(),
            });
        }

        self.shared.persistence.upsert(&doc)?;
        Arc::make_mut(&mut state.docs).push(doc.clone());
        state.notify();

        debug!(collection = %T::COLLECTION, id = %doc.id(), "Inserted document");
        Ok(doc)
    }

    pub fn find_by_id(&self, id: &str) -> Option<T> {
        let state = self.shared.lock();
        state.docs.iter().find(|doc| doc.id() == id).cloned()
    }

    /// Documents matching `predicate`, in insertion order
    ///
    /// The returned sequence is evaluated lazily over a snapshot taken
    /// now; later writes do not affect it.
    pub fn find_where<P>(&self, predicate: P) -> Matches<T, P>
    where
        P: Fn(&T) -> bool,
    {
        Matches::new(self.snapshot(), predicate)
    }

    /// Every document, tombstoned ones included
    pub fn find_all(&self) -> Vec<T> {
        self.snapshot().as_ref().clone()
    }

    /// Current contents, shared with subscribers
    pub fn snapshot(&self) -> Snapshot<T> {
        Arc::clone(&self.shared.lock().docs)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge a partial update into an existing document
    ///
    /// Editing a synced document marks it modified so the next pass pushes
    /// it.
    pub fn update(&self, id: &str, patch: T::Patch) -> StoreResult<T> {
        self.mutate(id, |doc| {
            doc.apply_patch(patch);
            if doc.meta().revision.is_some() {
                doc.meta_mut().modified = true;
            }
            Ok(())
        })
    }

    /// Slate a document for deletion; tombstoning twice changes nothing
    pub fn tombstone(&self, id: &str) -> StoreResult<T> {
        let mut state = self.shared.lock();
        let pos = self.require(&state, id)?;
        if state.docs[pos].is_tombstoned() {
            return Ok(state.docs[pos].clone());
        }

        let mut doc = state.docs[pos].clone();
        doc.meta_mut().tombstoned = true;
        self.commit(&mut state, pos, doc.clone())?;

        debug!(collection = %T::COLLECTION, id, "Tombstoned document");
        Ok(doc)
    }

    /// Physically remove a document; absent ids are a no-op
    pub fn purge(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.shared.lock();
        let Some(pos) = state.position(id) else {
            return Ok(false);
        };

        self.shared.persistence.delete(T::COLLECTION, id)?;
        Arc::make_mut(&mut state.docs).remove(pos);
        state.notify();

        debug!(collection = %T::COLLECTION, id, "Purged document");
        Ok(true)
    }

    /// Subscribe to the collection's contents
    ///
    /// The current contents are delivered first, then one snapshot per
    /// mutation.
    pub fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.shared.lock();
        let id = state.next_observer;
        state.next_observer += 1;

        // The receiver is alive, so this cannot fail
        let _ = sender.send(Arc::clone(&state.docs));
        state.observers.push((id, sender));

        Subscription {
            id,
            receiver,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of live subscriptions
    pub fn observer_count(&self) -> usize {
        self.shared.lock().observers.len()
    }

    // ==================== Replication ====================

    /// Documents the push phase has work for, in insertion order
    pub fn needing_push(&self) -> Vec<T> {
        self.snapshot()
            .iter()
            .filter(|doc| doc.needs_push())
            .cloned()
            .collect()
    }

    /// Bring a remote document into the local store (remote wins)
    ///
    /// Unknown ids are inserted with the remote revision attached. Known
    /// ids carrying a different revision have their fields and revision
    /// overwritten; a local tombstone survives so the delete is still
    /// pushed.
    pub fn apply_remote(&self, remote: &RemoteDocument) -> StoreResult<ApplyOutcome> {
        let invalid = |reason: String| StoreError::Invalid {
            collection: T::COLLECTION,
            id: remote.id.clone(),
            reason,
        };

        let mut state = self.shared.lock();
        match state.position(&remote.id) {
            None => {
                let doc = T::from_remote(remote).map_err(invalid)?;
                self.validate(&doc)?;
                self.shared.persistence.upsert(&doc)?;
                Arc::make_mut(&mut state.docs).push(doc);
                state.notify();
                Ok(ApplyOutcome::Inserted)
            }
            Some(pos) if state.docs[pos].revision() == Some(&remote.revision) => {
                Ok(ApplyOutcome::Unchanged)
            }
            Some(pos) => {
                let mut doc = state.docs[pos].clone();
                doc.overwrite_fields(remote).map_err(invalid)?;
                self.validate(&doc)?;
                let meta = doc.meta_mut();
                meta.revision = Some(remote.revision.clone());
                meta.modified = false;
                self.commit(&mut state, pos, doc)?;
                Ok(ApplyOutcome::Updated)
            }
        }
    }

    /// Attach the revision returned by a confirmed remote write
    ///
    /// `pushed` is the copy that was sent. If the local document changed
    /// while the write was in flight it stays modified. Returns `false`
    /// when the document no longer exists locally.
    pub fn mark_synced(&self, id: &str, revision: Revision, pushed: &T) -> StoreResult<bool> {
        let mut state = self.shared.lock();
        let Some(pos) = state.position(id) else {
            return Ok(false);
        };

        let mut doc = state.docs[pos].clone();
        let changed = doc.to_remote() != pushed.to_remote();
        let meta = doc.meta_mut();
        meta.revision = Some(revision);
        meta.modified = changed;
        self.commit(&mut state, pos, doc)?;
        Ok(true)
    }

    /// Take a fresh remote revision while keeping local fields
    ///
    /// Used after a revision conflict so the local edit can be retried.
    pub fn adopt_revision(&self, id: &str, revision: Revision) -> StoreResult<T> {
        self.mutate(id, |doc| {
            let meta = doc.meta_mut();
            meta.revision = Some(revision);
            meta.modified = true;
            Ok(())
        })
    }

    /// Copy of every document for export
    pub fn dump(&self) -> Vec<T> {
        self.find_all()
    }

    /// Validate every document and reject repeated ids
    pub fn check_replacement(&self, docs: &[T]) -> StoreResult<()> {
        let mut seen = HashSet::new();
        for doc in docs {
            self.validate(doc)?;
            if !seen.insert(doc.id()) {
                return Err(StoreError::DuplicateKey {
                    collection: T::COLLECTION,
                    id: doc.id().to_string(),
                });
            }
        }
        Ok(())
    }

    // ==================== Internals ====================

    fn validate(&self, doc: &T) -> StoreResult<()> {
        doc.validate().map_err(|reason| StoreError::Invalid {
            collection: T::COLLECTION,
            id: doc.id().to_string(),
            reason,
        })
    }

    fn require(&self, state: &State<T>, id: &str) -> StoreResult<usize> {
        state.position(id).ok_or_else(|| StoreError::NotFound {
            collection: T::COLLECTION,
            id: id.to_string(),
        })
    }

    /// Apply `change` to a copy of the document, then validate and commit it
    fn mutate<F>(&self, id: &str, change: F) -> StoreResult<T>
    where
        F: FnOnce(&mut T) -> StoreResult<()>,
    {
        let mut state = self.shared.lock();
        let pos = self.require(&state, id)?;

        let mut doc = state.docs[pos].clone();
        change(&mut doc)?;
        if doc.id() != id {
            return Err(StoreError::Invalid {
                collection: T::COLLECTION,
                id: id.to_string(),
                reason: "id cannot change".to_string(),
            });
        }
        self.validate(&doc)?;
        self.commit(&mut state, pos, doc.clone())?;
        Ok(doc)
    }

    /// Persist `doc`, then replace it in memory and notify
    fn commit(&self, state: &mut State<T>, pos: usize, doc: T) -> StoreResult<()> {
        self.shared.persistence.upsert(&doc)?;
        Arc::make_mut(&mut state.docs)[pos] = doc;
        state.notify();
        Ok(())
    }
}

/// Replace two collections sharing one persistence, all or nothing
///
/// Both replacements are checked before anything is written, and both are
/// written in one transaction before either in-memory copy changes.
pub fn restore_both<A: Document, B: Document>(
    first: &Collection<A>,
    first_docs: Vec<A>,
    second: &Collection<B>,
    second_docs: Vec<B>,
) -> StoreResult<()> {
    first.check_replacement(&first_docs)?;
    second.check_replacement(&second_docs)?;

    let mut first_state = first.shared.lock();
    let mut second_state = second.shared.lock();
    first
        .shared
        .persistence
        .replace_both(&first_docs, &second_docs)?;

    first_state.docs = Arc::new(first_docs);
    second_state.docs = Arc::new(second_docs);
    first_state.notify();
    second_state.notify();

    debug!(
        first = %A::COLLECTION,
        second = %B::COLLECTION,
        "Restored collections"
    );
    Ok(())
}

/// Lazy, restartable sequence of documents matching a predicate
pub struct Matches<T, P> {
    docs: Snapshot<T>,
    predicate: P,
    cursor: usize,
}

impl<T: Clone, P: Fn(&T) -> bool> Matches<T, P> {
    fn new(docs: Snapshot<T>, predicate: P) -> Self {
        Self {
            docs,
            predicate,
            cursor: 0,
        }
    }

    /// Start again from the first document
    pub fn restart(&mut self) {
        self.cursor = 0;
    }
}

impl<T: Clone, P: Fn(&T) -> bool> Iterator for Matches<T, P> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while let Some(doc) = self.docs.get(self.cursor) {
            self.cursor += 1;
            if (self.predicate)(doc) {
                return Some(doc.clone());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.docs.len().saturating_sub(self.cursor)))
    }
}

/// Receives collection snapshots until unsubscribed or dropped
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Snapshot<T>>,
    shared: Weak<Shared<T>>,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot; `None` once the collection is gone
    pub async fn next(&mut self) -> Option<Snapshot<T>> {
        self.receiver.recv().await
    }

    /// Next snapshot if one is already queued
    pub fn try_next(&mut self) -> Option<Snapshot<T>> {
        self.receiver.try_recv().ok()
    }

    /// Most recent queued snapshot, skipping older ones
    pub fn latest(&mut self) -> Option<Snapshot<T>> {
        let mut latest = None;
        while let Ok(snapshot) = self.receiver.try_recv() {
            latest = Some(snapshot);
        }
        latest
    }

    /// Stop receiving snapshots
    pub fn unsubscribe(self) {}

    fn detach(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .lock()
                .observers
                .retain(|(observer, _)| *observer != self.id);
        }
        self.receiver.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, Business, BusinessPatch, NewArticle};
    use serde_json::json;

    fn businesses() -> Collection<Business> {
        let db = Arc::new(SqlitePersistence::open_in_memory().unwrap());
        Collection::open(db).unwrap()
    }

    fn bolt(business_id: &str) -> NewArticle {
        NewArticle {
            name: "Bolt".to_string(),
            quantity: 3,
            unit_price: 0.5,
            business_id: business_id.to_string(),
        }
    }

    fn rename(name: &str) -> BusinessPatch {
        BusinessPatch {
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_insert_resets_metadata() {
        let col = businesses();
        let mut b = Business::with_id("b1", "Acme");
        b.meta.revision = Some(Revision::from("7-x"));
        b.meta.tombstoned = true;

        let stored = col.insert(b).unwrap();
        assert!(stored.is_pending());
        assert!(!stored.is_tombstoned());
        assert_eq!(col.find_by_id("b1"), Some(stored));
    }

    #[test]
    fn test_insert_duplicate_key() {
        let col = businesses();
        col.insert(Business::with_id("b1", "Acme")).unwrap();
        let err = col.insert(Business::with_id("b1", "Other")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(col.find_by_id("b1").unwrap().name, "Acme");
    }

    #[test]
    fn test_insert_invalid() {
        let col = businesses();
        let err = col.insert(Business::with_id("b1", "  ")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
        assert!(col.is_empty());
    }

    #[test]
    fn test_find_by_id_missing_is_none() {
        assert!(businesses().find_by_id("nope").is_none());
    }

    #[test]
    fn test_find_where_is_ordered_and_restartable() {
        let col = businesses();
        for (id, name) in [("z", "Zeta"), ("a", "Alpha"), ("m", "Ada")] {
            col.insert(Business::with_id(id, name)).unwrap();
        }

        let mut matches = col.find_where(|b| b.name.starts_with('A'));
        let first: Vec<String> = matches.by_ref().map(|b| b.id).collect();
        assert_eq!(first, vec!["a", "m"]);
        assert!(matches.next().is_none());

        matches.restart();
        let again: Vec<String> = matches.map(|b| b.id).collect();
        assert_eq!(again, first);

        let all_once: Vec<String> = col.find_where(|_| true).map(|b| b.id).collect();
        let all_twice: Vec<String> = col.find_where(|_| true).map(|b| b.id).collect();
        assert_eq!(all_once, vec!["z", "a", "m"]);
        assert_eq!(all_once, all_twice);
    }

    #[test]
    fn test_update_merges_and_marks_synced_docs_modified() {
        let col = businesses();
        col.insert(Business::with_id("b1", "Acme")).unwrap();

        let pending = col.update("b1", rename("Acme Ltd")).unwrap();
        assert_eq!(pending.name, "Acme Ltd");
        assert!(!pending.is_modified());

        let remote = RemoteDocument::new("b1", "1-a", json!({"name": "Acme Ltd"}));
        col.apply_remote(&remote).unwrap();
        let synced = col.update("b1", rename("Acme Inc")).unwrap();
        assert!(synced.is_modified());
        assert!(synced.needs_push());
    }

    #[test]
    fn test_update_missing_and_invalid() {
        let col = businesses();
        assert!(matches!(
            col.update("nope", rename("x")),
            Err(StoreError::NotFound { .. })
        ));

        col.insert(Business::with_id("b1", "Acme")).unwrap();
        assert!(matches!(
            col.update("b1", rename("")),
            Err(StoreError::Invalid { .. })
        ));
        assert_eq!(col.find_by_id("b1").unwrap().name, "Acme");
    }

    #[test]
    fn test_tombstone_is_idempotent() {
        let col = businesses();
        col.insert(Business::with_id("b1", "Acme")).unwrap();
        let mut sub = col.subscribe();
        sub.latest();

        assert!(col.tombstone("b1").unwrap().is_tombstoned());
        assert!(col.tombstone("b1").unwrap().is_tombstoned());
        assert_eq!(sub.latest().map(|s| s.len()), Some(1));
        assert!(sub.try_next().is_none());

        assert!(matches!(
            col.tombstone("nope"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_purge_absent_is_noop() {
        let col = businesses();
        col.insert(Business::with_id("b1", "Acme")).unwrap();
        assert!(col.purge("b1").unwrap());
        assert!(!col.purge("b1").unwrap());
        assert!(col.is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_full_contents() {
        let col = businesses();
        let mut sub = col.subscribe();
        assert_eq!(sub.next().await.unwrap().len(), 0);

        col.insert(Business::with_id("b1", "Acme")).unwrap();
        col.insert(Business::with_id("b2", "Bolt")).unwrap();
        col.purge("b1").unwrap();

        assert_eq!(sub.next().await.unwrap().len(), 1);
        assert_eq!(sub.next().await.unwrap().len(), 2);
        let last = sub.next().await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id, "b2");
    }

    #[test]
    fn test_unsubscribe_and_drop_detach() {
        let col = businesses();
        let first = col.subscribe();
        let second = col.subscribe();
        assert_eq!(col.observer_count(), 2);

        first.unsubscribe();
        assert_eq!(col.observer_count(), 1);
        drop(second);
        assert_eq!(col.observer_count(), 0);

        col.insert(Business::with_id("b1", "Acme")).unwrap();
    }

    #[test]
    fn test_apply_remote_outcomes() {
        let col = businesses();
        let remote = RemoteDocument::new("b1", "1-a", json!({"name": "Acme"}));
        assert_eq!(col.apply_remote(&remote).unwrap(), ApplyOutcome::Inserted);
        assert_eq!(col.apply_remote(&remote).unwrap(), ApplyOutcome::Unchanged);

        let newer = RemoteDocument::new("b1", "2-b", json!({"name": "Acme Ltd"}));
        assert_eq!(col.apply_remote(&newer).unwrap(), ApplyOutcome::Updated);

        let b = col.find_by_id("b1").unwrap();
        assert_eq!(b.name, "Acme Ltd");
        assert_eq!(b.revision(), Some(&Revision::from("2-b")));
    }

    #[test]
    fn test_apply_remote_keeps_tombstone() {
        let col = businesses();
        col.apply_remote(&RemoteDocument::new("b1", "1-a", json!({"name": "Acme"})))
            .unwrap();
        col.tombstone("b1").unwrap();

        col.apply_remote(&RemoteDocument::new("b1", "2-b", json!({"name": "Acme 2"})))
            .unwrap();
        let b = col.find_by_id("b1").unwrap();
        assert!(b.is_tombstoned());
        assert_eq!(b.revision(), Some(&Revision::from("2-b")));
    }

    #[test]
    fn test_apply_remote_rejects_malformed() {
        let col = businesses();
        let remote = RemoteDocument::new("b1", "1-a", json!({"title": "x"}));
        assert!(matches!(
            col.apply_remote(&remote),
            Err(StoreError::Invalid { .. })
        ));
        assert!(col.is_empty());
    }

    #[test]
    fn test_mark_synced_detects_in_flight_edit() {
        let col = businesses();
        let pushed = col.insert(Business::with_id("b1", "Acme")).unwrap();
        assert!(col.mark_synced("b1", Revision::from("1-a"), &pushed).unwrap());
        assert!(!col.find_by_id("b1").unwrap().needs_push());

        let pushed = col.update("b1", rename("Acme 2")).unwrap();
        col.update("b1", rename("Acme 3")).unwrap();
        col.mark_synced("b1", Revision::from("2-b"), &pushed).unwrap();
        let b = col.find_by_id("b1").unwrap();
        assert!(b.is_modified());
        assert_eq!(b.revision(), Some(&Revision::from("2-b")));

        assert!(!col.mark_synced("gone", Revision::from("1-a"), &pushed).unwrap());
    }

    #[test]
    fn test_needing_push() {
        let col = businesses();
        col.insert(Business::with_id("b1", "Pending")).unwrap();
        col.apply_remote(&RemoteDocument::new("b2", "1-a", json!({"name": "Synced"})))
            .unwrap();
        col.apply_remote(&RemoteDocument::new("b3", "1-a", json!({"name": "Doomed"})))
            .unwrap();
        col.tombstone("b3").unwrap();

        let ids: Vec<String> = col.needing_push().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["b1", "b3"]);
    }

    #[test]
    fn test_adopt_revision_keeps_fields() {
        let col = businesses();
        col.apply_remote(&RemoteDocument::new("b1", "1-a", json!({"name": "Acme"})))
            .unwrap();
        col.update("b1", rename("Local")).unwrap();

        let b = col.adopt_revision("b1", Revision::from("2-remote")).unwrap();
        assert_eq!(b.name, "Local");
        assert!(b.is_modified());
        assert_eq!(b.revision(), Some(&Revision::from("2-remote")));
    }

    #[tokio::test]
    async fn test_restore_both_replaces_contents() {
        let db = Arc::new(SqlitePersistence::open_in_memory().unwrap());
        let biz: Collection<Business> = Collection::open(Arc::clone(&db)).unwrap();
        let arts: Collection<Article> = Collection::open(Arc::clone(&db)).unwrap();
        biz.insert(Business::with_id("old", "Old")).unwrap();
        let mut sub = arts.subscribe();
        assert!(sub.next().await.unwrap().is_empty());

        let new_biz = vec![Business::with_id("n1", "One"), Business::with_id("n2", "Two")];
        let new_arts = vec![Article::with_id("a1", bolt("n1"))];
        restore_both(&biz, new_biz.clone(), &arts, new_arts.clone()).unwrap();
        assert_eq!(biz.dump(), new_biz);
        assert_eq!(arts.dump(), new_arts);
        assert_eq!(sub.next().await.unwrap().len(), 1);

        let reopened: Collection<Business> = Collection::open(db).unwrap();
        assert_eq!(reopened.dump(), new_biz);
    }

    #[test]
    fn test_restore_both_rejects_before_writing() {
        let db = Arc::new(SqlitePersistence::open_in_memory().unwrap());
        let biz: Collection<Business> = Collection::open(Arc::clone(&db)).unwrap();
        let arts: Collection<Article> = Collection::open(Arc::clone(&db)).unwrap();
        biz.insert(Business::with_id("old", "Old")).unwrap();

        let dup = vec![
            Article::with_id("d", bolt("n1")),
            Article::with_id("d", bolt("n1")),
        ];
        assert!(matches!(
            restore_both(&biz, vec![Business::with_id("n1", "One")], &arts, dup),
            Err(StoreError::DuplicateKey { .. })
        ));
        assert_eq!(biz.dump()[0].id, "old");
        assert!(arts.is_empty());

        let reopened: Collection<Business> = Collection::open(db).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_contents_survive_reopen() {
        let db = Arc::new(SqlitePersistence::open_in_memory().unwrap());
        let articles: Collection<Article> = Collection::open(Arc::clone(&db)).unwrap();
        let a = articles
            .insert(Article::with_id(
                "a1",
                NewArticle {
                    name: "Bolt".to_string(),
                    quantity: 3,
                    unit_price: 0.1 + 0.2,
                    business_id: "b1".to_string(),
                },
            ))
            .unwrap();

        let reopened: Collection<Article> = Collection::open(db).unwrap();
        assert_eq!(reopened.find_by_id("a1"), Some(a));
    }
}
