//! CRUD mediation between typed entities and a record-level store
//!
//! Writes run the full lifecycle pipeline (see [`crate::lifecycle`]). Deletes
//! go straight to the store without conversion or hooks. Reads convert each
//! returned record in order and fire no hooks.
//!
//! Async variants run the pre hooks and the entity conversion on the calling
//! thread before handing the record to the store. The post hooks and the
//! conversion back run inside the store's completion callback, on whatever
//! thread the store uses.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::convert::EntityConverter;
use crate::error::Result;
use crate::lifecycle::{LifecycleEvent, LifecycleObservers};
use crate::query::StructuredQuery;
use crate::store::{Callback, CollectionManager, Completion};
use crate::types::{Record, Ttl};

/// Coordinates a [`CollectionManager`], an [`EntityConverter`], and
/// lifecycle observers for one entity type
pub struct CrudMediator<E> {
    manager: Arc<dyn CollectionManager>,
    converter: Arc<dyn EntityConverter<E>>,
    observers: Arc<LifecycleObservers<E>>,
}

impl<E> CrudMediator<E>
where
    E: Send + 'static,
{
    pub fn new(
        manager: Arc<dyn CollectionManager>,
        converter: Arc<dyn EntityConverter<E>>,
        observers: LifecycleObservers<E>,
    ) -> Self {
        Self {
            manager,
            converter,
            observers: Arc::new(observers),
        }
    }

    pub fn manager(&self) -> &Arc<dyn CollectionManager> {
        &self.manager
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn save(&self, entity: &E) -> Result<E> {
        self.write("save", entity, |manager, record| manager.save(record))
    }

    /// Save with a time-to-live
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` from stores without TTL support.
    pub fn save_with_ttl(&self, entity: &E, ttl: Ttl) -> Result<E> {
        self.write("save_with_ttl", entity, |manager, record| {
            manager.save_with_ttl(record, ttl)
        })
    }

    pub fn update(&self, entity: &E) -> Result<E> {
        self.write("update", entity, |manager, record| manager.update(record))
    }

    /// Save each entity in order; the first failure stops the batch
    pub fn save_all(&self, entities: &[E]) -> Result<Vec<E>> {
        entities.iter().map(|entity| self.save(entity)).collect()
    }

    pub fn save_all_with_ttl(&self, entities: &[E], ttl: Ttl) -> Result<Vec<E>> {
        entities
            .iter()
            .map(|entity| self.save_with_ttl(entity, ttl))
            .collect()
    }

    pub fn update_all(&self, entities: &[E]) -> Result<Vec<E>> {
        entities.iter().map(|entity| self.update(entity)).collect()
    }

    /// Hand a save to the store and return immediately
    ///
    /// # Errors
    /// The outer error reports failures before the store accepted the work:
    /// a pre hook, the conversion, or a store without async support. Store
    /// and post-hook failures arrive through the [`Completion`].
    pub fn save_async(&self, entity: &E) -> Result<Completion<E>> {
        self.write_async("save_async", entity, |manager, record, callback| {
            manager.save_async(record, callback)
        })
    }

    pub fn save_async_with_ttl(&self, entity: &E, ttl: Ttl) -> Result<Completion<E>> {
        self.write_async("save_async_with_ttl", entity, |manager, record, callback| {
            manager.save_async_with_ttl(record, ttl, callback)
        })
    }

    pub fn update_async(&self, entity: &E) -> Result<Completion<E>> {
        self.write_async("update_async", entity, |manager, record, callback| {
            manager.update_async(record, callback)
        })
    }

    fn write<F>(&self, operation: &'static str, entity: &E, store: F) -> Result<E>
    where
        F: FnOnce(&dyn CollectionManager, Record) -> Result<Record>,
    {
        let record = self.prepare(entity)?;
        debug!(
            operation,
            collection = %record.collection,
            fields = record.len(),
            "Mediating write"
        );

        let stored = store(self.manager.as_ref(), record)?;
        complete_write(self.converter.as_ref(), &self.observers, stored)
    }

    fn write_async<F>(
        &self,
        operation: &'static str,
        entity: &E,
        submit: F,
    ) -> Result<Completion<E>>
    where
        F: FnOnce(&dyn CollectionManager, Record, Callback<Record>) -> Result<()>,
    {
        let record = self.prepare(entity)?;
        debug!(
            operation,
            collection = %record.collection,
            fields = record.len(),
            "Submitting async write"
        );

        let (sender, completion) = Completion::channel(operation);
        let converter = Arc::clone(&self.converter);
        let observers = Arc::clone(&self.observers);
        let callback: Callback<Record> = Box::new(move |result: Result<Record>| {
            let outcome = result
                .and_then(|stored| complete_write(converter.as_ref(), &observers, stored));
            // The caller may have dropped the completion
            let _ = sender.send(outcome);
        });

        submit(self.manager.as_ref(), record, callback)?;
        Ok(completion)
    }

    /// Pre-entity hooks, conversion, pre-record hooks
    fn prepare(&self, entity: &E) -> Result<Record> {
        self.observers.fire(LifecycleEvent::PreEntity(entity))?;
        let record = self.converter.to_record(entity)?;
        self.observers.fire(LifecycleEvent::PreRecord(&record))?;
        Ok(record)
    }

    // ========================================================================
    // Deletes
    // ========================================================================

    pub fn delete(&self, query: &StructuredQuery) -> Result<()> {
        debug!(collection = %query.collection(), "Mediating delete");
        self.manager.delete(query)
    }

    pub fn delete_async(&self, query: StructuredQuery) -> Result<Completion<()>> {
        debug!(collection = %query.collection(), "Submitting async delete");
        let (sender, completion) = Completion::channel("delete_async");
        self.manager.delete_async(
            query,
            Box::new(move |result: Result<()>| {
                let _ = sender.send(result);
            }),
        )?;
        Ok(completion)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn find(&self, query: &StructuredQuery) -> Result<Vec<E>> {
        debug!(collection = %query.collection(), "Mediating find");
        let records = self.manager.find(query)?;
        convert_all(self.converter.as_ref(), &records)
    }

    pub fn find_async(&self, query: StructuredQuery) -> Result<Completion<Vec<E>>> {
        debug!(collection = %query.collection(), "Submitting async find");
        let (callback, completion) = self.read_callback("find_async");
        self.manager.find_async(query, callback)?;
        Ok(completion)
    }

    /// Run a query in the store's own language
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` from stores without a native language.
    pub fn native_query(&self, query: &str) -> Result<Vec<E>> {
        debug!(query, "Mediating native query");
        let records = self.manager.native_query(query)?;
        convert_all(self.converter.as_ref(), &records)
    }

    pub fn native_query_async(&self, query: impl Into<String>) -> Result<Completion<Vec<E>>> {
        let query = query.into();
        debug!(query = %query, "Submitting async native query");
        let (callback, completion) = self.read_callback("native_query_async");
        self.manager.native_query_async(query, callback)?;
        Ok(completion)
    }

    fn read_callback(
        &self,
        operation: &'static str,
    ) -> (Callback<Vec<Record>>, Completion<Vec<E>>) {
        let (sender, completion) = Completion::channel(operation);
        let converter = Arc::clone(&self.converter);
        let callback: Callback<Vec<Record>> = Box::new(move |result: Result<Vec<Record>>| {
            let outcome = result.and_then(|records| convert_all(converter.as_ref(), &records));
            let _ = sender.send(outcome);
        });
        (callback, completion)
    }
}

/// Post-record hooks, conversion back, post-entity hooks
fn complete_write<E>(
    converter: &dyn EntityConverter<E>,
    observers: &LifecycleObservers<E>,
    stored: Record,
) -> Result<E> {
    observers.fire(LifecycleEvent::PostRecord(&stored))?;
    let entity = converter.to_entity(&stored)?;
    observers.fire(LifecycleEvent::PostEntity(&entity))?;
    Ok(entity)
}

fn convert_all<E>(converter: &dyn EntityConverter<E>, records: &[Record]) -> Result<Vec<E>> {
    records
        .iter()
        .map(|record| converter.to_entity(record))
        .collect()
}

impl<E> Clone for CrudMediator<E> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            converter: Arc::clone(&self.converter),
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<E> fmt::Debug for CrudMediator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudMediator")
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::lifecycle::LifecyclePhase;
    use crate::query::QueryBuilder;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Store that logs calls and stamps an id onto saved records
    struct LoggingStore {
        log: Log,
        fail_save: bool,
    }

    impl CollectionManager for LoggingStore {
        fn save(&self, record: Record) -> Result<Record> {
            self.log.lock().unwrap().push("store.save".into());
            if self.fail_save {
                return Err(RepositoryError::store("disk full"));
            }
            Ok(record.with("id", 42))
        }

        fn update(&self, record: Record) -> Result<Record> {
            self.log.lock().unwrap().push("store.update".into());
            Ok(record)
        }

        fn delete(&self, query: &StructuredQuery) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("store.delete:{}", query.collection()));
            Ok(())
        }

        fn find(&self, _query: &StructuredQuery) -> Result<Vec<Record>> {
            Ok(vec![
                Record::new("Thing").with("name", "first"),
                Record::new("Thing").with("name", "second"),
            ])
        }

        fn save_async(&self, record: Record, callback: Callback<Record>) -> Result<()> {
            self.log.lock().unwrap().push("store.save_async".into());
            std::thread::spawn(move || callback(Ok(record.with("id", 7))));
            Ok(())
        }
    }

    /// Entity is just the `name` field; counts conversions
    struct NameConverter {
        log: Log,
        conversions: AtomicUsize,
    }

    impl EntityConverter<String> for NameConverter {
        fn to_record(&self, entity: &String) -> Result<Record> {
            self.conversions.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push("to_record".into());
            Ok(Record::new("Thing").with("name", entity.as_str()))
        }

        fn to_entity(&self, record: &Record) -> Result<String> {
            self.conversions.fetch_add(1, Ordering::SeqCst);
            let name = record.get("name").and_then(|v| v.as_str()).unwrap_or("");
            match record.get("id") {
                Some(id) => Ok(format!("{}#{}", name, id)),
                None => Ok(name.to_string()),
            }
        }
    }

    struct Fixture {
        log: Log,
        converter: Arc<NameConverter>,
        mediator: CrudMediator<String>,
    }

    fn fixture(fail_save: bool) -> Fixture {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(LoggingStore {
            log: Arc::clone(&log),
            fail_save,
        });
        let converter = Arc::new(NameConverter {
            log: Arc::clone(&log),
            conversions: AtomicUsize::new(0),
        });

        let hook_log = Arc::clone(&log);
        let observers = LifecycleObservers::<String>::new().observe(move |event| {
            hook_log.lock().unwrap().push(event.phase().to_string());
            Ok(())
        });

        let mediator = CrudMediator::new(store, converter.clone(), observers);
        Fixture {
            log,
            converter,
            mediator,
        }
    }

    /// Store whose async writes complete on a background thread
    struct CallbackStore {
        log: Log,
        fail_late: bool,
    }

    impl CollectionManager for CallbackStore {
        fn save(&self, record: Record) -> Result<Record> {
            Ok(record)
        }

        fn update(&self, record: Record) -> Result<Record> {
            Ok(record)
        }

        fn delete(&self, _query: &StructuredQuery) -> Result<()> {
            Ok(())
        }

        fn find(&self, _query: &StructuredQuery) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }

        fn save_async_with_ttl(
            &self,
            record: Record,
            ttl: Ttl,
            callback: Callback<Record>,
        ) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push("store.save_async_with_ttl".into());
            let seconds = ttl.duration().num_seconds();
            std::thread::spawn(move || callback(Ok(record.with("id", seconds))));
            Ok(())
        }

        fn update_async(&self, record: Record, callback: Callback<Record>) -> Result<()> {
            self.log.lock().unwrap().push("store.update_async".into());
            let fail_late = self.fail_late;
            std::thread::spawn(move || {
                if fail_late {
                    callback(Err(RepositoryError::store("replica lost")))
                } else {
                    callback(Ok(record))
                }
            });
            Ok(())
        }
    }

    /// Mediator over a `CallbackStore`; observers log phases and may reject post-record
    fn callback_fixture(fail_late: bool, reject_post_record: bool) -> (Log, CrudMediator<String>) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(CallbackStore {
            log: Arc::clone(&log),
            fail_late,
        });
        let converter = Arc::new(NameConverter {
            log: Arc::clone(&log),
            conversions: AtomicUsize::new(0),
        });

        let hook_log = Arc::clone(&log);
        let observers = LifecycleObservers::<String>::new().observe(move |event| {
            hook_log.lock().unwrap().push(event.phase().to_string());
            if reject_post_record && event.phase() == LifecyclePhase::PostRecord {
                return Err(RepositoryError::observer("stored record rejected"));
            }
            Ok(())
        });

        (log, CrudMediator::new(store, converter, observers))
    }

    fn thing_query() -> StructuredQuery {
        QueryBuilder::select().from("Thing").build().unwrap()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    #[test]
    fn test_save_runs_hooks_in_order() {
        let fx = fixture(false);
        let saved = fx.mediator.save(&"ada".to_string()).unwrap();
        assert_eq!(saved, "ada#42");

        assert_eq!(
            *fx.log.lock().unwrap(),
            vec![
                "pre-entity",
                "to_record",
                "pre-record",
                "store.save",
                "post-record",
                "post-entity",
            ]
        );
    }

    #[test]
    fn test_store_failure_skips_post_hooks() {
        let fx = fixture(true);
        let err = fx.mediator.save(&"ada".to_string()).unwrap_err();
        assert!(matches!(err, RepositoryError::Store(_)));

        let log = fx.log.lock().unwrap();
        assert_eq!(log.last().map(String::as_str), Some("store.save"));
        assert!(!log.iter().any(|entry| entry.starts_with("post")));
    }

    #[test]
    fn test_save_with_ttl_surfaces_unsupported() {
        let fx = fixture(false);
        let err = fx
            .mediator
            .save_with_ttl(&"ada".to_string(), Ttl::seconds(30))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_save_all_preserves_order() {
        let fx = fixture(false);
        let saved = fx
            .mediator
            .save_all(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(saved, vec!["a#42".to_string(), "b#42".to_string()]);
    }

    #[test]
    fn test_update_skips_id_stamp() {
        let fx = fixture(false);
        let updated = fx.mediator.update(&"grace".to_string()).unwrap();
        assert_eq!(updated, "grace");
        assert!(fx.log.lock().unwrap().contains(&"store.update".to_string()));
    }

    // ========================================================================
    // Deletes and reads
    // ========================================================================

    #[test]
    fn test_delete_bypasses_conversion_and_hooks() {
        let fx = fixture(false);
        fx.mediator.delete(&thing_query()).unwrap();

        assert_eq!(*fx.log.lock().unwrap(), vec!["store.delete:Thing"]);
        assert_eq!(fx.converter.conversions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_find_converts_in_store_order_without_hooks() {
        let fx = fixture(false);
        let found = fx.mediator.find(&thing_query()).unwrap();

        assert_eq!(found, vec!["first".to_string(), "second".to_string()]);
        assert!(fx.log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_native_query_unsupported_by_default() {
        let fx = fixture(false);
        let err = fx.mediator.native_query("select *").unwrap_err();
        assert!(matches!(err, RepositoryError::UnsupportedOperation(_)));
    }

    // ========================================================================
    // Async
    // ========================================================================

    #[test]
    fn test_save_async_completes_with_same_hook_order() {
        let fx = fixture(false);
        let completion = fx.mediator.save_async(&"ada".to_string()).unwrap();
        assert_eq!(completion.wait().unwrap(), "ada#7");

        assert_eq!(
            *fx.log.lock().unwrap(),
            vec![
                "pre-entity",
                "to_record",
                "pre-record",
                "store.save_async",
                "post-record",
                "post-entity",
            ]
        );
    }

    #[test]
    fn test_async_unsupported_fails_at_submission() {
        let fx = fixture(false);
        let err = fx.mediator.update_async(&"ada".to_string()).unwrap_err();
        assert!(matches!(err, RepositoryError::UnsupportedOperation(_)));

        let err = fx.mediator.delete_async(thing_query()).unwrap_err();
        assert!(matches!(err, RepositoryError::UnsupportedOperation(_)));

        let err = fx.mediator.native_query_async("select *").unwrap_err();
        assert!(matches!(err, RepositoryError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_update_async_runs_hooks_in_order() {
        let (log, mediator) = callback_fixture(false, false);
        let completion = mediator.update_async(&"grace".to_string()).unwrap();
        assert_eq!(completion.operation(), "update_async");
        assert_eq!(completion.wait().unwrap(), "grace");

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "pre-entity",
                "to_record",
                "pre-record",
                "store.update_async",
                "post-record",
                "post-entity",
            ]
        );
    }

    #[test]
    fn test_save_async_with_ttl_completes_through_callback() {
        let (log, mediator) = callback_fixture(false, false);
        let completion = mediator
            .save_async_with_ttl(&"ada".to_string(), Ttl::seconds(30))
            .unwrap();
        assert_eq!(completion.wait().unwrap(), "ada#30");
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("post-entity"));
    }

    #[test]
    fn test_async_store_failure_arrives_through_completion() {
        let (log, mediator) = callback_fixture(true, false);
        let completion = mediator.update_async(&"grace".to_string()).unwrap();

        let err = completion.wait().unwrap_err();
        assert!(matches!(err, RepositoryError::Store(msg) if msg.contains("replica lost")));

        let log = log.lock().unwrap();
        assert_eq!(log.last().map(String::as_str), Some("store.update_async"));
        assert!(!log.iter().any(|entry| entry.starts_with("post")));
    }

    #[test]
    fn test_async_post_record_error_arrives_through_completion() {
        let (log, mediator) = callback_fixture(false, true);
        let completion = mediator
            .save_async_with_ttl(&"ada".to_string(), Ttl::seconds(5))
            .unwrap();

        let err = completion.wait().unwrap_err();
        assert!(matches!(err, RepositoryError::Observer(_)));
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("post-record"));
    }

    #[tokio::test]
    async fn test_update_async_completion_is_awaitable() {
        let (_, mediator) = callback_fixture(true, false);
        let err = mediator
            .update_async(&"grace".to_string())
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Store(_)));
    }

    #[test]
    fn test_pre_hook_error_prevents_store_call() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(LoggingStore {
            log: Arc::clone(&log),
            fail_save: false,
        });
        let converter = Arc::new(NameConverter {
            log: Arc::clone(&log),
            conversions: AtomicUsize::new(0),
        });
        let observers = LifecycleObservers::<String>::new().observe(|event| match event {
            LifecycleEvent::PreRecord(record) if record.get("name") == Some(&json!("bad")) => {
                Err(RepositoryError::observer("name rejected"))
            }
            _ => Ok(()),
        });
        let mediator = CrudMediator::new(store, converter, observers);

        let err = mediator.save(&"bad".to_string()).unwrap_err();
        assert!(matches!(err, RepositoryError::Observer(_)));
        assert!(!log.lock().unwrap().iter().any(|e| e.starts_with("store")));
    }
}
