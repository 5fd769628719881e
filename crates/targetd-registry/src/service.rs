//! Registry service: validates requests and drives the store.
//!
//! The service keeps no state of its own beyond a handle to the store. Every
//! call goes straight through to one or two store transactions and comes
//! back as either a value or a classified [`Error`].
//!
//! # Register is two transactions
//!
//! `register` calls `ensure_namespace` and then `put` as separate
//! transactions. Another request can run between the two and will see the
//! namespace with no entry in it yet. Setting `atomic_register` routes
//! registrations through [`RegistryStore::put_creating`] instead, which does
//! both in one transaction.

use std::sync::Arc;
use targetd_common::{Error, Kind, Listing, Payload, Result, ResultExt, TargetKey};
use tracing::{error, info, warn};

use crate::storage::RegistryStore;

/// Registry operations exposed to the HTTP layer.
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn RegistryStore>,
    atomic_register: bool,
}

impl RegistryService {
    /// Creates a service over an already-opened store.
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            store,
            atomic_register: false,
        }
    }

    /// Makes `register` create the namespace and write the entry in a single
    /// store transaction.
    pub fn with_atomic_register(mut self, atomic_register: bool) -> Self {
        self.atomic_register = atomic_register;
        self
    }

    /// Adds or replaces the entry `key` under `kind`.
    pub fn register(&self, kind: &Kind, key: &TargetKey, payload: &Payload) -> Result<()> {
        if kind.is_empty() {
            return Err(rejected("register", "kind"));
        }
        if key.is_empty() {
            return Err(rejected("register", "key"));
        }
        if payload.is_empty() {
            return Err(rejected("register", "data"));
        }

        info!("Will add target of kind {}", kind);

        let stored = if self.atomic_register {
            self.store.put_creating(kind, key, payload)
        } else {
            self.store
                .ensure_namespace(kind)
                .context(format!("Could not create namespace {}", kind))
                .and_then(|()| self.store.put(kind, key, payload))
        };

        stored.map_err(|e| {
            error!("Failed to register {}/{}: {}", kind, key, e);
            as_storage_failure(e)
        })?;

        info!("Registered target {}/{}", kind, key);
        Ok(())
    }

    /// Removes the entry `key` under `kind`. Removing something that is not
    /// there succeeds.
    pub fn unregister(&self, kind: &Kind, key: &TargetKey) -> Result<()> {
        if kind.is_empty() {
            return Err(rejected("unregister", "kind"));
        }
        if key.is_empty() {
            return Err(rejected("unregister", "key"));
        }

        self.store.delete(kind, key).map_err(|e| {
            error!("Could not unregister target {}/{}: {}", kind, key, e);
            as_storage_failure(e)
        })?;

        info!("Unregistered target {}/{}", kind, key);
        Ok(())
    }

    /// Returns every entry under `kind`.
    pub fn list(&self, kind: &Kind) -> Result<Listing> {
        if kind.is_empty() {
            return Err(rejected("list", "kind"));
        }

        match self.store.list_all(kind) {
            Ok(listing) => Ok(listing),
            Err(e) if e.is_namespace_not_found() => {
                warn!("Received request to list a kind that does not exist: {}", kind);
                Err(Error::unknown_namespace(kind.as_str()))
            }
            Err(e) => {
                error!("Error retrieving contents of kind {}: {}", kind, e);
                Err(as_storage_failure(e))
            }
        }
    }
}

fn rejected(operation: &str, field: &str) -> Error {
    warn!("{} request missing required parameter '{}'", operation, field);
    Error::invalid_input(field)
}

/// Everything that goes wrong below validation is reported as a storage
/// failure.
fn as_storage_failure(err: Error) -> Error {
    if err.is_storage() {
        err
    } else {
        Error::storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use tempfile::{tempdir, TempDir};

    fn service() -> (TempDir, RegistryService) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open_default(dir.path().join("targets.db")).unwrap();
        (dir, RegistryService::new(Arc::new(store)))
    }

    /// Store that fails every write, for checking error classification.
    struct BrokenStore;

    impl RegistryStore for BrokenStore {
        fn ensure_namespace(&self, _kind: &Kind) -> Result<()> {
            Err(Error::storage("disk full"))
        }

        fn put(&self, kind: &Kind, _key: &TargetKey, _payload: &Payload) -> Result<()> {
            Err(Error::namespace_not_found(kind.as_str()))
        }

        fn put_creating(&self, _kind: &Kind, _key: &TargetKey, _payload: &Payload) -> Result<()> {
            Err(Error::storage("disk full"))
        }

        fn delete(&self, _kind: &Kind, _key: &TargetKey) -> Result<()> {
            Err(Error::storage("disk full"))
        }

        fn list_all(&self, _kind: &Kind) -> Result<Listing> {
            Err(Error::storage("corrupt page"))
        }
    }

    #[test]
    fn test_register_then_list() {
        let (_dir, service) = service();
        let kind = Kind::from("host");

        service
            .register(&kind, &TargetKey::from("h1"), &Payload::from("10.0.0.1"))
            .unwrap();

        let listing = service.list(&kind).unwrap();
        assert_eq!(
            listing.get(&TargetKey::from("h1")),
            Some(&Payload::from("10.0.0.1"))
        );
    }

    #[test]
    fn test_last_register_wins() {
        let (_dir, service) = service();
        let kind = Kind::from("host");
        let key = TargetKey::from("h1");

        for payload in ["a", "b", "c"] {
            service.register(&kind, &key, &Payload::from(payload)).unwrap();
        }

        let listing = service.list(&kind).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.get(&key), Some(&Payload::from("c")));
    }

    #[test]
    fn test_register_rejects_empty_fields() {
        let (_dir, service) = service();

        let cases = [
            ("", "a", "b", "kind"),
            ("k", "", "b", "key"),
            ("k", "a", "", "data"),
        ];
        for (kind, key, data, field) in cases {
            let err = service
                .register(&Kind::from(kind), &TargetKey::from(key), &Payload::from(data))
                .unwrap_err();
            match err {
                Error::InvalidInput { field: got } => assert_eq!(got, field),
                other => panic!("Expected InvalidInput, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_register_creates_no_namespace() {
        let (_dir, service) = service();

        assert!(service
            .register(&Kind::from(""), &TargetKey::from("a"), &Payload::from("b"))
            .unwrap_err()
            .is_invalid_input());
        assert!(service
            .register(&Kind::from("k"), &TargetKey::from("a"), &Payload::from(""))
            .unwrap_err()
            .is_invalid_input());

        assert!(service.list(&Kind::from("k")).unwrap_err().is_unknown_namespace());
        assert!(service.list(&Kind::from("")).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (_dir, service) = service();
        let kind = Kind::from("host");
        let key = TargetKey::from("h1");

        // Nothing registered at all
        service.unregister(&kind, &key).unwrap();

        service.register(&kind, &key, &Payload::from("10.0.0.1")).unwrap();
        service.unregister(&kind, &key).unwrap();
        let once = service.list(&kind).unwrap();
        service.unregister(&kind, &key).unwrap();
        let twice = service.list(&kind).unwrap();

        assert_eq!(once, twice);
        assert!(twice.is_empty());
    }

    #[test]
    fn test_unregister_rejects_empty_fields() {
        let (_dir, service) = service();

        assert!(service
            .unregister(&Kind::from(""), &TargetKey::from("a"))
            .unwrap_err()
            .is_invalid_input());
        assert!(service
            .unregister(&Kind::from("k"), &TargetKey::from(""))
            .unwrap_err()
            .is_invalid_input());
    }

    #[test]
    fn test_emptied_namespace_still_lists() {
        let (_dir, service) = service();
        let kind = Kind::from("host");
        let key = TargetKey::from("h1");

        service.register(&kind, &key, &Payload::from("10.0.0.1")).unwrap();
        service.unregister(&kind, &key).unwrap();

        assert!(service.list(&kind).unwrap().is_empty());
    }

    #[test]
    fn test_list_unknown_kind() {
        let (_dir, service) = service();
        let err = service.list(&Kind::from("nope")).unwrap_err();

        match err {
            Error::UnknownNamespace { kind } => assert_eq!(kind, "nope"),
            other => panic!("Expected UnknownNamespace, got {other:?}"),
        }
    }

    #[test]
    fn test_atomic_register() {
        let (_dir, service) = service();
        let service = service.with_atomic_register(true);
        let kind = Kind::from("jobs");

        service
            .register(&kind, &TargetKey::from("j1"), &Payload::from("{}"))
            .unwrap();

        assert_eq!(service.list(&kind).unwrap().len(), 1);
    }

    #[test]
    fn test_atomic_register_never_lists_empty_kind() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const KINDS: usize = 50;
        let (_dir, service) = service();
        let service = service.with_atomic_register(true);
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let service = service.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    for i in 0..KINDS {
                        match service.list(&Kind::from(format!("fresh-{}", i))) {
                            Ok(listing) => assert!(
                                !listing.is_empty(),
                                "kind fresh-{} listed without its entry",
                                i
                            ),
                            Err(e) => assert!(e.is_unknown_namespace(), "unexpected error: {e}"),
                        }
                    }
                }
            })
        };

        for i in 0..KINDS {
            service
                .register(
                    &Kind::from(format!("fresh-{}", i)),
                    &TargetKey::from("t1"),
                    &Payload::from(format!("payload-{}", i)),
                )
                .unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();

        for i in 0..KINDS {
            let listing = service.list(&Kind::from(format!("fresh-{}", i))).unwrap();
            assert_eq!(listing.len(), 1);
        }
    }

    #[test]
    fn test_store_failures_are_storage_errors() {
        let service = RegistryService::new(Arc::new(BrokenStore));
        let kind = Kind::from("host");
        let key = TargetKey::from("h1");
        let payload = Payload::from("10.0.0.1");

        assert!(service.register(&kind, &key, &payload).unwrap_err().is_storage());
        assert!(service
            .clone()
            .with_atomic_register(true)
            .register(&kind, &key, &payload)
            .unwrap_err()
            .is_storage());
        assert!(service.unregister(&kind, &key).unwrap_err().is_storage());
        assert!(service.list(&kind).unwrap_err().is_storage());
    }
}
