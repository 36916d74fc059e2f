//! Concurrency test: parallel minting, verification, updates and uploads.
//!
//! Validates that every mutation is serialized against its document and
//! that the persisted state matches memory afterwards.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use tokenvault::ids::SecureIds;
use tokenvault::{FileType, ObjectStore, TokenRegistry, VaultError};

#[test]
fn stress_20_concurrent_minters() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tokens.json");
    let registry = Arc::new(TokenRegistry::open(&path, Box::new(SecureIds::new())).unwrap());
    let root = registry.bootstrap_token().unwrap();
    let minted = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for thread_id in 0..20 {
        let registry = Arc::clone(&registry);
        let minted = Arc::clone(&minted);
        let root = root.clone();
        let handle = thread::spawn(move || {
            for i in 0..25 {
                let token = registry
                    .create_token(&format!("t{thread_id}-{i}"), &root)
                    .expect("minting should succeed");
                minted.lock().unwrap().push(token);
            }
        });
        handles.push(handle);
    }

    for h in handles {
        h.join().unwrap();
    }

    let minted = minted.lock().unwrap();
    assert_eq!(minted.len(), 500);
    let ids: HashSet<_> = minted.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids.len(), 500, "ids must be unique under contention");

    // The document on disk holds exactly what memory holds.
    let reloaded = TokenRegistry::load(&path, Box::new(SecureIds::new())).unwrap();
    assert_eq!(reloaded.snapshot(), registry.snapshot());
    assert_eq!(reloaded.list_tokens(false).len(), 501);
}

#[test]
fn stress_readers_during_revocation() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = Arc::new(
        TokenRegistry::open(tmp.path().join("tokens.json"), Box::new(SecureIds::new())).unwrap(),
    );
    let root = registry.bootstrap_token().unwrap();
    let keeper = registry.create_token("keeper", &root).unwrap();
    let deputy = registry.create_token("deputy", &root).unwrap();
    registry.add_issuer(&keeper.id).unwrap();
    registry.add_issuer(&deputy.id).unwrap();

    let issued: Vec<_> = (0..50)
        .map(|i| registry.create_token(&format!("user{i}"), &deputy).unwrap())
        .collect();
    let issued = Arc::new(issued);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let issued = Arc::clone(&issued);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                for t in issued.iter() {
                    // Tokens stay activated regardless of issuer state.
                    assert!(registry.verify_token(&t.id).is_some());
                    let _ = registry.verify_valid_issuer(t);
                }
            }
        }));
    }

    let demoter = {
        let registry = Arc::clone(&registry);
        let deputy = deputy.id.clone();
        thread::spawn(move || registry.remove_issuer(&deputy).unwrap())
    };

    assert!(demoter.join().unwrap());
    for h in handles {
        h.join().unwrap();
    }

    assert!(issued.iter().all(|t| !registry.verify_valid_issuer(t)));
    assert_eq!(registry.issuers(), vec![keeper.id]);
}

#[test]
fn stress_deactivation_races_renames() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tokens.json");
    let registry = Arc::new(TokenRegistry::open(&path, Box::new(SecureIds::new())).unwrap());
    let root = registry.bootstrap_token().unwrap();
    let tokens: Vec<_> = (0..200)
        .map(|i| registry.create_token(&format!("old{i}"), &root).unwrap())
        .collect();
    let ids: Arc<Vec<_>> = Arc::new(tokens.iter().map(|t| t.id.clone()).collect());

    let deactivator = {
        let registry = Arc::clone(&registry);
        let ids = Arc::clone(&ids);
        thread::spawn(move || {
            for id in ids.iter() {
                registry.deactivate_token(id).unwrap();
            }
        })
    };

    for (i, id) in ids.iter().enumerate() {
        loop {
            let mut renamed = registry.get_token(id).unwrap();
            renamed.name = format!("new{i}");
            match registry.update_token(id, renamed) {
                Ok(()) => break,
                // Deactivated between the read and the write; read again.
                Err(VaultError::InvariantViolation(_)) => continue,
                Err(e) => panic!("rename failed: {e}"),
            }
        }
    }
    deactivator.join().unwrap();

    for (i, id) in ids.iter().enumerate() {
        let t = registry.get_token(id).unwrap();
        assert!(!t.activated, "{id} should be deactivated");
        assert_eq!(t.name, format!("new{i}"), "rename of {id} was lost");
    }

    let reloaded = TokenRegistry::load(&path, Box::new(SecureIds::new())).unwrap();
    assert_eq!(reloaded.snapshot(), registry.snapshot());
}

#[test]
fn stress_10_concurrent_uploaders() {
    let tmp = tempfile::tempdir().unwrap();
    let listing = tmp.path().join("listing.json");
    let store = Arc::new(
        ObjectStore::open(&listing, tmp.path().join("storage"), Box::new(SecureIds::new()))
            .unwrap(),
    );

    let mut handles = Vec::new();
    for thread_id in 0..10u8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let mut stored = Vec::new();
            for i in 0..10u8 {
                let payload = vec![thread_id, i];
                let obj = store
                    .put(FileType::Image, &format!("img{thread_id}-{i}.png"), &payload)
                    .expect("upload should succeed");
                stored.push((obj, payload));
            }
            stored
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.join().unwrap());
    }
    assert_eq!(all.len(), 100);
    assert_eq!(store.len(), 100);

    for (obj, payload) in &all {
        let mut out = Vec::new();
        store.read_object(obj, &mut out).unwrap();
        assert_eq!(&out, payload);
    }

    let reloaded = ObjectStore::load(&listing, Box::new(SecureIds::new())).unwrap();
    assert_eq!(reloaded.list_objects(), store.list_objects());
}
