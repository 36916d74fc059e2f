//! Scale tests: large registries and listings.

use std::collections::HashSet;
use std::time::Instant;

use tokenvault::ids::{LegacyTokenIds, SecureIds};
use tokenvault::{FileType, ObjectStore, ObjectUid, TokenRegistry};

#[test]
fn stress_1000_sequential_tokens_unique() {
    let tmp = tempfile::tempdir().unwrap();
    let registry =
        TokenRegistry::open(tmp.path().join("tokens.json"), Box::new(SecureIds::new())).unwrap();
    let root = registry.bootstrap_token().unwrap();

    let start = Instant::now();
    let ids: HashSet<_> = (0..1000)
        .map(|i| registry.create_token(&format!("t{i}"), &root).unwrap().id)
        .collect();
    let elapsed = start.elapsed();

    assert_eq!(ids.len(), 1000);
    eprintln!("minted 1000 tokens in {elapsed:?}");
}

#[test]
fn stress_legacy_ids_unique_and_bounded() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = TokenRegistry::open(
        tmp.path().join("tokens.json"),
        Box::new(LegacyTokenIds::seeded(0xDEC0DE)),
    )
    .unwrap();
    let root = registry.bootstrap_token().unwrap();

    let mut ids = HashSet::new();
    for i in 0..1000 {
        let token = registry.create_token(&format!("t{i}"), &root).unwrap();
        let n: u64 = token.id.as_str().parse().expect("legacy ids are decimal");
        assert!(n < tokenvault::ids::LEGACY_TOKEN_MODULUS);
        ids.insert(token.id);
    }
    assert_eq!(ids.len(), 1000);
}

#[test]
fn stress_large_registry_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tokens.json");
    let registry = TokenRegistry::open(&path, Box::new(SecureIds::new())).unwrap();
    let root = registry.bootstrap_token().unwrap();

    for i in 0..500 {
        let token = registry.create_token(&format!("t{i}"), &root).unwrap();
        if i % 3 == 0 {
            registry.deactivate_token(&token.id).unwrap();
        }
    }

    let reloaded = TokenRegistry::load(&path, Box::new(SecureIds::new())).unwrap();
    assert_eq!(reloaded.snapshot(), registry.snapshot());
    // Creation order survives the round trip.
    let names: Vec<_> = reloaded
        .list_tokens(false)
        .into_iter()
        .skip(1)
        .map(|t| t.name)
        .collect();
    let expected: Vec<_> = (0..500).map(|i| format!("t{i}")).collect();
    assert_eq!(names, expected);
    assert_eq!(reloaded.list_tokens(true).len(), 1 + 500 - 167);
}

#[test]
fn stress_500_objects_across_types() {
    let tmp = tempfile::tempdir().unwrap();
    let listing = tmp.path().join("listing.json");
    let store =
        ObjectStore::open(&listing, tmp.path().join("storage"), Box::new(SecureIds::new()))
            .unwrap();

    let mut uids: Vec<(ObjectUid, FileType)> = Vec::new();
    for i in 0..500usize {
        let kind = FileType::STORED[i % 3];
        let obj = store
            .put(kind, &format!("f{i}.bin"), format!("payload-{i}").as_bytes())
            .unwrap();
        uids.push((obj.uid, kind));
    }

    let reloaded = ObjectStore::load(&listing, Box::new(SecureIds::new())).unwrap();
    assert_eq!(reloaded.len(), 500);
    for (uid, kind) in &uids {
        assert!(reloaded.fetch_typed(uid, *kind).is_ok());
    }
}
