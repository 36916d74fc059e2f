//! End-to-end workflow: bootstrap, mint, promote, revoke, store, fetch.

use std::sync::Arc;

use tokenvault::ids::{EpochDigitUids, LegacyTokenIds, SecureIds};
use tokenvault::registry::{BOOTSTRAP_ISSUER_ID, BOOTSTRAP_ISSUER_NAME};
use tokenvault::{
    Config, FileType, Gate, ObjectStore, ObjectUid, TokenId, TokenRegistry, VaultError,
};

#[test]
fn workflow_bootstrap_then_first_promotion() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tokens.json");
    let registry = TokenRegistry::open(&path, Box::new(SecureIds::new())).unwrap();

    // Fresh registry holds exactly the bootstrap issuer.
    let tokens = registry.list_tokens(false);
    assert_eq!(tokens.len(), 1);
    let bootstrap = tokens[0].clone();
    assert_eq!(bootstrap.id.as_str(), BOOTSTRAP_ISSUER_ID);
    assert_eq!(bootstrap.name, BOOTSTRAP_ISSUER_NAME);
    assert_eq!(registry.issuers(), vec![bootstrap.id.clone()]);

    // Mint under the bootstrap issuer.
    let t1 = registry.create_token("alice", &bootstrap).unwrap();
    assert_eq!(t1.issuer, bootstrap.id);
    assert!(t1.activated);
    assert!(registry.verify_valid_issuer(&t1));

    // Promoting t1 retires the bootstrap issuer.
    assert!(registry.add_issuer(&t1.id).unwrap());
    assert_eq!(registry.issuers(), vec![t1.id.clone()]);
    assert!(!registry.verify_issuer_perms(&bootstrap));

    // t1 itself was issued by the now-retired bootstrap id; the live check
    // therefore fails even though t1 is an issuer.
    assert!(!registry.verify_valid_issuer(&t1));
    assert!(registry.verify_issuer_perms(&t1));

    // Tokens minted by t1 validate normally.
    let t2 = registry.create_token("bob", &t1).unwrap();
    assert!(registry.verify_valid_issuer(&t2));

    // Everything survives a reload.
    drop(registry);
    let reloaded = TokenRegistry::load(&path, Box::new(SecureIds::new())).unwrap();
    assert_eq!(reloaded.issuers(), vec![t1.id.clone()]);
    assert_eq!(reloaded.list_tokens(false).len(), 3);
    assert_eq!(reloaded.get_token(&t2.id), Some(t2));
}

#[test]
fn workflow_revocation_is_live() {
    let tmp = tempfile::tempdir().unwrap();
    let registry =
        TokenRegistry::open(tmp.path().join("tokens.json"), Box::new(LegacyTokenIds::seeded(9)))
            .unwrap();
    let root = registry.bootstrap_token().unwrap();

    let admin = registry.create_token("admin", &root).unwrap();
    let deputy = registry.create_token("deputy", &root).unwrap();
    registry.add_issuer(&admin.id).unwrap();
    registry.add_issuer(&deputy.id).unwrap();

    let issued: Vec<_> = (0..5)
        .map(|i| registry.create_token(&format!("u{i}"), &deputy).unwrap())
        .collect();
    assert!(issued.iter().all(|t| registry.verify_valid_issuer(t)));

    assert!(registry.remove_issuer(&deputy.id).unwrap());
    for t in &issued {
        let stored = registry.get_token(&t.id).unwrap();
        assert!(stored.activated, "revocation must not touch issued tokens");
        assert!(!registry.verify_valid_issuer(&stored));
    }

    // The remaining issuer cannot be removed.
    let result = registry.remove_issuer(&admin.id);
    assert!(matches!(result, Err(VaultError::InvariantViolation(_))));
    assert_eq!(registry.issuers(), vec![admin.id.clone()]);
}

#[test]
fn workflow_store_and_fetch_objects() {
    let tmp = tempfile::tempdir().unwrap();
    let listing = tmp.path().join("listing.json");
    let storage = tmp.path().join("storage");
    let store = ObjectStore::open(&listing, &storage, Box::new(EpochDigitUids::new())).unwrap();

    let image = store.describe(FileType::Image, "cat.png").unwrap();
    store.store_object(&image, b"\x89PNG fake").unwrap();

    let mut out = Vec::new();
    store.read_object(&image, &mut out).unwrap();
    assert_eq!(out, b"\x89PNG fake");

    // Same uid, wrong type.
    assert!(matches!(
        store.fetch_typed(&image.uid, FileType::Video),
        Err(VaultError::NotFound(_))
    ));
    assert_eq!(store.fetch_typed(&image.uid, FileType::Image).unwrap(), image);

    // The listing reloads with the object intact.
    drop(store);
    let store = ObjectStore::load(&listing, Box::new(SecureIds::new())).unwrap();
    let found = store.get_object(&image.uid).unwrap();
    assert_eq!(found.path(), storage.join("1").join(&image.filename));
    assert!(store.get_object(&ObjectUid::new("missing")).is_none());
}

#[test]
fn workflow_gate_from_config() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.tokens.path = tmp.path().join("tokens.json");
    config.objects.listing_path = tmp.path().join("listing.json");
    config.objects.storage_dir = tmp.path().join("storage");

    let gate = Gate::new(
        Arc::new(config.open_registry().unwrap()),
        Arc::new(config.open_store().unwrap()),
    );
    let root = Some(BOOTSTRAP_ISSUER_ID);

    // Build an issuer chain that survives retiring the bootstrap issuer.
    let founder = gate.mint(root, "founder").unwrap();
    gate.promote(root, &founder.id).unwrap();
    let admin = gate.registry().create_token("admin", &founder).unwrap();
    gate.registry().add_issuer(&admin.id).unwrap();
    assert!(gate.authenticate(Some(founder.id.as_str())).is_err());

    let uploader = gate.mint(Some(admin.id.as_str()), "uploader").unwrap();

    let obj = gate
        .upload(
            Some(uploader.id.as_str()),
            FileType::Video,
            "video/webm",
            "clip.webm",
            b"webm-bytes",
        )
        .unwrap();

    let mut out = Vec::new();
    gate.download(FileType::Video, &format!("{}.webm", obj.uid), &mut out)
        .unwrap();
    assert_eq!(out, b"webm-bytes");

    // Deactivating the uploader locks it out of further uploads.
    gate.deactivate(Some(admin.id.as_str()), &uploader.id).unwrap();
    let result = gate.upload(
        Some(uploader.id.as_str()),
        FileType::Video,
        "video/webm",
        "again.webm",
        b"x",
    );
    assert!(matches!(result, Err(VaultError::Unauthorized(_))));
    assert_eq!(gate.store().len(), 1);

    assert!(gate
        .show(Some(admin.id.as_str()), &TokenId::from(uploader.id.as_str()))
        .map(|t| !t.activated)
        .unwrap());
}
