//! Integration tests for `FileCacheStore` against a real temporary directory.

use gazloc_cache::{CacheStore, FileCacheStore, StorageError, SNAPSHOT_VERSION, VENDORS_SLOT};
use gazloc_core::{VendorId, VendorRecord, VendorSet};
use rust_decimal::Decimal;

fn sample_set() -> VendorSet {
    let mut partial = VendorRecord::new("v-3", "Sans coordonnées").with_location_label("Godomey");
    partial.image_urls.push("https://cdn.example.com/v3.jpg".to_string());

    VendorSet::from_records([
        VendorRecord::new(1, "Dépôt Akpakpa")
            .with_coordinates(6.3703, 2.3912)
            .with_offer("ORIX", "large", Decimal::new(3500, 0))
            .with_offer("ORIX", "small", Decimal::new(1750, 0)),
        VendorRecord::new(2, "Gaz Express")
            .with_coordinates(6.4969, 2.6289)
            .with_offer("BENIN PETRO", "large", Decimal::new(399_950, 2)),
        partial,
    ])
}

#[tokio::test]
async fn load_on_first_run_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path());
    let loaded = store.load().await;
    assert!(
        matches!(loaded, Ok(None)),
        "first run must be absent, got {loaded:?}"
    );
}

#[tokio::test]
async fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path());
    let set = sample_set();

    store.save(&set).await.unwrap();
    let loaded = store.load().await.unwrap().expect("snapshot present");

    assert_eq!(loaded, set);
    let order: Vec<VendorId> = loaded.iter().map(|r| r.id.clone()).collect();
    assert_eq!(
        order,
        [
            VendorId::Int(1),
            VendorId::Int(2),
            VendorId::Text("v-3".to_string())
        ]
    );
}

#[tokio::test]
async fn full_precision_coordinates_round_trip_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path());

    let mut records = vec![
        VendorRecord::new(1, "A").with_coordinates(-11.978_041_102_011_59, -111.978_041_102_011_59),
        VendorRecord::new(2, "B").with_coordinates(6.370_012_345_678_91, 97.681_170_197_875_99),
    ];
    // xorshift keeps the coordinates deterministic but full-width
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    for id in 3..2_000_i64 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        #[allow(clippy::cast_precision_loss)]
        let unit = (state >> 11) as f64 / (1_u64 << 53) as f64;
        let lat = unit.mul_add(180.0, -90.0);
        let lon = unit.mul_add(-360.0, 180.0) * 0.999_999_937;
        records.push(VendorRecord::new(id, format!("V{id}")).with_coordinates(lat, lon));
    }
    let set = VendorSet::from_records(records);

    store.save(&set).await.unwrap();
    let loaded = store.load().await.unwrap().expect("snapshot present");

    for original in set.iter() {
        let back = loaded.get(&original.id).expect("record present");
        assert_eq!(back.latitude.map(f64::to_bits), original.latitude.map(f64::to_bits));
        assert_eq!(back.longitude.map(f64::to_bits), original.longitude.map(f64::to_bits));
    }
    assert_eq!(loaded, set);
}

#[tokio::test]
async fn snapshot_survives_a_new_store_instance() {
    let dir = tempfile::tempdir().unwrap();
    FileCacheStore::new(dir.path())
        .save(&sample_set())
        .await
        .unwrap();

    let reopened = FileCacheStore::new(dir.path());
    assert_eq!(reopened.load().await.unwrap(), Some(sample_set()));
}

#[tokio::test]
async fn save_overwrites_whole_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path());
    store.save(&sample_set()).await.unwrap();

    let smaller = VendorSet::from_records([VendorRecord::new(9, "Seul")]);
    store.save(&smaller).await.unwrap();

    assert_eq!(store.load().await.unwrap(), Some(smaller));
    assert!(!dir.path().join(format!("{VENDORS_SLOT}.json.tmp")).exists());
}

#[tokio::test]
async fn save_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = FileCacheStore::new(&nested);
    store.save(&sample_set()).await.unwrap();
    assert!(nested.join(format!("{VENDORS_SLOT}.json")).exists());
}

#[tokio::test]
async fn corrupt_snapshot_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("{VENDORS_SLOT}.json")), b"{not json").unwrap();

    let err = FileCacheStore::new(dir.path()).load().await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }), "got {err:?}");
}

#[tokio::test]
async fn unknown_snapshot_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let body = serde_json::json!({ "version": SNAPSHOT_VERSION + 1, "vendors": [] });
    std::fs::write(
        dir.path().join(format!("{VENDORS_SLOT}.json")),
        body.to_string(),
    )
    .unwrap();

    let err = FileCacheStore::new(dir.path()).load().await.unwrap_err();
    assert!(
        matches!(err, StorageError::IncompatibleVersion { found, .. } if found == SNAPSHOT_VERSION + 1),
        "got {err:?}"
    );
}

#[tokio::test]
async fn onboarding_flag_defaults_to_false_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path());
    assert!(!store.is_onboarding_complete().await.unwrap());

    store.set_onboarding_complete(true).await.unwrap();
    assert!(FileCacheStore::new(dir.path())
        .is_onboarding_complete()
        .await
        .unwrap());

    store.set_onboarding_complete(false).await.unwrap();
    assert!(!store.is_onboarding_complete().await.unwrap());
}

#[tokio::test]
async fn onboarding_flag_is_independent_of_vendor_slot() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path());
    store.set_onboarding_complete(true).await.unwrap();
    assert!(store.load().await.unwrap().is_none());
}
