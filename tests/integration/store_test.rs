//! State persistence round-trips

use perp_momentum::ladder;
use perp_momentum::state::{
    AccountDocument, FileStore, Position, PositionStatus, StateStore, TriggerSide,
};
use rust_decimal_macros::dec;

fn populated_document() -> AccountDocument {
    let mut doc = AccountDocument::default();

    let mut open = Position::idle();
    open.status = PositionStatus::Open;
    open.entry_price = Some(dec!(101.01));
    open.lock_close_price = Some(dec!(100));
    open.movement_threshold = Some(dec!(1.0));
    open.trigger_side = Some(TriggerSide::Long);
    let rungs = ladder::build(dec!(101.01), TriggerSide::Long, dec!(1.0), dec!(0.1), 20);
    open.triggers = rungs.triggers;
    open.stop_prices = rungs.stop_prices;
    doc.positions.insert("BTCUSDT".to_string(), open);

    let mut armed = Position::idle();
    armed.status = PositionStatus::Armed;
    armed.lock_close_price = Some(dec!(3500));
    armed.movement_threshold = Some(dec!(0.75));
    doc.positions.insert("ETHUSDT".to_string(), armed);

    doc.positions.insert("XRPUSDT".to_string(), Position::idle());
    doc
}

/// R1: save ∘ load is the identity over the account document
#[tokio::test]
async fn test_save_load_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());

    let doc = populated_document();
    store.save("alpha", &doc).await.unwrap();
    let loaded = store.load("alpha").await.unwrap().unwrap();
    assert_eq!(loaded, doc);

    // A second round trip through the loaded value is also stable
    store.save("alpha", &loaded).await.unwrap();
    let again = store.load("alpha").await.unwrap().unwrap();
    assert_eq!(again, doc);
}

/// Accounts persist to separate files and do not leak into each other
#[tokio::test]
async fn test_accounts_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());

    store.save("alpha", &populated_document()).await.unwrap();
    store.save("beta", &AccountDocument::default()).await.unwrap();

    assert!(dir.path().join("account-data-alpha.json").exists());
    assert!(dir.path().join("account-data-beta.json").exists());

    let beta = store.load("beta").await.unwrap().unwrap();
    assert!(beta.positions.is_empty());
}

/// No temp files are left behind after an atomic write
#[tokio::test]
async fn test_atomic_write_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.save("alpha", &populated_document()).await.unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
