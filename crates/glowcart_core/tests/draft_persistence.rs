use glowcart_core::db::open_db_in_memory;
use glowcart_core::model::draft::{
    ComposeForm, DraftFile, PendingBookingDraft, ServiceKind, ServiceSummary,
};
use glowcart_core::repo::file_repo::{FileStore, SqliteFileStore};
use glowcart_core::repo::slot_repo::{SlotStore, SqliteSlotStore, PENDING_BOOKING_SLOT};
use glowcart_core::service::draft_store::DraftStore;
use rust_decimal::Decimal;

fn service(id: &str) -> ServiceSummary {
    ServiceSummary {
        id: id.to_string(),
        name: "Colour analysis".to_string(),
        price: Decimal::new(7500, 2),
        kind: ServiceKind::Consultation,
    }
}

fn form_with(files: Vec<DraftFile>) -> ComposeForm {
    ComposeForm {
        date: Some("2026-12-01".to_string()),
        time: Some("14:30".to_string()),
        requirements: "Warm undertones, prefers muted palettes".to_string(),
        files,
    }
}

#[test]
fn draft_and_files_round_trip_together() {
    let conn = open_db_in_memory().unwrap();
    let store = DraftStore::new(
        SqliteSlotStore::try_new(&conn).unwrap(),
        SqliteFileStore::try_new(&conn).unwrap(),
    );
    let files = vec![
        DraftFile::new("face.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF]),
        DraftFile::new("wardrobe.png", "image/png", vec![0x89, b'P', b'N', b'G']),
        DraftFile::new("notes.pdf", "application/pdf", b"%PDF-1.7".to_vec()),
    ];
    let form = form_with(files.clone());
    let draft = PendingBookingDraft::from_form(&service("svc-a"), &form);
    store.store(&draft, &files).unwrap();

    let loaded = store.load_for_service("svc-a").unwrap().unwrap();
    assert_eq!(loaded.draft, draft);
    assert_eq!(loaded.files, files);
}

#[test]
fn draft_json_carries_metadata_but_no_bytes() {
    let conn = open_db_in_memory().unwrap();
    let slots = SqliteSlotStore::try_new(&conn).unwrap();
    let store = DraftStore::new(&slots, SqliteFileStore::try_new(&conn).unwrap());
    let files = vec![DraftFile::new("look.jpg", "image/jpeg", vec![42; 64])];
    let draft = PendingBookingDraft::from_form(&service("svc-a"), &form_with(files.clone()));
    store.store(&draft, &files).unwrap();

    let raw = slots.read_slot(PENDING_BOOKING_SLOT).unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["serviceId"], "svc-a");
    assert_eq!(json["attachments"][0]["name"], "look.jpg");
    assert_eq!(json["attachments"][0]["size"], 64);
    assert!(json["attachments"][0].get("bytes").is_none());
    assert!(json["clientToken"].is_string());
}

#[test]
fn get_files_is_empty_for_unknown_scope_and_clear_is_scoped() {
    let conn = open_db_in_memory().unwrap();
    let files = SqliteFileStore::try_new(&conn).unwrap();
    let store = DraftStore::new(SqliteSlotStore::try_new(&conn).unwrap(), &files);

    assert!(store.get_files("nobody").unwrap().is_empty());

    store
        .save_files("a", &[DraftFile::new("1.png", "image/png", vec![1])])
        .unwrap();
    store
        .save_files("b", &[DraftFile::new("2.png", "image/png", vec![2])])
        .unwrap();
    assert_eq!(store.clear_files("a").unwrap(), 1);
    assert_eq!(files.list_scopes().unwrap(), vec!["b".to_string()]);
}

#[test]
fn storing_a_draft_for_another_service_drops_previous_files() {
    let conn = open_db_in_memory().unwrap();
    let store = DraftStore::new(
        SqliteSlotStore::try_new(&conn).unwrap(),
        SqliteFileStore::try_new(&conn).unwrap(),
    );
    let a_files = vec![DraftFile::new("a.png", "image/png", vec![1, 1])];
    let a = PendingBookingDraft::from_form(&service("svc-a"), &form_with(a_files.clone()));
    store.store(&a, &a_files).unwrap();

    let b = PendingBookingDraft::from_form(&service("svc-b"), &form_with(Vec::new()));
    store.store(&b, &[]).unwrap();

    assert!(store.get_files("svc-a").unwrap().is_empty());
    assert_eq!(store.load_draft().unwrap().unwrap().service_id, "svc-b");
}

#[test]
fn storing_over_an_unreadable_draft_drops_its_files() {
    let conn = open_db_in_memory().unwrap();
    let slots = SqliteSlotStore::try_new(&conn).unwrap();
    let files = SqliteFileStore::try_new(&conn).unwrap();
    let store = DraftStore::new(&slots, &files);
    store
        .save_files("svc-old", &[DraftFile::new("old.png", "image/png", vec![9])])
        .unwrap();
    slots.write_slot(PENDING_BOOKING_SLOT, "{\"serviceId\":").unwrap();

    let new_files = vec![DraftFile::new("new.png", "image/png", vec![1])];
    let draft = PendingBookingDraft::from_form(&service("svc-new"), &form_with(new_files.clone()));
    store.store(&draft, &new_files).unwrap();

    assert_eq!(files.list_scopes().unwrap(), vec!["svc-new".to_string()]);
    assert_eq!(store.load_draft().unwrap().unwrap().service_id, "svc-new");
}

#[test]
fn clear_draft_reports_presence() {
    let conn = open_db_in_memory().unwrap();
    let store = DraftStore::new(
        SqliteSlotStore::try_new(&conn).unwrap(),
        SqliteFileStore::try_new(&conn).unwrap(),
    );
    assert!(!store.clear_draft().unwrap());
    let draft = PendingBookingDraft::from_form(&service("svc-a"), &form_with(Vec::new()));
    store.save_draft(&draft).unwrap();
    assert!(store.clear_draft().unwrap());
    assert!(store.load_draft().unwrap().is_none());
}
