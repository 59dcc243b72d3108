mod support;

use glowcart_core::api::ApiOperation;
use glowcart_core::config::StorefrontConfig;
use glowcart_core::db::open_db_in_memory;
use glowcart_core::model::booking::{BookingStatus, PaymentStatus};
use glowcart_core::model::draft::{
    ComposeEntry, ComposeForm, ComposeValidationError, DraftFile, ServiceSummary,
};
use glowcart_core::repo::file_repo::SqliteFileStore;
use glowcart_core::repo::slot_repo::{SlotStore, SqliteSlotStore};
use glowcart_core::repo::{RepoError, RepoResult};
use glowcart_core::service::booking_flow::{
    BookingFlow, BookingFlowError, FlowRedirect, ReviewEntry,
};
use glowcart_core::service::draft_store::DraftStore;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::cell::Cell;
use std::sync::Arc;
use support::{consultation, session, standard, FakeStorefront};

type Flow<'conn> = BookingFlow<SqliteSlotStore<'conn>, SqliteFileStore<'conn>>;

fn flow<'conn>(conn: &'conn Connection, api: &Arc<FakeStorefront>) -> Flow<'conn> {
    let drafts = DraftStore::new(
        SqliteSlotStore::try_new(conn).unwrap(),
        SqliteFileStore::try_new(conn).unwrap(),
    );
    BookingFlow::new(drafts, api.clone(), StorefrontConfig::default())
}

fn three_files() -> Vec<DraftFile> {
    vec![
        DraftFile::new("before.jpg", "image/jpeg", vec![1; 1024]),
        DraftFile::new("inspo.png", "image/png", vec![2; 2048]),
        DraftFile::new("brief.pdf", "application/pdf", vec![3; 512]),
    ]
}

fn filled_form(files: Vec<DraftFile>) -> ComposeForm {
    ComposeForm {
        date: Some("2026-11-20".to_string()),
        time: Some("10:00".to_string()),
        requirements: "Evening look, long-wear".to_string(),
        files,
    }
}

fn compose_and_review(flow: &Flow<'_>, service: &ServiceSummary) {
    let form = flow.enter_compose(service, ComposeEntry::Fresh).unwrap();
    assert_eq!(form, ComposeForm::default());
    let next = flow
        .submit_compose(service, filled_form(three_files()))
        .unwrap();
    assert_eq!(
        next,
        FlowRedirect::Review {
            path: format!("/services/{}/book/review", service.id)
        }
    );
}

#[test]
fn back_from_review_restores_every_field_and_file() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = consultation("svc-a", Decimal::new(10000, 2));
    compose_and_review(&flow, &service);

    let back = flow.back_to_compose(&service.id);
    let FlowRedirect::Compose { path } = back else {
        panic!("expected compose redirect");
    };
    let query = path.split_once("from=").map(|(_, value)| value);
    let form = flow
        .enter_compose(&service, ComposeEntry::from_query(query))
        .unwrap();

    assert_eq!(form.date.as_deref(), Some("2026-11-20"));
    assert_eq!(form.time.as_deref(), Some("10:00"));
    assert_eq!(form.requirements, "Evening look, long-wear");
    let restored: Vec<(&str, u64)> = form
        .files
        .iter()
        .map(|file| (file.name.as_str(), file.size()))
        .collect();
    assert_eq!(
        restored,
        vec![("before.jpg", 1024), ("inspo.png", 2048), ("brief.pdf", 512)]
    );
}

#[test]
fn fresh_compose_for_another_service_never_shows_previous_draft() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    compose_and_review(&flow, &consultation("svc-a", Decimal::new(10000, 2)));

    let b = standard("svc-b", Decimal::new(4000, 2));
    let fresh = flow.enter_compose(&b, ComposeEntry::Fresh).unwrap();
    assert_eq!(fresh, ComposeForm::default());

    let returning = flow
        .enter_compose(&b, ComposeEntry::ReturnFromReview)
        .unwrap();
    assert_eq!(returning, ComposeForm::default());
    assert!(flow.drafts().get_files("svc-a").unwrap().is_empty());
}

#[test]
fn fresh_visit_to_same_service_clears_draft() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = consultation("svc-a", Decimal::new(10000, 2));
    compose_and_review(&flow, &service);

    let form = flow.enter_compose(&service, ComposeEntry::Fresh).unwrap();
    assert_eq!(form, ComposeForm::default());
    assert!(flow.drafts().load_draft().unwrap().is_none());
}

#[test]
fn invalid_compose_persists_nothing_and_calls_nothing() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = consultation("svc-a", Decimal::new(10000, 2));

    let err = flow
        .submit_compose(
            &service,
            ComposeForm {
                time: Some("10:00".to_string()),
                ..ComposeForm::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        BookingFlowError::Validation(ComposeValidationError::MissingDate)
    ));

    let seven: Vec<DraftFile> = (0..7)
        .map(|index| DraftFile::new(format!("{index}.png"), "image/png", vec![0]))
        .collect();
    let err = flow
        .submit_compose(&service, filled_form(seven))
        .unwrap_err();
    assert!(matches!(
        err,
        BookingFlowError::Validation(ComposeValidationError::TooManyFiles { count: 7, max: 6 })
    ));

    let oversized = vec![DraftFile::new(
        "raw.tiff",
        "image/tiff",
        vec![0; 10 * 1024 * 1024 + 1],
    )];
    assert!(matches!(
        flow.submit_compose(&service, filled_form(oversized)),
        Err(BookingFlowError::Validation(
            ComposeValidationError::FileTooLarge { .. }
        ))
    ));

    assert!(flow.drafts().load_draft().unwrap().is_none());
    assert_eq!(api.calls_to(ApiOperation::CreateBooking), 0);
}

#[test]
fn review_requires_session_and_matching_draft() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);

    let entry = flow.enter_review(None, "svc-a").unwrap();
    assert_eq!(
        entry,
        ReviewEntry::Redirect(FlowRedirect::Login {
            path: "/login?redirect=%2Fservices%2Fsvc-a%2Fbook%2Freview".to_string()
        })
    );

    let entry = flow.enter_review(Some(&session()), "svc-a").unwrap();
    assert_eq!(
        entry,
        ReviewEntry::Redirect(FlowRedirect::Compose {
            path: "/services/svc-a/book".to_string()
        })
    );

    compose_and_review(&flow, &consultation("svc-a", Decimal::new(10000, 2)));
    let entry = flow.enter_review(Some(&session()), "svc-other").unwrap();
    assert!(matches!(
        entry,
        ReviewEntry::Redirect(FlowRedirect::Compose { .. })
    ));
}

#[test]
fn review_quote_adds_rounded_service_fee() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = standard("svc-a", Decimal::new(4999, 2));
    flow.submit_compose(&service, ComposeForm::default())
        .unwrap();

    let ReviewEntry::Ready(summary) = flow.enter_review(Some(&session()), "svc-a").unwrap() else {
        panic!("expected review summary");
    };
    // 5% of 49.99 = 2.4995 -> 2.50
    assert_eq!(summary.quote.service_fee, Decimal::new(250, 2));
    assert_eq!(summary.quote.total, Decimal::new(5249, 2));
    assert_eq!(summary.draft.service_name, service.name);
}

#[test]
fn confirm_creates_booking_and_returns_payment_link() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = consultation("svc-a", Decimal::new(10000, 2));
    api.set_service_price("svc-a", service.price);
    compose_and_review(&flow, &service);

    let next = flow.confirm_and_pay(Some(&session()), "svc-a").unwrap();
    assert_eq!(
        next,
        FlowRedirect::Payment {
            link: "https://pay.example/checkout/BK-0001".to_string(),
            booking_number: "BK-0001".to_string(),
        }
    );

    let created = api.created_requests();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].files.len(), 3);
    assert_eq!(created[0].date.as_deref(), Some("2026-11-20"));
    let draft = flow.drafts().load_draft().unwrap().unwrap();
    assert_eq!(created[0].idempotency_key, draft.client_token.to_string());
    assert_eq!(
        draft.created_booking.map(|booking| booking.booking_number),
        Some("BK-0001".to_string())
    );
}

#[test]
fn payment_link_failure_retry_creates_no_second_booking() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    compose_and_review(&flow, &consultation("svc-a", Decimal::new(10000, 2)));

    api.fail_once(ApiOperation::RequestPaymentLink, 502);
    let err = flow.confirm_and_pay(Some(&session()), "svc-a").unwrap_err();
    match err {
        BookingFlowError::PaymentLink { booking, source } => {
            assert_eq!(booking.booking_number, "BK-0001");
            assert!(source.retryable);
        }
        other => panic!("unexpected error: {other}"),
    }

    let next = flow.confirm_and_pay(Some(&session()), "svc-a").unwrap();
    assert!(matches!(next, FlowRedirect::Payment { .. }));
    assert_eq!(api.calls_to(ApiOperation::CreateBooking), 1);
    assert_eq!(api.calls_to(ApiOperation::RequestPaymentLink), 2);
    assert_eq!(api.bookings().len(), 1);
}

#[test]
fn creation_failure_keeps_draft_for_retry() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    compose_and_review(&flow, &consultation("svc-a", Decimal::new(10000, 2)));

    api.fail_once(ApiOperation::CreateBooking, 503);
    assert!(matches!(
        flow.confirm_and_pay(Some(&session()), "svc-a"),
        Err(BookingFlowError::Creation(_))
    ));
    let draft = flow.drafts().load_draft().unwrap().unwrap();
    assert!(draft.created_booking.is_none());
    assert_eq!(flow.drafts().get_files("svc-a").unwrap().len(), 3);

    flow.confirm_and_pay(Some(&session()), "svc-a").unwrap();
    let keys: Vec<String> = api
        .created_requests()
        .into_iter()
        .map(|request| request.idempotency_key)
        .collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
}

#[test]
fn resubmitting_compose_keeps_or_drops_created_booking() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = consultation("svc-a", Decimal::new(10000, 2));
    compose_and_review(&flow, &service);
    api.fail_once(ApiOperation::RequestPaymentLink, 500);
    let _ = flow.confirm_and_pay(Some(&session()), "svc-a");
    let token = flow.drafts().load_draft().unwrap().unwrap().client_token;

    flow.submit_compose(&service, filled_form(three_files()))
        .unwrap();
    let same = flow.drafts().load_draft().unwrap().unwrap();
    assert_eq!(same.client_token, token);
    assert!(same.created_booking.is_some());

    let mut changed = filled_form(three_files());
    changed.time = Some("11:30".to_string());
    flow.submit_compose(&service, changed).unwrap();
    let fresh = flow.drafts().load_draft().unwrap().unwrap();
    assert_ne!(fresh.client_token, token);
    assert!(fresh.created_booking.is_none());
}

#[test]
fn refresh_after_payment_clears_draft_and_keeps_amount() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = consultation("svc-a", Decimal::new(10000, 2));
    api.set_service_price("svc-a", service.price);
    compose_and_review(&flow, &service);
    flow.confirm_and_pay(Some(&session()), "svc-a").unwrap();

    let pending = flow.refresh_booking(&session(), "BK-0001").unwrap();
    assert_eq!(pending.payment_status, PaymentStatus::Unpaid);
    assert!(flow.drafts().load_draft().unwrap().is_some());

    api.set_service_price("svc-a", Decimal::new(12000, 2));
    api.set_booking_state("BK-0001", BookingStatus::Pending, PaymentStatus::Paid);
    let paid = flow.refresh_booking(&session(), "BK-0001").unwrap();

    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.amount, Decimal::new(10000, 2));
    assert!(flow.drafts().load_draft().unwrap().is_none());
    assert!(flow.drafts().get_files("svc-a").unwrap().is_empty());
}

#[test]
fn confirm_without_session_redirects_to_login() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    compose_and_review(&flow, &consultation("svc-a", Decimal::new(10000, 2)));

    let next = flow.confirm_and_pay(None, "svc-a").unwrap();
    assert!(matches!(next, FlowRedirect::Login { .. }));
    assert_eq!(api.calls_to(ApiOperation::CreateBooking), 0);
}

#[test]
fn abandon_drops_draft_and_files() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    compose_and_review(&flow, &consultation("svc-a", Decimal::new(10000, 2)));

    flow.abandon().unwrap();
    assert!(flow.drafts().load_draft().unwrap().is_none());
    assert!(flow.drafts().get_files("svc-a").unwrap().is_empty());
}

#[test]
fn refresh_never_shows_a_regressed_booking() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let flow = flow(&conn, &api);
    let service = consultation("svc-a", Decimal::new(10000, 2));
    compose_and_review(&flow, &service);
    flow.confirm_and_pay(Some(&session()), "svc-a").unwrap();

    api.set_booking_state("BK-0001", BookingStatus::Confirmed, PaymentStatus::Paid);
    let confirmed = flow.refresh_booking(&session(), "BK-0001").unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    // A lagging replica reports the pre-payment state.
    api.set_booking_state("BK-0001", BookingStatus::Pending, PaymentStatus::Unpaid);
    let shown = flow.refresh_booking(&session(), "BK-0001").unwrap();
    assert_eq!(shown.status, BookingStatus::Confirmed);
    assert_eq!(shown.payment_status, PaymentStatus::Paid);

    // A later forward report is accepted again.
    api.set_booking_state("BK-0001", BookingStatus::InProgress, PaymentStatus::Paid);
    let started = flow.refresh_booking(&session(), "BK-0001").unwrap();
    assert_eq!(started.status, BookingStatus::InProgress);
}

struct FlakySlots<'conn> {
    inner: SqliteSlotStore<'conn>,
    fail_writes: Cell<bool>,
}

impl SlotStore for FlakySlots<'_> {
    fn read_slot(&self, slot: &str) -> RepoResult<Option<String>> {
        self.inner.read_slot(slot)
    }

    fn write_slot(&self, slot: &str, value: &str) -> RepoResult<()> {
        if self.fail_writes.get() {
            return Err(RepoError::InvalidData("storage quota exceeded".to_string()));
        }
        self.inner.write_slot(slot, value)
    }

    fn clear_slot(&self, slot: &str) -> RepoResult<bool> {
        self.inner.clear_slot(slot)
    }
}

#[test]
fn unrecorded_booking_stops_before_payment_link() {
    let conn = open_db_in_memory().unwrap();
    let api = FakeStorefront::new();
    let slots = FlakySlots {
        inner: SqliteSlotStore::try_new(&conn).unwrap(),
        fail_writes: Cell::new(false),
    };
    let flow = BookingFlow::new(
        DraftStore::new(&slots, SqliteFileStore::try_new(&conn).unwrap()),
        api.clone(),
        StorefrontConfig::default(),
    );
    let service = consultation("svc-a", Decimal::new(10000, 2));
    flow.submit_compose(&service, filled_form(Vec::new())).unwrap();

    slots.fail_writes.set(true);
    match flow.confirm_and_pay(Some(&session()), "svc-a") {
        Err(BookingFlowError::BookingUnsaved { booking, .. }) => {
            assert_eq!(booking.booking_number, "BK-0001");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(api.calls_to(ApiOperation::RequestPaymentLink), 0);
    let draft = flow.drafts().load_draft().unwrap().unwrap();
    assert!(draft.created_booking.is_none());
}
