//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose cart, booking flow and booking status use-cases to Dart via FRB.
//! - Translate core results into flat envelopes the UI renders directly.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Money crosses the boundary as decimal strings, never floats.
//! - Every call opens its own connection; no connection outlives a call.

use glowcart_core::db::open_db;
use glowcart_core::model::booking::{
    available_actions, BookingAction, BookingRecord, BookingRole, BookingState, BookingStatus,
    PaymentStatus,
};
use glowcart_core::model::cart::CartItem;
use glowcart_core::model::draft::{ComposeEntry, ComposeForm, DraftFile, ServiceKind, ServiceSummary};
use glowcart_core::model::pricing::BookingQuote;
use glowcart_core::repo::file_repo::SqliteFileStore;
use glowcart_core::repo::slot_repo::SqliteSlotStore;
use glowcart_core::service::booking_flow::{
    BookingFlow, BookingFlowError, FlowRedirect, ReviewEntry,
};
use glowcart_core::service::booking_status::{observe_booking, ActionOutcome, BookingActions};
use glowcart_core::service::cart_store::{CartStore, CartUpdate};
use glowcart_core::service::draft_store::DraftStore;
use glowcart_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    HttpStorefrontApi, Session, StorefrontApi, StorefrontConfig,
};
use log::warn;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

const DB_FILE_NAME: &str = "glowcart_state.sqlite3";
const DB_PATH_ENV: &str = "GLOWCART_DB_PATH";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static CONFIG: OnceLock<StorefrontConfig> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Returns an empty string on success and the error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Installs the storefront configuration from JSON.
///
/// Missing fields keep their defaults. The first successful call wins; later
/// calls with a different config are rejected.
#[flutter_rust_bridge::frb(sync)]
pub fn configure(config_json: String) -> String {
    let parsed = match StorefrontConfig::from_json_str(&config_json) {
        Ok(config) => config,
        Err(err) => return err.to_string(),
    };
    let active = CONFIG.get_or_init(|| parsed.clone());
    if *active == parsed {
        String::new()
    } else {
        "storefront already configured; refusing to switch".to_string()
    }
}

/// Authenticated session passed in from the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInput {
    pub user_id: String,
    pub token: String,
}

impl SessionInput {
    fn to_session(&self) -> Session {
        Session::new(self.user_id.clone(), self.token.clone())
    }
}

/// Cart row as rendered by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineView {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub slug: String,
    pub image: String,
    pub price: String,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub line_total: String,
}

/// Cart envelope returned by every cart call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartResponse {
    pub ok: bool,
    pub items: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: String,
    /// Soft warning or error text; empty when there is nothing to say.
    pub message: String,
}

/// New cart row input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemInput {
    pub product_id: String,
    pub name: String,
    pub slug: String,
    pub image: String,
    pub price: String,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
}

/// Returns the persisted cart.
#[flutter_rust_bridge::frb(sync)]
pub fn cart_items() -> CartResponse {
    with_cart(None, |_| CartUpdate::default())
}

/// Adds a row; mirrored to the server when a session is given.
#[flutter_rust_bridge::frb(sync)]
pub fn cart_add_item(item: CartItemInput, session: Option<SessionInput>) -> CartResponse {
    let price = match parse_money(&item.price) {
        Ok(price) => price,
        Err(message) => return cart_failure(message),
    };
    let row = CartItem::new(item.product_id, item.name, item.slug, price, item.quantity)
        .with_variant(item.size, item.color)
        .with_image(item.image);
    with_cart(session.as_ref(), |cart| cart.add_item(row))
}

#[flutter_rust_bridge::frb(sync)]
pub fn cart_remove_item(id: String, session: Option<SessionInput>) -> CartResponse {
    with_cart(session.as_ref(), |cart| cart.remove_item(&id))
}

/// Applies a quantity delta; the quantity never drops below one.
///
/// Mirrored to the server when a session is given.
#[flutter_rust_bridge::frb(sync)]
pub fn cart_update_quantity(
    id: String,
    delta: i32,
    session: Option<SessionInput>,
) -> CartResponse {
    with_cart(session.as_ref(), |cart| cart.update_quantity(&id, delta))
}

#[flutter_rust_bridge::frb(sync)]
pub fn cart_clear() -> CartResponse {
    with_cart(None, |cart| cart.clear_cart())
}

/// Reconciles the local cart with the server cart after login.
pub fn cart_sync(session: SessionInput) -> CartResponse {
    let api = match storefront_api() {
        Ok(api) => api,
        Err(message) => return cart_failure(message),
    };
    let db_path = resolve_db_path();
    let conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => return cart_failure(format!("cart_sync failed: {err}")),
    };
    let slots = match SqliteSlotStore::try_new(&conn) {
        Ok(slots) => slots,
        Err(err) => return cart_failure(format!("cart_sync failed: {err}")),
    };
    let mut cart = CartStore::load(slots);
    cart.attach_session(api, session.to_session());
    match cart.sync_from_server() {
        Ok(report) => {
            let message = report
                .warning
                .map(|warning| warning.to_string())
                .unwrap_or_default();
            cart_response(&cart, true, message)
        }
        Err(err) => cart_response(&cart, false, err.to_string()),
    }
}

/// Checkout result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutResponse {
    pub ok: bool,
    pub order_id: Option<String>,
    pub message: String,
}

/// Places an order for the current cart and clears it on success.
pub fn cart_checkout(session: SessionInput) -> CheckoutResponse {
    let failure = |message: String| CheckoutResponse {
        ok: false,
        order_id: None,
        message,
    };
    let api = match storefront_api() {
        Ok(api) => api,
        Err(message) => return failure(message),
    };
    let db_path = resolve_db_path();
    let conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => return failure(format!("cart_checkout failed: {err}")),
    };
    let slots = match SqliteSlotStore::try_new(&conn) {
        Ok(slots) => slots,
        Err(err) => return failure(format!("cart_checkout failed: {err}")),
    };
    let mut cart = CartStore::load(slots);
    cart.attach_session(api, session.to_session());
    match cart.checkout() {
        Ok((receipt, update)) => CheckoutResponse {
            ok: true,
            order_id: Some(receipt.id),
            message: update
                .warning
                .map(|warning| warning.to_string())
                .unwrap_or_default(),
        },
        Err(err) => failure(err.to_string()),
    }
}

/// Service context for booking screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInput {
    pub id: String,
    pub name: String,
    pub price: String,
    /// `consultation` or `standard`.
    pub kind: String,
}

impl ServiceInput {
    fn to_summary(&self) -> Result<ServiceSummary, String> {
        let kind = match self.kind.trim().to_ascii_lowercase().as_str() {
            "consultation" => ServiceKind::Consultation,
            "standard" => ServiceKind::Standard,
            other => return Err(format!("unknown service kind `{other}`")),
        };
        Ok(ServiceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            price: parse_money(&self.price)?,
            kind,
        })
    }
}

/// Attachment crossing the boundary with its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInput {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Compose form state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeView {
    pub ok: bool,
    pub date: Option<String>,
    pub time: Option<String>,
    pub requirements: String,
    pub files: Vec<AttachmentInput>,
    pub message: String,
}

/// Navigation result of a booking flow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowResponse {
    pub ok: bool,
    /// `login|compose|review|payment`, empty on failure.
    pub next: String,
    /// Route path or external payment link.
    pub target: String,
    pub booking_number: Option<String>,
    pub message: String,
}

impl FlowResponse {
    fn redirect(redirect: FlowRedirect) -> Self {
        let (next, target, booking_number) = match redirect {
            FlowRedirect::Login { path } => ("login", path, None),
            FlowRedirect::Compose { path } => ("compose", path, None),
            FlowRedirect::Review { path } => ("review", path, None),
            FlowRedirect::Payment {
                link,
                booking_number,
            } => ("payment", link, Some(booking_number)),
        };
        Self {
            ok: true,
            next: next.to_string(),
            target,
            booking_number,
            message: String::new(),
        }
    }

    fn failure(message: impl Into<String>, booking_number: Option<String>) -> Self {
        Self {
            ok: false,
            next: String::new(),
            target: String::new(),
            booking_number,
            message: message.into(),
        }
    }
}

/// Review screen data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewView {
    pub service_name: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub requirements: String,
    pub attachment_names: Vec<String>,
    pub quote: QuoteView,
}

/// Review entry: either data to render or a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewResponse {
    pub review: Option<ReviewView>,
    pub redirect: Option<FlowResponse>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteView {
    pub price: String,
    pub service_fee: String,
    pub total: String,
}

impl From<BookingQuote> for QuoteView {
    fn from(quote: BookingQuote) -> Self {
        Self {
            price: quote.price.to_string(),
            service_fee: quote.service_fee.to_string(),
            total: quote.total.to_string(),
        }
    }
}

/// Price breakdown for `price` using the configured fee.
#[flutter_rust_bridge::frb(sync)]
pub fn booking_quote(price: String) -> Option<QuoteView> {
    let price = parse_money(&price).ok()?;
    Some(BookingQuote::for_price(price, config().service_fee_percent).into())
}

/// Opens the compose screen; `from` is the `from` query parameter.
#[flutter_rust_bridge::frb(sync)]
pub fn booking_compose_enter(service: ServiceInput, from: Option<String>) -> ComposeView {
    let failure = |message: String| ComposeView {
        ok: false,
        date: None,
        time: None,
        requirements: String::new(),
        files: Vec::new(),
        message,
    };
    let service = match service.to_summary() {
        Ok(service) => service,
        Err(message) => return failure(message),
    };
    let entry = ComposeEntry::from_query(from.as_deref());
    match with_flow(|flow| flow.enter_compose(&service, entry).map_err(|err| err.to_string())) {
        Ok(form) => ComposeView {
            ok: true,
            date: form.date,
            time: form.time,
            requirements: form.requirements,
            files: form
                .files
                .into_iter()
                .map(|file| AttachmentInput {
                    name: file.name,
                    mime_type: file.mime_type,
                    bytes: file.bytes,
                })
                .collect(),
            message: String::new(),
        },
        Err(message) => failure(message),
    }
}

/// Validates and stores the compose form.
#[flutter_rust_bridge::frb(sync)]
pub fn booking_compose_submit(
    service: ServiceInput,
    date: Option<String>,
    time: Option<String>,
    requirements: String,
    files: Vec<AttachmentInput>,
) -> FlowResponse {
    let service = match service.to_summary() {
        Ok(service) => service,
        Err(message) => return FlowResponse::failure(message, None),
    };
    let form = ComposeForm {
        date,
        time,
        requirements,
        files: files
            .into_iter()
            .map(|file| DraftFile::new(file.name, file.mime_type, file.bytes))
            .collect(),
    };
    match with_flow(|flow| {
        flow.submit_compose(&service, form)
            .map_err(|err| err.to_string())
    }) {
        Ok(redirect) => FlowResponse::redirect(redirect),
        Err(message) => FlowResponse::failure(message, None),
    }
}

/// Loads review data or the redirect the review screen must follow.
#[flutter_rust_bridge::frb(sync)]
pub fn booking_review_enter(service_id: String, session: Option<SessionInput>) -> ReviewResponse {
    let session = session.map(|input| input.to_session());
    match with_flow(|flow| {
        flow.enter_review(session.as_ref(), &service_id)
            .map_err(|err| err.to_string())
    }) {
        Ok(ReviewEntry::Ready(summary)) => ReviewResponse {
            review: Some(ReviewView {
                service_name: summary.draft.service_name,
                date: summary.draft.date,
                time: summary.draft.time,
                requirements: summary.draft.requirements,
                attachment_names: summary
                    .draft
                    .attachments
                    .into_iter()
                    .map(|meta| meta.name)
                    .collect(),
                quote: summary.quote.into(),
            }),
            redirect: None,
            message: String::new(),
        },
        Ok(ReviewEntry::Redirect(redirect)) => ReviewResponse {
            review: None,
            redirect: Some(FlowResponse::redirect(redirect)),
            message: String::new(),
        },
        Err(message) => ReviewResponse {
            review: None,
            redirect: None,
            message,
        },
    }
}

/// Creates the booking (once) and returns the payment redirect.
pub fn booking_confirm_and_pay(service_id: String, session: Option<SessionInput>) -> FlowResponse {
    let session = session.map(|input| input.to_session());
    let result = with_flow(|flow| Ok(flow.confirm_and_pay(session.as_ref(), &service_id)));
    match result {
        Ok(Ok(redirect)) => FlowResponse::redirect(redirect),
        Ok(Err(err)) => {
            let booking_number = match &err {
                BookingFlowError::PaymentLink { booking, .. }
                | BookingFlowError::BookingUnsaved { booking, .. } => {
                    Some(booking.booking_number.clone())
                }
                _ => None,
            };
            FlowResponse::failure(err.to_string(), booking_number)
        }
        Err(message) => FlowResponse::failure(message, None),
    }
}

/// Booking as rendered by client and provider views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingView {
    pub booking_number: String,
    pub status: String,
    pub payment_status: String,
    pub amount: String,
    pub date: Option<String>,
    pub time: Option<String>,
    /// Actions the requesting role may offer.
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingResponse {
    pub ok: bool,
    pub booking: Option<BookingView>,
    /// Payment link when the action was `pay`.
    pub payment_link: Option<String>,
    pub message: String,
}

impl BookingResponse {
    fn booking(record: BookingRecord, role: BookingRole) -> Self {
        Self {
            ok: true,
            booking: Some(booking_view(record, role)),
            payment_link: None,
            message: String::new(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            booking: None,
            payment_link: None,
            message: message.into(),
        }
    }
}

/// Re-reads a booking after the payment redirect (client view).
pub fn booking_refresh(booking_number: String, session: SessionInput) -> BookingResponse {
    let session = session.to_session();
    match with_flow(|flow| {
        flow.refresh_booking(&session, &booking_number)
            .map_err(|err| err.to_string())
    }) {
        Ok(record) => BookingResponse::booking(record, BookingRole::Client),
        Err(message) => BookingResponse::failure(message),
    }
}

/// Performs `action` (`pay|accept|start|complete|cancel`) for `role`
/// (`client|provider`).
pub fn booking_perform_action(
    booking_number: String,
    role: String,
    action: String,
    session: SessionInput,
) -> BookingResponse {
    let Some(role) = parse_role(&role) else {
        return BookingResponse::failure(format!("unknown role `{role}`"));
    };
    let Some(action) = parse_action(&action) else {
        return BookingResponse::failure(format!("unknown action `{action}`"));
    };
    let api = match storefront_api() {
        Ok(api) => api,
        Err(message) => return BookingResponse::failure(message),
    };
    let actions = BookingActions::new(api);
    match actions.perform(&session.to_session(), role, &booking_number, action) {
        Ok(ActionOutcome::Updated(record)) => BookingResponse::booking(observed(record), role),
        Ok(ActionOutcome::PaymentRedirect { link }) => BookingResponse {
            ok: true,
            booking: None,
            payment_link: Some(link),
            message: String::new(),
        },
        Err(err) => BookingResponse::failure(err.to_string()),
    }
}

/// Actions a `role` view may offer for a backend-reported pair.
///
/// Unknown values yield no actions.
#[flutter_rust_bridge::frb(sync)]
pub fn booking_available_actions(role: String, status: String, payment_status: String) -> Vec<String> {
    let (Some(role), Some(status), Some(payment)) = (
        parse_role(&role),
        BookingStatus::parse(&status),
        PaymentStatus::parse(&payment_status),
    ) else {
        return Vec::new();
    };
    available_actions(role, BookingState::new(status, payment))
        .into_iter()
        .map(|action| action.as_str().to_string())
        .collect()
}

/// Passes an action reply through the booking's persisted mirror.
///
/// Falls back to the reply itself when local state is unavailable.
fn observed(record: BookingRecord) -> BookingRecord {
    let db_path = resolve_db_path();
    let conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => {
            warn!("event=booking_mirror module=ffi status=skipped error={err}");
            return record;
        }
    };
    let slots = match SqliteSlotStore::try_new(&conn) {
        Ok(slots) => slots,
        Err(err) => {
            warn!("event=booking_mirror module=ffi status=skipped error={err}");
            return record;
        }
    };
    let fallback = record.clone();
    match observe_booking(&slots, record) {
        Ok((shown, _)) => shown,
        Err(err) => {
            warn!("event=booking_mirror module=ffi status=skipped error={err}");
            fallback
        }
    }
}

fn booking_view(record: BookingRecord, role: BookingRole) -> BookingView {
    let actions = available_actions(role, record.state())
        .into_iter()
        .map(|action| action.as_str().to_string())
        .collect();
    BookingView {
        booking_number: record.booking_number,
        status: record.status.as_str().to_string(),
        payment_status: record.payment_status.as_str().to_string(),
        amount: record.amount.to_string(),
        date: record.date,
        time: record.time,
        actions,
    }
}

fn parse_role(value: &str) -> Option<BookingRole> {
    match value.trim().to_ascii_lowercase().as_str() {
        "client" => Some(BookingRole::Client),
        "provider" => Some(BookingRole::Provider),
        _ => None,
    }
}

fn parse_action(value: &str) -> Option<BookingAction> {
    [
        BookingAction::Pay,
        BookingAction::Accept,
        BookingAction::Start,
        BookingAction::Complete,
        BookingAction::Cancel,
    ]
    .into_iter()
    .find(|action| action.as_str().eq_ignore_ascii_case(value.trim()))
}

fn parse_money(raw: &str) -> Result<Decimal, String> {
    let price = Decimal::from_str(raw.trim()).map_err(|err| format!("invalid price `{raw}`: {err}"))?;
    if price.is_sign_negative() {
        return Err(format!("invalid price `{raw}`: must not be negative"));
    }
    Ok(price)
}

fn config() -> &'static StorefrontConfig {
    CONFIG.get_or_init(StorefrontConfig::default)
}

fn storefront_api() -> Result<Arc<dyn StorefrontApi>, String> {
    let api = HttpStorefrontApi::from_config(config())
        .map_err(|err| format!("storefront client unavailable: {err}"))?;
    Ok(Arc::new(api))
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn with_cart(
    session: Option<&SessionInput>,
    mutate: impl FnOnce(&mut CartStore<SqliteSlotStore<'_>>) -> CartUpdate,
) -> CartResponse {
    let db_path = resolve_db_path();
    let conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => return cart_failure(format!("cart DB open failed: {err}")),
    };
    let slots = match SqliteSlotStore::try_new(&conn) {
        Ok(slots) => slots,
        Err(err) => return cart_failure(format!("cart store init failed: {err}")),
    };
    let mut cart = CartStore::load(slots);
    if let Some(session) = session {
        match storefront_api() {
            Ok(api) => cart.attach_session(api, session.to_session()),
            Err(message) => warn!("event=cart_mirror module=ffi status=skipped reason={message}"),
        }
    }
    let update = mutate(&mut cart);
    let message = update
        .warning
        .map(|warning| warning.to_string())
        .unwrap_or_default();
    cart_response(&cart, true, message)
}

fn with_flow<T>(
    f: impl FnOnce(&BookingFlow<SqliteSlotStore<'_>, SqliteFileStore<'_>>) -> Result<T, String>,
) -> Result<T, String> {
    let db_path = resolve_db_path();
    let conn = open_db(&db_path).map_err(|err| format!("booking DB open failed: {err}"))?;
    let slots =
        SqliteSlotStore::try_new(&conn).map_err(|err| format!("draft store init failed: {err}"))?;
    let files =
        SqliteFileStore::try_new(&conn).map_err(|err| format!("file store init failed: {err}"))?;
    let api = storefront_api()?;
    let flow = BookingFlow::new(DraftStore::new(slots, files), api, config().clone());
    f(&flow)
}

fn cart_response(
    cart: &CartStore<SqliteSlotStore<'_>>,
    ok: bool,
    message: String,
) -> CartResponse {
    CartResponse {
        ok,
        items: cart
            .items()
            .iter()
            .map(|item| CartLineView {
                id: item.id.clone(),
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                slug: item.slug.clone(),
                image: item.image.clone(),
                price: item.price.to_string(),
                quantity: item.quantity,
                size: item.size.clone(),
                color: item.color.clone(),
                line_total: item.line_total().to_string(),
            })
            .collect(),
        item_count: cart.item_count(),
        subtotal: cart.subtotal().to_string(),
        message,
    }
}

fn cart_failure(message: String) -> CartResponse {
    CartResponse {
        ok: false,
        items: Vec::new(),
        item_count: 0,
        subtotal: Decimal::ZERO.to_string(),
        message,
    }
}
