//! Scripted in-process backend shared by integration tests.

#![allow(dead_code)]

use glowcart_core::api::{
    ApiError, ApiOperation, ApiResult, CartMirrorRequest, CreateBookingRequest,
    CreateOrderRequest, OrderReceipt, PaymentLink, Session, StorefrontApi,
};
use glowcart_core::model::booking::{BookingRecord, BookingStatus, PaymentStatus};
use glowcart_core::model::cart::{composite_item_id, ServerCartItem};
use glowcart_core::model::draft::{ServiceKind, ServiceSummary};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct State {
    cart: Vec<ServerCartItem>,
    calls: Vec<ApiOperation>,
    failing: HashSet<ApiOperation>,
    fail_once: HashMap<ApiOperation, VecDeque<u16>>,
    prices: HashMap<String, Decimal>,
    bookings: Vec<BookingRecord>,
    bookings_by_key: HashMap<String, String>,
    created: Vec<CreateBookingRequest>,
    mirror_adds: Vec<CartMirrorRequest>,
    mirror_removes: Vec<String>,
    orders: Vec<CreateOrderRequest>,
    status_updates: Vec<(String, BookingStatus)>,
}

/// Fake storefront backend with failure injection and call recording.
#[derive(Default)]
pub struct FakeStorefront {
    state: Mutex<State>,
}

impl FakeStorefront {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake state lock")
    }

    pub fn set_cart(&self, rows: Vec<ServerCartItem>) {
        self.lock().cart = rows;
    }

    pub fn set_service_price(&self, service_id: &str, price: Decimal) {
        self.lock().prices.insert(service_id.to_string(), price);
    }

    /// Every call to `operation` fails with HTTP 503 until `recover`.
    pub fn fail_always(&self, operation: ApiOperation) {
        self.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: ApiOperation) {
        self.lock().failing.remove(&operation);
    }

    /// The next call to `operation` fails with `status`.
    pub fn fail_once(&self, operation: ApiOperation, status: u16) {
        self.lock()
            .fail_once
            .entry(operation)
            .or_default()
            .push_back(status);
    }

    /// Overwrites the backend-side state of a booking.
    pub fn set_booking_state(&self, booking_number: &str, status: BookingStatus, payment: PaymentStatus) {
        let mut state = self.lock();
        if let Some(booking) = state
            .bookings
            .iter_mut()
            .find(|booking| booking.booking_number == booking_number)
        {
            booking.status = status;
            booking.payment_status = payment;
        }
    }

    pub fn insert_booking(&self, record: BookingRecord) {
        self.lock().bookings.push(record);
    }

    /// Current server-side cart rows.
    pub fn cart(&self) -> Vec<ServerCartItem> {
        self.lock().cart.clone()
    }

    /// Units the server cart holds for a composite id.
    pub fn server_quantity(&self, item_id: &str) -> u32 {
        self.lock()
            .cart
            .iter()
            .filter(|row| row_item_id(row) == item_id)
            .map(|row| row.quantity)
            .sum()
    }

    pub fn calls_to(&self, operation: ApiOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub fn created_requests(&self) -> Vec<CreateBookingRequest> {
        self.lock().created.clone()
    }

    pub fn bookings(&self) -> Vec<BookingRecord> {
        self.lock().bookings.clone()
    }

    pub fn mirror_adds(&self) -> Vec<CartMirrorRequest> {
        self.lock().mirror_adds.clone()
    }

    pub fn mirror_removes(&self) -> Vec<String> {
        self.lock().mirror_removes.clone()
    }

    pub fn orders(&self) -> Vec<CreateOrderRequest> {
        self.lock().orders.clone()
    }

    pub fn status_updates(&self) -> Vec<(String, BookingStatus)> {
        self.lock().status_updates.clone()
    }

    fn enter(&self, operation: ApiOperation) -> ApiResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(operation);
        if state.failing.contains(&operation) {
            return Err(ApiError::from_status(operation, 503, "service unavailable"));
        }
        if let Some(status) = state
            .fail_once
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(ApiError::from_status(operation, status, "injected failure"));
        }
        Ok(state)
    }
}

fn row_item_id(row: &ServerCartItem) -> String {
    composite_item_id(&row.product_id, row.size.as_deref(), row.color.as_deref())
}

fn not_found(operation: ApiOperation) -> ApiError {
    ApiError::from_status(operation, 404, "booking not found")
}

impl StorefrontApi for FakeStorefront {
    fn fetch_cart(&self, _session: &Session) -> ApiResult<Vec<ServerCartItem>> {
        let state = self.enter(ApiOperation::FetchCart)?;
        Ok(state.cart.clone())
    }

    fn add_cart_item(&self, _session: &Session, request: &CartMirrorRequest) -> ApiResult<()> {
        let mut state = self.enter(ApiOperation::AddCartItem)?;
        state.mirror_adds.push(request.clone());
        let item_id = composite_item_id(
            &request.product_id,
            request.size.as_deref(),
            request.color.as_deref(),
        );
        match state.cart.iter().position(|row| row_item_id(row) == item_id) {
            Some(index) => {
                let row = &mut state.cart[index];
                row.quantity = row.quantity.saturating_add(request.quantity);
            }
            None => {
                let row_id = format!("row-{}", state.cart.len() + 1);
                state.cart.push(ServerCartItem {
                    row_id,
                    product_id: request.product_id.clone(),
                    name: format!("Product {}", request.product_id),
                    slug: request.product_id.clone(),
                    price: Decimal::new(2500, 2),
                    image: String::new(),
                    quantity: request.quantity,
                    size: request.size.clone(),
                    color: request.color.clone(),
                });
            }
        }
        Ok(())
    }

    fn remove_cart_item(&self, _session: &Session, item_id: &str) -> ApiResult<()> {
        let mut state = self.enter(ApiOperation::RemoveCartItem)?;
        state.mirror_removes.push(item_id.to_string());
        state
            .cart
            .retain(|row| row.row_id != item_id && row_item_id(row) != item_id);
        Ok(())
    }

    fn create_order(
        &self,
        _session: &Session,
        request: &CreateOrderRequest,
    ) -> ApiResult<OrderReceipt> {
        let mut state = self.enter(ApiOperation::CreateOrder)?;
        state.orders.push(request.clone());
        Ok(OrderReceipt {
            id: format!("ord-{}", state.orders.len()),
        })
    }

    fn create_booking(
        &self,
        _session: &Session,
        request: &CreateBookingRequest,
    ) -> ApiResult<BookingRecord> {
        let mut state = self.enter(ApiOperation::CreateBooking)?;
        state.created.push(request.clone());
        if let Some(number) = state.bookings_by_key.get(&request.idempotency_key).cloned() {
            if let Some(existing) = state
                .bookings
                .iter()
                .find(|booking| booking.booking_number == number)
            {
                return Ok(existing.clone());
            }
        }

        let sequence = state.bookings.len() + 1;
        let record = BookingRecord {
            id: format!("bk-id-{sequence}"),
            booking_number: format!("BK-{sequence:04}"),
            service_id: request.service_id.clone(),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            amount: state
                .prices
                .get(&request.service_id)
                .copied()
                .unwrap_or_default(),
            date: request.date.clone(),
            time: request.time.clone(),
        };
        state
            .bookings_by_key
            .insert(request.idempotency_key.clone(), record.booking_number.clone());
        state.bookings.push(record.clone());
        Ok(record)
    }

    fn request_payment_link(&self, _session: &Session, booking_id: &str) -> ApiResult<PaymentLink> {
        let state = self.enter(ApiOperation::RequestPaymentLink)?;
        let booking = state
            .bookings
            .iter()
            .find(|booking| booking.id == booking_id)
            .ok_or_else(|| not_found(ApiOperation::RequestPaymentLink))?;
        Ok(PaymentLink {
            link: format!("https://pay.example/checkout/{}", booking.booking_number),
        })
    }

    fn get_booking(&self, _session: &Session, booking_number: &str) -> ApiResult<BookingRecord> {
        let state = self.enter(ApiOperation::GetBooking)?;
        state
            .bookings
            .iter()
            .find(|booking| booking.booking_number == booking_number)
            .cloned()
            .ok_or_else(|| not_found(ApiOperation::GetBooking))
    }

    fn update_booking_status(
        &self,
        _session: &Session,
        booking_number: &str,
        status: BookingStatus,
    ) -> ApiResult<BookingRecord> {
        let mut state = self.enter(ApiOperation::UpdateBookingStatus)?;
        state
            .status_updates
            .push((booking_number.to_string(), status));
        let booking = state
            .bookings
            .iter_mut()
            .find(|booking| booking.booking_number == booking_number)
            .ok_or_else(|| not_found(ApiOperation::UpdateBookingStatus))?;
        booking.status = status;
        Ok(booking.clone())
    }

    fn cancel_booking(&self, _session: &Session, booking_number: &str) -> ApiResult<BookingRecord> {
        let mut state = self.enter(ApiOperation::CancelBooking)?;
        let booking = state
            .bookings
            .iter_mut()
            .find(|booking| booking.booking_number == booking_number)
            .ok_or_else(|| not_found(ApiOperation::CancelBooking))?;
        booking.status = BookingStatus::Cancelled;
        if booking.payment_status == PaymentStatus::Paid {
            booking.payment_status = PaymentStatus::Refunded;
        }
        Ok(booking.clone())
    }
}

pub fn session() -> Session {
    Session::new("user-1", "token-abc")
}

pub fn consultation(id: &str, price: Decimal) -> ServiceSummary {
    ServiceSummary {
        id: id.to_string(),
        name: format!("Consultation {id}"),
        price,
        kind: ServiceKind::Consultation,
    }
}

pub fn standard(id: &str, price: Decimal) -> ServiceSummary {
    ServiceSummary {
        id: id.to_string(),
        name: format!("Service {id}"),
        price,
        kind: ServiceKind::Standard,
    }
}

pub fn server_row(row_id: &str, product_id: &str, quantity: u32) -> ServerCartItem {
    ServerCartItem {
        row_id: row_id.to_string(),
        product_id: product_id.to_string(),
        name: format!("Product {product_id}"),
        slug: product_id.to_string(),
        price: Decimal::new(2500, 2),
        image: String::new(),
        quantity,
        size: None,
        color: None,
    }
}
