//! Storefront backend port.
//!
//! # Responsibility
//! - Define the narrow request/response contracts the core consumes.
//! - Keep transport details behind the `StorefrontApi` trait so stores and
//!   controllers can be driven by in-process fakes in tests.
//!
//! # Invariants
//! - Every call is authenticated by an explicit `Session`.
//! - Errors carry the failing operation and whether a retry can help.

pub mod http;

use crate::model::booking::{BookingRecord, BookingStatus};
use crate::model::cart::ServerCartItem;
use crate::model::draft::DraftFile;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use http::HttpStorefrontApi;

pub type ApiResult<T> = Result<T, ApiError>;

/// Authenticated user session handed in by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

/// Backend operation identifiers, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    FetchCart,
    AddCartItem,
    RemoveCartItem,
    CreateOrder,
    CreateBooking,
    RequestPaymentLink,
    GetBooking,
    UpdateBookingStatus,
    CancelBooking,
}

impl ApiOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchCart => "fetch_cart",
            Self::AddCartItem => "add_cart_item",
            Self::RemoveCartItem => "remove_cart_item",
            Self::CreateOrder => "create_order",
            Self::CreateBooking => "create_booking",
            Self::RequestPaymentLink => "request_payment_link",
            Self::GetBooking => "get_booking",
            Self::UpdateBookingStatus => "update_booking_status",
            Self::CancelBooking => "cancel_booking",
        }
    }
}

/// Backend call failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub operation: ApiOperation,
    /// Stable machine code (`http_404`, `transport`, `decode`, ...).
    pub code: String,
    /// Message suitable for showing next to the triggering action.
    pub message: String,
    pub http_status: Option<u16>,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(
        operation: ApiOperation,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            operation,
            code: code.into(),
            message: message.into(),
            http_status: None,
            retryable,
        }
    }

    /// Error for a non-success HTTP response.
    ///
    /// 5xx, 408 and 429 are retryable; other statuses are not.
    pub fn from_status(operation: ApiOperation, status: u16, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: format!("http_{status}"),
            message: message.into(),
            http_status: Some(status),
            retryable: status >= 500 || status == 408 || status == 429,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.operation.as_str(), self.message)
    }
}

impl Error for ApiError {}

/// `POST /cart` body mirroring a local add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMirrorRequest {
    pub product_id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// One line of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: u32,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderReceipt {
    pub id: String,
}

/// Multipart `POST /bookings/create` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBookingRequest {
    pub service_id: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub requirements: String,
    pub files: Vec<DraftFile>,
    /// Sent as `Idempotency-Key`.
    pub idempotency_key: String,
}

/// External payment redirect returned by `POST /bookings/{id}/pay`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentLink {
    pub link: String,
}

/// Backend contracts consumed by the core.
///
/// Implementations are synchronous; callers decide which thread runs them.
pub trait StorefrontApi: Send + Sync {
    /// `GET /cart`.
    fn fetch_cart(&self, session: &Session) -> ApiResult<Vec<ServerCartItem>>;
    /// `POST /cart`.
    fn add_cart_item(&self, session: &Session, request: &CartMirrorRequest) -> ApiResult<()>;
    /// `DELETE /cart/{itemId}`; accepts a composite id or a server row id.
    fn remove_cart_item(&self, session: &Session, item_id: &str) -> ApiResult<()>;
    /// `POST /orders`.
    fn create_order(
        &self,
        session: &Session,
        request: &CreateOrderRequest,
    ) -> ApiResult<OrderReceipt>;
    /// `POST /bookings/create`.
    fn create_booking(
        &self,
        session: &Session,
        request: &CreateBookingRequest,
    ) -> ApiResult<BookingRecord>;
    /// `POST /bookings/{id}/pay`.
    fn request_payment_link(&self, session: &Session, booking_id: &str) -> ApiResult<PaymentLink>;
    /// `GET /bookings/{bookingNumber}`.
    fn get_booking(&self, session: &Session, booking_number: &str) -> ApiResult<BookingRecord>;
    /// `PATCH /bookings/{bookingNumber}/status`.
    fn update_booking_status(
        &self,
        session: &Session,
        booking_number: &str,
        status: BookingStatus,
    ) -> ApiResult<BookingRecord>;
    /// `POST /bookings/{bookingNumber}/cancel`.
    fn cancel_booking(&self, session: &Session, booking_number: &str) -> ApiResult<BookingRecord>;
}
