//! HTTP adapter for the storefront backend.
//!
//! # Responsibility
//! - Implement `StorefrontApi` over the REST backend with a blocking client.
//! - Map HTTP/transport/decode failures into `ApiError`.
//!
//! # Invariants
//! - Path parameters are percent-encoded as single segments.
//! - Response bodies of failed calls are never logged, only their status.

use crate::api::{
    ApiError, ApiOperation, ApiResult, CartMirrorRequest, CreateBookingRequest,
    CreateOrderRequest, OrderReceipt, PaymentLink, Session, StorefrontApi,
};
use crate::config::{ConfigError, StorefrontConfig};
use crate::model::booking::{BookingRecord, BookingStatus};
use crate::model::cart::ServerCartItem;
use log::{debug, warn};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Instant;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

#[derive(Deserialize)]
struct BookingEnvelope {
    booking: BookingRecord,
}

#[derive(Deserialize)]
struct PaymentEnvelope {
    data: PaymentLink,
}

#[derive(Deserialize)]
struct OrderEnvelope {
    order: OrderReceipt,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CartEnvelope {
    Rows(Vec<ServerCartItem>),
    Items { items: Vec<ServerCartItem> },
    Data { data: Vec<ServerCartItem> },
}

impl CartEnvelope {
    fn into_rows(self) -> Vec<ServerCartItem> {
        match self {
            Self::Rows(rows) | Self::Items { items: rows } | Self::Data { data: rows } => rows,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Blocking REST client for the storefront backend.
pub struct HttpStorefrontApi {
    base_url: Url,
    client: Client,
}

impl HttpStorefrontApi {
    /// Builds a client from a validated configuration.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut base_url =
            Url::parse(config.api_base_url.trim()).map_err(|err| ConfigError::Invalid {
                field: "api_base_url",
                message: err.to_string(),
            })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| ConfigError::Invalid {
                field: "api_base_url",
                message: format!("http client could not be built: {err}"),
            })?;

        Ok(Self { base_url, client })
    }

    fn endpoint(&self, operation: ApiOperation, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ApiError::new(
                    operation,
                    "invalid_url",
                    "backend base url cannot carry a path",
                    false,
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(
        &self,
        operation: ApiOperation,
        request: RequestBuilder,
        session: &Session,
    ) -> ApiResult<Response> {
        let started_at = Instant::now();
        let response = request
            .bearer_auth(&session.token)
            .send()
            .map_err(|err| {
                warn!(
                    "event=api_call module=api status=error operation={} duration_ms={} error_code=transport",
                    operation.as_str(),
                    started_at.elapsed().as_millis()
                );
                ApiError::new(
                    operation,
                    "transport",
                    format!("could not reach the server: {err}"),
                    err.is_timeout() || err.is_connect(),
                )
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                "event=api_call module=api status=ok operation={} http_status={} duration_ms={}",
                operation.as_str(),
                status.as_u16(),
                started_at.elapsed().as_millis()
            );
            return Ok(response);
        }

        warn!(
            "event=api_call module=api status=error operation={} http_status={} duration_ms={}",
            operation.as_str(),
            status.as_u16(),
            started_at.elapsed().as_millis()
        );
        let fallback = status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
        let body = response.text().unwrap_or_default();
        Err(ApiError::from_status(
            operation,
            status.as_u16(),
            error_message_from_body(&body).unwrap_or(fallback),
        ))
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        operation: ApiOperation,
        request: RequestBuilder,
        session: &Session,
    ) -> ApiResult<T> {
        self.send(operation, request, session)?
            .json::<T>()
            .map_err(|err| {
                ApiError::new(
                    operation,
                    "decode",
                    format!("unexpected server response: {err}"),
                    false,
                )
            })
    }
}

impl StorefrontApi for HttpStorefrontApi {
    fn fetch_cart(&self, session: &Session) -> ApiResult<Vec<ServerCartItem>> {
        let operation = ApiOperation::FetchCart;
        let url = self.endpoint(operation, &["cart"])?;
        let envelope: CartEnvelope = self.send_json(operation, self.client.get(url), session)?;
        Ok(envelope.into_rows())
    }

    fn add_cart_item(&self, session: &Session, request: &CartMirrorRequest) -> ApiResult<()> {
        let operation = ApiOperation::AddCartItem;
        let url = self.endpoint(operation, &["cart"])?;
        self.send(operation, self.client.post(url).json(request), session)?;
        Ok(())
    }

    fn remove_cart_item(&self, session: &Session, item_id: &str) -> ApiResult<()> {
        let operation = ApiOperation::RemoveCartItem;
        let url = self.endpoint(operation, &["cart", item_id])?;
        self.send(operation, self.client.delete(url), session)?;
        Ok(())
    }

    fn create_order(
        &self,
        session: &Session,
        request: &CreateOrderRequest,
    ) -> ApiResult<OrderReceipt> {
        let operation = ApiOperation::CreateOrder;
        let url = self.endpoint(operation, &["orders"])?;
        let envelope: OrderEnvelope =
            self.send_json(operation, self.client.post(url).json(request), session)?;
        Ok(envelope.order)
    }

    fn create_booking(
        &self,
        session: &Session,
        request: &CreateBookingRequest,
    ) -> ApiResult<BookingRecord> {
        let operation = ApiOperation::CreateBooking;
        let url = self.endpoint(operation, &["bookings", "create"])?;
        let form = booking_form(request)?;
        let builder = self
            .client
            .post(url)
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .multipart(form);
        let envelope: BookingEnvelope = self.send_json(operation, builder, session)?;
        Ok(envelope.booking)
    }

    fn request_payment_link(&self, session: &Session, booking_id: &str) -> ApiResult<PaymentLink> {
        let operation = ApiOperation::RequestPaymentLink;
        let url = self.endpoint(operation, &["bookings", booking_id, "pay"])?;
        let envelope: PaymentEnvelope = self.send_json(operation, self.client.post(url), session)?;
        Ok(envelope.data)
    }

    fn get_booking(&self, session: &Session, booking_number: &str) -> ApiResult<BookingRecord> {
        let operation = ApiOperation::GetBooking;
        let url = self.endpoint(operation, &["bookings", booking_number])?;
        let envelope: BookingEnvelope = self.send_json(operation, self.client.get(url), session)?;
        Ok(envelope.booking)
    }

    fn update_booking_status(
        &self,
        session: &Session,
        booking_number: &str,
        status: BookingStatus,
    ) -> ApiResult<BookingRecord> {
        let operation = ApiOperation::UpdateBookingStatus;
        let url = self.endpoint(operation, &["bookings", booking_number, "status"])?;
        let body = serde_json::json!({ "status": status });
        let envelope: BookingEnvelope =
            self.send_json(operation, self.client.patch(url).json(&body), session)?;
        Ok(envelope.booking)
    }

    fn cancel_booking(&self, session: &Session, booking_number: &str) -> ApiResult<BookingRecord> {
        let operation = ApiOperation::CancelBooking;
        let url = self.endpoint(operation, &["bookings", booking_number, "cancel"])?;
        let envelope: BookingEnvelope = self.send_json(operation, self.client.post(url), session)?;
        Ok(envelope.booking)
    }
}

fn booking_form(request: &CreateBookingRequest) -> ApiResult<Form> {
    let mut form = Form::new()
        .text("serviceId", request.service_id.clone())
        .text("requirements", request.requirements.clone());
    if let Some(date) = &request.date {
        form = form.text("date", date.clone());
    }
    if let Some(time) = &request.time {
        form = form.text("time", time.clone());
    }
    for file in &request.files {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|err| {
                ApiError::new(
                    ApiOperation::CreateBooking,
                    "invalid_attachment",
                    format!("attachment `{}` has an invalid type: {err}", file.name),
                    false,
                )
            })?;
        form = form.part("files", part);
    }
    Ok(form)
}

fn error_message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let message = match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(parsed) => parsed.message.or(parsed.error)?,
        Err(_) => trimmed.to_string(),
    };
    Some(message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect())
}
