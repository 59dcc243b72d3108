//! Cart line model and composite identity.
//!
//! # Responsibility
//! - Define the cart line shape persisted locally and mirrored server-side.
//! - Derive the composite identity that keeps size/color variants apart.
//!
//! # Invariants
//! - `CartItem::id` always equals `composite_item_id(product_id, size, color)`.
//! - A stored line never has `quantity == 0`.
//! - `price` is snapshotted when the line is created and never re-fetched.
//!
//! # See also
//! - docs/architecture/cart.md

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Composite cart line identity (`productId` or `productId-size-color`).
pub type CartItemId = String;

const VARIANT_SEPARATOR: char = '-';

/// Derives the composite identity for a product and optional variant.
///
/// - No variant: the trimmed product id alone.
/// - Any variant part present: `product-size-color`, with an absent part
///   rendered as the empty string.
///
/// Variant parts are trimmed and lowercased, so `" M "` and `"m"` collapse
/// into the same row. Blank parts count as absent.
pub fn composite_item_id(product_id: &str, size: Option<&str>, color: Option<&str>) -> CartItemId {
    let product_id = product_id.trim();
    let size = normalize_variant(size);
    let color = normalize_variant(color);

    if size.is_none() && color.is_none() {
        return product_id.to_string();
    }

    format!(
        "{product_id}{VARIANT_SEPARATOR}{}{VARIANT_SEPARATOR}{}",
        size.unwrap_or_default(),
        color.unwrap_or_default()
    )
}

fn normalize_variant(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// One cart row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Composite identity, see [`composite_item_id`].
    pub id: CartItemId,
    pub product_id: String,
    pub name: String,
    pub slug: String,
    /// Unit price captured at add time.
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl CartItem {
    /// Creates a variant-less line with its composite id computed.
    ///
    /// A `quantity` of zero is raised to one; a cart row always holds at
    /// least one unit.
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        slug: impl Into<String>,
        price: Decimal,
        quantity: u32,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            id: composite_item_id(&product_id, None, None),
            product_id,
            name: name.into(),
            slug: slug.into(),
            price,
            image: String::new(),
            quantity: quantity.max(1),
            size: None,
            color: None,
        }
    }

    /// Sets the variant and recomputes the composite id.
    pub fn with_variant(mut self, size: Option<String>, color: Option<String>) -> Self {
        self.size = non_blank(size);
        self.color = non_blank(color);
        self.id = composite_item_id(
            &self.product_id,
            self.size.as_deref(),
            self.color.as_deref(),
        );
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Price multiplied by quantity.
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Persisted cart slot payload.
///
/// `dirty` is set by every local mutation and cleared by a successful server
/// sync; it decides merge precedence in `service::cart_sync`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub last_synced_at_ms: Option<i64>,
}

/// Cart row as reported by `GET /cart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCartItem {
    /// Server-side row id, distinct from the composite id.
    #[serde(rename = "id")]
    pub row_id: String,
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl ServerCartItem {
    /// Converts into a local row, recomputing the composite id.
    ///
    /// Server rows with `quantity == 0` are returned as `None`.
    pub fn into_cart_item(self) -> Option<CartItem> {
        if self.quantity == 0 {
            return None;
        }

        Some(
            CartItem::new(
                self.product_id,
                self.name,
                self.slug,
                self.price,
                self.quantity,
            )
            .with_image(self.image)
            .with_variant(self.size, self.color),
        )
    }
}
