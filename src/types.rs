//! Data model for the storefront commerce API.
//!
//! These types serialize/deserialize directly to/from the camelCase JSON
//! payloads spoken by the backend, over both the HTTP gateway and the
//! realtime channel.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// One purchasable variant of a product (size/color combination).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub in_stock: bool,
}

/// Catalog product as returned by `/products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub rating: f64,
}

/// Paging metadata attached to catalog listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            total: 0,
        }
    }
}

/// Response envelope for `GET /products`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

/// One line item in the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub item_id: String,
    pub product_id: String,
    pub variant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub image: String,
}

/// Server-held cart snapshot.
///
/// All totals are computed by the server; the client replaces its copy
/// wholesale whenever a cart object arrives and never recomputes locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub shipping: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default)]
    pub currency: String,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Authenticated account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub created_at: String,
}

/// Response from `/auth/register` and `/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: AuthUser,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: u64,
    /// Present when the server resolved a different session for this user;
    /// the client rebinds its realtime channel to it.
    #[serde(default)]
    pub session_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Response from `POST /sessions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Shipping destination for checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// Payment instrument reference for checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub kind: String,
    pub token: String,
}

/// Minimal order reference returned by checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRef {
    pub id: String,
}

/// Response envelope for `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutResponse {
    pub order: OrderRef,
}

/// Order summary as returned by `GET /orders` / `GET /orders/{id}`.
///
/// The server attaches more (timeline, tracking, payment); only the fields
/// the client renders are modeled, the rest is preserved in `extra`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Response envelope for `GET /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderList {
    #[serde(default)]
    pub orders: Vec<Order>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A follow-up action the assistant suggests alongside a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAction {
    pub label: String,
    pub action: String,
}

/// Assistant response payload carried by realtime `response` frames and by
/// the HTTP interactions endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatResponsePayload {
    pub message: String,
    pub agent: Option<String>,
    /// Free-form agent data. Cart/product updates ride in here.
    pub data: serde_json::Value,
    pub suggested_actions: Vec<SuggestedAction>,
    pub metadata: serde_json::Value,
}

impl ChatResponsePayload {
    /// Extract an embedded cart update, if any.
    ///
    /// The backend nests carts one or two levels deep depending on which
    /// agent produced the response, so known shapes are probed in a fixed
    /// priority order: `data.cart`, then `data.data.cart`. Absence or a
    /// malformed object means "no update", never an error.
    pub fn cart_update(&self) -> Option<Cart> {
        probe_embedded(&self.data, "cart")
    }

    /// Extract an embedded product-list update, if any.
    ///
    /// Same shape probing as [`Self::cart_update`]: `data.products`, then
    /// `data.data.products`.
    pub fn product_update(&self) -> Option<Vec<Product>> {
        probe_embedded(&self.data, "products")
    }
}

/// Probe `data.<key>` then `data.data.<key>` and decode the first hit.
fn probe_embedded<T: serde::de::DeserializeOwned>(
    data: &serde_json::Value,
    key: &str,
) -> Option<T> {
    let candidates = [data.get(key), data.get("data").and_then(|d| d.get(key))];
    for candidate in candidates.into_iter().flatten() {
        if candidate.is_null() {
            continue;
        }
        match serde_json::from_value(candidate.clone()) {
            Ok(decoded) => return Some(decoded),
            Err(err) => {
                tracing::debug!(%key, %err, "ignoring malformed embedded payload");
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Chat history
// ---------------------------------------------------------------------------

/// Assistant half of a recorded interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryResponse {
    pub message: Option<String>,
    pub agent: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One recorded request/response pair from `/interactions/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// User-side text of the interaction. May be empty.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub response: HistoryResponse,
    #[serde(default)]
    pub timestamp: String,
}

/// Response envelope for `GET /interactions/history`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}
