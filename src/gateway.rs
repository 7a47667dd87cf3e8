//! Authenticated HTTP gateway for the storefront API.
//!
//! Every domain operation funnels through [`Gateway::request`], which owns
//! header attachment (bearer token, session id) and error normalization.
//! Callers never duplicate that logic.

use crate::config::ApiConfig;
use crate::error::RequestError;
use crate::identity::{IdentityKey, IdentityStore};
use crate::types::{
    AuthResponse, Cart, ChatHistory, CheckoutResponse, Order, OrderList, PaymentMethod, Product,
    ProductPage, SessionCreated, ShippingAddress,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Session id header attached to every request when a session exists.
const SESSION_HEADER: &str = "X-Session-Id";

/// Catalog listing filters. All fields optional; absent fields are omitted
/// from the query string.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Backend operations the session/chat layer depends on.
///
/// This trait lets tests drive session negotiation and the assistant loop
/// with deterministic fakes while the production path uses [`Gateway`].
#[async_trait]
pub trait CommerceApi: Send + Sync {
    async fn create_session(&self, channel: &str) -> Result<SessionCreated, RequestError>;
    async fn probe_session(&self, session_id: &str) -> Result<(), RequestError>;
    async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthResponse, RequestError>;
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, RequestError>;
    async fn products(&self, query: &ProductQuery) -> Result<ProductPage, RequestError>;
    async fn product(&self, product_id: &str) -> Result<Product, RequestError>;
    async fn cart(&self) -> Result<Cart, RequestError>;
    async fn add_cart_item(
        &self,
        product_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> Result<(), RequestError>;
    async fn update_cart_item(&self, item_id: &str, quantity: u32) -> Result<(), RequestError>;
    async fn remove_cart_item(&self, item_id: &str) -> Result<(), RequestError>;
    async fn checkout(
        &self,
        address: &ShippingAddress,
        payment: &PaymentMethod,
    ) -> Result<CheckoutResponse, RequestError>;
    async fn orders(&self) -> Result<OrderList, RequestError>;
    async fn order(&self, order_id: &str) -> Result<Order, RequestError>;
    async fn chat_history(&self, session_id: &str, limit: u32) -> Result<ChatHistory, RequestError>;
}

/// HTTP client for the storefront API.
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<dyn IdentityStore>,
}

impl Gateway {
    /// Build a gateway from API configuration and an identity store.
    pub fn new(config: &ApiConfig, identity: Arc<dyn IdentityStore>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            identity,
        }
    }

    /// Issue an authenticated request and decode the JSON response.
    ///
    /// `path` is appended to the configured base URL and must start with `/`.
    /// A `204 No Content` response decodes as the expected type's empty
    /// value rather than failing on a missing body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: &[(&str, String)],
    ) -> Result<T, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .header("Content-Type", "application/json");

        if let Some(token) = self.identity.get(IdentityKey::AccessToken) {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(session) = self.identity.get(IdentityKey::SessionId) {
            req = req.header(SESSION_HEADER, session);
        }
        for (name, value) in extra_headers {
            req = req.header(*name, value.as_str());
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message_from_body(status.as_u16(), &text);
            return Err(RequestError::Status(status.as_u16(), message));
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            return decode_empty();
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return decode_empty();
        }
        serde_json::from_str(&text).map_err(|err| RequestError::Decode(err.to_string()))
    }
}

/// Extract the human-readable error message from a failed response body.
///
/// Probes the structured shapes the backend emits (`error.message`, then
/// `detail`), falling back to the status line.
fn error_message_from_body(status: u16, text: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
        if let Some(detail) = value.get("detail").and_then(Value::as_str) {
            return detail.to_string();
        }
    }
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("request failed");
    format!("{status} {reason}")
}

/// Decode the "empty" value of `T` for bodyless success responses.
fn decode_empty<T: DeserializeOwned>() -> Result<T, RequestError> {
    serde_json::from_value(Value::Null)
        .or_else(|_| serde_json::from_str("{}"))
        .map_err(|err| RequestError::Decode(format!("empty response for non-empty shape: {err}")))
}

/// Percent-encode one path segment or query value.
fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[async_trait]
impl CommerceApi for Gateway {
    async fn create_session(&self, channel: &str) -> Result<SessionCreated, RequestError> {
        self.request(
            Method::POST,
            "/sessions",
            Some(json!({ "channel": channel, "initialContext": {} })),
            &[],
        )
        .await
    }

    async fn probe_session(&self, session_id: &str) -> Result<(), RequestError> {
        let path = format!("/sessions/{}", encode(session_id));
        self.request::<Value>(Method::GET, &path, None, &[])
            .await
            .map(|_| ())
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthResponse, RequestError> {
        self.request(
            Method::POST,
            "/auth/register",
            Some(json!({ "email": email, "password": password, "name": name })),
            &[],
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, RequestError> {
        self.request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": email, "password": password })),
            &[],
        )
        .await
    }

    async fn products(&self, query: &ProductQuery) -> Result<ProductPage, RequestError> {
        let qs = {
            let mut params = url::form_urlencoded::Serializer::new(String::new());
            if let Some(q) = &query.query {
                params.append_pair("query", q);
            }
            if let Some(category) = &query.category {
                params.append_pair("category", category);
            }
            if let Some(page) = query.page {
                params.append_pair("page", &page.to_string());
            }
            if let Some(limit) = query.limit {
                params.append_pair("limit", &limit.to_string());
            }
            params.finish()
        };
        let path = if qs.is_empty() {
            "/products".to_string()
        } else {
            format!("/products?{qs}")
        };
        self.request(Method::GET, &path, None, &[]).await
    }

    async fn product(&self, product_id: &str) -> Result<Product, RequestError> {
        let path = format!("/products/{}", encode(product_id));
        self.request(Method::GET, &path, None, &[]).await
    }

    async fn cart(&self) -> Result<Cart, RequestError> {
        self.request(Method::GET, "/cart", None, &[]).await
    }

    async fn add_cart_item(
        &self,
        product_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> Result<(), RequestError> {
        self.request::<Value>(
            Method::POST,
            "/cart/items",
            Some(json!({
                "productId": product_id,
                "variantId": variant_id,
                "quantity": quantity,
            })),
            &[],
        )
        .await
        .map(|_| ())
    }

    async fn update_cart_item(&self, item_id: &str, quantity: u32) -> Result<(), RequestError> {
        let path = format!("/cart/items/{}", encode(item_id));
        self.request::<Value>(
            Method::PUT,
            &path,
            Some(json!({ "quantity": quantity })),
            &[],
        )
        .await
        .map(|_| ())
    }

    async fn remove_cart_item(&self, item_id: &str) -> Result<(), RequestError> {
        let path = format!("/cart/items/{}", encode(item_id));
        self.request::<Value>(Method::DELETE, &path, None, &[])
            .await
            .map(|_| ())
    }

    async fn checkout(
        &self,
        address: &ShippingAddress,
        payment: &PaymentMethod,
    ) -> Result<CheckoutResponse, RequestError> {
        // One key per attempt: retries of a failed call are new attempts,
        // while server-side duplicates of one attempt collapse.
        let idempotency_key = uuid::Uuid::new_v4().to_string();
        self.request(
            Method::POST,
            "/orders",
            Some(json!({
                "shippingAddress": address,
                "paymentMethod": payment,
            })),
            &[("Idempotency-Key", idempotency_key)],
        )
        .await
    }

    async fn orders(&self) -> Result<OrderList, RequestError> {
        self.request(Method::GET, "/orders", None, &[]).await
    }

    async fn order(&self, order_id: &str) -> Result<Order, RequestError> {
        let path = format!("/orders/{}", encode(order_id));
        self.request(Method::GET, &path, None, &[]).await
    }

    async fn chat_history(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<ChatHistory, RequestError> {
        let path = format!(
            "/interactions/history?sessionId={}&limit={limit}",
            encode(session_id)
        );
        self.request(Method::GET, &path, None, &[]).await
    }
}
