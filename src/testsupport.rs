//! Shared test fixtures for transcript/channel/session test modules.
//!
//! Keeping the tiny reusable helpers here (temp dirs, wire-frame builders,
//! the stub backend) prevents each test module from rebuilding ad-hoc
//! fixture code.

use crate::error::RequestError;
use crate::gateway::{CommerceApi, ProductQuery};
use crate::types::{
    AuthResponse, AuthUser, Cart, ChatHistory, ChatResponsePayload, CheckoutResponse,
    HistoryMessage, HistoryResponse, Order, OrderList, PaymentMethod, Product, ProductPage,
    SessionCreated, ShippingAddress,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
///
/// This helper is intentionally simple and std-only so unit tests can use
/// it without introducing new dependencies.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    /// Create a unique temporary directory with a readable prefix.
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("shopmate-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    /// Root directory path for this fixture.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a child path under the fixture root.
    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Serialize one wire frame the way the backend does.
pub fn frame_json(kind: &str, payload: Value) -> String {
    json!({ "type": kind, "payload": payload }).to_string()
}

/// Build a minimal assistant response payload.
pub fn response_payload(message: &str, agent: Option<&str>) -> ChatResponsePayload {
    ChatResponsePayload {
        message: message.to_string(),
        agent: agent.map(str::to_string),
        ..Default::default()
    }
}

/// Build one recorded interaction pair for history fixtures.
pub fn history_record(id: &str, message: &str, response: Option<&str>) -> HistoryMessage {
    HistoryMessage {
        id: id.to_string(),
        session_id: "sess_fixture".to_string(),
        user_id: None,
        message: message.to_string(),
        intent: String::new(),
        agent: "general".to_string(),
        response: HistoryResponse {
            message: response.map(str::to_string),
            agent: response.map(|_| "general".to_string()),
            extra: Default::default(),
        },
        timestamp: String::new(),
    }
}

/// Server-shaped cart JSON with the given item count.
pub fn cart_fixture(item_count: u32) -> Value {
    json!({
        "id": "cart_fixture",
        "userId": null,
        "sessionId": "sess_fixture",
        "items": [],
        "subtotal": 89.0,
        "tax": 7.12,
        "shipping": 0.0,
        "discount": 0.0,
        "total": 96.12,
        "itemCount": item_count,
        "currency": "USD"
    })
}

// ---------------------------------------------------------------------------
// Stub backend
// ---------------------------------------------------------------------------

/// Deterministic [`CommerceApi`] implementation for tests.
///
/// Defaults to the happy path: probes succeed, minting returns the
/// configured id, history is empty. Individual calls can be overridden.
pub struct StubApi {
    session_id: String,
    auth_session: Option<String>,
    cart: Mutex<Option<Cart>>,
    history: Mutex<ChatHistory>,
    probe_override: Mutex<Option<Result<(), RequestError>>>,
    mint_override: Mutex<Option<Result<SessionCreated, RequestError>>>,
    mint_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl StubApi {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            auth_session: None,
            cart: Mutex::new(None),
            history: Mutex::new(ChatHistory {
                session_id: session_id.to_string(),
                messages: Vec::new(),
            }),
            probe_override: Mutex::new(None),
            mint_override: Mutex::new(None),
            mint_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        }
    }

    /// Override the next probe outcome.
    pub fn with_probe_result(self, result: Result<(), RequestError>) -> Self {
        *self.probe_override.lock().unwrap() = Some(result);
        self
    }

    /// Override the next mint outcome.
    pub fn with_mint_result(self, result: Result<SessionCreated, RequestError>) -> Self {
        *self.mint_override.lock().unwrap() = Some(result);
        self
    }

    /// Serve this cart from `GET /cart`.
    pub fn with_cart(self, cart: Value) -> Self {
        *self.cart.lock().unwrap() =
            Some(serde_json::from_value(cart).expect("cart fixture must decode"));
        self
    }

    /// Attach a resolved session id to auth responses.
    pub fn with_auth_session(mut self, session_id: &str) -> Self {
        self.auth_session = Some(session_id.to_string());
        self
    }

    /// Serve these records from the history endpoint.
    pub fn with_history(self, messages: Vec<HistoryMessage>) -> Self {
        self.history.lock().unwrap().messages = messages;
        self
    }

    pub fn mint_calls(&self) -> usize {
        self.mint_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    fn auth_response(&self, email: &str, name: &str) -> AuthResponse {
        AuthResponse {
            user: AuthUser {
                id: "u_stub".to_string(),
                email: email.to_string(),
                name: name.to_string(),
                role: "customer".to_string(),
                created_at: String::new(),
            },
            access_token: "tok_stub".to_string(),
            refresh_token: String::new(),
            expires_in: 900,
            session_id: self.auth_session.clone(),
        }
    }
}

fn not_stubbed<T>() -> Result<T, RequestError> {
    Err(RequestError::Status(501, "not stubbed".to_string()))
}

#[async_trait]
impl CommerceApi for StubApi {
    async fn create_session(&self, _channel: &str) -> Result<SessionCreated, RequestError> {
        self.mint_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.mint_override.lock().unwrap().take() {
            return result;
        }
        Ok(SessionCreated {
            session_id: self.session_id.clone(),
        })
    }

    async fn probe_session(&self, _session_id: &str) -> Result<(), RequestError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.probe_override.lock().unwrap().take() {
            return result;
        }
        Ok(())
    }

    async fn register(
        &self,
        email: &str,
        _password: &str,
        name: &str,
    ) -> Result<AuthResponse, RequestError> {
        Ok(self.auth_response(email, name))
    }

    async fn login(&self, email: &str, _password: &str) -> Result<AuthResponse, RequestError> {
        Ok(self.auth_response(email, "Stub User"))
    }

    async fn products(&self, _query: &ProductQuery) -> Result<ProductPage, RequestError> {
        not_stubbed()
    }

    async fn product(&self, _product_id: &str) -> Result<Product, RequestError> {
        not_stubbed()
    }

    async fn cart(&self) -> Result<Cart, RequestError> {
        match self.cart.lock().unwrap().clone() {
            Some(cart) => Ok(cart),
            None => Err(RequestError::Status(404, "Cart not found".to_string())),
        }
    }

    async fn add_cart_item(
        &self,
        _product_id: &str,
        _variant_id: &str,
        _quantity: u32,
    ) -> Result<(), RequestError> {
        Ok(())
    }

    async fn update_cart_item(&self, _item_id: &str, _quantity: u32) -> Result<(), RequestError> {
        Ok(())
    }

    async fn remove_cart_item(&self, _item_id: &str) -> Result<(), RequestError> {
        Ok(())
    }

    async fn checkout(
        &self,
        _address: &ShippingAddress,
        _payment: &PaymentMethod,
    ) -> Result<CheckoutResponse, RequestError> {
        not_stubbed()
    }

    async fn orders(&self) -> Result<OrderList, RequestError> {
        not_stubbed()
    }

    async fn order(&self, _order_id: &str) -> Result<Order, RequestError> {
        not_stubbed()
    }

    async fn chat_history(
        &self,
        _session_id: &str,
        _limit: u32,
    ) -> Result<ChatHistory, RequestError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.history.lock().unwrap().clone())
    }
}
