//! The assistant session controller.
//!
//! [`Assistant`] is the single owner of chat state: it negotiates the
//! session, owns the supervised realtime connection, reduces channel
//! events into the transcript and the cart snapshot, and exposes a typed
//! event stream for whatever frontend drives it. Cart mutations from
//! direct REST calls and from chat-driven agent actions converge on the
//! same snapshot here.

use crate::channel::{ChannelEvent, ChannelMessage, ChatChannel};
use crate::config::Config;
use crate::error::ClientError;
use crate::gateway::{CommerceApi, ProductQuery};
use crate::identity::{IdentityKey, IdentityStore};
use crate::session::ensure_session;
use crate::supervisor::{CloseDisposition, LinkStatus, ReconnectSupervisor};
use crate::transcript::{ConversationTurn, Transcript};
use crate::types::{
    AuthUser, Cart, CheckoutResponse, Order, OrderList, PaymentMethod, Product, ProductPage,
    ShippingAddress,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Events surfaced to the driving frontend.
#[derive(Debug, Clone)]
pub enum AssistantEvent {
    /// Realtime link established (or re-established).
    Connected,
    /// Realtime link dropped; a reconnect is pending when a delay is given.
    Disconnected { reconnect_in: Option<Duration> },
    /// The server rebound this client to a different session.
    SessionChanged { session_id: String },
    Typing {
        actor: Option<String>,
        is_typing: bool,
    },
    /// A streamed assistant turn opened.
    TurnStarted { id: String, agent: Option<String> },
    /// Incremental text for a streamed turn.
    TurnDelta { id: String, delta: String },
    /// An assistant turn reached its final text.
    TurnCompleted { turn: ConversationTurn },
    /// The transcript was replaced from a history fetch.
    HistoryLoaded { turns: usize },
    /// The server shipped a fresh authoritative cart.
    CartUpdated { cart: Cart },
    /// The assistant attached product suggestions to a response.
    ProductsSuggested { products: Vec<Product> },
    /// Transport or server error text for status surfaces.
    Error { message: String },
}

/// Chat session controller tying the gateway, identity store, transcript,
/// and supervised channel together.
pub struct Assistant {
    config: Config,
    identity: Arc<dyn IdentityStore>,
    api: Arc<dyn CommerceApi>,
    transcript: Transcript,
    cart: Option<Cart>,
    supervisor: ReconnectSupervisor,
    session_id: Option<String>,
    channel: Option<ChatChannel>,
    events_tx: mpsc::UnboundedSender<ChannelMessage>,
    events_rx: mpsc::UnboundedReceiver<ChannelMessage>,
    pending: VecDeque<AssistantEvent>,
    reconnect_at: Option<Instant>,
    resync_on_open: bool,
}

impl Assistant {
    pub fn new(config: Config, identity: Arc<dyn IdentityStore>, api: Arc<dyn CommerceApi>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor =
            ReconnectSupervisor::new(Duration::from_millis(config.realtime.reconnect_delay_ms));
        Self {
            config,
            identity,
            api,
            transcript: Transcript::new(),
            cart: None,
            supervisor,
            session_id: None,
            channel: None,
            events_tx,
            events_rx,
            pending: VecDeque::new(),
            reconnect_at: None,
            resync_on_open: false,
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Negotiate a session, load initial state, and open the realtime
    /// channel. Initial history/cart fetch failures degrade to warnings;
    /// a failed first connect is returned to the caller.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        let session_id = ensure_session(self.identity.as_ref(), self.api.as_ref()).await?;
        self.session_id = Some(session_id.clone());

        // Independent fetches; join both before touching state.
        let (history, cart) = tokio::join!(
            self.api
                .chat_history(&session_id, self.config.chat.history_limit),
            self.api.cart(),
        );
        match history {
            Ok(history) => {
                self.transcript.apply_history(&history.messages);
                self.pending.push_back(AssistantEvent::HistoryLoaded {
                    turns: self.transcript.len(),
                });
            }
            Err(err) => tracing::warn!(%err, "failed to load chat history"),
        }
        match cart {
            Ok(cart) => self.cart = Some(cart),
            Err(err) => tracing::warn!(%err, "failed to load cart"),
        }

        self.connect_channel().await
    }

    async fn connect_channel(&mut self) -> Result<(), ClientError> {
        let session_id = self
            .session_id
            .clone()
            .unwrap_or_else(|| self.identity.get(IdentityKey::SessionId).unwrap_or_default());
        let conn_id = self.supervisor.begin_connect();
        match ChatChannel::connect(
            &self.config.realtime.ws_url,
            &session_id,
            conn_id,
            Arc::clone(&self.identity),
            self.events_tx.clone(),
            Duration::from_secs(self.config.realtime.connect_timeout_secs),
        )
        .await
        {
            Ok(channel) => {
                self.channel = Some(channel);
                Ok(())
            }
            Err(err) => {
                self.supervisor.connect_failed(conn_id);
                Err(err.into())
            }
        }
    }

    /// Rebind the realtime channel to a new session id, superseding the
    /// current connection. The old socket is marked intentional before it
    /// closes, so its late signals are ignored.
    async fn rebind(&mut self, session_id: &str) -> Result<(), ClientError> {
        self.identity.set(IdentityKey::SessionId, Some(session_id))?;
        self.session_id = Some(session_id.to_string());
        self.supervisor.mark_intentional();
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.resync_on_open = true;
        // Reconnect on the next poll; close signals from the old socket
        // resolve as intentional or stale either way.
        self.reconnect_at = Some(Instant::now());
        Ok(())
    }

    /// Tear the realtime link down and stop all pending work. No further
    /// events fire after this returns.
    pub fn shutdown(&mut self) {
        self.reconnect_at = None;
        self.supervisor.mark_intentional();
        if let Some(channel) = self.channel.take() {
            channel.abort();
        }
        self.supervisor.reset();
    }

    // -----------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------

    /// Wait for the next frontend-facing event.
    pub async fn next_event(&mut self) -> AssistantEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                message = self.events_rx.recv() => {
                    // The assistant holds a sender clone, so recv only
                    // yields None if something is badly wrong; treat it
                    // as a dead link.
                    match message {
                        Some(message) => self.handle_channel_message(message).await,
                        None => {
                            return AssistantEvent::Disconnected { reconnect_in: None };
                        }
                    }
                }
                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() =>
                {
                    self.reconnect_at = None;
                    if let Err(err) = self.connect_channel().await {
                        let delay = self.supervisor.reconnect_delay();
                        self.reconnect_at = Some(Instant::now() + delay);
                        self.pending.push_back(AssistantEvent::Error {
                            message: format!("reconnect failed: {err}"),
                        });
                    }
                }
            }
        }
    }

    async fn handle_channel_message(&mut self, message: ChannelMessage) {
        let ChannelMessage { conn_id, event } = message;
        match event {
            ChannelEvent::Open => {
                if !self.supervisor.on_open(conn_id) {
                    return;
                }
                if self.resync_on_open {
                    self.resync_on_open = false;
                    self.refresh_history().await;
                }
                self.pending.push_back(AssistantEvent::Connected);
            }
            ChannelEvent::Closed => match self.supervisor.on_close(conn_id) {
                CloseDisposition::Stale | CloseDisposition::Intentional => {}
                CloseDisposition::Unintentional => {
                    self.channel = None;
                    self.resync_on_open = true;
                    let delay = self.supervisor.reconnect_delay();
                    self.reconnect_at = Some(Instant::now() + delay);
                    self.pending.push_back(AssistantEvent::Disconnected {
                        reconnect_in: Some(delay),
                    });
                }
            },
            event if !self.supervisor.is_current(conn_id) => {
                tracing::debug!(conn_id, ?event, "dropping event from superseded connection");
            }
            ChannelEvent::Session { session_id } => {
                // Already persisted by the channel; track it for reconnects.
                if self.session_id.as_deref() != Some(session_id.as_str()) {
                    self.session_id = Some(session_id.clone());
                    self.pending
                        .push_back(AssistantEvent::SessionChanged { session_id });
                }
            }
            ChannelEvent::Typing { actor, is_typing } => {
                self.transcript.set_typing(is_typing);
                self.pending
                    .push_back(AssistantEvent::Typing { actor, is_typing });
            }
            ChannelEvent::Response { payload, stream_id } => {
                if let Some(cart) = payload.cart_update() {
                    self.cart = Some(cart.clone());
                    self.pending.push_back(AssistantEvent::CartUpdated { cart });
                }
                if let Some(products) = payload.product_update() {
                    self.pending
                        .push_back(AssistantEvent::ProductsSuggested { products });
                }
                if let Some(turn) = self
                    .transcript
                    .apply_response(&payload, stream_id.as_deref())
                {
                    self.pending.push_back(AssistantEvent::TurnCompleted {
                        turn: turn.clone(),
                    });
                }
            }
            ChannelEvent::StreamStart { stream_id, agent } => {
                if self.transcript.apply_stream_start(&stream_id, agent.as_deref()) {
                    self.pending.push_back(AssistantEvent::TurnStarted {
                        id: stream_id,
                        agent,
                    });
                }
            }
            ChannelEvent::StreamDelta { stream_id, delta } => {
                if self.transcript.apply_stream_delta(&stream_id, &delta) {
                    self.pending.push_back(AssistantEvent::TurnDelta {
                        id: stream_id,
                        delta,
                    });
                }
            }
            ChannelEvent::StreamEnd { stream_id } => {
                if let Some(turn) = self.transcript.apply_stream_end(&stream_id) {
                    self.pending.push_back(AssistantEvent::TurnCompleted {
                        turn: turn.clone(),
                    });
                }
            }
            ChannelEvent::Error { message } => {
                self.pending.push_back(AssistantEvent::Error { message });
            }
        }
    }

    async fn refresh_history(&mut self) {
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        match self
            .api
            .chat_history(&session_id, self.config.chat.history_limit)
            .await
        {
            Ok(history) => {
                self.transcript.apply_history(&history.messages);
                self.pending.push_back(AssistantEvent::HistoryLoaded {
                    turns: self.transcript.len(),
                });
            }
            Err(err) => tracing::warn!(%err, "history resync failed"),
        }
    }

    // -----------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------

    /// Send one user message over the realtime channel, echoing it into
    /// the transcript. Returns false (a no-op) while disconnected; sends
    /// are never queued or retried.
    pub fn send_message(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(channel) = &self.channel else {
            return false;
        };
        if !channel.send_chat(text, self.config.chat.stream, self.config.chat.typing) {
            return false;
        }
        self.transcript.append_local_user_turn(text);
        true
    }

    // -----------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------

    /// Register a new account. The guest session id is kept, so the
    /// server merges the guest cart into the new account; the cart is
    /// reloaded afterwards to pick the merge up.
    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthUser, ClientError> {
        let auth = self.api.register(email, password, name).await?;
        self.adopt_auth(&auth.access_token, auth.session_id.as_deref())
            .await?;
        Ok(auth.user)
    }

    /// Log into an existing account and reload the cart under it.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthUser, ClientError> {
        let auth = self.api.login(email, password).await?;
        self.adopt_auth(&auth.access_token, auth.session_id.as_deref())
            .await?;
        Ok(auth.user)
    }

    /// Drop the stored access token. The guest session persists.
    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.identity.set(IdentityKey::AccessToken, None)?;
        Ok(())
    }

    async fn adopt_auth(
        &mut self,
        access_token: &str,
        session_id: Option<&str>,
    ) -> Result<(), ClientError> {
        self.identity
            .set(IdentityKey::AccessToken, Some(access_token))?;
        if let Some(new_id) = session_id {
            if self.session_id.as_deref() != Some(new_id) {
                self.rebind(new_id).await?;
            }
        }
        match self.api.cart().await {
            Ok(cart) => {
                self.cart = Some(cart.clone());
                self.pending.push_back(AssistantEvent::CartUpdated { cart });
            }
            Err(err) => tracing::warn!(%err, "cart reload after auth failed"),
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Catalog, cart, orders
    // -----------------------------------------------------------------

    pub async fn products(&self, query: &ProductQuery) -> Result<ProductPage, ClientError> {
        Ok(self.api.products(query).await?)
    }

    pub async fn product(&self, product_id: &str) -> Result<Product, ClientError> {
        Ok(self.api.product(product_id).await?)
    }

    /// Fetch the authoritative cart and replace the local snapshot.
    pub async fn refresh_cart(&mut self) -> Result<Cart, ClientError> {
        let cart = self.api.cart().await?;
        self.cart = Some(cart.clone());
        Ok(cart)
    }

    pub async fn add_item(
        &mut self,
        product_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> Result<Cart, ClientError> {
        self.api
            .add_cart_item(product_id, variant_id, quantity)
            .await?;
        self.refresh_cart().await
    }

    pub async fn update_item(&mut self, item_id: &str, quantity: u32) -> Result<Cart, ClientError> {
        self.api.update_cart_item(item_id, quantity).await?;
        self.refresh_cart().await
    }

    pub async fn remove_item(&mut self, item_id: &str) -> Result<Cart, ClientError> {
        self.api.remove_cart_item(item_id).await?;
        self.refresh_cart().await
    }

    pub async fn checkout(
        &mut self,
        address: &ShippingAddress,
        payment: &PaymentMethod,
    ) -> Result<CheckoutResponse, ClientError> {
        let order = self.api.checkout(address, payment).await?;
        // The server empties the cart on conversion; pick that up.
        if let Err(err) = self.refresh_cart().await {
            tracing::warn!(%err, "cart refresh after checkout failed");
        }
        Ok(order)
    }

    pub async fn orders(&self) -> Result<OrderList, ClientError> {
        Ok(self.api.orders().await?)
    }

    pub async fn order(&self, order_id: &str) -> Result<Order, ClientError> {
        Ok(self.api.order(order_id).await?)
    }

    // -----------------------------------------------------------------
    // State accessors
    // -----------------------------------------------------------------

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn cart(&self) -> Option<&Cart> {
        self.cart.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.supervisor.status()
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.status() == LinkStatus::Connected
            && self.channel.as_ref().is_some_and(ChatChannel::is_open)
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.abort();
        }
    }
}
