//! Shopmate is a storefront session/chat client for agentic commerce
//! backends.
//!
//! This crate provides the client-side synchronization layer for a
//! storefront with an assistant chat: guest session negotiation with
//! durable identity, an authenticated HTTP gateway, a realtime websocket
//! channel with streamed-response reconciliation, and supervised
//! reconnection. A thin interactive CLI sits on top.
//!
//! # Quick start
//!
//! ```no_run
//! use shopmate::assistant::Assistant;
//! use shopmate::config::load_config;
//! use shopmate::gateway::Gateway;
//! use shopmate::identity::MemoryIdentityStore;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let identity = Arc::new(MemoryIdentityStore::new());
//! let gateway = Arc::new(Gateway::new(&config.api, identity.clone()));
//! let mut assistant = Assistant::new(config, identity, gateway);
//! assistant.start().await.unwrap();
//! assistant.send_message("find me trail shoes");
//! # }
//! ```

pub mod assistant;
pub mod build_info;
pub mod channel;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod render;
pub mod session;
pub mod supervisor;
#[cfg(test)]
pub mod testsupport;
pub mod transcript;
pub mod types;
