//! ridechat Relay Server Library
//!
//! Real-time chat between the passenger and the driver of one booking:
//! - Signed booking tokens (HMAC-SHA256, compact two-segment format)
//! - Booking-keyed room registry with sender-exclusive broadcast
//! - Message persistence through the external chat store
//! - Delivery/read receipts and typing indicators
//! - WebSocket server with health endpoint and CORS

pub mod auth;
pub mod config;
pub mod gateway;
pub mod ids;
pub mod registry;
pub mod relay;
pub mod server;
