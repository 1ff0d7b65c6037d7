//! Core types for the Operator Console
//!
//! This crate defines the shared data structures used across the console:
//! the bot state snapshot pushed by the remote bot, chat messages for the
//! trading assistant, alert/notice types, and the console error type.

pub mod alert;
pub mod chat;
pub mod connection;
pub mod error;
pub mod snapshot;

pub use alert::{AlertFired, AlertKind, MessageLevel, NotificationPermission, OperatorMessage};
pub use chat::{ChatMessage, ChatPayload, ChatRequest, ChatRole, Conversation};
pub use connection::ConnectionState;
pub use error::{ConsoleError, ConsoleResult};
pub use snapshot::{
    BookLevel, BotStateSnapshot, LiveOrder, OrderbookSummary, PnlPoint, PositionSnapshot,
    RiskMetrics, RunStatus, SimulationStats, TradeRecord,
};
