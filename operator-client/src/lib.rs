//! Operator Client - live view and control of a remote market-making bot
//!
//! This crate provides:
//! - A reconnecting push-channel client feeding a single state store
//! - A streaming chat session for the trading assistant
//! - An alert engine with fire-once PnL and stop-loss rules
//! - An HTTP command gateway for start/stop/cashout/config

pub mod alerts;
pub mod chat;
pub mod config;
pub mod connection;
pub mod gateway;
pub mod notify;
pub mod store;
pub mod stream;

pub use alerts::{AlertEngine, AlertRule};
pub use chat::{
    ByteStream, ChatCanceller, ChatEvent, ChatSession, ChatTransport, HttpChatTransport,
    TurnOutcome,
};
pub use config::ConsoleConfig;
pub use connection::{
    classify_frame, ConnectionManager, ConnectionManagerConfig, FrameStream, PushConnector,
    PushFrame, WsConnector,
};
pub use gateway::{CommandGateway, ConfigUpdate, HttpCommandGateway};
pub use notify::{LogNotifier, MessageBoard, Notifier};
pub use store::{SnapshotReceiver, StateStore};
pub use stream::EventLineDecoder;
