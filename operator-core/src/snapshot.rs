//! Bot state snapshot pushed over the live channel
//!
//! The remote bot broadcasts its complete state on every tick. A snapshot
//! always replaces the previous one; nothing here is ever merged.
//!
//! A stopped bot only sends `status` and `timestamp`, so every other field
//! defaults to empty.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Run state reported by the bot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    #[default]
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Complete state of the remote bot at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotStateSnapshot {
    pub status: RunStatus,

    /// Server timestamp, passed through as sent
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub paper_trading: bool,

    #[serde(default)]
    pub use_websocket: bool,

    /// Token IDs the bot is quoting
    #[serde(default)]
    pub target_markets: Vec<String>,

    #[serde(default)]
    pub positions: Vec<PositionSnapshot>,

    /// Orderbook summaries keyed by token ID
    #[serde(default)]
    pub orderbooks: HashMap<String, OrderbookSummary>,

    #[serde(default)]
    pub live_orders: Vec<LiveOrder>,

    #[serde(default)]
    pub risk_metrics: RiskMetrics,

    #[serde(default)]
    pub pnl_history: Vec<PnlPoint>,

    /// Total fills this session
    #[serde(default)]
    pub fills_count: u64,

    /// Most recent first
    #[serde(default)]
    pub recent_trades: Vec<TradeRecord>,

    /// Only present in paper trading mode
    #[serde(default)]
    pub simulation_stats: Option<SimulationStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub token_id: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub avg_entry_price: Decimal,
    #[serde(default)]
    pub realized_pnl: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Decimal,
}

impl PositionSnapshot {
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSummary {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub mid_price: Option<Decimal>,
    #[serde(default)]
    pub spread: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveOrder {
    pub order_id: String,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    #[serde(default)]
    pub total_exposure: Decimal,
    #[serde(default)]
    pub max_position_size: i64,
    #[serde(default)]
    pub current_max_position: i64,
    #[serde(default)]
    pub inventory_imbalance: Decimal,
    #[serde(default)]
    pub realized_pnl: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub is_halted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlPoint {
    pub timestamp: String,
    #[serde(default)]
    pub realized: Decimal,
    #[serde(default)]
    pub unrealized: Decimal,
    #[serde(default)]
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    #[serde(default)]
    pub orders_placed: u64,
    #[serde(default)]
    pub orders_filled: u64,
    #[serde(default)]
    pub orders_partial: u64,
    #[serde(default)]
    pub adverse_fill_rate: Decimal,
    #[serde(default)]
    pub maker_volume: Decimal,
    #[serde(default)]
    pub taker_volume: Decimal,
    #[serde(default)]
    pub balance: Decimal,
}

impl BotStateSnapshot {
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Realized plus unrealized PnL across all positions
    pub fn total_pnl(&self) -> Decimal {
        self.risk_metrics.realized_pnl + self.risk_metrics.unrealized_pnl
    }

    /// One-line status text for the console
    pub fn summary(&self) -> String {
        let status = match self.status {
            RunStatus::Running => "RUNNING",
            RunStatus::Stopped => "STOPPED",
            RunStatus::Unknown => "UNKNOWN",
        };
        let mode = if self.paper_trading { "paper" } else { "live" };
        let halted = if self.risk_metrics.is_halted { " [HALTED]" } else { "" };

        format!(
            "{}{} ({}) | PnL ${:+.2} | exposure ${:.2} | {} markets | {} fills | {} live orders",
            status,
            halted,
            mode,
            self.total_pnl(),
            self.risk_metrics.total_exposure,
            self.target_markets.len(),
            self.fills_count,
            self.live_orders.len(),
        )
    }
}
