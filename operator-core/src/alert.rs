//! Alert and operator notice types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kinds of alert rule evaluated against each snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Fill count increased
    NewFill,
    /// Absolute total PnL reached a threshold
    PnlThreshold,
    /// Total PnL fell to a loss bound; stops the bot
    StopLoss,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewFill => write!(f, "new fill"),
            Self::PnlThreshold => write!(f, "PnL threshold"),
            Self::StopLoss => write!(f, "stop loss"),
        }
    }
}

/// An alert that fired on a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertFired {
    NewFill {
        /// New fills since the previous observation
        delta: u64,
        total: u64,
    },
    PnlThreshold {
        threshold: Decimal,
        total_pnl: Decimal,
    },
    StopLoss {
        threshold: Decimal,
        total_pnl: Decimal,
    },
}

impl AlertFired {
    pub fn kind(&self) -> AlertKind {
        match self {
            Self::NewFill { .. } => AlertKind::NewFill,
            Self::PnlThreshold { .. } => AlertKind::PnlThreshold,
            Self::StopLoss { .. } => AlertKind::StopLoss,
        }
    }

    /// Notification title and body
    pub fn describe(&self) -> (String, String) {
        match self {
            Self::NewFill { delta, total } => {
                let noun = if *delta == 1 { "fill" } else { "fills" };
                (
                    "New fill".to_string(),
                    format!("{} new {} ({} total)", delta, noun, total),
                )
            }
            Self::PnlThreshold { threshold, total_pnl } => (
                "PnL threshold reached".to_string(),
                format!(
                    "Total PnL ${:+.2} reached threshold ${:.2}",
                    total_pnl,
                    threshold.abs()
                ),
            ),
            Self::StopLoss { threshold, total_pnl } => (
                "Stop loss triggered".to_string(),
                format!(
                    "Total PnL ${:+.2} hit stop loss ${:.2}; stopping bot",
                    total_pnl, threshold
                ),
            ),
        }
    }
}

/// Whether desktop-style notifications may be delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    #[default]
    Granted,
    Denied,
}

/// Severity of an operator message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Dismissible message shown to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorMessage {
    pub id: u64,
    pub level: MessageLevel,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_describe_new_fill() {
        let (title, body) = AlertFired::NewFill { delta: 1, total: 4 }.describe();
        assert_eq!(title, "New fill");
        assert_eq!(body, "1 new fill (4 total)");

        let (_, body) = AlertFired::NewFill { delta: 3, total: 7 }.describe();
        assert_eq!(body, "3 new fills (7 total)");
    }

    #[test]
    fn test_describe_stop_loss() {
        let alert = AlertFired::StopLoss {
            threshold: dec!(-10),
            total_pnl: dec!(-11),
        };
        assert_eq!(alert.kind(), AlertKind::StopLoss);
        let (_, body) = alert.describe();
        assert_eq!(body, "Total PnL $-11.00 hit stop loss $-10.00; stopping bot");
    }
}
