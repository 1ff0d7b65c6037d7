//! Alert rules evaluated against every bot state snapshot
//!
//! Three rules:
//! - NewFill: notifies when `fills_count` grows. The first observation only
//!   sets the baseline; a decrease silently rebaselines.
//! - PnlThreshold: fires once when `|total PnL| >= |T|`, then disarms.
//! - StopLoss: while the bot is running, fires once when total PnL drops to
//!   `T` or below, disarms, and stops the bot through the gateway.
//!
//! Baselines live on the engine instance and are never derived from the
//! snapshot itself.

use std::sync::Arc;

use operator_core::{AlertFired, AlertKind, BotStateSnapshot, MessageLevel, NotificationPermission};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::gateway::CommandGateway;
use crate::notify::{MessageBoard, Notifier};

/// State of one alert rule
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    kind: AlertKind,
    threshold: Option<Decimal>,
    armed: bool,
    last_observed: Option<u64>,
}

impl AlertRule {
    fn disarmed(kind: AlertKind) -> Self {
        Self {
            kind,
            threshold: None,
            armed: false,
            last_observed: None,
        }
    }

    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    pub fn threshold(&self) -> Option<Decimal> {
        self.threshold
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn arm(&mut self, threshold: Decimal) {
        self.threshold = Some(threshold);
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.last_observed = None;
    }
}

/// Evaluates alert rules and performs their side effects
pub struct AlertEngine {
    new_fill: AlertRule,
    pnl_threshold: AlertRule,
    stop_loss: AlertRule,
    gateway: Arc<dyn CommandGateway>,
    notifier: Arc<dyn Notifier>,
    messages: MessageBoard,
}

impl AlertEngine {
    /// New engine with fill alerts enabled and both thresholds disarmed
    pub fn new(gateway: Arc<dyn CommandGateway>, notifier: Arc<dyn Notifier>) -> Self {
        let mut new_fill = AlertRule::disarmed(AlertKind::NewFill);
        new_fill.armed = true;

        Self {
            new_fill,
            pnl_threshold: AlertRule::disarmed(AlertKind::PnlThreshold),
            stop_loss: AlertRule::disarmed(AlertKind::StopLoss),
            gateway,
            notifier,
            messages: MessageBoard::new(),
        }
    }

    pub fn rule(&self, kind: AlertKind) -> &AlertRule {
        match kind {
            AlertKind::NewFill => &self.new_fill,
            AlertKind::PnlThreshold => &self.pnl_threshold,
            AlertKind::StopLoss => &self.stop_loss,
        }
    }

    /// Fire once when absolute total PnL reaches `|threshold|`
    pub fn arm_pnl_threshold(&mut self, threshold: Decimal) {
        info!("[Alerts] PnL threshold armed at ${:.2}", threshold.abs());
        self.pnl_threshold.arm(threshold.abs());
    }

    /// Stop the bot once total PnL falls to `-|threshold|`
    pub fn arm_stop_loss(&mut self, threshold: Decimal) {
        let bound = -threshold.abs();
        info!("[Alerts] Stop loss armed at ${:.2}", bound);
        self.stop_loss.arm(bound);
    }

    pub fn disarm(&mut self, kind: AlertKind) {
        match kind {
            AlertKind::NewFill => self.new_fill.disarm(),
            AlertKind::PnlThreshold => self.pnl_threshold.disarm(),
            AlertKind::StopLoss => self.stop_loss.disarm(),
        }
        info!("[Alerts] {} disarmed", kind);
    }

    /// Enable or disable fill alerts; enabling takes a fresh baseline
    pub fn set_new_fill_enabled(&mut self, enabled: bool) {
        if enabled {
            self.new_fill.armed = true;
            self.new_fill.last_observed = None;
        } else {
            self.new_fill.disarm();
        }
    }

    pub fn messages(&self) -> &MessageBoard {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageBoard {
        &mut self.messages
    }

    /// Apply the rules to a snapshot and return what fired
    ///
    /// Fire-once rules are disarmed before this returns.
    pub fn evaluate(&mut self, snapshot: &BotStateSnapshot) -> Vec<AlertFired> {
        let mut fired = Vec::new();

        if self.new_fill.armed {
            let total = snapshot.fills_count;
            match self.new_fill.last_observed {
                Some(previous) if total > previous => fired.push(AlertFired::NewFill {
                    delta: total - previous,
                    total,
                }),
                Some(previous) if total < previous => {
                    debug!("[Alerts] Fill count reset {} -> {}, rebaselining", previous, total);
                }
                _ => {}
            }
            self.new_fill.last_observed = Some(total);
        }

        let total_pnl = snapshot.total_pnl();

        if let (true, Some(threshold)) = (self.pnl_threshold.armed, self.pnl_threshold.threshold) {
            if total_pnl.abs() >= threshold.abs() {
                self.pnl_threshold.disarm();
                fired.push(AlertFired::PnlThreshold {
                    threshold,
                    total_pnl,
                });
            }
        }

        if let (true, Some(threshold)) = (self.stop_loss.armed, self.stop_loss.threshold) {
            if snapshot.is_running() && total_pnl <= threshold {
                self.stop_loss.disarm();
                fired.push(AlertFired::StopLoss {
                    threshold,
                    total_pnl,
                });
            }
        }

        fired
    }

    /// Evaluate a snapshot, notify, post messages and stop the bot on stop loss
    pub async fn on_snapshot(&mut self, snapshot: &BotStateSnapshot) -> Vec<AlertFired> {
        let fired = self.evaluate(snapshot);

        for alert in &fired {
            let (title, body) = alert.describe();

            match self.notifier.permission() {
                NotificationPermission::Granted => self.notifier.notify(&title, &body),
                NotificationPermission::Denied => {
                    debug!("[Alerts] Notifications denied, skipping '{}'", title)
                }
            }

            match alert {
                AlertFired::NewFill { .. } => {}
                AlertFired::PnlThreshold { .. } => {
                    self.messages
                        .push(MessageLevel::Info, format!("{}: {}", title, body));
                }
                AlertFired::StopLoss { .. } => {
                    self.messages
                        .push(MessageLevel::Warning, format!("{}: {}", title, body));
                    match self.gateway.stop().await {
                        Ok(_) => info!("[Alerts] Bot stopped by stop loss"),
                        Err(e) => {
                            self.messages.push(
                                MessageLevel::Error,
                                format!("Stop loss could not stop the bot: {}", e.operator_text()),
                            );
                        }
                    }
                }
            }
        }

        fired
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("new_fill", &self.new_fill)
            .field("pnl_threshold", &self.pnl_threshold)
            .field("stop_loss", &self.stop_loss)
            .field("messages", &self.messages.active().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ConfigUpdate;
    use async_trait::async_trait;
    use operator_core::{ConsoleError, ConsoleResult, RiskMetrics, RunStatus};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeGateway {
        stops: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CommandGateway for FakeGateway {
        async fn start(&self, _token_ids: &[String]) -> ConsoleResult<Value> {
            Ok(Value::Null)
        }
        async fn stop(&self) -> ConsoleResult<Value> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ConsoleError::api(400, "Bot not running"))
            } else {
                Ok(Value::Null)
            }
        }
        async fn cashout(&self) -> ConsoleResult<Value> {
            Ok(Value::Null)
        }
        async fn add_markets(&self, _token_ids: &[String]) -> ConsoleResult<Value> {
            Ok(Value::Null)
        }
        async fn remove_markets(&self, _token_ids: &[String]) -> ConsoleResult<Value> {
            Ok(Value::Null)
        }
        async fn update_config(&self, _update: &ConfigUpdate) -> ConsoleResult<Value> {
            Ok(Value::Null)
        }
    }

    struct FakeNotifier {
        permission: NotificationPermission,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeNotifier {
        fn new(permission: NotificationPermission) -> Arc<Self> {
            Arc::new(Self {
                permission,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl Notifier for FakeNotifier {
        fn permission(&self) -> NotificationPermission {
            self.permission
        }
        fn notify(&self, title: &str, body: &str) {
            self.sent.lock().push((title.to_string(), body.to_string()));
        }
    }

    fn engine_with(gateway: Arc<FakeGateway>, notifier: Arc<FakeNotifier>) -> AlertEngine {
        AlertEngine::new(gateway, notifier)
    }

    fn engine() -> AlertEngine {
        engine_with(
            Arc::new(FakeGateway::default()),
            FakeNotifier::new(NotificationPermission::Granted),
        )
    }

    fn snapshot(status: RunStatus, fills: u64, realized: Decimal, unrealized: Decimal) -> BotStateSnapshot {
        BotStateSnapshot {
            status,
            fills_count: fills,
            risk_metrics: RiskMetrics {
                realized_pnl: realized,
                unrealized_pnl: unrealized,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn running_with_pnl(total: Decimal) -> BotStateSnapshot {
        snapshot(RunStatus::Running, 0, total, Decimal::ZERO)
    }

    fn with_fills(fills: u64) -> BotStateSnapshot {
        snapshot(RunStatus::Running, fills, Decimal::ZERO, Decimal::ZERO)
    }

    #[test]
    fn test_new_fill_first_observation_is_baseline() {
        let mut engine = engine();
        assert!(engine.evaluate(&with_fills(7)).is_empty());
        assert!(engine.evaluate(&with_fills(7)).is_empty());
        assert_eq!(
            engine.evaluate(&with_fills(9)),
            vec![AlertFired::NewFill { delta: 2, total: 9 }]
        );
    }

    #[test]
    fn test_new_fill_reset_rebaselines_silently() {
        let mut engine = engine();
        engine.evaluate(&with_fills(10));
        assert!(engine.evaluate(&with_fills(0)).is_empty());
        assert_eq!(
            engine.evaluate(&with_fills(1)),
            vec![AlertFired::NewFill { delta: 1, total: 1 }]
        );
    }

    #[test]
    fn test_new_fill_reenable_takes_fresh_baseline() {
        let mut engine = engine();
        engine.evaluate(&with_fills(3));
        engine.set_new_fill_enabled(false);
        assert!(engine.evaluate(&with_fills(5)).is_empty());

        engine.set_new_fill_enabled(true);
        assert!(engine.evaluate(&with_fills(8)).is_empty());
        assert_eq!(engine.evaluate(&with_fills(9)).len(), 1);
    }

    #[test]
    fn test_pnl_threshold_fires_once_on_absolute_value() {
        let mut engine = engine();
        engine.arm_pnl_threshold(dec!(25));

        assert!(engine.evaluate(&running_with_pnl(dec!(-24.99))).is_empty());
        let fired = engine.evaluate(&snapshot(RunStatus::Stopped, 0, dec!(-20), dec!(-6)));
        assert_eq!(
            fired,
            vec![AlertFired::PnlThreshold {
                threshold: dec!(25),
                total_pnl: dec!(-26),
            }]
        );
        assert!(!engine.rule(AlertKind::PnlThreshold).is_armed());
        assert!(engine.evaluate(&running_with_pnl(dec!(40))).is_empty());
    }

    #[tokio::test]
    async fn test_stop_loss_stops_bot_exactly_once() {
        let gateway = Arc::new(FakeGateway::default());
        let mut engine = engine_with(
            Arc::clone(&gateway),
            FakeNotifier::new(NotificationPermission::Granted),
        );
        engine.arm_stop_loss(dec!(-10.00));

        let mut fired_at = Vec::new();
        for total in [dec!(-3), dec!(-8), dec!(-11), dec!(-15)] {
            let fired = engine.on_snapshot(&running_with_pnl(total)).await;
            if fired.iter().any(|a| a.kind() == AlertKind::StopLoss) {
                fired_at.push(total);
            }
        }

        assert_eq!(fired_at, vec![dec!(-11)]);
        assert_eq!(gateway.stops.load(Ordering::SeqCst), 1);
        assert!(!engine.rule(AlertKind::StopLoss).is_armed());
        assert_eq!(engine.messages().active().len(), 1);
        assert_eq!(engine.messages().active()[0].level, MessageLevel::Warning);
    }

    #[test]
    fn test_stop_loss_positive_input_negated() {
        let mut engine = engine();
        engine.arm_stop_loss(dec!(10));
        assert_eq!(engine.rule(AlertKind::StopLoss).threshold(), Some(dec!(-10)));

        assert!(engine.evaluate(&running_with_pnl(dec!(12))).is_empty());
        assert_eq!(engine.evaluate(&running_with_pnl(dec!(-10))).len(), 1);
    }

    #[test]
    fn test_stop_loss_ignored_when_not_running() {
        let mut engine = engine();
        engine.arm_stop_loss(dec!(-10));

        let stopped = snapshot(RunStatus::Stopped, 0, dec!(-50), Decimal::ZERO);
        assert!(engine.evaluate(&stopped).is_empty());
        assert!(engine.rule(AlertKind::StopLoss).is_armed());

        assert_eq!(engine.evaluate(&running_with_pnl(dec!(-50))).len(), 1);
    }

    #[tokio::test]
    async fn test_stop_loss_gateway_failure_posts_error() {
        let gateway = Arc::new(FakeGateway {
            fail: true,
            ..Default::default()
        });
        let mut engine = engine_with(
            Arc::clone(&gateway),
            FakeNotifier::new(NotificationPermission::Granted),
        );
        engine.arm_stop_loss(dec!(5));

        engine.on_snapshot(&running_with_pnl(dec!(-6))).await;
        engine.on_snapshot(&running_with_pnl(dec!(-7))).await;

        assert_eq!(gateway.stops.load(Ordering::SeqCst), 1);
        assert!(!engine.rule(AlertKind::StopLoss).is_armed());
        let active = engine.messages().active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[1].level, MessageLevel::Error);
        assert!(active[1].text.ends_with("Bot not running"));
    }

    #[tokio::test]
    async fn test_denied_permission_skips_notifications_only() {
        let notifier = FakeNotifier::new(NotificationPermission::Denied);
        let mut engine = engine_with(Arc::new(FakeGateway::default()), Arc::clone(&notifier));
        engine.arm_pnl_threshold(dec!(1));

        let fired = engine.on_snapshot(&running_with_pnl(dec!(2))).await;
        assert_eq!(fired.len(), 1);
        assert!(notifier.sent.lock().is_empty());
        assert_eq!(engine.messages().active().len(), 1);
    }

    #[tokio::test]
    async fn test_granted_permission_delivers_notification() {
        let notifier = FakeNotifier::new(NotificationPermission::Granted);
        let mut engine = engine_with(Arc::new(FakeGateway::default()), Arc::clone(&notifier));

        engine.on_snapshot(&with_fills(1)).await;
        engine.on_snapshot(&with_fills(4)).await;

        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "3 new fills (4 total)");
    }
}
