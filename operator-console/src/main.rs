//! Operator Console
//!
//! Terminal front end for a remote market-making bot: live state over the
//! push channel, alert rules, bot commands and the trading assistant chat.

mod commands;

use std::io::Write;
use std::sync::Arc;

use operator_client::{
    AlertEngine, ChatEvent, ChatSession, CommandGateway, ConnectionManager,
    ConnectionManagerConfig, ConsoleConfig, HttpChatTransport, HttpCommandGateway, LogNotifier,
    StateStore, TurnOutcome, WsConnector,
};
use operator_core::{ConnectionState, ConsoleResult, MessageLevel};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Command, HELP};

/// Everything a command can act on
struct Console {
    manager: ConnectionManager,
    store: Arc<StateStore>,
    gateway: Arc<dyn CommandGateway>,
    alerts: AlertEngine,
    chat: Arc<ChatSession>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Logs go to stderr; stdout belongs to the console
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,operator_console=debug")),
        )
        .init();

    let config = ConsoleConfig::from_env()?;
    info!("Starting Operator Console against {}", config.api_url);

    let store = Arc::new(StateStore::new());
    let mut snapshots = store.subscribe();

    let manager = ConnectionManager::new(
        ConnectionManagerConfig {
            url: config.ws_url.clone(),
            reconnect_delay: config.reconnect_delay,
        },
        Arc::new(WsConnector),
        Arc::clone(&store),
    );
    let mut connection_state = manager.subscribe_state();

    let gateway: Arc<dyn CommandGateway> = Arc::new(HttpCommandGateway::with_timeout(
        &config.api_url,
        config.request_timeout,
    ));
    let alerts = AlertEngine::new(
        Arc::clone(&gateway),
        Arc::new(LogNotifier::new(config.notifications)),
    );

    let chat = Arc::new(ChatSession::new(Arc::new(
        HttpChatTransport::with_connect_timeout(&config.api_url, config.connect_timeout),
    )));
    let mut chat_events = chat.subscribe();

    let mut console = Console {
        manager,
        store,
        gateway,
        alerts,
        chat,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut status_ticker = interval_at(
        Instant::now() + config.status_interval,
        config.status_interval,
    );
    status_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    console.manager.start();
    println!("{}", HELP);

    loop {
        tokio::select! {
            Some(snapshot) = snapshots.recv() => {
                let fired = console.alerts.on_snapshot(&snapshot).await;
                for alert in fired {
                    let (title, body) = alert.describe();
                    println!("! {}: {}", title, body);
                }
            }

            Ok(()) = connection_state.changed() => {
                let state = *connection_state.borrow_and_update();
                println!("[{}]", state);
            }

            event = chat_events.recv() => match event {
                Ok(event) => render_chat_event(event),
                Err(RecvError::Lagged(n)) => warn!("[Chat] Renderer lagged, {} event(s) skipped", n),
                Err(RecvError::Closed) => {}
            },

            line = lines.next_line() => match line {
                Ok(Some(line)) => match commands::parse_line(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => console.run(command).await,
                    Ok(None) => {}
                    Err(e) => println!("{}", e.operator_text()),
                },
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },

            _ = status_ticker.tick() => console.print_status(),

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                break;
            }
        }
    }

    console.chat.canceller().cancel();
    console.manager.stop().await;
    info!("Operator Console stopped");
    Ok(())
}

impl Console {
    async fn run(&mut self, command: Command) {
        match command {
            Command::Start(ids) => {
                let result = self.gateway.start(&ids).await;
                self.report("start", result);
            }
            Command::Stop => {
                let result = self.gateway.stop().await;
                self.report("stop", result);
            }
            Command::Cashout => {
                let result = self.gateway.cashout().await;
                self.report("cashout", result);
            }
            Command::AddMarkets(ids) => {
                let result = self.gateway.add_markets(&ids).await;
                self.report("add markets", result);
            }
            Command::RemoveMarkets(ids) => {
                let result = self.gateway.remove_markets(&ids).await;
                self.report("remove markets", result);
            }
            Command::Config(update) => {
                let result = self.gateway.update_config(&update).await;
                self.report("config update", result);
            }
            Command::ArmPnl(threshold) => self.alerts.arm_pnl_threshold(threshold),
            Command::ArmStop(threshold) => self.alerts.arm_stop_loss(threshold),
            Command::Disarm(kind) => self.alerts.disarm(kind),
            Command::Fills(enabled) => self.alerts.set_new_fill_enabled(enabled),
            Command::Messages => self.print_messages(),
            Command::Dismiss(id) => {
                if !self.alerts.messages_mut().dismiss(id) {
                    println!("No message #{}", id);
                }
            }
            Command::Status => self.print_status(),
            Command::Cancel => {
                if !self.chat.canceller().cancel() {
                    println!("No reply in progress");
                }
            }
            Command::Clear => {
                self.chat.clear().await;
                println!("Conversation cleared");
            }
            Command::Help => println!("{}", HELP),
            Command::Ask(question) => self.ask(question),
            // Handled by the input loop
            Command::Quit => {}
        }
    }

    /// Run a chat turn in its own task so snapshots keep flowing
    fn ask(&self, question: String) {
        if self.chat.is_in_flight() {
            warn!("[Chat] Still answering, question dropped");
            println!("(assistant is still answering; question dropped)");
            return;
        }

        let chat = Arc::clone(&self.chat);
        tokio::spawn(async move {
            if chat.send(&question).await == TurnOutcome::Rejected {
                println!("(assistant is still answering; question dropped)");
            }
        });
    }

    fn report(&mut self, action: &str, result: ConsoleResult<Value>) {
        match result {
            Ok(response) => {
                debug!("{} response: {}", action, response);
                println!("{} ok", action);
            }
            Err(e) => {
                let id = self.alerts.messages_mut().push(
                    MessageLevel::Error,
                    format!("{} failed: {}", action, e.operator_text()),
                );
                println!("#{} {} failed: {}", id, action, e.operator_text());
            }
        }
    }

    fn print_status(&self) {
        let state = self.manager.state();
        match self.store.current() {
            Some(snapshot) => println!("[{}] {}", state, snapshot.summary()),
            None if state == ConnectionState::Connected => println!("[{}] waiting for state", state),
            None => println!("[{}] no state yet", state),
        }

        let pending = self.alerts.messages().active().len();
        if pending > 0 {
            println!("{} message(s), /messages to review", pending);
        }
    }

    fn print_messages(&self) {
        let messages = self.alerts.messages().active();
        if messages.is_empty() {
            println!("No messages");
            return;
        }
        for message in messages {
            println!(
                "#{} [{:?}] {} {}",
                message.id,
                message.level,
                message.created_at.format("%H:%M:%S"),
                message.text
            );
        }
    }
}

fn render_chat_event(event: ChatEvent) {
    let mut stdout = std::io::stdout();
    match event {
        ChatEvent::TurnStarted { .. } => print!("assistant> "),
        ChatEvent::Delta { content, .. } => print!("{}", content),
        ChatEvent::Failed { content, .. } => print!("\n{}", content),
        ChatEvent::Cancelled { .. } => print!(" (cancelled)"),
        ChatEvent::TurnEnded { .. } => println!(),
        ChatEvent::ConversationBound { conversation_id } => {
            debug!("[Chat] Conversation {}", conversation_id)
        }
        ChatEvent::Completed { .. } => {}
    }
    let _ = stdout.flush();
}
