//! Console input parsing
//!
//! Lines starting with `/` are commands; anything else is a chat question.

use operator_client::ConfigUpdate;
use operator_core::{AlertKind, ConsoleError, ConsoleResult};
use rust_decimal::Decimal;

pub const HELP: &str = "\
Commands:
  /start <token_id>...     start the bot on the given markets
  /stop                    stop the bot
  /cashout                 close all positions
  /add <token_id>...       add markets
  /remove <token_id>...    remove markets
  /config key=value...     update bot config
  /arm-pnl <amount>        alert once when |PnL| reaches amount
  /arm-stop <amount>       stop the bot once PnL falls to -amount
  /disarm pnl|stop         disarm a threshold rule
  /fills on|off            toggle new-fill alerts
  /messages                list operator messages
  /dismiss <id>            dismiss a message
  /status                  print bot status
  /cancel                  cancel the chat reply in progress
  /clear                   clear the chat conversation
  /quit                    exit
Any other line is sent to the trading assistant.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(Vec<String>),
    Stop,
    Cashout,
    AddMarkets(Vec<String>),
    RemoveMarkets(Vec<String>),
    Config(ConfigUpdate),
    ArmPnl(Decimal),
    ArmStop(Decimal),
    Disarm(AlertKind),
    Fills(bool),
    Messages,
    Dismiss(u64),
    Status,
    Cancel,
    Clear,
    Help,
    Quit,
    /// Question for the assistant
    Ask(String),
}

/// Parse one input line; `None` for a blank line
pub fn parse_line(line: &str) -> ConsoleResult<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Ask(line.to_string())));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let command = match name {
        "start" => Command::Start(token_ids(name, &args)?),
        "stop" => Command::Stop,
        "cashout" => Command::Cashout,
        "add" => Command::AddMarkets(token_ids(name, &args)?),
        "remove" => Command::RemoveMarkets(token_ids(name, &args)?),
        "config" => Command::Config(config_update(&args)?),
        "arm-pnl" => Command::ArmPnl(amount(name, &args)?),
        "arm-stop" => Command::ArmStop(amount(name, &args)?),
        "disarm" => match single(name, &args)? {
            "pnl" => Command::Disarm(AlertKind::PnlThreshold),
            "stop" => Command::Disarm(AlertKind::StopLoss),
            "fills" => Command::Disarm(AlertKind::NewFill),
            other => return Err(ConsoleError::parse(format!("unknown rule '{}'", other))),
        },
        "fills" => match single(name, &args)? {
            "on" => Command::Fills(true),
            "off" => Command::Fills(false),
            other => return Err(ConsoleError::parse(format!("expected on|off, got '{}'", other))),
        },
        "messages" => Command::Messages,
        "dismiss" => {
            let id = single(name, &args)?
                .parse::<u64>()
                .map_err(|_| ConsoleError::parse("/dismiss takes a message number"))?;
            Command::Dismiss(id)
        }
        "status" => Command::Status,
        "cancel" => Command::Cancel,
        "clear" => Command::Clear,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ConsoleError::parse(format!("unknown command '/{}'", other))),
    };

    Ok(Some(command))
}

fn token_ids(name: &str, args: &[&str]) -> ConsoleResult<Vec<String>> {
    if args.is_empty() {
        return Err(ConsoleError::parse(format!("/{} needs at least one token ID", name)));
    }
    Ok(args.iter().map(|s| s.to_string()).collect())
}

fn single<'a>(name: &str, args: &[&'a str]) -> ConsoleResult<&'a str> {
    match args {
        [only] => Ok(*only),
        _ => Err(ConsoleError::parse(format!("/{} takes exactly one argument", name))),
    }
}

fn amount(name: &str, args: &[&str]) -> ConsoleResult<Decimal> {
    let raw = single(name, args)?;
    let value = raw
        .trim_start_matches('$')
        .parse::<Decimal>()
        .map_err(|e| ConsoleError::parse(format!("/{}: {}", name, e)))?;
    if value.is_zero() {
        return Err(ConsoleError::parse(format!("/{} amount must be non-zero", name)));
    }
    Ok(value)
}

fn config_update(args: &[&str]) -> ConsoleResult<ConfigUpdate> {
    if args.is_empty() {
        return Err(ConsoleError::parse("/config needs key=value pairs"));
    }

    let mut update = ConfigUpdate::default();
    for pair in args {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConsoleError::parse(format!("expected key=value, got '{}'", pair)))?;
        update.set(key, value)?;
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(line: &str) -> Command {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_and_chat_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert_eq!(
            parse("  What is my exposure? "),
            Command::Ask("What is my exposure?".to_string())
        );
    }

    #[test]
    fn test_market_commands() {
        assert_eq!(
            parse("/start 111 222"),
            Command::Start(vec!["111".to_string(), "222".to_string()])
        );
        assert_eq!(parse("/remove 111"), Command::RemoveMarkets(vec!["111".to_string()]));
        assert!(parse_line("/start").is_err());
        assert!(parse_line("/add").is_err());
    }

    #[test]
    fn test_alert_commands() {
        assert_eq!(parse("/arm-pnl 50"), Command::ArmPnl(dec!(50)));
        assert_eq!(parse("/arm-stop $10.50"), Command::ArmStop(dec!(10.50)));
        assert_eq!(parse("/disarm stop"), Command::Disarm(AlertKind::StopLoss));
        assert_eq!(parse("/fills off"), Command::Fills(false));
        assert!(parse_line("/arm-stop 0").is_err());
        assert!(parse_line("/arm-pnl lots").is_err());
        assert!(parse_line("/disarm everything").is_err());
    }

    #[test]
    fn test_config_command() {
        match parse("/config base_spread=0.03 paper_trading=true") {
            Command::Config(update) => {
                assert_eq!(update.base_spread, Some(dec!(0.03)));
                assert_eq!(update.paper_trading, Some(true));
                assert!(update.order_size.is_none());
            }
            other => panic!("expected config, got {:?}", other),
        }
        assert!(parse_line("/config").is_err());
        assert!(parse_line("/config base_spread").is_err());
        assert!(parse_line("/config leverage=5").is_err());
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(parse("/dismiss 3"), Command::Dismiss(3));
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/cancel"), Command::Cancel);
        assert!(parse_line("/dismiss three").is_err());
        assert!(parse_line("/frobnicate").is_err());
    }
}
