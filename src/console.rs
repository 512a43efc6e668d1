// ===============================
// src/console.rs
// ===============================
//
// Line console for the trader, the headless stand-in for the original order
// forms. One command per line on stdin:
//
//   buy  <instrument> <amount> [price]     place order (limit iff price given)
//   sell <instrument> <amount> [price]
//   modify <order_id> <amount> [price]
//   cancel <order_id>
//   book <instrument>                      print the padded book view
//   orders                                 print open orders
//   positions [currency] [kind]            print positions ("any" works)
//   help

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};

use crate::domain::{Direction, InstrumentKind, OrderType};
use crate::wire::{CancelOrder, ModifyOrder, PlaceOrder};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCmd {
    Place(PlaceOrder),
    Modify(ModifyOrder),
    Cancel(CancelOrder),
    ShowBook { instrument: String },
    ShowOrders,
    ShowPositions { currency: Option<String>, kind: Option<InstrumentKind> },
    Help,
}

pub const HELP: &str = "commands: buy|sell <instrument> <amount> [price] | \
modify <order_id> <amount> [price] | cancel <order_id> | \
book <instrument> | orders | positions [currency] [kind] | help";

pub fn parse_line(line: &str) -> Result<ConsoleCmd, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or("empty line")?.to_ascii_lowercase();
    let rest: Vec<&str> = parts.collect();

    match verb.as_str() {
        "buy" | "sell" => {
            let direction = if verb == "buy" { Direction::Buy } else { Direction::Sell };
            let (instrument, amount) = match rest.as_slice() {
                [i, a] | [i, a, _] => (i.to_string(), parse_num(a, "amount")?),
                _ => return Err(format!("usage: {verb} <instrument> <amount> [price]")),
            };
            let price = match rest.get(2) {
                Some(p) => Some(parse_num(p, "price")?),
                None => None,
            };
            Ok(ConsoleCmd::Place(PlaceOrder {
                instrument_name: instrument.to_ascii_uppercase(),
                amount,
                order_type: if price.is_some() { OrderType::Limit } else { OrderType::Market },
                direction,
                price,
            }))
        }
        "modify" => {
            let (order_id, amount) = match rest.as_slice() {
                [id, a] | [id, a, _] => (id.to_string(), parse_num(a, "amount")?),
                _ => return Err("usage: modify <order_id> <amount> [price]".to_string()),
            };
            let price = match rest.get(2) {
                Some(p) => Some(parse_num(p, "price")?),
                None => None,
            };
            Ok(ConsoleCmd::Modify(ModifyOrder { order_id, amount, price }))
        }
        "cancel" => match rest.as_slice() {
            [id] => Ok(ConsoleCmd::Cancel(CancelOrder { order_id: id.to_string() })),
            _ => Err("usage: cancel <order_id>".to_string()),
        },
        "book" => match rest.as_slice() {
            [i] => Ok(ConsoleCmd::ShowBook { instrument: i.to_ascii_uppercase() }),
            _ => Err("usage: book <instrument>".to_string()),
        },
        "orders" => Ok(ConsoleCmd::ShowOrders),
        "positions" => {
            if rest.len() > 2 {
                return Err("usage: positions [currency] [kind]".to_string());
            }
            let currency = rest.first().map(|c| {
                let c = c.trim();
                if c.eq_ignore_ascii_case("any") {
                    "any".to_string()
                } else {
                    c.to_ascii_uppercase()
                }
            });
            let kind = match rest.get(1) {
                Some(k) => Some(InstrumentKind::parse_one(k).ok_or_else(|| format!("unknown kind: {k}"))?),
                None => None,
            };
            Ok(ConsoleCmd::ShowPositions { currency, kind })
        }
        "help" | "?" => Ok(ConsoleCmd::Help),
        other => Err(format!("unknown command: {other} (try `help`)")),
    }
}

fn parse_num(s: &str, what: &str) -> Result<f64, String> {
    s.parse::<f64>().map_err(|_| format!("bad {what}: {s}"))
}

/// Read stdin line by line and forward parsed commands. Parse errors are
/// reported here and the loop keeps going.
pub async fn run(tx: mpsc::Sender<ConsoleCmd>) {
    info!("console ready, type `help` for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(cmd) => {
                        if tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(%e, "console: {}", HELP),
                }
            }
            Ok(None) => break, // stdin closed
            Err(e) => {
                warn!(?e, "console read error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_without_price_is_market() {
        match parse_line("buy btc-perpetual 10").unwrap() {
            ConsoleCmd::Place(p) => {
                assert_eq!(p.instrument_name, "BTC-PERPETUAL");
                assert_eq!(p.amount, 10.0);
                assert_eq!(p.order_type, OrderType::Market);
                assert_eq!(p.direction, Direction::Buy);
                assert!(p.price.is_none());
            }
            other => panic!("wrong command: {other:?}"),
        }
    }

    #[test]
    fn sell_with_price_is_limit() {
        match parse_line("sell BTC-PERPETUAL 10 64250.5").unwrap() {
            ConsoleCmd::Place(p) => {
                assert_eq!(p.order_type, OrderType::Limit);
                assert_eq!(p.direction, Direction::Sell);
                assert_eq!(p.price, Some(64250.5));
            }
            other => panic!("wrong command: {other:?}"),
        }
    }

    #[test]
    fn modify_and_cancel() {
        assert_eq!(
            parse_line("modify 42 20").unwrap(),
            ConsoleCmd::Modify(ModifyOrder { order_id: "42".into(), amount: 20.0, price: None })
        );
        assert_eq!(
            parse_line("cancel 42").unwrap(),
            ConsoleCmd::Cancel(CancelOrder { order_id: "42".into() })
        );
    }

    #[test]
    fn positions_accepts_any_and_kind() {
        assert_eq!(
            parse_line("positions any option").unwrap(),
            ConsoleCmd::ShowPositions {
                currency: Some("any".into()),
                kind: Some(InstrumentKind::Option),
            }
        );
        assert_eq!(
            parse_line("positions").unwrap(),
            ConsoleCmd::ShowPositions { currency: None, kind: None }
        );
    }

    #[test]
    fn bad_input_is_an_error_not_a_panic() {
        assert!(parse_line("buy").is_err());
        assert!(parse_line("buy BTC-PERPETUAL notanumber").is_err());
        assert!(parse_line("positions any perpetual").is_err());
        assert!(parse_line("frobnicate").is_err());
    }
}
