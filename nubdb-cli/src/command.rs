//! # Line Protocol
//!
//! One command per line, whitespace-tokenized, case-insensitive verbs.
//!
//! | Command | Success | Failure |
//! |---|---|---|
//! | `SET key value [ttl]` | `OK` | `ERROR: <reason>` |
//! | `GET key` | `"value"` or `(nil)` | `ERROR: <reason>` |
//! | `DELETE key` / `DEL key` | `OK` or `(not found)` | `ERROR: <reason>` |
//! | `EXISTS key` | `1` or `0` | `ERROR: <reason>` |
//! | `INCR key` / `DECR key` | `<integer>` | `ERROR: <reason>` |
//! | `SIZE` | `<count> keys` | |
//! | `CLEAR` | `OK` | |
//! | `QUIT` / `EXIT` | `Goodbye` | |
//!
//! A SET value is a single token; clients conventionally wrap it in double
//! quotes, which are stripped here and re-added by GET. Values containing
//! whitespace cannot round-trip over this protocol; the on-disk format is
//! byte-exact and unaffected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use nubdb_storage::Store;

/// Expired entries are scrubbed after this many dispatched commands.
const CLEANUP_EVERY: u64 = 100;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String, ttl_secs: u64 },
    Get { key: String },
    Delete { key: String },
    Exists { key: String },
    Incr { key: String },
    Decr { key: String },
    Size,
    Clear,
    Quit,
}

/// What goes back over the wire, one line per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Value(Bytes),
    Nil,
    NotFound,
    Int(i64),
    Size(usize),
    Goodbye,
    Error(String),
}

impl Response {
    pub fn render(&self) -> String {
        match self {
            Response::Ok => "OK".to_string(),
            Response::Value(value) => format!("\"{}\"", String::from_utf8_lossy(value)),
            Response::Nil => "(nil)".to_string(),
            Response::NotFound => "(not found)".to_string(),
            Response::Int(n) => n.to_string(),
            Response::Size(n) => format!("{} keys", n),
            Response::Goodbye => "Goodbye".to_string(),
            Response::Error(reason) => format!("ERROR: {}", reason),
        }
    }

    pub fn is_goodbye(&self) -> bool {
        matches!(self, Response::Goodbye)
    }
}

/// Parse one line. `Err` carries the reason for an `ERROR:` response.
pub fn parse(line: &str) -> Result<Command, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let verb = match tokens.first() {
        Some(verb) => verb.to_ascii_uppercase(),
        None => return Err("empty command".to_string()),
    };

    match verb.as_str() {
        "SET" => {
            if tokens.len() < 3 || tokens.len() > 4 {
                return Err("usage: SET key value [ttl_seconds]".to_string());
            }
            let ttl_secs = match tokens.get(3) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map_err(|_| format!("invalid TTL: {}", raw))?,
                None => 0,
            };
            Ok(Command::Set {
                key: tokens[1].to_string(),
                value: strip_quotes(tokens[2]).to_string(),
                ttl_secs,
            })
        }
        "GET" => Ok(Command::Get { key: single_key(&tokens, "GET")? }),
        "DELETE" | "DEL" => Ok(Command::Delete { key: single_key(&tokens, "DELETE")? }),
        "EXISTS" => Ok(Command::Exists { key: single_key(&tokens, "EXISTS")? }),
        "INCR" => Ok(Command::Incr { key: single_key(&tokens, "INCR")? }),
        "DECR" => Ok(Command::Decr { key: single_key(&tokens, "DECR")? }),
        "SIZE" => no_args(&tokens, Command::Size),
        "CLEAR" => no_args(&tokens, Command::Clear),
        "QUIT" | "EXIT" => no_args(&tokens, Command::Quit),
        _ => Err("Unknown command".to_string()),
    }
}

fn single_key(tokens: &[&str], verb: &str) -> Result<String, String> {
    if tokens.len() != 2 {
        return Err(format!("usage: {} key", verb));
    }
    Ok(tokens[1].to_string())
}

fn no_args(tokens: &[&str], command: Command) -> Result<Command, String> {
    if tokens.len() != 1 {
        return Err("command takes no arguments".to_string());
    }
    Ok(command)
}

/// Strip one pair of surrounding double quotes, if present.
fn strip_quotes(token: &str) -> &str {
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        &token[1..token.len() - 1]
    } else {
        token
    }
}

/// Executes commands against a store. Shared by the stdin shell and every
/// server connection so the periodic expiry scrub counts all traffic.
pub struct Dispatcher {
    store: Arc<Store>,
    commands_seen: AtomicU64,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            commands_seen: AtomicU64::new(0),
        }
    }

    pub fn dispatch(&self, line: &str) -> Response {
        match parse(line) {
            Ok(command) => self.execute(command),
            Err(reason) => Response::Error(reason),
        }
    }

    pub fn execute(&self, command: Command) -> Response {
        let seen = self.commands_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % CLEANUP_EVERY == 0 {
            let removed = self.store.cleanup_expired();
            if removed > 0 {
                debug!(removed, "scrubbed expired entries");
            }
        }

        match command {
            Command::Set { key, value, ttl_secs } => {
                match self.store.set(key.as_bytes(), value.as_bytes(), ttl_secs) {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::Error(e.to_string()),
                }
            }
            Command::Get { key } => match self.store.get(key.as_bytes()) {
                Some(value) => Response::Value(value),
                None => Response::Nil,
            },
            Command::Delete { key } => match self.store.delete(key.as_bytes()) {
                Ok(true) => Response::Ok,
                Ok(false) => Response::NotFound,
                Err(e) => Response::Error(e.to_string()),
            },
            Command::Exists { key } => {
                Response::Int(if self.store.exists(key.as_bytes()) { 1 } else { 0 })
            }
            Command::Incr { key } => match self.store.increment(key.as_bytes(), 1) {
                Ok(n) => Response::Int(n),
                Err(e) => Response::Error(e.to_string()),
            },
            Command::Decr { key } => match self.store.increment(key.as_bytes(), -1) {
                Ok(n) => Response::Int(n),
                Err(e) => Response::Error(e.to_string()),
            },
            Command::Size => Response::Size(self.store.len()),
            Command::Clear => {
                self.store.clear();
                Response::Ok
            }
            Command::Quit => Response::Goodbye,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubdb_storage::Store;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Store::in_memory()))
    }

    // -------------------------------------------------------------------------
    // Parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_set_with_quotes_and_ttl() {
        assert_eq!(
            parse("SET name \"Alice\""),
            Ok(Command::Set {
                key: "name".to_string(),
                value: "Alice".to_string(),
                ttl_secs: 0
            })
        );
        assert_eq!(
            parse("set s x 30"),
            Ok(Command::Set {
                key: "s".to_string(),
                value: "x".to_string(),
                ttl_secs: 30
            })
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(parse("get k"), Ok(Command::Get { key: "k".to_string() }));
        assert_eq!(parse("Del k"), Ok(Command::Delete { key: "k".to_string() }));
        assert_eq!(parse("exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_ttl() {
        assert!(parse("SET k v soon").is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert!(parse("SET k").is_err());
        assert!(parse("GET").is_err());
        assert!(parse("GET a b").is_err());
        assert!(parse("SIZE now").is_err());
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(parse("FLUSHALL"), Err("Unknown command".to_string()));
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    #[test]
    fn test_basic_round_trip() {
        let d = dispatcher();
        assert_eq!(d.dispatch("SET name \"Alice\"").render(), "OK");
        assert_eq!(d.dispatch("GET name").render(), "\"Alice\"");
        assert_eq!(d.dispatch("SIZE").render(), "1 keys");
        assert_eq!(d.dispatch("DELETE name").render(), "OK");
        assert_eq!(d.dispatch("GET name").render(), "(nil)");
        assert_eq!(d.dispatch("DELETE name").render(), "(not found)");
    }

    #[test]
    fn test_counter_session() {
        let d = dispatcher();
        assert_eq!(d.dispatch("SET c 100").render(), "OK");
        assert_eq!(d.dispatch("INCR c").render(), "101");
        assert_eq!(d.dispatch("INCR c").render(), "102");
        assert_eq!(d.dispatch("DECR c").render(), "101");
        assert_eq!(d.dispatch("GET c").render(), "\"101\"");
    }

    #[test]
    fn test_exists_and_clear() {
        let d = dispatcher();
        assert_eq!(d.dispatch("EXISTS k").render(), "0");
        d.dispatch("SET k v");
        assert_eq!(d.dispatch("EXISTS k").render(), "1");
        assert_eq!(d.dispatch("CLEAR").render(), "OK");
        assert_eq!(d.dispatch("SIZE").render(), "0 keys");
    }

    #[test]
    fn test_quit_says_goodbye() {
        let d = dispatcher();
        let response = d.dispatch("QUIT");
        assert!(response.is_goodbye());
        assert_eq!(response.render(), "Goodbye");
    }

    #[test]
    fn test_error_rendering() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch("NONSENSE").render(),
            "ERROR: Unknown command"
        );
        assert!(d.dispatch("SET k v -5").render().starts_with("ERROR:"));
    }

    #[test]
    fn test_periodic_cleanup_runs() {
        let d = dispatcher();
        d.dispatch("SET ghost x 1");
        std::thread::sleep(std::time::Duration::from_millis(1_500));

        // Drive enough commands to cross the cleanup interval.
        for _ in 0..CLEANUP_EVERY {
            d.dispatch("EXISTS other");
        }
        assert_eq!(d.dispatch("SIZE").render(), "0 keys");
    }
}
