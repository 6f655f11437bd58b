//! Command Handler Module
//!
//! This module implements the text commands understood by the kvstore shell.
//! It splits an input line into arguments and dispatches them to the matching
//! store operation.
//!
//! ## Supported Commands
//!
//! ### Basic Commands
//! - `PUT key value` - Store a value
//! - `FETCH key` - Read a value
//! - `GET key default` - Read a value, or `default` when absent
//! - `DEL key` - Delete a key
//!
//! ### Derived Commands
//! - `POP key` - Delete a key and return its value
//! - `PUTNEW key value` - Store only if absent
//! - `REPLACE key value` - Store only if present
//! - `GETSET key value` - Store and return the previous value
//! - `TAKE key [key ...]` - Read several keys
//! - `SPLIT key [key ...]` - Read and delete several keys
//! - `DROP key [key ...]` - Delete several keys
//! - `INCR key [amount]` - Increment an integer
//! - `DECR key [amount]` - Decrement an integer
//! - `BUMP key amount` - Add to an integer, failing on non-integers
//!
//! ### Expiry Commands
//! - `PUTEX key value milliseconds` - Store with a TTL
//! - `EXPIRE key milliseconds` - Set a TTL on an existing key
//! - `PERSIST key` - Remove the TTL
//!
//! ### Enumeration Commands
//! - `KEYS`, `VALUES`, `LIST`
//!
//! ### Session Commands
//! - `PING [message]`, `QUIT`
//!
//! ## Values
//!
//! Arguments are read as terms: `nil`, `true`, `false` and integers keep
//! their type, `"double quoted"` text is always a string (and may contain
//! spaces), anything else is a string.

use crate::error::StoreError;
use crate::storage::{GetAndUpdate, Store};
use crate::term::Term;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Result of one command, rendered for the terminal by `Display`.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Pong(Option<String>),
    Nil,
    Value(Term),
    Integer(i64),
    Bool(bool),
    List(Vec<Term>),
    Map(BTreeMap<Term, Term>),
    Entries(Vec<(Term, Term)>),
    Error(String),
    /// The session should end
    Quit,
}

impl Response {
    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error(msg.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl From<StoreError> for Response {
    fn from(e: StoreError) -> Self {
        Response::Error(format!("ERR {}", e))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Pong(None) => write!(f, "PONG"),
            Response::Pong(Some(msg)) => write!(f, "{}", msg),
            Response::Nil => write!(f, "(nil)"),
            Response::Value(term) => write!(f, "{}", term),
            Response::Integer(n) => write!(f, "(integer) {}", n),
            Response::Bool(b) => write!(f, "(integer) {}", u8::from(*b)),
            Response::List(items) if items.is_empty() => write!(f, "(empty)"),
            Response::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
            Response::Map(map) if map.is_empty() => write!(f, "(empty)"),
            Response::Map(map) => write_pairs(f, map.iter()),
            Response::Entries(entries) if entries.is_empty() => write!(f, "(empty)"),
            Response::Entries(entries) => write_pairs(f, entries.iter().map(|(k, v)| (k, v))),
            Response::Error(msg) => write!(f, "(error) {}", msg),
            Response::Quit => write!(f, "bye"),
        }
    }
}

fn write_pairs<'a>(
    f: &mut fmt::Formatter<'_>,
    pairs: impl Iterator<Item = (&'a Term, &'a Term)>,
) -> fmt::Result {
    for (i, (key, value)) in pairs.enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        write!(f, "{}) {} => {}", i + 1, key, value)?;
    }
    Ok(())
}

/// Runs text commands against one store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Store,
}

impl CommandHandler {
    /// Creates a new command handler for the given store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The store commands run against.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Executes one input line and returns the response.
    pub async fn execute(&self, line: &str) -> Response {
        let args = match tokenize(line) {
            Ok(args) => args,
            Err(msg) => return Response::error(msg),
        };

        let Some((cmd, rest)) = args.split_first() else {
            return Response::error("ERR empty command");
        };

        self.dispatch(&cmd.to_uppercase(), rest).await
    }

    /// Dispatches a command to its handler.
    async fn dispatch(&self, cmd: &str, args: &[String]) -> Response {
        match cmd {
            // Basic commands
            "PUT" | "SET" => self.cmd_put(args).await,
            "FETCH" => self.cmd_fetch(args).await,
            "GET" => self.cmd_get(args).await,
            "DEL" => self.cmd_del(args).await,

            // Derived commands
            "POP" => self.cmd_pop(args).await,
            "PUTNEW" => self.cmd_putnew(args).await,
            "REPLACE" => self.cmd_replace(args).await,
            "GETSET" => self.cmd_getset(args).await,
            "TAKE" => self.cmd_take(args).await,
            "SPLIT" => self.cmd_split(args).await,
            "DROP" => self.cmd_drop(args).await,
            "INCR" => self.cmd_incr(args, 1).await,
            "DECR" => self.cmd_incr(args, -1).await,
            "BUMP" => self.cmd_bump(args).await,

            // Expiry commands
            "PUTEX" => self.cmd_putex(args).await,
            "EXPIRE" => self.cmd_expire(args).await,
            "PERSIST" => self.cmd_persist(args).await,

            // Enumeration commands
            "KEYS" => self.cmd_keys(args).await,
            "VALUES" => self.cmd_values(args).await,
            "LIST" => self.cmd_list(args).await,

            // Session commands
            "PING" => cmd_ping(args),
            "QUIT" | "EXIT" => Response::Quit,

            _ => Response::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Basic Commands
    // ========================================================================

    /// PUT key value
    async fn cmd_put(&self, args: &[String]) -> Response {
        let [key, value] = args else {
            return wrong_arity("PUT");
        };

        match self.store.put(parse_term(key), parse_term(value)).await {
            Ok(()) => Response::Ok,
            Err(e) => e.into(),
        }
    }

    /// FETCH key
    async fn cmd_fetch(&self, args: &[String]) -> Response {
        let [key] = args else {
            return wrong_arity("FETCH");
        };

        match self.store.fetch(parse_term(key)).await {
            Ok(Some(value)) => Response::Value(value),
            Ok(None) => Response::Nil,
            Err(e) => e.into(),
        }
    }

    /// GET key default
    async fn cmd_get(&self, args: &[String]) -> Response {
        let [key, default] = args else {
            return wrong_arity("GET");
        };

        match self.store.get(parse_term(key), parse_term(default)).await {
            Ok(value) => Response::Value(value),
            Err(e) => e.into(),
        }
    }

    /// DEL key
    async fn cmd_del(&self, args: &[String]) -> Response {
        let [key] = args else {
            return wrong_arity("DEL");
        };

        match self.store.delete(parse_term(key)).await {
            Ok(()) => Response::Ok,
            Err(e) => e.into(),
        }
    }

    // ========================================================================
    // Derived Commands
    // ========================================================================

    /// POP key
    async fn cmd_pop(&self, args: &[String]) -> Response {
        let [key] = args else {
            return wrong_arity("POP");
        };

        match self.store.pop(parse_term(key), Term::Nil).await {
            Ok(Term::Nil) => Response::Nil,
            Ok(value) => Response::Value(value),
            Err(e) => e.into(),
        }
    }

    /// PUTNEW key value
    async fn cmd_putnew(&self, args: &[String]) -> Response {
        let [key, value] = args else {
            return wrong_arity("PUTNEW");
        };

        match self.store.put_new(parse_term(key), parse_term(value)).await {
            Ok(()) => Response::Ok,
            Err(e) => e.into(),
        }
    }

    /// REPLACE key value
    async fn cmd_replace(&self, args: &[String]) -> Response {
        let [key, value] = args else {
            return wrong_arity("REPLACE");
        };

        match self.store.replace_strict(parse_term(key), parse_term(value)).await {
            Ok(()) => Response::Ok,
            Err(StoreError::KeyNotFound(_)) => Response::Nil,
            Err(e) => e.into(),
        }
    }

    /// GETSET key value
    async fn cmd_getset(&self, args: &[String]) -> Response {
        let [key, value] = args else {
            return wrong_arity("GETSET");
        };

        let value = parse_term(value);
        let result = self
            .store
            .get_and_update(parse_term(key), move |current| GetAndUpdate::Update {
                reply: current.unwrap_or_default(),
                value,
            })
            .await;

        match result {
            Ok(Term::Nil) => Response::Nil,
            Ok(previous) => Response::Value(previous),
            Err(e) => e.into(),
        }
    }

    /// TAKE key [key ...]
    async fn cmd_take(&self, args: &[String]) -> Response {
        if args.is_empty() {
            return wrong_arity("TAKE");
        }

        match self.store.take(args.iter().map(|k| parse_term(k))).await {
            Ok(found) => Response::Map(found),
            Err(e) => e.into(),
        }
    }

    /// SPLIT key [key ...]
    async fn cmd_split(&self, args: &[String]) -> Response {
        if args.is_empty() {
            return wrong_arity("SPLIT");
        }

        match self.store.split(args.iter().map(|k| parse_term(k))).await {
            Ok(found) => Response::Map(found),
            Err(e) => e.into(),
        }
    }

    /// DROP key [key ...]
    async fn cmd_drop(&self, args: &[String]) -> Response {
        if args.is_empty() {
            return wrong_arity("DROP");
        }

        match self.store.drop_keys(args.iter().map(|k| parse_term(k))).await {
            Ok(()) => Response::Ok,
            Err(e) => e.into(),
        }
    }

    /// INCR key [amount] / DECR key [amount]
    async fn cmd_incr(&self, args: &[String], sign: i64) -> Response {
        let (key, amount) = match args {
            [key] => (key, 1),
            [key, amount] => match amount.parse::<i64>() {
                Ok(n) => (key, n),
                Err(_) => return Response::error("ERR amount is not an integer"),
            },
            _ => return wrong_arity(if sign > 0 { "INCR" } else { "DECR" }),
        };

        let key = parse_term(key);
        let result = if sign > 0 {
            self.store.increment(key, amount).await
        } else {
            self.store.decrement(key, amount).await
        };

        match result {
            Ok(Ok(n)) => Response::Integer(n),
            Ok(Err(e)) => Response::error(format!("ERR {}", e)),
            Err(e) => e.into(),
        }
    }

    /// BUMP key amount
    async fn cmd_bump(&self, args: &[String]) -> Response {
        let [key, amount] = args else {
            return wrong_arity("BUMP");
        };

        let Ok(amount) = amount.parse::<i64>() else {
            return Response::error("ERR amount is not an integer");
        };

        match self.store.bump_strict(parse_term(key), amount).await {
            Ok(n) => Response::Integer(n),
            Err(e) => e.into(),
        }
    }

    // ========================================================================
    // Expiry Commands
    // ========================================================================

    /// PUTEX key value milliseconds
    async fn cmd_putex(&self, args: &[String]) -> Response {
        let [key, value, ms] = args else {
            return wrong_arity("PUTEX");
        };

        let Some(ttl) = parse_millis(ms) else {
            return Response::error("ERR invalid expire time");
        };

        match self
            .store
            .put_and_expire(parse_term(key), parse_term(value), ttl)
            .await
        {
            Ok(()) => Response::Ok,
            Err(e) => e.into(),
        }
    }

    /// EXPIRE key milliseconds
    async fn cmd_expire(&self, args: &[String]) -> Response {
        let [key, ms] = args else {
            return wrong_arity("EXPIRE");
        };

        let Some(ttl) = parse_millis(ms) else {
            return Response::error("ERR invalid expire time");
        };

        match self.store.expire(parse_term(key), ttl).await {
            Ok(scheduled) => Response::Bool(scheduled),
            Err(e) => e.into(),
        }
    }

    /// PERSIST key
    async fn cmd_persist(&self, args: &[String]) -> Response {
        let [key] = args else {
            return wrong_arity("PERSIST");
        };

        match self.store.persist(parse_term(key)).await {
            Ok(()) => Response::Ok,
            Err(e) => e.into(),
        }
    }

    // ========================================================================
    // Enumeration Commands
    // ========================================================================

    /// KEYS
    async fn cmd_keys(&self, args: &[String]) -> Response {
        if !args.is_empty() {
            return wrong_arity("KEYS");
        }

        match self.store.keys().await {
            Ok(keys) => Response::List(keys),
            Err(e) => e.into(),
        }
    }

    /// VALUES
    async fn cmd_values(&self, args: &[String]) -> Response {
        if !args.is_empty() {
            return wrong_arity("VALUES");
        }

        match self.store.values().await {
            Ok(values) => Response::List(values),
            Err(e) => e.into(),
        }
    }

    /// LIST
    async fn cmd_list(&self, args: &[String]) -> Response {
        if !args.is_empty() {
            return wrong_arity("LIST");
        }

        match self.store.to_list().await {
            Ok(entries) => Response::Entries(entries),
            Err(e) => e.into(),
        }
    }
}

/// PING [message]
fn cmd_ping(args: &[String]) -> Response {
    match args {
        [] => Response::Pong(None),
        [msg] => Response::Pong(Some(msg.clone())),
        _ => wrong_arity("PING"),
    }
}

fn wrong_arity(cmd: &str) -> Response {
    Response::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

fn parse_millis(arg: &str) -> Option<Duration> {
    arg.parse::<u64>().ok().map(Duration::from_millis)
}

/// Splits a line on whitespace. Double-quoted arguments may contain spaces
/// and keep their quotes so [`parse_term`] reads them as strings.
pub fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut chars = line.trim().chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut arg = String::new();
        if c == '"' {
            arg.push(c);
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(c) => arg.push(c),
                    None => return Err("ERR unbalanced quotes".to_string()),
                }
            }
            arg.push('"');
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                arg.push(c);
                chars.next();
            }
        }
        args.push(arg);
    }

    Ok(args)
}

/// Reads one argument as a term.
pub fn parse_term(arg: &str) -> Term {
    if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        return Term::Str(arg[1..arg.len() - 1].to_string());
    }

    match arg {
        "nil" => Term::Nil,
        "true" => Term::Bool(true),
        "false" => Term::Bool(false),
        _ => match arg.parse::<i64>() {
            Ok(n) => Term::Int(n),
            Err(_) => Term::Str(arg.to_string()),
        },
    }
}
