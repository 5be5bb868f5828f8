//! Client launcher configuration
//!
//! Maps local client executables (psql, mysql, redis-cli, ...) onto command
//! lines and environment for a tunneled connection. User overrides from
//! `~/.porthole/clients.yml` are deep-merged over a stock mapping, and
//! `${...}` placeholders are resolved against the connection info and the
//! local port.

use porthole_relay::ConnectionInfo;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::info;

/// Built-in client mapping, compiled into the binary.
pub const STOCK_CLIENTS: &str = include_str!("../config/clients.yml");

/// User override file, relative to the home directory.
pub const USER_CLIENTS_FILE: &str = ".porthole/clients.yml";

/// Launcher errors
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("Failed to read {path}: {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid launcher configuration: {0}")]
    ParseConfig(#[from] serde_yaml::Error),

    #[error("Invalid environment variable: {0}")]
    InvalidEnvVar(String),

    #[error("No value for ${{{0}}}")]
    UnresolvedField(String),

    #[error("Failed to start '{command}' - is it in your $PATH?")]
    Spawn { command: String },
}

/// One launcher entry: either a bare argument string or a command plus
/// environment entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientEntry {
    Command(String),
    Full {
        command: String,
        #[serde(default)]
        environment: Vec<String>,
    },
}

/// Supplies values for placeholders the connection info does not cover.
pub trait Prompter {
    fn ask(&self, field: &str) -> Result<String, LauncherError>;
}

/// Prompter for non-interactive contexts; any unknown field is an error.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn ask(&self, field: &str) -> Result<String, LauncherError> {
        Err(LauncherError::UnresolvedField(field.to_string()))
    }
}

/// Stock client mapping with user overrides merged in, keyed by executable
/// basename.
pub struct ClientRegistry {
    clients: BTreeMap<String, ClientEntry>,
}

impl ClientRegistry {
    /// Built-in mapping only.
    pub fn stock() -> Result<Self, LauncherError> {
        Self::load_with_overrides(None)
    }

    /// Built-in mapping with the user's override file, if present.
    pub fn load() -> Result<Self, LauncherError> {
        let user_path = dirs::home_dir().map(|home| home.join(USER_CLIENTS_FILE));
        Self::load_with_overrides(user_path.as_deref())
    }

    pub fn load_with_overrides(path: Option<&Path>) -> Result<Self, LauncherError> {
        let stock: serde_yaml::Value = serde_yaml::from_str(STOCK_CLIENTS)?;

        let merged = match path {
            Some(path) if path.exists() => {
                let text =
                    std::fs::read_to_string(path).map_err(|source| LauncherError::ReadConfig {
                        path: path.display().to_string(),
                        source,
                    })?;
                let user: serde_yaml::Value = serde_yaml::from_str(&text)?;
                deep_merge(stock, user)
            }
            _ => stock,
        };

        let clients = serde_yaml::from_value(merged)?;
        Ok(Self { clients })
    }

    /// Entry for a client command, matched on its basename.
    pub fn lookup(&self, command: &str) -> Option<&ClientEntry> {
        let base = Path::new(command).file_name()?.to_str()?;
        self.clients.get(base)
    }
}

/// Mappings merge recursively; for anything else the override wins.
fn deep_merge(base: serde_yaml::Value, over: serde_yaml::Value) -> serde_yaml::Value {
    match (base, over) {
        (serde_yaml::Value::Mapping(mut base), serde_yaml::Value::Mapping(over)) => {
            for (key, value) in over {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            serde_yaml::Value::Mapping(base)
        }
        (_, over) => over,
    }
}

/// Fully resolved invocation of an external client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub command_line: String,
    pub env: Vec<(String, String)>,
}

/// Resolve an entry into a ready-to-run plan for `command`.
pub fn build_plan(
    entry: &ClientEntry,
    command: &str,
    info: &ConnectionInfo,
    local_port: u16,
    prompter: &dyn Prompter,
) -> Result<LaunchPlan, LauncherError> {
    let (args, environment): (&str, &[String]) = match entry {
        ClientEntry::Command(args) => (args, &[]),
        ClientEntry::Full {
            command: args,
            environment,
        } => (args, environment),
    };

    let mut env = Vec::new();
    for raw in environment {
        let (key, value) = parse_env_entry(raw)?;
        env.push((key, resolve_placeholders(&value, info, local_port, prompter)?));
    }

    Ok(LaunchPlan {
        command_line: format!(
            "{} {}",
            command,
            resolve_placeholders(args, info, local_port, prompter)?
        ),
        env,
    })
}

/// `KEY=VALUE`, with optional matching quotes around the value.
fn parse_env_entry(entry: &str) -> Result<(String, String), LauncherError> {
    let invalid = || LauncherError::InvalidEnvVar(entry.to_string());

    let (key, raw) = entry.split_once('=').ok_or_else(invalid)?;
    if key.is_empty() {
        return Err(invalid());
    }

    let value = match raw.as_bytes() {
        [q @ (b'"' | b'\''), .., last] if last == q => &raw[1..raw.len() - 1],
        [b'"' | b'\'', ..] | [.., b'"' | b'\''] => return Err(invalid()),
        _ => raw,
    };

    Ok((key.to_string(), value.to_string()))
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern"))
}

/// Substitute `${...}` placeholders.
///
/// `host` resolves to localhost (the tunnel is local by construction),
/// `port` to the local tunnel port, `user`/`username` to the connection
/// username; anything else is looked up in the connection info and falls
/// back to the prompter.
pub fn resolve_placeholders(
    template: &str,
    info: &ConnectionInfo,
    local_port: u16,
    prompter: &dyn Prompter,
) -> Result<String, LauncherError> {
    let mut resolved = String::with_capacity(template.len());
    let mut last = 0;

    for captures in placeholder_regex().captures_iter(template) {
        let whole = captures.get(0).expect("match");
        let field = captures.get(1).expect("group").as_str().trim();

        let value = match field {
            "host" => "localhost".to_string(),
            "port" => local_port.to_string(),
            "user" | "username" => info.username().unwrap_or_default().to_string(),
            other => match info.get_string(other) {
                Some(value) => value,
                None => prompter.ask(other)?,
            },
        };

        resolved.push_str(&template[last..whole.start()]);
        resolved.push_str(&value);
        last = whole.end();
    }

    resolved.push_str(&template[last..]);
    Ok(resolved)
}

/// Run a launch plan to completion via the shell.
///
/// A failed client run is surfaced but never tears the tunnel down; the
/// caller decides whether to keep waiting.
pub fn launch(plan: &LaunchPlan) -> Result<(), LauncherError> {
    info!("Launching '{}'", plan.command_line);

    let program = plan
        .command_line
        .split_whitespace()
        .next()
        .unwrap_or(&plan.command_line)
        .to_string();

    let mut command = Command::new("sh");
    command.arg("-c").arg(&plan.command_line);
    for (key, value) in &plan.env {
        command.env(key, value);
    }

    match command.status() {
        // The shell reports "command not found" as exit code 127.
        Ok(status) if status.code() == Some(127) => Err(LauncherError::Spawn { command: program }),
        Ok(_) => Ok(()),
        Err(_) => Err(LauncherError::Spawn { command: program }),
    }
}
