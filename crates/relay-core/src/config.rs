use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{RelayError, Result};

pub const DEFAULT_LETTA_URL: &str = "http://localhost:8283";
pub const DEFAULT_CONFIG_FILE: &str = "bots.json";
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Discord bot tokens are three base64url segments separated by dots.
static DISCORD_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$")
        .expect("discord token pattern compiles")
});

/// Letta agent ids: `agent-` followed by a lowercase UUID.
static AGENT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^agent-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$")
        .expect("agent id pattern compiles")
});

/// The bots document (`bots.json` or the equivalent secret).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotsConfig {
    #[serde(default = "default_letta_url")]
    pub letta_url: String,
    pub bots: BTreeMap<String, BotConfig>,
}

/// Per-identity settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub discord_token: String,
    pub agent_id: String,
    /// When false, inbound attachments are ignored for this bot.
    #[serde(default = "bool_true")]
    pub enable_attachments: bool,
}

// Tokens must never end up in logs.
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("discord_token", &"<redacted>")
            .field("agent_id", &self.agent_id)
            .field("enable_attachments", &self.enable_attachments)
            .finish()
    }
}

fn default_letta_url() -> String {
    DEFAULT_LETTA_URL.to_string()
}

fn bool_true() -> bool {
    true
}

impl BotsConfig {
    /// Parse and validate a raw JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| RelayError::ConfigInvalid(vec![format!("invalid JSON: {e}")]))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed document and convert it.
    ///
    /// All problems are collected before failing so the operator sees the
    /// whole list at once.
    pub fn from_value(value: Value) -> Result<Self> {
        let issues = validate(&value);
        if !issues.is_empty() {
            return Err(RelayError::ConfigInvalid(issues));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Look up a single bot identity.
    pub fn bot(&self, name: &str) -> Result<&BotConfig> {
        self.bots.get(name).ok_or_else(|| RelayError::UnknownBot {
            name: name.to_string(),
            available: self.available(),
        })
    }

    /// Comma-separated identity list for diagnostics.
    pub fn available(&self) -> String {
        if self.bots.is_empty() {
            "(none)".to_string()
        } else {
            self.bots.keys().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

/// Check a bots document and return field-qualified problems (empty = valid).
pub fn validate(config: &Value) -> Vec<String> {
    let mut issues = Vec::new();

    let Some(root) = config.as_object() else {
        issues.push("Config must be a JSON object".to_string());
        return issues;
    };

    if let Some(url) = root.get("letta_url") {
        match url.as_str() {
            None => issues.push(format!("'letta_url' must be a string, got {}", type_name(url))),
            Some(s) if !(s.starts_with("http://") || s.starts_with("https://")) => {
                issues.push(format!("'letta_url' must be a valid HTTP(S) URL, got: {s}"))
            }
            Some(_) => {}
        }
    }

    let Some(bots) = root.get("bots") else {
        issues.push("Missing required field 'bots'".to_string());
        return issues;
    };
    let Some(bots) = bots.as_object() else {
        issues.push(format!("'bots' must be an object, got {}", type_name(bots)));
        return issues;
    };
    if bots.is_empty() {
        issues.push("'bots' must contain at least one bot configuration".to_string());
        return issues;
    }

    for (name, bot) in bots {
        validate_bot(&format!("bots.{name}"), bot, &mut issues);
    }

    issues
}

fn validate_bot(prefix: &str, bot: &Value, issues: &mut Vec<String>) {
    let Some(fields) = bot.as_object() else {
        issues.push(format!("'{prefix}' must be an object, got {}", type_name(bot)));
        return;
    };

    check_required_string(
        prefix,
        fields.get("discord_token"),
        "discord_token",
        &DISCORD_TOKEN,
        "Expected format: XXX.XXX.XXX (three base64 segments separated by dots)",
        issues,
    );
    check_required_string(
        prefix,
        fields.get("agent_id"),
        "agent_id",
        &AGENT_ID,
        "Expected format: agent-xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
        issues,
    );

    if let Some(flag) = fields.get("enable_attachments") {
        if !flag.is_boolean() {
            issues.push(format!(
                "'{prefix}.enable_attachments' must be a boolean (true/false), got {}",
                type_name(flag)
            ));
        }
    }
}

fn check_required_string(
    prefix: &str,
    value: Option<&Value>,
    field: &str,
    pattern: &Regex,
    hint: &str,
    issues: &mut Vec<String>,
) {
    let Some(value) = value else {
        issues.push(format!("'{prefix}' missing required field '{field}'"));
        return;
    };
    let Some(s) = value.as_str() else {
        issues.push(format!(
            "'{prefix}.{field}' must be a string, got {}",
            type_name(value)
        ));
        return;
    };
    if s.is_empty() {
        issues.push(format!("'{prefix}.{field}' cannot be empty"));
    } else if !pattern.is_match(s) {
        issues.push(format!("'{prefix}.{field}' has invalid format. {hint}"));
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Where the bots document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Local JSON file.
    File(PathBuf),
    /// AWS Secrets Manager secret, read through the `aws` CLI.
    AwsSecret { name: String, region: String },
}

impl ConfigSource {
    /// Resolve the source from the environment.
    ///
    /// Checks in order:
    ///   1. `AWS_SECRET_NAME` (region from `AWS_REGION`)
    ///   2. `CONFIG_FILE`
    ///   3. `./bots.json`
    pub fn from_env() -> Self {
        if let Ok(name) = std::env::var("AWS_SECRET_NAME") {
            if !name.is_empty() {
                let region = std::env::var("AWS_REGION")
                    .unwrap_or_else(|_| DEFAULT_AWS_REGION.to_string());
                return ConfigSource::AwsSecret { name, region };
            }
        }
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        ConfigSource::File(PathBuf::from(path))
    }

    /// Fetch, parse and validate the document.
    pub async fn load(&self) -> Result<BotsConfig> {
        let raw = self.fetch().await?;
        BotsConfig::from_json(&raw)
    }

    async fn fetch(&self) -> Result<String> {
        match self {
            ConfigSource::File(path) => {
                debug!(path = %path.display(), "reading bots config");
                match tokio::fs::read_to_string(path).await {
                    Ok(raw) => Ok(raw),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(RelayError::ConfigNotFound {
                            path: path.display().to_string(),
                        })
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ConfigSource::AwsSecret { name, region } => {
                debug!(secret = %name, %region, "reading bots config from secrets manager");
                let output = tokio::process::Command::new("aws")
                    .args(["secretsmanager", "get-secret-value", "--secret-id"])
                    .arg(name)
                    .args(["--region", region])
                    .args(["--query", "SecretString", "--output", "text"])
                    .output()
                    .await
                    .map_err(|e| RelayError::Secret {
                        secret: name.clone(),
                        reason: format!("failed to run aws CLI: {e}"),
                    })?;
                if !output.status.success() {
                    return Err(RelayError::Secret {
                        secret: name.clone(),
                        reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "file {}", path.display()),
            ConfigSource::AwsSecret { name, region } => write!(f, "secret {name} ({region})"),
        }
    }
}
