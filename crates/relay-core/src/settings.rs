//! Process-level tunables (env overrides on top of built-in defaults).
//!
//! The bots document says *which* bots exist; these settings say how the
//! supervisor and each bot process behave. Documented variables are read
//! by their bare names (`POLL_INTERVAL`, `MAX_RESTART_ATTEMPTS`,
//! `RESTART_BACKOFF_BASE`, `LETTA_MAX_RETRIES`); everything else takes the
//! `RELAY_` prefix, e.g. `RELAY_DEBOUNCE_SECS=5`.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Env vars read without a prefix.
const RAW_ENV_KEYS: &[&str] = &[
    "POLL_INTERVAL",
    "MAX_RESTART_ATTEMPTS",
    "RESTART_BACKOFF_BASE",
    "LETTA_MAX_RETRIES",
];

pub const MAX_ATTACHMENT_BYTES: u64 = 100 * 1024 * 1024; // 100 MB

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Supervisor timing and retry budget. All durations in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Config reload + health check cadence.
    pub poll_interval: u64,
    /// Restarts allowed before an identity is abandoned.
    pub max_restart_attempts: u32,
    /// First restart delay; doubles per consecutive crash.
    pub restart_backoff_base: u64,
    /// Healthy uptime after which the restart counter resets.
    pub stability_window: u64,
    /// Grace period between SIGTERM and SIGKILL.
    pub stop_timeout: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            max_restart_attempts: 5,
            restart_backoff_base: 5,
            stability_window: 300,
            stop_timeout: 10,
        }
    }
}

/// Bot-process pipeline tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub debounce_secs: f64,
    pub chunk_max_paragraphs: usize,
    pub chunk_max_chars: usize,
    pub chunk_delay_ms: u64,
    pub letta_max_retries: u32,
    pub letta_retry_base_ms: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub dedup_capacity: usize,
    pub max_attachment_bytes: u64,
    /// Per-bot state lives in `<data_root>/<identity>/`.
    pub data_root: Option<String>,
    /// Content-addressed attachment store; defaults to `<data_root>/attachments`.
    pub attachment_store: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            debounce_secs: 10.0,
            chunk_max_paragraphs: 3,
            chunk_max_chars: 1900,
            chunk_delay_ms: 1500,
            letta_max_retries: 3,
            letta_retry_base_ms: 1000,
            request_timeout_secs: 300,
            connect_timeout_secs: 60,
            dedup_capacity: 10_000,
            max_attachment_bytes: MAX_ATTACHMENT_BYTES,
            data_root: None,
            attachment_store: None,
        }
    }
}

impl PipelineSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_secs.max(0.0))
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn data_root(&self) -> PathBuf {
        match &self.data_root {
            Some(root) => PathBuf::from(root),
            None => default_data_root(),
        }
    }

    /// State directory for one bot identity.
    pub fn bot_dir(&self, identity: &str) -> PathBuf {
        self.data_root().join(identity)
    }

    pub fn attachment_store(&self) -> PathBuf {
        match &self.attachment_store {
            Some(path) => PathBuf::from(path),
            None => self.data_root().join("attachments"),
        }
    }
}

fn default_data_root() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".relaybot")
}

impl RelaySettings {
    /// Load defaults, then documented bare env vars, then `RELAY_*` overrides.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        let raw = Env::raw().filter(|key| {
            RAW_ENV_KEYS
                .iter()
                .any(|k| key.as_str().eq_ignore_ascii_case(k))
        });
        Figment::new()
            .merge(Serialized::defaults(SupervisorSettings::default()))
            .merge(Serialized::defaults(PipelineSettings::default()))
            .merge(raw)
            .merge(Env::prefixed("RELAY_"))
    }

    /// Both sections are flat in the env, so each is extracted from the root.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let supervisor: SupervisorSettings = figment
            .extract()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        let pipeline: PipelineSettings = figment
            .extract()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(Self {
            supervisor,
            pipeline,
        })
    }
}
