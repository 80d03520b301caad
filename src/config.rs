use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::cache::{BufferBudget, HostMemory};
use crate::foundation::error::{LoopframeError, LoopframeResult};
use crate::playback::PlaybackOptions;

/// Longest stall limit accepted from configuration.
const MAX_STALL_SECS: f64 = 60.0;

/// Player options, loadable from JSON. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Start playing once more than one frame is known.
    pub auto_play: bool,
    /// Replaces the container's loop count (0 = forever).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_count_override: Option<u32>,
    /// Decoded-frame budget in bytes; 0 derives one from host memory.
    pub max_buffer_bytes: usize,
    /// Name of the host scheduling context that calls `advance`.
    pub run_loop_affinity: String,
    /// Decode every frame once and keep it, disabling the sliding window.
    pub preload_all_frames: bool,
    /// Seconds to hold a frame waiting for the next bitmap before skipping it.
    pub max_stall_secs: f64,
    /// Milliseconds one tick may block waiting for a bitmap.
    pub display_wait_ms: u64,
    /// Prefetch depth; unset derives it from the budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookahead: Option<usize>,
    /// Whether `play` after the last loop starts over.
    pub replay_after_finish: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            auto_play: true,
            loop_count_override: None,
            max_buffer_bytes: 0,
            run_loop_affinity: "common".to_owned(),
            preload_all_frames: false,
            max_stall_secs: 1.0,
            display_wait_ms: 2,
            lookahead: None,
            replay_after_finish: true,
        }
    }
}

impl PlayerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> LoopframeResult<Self> {
        let cfg: Self = serde_json::from_str(json).context("parse player config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_path(path: impl AsRef<Path>) -> LoopframeResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read player config {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Reject values the player cannot honor.
    pub fn validate(&self) -> LoopframeResult<()> {
        if !self.max_stall_secs.is_finite() || self.max_stall_secs <= 0.0 {
            return Err(LoopframeError::validation(
                "max_stall_secs must be finite and > 0",
            ));
        }
        if self.max_stall_secs > MAX_STALL_SECS {
            return Err(LoopframeError::validation(format!(
                "max_stall_secs must be <= {MAX_STALL_SECS}"
            )));
        }
        if Duration::from_millis(self.display_wait_ms).as_secs_f64() > self.max_stall_secs {
            return Err(LoopframeError::validation(
                "display_wait_ms must not exceed max_stall_secs",
            ));
        }
        if self.lookahead == Some(0) {
            return Err(LoopframeError::validation("lookahead must be >= 1 when set"));
        }
        let affinity_ok = !self.run_loop_affinity.is_empty()
            && self
                .run_loop_affinity
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
        if !affinity_ok {
            return Err(LoopframeError::validation(
                "run_loop_affinity must be a non-empty identifier",
            ));
        }
        Ok(())
    }

    /// Budget for this configuration on the current host.
    pub fn budget(&self) -> BufferBudget {
        self.budget_with(HostMemory::probe())
    }

    /// Budget for this configuration given explicit host figures.
    pub fn budget_with(&self, host: Option<HostMemory>) -> BufferBudget {
        BufferBudget::resolve(self.max_buffer_bytes, self.preload_all_frames, host)
    }
}

impl From<&PlayerConfig> for PlaybackOptions {
    fn from(cfg: &PlayerConfig) -> Self {
        let stall_secs = if cfg.max_stall_secs.is_finite() {
            cfg.max_stall_secs.clamp(0.0, MAX_STALL_SECS)
        } else {
            PlayerConfig::default().max_stall_secs
        };
        Self {
            auto_play: cfg.auto_play,
            loop_count_override: cfg.loop_count_override,
            max_stall: Duration::from_secs_f64(stall_secs),
            display_wait: Duration::from_millis(cfg.display_wait_ms),
            lookahead: cfg.lookahead,
            replay_after_finish: cfg.replay_after_finish,
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
