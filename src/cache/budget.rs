use std::path::Path;

use anyhow::Context;

use crate::foundation::error::LoopframeResult;

/// Floor applied to a budget derived from host memory.
pub const MIN_DERIVED_BUDGET_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound on the number of frames a sliding-window cache keeps.
pub const MAX_FRAME_SLOTS: usize = 512;

/// Physical memory figures used to derive a default budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostMemory {
    /// Installed memory.
    pub total_bytes: u64,
    /// Memory the kernel reports as available without swapping.
    pub available_bytes: u64,
}

impl HostMemory {
    /// Read `/proc/meminfo`; `None` where it does not exist or cannot be parsed.
    pub fn probe() -> Option<Self> {
        match Self::from_meminfo_path("/proc/meminfo") {
            Ok(mem) => Some(mem),
            Err(e) => {
                tracing::debug!(error = %e, "host memory unavailable, using fallback budget");
                None
            }
        }
    }

    /// Parse a meminfo-formatted file.
    pub fn from_meminfo_path(path: impl AsRef<Path>) -> LoopframeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::parse_meminfo(&text)
            .with_context(|| format!("parse {}", path.display()))
            .map_err(Into::into)
    }

    /// Parse `MemTotal` and `MemAvailable` (falling back to `MemFree`) from meminfo text.
    pub fn parse_meminfo(text: &str) -> Option<Self> {
        let field = |name: &str| -> Option<u64> {
            let line = text.lines().find(|l| l.starts_with(name))?;
            let rest = line[name.len()..].trim_start_matches(':').trim();
            let mut parts = rest.split_whitespace();
            let value: u64 = parts.next()?.parse().ok()?;
            let scale = match parts.next() {
                Some(unit) if unit.eq_ignore_ascii_case("kb") => 1024,
                Some(unit) if unit.eq_ignore_ascii_case("mb") => 1024 * 1024,
                _ => 1,
            };
            value.checked_mul(scale)
        };

        let total_bytes = field("MemTotal")?;
        let available_bytes = field("MemAvailable").or_else(|| field("MemFree"))?;
        Some(Self {
            total_bytes,
            available_bytes,
        })
    }

    /// `min(total * 0.2, available * 0.6)`, never below [`MIN_DERIVED_BUDGET_BYTES`].
    pub fn derived_budget(self) -> usize {
        let from_total = self.total_bytes / 5;
        let from_available = self.available_bytes.saturating_mul(3) / 5;
        let bytes = usize::try_from(from_total.min(from_available)).unwrap_or(usize::MAX);
        bytes.max(MIN_DERIVED_BUDGET_BYTES)
    }
}

/// Retention budget for decoded frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferBudget {
    /// Keep at most this many bytes of decoded bitmaps (a soft target for hot frames).
    Bytes(usize),
    /// Keep every frame once decoded.
    Unbounded,
}

impl BufferBudget {
    /// Resolve the effective budget from user options.
    ///
    /// `preload_all` wins over everything. Otherwise the host-derived budget applies, capped by a
    /// non-zero `max_buffer_bytes`. Without host figures the floor is used.
    pub fn resolve(max_buffer_bytes: usize, preload_all: bool, host: Option<HostMemory>) -> Self {
        if preload_all {
            return Self::Unbounded;
        }
        let derived = host.map_or(MIN_DERIVED_BUDGET_BYTES, HostMemory::derived_budget);
        if max_buffer_bytes == 0 {
            Self::Bytes(derived)
        } else {
            Self::Bytes(max_buffer_bytes.min(derived))
        }
    }

    /// Byte limit, `None` when unbounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Bytes(n) => Some(n),
            Self::Unbounded => None,
        }
    }

    /// Whether `bytes` fit.
    pub fn admits(self, bytes: usize) -> bool {
        self.limit().is_none_or(|limit| bytes <= limit)
    }

    /// Frames of `frame_bytes` each that fit, clamped to `[1, MAX_FRAME_SLOTS]`.
    pub fn frame_slots(self, frame_bytes: usize) -> usize {
        match self {
            Self::Unbounded => MAX_FRAME_SLOTS,
            Self::Bytes(limit) => (limit / frame_bytes.max(1)).clamp(1, MAX_FRAME_SLOTS),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/budget.rs"]
mod tests;
