//! Configuration for the VPU runtime
//!
//! A [`RuntimeConfig`] sizes the task queue and slot table, picks the codec
//! backend, sets the default stream geometry and toggles debug dumps.
//!
//! # Files
//!
//! Configs are read from `.toml` or `.json` files (chosen by extension) and
//! always written back as pretty-printed JSON.
//!
//! # Example
//!
//! ```ignore
//! use vpu_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load("decoder.toml")?;
//! config.validate()?;
//! config.save("decoder.json")?;
//! ```

use crate::error::{Result, RuntimeError};
use crate::media::{CodecType, FrameFormat};
use crate::slots::FrameInfo;
use crate::task::MAX_TASK_QUEUE_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of in-flight tasks between parser and hardware
pub const DEFAULT_TASK_QUEUE_DEPTH: usize = 2;

/// Deepest task queue a decode pipeline accepts
pub const MAX_PIPELINE_DEPTH: usize = 2;

/// Default number of frame buffers
pub const DEFAULT_SLOT_CAPACITY: usize = 8;

/// Largest slot table a config may ask for
pub const MAX_SLOT_CAPACITY: usize = 64;

/// Largest frame edge in pixels
pub const MAX_FRAME_DIMENSION: u32 = 8192;

/// Default log file name prefix
pub const DEFAULT_LOG_PREFIX: &str = "vpu-runtime";

// ==================== Runtime Config ====================

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Version for future migration support
    #[serde(default = "default_version")]
    pub version: u32,

    /// Codec whose HAL backend is created
    #[serde(default = "default_codec")]
    pub codec: CodecType,

    /// Tokens circulating between the parser and hardware stages
    #[serde(default = "default_task_queue_depth")]
    pub task_queue_depth: usize,

    /// Number of frame buffer slots
    #[serde(default = "default_slot_capacity")]
    pub slot_capacity: usize,

    /// Stream geometry used until the parser reports its own
    #[serde(default)]
    pub frame: FrameConfig,

    /// Hardware backend settings
    #[serde(default)]
    pub hal: HalConfig,

    /// Debug dump toggles
    #[serde(default)]
    pub debug: DebugConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

fn default_version() -> u32 {
    1
}

fn default_codec() -> CodecType {
    CodecType::H264
}

fn default_task_queue_depth() -> usize {
    DEFAULT_TASK_QUEUE_DEPTH
}

fn default_slot_capacity() -> usize {
    DEFAULT_SLOT_CAPACITY
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            codec: default_codec(),
            task_queue_depth: DEFAULT_TASK_QUEUE_DEPTH,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            frame: FrameConfig::default(),
            hal: HalConfig::default(),
            debug: DebugConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load a config file, picking the format from the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| RuntimeError::Config(format!("Failed to parse TOML config: {}", e))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| RuntimeError::Config(format!("Failed to parse JSON config: {}", e))),
            other => Err(RuntimeError::Config(format!(
                "Unsupported config extension: {:?}",
                other
            ))),
        }
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RuntimeError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| RuntimeError::Config(format!("Failed to write config: {}", e)))
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.task_queue_depth == 0 || self.task_queue_depth > MAX_PIPELINE_DEPTH {
            return Err(RuntimeError::Config(format!(
                "task_queue_depth must be between 1 and {}, got {}",
                MAX_PIPELINE_DEPTH, self.task_queue_depth
            )));
        }
        debug_assert!(MAX_PIPELINE_DEPTH <= MAX_TASK_QUEUE_DEPTH);

        if self.slot_capacity == 0 || self.slot_capacity > MAX_SLOT_CAPACITY {
            return Err(RuntimeError::Config(format!(
                "slot_capacity must be between 1 and {}, got {}",
                MAX_SLOT_CAPACITY, self.slot_capacity
            )));
        }

        // Every in-flight task holds an output slot, plus one for display.
        if self.slot_capacity <= self.task_queue_depth {
            return Err(RuntimeError::Config(format!(
                "slot_capacity ({}) must exceed task_queue_depth ({})",
                self.slot_capacity, self.task_queue_depth
            )));
        }

        self.frame.validate()
    }
}

// ==================== Frame Defaults ====================

/// Default stream geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default)]
    pub format: FrameFormat,
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            format: FrameFormat::default(),
        }
    }
}

impl FrameConfig {
    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo::new(self.width, self.height, self.format)
    }

    fn validate(&self) -> Result<()> {
        let in_range = |v: u32| v > 0 && v <= MAX_FRAME_DIMENSION;
        if !in_range(self.width) || !in_range(self.height) {
            return Err(RuntimeError::Config(format!(
                "frame size {}x{} outside 1..={}",
                self.width, self.height, MAX_FRAME_DIMENSION
            )));
        }
        Ok(())
    }
}

// ==================== HAL ====================

/// Settings handed to a HAL backend factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalConfig {
    /// Simulated hardware latency per task in microseconds
    #[serde(default)]
    pub latency_us: u64,

    /// Report a hardware error on every Nth task (0 disables)
    #[serde(default)]
    pub fail_every: u32,

    /// Upper bound on a single `wait` call in milliseconds
    #[serde(default = "default_hal_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_hal_timeout_ms() -> u64 {
    1000
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            latency_us: 0,
            fail_every: 0,
            timeout_ms: default_hal_timeout_ms(),
        }
    }
}

// ==================== Debug ====================

/// Debug dump toggles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Dump the slot table on info change and shutdown
    #[serde(default)]
    pub dump_slots: bool,

    /// Trace every task hand-off between stages
    #[serde(default)]
    pub dump_tasks: bool,

    /// Dump the attachment registry live list on shutdown
    #[serde(default)]
    pub dump_attachments: bool,
}

// ==================== Logging ====================

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default)]
    pub filter: Option<String>,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,

    /// Emit ANSI colors on the console
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_log_prefix() -> String {
    DEFAULT_LOG_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: None,
            log_dir: None,
            file_prefix: default_log_prefix(),
            ansi: true,
        }
    }
}
