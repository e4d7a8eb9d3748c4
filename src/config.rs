// =============================================================================
// Configuration — nested, hot-reloadable, atomically persisted
// =============================================================================
//
// Mirrors the dotted configuration keys from the external-interfaces section:
// dedup.*, confidence.*, sizing.*, risk.*, gex.*, exit.*, validation.*.
//
// Every field carries a serde default so older JSON files missing new fields
// still deserialize. Persistence uses the atomic tmp + rename pattern to
// avoid corruption on crash.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_dedup_window_seconds() -> u64 {
    120
}

fn default_base_confidence() -> i32 {
    50
}
fn default_context_adjustment_range() -> i32 {
    20
}
fn default_positioning_adjustment_range() -> i32 {
    10
}
fn default_gex_adjustment_range() -> i32 {
    15
}

fn default_base_size() -> f64 {
    2.0
}
fn default_kelly_fraction() -> f64 {
    0.5
}
fn default_min_size() -> f64 {
    1.0
}
fn default_max_size() -> f64 {
    10.0
}

fn default_max_vix_for_entry() -> f64 {
    50.0
}
fn default_vix_position_size_reduction() -> f64 {
    0.5
}
fn default_max_total_exposure() -> f64 {
    50_000.0
}

fn default_max_stale_minutes() -> i64 {
    240
}
fn default_stale_weight_reduction() -> f64 {
    0.5
}

fn default_profit_target_percent() -> f64 {
    50.0
}
fn default_stop_loss_percent() -> f64 {
    -30.0
}

fn default_market_hours_start() -> String {
    "09:30".to_string()
}
fn default_market_hours_end() -> String {
    "16:00".to_string()
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_max_timestamp_skew_minutes() -> i64 {
    5
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_window_seconds")]
    pub window_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_dedup_window_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_base_confidence")]
    pub base_confidence: i32,
    #[serde(default = "default_context_adjustment_range")]
    pub context_adjustment_range: i32,
    #[serde(default = "default_positioning_adjustment_range")]
    pub positioning_adjustment_range: i32,
    #[serde(default = "default_gex_adjustment_range")]
    pub gex_adjustment_range: i32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base_confidence: default_base_confidence(),
            context_adjustment_range: default_context_adjustment_range(),
            positioning_adjustment_range: default_positioning_adjustment_range(),
            gex_adjustment_range: default_gex_adjustment_range(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_base_size")]
    pub base_size: f64,
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    #[serde(default = "default_min_size")]
    pub min_size: f64,
    #[serde(default = "default_max_size")]
    pub max_size: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_size: default_base_size(),
            kelly_fraction: default_kelly_fraction(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_vix_for_entry")]
    pub max_vix_for_entry: f64,
    #[serde(default = "default_vix_position_size_reduction")]
    pub vix_position_size_reduction: f64,
    #[serde(default = "default_max_total_exposure")]
    pub max_total_exposure: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_vix_for_entry: default_max_vix_for_entry(),
            vix_position_size_reduction: default_vix_position_size_reduction(),
            max_total_exposure: default_max_total_exposure(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GexConfig {
    #[serde(default = "default_max_stale_minutes")]
    pub max_stale_minutes: i64,
    #[serde(default = "default_stale_weight_reduction")]
    pub stale_weight_reduction: f64,
}

impl Default for GexConfig {
    fn default() -> Self {
        Self {
            max_stale_minutes: default_max_stale_minutes(),
            stale_weight_reduction: default_stale_weight_reduction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_profit_target_percent")]
    pub profit_target_percent: f64,
    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            profit_target_percent: default_profit_target_percent(),
            stop_loss_percent: default_stop_loss_percent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_market_hours_start")]
    pub market_hours_start: String,
    #[serde(default = "default_market_hours_end")]
    pub market_hours_end: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_max_timestamp_skew_minutes")]
    pub max_timestamp_skew_minutes: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            market_hours_start: default_market_hours_start(),
            market_hours_end: default_market_hours_end(),
            timezone: default_timezone(),
            max_timestamp_skew_minutes: default_max_timestamp_skew_minutes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub gex: GexConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }
}
