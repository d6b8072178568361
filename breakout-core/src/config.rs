//! Strategy configuration.
//!
//! Loaded once from TOML and validated before the controller starts; a
//! config that fails validation is fatal. The file groups fields the same
//! way the deployed bots do:
//!
//! ```toml
//! asset_pair = "GBP_USD"
//!
//! [session_times]
//! timezone = "America/New_York"
//! asian_start = "19:00"
//! asian_end = "00:55"
//! london_probe_start = "01:00"
//! london_window_start = "02:00"
//! london_window_end = "06:00"
//!
//! [strategy_params]
//! min_asian_range_pips = 20.0
//! max_asian_range_pips = 80.0
//! breakout_buffer_pips = 2.0
//! initial_stop_pips = 20.0
//! atr_period = 14
//! probe_max_count = 3
//! atr_tp_bands = [
//!     { max_atr_pips = 8.0, tp_pips = 15.0 },
//!     { max_atr_pips = 999.0, tp_pips = 25.0 },
//! ]
//! trailing_tiers = [
//!     { trigger_pips = 10.0, sl_pips = -5.0 },
//!     { trigger_pips = 15.0, sl_pips = 0.0 },
//!     { trigger_pips = 20.0, sl_pips = 2.0 },
//! ]
//!
//! [market_conditions]
//! max_spread_pips = 2.5
//!
//! [news_avoidance]
//! enabled = true
//! ```

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::TimeWindow;

/// Default pip size (4-decimal FX majors).
pub const DEFAULT_PIP_VALUE: f64 = 0.0001;

/// Exchange zone used by the absolute-time flatten rule.
pub const DEFAULT_FLATTEN_TIMEZONE: &str = "America/New_York";

/// Local exchange time at or after which open positions are flattened.
pub const DEFAULT_FLATTEN_CUTOFF: &str = "12:00";

/// Sample configuration shipped with the crate (GBP/USD London breakout).
pub const SAMPLE_CONFIG_TOML: &str = include_str!("../config/gbpusd_london_breakout.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown timezone '{name}': {reason}")]
    UnknownTimezone { name: String, reason: String },

    #[error("invalid time for {field}: '{value}' (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// One row of the ATR → take-profit table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrTpBand {
    pub max_atr_pips: f64,
    pub tp_pips: f64,
}

/// One trailing tier: once the favorable excursion reaches `trigger_pips`,
/// the stop may move to `entry + sl_pips` (in the trade's favor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailTier {
    pub trigger_pips: f64,
    pub sl_pips: f64,
}

/// Absolute-time flatten rule, evaluated in a fixed exchange timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlattenRule {
    pub timezone: Tz,
    pub cutoff: NaiveTime,
}

impl Default for FlattenRule {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            cutoff: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Validated, immutable strategy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub asset_pair: String,
    pub timezone: Tz,

    pub asian_start: NaiveTime,
    pub asian_end: NaiveTime,
    pub london_probe_start: NaiveTime,
    pub london_window_start: NaiveTime,
    pub london_window_end: NaiveTime,

    pub min_asian_range_pips: f64,
    pub max_asian_range_pips: f64,
    pub breakout_buffer_pips: f64,
    pub initial_stop_pips: f64,

    pub atr_period: usize,
    pub atr_tp_bands: Vec<AtrTpBand>,

    pub probe_max_count: u32,
    pub trailing_tiers: [TrailTier; 3],

    pub max_spread_pips: f64,
    pub pip_value: f64,

    pub news_avoidance_enabled: bool,
    pub flatten: FlattenRule,
}

impl StrategyConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        raw.validate()
    }

    /// The shipped GBP/USD sample, already validated.
    pub fn sample() -> Result<Self, ConfigError> {
        Self::from_toml(SAMPLE_CONFIG_TOML)
    }

    pub fn asian_window(&self) -> TimeWindow {
        TimeWindow::new(self.asian_start, self.asian_end)
    }

    /// Broad window in which entry gates are evaluated at all.
    pub fn probe_window(&self) -> TimeWindow {
        TimeWindow::new(self.london_probe_start, self.london_window_end)
    }

    /// Strict window in which an entry may actually be emitted.
    pub fn trade_window(&self) -> TimeWindow {
        TimeWindow::new(self.london_window_start, self.london_window_end)
    }

    /// Take-profit distance for a given ATR (in pips).
    ///
    /// Bands are checked in order; the first with `atr_pips <= max_atr_pips`
    /// wins and the last band is the fallback.
    pub fn take_profit_pips(&self, atr_pips: f64) -> f64 {
        self.atr_tp_bands
            .iter()
            .find(|band| atr_pips <= band.max_atr_pips)
            .or_else(|| self.atr_tp_bands.last())
            .map(|band| band.tp_pips)
            .unwrap_or(0.0)
    }

    pub fn pips_to_price(&self, pips: f64) -> f64 {
        pips * self.pip_value
    }
}

// ── File format ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConfig {
    asset_pair: String,
    session_times: RawSessionTimes,
    strategy_params: RawStrategyParams,
    market_conditions: RawMarketConditions,
    #[serde(default)]
    news_avoidance: RawNewsAvoidance,
    #[serde(default)]
    flatten: Option<RawFlatten>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSessionTimes {
    timezone: String,
    asian_start: String,
    asian_end: String,
    london_probe_start: String,
    london_window_start: String,
    london_window_end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawStrategyParams {
    min_asian_range_pips: f64,
    max_asian_range_pips: f64,
    breakout_buffer_pips: f64,
    initial_stop_pips: f64,
    atr_period: usize,
    atr_tp_bands: Vec<AtrTpBand>,
    probe_max_count: u32,
    trailing_tiers: [TrailTier; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMarketConditions {
    max_spread_pips: f64,
    #[serde(default = "default_pip_value")]
    pip_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawNewsAvoidance {
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawNewsAvoidance {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFlatten {
    #[serde(default = "default_flatten_timezone")]
    timezone: String,
    #[serde(default = "default_flatten_cutoff")]
    cutoff: String,
}

fn default_pip_value() -> f64 {
    DEFAULT_PIP_VALUE
}

fn default_true() -> bool {
    true
}

fn default_flatten_timezone() -> String {
    DEFAULT_FLATTEN_TIMEZONE.to_string()
}

fn default_flatten_cutoff() -> String {
    DEFAULT_FLATTEN_CUTOFF.to_string()
}

fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|e| ConfigError::UnknownTimezone {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn parse_hhmm(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::InvalidTime {
        field,
        value: value.to_string(),
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a non-negative number, got {value}")))
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive, got {value}")))
    }
}

impl RawConfig {
    fn validate(self) -> Result<StrategyConfig, ConfigError> {
        if self.asset_pair.trim().is_empty() {
            return Err(invalid("asset_pair", "must not be empty"));
        }

        let st = &self.session_times;
        let timezone = parse_timezone(&st.timezone)?;
        let asian_start = parse_hhmm("asian_start", &st.asian_start)?;
        let asian_end = parse_hhmm("asian_end", &st.asian_end)?;
        let london_probe_start = parse_hhmm("london_probe_start", &st.london_probe_start)?;
        let london_window_start = parse_hhmm("london_window_start", &st.london_window_start)?;
        let london_window_end = parse_hhmm("london_window_end", &st.london_window_end)?;

        let sp = &self.strategy_params;
        require_non_negative("min_asian_range_pips", sp.min_asian_range_pips)?;
        require_non_negative("max_asian_range_pips", sp.max_asian_range_pips)?;
        if sp.min_asian_range_pips > sp.max_asian_range_pips {
            return Err(invalid(
                "min_asian_range_pips",
                format!(
                    "{} exceeds max_asian_range_pips {}",
                    sp.min_asian_range_pips, sp.max_asian_range_pips
                ),
            ));
        }
        require_non_negative("breakout_buffer_pips", sp.breakout_buffer_pips)?;
        require_positive("initial_stop_pips", sp.initial_stop_pips)?;

        if sp.atr_period == 0 {
            return Err(invalid("atr_period", "must be >= 1"));
        }
        if sp.atr_tp_bands.is_empty() {
            return Err(invalid("atr_tp_bands", "at least one band is required"));
        }
        for band in &sp.atr_tp_bands {
            require_non_negative("atr_tp_bands.max_atr_pips", band.max_atr_pips)?;
            require_positive("atr_tp_bands.tp_pips", band.tp_pips)?;
        }
        if sp
            .atr_tp_bands
            .windows(2)
            .any(|w| w[1].max_atr_pips < w[0].max_atr_pips)
        {
            return Err(invalid(
                "atr_tp_bands",
                "max_atr_pips must be listed in ascending order",
            ));
        }

        if sp.probe_max_count == 0 {
            return Err(invalid("probe_max_count", "must be >= 1"));
        }

        for tier in &sp.trailing_tiers {
            require_positive("trailing_tiers.trigger_pips", tier.trigger_pips)?;
            if !tier.sl_pips.is_finite() || tier.sl_pips >= tier.trigger_pips {
                return Err(invalid(
                    "trailing_tiers.sl_pips",
                    format!(
                        "{} must be below its trigger of {} pips",
                        tier.sl_pips, tier.trigger_pips
                    ),
                ));
            }
        }
        if sp
            .trailing_tiers
            .windows(2)
            .any(|w| w[1].trigger_pips <= w[0].trigger_pips)
        {
            return Err(invalid(
                "trailing_tiers",
                "trigger_pips must be strictly ascending",
            ));
        }

        let mc = &self.market_conditions;
        require_non_negative("max_spread_pips", mc.max_spread_pips)?;
        require_positive("pip_value", mc.pip_value)?;

        let flatten = match &self.flatten {
            Some(raw) => FlattenRule {
                timezone: parse_timezone(&raw.timezone)?,
                cutoff: parse_hhmm("flatten.cutoff", &raw.cutoff)?,
            },
            None => FlattenRule::default(),
        };

        Ok(StrategyConfig {
            asset_pair: self.asset_pair.trim().to_string(),
            timezone,
            asian_start,
            asian_end,
            london_probe_start,
            london_window_start,
            london_window_end,
            min_asian_range_pips: sp.min_asian_range_pips,
            max_asian_range_pips: sp.max_asian_range_pips,
            breakout_buffer_pips: sp.breakout_buffer_pips,
            initial_stop_pips: sp.initial_stop_pips,
            atr_period: sp.atr_period,
            atr_tp_bands: sp.atr_tp_bands.clone(),
            probe_max_count: sp.probe_max_count,
            trailing_tiers: sp.trailing_tiers,
            max_spread_pips: mc.max_spread_pips,
            pip_value: mc.pip_value,
            news_avoidance_enabled: self.news_avoidance.enabled,
            flatten,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StrategyConfig {
        StrategyConfig::sample().expect("sample config must validate")
    }

    #[test]
    fn sample_config_parses() {
        let cfg = sample();
        assert_eq!(cfg.asset_pair, "GBP_USD");
        assert_eq!(cfg.timezone, chrono_tz::America::New_York);
        assert_eq!(cfg.asian_start, NaiveTime::from_hms_opt(19, 0, 0).unwrap());
        assert_eq!(cfg.asian_end, NaiveTime::from_hms_opt(0, 55, 0).unwrap());
        assert_eq!(cfg.atr_period, 14);
        assert_eq!(cfg.pip_value, DEFAULT_PIP_VALUE);
        assert!(cfg.news_avoidance_enabled);
        assert_eq!(cfg.flatten, FlattenRule::default());
    }

    #[test]
    fn take_profit_band_selection() {
        let cfg = sample();
        // first matching band wins, boundaries inclusive
        assert_eq!(cfg.take_profit_pips(5.0), 15.0);
        assert_eq!(cfg.take_profit_pips(8.0), 15.0);
        assert_eq!(cfg.take_profit_pips(10.0), 20.0);
        assert_eq!(cfg.take_profit_pips(30.0), 25.0);
        // past the last band: fallback to last
        assert_eq!(cfg.take_profit_pips(5_000.0), 25.0);
    }

    #[test]
    fn windows_are_derived_from_session_times() {
        let cfg = sample();
        assert!(cfg.asian_window().crosses_midnight());
        assert_eq!(cfg.probe_window().start, cfg.london_probe_start);
        assert_eq!(cfg.trade_window().start, cfg.london_window_start);
        assert_eq!(cfg.trade_window().end, cfg.london_window_end);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let toml = SAMPLE_CONFIG_TOML.replace("America/New_York", "Mars/Olympus_Mons");
        let err = StrategyConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTimezone { .. }), "{err}");
    }

    #[test]
    fn malformed_time_is_rejected() {
        let toml = SAMPLE_CONFIG_TOML.replace("\"19:00\"", "\"7pm\"");
        let err = StrategyConfig::from_toml(&toml).unwrap_err();
        match err {
            ConfigError::InvalidTime { field, value } => {
                assert_eq!(field, "asian_start");
                assert_eq!(value, "7pm");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let toml = SAMPLE_CONFIG_TOML.replace("initial_stop_pips = 20.0", "");
        let err = StrategyConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    }

    #[test]
    fn zero_atr_period_is_rejected() {
        let toml = SAMPLE_CONFIG_TOML.replace("atr_period = 14", "atr_period = 0");
        let err = StrategyConfig::from_toml(&toml).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "atr_period", .. }),
            "{err}"
        );
    }

    #[test]
    fn inverted_range_bounds_are_rejected() {
        let toml = SAMPLE_CONFIG_TOML.replace(
            "min_asian_range_pips = 20.0",
            "min_asian_range_pips = 120.0",
        );
        let err = StrategyConfig::from_toml(&toml).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "min_asian_range_pips", .. }),
            "{err}"
        );
    }

    #[test]
    fn tiers_must_ascend() {
        let toml = SAMPLE_CONFIG_TOML.replace(
            "{ trigger_pips = 15.0, sl_pips = 0.0 }",
            "{ trigger_pips = 8.0, sl_pips = 0.0 }",
        );
        let err = StrategyConfig::from_toml(&toml).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "trailing_tiers", .. }),
            "{err}"
        );
    }

    #[test]
    fn pip_value_defaults_when_omitted() {
        let toml = SAMPLE_CONFIG_TOML.replace("pip_value = 0.0001", "");
        let cfg = StrategyConfig::from_toml(&toml).unwrap();
        assert_eq!(cfg.pip_value, DEFAULT_PIP_VALUE);
    }

    #[test]
    fn news_section_is_optional() {
        let toml = SAMPLE_CONFIG_TOML.replace("[news_avoidance]\nenabled = true\n", "");
        let cfg = StrategyConfig::from_toml(&toml).unwrap();
        assert!(cfg.news_avoidance_enabled);
    }

    #[test]
    fn explicit_flatten_section_overrides_default() {
        let toml = format!(
            "{SAMPLE_CONFIG_TOML}\n[flatten]\ntimezone = \"Europe/London\"\ncutoff = \"16:30\"\n"
        );
        let cfg = StrategyConfig::from_toml(&toml).unwrap();
        assert_eq!(cfg.flatten.timezone, chrono_tz::Europe::London);
        assert_eq!(cfg.flatten.cutoff, NaiveTime::from_hms_opt(16, 30, 0).unwrap());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = StrategyConfig::from_file(Path::new("/nonexistent/breakout.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/breakout.toml"));
    }
}
