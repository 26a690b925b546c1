pub mod calibrate;
pub mod cascade;
pub mod probes;
pub mod scan;

use std::path::Path;
use std::time::Duration;

use phasescan_core::candidates::{self, AddressRange, Candidate};
use phasescan_core::{
    ConfigError, ConnectProbe, HashProbe, Probe, ScanConfig, StrideProbe, SyntheticProbe,
};

/// `cascade` / `calibrate` finished normally.
pub const EXIT_OK: i32 = 0;
/// `scan` completed with at least one hit.
pub const EXIT_HITS: i32 = 0;
/// `scan` completed with zero hits.
pub const EXIT_NO_HITS: i32 = 1;
/// `calibrate` recorded no successful probe calls.
pub const EXIT_NO_SAMPLES: i32 = 1;
/// Could not run: bad configuration or I/O failure.
pub const EXIT_CONFIG: i32 = 2;

/// clap value parser for hex (`0x...`) or decimal integers.
pub fn parse_u64_arg(s: &str) -> Result<u64, String> {
    candidates::parse_u64(s).ok_or_else(|| format!("'{s}' is not a decimal or 0x-hex integer"))
}

/// Command-line overrides applied on top of a config file or the defaults.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub alpha: Option<f64>,
    pub layers: Option<usize>,
    pub iterations: Option<usize>,
    pub entropy_low: Option<f64>,
    pub entropy_high: Option<f64>,
    pub max_hits: Option<usize>,
    pub time_budget_seconds: Option<f64>,
    pub bins: Option<usize>,
    pub order: Option<u32>,
    pub lag: Option<usize>,
    pub scale: Option<i64>,
    pub mask: Option<u64>,
    pub base: Option<u64>,
    pub pace_us: Option<u64>,
    pub max_failures: Option<usize>,
    pub warmup: Option<usize>,
}

/// Load `config_path` (or the defaults) and apply `overrides`.
///
/// The result is not validated here; the scanner does that before probing.
pub fn build_config(
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
) -> Result<ScanConfig, ConfigError> {
    let mut cfg = match config_path {
        Some(p) => ScanConfig::from_path(Path::new(p))?,
        None => ScanConfig::default(),
    };
    let o = overrides;
    if let Some(v) = o.alpha {
        cfg.alpha = v;
    }
    if let Some(v) = o.layers {
        cfg.layer_count = v;
    }
    if let Some(v) = o.iterations {
        cfg.iterations = v;
    }
    if let Some(v) = o.entropy_low {
        cfg.entropy_band[0] = v;
    }
    if let Some(v) = o.entropy_high {
        cfg.entropy_band[1] = v;
    }
    if let Some(v) = o.max_hits {
        cfg.max_hits = v;
    }
    if o.time_budget_seconds.is_some() {
        cfg.time_budget_secs = o.time_budget_seconds;
    }
    if o.bins.is_some() {
        cfg.bins = o.bins;
    }
    if o.order.is_some() {
        cfg.order = o.order;
    }
    if o.lag.is_some() {
        cfg.lag = o.lag;
    }
    if let Some(v) = o.scale {
        cfg.predictor.scale = v;
    }
    if let Some(v) = o.mask {
        cfg.predictor.mask = v;
    }
    if let Some(v) = o.base {
        cfg.predictor.base = v;
    }
    if o.pace_us.is_some() {
        cfg.sampler.pace_us = o.pace_us;
    }
    if let Some(v) = o.max_failures {
        cfg.sampler.max_consecutive_failures = v;
    }
    if let Some(v) = o.warmup {
        cfg.sampler.warmup = v;
    }
    Ok(cfg)
}

/// Probe construction knobs shared by `scan` and `calibrate`.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub seed: u64,
    pub stride_buffer: usize,
    pub evict: bool,
    pub connect_timeout_ms: u64,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            stride_buffer: 4 << 20,
            evict: false,
            connect_timeout_ms: 500,
        }
    }
}

/// Build a built-in probe by name.
pub fn make_probe(name: &str, opts: &ProbeOptions) -> Result<Box<dyn Probe<Candidate>>, String> {
    match name {
        "hash" => Ok(Box::new(HashProbe::default())),
        "stride" => Ok(Box::new(StrideProbe::new(opts.stride_buffer, opts.evict))),
        "connect" => Ok(Box::new(ConnectProbe::new(Duration::from_millis(
            opts.connect_timeout_ms,
        )))),
        "synthetic" => Ok(Box::new(SyntheticProbe::new(opts.seed))),
        other => Err(format!("unknown probe '{other}'")),
    }
}

/// Resolve exactly one candidate source into a lazy sequence.
pub fn build_candidates(
    range: Option<&str>,
    list: Option<&str>,
    file: Option<&str>,
) -> Result<Box<dyn Iterator<Item = Candidate>>, ConfigError> {
    let given = [range.is_some(), list.is_some(), file.is_some()]
        .iter()
        .filter(|&&b| b)
        .count();
    if given != 1 {
        return Err(ConfigError::InvalidCandidates(
            "give exactly one of --range, --candidates, --candidates-file".to_string(),
        ));
    }
    if let Some(r) = range {
        let range = AddressRange::parse(r)?;
        return Ok(Box::new(range.map(Candidate::Address)));
    }
    if let Some(l) = list {
        return Ok(Box::new(candidates::parse_list(l).into_iter()));
    }
    let path = file.unwrap_or_default();
    Ok(Box::new(candidates::from_file(Path::new(path))?.into_iter()))
}
