//! Boundary report: the document a scan produces.
//!
//! A [`BoundaryReport`] holds run metadata and the ordered list of
//! [`CandidateRecord`]s classified as hits. Records are appended by the
//! scanner only and never modified afterwards. The report serializes to
//! JSON for external tooling.
//!
//! ```text
//! {
//!   "run":  { "alpha": ..., "layer_count": ..., "exit_reason": "hit_budget", ... },
//!   "hits": [ { "candidate_id": ..., "entropy": ..., "signature": ... }, ... ],
//!   "aggregate_offset": ...
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex characters kept from the signature digest.
pub const SIGNATURE_HEX_LEN: usize = 16;

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The configured number of hits was reached.
    HitBudget,
    /// The wall-clock budget ran out.
    TimeBudget,
    /// The candidate sequence ended.
    Exhausted,
    /// An external cancellation signal was observed.
    Cancelled,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HitBudget => write!(f, "hit_budget"),
            Self::TimeBudget => write!(f, "time_budget"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A candidate classified as a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candidate_id: String,
    pub entropy: f64,
    pub mean_angle: f64,
    pub layer_energy: f64,
    pub predicted_offset: u64,
    pub signature: String,
}

impl CandidateRecord {
    /// Build a record, deriving its signature from the measured values.
    pub fn new(
        candidate_id: impl Into<String>,
        entropy: f64,
        mean_angle: f64,
        layer_energy: f64,
        predicted_offset: u64,
    ) -> Self {
        let candidate_id = candidate_id.into();
        let signature = signature(&candidate_id, entropy, layer_energy);
        Self {
            candidate_id,
            entropy,
            mean_angle,
            layer_energy,
            predicted_offset,
            signature,
        }
    }
}

/// First [`SIGNATURE_HEX_LEN`] hex chars of
/// `SHA-256(id ‖ entropy_le ‖ layer_energy_le)`.
///
/// A dedup key for reports, nothing more.
pub fn signature(candidate_id: &str, entropy: f64, layer_energy: f64) -> String {
    let mut h = Sha256::new();
    h.update(candidate_id.as_bytes());
    h.update(entropy.to_le_bytes());
    h.update(layer_energy.to_le_bytes());
    let digest: [u8; 32] = h.finalize().into();
    let mut s = hex_encode(&digest);
    s.truncate(SIGNATURE_HEX_LEN);
    s
}

/// Run metadata stored alongside the hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub id: String,
    pub started_at: String,
    pub alpha: f64,
    pub layer_count: usize,
    pub iterations_per_candidate: usize,
    pub entropy_band: [f64; 2],
    pub bins: usize,
    pub order: u32,
    pub lag: usize,
    pub max_hits: usize,
    pub time_budget_secs: Option<f64>,
    pub exit_reason: ExitReason,
    pub elapsed_ms: u64,
    pub candidates_scanned: u64,
    pub candidates_skipped: u64,
    pub probe_failures: u64,
    pub phasescan_version: String,
}

/// Ordered, append-only list of hits plus run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryReport {
    pub run: RunMeta,
    hits: Vec<CandidateRecord>,
    /// Energy-weighted aggregate of all hit offsets, when there are hits.
    pub aggregate_offset: Option<u64>,
}

impl BoundaryReport {
    pub(crate) fn new(run: RunMeta) -> Self {
        Self {
            run,
            hits: Vec::new(),
            aggregate_offset: None,
        }
    }

    pub(crate) fn push(&mut self, record: CandidateRecord) {
        self.hits.push(record);
    }

    pub fn hits(&self) -> &[CandidateRecord] {
        &self.hits
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("failed to parse report JSON: {e}"),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Hex-encode bytes without any separator.
fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Current wall-clock time as an ISO-8601 UTC timestamp.
pub(crate) fn now_iso8601() -> String {
    format_iso8601(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default(),
    )
}

/// Format a duration-since-epoch as `YYYY-MM-DDTHH:MM:SSZ`.
fn format_iso8601(since_epoch: Duration) -> String {
    let secs = since_epoch.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
