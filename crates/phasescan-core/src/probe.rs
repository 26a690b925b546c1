//! The probe seam and the built-in probes.
//!
//! A probe is the only code that touches a target. It is handed one
//! candidate at a time and returns how long one interaction took, or a
//! [`ProbeError`]. Any `FnMut(&C) -> Result<Duration, ProbeError>` is a probe,
//! so embedding applications can plug in their own measurement without
//! implementing the trait by hand.
//!
//! Built-in probes only time work on resources the process owns (a local
//! buffer, a hash computation) or an ordinary TCP connect.

use std::fmt::Display;
use std::hint::black_box;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::candidates::Candidate;
use crate::error::ProbeError;
use crate::timing::clock_ns;

/// Measures one interaction with a candidate.
pub trait Probe<C: ?Sized> {
    /// Run one timed interaction with `target`.
    fn measure(&mut self, target: &C) -> Result<Duration, ProbeError>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}

impl<C: ?Sized, F> Probe<C> for F
where
    F: FnMut(&C) -> Result<Duration, ProbeError>,
{
    fn measure(&mut self, target: &C) -> Result<Duration, ProbeError> {
        self(target)
    }
}

/// Static description of a built-in probe.
#[derive(Debug, Clone)]
pub struct ProbeInfo {
    /// Unique identifier (e.g. `"stride"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// What timing variation the probe exposes.
    pub mechanism: &'static str,
}

/// Metadata for every built-in probe.
pub fn builtin_probes() -> &'static [ProbeInfo] {
    &[
        HASH_PROBE_INFO,
        STRIDE_PROBE_INFO,
        CONNECT_PROBE_INFO,
        SYNTHETIC_PROBE_INFO,
    ]
}

fn candidate_digest(target: &impl Display) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(target.to_string().as_bytes());
    h.finalize().into()
}

fn digest_u64(digest: &[u8; 32]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(b)
}

// ---------------------------------------------------------------------------
// Hash probe
// ---------------------------------------------------------------------------

const HASH_PROBE_INFO: ProbeInfo = ProbeInfo {
    name: "hash",
    description: "SHA-256 over the candidate identifier",
    mechanism: "Times a fixed number of chained SHA-256 compressions seeded by \
                the candidate id. Variation comes from pipeline state, cache \
                residency of the hash tables and frequency scaling.",
};

/// Times `rounds` chained SHA-256 digests of the candidate's identifier.
#[derive(Debug, Clone)]
pub struct HashProbe {
    rounds: usize,
}

impl HashProbe {
    pub fn new(rounds: usize) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }
}

impl Default for HashProbe {
    fn default() -> Self {
        Self::new(16)
    }
}

impl<C: Display + ?Sized> Probe<C> for HashProbe {
    fn measure(&mut self, target: &C) -> Result<Duration, ProbeError> {
        let seed = target.to_string();
        let t0 = clock_ns();
        let mut state: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        for _ in 1..self.rounds {
            state = Sha256::digest(state).into();
        }
        let t1 = clock_ns();
        black_box(state);
        Ok(Duration::from_nanos(t1.saturating_sub(t0)))
    }

    fn name(&self) -> &'static str {
        HASH_PROBE_INFO.name
    }
}

// ---------------------------------------------------------------------------
// Stride probe
// ---------------------------------------------------------------------------

const STRIDE_PROBE_INFO: ProbeInfo = ProbeInfo {
    name: "stride",
    description: "Cache-line read inside a locally owned buffer",
    mechanism: "Maps the candidate to a cache line of a private buffer, \
                optionally walks an eviction stride over the rest of the \
                buffer, then times a single read of that line. Exposes \
                cache and TLB residency effects.",
};

const CACHE_LINE: usize = 64;

/// Times one cache-line read at `candidate % buffer_len` in a private buffer.
#[derive(Debug, Clone)]
pub struct StrideProbe {
    buffer: Vec<u8>,
    evict: bool,
}

impl StrideProbe {
    /// `buffer_len` is rounded up to a whole number of cache lines.
    pub fn new(buffer_len: usize, evict: bool) -> Self {
        let len = buffer_len.max(CACHE_LINE).div_ceil(CACHE_LINE) * CACHE_LINE;
        let buffer = (0..len).map(|i| (i % 251) as u8).collect();
        Self { buffer, evict }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    fn line_offset(&self, key: u64) -> usize {
        let len = self.buffer.len() as u64;
        ((key % len) as usize) & !(CACHE_LINE - 1)
    }

    fn read_line(&self, offset: usize) -> Duration {
        if self.evict {
            let mut acc = 0u8;
            for i in (0..self.buffer.len()).step_by(CACHE_LINE) {
                if i != offset {
                    acc ^= self.buffer[i];
                }
            }
            black_box(acc);
        }
        let t0 = clock_ns();
        let v = black_box(self.buffer[offset]);
        let t1 = clock_ns();
        black_box(v);
        Duration::from_nanos(t1.saturating_sub(t0))
    }
}

impl Default for StrideProbe {
    fn default() -> Self {
        Self::new(4 << 20, false)
    }
}

impl Probe<u64> for StrideProbe {
    fn measure(&mut self, target: &u64) -> Result<Duration, ProbeError> {
        Ok(self.read_line(self.line_offset(*target)))
    }

    fn name(&self) -> &'static str {
        STRIDE_PROBE_INFO.name
    }
}

impl Probe<Candidate> for StrideProbe {
    fn measure(&mut self, target: &Candidate) -> Result<Duration, ProbeError> {
        let key = match target {
            Candidate::Address(addr) => *addr,
            Candidate::Name(_) => digest_u64(&candidate_digest(target)),
        };
        Ok(self.read_line(self.line_offset(key)))
    }

    fn name(&self) -> &'static str {
        STRIDE_PROBE_INFO.name
    }
}

// ---------------------------------------------------------------------------
// Connect probe
// ---------------------------------------------------------------------------

const CONNECT_PROBE_INFO: ProbeInfo = ProbeInfo {
    name: "connect",
    description: "TCP connect round-trip to a host:port candidate",
    mechanism: "Times a full TCP handshake to the candidate endpoint. \
                Captures network RTT jitter, listener backlog and \
                scheduling effects on both ends.",
};

/// Times a TCP connect to a `host:port` candidate.
#[derive(Debug, Clone)]
pub struct ConnectProbe {
    timeout: Duration,
}

impl ConnectProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ConnectProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl<C: Display + ?Sized> Probe<C> for ConnectProbe {
    fn measure(&mut self, target: &C) -> Result<Duration, ProbeError> {
        let endpoint = target.to_string();
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|e| ProbeError::Unsupported(format!("{endpoint}: {e}")))?
            .next()
            .ok_or_else(|| ProbeError::Unsupported(format!("{endpoint}: no address")))?;

        let t0 = clock_ns();
        let result = TcpStream::connect_timeout(&addr, self.timeout);
        let t1 = clock_ns();
        match result {
            Ok(stream) => {
                drop(stream);
                Ok(Duration::from_nanos(t1.saturating_sub(t0)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(ProbeError::Timeout),
            Err(e) => Err(ProbeError::Io(e)),
        }
    }

    fn name(&self) -> &'static str {
        CONNECT_PROBE_INFO.name
    }
}

// ---------------------------------------------------------------------------
// Synthetic probe
// ---------------------------------------------------------------------------

const SYNTHETIC_PROBE_INFO: ProbeInfo = ProbeInfo {
    name: "synthetic",
    description: "Seeded simulated timings, no real measurement",
    mechanism: "Draws durations from a seeded generator. Each candidate gets \
                its own base latency, jitter spread and periodic component \
                derived from a digest of its id, so runs are reproducible.",
};

/// Reproducible simulated timings for dry runs and tests.
#[derive(Debug, Clone)]
pub struct SyntheticProbe {
    rng: StdRng,
    failure_rate: f64,
    calls: u64,
}

impl SyntheticProbe {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            failure_rate: 0.0,
            calls: 0,
        }
    }

    /// Fraction of calls, in `[0, 1]`, that fail with `ProbeError::Failed`.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

impl<C: Display + ?Sized> Probe<C> for SyntheticProbe {
    fn measure(&mut self, target: &C) -> Result<Duration, ProbeError> {
        self.calls += 1;
        if self.failure_rate > 0.0 && self.rng.random_bool(self.failure_rate) {
            return Err(ProbeError::Failed("synthetic failure".to_string()));
        }
        let profile = digest_u64(&candidate_digest(&target));
        let base = 200.0 + (profile % 800) as f64;
        let spread = 1.0 + ((profile >> 16) % 400) as f64;
        let period = 2 + (profile >> 32) % 31;
        let phase = (self.calls % period) as f64 / period as f64;
        let periodic = spread * 0.5 * (std::f64::consts::TAU * phase).sin();
        let jitter = spread * self.rng.random::<f64>();
        let ns = (base + periodic + jitter).max(1.0);
        Ok(Duration::from_nanos(ns as u64))
    }

    fn name(&self) -> &'static str {
        SYNTHETIC_PROBE_INFO.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
