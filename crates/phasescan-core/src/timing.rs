//! High-resolution monotonic clock and probe pacing.
//!
//! The Sampler stamps every probe with [`clock_ns`]. Raw counter ticks are
//! read with [`clock_ticks`] and converted to nanoseconds with
//! [`ticks_to_ns`], so callers never see platform tick units.
//!
//! [`calibrate_decay`] measures how closely decay-scaled spin-waits land on
//! their target for every layer and picks the layer with the least jitter.

use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Raw counter
// ---------------------------------------------------------------------------

/// Raw monotonic counter value in platform ticks.
///
/// On macOS this reads `mach_absolute_time()` (24 MHz ticks on Apple Silicon).
/// On Linux it reads `CLOCK_MONOTONIC_RAW`, which is already in nanoseconds.
/// Elsewhere it falls back to `std::time::Instant` relative to a process-local
/// epoch.
#[cfg(target_os = "macos")]
pub fn clock_ticks() -> u64 {
    unsafe extern "C" {
        fn mach_absolute_time() -> u64;
    }
    // SAFETY: mach_absolute_time() is a stable macOS API that returns the
    // current value of the system absolute time counter. Always safe to call.
    unsafe { mach_absolute_time() }
}

#[cfg(target_os = "linux")]
pub fn clock_ticks() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC_RAW is
    // supported on every kernel since 2.6.28.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts) };
    if rc != 0 {
        return instant_ns();
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn clock_ticks() -> u64 {
    instant_ns()
}

#[cfg_attr(target_os = "macos", allow(dead_code))]
fn instant_ns() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Tick conversion
// ---------------------------------------------------------------------------

/// Convert a tick delta from [`clock_ticks`] into nanoseconds.
#[cfg(target_os = "macos")]
pub fn ticks_to_ns(ticks: u64) -> u64 {
    use std::sync::OnceLock;

    #[repr(C)]
    struct MachTimebaseInfo {
        numer: u32,
        denom: u32,
    }
    unsafe extern "C" {
        fn mach_timebase_info(info: *mut MachTimebaseInfo) -> i32;
    }

    static TIMEBASE: OnceLock<(u64, u64)> = OnceLock::new();
    let &(numer, denom) = TIMEBASE.get_or_init(|| {
        let mut info = MachTimebaseInfo { numer: 0, denom: 0 };
        // SAFETY: `info` is a valid out-pointer for the duration of the call.
        let rc = unsafe { mach_timebase_info(&mut info) };
        if rc != 0 || info.denom == 0 {
            (1, 1)
        } else {
            (info.numer as u64, info.denom as u64)
        }
    });
    ((ticks as u128 * numer as u128) / denom as u128) as u64
}

#[cfg(not(target_os = "macos"))]
pub fn ticks_to_ns(ticks: u64) -> u64 {
    ticks
}

/// Current monotonic time in nanoseconds.
#[inline]
pub fn clock_ns() -> u64 {
    ticks_to_ns(clock_ticks())
}

/// Estimate the clock granularity: the smallest nonzero delta observed over
/// a burst of back-to-back reads.
pub fn resolution_ns() -> u64 {
    let mut best = u64::MAX;
    let mut prev = clock_ns();
    for _ in 0..10_000 {
        let now = clock_ns();
        let delta = now.wrapping_sub(prev);
        if delta > 0 && delta < best {
            best = delta;
        }
        prev = now;
    }
    if best == u64::MAX { 0 } else { best }
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Remaining wait below which [`wait_until`] spins instead of sleeping.
const SPIN_THRESHOLD_NS: u64 = 200_000;

/// Block until `clock_ns()` reaches `deadline_ns`.
///
/// Sleeps through the coarse part of the wait and spins for the last
/// [`SPIN_THRESHOLD_NS`] so the next probe starts close to the deadline.
/// Returns immediately when the deadline has already passed.
pub fn wait_until(deadline_ns: u64) {
    loop {
        let now = clock_ns();
        if now >= deadline_ns {
            return;
        }
        let remaining = deadline_ns - now;
        if remaining > SPIN_THRESHOLD_NS {
            std::thread::sleep(Duration::from_nanos(remaining - SPIN_THRESHOLD_NS));
        } else {
            std::hint::spin_loop();
        }
    }
}

// ---------------------------------------------------------------------------
// Decay-scaled waits
// ---------------------------------------------------------------------------

/// Reference wait used by [`calibrate_decay`] when none is given.
pub const DEFAULT_WAIT_TARGET_NS: f64 = 11.0;
/// Spin-waits averaged per layer by [`calibrate_decay`].
pub const DEFAULT_WAITS_PER_LAYER: usize = 50;

/// One decay-scaled spin-wait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpinWait {
    pub target_ns: f64,
    pub actual_ns: f64,
    /// `|actual_ns - target_ns|`.
    pub jitter_ns: f64,
    /// Clock reads taken before the wait ended.
    pub iterations: u64,
    /// `elapsed mod layer_count` at the final read.
    pub layer: usize,
    /// `e^{-alpha * layer}` at the final read.
    pub decay: f64,
}

/// Mean jitter of the waits made for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerJitter {
    pub layer: usize,
    pub decay: f64,
    pub target_ns: f64,
    pub mean_jitter_ns: f64,
}

/// Result of [`calibrate_decay`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecayCalibration {
    pub alpha: f64,
    pub wait_target_ns: f64,
    pub waits_per_layer: usize,
    pub layers: Vec<LayerJitter>,
    /// Layer with the smallest mean jitter (first one on ties).
    pub optimal_layer: usize,
    /// `e^{-alpha * optimal_layer}`.
    pub optimal_decay: f64,
    /// `wait_target_ns * optimal_decay`.
    pub adjusted_wait_ns: f64,
    pub min_jitter_ns: f64,
}

fn check_wait_params(target_ns: f64, alpha: f64, layer_count: usize) -> Result<(), ConfigError> {
    if !alpha.is_finite() || alpha <= 0.0 {
        return Err(ConfigError::InvalidAlpha(alpha));
    }
    if layer_count == 0 {
        return Err(ConfigError::InvalidLayerCount(layer_count));
    }
    if !target_ns.is_finite() || target_ns < 0.0 {
        return Err(ConfigError::InvalidWaitTarget(target_ns));
    }
    Ok(())
}

/// Spin until the elapsed time reaches `target_ns * e^{-alpha * layer}`,
/// where `layer = elapsed mod layer_count` is re-evaluated on every read.
pub fn decayed_spin_wait(
    target_ns: f64,
    alpha: f64,
    layer_count: usize,
) -> Result<SpinWait, ConfigError> {
    check_wait_params(target_ns, alpha, layer_count)?;
    Ok(spin_wait_unchecked(target_ns, alpha, layer_count))
}

fn spin_wait_unchecked(target_ns: f64, alpha: f64, layer_count: usize) -> SpinWait {
    let start = clock_ns();
    let mut iterations = 0u64;
    loop {
        let elapsed = clock_ns().saturating_sub(start);
        iterations += 1;
        let layer = (elapsed % layer_count as u64) as usize;
        let decay = (-alpha * layer as f64).exp();
        if elapsed as f64 >= target_ns * decay {
            let actual_ns = elapsed as f64;
            return SpinWait {
                target_ns,
                actual_ns,
                jitter_ns: (actual_ns - target_ns).abs(),
                iterations,
                layer,
                decay,
            };
        }
        std::hint::spin_loop();
    }
}

/// Index of the smallest value, ignoring NaN. The first index wins on ties.
pub fn min_jitter_layer(jitters: &[f64]) -> Option<usize> {
    jitters
        .iter()
        .enumerate()
        .filter(|(_, j)| !j.is_nan())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// For every layer `0..layer_count`, run `waits_per_layer` spin-waits
/// targeting `wait_target_ns * e^{-alpha * layer}` and average their jitter.
/// The layer with the least mean jitter gives the optimal decay factor.
pub fn calibrate_decay(
    wait_target_ns: f64,
    alpha: f64,
    layer_count: usize,
    waits_per_layer: usize,
) -> Result<DecayCalibration, ConfigError> {
    check_wait_params(wait_target_ns, alpha, layer_count)?;
    if waits_per_layer == 0 {
        return Err(ConfigError::InvalidIterations);
    }

    let layers: Vec<LayerJitter> = (0..layer_count)
        .map(|layer| {
            let decay = (-alpha * layer as f64).exp();
            let target_ns = wait_target_ns * decay;
            let total: f64 = (0..waits_per_layer)
                .map(|_| spin_wait_unchecked(target_ns, alpha, layer_count).jitter_ns)
                .sum();
            let mean_jitter_ns = total / waits_per_layer as f64;
            log::debug!("layer {layer:2}: decay={decay:.6} jitter={mean_jitter_ns:.3} ns");
            LayerJitter {
                layer,
                decay,
                target_ns,
                mean_jitter_ns,
            }
        })
        .collect();

    let jitters: Vec<f64> = layers.iter().map(|l| l.mean_jitter_ns).collect();
    let optimal_layer = min_jitter_layer(&jitters).unwrap_or(0);
    let optimal_decay = layers[optimal_layer].decay;
    let min_jitter_ns = layers[optimal_layer].mean_jitter_ns;
    log::info!("decay calibration: optimal layer {optimal_layer}, decay {optimal_decay:.8}");
    Ok(DecayCalibration {
        alpha,
        wait_target_ns,
        waits_per_layer,
        layers,
        optimal_layer,
        optimal_decay,
        adjusted_wait_ns: wait_target_ns * optimal_decay,
        min_jitter_ns,
    })
}
