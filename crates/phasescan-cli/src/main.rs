//! CLI for phasescan: timing side-channel characterization through
//! phase-space entropy.

mod commands;

use clap::{ArgAction, Parser, Subcommand};

use commands::parse_u64_arg;

#[derive(Parser)]
#[command(name = "phasescan")]
#[command(about = "phasescan: classify timing-probe candidates by phase-space entropy")]
#[command(version = phasescan_core::VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan candidates with a probe and report entropy-band hits.
    /// Exit status: 0 = at least one hit, 1 = no hits, 2 = configuration error.
    Scan {
        /// JSON config file; flags below override its fields
        #[arg(long)]
        config: Option<String>,

        /// Probe used to time each candidate
        #[arg(long, default_value = "hash", value_parser = ["hash", "stride", "connect", "synthetic"])]
        probe: String,

        /// Address range as start:stride[:count] (hex or decimal)
        #[arg(long)]
        range: Option<String>,

        /// Comma-separated candidate list
        #[arg(long)]
        candidates: Option<String>,

        /// File with one candidate per line
        #[arg(long)]
        candidates_file: Option<String>,

        /// Layer decay coefficient (> 0)
        #[arg(long, allow_negative_numbers = true)]
        alpha: Option<f64>,

        /// Number of weighting layers
        #[arg(long)]
        layers: Option<usize>,

        /// Recorded samples per candidate
        #[arg(long)]
        iterations: Option<usize>,

        /// Lower edge of the hit entropy band, in bits
        #[arg(long, allow_negative_numbers = true)]
        entropy_low: Option<f64>,

        /// Upper edge of the hit entropy band, in bits
        #[arg(long, allow_negative_numbers = true)]
        entropy_high: Option<f64>,

        /// Stop after this many hits
        #[arg(long)]
        max_hits: Option<usize>,

        /// Stop after this many seconds of wall time
        #[arg(long)]
        time_budget_seconds: Option<f64>,

        /// Histogram buckets (default: layer count)
        #[arg(long)]
        bins: Option<usize>,

        /// Rényi order (default: layer count; 1 = Shannon)
        #[arg(long)]
        order: Option<u32>,

        /// Embedding lag (default: layer count)
        #[arg(long)]
        lag: Option<usize>,

        /// Predictor scale factor
        #[arg(long, allow_negative_numbers = true)]
        scale: Option<i64>,

        /// Predictor bit mask (hex or decimal)
        #[arg(long, value_parser = parse_u64_arg)]
        mask: Option<u64>,

        /// Predictor base OR'd into every prediction (hex or decimal)
        #[arg(long, value_parser = parse_u64_arg)]
        base: Option<u64>,

        /// Target interval between probe starts, in microseconds
        #[arg(long)]
        pace_us: Option<u64>,

        /// Skip a candidate after this many consecutive probe failures
        #[arg(long)]
        max_failures: Option<usize>,

        /// Unrecorded warm-up probe calls per candidate
        #[arg(long)]
        warmup: Option<usize>,

        /// Seed for the synthetic probe
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Buffer size in bytes for the stride probe
        #[arg(long, default_value = "4194304")]
        stride_buffer: usize,

        /// Walk an eviction stride before each stride-probe read
        #[arg(long)]
        evict: bool,

        /// Connect-probe timeout in milliseconds
        #[arg(long, default_value = "500")]
        connect_timeout_ms: u64,

        /// Write the JSON report here
        #[arg(long)]
        output_path: Option<String>,
    },

    /// Print the layer weights and cascade sums for (alpha, layers)
    Cascade {
        /// Layer decay coefficient (> 0)
        #[arg(long, default_value_t = phasescan_core::config::DEFAULT_ALPHA, allow_negative_numbers = true)]
        alpha: f64,

        /// Number of weighting layers
        #[arg(long, default_value_t = phasescan_core::config::DEFAULT_LAYERS)]
        layers: usize,
    },

    /// Sample one probe/candidate pair, print timing statistics and
    /// calibrate the decay-scaled wait
    Calibrate {
        /// Probe to calibrate
        #[arg(long, default_value = "hash", value_parser = ["hash", "stride", "connect", "synthetic"])]
        probe: String,

        /// Candidate handed to the probe
        #[arg(long, default_value = "0x0")]
        candidate: String,

        /// Number of samples to record
        #[arg(long, default_value = "1000")]
        iterations: usize,

        /// Unrecorded warm-up calls
        #[arg(long, default_value = "16")]
        warmup: usize,

        /// Target interval between probe starts, in microseconds
        #[arg(long)]
        pace_us: Option<u64>,

        /// Seed for the synthetic probe
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Buffer size in bytes for the stride probe
        #[arg(long, default_value = "4194304")]
        stride_buffer: usize,

        /// Walk an eviction stride before each stride-probe read
        #[arg(long)]
        evict: bool,

        /// Connect-probe timeout in milliseconds
        #[arg(long, default_value = "500")]
        connect_timeout_ms: u64,

        /// Decay coefficient for the wait calibration
        #[arg(long, default_value_t = phasescan_core::config::DEFAULT_ALPHA, allow_negative_numbers = true)]
        alpha: f64,

        /// Layers swept by the wait calibration
        #[arg(long, default_value_t = phasescan_core::config::DEFAULT_LAYERS)]
        layers: usize,

        /// Reference spin-wait in nanoseconds, scaled by e^(-alpha*layer)
        #[arg(long, default_value_t = phasescan_core::timing::DEFAULT_WAIT_TARGET_NS)]
        wait_target_ns: f64,

        /// Spin-waits averaged per layer (0 skips the wait calibration)
        #[arg(long, default_value_t = phasescan_core::timing::DEFAULT_WAITS_PER_LAYER)]
        waits_per_layer: usize,

        /// Write the statistics and raw durations as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// List the built-in probes
    Probes,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            config,
            probe,
            range,
            candidates,
            candidates_file,
            alpha,
            layers,
            iterations,
            entropy_low,
            entropy_high,
            max_hits,
            time_budget_seconds,
            bins,
            order,
            lag,
            scale,
            mask,
            base,
            pace_us,
            max_failures,
            warmup,
            seed,
            stride_buffer,
            evict,
            connect_timeout_ms,
            output_path,
        } => {
            let code = commands::scan::run(commands::scan::ScanCommandConfig {
                config_path: config.as_deref(),
                probe: &probe,
                range: range.as_deref(),
                candidates: candidates.as_deref(),
                candidates_file: candidates_file.as_deref(),
                overrides: commands::ConfigOverrides {
                    alpha,
                    layers,
                    iterations,
                    entropy_low,
                    entropy_high,
                    max_hits,
                    time_budget_seconds,
                    bins,
                    order,
                    lag,
                    scale,
                    mask,
                    base,
                    pace_us,
                    max_failures,
                    warmup,
                },
                probe_options: commands::ProbeOptions {
                    seed,
                    stride_buffer,
                    evict,
                    connect_timeout_ms,
                },
                output_path: output_path.as_deref(),
            });
            std::process::exit(code);
        }
        Commands::Cascade { alpha, layers } => {
            let code = commands::cascade::run(alpha, layers);
            std::process::exit(code);
        }
        Commands::Calibrate {
            probe,
            candidate,
            iterations,
            warmup,
            pace_us,
            seed,
            stride_buffer,
            evict,
            connect_timeout_ms,
            alpha,
            layers,
            wait_target_ns,
            waits_per_layer,
            output,
        } => {
            let code = commands::calibrate::run(commands::calibrate::CalibrateCommandConfig {
                probe: &probe,
                candidate: &candidate,
                iterations,
                warmup,
                pace_us,
                probe_options: commands::ProbeOptions {
                    seed,
                    stride_buffer,
                    evict,
                    connect_timeout_ms,
                },
                alpha,
                layers,
                wait_target_ns,
                waits_per_layer,
                output_path: output.as_deref(),
            });
            std::process::exit(code);
        }
        Commands::Probes => commands::probes::run(),
    }
}
