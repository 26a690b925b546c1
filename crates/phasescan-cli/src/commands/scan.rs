use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use phasescan_core::{BoundaryReport, BoundaryScanner};

use super::{
    ConfigOverrides, EXIT_CONFIG, EXIT_HITS, EXIT_NO_HITS, ProbeOptions, build_candidates,
    build_config, make_probe,
};

pub struct ScanCommandConfig<'a> {
    pub config_path: Option<&'a str>,
    pub probe: &'a str,
    pub range: Option<&'a str>,
    pub candidates: Option<&'a str>,
    pub candidates_file: Option<&'a str>,
    pub overrides: ConfigOverrides,
    pub probe_options: ProbeOptions,
    pub output_path: Option<&'a str>,
}

/// 0 when the report has hits, 1 when it is empty.
pub fn exit_code(report: &BoundaryReport) -> i32 {
    if report.is_empty() {
        EXIT_NO_HITS
    } else {
        EXIT_HITS
    }
}

pub fn run(cfg: ScanCommandConfig<'_>) -> i32 {
    let config = match build_config(cfg.config_path, &cfg.overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG;
        }
    };
    let scanner = match BoundaryScanner::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: invalid configuration: {e}");
            return EXIT_CONFIG;
        }
    };
    let candidates = match build_candidates(cfg.range, cfg.candidates, cfg.candidates_file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG;
        }
    };
    let mut probe = match make_probe(cfg.probe, &cfg.probe_options) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG;
        }
    };

    // Ctrl+C stops the scan after the in-flight candidate.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }
    let mut scanner = scanner.with_running(running);

    let c = scanner.config();
    println!("Boundary scan");
    println!("  Probe:       {}", cfg.probe);
    println!("  Alpha:       {}", c.alpha);
    println!("  Layers:      {}", c.layer_count);
    println!("  Iterations:  {}", c.iterations);
    println!(
        "  Band:        [{}, {}] bits (bins {}, order {}, lag {})",
        c.entropy_band[0],
        c.entropy_band[1],
        c.bins(),
        c.order(),
        c.lag()
    );
    println!("  Max hits:    {}", c.max_hits);
    if let Some(t) = c.time_budget_secs {
        println!("  Time budget: {t}s");
    }
    println!();

    let report = scanner.scan(candidates, probe.as_mut());
    print_report(&report);

    if let Some(path) = cfg.output_path {
        if let Err(e) = report.write_json(Path::new(path)) {
            eprintln!("Error writing report to {path}: {e}");
            return EXIT_CONFIG;
        }
        println!("\nReport written to {path}");
    }

    exit_code(&report)
}

fn print_report(report: &BoundaryReport) {
    if report.is_empty() {
        println!("No candidates fell inside the entropy band.");
    } else {
        println!(
            "  {:>3}  {:<24} {:>9} {:>11} {:>18}  {:<16}",
            "#", "Candidate", "Entropy", "MeanAngle", "Offset", "Signature"
        );
        println!("  {}", "-".repeat(88));
        for (i, hit) in report.hits().iter().enumerate() {
            println!(
                "  {:>3}  {:<24} {:>9.4} {:>11.6} {:>#18x}  {:<16}",
                i + 1,
                hit.candidate_id,
                hit.entropy,
                hit.mean_angle,
                hit.predicted_offset,
                hit.signature
            );
        }
    }

    let run = &report.run;
    println!();
    println!("  Run:         {}", run.id);
    println!("  Exit:        {}", run.exit_reason);
    println!(
        "  Candidates:  {} scanned, {} skipped, {} probe failures",
        run.candidates_scanned, run.candidates_skipped, run.probe_failures
    );
    println!("  Hits:        {}", report.hit_count());
    if let Some(agg) = report.aggregate_offset {
        println!("  Aggregate:   {agg:#x}");
    }
    println!("  Elapsed:     {:.3}s", run.elapsed_ms as f64 / 1000.0);
}
