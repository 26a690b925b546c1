use phasescan_core::LayerWeights;
use phasescan_core::weighting::{
    cascade_closed_form, cascade_energy, cascade_integral, cascade_sum,
};

use super::{EXIT_CONFIG, EXIT_OK};

pub fn run(alpha: f64, layers: usize) -> i32 {
    let weights = match LayerWeights::new(alpha, layers) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG;
        }
    };

    println!("Layer weights  (alpha = {alpha}, L = {layers})\n");
    println!("  {:>5}  {:>12}", "Layer", "Weight");
    for (d, w) in weights.as_slice().iter().enumerate() {
        println!("  {d:>5}  {w:>12.8}");
    }

    println!();
    println!(
        "  Direct sum  d=0..L-1       {:>12.6}",
        cascade_sum(alpha, layers)
    );
    println!(
        "  Closed form (geometric)    {:>12.6}",
        cascade_closed_form(alpha, layers)
    );
    println!(
        "  Integral    (1-e^-aL)/a    {:>12.6}",
        cascade_integral(alpha, layers)
    );
    println!(
        "  Cascade energy d=1..L      {:>12.6}",
        cascade_energy(alpha, layers)
    );
    EXIT_OK
}
