use phasescan_core::builtin_probes;

pub fn run() {
    let probes = builtin_probes();
    println!("{} built-in probe(s):\n", probes.len());
    for info in probes {
        println!("  {:<12} {}", info.name, info.description);
    }
    println!();
    for info in probes {
        println!("{}:", info.name);
        println!("  {}\n", info.mechanism);
    }
}
