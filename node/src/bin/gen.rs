use clap::Parser;
use rand::Rng;

/// Emits a random or explicit `n t` header plus one random input bit per
/// honest node, in the format the simulation binary reads on stdin.
#[derive(Parser, Debug)]
struct Args {
    /// Process count; random in 4..=13 when omitted.
    n: Option<usize>,
    /// Fault bound; random in 0..=(n-1)/3 when omitted.
    t: Option<usize>,
}

fn main() {
    let args = Args::parse();
    let mut rng = rand::thread_rng();

    let num_nodes = args.n.unwrap_or_else(|| rng.gen_range(4..=13));
    let max_faults = num_nodes.saturating_sub(1) / 3;
    let num_faults = args.t.unwrap_or_else(|| {
        if max_faults > 0 {
            rng.gen_range(0..=max_faults)
        } else {
            0
        }
    });

    println!("{} {}", num_nodes, num_faults);

    let honest = num_nodes - num_faults;
    let bits: Vec<String> = (0..honest)
        .map(|_| rng.gen_range(0..=1u8).to_string())
        .collect();
    println!("{}", bits.join(" "));
}
