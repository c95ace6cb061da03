use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{ensure, Context as _, Result};
use clap::Parser;
use types::Replica;

use node::launch_cluster;

/// Asynchronous Byzantine Agreement simulation over an in-process bus.
/// Reads `n t` followed by n-t input bits on stdin and prints the decided
/// bits of every honest node.
#[derive(Parser, Debug)]
struct Args {
    /// Disable logs and print only the result line.
    #[arg(long)]
    silent: bool,
}

/// Cluster parameters parsed from the driver's stdin.
#[derive(Debug, PartialEq, Eq)]
struct RunConfig {
    num_nodes: usize,
    num_faults: usize,
    inputs: Vec<u8>,
}

/// Whitespace-tolerant parse of `n t` plus n-t bits. A missing bit is not
/// fatal; it defaults to 0 with a warning, so a truncated input file still
/// produces a run.
fn parse_run_config(input: &str) -> Result<RunConfig> {
    let mut tokens = input.split_whitespace();

    let num_nodes: usize = tokens
        .next()
        .context("missing process count")?
        .parse()
        .context("invalid process count")?;
    let num_faults: usize = tokens
        .next()
        .context("missing fault bound")?
        .parse()
        .context("invalid fault bound")?;
    ensure!(
        num_nodes > 3 * num_faults,
        "resilience requires n > 3t, got n={} t={}",
        num_nodes,
        num_faults
    );

    let honest = num_nodes - num_faults;
    let mut inputs = Vec::with_capacity(honest);
    for id in 1..=honest {
        match tokens.next().and_then(|tok| tok.parse::<u8>().ok()) {
            Some(bit) => inputs.push(if bit > 0 { 1 } else { 0 }),
            None => {
                log::warn!(target: "main", "input for node {} missing, defaulting to 0", id);
                inputs.push(0);
            }
        }
    }

    Ok(RunConfig {
        num_nodes,
        num_faults,
        inputs,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.silent {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    } else {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .init();
    }

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    let config = parse_run_config(&input)?;
    let honest = config.num_nodes - config.num_faults;

    log::info!(
        target: "main",
        "starting ABA simulation, n={} t={}",
        config.num_nodes, config.num_faults
    );

    let (exits, mut decisions) =
        launch_cluster(config.num_nodes, config.num_faults, &config.inputs);

    let mut results: BTreeMap<Replica, u8> = BTreeMap::new();
    while results.len() < honest {
        let (id, bit) = decisions
            .recv()
            .await
            .context("a node stopped before deciding")?;
        log::info!(target: "main", "node {} decided {}", id, bit);
        results.insert(id, bit);
    }

    // Every honest node has decided (and therefore broadcast its own
    // Complete); the relays have done their job and the nodes can go.
    for exit in exits {
        let _ = exit.send(());
    }

    print!("RESULTS:");
    for bit in results.values() {
        print!(" {}", bit);
    }
    println!();
    Ok(())
}
