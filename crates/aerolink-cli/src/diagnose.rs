//! `aerolink diagnose` – probe every candidate simulator address.
//!
//! Mirrors what the resolver does at connect time, but reports each
//! candidate individually so an operator can see *why* autodetection picked
//! (or failed to pick) an address, and what to pin in the config.

use std::io::Write;
use std::time::Duration;

use aerolink_net::test_connectivity;
use colored::Colorize;

use crate::config::Config;

pub fn run(cfg: &Config) {
    println!();
    println!("{}", "Simulator Connectivity Diagnostics".bold().underline());

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Runtime error".red(), e);
            return;
        }
    };

    let resolver = cfg.resolver();
    let timeout = Duration::from_secs(cfg.probe_timeout_secs);
    let mut reachable: Vec<String> = Vec::new();

    for host in resolver.candidate_addresses() {
        print!("  {}:{} … ", host.bold(), cfg.sim_port);
        std::io::stdout().flush().ok();
        if rt.block_on(test_connectivity(&host, cfg.sim_port, timeout)) {
            println!("{}", "reachable".green());
            reachable.push(host);
        } else {
            println!("{}", "no answer".red());
        }
    }

    println!();
    match reachable.first() {
        Some(host) => {
            println!(
                "  {} {} candidate(s) answered. Pin the first with:",
                "✓".green().bold(),
                reachable.len()
            );
            println!("    export AEROLINK_SIM_HOST={}", host.bold());
            println!("  or set {} in ~/.aerolink/config.toml", format!("sim_host = \"{host}\"").bold());
        }
        None => {
            println!("{}", "  No candidate answered. Check that:".yellow());
            println!("  1. The simulator is running on the host side.");
            println!(
                "  2. The host firewall allows inbound TCP on port {}.",
                cfg.sim_port
            );
            println!("  3. The host's actual address is pinned via AEROLINK_SIM_HOST.");
        }
    }
    println!();
}
