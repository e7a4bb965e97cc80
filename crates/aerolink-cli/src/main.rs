//! `aerolink-cli` – AeroLink command line interface.
//!
//! This binary is the entry point for the AeroLink stack. It:
//!
//! 1. Initialises structured logging (plus optional OTLP span export).
//! 2. Loads `~/.aerolink/config.toml`, writing defaults on first run.
//! 3. Resolves the simulator endpoint and connects (best-effort — the REPL
//!    can `/reconnect` later).
//! 4. Starts the HTTP control API (`/command`, `/video_feed`) in the
//!    background.
//! 5. Drops the user into an interactive REPL, with **Ctrl-C** intercepted
//!    for a clean exit.
//!
//! `aerolink diagnose` probes every candidate simulator address and exits.
//!
//! Sessions are opened through the in-process simulation transport
//! ([`StubFactory`]); a production RPC transport plugs in by implementing
//! [`aerolink_rpc::SimClientFactory`].

mod config;
mod diagnose;
mod repl;
mod telemetry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aerolink_control::CommandExecutor;
use aerolink_net::Connection;
use aerolink_rpc::StubFactory;
use aerolink_server::ApiServer;
use colored::Colorize;
use tracing::{error, warn};

fn main() {
    // Tracing first; the OTel exporter must be wired before the Tokio
    // runtime exists.
    let _telemetry = telemetry::init_tracing("aerolink");

    let args: Vec<String> = std::env::args().skip(1).collect();

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  First run – defaults written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Could not write config".yellow(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            config::Config::default()
        }
    };

    if args.first().map(String::as_str) == Some("diagnose") {
        diagnose::run(&cfg);
        return;
    }

    // ── Shared shutdown flag + Ctrl-C ─────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return;
        }
    };

    // ── Simulator connection ──────────────────────────────────────────────
    let connection = Arc::new(Connection::new(cfg.resolver(), StubFactory::new()));
    print!("  Resolving simulator endpoint … ");
    match rt.block_on(connection.resolve_and_connect()) {
        Ok(host) => println!("{} ({})", "connected".green(), host.bold()),
        Err(e) => {
            println!("{}", "failed".red());
            println!(
                "  {}  Use {} once the simulator is up, or run {}.",
                e.to_string().dimmed(),
                "/reconnect".bold(),
                "aerolink diagnose".bold()
            );
        }
    }

    let executor = Arc::new(CommandExecutor::new(Arc::clone(&connection)));

    // ── HTTP control API ──────────────────────────────────────────────────
    let server = ApiServer::new(Arc::clone(&connection), Arc::clone(&executor))
        .with_port(cfg.server_port);
    println!(
        "  Control API on {}  (video feed: {})",
        format!("http://localhost:{}", cfg.server_port).bold(),
        format!("http://localhost:{}/video_feed", cfg.server_port).dimmed()
    );
    rt.spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "control API server exited");
        }
    });

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&rt, shutdown, executor, connection);
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___              __   _      __  "#.bold().cyan());
    println!("{}", r#"  / _ | ___ _______/ /  (_)__  / /__"#.bold().cyan());
    println!("{}", r#" / __ |/ -_) __/ _ \ /__/ / _ \/  '_/"#.bold().cyan());
    println!("{}", r#"/_/ |_|\__/_/  \___/____/_//_/_/\_\ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "AeroLink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Simulator Connection & Command Resilience Layer");
    println!();
}
