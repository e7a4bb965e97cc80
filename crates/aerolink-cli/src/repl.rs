//! REPL – interactive shell for driving the vehicle.
//!
//! Free text is handed to the command executor, which normalizes it against
//! the closed command set ("take off", "move_forward", …). Slash-commands:
//!   /help            – show this list
//!   /status          – vehicle pose and flags
//!   /health          – connection and stream diagnostics
//!   /reconnect [ip]  – re-resolve (or pin) the simulator endpoint
//!   /quit | /exit    – gracefully exit

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aerolink_control::CommandExecutor;
use aerolink_net::Connection;
use aerolink_types::CommandResult;
use colored::Colorize;
use tokio::runtime::Runtime;

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(
    rt: &Runtime,
    shutdown: Arc<AtomicBool>,
    executor: Arc<CommandExecutor>,
    connection: Arc<Connection>,
) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "aerolink>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_whitespace().next().unwrap_or_default() {
            "/help" => cmd_help(),
            "/status" => print_result(&rt.block_on(executor.execute("get_status"))),
            "/health" => cmd_health(rt, &connection, &executor),
            "/reconnect" => cmd_reconnect(rt, &connection, input),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other if other.starts_with('/') => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
            _ => print_result(&rt.block_on(executor.execute(input))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "AeroLink Commands".bold().underline());
    println!("  {}          – vehicle pose and flags", "/status".bold().cyan());
    println!("  {}          – connection diagnostics", "/health".bold().cyan());
    println!("  {}  – re-resolve or pin the endpoint", "/reconnect [ip]".bold().cyan());
    println!("  {}      – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
    println!(
        "  Anything else is treated as a vehicle command, e.g. {}, {}, {}.",
        "initialize".bold(),
        "take off".bold(),
        "move forward".bold()
    );
    println!();
}

fn cmd_health(rt: &Runtime, connection: &Arc<Connection>, executor: &Arc<CommandExecutor>) {
    let connected = connection.is_connected();
    let host = rt.block_on(connection.host());
    println!();
    println!("{}", "Connection Health".bold().underline());
    println!(
        "  Simulator   : {}",
        if connected {
            format!("connected to {}", host.unwrap_or_default()).green()
        } else {
            "not connected".red()
        }
    );
    println!(
        "  Vehicle     : {}",
        if executor.is_initialized() {
            "initialized".green()
        } else {
            "not initialized".yellow()
        }
    );
    println!();
}

fn cmd_reconnect(rt: &Runtime, connection: &Arc<Connection>, input: &str) {
    let host = input.split_whitespace().nth(1);
    print!(
        "  Reconnecting{} … ",
        host.map(|h| format!(" to {h}")).unwrap_or_default()
    );
    io::stdout().flush().ok();

    match rt.block_on(connection.reconnect(host)) {
        Ok(host) => println!("{} ({})", "connected".green(), host.bold()),
        Err(e) => println!("{}: {}", "failed".red(), e),
    }
}

fn print_result(result: &CommandResult) {
    if result.is_success() {
        println!("  {} {}", "✓".green().bold(), result.message);
    } else {
        println!("  {} {}", "✗".red().bold(), result.message.red());
    }
    if let Some(data) = &result.data {
        match serde_json::to_string_pretty(data) {
            Ok(pretty) => {
                for line in pretty.lines() {
                    println!("    {}", line.dimmed());
                }
            }
            Err(_) => println!("    {data}"),
        }
    }
}
