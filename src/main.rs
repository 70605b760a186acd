// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The launcher (distilled spec §6/C10): `water <path> [--debug]`. Drives
//! loader → engine and, in DEBUG mode, prints the final operand-stack and
//! call-stack state after the loop exits.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use water_vm::loader::Program;
use water_vm::runtime::Runtime;

/// Runs a `.water` bytecode program.
#[derive(Parser, Debug)]
#[command(name = "water", author, version, about, long_about = None)]
struct Args {
    /// Path to the `.water` instruction file to run.
    path: std::path::PathBuf,

    /// Print the final operand-stack and call-stack state to stderr after
    /// the program terminates (distilled spec §6, DEBUG mode).
    #[arg(short, long)]
    debug: bool,

    /// `tracing-subscriber` filter directive, e.g. `info` or
    /// `water_vm=debug`. Falls back to `RUST_LOG` if set, then `warn`.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let program = match Program::load(&args.path) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("water: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = Runtime::with_program(program.clone());
    match water_vm::engine::execute(&program, runtime) {
        Ok(outcome) => {
            if args.debug {
                print_debug_state(&outcome);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let pc_suffix = err.pc().map(|pc| format!(" (pc {pc})")).unwrap_or_default();
            eprintln!("water: {err}{pc_suffix}");
            ExitCode::FAILURE
        }
    }
}

fn print_debug_state(outcome: &water_vm::engine::RunOutcome) {
    eprintln!("--- operand stack ({} value(s), top last) ---", outcome.stack.len());
    for value in outcome.stack.snapshot() {
        eprintln!("  {value:?}");
    }
    eprintln!(
        "--- call stack ({} frame(s), root first) ---",
        outcome.call_stack.depth()
    );
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
