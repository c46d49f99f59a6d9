// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! vram-pressure entry point.
//!
//! ## CLI Subcommands
//!
//! - `vram-pressure` or `vram-pressure run` - Run the helper (default)
//! - `vram-pressure status` - Print the shared record
//! - `vram-pressure set ...` - Write budgets, priorities and heap toggles
//! - `vram-pressure stop` - Ask the helper to exit
//! - `vram-pressure health` - Full health check (exit 0/1)
//! - `vram-pressure live` - Liveness check (exit 0/1)

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use vram_pressure::cli::{self, config_cmd, EXIT_CONFIG, EXIT_FAILURE};
use vram_pressure::config::{self as vp_config, HelperConfig};
use vram_pressure::gpu;
use vram_pressure::shutdown::{listen_for_ctrl_c, ShutdownCoordinator};
use vram_pressure::telemetry::init_logging;
use vram_pressure::{Controller, HelperChannel};

fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match take_config_flag(&mut args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            return exit(EXIT_CONFIG);
        }
    };
    let command = args.first().map(|s| s.as_str()).unwrap_or("run");
    let rest = args.get(1..).unwrap_or(&[]);

    match command {
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = rest.first() {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            return ExitCode::SUCCESS;
        }
        "version" | "--version" | "-V" => {
            println!("vram-pressure {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        "config" if rest.first().map(|s| s.as_str()) == Some("defaults") => {
            config_cmd::run_defaults();
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let config = match vp_config::load_with_file(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return exit(EXIT_CONFIG);
        }
    };
    let json = rest.iter().any(|a| a == "--json");

    let code = match command {
        "run" => run_helper(config),
        "status" => cli::run_status(&config.channel, json),
        "set" => cli::run_set(&config.channel, rest),
        "stop" => cli::run_stop(&config.channel),
        "health" => cli::run_health(&config, json),
        "live" | "liveness" => cli::run_liveness(&config),
        "config" => match rest.first().map(|s| s.as_str()).unwrap_or("show") {
            "show" => {
                config_cmd::run_show(&config);
                0
            }
            "validate" => config_cmd::run_validate(&config),
            other => {
                eprintln!("Unknown config subcommand: {other}");
                print_command_help("config");
                EXIT_FAILURE
            }
        },
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            EXIT_FAILURE
        }
    };
    exit(code)
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Remove `--config FILE` from `args`.
fn take_config_flag(args: &mut Vec<String>) -> Result<Option<PathBuf>, String> {
    let Some(pos) = args.iter().position(|a| a == "--config") else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err("--config requires a file path".to_string());
    }
    let path = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(PathBuf::from(path)))
}

/// Bring up device → channel → controller, tick until told to stop.
fn run_helper(config: HelperConfig) -> i32 {
    if let Err(e) = init_logging(&config.log) {
        eprintln!("Logging error: {e}");
        return EXIT_CONFIG;
    }

    let device = match gpu::open_device(config.backend, config.sim_capacity_bytes()) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, backend = %config.backend, "no usable GPU device");
            eprintln!("Error: {e}");
            return EXIT_FAILURE;
        }
    };

    let channel = match HelperChannel::create(&config.channel) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, channel = %config.channel.name, "channel creation failed");
            eprintln!("Error: {e}");
            return EXIT_FAILURE;
        }
    };
    channel.seed_inputs(&config.seed_inputs());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return EXIT_FAILURE;
        }
    };

    let mut controller = Controller::new(device, channel, config.controller_config());
    let shutdown = ShutdownCoordinator::new();

    let result = runtime.block_on(async {
        tokio::spawn(listen_for_ctrl_c(shutdown.clone()));
        controller.run(&shutdown).await
    });
    drop(controller);

    match result {
        Ok(()) => {
            info!("helper exited cleanly");
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            EXIT_FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "vram-pressure v{version} - GPU memory pressure helper

USAGE:
    vram-pressure [--config FILE] [COMMAND] [OPTIONS]

COMMANDS:
    run          Run the helper (default when no command given)
    status       Print the shared record's inputs and outputs
    set          Write budgets, priorities and heap toggles
    stop         Ask the running helper to exit
    health       Full health check (exit 0 if healthy, 1 if unhealthy)
    live         Liveness check (exit 0 if ticking)
    config       Show or validate configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help       Show help for command
    -V, --version    Show version information
    --config FILE    Load configuration from a TOML file (env wins)

ENVIRONMENT:
    VRAM_PRESSURE_CHANNEL_NAME   Shared record name (default: VramPressureSharedMemory)
    VRAM_PRESSURE_BACKEND        d3d12 or simulated
    VRAM_PRESSURE_LOG            Log filter (default: info)
    See `vram-pressure config defaults` for the full list.

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Configuration error
    3  Helper not running"
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => eprintln!(
            "vram-pressure run - Run the helper

USAGE:
    vram-pressure run

DESCRIPTION:
    Opens the GPU, creates the shared record and ticks at
    VRAM_PRESSURE_FRAME_RATE until Ctrl+C or `vram-pressure stop`.
    Every tick the helper resizes its pools toward the requested budgets,
    clears each active slot once, and publishes achieved sizes and the
    adapter's memory-budget counters."
        ),
        "status" => eprintln!(
            "vram-pressure status - Print the shared record

USAGE:
    vram-pressure status [--json]

EXIT CODES:
    0  Record printed
    3  Helper not running"
        ),
        "set" => eprintln!(
            "vram-pressure set - Write input fields

USAGE:
    vram-pressure set [--active-mb N] [--idle-mb N]
                      [--active-priority P] [--idle-priority P]
                      [--heap-512mb on|off] [--heap-1gb on|off]

    Priorities: minimum, low, normal, high, maximum (or 0-4).

EXAMPLES:
    vram-pressure set --active-mb 2048
    vram-pressure set --idle-mb 1024 --idle-priority minimum
    vram-pressure set --heap-1gb on"
        ),
        "stop" => eprintln!(
            "vram-pressure stop - Set RequestShutdown

USAGE:
    vram-pressure stop

    The helper exits at its next tick after releasing all GPU memory."
        ),
        "health" | "live" | "liveness" => eprintln!(
            "vram-pressure health - Check the running helper

USAGE:
    vram-pressure health [--json]
    vram-pressure live

DESCRIPTION:
    Reads FrameCount twice, at least two ticks of VRAM_PRESSURE_FRAME_RATE
    apart. Healthy when running and advancing; Degraded when achieved
    memory falls short of the request; Unhealthy otherwise.

EXIT CODES:
    0  Healthy or degraded
    1  Unhealthy
    3  Helper not running"
        ),
        "config" => eprintln!(
            "vram-pressure config - Configuration

USAGE:
    vram-pressure config show       Effective values (file + env)
    vram-pressure config defaults   Built-in defaults
    vram-pressure config validate   Exit 1 on warnings"
        ),
        other => {
            eprintln!("No help for '{other}'.");
            print_usage();
        }
    }
}
