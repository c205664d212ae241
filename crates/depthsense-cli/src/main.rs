//! `depthsense-cli` – DepthSense command line interface
//!
//! 1. Loads `~/.depthsense/config.toml`, writing defaults on first run.
//! 2. Probes every sensing backend against the configured device and reports
//!    the recommended order.
//! 3. Activates the configured mode over the simulated camera and scene.
//! 4. Drops the user into an interactive REPL (`/mode`, `/probe`, `/watch`,
//!    `/status`, `/help`).
//! 5. Intercepts Ctrl-C and stops the active backend before exiting.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use depthsense_types::SensingMode;

fn main() {
    // Before the tokio runtime exists; the OTLP exporter is synchronous.
    let _telemetry = depthsense_runtime::init_tracing("depthsense");
    let session_id = uuid::Uuid::new_v4();

    print_banner();

    let cfg = match config::load_or_init() {
        Ok((cfg, true)) => {
            println!(
                "  {} First run: defaults written to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok((cfg, false)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            eprintln!("{}: {}", "Fatal".red().bold(), e);
            std::process::exit(1);
        }
    };

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping sensing …".yellow().bold());
        println!("  Press Enter to leave the prompt.");
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    info!(session = %session_id, device = %cfg.device, gpu = cfg.gpu_compute, "depthsense starting");
    let mut session = runtime.block_on(async { repl::Session::new(&cfg) });

    println!();
    println!("  Device        : {}", cfg.device.dimmed());
    runtime.block_on(session.show_recommendations());
    if cfg.mode != SensingMode::None {
        print!("  Starting {} … ", cfg.mode.to_string().bold());
        runtime.block_on(session.activate(cfg.mode));
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(shutdown, &runtime, &mut session);

    runtime.block_on(session.stop());
    info!(session = %session_id, "depthsense stopped");
    println!("{}", "  ✓ Sensing stopped. Exiting DepthSense.".green());
}

fn print_banner() {
    println!();
    println!("{}", r#"    ___           __  __   ____                     "#.bold().cyan());
    println!("{}", r#"   / _ \___ ___  / /_/ /  / __/__ ___  ___ ___      "#.bold().cyan());
    println!("{}", r#"  / // / -_) _ \/ __/ _ \_\ \/ -_) _ \(_-</ -_)     "#.bold().cyan());
    println!("{}", r#" /____/\__/ .__/\__/_//_/___/\__/_//_/___/\__/      "#.bold().cyan());
    println!("{}", r#"         /_/                                        "#.bold().cyan());
    println!();
    println!("  {} {}", "DepthSense".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  AR obstacle and depth sensing");
    println!();
}
