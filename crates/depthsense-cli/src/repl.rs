//! REPL – interactive shell driving a [`SensingManager`] over the simulated
//! scene.
//!
//! Supported slash-commands:
//!   /help          – show this list
//!   /probe         – capability report for every backend
//!   /mode <name>   – switch backend (`hands`, `depth-session`, `multi-model`,
//!                    `monocular`, `none`)
//!   /stop          – stop the active backend
//!   /status        – active mode and frame counters
//!   /watch <n>     – print the next `n` obstacle batches as JSON
//!   /quit | /exit  – stop sensing and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};
use depthsense_runtime::{CapabilityProber, PlatformInfo, SensingManager, SensorFactory};
use depthsense_sensors::sim::{SimEnvironment, SimVideoSource};
use depthsense_types::{ObstacleZone, SensingMode};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::Config;

/// How long `/watch` waits for each batch.
const WATCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Probe,
    Mode(SensingMode),
    Stop,
    Status,
    Watch(usize),
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, String> {
        let mut parts = line.split_whitespace();
        let head = parts.next().unwrap_or_default();
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(format!("too many arguments for {head}"));
        }
        match (head, arg) {
            ("/help", None) => Ok(Command::Help),
            ("/probe", None) => Ok(Command::Probe),
            ("/mode", Some(name)) => name.parse().map(Command::Mode),
            ("/mode", None) => Err("usage: /mode <hands|depth-session|multi-model|monocular|none>".into()),
            ("/stop", None) => Ok(Command::Stop),
            ("/status", None) => Ok(Command::Status),
            ("/watch", None) => Ok(Command::Watch(1)),
            ("/watch", Some(n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Command::Watch(n)),
                _ => Err(format!("'{n}' is not a positive batch count")),
            },
            ("/quit" | "/exit", None) => Ok(Command::Quit),
            _ => Err(format!("Unknown command: '{}'", line.trim())),
        }
    }
}

/// Everything the shell needs between commands.
pub struct Session {
    manager: SensingManager,
    prober: CapabilityProber,
    frames: Arc<AtomicU64>,
    last_zones: Arc<AtomicUsize>,
    active_since: Option<DateTime<Local>>,
}

impl Session {
    /// Build the manager and prober over a fresh simulated scene.  Must be
    /// called inside the tokio runtime.
    pub fn new(cfg: &Config) -> Self {
        let env = SimEnvironment::new();
        let providers = env.providers();
        let video = Arc::new(SimVideoSource::new(
            "sim-camera",
            cfg.camera.width,
            cfg.camera.height,
            cfg.camera.fps,
        ));

        let frames = Arc::new(AtomicU64::new(0));
        let last_zones = Arc::new(AtomicUsize::new(0));
        let (f, z) = (Arc::clone(&frames), Arc::clone(&last_zones));
        let on_obstacles = Arc::new(move |zones: Vec<ObstacleZone>| {
            f.fetch_add(1, Ordering::Relaxed);
            z.store(zones.len(), Ordering::Relaxed);
        });

        let factory = SensorFactory::new(providers.clone(), cfg.sensors.clone());
        let manager = SensingManager::new(Arc::new(factory), video, on_obstacles);
        let prober = CapabilityProber::new(
            providers,
            cfg.sensors.clone(),
            PlatformInfo::new(cfg.device.clone(), cfg.gpu_compute),
        );

        Self {
            manager,
            prober,
            frames,
            last_zones,
            active_since: None,
        }
    }

    pub fn mode(&self) -> SensingMode {
        self.manager.mode()
    }

    /// Print the recommendation order for this device.
    pub async fn show_recommendations(&self) {
        let modes = self.prober.recommended_modes().await;
        let names: Vec<String> = modes.iter().map(ToString::to_string).collect();
        println!(
            "  Device class  : {:?}",
            self.prober.platform().device_class()
        );
        if names.is_empty() {
            println!("  Recommended   : {}", "no backend is supported here".red());
        } else {
            println!("  Recommended   : {}", names.join(" → ").bold());
        }
    }

    pub async fn activate(&mut self, mode: SensingMode) {
        if let Err(e) = self.prober.ensure_supported(mode).await {
            println!("{} {}", "✗".red().bold(), e);
            println!("  Try {} to see what this device supports.", "/probe".bold());
            return;
        }
        self.frames.store(0, Ordering::Relaxed);
        match self.manager.set_mode(mode).await {
            Ok(()) if mode == SensingMode::None => {
                self.active_since = None;
                println!("{} sensing idle", "✓".green().bold());
            }
            Ok(()) => {
                self.active_since = Some(Local::now());
                println!("{} {} active", "✓".green().bold(), mode.to_string().bold());
            }
            Err(e) => {
                self.active_since = None;
                warn!(%mode, error = %e, "mode switch failed");
                println!("{} {}", "✗".red().bold(), e);
            }
        }
    }

    pub async fn stop(&mut self) {
        self.manager.stop().await;
        self.active_since = None;
    }

    async fn probe(&self) {
        println!("{}", "Capability Report".bold().underline());
        for report in self.prober.probe_all().await {
            let marker = if report.supported { "🟢" } else { "🔴" };
            println!("  {} {:<14} {}", marker, report.mode.to_string().bold(), report.reason);
            println!("     {}", report.recommendation.dimmed());
        }
    }

    fn status(&self) {
        println!("{}", "Status".bold().underline());
        let mode = self.manager.mode();
        if mode == SensingMode::None {
            println!("  Mode        : {}", "idle".yellow());
        } else {
            println!("  Mode        : {}", mode.to_string().green());
        }
        if let Some(since) = self.active_since {
            println!("  Active since: {}", since.format("%H:%M:%S"));
        }
        println!("  Frames      : {}", self.frames.load(Ordering::Relaxed));
        println!("  Last zones  : {}", self.last_zones.load(Ordering::Relaxed));
        println!("  Subscribers : {}", self.manager.stream().subscriber_count());
    }

    async fn watch(&self, count: usize) {
        if self.manager.is_idle() {
            println!("{} nothing to watch; start a backend with {}", "Idle:".yellow(), "/mode".bold());
            return;
        }
        let mut rx = self.manager.subscribe();
        for _ in 0..count {
            match tokio::time::timeout(WATCH_TIMEOUT, rx.next_batch()).await {
                Ok(Some(batch)) => match serde_json::to_string(&batch) {
                    Ok(json) => println!("{json}"),
                    Err(e) => println!("{}: {}", "Serialisation error".red(), e),
                },
                Ok(None) => break,
                Err(_) => {
                    println!("{} no batch within {:?}", "Timeout:".yellow(), WATCH_TIMEOUT);
                    break;
                }
            }
        }
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shutdown: Arc<AtomicBool>, runtime: &Runtime, session: &mut Session) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let prompt = match session.mode() {
            SensingMode::None => "depthsense>".to_string(),
            mode => format!("depthsense[{mode}]>"),
        };
        print!("{} ", prompt.bold().cyan());
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

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        match Command::parse(cmd) {
            Ok(Command::Help) => cmd_help(),
            Ok(Command::Probe) => runtime.block_on(session.probe()),
            Ok(Command::Mode(mode)) => runtime.block_on(session.activate(mode)),
            Ok(Command::Stop) => {
                runtime.block_on(session.stop());
                println!("{} sensing stopped", "✓".green().bold());
            }
            Ok(Command::Status) => session.status(),
            Ok(Command::Watch(n)) => runtime.block_on(session.watch(n)),
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => {
                println!("{} Type {} for available commands.", msg.red(), "/help".bold());
            }
        }
    }

    info!("leaving shell");
}

fn cmd_help() {
    println!();
    println!("{}", "DepthSense Commands".bold().underline());
    println!("  {}        – capability report per backend", "/probe".bold().cyan());
    println!("  {}  – switch backend (hands, depth-session, multi-model, monocular, none)", "/mode <name>".bold().cyan());
    println!("  {}         – stop the active backend", "/stop".bold().cyan());
    println!("  {}       – active mode and frame counters", "/status".bold().cyan());
    println!("  {}    – print the next n obstacle batches as JSON", "/watch <n>".bold().cyan());
    println!("  {}  – stop sensing and exit", "/quit  /exit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/help"), Ok(Command::Help));
        assert_eq!(Command::parse("/mode multi-model"), Ok(Command::Mode(SensingMode::MultiModel)));
        assert_eq!(Command::parse("/mode none"), Ok(Command::Mode(SensingMode::None)));
        assert_eq!(Command::parse("/watch"), Ok(Command::Watch(1)));
        assert_eq!(Command::parse("/watch 3"), Ok(Command::Watch(3)));
        assert_eq!(Command::parse("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("/mode").is_err());
        assert!(Command::parse("/mode lidar").is_err());
        assert!(Command::parse("/watch 0").is_err());
        assert!(Command::parse("/watch many").is_err());
        assert!(Command::parse("/stop now").is_err());
        assert!(Command::parse("hello").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn session_switches_and_stops() {
        let mut session = Session::new(&Config::default());
        session.activate(SensingMode::Hands).await;
        assert_eq!(session.mode(), SensingMode::Hands);
        assert!(session.active_since.is_some());

        // Monocular needs GPU compute, which the default config lacks.
        session.activate(SensingMode::Monocular).await;
        assert_eq!(session.mode(), SensingMode::Hands);

        session.stop().await;
        assert_eq!(session.mode(), SensingMode::None);
        assert!(session.active_since.is_none());
    }
}
