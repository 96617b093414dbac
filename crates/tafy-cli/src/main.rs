//! `tafynode` – runs a robot node on simulated hardware.
//!
//! ```text
//! tafynode [run]        run the control loop until Ctrl-C
//! tafynode init [-f]    write the default config to ~/.tafy/node.toml
//! tafynode schemas      print JSON Schemas of command and telemetry payloads
//! ```
//!
//! Ctrl-C latches the emergency stop before the process exits.

mod config;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use schemars::schema_for;
use tracing::{info, warn};

use tafy_hal::sim::SimHardware;
use tafy_kernel::StopReason;
use tafy_middleware::{BrokerEndpoint, LoopbackBroker, Transport, TransportError, WsTransport};
use tafy_runtime::{Clock, MonotonicClock, NodeConfig, RobotNode};
use tafy_types::{
    Envelope, Heartbeat, MotorCommand, MotorTelemetry, SensorCommand, SensorTelemetry,
};

const SIM_OBSTACLE_MM: u16 = 800;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match args.first().map(String::as_str) {
        None | Some("run") => run(),
        Some("init") => init(args.iter().any(|a| a == "-f" || a == "--force")),
        Some("schemas") => schemas(),
        Some("help" | "-h" | "--help") => {
            print_usage();
            0
        }
        Some(other) => {
            eprintln!("{}: unknown command '{}'", "error".red().bold(), other);
            print_usage();
            2
        }
    };
    std::process::exit(code);
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run() -> i32 {
    let _guard = tafy_runtime::telemetry::init_tracing("tafynode");
    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config found, using defaults. Run `{}` to create one.",
                "tafynode init".bold()
            );
            let mut cfg = NodeConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return 1;
        }
    };

    // Keeps the in-memory broker alive when running offline.
    let broker = LoopbackBroker::default();
    let transport = match select_transport(&cfg, &broker) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("{}: {}", "Unsupported broker".red(), e);
            return 1;
        }
    };
    let rig = SimHardware::new()
        .with_obstacle_at(SIM_OBSTACLE_MM)
        .build();

    let mut node = match RobotNode::new(cfg, rig.wheels, rig.ranging, transport) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("{}: {}", "Invalid configuration".red(), e);
            return 1;
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the node can only be killed");
    }

    println!(
        "  Device {} on {}\n",
        node.device_id().bold(),
        node.config()
            .broker_url
            .as_deref()
            .unwrap_or("loopback (offline)")
            .dimmed()
    );

    let clock = MonotonicClock::default();
    node.begin(clock.now_ms());
    while !shutdown.load(Ordering::SeqCst) {
        node.step(clock.now_ms());
        let idle = node.idle_ms(clock.now_ms()).max(1);
        std::thread::sleep(Duration::from_millis(idle));
    }

    println!();
    println!("{}", "⚠  Ctrl-C received – stopping the drive …".yellow().bold());
    match node.emergency_stop(StopReason::Operator) {
        Ok(()) => println!("{}", "  ✓ Emergency stop engaged.".green()),
        Err(e) => println!("{}: {}", "  ✗ Emergency stop failed".red(), e),
    }
    let stats = node.router_stats();
    info!(
        dispatched = stats.dispatched,
        rejected = stats.rejected,
        "node stopped"
    );
    println!("{}", "  ✓ Exiting tafynode.".green());
    0
}

/// WebSocket transport for `ws://`/`wss://` brokers, the in-memory loopback
/// when no broker is configured. Other schemes have no client and are
/// refused rather than silently served by the loopback.
fn select_transport(
    cfg: &NodeConfig,
    broker: &LoopbackBroker,
) -> Result<Box<dyn Transport>, TransportError> {
    let Some(url) = cfg.broker_url.as_deref() else {
        return Ok(Box::new(broker.transport()));
    };
    let endpoint = BrokerEndpoint::parse(url)?;
    if endpoint.scheme.is_websocket() {
        Ok(Box::new(WsTransport::default()))
    } else {
        Err(TransportError::InvalidEndpoint(format!(
            "{endpoint}: no client for {}, use ws:// or wss://",
            endpoint.scheme.as_str()
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// init / schemas
// ─────────────────────────────────────────────────────────────────────────────

fn init(force: bool) -> i32 {
    let path = config::config_path();
    if path.exists() && !force {
        println!(
            "  {} already exists. Use `{}` to overwrite it.",
            path.display().to_string().bold(),
            "tafynode init --force".bold()
        );
        return 1;
    }
    match config::save(&NodeConfig::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            0
        }
        Err(e) => {
            eprintln!("{}: {}", "Error saving config".red(), e);
            1
        }
    }
}

fn schemas() -> i32 {
    let mut all = BTreeMap::new();
    all.insert("envelope", schema_for!(Envelope));
    all.insert("motor_command", schema_for!(MotorCommand));
    all.insert("motor_telemetry", schema_for!(MotorTelemetry));
    all.insert("sensor_command", schema_for!(SensorCommand));
    all.insert("sensor_telemetry", schema_for!(SensorTelemetry));
    all.insert("heartbeat", schema_for!(Heartbeat));
    match serde_json::to_string_pretty(&all) {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            eprintln!("{}: {}", "Failed to render schemas".red(), e);
            1
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _____      __       "#.bold().cyan());
    println!("{}", r#" |_   _|_ _ / _|_   _ "#.bold().cyan());
    println!("{}", r#"   | |/ _` | |_| | | |"#.bold().cyan());
    println!("{}", r#"   | | (_| |  _| |_| |"#.bold().cyan());
    println!("{}", r#"   |_|\__,_|_|  \__, |"#.bold().cyan());
    println!("{}", r#"                |___/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "tafynode".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Differential-drive robot node");
    println!();
}

fn print_usage() {
    println!("Usage: tafynode [run | init [--force] | schemas | help]");
}
