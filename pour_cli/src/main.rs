mod cli;
mod error_fmt;
mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use eyre::{Result, WrapErr};
use pour_core::{ALL_OFF, DeviceStatus, Event, Machine};
use pour_hardware::{BusOptions, open_bus};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, json_mode};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::serve::{ServeOpts, render_outcome, run_serve};

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error hooks: {e}");
    }
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "command failed");
        if json_mode() {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn load_config(path: &Path, pumps_csv: Option<&PathBuf>) -> Result<pour_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let mut cfg = pour_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    if let Some(csv) = pumps_csv {
        cfg.pumps = pour_config::load_pump_map_csv(csv)?;
    }
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, logging: &pour_config::Logging) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(&level).wrap_err_with(|| format!("bad log level {level}"))?,
    };

    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match &logging.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map_or_else(|| "pour.log".into(), |n| n.to_os_string());
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config, cli.pumps_csv.as_ref())?;
    init_tracing(&cli, &cfg.logging)?;

    for missing in cfg.unmapped_ingredients() {
        tracing::warn!(ingredient = %missing, "ingredient has no pump; recipes using it will fail");
    }

    let opts = BusOptions {
        device: cfg.bus.device,
        op_timeout: pour_core::conversions::op_timeout(&cfg.bus),
        simulate: cfg.bus.simulate,
        devices: pour_core::conversions::device_map(&cfg.bus),
    };
    let (bus, mode) = open_bus(&opts);
    tracing::info!(mode = mode.as_str(), "bus ready");

    let machine = Arc::new(Machine::from_config(&cfg, bus)?);
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let machine = Arc::clone(&machine);
        let interrupted = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            if let Err(e) = machine.stop_serving() {
                tracing::error!(error = %e, "stop on Ctrl-C failed");
            }
        }) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let result = dispatch(&cli, &machine, &interrupted);
    if let Err(e) = machine.shutdown() {
        tracing::warn!(error = %e, "shutdown incomplete");
    }
    result
}

fn dispatch(cli: &Cli, machine: &Arc<Machine>, interrupted: &Arc<AtomicBool>) -> Result<()> {
    let json = cli.json;
    match &cli.cmd {
        Commands::Serve {
            recipe,
            yes,
            timeout_secs,
        } => {
            let opts = ServeOpts {
                yes: *yes,
                timeout: Duration::from_secs(*timeout_secs),
                json,
            };
            let outcome = run_serve(machine, recipe, &opts, interrupted)?;
            render_outcome(recipe, &outcome, json);
        }
        Commands::Stop => {
            machine.stop_serving()?;
            say(json, "stopped", "all pumps off");
        }
        Commands::Tare => {
            machine.tare_scale()?;
            say(json, "tared", "scale zeroed");
        }
        Commands::Weight => {
            let grams = machine.get_weight()?;
            if json {
                println!("{}", serde_json::json!({ "grams": grams }));
            } else {
                println!("{grams:.2} g");
            }
        }
        Commands::Status => print_status(&machine.get_status(), json)?,
        Commands::Pump { pump, ms } => {
            let handle = machine.activate_pump(*pump, Duration::from_millis(*ms))?;
            handle
                .join()
                .map_err(|_| eyre::eyre!("pump {pump} timer thread panicked"))?;
            say(json, "pumped", &format!("pump {pump} ran {ms} ms"));
        }
        Commands::StartPump { pump, secs } => {
            machine.start_pump(*pump)?;
            say(json, "started", &format!("pump {pump} on"));
            let deadline = secs.map(|s| Instant::now() + Duration::from_secs(s));
            while !interrupted.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d)
            {
                std::thread::sleep(Duration::from_millis(50));
            }
            machine.stop_pump(*pump)?;
            say(json, "stopped", &format!("pump {pump} off"));
        }
        Commands::StopPump { pump } => {
            machine.stop_pump(*pump)?;
            say(json, "stopped", &format!("pump {pump} off"));
        }
        Commands::Watch { secs } => watch(machine, *secs, json, interrupted)?,
        Commands::Recipes => print_recipes(machine, json),
        Commands::SelfCheck => self_check(machine, json)?,
    }
    Ok(())
}

fn say(json: bool, event: &str, text: &str) {
    if json {
        println!("{}", serde_json::json!({ "event": event, "message": text }));
    } else {
        println!("{text}");
    }
}

fn print_status(s: &DeviceStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(s)?);
        return Ok(());
    }
    let link = |ok: bool| if ok { "online" } else { "offline" };
    println!("status:  {}", s.aggregate.as_str());
    println!("bus:     {}", s.bus_mode);
    println!(
        "relay:   0x{:02x} {}",
        s.relay_address,
        link(s.relay_connected)
    );
    println!(
        "scale:   0x{:02x} {}",
        s.scale_address,
        link(s.scale_connected)
    );
    println!("network: {}", link(s.wifi_connected));
    println!("weight:  {:.2} g", s.current_weight);
    let active: Vec<String> = s.active_pumps.iter().map(u8::to_string).collect();
    println!(
        "pumps:   {} of {} on [{}]",
        active.len(),
        s.total_pumps,
        active.join(",")
    );
    Ok(())
}

fn print_recipes(machine: &Machine, json: bool) {
    let available: Vec<String> = machine
        .available_recipes()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    for r in machine.recipes().iter() {
        let ready = available.iter().any(|id| id == r.id());
        if json {
            let ingredients: Vec<_> = r
                .ingredients()
                .iter()
                .map(|i| serde_json::json!({ "name": i.name, "ml": i.ml }))
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "id": r.id(),
                    "available": ready,
                    "ingredients": ingredients,
                    "postAdd": r.post_add(),
                })
            );
        } else {
            let parts: Vec<String> = r
                .ingredients()
                .iter()
                .map(|i| format!("{} {} ml", i.name, i.ml))
                .collect();
            let extra = r
                .post_add()
                .map(|p| format!(" + {p} by hand"))
                .unwrap_or_default();
            let mark = if ready { "" } else { " (unavailable)" };
            println!("{}{mark}: {}{extra}", r.id(), parts.join(", "));
        }
    }
}

fn watch(
    machine: &Machine,
    secs: Option<u64>,
    json: bool,
    interrupted: &Arc<AtomicBool>,
) -> Result<()> {
    let rx = machine.subscribe();
    let deadline = secs.map(|s| Instant::now() + Duration::from_secs(s));
    while !interrupted.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
        let Ok(ev) = rx.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };
        if json {
            println!("{}", serde_json::to_string(&ev)?);
            continue;
        }
        match ev {
            Event::Weight(w) => println!("{:>8} ms  {:.2} g", w.at_ms, w.grams),
            Event::Status(s) => println!("status {}", s.aggregate.as_str()),
            Event::Progress(p) => {
                if let Some(name) = p.current_ingredient {
                    println!("{name}: {:.1} / {:.1}", p.current_amount, p.target_amount);
                }
            }
        }
    }
    Ok(())
}

fn self_check(machine: &Machine, json: bool) -> Result<()> {
    let status = machine.get_status();
    let relay_off = machine.relay_state() == Some(ALL_OFF);
    let ok = status.relay_connected && status.scale_connected && relay_off;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": ok,
                "relay": status.relay_connected,
                "scale": status.scale_connected,
                "relayOff": relay_off,
                "bus": status.bus_mode,
            })
        );
    }
    if !ok {
        eyre::bail!(
            "self-check failed: relay={} scale={} relay_off={relay_off}",
            status.relay_connected,
            status.scale_connected
        );
    }
    if !json {
        println!("self-check ok ({} bus)", status.bus_mode);
    }
    Ok(())
}
