//! Entry point for the botwatch console. Parses args, applies overrides and runs one command.

use botwatch::config::{self, ConsoleConfig};
use botwatch::console::Console;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const USAGE_FLAGS: &str = "[--api URL|-a URL] [--ws URL|-w URL] [--interval MS|-i MS] \
     [--no-reconnect] [--config PATH|-c PATH] [--save] [--demo] [COMMAND [ARG]]";
const COMMANDS: &str = "Commands: status (default), test, snapshot, logs, action NAME, \
     watch, setup PATH, meta, config";

#[derive(Debug, Default)]
struct ParsedArgs {
    api: Option<String>,
    ws: Option<String>,
    interval_ms: Option<u64>,
    no_reconnect: bool,
    config: Option<PathBuf>,
    save: bool,
    demo: bool,
    command: Vec<String>,
}

fn usage(prog: &str) -> String {
    format!("Usage: {prog} {USAGE_FLAGS}\n{COMMANDS}")
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "botwatch".into());
    let mut parsed = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--api" | "-a" => parsed.api = it.next(),
            "--ws" | "-w" => parsed.ws = it.next(),
            "--interval" | "-i" => {
                let v = it.next().unwrap_or_default();
                parsed.interval_ms = Some(
                    v.parse::<u64>()
                        .map_err(|_| format!("invalid interval '{v}'\n{}", usage(&prog)))?,
                );
            }
            "--config" | "-c" => parsed.config = it.next().map(PathBuf::from),
            "--no-reconnect" => parsed.no_reconnect = true,
            "--save" => parsed.save = true,
            "--demo" => parsed.demo = true,
            _ if arg.starts_with("--api=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.api = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--ws=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.ws = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with('-') && parsed.command.is_empty() => {
                return Err(format!("Unknown flag '{arg}'.\n{}", usage(&prog)));
            }
            _ => {
                if parsed.command.len() >= 2 {
                    return Err(format!("Unexpected argument '{arg}'.\n{}", usage(&prog)));
                }
                parsed.command.push(arg);
            }
        }
    }
    Ok(parsed)
}

fn apply_overrides(mut cfg: ConsoleConfig, parsed: &ParsedArgs) -> ConsoleConfig {
    if let Some(api) = parsed.api.as_ref() {
        cfg.api_endpoint = api.clone();
    }
    if let Some(ws) = parsed.ws.as_ref() {
        cfg.stream_endpoint = ws.clone();
    }
    if let Some(ms) = parsed.interval_ms {
        cfg.polling_interval_ms = ms;
    }
    if parsed.no_reconnect {
        cfg.auto_reconnect = false;
    }
    cfg
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = parsed.config.clone().unwrap_or_else(config::config_path);
    let stored = config::load_config(&config_path);
    let mut cfg = apply_overrides(stored, &parsed);

    // Demo mode: point the console at a freshly spawned mock backend.
    let _demo = if parsed.demo {
        let port = 3231;
        let guard = spawn_demo_agent(port)?;
        cfg.api_endpoint = format!("http://127.0.0.1:{port}");
        cfg.stream_endpoint = String::new();
        Some(guard)
    } else {
        None
    };

    let console = Console::with_config(config_path, cfg.clone());
    if parsed.save && !parsed.demo {
        console.save_config(cfg).await?;
    }

    let result = run_command(&console, &parsed.command).await;
    console.shutdown().await;
    result
}

async fn run_command(console: &Console, command: &[String]) -> anyhow::Result<()> {
    let name = command.first().map(String::as_str).unwrap_or("status");
    let arg = command.get(1).map(String::as_str);

    match (name, arg) {
        ("status", _) => {
            console.test_connection().await;
            print_json(&console.connection_status().await)
        }
        ("test", _) => print_json(&console.test_connection().await),
        ("snapshot", _) => print_json(&console.get_snapshot().await),
        ("logs", _) => {
            for line in console.get_logs().await {
                println!("{line}");
            }
            Ok(())
        }
        ("action", Some(action)) => print_json(&console.perform_bot_action(action).await),
        ("action", None) => {
            eprintln!("action requires a NAME (start, pause, resume, stop, sync)");
            Ok(())
        }
        ("setup", Some(path)) => print_json(&console.run_setup_checks(path).await),
        ("setup", None) => {
            let bot_path = console.read_config().await.bot_path;
            print_json(&console.run_setup_checks(&bot_path).await)
        }
        ("meta", _) => print_json(&console.app_meta()),
        ("config", _) => print_json(&console.read_config().await),
        ("watch", _) => {
            console.test_connection().await;
            console.connect_stream().await;
            tokio::select! {
                _ = console.watch(|tick| {
                    if let Ok(js) = serde_json::to_string(&tick) {
                        println!("{js}");
                    }
                }) => Ok(()),
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
        (other, _) => {
            eprintln!("Unknown command '{other}'. {COMMANDS}");
            Ok(())
        }
    }
}

// --- Demo Mode ---

struct DemoGuard(Option<std::process::Child>);

impl Drop for DemoGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn spawn_demo_agent(port: u16) -> anyhow::Result<DemoGuard> {
    let candidate = find_agent_executable();
    let mut cmd = std::process::Command::new(candidate);
    cmd.arg("--port").arg(port.to_string());
    let child = cmd.spawn()?;
    // Give the agent a brief moment to start
    std::thread::sleep(std::time::Duration::from_millis(300));
    Ok(DemoGuard(Some(child)))
}

fn find_agent_executable() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            #[cfg(windows)]
            let name = "botwatch_agent.exe";
            #[cfg(not(windows))]
            let name = "botwatch_agent";
            let candidate = parent.join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    // Fallback to relying on PATH
    PathBuf::from("botwatch_agent")
}
