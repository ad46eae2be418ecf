use std::env;
use std::fs;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tabs_core::actions::TabIntent;
use tabs_core::config::Config;
use tabs_core::config::LoggingConfig;
use tabs_core::persistence::JsonlOperationStore;
use tabs_core::persistence::load_records;
use tabs_core::persistence::replay_from;
use tabs_core::reducer::TABS_REDUCER;
use tabs_core::state::SessionState;
use tabs_core::state::TabId;
use tabs_live::engine::SimulatedTabEngine;
use tabs_live::runtime::SessionRuntime;
use tabs_live::session::Session;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (config_path, mut rest) = split_config_arg(env::args().skip(1).collect())?;
    if rest.is_empty() {
        print_help();
        return Ok(());
    }
    let command = rest.remove(0);

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("tabs {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "replay" => {
            let config = load_config(config_path.as_deref())?;
            init_logging(&config.logging);
            let log = match rest.first() {
                Some(path) => PathBuf::from(path),
                None => log_path(&config)?,
            };
            replay(&config, &log)
        }
        "shell" => {
            let config = load_config(config_path.as_deref())?;
            init_logging(&config.logging);
            shell(&config)
        }
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

fn split_config_arg(
    args: Vec<String>,
) -> Result<(Option<PathBuf>, Vec<String>), Box<dyn std::error::Error>> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--config requires a path".into());
                };
                config = Some(PathBuf::from(value));
                i += 2;
            }
            other => {
                rest.push(other.to_string());
                i += 1;
            }
        }
    }
    Ok((config, rest))
}

fn load_config(explicit: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir() {
            Some(dir) => dir.join("tabs").join("config.toml"),
            None => return Ok(Config::default()),
        },
    };
    if explicit.is_none() && !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(&path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let config: Config =
        toml::from_str(&raw).map_err(|err| format!("invalid config {}: {err}", path.display()))?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn log_path(config: &Config) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = &config.store.log_path {
        return Ok(path.clone());
    }
    let Some(dir) = dirs::data_dir() else {
        return Err("no data directory; set store.log_path in the config".into());
    };
    Ok(dir.join("tabs").join("operations.jsonl"))
}

fn replay(config: &Config, log: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let records: Vec<_> = load_records(log)?
        .into_iter()
        .filter(|record| record.kind == config.session.kind && record.path == config.session.path)
        .collect();
    let state = replay_from(SessionState::new(), &records, TABS_REDUCER);
    info!(records = records.len(), version = state.version, "replayed log");
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn shell(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let log = log_path(config)?;
    let store = JsonlOperationStore::open(&log)?.with_snapshot_every(config.store.snapshot_every);
    info!(log = %store.log_path().display(), "opened operation log");
    let session = Session::open(store, SimulatedTabEngine::new(), &config.session)?;
    let (runtime, handle) = SessionRuntime::new(session);
    let worker = runtime.spawn()?;
    info!("shell started");

    print_strip(&handle.state()?);
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("tabs> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match parse_command(input) {
            Ok(ShellCommand::Quit) => break,
            Ok(ShellCommand::State) => {
                let subscription = handle.subscribe()?;
                if let Some(view) = subscription.latest() {
                    println!("{}", serde_json::to_string_pretty(&view)?);
                }
                handle.unsubscribe(subscription.id())?;
            }
            Ok(ShellCommand::Intent(intent)) => match handle.dispatch(intent) {
                Ok(()) => print_strip(&handle.state()?),
                Err(err) => eprintln!("error: {err}"),
            },
            Err(message) => eprintln!("{message}"),
        }
    }

    handle.shutdown();
    if worker.join().is_err() {
        return Err("session thread panicked".into());
    }
    Ok(())
}

enum ShellCommand {
    Intent(TabIntent),
    State,
    Quit,
}

fn parse_command(input: &str) -> Result<ShellCommand, String> {
    let (word, arg) = match input.split_once(char::is_whitespace) {
        Some((word, arg)) => (word, Some(arg.trim())),
        None => (input, None),
    };
    let intent = match (word, arg) {
        ("new", None) => TabIntent::NewTab,
        ("load", Some(url)) => TabIntent::Load(url.to_string()),
        ("select", Some(id)) => TabIntent::SelectAndCommit(TabId::from(id)),
        ("close", id) => TabIntent::Close(id.map(TabId::from)),
        ("commit", None) => TabIntent::Commit,
        ("recover", None) => TabIntent::Recover,
        ("back", None) => TabIntent::Back,
        ("forward", None) => TabIntent::Forward,
        ("reload", None) => TabIntent::Reload,
        ("next", None) => TabIntent::SelectNext,
        ("prev", None) => TabIntent::SelectPrev,
        ("state", None) => return Ok(ShellCommand::State),
        ("quit" | "exit", None) => return Ok(ShellCommand::Quit),
        _ => return Err(format!("unrecognized command: {input}")),
    };
    Ok(ShellCommand::Intent(intent))
}

fn print_strip(state: &SessionState) {
    if state.tabs.is_empty() {
        println!("(no tabs)");
    }
    for (index, tab) in state.tabs.iter().enumerate() {
        let marker = if state.active == Some(index) { '*' } else { ' ' };
        let url = tab.url.as_deref().unwrap_or("-");
        let title = tab.title.as_deref().unwrap_or("");
        println!(
            "{marker} {index} {} [{}] {url} {title}",
            tab.tab_id,
            tab.kind.label()
        );
    }
    if !state.recover.is_empty() {
        println!("  ({} recoverable)", state.recover.len());
    }
}

fn print_help() {
    println!("tabs {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  tabs [--config FILE] shell");
    println!("  tabs [--config FILE] replay [LOG]");
    println!("  tabs --help");
    println!();
    println!("Shell commands:");
    println!("  new | load URL | select ID | close [ID] | commit | recover");
    println!("  back | forward | reload | next | prev | state | quit");
}
