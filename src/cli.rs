use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::BridgeConfig;
use crate::dispatch::HostEvent;
use crate::host::{Host, PortHandle, PortKind, PortLedger};
use crate::instance::Instance;
use crate::platform::Platform;
use crate::script_log::LogLevel;
use crate::value::TypedValue;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a script into a headless instance and send it messages
    Run {
        /// Script file (also the first construction argument)
        script: String,

        /// Extra construction argument, parsed as int, float or symbol
        #[arg(long = "arg", value_name = "VALUE", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Message to send, as `[inlet:]selector args...`
        #[arg(long = "send", value_name = "MSG")]
        messages: Vec<String>,

        /// Send loadbang after loading
        #[arg(long)]
        loadbang: bool,

        /// JSON file with engine limits
        #[arg(long)]
        config: Option<PathBuf>,

        /// Operation budget per call (0 = unlimited), overrides the config file
        #[arg(long)]
        max_operations: Option<u64>,

        /// Extra directories to search for scripts
        #[arg(long = "search-path", value_name = "DIR")]
        search_paths: Vec<PathBuf>,
    },
    /// Compile and evaluate a script, print diagnostics as JSON
    Check {
        /// Script file
        script: String,

        /// JSON file with engine limits
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            args,
            messages,
            loadbang,
            config,
            max_operations,
            search_paths,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(max_operations) = max_operations {
                config.max_operations = max_operations;
            }
            run_script(&script, &args, &messages, loadbang, config, search_paths)?;
        }
        Commands::Check { script, config } => {
            let config = load_config(config.as_deref())?;
            check_script(&script, config)?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_json_file(path),
        None => Ok(BridgeConfig::default()),
    }
}

fn run_script(
    script: &str,
    extra_args: &[String],
    messages: &[String],
    loadbang: bool,
    config: BridgeConfig,
    search_paths: Vec<PathBuf>,
) -> Result<()> {
    let platform = Platform::init(config);
    let host = Rc::new(ConsoleHost::new(search_paths));

    let mut args = vec![TypedValue::from(script)];
    args.extend(extra_args.iter().map(|a| TypedValue::parse_atom(a)));

    {
        let mut instance = Instance::create(&platform, host, args)?;
        instance.run_deferred();
        if instance.source_info().is_none() {
            anyhow::bail!("Failed to load script {}", script);
        }

        if loadbang {
            instance.loadbang();
        }
        for message in messages {
            let (inlet, event) = HostEvent::parse(message)?;
            log::debug!("sending '{}' to inlet {}", event, inlet);
            instance.dispatch(inlet, &event);
            instance.run_deferred();
        }
    }

    platform.shutdown()?;
    Ok(())
}

fn check_script(script: &str, config: BridgeConfig) -> Result<()> {
    let platform = Platform::init(config);
    let host = Rc::new(ConsoleHost::new(Vec::new()));

    let diagnostics = {
        let mut instance = Instance::create(&platform, host, vec![TypedValue::from(script)])?;
        instance.run_deferred();
        instance.take_diagnostics()
    };
    platform.shutdown()?;

    println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    if !diagnostics.is_empty() {
        anyhow::bail!("{} diagnostic(s) in {}", diagnostics.len(), script);
    }
    Ok(())
}

/// Host that prints outlet traffic and console lines to stdout/stderr.
pub struct ConsoleHost {
    ledger: PortLedger,
    search_paths: Vec<PathBuf>,
}

impl ConsoleHost {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            ledger: PortLedger::new(),
            search_paths,
        }
    }
}

impl Host for ConsoleHost {
    fn append_inlet(&self, _index: usize) -> PortHandle {
        self.ledger.append(PortKind::Inlet)
    }

    fn remove_inlet(&self, _index: usize, handle: PortHandle) {
        self.ledger.remove(PortKind::Inlet, handle);
    }

    fn append_outlet(&self, _index: usize) -> PortHandle {
        self.ledger.append(PortKind::Outlet)
    }

    fn remove_outlet(&self, _index: usize, handle: PortHandle) {
        self.ledger.remove(PortKind::Outlet, handle);
    }

    fn outlet_list(&self, outlet: PortHandle, values: &[TypedValue]) {
        let index = self
            .ledger
            .index_of(PortKind::Outlet, outlet)
            .map_or_else(|| "?".to_string(), |i| i.to_string());
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        println!("outlet {}: list {}", index, values.join(" "));
    }

    fn info(&self, message: &str) {
        println!("{} {}", LogLevel::Info.prefix(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", LogLevel::Error.prefix(), message);
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return Some(direct);
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}
