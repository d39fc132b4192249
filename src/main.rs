use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use voidbot::application::errors::{BotError, ConfigError};
use voidbot::application::messaging::HandlerRegistry;
use voidbot::infrastructure::adapters::{ConsoleAdapter, Interrupt, IrcAdapter, SessionEnd};
use voidbot::infrastructure::config::Config;
use voidbot::infrastructure::database::DatabaseRegistry;
use voidbot::plugins::{builtin, PluginManager};

#[derive(Parser)]
#[command(name = "voidbot")]
#[command(about = "A plugin-driven IRC bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run the bot
    Run,
    /// Show version
    Version,
    /// Print a default config
    InitConfig,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_bot(&cli.config),
        Commands::Version => {
            println!("voidbot v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::InitConfig => init_config(),
    }
}

fn run_bot(config_path: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let manager = match PluginManager::builder()
        .plugins(builtin::all())
        .resources(Arc::new(DatabaseRegistry::sqlite()))
        .build()
    {
        Ok(manager) => manager,
        Err(e) => {
            tracing::error!("Failed to register plugins: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C during init must still lead to teardown
    let (interrupt_tx, mut interrupts) = mpsc::unbounded_channel();
    {
        let _enter = runtime.enter();
        spawn_signal_listener(interrupt_tx.clone());
    }

    if let Err(e) = manager.invoke_init(config.plugins.as_deref(), &config.plugin_config) {
        tracing::error!("Error in plugin init: {}", e);
        if !e.is_fatal() {
            teardown(&manager);
        }
        return ExitCode::FAILURE;
    }

    if let Ok(plugins) = manager.list_plugins() {
        let active: Vec<String> = plugins
            .into_iter()
            .filter(|p| p.inited && !p.name.is_empty())
            .map(|p| p.name)
            .collect();
        tracing::info!("Plugins enabled: {}", active.join(", "));
    }

    let result = if interrupts.try_recv().is_ok() {
        tracing::info!("Interrupted during init");
        Ok(())
    } else {
        runtime.block_on(connection_loop(&config, &manager, interrupt_tx, &mut interrupts))
    };
    teardown(&manager);
    tracing::info!("Goodbye");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load and validate the config. A missing file gets a sample written in its
/// place and exit status 2.
fn load_config(path: &str) -> Result<Config, ExitCode> {
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => {
            return match Config::write_sample(path) {
                Ok(()) => {
                    tracing::error!("Config file not found. A sample config has been written out as {}", path);
                    Err(ExitCode::from(2))
                }
                Err(e) => {
                    tracing::error!(
                        "Config file not found. An error occurred while trying to write the sample config: {}",
                        e
                    );
                    Err(ExitCode::FAILURE)
                }
            };
        }
        Err(e) => {
            tracing::error!("An error occurred while reading {}: {}", path, e);
            return Err(ExitCode::FAILURE);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Invalid config {}: {}", path, e);
        return Err(ExitCode::FAILURE);
    }
    Ok(config)
}

/// Connect, serve, and reconnect until asked to quit
async fn connection_loop(
    config: &Config,
    manager: &PluginManager,
    interrupt_tx: mpsc::UnboundedSender<Interrupt>,
    interrupts: &mut mpsc::UnboundedReceiver<Interrupt>,
) -> Result<(), BotError> {
    let console = ConsoleAdapter::new();
    console
        .spawn(interrupt_tx)
        .map_err(|e| BotError::Internal(format!("Failed to start console: {}", e)))?;

    let adapter = IrcAdapter::new(config);
    loop {
        let session = adapter.connect().await?;
        console.replace_connection(Some(session.connection()));

        let mut handlers = HandlerRegistry::new();
        add_console_logging(&mut handlers);
        manager.invoke_new_connection(&mut handlers)?;

        let end = session.run(&handlers, interrupts).await.unwrap_or_else(|e| {
            tracing::warn!("Connection lost: {}", e);
            SessionEnd::Disconnected
        });
        console.replace_connection(None);
        manager.invoke_disconnected()?;

        if end == SessionEnd::Quit {
            return Ok(());
        }

        tracing::info!("Reconnecting in {}s", config.reconnect_delay_secs);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.reconnect_delay_secs)) => {}
            _ = interrupts.recv() => return Ok(()),
        }
    }
}

fn spawn_signal_listener(interrupts: mpsc::UnboundedSender<Interrupt>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupts.send(Interrupt).is_err() {
                break;
            }
        }
    });
}

/// Echo private messages and our own joins/parts to the log
fn add_console_logging(handlers: &mut HandlerRegistry) {
    for command in ["PRIVMSG", "NOTICE"] {
        handlers.add_handler(command, |conn, line| {
            if line.arg(0).is_some_and(|dst| dst.eq_ignore_ascii_case(&conn.me())) {
                tracing::info!("{}", line.raw);
            }
        });
    }
    handlers.add_handler("JOIN", |conn, line| {
        if line.is_from(&conn.me()) {
            tracing::info!("! Channel {} joined", line.arg(0).unwrap_or_default());
        }
    });
    handlers.add_handler("PART", |conn, line| {
        if line.is_from(&conn.me()) {
            tracing::info!("! Channel {} left", line.arg(0).unwrap_or_default());
        }
    });
}

fn teardown(manager: &PluginManager) {
    match manager.invoke_teardown() {
        Ok(failures) if failures.is_empty() => {}
        Ok(failures) => tracing::warn!("{} plugin(s) failed to tear down", failures.len()),
        Err(e) => tracing::error!("Error in plugin teardown: {}", e),
    }
}

fn init_config() -> ExitCode {
    match serde_yaml::to_string(&Config::default()) {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to render config: {}", e);
            ExitCode::FAILURE
        }
    }
}
