use std::path::PathBuf;

use clap::Parser;
use dotenv::dotenv;
use tokio::runtime;
use wirebroker::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, Broker, BrokerConfig,
    GLOBAL_CONFIG,
};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level when RUST_LOG is unset (default: info, v: debug, vv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// also write logs to a rolling file and export traces and metrics over OTLP
    #[arg(long)]
    pub otel: bool,
}

#[derive(Parser)]
pub enum Command {
    /// print the effective configuration and exit
    PrintConfig,
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("./conf.toml"), PathBuf::from);
    // the path comes from the command line, so the config is set here rather than lazily
    let broker_config = BrokerConfig::set_up_config(config_path)?;
    GLOBAL_CONFIG
        .set(broker_config)
        .map_err(|_| AppError::IllegalStateError("broker config already set".to_string()))?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", global_config());
        return Ok(());
    }

    // startup tokio runtime
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;

    let _otel_guard = if commandline.otel {
        Some(rt.block_on(setup_tracing(&global_config().log, commandline.verbose))?)
    } else {
        setup_local_tracing(commandline.verbose)?;
        None
    };

    let mut broker = Broker::new(Broker::default_dispatch_table()?);
    broker.start(&rt)?;

    Ok(())
}
