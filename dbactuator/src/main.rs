// dbactuator entry point: one operation per invocation

mod cli;
mod ops;
mod runner;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, MongodbCommand, MysqlCommand, SysCommand};
use common::config::Settings;
use common::telemetry::init_logging;
use ops::mongodb::MongoBackup;
use ops::mysql::MysqlDump;
use ops::sys::{OsCmdRun, OsInfo};
use runner::run_operation;
use tracing::{error, info, Instrument};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let run = cli.base.run_context();
    // Crypt is a plain utility without a run log
    if !cli.base.helper && !matches!(cli.command, Command::Crypt(_)) {
        init_logging(&settings.log, &run, cli.command.log_name())?;
    }

    let span = run.span();
    let result = dispatch(&cli, &settings).instrument(span.clone()).await;

    let _entered = span.enter();
    match &result {
        Ok(()) => info!(command = cli.command.log_name(), "Operation finished successfully"),
        Err(e) => error!(command = cli.command.log_name(), error = %format!("{:#}", e), "Operation failed"),
    }
    result
}

async fn dispatch(cli: &Cli, settings: &Settings) -> Result<()> {
    let base = &cli.base;
    match &cli.command {
        Command::Sys(SysCommand::OsCmdRun) => run_operation::<OsCmdRun>(base, settings).await,
        Command::Sys(SysCommand::OsInfo) => run_operation::<OsInfo>(base, settings).await,
        Command::Mysql(MysqlCommand::Dump) => run_operation::<MysqlDump>(base, settings).await,
        Command::Mongodb(MongodbCommand::Backup) => {
            run_operation::<MongoBackup>(base, settings).await
        }
        Command::Crypt(command) => {
            println!("{}", ops::crypt::execute(command)?);
            Ok(())
        }
    }
}
