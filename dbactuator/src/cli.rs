// Command line surface: global run options plus operation groups

use clap::{Args, Parser, Subcommand};
use common::context::RunContext;
use common::errors::ValidationError;
use common::payload::PayloadFormat;
use common::steps::RollbackPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "dbactuator",
    about = "Run one database administration operation as an ordered list of steps",
    disable_version_flag = true
)]
pub struct Cli {
    #[command(flatten)]
    pub base: BaseOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every operation
#[derive(Args, Debug, Clone, Default)]
pub struct BaseOptions {
    /// Job id
    #[arg(short = 'u', long = "uid", global = true, default_value = "")]
    pub uid: String,

    /// Run id of the orchestrator flow
    #[arg(short = 'r', long = "root_id", global = true, default_value = "")]
    pub root_id: String,

    #[arg(short = 'n', long = "node_id", global = true, default_value = "")]
    pub node_id: String,

    #[arg(short = 'V', long = "version_id", global = true, default_value = "")]
    pub version_id: String,

    /// Operation parameters, base64 encoded unless --payload-format=raw
    #[arg(short = 'p', long = "payload", global = true, default_value = "")]
    pub payload: String,

    #[arg(short = 'm', long = "payload-format", global = true, default_value = "")]
    pub payload_format: String,

    /// Undo succeeded steps when a later step fails
    #[arg(long, global = true)]
    pub rollback: bool,

    /// Print an example payload and exit
    #[arg(long, global = true)]
    pub helper: bool,

    /// `on` for external deployments
    #[arg(long, global = true, env = "ACTUATOR_EXTERNAL", default_value = "")]
    pub external: String,
}

impl BaseOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.helper {
            return Ok(());
        }
        if self.payload.trim().is_empty() {
            return Err(ValidationError::Options("payload need input".to_string()));
        }
        Ok(())
    }

    pub fn is_external(&self) -> bool {
        self.external.trim().eq_ignore_ascii_case("on")
    }

    pub fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::parse(&self.payload_format)
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::new(
            self.uid.clone(),
            self.root_id.clone(),
            self.node_id.clone(),
            self.version_id.clone(),
            self.payload_format(),
        )
    }

    pub fn rollback_policy(&self) -> RollbackPolicy {
        if self.rollback {
            RollbackPolicy::Reverse
        } else {
            RollbackPolicy::None
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Host level operations
    #[command(subcommand)]
    Sys(SysCommand),

    /// MySQL operations
    #[command(subcommand)]
    Mysql(MysqlCommand),

    /// MongoDB operations
    #[command(subcommand)]
    Mongodb(MongodbCommand),

    /// Encrypt or decrypt a value with the actuator key
    #[command(subcommand)]
    Crypt(CryptCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum SysCommand {
    /// Run shell commands on the host
    OsCmdRun,
    /// Report basic host information
    OsInfo,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MysqlCommand {
    /// Dump databases with mysqldump
    Dump,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MongodbCommand {
    /// Back up an instance with the mongodump matching its version
    Backup,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CryptCommand {
    Encrypt(CryptArgs),
    Decrypt(CryptArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CryptArgs {
    /// Plaintext to encrypt, or base64 ciphertext to decrypt
    pub value: String,

    #[arg(long, env = "ACTUATOR_CRYPT_KEY", hide_env_values = true)]
    pub key: String,
}

impl Command {
    /// `<group>-<subcommand>`, used in the log file name
    pub fn log_name(&self) -> &'static str {
        match self {
            Command::Sys(SysCommand::OsCmdRun) => "sys-os-cmd-run",
            Command::Sys(SysCommand::OsInfo) => "sys-os-info",
            Command::Mysql(MysqlCommand::Dump) => "mysql-dump",
            Command::Mongodb(MongodbCommand::Backup) => "mongodb-backup",
            Command::Crypt(CryptCommand::Encrypt(_)) => "crypt-encrypt",
            Command::Crypt(CryptCommand::Decrypt(_)) => "crypt-decrypt",
        }
    }
}
