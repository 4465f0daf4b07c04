// MongoDB backup and tool binary resolution by server version

use super::{ensure_file, run_program};
use crate::runner::Operation;
use anyhow::{Context, Result};
use chrono::Local;
use common::binder::{BindMode, Params};
use common::config::Settings;
use common::context::ActuatorContext;
use common::general::GeneralParams;
use common::schema::{Rule, Schema};
use common::steps::{Step, Steps};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::info;

/// Version of the standalone database tools used for servers >= 4.4
pub const DATABASE_TOOLS_VERSION: &str = "100.7";

/// `major.minor` of a server version such as `4.2.24` or `3.4`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MongoVersion {
    pub major: u32,
    pub minor: u32,
}

impl FromStr for MongoVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches(['v', 'V']);
        let mut parts = s.split('.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .with_context(|| format!("invalid mongo version {:?}", s))?
            .parse::<u32>()
            .with_context(|| format!("invalid mongo version {:?}", s))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse::<u32>()
                .with_context(|| format!("invalid mongo version {:?}", s))?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for MongoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn mongotools_dir(tool_dir: &Path) -> PathBuf {
    tool_dir.join("mongotools")
}

/// mongodump matching a server version
///
/// 2.x is unsupported; 3.x, 4.0 and 4.2 have a per-version binary; everything
/// newer uses the standalone database tools.
pub fn mongodump_binary(tool_dir: &Path, version: MongoVersion) -> Result<PathBuf> {
    let name = match (version.major, version.minor) {
        (0..=2, _) => anyhow::bail!("not support version:{}", version),
        (3, minor) | (4, minor @ (0 | 2)) => format!("mongodump.{}.{}", version.major, minor),
        _ => format!("mongodump.{}", DATABASE_TOOLS_VERSION),
    };
    Ok(mongotools_dir(tool_dir).join(name))
}

/// mongorestore matching a server version; every supported version uses the
/// standalone database tools
pub fn mongorestore_binary(tool_dir: &Path, version: MongoVersion) -> Result<PathBuf> {
    if version.major <= 2 {
        anyhow::bail!("not support version:{}", version);
    }
    Ok(mongotools_dir(tool_dir).join(format!("mongorestore.{}", DATABASE_TOOLS_VERSION)))
}

/// Shell of an installed server: `mongosh` from 6.0 on, `mongo` before
pub fn mongo_shell_binary(install_dir: &Path, version: MongoVersion) -> PathBuf {
    let name = if version.major >= 6 { "mongosh" } else { "mongo" };
    install_dir.join("bin").join(name)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackupParams {
    pub ip: String,
    pub port: u16,
    /// Server version, e.g. `4.2.24`
    pub db_version: String,
    pub backup_dir: String,
    /// Databases to dump; empty dumps the whole instance
    pub dbs: Vec<String>,
    /// Include the oplog for a point in time snapshot; whole instance only
    pub oplog: bool,
    pub gzip: bool,
    /// Accounts at the same level as the backup fields
    pub general: GeneralParams,
}

impl Default for BackupParams {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 27017,
            db_version: String::new(),
            backup_dir: String::new(),
            dbs: Vec::new(),
            oplog: false,
            gzip: true,
            general: GeneralParams::default(),
        }
    }
}

impl Params for BackupParams {
    fn schema() -> Schema {
        Schema::new()
            .field("ip", [Rule::Required])
            .field("port", [Rule::Min(1.0), Rule::Max(65535.0)])
            .field("db_version", [Rule::Required, Rule::Pattern(r"^v?\d+(\.\d+)*")])
            .field("backup_dir", [Rule::Required])
            .field("dbs", [Rule::Each(vec![Rule::Required])])
            .field("general.runtime_account.backup_user", [Rule::Required])
    }

    fn example() -> Self {
        let mut general = GeneralParams::default();
        general.runtime_account.backup_user = "backup".to_string();
        general.runtime_account.backup_pwd = "xxx".to_string();
        Self {
            ip: "1.1.1.1".to_string(),
            db_version: "4.2.24".to_string(),
            backup_dir: "/data/dbbak".to_string(),
            general,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BackupResult {
    pub binary: PathBuf,
    /// Shell matching the server, for follow-up checks by the orchestrator
    pub shell: PathBuf,
    pub backup_path: PathBuf,
}

pub struct MongoBackup {
    params: BackupParams,
    tool_dir: PathBuf,
    install_dir: PathBuf,
    binary: PathBuf,
    shell: PathBuf,
    backup_path: PathBuf,
}

impl MongoBackup {
    fn resolve(&mut self, _ctx: &ActuatorContext) -> Result<()> {
        let version: MongoVersion = self.params.db_version.parse()?;
        if self.params.oplog && !self.params.dbs.is_empty() {
            anyhow::bail!("oplog can only be used when dumping the whole instance");
        }

        self.binary = mongodump_binary(&self.tool_dir, version)?;
        ensure_file(&self.binary)?;
        self.shell = mongo_shell_binary(&self.install_dir, version);
        info!(version = %version, binary = %self.binary.display(), "Dump binary resolved");
        Ok(())
    }

    fn backup_args(&self) -> Vec<String> {
        let p = &self.params;
        let mut args = vec![
            "--host".to_string(),
            p.ip.clone(),
            "--port".to_string(),
            p.port.to_string(),
            "--username".to_string(),
            p.general.runtime_account.backup_user.clone(),
            "--authenticationDatabase".to_string(),
            "admin".to_string(),
            format!("--out={}", self.backup_path.display()),
        ];
        if p.gzip {
            args.push("--gzip".to_string());
        }
        if p.oplog {
            args.push("--oplog".to_string());
        }
        args
    }

    fn backup(&mut self, ctx: &ActuatorContext) -> Result<()> {
        let base = Path::new(&self.params.backup_dir).join(format!(
            "{}-{}-{}",
            self.params.ip,
            self.params.port,
            Local::now().format("%Y%m%d%H%M%S")
        ));
        std::fs::create_dir_all(&base).with_context(|| format!("create {}", base.display()))?;

        let targets: Vec<Option<&String>> = if self.params.dbs.is_empty() {
            vec![None]
        } else {
            self.params.dbs.iter().map(Some).collect()
        };

        self.backup_path = base;
        for db in targets {
            let mut args = self.backup_args();
            if let Some(db) = db {
                args.push(format!("--db={}", db));
            }
            let mut command = Command::new(&self.binary);
            command
                .args(&args)
                .arg(format!("--password={}", self.params.general.runtime_account.backup_pwd));

            run_program(command, Some(&args.join(" ")))?;
        }

        info!(backup_path = %self.backup_path.display(), "Backup finished");
        ctx.output_ctx(&BackupResult {
            binary: self.binary.clone(),
            shell: self.shell.clone(),
            backup_path: self.backup_path.clone(),
        })?;
        Ok(())
    }
}

impl Operation for MongoBackup {
    type Params = BackupParams;
    const MODE: BindMode = BindMode::FlatStrict;

    fn new(params: Self::Params, settings: &Settings) -> Result<Self> {
        Ok(Self {
            params,
            tool_dir: settings.tools.db_tool_dir.clone(),
            install_dir: settings.tools.mongo_install_dir.clone(),
            binary: PathBuf::new(),
            shell: PathBuf::new(),
            backup_path: PathBuf::new(),
        })
    }

    fn steps(&self) -> Steps<Self> {
        Steps::new()
            .step(Step::new("Resolve dump binary", Self::resolve))
            .step(Step::new("Run backup", Self::backup))
    }
}
