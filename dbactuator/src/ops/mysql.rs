// MySQL dump: mysqldump with the shared admin account plus a sha256 manifest

use super::{ensure_file, run_program};
use crate::runner::Operation;
use anyhow::{Context, Result};
use chrono::Local;
use common::binder::{BindMode, Params};
use common::config::Settings;
use common::context::ActuatorContext;
use common::env::EnvBinding;
use common::schema::{Rule, Schema};
use common::steps::{Step, Steps};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

const CHARSETS: &[&str] = &["utf8", "utf8mb4", "latin1", "gbk", "binary"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DumpParams {
    pub host: String,
    pub port: u16,
    pub charset: String,
    pub databases: Vec<String>,
    /// Restrict the dump to these tables; only valid with a single database
    pub tables: Vec<String>,
    pub backup_dir: String,
    /// Dump file name; generated from host, port and time when empty
    pub file_name: String,
    /// Schema only
    pub no_data: bool,
}

impl Default for DumpParams {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 3306,
            charset: "utf8mb4".to_string(),
            databases: Vec::new(),
            tables: Vec::new(),
            backup_dir: String::new(),
            file_name: String::new(),
            no_data: false,
        }
    }
}

impl Params for DumpParams {
    fn env_bindings() -> &'static [EnvBinding] {
        const BINDINGS: &[EnvBinding] = &[
            EnvBinding::new("port", "MYSQL_DUMP_PORT"),
            EnvBinding::new("backup_dir", "MYSQL_DUMP_DIR"),
        ];
        BINDINGS
    }

    fn schema() -> Schema {
        Schema::new()
            .field("host", [Rule::Required])
            .field("port", [Rule::Min(1.0), Rule::Max(65535.0)])
            .field("charset", [Rule::OneOf(CHARSETS)])
            .field(
                "databases",
                [
                    Rule::Required,
                    Rule::Each(vec![Rule::Required, Rule::Pattern(r"^[A-Za-z0-9_$-]+$")]),
                ],
            )
            .field("tables", [Rule::Each(vec![Rule::Required])])
            .field("backup_dir", [Rule::Required])
            .field("file_name", [Rule::Pattern(r"^[^/]*$")])
    }

    fn example() -> Self {
        Self {
            host: "1.1.1.1".to_string(),
            databases: vec!["db1".to_string()],
            tables: vec!["tb1".to_string()],
            backup_dir: "/data/dbbak".to_string(),
            ..Self::default()
        }
    }
}

/// Result reported to the orchestrator
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DumpResult {
    pub dump_file: PathBuf,
    pub checksum_file: PathBuf,
    pub sha256: String,
    pub size: u64,
}

pub struct MysqlDump {
    params: DumpParams,
    mysqldump: PathBuf,
    dump_file: PathBuf,
}

impl MysqlDump {
    fn init(&mut self, ctx: &ActuatorContext) -> Result<()> {
        if !self.params.tables.is_empty() && self.params.databases.len() != 1 {
            anyhow::bail!("tables can only be given together with exactly one database");
        }
        if ctx.general().runtime_account.admin_user.is_empty() {
            anyhow::bail!("admin account missing from general runtime accounts");
        }
        ensure_file(&self.mysqldump).context("mysqldump is not installed")?;

        let dir = Path::new(&self.params.backup_dir);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create backup dir {}", dir.display()))?;

        let file_name = if self.params.file_name.is_empty() {
            format!(
                "{}-{}-{}.sql",
                self.params.host,
                self.params.port,
                Local::now().format("%Y%m%d%H%M%S")
            )
        } else {
            self.params.file_name.clone()
        };
        self.dump_file = dir.join(file_name);
        info!(dump_file = %self.dump_file.display(), "Dump target resolved");
        Ok(())
    }

    /// mysqldump arguments, without the password
    fn dump_args(&self, user: &str) -> Vec<String> {
        let p = &self.params;
        let mut args = vec![
            format!("-h{}", p.host),
            format!("-P{}", p.port),
            format!("-u{}", user),
            format!("--default-character-set={}", p.charset),
            "--single-transaction".to_string(),
            "--quick".to_string(),
            "--skip-opt".to_string(),
            "--create-options".to_string(),
            "--set-gtid-purged=OFF".to_string(),
            format!("--result-file={}", self.dump_file.display()),
        ];
        if p.no_data {
            args.push("--no-data".to_string());
        } else {
            args.extend(["--routines", "--triggers", "--events"].map(String::from));
        }

        if p.tables.is_empty() {
            args.push("--databases".to_string());
            args.extend(p.databases.iter().cloned());
        } else {
            args.extend(p.databases.iter().cloned());
            args.extend(p.tables.iter().cloned());
        }
        args
    }

    fn dump(&mut self, ctx: &ActuatorContext) -> Result<()> {
        self.remove_dump_file()?;

        let account = &ctx.general().runtime_account;
        let args = self.dump_args(&account.admin_user);
        let mut command = Command::new(&self.mysqldump);
        command.args(&args).env("MYSQL_PWD", &account.admin_pwd);

        run_program(command, Some(&args.join(" ")))?;
        info!(dump_file = %self.dump_file.display(), "Dump finished");
        Ok(())
    }

    fn remove_dump_file(&mut self) -> Result<()> {
        if self.dump_file.exists() {
            warn!(dump_file = %self.dump_file.display(), "Removing existing dump file");
            std::fs::remove_file(&self.dump_file)
                .with_context(|| format!("remove {}", self.dump_file.display()))?;
        }
        Ok(())
    }

    fn write_checksum(&mut self, ctx: &ActuatorContext) -> Result<()> {
        let (sha256, size) = sha256_file(&self.dump_file)?;
        let mut checksum_file = self.dump_file.clone().into_os_string();
        checksum_file.push(".sha256");
        let checksum_file = PathBuf::from(checksum_file);

        let name = self
            .dump_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        std::fs::write(&checksum_file, format!("{}  {}\n", sha256, name))
            .with_context(|| format!("write {}", checksum_file.display()))?;

        ctx.output_ctx(&DumpResult {
            dump_file: self.dump_file.clone(),
            checksum_file,
            sha256,
            size,
        })?;
        Ok(())
    }
}

impl Operation for MysqlDump {
    type Params = DumpParams;
    const MODE: BindMode = BindMode::LayeredEnvelope;

    fn new(params: Self::Params, settings: &Settings) -> Result<Self> {
        Ok(Self {
            params,
            mysqldump: settings.tools.mysqldump.clone(),
            dump_file: PathBuf::new(),
        })
    }

    fn steps(&self) -> Steps<Self> {
        Steps::new()
            .step(Step::new("Init", Self::init))
            .step(
                Step::new("Run dump", Self::dump)
                    .with_retry(1)
                    .with_rollback(|dump: &mut MysqlDump, _ctx: &ActuatorContext| {
                        dump.remove_dump_file()
                    }),
            )
            .step(Step::new("Write checksum", Self::write_checksum))
    }
}

/// Hex sha256 and size of a file
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::binder::PayloadBinder;
    use common::context::RunContext;
    use common::payload::PayloadFormat;
    use std::collections::HashMap;

    fn dump_with(params: DumpParams) -> MysqlDump {
        let mut dump = MysqlDump::new(params, &Settings::default()).unwrap();
        dump.dump_file = PathBuf::from("/data/dbbak/a.sql");
        dump
    }

    #[test]
    fn test_dump_args_for_databases() {
        let dump = dump_with(DumpParams {
            host: "10.0.0.1".to_string(),
            databases: vec!["db1".to_string(), "db2".to_string()],
            ..DumpParams::default()
        });

        let args = dump.dump_args("admin");

        assert!(args.contains(&"-h10.0.0.1".to_string()));
        assert!(args.contains(&"-P3306".to_string()));
        assert!(args.contains(&"-uadmin".to_string()));
        assert!(args.contains(&"--result-file=/data/dbbak/a.sql".to_string()));
        assert!(args.contains(&"--routines".to_string()));
        assert_eq!(&args[args.len() - 3..], ["--databases", "db1", "db2"]);
        assert!(!args.iter().any(|a| a.contains("pwd") || a.starts_with("-p")));
    }

    #[test]
    fn test_dump_args_for_tables_and_no_data() {
        let dump = dump_with(DumpParams {
            host: "h".to_string(),
            databases: vec!["db1".to_string()],
            tables: vec!["t1".to_string(), "t2".to_string()],
            no_data: true,
            ..DumpParams::default()
        });

        let args = dump.dump_args("admin");

        assert!(args.contains(&"--no-data".to_string()));
        assert!(!args.contains(&"--databases".to_string()));
        assert_eq!(&args[args.len() - 3..], ["db1", "t1", "t2"]);
    }

    #[test]
    fn test_layered_payload_binds_and_validates() {
        let env: HashMap<String, String> = HashMap::new();
        let mut ctx = ActuatorContext::new(RunContext::default(), false);
        let payload = r#"{
            "general": {"runtime_account": {"admin_user": "ADMIN", "admin_pwd": "secret"}},
            "extend": {"host": "1.1.1.1", "databases": ["db1"], "backup_dir": "/data/dbbak"}
        }"#;

        let params: DumpParams = PayloadBinder::new(payload, PayloadFormat::Raw, &env)
            .bind(BindMode::LayeredEnvelope, &mut ctx)
            .unwrap();

        assert_eq!(params.port, 3306);
        assert_eq!(params.charset, "utf8mb4");
        assert_eq!(ctx.general().runtime_account.admin_pwd, "secret");

        let bad = r#"{"extend": {"host": "h", "databases": ["db 1"], "backup_dir": "/d"}}"#;
        let err = PayloadBinder::new(bad, PayloadFormat::Raw, &env)
            .bind::<DumpParams>(BindMode::LayeredEnvelope, &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("extend.databases[0]"));
    }

    #[test]
    fn test_init_requires_admin_account_and_tool() {
        let dir = tempfile::tempdir().unwrap();
        let params = DumpParams {
            host: "h".to_string(),
            databases: vec!["db1".to_string()],
            backup_dir: dir.path().join("bak").to_string_lossy().into_owned(),
            ..DumpParams::default()
        };
        let mut dump = MysqlDump::new(params, &Settings::default()).unwrap();

        let ctx = ActuatorContext::new(RunContext::default(), false);
        assert!(dump.init(&ctx).is_err());
    }

    #[test]
    fn test_checksum_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.sql");
        std::fs::write(&file, b"abc").unwrap();
        let mut dump = dump_with(DumpParams::default());
        dump.dump_file = file.clone();

        dump.write_checksum(&ActuatorContext::default()).unwrap();

        let manifest = std::fs::read_to_string(dir.path().join("a.sql.sha256")).unwrap();
        assert_eq!(
            manifest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  a.sql\n"
        );
        assert_eq!(sha256_file(&file).unwrap().1, 3);
    }

    #[test]
    fn test_dump_runs_tool_with_password_in_env() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mysqldump");
        std::fs::write(
            &tool,
            "#!/bin/sh\nfor a in \"$@\"; do case $a in --result-file=*) f=${a#--result-file=};; esac; done\necho \"-- $MYSQL_PWD\" > \"$f\"\n",
        )
        .unwrap();
        make_executable(&tool);

        let mut settings = Settings::default();
        settings.tools.mysqldump = tool;
        let params = DumpParams {
            host: "h".to_string(),
            databases: vec!["db1".to_string()],
            backup_dir: dir.path().join("bak").to_string_lossy().into_owned(),
            file_name: "out.sql".to_string(),
            ..DumpParams::default()
        };
        let mut dump = MysqlDump::new(params, &settings).unwrap();
        let env: HashMap<String, String> = HashMap::new();
        let mut ctx = ActuatorContext::new(RunContext::default(), false);
        let _: DumpParams = PayloadBinder::new(
            r#"{"general":{"runtime_account":{"admin_user":"ADMIN","admin_pwd":"pw"}},"extend":{"host":"h","databases":["db1"],"backup_dir":"/x"}}"#,
            PayloadFormat::Raw,
            &env,
        )
        .bind(BindMode::LayeredEnvelope, &mut ctx)
        .unwrap();

        dump.steps().run(&mut dump, &ctx).unwrap();

        let out = dir.path().join("bak").join("out.sql");
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "-- pw\n");
        assert!(dir.path().join("bak").join("out.sql.sha256").exists());
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
