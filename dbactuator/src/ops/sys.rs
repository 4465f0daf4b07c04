// Host level operations: shell command execution and host information

use super::run_program;
use crate::runner::Operation;
use anyhow::{Context, Result};
use common::binder::{BindMode, Params};
use common::config::Settings;
use common::context::ActuatorContext;
use common::env::EnvBinding;
use common::schema::{Rule, Schema};
use common::steps::{Step, Steps};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OsCmdRunParams {
    pub commands: Vec<String>,
    /// Working directory; empty means the actuator's own
    pub work_dir: String,
}

impl Params for OsCmdRunParams {
    fn env_bindings() -> &'static [EnvBinding] {
        const BINDINGS: &[EnvBinding] = &[EnvBinding::new("work_dir", "ACTUATOR_WORK_DIR")];
        BINDINGS
    }

    fn schema() -> Schema {
        Schema::new().field(
            "commands",
            [Rule::Required, Rule::Each(vec![Rule::Required])],
        )
    }

    fn example() -> Self {
        Self {
            commands: vec!["df -h".to_string(), "uptime".to_string()],
            work_dir: "/data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
}

pub struct OsCmdRun {
    params: OsCmdRunParams,
    outputs: Vec<CommandOutput>,
}

impl OsCmdRun {
    fn check(&mut self, _ctx: &ActuatorContext) -> Result<()> {
        for (i, command) in self.params.commands.iter().enumerate() {
            if command.trim().is_empty() {
                anyhow::bail!("command #{} is blank", i);
            }
        }
        if !self.params.work_dir.is_empty() && !Path::new(&self.params.work_dir).is_dir() {
            anyhow::bail!("work dir {} does not exist", self.params.work_dir);
        }
        Ok(())
    }

    fn run(&mut self, ctx: &ActuatorContext) -> Result<()> {
        self.outputs.clear();
        for command in &self.params.commands {
            info!(command = %command, "Running command");
            let mut process = Command::new("bash");
            process.arg("-c").arg(command);
            if !self.params.work_dir.is_empty() {
                process.current_dir(&self.params.work_dir);
            }

            let output = run_program(process, None)
                .with_context(|| format!("command `{}` failed", command))?;
            self.outputs.push(CommandOutput {
                command: command.clone(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            });
        }
        ctx.output_ctx(&self.outputs)?;
        Ok(())
    }
}

impl Operation for OsCmdRun {
    type Params = OsCmdRunParams;
    const MODE: BindMode = BindMode::FlatSimple;

    fn new(params: Self::Params, _settings: &Settings) -> Result<Self> {
        Ok(Self {
            params,
            outputs: Vec::new(),
        })
    }

    fn steps(&self) -> Steps<Self> {
        Steps::new()
            .step(Step::new("Check commands", Self::check))
            .step(Step::new("Run commands", Self::run))
    }
}

const HOST_ITEMS: &[&str] = &["hostname", "os", "arch", "cpu", "memory", "kernel"];

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OsInfoParams {
    /// Items to report; empty reports everything
    pub items: Vec<String>,
}

impl Params for OsInfoParams {
    fn schema() -> Schema {
        Schema::new().field("items", [Rule::Each(vec![Rule::OneOf(HOST_ITEMS)])])
    }

    fn example() -> Self {
        Self {
            items: vec!["hostname".to_string(), "memory".to_string()],
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct HostInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<usize>,
    /// Total memory in KiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
}

pub struct OsInfo {
    params: OsInfoParams,
    info: HostInfo,
}

impl OsInfo {
    fn wants(&self, item: &str) -> bool {
        self.params.items.is_empty() || self.params.items.iter().any(|i| i == item)
    }

    fn collect(&mut self, _ctx: &ActuatorContext) -> Result<()> {
        let mut info = HostInfo::default();
        if self.wants("hostname") {
            info.hostname = Some(read_trimmed("/proc/sys/kernel/hostname")?);
        }
        if self.wants("os") {
            info.os = Some(std::env::consts::OS.to_string());
        }
        if self.wants("arch") {
            info.arch = Some(std::env::consts::ARCH.to_string());
        }
        if self.wants("cpu") {
            info.cpu = Some(std::thread::available_parallelism()?.get());
        }
        if self.wants("memory") {
            let meminfo = std::fs::read_to_string("/proc/meminfo").context("read /proc/meminfo")?;
            info.memory_kb = Some(parse_mem_total(&meminfo)?);
        }
        if self.wants("kernel") {
            info.kernel = Some(read_trimmed("/proc/sys/kernel/osrelease")?);
        }
        self.info = info;
        Ok(())
    }

    fn output(&mut self, ctx: &ActuatorContext) -> Result<()> {
        ctx.output_ctx(&self.info)?;
        Ok(())
    }
}

impl Operation for OsInfo {
    type Params = OsInfoParams;
    const MODE: BindMode = BindMode::FlatSimple;

    fn new(params: Self::Params, _settings: &Settings) -> Result<Self> {
        Ok(Self {
            params,
            info: HostInfo::default(),
        })
    }

    fn steps(&self) -> Steps<Self> {
        Steps::new()
            .step(Step::new("Collect host info", Self::collect))
            .step(Step::new("Output host info", Self::output))
    }
}

fn read_trimmed(path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path))?
        .trim()
        .to_string())
}

fn parse_mem_total(meminfo: &str) -> Result<u64> {
    let line = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .context("MemTotal missing from meminfo")?;
    let value = line
        .split_whitespace()
        .nth(1)
        .context("MemTotal has no value")?;
    Ok(value.parse()?)
}
