// Shared runtime accounts delivered under the `general` key of a payload

use crate::binder::Params;
use crate::env::EnvBinding;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope of credentials shared by most operations
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneralParams {
    #[serde(default)]
    pub runtime_account: RuntimeAccount,
}

/// Database accounts the actuator may act as
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeAccount {
    pub admin_user: String,
    pub admin_pwd: String,
    pub monitor_user: String,
    pub monitor_pwd: String,
    pub repl_user: String,
    pub repl_pwd: String,
    pub dba_user: String,
    pub dba_pwd: String,
    pub backup_user: String,
    pub backup_pwd: String,
    pub proxy_admin_user: String,
    pub proxy_admin_pwd: String,
}

const MASK: &str = "******";

fn masked(secret: &str) -> &str {
    if secret.is_empty() {
        ""
    } else {
        MASK
    }
}

// Passwords never reach the logs through Debug
impl fmt::Debug for RuntimeAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeAccount")
            .field("admin_user", &self.admin_user)
            .field("admin_pwd", &masked(&self.admin_pwd))
            .field("monitor_user", &self.monitor_user)
            .field("monitor_pwd", &masked(&self.monitor_pwd))
            .field("repl_user", &self.repl_user)
            .field("repl_pwd", &masked(&self.repl_pwd))
            .field("dba_user", &self.dba_user)
            .field("dba_pwd", &masked(&self.dba_pwd))
            .field("backup_user", &self.backup_user)
            .field("backup_pwd", &masked(&self.backup_pwd))
            .field("proxy_admin_user", &self.proxy_admin_user)
            .field("proxy_admin_pwd", &masked(&self.proxy_admin_pwd))
            .finish()
    }
}

impl fmt::Debug for GeneralParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneralParams")
            .field("runtime_account", &self.runtime_account)
            .finish()
    }
}

const GENERAL_ENV: &[EnvBinding] = &[
    EnvBinding::new("runtime_account.admin_user", "GENERAL_ACCOUNT_ADMIN_USER"),
    EnvBinding::new("runtime_account.admin_pwd", "GENERAL_ACCOUNT_ADMIN_PWD"),
    EnvBinding::new("runtime_account.monitor_user", "GENERAL_ACCOUNT_MONITOR_USER"),
    EnvBinding::new("runtime_account.monitor_pwd", "GENERAL_ACCOUNT_MONITOR_PWD"),
    EnvBinding::new("runtime_account.repl_user", "GENERAL_ACCOUNT_REPL_USER"),
    EnvBinding::new("runtime_account.repl_pwd", "GENERAL_ACCOUNT_REPL_PWD"),
    EnvBinding::new("runtime_account.dba_user", "GENERAL_ACCOUNT_DBA_USER"),
    EnvBinding::new("runtime_account.dba_pwd", "GENERAL_ACCOUNT_DBA_PWD"),
    EnvBinding::new("runtime_account.backup_user", "GENERAL_ACCOUNT_BACKUP_USER"),
    EnvBinding::new("runtime_account.backup_pwd", "GENERAL_ACCOUNT_BACKUP_PWD"),
    EnvBinding::new("runtime_account.proxy_admin_user", "GENERAL_ACCOUNT_PROXY_ADMIN_USER"),
    EnvBinding::new("runtime_account.proxy_admin_pwd", "GENERAL_ACCOUNT_PROXY_ADMIN_PWD"),
];

impl Params for GeneralParams {
    fn env_bindings() -> &'static [EnvBinding] {
        GENERAL_ENV
    }

    fn example() -> Self {
        Self {
            runtime_account: RuntimeAccount {
                admin_user: "ADMIN".to_string(),
                admin_pwd: "xxx".to_string(),
                monitor_user: "MONITOR".to_string(),
                monitor_pwd: "xxx".to_string(),
                repl_user: "REPL".to_string(),
                repl_pwd: "xxx".to_string(),
                ..RuntimeAccount::default()
            },
        }
    }
}
