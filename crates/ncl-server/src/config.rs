use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ncl_bus::BusConfig;
use ncl_ledger::ConsentLedger;
use ncl_store::StoreConfig;

use crate::auth::{AllowAllAuth, AuthProvider, TokenAuth};
use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub ledger_name: String,
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8600)),
            data_dir: PathBuf::from("ncl-data"),
            ledger_name: ConsentLedger::DEFAULT_NAME.into(),
            store: StoreConfig::default(),
            bus: BusConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Who may set consent over HTTP.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    AllowAll,
    Token { tokens: Vec<String> },
}

impl AuthConfig {
    pub fn provider(&self) -> Arc<dyn AuthProvider> {
        match self {
            Self::AllowAll => Arc::new(AllowAllAuth),
            Self::Token { tokens } => Arc::new(TokenAuth::new(tokens.iter().cloned())),
        }
    }
}
