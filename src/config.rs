//! Command line and environment configuration.

use std::net::SocketAddr;

use clap::Parser;

use crate::access::DEFAULT_ADMIN_CREDENTIAL;
use crate::session::SessionConfig;

/// geneblock - tamper-evident genetic record ledger
#[derive(Parser, Debug, Clone)]
#[command(name = "geneblock")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address to serve the HTTP API on
    #[arg(long, env = "GENEBLOCK_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Credential that unlocks decryption and key issuance
    #[arg(
        long,
        env = "GENEBLOCK_ADMIN_CREDENTIAL",
        default_value = DEFAULT_ADMIN_CREDENTIAL,
        hide_env_values = true
    )]
    pub admin_credential: String,

    /// Replica id; repeat or comma-separate. Defaults to three servers.
    #[arg(long = "replica", env = "GENEBLOCK_REPLICAS", value_delimiter = ',')]
    pub replicas: Vec<String>,

    /// XOR-fold payloads with this byte before base64
    #[arg(long, env = "GENEBLOCK_XOR_KEY")]
    pub xor_key: Option<u8>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GENEBLOCK_LOG", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        let replica_ids: Vec<String> = self
            .replicas
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        SessionConfig {
            admin_credential: self.admin_credential.clone(),
            replica_ids: if replica_ids.is_empty() {
                defaults.replica_ids
            } else {
                replica_ids
            },
            xor_key: self.xor_key,
        }
    }
}
