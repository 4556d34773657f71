//! Configuration management for QKD components

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Protocol parameters shared read-only by every run
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QkdConfig {
    /// Photons sent per run
    #[serde(default = "default_num_qubits")]
    pub num_qubits: usize,

    /// Probability that the eavesdropper intercepts a given photon
    #[serde(default = "default_eve_attack_rate")]
    pub eve_attack_rate: f64,

    /// Runs with a higher measured QBER are aborted
    #[serde(default = "default_qber_threshold")]
    pub qber_threshold: f64,

    /// Derived key size in bytes
    #[serde(default = "default_key_length_bytes")]
    pub key_length_bytes: usize,

    /// Block size for the parity filter
    #[serde(default = "default_block_size")]
    pub reconciliation_block_size: usize,

    /// Upper bound on disclosed QBER sample positions
    #[serde(default = "default_qber_sample_cap")]
    pub qber_sample_cap: usize,

    /// Sample at most `sifted_len / divisor` positions
    #[serde(default = "default_qber_sample_divisor")]
    pub qber_sample_divisor: usize,
}

impl Default for QkdConfig {
    fn default() -> Self {
        Self {
            num_qubits: default_num_qubits(),
            eve_attack_rate: default_eve_attack_rate(),
            qber_threshold: default_qber_threshold(),
            key_length_bytes: default_key_length_bytes(),
            reconciliation_block_size: default_block_size(),
            qber_sample_cap: default_qber_sample_cap(),
            qber_sample_divisor: default_qber_sample_divisor(),
        }
    }
}

impl QkdConfig {
    /// Load configuration from `QKD_`-prefixed environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed("QKD_").from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_qubits == 0 || self.num_qubits > crate::MAX_QUBITS {
            return Err(Error::Config(format!(
                "num_qubits must be between 1 and {}",
                crate::MAX_QUBITS
            )));
        }

        if !(0.0..=1.0).contains(&self.eve_attack_rate) {
            return Err(Error::Config(
                "eve_attack_rate must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.qber_threshold) {
            return Err(Error::Config(
                "qber_threshold must be within [0, 1]".to_string(),
            ));
        }

        // AES-256-GCM is the only cipher
        if self.key_length_bytes != crate::crypto::KEY_LEN {
            return Err(Error::Config(format!(
                "key_length_bytes must be {}",
                crate::crypto::KEY_LEN
            )));
        }

        if self.reconciliation_block_size == 0 {
            return Err(Error::Config(
                "reconciliation_block_size must be > 0".to_string(),
            ));
        }

        if self.qber_sample_cap == 0 || self.qber_sample_divisor == 0 {
            return Err(Error::Config(
                "qber_sample_cap and qber_sample_divisor must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// QKD Gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Bind address for HTTP server
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Largest message accepted for encryption, in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Protocol parameters
    #[serde(default)]
    pub protocol: QkdConfig,
}

/// Flat view of the gateway-only settings for environment loading
#[derive(Debug, Deserialize)]
struct GatewayEnv {
    #[serde(default = "default_listen_address")]
    listen_address: String,
    #[serde(default = "default_max_message_bytes")]
    max_message_bytes: usize,
    #[serde(default = "default_true")]
    metrics_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_message_bytes: default_max_message_bytes(),
            metrics_enabled: true,
            protocol: QkdConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// Gateway settings use the `QKD_GATEWAY_` prefix, protocol settings `QKD_`.
    pub fn from_env() -> Result<Self> {
        let env: GatewayEnv = envy::prefixed("QKD_GATEWAY_").from_env()?;
        let config = Self {
            listen_address: env.listen_address,
            max_message_bytes: env.max_message_bytes,
            metrics_enabled: env.metrics_enabled,
            protocol: QkdConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with `QKD__`-prefixed overrides
    ///
    /// Nested keys use a double underscore, e.g. `QKD__PROTOCOL__NUM_QUBITS`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QKD")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.listen_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                Error::Config(format!(
                    "Invalid listen_address '{}': {}",
                    self.listen_address, e
                ))
            })?;

        if self.max_message_bytes == 0 || self.max_message_bytes > crate::MAX_MESSAGE_SIZE {
            return Err(Error::Config(format!(
                "max_message_bytes must be between 1 and {}",
                crate::MAX_MESSAGE_SIZE
            )));
        }

        self.protocol.validate()
    }
}

// Default value functions
fn default_num_qubits() -> usize {
    2000
}

fn default_eve_attack_rate() -> f64 {
    0.15
}

fn default_qber_threshold() -> f64 {
    0.05
}

fn default_key_length_bytes() -> usize {
    crate::crypto::KEY_LEN
}

fn default_block_size() -> usize {
    4
}

fn default_qber_sample_cap() -> usize {
    100
}

fn default_qber_sample_divisor() -> usize {
    5
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_message_bytes() -> usize {
    crate::MAX_MESSAGE_SIZE
}

fn default_true() -> bool {
    true
}
