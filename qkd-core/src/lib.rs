// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! QKD Core Library
//!
//! This crate simulates the BB84 quantum key distribution protocol over a classical
//! abstraction of a quantum channel, derives an ephemeral symmetric key from the
//! agreed bits, and uses it for authenticated encryption of a caller's message.
//!
//! # Architecture
//!
//! The library is organized into modules representing core concerns:
//! - `random`: Injected randomness capability (seeded or entropy-backed)
//! - `protocol`: Photons, sifted keys, QBER results, run lifecycle
//! - `engine`: BB84 steps from bit generation to reconciliation
//! - `kdf`: Privacy amplification into a fixed-size key
//! - `crypto`: AES-256-GCM envelope encryption and base64 helpers
//! - `service`: Orchestrator sequencing a run and enforcing the QBER policy
//! - `config`: Configuration management with validation
//! - `metrics`: Run and decryption counters
//! - `error`: Unified error types
//!
//! # Design Principles
//!
//! 1. **Injected randomness**: every probabilistic step draws from a `RandomSource`
//! 2. **Ephemeral secrets**: keys and bit sequences live for a single run only
//! 3. **Typed outcomes**: a QBER abort is a result variant, not a side channel
//! 4. **Testability**: deterministic seeding reproduces any run

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod kdf;
pub mod metrics;
pub mod protocol;
pub mod random;
pub mod service;

pub use error::{Error, Result};
pub use random::{RandomSource, RngSource};
pub use service::{EncryptedMessage, KeyEstablishment, QkdService};

/// Library version for protocol compatibility
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on photons per run to prevent OOM
pub const MAX_QUBITS: usize = 1_000_000;

/// Maximum message size accepted for encryption (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Message encrypted when the caller supplies none
pub const DEFAULT_MESSAGE: &str = "Default secret message";
