// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Protocol orchestration
//!
//! [`QkdService`] sequences a full run and is the only entry point the transport
//! layer calls:
//!
//! ```text
//! Initialized ─> KeysGenerated ─> Sifted ─> QberChecked ─┬─> Reconciled ─> KeyDerived
//!                                                         │        ─> Encrypted ─> SelfTested ─> Done
//!                                                         └─> Aborted (qber > threshold)
//! ```
//!
//! A run is single-shot: nothing is retried here. Callers wanting another
//! attempt invoke the service again and get fresh randomness.

use crate::config::QkdConfig;
use crate::crypto::SymmetricCipher;
use crate::engine::{self, ProtocolEngine};
use crate::kdf::{self, DerivedKey};
use crate::protocol::{ProtocolState, RunReport};
use crate::random::{RandomSource, RngSource};
use crate::{Error, Result};
use std::fmt;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// Outcome of the key establishment phase
///
/// A high QBER is an expected, first-class result of the protocol, so it is a
/// variant here rather than an error.
#[derive(Debug)]
pub enum KeyEstablishment {
    /// Key derived successfully
    Established { key: DerivedKey, report: RunReport },
    /// Suspected eavesdropping; no key material was produced
    Aborted { qber: f64, report: RunReport },
}

/// Result of a successful protocol run plus encryption
#[derive(Clone)]
pub struct EncryptedMessage {
    /// Base64 of the derived key
    pub encryption_key: String,
    /// Base64 of `IV || ciphertext || tag`
    pub ciphertext: String,
    pub report: RunReport,
}

impl fmt::Debug for EncryptedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedMessage")
            .field("ciphertext", &self.ciphertext)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Orchestrates protocol runs against an immutable configuration
#[derive(Debug, Clone)]
pub struct QkdService {
    config: QkdConfig,
}

impl QkdService {
    /// Create a service; the configuration is validated once here and never changes
    pub fn new(config: QkdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &QkdConfig {
        &self.config
    }

    /// Run the quantum exchange and classical post-processing up to key derivation
    pub fn establish_key<R: RandomSource>(&self, rng: R) -> Result<KeyEstablishment> {
        let cfg = &self.config;
        let mut state = ProtocolState::Initialized;
        let mut report = RunReport::new(cfg.num_qubits);
        let mut engine = ProtocolEngine::new(rng);

        let alice_bits = engine.generate_bits(cfg.num_qubits);
        let alice_bases = engine.generate_bases(cfg.num_qubits);
        let bob_bases = engine.generate_bases(cfg.num_qubits);
        state.advance(ProtocolState::KeysGenerated);

        let photons = engine::encode_photons(&alice_bits, &alice_bases)?;
        let received = engine.eavesdrop_channel(&photons, cfg.eve_attack_rate);
        let bob_bits = engine.measure_photons(&received, &bob_bases)?;
        let sifted = engine::sift_key(&alice_bits, &alice_bases, &bob_bits, &bob_bases)?;
        report.eve_interceptions = engine.interceptions();
        report.sifted_length = sifted.len();
        state.advance(ProtocolState::Sifted);

        let sample_size =
            engine::qber_sample_size(sifted.len(), cfg.qber_sample_cap, cfg.qber_sample_divisor);
        let check = engine::estimate_qber(&sifted, sample_size)?;
        report.sample_size = check.sample_size;
        report.qber = check.qber;
        report.candidate_length = check.remaining_alice.len();
        state.advance(ProtocolState::QberChecked);

        if check.qber > cfg.qber_threshold {
            state.advance(ProtocolState::Aborted);
            report.final_state = state;
            warn!(
                qber = check.qber,
                threshold = cfg.qber_threshold,
                interceptions = report.eve_interceptions,
                "QBER above threshold, discarding key"
            );
            return Ok(KeyEstablishment::Aborted {
                qber: check.qber,
                report,
            });
        }

        // The sender's side is the reference copy
        let reconciled = engine::reconcile(&check.remaining_alice, cfg.reconciliation_block_size)?;
        report.reconciled_length = reconciled.len();
        state.advance(ProtocolState::Reconciled);

        let key_bits = cfg.key_length_bytes * 8;
        if reconciled.len() < key_bits {
            warn!(
                available = reconciled.len(),
                requested = key_bits,
                "Reconciled key shorter than requested, hashing what remains"
            );
        }
        let key = kdf::derive_key(&reconciled, cfg.key_length_bytes)?;
        report.key_bits_used = kdf::key_material(&reconciled, cfg.key_length_bytes).len();
        state.advance(ProtocolState::KeyDerived);
        report.final_state = state;

        debug!(
            sifted = report.sifted_length,
            qber = report.qber,
            reconciled = report.reconciled_length,
            "Key established"
        );

        Ok(KeyEstablishment::Established { key, report })
    }

    /// Run the protocol with fresh entropy and encrypt `message` under the derived key
    pub fn run_protocol_and_encrypt(&self, message: &str) -> Result<EncryptedMessage> {
        self.run_protocol_and_encrypt_with(message, RngSource::from_entropy())
    }

    /// Same as [`run_protocol_and_encrypt`](Self::run_protocol_and_encrypt) with an injected source
    pub fn run_protocol_and_encrypt_with<R: RandomSource>(
        &self,
        message: &str,
        rng: R,
    ) -> Result<EncryptedMessage> {
        let span = info_span!(
            "qkd_run",
            run_id = %Uuid::new_v4(),
            qubits = self.config.num_qubits
        );
        let _guard = span.enter();

        let (key, mut report) = match self.establish_key(rng)? {
            KeyEstablishment::Established { key, report } => (key, report),
            KeyEstablishment::Aborted { qber, .. } => {
                return Err(Error::ProtocolAborted {
                    qber,
                    threshold: self.config.qber_threshold,
                });
            }
        };
        let mut state = report.final_state;

        let cipher = SymmetricCipher::new(key.as_bytes())?;
        let ciphertext = cipher.encrypt_message(message)?;
        state.advance(ProtocolState::Encrypted);

        self_test(&cipher, &ciphertext, message)?;
        state.advance(ProtocolState::SelfTested);
        state.advance(ProtocolState::Done);
        report.final_state = state;

        info!(
            qber = report.qber,
            sifted = report.sifted_length,
            reconciled = report.reconciled_length,
            key_bits = report.key_bits_used,
            sift_ratio = report.sift_ratio(),
            "Protocol run completed"
        );

        Ok(EncryptedMessage {
            encryption_key: key.to_base64(),
            ciphertext,
            report,
        })
    }

    /// Decrypt a ciphertext with a client-supplied key; no protocol steps run
    pub fn decrypt_with_key(&self, base64_key: &str, base64_ciphertext: &str) -> Result<String> {
        let key = DerivedKey::from_base64(base64_key, self.config.key_length_bytes)?;
        SymmetricCipher::new(key.as_bytes())?.decrypt_message(base64_ciphertext)
    }
}

/// Decrypt `ciphertext` with `cipher` and require it to reproduce `message`
///
/// Any mismatch or decryption error is an internal defect, never a caller error.
fn self_test(cipher: &SymmetricCipher, ciphertext: &str, message: &str) -> Result<()> {
    match cipher.decrypt_message(ciphertext) {
        Ok(decrypted) if decrypted == message => Ok(()),
        Ok(_) => {
            error!("Self-test decrypted a different message");
            Err(Error::SelfTestFailed)
        }
        Err(e) => {
            error!("Self-test could not decrypt own ciphertext: {}", e);
            Err(Error::SelfTestFailed)
        }
    }
}
