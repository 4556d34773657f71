// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Protocol data structures for a BB84 run
//!
//! Every type here is a value object scoped to a single protocol run. Nothing is
//! persisted; sequences are dropped as soon as the run that produced them ends.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A classical bit, always 0 or 1
pub type Bit = u8;

/// Ordered sequence of bits belonging to one run
pub type BitSequence = Vec<Bit>;

/// One of the two conjugate measurement bases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    /// Basis 0 (+)
    Rectilinear,
    /// Basis 1 (x)
    Diagonal,
}

/// Simulated quantum state on the channel: a bit prepared in a basis
///
/// Photons are immutable once prepared. An eavesdropper never alters a photon;
/// it replaces it with a new one built from its own measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Photon {
    bit: Bit,
    basis: Basis,
}

impl Photon {
    pub fn new(bit: Bit, basis: Basis) -> Self {
        Self { bit, basis }
    }

    pub fn bit(&self) -> Bit {
        self.bit
    }

    pub fn basis(&self) -> Basis {
        self.basis
    }
}

/// Bits retained by both parties after discarding mismatched-basis positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiftedKeyPair {
    alice: BitSequence,
    bob: BitSequence,
}

impl SiftedKeyPair {
    /// Pair two sifted sequences; both sides must have the same length
    pub fn new(alice: BitSequence, bob: BitSequence) -> Result<Self> {
        if alice.len() != bob.len() {
            return Err(Error::Validation(format!(
                "Sifted keys differ in length: {} vs {}",
                alice.len(),
                bob.len()
            )));
        }
        Ok(Self { alice, bob })
    }

    pub fn alice(&self) -> &[Bit] {
        &self.alice
    }

    pub fn bob(&self) -> &[Bit] {
        &self.bob
    }

    pub fn len(&self) -> usize {
        self.alice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alice.is_empty()
    }
}

/// Outcome of the QBER estimate over a disclosed prefix sample
///
/// Only the non-sampled suffix survives; the sample has been revealed on the
/// public channel and never contributes to the secret key.
#[derive(Debug, Clone, PartialEq)]
pub struct QberCheckResult {
    /// Fraction of mismatches in the sample, in `[0, 1]`
    pub qber: f64,
    /// Number of positions disclosed for the estimate
    pub sample_size: usize,
    /// Sender's candidate key material
    pub remaining_alice: BitSequence,
    /// Receiver's candidate key material
    pub remaining_bob: BitSequence,
}

/// Lifecycle of a single protocol run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    Initialized,
    KeysGenerated,
    Sifted,
    QberChecked,
    Reconciled,
    KeyDerived,
    Encrypted,
    SelfTested,
    Done,
    Aborted,
}

impl ProtocolState {
    /// Check whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: ProtocolState) -> bool {
        use ProtocolState::*;
        matches!(
            (self, next),
            (Initialized, KeysGenerated)
                | (KeysGenerated, Sifted)
                | (Sifted, QberChecked)
                | (QberChecked, Reconciled)
                | (QberChecked, Aborted)
                | (Reconciled, KeyDerived)
                | (KeyDerived, Encrypted)
                | (Encrypted, SelfTested)
                | (SelfTested, Done)
        )
    }

    /// Move to `next`, logging the transition
    pub fn advance(&mut self, next: ProtocolState) {
        debug_assert!(
            self.can_transition_to(next),
            "illegal protocol transition {} -> {}",
            self,
            next
        );
        tracing::debug!(from = %self, to = %next, "protocol state transition");
        *self = next;
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::KeysGenerated => "keys_generated",
            Self::Sifted => "sifted",
            Self::QberChecked => "qber_checked",
            Self::Reconciled => "reconciled",
            Self::KeyDerived => "key_derived",
            Self::Encrypted => "encrypted",
            Self::SelfTested => "self_tested",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Diagnostics for one protocol run
///
/// Carries sizes and rates only, never key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Photons sent by the sender
    pub qubits_sent: usize,

    /// Photons the eavesdropper intercepted and re-emitted
    pub eve_interceptions: usize,

    /// Length of the sifted key pair
    pub sifted_length: usize,

    /// Prefix positions disclosed for the QBER estimate
    pub sample_size: usize,

    /// Measured QBER
    pub qber: f64,

    /// Candidate bits left after discarding the sample
    pub candidate_length: usize,

    /// Bits kept by reconciliation
    pub reconciled_length: usize,

    /// Bits hashed into the final key
    pub key_bits_used: usize,

    /// State the run ended in
    pub final_state: ProtocolState,
}

impl RunReport {
    pub(crate) fn new(qubits_sent: usize) -> Self {
        Self {
            qubits_sent,
            eve_interceptions: 0,
            sifted_length: 0,
            sample_size: 0,
            qber: 0.0,
            candidate_length: 0,
            reconciled_length: 0,
            key_bits_used: 0,
            final_state: ProtocolState::Initialized,
        }
    }

    /// Fraction of sent qubits that survived sifting
    pub fn sift_ratio(&self) -> f64 {
        if self.qubits_sent == 0 {
            0.0
        } else {
            self.sifted_length as f64 / self.qubits_sent as f64
        }
    }
}
