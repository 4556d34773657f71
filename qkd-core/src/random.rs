// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Randomness capability for the protocol engine
//!
//! Every probabilistic step draws from a [`RandomSource`] handed to the engine at
//! construction. Production runs use a fresh entropy-seeded generator per run;
//! tests use a seeded one so that scenarios are reproducible.

use crate::protocol::{Basis, Bit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform bit, basis and float generator
///
/// Each call is an independent uniform draw. Sources are not shared across
/// concurrent runs; one instance belongs to one run.
pub trait RandomSource {
    /// Uniform draw from {0, 1}
    fn next_bit(&mut self) -> Bit;

    /// Uniform draw from the two bases
    fn next_basis(&mut self) -> Basis;

    /// Uniform draw from `[0, 1)`
    fn next_float(&mut self) -> f64;
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn next_bit(&mut self) -> Bit {
        (**self).next_bit()
    }

    fn next_basis(&mut self) -> Basis {
        (**self).next_basis()
    }

    fn next_float(&mut self) -> f64 {
        (**self).next_float()
    }
}

/// [`RandomSource`] backed by any `rand` generator
#[derive(Debug, Clone)]
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<StdRng> {
    /// Deterministic source for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Cryptographically seeded source for production runs
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> RandomSource for RngSource<R> {
    fn next_bit(&mut self) -> Bit {
        self.rng.gen_range(0..=1)
    }

    fn next_basis(&mut self) -> Basis {
        if self.rng.gen::<bool>() {
            Basis::Diagonal
        } else {
            Basis::Rectilinear
        }
    }

    fn next_float(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}
