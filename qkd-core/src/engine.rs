// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! BB84 protocol engine
//!
//! Implements the quantum and classical steps of a single run:
//!
//! ```text
//! generate ─> encode ─> channel (Eve) ─> measure ─> sift ─> QBER ─> reconcile
//! ```
//!
//! Randomized steps are methods on [`ProtocolEngine`] and draw from its
//! [`RandomSource`]. Deterministic post-processing steps are free functions.

use crate::protocol::{Basis, Bit, BitSequence, Photon, QberCheckResult, SiftedKeyPair};
use crate::random::RandomSource;
use crate::{Error, Result};

/// Executes the randomized BB84 steps against an injected randomness source
pub struct ProtocolEngine<R> {
    rng: R,
    interceptions: usize,
}

impl<R: RandomSource> ProtocolEngine<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            interceptions: 0,
        }
    }

    /// Photons intercepted by the eavesdropper so far
    pub fn interceptions(&self) -> usize {
        self.interceptions
    }

    /// Generate `n` independent uniform bits
    pub fn generate_bits(&mut self, n: usize) -> BitSequence {
        (0..n).map(|_| self.rng.next_bit()).collect()
    }

    /// Generate `n` independent uniform bases
    pub fn generate_bases(&mut self, n: usize) -> Vec<Basis> {
        (0..n).map(|_| self.rng.next_basis()).collect()
    }

    /// Pass photons through a channel with an intercept-resend eavesdropper
    ///
    /// Each photon is intercepted independently with probability `eve_attack_rate`.
    /// Eve measures in a random basis: a matching basis reads the bit faithfully,
    /// a wrong basis yields a uniformly random bit. She then re-emits a fresh
    /// photon prepared in her own basis.
    pub fn eavesdrop_channel(&mut self, photons: &[Photon], eve_attack_rate: f64) -> Vec<Photon> {
        photons
            .iter()
            .map(|photon| {
                if self.rng.next_float() < eve_attack_rate {
                    self.interceptions += 1;
                    let eve_basis = self.rng.next_basis();
                    let measured = if eve_basis == photon.basis() {
                        photon.bit()
                    } else {
                        self.rng.next_bit()
                    };
                    Photon::new(measured, eve_basis)
                } else {
                    *photon
                }
            })
            .collect()
    }

    /// Receiver measures each photon in its own pre-chosen basis
    pub fn measure_photons(
        &mut self,
        photons: &[Photon],
        bob_bases: &[Basis],
    ) -> Result<BitSequence> {
        ensure_same_length("photons", photons.len(), "receiver bases", bob_bases.len())?;

        Ok(photons
            .iter()
            .zip(bob_bases)
            .map(|(photon, &basis)| {
                if photon.basis() == basis {
                    photon.bit()
                } else {
                    self.rng.next_bit()
                }
            })
            .collect())
    }
}

/// Pair bits with bases position-wise
pub fn encode_photons(bits: &[Bit], bases: &[Basis]) -> Result<Vec<Photon>> {
    ensure_same_length("bits", bits.len(), "bases", bases.len())?;

    Ok(bits
        .iter()
        .zip(bases)
        .map(|(&bit, &basis)| Photon::new(bit, basis))
        .collect())
}

/// Keep only the positions where both parties chose the same basis
pub fn sift_key(
    alice_bits: &[Bit],
    alice_bases: &[Basis],
    bob_bits: &[Bit],
    bob_bases: &[Basis],
) -> Result<SiftedKeyPair> {
    let n = alice_bits.len();
    ensure_same_length("sender bits", n, "sender bases", alice_bases.len())?;
    ensure_same_length("sender bits", n, "receiver bits", bob_bits.len())?;
    ensure_same_length("sender bits", n, "receiver bases", bob_bases.len())?;

    let mut sifted_alice = Vec::with_capacity(n / 2);
    let mut sifted_bob = Vec::with_capacity(n / 2);

    for i in 0..n {
        if alice_bases[i] == bob_bases[i] {
            sifted_alice.push(alice_bits[i]);
            sifted_bob.push(bob_bits[i]);
        }
    }

    SiftedKeyPair::new(sifted_alice, sifted_bob)
}

/// Number of sifted positions to disclose: `min(cap, sifted_len / divisor)`
pub fn qber_sample_size(sifted_len: usize, cap: usize, divisor: usize) -> usize {
    cap.min(sifted_len / divisor.max(1))
}

/// Estimate the QBER from a disclosed prefix and keep the undisclosed suffix
///
/// An empty sample cannot estimate anything and is rejected like a short key.
pub fn estimate_qber(sifted: &SiftedKeyPair, sample_size: usize) -> Result<QberCheckResult> {
    if sample_size == 0 || sifted.len() < sample_size {
        return Err(Error::InsufficientKeyMaterial {
            required: sample_size.max(1),
            available: sifted.len(),
        });
    }

    let (sample_alice, rest_alice) = sifted.alice().split_at(sample_size);
    let (sample_bob, rest_bob) = sifted.bob().split_at(sample_size);

    let mismatches = sample_alice
        .iter()
        .zip(sample_bob)
        .filter(|(a, b)| a != b)
        .count();

    Ok(QberCheckResult {
        qber: mismatches as f64 / sample_size as f64,
        sample_size,
        remaining_alice: rest_alice.to_vec(),
        remaining_bob: rest_bob.to_vec(),
    })
}

/// Block-parity filter standing in for interactive reconciliation
///
/// Splits `bits` into whole blocks of `block_size` (a trailing partial block is
/// dropped) and keeps only blocks with even parity, in order. It corrects
/// nothing; it trades key length for discarding blocks whose syndrome looks off.
pub fn reconcile(bits: &[Bit], block_size: usize) -> Result<BitSequence> {
    if block_size == 0 {
        return Err(Error::Validation("Reconciliation block size must be > 0".to_string()));
    }

    Ok(bits
        .chunks_exact(block_size)
        .filter(|block| block.iter().map(|&b| b as usize).sum::<usize>() % 2 == 0)
        .flatten()
        .copied()
        .collect())
}

fn ensure_same_length(left: &str, left_len: usize, right: &str, right_len: usize) -> Result<()> {
    if left_len != right_len {
        return Err(Error::Validation(format!(
            "Length mismatch: {} has {} entries, {} has {}",
            left, left_len, right, right_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::RngSource;
    use std::collections::VecDeque;

    /// Replays predetermined draws
    #[derive(Default)]
    struct ScriptedSource {
        bits: VecDeque<Bit>,
        bases: VecDeque<Basis>,
        floats: VecDeque<f64>,
    }

    impl RandomSource for ScriptedSource {
        fn next_bit(&mut self) -> Bit {
            self.bits.pop_front().expect("script ran out of bits")
        }

        fn next_basis(&mut self) -> Basis {
            self.bases.pop_front().expect("script ran out of bases")
        }

        fn next_float(&mut self) -> f64 {
            self.floats.pop_front().expect("script ran out of floats")
        }
    }

    use Basis::{Diagonal as D, Rectilinear as R};

    #[test]
    fn test_generation_lengths() {
        let mut engine = ProtocolEngine::new(RngSource::seeded(1));
        assert_eq!(engine.generate_bits(123).len(), 123);
        assert_eq!(engine.generate_bases(77).len(), 77);
        assert!(engine.generate_bits(0).is_empty());
    }

    #[test]
    fn test_encode_pairs_positionwise() {
        let photons = encode_photons(&[1, 0, 1], &[R, D, D]).unwrap();
        assert_eq!(
            photons,
            vec![Photon::new(1, R), Photon::new(0, D), Photon::new(1, D)]
        );
    }

    #[test]
    fn test_encode_rejects_length_mismatch() {
        assert!(matches!(
            encode_photons(&[1, 0], &[R]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_channel_without_eve_is_transparent() {
        let mut engine = ProtocolEngine::new(RngSource::seeded(3));
        let photons = encode_photons(&[1, 0, 1, 1], &[R, D, R, D]).unwrap();
        let received = engine.eavesdrop_channel(&photons, 0.0);
        assert_eq!(received, photons);
        assert_eq!(engine.interceptions(), 0);
    }

    #[test]
    fn test_eve_matching_basis_preserves_bit() {
        let script = ScriptedSource {
            floats: VecDeque::from(vec![0.0]),
            bases: VecDeque::from(vec![D]),
            ..Default::default()
        };
        let mut engine = ProtocolEngine::new(script);
        let received = engine.eavesdrop_channel(&[Photon::new(1, D)], 1.0);
        assert_eq!(received, vec![Photon::new(1, D)]);
        assert_eq!(engine.interceptions(), 1);
    }

    #[test]
    fn test_eve_wrong_basis_randomizes_and_reemits() {
        let script = ScriptedSource {
            floats: VecDeque::from(vec![0.5, 0.9]),
            bases: VecDeque::from(vec![R]),
            bits: VecDeque::from(vec![0]),
        };
        let mut engine = ProtocolEngine::new(script);
        // Rate 0.6: first photon intercepted (0.5 < 0.6), second passes (0.9)
        let sent = [Photon::new(1, D), Photon::new(1, D)];
        let received = engine.eavesdrop_channel(&sent, 0.6);
        assert_eq!(received, vec![Photon::new(0, R), Photon::new(1, D)]);
        assert_eq!(engine.interceptions(), 1);
    }

    #[test]
    fn test_measurement_policy() {
        let script = ScriptedSource {
            bits: VecDeque::from(vec![0]),
            ..Default::default()
        };
        let mut engine = ProtocolEngine::new(script);
        let photons = [Photon::new(1, R), Photon::new(1, D)];
        // Matching basis reads the bit; mismatched basis draws from the script
        let bits = engine.measure_photons(&photons, &[R, R]).unwrap();
        assert_eq!(bits, vec![1, 0]);
    }

    #[test]
    fn test_measurement_matches_sender_whenever_bases_agree() {
        let mut engine = ProtocolEngine::new(RngSource::seeded(11));
        let bits = engine.generate_bits(2000);
        let bases = engine.generate_bases(2000);
        let bob_bases = engine.generate_bases(2000);
        let photons = encode_photons(&bits, &bases).unwrap();
        let measured = engine.measure_photons(&photons, &bob_bases).unwrap();

        for i in 0..bits.len() {
            if bases[i] == bob_bases[i] {
                assert_eq!(bits[i], measured[i], "position {}", i);
            }
        }
    }

    #[test]
    fn test_sifting_keeps_exactly_matching_positions() {
        let alice_bits = [1, 0, 1, 1, 0, 0, 1, 0];
        let alice_bases = [R, D, R, D, D, R, R, D];
        let bob_bits = [1, 1, 0, 1, 0, 1, 1, 1];
        let bob_bases = [R, R, D, D, D, D, R, R];

        let sifted = sift_key(&alice_bits, &alice_bases, &bob_bits, &bob_bases).unwrap();

        let kept: Vec<usize> = (0..alice_bits.len())
            .filter(|&i| alice_bases[i] == bob_bases[i])
            .collect();
        assert_eq!(kept, vec![0, 3, 4, 6]);
        assert_eq!(sifted.alice(), &[1, 1, 0, 1]);
        assert_eq!(sifted.bob(), &[1, 1, 0, 1]);
    }

    #[test]
    fn test_sifting_rejects_ragged_input() {
        assert!(sift_key(&[1, 0], &[R, D], &[1], &[R, D]).is_err());
    }

    #[test]
    fn test_sift_ratio_is_about_half() {
        let n = 10_000;
        let mut engine = ProtocolEngine::new(RngSource::seeded(2024));
        let bits = engine.generate_bits(n);
        let bases = engine.generate_bases(n);
        let bob_bases = engine.generate_bases(n);
        let photons = encode_photons(&bits, &bases).unwrap();
        let measured = engine.measure_photons(&photons, &bob_bases).unwrap();
        let sifted = sift_key(&bits, &bases, &measured, &bob_bases).unwrap();

        let ratio = sifted.len() as f64 / n as f64;
        assert!((0.45..0.55).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn test_eve_free_sifted_keys_agree() {
        for seed in 0..10 {
            let n = 1000;
            let mut engine = ProtocolEngine::new(RngSource::seeded(seed));
            let bits = engine.generate_bits(n);
            let bases = engine.generate_bases(n);
            let bob_bases = engine.generate_bases(n);
            let photons = encode_photons(&bits, &bases).unwrap();
            let channel = engine.eavesdrop_channel(&photons, 0.0);
            let measured = engine.measure_photons(&channel, &bob_bases).unwrap();
            let sifted = sift_key(&bits, &bases, &measured, &bob_bases).unwrap();

            let sample = qber_sample_size(sifted.len(), 100, 5);
            let check = estimate_qber(&sifted, sample).unwrap();
            assert_eq!(check.qber, 0.0, "seed {}", seed);
            assert_eq!(check.remaining_alice, check.remaining_bob);
        }
    }

    #[test]
    fn test_sample_size_policy() {
        assert_eq!(qber_sample_size(1000, 100, 5), 100);
        assert_eq!(qber_sample_size(250, 100, 5), 50);
        assert_eq!(qber_sample_size(4, 100, 5), 0);
    }

    #[test]
    fn test_qber_uses_prefix_and_discards_it() {
        let sifted = SiftedKeyPair::new(
            vec![1, 0, 1, 1, 0, 1, 0],
            vec![1, 1, 1, 0, 0, 0, 0],
        )
        .unwrap();

        let check = estimate_qber(&sifted, 4).unwrap();
        assert_eq!(check.qber, 0.5);
        assert_eq!(check.sample_size, 4);
        assert_eq!(check.remaining_alice, vec![0, 1, 0]);
        assert_eq!(check.remaining_bob, vec![0, 0, 0]);
    }

    #[test]
    fn test_qber_rejects_short_key() {
        let sifted = SiftedKeyPair::new(vec![1, 0], vec![1, 0]).unwrap();
        assert!(matches!(
            estimate_qber(&sifted, 3),
            Err(Error::InsufficientKeyMaterial { required: 3, available: 2 })
        ));
    }

    #[test]
    fn test_qber_rejects_empty_sample() {
        let sifted = SiftedKeyPair::new(vec![1, 0], vec![1, 0]).unwrap();
        assert!(matches!(
            estimate_qber(&sifted, 0),
            Err(Error::InsufficientKeyMaterial { .. })
        ));
    }

    #[test]
    fn test_reconciliation_block_parity() {
        let bits = [1, 1, 0, 0, 0, 1, 1, 1, 1, 0, 1, 0];
        assert_eq!(reconcile(&bits, 4).unwrap(), vec![1, 1, 0, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_reconciliation_drops_trailing_partial_block() {
        let bits = [0, 0, 1, 1, 0, 0];
        assert_eq!(reconcile(&bits, 4).unwrap(), vec![0, 0, 1, 1]);
        assert!(reconcile(&[1, 1, 0], 4).unwrap().is_empty());
    }

    #[test]
    fn test_reconciliation_rejects_zero_block() {
        assert!(reconcile(&[1, 0], 0).is_err());
    }
}
