//! Non-interactive sigma protocols over Paillier moduli and the curve group,
//! made non-interactive with Fiat-Shamir over a BLAKE2b-256 transcript.
//!
//! Every proof is a flat struct of wire fields plus the transcript salt;
//! field order is fixed and feeds the transcript in that order. `new`
//! constructs a proof from the witness (retrying the salt until the
//! challenge lands in range), `verify` recomputes the challenge from the
//! embedded salt and checks every algebraic relation.

pub mod aff_g;
pub mod blum;
pub mod enc;
pub mod enc_elg;
pub mod enc_exp;
pub mod elog;
pub mod fac;
pub mod log_star;
pub mod mul;
pub mod mul_star;
pub mod no_small_factor;
pub mod nth_root;
pub mod op;
pub mod ring_pedersen;
pub mod schnorr;

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use unknown_order::BigNumber;

use crate::curve::curve_order;
use crate::tools::bignum::MAX_RETRIES;
use crate::tools::hashing::{random_salt, Transcript};

/// The minimum number of challenges for cut-and-choose style proofs.
pub const MIN_CHALLENGES: usize = 80;

#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofError {
    /// the witness or statement is malformed
    InvalidInput,
    /// the proof failed to verify
    VerifyFailure,
    /// the number of challenges is below the soundness minimum
    TooFewChallenge,
    /// exhausted the retry budget for probabilistic sampling
    ExceededMaxRetry,
}

/// Range parameters shared by all proofs, derived from the curve order:
/// `L` is the bit length of `q`, `L' = 5L`, `eps = 2L`.
#[derive(Clone, Debug)]
pub struct ProofParams {
    pub(crate) l: usize,
    pub(crate) lp: usize,
    pub(crate) eps: usize,
    pub(crate) q: BigNumber,
}

impl ProofParams {
    pub fn secp256k1() -> Self {
        let q = curve_order();
        let l = q.bit_length();
        Self {
            l,
            lp: 5 * l,
            eps: 2 * l,
            q,
        }
    }
}

impl Default for ProofParams {
    fn default() -> Self {
        Self::secp256k1()
    }
}

/// Picks a salt for which the transcript's signed challenge lands in `±q`.
pub(crate) fn signed_challenge(
    rng: &mut impl CryptoRngCore,
    transcript: &Transcript,
    q: &BigNumber,
) -> Result<(Box<[u8]>, BigNumber), ProofError> {
    for _ in 0..MAX_RETRIES {
        let salt = random_salt(rng);
        if let Some(e) = transcript.challenge_signed(&salt, q) {
            return Ok((salt, e));
        }
    }
    Err(ProofError::ExceededMaxRetry)
}

/// Picks a salt for which the transcript's challenge lands in `[0, q)`.
pub(crate) fn bounded_challenge(
    rng: &mut impl CryptoRngCore,
    transcript: &Transcript,
    q: &BigNumber,
) -> Result<(Box<[u8]>, BigNumber), ProofError> {
    for _ in 0..MAX_RETRIES {
        let salt = random_salt(rng);
        if let Some(e) = transcript.challenge_bounded(&salt, q) {
            return Ok((salt, e));
        }
    }
    Err(ProofError::ExceededMaxRetry)
}
