//! Ring-Pedersen commitment parameters `(N-hat, s, t)` with the witness
//! `lambda` such that `s = t^lambda`.
//!
//! Each signing party generates its parameters from its own Paillier key,
//! so the ring modulus doubles as that party's Paillier modulus on the
//! signing path.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;
use zeroize::Zeroize;

use crate::paillier::SecretKey;
use crate::sigma::ring_pedersen::RingPedersenProof;
use crate::sigma::{ProofError, MIN_CHALLENGES};
use crate::tools::bignum::{modpow_signed, modulo, sample_below, sample_unit};
use crate::tools::hashing::{Chain, Hashable};

/// The minimum accepted bit size of the ring modulus.
pub const MIN_RING_MODULUS_BITS: usize = 2048;

#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PedersenError {
    /// a ring parameter is not a unit of the ring
    InvalidParameter,
    /// the ring modulus is too small
    SmallModulus,
    /// exhausted the retry budget for probabilistic sampling
    ExceededMaxRetry,
}

/// The public commitment parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedersenParams {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    n_hat: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    s: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    t: BigNumber,
}

/// The generation witness, kept by the owner for the parameter proof.
#[derive(Clone)]
pub struct PedersenWitness {
    lambda: BigNumber,
    phi: BigNumber,
}

impl PedersenParams {
    /// Derives commitment parameters from a Paillier key: `t` is a random
    /// square mod `N`, `s = t^lambda` for uniform `lambda`.
    pub fn generate(
        rng: &mut impl CryptoRngCore,
        sk: &SecretKey,
    ) -> Result<(Self, PedersenWitness), PedersenError> {
        let n_hat = sk.public_key().modulus().clone();
        let phi = sk.phi();

        for _ in 0..crate::tools::bignum::MAX_RETRIES {
            let r = sample_unit(rng, &n_hat).ok_or(PedersenError::ExceededMaxRetry)?;
            let t = modulo(&(&r * &r), &n_hat);
            let lambda = sample_below(rng, &phi);
            let s = t.modpow(&lambda, &n_hat);

            let params = Self {
                n_hat: n_hat.clone(),
                s,
                t,
            };
            if params.validate().is_ok() {
                return Ok((
                    params,
                    PedersenWitness {
                        lambda,
                        phi: phi.clone(),
                    },
                ));
            }
        }
        Err(PedersenError::ExceededMaxRetry)
    }

    /// Checks the structural invariants: `s` and `t` are units, distinct,
    /// and inside the ring.
    pub fn validate(&self) -> Result<(), PedersenError> {
        let one = BigNumber::one();
        if self.s <= one || &self.s >= &self.n_hat || self.s.gcd(&self.n_hat) != one {
            return Err(PedersenError::InvalidParameter);
        }
        if self.t <= one || &self.t >= &self.n_hat || self.t.gcd(&self.n_hat) != one {
            return Err(PedersenError::InvalidParameter);
        }
        if self.s == self.t {
            return Err(PedersenError::InvalidParameter);
        }
        Ok(())
    }

    pub fn modulus(&self) -> &BigNumber {
        &self.n_hat
    }

    pub(crate) fn base_s(&self) -> &BigNumber {
        &self.s
    }

    pub(crate) fn base_t(&self) -> &BigNumber {
        &self.t
    }

    /// `s^value * t^mask mod N-hat` for signed exponents.
    pub(crate) fn commit(&self, value: &BigNumber, mask: &BigNumber) -> BigNumber {
        let s_part = modpow_signed(&self.s, value, &self.n_hat)
            .expect("validated: s is a unit of the ring");
        let t_part = modpow_signed(&self.t, mask, &self.n_hat)
            .expect("validated: t is a unit of the ring");
        modulo(&(s_part * t_part), &self.n_hat)
    }
}

impl Hashable for PedersenParams {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.n_hat).chain(&self.s).chain(&self.t)
    }
}

impl PedersenWitness {
    pub(crate) fn lambda(&self) -> &BigNumber {
        &self.lambda
    }

    pub(crate) fn phi(&self) -> &BigNumber {
        &self.phi
    }
}

impl Zeroize for PedersenWitness {
    fn zeroize(&mut self) {
        self.lambda = BigNumber::zero();
        self.phi = BigNumber::zero();
    }
}

impl Drop for PedersenWitness {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Parameters in transit, together with their well-formedness proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PedersenParamsMessage {
    params: PedersenParams,
    proof: RingPedersenProof,
}

impl PedersenParamsMessage {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &PedersenParams,
        witness: &PedersenWitness,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        let proof = RingPedersenProof::new(rng, params, witness, MIN_CHALLENGES, aux)?;
        Ok(Self {
            params: params.clone(),
            proof,
        })
    }

    pub fn import(&self, aux: &impl Hashable) -> Result<PedersenParams, PedersenError> {
        if self.params.modulus().bit_length() < MIN_RING_MODULUS_BITS {
            return Err(PedersenError::SmallModulus);
        }
        self.params.validate()?;
        self.proof
            .verify(&self.params, aux)
            .map_err(|_| PedersenError::InvalidParameter)?;
        Ok(self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;
    use unknown_order::BigNumber;

    use super::{PedersenError, PedersenParams};
    use crate::paillier::SecretKey;
    use crate::tools::bignum::modulo;

    #[test]
    fn generate_and_commit() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (params, witness) = PedersenParams::generate(&mut OsRng, &sk).unwrap();

        // s == t^lambda
        assert_eq!(
            params
                .base_t()
                .modpow(witness.lambda(), params.modulus()),
            *params.base_s()
        );

        // Commitments multiply like exponents add.
        let a = BigNumber::from(17u64);
        let b = BigNumber::from(23u64);
        let r1 = BigNumber::from(5u64);
        let r2 = BigNumber::from(7u64);
        let combined = modulo(
            &(params.commit(&a, &r1) * params.commit(&b, &r2)),
            params.modulus(),
        );
        assert_eq!(combined, params.commit(&(a + b), &(r1 + r2)));
    }

    #[test]
    fn degenerate_params_are_rejected() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (params, _) = PedersenParams::generate(&mut OsRng, &sk).unwrap();

        let mut bad = params.clone();
        bad.s = BigNumber::one();
        assert_eq!(bad.validate(), Err(PedersenError::InvalidParameter));

        let mut bad = params.clone();
        bad.t = bad.s.clone();
        assert_eq!(bad.validate(), Err(PedersenError::InvalidParameter));
    }
}
