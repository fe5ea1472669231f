//! Knowledge of exponent vs Paillier encryption with range: for
//! `C = enc(x, rho)` and `X = g * x`, the same `x` in both, with `x` in
//! `±2^L`.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{signed_challenge, ProofError, ProofParams};
use crate::curve::{Point, Scalar};
use crate::paillier::{Ciphertext, PublicKey};
use crate::pedersen::PedersenParams;
use crate::tools::bignum::{
    in_signed_range, modpow_signed, modulo, sample_signed, sample_signed_scaled, sample_unit,
};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_log*";

/**
ZK proof: knowledge of exponent vs Paillier encryption.

Secret inputs:
- `x` in `±2^L`,
- `rho`, the Paillier randomizer of `C` under `N0`.

Public inputs:
- the prover's Paillier public key `N0`,
- the ciphertext `C = enc(x, rho)`,
- the base point `g` (not necessarily the curve generator),
- the point `X = g * x`,
- the verifier's ring-Pedersen parameters (`N-hat`, `s`, `t`).
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogStarProof {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_s: BigNumber,
    cap_a: Ciphertext,
    cap_y: Point,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_d: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    z2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z3: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl LogStarProof {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        x: &BigNumber,
        rho: &BigNumber,
        pk: &PublicKey,
        cap_c: &Ciphertext,
        g: &Point,
        cap_x: &Point,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if !in_signed_range(x, params.l) {
            return Err(ProofError::InvalidInput);
        }

        let n_hat = setup.modulus();

        let alpha = sample_signed(rng, params.l + params.eps);
        let mu = sample_signed_scaled(rng, params.l, n_hat);
        let r = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let gamma = sample_signed_scaled(rng, params.l + params.eps, n_hat);

        let cap_s = setup.commit(x, &mu);
        let cap_a = pk
            .encrypt_with(&alpha, &r)
            .map_err(|_| ProofError::InvalidInput)?;
        let cap_y = g * &Scalar::from_bignumber(&alpha);
        let cap_d = setup.commit(&alpha, &gamma);

        let transcript =
            Self::transcript(pk, cap_c, g, cap_x, setup, &cap_s, &cap_a, &cap_y, &cap_d, aux);
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = alpha + &e * x;
        let z2 = modulo(
            &(r * modpow_signed(rho, &e, pk.modulus()).ok_or(ProofError::InvalidInput)?),
            pk.modulus(),
        );
        let z3 = gamma + &e * mu;

        Ok(Self {
            cap_s,
            cap_a,
            cap_y,
            cap_d,
            z1,
            z2,
            z3,
            salt,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transcript(
        pk: &PublicKey,
        cap_c: &Ciphertext,
        g: &Point,
        cap_x: &Point,
        setup: &PedersenParams,
        cap_s: &BigNumber,
        cap_a: &Ciphertext,
        cap_y: &Point,
        cap_d: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(pk)
            .chain(cap_c)
            .chain(g)
            .chain(cap_x)
            .chain(setup)
            .chain(cap_s)
            .chain(cap_a)
            .chain(cap_y)
            .chain(cap_d)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &self,
        params: &ProofParams,
        pk: &PublicKey,
        cap_c: &Ciphertext,
        g: &Point,
        cap_x: &Point,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        cap_c.validate(pk).map_err(|_| ProofError::VerifyFailure)?;
        self.cap_a
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;

        let transcript = Self::transcript(
            pk, cap_c, g, cap_x, setup, &self.cap_s, &self.cap_a, &self.cap_y, &self.cap_d, aux,
        );
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        // Range check
        if !in_signed_range(&self.z1, params.l + params.eps) {
            return Err(ProofError::VerifyFailure);
        }

        // enc(z1, z2) == A * C^e mod N0^2
        let lhs = pk
            .encrypt_with(&self.z1, &self.z2)
            .map_err(|_| ProofError::VerifyFailure)?;
        let rhs = pk.combine(
            &self.cap_a,
            &pk.scale(cap_c, &e).ok_or(ProofError::VerifyFailure)?,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // g^z1 == Y * X^e
        let e_scalar = Scalar::from_bignumber(&e);
        let lhs = g * &Scalar::from_bignumber(&self.z1);
        let rhs = &self.cap_y + &(cap_x * &e_scalar);
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // s^z1 t^z3 == D * S^e mod N-hat
        let lhs = setup.commit(&self.z1, &self.z3);
        let cap_s_e =
            modpow_signed(&self.cap_s, &e, setup.modulus()).ok_or(ProofError::VerifyFailure)?;
        let rhs = modulo(&(&self.cap_d * cap_s_e), setup.modulus());
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        Ok(())
    }
}
