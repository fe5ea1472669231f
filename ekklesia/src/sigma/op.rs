//! Paillier operation with curve commitments: for
//! `C2 = C1^a * g^b * rho^N` and the commitments `A = a * G`, `B = b * G`,
//! the same `a` and `b` throughout. The full variant carries ring-Pedersen
//! range commitments; the simplified variant drops them for protocols whose
//! receiver has no trusted setup for the prover.

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

const HASH_TAG: &[u8] = b"P_op";
const HASH_TAG_SIMPLE: &[u8] = b"P_op-simple";

pub struct OpStatement<'a> {
    pub pk: &'a PublicKey,
    pub cap_c1: &'a Ciphertext,
    pub cap_c2: &'a Ciphertext,
    /// `A = a * G`.
    pub cap_a: &'a Point,
    /// `B = b * G`.
    pub cap_b: &'a Point,
}

pub struct OpWitness<'a> {
    pub a: &'a BigNumber,
    pub b: &'a BigNumber,
    pub rho: &'a BigNumber,
}

/// The shared commitment move of both variants.
struct Ephemeral {
    alpha: BigNumber,
    beta: BigNumber,
    r: BigNumber,
    cap_t: Ciphertext,
    cap_t_a: Point,
    cap_t_b: Point,
}

impl Ephemeral {
    fn sample(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        statement: &OpStatement<'_>,
    ) -> Result<Self, ProofError> {
        let pk = statement.pk;
        let alpha = sample_signed(rng, params.l + params.eps);
        let beta = sample_signed(rng, params.lp + params.eps);
        let r = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;

        let cap_t = pk.combine(
            &pk.scale(statement.cap_c1, &alpha)
                .ok_or(ProofError::InvalidInput)?,
            &pk.encrypt_with(&beta, &r)
                .map_err(|_| ProofError::InvalidInput)?,
        );
        let cap_t_a = Scalar::from_bignumber(&alpha).mul_by_generator();
        let cap_t_b = Scalar::from_bignumber(&beta).mul_by_generator();

        Ok(Self {
            alpha,
            beta,
            r,
            cap_t,
            cap_t_a,
            cap_t_b,
        })
    }
}

fn check_witness(params: &ProofParams, witness: &OpWitness<'_>) -> Result<(), ProofError> {
    if !in_signed_range(witness.a, params.l) || !in_signed_range(witness.b, params.lp) {
        return Err(ProofError::InvalidInput);
    }
    Ok(())
}

/// Shared verification of the ciphertext and curve equations.
fn check_core(
    params: &ProofParams,
    statement: &OpStatement<'_>,
    cap_t: &Ciphertext,
    cap_t_a: &Point,
    cap_t_b: &Point,
    z1: &BigNumber,
    z2: &BigNumber,
    w: &BigNumber,
    e: &BigNumber,
) -> Result<(), ProofError> {
    let pk = statement.pk;

    if !in_signed_range(z1, params.l + params.eps) || !in_signed_range(z2, params.lp + params.eps)
    {
        return Err(ProofError::VerifyFailure);
    }

    // C1^z1 enc(z2, w) == T * C2^e mod N^2
    let lhs = pk.combine(
        &pk.scale(statement.cap_c1, z1)
            .ok_or(ProofError::VerifyFailure)?,
        &pk.encrypt_with(z2, w).map_err(|_| ProofError::VerifyFailure)?,
    );
    let rhs = pk.combine(
        cap_t,
        &pk.scale(statement.cap_c2, e)
            .ok_or(ProofError::VerifyFailure)?,
    );
    if lhs != rhs {
        return Err(ProofError::VerifyFailure);
    }

    let e_scalar = Scalar::from_bignumber(e);

    // g^z1 == T_a A^e
    if Scalar::from_bignumber(z1).mul_by_generator()
        != cap_t_a + &(statement.cap_a * &e_scalar)
    {
        return Err(ProofError::VerifyFailure);
    }
    // g^z2 == T_b B^e
    if Scalar::from_bignumber(z2).mul_by_generator()
        != cap_t_b + &(statement.cap_b * &e_scalar)
    {
        return Err(ProofError::VerifyFailure);
    }

    Ok(())
}

/**
ZK proof: Paillier operation with commitments, range-checked.

Secret inputs: `a` in `±2^L`, `b` in `±2^L'`, and the randomizer `rho` of
the `enc(b, .)` layer of `C2`.

Public inputs: the Paillier key `N`, ciphertexts `C1`,
`C2 = C1^a * enc(b, rho)`, the points `A = a * G` and `B = b * G`, and the
verifier's ring-Pedersen parameters.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaillierOpProof {
    cap_t: Ciphertext,
    cap_t_a: Point,
    cap_t_b: Point,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_e_a: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_s_a: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_e_b: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_s_b: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z3: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z4: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    w: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl PaillierOpProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        witness: &OpWitness<'_>,
        statement: &OpStatement<'_>,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        check_witness(params, witness)?;

        let pk = statement.pk;
        let n_hat = setup.modulus();
        let ephemeral = Ephemeral::sample(rng, params, statement)?;

        let gamma_a = sample_signed_scaled(rng, params.l + params.eps, n_hat);
        let m_a = sample_signed_scaled(rng, params.l, n_hat);
        let gamma_b = sample_signed_scaled(rng, params.lp + params.eps, n_hat);
        let m_b = sample_signed_scaled(rng, params.lp, n_hat);

        let cap_e_a = setup.commit(&ephemeral.alpha, &gamma_a);
        let cap_s_a = setup.commit(witness.a, &m_a);
        let cap_e_b = setup.commit(&ephemeral.beta, &gamma_b);
        let cap_s_b = setup.commit(witness.b, &m_b);

        let transcript = Self::transcript(
            statement,
            setup,
            (&ephemeral.cap_t, &ephemeral.cap_t_a, &ephemeral.cap_t_b),
            &cap_e_a,
            &cap_s_a,
            &cap_e_b,
            &cap_s_b,
            aux,
        );
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = &ephemeral.alpha + &e * witness.a;
        let z2 = &ephemeral.beta + &e * witness.b;
        let z3 = gamma_a + &e * m_a;
        let z4 = gamma_b + &e * m_b;
        let w = modulo(
            &(&ephemeral.r
                * modpow_signed(witness.rho, &e, pk.modulus()).ok_or(ProofError::InvalidInput)?),
            pk.modulus(),
        );

        Ok(Self {
            cap_t: ephemeral.cap_t,
            cap_t_a: ephemeral.cap_t_a,
            cap_t_b: ephemeral.cap_t_b,
            cap_e_a,
            cap_s_a,
            cap_e_b,
            cap_s_b,
            z1,
            z2,
            z3,
            z4,
            w,
            salt,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transcript(
        statement: &OpStatement<'_>,
        setup: &PedersenParams,
        commitments: (&Ciphertext, &Point, &Point),
        cap_e_a: &BigNumber,
        cap_s_a: &BigNumber,
        cap_e_b: &BigNumber,
        cap_s_b: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(statement.pk)
            .chain(statement.cap_c1)
            .chain(statement.cap_c2)
            .chain(statement.cap_a)
            .chain(statement.cap_b)
            .chain(setup)
            .chain(commitments.0)
            .chain(commitments.1)
            .chain(commitments.2)
            .chain(cap_e_a)
            .chain(cap_s_a)
            .chain(cap_e_b)
            .chain(cap_s_b)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        statement: &OpStatement<'_>,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let pk = statement.pk;
        statement
            .cap_c1
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;
        statement
            .cap_c2
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;

        let transcript = Self::transcript(
            statement,
            setup,
            (&self.cap_t, &self.cap_t_a, &self.cap_t_b),
            &self.cap_e_a,
            &self.cap_s_a,
            &self.cap_e_b,
            &self.cap_s_b,
            aux,
        );
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        check_core(
            params,
            statement,
            &self.cap_t,
            &self.cap_t_a,
            &self.cap_t_b,
            &self.z1,
            &self.z2,
            &self.w,
            &e,
        )?;

        let n_hat = setup.modulus();

        // s^z1 t^z3 == E_a * S_a^e
        let lhs = setup.commit(&self.z1, &self.z3);
        let rhs = modulo(
            &(&self.cap_e_a
                * modpow_signed(&self.cap_s_a, &e, n_hat).ok_or(ProofError::VerifyFailure)?),
            n_hat,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // s^z2 t^z4 == E_b * S_b^e
        let lhs = setup.commit(&self.z2, &self.z4);
        let rhs = modulo(
            &(&self.cap_e_b
                * modpow_signed(&self.cap_s_b, &e, n_hat).ok_or(ProofError::VerifyFailure)?),
            n_hat,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        Ok(())
    }
}

/**
ZK proof: Paillier operation with commitments, simplified (no ring-Pedersen
layer).

Same statement as [`PaillierOpProof`] minus the setup parameters.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaillierOpSimpleProof {
    cap_t: Ciphertext,
    cap_t_a: Point,
    cap_t_b: Point,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    w: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl PaillierOpSimpleProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        witness: &OpWitness<'_>,
        statement: &OpStatement<'_>,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        check_witness(params, witness)?;

        let pk = statement.pk;
        let ephemeral = Ephemeral::sample(rng, params, statement)?;

        let transcript = Self::transcript(
            statement,
            (&ephemeral.cap_t, &ephemeral.cap_t_a, &ephemeral.cap_t_b),
            aux,
        );
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = &ephemeral.alpha + &e * witness.a;
        let z2 = &ephemeral.beta + &e * witness.b;
        let w = modulo(
            &(&ephemeral.r
                * modpow_signed(witness.rho, &e, pk.modulus()).ok_or(ProofError::InvalidInput)?),
            pk.modulus(),
        );

        Ok(Self {
            cap_t: ephemeral.cap_t,
            cap_t_a: ephemeral.cap_t_a,
            cap_t_b: ephemeral.cap_t_b,
            z1,
            z2,
            w,
            salt,
        })
    }

    fn transcript(
        statement: &OpStatement<'_>,
        commitments: (&Ciphertext, &Point, &Point),
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG_SIMPLE)
            .chain(aux)
            .chain(statement.pk)
            .chain(statement.cap_c1)
            .chain(statement.cap_c2)
            .chain(statement.cap_a)
            .chain(statement.cap_b)
            .chain(commitments.0)
            .chain(commitments.1)
            .chain(commitments.2)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        statement: &OpStatement<'_>,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let pk = statement.pk;
        statement
            .cap_c1
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;
        statement
            .cap_c2
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;

        let transcript =
            Self::transcript(statement, (&self.cap_t, &self.cap_t_a, &self.cap_t_b), aux);
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        check_core(
            params,
            statement,
            &self.cap_t,
            &self.cap_t_a,
            &self.cap_t_b,
            &self.z1,
            &self.z2,
            &self.w,
            &e,
        )
    }
}
