//! Affine group operation with a group commitment: for
//! `D = C^x * enc_0(y, rho)`, `Y = enc_1(y, rho_y)` and `X = g * x`,
//! the same `x` and `y` throughout, with `x` in `±2^L` and `y` in `±2^L'`.

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

const HASH_TAG: &[u8] = b"P_aff-g";

/**
ZK proof: Paillier affine operation with a group commitment in range.

Secret inputs:
- `x` in `±2^L`,
- `y` in `±2^L'`,
- `rho`, the randomizer of the `enc_0(y, .)` layer of `D` (under `N0`),
- `rho_y`, the randomizer of `Y` (under `N1`).

Public inputs:
- `N0`, the verifier's Paillier public key (`C` and `D` live under it),
- `N1`, the prover's Paillier public key (`Y` lives under it),
- the ciphertexts `C` and `D = C^x * enc_0(y, rho)`,
- the ciphertext `Y = enc_1(y, rho_y)`,
- the point `X = g * x`,
- the verifier's ring-Pedersen parameters (`N-hat`, `s`, `t`).
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AffGProof {
    cap_a: Ciphertext,
    cap_b_x: Point,
    cap_b_y: Ciphertext,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_e: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_s: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_f: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_t: BigNumber,
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
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    w_y: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

pub struct AffGStatement<'a> {
    /// The verifier's Paillier key.
    pub pk0: &'a PublicKey,
    /// The prover's Paillier key.
    pub pk1: &'a PublicKey,
    pub cap_c: &'a Ciphertext,
    pub cap_d: &'a Ciphertext,
    pub cap_y: &'a Ciphertext,
    pub cap_x: &'a Point,
}

pub struct AffGWitness<'a> {
    pub x: &'a BigNumber,
    pub y: &'a BigNumber,
    pub rho: &'a BigNumber,
    pub rho_y: &'a BigNumber,
}

impl AffGProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        witness: &AffGWitness<'_>,
        statement: &AffGStatement<'_>,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if !in_signed_range(witness.x, params.l) || !in_signed_range(witness.y, params.lp) {
            return Err(ProofError::InvalidInput);
        }

        let pk0 = statement.pk0;
        let pk1 = statement.pk1;
        let n_hat = setup.modulus();

        let alpha = sample_signed(rng, params.l + params.eps);
        let beta = sample_signed(rng, params.lp + params.eps);
        let r = sample_unit(rng, pk0.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let r_y = sample_unit(rng, pk1.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let gamma = sample_signed_scaled(rng, params.l + params.eps, n_hat);
        let m = sample_signed_scaled(rng, params.l, n_hat);
        let delta = sample_signed_scaled(rng, params.l + params.eps, n_hat);
        let mu = sample_signed_scaled(rng, params.l, n_hat);

        let cap_a = pk0.combine(
            &pk0.scale(statement.cap_c, &alpha)
                .ok_or(ProofError::InvalidInput)?,
            &pk0.encrypt_with(&beta, &r)
                .map_err(|_| ProofError::InvalidInput)?,
        );
        let cap_b_x = Scalar::from_bignumber(&alpha).mul_by_generator();
        let cap_b_y = pk1
            .encrypt_with(&beta, &r_y)
            .map_err(|_| ProofError::InvalidInput)?;
        let cap_e = setup.commit(&alpha, &gamma);
        let cap_s = setup.commit(witness.x, &m);
        let cap_f = setup.commit(&beta, &delta);
        let cap_t = setup.commit(witness.y, &mu);

        let transcript = Self::transcript(
            statement, setup, &cap_a, &cap_b_x, &cap_b_y, &cap_e, &cap_s, &cap_f, &cap_t, aux,
        );
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = alpha + &e * witness.x;
        let z2 = beta + &e * witness.y;
        let z3 = gamma + &e * m;
        let z4 = delta + &e * mu;
        let w = modulo(
            &(r * modpow_signed(witness.rho, &e, pk0.modulus()).ok_or(ProofError::InvalidInput)?),
            pk0.modulus(),
        );
        let w_y = modulo(
            &(r_y
                * modpow_signed(witness.rho_y, &e, pk1.modulus())
                    .ok_or(ProofError::InvalidInput)?),
            pk1.modulus(),
        );

        Ok(Self {
            cap_a,
            cap_b_x,
            cap_b_y,
            cap_e,
            cap_s,
            cap_f,
            cap_t,
            z1,
            z2,
            z3,
            z4,
            w,
            w_y,
            salt,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transcript(
        statement: &AffGStatement<'_>,
        setup: &PedersenParams,
        cap_a: &Ciphertext,
        cap_b_x: &Point,
        cap_b_y: &Ciphertext,
        cap_e: &BigNumber,
        cap_s: &BigNumber,
        cap_f: &BigNumber,
        cap_t: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(statement.pk0)
            .chain(statement.pk1)
            .chain(statement.cap_c)
            .chain(statement.cap_d)
            .chain(statement.cap_y)
            .chain(statement.cap_x)
            .chain(setup)
            .chain(cap_a)
            .chain(cap_b_x)
            .chain(cap_b_y)
            .chain(cap_e)
            .chain(cap_s)
            .chain(cap_f)
            .chain(cap_t)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        statement: &AffGStatement<'_>,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let pk0 = statement.pk0;
        let pk1 = statement.pk1;

        statement
            .cap_c
            .validate(pk0)
            .map_err(|_| ProofError::VerifyFailure)?;
        statement
            .cap_d
            .validate(pk0)
            .map_err(|_| ProofError::VerifyFailure)?;
        statement
            .cap_y
            .validate(pk1)
            .map_err(|_| ProofError::VerifyFailure)?;
        self.cap_a
            .validate(pk0)
            .map_err(|_| ProofError::VerifyFailure)?;
        self.cap_b_y
            .validate(pk1)
            .map_err(|_| ProofError::VerifyFailure)?;

        let transcript = Self::transcript(
            statement,
            setup,
            &self.cap_a,
            &self.cap_b_x,
            &self.cap_b_y,
            &self.cap_e,
            &self.cap_s,
            &self.cap_f,
            &self.cap_t,
            aux,
        );
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        // Range checks
        if !in_signed_range(&self.z1, params.l + params.eps)
            || !in_signed_range(&self.z2, params.lp + params.eps)
        {
            return Err(ProofError::VerifyFailure);
        }

        // C^z1 enc_0(z2, w) == A * D^e mod N0^2
        let lhs = pk0.combine(
            &pk0.scale(statement.cap_c, &self.z1)
                .ok_or(ProofError::VerifyFailure)?,
            &pk0.encrypt_with(&self.z2, &self.w)
                .map_err(|_| ProofError::VerifyFailure)?,
        );
        let rhs = pk0.combine(
            &self.cap_a,
            &pk0.scale(statement.cap_d, &e)
                .ok_or(ProofError::VerifyFailure)?,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // g^z1 == B_x X^e
        let e_scalar = Scalar::from_bignumber(&e);
        let lhs = Scalar::from_bignumber(&self.z1).mul_by_generator();
        let rhs = &self.cap_b_x + &(statement.cap_x * &e_scalar);
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // enc_1(z2, w_y) == B_y Y^e mod N1^2
        let lhs = pk1
            .encrypt_with(&self.z2, &self.w_y)
            .map_err(|_| ProofError::VerifyFailure)?;
        let rhs = pk1.combine(
            &self.cap_b_y,
            &pk1.scale(statement.cap_y, &e)
                .ok_or(ProofError::VerifyFailure)?,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // s^z1 t^z3 == E * S^e mod N-hat
        let lhs = setup.commit(&self.z1, &self.z3);
        let cap_s_e =
            modpow_signed(&self.cap_s, &e, setup.modulus()).ok_or(ProofError::VerifyFailure)?;
        let rhs = modulo(&(&self.cap_e * cap_s_e), setup.modulus());
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // s^z2 t^z4 == F * T^e mod N-hat
        let lhs = setup.commit(&self.z2, &self.z4);
        let cap_t_e =
            modpow_signed(&self.cap_t, &e, setup.modulus()).ok_or(ProofError::VerifyFailure)?;
        let rhs = modulo(&(&self.cap_f * cap_t_e), setup.modulus());
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::super::ProofParams;
    use super::{AffGProof, AffGStatement, AffGWitness};
    use crate::curve::Scalar;
    use crate::paillier::SecretKey;
    use crate::pedersen::PedersenParams;
    use crate::tools::bignum::{sample_signed, sample_unit};

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();

        // The "verifier" key: C and D live under it.
        let sk0 = SecretKey::generate_unchecked(&mut OsRng, 1536, false).unwrap();
        let pk0 = sk0.public_key();
        // The prover's key.
        let sk1 = SecretKey::generate_unchecked(&mut OsRng, 1536, false).unwrap();
        let pk1 = sk1.public_key();

        let setup_sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (setup, _) = PedersenParams::generate(&mut OsRng, &setup_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let x = sample_signed(&mut OsRng, params.l);
        let y = sample_signed(&mut OsRng, params.lp);

        let rho = sample_unit(&mut OsRng, pk0.modulus()).unwrap();
        let rho_y = sample_unit(&mut OsRng, pk1.modulus()).unwrap();

        let secret = unknown_order::BigNumber::from(1234567u64);
        let cap_c = pk0.encrypt(&mut OsRng, &secret).unwrap();
        let cap_d = pk0.combine(
            &pk0.scale(&cap_c, &x).unwrap(),
            &pk0.encrypt_with(&y, &rho).unwrap(),
        );
        let cap_y = pk1.encrypt_with(&y, &rho_y).unwrap();
        let cap_x = Scalar::from_bignumber(&x).mul_by_generator();

        let statement = AffGStatement {
            pk0,
            pk1,
            cap_c: &cap_c,
            cap_d: &cap_d,
            cap_y: &cap_y,
            cap_x: &cap_x,
        };
        let witness = AffGWitness {
            x: &x,
            y: &y,
            rho: &rho,
            rho_y: &rho_y,
        };

        let proof =
            AffGProof::new(&mut OsRng, &params, &witness, &statement, &setup, &aux).unwrap();
        assert!(proof.verify(&params, &statement, &setup, &aux).is_ok());
    }

    #[test]
    fn tampering_fails() {
        let params = ProofParams::secp256k1();

        let sk0 = SecretKey::generate_unchecked(&mut OsRng, 1536, false).unwrap();
        let pk0 = sk0.public_key();
        let sk1 = SecretKey::generate_unchecked(&mut OsRng, 1536, false).unwrap();
        let pk1 = sk1.public_key();

        let setup_sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (setup, _) = PedersenParams::generate(&mut OsRng, &setup_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let x = sample_signed(&mut OsRng, params.l);
        let y = sample_signed(&mut OsRng, params.lp);
        let rho = sample_unit(&mut OsRng, pk0.modulus()).unwrap();
        let rho_y = sample_unit(&mut OsRng, pk1.modulus()).unwrap();

        let secret = unknown_order::BigNumber::from(42u64);
        let cap_c = pk0.encrypt(&mut OsRng, &secret).unwrap();
        let cap_d = pk0.combine(
            &pk0.scale(&cap_c, &x).unwrap(),
            &pk0.encrypt_with(&y, &rho).unwrap(),
        );
        let cap_y = pk1.encrypt_with(&y, &rho_y).unwrap();
        let cap_x = Scalar::from_bignumber(&x).mul_by_generator();

        let statement = AffGStatement {
            pk0,
            pk1,
            cap_c: &cap_c,
            cap_d: &cap_d,
            cap_y: &cap_y,
            cap_x: &cap_x,
        };
        let witness = AffGWitness {
            x: &x,
            y: &y,
            rho: &rho,
            rho_y: &rho_y,
        };

        let proof =
            AffGProof::new(&mut OsRng, &params, &witness, &statement, &setup, &aux).unwrap();

        let mut tampered = proof.clone();
        tampered.z2 = tampered.z2 + unknown_order::BigNumber::one();
        assert!(tampered.verify(&params, &statement, &setup, &aux).is_err());

        // Swapping in a different X
        let bad_x = &cap_x + &Scalar::ONE.mul_by_generator();
        let bad_statement = AffGStatement {
            pk0,
            pk1,
            cap_c: &cap_c,
            cap_d: &cap_d,
            cap_y: &cap_y,
            cap_x: &bad_x,
        };
        assert!(proof.verify(&params, &bad_statement, &setup, &aux).is_err());
    }
}
