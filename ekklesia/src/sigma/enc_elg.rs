//! Paillier encryption vs ElGamal commitment with range: for
//! `C = enc(x, rho)` and the ElGamal-style triple `(A, B, X)` on the curve
//! with `A = a * G`, `B = b * G`, `X = (a * b + x) * G`, the same `x`
//! throughout, with `x` in `±2^L`.

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

const HASH_TAG: &[u8] = b"P_enc-elg";

/**
ZK proof: Paillier encryption vs ElGamal commitment in range.

Secret inputs:
- `x` in `±2^L`,
- `rho`, the Paillier randomizer of `C`,
- `b`, the receiver half of the ElGamal exponent.

Public inputs:
- the prover's Paillier public key `N0`,
- the ciphertext `C = enc(x, rho)`,
- the points `A = a * G`, `B = b * G`, `X = (a * b + x) * G`,
- the verifier's ring-Pedersen parameters (`N-hat`, `s`, `t`).
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncElgProof {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_s: BigNumber,
    cap_d: Ciphertext,
    cap_y: Point,
    cap_z: Point,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_t: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    w: Scalar,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    z2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z3: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl EncElgProof {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        x: &BigNumber,
        rho: &BigNumber,
        b: &Scalar,
        pk: &PublicKey,
        cap_c: &Ciphertext,
        cap_a: &Point,
        cap_b: &Point,
        cap_x: &Point,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if !in_signed_range(x, params.l) {
            return Err(ProofError::InvalidInput);
        }

        let n_hat = setup.modulus();

        let alpha = sample_signed(rng, params.l + params.eps);
        let m = sample_signed_scaled(rng, params.l, n_hat);
        let r = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let gamma = sample_signed_scaled(rng, params.l + params.eps, n_hat);
        let beta = Scalar::random(rng);

        let cap_s = setup.commit(x, &m);
        let cap_d = pk
            .encrypt_with(&alpha, &r)
            .map_err(|_| ProofError::InvalidInput)?;
        let cap_y = cap_a * &beta + Scalar::from_bignumber(&alpha).mul_by_generator();
        let cap_z = beta.mul_by_generator();
        let cap_t = setup.commit(&alpha, &gamma);

        let transcript = Self::transcript(
            pk, cap_c, cap_a, cap_b, cap_x, setup, &cap_s, &cap_d, &cap_y, &cap_z, &cap_t, aux,
        );
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = alpha + &e * x;
        let w = beta + Scalar::from_bignumber(&e) * *b;
        let z2 = modulo(
            &(r * modpow_signed(rho, &e, pk.modulus()).ok_or(ProofError::InvalidInput)?),
            pk.modulus(),
        );
        let z3 = gamma + &e * m;

        Ok(Self {
            cap_s,
            cap_d,
            cap_y,
            cap_z,
            cap_t,
            z1,
            w,
            z2,
            z3,
            salt,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transcript(
        pk: &PublicKey,
        cap_c: &Ciphertext,
        cap_a: &Point,
        cap_b: &Point,
        cap_x: &Point,
        setup: &PedersenParams,
        cap_s: &BigNumber,
        cap_d: &Ciphertext,
        cap_y: &Point,
        cap_z: &Point,
        cap_t: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(pk)
            .chain(cap_c)
            .chain(cap_a)
            .chain(cap_b)
            .chain(cap_x)
            .chain(setup)
            .chain(cap_s)
            .chain(cap_d)
            .chain(cap_y)
            .chain(cap_z)
            .chain(cap_t)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &self,
        params: &ProofParams,
        pk: &PublicKey,
        cap_c: &Ciphertext,
        cap_a: &Point,
        cap_b: &Point,
        cap_x: &Point,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        cap_c.validate(pk).map_err(|_| ProofError::VerifyFailure)?;
        self.cap_d
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;

        let transcript = Self::transcript(
            pk, cap_c, cap_a, cap_b, cap_x, setup, &self.cap_s, &self.cap_d, &self.cap_y,
            &self.cap_z, &self.cap_t, aux,
        );
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;
        let e_scalar = Scalar::from_bignumber(&e);

        if !in_signed_range(&self.z1, params.l + params.eps) {
            return Err(ProofError::VerifyFailure);
        }

        // enc(z1, z2) == D * C^e mod N0^2
        let lhs = pk
            .encrypt_with(&self.z1, &self.z2)
            .map_err(|_| ProofError::VerifyFailure)?;
        let rhs = pk.combine(
            &self.cap_d,
            &pk.scale(cap_c, &e).ok_or(ProofError::VerifyFailure)?,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // A^w g^z1 == Y X^e
        let lhs = cap_a * &self.w + Scalar::from_bignumber(&self.z1).mul_by_generator();
        let rhs = &self.cap_y + &(cap_x * &e_scalar);
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // g^w == Z B^e
        if self.w.mul_by_generator() != &self.cap_z + &(cap_b * &e_scalar) {
            return Err(ProofError::VerifyFailure);
        }

        // s^z1 t^z3 == T * S^e mod N-hat
        let lhs = setup.commit(&self.z1, &self.z3);
        let cap_s_e =
            modpow_signed(&self.cap_s, &e, setup.modulus()).ok_or(ProofError::VerifyFailure)?;
        let rhs = modulo(&(&self.cap_t * cap_s_e), setup.modulus());
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
    use super::EncElgProof;
    use crate::curve::Scalar;
    use crate::paillier::SecretKey;
    use crate::pedersen::PedersenParams;
    use crate::tools::bignum::{sample_signed, sample_unit};

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let setup_sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (setup, _) = PedersenParams::generate(&mut OsRng, &setup_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let x = sample_signed(&mut OsRng, params.l);
        let rho = sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let cap_c = pk.encrypt_with(&x, &rho).unwrap();

        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);
        let cap_a = a.mul_by_generator();
        let cap_b = b.mul_by_generator();
        let cap_x = (a * b + Scalar::from_bignumber(&x)).mul_by_generator();

        let proof = EncElgProof::new(
            &mut OsRng, &params, &x, &rho, &b, pk, &cap_c, &cap_a, &cap_b, &cap_x, &setup, &aux,
        )
        .unwrap();
        assert!(proof
            .verify(&params, pk, &cap_c, &cap_a, &cap_b, &cap_x, &setup, &aux)
            .is_ok());

        // A different committed value fails.
        let bad_x = &cap_x + &Scalar::ONE.mul_by_generator();
        assert!(proof
            .verify(&params, pk, &cap_c, &cap_a, &cap_b, &bad_x, &setup, &aux)
            .is_err());

        let mut tampered = proof.clone();
        tampered.w = tampered.w + Scalar::ONE;
        assert!(tampered
            .verify(&params, pk, &cap_c, &cap_a, &cap_b, &cap_x, &setup, &aux)
            .is_err());
    }
}
