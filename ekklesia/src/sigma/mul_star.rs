//! Paillier multiplication vs group exponent: for `D = C^x * rho^N` and
//! `X = x * G`, the same `x` in both, with `x` in `±2^L`.

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

const HASH_TAG: &[u8] = b"P_mul*";

/**
ZK proof: Paillier multiplication with a group commitment in range.

Secret inputs:
- `x` in `±2^L`,
- `rho`, the randomizer layer of `D = C^x * rho^N`.

Public inputs:
- the Paillier public key `N0`,
- the ciphertexts `C` and `D`,
- the point `X = x * G`,
- the verifier's ring-Pedersen parameters (`N-hat`, `s`, `t`).
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MulStarProof {
    cap_a: Ciphertext,
    cap_b_x: Point,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_e: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_s: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    w: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl MulStarProof {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        x: &BigNumber,
        rho: &BigNumber,
        pk: &PublicKey,
        cap_c: &Ciphertext,
        cap_d: &Ciphertext,
        cap_x: &Point,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if !in_signed_range(x, params.l) {
            return Err(ProofError::InvalidInput);
        }

        let n_hat = setup.modulus();

        let alpha = sample_signed(rng, params.l + params.eps);
        let r = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let gamma = sample_signed_scaled(rng, params.l + params.eps, n_hat);
        let m = sample_signed_scaled(rng, params.l, n_hat);

        let r_n = r.modpow(pk.modulus(), pk.modulus_squared());
        let cap_a = Ciphertext::new_unchecked(modulo(
            &(pk.scale(cap_c, &alpha)
                .ok_or(ProofError::InvalidInput)?
                .as_inner()
                * r_n),
            pk.modulus_squared(),
        ));
        let cap_b_x = Scalar::from_bignumber(&alpha).mul_by_generator();
        let cap_e = setup.commit(&alpha, &gamma);
        let cap_s = setup.commit(x, &m);

        let transcript =
            Self::transcript(pk, cap_c, cap_d, cap_x, setup, &cap_a, &cap_b_x, &cap_e, &cap_s, aux);
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = alpha + &e * x;
        let z2 = gamma + &e * m;
        let w = modulo(
            &(r * modpow_signed(rho, &e, pk.modulus()).ok_or(ProofError::InvalidInput)?),
            pk.modulus(),
        );

        Ok(Self {
            cap_a,
            cap_b_x,
            cap_e,
            cap_s,
            z1,
            z2,
            w,
            salt,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transcript(
        pk: &PublicKey,
        cap_c: &Ciphertext,
        cap_d: &Ciphertext,
        cap_x: &Point,
        setup: &PedersenParams,
        cap_a: &Ciphertext,
        cap_b_x: &Point,
        cap_e: &BigNumber,
        cap_s: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(pk)
            .chain(cap_c)
            .chain(cap_d)
            .chain(cap_x)
            .chain(setup)
            .chain(cap_a)
            .chain(cap_b_x)
            .chain(cap_e)
            .chain(cap_s)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &self,
        params: &ProofParams,
        pk: &PublicKey,
        cap_c: &Ciphertext,
        cap_d: &Ciphertext,
        cap_x: &Point,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        for ciphertext in [cap_c, cap_d, &self.cap_a] {
            ciphertext
                .validate(pk)
                .map_err(|_| ProofError::VerifyFailure)?;
        }

        let transcript = Self::transcript(
            pk, cap_c, cap_d, cap_x, setup, &self.cap_a, &self.cap_b_x, &self.cap_e, &self.cap_s,
            aux,
        );
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        if !in_signed_range(&self.z1, params.l + params.eps) {
            return Err(ProofError::VerifyFailure);
        }

        // C^z1 w^N == A * D^e mod N^2
        let w_n = self.w.modpow(pk.modulus(), pk.modulus_squared());
        let lhs = modulo(
            &(pk.scale(cap_c, &self.z1)
                .ok_or(ProofError::VerifyFailure)?
                .as_inner()
                * w_n),
            pk.modulus_squared(),
        );
        let rhs = modulo(
            &(self.cap_a.as_inner()
                * pk.scale(cap_d, &e)
                    .ok_or(ProofError::VerifyFailure)?
                    .as_inner()),
            pk.modulus_squared(),
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // g^z1 == B_x X^e
        let lhs = Scalar::from_bignumber(&self.z1).mul_by_generator();
        let rhs = &self.cap_b_x + &(cap_x * &Scalar::from_bignumber(&e));
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // s^z1 t^z2 == E * S^e mod N-hat
        let lhs = setup.commit(&self.z1, &self.z2);
        let cap_s_e =
            modpow_signed(&self.cap_s, &e, setup.modulus()).ok_or(ProofError::VerifyFailure)?;
        let rhs = modulo(&(&self.cap_e * cap_s_e), setup.modulus());
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;
    use unknown_order::BigNumber;

    use super::super::ProofParams;
    use super::MulStarProof;
    use crate::curve::Scalar;
    use crate::paillier::{Ciphertext, SecretKey};
    use crate::pedersen::PedersenParams;
    use crate::tools::bignum::{modulo, sample_signed, sample_unit};

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

        let cap_c = pk.encrypt(&mut OsRng, &BigNumber::from(777u64)).unwrap();
        let rho_n = rho.modpow(pk.modulus(), pk.modulus_squared());
        let cap_d = Ciphertext::new_unchecked(modulo(
            &(pk.scale(&cap_c, &x).unwrap().as_inner() * rho_n),
            pk.modulus_squared(),
        ));
        let cap_x = Scalar::from_bignumber(&x).mul_by_generator();

        let proof = MulStarProof::new(
            &mut OsRng, &params, &x, &rho, pk, &cap_c, &cap_d, &cap_x, &setup, &aux,
        )
        .unwrap();
        assert!(proof
            .verify(&params, pk, &cap_c, &cap_d, &cap_x, &setup, &aux)
            .is_ok());

        let mut tampered = proof.clone();
        tampered.w = tampered.w + BigNumber::one();
        assert!(tampered
            .verify(&params, pk, &cap_c, &cap_d, &cap_x, &setup, &aux)
            .is_err());
    }
}
