//! Knowledge of exponent and Paillier encryption: for `C = enc(x, rho)` and
//! `X = g * x`, the same `x` in both. The lighter sibling of
//! [`super::log_star`]: no ring-Pedersen commitment, used where the verifier
//! has no trusted setup for the prover yet.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{signed_challenge, ProofError, ProofParams};
use crate::curve::{Point, Scalar};
use crate::paillier::{Ciphertext, PublicKey};
use crate::tools::bignum::{in_signed_range, modpow_signed, modulo, sample_signed, sample_unit};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_enc-exp";

/**
ZK proof: knowledge of exponent and Paillier encryption.

Secret inputs:
- `x` in `±2^L`,
- `rho`, the Paillier randomizer of `C`.

Public inputs:
- the prover's Paillier public key `N0`,
- the ciphertext `C = enc(x, rho)`,
- the base point `g`,
- the point `X = g * x`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncExpProof {
    cap_a: Ciphertext,
    cap_y: Point,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    z2: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl EncExpProof {
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
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if !in_signed_range(x, params.l) {
            return Err(ProofError::InvalidInput);
        }

        let alpha = sample_signed(rng, params.l + params.eps);
        let r = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;

        let cap_a = pk
            .encrypt_with(&alpha, &r)
            .map_err(|_| ProofError::InvalidInput)?;
        let cap_y = g * &Scalar::from_bignumber(&alpha);

        let transcript = Self::transcript(pk, cap_c, g, cap_x, &cap_a, &cap_y, aux);
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = alpha + &e * x;
        let z2 = modulo(
            &(r * modpow_signed(rho, &e, pk.modulus()).ok_or(ProofError::InvalidInput)?),
            pk.modulus(),
        );

        Ok(Self {
            cap_a,
            cap_y,
            z1,
            z2,
            salt,
        })
    }

    fn transcript(
        pk: &PublicKey,
        cap_c: &Ciphertext,
        g: &Point,
        cap_x: &Point,
        cap_a: &Ciphertext,
        cap_y: &Point,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(pk)
            .chain(cap_c)
            .chain(g)
            .chain(cap_x)
            .chain(cap_a)
            .chain(cap_y)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &self,
        params: &ProofParams,
        pk: &PublicKey,
        cap_c: &Ciphertext,
        g: &Point,
        cap_x: &Point,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        cap_c.validate(pk).map_err(|_| ProofError::VerifyFailure)?;
        self.cap_a
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;

        let transcript = Self::transcript(pk, cap_c, g, cap_x, &self.cap_a, &self.cap_y, aux);
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

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

        // g^z1 == Y X^e
        let lhs = g * &Scalar::from_bignumber(&self.z1);
        let rhs = &self.cap_y + &(cap_x * &Scalar::from_bignumber(&e));
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
    use super::EncExpProof;
    use crate::curve::{Point, Scalar};
    use crate::paillier::SecretKey;
    use crate::tools::bignum::sample_unit;

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let aux: &[u8] = b"abcde";

        let g = Point::GENERATOR;
        let x = Scalar::random(&mut OsRng);
        let x_bn = x.to_bignumber();
        let rho = sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let cap_c = pk.encrypt_with(&x_bn, &rho).unwrap();
        let cap_x = &g * &x;

        let proof = EncExpProof::new(
            &mut OsRng, &params, &x_bn, &rho, pk, &cap_c, &g, &cap_x, &aux,
        )
        .unwrap();
        assert!(proof.verify(&params, pk, &cap_c, &g, &cap_x, &aux).is_ok());

        let bad_x = &cap_x + &g;
        assert!(proof.verify(&params, pk, &cap_c, &g, &bad_x, &aux).is_err());
    }
}
