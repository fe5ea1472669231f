//! Knowledge of exponent over two bases: for `X = g * x` and `Y = h * x`,
//! knowledge of the shared exponent `x`.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::{bounded_challenge, ProofError, ProofParams};
use crate::curve::{Point, Scalar};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_sch";

/**
ZK proof: knowledge of a shared exponent (a two-base Schnorr variant).

Secret inputs:
- the exponent `x`.

Public inputs:
- the base points `g` and `h`,
- `X = g * x` and `Y = h * x`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchnorrProof {
    cap_a1: Point,
    cap_a2: Point,
    z: Scalar,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl SchnorrProof {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        x: &Scalar,
        g: &Point,
        h: &Point,
        cap_x: &Point,
        cap_y: &Point,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        let alpha = Scalar::random(rng);
        let cap_a1 = g * &alpha;
        let cap_a2 = h * &alpha;

        let transcript = Self::transcript(g, h, cap_x, cap_y, &cap_a1, &cap_a2, aux);
        let (salt, e) = bounded_challenge(rng, &transcript, &params.q)?;
        let e = Scalar::from_bignumber(&e);

        let z = alpha + e * *x;

        Ok(Self {
            cap_a1,
            cap_a2,
            z,
            salt,
        })
    }

    fn transcript(
        g: &Point,
        h: &Point,
        cap_x: &Point,
        cap_y: &Point,
        cap_a1: &Point,
        cap_a2: &Point,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(g)
            .chain(h)
            .chain(cap_x)
            .chain(cap_y)
            .chain(cap_a1)
            .chain(cap_a2)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        g: &Point,
        h: &Point,
        cap_x: &Point,
        cap_y: &Point,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let transcript = Self::transcript(g, h, cap_x, cap_y, &self.cap_a1, &self.cap_a2, aux);
        let e = transcript
            .challenge_bounded(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;
        let e = Scalar::from_bignumber(&e);

        // g^z == A1 X^e
        if g * &self.z != &self.cap_a1 + &(cap_x * &e) {
            return Err(ProofError::VerifyFailure);
        }
        // h^z == A2 Y^e
        if h * &self.z != &self.cap_a2 + &(cap_y * &e) {
            return Err(ProofError::VerifyFailure);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::super::ProofParams;
    use super::SchnorrProof;
    use crate::curve::{Point, Scalar};

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();

        let aux: &[u8] = b"abcde";

        let g = Point::GENERATOR;
        let h = Scalar::random(&mut OsRng).mul_by_generator();
        let x = Scalar::random(&mut OsRng);
        let cap_x = &g * &x;
        let cap_y = &h * &x;

        let proof =
            SchnorrProof::new(&mut OsRng, &params, &x, &g, &h, &cap_x, &cap_y, &aux).unwrap();
        assert!(proof.verify(&params, &g, &h, &cap_x, &cap_y, &aux).is_ok());

        // Unequal exponents fail.
        let cap_y_bad = &h * &Scalar::random(&mut OsRng);
        assert!(proof
            .verify(&params, &g, &h, &cap_x, &cap_y_bad, &aux)
            .is_err());

        let mut tampered = proof.clone();
        tampered.z = tampered.z + Scalar::ONE;
        assert!(tampered
            .verify(&params, &g, &h, &cap_x, &cap_y, &aux)
            .is_err());
    }
}
