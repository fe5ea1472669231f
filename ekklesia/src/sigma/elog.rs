//! The three-commitment E-log protocol: consistency of an ElGamal-style
//! commitment with a group exponentiation. For public
//! `(L, M, X, Y, h)`, knowledge of `(lambda, y)` with `L = lambda * G`,
//! `M = y * G + lambda * X` and `Y = y * h`.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::{bounded_challenge, ProofError, ProofParams};
use crate::curve::{Point, Scalar};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_elog";

/**
ZK proof: E-log (ElGamal commitment consistency).

Secret inputs:
- the commitment mask `lambda`,
- the committed exponent `y`.

Public inputs:
- `L = lambda * G`,
- `M = y * G + lambda * X`,
- the mask base `X`,
- `Y = y * h`,
- the exponent base `h`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElogProof {
    cap_a: Point,
    cap_n: Point,
    cap_b: Point,
    z1: Scalar,
    z2: Scalar,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

pub struct ElogStatement<'a> {
    pub cap_l: &'a Point,
    pub cap_m: &'a Point,
    pub cap_x: &'a Point,
    pub cap_y: &'a Point,
    pub h: &'a Point,
}

impl ElogProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        lambda: &Scalar,
        y: &Scalar,
        statement: &ElogStatement<'_>,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        let alpha = Scalar::random(rng);
        let beta = Scalar::random(rng);

        let cap_a = alpha.mul_by_generator();
        let cap_n = beta.mul_by_generator() + statement.cap_x * &alpha;
        let cap_b = statement.h * &beta;

        let transcript = Self::transcript(statement, &cap_a, &cap_n, &cap_b, aux);
        let (salt, e) = bounded_challenge(rng, &transcript, &params.q)?;
        let e = Scalar::from_bignumber(&e);

        let z1 = alpha + e * *lambda;
        let z2 = beta + e * *y;

        Ok(Self {
            cap_a,
            cap_n,
            cap_b,
            z1,
            z2,
            salt,
        })
    }

    fn transcript(
        statement: &ElogStatement<'_>,
        cap_a: &Point,
        cap_n: &Point,
        cap_b: &Point,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(statement.cap_l)
            .chain(statement.cap_m)
            .chain(statement.cap_x)
            .chain(statement.cap_y)
            .chain(statement.h)
            .chain(cap_a)
            .chain(cap_n)
            .chain(cap_b)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        statement: &ElogStatement<'_>,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let transcript = Self::transcript(statement, &self.cap_a, &self.cap_n, &self.cap_b, aux);
        let e = transcript
            .challenge_bounded(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;
        let e = Scalar::from_bignumber(&e);

        // z1 G == A + e L
        if self.z1.mul_by_generator() != self.cap_a + statement.cap_l * &e {
            return Err(ProofError::VerifyFailure);
        }
        // z2 G + z1 X == N + e M
        if self.z2.mul_by_generator() + statement.cap_x * &self.z1
            != self.cap_n + statement.cap_m * &e
        {
            return Err(ProofError::VerifyFailure);
        }
        // z2 h == B + e Y
        if statement.h * &self.z2 != self.cap_b + statement.cap_y * &e {
            return Err(ProofError::VerifyFailure);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::super::ProofParams;
    use super::{ElogProof, ElogStatement};
    use crate::curve::Scalar;

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();

        let aux: &[u8] = b"abcde";

        let lambda = Scalar::random(&mut OsRng);
        let y = Scalar::random(&mut OsRng);
        let cap_x = Scalar::random(&mut OsRng).mul_by_generator();
        let h = Scalar::random(&mut OsRng).mul_by_generator();

        let cap_l = lambda.mul_by_generator();
        let cap_m = y.mul_by_generator() + &cap_x * &lambda;
        let cap_y = &h * &y;

        let statement = ElogStatement {
            cap_l: &cap_l,
            cap_m: &cap_m,
            cap_x: &cap_x,
            cap_y: &cap_y,
            h: &h,
        };

        let proof = ElogProof::new(&mut OsRng, &params, &lambda, &y, &statement, &aux).unwrap();
        assert!(proof.verify(&params, &statement, &aux).is_ok());

        // A commitment to a different exponent fails.
        let other = Scalar::random(&mut OsRng).mul_by_generator();
        let bad = ElogStatement {
            cap_l: &cap_l,
            cap_m: &cap_m,
            cap_x: &cap_x,
            cap_y: &other,
            h: &h,
        };
        assert!(proof.verify(&params, &bad, &aux).is_err());

        let mut tampered = proof.clone();
        tampered.z2 = tampered.z2 + Scalar::ONE;
        assert!(tampered.verify(&params, &statement, &aux).is_err());
    }
}
