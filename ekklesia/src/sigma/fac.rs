//! Knowledge of the factorization of `N` (a Poupard-Stern style argument
//! over `phi(N)`), attached to Paillier public keys in transit.

use alloc::boxed::Box;
use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{bounded_challenge, ProofError, ProofParams};
use crate::paillier::SecretKey;
use crate::tools::bignum::{in_signed_range, sample_signed};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_fac";

/// The number of challenge bases.
const BASES: u64 = 16;

/**
ZK proof: knowledge of `phi(N)` for a modulus `N` that is a product of two
primes of equal size.

Public inputs:
- the modulus `N`.

Secret inputs:
- the factors `p`, `q` of `N`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FacProof {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    n: BigNumber,
    commitments: Vec<Commitment>,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Commitment(#[serde(with = "crate::tools::bignum::serde_unsigned")] BigNumber);

/// The challenge bases are fixed by the modulus alone; the prover knows
/// `phi(N)`, which works for any base.
fn base(n: &BigNumber, index: u64) -> BigNumber {
    Transcript::new_with_dst(HASH_TAG)
        .chain(n)
        .challenge_unit(b"", index, n)
}

/// The masking randomness is wide enough to statistically hide
/// `e * (N - phi(N))`.
fn mask_bits(params: &ProofParams, n: &BigNumber) -> usize {
    n.bit_length() / 2 + 2 + params.l + params.eps
}

impl FacProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        aux: &impl Hashable,
        sk: &SecretKey,
    ) -> Result<Self, ProofError> {
        let n = sk.public_key().modulus().clone();
        let gap = &n - sk.phi();

        let r = sample_signed(rng, mask_bits(params, &n));
        let commitments = (0..BASES)
            .map(|i| {
                crate::tools::bignum::modpow_signed(&base(&n, i), &r, &n)
                    .map(Commitment)
                    .ok_or(ProofError::InvalidInput)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let transcript = Self::transcript(aux, &n, &commitments);
        let (salt, e) = bounded_challenge(rng, &transcript, &params.q)?;

        let z = r + e * gap;

        Ok(Self {
            n,
            commitments,
            z,
            salt,
        })
    }

    fn transcript(aux: &impl Hashable, n: &BigNumber, commitments: &[Commitment]) -> Transcript {
        let mut transcript = Transcript::new_with_dst(HASH_TAG).chain(aux).chain(n);
        for commitment in commitments {
            transcript = transcript.chain(&commitment.0);
        }
        transcript
    }

    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    #[cfg(test)]
    pub(crate) fn set_modulus(&mut self, n: BigNumber) {
        self.n = n;
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let n = &self.n;
        if n <= &BigNumber::one()
            || n % BigNumber::from(2u64) == BigNumber::zero()
            || n.is_prime()
        {
            return Err(ProofError::VerifyFailure);
        }
        if self.commitments.len() != BASES as usize {
            return Err(ProofError::VerifyFailure);
        }

        let transcript = Self::transcript(aux, n, &self.commitments);
        let e = transcript
            .challenge_bounded(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        // The response must stay in the honest range.
        if !in_signed_range(&self.z, mask_bits(params, n) + 1) {
            return Err(ProofError::VerifyFailure);
        }

        for (i, commitment) in self.commitments.iter().enumerate() {
            if commitment.0.gcd(n) != BigNumber::one() {
                return Err(ProofError::VerifyFailure);
            }
            let x = base(n, i as u64);
            // x^z == t * (x^N)^e mod N
            let lhs = crate::tools::bignum::modpow_signed(&x, &self.z, n)
                .ok_or(ProofError::VerifyFailure)?;
            let rhs_exponent = &e * n;
            let rhs = crate::tools::bignum::modulo(
                &(&commitment.0 * x.modpow(&rhs_exponent, n)),
                n,
            );
            if lhs != rhs {
                return Err(ProofError::VerifyFailure);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::super::ProofParams;
    use super::FacProof;
    use crate::paillier::SecretKey;

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();

        let aux: &[u8] = b"abcde";

        let proof = FacProof::new(&mut OsRng, &params, &aux, &sk).unwrap();
        assert!(proof.verify(&params, &aux).is_ok());
    }

    #[test]
    fn tampered_proof_fails() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();

        let aux: &[u8] = b"abcde";

        let proof = FacProof::new(&mut OsRng, &params, &aux, &sk).unwrap();

        let mut tampered = proof.clone();
        tampered.z = tampered.z + unknown_order::BigNumber::one();
        assert!(tampered.verify(&params, &aux).is_err());

        // A different binding context also fails.
        let other_aux: &[u8] = b"edcba";
        assert!(proof.verify(&params, &other_aux).is_err());
    }
}
