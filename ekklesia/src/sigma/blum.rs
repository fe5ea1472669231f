//! Paillier-Blum modulus: `N = pq` with `p = q = 3 (mod 4)` and
//! `gcd(N, phi(N)) = 1`. For every challenge `y_i` the prover exhibits a
//! fourth root of `(-1)^a w^b y_i` and an N-th root of `y_i`.

use alloc::boxed::Box;
use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use crate::paillier::SecretKey;
use crate::tools::bignum::{
    crt_combine, is_quadratic_residue, jacobi, modulo, sqrt_mod_prime, MAX_RETRIES,
};
use crate::tools::hashing::{random_salt, Chain, Hashable, Transcript};

use super::{ProofError, MIN_CHALLENGES};

const HASH_TAG: &[u8] = b"P_mod";

/**
ZK proof: Paillier-Blum modulus.

Secret inputs:
- the factors `p`, `q` of `N`, both `3 (mod 4)`.

Public inputs:
- the modulus `N`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlumProof {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    w: BigNumber,
    elements: Vec<BlumElement>,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct BlumElement {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    x: BigNumber,
    a: bool,
    b: bool,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    z: BigNumber,
}

/// A square root of `value` mod `N = pq` that is itself a quadratic residue
/// (exists for any fourth-power residue of a Blum modulus).
fn principal_sqrt(
    value: &BigNumber,
    p: &BigNumber,
    q: &BigNumber,
    n: &BigNumber,
) -> Option<BigNumber> {
    let root_p = sqrt_mod_prime(value, p)?;
    let root_q = sqrt_mod_prime(value, q)?;
    // Of the two roots mod each prime, exactly one is a residue
    // (since -1 is a non-residue mod a prime that is 3 mod 4).
    let root_p = if is_quadratic_residue(&root_p, p) {
        root_p
    } else {
        p - root_p
    };
    let root_q = if is_quadratic_residue(&root_q, q) {
        root_q
    } else {
        q - root_q
    };
    let combined = crt_combine(&root_p, p, &root_q, q)?;
    Some(modulo(&combined, n))
}

impl BlumProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        sk: &SecretKey,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        let (p, q) = sk.primes();
        let four = BigNumber::from(4u64);
        let three = BigNumber::from(3u64);
        if p % &four != three || q % &four != three {
            return Err(ProofError::InvalidInput);
        }
        let n = sk.public_key().modulus();

        // A witness of Jacobi symbol -1.
        let mut w = None;
        for _ in 0..MAX_RETRIES {
            let candidate = crate::tools::bignum::sample_below(rng, n);
            if jacobi(&candidate, n) == -1 {
                w = Some(candidate);
                break;
            }
        }
        let w = w.ok_or(ProofError::ExceededMaxRetry)?;

        let nth_root_exponent = n
            .invert(&sk.phi())
            .ok_or(ProofError::InvalidInput)?;

        let salt = random_salt(rng);
        let transcript = Self::transcript(n, &w, aux);

        let elements = (0..MIN_CHALLENGES as u64)
            .map(|i| {
                let y = transcript.challenge_unit(&salt, i, n);
                let z = y.modpow(&nth_root_exponent, n);

                // Exactly one of y, -y, wy, -wy is a quadratic residue.
                let mut found = None;
                for (a, b) in [(false, false), (true, false), (false, true), (true, true)] {
                    let mut candidate = y.clone();
                    if b {
                        candidate = modulo(&(candidate * &w), n);
                    }
                    if a {
                        candidate = modulo(&(n - &candidate), n);
                    }
                    if is_quadratic_residue(&candidate, p) && is_quadratic_residue(&candidate, q) {
                        found = Some((a, b, candidate));
                        break;
                    }
                }
                let (a, b, target) = found.ok_or(ProofError::InvalidInput)?;

                let square_root =
                    principal_sqrt(&target, p, q, n).ok_or(ProofError::InvalidInput)?;
                let x = principal_sqrt(&square_root, p, q, n).ok_or(ProofError::InvalidInput)?;

                Ok(BlumElement { x, a, b, z })
            })
            .collect::<Result<Vec<_>, ProofError>>()?;

        Ok(Self { w, elements, salt })
    }

    fn transcript(n: &BigNumber, w: &BigNumber, aux: &impl Hashable) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(n)
            .chain(w)
    }

    pub fn verify(&self, n: &BigNumber, aux: &impl Hashable) -> Result<(), ProofError> {
        if n <= &BigNumber::one() || n % BigNumber::from(2u64) == BigNumber::zero() || n.is_prime()
        {
            return Err(ProofError::VerifyFailure);
        }
        if self.elements.len() < MIN_CHALLENGES {
            return Err(ProofError::TooFewChallenge);
        }
        if self.w <= BigNumber::zero() || &self.w >= n || jacobi(&self.w, n) != -1 {
            return Err(ProofError::VerifyFailure);
        }

        let transcript = Self::transcript(n, &self.w, aux);

        for (i, element) in self.elements.iter().enumerate() {
            let y = transcript.challenge_unit(&self.salt, i as u64, n);

            // z^N == y mod N
            if element.z.modpow(n, n) != y {
                return Err(ProofError::VerifyFailure);
            }

            // x^4 == (-1)^a w^b y mod N
            let mut target = y;
            if element.b {
                target = modulo(&(target * &self.w), n);
            }
            if element.a {
                target = modulo(&(n - &target), n);
            }
            if element.x.modpow(&BigNumber::from(4u64), n) != target {
                return Err(ProofError::VerifyFailure);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;
    use unknown_order::BigNumber;

    use super::BlumProof;
    use crate::paillier::SecretKey;

    #[test]
    fn prove_and_verify() {
        // Safe primes are 3 mod 4.
        let sk = SecretKey::generate_unchecked(&mut OsRng, 512, true).unwrap();
        let n = sk.public_key().modulus();

        let aux: &[u8] = b"abcde";

        let proof = BlumProof::new(&mut OsRng, &sk, &aux).unwrap();
        assert!(proof.verify(n, &aux).is_ok());

        let mut tampered = proof.clone();
        tampered.elements[0].x = &tampered.elements[0].x + BigNumber::one();
        assert!(tampered.verify(n, &aux).is_err());

        // A proof does not transfer to another modulus.
        let other = SecretKey::generate_unchecked(&mut OsRng, 512, true).unwrap();
        assert!(proof.verify(other.public_key().modulus(), &aux).is_err());
    }
}
