//! Knowledge of an N-th root: for public `A = rho^N mod N^2`, knowledge of
//! `rho`. Used when Paillier randomizers are opened during error analysis.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{bounded_challenge, ProofError, ProofParams};
use crate::paillier::PublicKey;
use crate::tools::bignum::{modulo, sample_unit};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_Nroot";

/**
ZK proof: knowledge of an N-th root.

Secret inputs:
- `rho`, a unit mod `N`.

Public inputs:
- the Paillier public key `N`,
- `A = rho^N mod N^2`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NthRootProof {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_b: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    z: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl NthRootProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        rho: &BigNumber,
        pk: &PublicKey,
        cap_a: &BigNumber,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if rho.gcd(pk.modulus()) != BigNumber::one() {
            return Err(ProofError::InvalidInput);
        }

        let a = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let cap_b = a.modpow(pk.modulus(), pk.modulus_squared());

        let transcript = Self::transcript(pk, cap_a, &cap_b, aux);
        let (salt, e) = bounded_challenge(rng, &transcript, &params.q)?;

        let z = modulo(&(a * rho.modpow(&e, pk.modulus())), pk.modulus());

        Ok(Self { cap_b, z, salt })
    }

    fn transcript(
        pk: &PublicKey,
        cap_a: &BigNumber,
        cap_b: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(pk)
            .chain(cap_a)
            .chain(cap_b)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        pk: &PublicKey,
        cap_a: &BigNumber,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let n = pk.modulus();
        let n_squared = pk.modulus_squared();

        if cap_a.gcd(n) != BigNumber::one() || self.z.gcd(n) != BigNumber::one() {
            return Err(ProofError::VerifyFailure);
        }

        let transcript = Self::transcript(pk, cap_a, &self.cap_b, aux);
        let e = transcript
            .challenge_bounded(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        // z^N == B * A^e mod N^2
        let lhs = self.z.modpow(n, n_squared);
        let rhs = modulo(&(&self.cap_b * cap_a.modpow(&e, n_squared)), n_squared);
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
    use super::NthRootProof;
    use crate::paillier::SecretKey;
    use crate::tools::bignum::sample_unit;

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let aux: &[u8] = b"abcde";

        let rho = sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let cap_a = rho.modpow(pk.modulus(), pk.modulus_squared());

        let proof = NthRootProof::new(&mut OsRng, &params, &rho, pk, &cap_a, &aux).unwrap();
        assert!(proof.verify(&params, pk, &cap_a, &aux).is_ok());

        let mut tampered = proof.clone();
        tampered.z = tampered.z + BigNumber::one();
        assert!(tampered.verify(&params, pk, &cap_a, &aux).is_err());

        let bad_a = &cap_a + BigNumber::one();
        assert!(proof.verify(&params, pk, &bad_a, &aux).is_err());
    }
}
