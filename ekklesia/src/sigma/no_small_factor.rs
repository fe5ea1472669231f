//! No small factor: both prime factors of `N0` exceed `2^L`.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{signed_challenge, ProofError, ProofParams};
use crate::paillier::SecretKey;
use crate::pedersen::PedersenParams;
use crate::tools::bignum::{
    in_signed_range, modpow_signed, modulo, sample_signed, sample_signed_scaled,
};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_fac-small";

/**
ZK proof: no small factor.

Secret inputs:
- the factors `p`, `q` of `N0`.

Public inputs:
- the modulus `N0`,
- the verifier's ring-Pedersen parameters (`N-hat`, `s`, `t`).
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoSmallFactorProof {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_p: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_q: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_a: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_b: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_t: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    sigma: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    w1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    w2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    v: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

/// The factors are `sqrt(N0)`-sized; responses get the matching slack.
fn root_bits(n0: &BigNumber) -> usize {
    n0.bit_length() / 2 + 1
}

impl NoSmallFactorProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        sk: &SecretKey,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        let (p, q) = sk.primes();
        let n0 = sk.public_key().modulus();
        let n_hat = setup.modulus();
        let half = root_bits(n0);

        let alpha = sample_signed(rng, params.l + params.eps + half);
        let beta = sample_signed(rng, params.l + params.eps + half);
        let mu = sample_signed_scaled(rng, params.l, n_hat);
        let nu = sample_signed_scaled(rng, params.l, n_hat);
        let sigma = sample_signed_scaled(rng, params.l, &(n0 * n_hat));
        let r = sample_signed_scaled(rng, params.l + params.eps, &(n0 * n_hat));
        let x = sample_signed_scaled(rng, params.l + params.eps, n_hat);
        let y = sample_signed_scaled(rng, params.l + params.eps, n_hat);

        let cap_p = setup.commit(p, &mu);
        let cap_q = setup.commit(q, &nu);
        let cap_a = setup.commit(&alpha, &x);
        let cap_b = setup.commit(&beta, &y);
        // T = Q^alpha t^r
        let cap_t = modulo(
            &(modpow_signed(&cap_q, &alpha, n_hat).ok_or(ProofError::InvalidInput)?
                * modpow_signed(setup.base_t(), &r, n_hat).ok_or(ProofError::InvalidInput)?),
            n_hat,
        );

        let transcript = Self::transcript(
            n0, setup, &cap_p, &cap_q, &cap_a, &cap_b, &cap_t, &sigma, aux,
        );
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        // sigma-hat folds the p-commitment randomness into the T equation.
        let sigma_hat = &sigma - &nu * p;

        let z1 = alpha + &e * p;
        let z2 = beta + &e * q;
        let w1 = x + &e * mu;
        let w2 = y + &e * nu;
        let v = r + &e * sigma_hat;

        Ok(Self {
            cap_p,
            cap_q,
            cap_a,
            cap_b,
            cap_t,
            sigma,
            z1,
            z2,
            w1,
            w2,
            v,
            salt,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transcript(
        n0: &BigNumber,
        setup: &PedersenParams,
        cap_p: &BigNumber,
        cap_q: &BigNumber,
        cap_a: &BigNumber,
        cap_b: &BigNumber,
        cap_t: &BigNumber,
        sigma: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(n0)
            .chain(setup)
            .chain(cap_p)
            .chain(cap_q)
            .chain(cap_a)
            .chain(cap_b)
            .chain(cap_t)
            .chain(sigma)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        n0: &BigNumber,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        let n_hat = setup.modulus();
        let half = root_bits(n0);

        let transcript = Self::transcript(
            n0, setup, &self.cap_p, &self.cap_q, &self.cap_a, &self.cap_b, &self.cap_t,
            &self.sigma, aux,
        );
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        // Range checks: the responses stay sqrt(N0)-sized, which forces both
        // factors above 2^L.
        if !in_signed_range(&self.z1, params.l + params.eps + half)
            || !in_signed_range(&self.z2, params.l + params.eps + half)
        {
            return Err(ProofError::VerifyFailure);
        }

        // s^z1 t^w1 == A * P^e mod N-hat
        let lhs = setup.commit(&self.z1, &self.w1);
        let rhs = modulo(
            &(&self.cap_a
                * modpow_signed(&self.cap_p, &e, n_hat).ok_or(ProofError::VerifyFailure)?),
            n_hat,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // s^z2 t^w2 == B * Q^e mod N-hat
        let lhs = setup.commit(&self.z2, &self.w2);
        let rhs = modulo(
            &(&self.cap_b
                * modpow_signed(&self.cap_q, &e, n_hat).ok_or(ProofError::VerifyFailure)?),
            n_hat,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // Q^z1 t^v == T * R^e mod N-hat, with R = s^N0 t^sigma
        let lhs = modulo(
            &(modpow_signed(&self.cap_q, &self.z1, n_hat).ok_or(ProofError::VerifyFailure)?
                * modpow_signed(setup.base_t(), &self.v, n_hat)
                    .ok_or(ProofError::VerifyFailure)?),
            n_hat,
        );
        let cap_r = setup.commit(n0, &self.sigma);
        let rhs = modulo(
            &(&self.cap_t * modpow_signed(&cap_r, &e, n_hat).ok_or(ProofError::VerifyFailure)?),
            n_hat,
        );
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
    use super::NoSmallFactorProof;
    use crate::paillier::SecretKey;
    use crate::pedersen::PedersenParams;

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();

        let setup_sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (setup, _) = PedersenParams::generate(&mut OsRng, &setup_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let proof =
            NoSmallFactorProof::new(&mut OsRng, &params, &sk, &setup, &aux).unwrap();
        assert!(proof
            .verify(&params, sk.public_key().modulus(), &setup, &aux)
            .is_ok());

        let mut tampered = proof.clone();
        tampered.v = tampered.v + unknown_order::BigNumber::one();
        assert!(tampered
            .verify(&params, sk.public_key().modulus(), &setup, &aux)
            .is_err());
    }
}
