//! Paillier encryption range: the plaintext of a ciphertext is in
//! `±2^(L+eps)` while the prover's committed value is in `±2^L`.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{signed_challenge, ProofError, ProofParams};
use crate::paillier::{Ciphertext, PublicKey};
use crate::pedersen::PedersenParams;
use crate::tools::bignum::{
    in_signed_range, modpow_signed, modulo, sample_signed, sample_signed_scaled, sample_unit,
};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_enc";

/**
ZK proof: Paillier encryption in range.

Secret inputs:
- `k` in `±2^L`,
- `rho`, the Paillier randomizer of `K` under `N0`.

Public inputs:
- the prover's Paillier public key `N0`,
- the ciphertext `K = enc(k, rho)`,
- the verifier's ring-Pedersen parameters (`N-hat`, `s`, `t`).
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncProof {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_s: BigNumber,
    cap_a: Ciphertext,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    cap_c: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z1: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    z2: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    z3: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl EncProof {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        k: &BigNumber,
        rho: &BigNumber,
        pk: &PublicKey,
        cap_k: &Ciphertext,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if !in_signed_range(k, params.l) {
            return Err(ProofError::InvalidInput);
        }

        let n_hat = setup.modulus();

        let alpha = sample_signed(rng, params.l + params.eps);
        let mu = sample_signed_scaled(rng, params.l, n_hat);
        let r = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let gamma = sample_signed_scaled(rng, params.l + params.eps, n_hat);

        let cap_s = setup.commit(k, &mu);
        let cap_a = pk
            .encrypt_with(&alpha, &r)
            .map_err(|_| ProofError::InvalidInput)?;
        let cap_c = setup.commit(&alpha, &gamma);

        let transcript = Self::transcript(pk, cap_k, setup, &cap_s, &cap_a, &cap_c, aux);
        let (salt, e) = signed_challenge(rng, &transcript, &params.q)?;

        let z1 = alpha + &e * k;
        let z2 = modulo(
            &(r * modpow_signed(rho, &e, pk.modulus()).ok_or(ProofError::InvalidInput)?),
            pk.modulus(),
        );
        let z3 = gamma + &e * mu;

        Ok(Self {
            cap_s,
            cap_a,
            cap_c,
            z1,
            z2,
            z3,
            salt,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transcript(
        pk: &PublicKey,
        cap_k: &Ciphertext,
        setup: &PedersenParams,
        cap_s: &BigNumber,
        cap_a: &Ciphertext,
        cap_c: &BigNumber,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(pk)
            .chain(cap_k)
            .chain(setup)
            .chain(cap_s)
            .chain(cap_a)
            .chain(cap_c)
    }

    pub fn verify(
        &self,
        params: &ProofParams,
        pk: &PublicKey,
        cap_k: &Ciphertext,
        setup: &PedersenParams,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        cap_k.validate(pk).map_err(|_| ProofError::VerifyFailure)?;
        self.cap_a
            .validate(pk)
            .map_err(|_| ProofError::VerifyFailure)?;

        let transcript =
            Self::transcript(pk, cap_k, setup, &self.cap_s, &self.cap_a, &self.cap_c, aux);
        let e = transcript
            .challenge_signed(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        // Range check
        if !in_signed_range(&self.z1, params.l + params.eps) {
            return Err(ProofError::VerifyFailure);
        }

        // enc(z1, z2) == A * K^e mod N0^2
        let lhs = pk
            .encrypt_with(&self.z1, &self.z2)
            .map_err(|_| ProofError::VerifyFailure)?;
        let rhs = pk.combine(
            &self.cap_a,
            &pk.scale(cap_k, &e).ok_or(ProofError::VerifyFailure)?,
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // s^z1 t^z3 == C * S^e mod N-hat
        let lhs = setup.commit(&self.z1, &self.z3);
        let cap_s_e =
            modpow_signed(&self.cap_s, &e, setup.modulus()).ok_or(ProofError::VerifyFailure)?;
        let rhs = modulo(&(&self.cap_c * cap_s_e), setup.modulus());
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
    use super::EncProof;
    use crate::paillier::SecretKey;
    use crate::pedersen::PedersenParams;
    use crate::tools::bignum::sample_signed;

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let setup_sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (setup, _) = PedersenParams::generate(&mut OsRng, &setup_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let k = sample_signed(&mut OsRng, params.l);
        let rho = crate::tools::bignum::sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let cap_k = pk.encrypt_with(&k, &rho).unwrap();

        let proof =
            EncProof::new(&mut OsRng, &params, &k, &rho, pk, &cap_k, &setup, &aux).unwrap();
        assert!(proof.verify(&params, pk, &cap_k, &setup, &aux).is_ok());
    }

    #[test]
    fn out_of_range_witness_is_rejected() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let setup_sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (setup, _) = PedersenParams::generate(&mut OsRng, &setup_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let k = crate::tools::bignum::pow2(params.l + 1);
        let rho = crate::tools::bignum::sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let cap_k = pk.encrypt_with(&k, &rho).unwrap();

        assert!(EncProof::new(&mut OsRng, &params, &k, &rho, pk, &cap_k, &setup, &aux).is_err());
    }

    #[test]
    fn tampering_fails() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let setup_sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (setup, _) = PedersenParams::generate(&mut OsRng, &setup_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let k = sample_signed(&mut OsRng, params.l);
        let rho = crate::tools::bignum::sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let cap_k = pk.encrypt_with(&k, &rho).unwrap();

        let proof =
            EncProof::new(&mut OsRng, &params, &k, &rho, pk, &cap_k, &setup, &aux).unwrap();

        let mut tampered = proof.clone();
        tampered.z1 = tampered.z1 + unknown_order::BigNumber::one();
        assert!(tampered.verify(&params, pk, &cap_k, &setup, &aux).is_err());

        let mut tampered = proof.clone();
        tampered.cap_s = tampered.cap_s + unknown_order::BigNumber::one();
        assert!(tampered.verify(&params, pk, &cap_k, &setup, &aux).is_err());

        // Binding to a different ciphertext fails.
        let other = pk.encrypt(&mut OsRng, &unknown_order::BigNumber::from(5u64)).unwrap();
        assert!(proof.verify(&params, pk, &other, &setup, &aux).is_err());
    }
}
