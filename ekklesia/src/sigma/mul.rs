//! Paillier multiplication: for `X = enc(x, rho_x)`, `Y` and
//! `C = Y^x * rho^N`, the ciphertext `C` is `Y` scaled by the plaintext of
//! `X`.

use alloc::boxed::Box;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{bounded_challenge, ProofError, ProofParams};
use crate::paillier::{Ciphertext, PublicKey};
use crate::tools::bignum::{modulo, sample_unit};
use crate::tools::hashing::{Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_mul";

/**
ZK proof: Paillier multiplication.

Secret inputs:
- `x`, the plaintext of `X`,
- `rho`, the randomizer layer of `C = Y^x * rho^N`,
- `rho_x`, the randomizer of `X`.

Public inputs:
- the prover's Paillier public key `N`,
- the ciphertexts `X`, `Y` and `C`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MulProof {
    cap_a: Ciphertext,
    cap_b: Ciphertext,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    z: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    u: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    v: BigNumber,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

impl MulProof {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        x: &BigNumber,
        rho: &BigNumber,
        rho_x: &BigNumber,
        pk: &PublicKey,
        cap_x: &Ciphertext,
        cap_y: &Ciphertext,
        cap_c: &Ciphertext,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if x < &BigNumber::zero() || x >= pk.modulus() {
            return Err(ProofError::InvalidInput);
        }

        let alpha = crate::tools::bignum::sample_below(rng, pk.modulus());
        let r = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;
        let s = sample_unit(rng, pk.modulus()).ok_or(ProofError::ExceededMaxRetry)?;

        // A = Y^alpha r^N, B = enc(alpha, s)
        let r_n = r.modpow(pk.modulus(), pk.modulus_squared());
        let cap_a = Ciphertext::new_unchecked(modulo(
            &(pk.scale(cap_y, &alpha)
                .ok_or(ProofError::InvalidInput)?
                .as_inner()
                * r_n),
            pk.modulus_squared(),
        ));
        let cap_b = pk
            .encrypt_with(&alpha, &s)
            .map_err(|_| ProofError::InvalidInput)?;

        let transcript = Self::transcript(pk, cap_x, cap_y, cap_c, &cap_a, &cap_b, aux);
        let (salt, e) = bounded_challenge(rng, &transcript, &params.q)?;

        let z = alpha + &e * x;
        let u = modulo(&(r * rho.modpow(&e, pk.modulus())), pk.modulus());
        let v = modulo(&(s * rho_x.modpow(&e, pk.modulus())), pk.modulus());

        Ok(Self {
            cap_a,
            cap_b,
            z,
            u,
            v,
            salt,
        })
    }

    fn transcript(
        pk: &PublicKey,
        cap_x: &Ciphertext,
        cap_y: &Ciphertext,
        cap_c: &Ciphertext,
        cap_a: &Ciphertext,
        cap_b: &Ciphertext,
        aux: &impl Hashable,
    ) -> Transcript {
        Transcript::new_with_dst(HASH_TAG)
            .chain(aux)
            .chain(pk)
            .chain(cap_x)
            .chain(cap_y)
            .chain(cap_c)
            .chain(cap_a)
            .chain(cap_b)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &self,
        params: &ProofParams,
        pk: &PublicKey,
        cap_x: &Ciphertext,
        cap_y: &Ciphertext,
        cap_c: &Ciphertext,
        aux: &impl Hashable,
    ) -> Result<(), ProofError> {
        for ciphertext in [cap_x, cap_y, cap_c, &self.cap_a, &self.cap_b] {
            ciphertext
                .validate(pk)
                .map_err(|_| ProofError::VerifyFailure)?;
        }

        let transcript = Self::transcript(pk, cap_x, cap_y, cap_c, &self.cap_a, &self.cap_b, aux);
        let e = transcript
            .challenge_bounded(&self.salt, &params.q)
            .ok_or(ProofError::VerifyFailure)?;

        // Y^z u^N == A * C^e mod N^2
        let u_n = self.u.modpow(pk.modulus(), pk.modulus_squared());
        let lhs = modulo(
            &(pk.scale(cap_y, &self.z)
                .ok_or(ProofError::VerifyFailure)?
                .as_inner()
                * u_n),
            pk.modulus_squared(),
        );
        let rhs = modulo(
            &(self.cap_a.as_inner()
                * pk.scale(cap_c, &e)
                    .ok_or(ProofError::VerifyFailure)?
                    .as_inner()),
            pk.modulus_squared(),
        );
        if lhs != rhs {
            return Err(ProofError::VerifyFailure);
        }

        // enc(z, v) == B * X^e mod N^2
        let lhs = pk
            .encrypt_with(&self.z, &self.v)
            .map_err(|_| ProofError::VerifyFailure)?;
        let rhs = pk.combine(
            &self.cap_b,
            &pk.scale(cap_x, &e).ok_or(ProofError::VerifyFailure)?,
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
    use unknown_order::BigNumber;

    use super::super::ProofParams;
    use super::MulProof;
    use crate::paillier::SecretKey;
    use crate::tools::bignum::{modulo, sample_unit};

    #[test]
    fn prove_and_verify() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let aux: &[u8] = b"abcde";

        let x = crate::tools::bignum::sample_below(&mut OsRng, pk.modulus());
        let rho_x = sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let cap_x = pk.encrypt_with(&x, &rho_x).unwrap();

        let cap_y = pk.encrypt(&mut OsRng, &BigNumber::from(999u64)).unwrap();

        let rho = sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let rho_n = rho.modpow(pk.modulus(), pk.modulus_squared());
        let cap_c = crate::paillier::Ciphertext::new_unchecked(modulo(
            &(pk.scale(&cap_y, &x).unwrap().as_inner() * rho_n),
            pk.modulus_squared(),
        ));

        let proof = MulProof::new(
            &mut OsRng, &params, &x, &rho, &rho_x, pk, &cap_x, &cap_y, &cap_c, &aux,
        )
        .unwrap();
        assert!(proof
            .verify(&params, pk, &cap_x, &cap_y, &cap_c, &aux)
            .is_ok());

        let mut tampered = proof.clone();
        tampered.z = tampered.z + BigNumber::one();
        assert!(tampered
            .verify(&params, pk, &cap_x, &cap_y, &cap_c, &aux)
            .is_err());
    }
}
