//! Well-formedness of ring-Pedersen parameters: existence of `lambda` with
//! `s = t^lambda mod N-hat` (cut-and-choose over challenge bits).

use alloc::boxed::Box;
use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{ProofError, MIN_CHALLENGES};
use crate::pedersen::{PedersenParams, PedersenWitness};
use crate::tools::bignum::modulo;
use crate::tools::hashing::{random_salt, Chain, Hashable, Transcript};

const HASH_TAG: &[u8] = b"P_prm";

/**
ZK proof: ring-Pedersen parameters are well-formed.

Secret inputs:
- `lambda` with `s = t^lambda mod N-hat`, and `phi(N-hat)`.

Public inputs:
- the parameters `(N-hat, s, t)`.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingPedersenProof {
    commitments: Vec<Commitment>,
    responses: Vec<Response>,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    salt: Box<[u8]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Commitment(#[serde(with = "crate::tools::bignum::serde_unsigned")] BigNumber);

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Response(#[serde(with = "crate::tools::bignum::serde_unsigned")] BigNumber);

impl RingPedersenProof {
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &PedersenParams,
        witness: &PedersenWitness,
        challenges: usize,
        aux: &impl Hashable,
    ) -> Result<Self, ProofError> {
        if challenges < MIN_CHALLENGES {
            return Err(ProofError::TooFewChallenge);
        }

        let n_hat = params.modulus();
        let phi = witness.phi();

        let secrets = (0..challenges)
            .map(|_| crate::tools::bignum::sample_below(rng, phi))
            .collect::<Vec<_>>();
        let commitments = secrets
            .iter()
            .map(|a| Commitment(params.base_t().modpow(a, n_hat)))
            .collect::<Vec<_>>();

        let transcript = Self::transcript(params, &commitments, aux);
        let salt = random_salt(rng);
        let bits = transcript.challenge_bits(&salt, challenges);

        let responses = secrets
            .into_iter()
            .zip(bits.iter())
            .map(|(a, bit)| {
                let z = if *bit {
                    modulo(&(a + witness.lambda()), phi)
                } else {
                    a
                };
                Response(z)
            })
            .collect();

        Ok(Self {
            commitments,
            responses,
            salt,
        })
    }

    fn transcript(
        params: &PedersenParams,
        commitments: &[Commitment],
        aux: &impl Hashable,
    ) -> Transcript {
        let mut transcript = Transcript::new_with_dst(HASH_TAG).chain(aux).chain(params);
        for commitment in commitments {
            transcript = transcript.chain(&commitment.0);
        }
        transcript
    }

    pub fn verify(&self, params: &PedersenParams, aux: &impl Hashable) -> Result<(), ProofError> {
        if self.commitments.len() < MIN_CHALLENGES
            || self.commitments.len() != self.responses.len()
        {
            return Err(ProofError::TooFewChallenge);
        }
        params.validate().map_err(|_| ProofError::VerifyFailure)?;

        let n_hat = params.modulus();
        let transcript = Self::transcript(params, &self.commitments, aux);
        let bits = transcript.challenge_bits(&self.salt, self.commitments.len());

        for ((commitment, response), bit) in self
            .commitments
            .iter()
            .zip(self.responses.iter())
            .zip(bits.iter())
        {
            if commitment.0.gcd(n_hat) != BigNumber::one() {
                return Err(ProofError::VerifyFailure);
            }
            // t^z == A * s^e mod N-hat
            let lhs = params.base_t().modpow(&response.0, n_hat);
            let rhs = if *bit {
                modulo(&(&commitment.0 * params.base_s()), n_hat)
            } else {
                commitment.0.clone()
            };
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

    use super::super::{ProofError, MIN_CHALLENGES};
    use super::RingPedersenProof;
    use crate::paillier::SecretKey;
    use crate::pedersen::PedersenParams;

    #[test]
    fn prove_and_verify() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (params, witness) = PedersenParams::generate(&mut OsRng, &sk).unwrap();

        let aux: &[u8] = b"abcde";

        let proof =
            RingPedersenProof::new(&mut OsRng, &params, &witness, MIN_CHALLENGES, &aux).unwrap();
        assert!(proof.verify(&params, &aux).is_ok());
    }

    #[test]
    fn too_few_challenges() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (params, witness) = PedersenParams::generate(&mut OsRng, &sk).unwrap();

        assert_eq!(
            RingPedersenProof::new(&mut OsRng, &params, &witness, MIN_CHALLENGES - 1, &aux())
                .err(),
            Some(ProofError::TooFewChallenge)
        );
    }

    fn aux() -> &'static [u8] {
        b"abcde"
    }

    #[test]
    fn tampering_any_element_fails() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let (params, witness) = PedersenParams::generate(&mut OsRng, &sk).unwrap();

        let aux: &[u8] = b"abcde";
        let proof =
            RingPedersenProof::new(&mut OsRng, &params, &witness, MIN_CHALLENGES, &aux).unwrap();

        let mut tampered = proof.clone();
        tampered.commitments[3].0 = &tampered.commitments[3].0 + unknown_order::BigNumber::one();
        assert_eq!(
            tampered.verify(&params, &aux).err(),
            Some(ProofError::VerifyFailure)
        );

        let mut tampered = proof.clone();
        tampered.responses[7].0 = &tampered.responses[7].0 + unknown_order::BigNumber::one();
        assert_eq!(
            tampered.verify(&params, &aux).err(),
            Some(ProofError::VerifyFailure)
        );
    }
}
