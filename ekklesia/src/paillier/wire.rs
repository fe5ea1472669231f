use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::keys::has_small_factor;
use super::{PaillierError, PublicKey, SecretKey};
use crate::sigma::fac::FacProof;
use crate::sigma::ProofParams;

/// A Paillier public key in transit: the factorization proof (which carries
/// the modulus) and the generator bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKeyMessage {
    proof: FacProof,
    #[serde(with = "crate::tools::serde_bytes::as_hex")]
    g: Vec<u8>,
}

impl PublicKeyMessage {
    /// Exports the public half of a key, proving knowledge of the
    /// factorization of its modulus.
    pub fn new(
        rng: &mut impl CryptoRngCore,
        params: &ProofParams,
        sk: &SecretKey,
    ) -> Result<Self, PaillierError> {
        let proof = FacProof::new(rng, params, &b"".as_slice(), sk)
            .map_err(|_| PaillierError::InvalidProof)?;
        Ok(Self {
            proof,
            g: sk.public_key().generator().to_bytes(),
        })
    }

    /// Re-validates all key invariants and returns the imported key.
    pub fn import(&self, params: &ProofParams) -> Result<PublicKey, PaillierError> {
        let n = self.proof.modulus().clone();
        if n <= BigNumber::zero() {
            return Err(PaillierError::InvalidMessage);
        }
        if has_small_factor(&n) {
            return Err(PaillierError::SmallFactorPubKey);
        }

        self.proof
            .verify(params, &b"".as_slice())
            .map_err(|_| PaillierError::InvalidProof)?;

        let g = BigNumber::from_slice(&self.g);
        // Re-checks g in [2, N^2) and coprime to N^2.
        PublicKey::new(n, g)
    }

    #[cfg(test)]
    pub(crate) fn proof_mut(&mut self) -> &mut FacProof {
        &mut self.proof
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;
    use unknown_order::BigNumber;

    use super::super::{PaillierError, SecretKey};
    use super::PublicKeyMessage;
    use crate::sigma::ProofParams;

    #[test]
    fn export_import_roundtrip() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();

        let message = PublicKeyMessage::new(&mut OsRng, &params, &sk).unwrap();
        let imported = message.import(&params).unwrap();
        assert_eq!(&imported, sk.public_key());
    }

    #[test]
    fn import_rejects_small_factors() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();

        let mut message = PublicKeyMessage::new(&mut OsRng, &params, &sk).unwrap();

        // A modulus of the form 2 * 3 * prime trips the sieve.
        let p = BigNumber::prime_from_rng(512, &mut OsRng);
        message.proof_mut().set_modulus(BigNumber::from(6u64) * p);
        assert_eq!(
            message.import(&params).err(),
            Some(PaillierError::SmallFactorPubKey)
        );
    }

    #[test]
    fn import_rejects_broken_proof() {
        let params = ProofParams::secp256k1();
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let other = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();

        let mut message = PublicKeyMessage::new(&mut OsRng, &params, &sk).unwrap();

        // A different (small-factor-free) modulus invalidates the proof.
        message
            .proof_mut()
            .set_modulus(other.public_key().modulus().clone());
        assert_eq!(
            message.import(&params).err(),
            Some(PaillierError::InvalidProof)
        );
    }
}
