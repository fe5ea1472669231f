use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use super::{PaillierError, PublicKey};
use crate::tools::hashing::{Chain, Hashable};

/// A Paillier ciphertext: an element of `Z^*_{N^2}`.
///
/// The raw residue is kept opaque; all operations on it go through the
/// [`PublicKey`] (or the secret key for decryption) so that the range and
/// coprimality checks are never skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(#[serde(with = "crate::tools::bignum::serde_unsigned")] BigNumber);

impl Ciphertext {
    pub(crate) fn new_unchecked(value: BigNumber) -> Self {
        Self(value)
    }

    pub(crate) fn as_inner(&self) -> &BigNumber {
        &self.0
    }

    /// Range and coprimality checks against the given key.
    pub(crate) fn validate(&self, pk: &PublicKey) -> Result<(), PaillierError> {
        if self.0 < BigNumber::one() || &self.0 >= pk.modulus_squared() {
            return Err(PaillierError::NotInRange);
        }
        if self.0.gcd(pk.modulus()) != BigNumber::one() {
            return Err(PaillierError::InvalidMessage);
        }
        Ok(())
    }
}

impl Hashable for Ciphertext {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;
    use unknown_order::BigNumber;

    use super::super::{PaillierError, SecretKey};
    use super::Ciphertext;

    #[test]
    fn validation_rejects_out_of_range() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let zero = Ciphertext::new_unchecked(BigNumber::zero());
        assert_eq!(zero.validate(pk), Err(PaillierError::NotInRange));

        let too_large = Ciphertext::new_unchecked(pk.modulus_squared().clone());
        assert_eq!(too_large.validate(pk), Err(PaillierError::NotInRange));

        assert_eq!(sk.decrypt(&zero), Err(PaillierError::NotInRange));
    }

    #[test]
    fn validation_rejects_non_units() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let (p, _) = sk.primes();
        let shared_factor = Ciphertext::new_unchecked(p.clone());
        assert_eq!(
            shared_factor.validate(pk),
            Err(PaillierError::InvalidMessage)
        );
    }
}
