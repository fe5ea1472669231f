//! The Paillier additively-homomorphic cryptosystem.
//!
//! Two key flavors are exposed: [`SecretKey::generate`] picks arbitrary
//! primes and a random generator, [`SecretKey::generate_safe_primes`] picks
//! safe primes and fixes the generator to `1 + N`, which admits a
//! closed-form encryption and is what the proofs in [`crate::sigma`]
//! expect of signing participants.

mod ciphertext;
mod keys;
mod wire;

pub use ciphertext::Ciphertext;
pub use keys::{sample_safe_prime, PublicKey, SecretKey};
pub use wire::PublicKeyMessage;

/// The minimum accepted bit size of a Paillier modulus.
pub const MIN_MODULUS_BITS: usize = 2048;

#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaillierError {
    /// the requested public key size is too small
    SmallPublicKeySize,
    /// the requested safe prime size is too small
    SmallSafePrime,
    /// the value is outside the range accepted by this key
    NotInRange,
    /// the message or ciphertext is invalid for this key
    InvalidMessage,
    /// exhausted the retry budget for probabilistic sampling
    ExceededMaxRetry,
    /// the imported modulus has a small prime factor
    SmallFactorPubKey,
    /// the proof attached to the imported key failed to verify
    InvalidProof,
}
