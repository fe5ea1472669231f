//! BLAKE2b-256 transcript hashing.
//!
//! Every digest in the library goes through this module: session binding
//! (`ssid || bk`), message hashes for echo broadcast, and the Fiat-Shamir
//! transcripts of the sigma protocols. Challenges are derived from a
//! transcript plus a random salt; the salt travels with the proof so the
//! verifier can recompute the same challenge.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use blake2::{Blake2b, Digest};
use digest::consts::U32;
use rand_core::CryptoRngCore;
use unknown_order::BigNumber;

pub(crate) type Blake2b256 = Blake2b<U32>;

/// The size of the salt included in every proof message.
pub(crate) const SALT_SIZE: usize = 128;

/// A digest object that takes byte slices or decomposable ([`Hashable`]) objects.
pub trait Chain: Sized {
    /// Hash raw bytes.
    ///
    /// Note: only for impls in specific types, do not use directly.
    fn chain_raw_bytes(self, bytes: &[u8]) -> Self;

    /// Hash raw bytes in a collision-resistant way.
    fn chain_bytes(self, bytes: &(impl AsRef<[u8]> + ?Sized)) -> Self {
        // Hash the length too to prevent hash conflicts. (e.g. H(AB|CD) == H(ABC|D)).
        // Not strictly necessary for fixed-size arrays, but it's easier to just always do it.
        let len = (bytes.as_ref().len() as u64).to_be_bytes();
        self.chain_raw_bytes(&len).chain_raw_bytes(bytes.as_ref())
    }

    fn chain<T: Hashable>(self, hashable: &T) -> Self {
        hashable.chain(self)
    }
}

/// A trait allowing complex objects to give access to their contents for hashing purposes
/// without the need of a conversion to a new form (e.g. serialization).
pub trait Hashable {
    fn chain<C: Chain>(&self, digest: C) -> C;
}

/// Wraps the fixed hash for easier replacement, and standardizes the use of DST.
#[derive(Clone)]
pub struct Transcript(Blake2b256);

impl Chain for Transcript {
    fn chain_raw_bytes(self, bytes: &[u8]) -> Self {
        let mut digest = self.0;
        digest.update(bytes);
        Self(digest)
    }
}

impl Transcript {
    fn new() -> Self {
        Self(Blake2b256::new())
    }

    pub fn new_with_dst(dst: &[u8]) -> Self {
        Self::new().chain_bytes(dst)
    }

    pub fn finalize(self) -> [u8; 32] {
        self.0.finalize().into()
    }

    /// One block of the salted challenge stream:
    /// `H(transcript || salt || label || counter)`.
    fn block(&self, salt: &[u8], label: &[u8], counter: u64) -> [u8; 32] {
        self.clone()
            .chain_bytes(salt)
            .chain_bytes(label)
            .chain_raw_bytes(&counter.to_be_bytes())
            .finalize()
    }

    /// A deterministic byte stream of the given length, bound to the
    /// transcript, the salt and the label.
    fn byte_stream(&self, salt: &[u8], label: &[u8], length: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(length.div_ceil(32) * 32);
        let mut counter = 0u64;
        while bytes.len() < length {
            bytes.extend_from_slice(&self.block(salt, label, counter));
            counter += 1;
        }
        bytes.truncate(length);
        bytes
    }

    /// Derives a challenge in `[-q, q]`, or `None` when this salt's sample
    /// falls outside the range (the prover then retries with a fresh salt,
    /// the verifier reports a failure).
    pub(crate) fn challenge_signed(&self, salt: &[u8], q: &BigNumber) -> Option<BigNumber> {
        // Uniform in [0, 2^(bits+1)) where bits is the size of q,
        // accepted when <= 2q; the acceptance probability is very close to 1
        // for a curve order just under a power of two.
        let bits = q.bit_length();
        let bytes = self.byte_stream(salt, b"challenge", (bits + 1).div_ceil(8) + 8);
        let bound = crate::tools::bignum::pow2(bits + 1);
        let sample = BigNumber::from_slice(&bytes) % bound;
        let double_q = q + q;
        if sample > double_q {
            return None;
        }
        Some(sample - q)
    }

    /// Derives a challenge in `[0, q)`, or `None` when this salt's sample
    /// falls outside the range.
    pub(crate) fn challenge_bounded(&self, salt: &[u8], q: &BigNumber) -> Option<BigNumber> {
        let bits = q.bit_length();
        let bytes = self.byte_stream(salt, b"challenge", bits.div_ceil(8));
        let sample = BigNumber::from_slice(&bytes);
        if &sample >= q {
            return None;
        }
        Some(sample)
    }

    /// Derives `count` challenge bits for cut-and-choose protocols.
    pub(crate) fn challenge_bits(&self, salt: &[u8], count: usize) -> Vec<bool> {
        let bytes = self.byte_stream(salt, b"bits", count.div_ceil(8));
        (0..count)
            .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
            .collect()
    }

    /// Derives the `index`-th challenge element of `Z^*_n`.
    ///
    /// The modulo bias is negligible (the sample is 64 bits wider than `n`),
    /// and non-units are skipped deterministically, so prover and verifier
    /// always agree on the value.
    pub(crate) fn challenge_unit(&self, salt: &[u8], index: u64, n: &BigNumber) -> BigNumber {
        let length = n.bit_length().div_ceil(8) + 8;
        let mut attempt = 0u64;
        loop {
            let label_bytes = [b"unit".as_slice(), &index.to_be_bytes(), &attempt.to_be_bytes()]
                .concat();
            let bytes = self.byte_stream(salt, &label_bytes, length);
            let candidate = BigNumber::from_slice(&bytes) % n;
            if candidate != BigNumber::zero() && candidate.gcd(n) == BigNumber::one() {
                return candidate;
            }
            attempt += 1;
        }
    }
}

pub(crate) fn random_salt(rng: &mut impl CryptoRngCore) -> Box<[u8]> {
    let mut salt = vec![0u8; SALT_SIZE];
    rng.fill_bytes(&mut salt);
    salt.into_boxed_slice()
}

impl Hashable for u8 {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_raw_bytes(&[*self])
    }
}

impl Hashable for u32 {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_raw_bytes(&self.to_be_bytes())
    }
}

impl Hashable for u64 {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_raw_bytes(&self.to_be_bytes())
    }
}

impl Hashable for usize {
    fn chain<C: Chain>(&self, digest: C) -> C {
        (*self as u64).chain(digest)
    }
}

impl Hashable for [u8] {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self)
    }
}

impl<const N: usize> Hashable for [u8; N] {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self)
    }
}

impl Hashable for Vec<u8> {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self)
    }
}

impl Hashable for Box<[u8]> {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self)
    }
}

impl Hashable for str {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self.as_bytes())
    }
}

impl Hashable for alloc::string::String {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self.as_bytes())
    }
}

impl<T: Hashable + ?Sized> Hashable for &T {
    fn chain<C: Chain>(&self, digest: C) -> C {
        (*self).chain(digest)
    }
}

impl<T1: Hashable, T2: Hashable> Hashable for (T1, T2) {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.0).chain(&self.1)
    }
}

impl<T1: Hashable, T2: Hashable, T3: Hashable> Hashable for (T1, T2, T3) {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.0).chain(&self.1).chain(&self.2)
    }
}

/// Big integers hash as an explicit sign byte plus the length-prefixed magnitude.
impl Hashable for BigNumber {
    fn chain<C: Chain>(&self, digest: C) -> C {
        let negative = self < &BigNumber::zero();
        let magnitude = if negative {
            (BigNumber::zero() - self).to_bytes()
        } else {
            self.to_bytes()
        };
        digest
            .chain_raw_bytes(&[u8::from(negative)])
            .chain_bytes(&magnitude)
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;
    use unknown_order::BigNumber;

    use super::{random_salt, Chain, Transcript};
    use crate::curve;

    #[test]
    fn chaining_is_length_prefixed() {
        let h1 = Transcript::new_with_dst(b"test")
            .chain_bytes(b"ab")
            .chain_bytes(b"cd")
            .finalize();
        let h2 = Transcript::new_with_dst(b"test")
            .chain_bytes(b"abc")
            .chain_bytes(b"d")
            .finalize();
        assert_ne!(h1, h2);
    }

    #[test]
    fn signed_challenge_stays_in_range() {
        let q = curve::curve_order();
        let transcript = Transcript::new_with_dst(b"test").chain_bytes(b"statement");
        let salt = random_salt(&mut OsRng);
        let e = transcript.challenge_signed(&salt, &q).unwrap();
        let neg_q = BigNumber::zero() - &q;
        assert!(e >= neg_q && e <= q);

        // Deterministic for the same salt.
        assert_eq!(transcript.challenge_signed(&salt, &q).unwrap(), e);
    }

    #[test]
    fn challenge_units_are_invertible() {
        let n = BigNumber::from(3u64 * 5 * 7 * 11);
        let transcript = Transcript::new_with_dst(b"test");
        let salt = random_salt(&mut OsRng);
        for i in 0..10 {
            let unit = transcript.challenge_unit(&salt, i, &n);
            assert_eq!(unit.gcd(&n), BigNumber::one());
        }
    }
}
