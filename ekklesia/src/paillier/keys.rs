use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;
use zeroize::Zeroize;

use super::{Ciphertext, PaillierError, MIN_MODULUS_BITS};
use crate::tools::bignum::{modpow_signed, modulo, sample_unit, MAX_RETRIES};
use crate::tools::hashing::{Chain, Hashable};

/// The minimum bit size of a single safe prime.
const MIN_SAFE_PRIME_BITS: usize = MIN_MODULUS_BITS / 2;

/// A Paillier public key: the modulus `N`, the generator `g` and the cached
/// `N^2`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PackedPublicKey", into = "PackedPublicKey")]
pub struct PublicKey {
    n: BigNumber,
    g: BigNumber,
    n_squared: BigNumber,
}

#[derive(Serialize, Deserialize)]
struct PackedPublicKey {
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    n: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    g: BigNumber,
}

impl From<PublicKey> for PackedPublicKey {
    fn from(pk: PublicKey) -> Self {
        Self { n: pk.n, g: pk.g }
    }
}

impl TryFrom<PackedPublicKey> for PublicKey {
    type Error = PaillierError;
    fn try_from(packed: PackedPublicKey) -> Result<Self, Self::Error> {
        PublicKey::new(packed.n, packed.g)
    }
}

impl PublicKey {
    pub(crate) fn new(n: BigNumber, g: BigNumber) -> Result<Self, PaillierError> {
        if n <= BigNumber::zero() {
            return Err(PaillierError::InvalidMessage);
        }
        let n_squared = &n * &n;
        if g < BigNumber::from(2u64) || g >= n_squared {
            return Err(PaillierError::NotInRange);
        }
        if g.gcd(&n_squared) != BigNumber::one() {
            return Err(PaillierError::InvalidMessage);
        }
        Ok(Self { n, g, n_squared })
    }

    /// Builds a public key with the specialized generator `g = 1 + N`.
    pub fn from_modulus(n: BigNumber) -> Result<Self, PaillierError> {
        let g = &n + BigNumber::one();
        Self::new(n, g)
    }

    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    pub fn generator(&self) -> &BigNumber {
        &self.g
    }

    pub(crate) fn modulus_squared(&self) -> &BigNumber {
        &self.n_squared
    }

    pub fn bits(&self) -> usize {
        self.n.bit_length()
    }

    fn uses_default_generator(&self) -> bool {
        self.g == &self.n + BigNumber::one()
    }

    /// The plaintext bound below which range proofs about messages mod `q`
    /// remain meaningful: `N - (q - 1)^2`.
    pub fn message_range(&self, q: &BigNumber) -> BigNumber {
        let q_minus_one = q - BigNumber::one();
        &self.n - &q_minus_one * &q_minus_one
    }

    /// Encrypts `0 <= m < N` with a fresh randomizer.
    pub fn encrypt(
        &self,
        rng: &mut impl CryptoRngCore,
        m: &BigNumber,
    ) -> Result<Ciphertext, PaillierError> {
        self.encrypt_returning_randomizer(rng, m)
            .map(|(ciphertext, _)| ciphertext)
    }

    /// Encrypts `0 <= m < N`, returning the randomizer for later proofs.
    pub fn encrypt_returning_randomizer(
        &self,
        rng: &mut impl CryptoRngCore,
        m: &BigNumber,
    ) -> Result<(Ciphertext, BigNumber), PaillierError> {
        if m < &BigNumber::zero() || m >= &self.n {
            return Err(PaillierError::InvalidMessage);
        }
        let r = sample_unit(rng, &self.n).ok_or(PaillierError::ExceededMaxRetry)?;
        let ciphertext = self.encrypt_with(m, &r)?;
        Ok((ciphertext, r))
    }

    /// Encrypts a (possibly negative) message with the given randomizer.
    ///
    /// Signed messages are what the sigma-protocol responses and the MTA
    /// masks are made of; they embed as `g^m` with a negative exponent.
    pub(crate) fn encrypt_with(
        &self,
        m: &BigNumber,
        r: &BigNumber,
    ) -> Result<Ciphertext, PaillierError> {
        let g_m = if self.uses_default_generator() {
            // (1 + N)^m = 1 + mN (mod N^2)
            modulo(&(BigNumber::one() + m * &self.n), &self.n_squared)
        } else {
            modpow_signed(&self.g, m, &self.n_squared).ok_or(PaillierError::InvalidMessage)?
        };
        let r_n = r.modpow(&self.n, &self.n_squared);
        Ok(Ciphertext::new_unchecked(modulo(
            &(g_m * r_n),
            &self.n_squared,
        )))
    }

    /// Homomorphic addition: `Dec(add(Enc(m1), Enc(m2))) = m1 + m2 mod N`.
    /// The result is re-randomized.
    pub fn add(
        &self,
        rng: &mut impl CryptoRngCore,
        c1: &Ciphertext,
        c2: &Ciphertext,
    ) -> Result<Ciphertext, PaillierError> {
        c1.validate(self)?;
        c2.validate(self)?;
        let r = sample_unit(rng, &self.n).ok_or(PaillierError::ExceededMaxRetry)?;
        let r_n = r.modpow(&self.n, &self.n_squared);
        let product = modulo(&(c1.as_inner() * c2.as_inner() * r_n), &self.n_squared);
        Ok(Ciphertext::new_unchecked(product))
    }

    /// Homomorphic scalar multiplication:
    /// `Dec(mul_const(Enc(m), a)) = m * a mod N`. The result is re-randomized.
    pub fn mul_const(
        &self,
        rng: &mut impl CryptoRngCore,
        c: &Ciphertext,
        a: &BigNumber,
    ) -> Result<Ciphertext, PaillierError> {
        c.validate(self)?;
        let exponent = modulo(a, &self.n);
        let r = sample_unit(rng, &self.n).ok_or(PaillierError::ExceededMaxRetry)?;
        let r_n = r.modpow(&self.n, &self.n_squared);
        let scaled = c.as_inner().modpow(&exponent, &self.n_squared);
        Ok(Ciphertext::new_unchecked(modulo(
            &(scaled * r_n),
            &self.n_squared,
        )))
    }

    /// Reassembles a ciphertext from a plaintext and a masked randomizer
    /// `mask = r^N mod N^2` (the randomizer itself stays hidden).
    pub(crate) fn encrypt_with_masked(
        &self,
        m: &BigNumber,
        mask: &BigNumber,
    ) -> Result<Ciphertext, PaillierError> {
        if mask < &BigNumber::one() || mask >= &self.n_squared {
            return Err(PaillierError::NotInRange);
        }
        if mask.gcd(&self.n) != BigNumber::one() {
            return Err(PaillierError::InvalidMessage);
        }
        let g_m = if self.uses_default_generator() {
            modulo(&(BigNumber::one() + m * &self.n), &self.n_squared)
        } else {
            modpow_signed(&self.g, m, &self.n_squared).ok_or(PaillierError::InvalidMessage)?
        };
        Ok(Ciphertext::new_unchecked(modulo(
            &(g_m * mask),
            &self.n_squared,
        )))
    }

    /// `c1 * c2 mod N^2` without re-randomization (for protocol-internal
    /// compositions whose randomness is accounted for elsewhere).
    pub(crate) fn combine(&self, c1: &Ciphertext, c2: &Ciphertext) -> Ciphertext {
        Ciphertext::new_unchecked(modulo(
            &(c1.as_inner() * c2.as_inner()),
            &self.n_squared,
        ))
    }

    /// `c^e mod N^2` for a signed exponent, without re-randomization.
    pub(crate) fn scale(&self, c: &Ciphertext, e: &BigNumber) -> Option<Ciphertext> {
        modpow_signed(c.as_inner(), e, &self.n_squared).map(Ciphertext::new_unchecked)
    }
}

impl Hashable for PublicKey {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.n).chain(&self.g)
    }
}

/// A Paillier secret key; holds its public half.
#[derive(Clone)]
pub struct SecretKey {
    p: BigNumber,
    q: BigNumber,
    lambda: BigNumber,
    mu: BigNumber,
    public: PublicKey,
}

impl SecretKey {
    /// Generates a key over two random primes of `key_bits / 2` each, with a
    /// random generator.
    pub fn generate(rng: &mut impl CryptoRngCore, key_bits: usize) -> Result<Self, PaillierError> {
        if key_bits < MIN_MODULUS_BITS {
            return Err(PaillierError::SmallPublicKeySize);
        }
        Self::generate_inner(rng, key_bits, false)
    }

    /// Generates a key over two safe primes, with the specialized generator
    /// `g = 1 + N`.
    pub fn generate_safe_primes(
        rng: &mut impl CryptoRngCore,
        key_bits: usize,
    ) -> Result<Self, PaillierError> {
        if key_bits < MIN_MODULUS_BITS {
            return Err(PaillierError::SmallPublicKeySize);
        }
        if key_bits / 2 < MIN_SAFE_PRIME_BITS {
            return Err(PaillierError::SmallSafePrime);
        }
        Self::generate_inner(rng, key_bits, true)
    }

    /// Size-unchecked generation for protocol tests with small moduli.
    #[cfg(test)]
    pub(crate) fn generate_unchecked(
        rng: &mut impl CryptoRngCore,
        key_bits: usize,
        safe_primes: bool,
    ) -> Result<Self, PaillierError> {
        Self::generate_inner(rng, key_bits, safe_primes)
    }

    fn generate_inner(
        rng: &mut impl CryptoRngCore,
        key_bits: usize,
        safe_primes: bool,
    ) -> Result<Self, PaillierError> {
        let prime_bits = key_bits / 2;
        for _ in 0..MAX_RETRIES {
            let (p, q) = if safe_primes {
                (
                    BigNumber::safe_prime_from_rng(prime_bits, rng),
                    BigNumber::safe_prime_from_rng(prime_bits, rng),
                )
            } else {
                (
                    BigNumber::prime_from_rng(prime_bits, rng),
                    BigNumber::prime_from_rng(prime_bits, rng),
                )
            };
            if p == q {
                continue;
            }
            let n = &p * &q;
            let p_minus_one = &p - BigNumber::one();
            let q_minus_one = &q - BigNumber::one();
            if n.gcd(&(&p_minus_one * &q_minus_one)) != BigNumber::one() {
                continue;
            }
            let lambda = p_minus_one.lcm(&q_minus_one);
            if lambda == BigNumber::zero() {
                continue;
            }

            if safe_primes {
                // g = 1 + N, for which mu has the closed form lambda^-1 mod N.
                let mu = match lambda.invert(&n) {
                    Some(mu) => mu,
                    None => continue,
                };
                let public = PublicKey::from_modulus(n)?;
                return Ok(Self {
                    p,
                    q,
                    lambda,
                    mu,
                    public,
                });
            }

            // General variant: retry random generators until mu exists.
            let n_squared = &n * &n;
            for _ in 0..MAX_RETRIES {
                let g = match sample_unit(rng, &n_squared) {
                    Some(g) => g,
                    None => return Err(PaillierError::ExceededMaxRetry),
                };
                if g < BigNumber::from(2u64) {
                    continue;
                }
                let mu = match mu_for_generator(&g, &lambda, &n) {
                    Some(mu) => mu,
                    None => continue,
                };
                let public = PublicKey::new(n.clone(), g)?;
                return Ok(Self {
                    p,
                    q,
                    lambda,
                    mu,
                    public,
                });
            }
            return Err(PaillierError::ExceededMaxRetry);
        }
        Err(PaillierError::ExceededMaxRetry)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn primes(&self) -> (&BigNumber, &BigNumber) {
        (&self.p, &self.q)
    }

    pub(crate) fn phi(&self) -> BigNumber {
        (&self.p - BigNumber::one()) * (&self.q - BigNumber::one())
    }

    /// Decrypts a ciphertext into `[0, N)`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber, PaillierError> {
        c.validate(&self.public)?;
        let x = c
            .as_inner()
            .modpow(&self.lambda, self.public.modulus_squared());
        let l = l_function(&x, self.public.modulus()).ok_or(PaillierError::InvalidMessage)?;
        Ok(modulo(&(l * &self.mu), self.public.modulus()))
    }

    /// Decrypts a ciphertext, lifting the plaintext into `(-N/2, N/2]`.
    pub fn decrypt_signed(&self, c: &Ciphertext) -> Result<BigNumber, PaillierError> {
        let m = self.decrypt(c)?;
        Ok(self.center_lift(m))
    }

    /// Decrypts a ciphertext produced under the specialized `1 + N` view of
    /// this key, independently of which generator the key was created with:
    /// `mu` has the closed form `lambda^-1 mod N` there.
    ///
    /// Signing sessions see every participant through its ring modulus, so
    /// the traffic addressed to this party is encrypted under `(N, 1 + N)`
    /// even when the long-term key carries a general generator.
    pub(crate) fn decrypt_specialized(&self, c: &Ciphertext) -> Result<BigNumber, PaillierError> {
        c.validate(&self.public)?;
        let x = c
            .as_inner()
            .modpow(&self.lambda, self.public.modulus_squared());
        let l = l_function(&x, self.public.modulus()).ok_or(PaillierError::InvalidMessage)?;
        let lambda_inv = self
            .lambda
            .invert(self.public.modulus())
            .ok_or(PaillierError::InvalidMessage)?;
        Ok(modulo(&(l * lambda_inv), self.public.modulus()))
    }

    /// [`SecretKey::decrypt_specialized`] with the plaintext lifted into
    /// `(-N/2, N/2]`.
    pub(crate) fn decrypt_signed_specialized(
        &self,
        c: &Ciphertext,
    ) -> Result<BigNumber, PaillierError> {
        let m = self.decrypt_specialized(c)?;
        Ok(self.center_lift(m))
    }

    fn center_lift(&self, m: BigNumber) -> BigNumber {
        let n = self.public.modulus();
        let half = n / BigNumber::from(2u64);
        if m > half {
            m - n
        } else {
            m
        }
    }

    /// The N-th root exponent `N^-1 mod phi(N)`: for any `y` in `Z^*_N`,
    /// `y^exponent mod N` is an N-th root of `y`.
    pub fn nth_root_exponent(&self) -> Option<BigNumber> {
        self.public.modulus().invert(&self.phi())
    }

    /// Recovers the randomizer of a ciphertext under this key.
    ///
    /// `c mod N = r^N mod N`, so taking the N-th root mod N restores `r`.
    pub(crate) fn extract_randomizer(&self, c: &Ciphertext) -> Result<BigNumber, PaillierError> {
        c.validate(&self.public)?;
        let exponent = self
            .nth_root_exponent()
            .ok_or(PaillierError::InvalidMessage)?;
        let residue = modulo(c.as_inner(), self.public.modulus());
        Ok(residue.modpow(&exponent, self.public.modulus()))
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.p = BigNumber::zero();
        self.q = BigNumber::zero();
        self.lambda = BigNumber::zero();
        self.mu = BigNumber::zero();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SecretKey(N = {:?}, ...)", self.public.modulus())
    }
}

/// `L(x) = (x - 1) / N`; the division must be exact.
fn l_function(x: &BigNumber, n: &BigNumber) -> Option<BigNumber> {
    let numerator = x - BigNumber::one();
    if &numerator % n != BigNumber::zero() {
        return None;
    }
    Some(numerator / n)
}

/// `mu = L(g^lambda mod N^2)^-1 mod N`, when it exists.
fn mu_for_generator(g: &BigNumber, lambda: &BigNumber, n: &BigNumber) -> Option<BigNumber> {
    let n_squared = n * n;
    let x = g.modpow(lambda, &n_squared);
    let l = l_function(&x, n)?;
    l.invert(n)
}

/// Checks a candidate modulus against the small-prime sieve.
pub(crate) fn has_small_factor(n: &BigNumber) -> bool {
    crate::tools::bignum::SMALL_PRIMES
        .iter()
        .any(|&p| n % BigNumber::from(p) == BigNumber::zero() && *n != BigNumber::from(p))
}

/// Samples a safe prime of at least the minimum production size.
///
/// This is the sampling glue for callers assembling their own moduli; the
/// key generators below enforce the combined modulus size themselves.
pub fn sample_safe_prime(
    rng: &mut impl CryptoRngCore,
    bits: usize,
) -> Result<BigNumber, PaillierError> {
    if bits < MIN_SAFE_PRIME_BITS {
        return Err(PaillierError::SmallSafePrime);
    }
    Ok(BigNumber::safe_prime_from_rng(bits, rng))
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;
    use unknown_order::BigNumber;

    use super::super::PaillierError;
    use super::SecretKey;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let m = BigNumber::from(987u64);
        let c = pk.encrypt(&mut OsRng, &m).unwrap();
        assert_eq!(sk.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn specialized_generator_roundtrip() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 512, true).unwrap();
        let pk = sk.public_key();
        assert_eq!(pk.generator(), &(pk.modulus() + BigNumber::one()));

        let m = BigNumber::from(31337u64);
        let c = pk.encrypt(&mut OsRng, &m).unwrap();
        assert_eq!(sk.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn boundary_messages() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let n_minus_one = pk.modulus() - BigNumber::one();
        let c = pk.encrypt(&mut OsRng, &n_minus_one).unwrap();
        assert_eq!(sk.decrypt(&c).unwrap(), n_minus_one);

        assert_eq!(
            pk.encrypt(&mut OsRng, pk.modulus()),
            Err(PaillierError::InvalidMessage)
        );
        let negative = BigNumber::zero() - BigNumber::one();
        assert_eq!(
            pk.encrypt(&mut OsRng, &negative),
            Err(PaillierError::InvalidMessage)
        );
    }

    #[test]
    fn homomorphic_add() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let c1 = pk.encrypt(&mut OsRng, &BigNumber::from(100u64)).unwrap();
        let c2 = pk.encrypt(&mut OsRng, &BigNumber::from(200u64)).unwrap();
        let sum = pk.add(&mut OsRng, &c1, &c2).unwrap();
        assert_eq!(sk.decrypt(&sum).unwrap(), BigNumber::from(300u64));
    }

    #[test]
    fn homomorphic_mul_const() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let c = pk.encrypt(&mut OsRng, &BigNumber::from(9987u64)).unwrap();
        let scaled = pk
            .mul_const(&mut OsRng, &c, &BigNumber::from(55667788u64))
            .unwrap();
        assert_eq!(
            sk.decrypt(&scaled).unwrap(),
            BigNumber::from(9987u64 * 55667788)
        );
    }

    #[test]
    fn encryption_is_probabilistic() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let m = BigNumber::from(42u64);
        let c1 = pk.encrypt(&mut OsRng, &m).unwrap();
        let c2 = pk.encrypt(&mut OsRng, &m).unwrap();
        assert_ne!(c1, c2);
    }

    #[test]
    fn small_key_request_is_rejected() {
        assert_eq!(
            SecretKey::generate(&mut OsRng, 1024).err(),
            Some(PaillierError::SmallPublicKeySize)
        );
        assert_eq!(
            super::sample_safe_prime(&mut OsRng, 512).err(),
            Some(PaillierError::SmallSafePrime)
        );
    }

    #[test]
    fn signed_decryption() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let minus_five = BigNumber::zero() - BigNumber::from(5u64);
        let r = crate::tools::bignum::sample_unit(&mut OsRng, pk.modulus()).unwrap();
        let c = pk.encrypt_with(&minus_five, &r).unwrap();
        assert_eq!(sk.decrypt_signed(&c).unwrap(), minus_five);
    }

    #[test]
    fn specialized_view_decryption() {
        // A general-generator key still decrypts traffic encrypted under
        // the (N, 1 + N) view of its modulus.
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let view = super::PublicKey::from_modulus(sk.public_key().modulus().clone()).unwrap();

        let m = BigNumber::from(123456u64);
        let c = view.encrypt(&mut OsRng, &m).unwrap();
        assert_eq!(sk.decrypt_specialized(&c).unwrap(), m);

        let minus_two = BigNumber::zero() - BigNumber::from(2u64);
        let r = crate::tools::bignum::sample_unit(&mut OsRng, view.modulus()).unwrap();
        let c = view.encrypt_with(&minus_two, &r).unwrap();
        assert_eq!(sk.decrypt_signed_specialized(&c).unwrap(), minus_two);

        // Reassembly from the masked randomizer matches the ciphertext.
        let m = BigNumber::from(77u64);
        let (c, r) = view.encrypt_returning_randomizer(&mut OsRng, &m).unwrap();
        let mask = r.modpow(view.modulus(), view.modulus_squared());
        assert_eq!(view.encrypt_with_masked(&m, &mask).unwrap(), c);
    }

    #[test]
    fn randomizer_extraction() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();

        let m = BigNumber::from(55u64);
        let (c, r) = pk.encrypt_returning_randomizer(&mut OsRng, &m).unwrap();
        let extracted = sk.extract_randomizer(&c).unwrap();
        // The root is unique mod N.
        assert_eq!(extracted, crate::tools::bignum::modulo(&r, pk.modulus()));
    }

    #[test]
    fn message_range() {
        let sk = SecretKey::generate_unchecked(&mut OsRng, 1024, false).unwrap();
        let pk = sk.public_key();
        let q = crate::curve::curve_order();
        let range = pk.message_range(&q);
        let q_minus_one = &q - BigNumber::one();
        assert_eq!(&range + &q_minus_one * &q_minus_one, *pk.modulus());
    }
}
