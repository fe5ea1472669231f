//! This module is an adapter to the ECC backend.
//! `elliptic_curve` has a somewhat unstable API,
//! and we isolate all the related logic here.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::default::Default;
use core::ops::{Add, Mul, Neg, Sub};

use k256::elliptic_curve::group::ff::PrimeField;
use k256::elliptic_curve::{
    bigint::U256, // Note that this type is different from typenum::U256
    generic_array::GenericArray,
    ops::Reduce,
    point::AffineCoordinates,
    scalar::IsHigh,
    sec1::{EncodedPoint, FromEncodedPoint, ToEncodedPoint},
    Field,
    FieldBytesSize,
};
use k256::Secp256k1;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use unknown_order::BigNumber;
use zeroize::Zeroize;

use crate::tools::hashing::{Chain, Hashable};
use crate::tools::serde_bytes;

pub(crate) type BackendScalar = k256::Scalar;
pub(crate) type BackendPoint = k256::ProjectivePoint;

/// The order of secp256k1, as unsigned big-endian bytes.
const ORDER_BYTES: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36,
    0x41, 0x41,
];

/// Returns the curve order `q` as a [`BigNumber`].
pub(crate) fn curve_order() -> BigNumber {
    BigNumber::from_slice(ORDER_BYTES)
}

/// A scalar of the curve's prime-order group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Scalar(BackendScalar);

impl Scalar {
    pub const ZERO: Self = Self(BackendScalar::ZERO);
    pub const ONE: Self = Self(BackendScalar::ONE);

    pub fn random(rng: &mut impl CryptoRngCore) -> Self {
        Self(BackendScalar::random(rng))
    }

    /// Samples a random non-zero scalar.
    pub fn random_nonzero(rng: &mut impl CryptoRngCore) -> Self {
        loop {
            let scalar = Self::random(rng);
            if scalar != Self::ZERO {
                return scalar;
            }
        }
    }

    pub fn mul_by_generator(&self) -> Point {
        &Point::GENERATOR * self
    }

    pub fn invert(&self) -> Option<Self> {
        let inv: Option<BackendScalar> = self.0.invert().into();
        inv.map(Self)
    }

    /// Mirrors the scalar into the lower half of the order if needed
    /// (the "low-s" normalization of ECDSA signatures).
    pub fn normalize(&self) -> Self {
        if self.0.is_high().into() {
            -self
        } else {
            *self
        }
    }

    /// Reduces a 32-byte digest into a scalar.
    pub fn from_digest_bytes(bytes: &[u8; 32]) -> Self {
        let arr = GenericArray::<u8, FieldBytesSize<Secp256k1>>::clone_from_slice(bytes);
        Self(<BackendScalar as Reduce<U256>>::reduce_bytes(&arr))
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    pub(crate) fn try_from_be_bytes(bytes: &[u8]) -> Result<Self, String> {
        let arr = GenericArray::<u8, FieldBytesSize<Secp256k1>>::from_exact_iter(
            bytes.iter().cloned(),
        )
        .ok_or("Invalid length of a curve scalar")?;

        BackendScalar::from_repr_vartime(arr)
            .map(Self)
            .ok_or_else(|| "Invalid curve scalar representation".into())
    }

    /// The scalar as a non-negative multi-precision integer.
    pub(crate) fn to_bignumber(self) -> BigNumber {
        BigNumber::from_slice(self.to_be_bytes())
    }

    /// Reduces a (possibly negative) multi-precision integer mod the curve order.
    pub(crate) fn from_bignumber(value: &BigNumber) -> Self {
        let q = curve_order();
        let mut reduced = value % &q;
        if reduced < BigNumber::zero() {
            reduced = reduced + q;
        }
        let bytes = reduced.to_bytes();
        let mut repr = [0u8; 32];
        repr[32 - bytes.len()..].copy_from_slice(&bytes);
        // Reduced mod the order, so the representation is always valid.
        Self::try_from_be_bytes(&repr).expect("reduced value fits a scalar")
    }
}

impl From<u64> for Scalar {
    fn from(val: u64) -> Self {
        Self(BackendScalar::from(val))
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0.zeroize()
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_bytes::serialize(&self.to_be_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde_bytes::deserialize(deserializer)?;
        Self::try_from_be_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Hashable for Scalar {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.to_be_bytes())
    }
}

/// A point of the curve's prime-order group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point(BackendPoint);

impl Point {
    pub const GENERATOR: Self = Self(BackendPoint::GENERATOR);

    pub const IDENTITY: Self = Self(BackendPoint::IDENTITY);

    pub fn is_identity(&self) -> bool {
        self.0 == BackendPoint::IDENTITY
    }

    /// The affine x-coordinate reduced into a scalar (the ECDSA `r` value).
    pub fn x_coordinate(&self) -> Scalar {
        let bytes = self.0.to_affine().x();
        Scalar(<BackendScalar as Reduce<U256>>::reduce_bytes(&bytes))
    }

    pub(crate) fn try_from_compressed_bytes(bytes: &[u8]) -> Result<Self, String> {
        let ep = EncodedPoint::<Secp256k1>::from_bytes(bytes).map_err(|err| format!("{err}"))?;

        // Unwrap CtOption into Option
        let cp_opt: Option<BackendPoint> = BackendPoint::from_encoded_point(&ep).into();
        cp_opt
            .map(Self)
            .ok_or_else(|| "Invalid curve point representation".into())
    }

    pub(crate) fn to_compressed_bytes(self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().into()
    }

    pub(crate) fn to_verifying_key(self) -> Option<k256::ecdsa::VerifyingKey> {
        k256::ecdsa::VerifyingKey::from_affine(self.0.to_affine()).ok()
    }
}

impl Serialize for Point {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_bytes::serialize(&self.to_compressed_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde_bytes::deserialize(deserializer)?;
        Self::try_from_compressed_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Hashable for Point {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.to_compressed_bytes())
    }
}

impl Default for Point {
    fn default() -> Self {
        Point::IDENTITY
    }
}

/// An ECDSA signature in its scalar form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: Scalar,
    pub s: Scalar,
}

impl Signature {
    /// Builds a signature from the combined scalars, normalizing `s` to the
    /// low half-order. Returns `None` if either scalar is zero.
    pub fn from_scalars(r: Scalar, s: Scalar) -> Option<Self> {
        if r == Scalar::ZERO || s == Scalar::ZERO {
            return None;
        }
        Some(Self { r, s: s.normalize() })
    }

    /// Verifies the signature over a prehashed 32-byte message digest
    /// against the given public key.
    pub fn verify(&self, public_key: &Point, prehash: &[u8; 32]) -> bool {
        use k256::ecdsa::signature::hazmat::PrehashVerifier;

        let vkey = match public_key.to_verifying_key() {
            Some(vkey) => vkey,
            None => return false,
        };
        let sig = match k256::ecdsa::Signature::from_scalars(self.r.0, self.s.0) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        vkey.verify_prehash(prehash, &sig).is_ok()
    }
}

impl Neg for Scalar {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Neg for &Scalar {
    type Output = Scalar;
    fn neg(self) -> Self::Output {
        Scalar(-self.0)
    }
}

impl Add<Scalar> for Scalar {
    type Output = Scalar;

    fn add(self, other: Scalar) -> Scalar {
        Scalar(self.0.add(other.0))
    }
}

impl Add<&Scalar> for &Scalar {
    type Output = Scalar;

    fn add(self, other: &Scalar) -> Scalar {
        Scalar(self.0.add(&(other.0)))
    }
}

impl Sub<Scalar> for Scalar {
    type Output = Scalar;

    fn sub(self, other: Scalar) -> Scalar {
        Scalar(self.0.sub(other.0))
    }
}

impl Sub<&Scalar> for &Scalar {
    type Output = Scalar;

    fn sub(self, other: &Scalar) -> Scalar {
        Scalar(self.0.sub(&(other.0)))
    }
}

impl Mul<Scalar> for Scalar {
    type Output = Scalar;

    fn mul(self, other: Scalar) -> Scalar {
        Scalar(self.0.mul(other.0))
    }
}

impl Mul<&Scalar> for &Scalar {
    type Output = Scalar;

    fn mul(self, other: &Scalar) -> Scalar {
        Scalar(self.0.mul(&(other.0)))
    }
}

impl Add<Point> for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point(self.0.add(other.0))
    }
}

impl Add<&Point> for &Point {
    type Output = Point;

    fn add(self, other: &Point) -> Point {
        Point(self.0.add(&(other.0)))
    }
}

impl Sub<Point> for Point {
    type Output = Point;

    fn sub(self, other: Point) -> Point {
        Point(self.0.sub(other.0))
    }
}

impl Sub<&Point> for &Point {
    type Output = Point;

    fn sub(self, other: &Point) -> Point {
        Point(self.0.sub(&(other.0)))
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Self::Output {
        Point(-self.0)
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;

    fn mul(self, other: Scalar) -> Point {
        Point(self.0.mul(other.0))
    }
}

impl Mul<&Scalar> for &Point {
    type Output = Point;

    fn mul(self, other: &Scalar) -> Point {
        Point(self.0.mul(&(other.0)))
    }
}

impl core::iter::Sum for Scalar {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.reduce(core::ops::Add::add).unwrap_or(Self::ZERO)
    }
}

impl<'a> core::iter::Sum<&'a Self> for Scalar {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.cloned().sum()
    }
}

impl core::iter::Sum for Point {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.reduce(core::ops::Add::add).unwrap_or(Self::IDENTITY)
    }
}

impl<'a> core::iter::Sum<&'a Self> for Point {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.cloned().sum()
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::{curve_order, Point, Scalar, Signature};

    #[test]
    fn scalar_bignumber_roundtrip() {
        let scalar = Scalar::random(&mut OsRng);
        let bn = scalar.to_bignumber();
        assert_eq!(Scalar::from_bignumber(&bn), scalar);
    }

    #[test]
    fn from_bignumber_reduces_negatives() {
        let one = Scalar::ONE;
        let minus_one = curve_order() - one.to_bignumber();
        assert_eq!(Scalar::from_bignumber(&minus_one), -one);

        let neg = unknown_order::BigNumber::zero() - one.to_bignumber();
        assert_eq!(Scalar::from_bignumber(&neg), -one);
    }

    #[test]
    fn point_compressed_roundtrip() {
        let point = Scalar::random(&mut OsRng).mul_by_generator();
        let bytes = point.to_compressed_bytes();
        assert_eq!(Point::try_from_compressed_bytes(&bytes).unwrap(), point);
    }

    #[test]
    fn sign_and_verify() {
        let secret = Scalar::random_nonzero(&mut OsRng);
        let public = secret.mul_by_generator();

        let prehash = [7u8; 32];
        let m = Scalar::from_digest_bytes(&prehash);

        let k = Scalar::random_nonzero(&mut OsRng);
        let big_r = k.mul_by_generator();
        let r = big_r.x_coordinate();
        let k_inv = k.invert().unwrap();
        let s = k_inv * (m + r * secret);

        let sig = Signature::from_scalars(r, s).unwrap();
        assert!(sig.verify(&public, &prehash));
        assert!(!sig.verify(&Point::GENERATOR, &prehash));
    }
}
