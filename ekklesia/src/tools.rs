pub(crate) mod bignum;
pub(crate) mod birkhoff;
pub(crate) mod hashing;
pub(crate) mod rng;
pub(crate) mod serde_bytes;
