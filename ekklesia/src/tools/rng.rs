//! Bridges the object-safe `&mut dyn CryptoRngCore` of the round-handler
//! interface to APIs taking `&mut impl CryptoRngCore`.

use rand_core::{CryptoRng, CryptoRngCore, Error, RngCore};

pub(crate) struct DynRng<'a>(pub(crate) &'a mut dyn CryptoRngCore);

impl RngCore for DynRng<'_> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.0.try_fill_bytes(dest)
    }
}

impl CryptoRng for DynRng<'_> {}
