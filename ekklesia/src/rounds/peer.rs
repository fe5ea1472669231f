//! The peer manager: the sole I/O boundary of a session.

use alloc::vec::Vec;

use super::PartyId;

/// Caller-supplied transport capability. `must_send` is fire-and-forget:
/// it must not block, and delivery is assumed reliable, authenticated and
/// ordered per peer pair.
pub trait PeerManager<M>: Send + Sync {
    /// The number of remote parties.
    fn num_peers(&self) -> usize;

    /// The remote party ids, in a fixed order.
    fn peer_ids(&self) -> Vec<PartyId>;

    fn self_id(&self) -> &PartyId;

    fn must_send(&self, to: &PartyId, message: &M);
}

/// Sends `message` to every remote party.
pub fn broadcast<M>(peers: &dyn PeerManager<M>, message: &M) {
    for id in peers.peer_ids() {
        peers.must_send(&id, message);
    }
}
