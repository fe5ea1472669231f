//! Echo broadcast: receivers rebroadcast a digest of what the sender
//! delivered, and accept the payload only once every receiver attests to
//! the same digest. Guards the equivocation-sensitive broadcast rounds.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use alloc::vec;

use subtle::ConstantTimeEq;

use super::engine::{Failure, Protocol, SessionError};
use super::message::{EchoVote, Envelope, ProtocolMessage};
use super::peer::{broadcast, PeerManager};
use super::PartyId;

type Kind<P> = <<P as Protocol>::Message as ProtocolMessage>::Kind;

/// Which message kinds are echo-wrapped, and the transport to send votes on.
pub struct EchoConfig<P: Protocol> {
    pub kinds: BTreeSet<Kind<P>>,
    pub peers: Arc<dyn PeerManager<Envelope<P::Message>>>,
}

struct EchoRecord<M> {
    payload: Option<M>,
    votes: BTreeMap<PartyId, [u8; 32]>,
    released: bool,
}

impl<M> Default for EchoRecord<M> {
    fn default() -> Self {
        Self {
            payload: None,
            votes: BTreeMap::new(),
            released: false,
        }
    }
}

pub(crate) struct EchoLayer<P: Protocol> {
    config: EchoConfig<P>,
    records: BTreeMap<(PartyId, Kind<P>), EchoRecord<P::Message>>,
}

impl<P: Protocol> EchoLayer<P> {
    pub(crate) fn new(config: EchoConfig<P>) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
        }
    }

    pub(crate) fn covers(&self, kind: Kind<P>) -> bool {
        self.config.kinds.contains(&kind)
    }

    /// The number of matching attestations required to release a payload:
    /// every party except the origin (the receiver's own counts as one).
    fn required(&self) -> usize {
        self.config.peers.num_peers()
    }

    /// An original payload arrived from its sender. Stores it, casts our
    /// own vote to the other receivers, and releases the payload if the
    /// vote set is already complete.
    pub(crate) fn receive_payload(
        &mut self,
        message: P::Message,
    ) -> Result<Option<P::Message>, Failure<P>> {
        let origin = message.sender().clone();
        let kind = message.kind();
        let digest = message.digest();

        let record = self.records.entry((origin.clone(), kind)).or_default();
        if record.payload.is_some() || record.released {
            tracing::debug!(origin = %origin, "ignoring repeated broadcast payload");
            return Ok(None);
        }
        record.payload = Some(message);

        let self_id = self.config.peers.self_id().clone();
        record.votes.insert(self_id.clone(), digest);

        let vote = EchoVote {
            voter: self_id,
            origin: origin.clone(),
            kind,
            digest,
        };
        broadcast(&*self.config.peers, &Envelope::Echo(vote));

        self.try_release(&origin, kind)
    }

    /// Another receiver's attestation arrived.
    pub(crate) fn receive_vote(
        &mut self,
        vote: EchoVote<Kind<P>>,
    ) -> Result<Option<P::Message>, Failure<P>> {
        if !self.covers(vote.kind) {
            tracing::debug!(kind = ?vote.kind, "dropping echo vote for an unwrapped round");
            return Ok(None);
        }
        if vote.voter == vote.origin {
            // The origin has no say about its own payload.
            return Ok(None);
        }

        let record = self
            .records
            .entry((vote.origin.clone(), vote.kind))
            .or_default();
        if record.votes.insert(vote.voter, vote.digest).is_some() {
            tracing::debug!("ignoring duplicate echo vote");
        }
        self.try_release(&vote.origin, vote.kind)
    }

    fn try_release(
        &mut self,
        origin: &PartyId,
        kind: Kind<P>,
    ) -> Result<Option<P::Message>, Failure<P>> {
        let required = self.required();
        let record = match self.records.get_mut(&(origin.clone(), kind)) {
            Some(record) => record,
            None => return Ok(None),
        };

        // Conflicting digests prove the origin equivocated.
        let mut reference: Option<[u8; 32]> = None;
        for digest in record.votes.values() {
            match reference {
                None => reference = Some(*digest),
                Some(first) => {
                    if !bool::from(first.ct_eq(digest)) {
                        return Err(Failure::attributed(
                            SessionError::Equivocation,
                            vec![origin.clone()],
                        ));
                    }
                }
            }
        }

        if record.released || record.payload.is_none() || record.votes.len() < required {
            return Ok(None);
        }
        record.released = true;
        Ok(record.payload.take())
    }
}
