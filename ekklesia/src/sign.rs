//! The three-round threshold ECDSA signing protocol.
//!
//! Message flow per party: round 1 publishes the Paillier encryptions of
//! the ephemeral nonce share `k` and the masking share `gamma` with a range
//! proof; round 2 runs the two-track MTA (one track for `k * gamma`, one
//! for `k * x`); round 3 reveals the delta shares and nonce commitments;
//! round 4 combines the signature shares. A failed delta check or an
//! invalid combined signature switches the session into the matching
//! error-analysis round, which ends with the set of misbehaving peers.

mod context;
mod err;
mod messages;
mod rounds;

pub use context::{PeerConfig, SignerConfig};
pub use messages::{SignBody, SignMessage, SignMessageKind};

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::sync::Arc;

use rand_core::CryptoRngCore;

use crate::curve::Signature;
use crate::paillier::PaillierError;
use crate::rounds::{
    EchoConfig, Engine, Envelope, Failure, PartyId, PeerManager, Protocol, SessionStatus,
    StateListener,
};
use crate::sigma::ProofError;
use crate::tools::birkhoff::BirkhoffError;

#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignError {
    /// the Bk parameter set is empty
    EmptySlice,
    /// the threshold exceeds the number of shares
    LargeThreshold,
    /// the threshold is below the minimum of two
    SmallThreshold,
    /// a rank is too large for the threshold
    LargeRank,
    /// the rank set cannot interpolate the secret
    NotEnoughRanks,
    /// the public inputs are inconsistent
    InvalidInput,
    /// a zero-knowledge proof failed to verify
    VerifyFailure,
    /// invalid delta
    InvalidDelta,
    /// incorrect sig
    IncorrectSignature,
    /// the combined nonce point is the identity
    ZeroR,
    /// the combined signature share is zero
    ZeroS,
    /// paillier failure
    Paillier(PaillierError),
    /// proof construction failure
    Proof(ProofError),
    /// the session has not produced a result
    NotReady,
}

impl From<BirkhoffError> for SignError {
    fn from(err: BirkhoffError) -> Self {
        match err {
            BirkhoffError::EmptySlice => Self::EmptySlice,
            BirkhoffError::LargeThreshold => Self::LargeThreshold,
            BirkhoffError::SmallThreshold => Self::SmallThreshold,
            BirkhoffError::LargeRank => Self::LargeRank,
            BirkhoffError::NotEnoughRanks => Self::NotEnoughRanks,
        }
    }
}

impl From<PaillierError> for SignError {
    fn from(err: PaillierError) -> Self {
        Self::Paillier(err)
    }
}

impl From<ProofError> for SignError {
    fn from(err: ProofError) -> Self {
        Self::Proof(err)
    }
}

/// The protocol marker for the engine.
pub struct SignProtocol;

impl Protocol for SignProtocol {
    type Message = SignMessage;
    type Output = Signature;
    type Error = SignError;
}

/// A single-use signing session. Create one per signature; sessions must
/// not be reused.
pub struct Signer {
    engine: Engine<SignProtocol>,
    peers: Arc<dyn PeerManager<Envelope<SignMessage>>>,
    round1: Option<alloc::vec::Vec<(PartyId, SignMessage)>>,
}

impl Signer {
    /// Validates the inputs and prepares the session. No messages are sent
    /// until [`Signer::start`].
    pub fn new(
        rng: &mut impl CryptoRngCore,
        config: SignerConfig,
        peers: Arc<dyn PeerManager<Envelope<SignMessage>>>,
        listener: Box<dyn StateListener>,
    ) -> Result<Self, SignError> {
        let (first_round, round1_messages) = rounds::prepare(rng, config, peers.clone())?;

        let echo = EchoConfig {
            kinds: BTreeSet::from([SignMessageKind::Round3]),
            peers: peers.clone(),
        };
        let engine = Engine::new(first_round, Some(echo), listener);

        Ok(Self {
            engine,
            peers,
            round1: Some(round1_messages),
        })
    }

    /// Sends the round-1 messages. Call once, after every participant has
    /// constructed its session.
    pub fn start(&mut self) {
        if let Some(messages) = self.round1.take() {
            for (to, message) in messages {
                self.peers.must_send(&to, &Envelope::Payload(message));
            }
        }
    }

    /// Feeds one inbound envelope to the session.
    pub fn handle(&mut self, rng: &mut impl CryptoRngCore, envelope: Envelope<SignMessage>) {
        self.engine.push(rng, envelope);
    }

    pub fn status(&self) -> SessionStatus {
        self.engine.status()
    }

    /// The signature, once the session is done.
    pub fn result(&self) -> Result<Signature, SignError> {
        self.engine.output().copied().ok_or(SignError::NotReady)
    }

    /// The failure and attributed culprits, once the session has failed.
    pub fn failure(&self) -> Option<&Failure<SignProtocol>> {
        self.engine.failure()
    }

    /// Aborts the session; further messages are dropped.
    pub fn stop(&mut self) {
        self.engine.stop();
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    use blake2::Digest;
    use rand_core::OsRng;

    use super::context::Tamper;
    use super::{PeerConfig, SignError, Signer, SignerConfig, SignMessage};
    use crate::curve::Scalar;
    use crate::paillier::SecretKey;
    use crate::pedersen::PedersenParams;
    use crate::rounds::{Envelope, NoopListener, PartyId, PeerManager, SessionStatus};
    use crate::tools::birkhoff::BkParameter;
    use crate::tools::hashing::Blake2b256;

    /// In-memory transport: every sent envelope lands in a shared outbox.
    pub(crate) struct Hub {
        self_id: PartyId,
        peers: Vec<PartyId>,
        pub(crate) outbox: Arc<Mutex<Vec<(PartyId, Envelope<SignMessage>)>>>,
    }

    impl PeerManager<Envelope<SignMessage>> for Hub {
        fn num_peers(&self) -> usize {
            self.peers.len()
        }

        fn peer_ids(&self) -> Vec<PartyId> {
            self.peers.clone()
        }

        fn self_id(&self) -> &PartyId {
            &self.self_id
        }

        fn must_send(&self, to: &PartyId, message: &Envelope<SignMessage>) {
            self.outbox
                .lock()
                .unwrap()
                .push((to.clone(), message.clone()));
        }
    }

    pub(crate) struct Party {
        pub(crate) id: PartyId,
        pub(crate) share: Scalar,
        pub(crate) bk: BkParameter,
        pub(crate) paillier: SecretKey,
        pub(crate) pedersen: PedersenParams,
    }

    pub(crate) fn test_parties(count: usize) -> Vec<Party> {
        // shares (2, 3, 4) of f(x) = 1 + x at abscissas 1, 2, 3: the
        // secret is 1.
        [("1", 2u64, 1u32), ("2", 3u64, 2u32), ("3", 4u64, 3u32)][..count]
            .iter()
            .map(|&(id, share, x)| {
                let paillier = SecretKey::generate_unchecked(&mut OsRng, 1536, false).unwrap();
                let (pedersen, _) = PedersenParams::generate(&mut OsRng, &paillier).unwrap();
                Party {
                    id: PartyId::from(id),
                    share: Scalar::from(share),
                    bk: BkParameter::new(x, 0).unwrap(),
                    paillier,
                    pedersen,
                }
            })
            .collect()
    }

    pub(crate) fn test_message() -> [u8; 32] {
        let mut digest = Blake2b256::new();
        digest.update(b"Edwin HaHa");
        digest.finalize().into()
    }

    fn make_signer(
        parties: &[Party],
        index: usize,
        tamper: Tamper,
    ) -> (Signer, Arc<Mutex<Vec<(PartyId, Envelope<SignMessage>)>>>) {
        let me = &parties[index];
        let pub_key = Scalar::ONE.mul_by_generator();

        let peers = parties
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, other)| {
                (
                    other.id.clone(),
                    PeerConfig {
                        bk: other.bk,
                        pedersen: other.pedersen.clone(),
                        partial_pub_key: other.share.mul_by_generator(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let outbox = Arc::new(Mutex::new(Vec::new()));
        let hub = Arc::new(Hub {
            self_id: me.id.clone(),
            peers: peers.keys().cloned().collect(),
            outbox: outbox.clone(),
        });

        let config = SignerConfig {
            threshold: parties.len(),
            ssid: b"test-session".to_vec(),
            share: me.share,
            pub_key,
            message: test_message(),
            paillier: me.paillier.clone(),
            self_bk: me.bk,
            self_pedersen: me.pedersen.clone(),
            peers,
            tamper,
        };

        let signer = Signer::new(&mut OsRng, config, hub, Box::new(NoopListener)).unwrap();
        (signer, outbox)
    }

    fn deliver_until_quiet(
        signers: &mut BTreeMap<PartyId, Signer>,
        outboxes: &BTreeMap<PartyId, Arc<Mutex<Vec<(PartyId, Envelope<SignMessage>)>>>>,
    ) {
        for _ in 0..100 {
            let mut traffic = Vec::new();
            for outbox in outboxes.values() {
                traffic.append(&mut outbox.lock().unwrap());
            }
            if traffic.is_empty() {
                return;
            }
            for (to, envelope) in traffic {
                if let Some(signer) = signers.get_mut(&to) {
                    signer.handle(&mut OsRng, envelope);
                }
            }
        }
        panic!("message traffic did not quiesce");
    }

    fn run_session(count: usize, tamper_first: Tamper) -> BTreeMap<PartyId, Signer> {
        let parties = test_parties(count);

        let mut signers = BTreeMap::new();
        let mut outboxes = BTreeMap::new();
        for (index, party) in parties.iter().enumerate() {
            let tamper = if index == 0 {
                tamper_first.clone()
            } else {
                Tamper::default()
            };
            let (signer, outbox) = make_signer(&parties, index, tamper);
            signers.insert(party.id.clone(), signer);
            outboxes.insert(party.id.clone(), outbox);
        }

        for signer in signers.values_mut() {
            signer.start();
        }
        deliver_until_quiet(&mut signers, &outboxes);
        signers
    }

    #[test_log::test]
    fn two_party_signing() {
        let signers = run_session(2, Tamper::default());

        let signatures: Vec<_> = signers
            .values()
            .map(|signer| {
                assert_eq!(signer.status(), SessionStatus::Done);
                signer.result().unwrap()
            })
            .collect();

        // Both parties agree on (r, s).
        assert_eq!(signatures[0], signatures[1]);

        // And it is a standard ECDSA signature under the group key.
        let pub_key = Scalar::ONE.mul_by_generator();
        assert!(signatures[0].verify(&pub_key, &test_message()));
    }

    #[test_log::test]
    fn tampered_delta_is_attributed() {
        let signers = run_session(2, Tamper {
            delta: Scalar::ONE,
            sigma: Scalar::ZERO,
            forge_mta: None,
        });

        let honest = &signers[&PartyId::from("2")];
        assert_eq!(honest.status(), SessionStatus::Failed);
        let failure = honest.failure().unwrap();
        assert!(matches!(
            failure.error,
            crate::rounds::SessionError::Protocol(SignError::InvalidDelta)
        ));
        assert_eq!(failure.culprits, alloc::vec![PartyId::from("1")]);

        // The cheater's own analysis never implicates the honest party.
        let cheater = &signers[&PartyId::from("1")];
        assert_eq!(cheater.status(), SessionStatus::Failed);
        assert!(cheater.failure().unwrap().culprits.is_empty());
    }

    #[test_log::test]
    fn three_party_signing() {
        let signers = run_session(3, Tamper::default());

        let signatures: Vec<_> = signers
            .values()
            .map(|signer| {
                assert_eq!(signer.status(), SessionStatus::Done);
                signer.result().unwrap()
            })
            .collect();

        assert_eq!(signatures[0], signatures[1]);
        assert_eq!(signatures[0], signatures[2]);

        let pub_key = Scalar::ONE.mul_by_generator();
        assert!(signatures[0].verify(&pub_key, &test_message()));
    }

    #[test_log::test]
    fn forged_opening_is_attributed() {
        // Party 1 shifts its delta share and forges the error-analysis
        // opening for the MTA leg it shares with party 2, so its delta
        // replays cleanly. Party 3 holds neither side of that leg and can
        // only catch the forgery through the opening cross checks.
        let signers = run_session(3, Tamper {
            delta: Scalar::ONE,
            sigma: Scalar::ZERO,
            forge_mta: Some(PartyId::from("2")),
        });

        for honest in ["2", "3"] {
            let signer = &signers[&PartyId::from(honest)];
            assert_eq!(signer.status(), SessionStatus::Failed);
            let failure = signer.failure().unwrap();
            assert!(matches!(
                failure.error,
                crate::rounds::SessionError::Protocol(SignError::InvalidDelta)
            ));
            assert_eq!(failure.culprits, alloc::vec![PartyId::from("1")]);
        }

        let cheater = &signers[&PartyId::from("1")];
        assert_eq!(cheater.status(), SessionStatus::Failed);
        assert!(cheater.failure().unwrap().culprits.is_empty());
    }

    #[test_log::test]
    fn tampered_sigma_is_attributed() {
        let signers = run_session(2, Tamper {
            delta: Scalar::ZERO,
            sigma: Scalar::ONE,
            forge_mta: None,
        });

        let honest = &signers[&PartyId::from("2")];
        assert_eq!(honest.status(), SessionStatus::Failed);
        let failure = honest.failure().unwrap();
        assert!(matches!(
            failure.error,
            crate::rounds::SessionError::Protocol(SignError::IncorrectSignature)
        ));
        assert_eq!(failure.culprits, alloc::vec![PartyId::from("1")]);

        let cheater = &signers[&PartyId::from("1")];
        assert_eq!(cheater.status(), SessionStatus::Failed);
        assert!(cheater.failure().unwrap().culprits.is_empty());
    }
}
