//! The six-round threshold ECDSA signing protocol.
//!
//! Extends the three-round flow with an ElGamal commitment layer that
//! pins each party's nonce and chi shares before anything is combined,
//! which lets the abort analysis identify a cheater from commitments
//! alone. Each party carries an auxiliary secret `y` whose public point
//! `Y` is known to all participants; the E-log proofs tie the announced
//! `Delta` and `S` points to commitments under `Y`.

mod context;
mod err;
mod messages;
mod rounds;

pub use context::{SixPeerConfig, SixSignerConfig};
pub use messages::{SixBody, SixMessage, SixMessageKind};

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::sync::Arc;

use rand_core::CryptoRngCore;

use crate::curve::Signature;
use crate::rounds::{
    EchoConfig, Engine, Envelope, Failure, PartyId, PeerManager, Protocol, SessionStatus,
    StateListener,
};

pub use crate::sign::SignError;

/// The protocol marker for the engine.
pub struct SignSixProtocol;

impl Protocol for SignSixProtocol {
    type Message = SixMessage;
    type Output = Signature;
    type Error = SignError;
}

/// A single-use six-round signing session.
pub struct SixSigner {
    engine: Engine<SignSixProtocol>,
    peers: Arc<dyn PeerManager<Envelope<SixMessage>>>,
    round1: Option<alloc::vec::Vec<(PartyId, SixMessage)>>,
}

impl SixSigner {
    /// Validates the inputs and prepares the session. No messages are sent
    /// until [`SixSigner::start`].
    pub fn new(
        rng: &mut impl CryptoRngCore,
        config: SixSignerConfig,
        peers: Arc<dyn PeerManager<Envelope<SixMessage>>>,
        listener: Box<dyn StateListener>,
    ) -> Result<Self, SignError> {
        let (first_round, round1_messages) = rounds::prepare(rng, config, peers.clone())?;

        let echo = EchoConfig {
            kinds: BTreeSet::from([SixMessageKind::Round3, SixMessageKind::Round7]),
            peers: peers.clone(),
        };
        let engine = Engine::new(first_round, Some(echo), listener);

        Ok(Self {
            engine,
            peers,
            round1: Some(round1_messages),
        })
    }

    /// Sends the round-1 messages.
    pub fn start(&mut self) {
        if let Some(messages) = self.round1.take() {
            for (to, message) in messages {
                self.peers.must_send(&to, &Envelope::Payload(message));
            }
        }
    }

    /// Feeds one inbound envelope to the session.
    pub fn handle(&mut self, rng: &mut impl CryptoRngCore, envelope: Envelope<SixMessage>) {
        self.engine.push(rng, envelope);
    }

    pub fn status(&self) -> SessionStatus {
        self.engine.status()
    }

    pub fn result(&self) -> Result<Signature, SignError> {
        self.engine.output().copied().ok_or(SignError::NotReady)
    }

    pub fn failure(&self) -> Option<&Failure<SignSixProtocol>> {
        self.engine.failure()
    }

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
    use super::{SignError, SixMessage, SixPeerConfig, SixSigner, SixSignerConfig};
    use crate::curve::Scalar;
    use crate::paillier::SecretKey;
    use crate::pedersen::PedersenParams;
    use crate::rounds::{Envelope, NoopListener, PartyId, PeerManager, SessionStatus};
    use crate::tools::birkhoff::BkParameter;
    use crate::tools::hashing::Blake2b256;

    struct Hub {
        self_id: PartyId,
        peers: Vec<PartyId>,
        outbox: Arc<Mutex<Vec<(PartyId, Envelope<SixMessage>)>>>,
    }

    impl PeerManager<Envelope<SixMessage>> for Hub {
        fn num_peers(&self) -> usize {
            self.peers.len()
        }

        fn peer_ids(&self) -> Vec<PartyId> {
            self.peers.clone()
        }

        fn self_id(&self) -> &PartyId {
            &self.self_id
        }

        fn must_send(&self, to: &PartyId, message: &Envelope<SixMessage>) {
            self.outbox
                .lock()
                .unwrap()
                .push((to.clone(), message.clone()));
        }
    }

    struct Party {
        id: PartyId,
        share: Scalar,
        y: Scalar,
        bk: BkParameter,
        paillier: SecretKey,
        pedersen: PedersenParams,
    }

    fn test_parties(count: usize) -> Vec<Party> {
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
                    y: Scalar::random_nonzero(&mut OsRng),
                    bk: BkParameter::new(x, 0).unwrap(),
                    paillier,
                    pedersen,
                }
            })
            .collect()
    }

    fn test_message() -> [u8; 32] {
        let mut digest = Blake2b256::new();
        digest.update(b"Edwin HaHa");
        digest.finalize().into()
    }

    type Outbox = Arc<Mutex<Vec<(PartyId, Envelope<SixMessage>)>>>;

    fn make_signer(parties: &[Party], index: usize, tamper: Tamper) -> (SixSigner, Outbox) {
        let me = &parties[index];
        let pub_key = Scalar::ONE.mul_by_generator();

        let peers = parties
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, other)| {
                (
                    other.id.clone(),
                    SixPeerConfig {
                        bk: other.bk,
                        pedersen: other.pedersen.clone(),
                        partial_pub_key: other.share.mul_by_generator(),
                        big_y: other.y.mul_by_generator(),
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

        let config = SixSignerConfig {
            threshold: parties.len(),
            ssid: b"test-session-six".to_vec(),
            share: me.share,
            y: me.y,
            pub_key,
            message: test_message(),
            paillier: me.paillier.clone(),
            self_bk: me.bk,
            self_pedersen: me.pedersen.clone(),
            peers,
            tamper,
        };

        let signer = SixSigner::new(&mut OsRng, config, hub, Box::new(NoopListener)).unwrap();
        (signer, outbox)
    }

    fn run_session(count: usize, tamper_first: Tamper) -> BTreeMap<PartyId, SixSigner> {
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

        for _ in 0..100 {
            let mut traffic = Vec::new();
            for outbox in outboxes.values() {
                traffic.append(&mut outbox.lock().unwrap());
            }
            if traffic.is_empty() {
                return signers;
            }
            for (to, envelope) in traffic {
                if let Some(signer) = signers.get_mut(&to) {
                    signer.handle(&mut OsRng, envelope);
                }
            }
        }
        panic!("message traffic did not quiesce");
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

        assert_eq!(signatures[0], signatures[1]);

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

        let cheater = &signers[&PartyId::from("1")];
        assert_eq!(cheater.status(), SessionStatus::Failed);
        assert!(cheater.failure().unwrap().culprits.is_empty());
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
