//! End-to-end scenarios over the public API: Paillier laws at the
//! production key size, key transport, and threshold signing with both
//! protocol variants sharing one set of long-term keys.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand_core::OsRng;
use unknown_order::BigNumber;

use ekklesia::paillier::{PaillierError, PublicKeyMessage, SecretKey};
use ekklesia::pedersen::{PedersenParams, PedersenParamsMessage};
use ekklesia::rounds::{Envelope, NoopListener, PartyId, PeerManager, SessionStatus};
use ekklesia::sigma::ProofParams;
use ekklesia::sign::{PeerConfig, SignMessage, Signer, SignerConfig};
use ekklesia::sign_six::{SixMessage, SixPeerConfig, SixSigner, SixSignerConfig};
use ekklesia::{BkParameter, Scalar};

#[test]
fn paillier_laws_at_production_size() {
    let sk = SecretKey::generate(&mut OsRng, 2048).unwrap();
    let pk = sk.public_key();

    // Enc then Dec round-trips.
    let m = BigNumber::from(987u64);
    let c = pk.encrypt(&mut OsRng, &m).unwrap();
    assert_eq!(sk.decrypt(&c).unwrap(), m);

    // Additive homomorphism.
    let c1 = pk.encrypt(&mut OsRng, &BigNumber::from(100u64)).unwrap();
    let c2 = pk.encrypt(&mut OsRng, &BigNumber::from(200u64)).unwrap();
    let sum = pk.add(&mut OsRng, &c1, &c2).unwrap();
    assert_eq!(sk.decrypt(&sum).unwrap(), BigNumber::from(300u64));

    // Scalar multiplication.
    let c = pk.encrypt(&mut OsRng, &BigNumber::from(9987u64)).unwrap();
    let scaled = pk
        .mul_const(&mut OsRng, &c, &BigNumber::from(55667788u64))
        .unwrap();
    assert_eq!(
        sk.decrypt(&scaled).unwrap(),
        BigNumber::from(9987u64 * 55667788)
    );

    // Boundaries: N - 1 round-trips, N is rejected.
    let n_minus_one = pk.modulus() - BigNumber::one();
    let c = pk.encrypt(&mut OsRng, &n_minus_one).unwrap();
    assert_eq!(sk.decrypt(&c).unwrap(), n_minus_one);
    assert_eq!(
        pk.encrypt(&mut OsRng, pk.modulus()),
        Err(PaillierError::InvalidMessage)
    );

    // Key transport round-trips through the factorization proof.
    let params = ProofParams::secp256k1();
    let message = PublicKeyMessage::new(&mut OsRng, &params, &sk).unwrap();
    assert_eq!(&message.import(&params).unwrap(), pk);
}

#[test]
fn pedersen_transport() {
    let sk = SecretKey::generate(&mut OsRng, 2048).unwrap();
    let (params, witness) = PedersenParams::generate(&mut OsRng, &sk).unwrap();

    let aux: &[u8] = b"transport";
    let message = PedersenParamsMessage::new(&mut OsRng, &params, &witness, &aux).unwrap();
    assert_eq!(message.import(&aux).unwrap(), params);

    // A different binding context does not verify.
    let other_aux: &[u8] = b"elsewhere";
    assert!(message.import(&other_aux).is_err());
}

struct Hub<M> {
    self_id: PartyId,
    peers: Vec<PartyId>,
    outbox: Arc<Mutex<Vec<(PartyId, M)>>>,
}

impl<M: Clone + Send> PeerManager<M> for Hub<M> {
    fn num_peers(&self) -> usize {
        self.peers.len()
    }

    fn peer_ids(&self) -> Vec<PartyId> {
        self.peers.clone()
    }

    fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    fn must_send(&self, to: &PartyId, message: &M) {
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

fn long_term_keys(count: usize) -> Vec<Party> {
    // shares (2, 3, 4) of f(x) = 1 + x at abscissas 1, 2, 3: the secret is
    // 1, so the group public key is the generator.
    [("1", 2u64, 1u32), ("2", 3u64, 2u32), ("3", 4u64, 3u32)][..count]
        .iter()
        .map(|&(id, share, x)| {
            let paillier = SecretKey::generate(&mut OsRng, 2048).unwrap();
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

fn message_digest() -> [u8; 32] {
    let mut digest = Blake2b::<U32>::new();
    digest.update(b"Edwin HaHa");
    digest.finalize().into()
}

fn run_three_round(parties: &[Party]) -> ekklesia::Signature {
    let pub_key = Scalar::ONE.mul_by_generator();

    let mut signers = BTreeMap::new();
    let mut outboxes = BTreeMap::new();
    for (index, me) in parties.iter().enumerate() {
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
        let hub = Arc::new(Hub::<Envelope<SignMessage>> {
            self_id: me.id.clone(),
            peers: peers.keys().cloned().collect(),
            outbox: outbox.clone(),
        });

        let config = SignerConfig {
            threshold: parties.len(),
            ssid: b"integration".to_vec(),
            share: me.share,
            pub_key,
            message: message_digest(),
            paillier: me.paillier.clone(),
            self_bk: me.bk,
            self_pedersen: me.pedersen.clone(),
            peers,
        };
        let signer = Signer::new(&mut OsRng, config, hub, Box::new(NoopListener)).unwrap();
        signers.insert(me.id.clone(), signer);
        outboxes.insert(me.id.clone(), outbox);
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
            break;
        }
        for (to, envelope) in traffic {
            if let Some(signer) = signers.get_mut(&to) {
                signer.handle(&mut OsRng, envelope);
            }
        }
    }

    let signatures: Vec<_> = signers
        .values()
        .map(|signer| {
            assert_eq!(signer.status(), SessionStatus::Done);
            signer.result().unwrap()
        })
        .collect();
    for signature in &signatures {
        assert_eq!(*signature, signatures[0]);
    }
    signatures[0]
}

fn run_six_round(parties: &[Party]) -> ekklesia::Signature {
    let pub_key = Scalar::ONE.mul_by_generator();

    let mut signers = BTreeMap::new();
    let mut outboxes = BTreeMap::new();
    for (index, me) in parties.iter().enumerate() {
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
        let hub = Arc::new(Hub::<Envelope<SixMessage>> {
            self_id: me.id.clone(),
            peers: peers.keys().cloned().collect(),
            outbox: outbox.clone(),
        });

        let config = SixSignerConfig {
            threshold: parties.len(),
            ssid: b"integration-six".to_vec(),
            share: me.share,
            y: me.y,
            pub_key,
            message: message_digest(),
            paillier: me.paillier.clone(),
            self_bk: me.bk,
            self_pedersen: me.pedersen.clone(),
            peers,
        };
        let signer = SixSigner::new(&mut OsRng, config, hub, Box::new(NoopListener)).unwrap();
        signers.insert(me.id.clone(), signer);
        outboxes.insert(me.id.clone(), outbox);
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
            break;
        }
        for (to, envelope) in traffic {
            if let Some(signer) = signers.get_mut(&to) {
                signer.handle(&mut OsRng, envelope);
            }
        }
    }

    let signatures: Vec<_> = signers
        .values()
        .map(|signer| {
            assert_eq!(signer.status(), SessionStatus::Done);
            signer.result().unwrap()
        })
        .collect();
    for signature in &signatures {
        assert_eq!(*signature, signatures[0]);
    }
    signatures[0]
}

#[test]
fn threshold_signing_both_variants() {
    let parties = long_term_keys(3);
    let pub_key = Scalar::ONE.mul_by_generator();

    // Three parties through the three-round protocol...
    let three = run_three_round(&parties);
    assert!(three.verify(&pub_key, &message_digest()));

    // ...and two of them (reusing their long-term keys) through the
    // six-round protocol.
    let six = run_six_round(&parties[..2]);
    assert!(six.verify(&pub_key, &message_digest()));
}
