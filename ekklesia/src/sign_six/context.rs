//! Session inputs and the immutable per-session context of the six-round
//! variant.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::curve::{Point, Scalar};
use crate::paillier::{PublicKey, SecretKey};
use crate::pedersen::PedersenParams;
use crate::rounds::{Envelope, PartyId, PeerManager};
use crate::sigma::ProofParams;
use crate::tools::birkhoff::{birkhoff_coefficients, BkParameter};
use crate::tools::hashing::{Chain, Transcript};

use super::messages::SixMessage;
use super::SignError;

/// Long-term public material of one remote party.
#[derive(Clone, Debug)]
pub struct SixPeerConfig {
    pub bk: BkParameter,
    /// The peer's ring-Pedersen parameters; the ring modulus doubles as the
    /// peer's Paillier modulus.
    pub pedersen: PedersenParams,
    /// `g * share_j`.
    pub partial_pub_key: Point,
    /// The peer's auxiliary commitment point `Y_j = g * y_j`.
    pub big_y: Point,
}

/// Everything a party needs to start a six-round signing session.
pub struct SixSignerConfig {
    pub threshold: usize,
    pub ssid: Vec<u8>,
    pub share: Scalar,
    /// The auxiliary ElGamal secret `y`.
    pub y: Scalar,
    pub pub_key: Point,
    pub message: [u8; 32],
    pub paillier: SecretKey,
    pub self_bk: BkParameter,
    pub self_pedersen: PedersenParams,
    pub peers: BTreeMap<PartyId, SixPeerConfig>,
    #[cfg(test)]
    pub(crate) tamper: Tamper,
}

/// Offsets added to this party's announced shares, for abort tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct Tamper {
    pub(crate) delta: Scalar,
    pub(crate) sigma: Scalar,
    /// Replace the error-analysis MTA opening addressed to this peer with
    /// a self-consistent forgery (plaintext shifted by one).
    pub(crate) forge_mta: Option<PartyId>,
}

pub(crate) struct SixPeerContext {
    pub(crate) pedersen: PedersenParams,
    pub(crate) paillier_pk: PublicKey,
    pub(crate) bk_partial_pub_key: Point,
    pub(crate) big_y: Point,
    pub(crate) aux: [u8; 32],
}

pub(crate) struct SixContext {
    pub(crate) params: ProofParams,
    pub(crate) self_id: PartyId,
    pub(crate) message: Scalar,
    pub(crate) message_bytes: [u8; 32],
    /// This party's auxiliary commitment point `Y = g * y`.
    pub(crate) big_y: Point,
    /// `bk_coeff * share`: this party's additive share of the secret key.
    pub(crate) bk_mul_share: Scalar,
    pub(crate) pub_key: Point,
    pub(crate) paillier: SecretKey,
    /// The `(N, 1 + N)` view of this party's Paillier key; all signing
    /// traffic and proofs use it, whatever generator the long-term key
    /// carries.
    pub(crate) paillier_pk: PublicKey,
    pub(crate) pedersen: PedersenParams,
    pub(crate) aux: [u8; 32],
    pub(crate) peers: BTreeMap<PartyId, SixPeerContext>,
    pub(crate) pm: Arc<dyn PeerManager<Envelope<SixMessage>>>,
    #[cfg(test)]
    pub(crate) tamper: Tamper,
}

fn ssid_with_bk(ssid: &[u8], bk: &BkParameter) -> [u8; 32] {
    Transcript::new_with_dst(b"ssid-bk")
        .chain_bytes(ssid)
        .chain(&bk.x())
        .chain(&bk.rank())
        .finalize()
}

impl SixContext {
    pub(crate) fn build(
        config: SixSignerConfig,
        pm: Arc<dyn PeerManager<Envelope<SixMessage>>>,
    ) -> Result<Self, SignError> {
        let self_id = pm.self_id().clone();

        let mut ids: Vec<PartyId> = config.peers.keys().cloned().collect();
        ids.push(self_id.clone());
        ids.sort();
        let bks: Vec<BkParameter> = ids
            .iter()
            .map(|id| {
                if *id == self_id {
                    config.self_bk
                } else {
                    config.peers[id].bk
                }
            })
            .collect();
        let coefficients = birkhoff_coefficients(config.threshold, &bks)?;
        let coeff_of = |target: &PartyId| -> Scalar {
            let position = ids
                .iter()
                .position(|id| id == target)
                .expect("the id list covers all parties");
            coefficients[position]
        };

        let bk_coeff = coeff_of(&self_id);
        let bk_mul_share = bk_coeff * config.share;

        let mut combined = config.share.mul_by_generator() * bk_coeff;

        let mut peers = BTreeMap::new();
        for (id, peer) in config.peers.into_iter() {
            let coeff = coeff_of(&id);
            let bk_partial_pub_key = &peer.partial_pub_key * &coeff;
            combined = combined + bk_partial_pub_key;

            peer.pedersen
                .validate()
                .map_err(|_| SignError::InvalidInput)?;
            let paillier_pk = PublicKey::from_modulus(peer.pedersen.modulus().clone())
                .map_err(SignError::Paillier)?;

            peers.insert(
                id,
                SixPeerContext {
                    aux: ssid_with_bk(&config.ssid, &peer.bk),
                    pedersen: peer.pedersen,
                    paillier_pk,
                    bk_partial_pub_key,
                    big_y: peer.big_y,
                },
            );
        }

        if combined != config.pub_key {
            return Err(SignError::InvalidInput);
        }

        let paillier_pk =
            PublicKey::from_modulus(config.paillier.public_key().modulus().clone())
                .map_err(SignError::Paillier)?;

        Ok(Self {
            params: ProofParams::secp256k1(),
            message: Scalar::from_digest_bytes(&config.message),
            message_bytes: config.message,
            big_y: config.y.mul_by_generator(),
            bk_mul_share,
            pub_key: config.pub_key,
            paillier: config.paillier,
            paillier_pk,
            pedersen: config.self_pedersen,
            aux: ssid_with_bk(&config.ssid, &config.self_bk),
            self_id,
            peers,
            pm,
            #[cfg(test)]
            tamper: config.tamper,
        })
    }

    pub(crate) fn peer(&self, id: &PartyId) -> Option<&SixPeerContext> {
        self.peers.get(id)
    }

    pub(crate) fn self_bk_partial_pub_key(&self) -> Point {
        self.bk_mul_share.mul_by_generator()
    }

    pub(crate) fn broadcast(&self, message: SixMessage) {
        crate::rounds::broadcast(&*self.pm, &Envelope::Payload(message));
    }

    pub(crate) fn send(&self, to: &PartyId, message: SixMessage) {
        self.pm.must_send(to, &Envelope::Payload(message));
    }

    pub(crate) fn wrap(&self, body: super::messages::SixBody) -> SixMessage {
        SixMessage {
            from: self.self_id.clone(),
            body,
        }
    }
}

pub(crate) type Pm = Arc<dyn PeerManager<Envelope<SixMessage>>>;
