//! Identifiable-abort analysis for the three-round protocol.
//!
//! Both flows work the same way: every party opens the relevant track of
//! its round data, the openings are collected like any other round, and
//! the analysis replays each peer's announced value from the openings.
//! The MTA ciphertexts travel point-to-point, so each opening republishes
//! the received ciphertext with an N-th-root proof binding the revealed
//! plaintext to it; combined with the pairwise cross equations this lets
//! every verifier check every leg, including the ones it never held, so
//! honest parties agree on the culprit set and never implicate each
//! other.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use unknown_order::BigNumber;

use crate::curve::{Point, Scalar};
use crate::paillier::{Ciphertext, PublicKey};
use crate::rounds::{Failure, PartyId, RoundHandler, SessionError, Transition};

use super::messages::{SignBody, SignErr1, SignErr2, SignMessage, SignMessageKind};
use super::rounds::{Core, MtaArtifact, PeerRound1, PeerRound2};
use super::{SignError, SignProtocol};

/// `enc(m, rho) == ciphertext`, tolerating malformed openings.
fn opens_to(pk: &PublicKey, ciphertext: &Ciphertext, m: &BigNumber, rho: &BigNumber) -> bool {
    if rho.gcd(pk.modulus()) != BigNumber::one() {
        return false;
    }
    match pk.encrypt_with(m, rho) {
        Ok(reencrypted) => &reencrypted == ciphertext,
        Err(_) => false,
    }
}

pub(crate) struct Err1Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    /// The delta shares announced in round 3.
    deltas: BTreeMap<PartyId, Scalar>,
    acc: BTreeMap<PartyId, SignErr1>,
}

impl Err1Handler {
    pub(crate) fn new(
        core: Core,
        peers_r1: BTreeMap<PartyId, PeerRound1>,
        mta: BTreeMap<PartyId, MtaArtifact>,
        peers_r2: BTreeMap<PartyId, PeerRound2>,
        deltas: BTreeMap<PartyId, Scalar>,
    ) -> Self {
        Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            deltas,
            acc: BTreeMap::new(),
        }
    }

    /// Replays a peer's delta share from its own openings:
    /// `delta_j = k_j gamma_j + sum_l (alpha_jl + beta_jl)`, where the
    /// alphas are what `j` decrypted and the betas are the masks `j`
    /// handed out. Missing entries disqualify the reveal.
    fn replay_delta(&self, owner: &PartyId, reveal: &SignErr1) -> Option<Scalar> {
        let ctx = &self.core.ctx;
        let mut delta = reveal.k * reveal.gamma;
        for other in ctx
            .peers
            .keys()
            .chain(core::iter::once(&ctx.self_id))
            .filter(|other| *other != owner)
        {
            let alpha = reveal.alphas.get(other)?;
            let beta = reveal.betas.get(other)?;
            delta = delta
                + Scalar::from_bignumber(&alpha.plaintext)
                + Scalar::from_bignumber(&beta.0);
        }
        Some(delta)
    }

    /// Checks every MTA opening in a reveal: the N-th-root binding of the
    /// plaintext to the republished ciphertext, the ground truth for the
    /// leg this verifier produced itself, and the pairwise cross equation
    /// `alpha_jl + beta_lj == k_j * gamma_l` against the counterpart's
    /// reveal. A leg whose counterpart data is missing is left to that
    /// counterpart's own turn.
    fn openings_hold(&self, owner: &PartyId, reveal: &SignErr1) -> bool {
        let core = &self.core;
        let ctx = &core.ctx;
        let peer = match ctx.peer(owner) {
            Some(peer) => peer,
            None => return false,
        };
        let artifact = &self.mta[owner];

        for other in ctx
            .peers
            .keys()
            .chain(core::iter::once(&ctx.self_id))
            .filter(|other| *other != owner)
        {
            let Some(opening) = reveal.alphas.get(other) else {
                return false;
            };

            // The plaintext is the true decryption of the republished
            // ciphertext.
            if opening
                .proof
                .verify(&ctx.params, &peer.paillier_pk, &opening.mask, &peer.aux)
                .is_err()
            {
                return false;
            }
            match peer
                .paillier_pk
                .encrypt_with_masked(&opening.plaintext, &opening.mask)
            {
                Ok(reassembled) if reassembled == opening.ciphertext => {}
                _ => return false,
            }

            // The leg we produced ourselves has ground truth.
            if *other == ctx.self_id {
                let expected = reveal.k.to_bignumber() * core.own.gamma.to_bignumber()
                    - &artifact.beta;
                if opening.ciphertext != artifact.cap_d || opening.plaintext != expected {
                    return false;
                }
            }

            // Cross equation against the counterpart's revealed mask.
            let (beta, gamma) = if *other == ctx.self_id {
                (Scalar::from_bignumber(&artifact.beta), core.own.gamma)
            } else {
                let Some(counterpart) = self.acc.get(other) else {
                    continue;
                };
                let Some(beta) = counterpart.betas.get(owner) else {
                    continue;
                };
                (Scalar::from_bignumber(&beta.0), counterpart.gamma)
            };
            if Scalar::from_bignumber(&opening.plaintext) + beta != reveal.k * gamma {
                return false;
            }
        }
        true
    }

    fn analyze(&self) -> Vec<PartyId> {
        let core = &self.core;
        let ctx = &core.ctx;
        let mut culprits = BTreeSet::new();

        for (id, reveal) in self.acc.iter() {
            let peer = ctx.peer(id).expect("accumulated senders are peers");
            let r1 = &self.peers_r1[id];
            let r2 = &self.peers_r2[id];

            // The revealed k and gamma must open the broadcast ciphertexts.
            if !opens_to(
                &peer.paillier_pk,
                &r1.cap_k,
                &reveal.k.to_bignumber(),
                &reveal.rho,
            ) {
                culprits.insert(id.clone());
                continue;
            }
            if !opens_to(
                &peer.paillier_pk,
                &r1.cap_g,
                &reveal.gamma.to_bignumber(),
                &reveal.mu,
            ) || r2.gamma != reveal.gamma.mul_by_generator()
            {
                culprits.insert(id.clone());
                continue;
            }

            // Every pairwise MTA opening, not just the one we can match
            // against ground truth.
            if !self.openings_hold(id, reveal) {
                culprits.insert(id.clone());
                continue;
            }

            // The MTA this peer ran towards us: alpha + beta == k * gamma_j.
            match reveal.betas.get(&ctx.self_id) {
                Some(beta) => {
                    let lhs =
                        Scalar::from_bignumber(&r2.alpha) + Scalar::from_bignumber(&beta.0);
                    if lhs != core.own.k * reveal.gamma {
                        culprits.insert(id.clone());
                        continue;
                    }
                }
                None => {
                    culprits.insert(id.clone());
                    continue;
                }
            }

            // The announced delta share must replay from the openings.
            match self.replay_delta(id, reveal) {
                Some(replayed) if self.deltas[id] == replayed => {}
                _ => {
                    culprits.insert(id.clone());
                }
            }
        }

        culprits.into_iter().collect()
    }
}

impl RoundHandler<SignProtocol> for Err1Handler {
    fn kind(&self) -> SignMessageKind {
        SignMessageKind::Err1
    }

    fn expected(&self) -> usize {
        self.core.ctx.peers.len()
    }

    fn is_handled(&self, id: &PartyId) -> bool {
        self.acc.contains_key(id)
    }

    fn received(&self) -> usize {
        self.acc.len()
    }

    fn handle(
        &mut self,
        _rng: &mut dyn CryptoRngCore,
        message: SignMessage,
    ) -> Result<(), Failure<SignProtocol>> {
        let from = message.from;
        let SignBody::Err1(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        if self.core.ctx.peer(&from).is_none() {
            return Err(Failure::new(SessionError::PeerNotFound));
        }
        self.acc.insert(from, body);
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignProtocol>, Failure<SignProtocol>> {
        let culprits = self.analyze();
        Ok(Transition::Abort(Failure::attributed(
            SessionError::Protocol(SignError::InvalidDelta),
            culprits,
        )))
    }
}

pub(crate) struct Err2Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    /// The signature shares announced in round 4.
    sigmas: BTreeMap<PartyId, Scalar>,
    r: Scalar,
    acc: BTreeMap<PartyId, SignErr2>,
}

impl Err2Handler {
    pub(crate) fn new(
        core: Core,
        peers_r1: BTreeMap<PartyId, PeerRound1>,
        mta: BTreeMap<PartyId, MtaArtifact>,
        peers_r2: BTreeMap<PartyId, PeerRound2>,
        sigmas: BTreeMap<PartyId, Scalar>,
        r: Scalar,
    ) -> Self {
        Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            sigmas,
            r,
            acc: BTreeMap::new(),
        }
    }

    /// Replays a peer's chi share in the exponent from its own openings:
    /// `chi_j G = k_j BkPPK_j + sum_l (alpha-hat_jl + beta-hat_jl) G`.
    fn replay_chi_point(&self, owner: &PartyId, reveal: &SignErr2) -> Option<Point> {
        let ctx = &self.core.ctx;
        let peer = ctx.peer(owner)?;
        let mut chi_point = &peer.bk_partial_pub_key * &reveal.k;
        for other in ctx
            .peers
            .keys()
            .chain(core::iter::once(&ctx.self_id))
            .filter(|other| *other != owner)
        {
            let alpha_hat = reveal.alphas_hat.get(other)?;
            let beta_hat = reveal.betas_hat.get(other)?;
            let contribution = Scalar::from_bignumber(&alpha_hat.plaintext)
                + Scalar::from_bignumber(&beta_hat.0);
            chi_point = chi_point + contribution.mul_by_generator();
        }
        Some(chi_point)
    }

    /// The chi-track mirror of the Err1 opening checks: N-th-root binding,
    /// ground truth for this verifier's own leg, and the cross equation in
    /// the exponent, `(alpha-hat_jl + beta-hat_lj) G == k_j * BkPPK_l`.
    fn openings_hold(&self, owner: &PartyId, reveal: &SignErr2) -> bool {
        let core = &self.core;
        let ctx = &core.ctx;
        let peer = match ctx.peer(owner) {
            Some(peer) => peer,
            None => return false,
        };
        let artifact = &self.mta[owner];

        for other in ctx
            .peers
            .keys()
            .chain(core::iter::once(&ctx.self_id))
            .filter(|other| *other != owner)
        {
            let Some(opening) = reveal.alphas_hat.get(other) else {
                return false;
            };

            if opening
                .proof
                .verify(&ctx.params, &peer.paillier_pk, &opening.mask, &peer.aux)
                .is_err()
            {
                return false;
            }
            match peer
                .paillier_pk
                .encrypt_with_masked(&opening.plaintext, &opening.mask)
            {
                Ok(reassembled) if reassembled == opening.ciphertext => {}
                _ => return false,
            }

            if *other == ctx.self_id {
                let expected = reveal.k.to_bignumber() * ctx.bk_mul_share.to_bignumber()
                    - &artifact.beta_hat;
                if opening.ciphertext != artifact.cap_d_hat || opening.plaintext != expected {
                    return false;
                }
            }

            let (beta_hat, bk_partial) = if *other == ctx.self_id {
                (
                    Scalar::from_bignumber(&artifact.beta_hat),
                    ctx.self_bk_partial_pub_key(),
                )
            } else {
                let Some(counterpart) = self.acc.get(other) else {
                    continue;
                };
                let Some(beta_hat) = counterpart.betas_hat.get(owner) else {
                    continue;
                };
                let Some(other_peer) = ctx.peer(other) else {
                    continue;
                };
                (
                    Scalar::from_bignumber(&beta_hat.0),
                    other_peer.bk_partial_pub_key,
                )
            };
            let lhs = (Scalar::from_bignumber(&opening.plaintext) + beta_hat).mul_by_generator();
            if lhs != bk_partial * reveal.k {
                return false;
            }
        }
        true
    }

    fn analyze(&self) -> Vec<PartyId> {
        let core = &self.core;
        let ctx = &core.ctx;
        let mut culprits = BTreeSet::new();

        for (id, reveal) in self.acc.iter() {
            let peer = ctx.peer(id).expect("accumulated senders are peers");
            let r1 = &self.peers_r1[id];
            let r2 = &self.peers_r2[id];

            // The revealed k must open the round-1 ciphertext.
            if !opens_to(
                &peer.paillier_pk,
                &r1.cap_k,
                &reveal.k.to_bignumber(),
                &reveal.rho,
            ) {
                culprits.insert(id.clone());
                continue;
            }

            // Every pairwise MTA opening, not just the one we can match
            // against ground truth.
            if !self.openings_hold(id, reveal) {
                culprits.insert(id.clone());
                continue;
            }

            // The MTA this peer ran towards us, in the exponent:
            // (alpha-hat + beta-hat) G == k * BkPartialPubKey_j.
            match reveal.betas_hat.get(&ctx.self_id) {
                Some(beta_hat) => {
                    let lhs = (Scalar::from_bignumber(&r2.alpha_hat)
                        + Scalar::from_bignumber(&beta_hat.0))
                    .mul_by_generator();
                    if lhs != &peer.bk_partial_pub_key * &core.own.k {
                        culprits.insert(id.clone());
                        continue;
                    }
                }
                None => {
                    culprits.insert(id.clone());
                    continue;
                }
            }

            // Replay the signature share in the exponent:
            // sigma_j G == m k_j G + r chi_j G.
            let Some(chi_point) = self.replay_chi_point(id, reveal) else {
                culprits.insert(id.clone());
                continue;
            };
            let expected_sigma_point =
                (ctx.message * reveal.k).mul_by_generator() + chi_point * self.r;
            if self.sigmas[id].mul_by_generator() != expected_sigma_point {
                culprits.insert(id.clone());
            }
        }

        culprits.into_iter().collect()
    }
}

impl RoundHandler<SignProtocol> for Err2Handler {
    fn kind(&self) -> SignMessageKind {
        SignMessageKind::Err2
    }

    fn expected(&self) -> usize {
        self.core.ctx.peers.len()
    }

    fn is_handled(&self, id: &PartyId) -> bool {
        self.acc.contains_key(id)
    }

    fn received(&self) -> usize {
        self.acc.len()
    }

    fn handle(
        &mut self,
        _rng: &mut dyn CryptoRngCore,
        message: SignMessage,
    ) -> Result<(), Failure<SignProtocol>> {
        let from = message.from;
        let SignBody::Err2(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        if self.core.ctx.peer(&from).is_none() {
            return Err(Failure::new(SessionError::PeerNotFound));
        }
        self.acc.insert(from, body);
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignProtocol>, Failure<SignProtocol>> {
        let culprits = self.analyze();
        Ok(Transition::Abort(Failure::attributed(
            SessionError::Protocol(SignError::IncorrectSignature),
            culprits,
        )))
    }
}
