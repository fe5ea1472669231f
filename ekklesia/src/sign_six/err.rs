//! Identifiable-abort analysis for the six-round protocol.
//!
//! The delta track mirrors the three-round analysis, including the
//! republished, N-th-root-bound MTA openings that let every verifier
//! check every pairwise leg. The chi track additionally leans on the
//! round-3 commitments: each party reveals `y_tilde = b-hat * Y` with a
//! proof that the same `b-hat` sits in `Z1-hat`, which opens
//! `Z2-hat - y_tilde = chi * G`; the opened commitment is then compared
//! against the k reveal and the MTA openings, and against the announced
//! signature share when one exists.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use unknown_order::BigNumber;

use crate::curve::{Point, Scalar};
use crate::paillier::{Ciphertext, PublicKey};
use crate::rounds::{Failure, PartyId, RoundHandler, SessionError, Transition};
use crate::sigma::nth_root::NthRootProof;
use crate::sigma::schnorr::SchnorrProof;

use super::messages::{MtaOpening, SignedShare, SixBody, SixErr1, SixErr2, SixMessage, SixMessageKind};
use super::rounds::{ChiCommitment, Core, MtaArtifact, PeerRound1, PeerRound2, PeerRound3};
use super::{SignError, SignSixProtocol};

fn opens_to(pk: &PublicKey, ciphertext: &Ciphertext, m: &BigNumber, rho: &BigNumber) -> bool {
    if rho.gcd(pk.modulus()) != BigNumber::one() {
        return false;
    }
    match pk.encrypt_with(m, rho) {
        Ok(reencrypted) => &reencrypted == ciphertext,
        Err(_) => false,
    }
}

/// Opens a received MTA ciphertext for the error analysis: republishes it
/// together with the decrypted plaintext, the masked randomizer and the
/// N-th-root proof that binds the plaintext to the ciphertext.
fn open_mta(
    rng: &mut impl CryptoRngCore,
    core: &Core,
    ciphertext: &Ciphertext,
    plaintext: &BigNumber,
) -> Result<MtaOpening, SignError> {
    let pk = &core.ctx.paillier_pk;
    let root = core.ctx.paillier.extract_randomizer(ciphertext)?;
    let mask = root.modpow(pk.modulus(), pk.modulus_squared());
    let proof = NthRootProof::new(rng, &core.ctx.params, &root, pk, &mask, &core.ctx.aux)?;
    Ok(MtaOpening {
        ciphertext: ciphertext.clone(),
        plaintext: plaintext.clone(),
        mask,
        proof,
    })
}

/// A self-consistent forged opening, refutable only through the cross
/// checks (or by the counterpart's ground truth).
#[cfg(test)]
fn forge_opening(rng: &mut impl CryptoRngCore, core: &Core, plaintext: &BigNumber) -> MtaOpening {
    let pk = &core.ctx.paillier_pk;
    let root = crate::tools::bignum::sample_unit(rng, pk.modulus())
        .expect("a unit exists below the modulus");
    let ciphertext = pk
        .encrypt_with(plaintext, &root)
        .expect("the forged plaintext is encryptable");
    let mask = root.modpow(pk.modulus(), pk.modulus_squared());
    let proof = NthRootProof::new(rng, &core.ctx.params, &root, pk, &mask, &core.ctx.aux)
        .expect("the challenge sampler retries salts");
    MtaOpening {
        ciphertext,
        plaintext: plaintext.clone(),
        mask,
        proof,
    }
}

#[cfg(test)]
fn apply_forge(
    rng: &mut impl CryptoRngCore,
    core: &Core,
    openings: &mut BTreeMap<PartyId, MtaOpening>,
) {
    if let Some(target) = core.ctx.tamper.forge_mta.clone() {
        if let Some(opening) = openings.get_mut(&target) {
            let shifted = &opening.plaintext + BigNumber::one();
            *opening = forge_opening(rng, core, &shifted);
        }
    }
}

pub(crate) fn build_err1(
    rng: &mut impl CryptoRngCore,
    core: &Core,
    peers_r2: &BTreeMap<PartyId, PeerRound2>,
    mta: &BTreeMap<PartyId, MtaArtifact>,
) -> Result<SixErr1, SignError> {
    let mut alphas = BTreeMap::new();
    for (id, received) in peers_r2.iter() {
        alphas.insert(
            id.clone(),
            open_mta(rng, core, &received.cap_d, &received.alpha)?,
        );
    }
    #[cfg(test)]
    apply_forge(rng, core, &mut alphas);

    let betas = mta
        .iter()
        .map(|(id, artifact)| (id.clone(), SignedShare(artifact.beta.clone())))
        .collect();

    Ok(SixErr1 {
        k: core.own.k,
        rho: core.own.rho.clone(),
        gamma: core.own.gamma,
        mu: core.own.mu.clone(),
        alphas,
        betas,
    })
}

pub(crate) fn build_err2(
    rng: &mut impl CryptoRngCore,
    core: &Core,
    peers_r2: &BTreeMap<PartyId, PeerRound2>,
    mta: &BTreeMap<PartyId, MtaArtifact>,
    commitment: &ChiCommitment,
) -> Result<SixErr2, SignError> {
    let ctx = &core.ctx;

    // y_tilde opens the chi commitment; the proof pins b-hat to Z1-hat.
    let y_tilde = &ctx.big_y * &commitment.b_hat;
    let dleq = SchnorrProof::new(
        rng,
        &ctx.params,
        &commitment.b_hat,
        &Point::GENERATOR,
        &ctx.big_y,
        &commitment.z1_hat,
        &y_tilde,
        &ctx.aux,
    )
    .expect("the challenge sampler retries salts");

    let mut alphas_hat = BTreeMap::new();
    for (id, received) in peers_r2.iter() {
        alphas_hat.insert(
            id.clone(),
            open_mta(rng, core, &received.cap_d_hat, &received.alpha_hat)?,
        );
    }
    let betas_hat = mta
        .iter()
        .map(|(id, artifact)| (id.clone(), SignedShare(artifact.beta_hat.clone())))
        .collect();

    Ok(SixErr2 {
        k: core.own.k,
        rho: core.own.rho.clone(),
        y_tilde,
        dleq,
        alphas_hat,
        betas_hat,
    })
}

pub(crate) struct SixErr1Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    peers_r3: BTreeMap<PartyId, PeerRound3>,
    /// The Gamma points revealed in round 4.
    peers_r4: BTreeMap<PartyId, Point>,
    acc: BTreeMap<PartyId, SixErr1>,
}

impl SixErr1Handler {
    pub(crate) fn new(
        core: Core,
        peers_r1: BTreeMap<PartyId, PeerRound1>,
        mta: BTreeMap<PartyId, MtaArtifact>,
        peers_r2: BTreeMap<PartyId, PeerRound2>,
        peers_r3: BTreeMap<PartyId, PeerRound3>,
        peers_r4: BTreeMap<PartyId, Point>,
    ) -> Self {
        Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            peers_r4,
            acc: BTreeMap::new(),
        }
    }

    /// Replays a peer's delta share from its own openings:
    /// `delta_j = k_j gamma_j + sum_l (alpha_jl + beta_jl)`.
    fn replay_delta(&self, owner: &PartyId, reveal: &SixErr1) -> Option<Scalar> {
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
    fn openings_hold(&self, owner: &PartyId, reveal: &SixErr1) -> bool {
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
                let expected = reveal.k.to_bignumber() * core.own.gamma.to_bignumber()
                    - &artifact.beta;
                if opening.ciphertext != artifact.cap_d || opening.plaintext != expected {
                    return false;
                }
            }

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
            ) || self.peers_r4[id] != reveal.gamma.mul_by_generator()
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
                Some(replayed) if self.peers_r3[id].delta == replayed => {}
                _ => {
                    culprits.insert(id.clone());
                }
            }
        }

        culprits.into_iter().collect()
    }
}

impl RoundHandler<SignSixProtocol> for SixErr1Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Err1
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
        message: SixMessage,
    ) -> Result<(), Failure<SignSixProtocol>> {
        let from = message.from;
        let SixBody::Err1(body) = message.body else {
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
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let culprits = self.analyze();
        Ok(Transition::Abort(Failure::attributed(
            SessionError::Protocol(SignError::InvalidDelta),
            culprits,
        )))
    }
}

pub(crate) struct SixErr2Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    peers_r3: BTreeMap<PartyId, PeerRound3>,
    /// The signature shares, when the abort happened after round 7.
    sigmas: Option<BTreeMap<PartyId, Scalar>>,
    r: Scalar,
    acc: BTreeMap<PartyId, SixErr2>,
}

impl SixErr2Handler {
    pub(crate) fn new(
        core: Core,
        peers_r1: BTreeMap<PartyId, PeerRound1>,
        mta: BTreeMap<PartyId, MtaArtifact>,
        peers_r2: BTreeMap<PartyId, PeerRound2>,
        peers_r3: BTreeMap<PartyId, PeerRound3>,
        sigmas: Option<BTreeMap<PartyId, Scalar>>,
        r: Scalar,
    ) -> Self {
        Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            sigmas,
            r,
            acc: BTreeMap::new(),
        }
    }

    /// Replays a peer's chi share in the exponent from its own openings:
    /// `chi_j G = k_j BkPPK_j + sum_l (alpha-hat_jl + beta-hat_jl) G`.
    fn replay_chi_point(&self, owner: &PartyId, reveal: &SixErr2) -> Option<Point> {
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
    fn openings_hold(&self, owner: &PartyId, reveal: &SixErr2) -> bool {
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
            let r3 = &self.peers_r3[id];

            if !opens_to(
                &peer.paillier_pk,
                &r1.cap_k,
                &reveal.k.to_bignumber(),
                &reveal.rho,
            ) {
                culprits.insert(id.clone());
                continue;
            }

            // The commitment opening: same b-hat in Z1-hat and y_tilde.
            if reveal
                .dleq
                .verify(
                    &ctx.params,
                    &Point::GENERATOR,
                    &peer.big_y,
                    &r3.z1_hat,
                    &reveal.y_tilde,
                    &peer.aux,
                )
                .is_err()
            {
                culprits.insert(id.clone());
                continue;
            }
            let chi_point = &r3.z2_hat - &reveal.y_tilde;

            // Every pairwise MTA opening, not just the one we can match
            // against ground truth.
            if !self.openings_hold(id, reveal) {
                culprits.insert(id.clone());
                continue;
            }

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

            // The opened chi commitment must replay from the k reveal and
            // the MTA openings.
            match self.replay_chi_point(id, reveal) {
                Some(expected_chi) if chi_point == expected_chi => {}
                _ => {
                    culprits.insert(id.clone());
                    continue;
                }
            }

            // When the abort happened at the combine step, replay the
            // announced signature share against the opened commitment.
            if let Some(sigmas) = &self.sigmas {
                let expected_sigma_point =
                    (ctx.message * reveal.k).mul_by_generator() + chi_point * self.r;
                if sigmas[id].mul_by_generator() != expected_sigma_point {
                    culprits.insert(id.clone());
                }
            }
        }

        culprits.into_iter().collect()
    }
}

impl RoundHandler<SignSixProtocol> for SixErr2Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Err2
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
        message: SixMessage,
    ) -> Result<(), Failure<SignSixProtocol>> {
        let from = message.from;
        let SixBody::Err2(body) = message.body else {
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
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let culprits = self.analyze();
        Ok(Transition::Abort(Failure::attributed(
            SessionError::Protocol(SignError::IncorrectSignature),
            culprits,
        )))
    }
}
