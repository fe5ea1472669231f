//! The round handlers of the three-round signing protocol.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use unknown_order::BigNumber;

use crate::curve::{Point, Scalar, Signature};
use crate::paillier::{Ciphertext, PublicKey};
use crate::pedersen::PedersenParams;
use crate::rounds::{Failure, PartyId, RoundHandler, SessionError, Transition};
use crate::sigma::aff_g::{AffGProof, AffGStatement, AffGWitness};
use crate::sigma::enc::EncProof;
use crate::sigma::log_star::LogStarProof;
use crate::sigma::nth_root::NthRootProof;
use crate::sigma::ProofParams;
use crate::tools::bignum::sample_signed;
use crate::tools::hashing::Hashable;
use crate::tools::rng::DynRng;

use super::context::{Context, Pm, SignerConfig};
use super::err::{Err1Handler, Err2Handler};
use super::messages::{
    MtaOpening, SignBody, SignErr1, SignErr2, SignMessage, SignMessageKind, SignRound1,
    SignRound2, SignRound3, SignRound4, SignedShare,
};
use super::{SignError, SignProtocol};

/// This party's round-1 secrets.
pub(crate) struct OwnShares {
    pub(crate) k: Scalar,
    pub(crate) gamma: Scalar,
    /// Randomizer of `cap_k`.
    pub(crate) rho: BigNumber,
    /// Randomizer of `cap_g`.
    pub(crate) mu: BigNumber,
    pub(crate) cap_k: Ciphertext,
    pub(crate) cap_g: Ciphertext,
}

pub(crate) struct Core {
    pub(crate) ctx: Context,
    pub(crate) own: OwnShares,
}

pub(crate) struct PeerRound1 {
    pub(crate) cap_k: Ciphertext,
    pub(crate) cap_g: Ciphertext,
}

/// What this party retains from the MTA it ran towards one peer.
pub(crate) struct MtaArtifact {
    /// The delta-track mask (the MTA share is `-beta`).
    pub(crate) beta: BigNumber,
    pub(crate) beta_hat: BigNumber,
    /// The `D` ciphertext sent to the peer, kept for error analysis.
    pub(crate) cap_d: Ciphertext,
    pub(crate) cap_d_hat: Ciphertext,
}

pub(crate) struct PeerRound2 {
    /// Decrypted delta-track MTA output, center-lifted.
    pub(crate) alpha: BigNumber,
    pub(crate) alpha_hat: BigNumber,
    pub(crate) gamma: Point,
    /// The received MTA ciphertexts, kept for error analysis.
    pub(crate) cap_d: Ciphertext,
    pub(crate) cap_d_hat: Ciphertext,
}

pub(crate) struct PeerRound3 {
    pub(crate) delta: Scalar,
}

/// The presignature computed when round 2 finalizes.
pub(crate) struct Presig {
    pub(crate) delta: Scalar,
    pub(crate) chi: Scalar,
    pub(crate) big_gamma: Point,
    pub(crate) big_delta: Point,
}

pub(crate) fn blame(error: SignError, id: &PartyId) -> Failure<SignProtocol> {
    Failure::attributed(SessionError::Protocol(error), alloc::vec![id.clone()])
}

fn abort(error: SignError) -> Transition<SignProtocol> {
    Transition::Abort(Failure::protocol(error))
}

/// Builds the session context, this party's shares and the round-1
/// messages (one per peer, since the range proof binds to the receiver's
/// ring parameters).
pub(crate) fn prepare(
    rng: &mut impl CryptoRngCore,
    config: SignerConfig,
    pm: Pm,
) -> Result<(Box<dyn RoundHandler<SignProtocol>>, Vec<(PartyId, SignMessage)>), SignError> {
    let ctx = Context::build(config, pm)?;

    let k = Scalar::random_nonzero(rng);
    let gamma = Scalar::random_nonzero(rng);
    let pk = &ctx.paillier_pk;
    let (cap_k, rho) = pk.encrypt_returning_randomizer(rng, &k.to_bignumber())?;
    let (cap_g, mu) = pk.encrypt_returning_randomizer(rng, &gamma.to_bignumber())?;

    let own = OwnShares {
        k,
        gamma,
        rho,
        mu,
        cap_k,
        cap_g,
    };

    let mut messages = Vec::new();
    for (id, peer) in ctx.peers.iter() {
        let psi = EncProof::new(
            rng,
            &ctx.params,
            &own.k.to_bignumber(),
            &own.rho,
            pk,
            &own.cap_k,
            &peer.pedersen,
            &ctx.aux,
        )?;
        let body = SignBody::Round1(SignRound1 {
            cap_k: own.cap_k.clone(),
            cap_g: own.cap_g.clone(),
            psi,
        });
        messages.push((id.clone(), ctx.wrap(body)));
    }

    let handler = Round1Handler {
        core: Core { ctx, own },
        acc: BTreeMap::new(),
    };
    Ok((Box::new(handler), messages))
}

pub(crate) struct Round1Handler {
    core: Core,
    acc: BTreeMap<PartyId, PeerRound1>,
}

impl RoundHandler<SignProtocol> for Round1Handler {
    fn kind(&self) -> SignMessageKind {
        SignMessageKind::Round1
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
        let SignBody::Round1(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        let ctx = &self.core.ctx;
        let peer = ctx
            .peer(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;

        body.psi
            .verify(
                &ctx.params,
                &peer.paillier_pk,
                &body.cap_k,
                &ctx.pedersen,
                &peer.aux,
            )
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;
        body.cap_g
            .validate(&peer.paillier_pk)
            .map_err(|err| blame(SignError::Paillier(err), &from))?;

        self.acc.insert(
            from,
            PeerRound1 {
                cap_k: body.cap_k,
                cap_g: body.cap_g,
            },
        );
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignProtocol>, Failure<SignProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self { core, acc } = *self;
        let ctx = &core.ctx;
        let pk = &ctx.paillier_pk;
        let big_gamma_own = core.own.gamma.mul_by_generator();
        let bk_partial_own = ctx.self_bk_partial_pub_key();

        let mut artifacts = BTreeMap::new();
        for (id, received) in acc.iter() {
            let peer = ctx.peer(id).expect("accumulated senders are peers");

            // Delta track: additive shares of k_j * gamma_i.
            let (cap_d, cap_f, beta, psi) = mta(
                rng,
                &ctx.params,
                &peer.paillier_pk,
                pk,
                &received.cap_k,
                &core.own.gamma.to_bignumber(),
                &big_gamma_own,
                &peer.pedersen,
                &ctx.aux,
            )
            .map_err(Failure::protocol)?;

            // Chi track: additive shares of k_j * (bk_coeff_i * share_i).
            let (cap_d_hat, cap_f_hat, beta_hat, psi_hat) = mta(
                rng,
                &ctx.params,
                &peer.paillier_pk,
                pk,
                &received.cap_k,
                &ctx.bk_mul_share.to_bignumber(),
                &bk_partial_own,
                &peer.pedersen,
                &ctx.aux,
            )
            .map_err(Failure::protocol)?;

            let psi_prime = LogStarProof::new(
                rng,
                &ctx.params,
                &core.own.gamma.to_bignumber(),
                &core.own.mu,
                pk,
                &core.own.cap_g,
                &Point::GENERATOR,
                &big_gamma_own,
                &peer.pedersen,
                &ctx.aux,
            )
            .map_err(|err| Failure::protocol(SignError::Proof(err)))?;

            let body = SignBody::Round2(SignRound2 {
                cap_d: cap_d.clone(),
                cap_f,
                cap_d_hat: cap_d_hat.clone(),
                cap_f_hat,
                psi,
                psi_hat,
                psi_prime,
                gamma: big_gamma_own,
            });
            ctx.send(id, ctx.wrap(body));

            artifacts.insert(
                id.clone(),
                MtaArtifact {
                    beta,
                    beta_hat,
                    cap_d,
                    cap_d_hat,
                },
            );
        }

        Ok(Transition::Next(Box::new(Round2Handler {
            core,
            peers_r1: acc,
            mta: artifacts,
            acc: BTreeMap::new(),
        })))
    }
}

/// One MTA leg: produces `D = K^x * enc(-beta)` under the peer's key, the
/// prover-side encryption `F` of the mask, and the binding proof.
#[allow(clippy::too_many_arguments)]
fn mta(
    rng: &mut impl CryptoRngCore,
    params: &ProofParams,
    target_pk: &PublicKey,
    own_pk: &PublicKey,
    cap_k: &Ciphertext,
    x: &BigNumber,
    big_x: &Point,
    setup: &PedersenParams,
    aux: &impl Hashable,
) -> Result<(Ciphertext, Ciphertext, BigNumber, AffGProof), SignError> {
    let beta = sample_signed(rng, params.lp);
    let y = BigNumber::zero() - &beta;

    let s = crate::tools::bignum::sample_unit(rng, target_pk.modulus())
        .ok_or(SignError::Paillier(crate::paillier::PaillierError::ExceededMaxRetry))?;
    let r = crate::tools::bignum::sample_unit(rng, own_pk.modulus())
        .ok_or(SignError::Paillier(crate::paillier::PaillierError::ExceededMaxRetry))?;

    let cap_d = target_pk.combine(
        &target_pk.scale(cap_k, x).ok_or(SignError::InvalidInput)?,
        &target_pk.encrypt_with(&y, &s)?,
    );
    let cap_f = own_pk.encrypt_with(&y, &r)?;

    let statement = AffGStatement {
        pk0: target_pk,
        pk1: own_pk,
        cap_c: cap_k,
        cap_d: &cap_d,
        cap_y: &cap_f,
        cap_x: big_x,
    };
    let witness = AffGWitness {
        x,
        y: &y,
        rho: &s,
        rho_y: &r,
    };
    let psi = AffGProof::new(rng, params, &witness, &statement, setup, aux)?;

    Ok((cap_d, cap_f, beta, psi))
}

pub(crate) struct Round2Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    acc: BTreeMap<PartyId, PeerRound2>,
}

impl RoundHandler<SignProtocol> for Round2Handler {
    fn kind(&self) -> SignMessageKind {
        SignMessageKind::Round2
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
        let SignBody::Round2(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        let ctx = &self.core.ctx;
        let peer = ctx
            .peer(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;
        let received_r1 = self
            .peers_r1
            .get(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;
        let pk = &ctx.paillier_pk;

        // The MTA the peer ran towards us, delta track.
        let statement = AffGStatement {
            pk0: pk,
            pk1: &peer.paillier_pk,
            cap_c: &self.core.own.cap_k,
            cap_d: &body.cap_d,
            cap_y: &body.cap_f,
            cap_x: &body.gamma,
        };
        body.psi
            .verify(&ctx.params, &statement, &ctx.pedersen, &peer.aux)
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        // Chi track, against the peer's weighted partial public key.
        let statement_hat = AffGStatement {
            pk0: pk,
            pk1: &peer.paillier_pk,
            cap_c: &self.core.own.cap_k,
            cap_d: &body.cap_d_hat,
            cap_y: &body.cap_f_hat,
            cap_x: &peer.bk_partial_pub_key,
        };
        body.psi_hat
            .verify(&ctx.params, &statement_hat, &ctx.pedersen, &peer.aux)
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        // Gamma is consistent with the round-1 ciphertext.
        body.psi_prime
            .verify(
                &ctx.params,
                &peer.paillier_pk,
                &received_r1.cap_g,
                &Point::GENERATOR,
                &body.gamma,
                &ctx.pedersen,
                &peer.aux,
            )
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        let alpha = ctx
            .paillier
            .decrypt_signed_specialized(&body.cap_d)
            .map_err(|err| blame(SignError::Paillier(err), &from))?;
        let alpha_hat = ctx
            .paillier
            .decrypt_signed_specialized(&body.cap_d_hat)
            .map_err(|err| blame(SignError::Paillier(err), &from))?;

        self.acc.insert(
            from,
            PeerRound2 {
                alpha,
                alpha_hat,
                gamma: body.gamma,
                cap_d: body.cap_d,
                cap_d_hat: body.cap_d_hat,
            },
        );
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignProtocol>, Failure<SignProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            acc,
        } = *self;
        let ctx = &core.ctx;

        // delta_i = gamma_i k_i + sum_j (alpha_ij + beta_ji)
        let mut delta = core.own.gamma * core.own.k;
        let mut chi = ctx.bk_mul_share * core.own.k;
        let mut big_gamma = core.own.gamma.mul_by_generator();
        for (id, received) in acc.iter() {
            let artifact = mta.get(id).expect("one artifact per peer");
            delta = delta
                + Scalar::from_bignumber(&received.alpha)
                + Scalar::from_bignumber(&artifact.beta);
            chi = chi
                + Scalar::from_bignumber(&received.alpha_hat)
                + Scalar::from_bignumber(&artifact.beta_hat);
            big_gamma = big_gamma + received.gamma;
        }
        // A tampering party announces a shifted share while keeping its
        // commitments honest; honest runs add zero.
        #[cfg(test)]
        let delta = delta + ctx.tamper.delta;

        let big_delta = &big_gamma * &core.own.k;

        let psi_double_prime = LogStarProof::new(
            rng,
            &ctx.params,
            &core.own.k.to_bignumber(),
            &core.own.rho,
            &ctx.paillier_pk,
            &core.own.cap_k,
            &big_gamma,
            &big_delta,
            &ctx.pedersen,
            &ctx.aux,
        )
        .map_err(|err| Failure::protocol(SignError::Proof(err)))?;

        ctx.broadcast(ctx.wrap(SignBody::Round3(SignRound3 {
            delta,
            big_delta,
            psi_double_prime,
        })));

        Ok(Transition::Next(Box::new(Round3Handler {
            core,
            peers_r1,
            mta,
            peers_r2: acc,
            presig: Presig {
                delta,
                chi,
                big_gamma,
                big_delta,
            },
            acc: BTreeMap::new(),
        })))
    }
}

pub(crate) struct Round3Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    presig: Presig,
    acc: BTreeMap<PartyId, (PeerRound3, Point)>,
}

impl RoundHandler<SignProtocol> for Round3Handler {
    fn kind(&self) -> SignMessageKind {
        SignMessageKind::Round3
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
        let SignBody::Round3(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        let ctx = &self.core.ctx;
        let peer = ctx
            .peer(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;
        let received_r1 = self
            .peers_r1
            .get(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;

        // The round-3 payload is a broadcast, so the proof binds to the
        // prover's own ring parameters.
        body.psi_double_prime
            .verify(
                &ctx.params,
                &peer.paillier_pk,
                &received_r1.cap_k,
                &self.presig.big_gamma,
                &body.big_delta,
                &peer.pedersen,
                &peer.aux,
            )
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        self.acc.insert(
            from,
            (PeerRound3 { delta: body.delta }, body.big_delta),
        );
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignProtocol>, Failure<SignProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            presig,
            acc,
        } = *self;
        let ctx = &core.ctx;

        let mut delta_sum = presig.delta;
        let mut big_delta_sum = presig.big_delta;
        for (round3, big_delta) in acc.values() {
            delta_sum = delta_sum + round3.delta;
            big_delta_sum = big_delta_sum + *big_delta;
        }

        if delta_sum.mul_by_generator() != big_delta_sum {
            // Somebody's delta share does not match its Delta commitment:
            // open the delta track and let everyone attribute.
            tracing::warn!("delta verification failed, entering error analysis");
            let reveal =
                build_err1(rng, &core, &peers_r2, &mta).map_err(Failure::protocol)?;
            ctx.broadcast(ctx.wrap(SignBody::Err1(reveal)));
            let deltas = acc
                .into_iter()
                .map(|(id, (round3, _))| (id, round3.delta))
                .collect();
            return Ok(Transition::Next(Box::new(Err1Handler::new(
                core, peers_r1, mta, peers_r2, deltas,
            ))));
        }

        let Some(delta_inv) = delta_sum.invert() else {
            return Ok(abort(SignError::ZeroR));
        };
        let big_r = &presig.big_gamma * &delta_inv;
        if big_r.is_identity() {
            return Ok(abort(SignError::ZeroR));
        }
        let r = big_r.x_coordinate();

        let sigma = core.own.k * ctx.message + r * presig.chi;
        #[cfg(test)]
        let sigma = sigma + ctx.tamper.sigma;
        ctx.broadcast(ctx.wrap(SignBody::Round4(SignRound4 { sigma })));

        Ok(Transition::Next(Box::new(Round4Handler {
            core,
            peers_r1,
            mta,
            peers_r2,
            r,
            sigma,
            acc: BTreeMap::new(),
        })))
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

/// A self-consistent forged opening: a fresh ciphertext of the shifted
/// plaintext with a matching mask and proof. Only the counterpart holds
/// the ground truth to refute it directly; everyone else relies on the
/// cross checks.
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
) -> Result<SignErr1, SignError> {
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

    Ok(SignErr1 {
        k: core.own.k,
        rho: core.own.rho.clone(),
        gamma: core.own.gamma,
        mu: core.own.mu.clone(),
        alphas,
        betas,
    })
}

pub(crate) struct Round4Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    r: Scalar,
    sigma: Scalar,
    acc: BTreeMap<PartyId, Scalar>,
}

impl RoundHandler<SignProtocol> for Round4Handler {
    fn kind(&self) -> SignMessageKind {
        SignMessageKind::Round4
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
        let SignBody::Round4(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        if self.core.ctx.peer(&from).is_none() {
            return Err(Failure::new(SessionError::PeerNotFound));
        }
        self.acc.insert(from, body.sigma);
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignProtocol>, Failure<SignProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            r,
            sigma,
            acc,
        } = *self;
        let ctx = &core.ctx;

        let s: Scalar = sigma + acc.values().sum();
        if s == Scalar::ZERO {
            return Ok(abort(SignError::ZeroS));
        }

        if let Some(signature) = Signature::from_scalars(r, s) {
            if signature.verify(&ctx.pub_key, &ctx.message_bytes) {
                return Ok(Transition::Complete(signature));
            }
        }

        // Some signature share is wrong: open the chi track.
        tracing::warn!("signature verification failed, entering error analysis");
        let reveal = build_err2(rng, &core, &peers_r2, &mta).map_err(Failure::protocol)?;
        ctx.broadcast(ctx.wrap(SignBody::Err2(reveal)));
        Ok(Transition::Next(Box::new(Err2Handler::new(
            core, peers_r1, mta, peers_r2, acc, r,
        ))))
    }
}

pub(crate) fn build_err2(
    rng: &mut impl CryptoRngCore,
    core: &Core,
    peers_r2: &BTreeMap<PartyId, PeerRound2>,
    mta: &BTreeMap<PartyId, MtaArtifact>,
) -> Result<SignErr2, SignError> {
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

    Ok(SignErr2 {
        k: core.own.k,
        rho: core.own.rho.clone(),
        alphas_hat,
        betas_hat,
    })
}
