//! The round handlers of the six-round signing protocol.

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
use crate::sigma::elog::{ElogProof, ElogStatement};
use crate::sigma::enc::EncProof;
use crate::sigma::enc_exp::EncExpProof;
use crate::sigma::ProofParams;
use crate::tools::bignum::sample_signed;
use crate::tools::hashing::Hashable;
use crate::tools::rng::DynRng;

use super::context::{Pm, SixContext, SixSignerConfig};
use super::err::{SixErr1Handler, SixErr2Handler};
use super::messages::{
    SixBody, SixMessage, SixMessageKind, SixRound1, SixRound2, SixRound3, SixRound4, SixRound5,
    SixRound6, SixRound7,
};
use super::{SignError, SignSixProtocol};

pub(crate) struct OwnShares {
    pub(crate) k: Scalar,
    pub(crate) gamma: Scalar,
    pub(crate) rho: BigNumber,
    pub(crate) mu: BigNumber,
    pub(crate) cap_k: Ciphertext,
    pub(crate) cap_g: Ciphertext,
}

pub(crate) struct Core {
    pub(crate) ctx: SixContext,
    pub(crate) own: OwnShares,
}

pub(crate) struct PeerRound1 {
    pub(crate) cap_k: Ciphertext,
    pub(crate) cap_g: Ciphertext,
}

pub(crate) struct MtaArtifact {
    pub(crate) beta: BigNumber,
    pub(crate) beta_hat: BigNumber,
    pub(crate) cap_d: Ciphertext,
    pub(crate) cap_d_hat: Ciphertext,
}

pub(crate) struct PeerRound2 {
    pub(crate) alpha: BigNumber,
    pub(crate) alpha_hat: BigNumber,
    pub(crate) cap_d: Ciphertext,
    pub(crate) cap_d_hat: Ciphertext,
    pub(crate) cap_f: Ciphertext,
    /// The delta-track MTA proof; its statement includes the peer's
    /// `Gamma`, so it is verified in round 4 when `Gamma` arrives.
    pub(crate) deferred_psi: AffGProof,
}

pub(crate) struct PeerRound3 {
    pub(crate) delta: Scalar,
    pub(crate) z1_hat: Point,
    pub(crate) z2_hat: Point,
}

/// This party's chi-track commitment state.
pub(crate) struct ChiCommitment {
    pub(crate) delta: Scalar,
    pub(crate) chi: Scalar,
    pub(crate) b_hat: Scalar,
    pub(crate) z1_hat: Point,
    pub(crate) z2_hat: Point,
}

pub(crate) fn blame(error: SignError, id: &PartyId) -> Failure<SignSixProtocol> {
    Failure::attributed(SessionError::Protocol(error), alloc::vec![id.clone()])
}

fn abort(error: SignError) -> Transition<SignSixProtocol> {
    Transition::Abort(Failure::protocol(error))
}

pub(crate) fn prepare(
    rng: &mut impl CryptoRngCore,
    config: SixSignerConfig,
    pm: Pm,
) -> Result<
    (
        Box<dyn RoundHandler<SignSixProtocol>>,
        Vec<(PartyId, SixMessage)>,
    ),
    SignError,
> {
    let ctx = SixContext::build(config, pm)?;

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
        let body = SixBody::Round1(SixRound1 {
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

/// One MTA leg (as in the three-round variant).
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

    let s = crate::tools::bignum::sample_unit(rng, target_pk.modulus()).ok_or(
        SignError::Paillier(crate::paillier::PaillierError::ExceededMaxRetry),
    )?;
    let r = crate::tools::bignum::sample_unit(rng, own_pk.modulus()).ok_or(
        SignError::Paillier(crate::paillier::PaillierError::ExceededMaxRetry),
    )?;

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

pub(crate) struct Round1Handler {
    core: Core,
    acc: BTreeMap<PartyId, PeerRound1>,
}

impl RoundHandler<SignSixProtocol> for Round1Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Round1
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
        let SixBody::Round1(body) = message.body else {
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
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
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

            let body = SixBody::Round2(SixRound2 {
                cap_d: cap_d.clone(),
                cap_f,
                cap_d_hat: cap_d_hat.clone(),
                cap_f_hat,
                psi,
                psi_hat,
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

pub(crate) struct Round2Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    acc: BTreeMap<PartyId, PeerRound2>,
}

impl RoundHandler<SignSixProtocol> for Round2Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Round2
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
        let SixBody::Round2(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        let ctx = &self.core.ctx;
        let peer = ctx
            .peer(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;
        let pk = &ctx.paillier_pk;

        // The chi-track statement is public already; the delta-track proof
        // waits for the peer's Gamma (round 4).
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
                cap_d: body.cap_d,
                cap_d_hat: body.cap_d_hat,
                cap_f: body.cap_f,
                deferred_psi: body.psi,
            },
        );
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            acc,
        } = *self;
        let ctx = &core.ctx;

        let mut delta = core.own.gamma * core.own.k;
        let mut chi = ctx.bk_mul_share * core.own.k;
        for (id, received) in acc.iter() {
            let artifact = mta.get(id).expect("one artifact per peer");
            delta = delta
                + Scalar::from_bignumber(&received.alpha)
                + Scalar::from_bignumber(&artifact.beta);
            chi = chi
                + Scalar::from_bignumber(&received.alpha_hat)
                + Scalar::from_bignumber(&artifact.beta_hat);
        }

        #[cfg(test)]
        let delta = delta + ctx.tamper.delta;

        // The chi-track ElGamal commitment.
        let b_hat = Scalar::random(rng);
        let z1_hat = b_hat.mul_by_generator();
        let z2_hat = chi.mul_by_generator() + &ctx.big_y * &b_hat;

        ctx.broadcast(ctx.wrap(SixBody::Round3(SixRound3 {
            delta,
            z1_hat,
            z2_hat,
        })));

        Ok(Transition::Next(Box::new(Round3Handler {
            core,
            peers_r1,
            mta,
            peers_r2: acc,
            commitment: ChiCommitment {
                delta,
                chi,
                b_hat,
                z1_hat,
                z2_hat,
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
    commitment: ChiCommitment,
    acc: BTreeMap<PartyId, PeerRound3>,
}

impl RoundHandler<SignSixProtocol> for Round3Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Round3
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
        let SixBody::Round3(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        if self.core.ctx.peer(&from).is_none() {
            return Err(Failure::new(SessionError::PeerNotFound));
        }
        self.acc.insert(
            from,
            PeerRound3 {
                delta: body.delta,
                z1_hat: body.z1_hat,
                z2_hat: body.z2_hat,
            },
        );
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            commitment,
            acc,
        } = *self;
        let ctx = &core.ctx;

        let big_gamma_own = core.own.gamma.mul_by_generator();
        let psi_prime = EncExpProof::new(
            rng,
            &ctx.params,
            &core.own.gamma.to_bignumber(),
            &core.own.mu,
            &ctx.paillier_pk,
            &core.own.cap_g,
            &Point::GENERATOR,
            &big_gamma_own,
            &ctx.aux,
        )
        .map_err(|err| Failure::protocol(SignError::Proof(err)))?;

        ctx.broadcast(ctx.wrap(SixBody::Round4(SixRound4 {
            gamma: big_gamma_own,
            psi_prime,
        })));

        Ok(Transition::Next(Box::new(Round4Handler {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3: acc,
            commitment,
            acc: BTreeMap::new(),
        })))
    }
}

pub(crate) struct Round4Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    peers_r3: BTreeMap<PartyId, PeerRound3>,
    commitment: ChiCommitment,
    acc: BTreeMap<PartyId, Point>,
}

impl RoundHandler<SignSixProtocol> for Round4Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Round4
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
        let SixBody::Round4(body) = message.body else {
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
        let received_r2 = self
            .peers_r2
            .get(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;

        // Gamma is consistent with the round-1 ciphertext.
        body.psi_prime
            .verify(
                &ctx.params,
                &peer.paillier_pk,
                &received_r1.cap_g,
                &Point::GENERATOR,
                &body.gamma,
                &peer.aux,
            )
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        // The deferred delta-track MTA proof, now that Gamma is known.
        let statement = AffGStatement {
            pk0: &ctx.paillier_pk,
            pk1: &peer.paillier_pk,
            cap_c: &self.core.own.cap_k,
            cap_d: &received_r2.cap_d,
            cap_y: &received_r2.cap_f,
            cap_x: &body.gamma,
        };
        received_r2
            .deferred_psi
            .verify(&ctx.params, &statement, &ctx.pedersen, &peer.aux)
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        self.acc.insert(from, body.gamma);
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            commitment,
            acc,
        } = *self;
        let ctx = &core.ctx;

        let mut big_gamma = core.own.gamma.mul_by_generator();
        for gamma in acc.values() {
            big_gamma = big_gamma + *gamma;
        }
        let big_delta = &big_gamma * &core.own.k;

        // The nonce-track ElGamal commitment and its E-log proof.
        let b = Scalar::random(rng);
        let z1 = b.mul_by_generator();
        let z2 = core.own.k.mul_by_generator() + &ctx.big_y * &b;
        let statement = ElogStatement {
            cap_l: &z1,
            cap_m: &z2,
            cap_x: &ctx.big_y,
            cap_y: &big_delta,
            h: &big_gamma,
        };
        let elog = ElogProof::new(rng, &ctx.params, &b, &core.own.k, &statement, &ctx.aux)
            .map_err(|err| Failure::protocol(SignError::Proof(err)))?;

        ctx.broadcast(ctx.wrap(SixBody::Round5(SixRound5 {
            big_delta,
            z1,
            z2,
            elog,
        })));

        Ok(Transition::Next(Box::new(Round5Handler {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            peers_r4: acc,
            commitment,
            big_gamma,
            big_delta,
            acc: BTreeMap::new(),
        })))
    }
}

pub(crate) struct Round5Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    peers_r3: BTreeMap<PartyId, PeerRound3>,
    peers_r4: BTreeMap<PartyId, Point>,
    commitment: ChiCommitment,
    big_gamma: Point,
    big_delta: Point,
    acc: BTreeMap<PartyId, Point>,
}

impl RoundHandler<SignSixProtocol> for Round5Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Round5
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
        let SixBody::Round5(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        let ctx = &self.core.ctx;
        let peer = ctx
            .peer(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;

        let statement = ElogStatement {
            cap_l: &body.z1,
            cap_m: &body.z2,
            cap_x: &peer.big_y,
            cap_y: &body.big_delta,
            h: &self.big_gamma,
        };
        body.elog
            .verify(&ctx.params, &statement, &peer.aux)
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        self.acc.insert(from, body.big_delta);
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            peers_r4,
            commitment,
            big_gamma,
            big_delta,
            acc,
        } = *self;
        let ctx = &core.ctx;

        let mut delta_sum = commitment.delta;
        for round3 in peers_r3.values() {
            delta_sum = delta_sum + round3.delta;
        }
        let mut big_delta_sum = big_delta;
        for peer_big_delta in acc.values() {
            big_delta_sum = big_delta_sum + *peer_big_delta;
        }

        if delta_sum.mul_by_generator() != big_delta_sum {
            tracing::warn!("delta verification failed, entering error analysis");
            let reveal = super::err::build_err1(rng, &core, &peers_r2, &mta)
                .map_err(Failure::protocol)?;
            ctx.broadcast(ctx.wrap(SixBody::Err1(reveal)));
            return Ok(Transition::Next(Box::new(SixErr1Handler::new(
                core, peers_r1, mta, peers_r2, peers_r3, peers_r4,
            ))));
        }

        let Some(delta_inv) = delta_sum.invert() else {
            return Ok(abort(SignError::ZeroR));
        };
        let big_r = &big_gamma * &delta_inv;
        if big_r.is_identity() {
            return Ok(abort(SignError::ZeroR));
        }

        // S_i = chi_i * R, tied to the chi commitment from round 3.
        let big_s = &big_r * &commitment.chi;
        let statement = ElogStatement {
            cap_l: &commitment.z1_hat,
            cap_m: &commitment.z2_hat,
            cap_x: &ctx.big_y,
            cap_y: &big_s,
            h: &big_r,
        };
        let elog_hat = ElogProof::new(
            rng,
            &ctx.params,
            &commitment.b_hat,
            &commitment.chi,
            &statement,
            &ctx.aux,
        )
        .map_err(|err| Failure::protocol(SignError::Proof(err)))?;

        ctx.broadcast(ctx.wrap(SixBody::Round6(SixRound6 { big_s, elog_hat })));

        Ok(Transition::Next(Box::new(Round6Handler {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            commitment,
            big_r,
            big_s,
            acc: BTreeMap::new(),
        })))
    }
}

pub(crate) struct Round6Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    peers_r3: BTreeMap<PartyId, PeerRound3>,
    commitment: ChiCommitment,
    big_r: Point,
    big_s: Point,
    acc: BTreeMap<PartyId, Point>,
}

impl RoundHandler<SignSixProtocol> for Round6Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Round6
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
        let SixBody::Round6(body) = message.body else {
            return Err(Failure::new(SessionError::InvalidMessage));
        };
        let ctx = &self.core.ctx;
        let peer = ctx
            .peer(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;
        let round3 = self
            .peers_r3
            .get(&from)
            .ok_or_else(|| Failure::new(SessionError::PeerNotFound))?;

        let statement = ElogStatement {
            cap_l: &round3.z1_hat,
            cap_m: &round3.z2_hat,
            cap_x: &peer.big_y,
            cap_y: &body.big_s,
            h: &self.big_r,
        };
        body.elog_hat
            .verify(&ctx.params, &statement, &peer.aux)
            .map_err(|_| blame(SignError::VerifyFailure, &from))?;

        self.acc.insert(from, body.big_s);
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            commitment,
            big_r,
            big_s,
            acc,
        } = *self;
        let ctx = &core.ctx;

        let mut big_s_sum = big_s;
        for peer_big_s in acc.values() {
            big_s_sum = big_s_sum + *peer_big_s;
        }

        let r = big_r.x_coordinate();

        if big_s_sum != ctx.pub_key {
            // The chi shares do not recombine into the secret key: open the
            // chi track before any signature share is revealed.
            tracing::warn!("S verification failed, entering error analysis");
            let reveal = super::err::build_err2(rng, &core, &peers_r2, &mta, &commitment)
                .map_err(Failure::protocol)?;
            ctx.broadcast(ctx.wrap(SixBody::Err2(reveal)));
            return Ok(Transition::Next(Box::new(SixErr2Handler::new(
                core, peers_r1, mta, peers_r2, peers_r3, None, r,
            ))));
        }

        let sigma = core.own.k * ctx.message + r * commitment.chi;
        #[cfg(test)]
        let sigma = sigma + ctx.tamper.sigma;
        ctx.broadcast(ctx.wrap(SixBody::Round7(SixRound7 { sigma })));

        Ok(Transition::Next(Box::new(Round7Handler {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            commitment,
            r,
            sigma,
            acc: BTreeMap::new(),
        })))
    }
}

pub(crate) struct Round7Handler {
    core: Core,
    peers_r1: BTreeMap<PartyId, PeerRound1>,
    mta: BTreeMap<PartyId, MtaArtifact>,
    peers_r2: BTreeMap<PartyId, PeerRound2>,
    peers_r3: BTreeMap<PartyId, PeerRound3>,
    commitment: ChiCommitment,
    r: Scalar,
    sigma: Scalar,
    acc: BTreeMap<PartyId, Scalar>,
}

impl RoundHandler<SignSixProtocol> for Round7Handler {
    fn kind(&self) -> SixMessageKind {
        SixMessageKind::Round7
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
        let SixBody::Round7(body) = message.body else {
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
    ) -> Result<Transition<SignSixProtocol>, Failure<SignSixProtocol>> {
        let mut rng = DynRng(rng);
        let rng = &mut rng;
        let Self {
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            commitment,
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

        tracing::warn!("signature verification failed, entering error analysis");
        let reveal = super::err::build_err2(rng, &core, &peers_r2, &mta, &commitment)
            .map_err(Failure::protocol)?;
        ctx.broadcast(ctx.wrap(SixBody::Err2(reveal)));
        Ok(Transition::Next(Box::new(SixErr2Handler::new(
            core,
            peers_r1,
            mta,
            peers_r2,
            peers_r3,
            Some(acc),
            r,
        ))))
    }
}
