//! The wire messages of the six-round signing protocol.

use alloc::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use crate::curve::{Point, Scalar};
use crate::paillier::Ciphertext;
use crate::rounds::{PartyId, ProtocolMessage};
use crate::sigma::aff_g::AffGProof;
use crate::sigma::elog::ElogProof;
use crate::sigma::enc::EncProof;
use crate::sigma::enc_exp::EncExpProof;
use crate::sigma::nth_root::NthRootProof;
use crate::sigma::schnorr::SchnorrProof;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SixMessageKind {
    Round1,
    Round2,
    Round3,
    Round4,
    Round5,
    Round6,
    Round7,
    Err1,
    Err2,
}

/// Round 1: the `K` and `Gamma` ciphertexts with the range proof for `K`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixRound1 {
    pub cap_k: Ciphertext,
    pub cap_g: Ciphertext,
    pub psi: EncProof,
}

/// Round 2: the two-track MTA ciphertexts. The delta-track proof binds to
/// the `Gamma` point revealed in round 4 and is verified there.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixRound2 {
    pub cap_d: Ciphertext,
    pub cap_f: Ciphertext,
    pub cap_d_hat: Ciphertext,
    pub cap_f_hat: Ciphertext,
    pub psi: AffGProof,
    pub psi_hat: AffGProof,
}

/// Round 3: the delta share and the chi-track ElGamal commitment.
/// Echo-broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixRound3 {
    pub delta: Scalar,
    pub z1_hat: Point,
    pub z2_hat: Point,
}

/// Round 4: the `Gamma` point with its consistency proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixRound4 {
    pub gamma: Point,
    pub psi_prime: EncExpProof,
}

/// Round 5: the `Delta` point, the nonce-track ElGamal commitment and the
/// E-log proof binding them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixRound5 {
    pub big_delta: Point,
    pub z1: Point,
    pub z2: Point,
    pub elog: ElogProof,
}

/// Round 6: the `S` point with the chi-track E-log proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixRound6 {
    pub big_s: Point,
    pub elog_hat: ElogProof,
}

/// Round 7: the signature share. Echo-broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixRound7 {
    pub sigma: Scalar,
}

/// One pairwise MTA opening (as in the three-round variant): the received
/// ciphertext, its decrypted plaintext, the masked randomizer
/// `mask = r^N mod N^2` and an N-th-root proof for the mask, so every
/// verifier can check every opening.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MtaOpening {
    pub ciphertext: Ciphertext,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    pub plaintext: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub mask: BigNumber,
    pub proof: NthRootProof,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedShare(#[serde(with = "crate::tools::bignum::serde_signed")] pub BigNumber);

/// Err1: the delta-track reveal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixErr1 {
    pub k: Scalar,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub rho: BigNumber,
    pub gamma: Scalar,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub mu: BigNumber,
    pub alphas: BTreeMap<PartyId, MtaOpening>,
    pub betas: BTreeMap<PartyId, SignedShare>,
}

/// Err2: the chi-track reveal. `y_tilde = b-hat * Y` opens the chi
/// commitment (`Z2-hat - y_tilde = chi * G`); the proof shows the same
/// `b-hat` in `Z1-hat` and `y_tilde`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixErr2 {
    pub k: Scalar,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub rho: BigNumber,
    pub y_tilde: Point,
    pub dleq: SchnorrProof,
    pub alphas_hat: BTreeMap<PartyId, MtaOpening>,
    pub betas_hat: BTreeMap<PartyId, SignedShare>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SixBody {
    Round1(SixRound1),
    Round2(SixRound2),
    Round3(SixRound3),
    Round4(SixRound4),
    Round5(SixRound5),
    Round6(SixRound6),
    Round7(SixRound7),
    Err1(SixErr1),
    Err2(SixErr2),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SixMessage {
    pub from: PartyId,
    pub body: SixBody,
}

impl ProtocolMessage for SixMessage {
    type Kind = SixMessageKind;

    fn sender(&self) -> &PartyId {
        &self.from
    }

    fn kind(&self) -> SixMessageKind {
        match &self.body {
            SixBody::Round1(_) => SixMessageKind::Round1,
            SixBody::Round2(_) => SixMessageKind::Round2,
            SixBody::Round3(_) => SixMessageKind::Round3,
            SixBody::Round4(_) => SixMessageKind::Round4,
            SixBody::Round5(_) => SixMessageKind::Round5,
            SixBody::Round6(_) => SixMessageKind::Round6,
            SixBody::Round7(_) => SixMessageKind::Round7,
            SixBody::Err1(_) => SixMessageKind::Err1,
            SixBody::Err2(_) => SixMessageKind::Err2,
        }
    }
}
