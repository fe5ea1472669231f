//! The wire messages of the three-round signing protocol.

use alloc::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unknown_order::BigNumber;

use crate::curve::{Point, Scalar};
use crate::paillier::Ciphertext;
use crate::rounds::{PartyId, ProtocolMessage};
use crate::sigma::aff_g::AffGProof;
use crate::sigma::enc::EncProof;
use crate::sigma::log_star::LogStarProof;
use crate::sigma::nth_root::NthRootProof;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignMessageKind {
    Round1,
    Round2,
    Round3,
    Round4,
    Err1,
    Err2,
}

/// Round 1: the `K` and `Gamma` ciphertexts with the range proof for `K`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound1 {
    pub cap_k: Ciphertext,
    pub cap_g: Ciphertext,
    pub psi: EncProof,
}

/// Round 2: the two-track MTA ciphertexts with their proofs and the
/// `Gamma` point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound2 {
    pub cap_d: Ciphertext,
    pub cap_f: Ciphertext,
    pub cap_d_hat: Ciphertext,
    pub cap_f_hat: Ciphertext,
    pub psi: AffGProof,
    pub psi_hat: AffGProof,
    pub psi_prime: LogStarProof,
    pub gamma: Point,
}

/// Round 3: the delta share, the `Delta` point and the nonce consistency
/// proof. Echo-broadcast: every receiver must see the same payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound3 {
    pub delta: Scalar,
    pub big_delta: Point,
    pub psi_double_prime: LogStarProof,
}

/// Round 4: the signature share.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound4 {
    pub sigma: Scalar,
}

/// One pairwise MTA opening in an error-analysis message.
///
/// The `D` ciphertexts travel point-to-point, so the opening republishes
/// the ciphertext itself together with the decrypted plaintext, the masked
/// randomizer `mask = r^N mod N^2`, and an N-th-root proof for the mask:
/// `ciphertext = (1 + N)^plaintext * mask` with `mask` an N-th power pins
/// the plaintext as the true decryption, so every verifier can check every
/// opening, and the counterpart additionally matches the ciphertext against
/// the one it actually sent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MtaOpening {
    pub ciphertext: Ciphertext,
    #[serde(with = "crate::tools::bignum::serde_signed")]
    pub plaintext: BigNumber,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub mask: BigNumber,
    pub proof: NthRootProof,
}

/// Err1: the delta-track reveal. Opens `K` and `Gamma`, every received
/// MTA ciphertext and every mask handed out on the delta track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignErr1 {
    pub k: Scalar,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub rho: BigNumber,
    pub gamma: Scalar,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub mu: BigNumber,
    pub alphas: BTreeMap<PartyId, MtaOpening>,
    pub betas: BTreeMap<PartyId, SignedShare>,
}

/// Err2: the chi-track reveal, mirroring [`SignErr1`] over the hat
/// ciphertexts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignErr2 {
    pub k: Scalar,
    #[serde(with = "crate::tools::bignum::serde_unsigned")]
    pub rho: BigNumber,
    pub alphas_hat: BTreeMap<PartyId, MtaOpening>,
    pub betas_hat: BTreeMap<PartyId, SignedShare>,
}

/// A signed multi-precision wire value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedShare(#[serde(with = "crate::tools::bignum::serde_signed")] pub BigNumber);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SignBody {
    Round1(SignRound1),
    Round2(SignRound2),
    Round3(SignRound3),
    Round4(SignRound4),
    Err1(SignErr1),
    Err2(SignErr2),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignMessage {
    pub from: PartyId,
    pub body: SignBody,
}

impl ProtocolMessage for SignMessage {
    type Kind = SignMessageKind;

    fn sender(&self) -> &PartyId {
        &self.from
    }

    fn kind(&self) -> SignMessageKind {
        match &self.body {
            SignBody::Round1(_) => SignMessageKind::Round1,
            SignBody::Round2(_) => SignMessageKind::Round2,
            SignBody::Round3(_) => SignMessageKind::Round3,
            SignBody::Round4(_) => SignMessageKind::Round4,
            SignBody::Err1(_) => SignMessageKind::Err1,
            SignBody::Err2(_) => SignMessageKind::Err2,
        }
    }
}
