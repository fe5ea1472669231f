//! The message contract of the round engine.

use core::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::PartyId;
use crate::tools::hashing::{Chain, Transcript};

/// A protocol message: a tagged union of per-round bodies.
///
/// Implementations are enums, so a message whose body matches its tag is
/// valid by construction; [`ProtocolMessage::is_valid`] remains as the hook
/// for envelope-level checks (e.g. an embedded sender id).
pub trait ProtocolMessage: Clone + Serialize {
    /// The round tag. The derived `Ord` must list rounds in protocol order;
    /// error-analysis tags sort after all regular rounds.
    type Kind: Copy + Ord + Debug + Serialize + DeserializeOwned + Send;

    fn sender(&self) -> &PartyId;

    fn kind(&self) -> Self::Kind;

    fn is_valid(&self) -> bool {
        true
    }

    /// A domain-separated digest of the serialized message, used for echo
    /// broadcast de-duplication.
    fn digest(&self) -> [u8; 32] {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .expect("message types are serializable");
        Transcript::new_with_dst(b"message").chain_bytes(&bytes).finalize()
    }
}

/// The transport unit: either a protocol message or an echo vote about one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Envelope<M: ProtocolMessage> {
    Payload(M),
    Echo(EchoVote<M::Kind>),
}

/// A receiver's attestation of the payload it saw from `origin`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EchoVote<K> {
    pub voter: PartyId,
    pub origin: PartyId,
    pub kind: K,
    pub digest: [u8; 32],
}
