//! The message-driven round engine and its peer abstraction.
//!
//! A protocol is a chain of round handlers; the engine feeds each inbound
//! message to the current handler in arrival order, buffers messages for
//! future rounds, and advances when the handler has heard from every peer.
//! Selected broadcast rounds are wrapped in an echo protocol that protects
//! receivers against an equivocating sender.

pub mod echo;
pub mod engine;
pub mod message;
pub mod peer;

pub use echo::EchoConfig;
pub use engine::{
    Engine, Failure, NoopListener, Protocol, RoundHandler, SessionError, SessionStatus,
    StateListener, Transition,
};
pub use message::{Envelope, EchoVote, ProtocolMessage};
pub use peer::{broadcast, PeerManager};

use alloc::string::String;

use serde::{Deserialize, Serialize};

use crate::tools::hashing::{Chain, Hashable};

/// A party identifier: an opaque string agreed on by all participants.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Hashable for PartyId {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self.0.as_bytes())
    }
}
