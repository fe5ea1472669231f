//! Threshold ECDSA signing based on the CGGMP'21 scheme
//! ("UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable Aborts"),
//! over the secp256k1 curve.
//!
//! The building blocks are:
//! - the Paillier additively-homomorphic cryptosystem ([`paillier`]);
//! - ring-Pedersen commitment parameters ([`pedersen`]);
//! - a suite of non-interactive sigma protocols ([`sigma`]);
//! - a message-driven round engine with echo broadcast ([`rounds`]);
//! - the three-round ([`sign`]) and six-round ([`sign_six`]) signing
//!   protocols with identifiable aborts.
//!
//! Network transport is out of scope: callers plug in a
//! [`rounds::PeerManager`] over a reliable, authenticated, ordered channel
//! per peer pair, and feed inbound messages to the session.

extern crate alloc;

pub mod curve;
pub mod paillier;
pub mod pedersen;
pub mod rounds;
pub mod sigma;
pub mod sign;
pub mod sign_six;
pub(crate) mod tools;

pub use curve::{Point, Scalar, Signature};
pub use rounds::{PartyId, PeerManager, SessionStatus, StateListener};
pub use tools::birkhoff::BkParameter;
