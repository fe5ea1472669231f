//! The round engine: a deterministic, message-driven state machine.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use rand_core::CryptoRngCore;

use super::echo::EchoLayer;
use super::message::{Envelope, ProtocolMessage};
use super::{EchoConfig, PartyId};

/// A round-based protocol run by the [`Engine`].
pub trait Protocol: Sized {
    type Message: ProtocolMessage;
    /// The value produced by a successful run.
    type Output;
    /// Protocol-level failure detail.
    type Error: core::fmt::Debug;
}

/// The reason a session ended up in [`SessionStatus::Failed`].
#[derive(displaydoc::Display, Debug)]
pub enum SessionError<E> {
    /// the message sender is not a known peer
    PeerNotFound,
    /// a message failed its self-check
    InvalidMessage,
    /// the session was stopped by the caller
    Stopped,
    /// a broadcast sender delivered conflicting payloads
    Equivocation,
    /// protocol failure
    Protocol(E),
}

/// A failed session: the error plus the peers it is attributed to
/// (empty when no attribution is possible).
#[derive(Debug)]
pub struct Failure<P: Protocol> {
    pub error: SessionError<P::Error>,
    pub culprits: Vec<PartyId>,
}

impl<P: Protocol> Failure<P> {
    pub fn new(error: SessionError<P::Error>) -> Self {
        Self {
            error,
            culprits: Vec::new(),
        }
    }

    pub fn protocol(error: P::Error) -> Self {
        Self::new(SessionError::Protocol(error))
    }

    pub fn attributed(error: SessionError<P::Error>, culprits: Vec<PartyId>) -> Self {
        Self { error, culprits }
    }
}

/// What a finalized round hands back to the engine.
pub enum Transition<P: Protocol> {
    /// Move on to the next round.
    Next(Box<dyn RoundHandler<P>>),
    /// The protocol reached its result.
    Complete(P::Output),
    /// Abort with an (optionally attributed) failure.
    Abort(Failure<P>),
}

/// One round of a protocol.
///
/// `handle` must tolerate duplicate deliveries (the engine consults
/// [`RoundHandler::is_handled`] first and skips them) and must fail for a
/// sender outside the peer set. Once `received` reaches `expected`, the
/// engine calls `finalize`.
pub trait RoundHandler<P: Protocol> {
    fn kind(&self) -> <P::Message as ProtocolMessage>::Kind;

    /// How many messages finalize this round (one per remote peer).
    fn expected(&self) -> usize;

    fn is_handled(&self, id: &PartyId) -> bool;

    fn received(&self) -> usize;

    fn handle(
        &mut self,
        rng: &mut dyn CryptoRngCore,
        message: P::Message,
    ) -> Result<(), Failure<P>>;

    fn finalize(self: Box<Self>, rng: &mut dyn CryptoRngCore) -> Result<Transition<P>, Failure<P>>;
}

/// The externally visible session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Done,
    Failed,
}

/// Observes session state transitions.
pub trait StateListener: Send {
    fn on_state_changed(&self, old: SessionStatus, new: SessionStatus);
}

/// A listener that ignores every transition.
pub struct NoopListener;

impl StateListener for NoopListener {
    fn on_state_changed(&self, _old: SessionStatus, _new: SessionStatus) {}
}

enum EngineState<P: Protocol> {
    Running(Box<dyn RoundHandler<P>>),
    Done(P::Output),
    Failed(Failure<P>),
    // Transient placeholder while a round is being finalized.
    Transitioning,
}

/// Drives a protocol: consumes envelopes, dispatches payloads to the
/// current round, buffers the rest.
pub struct Engine<P: Protocol> {
    state: EngineState<P>,
    queue: VecDeque<P::Message>,
    pending: BTreeMap<<P::Message as ProtocolMessage>::Kind, VecDeque<P::Message>>,
    echo: Option<EchoLayer<P>>,
    listener: Box<dyn StateListener>,
}

impl<P: Protocol> Engine<P> {
    pub fn new(
        first_round: Box<dyn RoundHandler<P>>,
        echo: Option<EchoConfig<P>>,
        listener: Box<dyn StateListener>,
    ) -> Self {
        Self {
            state: EngineState::Running(first_round),
            queue: VecDeque::new(),
            pending: BTreeMap::new(),
            echo: echo.map(EchoLayer::new),
            listener,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &self.state {
            EngineState::Running(_) | EngineState::Transitioning => SessionStatus::Running,
            EngineState::Done(_) => SessionStatus::Done,
            EngineState::Failed(_) => SessionStatus::Failed,
        }
    }

    pub fn output(&self) -> Option<&P::Output> {
        match &self.state {
            EngineState::Done(output) => Some(output),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure<P>> {
        match &self.state {
            EngineState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Transitions to `Failed`; any buffered and future messages are dropped.
    pub fn stop(&mut self) {
        if self.status() == SessionStatus::Running {
            self.fail(Failure::new(SessionError::Stopped));
        }
    }

    /// Feeds one envelope into the session. Never blocks; the current
    /// round's work (and any follow-up rounds unlocked by buffered
    /// messages) runs to completion before returning.
    pub fn push(&mut self, rng: &mut dyn CryptoRngCore, envelope: Envelope<P::Message>) {
        if self.status() != SessionStatus::Running {
            tracing::debug!("dropping message: session is not running");
            return;
        }

        match envelope {
            Envelope::Payload(message) => {
                if !message.is_valid() {
                    self.fail(Failure::attributed(
                        SessionError::InvalidMessage,
                        alloc::vec![message.sender().clone()],
                    ));
                    return;
                }
                match &mut self.echo {
                    Some(echo) if echo.covers(message.kind()) => {
                        match echo.receive_payload(message) {
                            Ok(Some(released)) => self.queue.push_back(released),
                            Ok(None) => {}
                            Err(failure) => {
                                self.fail(failure);
                                return;
                            }
                        }
                    }
                    _ => self.queue.push_back(message),
                }
            }
            Envelope::Echo(vote) => {
                let Some(echo) = &mut self.echo else {
                    tracing::debug!("dropping echo vote: no echo rounds configured");
                    return;
                };
                match echo.receive_vote(vote) {
                    Ok(Some(released)) => self.queue.push_back(released),
                    Ok(None) => {}
                    Err(failure) => {
                        self.fail(failure);
                        return;
                    }
                }
            }
        }

        self.drain(rng);
    }

    fn drain(&mut self, rng: &mut dyn CryptoRngCore) {
        while let Some(message) = self.queue.pop_front() {
            let round = match &mut self.state {
                EngineState::Running(round) => round,
                _ => return,
            };

            let kind = message.kind();
            if kind != round.kind() {
                tracing::debug!(?kind, "buffering out-of-round message");
                self.pending.entry(kind).or_default().push_back(message);
                continue;
            }

            if round.is_handled(message.sender()) {
                tracing::debug!(sender = %message.sender(), "ignoring duplicate message");
                continue;
            }

            if let Err(failure) = round.handle(rng, message) {
                self.fail(failure);
                return;
            }

            if round.received() >= round.expected() {
                self.finalize_current(rng);
            }
        }
    }

    fn finalize_current(&mut self, rng: &mut dyn CryptoRngCore) {
        let state = core::mem::replace(&mut self.state, EngineState::Transitioning);
        let round = match state {
            EngineState::Running(round) => round,
            other => {
                self.state = other;
                return;
            }
        };

        match round.finalize(rng) {
            Ok(Transition::Next(next)) => {
                let kind = next.kind();
                tracing::debug!(?kind, "advancing to the next round");
                self.state = EngineState::Running(next);
                // Monotonic progression: buffered messages from already
                // finalized rounds are dead.
                self.pending.retain(|k, _| *k >= kind);
                if let Some(buffered) = self.pending.remove(&kind) {
                    for message in buffered {
                        self.queue.push_back(message);
                    }
                }
            }
            Ok(Transition::Complete(output)) => {
                self.state = EngineState::Done(output);
                self.queue.clear();
                self.listener
                    .on_state_changed(SessionStatus::Running, SessionStatus::Done);
            }
            Ok(Transition::Abort(failure)) | Err(failure) => {
                self.state = EngineState::Failed(failure);
                self.queue.clear();
                self.listener
                    .on_state_changed(SessionStatus::Running, SessionStatus::Failed);
            }
        }
    }

    fn fail(&mut self, failure: Failure<P>) {
        tracing::warn!(error = ?failure.error, culprits = ?failure.culprits, "session failed");
        self.state = EngineState::Failed(failure);
        self.queue.clear();
        self.listener
            .on_state_changed(SessionStatus::Running, SessionStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::collections::BTreeSet;
    use alloc::vec;
    use alloc::vec::Vec;

    use rand_core::{CryptoRngCore, OsRng};
    use serde::{Deserialize, Serialize};

    use super::super::message::{Envelope, ProtocolMessage};
    use super::super::PartyId;
    use super::{
        Engine, Failure, NoopListener, Protocol, RoundHandler, SessionError, SessionStatus,
        Transition,
    };

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
    enum Kind {
        First,
        Second,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Msg {
        from: PartyId,
        kind: Kind,
        value: u64,
    }

    impl ProtocolMessage for Msg {
        type Kind = Kind;

        fn sender(&self) -> &PartyId {
            &self.from
        }

        fn kind(&self) -> Kind {
            self.kind
        }
    }

    struct Summing;

    impl Protocol for Summing {
        type Message = Msg;
        type Output = u64;
        type Error = &'static str;
    }

    struct Round {
        kind: Kind,
        peers: BTreeSet<PartyId>,
        seen: BTreeSet<PartyId>,
        total: u64,
    }

    impl RoundHandler<Summing> for Round {
        fn kind(&self) -> Kind {
            self.kind
        }

        fn expected(&self) -> usize {
            self.peers.len()
        }

        fn is_handled(&self, id: &PartyId) -> bool {
            self.seen.contains(id)
        }

        fn received(&self) -> usize {
            self.seen.len()
        }

        fn handle(
            &mut self,
            _rng: &mut dyn CryptoRngCore,
            message: Msg,
        ) -> Result<(), Failure<Summing>> {
            if !self.peers.contains(message.sender()) {
                return Err(Failure::new(SessionError::PeerNotFound));
            }
            self.seen.insert(message.sender().clone());
            self.total += message.value;
            Ok(())
        }

        fn finalize(
            self: Box<Self>,
            _rng: &mut dyn CryptoRngCore,
        ) -> Result<Transition<Summing>, Failure<Summing>> {
            match self.kind {
                Kind::First => Ok(Transition::Next(Box::new(Round {
                    kind: Kind::Second,
                    peers: self.peers,
                    seen: BTreeSet::new(),
                    total: self.total,
                }))),
                Kind::Second => Ok(Transition::Complete(self.total)),
            }
        }
    }

    fn engine_with_peers(ids: &[&str]) -> Engine<Summing> {
        let peers: BTreeSet<PartyId> = ids.iter().map(|id| PartyId::from(*id)).collect();
        Engine::new(
            Box::new(Round {
                kind: Kind::First,
                peers,
                seen: BTreeSet::new(),
                total: 0,
            }),
            None,
            Box::new(NoopListener),
        )
    }

    fn msg(from: &str, kind: Kind, value: u64) -> Envelope<Msg> {
        Envelope::Payload(Msg {
            from: PartyId::from(from),
            kind,
            value,
        })
    }

    #[test]
    fn runs_to_completion() {
        let mut engine = engine_with_peers(&["a", "b"]);

        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        engine.push(&mut OsRng, msg("b", Kind::First, 2));
        engine.push(&mut OsRng, msg("a", Kind::Second, 10));
        assert_eq!(engine.status(), SessionStatus::Running);
        engine.push(&mut OsRng, msg("b", Kind::Second, 20));

        assert_eq!(engine.status(), SessionStatus::Done);
        assert_eq!(engine.output(), Some(&33));
    }

    #[test]
    fn duplicates_are_idempotent() {
        let mut engine = engine_with_peers(&["a", "b"]);

        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        engine.push(&mut OsRng, msg("a", Kind::First, 100));
        assert_eq!(engine.status(), SessionStatus::Running);

        engine.push(&mut OsRng, msg("b", Kind::First, 2));
        engine.push(&mut OsRng, msg("a", Kind::Second, 10));
        engine.push(&mut OsRng, msg("b", Kind::Second, 20));

        // The duplicates contributed nothing.
        assert_eq!(engine.output(), Some(&33));
    }

    #[test]
    fn future_round_messages_are_buffered() {
        let mut engine = engine_with_peers(&["a", "b"]);

        // Second-round messages arrive first and wait for their round.
        engine.push(&mut OsRng, msg("b", Kind::Second, 20));
        engine.push(&mut OsRng, msg("a", Kind::Second, 10));
        assert_eq!(engine.status(), SessionStatus::Running);

        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        engine.push(&mut OsRng, msg("b", Kind::First, 2));

        assert_eq!(engine.status(), SessionStatus::Done);
        assert_eq!(engine.output(), Some(&33));
    }

    #[test]
    fn unknown_sender_fails_the_session() {
        let mut engine = engine_with_peers(&["a", "b"]);

        engine.push(&mut OsRng, msg("mallory", Kind::First, 1));
        assert_eq!(engine.status(), SessionStatus::Failed);
        assert!(matches!(
            engine.failure().unwrap().error,
            SessionError::PeerNotFound
        ));

        // Messages after the failure are dropped.
        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        assert_eq!(engine.status(), SessionStatus::Failed);
    }

    #[test]
    fn stop_discards_further_messages() {
        let mut engine = engine_with_peers(&["a", "b"]);

        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        engine.stop();
        assert_eq!(engine.status(), SessionStatus::Failed);
        assert!(matches!(
            engine.failure().unwrap().error,
            SessionError::Stopped
        ));

        engine.push(&mut OsRng, msg("b", Kind::First, 2));
        assert_eq!(engine.status(), SessionStatus::Failed);
        assert!(engine.output().is_none());
    }

    #[test]
    fn messages_for_finalized_rounds_are_discarded() {
        let mut engine = engine_with_peers(&["a", "b"]);

        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        engine.push(&mut OsRng, msg("b", Kind::First, 2));

        // The first round is over; a late first-round message sits in the
        // pending map and is dropped, not processed.
        engine.push(&mut OsRng, msg("a", Kind::First, 1000));
        engine.push(&mut OsRng, msg("a", Kind::Second, 10));
        engine.push(&mut OsRng, msg("b", Kind::Second, 20));

        assert_eq!(engine.output(), Some(&33));
    }

    #[test]
    fn late_first_round_message_never_resurfaces() {
        let mut engine = engine_with_peers(&["a", "b"]);

        engine.push(&mut OsRng, msg("a", Kind::First, 1));
        engine.push(&mut OsRng, msg("b", Kind::First, 2));
        engine.push(&mut OsRng, msg("a", Kind::Second, 10));

        let late: Vec<Envelope<Msg>> = vec![msg("b", Kind::First, 7)];
        for envelope in late {
            engine.push(&mut OsRng, envelope);
        }
        engine.push(&mut OsRng, msg("b", Kind::Second, 20));

        assert_eq!(engine.output(), Some(&33));
    }
}
