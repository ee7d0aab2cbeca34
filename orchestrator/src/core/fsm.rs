//! Table-driven phase transitions shared by every protocol.
//!
//! Each protocol (main algorithm, TDD, decompose, scaffold-docs) declares a
//! static successor table. [`transition`] is the only gate: a pair that is not
//! in the table is rejected and the caller must leave its state untouched.

use std::fmt;

/// A protocol with a fixed legal-transition table.
pub trait Protocol {
    type Phase: Copy + Eq + fmt::Debug + 'static;

    /// Short protocol name used in error messages.
    const NAME: &'static str;

    /// Every phase of the protocol, in declaration order.
    fn phases() -> &'static [Self::Phase];

    /// Legal successors of `phase`.
    fn successors(phase: Self::Phase) -> &'static [Self::Phase];

    /// Stable display label for `phase`.
    fn label(phase: Self::Phase) -> &'static str;

    /// True if no transition leaves `phase`.
    fn is_terminal(phase: Self::Phase) -> bool {
        Self::successors(phase).is_empty()
    }
}

/// Illegal transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub protocol: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal {} transition {} -> {}",
            self.protocol, self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

/// Failure to mutate a protocol state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The requested pair is not in the transition table.
    Transition(TransitionError),
    /// The state reached its terminal phase; no further mutation is allowed.
    Terminal { protocol: &'static str, id: String },
    /// The loop-back counter already reached its bound.
    LoopBackLimit { protocol: &'static str, max: u32 },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Transition(err) => write!(f, "{err}"),
            StateError::Terminal { protocol, id } => {
                write!(f, "{protocol} state {id} is terminal; no further changes allowed")
            }
            StateError::LoopBackLimit { protocol, max } => {
                write!(f, "{protocol} loop-back limit reached (max {max} iterations)")
            }
        }
    }
}

impl std::error::Error for StateError {}

impl From<TransitionError> for StateError {
    fn from(err: TransitionError) -> Self {
        StateError::Transition(err)
    }
}

/// True if `from -> to` is in the table of `P`.
pub fn is_allowed<P: Protocol>(from: P::Phase, to: P::Phase) -> bool {
    P::successors(from).contains(&to)
}

/// Validate `from -> to` against the table of `P`.
pub fn transition<P: Protocol>(from: P::Phase, to: P::Phase) -> Result<(), TransitionError> {
    if is_allowed::<P>(from, to) {
        return Ok(());
    }
    Err(TransitionError {
        protocol: P::NAME,
        from: P::label(from),
        to: P::label(to),
    })
}

/// Every `(from, to)` pair absent from the table of `P`, including self-loops.
pub fn illegal_pairs<P: Protocol>() -> Vec<(P::Phase, P::Phase)> {
    let mut pairs = Vec::new();
    for &from in P::phases() {
        for &to in P::phases() {
            if !is_allowed::<P>(from, to) {
                pairs.push((from, to));
            }
        }
    }
    pairs
}
