//! Node and cluster states.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{NodeType, ParseError};

/// The state a node (or the cluster as a whole) can be in.
///
/// Variants are declared from worst to best; the derived ordering is the
/// rank used by [`crate::NodeState::above`]. Only `Up` ranks above
/// `Retired`, and every state except `Maintenance` ranks above
/// `Maintenance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Unknown,
    Maintenance,
    Down,
    Stopping,
    Initializing,
    Retired,
    Up,
}

impl State {
    /// All states, worst first.
    pub const ALL: [State; 7] = [
        State::Unknown,
        State::Maintenance,
        State::Down,
        State::Stopping,
        State::Initializing,
        State::Retired,
        State::Up,
    ];

    /// Single-letter wire form.
    pub fn letter(self) -> char {
        match self {
            State::Unknown => '-',
            State::Maintenance => 'm',
            State::Down => 'd',
            State::Stopping => 's',
            State::Initializing => 'i',
            State::Retired => 'r',
            State::Up => 'u',
        }
    }

    /// Parses the single-letter wire form.
    pub fn from_letter(letter: &str) -> Result<Self, ParseError> {
        match letter {
            "-" => Ok(State::Unknown),
            "m" => Ok(State::Maintenance),
            "d" => Ok(State::Down),
            "s" => Ok(State::Stopping),
            "i" => Ok(State::Initializing),
            "r" => Ok(State::Retired),
            "u" => Ok(State::Up),
            other => Err(ParseError::UnknownState(other.to_string())),
        }
    }

    /// Human readable name, e.g. `Retired`.
    pub fn name(self) -> &'static str {
        match self {
            State::Unknown => "Unknown",
            State::Maintenance => "Maintenance",
            State::Down => "Down",
            State::Stopping => "Stopping",
            State::Initializing => "Initializing",
            State::Retired => "Retired",
            State::Up => "Up",
        }
    }

    /// Returns true if this state's letter is in `letters`.
    ///
    /// `State::Retired.one_of("uir")` is true.
    pub fn one_of(self, letters: &str) -> bool {
        letters.contains(self.letter())
    }

    /// Whether a node of `node_type` may report this state about itself.
    pub fn valid_reported_state(self, _node_type: NodeType) -> bool {
        matches!(
            self,
            State::Down | State::Stopping | State::Initializing | State::Up
        )
    }

    /// Whether an operator may request this state for a node of `node_type`.
    pub fn valid_wanted_state(self, node_type: NodeType) -> bool {
        match node_type {
            NodeType::Storage => matches!(
                self,
                State::Up | State::Down | State::Maintenance | State::Retired
            ),
            NodeType::Distributor => matches!(self, State::Up | State::Down),
        }
    }

    /// Whether this state may appear for a node of `node_type` in a
    /// published cluster state.
    pub fn valid_in_cluster_state(self, node_type: NodeType) -> bool {
        match self {
            State::Unknown => false,
            State::Maintenance | State::Retired => node_type == NodeType::Storage,
            State::Down | State::Stopping | State::Initializing | State::Up => true,
        }
    }

    /// Whether this state is valid as the overall cluster state.
    pub fn valid_cluster_state(self) -> bool {
        matches!(self, State::Up | State::Down)
    }

    /// A wanted state may only lower a node's effective state, never raise it.
    pub fn may_set_wanted_state_for_this_node_state(self, wanted: State) -> bool {
        wanted <= self
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for State {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 1 {
            return State::from_letter(s);
        }
        State::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownState(s.to_string()))
    }
}
