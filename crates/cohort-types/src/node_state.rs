//! Per-node state with its optional attributes and textual encoding.

use std::fmt::{self, Display, Write as _};

use serde::{Deserialize, Serialize};

use crate::{NodeType, ParseError, State};

/// Default number of bits a node uses for bucket distribution.
pub const DEFAULT_MIN_USED_BITS: u32 = 16;

/// Init progress below this value means the node is still listing buckets.
///
/// Two initializing states are only similar if both are on the same side of
/// this limit.
pub const LISTING_BUCKETS_INIT_PROGRESS_LIMIT: f64 = 0.01;

const CAPACITY_EPSILON: f64 = 1e-9;

/// State of a single node plus its optional attributes.
///
/// Values are immutable in use: the `with_*` builders consume and return a
/// new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    state: State,
    description: String,
    capacity: f64,
    reliability: u16,
    init_progress: f64,
    min_used_bits: u32,
    start_timestamp: u64,
}

impl NodeState {
    pub fn new(state: State) -> Self {
        Self {
            state,
            description: String::new(),
            capacity: 1.0,
            reliability: 1,
            init_progress: 0.0,
            min_used_bits: DEFAULT_MIN_USED_BITS,
            start_timestamp: 0,
        }
    }

    pub fn up() -> Self {
        Self::new(State::Up)
    }

    pub fn down() -> Self {
        Self::new(State::Down)
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_reliability(mut self, reliability: u16) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_init_progress(mut self, init_progress: f64) -> Self {
        self.init_progress = init_progress;
        self
    }

    pub fn with_min_used_bits(mut self, bits: u32) -> Self {
        self.min_used_bits = bits;
        self
    }

    pub fn with_start_timestamp(mut self, timestamp: u64) -> Self {
        self.start_timestamp = timestamp;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn reliability(&self) -> u16 {
        self.reliability
    }

    pub fn init_progress(&self) -> f64 {
        self.init_progress
    }

    pub fn min_used_bits(&self) -> u32 {
        self.min_used_bits
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    /// Rank comparison on the state alone.
    pub fn above(&self, other: &NodeState) -> bool {
        self.state > other.state
    }

    /// Structural similarity used to decide whether a state change is worth
    /// publishing.
    ///
    /// Ignores description and min-used-bits. For `Initializing` nodes the
    /// exact progress is ignored as long as both are on the same side of
    /// [`LISTING_BUCKETS_INIT_PROGRESS_LIMIT`].
    pub fn similar_to(&self, other: &NodeState) -> bool {
        self.similar_to_impl(other, true)
    }

    /// As [`similar_to`](Self::similar_to), ignoring init progress entirely.
    pub fn similar_to_ignoring_init_progress(&self, other: &NodeState) -> bool {
        self.similar_to_impl(other, false)
    }

    fn similar_to_impl(&self, other: &NodeState, consider_init_progress: bool) -> bool {
        if self.state != other.state {
            return false;
        }
        if (self.capacity - other.capacity).abs() > CAPACITY_EPSILON {
            return false;
        }
        if self.start_timestamp != other.start_timestamp {
            return false;
        }
        if consider_init_progress && self.state == State::Initializing {
            let listing = self.init_progress < LISTING_BUCKETS_INIT_PROGRESS_LIMIT;
            let other_listing = other.init_progress < LISTING_BUCKETS_INIT_PROGRESS_LIMIT;
            if listing != other_listing {
                return false;
            }
        }
        true
    }

    /// Checks that this state may be published for a node of `node_type`.
    pub fn verify_valid_in_cluster_state(&self, node_type: NodeType) -> Result<(), ParseError> {
        if !self.state.valid_in_cluster_state(node_type) {
            return Err(ParseError::NotValidHere(format!(
                "state {} is not valid for {node_type} nodes in a cluster state",
                self.state
            )));
        }
        if node_type == NodeType::Distributor && !capacity_is_default(self.capacity) {
            return Err(ParseError::NotValidHere(format!(
                "capacity {} set on a distributor node",
                self.capacity
            )));
        }
        Ok(())
    }

    /// The attributes a cluster state carries for a node of `node_type`.
    ///
    /// Min-used-bits is reset, init progress is kept only while
    /// `Initializing`, and distributors keep neither reliability nor
    /// capacity. A state passed through this encodes and decodes unchanged
    /// inside a cluster state.
    #[must_use]
    pub fn published_form(mut self, node_type: NodeType) -> Self {
        self.min_used_bits = DEFAULT_MIN_USED_BITS;
        if self.state != State::Initializing {
            self.init_progress = 0.0;
        }
        if node_type == NodeType::Distributor {
            self.reliability = 1;
            self.capacity = 1.0;
        }
        self
    }

    /// Serializes the non-default attributes.
    ///
    /// With `index` set, every key is prefixed `.<index>.` as used inside a
    /// cluster state; min-used-bits is then omitted and the description only
    /// written when `verbose`. Use [`published_form`](Self::published_form)
    /// first so nothing is lost in that mode.
    pub fn serialize(&self, index: Option<u16>, verbose: bool) -> String {
        let prefix = index.map_or_else(String::new, |i| format!(".{i}."));
        let mut parts: Vec<String> = Vec::new();

        if self.state != State::Up {
            parts.push(format!("{prefix}s:{}", self.state.letter()));
        }
        if self.reliability != 1 {
            parts.push(format!("{prefix}r:{}", self.reliability));
        }
        if !capacity_is_default(self.capacity) {
            parts.push(format!("{prefix}c:{}", self.capacity));
        }
        if self.state == State::Initializing {
            parts.push(format!("{prefix}i:{}", self.init_progress));
        }
        if self.start_timestamp != 0 {
            parts.push(format!("{prefix}t:{}", self.start_timestamp));
        }
        if index.is_none() && self.min_used_bits != DEFAULT_MIN_USED_BITS {
            parts.push(format!("{prefix}b:{}", self.min_used_bits));
        }
        if (verbose || index.is_none()) && !self.description.is_empty() {
            parts.push(format!("{prefix}m:{}", escape(&self.description)));
        }
        parts.join(" ")
    }

    /// Parses the standalone (unprefixed) encoding.
    ///
    /// Unknown keys are ignored. Capacity, reliability and disk keys are only
    /// read for storage nodes.
    pub fn deserialize(node_type: NodeType, serialized: &str) -> Result<Self, ParseError> {
        let mut node_state = NodeState::up();
        for token in serialized.split(' ').filter(|t| !t.is_empty()) {
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| ParseError::MissingColon(token.to_string()))?;
            node_state.apply_key(node_type, key, value)?;
        }
        Ok(node_state)
    }

    /// Applies one decoded `key:value` attribute. Shared with the cluster
    /// state parser.
    pub(crate) fn apply_key(
        &mut self,
        node_type: NodeType,
        key: &str,
        value: &str,
    ) -> Result<(), ParseError> {
        let storage = node_type == NodeType::Storage;
        match key {
            "s" => self.state = State::from_letter(value)?,
            "b" => self.min_used_bits = parse_value(key, value)?,
            "c" if storage => self.capacity = parse_value(key, value)?,
            "r" if storage => self.reliability = parse_value(key, value)?,
            "i" => self.init_progress = parse_value(key, value)?,
            "t" => self.start_timestamp = parse_value(key, value)?,
            "m" => self.description = unescape(value)?,
            "d" if storage => {
                let _disks: u32 = parse_value(key, value)?;
            }
            _ if storage && key.starts_with("d.") => {
                return Err(ParseError::DiskStatesUnsupported(key.to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    /// Human readable difference, e.g. `Maintenance => Up, capacity: 1.2 => 1`.
    pub fn textual_difference(&self, other: &NodeState) -> String {
        let mut parts = Vec::new();
        if self.state != other.state {
            parts.push(format!("{} => {}", self.state, other.state));
        }
        if (self.capacity - other.capacity).abs() > CAPACITY_EPSILON {
            parts.push(format!("capacity: {} => {}", self.capacity, other.capacity));
        }
        if self.reliability != other.reliability {
            parts.push(format!(
                "reliability: {} => {}",
                self.reliability, other.reliability
            ));
        }
        if self.state == State::Initializing
            && other.state == State::Initializing
            && self.init_progress != other.init_progress
        {
            parts.push(format!(
                "init progress: {} => {}",
                self.init_progress, other.init_progress
            ));
        }
        if self.min_used_bits != other.min_used_bits {
            parts.push(format!(
                "minUsedBits: {} => {}",
                self.min_used_bits, other.min_used_bits
            ));
        }
        if self.start_timestamp != other.start_timestamp {
            parts.push(format!(
                "startTimestamp: {} => {}",
                self.start_timestamp, other.start_timestamp
            ));
        }
        if self.description != other.description {
            parts.push(format!(
                "description: {} => {}",
                self.description, other.description
            ));
        }
        if parts.is_empty() {
            "no change".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::up()
    }
}

impl Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if !capacity_is_default(self.capacity) {
            write!(f, ", capacity {}", self.capacity)?;
        }
        if self.state == State::Initializing {
            write!(f, ", init progress {}", self.init_progress)?;
        }
        if self.start_timestamp != 0 {
            write!(f, ", start timestamp {}", self.start_timestamp)?;
        }
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

fn capacity_is_default(capacity: f64) -> bool {
    (capacity - 1.0).abs() <= CAPACITY_EPSILON
}

pub(crate) fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Escapes a description so it fits in a single space-separated token.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            ' ' => out.push_str("\\x20"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`escape`].
pub fn unescape(text: &str) -> Result<String, ParseError> {
    let invalid = || ParseError::InvalidEscape(text.to_string());
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next().ok_or_else(invalid)? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'f' => out.push('\x0c'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 {
                    return Err(invalid());
                }
                let code = u8::from_str_radix(&hex, 16).map_err(|_| invalid())?;
                out.push(char::from(code));
            }
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}
