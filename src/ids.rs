//! Requirement and test-case identifiers, and the run-scoped sequencer.
//!
//! IDs are `REQ-###` / `TC-###`: a prefix, a dash, and a number zero-padded to
//! at least three digits. Past 999 the width grows (`TC-1000`) instead of
//! wrapping. Only the canonical spelling parses, so `REQ-0001` is rejected.
//!
//! Both sequences are scoped to a run and persisted in the run record
//! (`req_counter`, `tc_counter`), so a retried stage continues from the last
//! committed value. TC numbering runs across the whole run, never per
//! requirement.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::errors::Violation;
use crate::plan::Run;

static ID_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:REQ|TC)-\d{3,}\b").unwrap());

/// Error returned when a string is not a canonical sequence ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub expected_prefix: &'static str,
    pub input: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not a valid {}-### identifier",
            self.input, self.expected_prefix
        )
    }
}

impl std::error::Error for ParseIdError {}

/// A prefixed, zero-padded, run-scoped sequence number.
pub trait SequenceId: Copy + Ord + fmt::Display {
    const PREFIX: &'static str;

    fn from_number(number: u32) -> Self;

    fn number(&self) -> u32;
}

fn parse_sequence_number(prefix: &'static str, input: &str) -> Result<u32, ParseIdError> {
    let err = || ParseIdError {
        expected_prefix: prefix,
        input: input.to_string(),
    };

    let digits = input
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(err)?;

    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    // Wider than three digits is only canonical without leading zeros.
    if digits.len() > 3 && digits.starts_with('0') {
        return Err(err());
    }

    digits.parse::<u32>().map_err(|_| err())
}

macro_rules! sequence_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(number: u32) -> Self {
                Self(number)
            }
        }

        impl SequenceId for $name {
            const PREFIX: &'static str = $prefix;

            fn from_number(number: u32) -> Self {
                Self(number)
            }

            fn number(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{:03}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_sequence_number($prefix, s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

sequence_id!(
    /// Requirement identifier, `REQ-###`.
    ReqId,
    "REQ"
);

sequence_id!(
    /// Test case identifier, `TC-###`, unique across the whole run.
    TcId,
    "TC"
);

/// Next requirement ID the run would assign.
pub fn next_req_id(run: &Run) -> ReqId {
    ReqId::new(run.req_counter + 1)
}

/// Next test case ID the run would assign.
pub fn next_tc_id(run: &Run) -> TcId {
    TcId::new(run.tc_counter + 1)
}

/// Verify candidate IDs against the run's sequence contract.
///
/// `ids` are `(path, id)` pairs in document order. Every ID must be greater
/// than the committed `counter`, must not collide with a `committed` ID, and
/// must be strictly greater than the ID before it.
pub fn verify_sequence<T: SequenceId>(
    ids: &[(String, T)],
    counter: u32,
    committed: &BTreeSet<T>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut previous: Option<T> = None;

    for (path, id) in ids {
        if committed.contains(id) {
            violations.push(Violation::sequence(
                path,
                format!("{} collides with an already-committed ID in this run", id),
            ));
        } else if id.number() <= counter {
            violations.push(Violation::sequence(
                path,
                format!(
                    "{} does not continue the run's sequence; next available is {}",
                    id,
                    T::from_number(counter + 1)
                ),
            ));
        }

        if let Some(prev) = previous {
            if *id == prev {
                violations.push(Violation::sequence(path, format!("duplicate ID {}", id)));
            } else if *id < prev {
                violations.push(Violation::sequence(
                    path,
                    format!("{} is out of order after {}", id, prev),
                ));
            }
        }
        previous = Some(previous.map_or(*id, |prev| prev.max(*id)));
    }

    violations
}

/// All canonical REQ/TC identifiers referenced in free text.
pub fn scan_ids(text: &str) -> (BTreeSet<ReqId>, BTreeSet<TcId>) {
    let mut reqs = BTreeSet::new();
    let mut tcs = BTreeSet::new();

    for token in ID_TOKEN_REGEX.find_iter(text) {
        let token = token.as_str();
        if let Ok(id) = token.parse::<ReqId>() {
            reqs.insert(id);
        } else if let Ok(id) = token.parse::<TcId>() {
            tcs.insert(id);
        }
    }

    (reqs, tcs)
}

/// Tokens that look like IDs but are not canonical (e.g. `TC-0001`).
pub fn scan_malformed_ids(text: &str) -> Vec<String> {
    ID_TOKEN_REGEX
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|t| t.parse::<ReqId>().is_err() && t.parse::<TcId>().is_err())
        .map(str::to_string)
        .collect()
}
