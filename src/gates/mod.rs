//! Derivation gates: when derived content is allowed to exist.
//!
//! Two gates sit between the risk stage and commit:
//!
//! - [`allow_exploratory`] — an exploratory test case needs a reason, either an
//!   assessed risk or an ambiguity flag on its requirement.
//! - [`severity_floor`] — product signals in the [`ProjectContext`] set a
//!   minimum severity for requirements that touch them. Floors combine by
//!   taking the maximum.
//!
//! ## Matching
//!
//! A signal phrase such as `"Order Confirmation Page"` is reduced to its
//! significant keywords (`order`, `confirmation`); generic location nouns and
//! stop words are dropped and a trailing plural `s` is folded. A requirement
//! touches the signal when all keywords appear among the tokens of its
//! description, PRD reference and actors. The primary user journey is split
//! into steps (`Browse → Cart → Checkout`) and each step is matched on its own.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::plan::{ProjectContext, Requirement, RiskEntry, Severity};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "be", "by", "for", "from", "in", "into", "is", "of", "on",
    "or", "the", "to", "via", "with",
];

const GENERIC_NOUNS: &[&str] = &[
    "area", "feature", "flow", "journey", "module", "page", "path", "process", "screen",
    "section", "step", "view",
];

/// Whether an exploratory test case may exist for this requirement.
///
/// True iff the entry carries an assessed risk or the requirement has at least
/// one ambiguity flag.
pub fn allow_exploratory(requirement: &Requirement, risk_entry: &RiskEntry) -> bool {
    risk_entry.has_risk() || requirement.is_ambiguous()
}

/// Which product signal raised a severity floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    KnownHighSeverityArea,
    RevenueCriticalPath,
    PrimaryUserJourney,
}

impl SignalSource {
    /// Minimum severity this kind of signal imposes.
    pub fn floor(&self) -> Severity {
        match self {
            Self::KnownHighSeverityArea | Self::PrimaryUserJourney => Severity::High,
            Self::RevenueCriticalPath => Severity::Medium,
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::KnownHighSeverityArea => "known high-severity area",
            Self::RevenueCriticalPath => "revenue-critical path",
            Self::PrimaryUserJourney => "primary user journey",
        };
        write!(f, "{}", s)
    }
}

/// A project-context signal the requirement touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorSignal {
    pub source: SignalSource,
    pub phrase: String,
}

impl FloorSignal {
    pub fn floor(&self) -> Severity {
        self.source.floor()
    }
}

impl fmt::Display for FloorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.source, self.phrase)
    }
}

/// Every project-context signal the requirement touches.
pub fn floor_signals(
    requirement: &Requirement,
    project_context: Option<&ProjectContext>,
) -> Vec<FloorSignal> {
    let Some(ctx) = project_context else {
        return Vec::new();
    };

    let tokens = requirement_tokens(requirement);
    let mut signals = Vec::new();

    for area in ctx.known_high_severity_areas.iter().flatten() {
        if touches(&tokens, area) {
            signals.push(FloorSignal {
                source: SignalSource::KnownHighSeverityArea,
                phrase: area.clone(),
            });
        }
    }

    for path in ctx.revenue_critical_paths.iter().flatten() {
        if touches(&tokens, path) {
            signals.push(FloorSignal {
                source: SignalSource::RevenueCriticalPath,
                phrase: path.clone(),
            });
        }
    }

    if let Some(journey) = &ctx.primary_user_journey {
        if let Some(step) = journey_steps(journey)
            .into_iter()
            .find(|step| touches(&tokens, step))
        {
            signals.push(FloorSignal {
                source: SignalSource::PrimaryUserJourney,
                phrase: step,
            });
        }
    }

    signals
}

/// Minimum severity the project context imposes on a requirement, if any.
///
/// `None` when the context is absent or no signal matches; otherwise the
/// maximum of the floors of all matching signals.
pub fn severity_floor(
    requirement: &Requirement,
    project_context: Option<&ProjectContext>,
) -> Option<Severity> {
    floor_signals(requirement, project_context)
        .iter()
        .map(FloorSignal::floor)
        .max()
}

/// Check an assigned severity against the requirement's floor.
///
/// Returns a human-readable reason when the assignment falls short. A null
/// severity never satisfies a floor.
pub fn check_severity(
    requirement: &Requirement,
    project_context: Option<&ProjectContext>,
    assigned: Option<Severity>,
) -> Result<(), String> {
    let signals = floor_signals(requirement, project_context);
    let Some(floor) = signals.iter().map(FloorSignal::floor).max() else {
        return Ok(());
    };

    if assigned.is_some_and(|s| s >= floor) {
        return Ok(());
    }

    let because = signals
        .iter()
        .filter(|s| s.floor() == floor)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let assigned = assigned.map_or("null".to_string(), |s| s.to_string());

    Err(format!(
        "severity {} for {} is below the floor {} set by {}",
        assigned, requirement.req_id, floor, because
    ))
}

/// Split a journey description into its steps.
pub fn journey_steps(journey: &str) -> Vec<String> {
    journey
        .split(['→', '>', ',', ';', '|'])
        .map(|step| step.trim().trim_end_matches(['-', '=']).trim())
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize(token: &str) -> String {
    let lower = token.to_lowercase();
    if lower.len() > 3 && lower.ends_with('s') && !lower.ends_with("ss") {
        lower[..lower.len() - 1].to_string()
    } else {
        lower
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(normalize)
}

/// Significant keywords of a signal phrase.
pub fn keywords(phrase: &str) -> Vec<String> {
    let all: Vec<String> = tokenize(phrase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect();
    let significant: Vec<String> = all
        .iter()
        .filter(|t| !GENERIC_NOUNS.contains(&t.as_str()))
        .cloned()
        .collect();

    // A phrase made only of generic nouns keeps them.
    if significant.is_empty() { all } else { significant }
}

fn requirement_tokens(requirement: &Requirement) -> HashSet<String> {
    let mut tokens: HashSet<String> = tokenize(&requirement.description).collect();
    tokens.extend(tokenize(&requirement.prd_ref));
    for actor in &requirement.actors {
        tokens.extend(tokenize(actor));
    }
    tokens
}

fn touches(tokens: &HashSet<String>, phrase: &str) -> bool {
    let keywords = keywords(phrase);
    !keywords.is_empty() && keywords.iter().all(|k| tokens.contains(k))
}
