//! Stage 3 contract: the rendered Markdown test plan.

use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use super::Checker;
use crate::errors::Violation;
use crate::generate::strip_code_fence;
use crate::ids::{ReqId, TcId, scan_ids, scan_malformed_ids};
use crate::plan::{ReviewArtifact, Run};

/// Section headings every plan must contain, in this order.
pub const REQUIRED_HEADINGS: &[&str] = &[
    "# QA Test Plan",
    "## Purpose",
    "## In Scope",
    "## Out of Scope",
    "## Review Decision",
];

/// Fields of the Review Decision block.
pub const REVIEW_FIELDS: &[&str] = &[
    "Plan Status",
    "Severity Overrides",
    "Ambiguities Resolved",
    "Requirements Rejected",
    "Notes",
];

static BLANK_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*]\s+)?\*\*([^*]+):\*\*\s*$").unwrap());

/// Two cell borders with nothing between them. An escaped `\|` inside a
/// value is not a border.
static BLANK_CELL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\\])\|[ \t]*\|").unwrap());

pub fn validate_review(raw: &str, run: &Run) -> Result<ReviewArtifact, Vec<Violation>> {
    let body = strip_code_fence(raw);
    let mut c = Checker::new();
    if body.is_empty() {
        c.schema("$", "document is empty");
        return Err(c.into_violations());
    }

    let lines: Vec<&str> = body.lines().collect();
    check_headings(&mut c, &lines);
    check_review_fields(&mut c, &lines);
    check_blank_fields(&mut c, &lines);
    check_references(&mut c, body, run);

    c.finish(ReviewArtifact {
        document: format!("{}\n", body),
    })
}

/// The title may carry a suffix (`# QA Test Plan: Checkout`); other
/// headings must match the whole line.
fn is_heading(line: &str, heading: &str) -> bool {
    let line = line.trim_end();
    if line == heading {
        return true;
    }
    heading == REQUIRED_HEADINGS[0]
        && line
            .strip_prefix(heading)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| !c.is_alphanumeric())
}

fn heading_line(lines: &[&str], heading: &str) -> Option<usize> {
    lines.iter().position(|l| is_heading(l, heading))
}

fn check_headings(c: &mut Checker, lines: &[&str]) {
    let mut last: Option<(usize, &str)> = None;
    for heading in REQUIRED_HEADINGS {
        let Some(line) = heading_line(lines, heading) else {
            c.schema("document", format!("missing section '{}'", heading));
            continue;
        };
        if let Some((prev_line, prev)) = last {
            if line < prev_line {
                c.schema(
                    format!("document:{}", line + 1),
                    format!("section '{}' must come after '{}'", heading, prev),
                );
                continue;
            }
        }
        last = Some((line, heading));
    }
}

fn check_review_fields(c: &mut Checker, lines: &[&str]) {
    let Some(start) = heading_line(lines, "## Review Decision") else {
        return;
    };
    let section = lines[start..].join("\n");
    for field in REVIEW_FIELDS {
        if !section.contains(&format!("**{}:**", field)) {
            c.schema(
                "document",
                format!("Review Decision is missing the '{}' field", field),
            );
        }
    }
}

fn check_blank_fields(c: &mut Checker, lines: &[&str]) {
    for (n, line) in lines.iter().enumerate() {
        if let Some(caps) = BLANK_LABEL_REGEX.captures(line) {
            c.schema(
                format!("document:{}", n + 1),
                format!("field '{}' is blank; use '—' or 'None'", &caps[1]),
            );
        } else if line.trim_start().starts_with('|') && BLANK_CELL_REGEX.is_match(line) {
            c.schema(
                format!("document:{}", n + 1),
                "table has a blank cell; use '—' or 'None'",
            );
        }
    }
}

/// ID-shaped tokens the run's own free text already contains, such as a PRD's
/// own numbering in `prd_ref`. A document reproducing them is quoting, not
/// referencing.
struct QuotedIds {
    reqs: BTreeSet<ReqId>,
    tcs: BTreeSet<TcId>,
    malformed: HashSet<String>,
}

impl QuotedIds {
    fn from_run(run: &Run) -> Self {
        let mut texts: Vec<&str> = Vec::new();
        if let Some(plan) = &run.plan_context {
            texts.push(&plan.purpose);
            texts.extend(plan.in_scope.iter().map(String::as_str));
            texts.extend(plan.out_of_scope.iter().map(String::as_str));
        }
        if let Some(ctx) = &run.project_context {
            texts.extend(ctx.primary_user_journey.as_deref());
            texts.extend(ctx.revenue_critical_paths.iter().flatten().map(String::as_str));
            texts.extend(ctx.known_high_severity_areas.iter().flatten().map(String::as_str));
        }
        for req in &run.requirements {
            texts.push(&req.prd_ref);
            texts.push(&req.description);
            texts.extend(req.actors.iter().map(String::as_str));
            texts.extend(req.ambiguity_flags.iter().map(String::as_str));
        }
        for entry in &run.risk_entries {
            texts.extend(entry.risk.as_deref());
            texts.extend(entry.severity_basis.as_deref());
            for tc in &entry.test_cases {
                texts.push(&tc.objective);
                texts.extend(tc.human_note.as_deref());
            }
        }

        let text = texts.join("\n");
        let (reqs, tcs) = scan_ids(&text);
        Self {
            reqs,
            tcs,
            malformed: scan_malformed_ids(&text).into_iter().collect(),
        }
    }
}

fn check_references(c: &mut Checker, body: &str, run: &Run) {
    let (reqs, tcs) = scan_ids(body);
    let expected_reqs = run.req_ids();
    let expected_tcs = run.committed_tc_ids();
    let quoted = QuotedIds::from_run(run);

    for missing in expected_reqs.difference(&reqs) {
        c.schema("document", format!("{} is not referenced", missing));
    }
    for missing in expected_tcs.difference(&tcs) {
        c.schema("document", format!("{} is not referenced", missing));
    }
    for unknown in reqs
        .difference(&expected_reqs)
        .filter(|id| !quoted.reqs.contains(id))
    {
        c.push(Violation::sequence(
            "document",
            format!("{} does not exist in this run", unknown),
        ));
    }
    for unknown in tcs
        .difference(&expected_tcs)
        .filter(|id| !quoted.tcs.contains(id))
    {
        c.push(Violation::sequence(
            "document",
            format!("{} does not exist in this run", unknown),
        ));
    }
    for token in scan_malformed_ids(body) {
        if quoted.malformed.contains(&token) {
            continue;
        }
        c.push(Violation::sequence(
            "document",
            format!("'{}' is not a canonical identifier", token),
        ));
    }
}
