//! Input validation for issue statuses, types and priorities.
//!
//! Three-tier resolution: exact match, then synonym lookup, then an
//! `InvalidArgument` error carrying the closest suggestion.
//!
//! Also owns the mapping between the current status vocabulary and the
//! one used by legacy `tasks` tables.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::error::{Error, Result};

// ── Valid value sets ─────────────────────────────────────────

/// Statuses in display order. These are also the stats buckets.
pub const STATUSES: [&str; 6] = ["backlog", "open", "in_progress", "blocked", "closed", "deferred"];

pub static VALID_STATUSES: LazyLock<HashSet<&str>> =
    LazyLock::new(|| STATUSES.into_iter().collect());

pub static VALID_TYPES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["task", "bug", "feature", "epic", "chore"]
        .into_iter()
        .collect()
});

// ── Synonym maps ─────────────────────────────────────────────

pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("done", "closed"),
        ("complete", "closed"),
        ("completed", "closed"),
        ("finished", "closed"),
        ("resolved", "closed"),
        ("wip", "in_progress"),
        ("working", "in_progress"),
        ("started", "in_progress"),
        ("new", "open"),
        ("todo", "open"),
        ("pending", "open"),
        ("waiting", "blocked"),
        ("hold", "deferred"),
        ("later", "deferred"),
        ("postponed", "deferred"),
    ]
    .into_iter()
    .collect()
});

pub static TYPE_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("story", "feature"),
        ("enhancement", "feature"),
        ("improvement", "feature"),
        ("defect", "bug"),
        ("problem", "bug"),
        ("ticket", "task"),
        ("item", "task"),
        ("cleanup", "chore"),
        ("refactor", "chore"),
        ("maintenance", "chore"),
        ("initiative", "epic"),
    ]
    .into_iter()
    .collect()
});

/// SaveContext priorities: 0=lowest, 4=critical.
pub static PRIORITY_SYNONYMS: LazyLock<HashMap<&str, i32>> = LazyLock::new(|| {
    [
        ("critical", 4),
        ("urgent", 4),
        ("highest", 4),
        ("high", 3),
        ("important", 3),
        ("medium", 2),
        ("normal", 2),
        ("default", 2),
        ("low", 1),
        ("minor", 1),
        ("lowest", 0),
        ("trivial", 0),
    ]
    .into_iter()
    .collect()
});

fn invalid(kind: &str, input: &str, suggestion: Option<String>) -> Error {
    match suggestion {
        Some(s) => Error::InvalidArgument(format!("Unknown {kind} '{input}'. Did you mean '{s}'?")),
        None => Error::InvalidArgument(format!("Unknown {kind} '{input}'")),
    }
}

/// Normalize a status string via exact match or synonym lookup.
///
/// # Errors
///
/// Returns `InvalidArgument` with the closest suggestion if nothing matches.
pub fn normalize_status(input: &str) -> Result<String> {
    let lower = input.trim().to_lowercase();

    if VALID_STATUSES.contains(lower.as_str()) {
        return Ok(lower);
    }
    if let Some(&canonical) = STATUS_SYNONYMS.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    let suggestion = find_closest_match(&lower, &VALID_STATUSES, &STATUS_SYNONYMS);
    Err(invalid("status", input, suggestion))
}

/// Normalize an issue type string via exact match or synonym lookup.
///
/// # Errors
///
/// Returns `InvalidArgument` with the closest suggestion if nothing matches.
pub fn normalize_type(input: &str) -> Result<String> {
    let lower = input.trim().to_lowercase();

    if VALID_TYPES.contains(lower.as_str()) {
        return Ok(lower);
    }
    if let Some(&canonical) = TYPE_SYNONYMS.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    let suggestion = find_closest_match(&lower, &VALID_TYPES, &TYPE_SYNONYMS);
    Err(invalid("type", input, suggestion))
}

/// Normalize a priority from `0`-`4`, `P0`-`P4`, or a synonym.
///
/// # Errors
///
/// Returns `InvalidArgument` if the value is out of range or unrecognized.
pub fn normalize_priority(input: &str) -> Result<i32> {
    let lower = input.trim().to_lowercase();
    let digits = lower.strip_prefix('p').unwrap_or(&lower);

    if let Ok(n) = digits.parse::<i32>() {
        if (0..=4).contains(&n) {
            return Ok(n);
        }
        return Err(Error::InvalidArgument(format!(
            "Invalid priority '{input}': must be 0-4"
        )));
    }

    PRIORITY_SYNONYMS
        .get(lower.as_str())
        .copied()
        .ok_or_else(|| Error::InvalidArgument(format!("Invalid priority '{input}'")))
}

/// Find the closest matching value across the valid set and synonyms.
///
/// Ties go to canonical values over synonyms, then alphabetical order.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut canonical: Vec<&str> = valid.iter().copied().collect();
    canonical.sort_unstable();
    let mut aliases: Vec<&str> = synonyms.keys().copied().collect();
    aliases.sort_unstable();

    let mut best: Option<(&str, usize)> = None;

    for v in canonical.into_iter().chain(aliases) {
        let dist = levenshtein_distance(input, v);
        if dist > 3 || best.is_some_and(|(_, d)| d <= dist) {
            continue;
        }
        // Synonyms suggest what they map to
        best = Some((synonyms.get(v).copied().unwrap_or(v), dist));
    }

    best.map(|(v, _)| v.to_string())
}

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// ── Legacy vocabulary ────────────────────────────────────────

/// Stored `tasks.status` value for a current-vocabulary status.
#[must_use]
pub fn to_legacy_status(status: &str) -> &str {
    match status {
        "open" | "backlog" => "todo",
        "closed" => "done",
        other => other,
    }
}

/// Stored `tasks.status` values that read back as `status`.
#[must_use]
pub fn legacy_status_aliases(status: &str) -> Vec<&str> {
    match status {
        "open" => vec!["open", "todo", "pending"],
        "closed" => vec!["closed", "done"],
        other => vec![other],
    }
}

/// SQL expression that maps a legacy status column into the current vocabulary.
#[must_use]
pub fn legacy_status_sql(column: &str) -> String {
    format!(
        "CASE {column} WHEN 'todo' THEN 'open' WHEN 'pending' THEN 'open' WHEN 'done' THEN 'closed' ELSE {column} END"
    )
}

/// Clean a label list: trim, drop empties, remove duplicates keeping first order.
#[must_use]
pub fn clean_labels<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.to_string()))
        .map(ToString::to_string)
        .collect()
}
