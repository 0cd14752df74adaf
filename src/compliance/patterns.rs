//! Heuristic detection of suspicious access patterns

use chrono::{Duration, FixedOffset, Timelike};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::configuration::PatternThresholds;
use crate::models::{AuditLogEntry, PatternKind, SecuritySeverity, SuspiciousPattern};

/// Flag per-actor anomalies in a window of audit entries.
///
/// Results are ordered by actor id, off-hours before rapid access.
pub fn detect_suspicious_patterns(
    logs: &[AuditLogEntry],
    thresholds: &PatternThresholds,
) -> Vec<SuspiciousPattern> {
    let mut by_actor: BTreeMap<&str, Vec<&AuditLogEntry>> = BTreeMap::new();
    for entry in logs {
        by_actor.entry(entry.actor_id.as_str()).or_default().push(entry);
    }

    let mut patterns = Vec::new();
    for (actor_id, mut entries) in by_actor {
        entries.sort_by_key(|e| e.timestamp);

        if let Some(pattern) = off_hours_access(actor_id, &entries, thresholds) {
            patterns.push(pattern);
        }
        if let Some(pattern) = rapid_patient_access(actor_id, &entries, thresholds) {
            patterns.push(pattern);
        }
    }

    if !patterns.is_empty() {
        tracing::debug!(count = patterns.len(), "Suspicious access patterns detected");
    }
    patterns
}

fn is_off_hours(entry: &AuditLogEntry, offset: &FixedOffset, thresholds: &PatternThresholds) -> bool {
    let hour = entry.timestamp.with_timezone(offset).hour();
    hour < thresholds.off_hours_before || hour > thresholds.off_hours_after
}

fn off_hours_access(
    actor_id: &str,
    entries: &[&AuditLogEntry],
    thresholds: &PatternThresholds,
) -> Option<SuspiciousPattern> {
    let offset = FixedOffset::east_opt(thresholds.utc_offset_minutes * 60)
        .or_else(|| FixedOffset::east_opt(0))?;

    let off_hours: Vec<&&AuditLogEntry> = entries
        .iter()
        .filter(|e| is_off_hours(e, &offset, thresholds))
        .collect();
    let count = off_hours.len() as u64;
    if count <= thresholds.off_hours_max_entries {
        return None;
    }

    let first = off_hours.first()?;
    let last = off_hours.last()?;
    Some(SuspiciousPattern {
        kind: PatternKind::OffHoursAccess,
        actor_id: actor_id.to_string(),
        count,
        first_seen: first.timestamp,
        last_seen: last.timestamp,
        severity: SecuritySeverity::Medium,
        description: format!(
            "{} accesses outside {:02}:00-{:02}:59 local time",
            count, thresholds.off_hours_before, thresholds.off_hours_after
        ),
    })
}

/// Distinct patients touched by one actor in a short span.
///
/// By default every patient access the actor made counts, and the span runs
/// from the first to the last of them. With `rapid_access_sliding_window`
/// the busiest window anywhere in the period is used instead.
fn rapid_patient_access(
    actor_id: &str,
    entries: &[&AuditLogEntry],
    thresholds: &PatternThresholds,
) -> Option<SuspiciousPattern> {
    let window = Duration::try_minutes(thresholds.rapid_access_window_minutes).unwrap_or(Duration::MAX);
    let touches: Vec<(&AuditLogEntry, &str)> = entries
        .iter()
        .filter_map(|e| e.patient_id.as_deref().map(|p| (*e, p)))
        .collect();

    let (distinct, first, last) = if thresholds.rapid_access_sliding_window {
        busiest_window(&touches, window)?
    } else {
        let distinct = touches.iter().map(|(_, p)| *p).collect::<HashSet<_>>().len();
        let last = touches.len().checked_sub(1)?;
        if touches[last].0.timestamp - touches[0].0.timestamp > window {
            return None;
        }
        (distinct, 0, last)
    };
    if (distinct as u64) <= thresholds.rapid_access_max_patients {
        return None;
    }

    let first_seen = touches[first].0.timestamp;
    let last_seen = touches[last].0.timestamp;
    Some(SuspiciousPattern {
        kind: PatternKind::RapidPatientAccess,
        actor_id: actor_id.to_string(),
        count: distinct as u64,
        first_seen,
        last_seen,
        severity: SecuritySeverity::High,
        description: format!(
            "{} distinct patients accessed within {} minutes",
            distinct,
            (last_seen - first_seen).num_minutes()
        ),
    })
}

/// (distinct patients, first index, last index) of the window holding the
/// most distinct patients
fn busiest_window(touches: &[(&AuditLogEntry, &str)], window: Duration) -> Option<(usize, usize, usize)> {
    let mut in_window: HashMap<&str, usize> = HashMap::new();
    let mut start = 0;
    let mut busiest: Option<(usize, usize, usize)> = None;

    for (end, (entry, patient)) in touches.iter().enumerate() {
        *in_window.entry(*patient).or_insert(0) += 1;

        while entry.timestamp - touches[start].0.timestamp > window {
            let leaving = touches[start].1;
            if let Some(n) = in_window.get_mut(leaving) {
                *n -= 1;
                if *n == 0 {
                    in_window.remove(leaving);
                }
            }
            start += 1;
        }

        let distinct = in_window.len();
        if busiest.map(|(best, _, _)| distinct > best).unwrap_or(true) {
            busiest = Some((distinct, start, end));
        }
    }
    busiest
}
