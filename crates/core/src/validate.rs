use std::collections::{BTreeMap, HashSet};

use thiserror::Error;
use types::{Room, SchedulingConstraint, Term, TimeSlot};

use crate::error::SchedulingError;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid catalog: {0}")]
    Msg(String),
}

impl ValidationError {
    pub fn messages(&self) -> Vec<String> {
        let ValidationError::Msg(msg) = self;
        msg.split("; ")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl From<ValidationError> for SchedulingError {
    fn from(e: ValidationError) -> Self {
        SchedulingError::Validation(e.to_string())
    }
}

/// Checks the catalog invariants the optimizer relies on.
pub fn validate(
    term: &Term,
    slots: &[TimeSlot],
    rooms: &[Room],
    constraints: &[SchedulingConstraint],
) -> Result<(), ValidationError> {
    let mut errors: Vec<String> = Vec::new();

    if term.start_date > term.end_date {
        errors.push(format!(
            "term {} ends ({}) before it starts ({})",
            term.id, term.end_date, term.start_date
        ));
    }
    errors.extend(check_time_slots(slots));
    errors.extend(check_rooms(rooms));

    for c in constraints {
        if !(1..=10).contains(&c.priority) {
            errors.push(format!(
                "constraint {} has priority {} outside 1..=10",
                c.id, c.priority
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Msg(errors.join("; ")))
    }
}

pub fn check_time_slots(slots: &[TimeSlot]) -> Vec<String> {
    let mut errors = Vec::new();

    fn chk_unique<I: ToString>(name: &str, ids: impl Iterator<Item = I>, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();
        for id in ids {
            let s = id.to_string();
            if !seen.insert(s.clone()) {
                errors.push(format!("duplicate {name}: {s}"));
            }
        }
    }
    chk_unique("time slot id", slots.iter().map(|s| s.id), &mut errors);

    for s in slots {
        if s.start >= s.end {
            errors.push(format!("time slot {} starts at or after its end", s.id));
            continue;
        }
        if (s.span_minutes() - i64::from(s.duration_minutes)).abs() > 1 {
            errors.push(format!(
                "time slot {} declares {} minutes but spans {}",
                s.id,
                s.duration_minutes,
                s.span_minutes()
            ));
        }
        if s.period == 0 {
            errors.push(format!("time slot {} has period 0", s.id));
        }
    }

    let mut by_day: BTreeMap<_, Vec<&TimeSlot>> = BTreeMap::new();
    for s in slots.iter().filter(|s| s.is_active) {
        by_day.entry(s.day).or_default().push(s);
    }
    for (day, day_slots) in by_day {
        chk_unique(
            &format!("period on {day}"),
            day_slots.iter().map(|s| s.period),
            &mut errors,
        );
        let teaching: Vec<&&TimeSlot> = day_slots.iter().filter(|s| !s.is_break).collect();
        for (i, a) in teaching.iter().enumerate() {
            for b in &teaching[i + 1..] {
                if a.overlaps(b) {
                    errors.push(format!("time slots {} and {} overlap on {day}", a.id, b.id));
                }
            }
        }
    }
    errors
}

pub fn check_rooms(rooms: &[Room]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut numbers = HashSet::new();
    for r in rooms {
        if !numbers.insert(r.number.as_str()) {
            errors.push(format!("duplicate room number: {}", r.number));
        }
    }
    errors
}
