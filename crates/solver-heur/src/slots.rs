use sched_core::Catalog;
use types::RequiredSlot;

/// Expands every authorization into `credit_hours` required slots, ordered by
/// descending subject priority and then by (class, subject, teacher).
/// `index` is the position in that order.
pub fn required_slots(catalog: &Catalog) -> Vec<RequiredSlot> {
    let mut out = Vec::new();
    for a in &catalog.authorizations {
        let Some(subject) = catalog.subject(a.subject) else {
            continue;
        };
        let priority = catalog.subject_priority(a.subject);
        for _ in 0..subject.credit_hours {
            out.push(RequiredSlot {
                index: 0,
                class: a.class,
                subject: a.subject,
                teacher: a.teacher,
                priority,
            });
        }
    }
    out.sort_by(|x, y| {
        y.priority
            .cmp(&x.priority)
            .then_with(|| (x.class, x.subject, x.teacher).cmp(&(y.class, y.subject, y.teacher)))
    });
    for (i, s) in out.iter_mut().enumerate() {
        s.index = i;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::config::RulesConfig;
    use sched_core::testing;
    use types::{SubjectId, TeacherId};

    #[test]
    fn expands_credit_hours_in_priority_order() {
        let (term, mut parts) = testing::small_school();
        parts.subjects.push(testing::subject(3, "Music", 1));
        parts.teachers.push(testing::teacher(3, "C"));
        parts.authorizations.push(testing::authorize(3, 3, 1, 3));
        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();

        let slots = required_slots(&cat);
        let subjects: Vec<SubjectId> = slots.iter().map(|s| s.subject).collect();
        assert_eq!(subjects, vec![SubjectId(1), SubjectId(1), SubjectId(2), SubjectId(3)]);
        assert_eq!(slots[3].priority, 5);
        assert_eq!(slots[3].teacher, TeacherId(3));
        assert!(slots.iter().enumerate().all(|(i, s)| s.index == i));
    }
}
