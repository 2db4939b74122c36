//! Subject priority table and name-derived room preferences.
//!
//! Both match on substrings of the lowercased subject name. The order of the
//! tables matters: "physical education" must not be read as physics and
//! "computer science" must not be read as a science.

use types::RoomType;

pub const DEFAULT_PRIORITY: u8 = 5;

const PRIORITY_TABLE: &[(&str, u8)] = &[
    ("physical", 4),
    ("sport", 4),
    ("computer", 6),
    ("informatics", 6),
    ("math", 9),
    ("english", 9),
    ("science", 8),
    ("physics", 8),
    ("chemistry", 8),
    ("biology", 8),
    ("history", 7),
    ("geography", 7),
    ("social", 7),
    ("art", 5),
    ("music", 5),
];

/// Scheduling priority of a subject, 1..=10, higher first.
pub fn subject_priority(name: &str) -> u8 {
    let lower = name.to_lowercase();
    PRIORITY_TABLE
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|&(_, p)| p)
        .unwrap_or(DEFAULT_PRIORITY)
}

const ROOM_TABLE: &[(&str, &[RoomType])] = &[
    ("physical", &[RoomType::Gymnasium, RoomType::Outdoor]),
    ("computer", &[RoomType::ComputerLab, RoomType::Classroom]),
    ("science", &[RoomType::Laboratory, RoomType::Classroom]),
    ("physics", &[RoomType::Laboratory, RoomType::Classroom]),
    ("chemistry", &[RoomType::Laboratory, RoomType::Classroom]),
    ("biology", &[RoomType::Laboratory, RoomType::Classroom]),
    ("music", &[RoomType::MusicRoom, RoomType::Classroom]),
    ("art", &[RoomType::ArtRoom, RoomType::Classroom]),
];

/// Room types a subject is conventionally taught in, judged by its name.
/// `None` means the plain classroom default.
pub fn conventional_room_types(name: &str) -> Option<&'static [RoomType]> {
    let lower = name.to_lowercase();
    ROOM_TABLE
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|&(_, types)| types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_follow_the_table() {
        assert_eq!(subject_priority("Mathematics"), 9);
        assert_eq!(subject_priority("Math"), 9);
        assert_eq!(subject_priority("English Literature"), 9);
        assert_eq!(subject_priority("Physics"), 8);
        assert_eq!(subject_priority("History"), 7);
        assert_eq!(subject_priority("Computer Science"), 6);
        assert_eq!(subject_priority("Music"), 5);
        assert_eq!(subject_priority("Physical Education"), 4);
        assert_eq!(subject_priority("Latin"), DEFAULT_PRIORITY);
    }

    #[test]
    fn room_defaults_by_name() {
        assert_eq!(
            conventional_room_types("Physical Education"),
            Some(&[RoomType::Gymnasium, RoomType::Outdoor][..])
        );
        assert_eq!(
            conventional_room_types("Computer Science").map(|t| t[0]),
            Some(RoomType::ComputerLab)
        );
        assert_eq!(conventional_room_types("Math"), None);
    }
}
