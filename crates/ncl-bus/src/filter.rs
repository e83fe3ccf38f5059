use ncl_types::{ConsentUpdated, SubjectId};

/// Filter for subscribing to a subset of consent updates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// If set, only updates for these subjects are delivered.
    pub subjects: Option<Vec<SubjectId>>,
    /// If set, only updates with a greater sequence are delivered.
    pub after_sequence: Option<u64>,
}

impl EventFilter {
    /// Matches every update.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn subject(subject: SubjectId) -> Self {
        Self {
            subjects: Some(vec![subject]),
            after_sequence: None,
        }
    }

    pub fn after(mut self, sequence: u64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    /// Returns `true` if the update matches this filter.
    pub fn matches(&self, event: &ConsentUpdated) -> bool {
        if let Some(ref subjects) = self.subjects {
            if !subjects.contains(&event.subject) {
                return false;
            }
        }
        if let Some(after) = self.after_sequence {
            if event.sequence <= after {
                return false;
            }
        }
        true
    }
}
