use serde::{Deserialize, Serialize};

/// Represents a discrete event in a chain's execution timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineEvent {
    /// A task was invoked
    TaskEnter {
        index: usize,
        label: String,
        timestamp: u64,
    },
    /// A task settled
    TaskExit {
        index: usize,
        outcome: String, // "fulfilled" or "rejected"
        duration_ms: u64,
        timestamp: u64,
    },
    /// The chain stopped before running every task
    Halted { index: usize, timestamp: u64 },
}

impl TimelineEvent {
    pub fn timestamp(&self) -> u64 {
        match self {
            TimelineEvent::TaskEnter { timestamp, .. } => *timestamp,
            TimelineEvent::TaskExit { timestamp, .. } => *timestamp,
            TimelineEvent::Halted { timestamp, .. } => *timestamp,
        }
    }
}

/// A sequential record of one chain run, in the order events happened.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TimelineEvent) {
        self.events.push(event);
    }

    /// Indices of invoked tasks, in invocation order.
    pub fn entered(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TimelineEvent::TaskEnter { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// True when every task entry follows the exit of the task before it.
    pub fn is_sequential(&self) -> bool {
        let mut open: Option<usize> = None;
        for event in &self.events {
            match event {
                TimelineEvent::TaskEnter { index, .. } => {
                    if open.is_some() {
                        return false;
                    }
                    open = Some(*index);
                }
                TimelineEvent::TaskExit { index, .. } => {
                    if open != Some(*index) {
                        return false;
                    }
                    open = None;
                }
                TimelineEvent::Halted { .. } => {}
            }
        }
        true
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter(index: usize) -> TimelineEvent {
        TimelineEvent::TaskEnter {
            index,
            label: format!("task-{index}"),
            timestamp: 0,
        }
    }

    fn exit(index: usize) -> TimelineEvent {
        TimelineEvent::TaskExit {
            index,
            outcome: "fulfilled".to_string(),
            duration_ms: 0,
            timestamp: 0,
        }
    }

    #[test]
    fn test_sequential() {
        let mut timeline = Timeline::new();
        for event in [enter(0), exit(0), enter(1), exit(1)] {
            timeline.push(event);
        }
        assert!(timeline.is_sequential());
        assert_eq!(timeline.entered(), vec![0, 1]);
    }

    #[test]
    fn test_overlap_detected() {
        let mut timeline = Timeline::new();
        for event in [enter(0), enter(1), exit(0), exit(1)] {
            timeline.push(event);
        }
        assert!(!timeline.is_sequential());
    }
}
