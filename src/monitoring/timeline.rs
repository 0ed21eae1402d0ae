//! Execution Timeline
//!
//! Tracks job start/end times across the stages of a run for the
//! summary report and Gantt chart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventType {
    /// Job dispatched
    Started,
    /// Job reported success
    Completed,
    /// Job failed, timed out or was cancelled
    Failed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Name of the job (script)
    pub job_name: String,
    /// Index of the enabled stage the job belongs to
    pub stage: usize,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: Instant,
}

/// Tracks the execution timeline of a workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a job.
    pub fn add_event(&mut self, job_name: impl Into<String>, stage: usize, event_type: EventType) {
        self.events.push(TimelineEvent {
            job_name: job_name.into(),
            stage,
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Names of the jobs that started, in dispatch order.
    pub fn dispatch_order(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|event| event.event_type == EventType::Started)
            .map(|event| event.job_name.as_str())
            .collect()
    }

    /// Generates an ASCII Gantt chart, one bar per finished job.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.start_time.elapsed().as_millis();
        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        let mut rows: Vec<(String, usize, u128, u128)> = self
            .spans()
            .into_iter()
            .map(|((job, stage), (start, end))| (job, stage, start, end))
            .collect();
        rows.sort_by_key(|(_, stage, start, _)| (*stage, *start));

        for (job, stage, start, end) in rows {
            let start_pos = (start as f64 * scale) as usize;
            let width = ((end - start) as f64 * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&"#".repeat(width));

            output.push_str(&format!(
                "S{:<2} {:16} |{:<51}| ({} ms)\n",
                stage,
                truncate(&job, 16),
                bar,
                end - start
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns job durations in milliseconds.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        self.spans()
            .into_iter()
            .map(|((job, _), (start, end))| (job, end - start))
            .collect()
    }

    /// Start and end offsets (ms) of every job that finished.
    fn spans(&self) -> HashMap<(String, usize), (u128, u128)> {
        let mut starts: HashMap<(String, usize), u128> = HashMap::new();
        let mut spans = HashMap::new();

        for event in &self.events {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();
            let key = (event.job_name.clone(), event.stage);

            match event.event_type {
                EventType::Started => {
                    starts.insert(key, elapsed);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(&key) {
                        spans.insert(key, (*start, elapsed));
                    }
                }
            }
        }

        spans
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a string to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_add_events() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("load_a.sql", 0, EventType::Started);
        timeline.add_event("load_a.sql", 0, EventType::Completed);

        assert_eq!(timeline.get_events().len(), 2);
        assert_eq!(timeline.get_events()[1].event_type, EventType::Completed);
    }

    #[test]
    fn test_get_durations() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("load_a.sql", 0, EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("load_a.sql", 0, EventType::Failed);

        let durations = timeline.get_durations();
        assert!(*durations.get("load_a.sql").unwrap() >= 30);
    }

    #[test]
    fn test_unfinished_job_has_no_duration() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("hanging.sql", 1, EventType::Started);
        assert!(timeline.get_durations().is_empty());
    }

    #[test]
    fn test_dispatch_order() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a", 0, EventType::Started);
        timeline.add_event("b", 0, EventType::Started);
        timeline.add_event("a", 0, EventType::Completed);
        timeline.add_event("c", 1, EventType::Started);

        assert_eq!(timeline.dispatch_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_gantt_chart_generation() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("load_customers", 0, EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event("load_customers", 0, EventType::Completed);
        timeline.add_event("build_facts", 1, EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event("build_facts", 1, EventType::Failed);

        let chart = timeline.gantt_chart();
        assert!(chart.contains("load_customers"));
        assert!(chart.contains("build_facts"));
        assert!(chart.contains("S1"));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_truncate_long_names() {
        assert_eq!(truncate("abc", 5), "abc  ");
        assert_eq!(truncate("a_very_long_script_name.sql", 10), "a_very_...");
    }
}
