//! Cooperative task scheduler.
//!
//! The scheduler does not run anything by itself. It tracks when each task
//! is due; [`Client::update`](crate::Client::update) asks it for the due
//! tasks, runs them in registration order and reports back. Both execution
//! modes share that single step, so timing is identical whether the client
//! is driven by tokio or polled by the host.

use crate::error::{ClientError, ClientResult};
use std::time::Duration;

/// Interval growth applied after every run of a task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Growth factor.
    pub multiplier: f64,
    /// Upper bound for the interval.
    pub max_interval: Duration,
}

impl Backoff {
    /// Creates a backoff.
    pub fn new(multiplier: f64, max_interval: Duration) -> Self {
        Self {
            multiplier,
            max_interval,
        }
    }

    /// Returns the interval following `interval`.
    pub fn apply(&self, interval: Duration) -> Duration {
        let grown = interval.as_secs_f64() * self.multiplier.max(0.0);
        if grown >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(grown)
        }
    }
}

/// What a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Hooks of the property with the task's name.
    Property,
    /// Connection attempt.
    Connect,
    /// Discovery or push, depending on the protocol state.
    Sync,
}

/// Result of running a task once.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Run again after the interval.
    Continue,
    /// The task finished its job and is removed.
    Done,
    /// The task failed and is removed.
    Failed(ClientError),
}

impl TaskOutcome {
    /// Folds a step result into an outcome.
    pub fn from_result(result: ClientResult<TaskOutcome>) -> Self {
        result.unwrap_or_else(TaskOutcome::Failed)
    }
}

/// A scheduled task.
#[derive(Debug, Clone)]
pub struct Task {
    name: String,
    kind: TaskKind,
    interval: Duration,
    backoff: Option<Backoff>,
    next_due: Option<Duration>,
    runs: u64,
}

impl Task {
    /// Creates a task that is due immediately.
    pub fn new(name: impl Into<String>, kind: TaskKind, interval: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            interval,
            backoff: None,
            next_due: None,
            runs: 0,
        }
    }

    /// Grows the interval after every run.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task kind.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Delay before the next run once the current one completes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of completed runs.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Returns true if the task should run at `now`.
    pub fn is_due(&self, now: Duration) -> bool {
        self.next_due.map_or(true, |due| now >= due)
    }

    fn complete_run(&mut self, now: Duration) {
        self.next_due = Some(now + self.interval);
        if let Some(backoff) = self.backoff {
            self.interval = backoff.apply(self.interval);
        }
        self.runs += 1;
    }
}

/// Ordered set of tasks.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task. Names must be unique.
    pub fn add(&mut self, task: Task) -> ClientResult<()> {
        if self.contains(task.name()) {
            return Err(ClientError::DuplicateProperty(task.name));
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Adds a task unless one with the same name exists. Returns true if
    /// the task was added.
    pub fn add_if_absent(&mut self, task: Task) -> bool {
        if self.contains(task.name()) {
            return false;
        }
        self.tasks.push(task);
        true
    }

    /// Removes a task.
    pub fn remove(&mut self, name: &str) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.name == name)?;
        Some(self.tasks.remove(index))
    }

    /// Returns true if a task with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name == name)
    }

    /// Looks up a task.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is scheduled.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Names and kinds of the tasks due at `now`, in registration order.
    pub fn due(&self, now: Duration) -> Vec<(String, TaskKind)> {
        self.tasks
            .iter()
            .filter(|t| t.is_due(now))
            .map(|t| (t.name.clone(), t.kind))
            .collect()
    }

    /// Records a completed run of a task.
    pub fn complete_run(&mut self, name: &str, now: Duration) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.name == name) {
            task.complete_run(now);
        }
    }

    /// Time until the earliest task is due, or `None` with no tasks.
    pub fn next_wakeup(&self, now: Duration) -> Option<Duration> {
        self.tasks
            .iter()
            .map(|t| t.next_due.map_or(Duration::ZERO, |due| due.saturating_sub(now)))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn new_tasks_are_due_immediately() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add(Task::new("a", TaskKind::Property, ms(250)))
            .unwrap();
        scheduler
            .add(Task::new("b", TaskKind::Property, ms(1000)))
            .unwrap();

        let due = scheduler.due(Duration::ZERO);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].0, "a");
        assert_eq!(due[1].0, "b");
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.add(Task::new("a", TaskKind::Sync, ms(1))).unwrap();
        assert!(matches!(
            scheduler.add(Task::new("a", TaskKind::Property, ms(1))),
            Err(ClientError::DuplicateProperty(_))
        ));
        assert!(!scheduler.add_if_absent(Task::new("a", TaskKind::Connect, ms(1))));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn run_sets_next_due() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add(Task::new("a", TaskKind::Property, ms(250)))
            .unwrap();

        scheduler.complete_run("a", ms(0));
        assert!(scheduler.due(ms(249)).is_empty());
        assert_eq!(scheduler.due(ms(250)).len(), 1);
        assert_eq!(scheduler.next_wakeup(ms(100)), Some(ms(150)));
        assert_eq!(scheduler.get("a").unwrap().runs(), 1);
    }

    #[test]
    fn backoff_grows_interval_up_to_cap() {
        let backoff = Backoff::new(2.0, ms(500));
        let mut scheduler = Scheduler::new();
        scheduler
            .add(Task::new("a", TaskKind::Connect, ms(100)).with_backoff(backoff))
            .unwrap();

        let mut intervals = Vec::new();
        for _ in 0..4 {
            scheduler.complete_run("a", Duration::ZERO);
            intervals.push(scheduler.get("a").unwrap().interval());
        }
        assert_eq!(intervals, vec![ms(200), ms(400), ms(500), ms(500)]);
    }

    #[test]
    fn remove_and_wakeup() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.next_wakeup(Duration::ZERO), None);

        scheduler.add(Task::new("a", TaskKind::Sync, ms(10))).unwrap();
        assert_eq!(scheduler.next_wakeup(ms(5)), Some(Duration::ZERO));
        assert!(scheduler.remove("a").is_some());
        assert!(scheduler.remove("a").is_none());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn outcome_from_result() {
        assert!(matches!(
            TaskOutcome::from_result(Ok(TaskOutcome::Done)),
            TaskOutcome::Done
        ));
        assert!(matches!(
            TaskOutcome::from_result(Err(ClientError::EmptyIdentity)),
            TaskOutcome::Failed(ClientError::EmptyIdentity)
        ));
    }
}
