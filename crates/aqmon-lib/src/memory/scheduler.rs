//! Cancellable job scheduler driven by an external clock
//!
//! The scheduler never sleeps; callers ask which jobs are due at a given
//! instant. The async driver sleeps until [`JobScheduler::next_deadline`],
//! tests simply advance a manual clock.

use std::time::{Duration, Instant};

/// Handle for cancelling a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

#[derive(Debug)]
struct ScheduledJob<J> {
    id: JobId,
    job: J,
    due: Instant,
    every: Option<Duration>,
}

/// Ordered set of one-shot and periodic jobs
#[derive(Debug)]
pub struct JobScheduler<J> {
    jobs: Vec<ScheduledJob<J>>,
    next_id: u64,
}

impl<J: Clone> JobScheduler<J> {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 0,
        }
    }

    fn push(&mut self, job: J, due: Instant, every: Option<Duration>) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.jobs.push(ScheduledJob {
            id,
            job,
            due,
            every,
        });
        id
    }

    /// Run `job` every `interval`, first at `now + interval`
    pub fn every(&mut self, job: J, interval: Duration, now: Instant) -> JobId {
        let interval = interval.max(Duration::from_millis(1));
        self.push(job, now + interval, Some(interval))
    }

    /// Run `job` once at `now + delay`
    pub fn once(&mut self, job: J, delay: Duration, now: Instant) -> JobId {
        self.push(job, now + delay, None)
    }

    /// Cancel one job; returns whether it was still scheduled
    pub fn cancel(&mut self, id: JobId) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.id != id);
        self.jobs.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.jobs.clear();
    }

    pub fn is_scheduled(&self, id: JobId) -> bool {
        self.jobs.iter().any(|j| j.id == id)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.jobs.iter().map(|j| j.due).min()
    }

    /// Pop every job due at `now`, in deadline order
    ///
    /// Periodic jobs fire once per call even if several periods were
    /// missed, then move to their next deadline after `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<J> {
        let mut due: Vec<(Instant, JobId, J)> = self
            .jobs
            .iter()
            .filter(|j| j.due <= now)
            .map(|j| (j.due, j.id, j.job.clone()))
            .collect();
        due.sort_by_key(|(at, id, _)| (*at, id.0));

        self.jobs.retain_mut(|j| {
            if j.due > now {
                return true;
            }
            match j.every {
                Some(interval) => {
                    while j.due <= now {
                        j.due += interval;
                    }
                    true
                }
                None => false,
            }
        });

        due.into_iter().map(|(_, _, job)| job).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<J: Clone> Default for JobScheduler<J> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Job {
        Tick,
        Sweep,
        Once,
    }

    #[test]
    fn test_periodic_jobs_fire_in_order() {
        let start = Instant::now();
        let mut scheduler = JobScheduler::new();
        scheduler.every(Job::Tick, Duration::from_secs(10), start);
        scheduler.every(Job::Sweep, Duration::from_secs(30), start);

        assert!(scheduler.take_due(start + Duration::from_secs(5)).is_empty());
        assert_eq!(scheduler.take_due(start + Duration::from_secs(10)), vec![Job::Tick]);
        assert_eq!(scheduler.take_due(start + Duration::from_secs(20)), vec![Job::Tick]);
        assert_eq!(
            scheduler.take_due(start + Duration::from_secs(30)),
            vec![Job::Tick, Job::Sweep]
        );
        assert_eq!(scheduler.next_deadline(), Some(start + Duration::from_secs(40)));
    }

    #[test]
    fn test_missed_periods_fire_once() {
        let start = Instant::now();
        let mut scheduler = JobScheduler::new();
        scheduler.every(Job::Tick, Duration::from_secs(10), start);

        assert_eq!(scheduler.take_due(start + Duration::from_secs(55)), vec![Job::Tick]);
        assert_eq!(scheduler.next_deadline(), Some(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_one_shot_and_cancel() {
        let start = Instant::now();
        let mut scheduler = JobScheduler::new();
        let once = scheduler.once(Job::Once, Duration::from_secs(3), start);
        let tick = scheduler.every(Job::Tick, Duration::from_secs(10), start);

        assert!(scheduler.is_scheduled(once));
        assert_eq!(scheduler.take_due(start + Duration::from_secs(3)), vec![Job::Once]);
        assert!(!scheduler.is_scheduled(once));

        assert!(scheduler.cancel(tick));
        assert!(!scheduler.cancel(tick));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_cancel_all() {
        let start = Instant::now();
        let mut scheduler = JobScheduler::new();
        scheduler.every(Job::Tick, Duration::from_secs(10), start);
        scheduler.once(Job::Once, Duration::from_secs(1), start);

        scheduler.cancel_all();

        assert_eq!(scheduler.len(), 0);
        assert!(scheduler.take_due(start + Duration::from_secs(100)).is_empty());
    }
}
