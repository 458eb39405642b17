use std::fmt;

use serde::Serialize;

use super::Worker;

/// A snapshot of a single worker's accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStats {
    pub id: usize,
    pub fatigue: f64,
    pub time_used_ns: u128,
    pub time_idle_ns: u128,
    pub busy: bool,
}

impl From<&Worker> for WorkerStats {
    fn from(worker: &Worker) -> Self {
        Self {
            id: worker.id(),
            fatigue: worker.fatigue(),
            time_used_ns: worker.time_used().as_nanos(),
            time_idle_ns: worker.time_idle().as_nanos(),
            busy: worker.is_busy(),
        }
    }
}

/// Per-worker statistics of a pool plus its fairness value.
///
/// The fairness is the population variance of the workers' fatigue multipliers. Those are
/// fixed when the pool is built, so it doesn't move with the actual load distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerReport {
    pub workers: Vec<WorkerStats>,
    pub fairness: f64,
}

impl WorkerReport {
    /// Creates a new `WorkerReport`.
    ///
    /// # Arguments
    /// * `workers` - The statistics of every worker in the pool.
    pub fn new(workers: Vec<WorkerStats>) -> Self {
        let fairness = variance(workers.iter().map(|w| w.fatigue));
        Self { workers, fairness }
    }
}

impl fmt::Display for WorkerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stats in &self.workers {
            writeln!(f, "Worker {}:", stats.id)?;
            writeln!(f, "\tFatigue: {}", stats.fatigue)?;
            writeln!(f, "\tTime Used (ns): {}", stats.time_used_ns)?;
            writeln!(f, "\tTime Idle (ns): {}", stats.time_idle_ns)?;
            writeln!(f, "\tIs Busy: {}", stats.busy)?;
        }

        write!(f, "Fairness: {}", self.fairness)
    }
}

fn variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count();

    if n == 0 {
        return 0.;
    }

    let mean = values.clone().sum::<f64>() / n as f64;
    values.map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(id: usize, fatigue: f64) -> WorkerStats {
        WorkerStats {
            id,
            fatigue,
            time_used_ns: 0,
            time_idle_ns: 0,
            busy: false,
        }
    }

    #[test]
    fn test_fairness_is_fatigue_variance() {
        let report = WorkerReport::new(vec![stats(0, 0.5), stats(1, 1.0), stats(2, 1.5)]);
        assert!((report.fairness - 1. / 6.).abs() < 1e-12);
    }

    #[test]
    fn test_equal_fatigues_are_perfectly_fair() {
        let report = WorkerReport::new(vec![stats(0, 0.8), stats(1, 0.8)]);
        assert_eq!(report.fairness, 0.);
        assert_eq!(WorkerReport::new(Vec::new()).fairness, 0.);
    }

    #[test]
    fn test_display() {
        let report = WorkerReport::new(vec![stats(0, 1.0), stats(1, 1.0)]);
        let text = report.to_string();

        assert!(text.contains("Worker 0:"));
        assert!(text.contains("Worker 1:"));
        assert!(text.contains("Fatigue: 1"));
        assert!(text.contains("Is Busy: false"));
        assert!(text.ends_with("Fairness: 0"));
    }
}
