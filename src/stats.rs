//! Run statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Collects counters and phase timings.
///
/// Created when `--stats` is passed, threaded as `Option<&mut Stats>`.
/// Zero cost when `None`: no timing calls, no counter increments.
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    // Excitation
    pub operating_points: u32,
    pub dft_evaluations: u32,
    pub harmonics_retained: u32,
    pub cache_hits: u32,
    pub import_hits: u32,
    // Oracle
    pub oracle_calls: u32,
    pub oracle_failures: u32,
    // Prescreen
    pub fallback_scores: u32,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            operating_points: 0,
            dft_evaluations: 0,
            harmonics_retained: 0,
            cache_hits: 0,
            import_hits: 0,
            oracle_calls: 0,
            oracle_failures: 0,
            fallback_scores: 0,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== magexcite run stats ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        if self.operating_points > 0 {
            eprintln!("  Operating points:       {}", self.operating_points);
            eprintln!("  DFT evaluations:        {}", self.dft_evaluations);
            if self.harmonics_retained > 0 {
                let avg = self.harmonics_retained as f64 / self.operating_points as f64;
                eprintln!("  Harmonics per point:    {:.1}", avg);
            }
        }

        if self.cache_hits > 0 || self.import_hits > 0 {
            eprintln!("  Artifact reuse:         cache={}  import={}", self.cache_hits, self.import_hits);
        }

        if self.oracle_calls > 0 {
            eprintln!("  Oracle calls:           {}  (failed {})", self.oracle_calls, self.oracle_failures);
        }

        if self.fallback_scores > 0 {
            eprintln!("  Fallback scores:        {}", self.fallback_scores);
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}
