//! Minimal training logger.
//!
//! Silent by default; `Info` prints one line per applied update, `Debug`
//! additionally narrates term generation. Output goes to stderr so
//! metric streams on stdout stay clean.

/// How chatty training should be.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    #[default]
    Silent,
    Info,
    Debug,
}

/// Per-handle logger.
#[derive(Clone, Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn round_metric(&self, round: u64, metric_name: &str, value: f64) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("[round {round}] validation-{metric_name}: {value:.6}");
        }
    }

    pub fn term_update(&self, term: usize, gain: f64, n_leaves: usize) {
        if self.verbosity >= Verbosity::Debug {
            eprintln!("  term {term}: gain {gain:.6e}, {n_leaves} leaves");
        }
    }
}
