use std::fmt;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use parking_lot::Mutex;

/// The operations the load driver probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    AddingBooks,
    AddingUsers,
    LoanBook,
    ReturnBook,
    UpdateBook,
    ReleasingLoans,
    RemovingBooks,
    RemovingUsers,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 8] = [
        ProbeKind::AddingBooks,
        ProbeKind::AddingUsers,
        ProbeKind::LoanBook,
        ProbeKind::ReturnBook,
        ProbeKind::UpdateBook,
        ProbeKind::ReleasingLoans,
        ProbeKind::RemovingBooks,
        ProbeKind::RemovingUsers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProbeKind::AddingBooks => "AddingBooks",
            ProbeKind::AddingUsers => "AddingUsers",
            ProbeKind::LoanBook => "LoanBook",
            ProbeKind::ReturnBook => "ReturnBook",
            ProbeKind::UpdateBook => "UpdateBook",
            ProbeKind::ReleasingLoans => "ReleasingLoans",
            ProbeKind::RemovingBooks => "RemovingBooks",
            ProbeKind::RemovingUsers => "RemovingUsers",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    pub passed: u64,
    pub failed: u64,
}

impl ProbeStats {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }
}

/// Pass/fail counters shared by all workers of a run.
#[derive(Default)]
pub(crate) struct ProbeCounters {
    stats: Mutex<HashMap<ProbeKind, ProbeStats>>,
}

impl ProbeCounters {
    pub(crate) fn record(&self, kind: ProbeKind, passed: bool) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(kind).or_default();
        if passed {
            entry.passed += 1;
        } else {
            entry.failed += 1;
        }
    }

    pub(crate) fn snapshot(&self) -> HashMap<ProbeKind, ProbeStats> {
        self.stats.lock().clone()
    }
}

/// Outcome of a completed load run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub probes: HashMap<ProbeKind, ProbeStats>,
    pub books_seeded: usize,
    pub users_seeded: usize,
    /// Book/user pairs whose loan fields and loaned sets disagreed when the
    /// workers finished.
    pub link_violations: Vec<String>,
    /// Loans still outstanding when the workers finished, returned before cleanup.
    pub loans_released: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn stats(&self, kind: ProbeKind) -> ProbeStats {
        self.probes.get(&kind).copied().unwrap_or_default()
    }

    pub fn total_failures(&self) -> u64 {
        self.probes.values().map(|stats| stats.failed).sum()
    }

    pub fn is_consistent(&self) -> bool {
        self.link_violations.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "seeded {} books and {} users in {:.1?}",
            self.books_seeded, self.users_seeded, self.elapsed
        )?;
        for kind in ProbeKind::ALL {
            let stats = self.stats(kind);
            if stats.total() > 0 {
                writeln!(f, "  {:<15} passed {:>6}  failed {:>6}", kind, stats.passed, stats.failed)?;
            }
        }
        write!(
            f,
            "  loans released {}, link violations {}",
            self.loans_released,
            self.link_violations.len()
        )
    }
}
