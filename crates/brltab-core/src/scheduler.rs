// Brltab Alarm Scheduler
// The timer seam between the translator and its host event loop

use std::time::Duration;

/// Opaque handle for a scheduled alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmHandle(u64);

impl AlarmHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Which translator alarm a scheduled callback is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmKind {
    /// A chord has been held long enough for its secondary command.
    LongPress,
    /// Keys have been logically pressed for too long; releases were
    /// probably lost.
    Autorelease,
}

/// Single-threaded alarm scheduling.
///
/// The host loop owns the clock. When an alarm comes due it calls
/// [`crate::table::KeyTable::handle_alarm`] on the same logical thread, so
/// no callback ever re-enters the table concurrently. Scheduling a new
/// alarm never implies cancelling an old one; the translator cancels
/// explicitly.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, kind: AlarmKind) -> AlarmHandle;
    fn cancel(&mut self, handle: AlarmHandle);
}

/// A scheduler driven by hand: alarms are recorded and fired explicitly.
/// Used by the tests and by the CLI (which never lets time pass).
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_handle: u64,
    pending: Vec<(AlarmHandle, Duration, AlarmKind)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[(AlarmHandle, Duration, AlarmKind)] {
        &self.pending
    }

    /// The earliest pending alarm of `kind`, if any.
    pub fn pending_of(&self, kind: AlarmKind) -> Option<(AlarmHandle, Duration)> {
        self.pending
            .iter()
            .filter(|entry| entry.2 == kind)
            .min_by_key(|entry| entry.1)
            .map(|entry| (entry.0, entry.1))
    }

    /// Remove and return the earliest pending alarm of `kind`, as a host
    /// loop would before delivering it.
    pub fn fire(&mut self, kind: AlarmKind) -> Option<AlarmHandle> {
        let (handle, _) = self.pending_of(kind)?;
        self.pending.retain(|entry| entry.0 != handle);
        Some(handle)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, kind: AlarmKind) -> AlarmHandle {
        self.next_handle += 1;
        let handle = AlarmHandle(self.next_handle);
        self.pending.push((handle, delay, kind));
        handle
    }

    fn cancel(&mut self, handle: AlarmHandle) {
        self.pending.retain(|entry| entry.0 != handle);
    }
}
