// Navigation gate - single-flight navigation permit plus drop-if-busy guards
use crate::error::NavError;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

/// Result of a guarded gesture that may be abandoned when its guard is held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Gated<T> {
    Ran(T),
    Skipped,
}

impl<T> Gated<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Gated::Skipped)
    }

    pub fn ran(self) -> Option<T> {
        match self {
            Gated::Ran(value) => Some(value),
            Gated::Skipped => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardKind {
    Autocomplete,
    BreadcrumbLayout,
    /// Parent, back and forward share one guard.
    Step,
    DropTarget,
}

/// Single-bit lock. A contender gives up instead of waiting.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    busy: AtomicBool,
}

impl ReentrancyGuard {
    pub fn try_enter(&self) -> Option<GuardTicket<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardTicket { flag: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds a guard; releases it on drop, whatever path the holder exits by.
#[derive(Debug)]
pub struct GuardTicket<'a> {
    flag: &'a AtomicBool,
}

impl Drop for GuardTicket<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct NavigationGate {
    permit: Semaphore,
    autocomplete: ReentrancyGuard,
    breadcrumb_layout: ReentrancyGuard,
    step: ReentrancyGuard,
    drop_target: ReentrancyGuard,
}

impl Default for NavigationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationGate {
    pub fn new() -> Self {
        Self {
            permit: Semaphore::new(1),
            autocomplete: ReentrancyGuard::default(),
            breadcrumb_layout: ReentrancyGuard::default(),
            step: ReentrancyGuard::default(),
            drop_target: ReentrancyGuard::default(),
        }
    }

    /// Waits for the view's navigation permit. Fails once the gate is closed.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, NavError> {
        self.permit.acquire().await.map_err(|_| NavError::ViewClosed)
    }

    /// Wakes every waiter with `ViewClosed` and refuses new entrants.
    pub fn close(&self) {
        self.permit.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permit.is_closed()
    }

    /// True while a navigation holds the permit.
    pub fn is_navigating(&self) -> bool {
        self.permit.available_permits() == 0 && !self.permit.is_closed()
    }

    pub fn guard(&self, kind: GuardKind) -> &ReentrancyGuard {
        match kind {
            GuardKind::Autocomplete => &self.autocomplete,
            GuardKind::BreadcrumbLayout => &self.breadcrumb_layout,
            GuardKind::Step => &self.step,
            GuardKind::DropTarget => &self.drop_target,
        }
    }

    pub fn try_enter(&self, kind: GuardKind) -> Option<GuardTicket<'_>> {
        let ticket = self.guard(kind).try_enter();
        if ticket.is_none() {
            debug!(?kind, "guard busy, gesture skipped");
        }
        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn busy_guard_rejects_second_entrant() {
        let gate = NavigationGate::new();
        let ticket = gate.try_enter(GuardKind::Step).unwrap();
        assert!(gate.try_enter(GuardKind::Step).is_none());
        // Guards are independent.
        assert!(gate.try_enter(GuardKind::Autocomplete).is_some());
        drop(ticket);
        assert!(gate.try_enter(GuardKind::Step).is_some());
    }

    #[test]
    fn ticket_released_on_panic_unwind() {
        let gate = NavigationGate::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ticket = gate.try_enter(GuardKind::DropTarget).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!gate.guard(GuardKind::DropTarget).is_busy());
    }

    #[tokio::test]
    async fn second_navigation_waits_for_permit() {
        let gate = Arc::new(NavigationGate::new());
        let permit = gate.acquire().await.unwrap();
        assert!(gate.is_navigating());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn closed_gate_fails_waiters() {
        let gate = NavigationGate::new();
        gate.close();
        assert_eq!(gate.acquire().await.err(), Some(NavError::ViewClosed));
    }
}
