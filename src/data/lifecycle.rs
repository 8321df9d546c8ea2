use std::sync::atomic::{AtomicBool, Ordering};

/// Observable cursor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Exhausted,
    Closed,
}

/// Open/exhausted/closed bookkeeping shared by every data set.
///
/// The closed flag flips exactly once; whichever path wins `begin_close` performs the
/// release.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    closed: AtomicBool,
    exhausted: bool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns true for the single caller that should release resources.
    pub(crate) fn begin_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True once no further rows can be produced (exhausted or closed).
    pub(crate) fn is_done(&self) -> bool {
        self.exhausted || self.is_closed()
    }

    pub(crate) fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    pub(crate) fn state(&self) -> CursorState {
        if self.is_closed() {
            CursorState::Closed
        } else if self.exhausted {
            CursorState::Exhausted
        } else {
            CursorState::Open
        }
    }
}

/// Last-resort diagnostic for data sets dropped while still open.
pub(crate) fn warn_abandoned(kind: &'static str) {
    tracing::warn!(
        data_set = kind,
        "DataSet dropped without close(); closing it now"
    );
}
