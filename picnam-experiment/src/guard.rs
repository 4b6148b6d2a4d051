use picnam_core::{Result, SessionError};
use std::sync::atomic::{AtomicBool, Ordering};

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Marks a session as active for the lifetime of the guard. At most one
/// guard exists per process.
#[derive(Debug)]
pub struct SessionGuard {
    _private: (),
}

impl SessionGuard {
    pub fn acquire() -> Result<Self> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::SessionActive)?;
        Ok(Self { _private: () })
    }

    pub fn is_active() -> bool {
        SESSION_ACTIVE.load(Ordering::Acquire)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}
