// Load-result signaling between the decode path and the host's poll tick
//
// A load latches at most one result; poll() drains it exactly once and
// fans it out to observers in registration order. Observers never run
// from inside a load, only from the drain point.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::image::ErrorCode;

/// Result drained by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollEvent {
    #[default]
    None,
    Finished,
    Error(ErrorCode),
}

/// The pending load result. Latest signal wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventLatch {
    finished: bool,
    error: ErrorCode,
}

impl EventLatch {
    pub const fn new() -> Self {
        Self {
            finished: false,
            error: ErrorCode::Ok,
        }
    }

    #[inline]
    pub fn signal_finished(&mut self) {
        self.finished = true;
        self.error = ErrorCode::Ok;
    }

    #[inline]
    pub fn signal_error(&mut self, code: ErrorCode) {
        self.finished = false;
        self.error = code;
    }

    pub fn is_pending(&self) -> bool {
        self.finished || self.error != ErrorCode::Ok
    }

    /// Drain the pending result and reset to idle.
    pub fn take(&mut self) -> PollEvent {
        let ev = if self.finished {
            PollEvent::Finished
        } else if self.error != ErrorCode::Ok {
            PollEvent::Error(self.error)
        } else {
            PollEvent::None
        };
        *self = Self::new();
        ev
    }
}

pub type FinishedFn = Box<dyn FnMut()>;
pub type ErrorFn = Box<dyn FnMut(ErrorCode)>;

/// Registered finished / error observers.
#[derive(Default)]
pub struct Observers {
    finished: Vec<FinishedFn>,
    error: Vec<ErrorFn>,
}

impl Observers {
    pub const fn new() -> Self {
        Self {
            finished: Vec::new(),
            error: Vec::new(),
        }
    }

    pub fn on_finished(&mut self, f: impl FnMut() + 'static) {
        self.finished.push(Box::new(f));
    }

    pub fn on_error(&mut self, f: impl FnMut(ErrorCode) + 'static) {
        self.error.push(Box::new(f));
    }

    pub fn dispatch(&mut self, ev: PollEvent) {
        match ev {
            PollEvent::None => {}
            PollEvent::Finished => {
                for f in self.finished.iter_mut() {
                    f();
                }
            }
            PollEvent::Error(code) => {
                for f in self.error.iter_mut() {
                    f(code);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn latch_drains_once() {
        let mut latch = EventLatch::new();
        assert_eq!(latch.take(), PollEvent::None);
        latch.signal_finished();
        assert!(latch.is_pending());
        assert_eq!(latch.take(), PollEvent::Finished);
        assert_eq!(latch.take(), PollEvent::None);
    }

    #[test]
    fn latest_signal_wins() {
        let mut latch = EventLatch::new();
        latch.signal_finished();
        latch.signal_error(ErrorCode::FileNotFound);
        assert_eq!(latch.take(), PollEvent::Error(ErrorCode::FileNotFound));

        latch.signal_error(ErrorCode::NoMemory);
        latch.signal_finished();
        assert_eq!(latch.take(), PollEvent::Finished);
    }

    #[test]
    fn observers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut obs = Observers::new();
        for id in 0..3 {
            let log = log.clone();
            obs.on_error(move |code| log.borrow_mut().push((id, code as u8)));
        }
        let fin = log.clone();
        obs.on_finished(move || fin.borrow_mut().push((9, 0)));

        obs.dispatch(PollEvent::Error(ErrorCode::DecoderIncomplete));
        obs.dispatch(PollEvent::None);
        assert_eq!(*log.borrow(), [(0, 3), (1, 3), (2, 3)]);

        obs.dispatch(PollEvent::Finished);
        assert_eq!(log.borrow().last(), Some(&(9, 0)));
    }
}
