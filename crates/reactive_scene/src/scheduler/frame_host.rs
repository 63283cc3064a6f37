//! Animation-frame hosts
//!
//! The scheduler never owns a timer. It asks a [`FrameHost`] for the next
//! animation frame and the host calls `Root::frame` when that frame comes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::collections::RootId;

/// Identifier of one pending animation-frame request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequestId(pub u64);

/// Source of animation frames
pub trait FrameHost {
    /// Ask for one callback on the next animation frame for `root`
    fn request_animation_frame(&self, root: RootId) -> FrameRequestId;

    /// Withdraw a pending request
    fn cancel_animation_frame(&self, id: FrameRequestId);
}

#[derive(Debug, Default)]
struct ManualHostState {
    next_id: u64,
    pending: Vec<(FrameRequestId, RootId)>,
    requested: usize,
    cancelled: usize,
}

/// Frame host for hosts that poll
///
/// Requests are queued; the host drains them with
/// [`ManualFrameHost::take_pending`] and calls `Root::frame` for each.
#[derive(Debug, Clone, Default)]
pub struct ManualFrameHost {
    state: Rc<RefCell<ManualHostState>>,
}

impl ManualFrameHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the pending requests
    pub fn take_pending(&self) -> Vec<(FrameRequestId, RootId)> {
        std::mem::take(&mut self.state.borrow_mut().pending)
    }

    /// Number of requests waiting to be served
    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Whether `root` has a request waiting
    pub fn has_pending(&self, root: RootId) -> bool {
        self.state.borrow().pending.iter().any(|(_, r)| *r == root)
    }

    /// Total requests ever made
    pub fn request_count(&self) -> usize {
        self.state.borrow().requested
    }

    /// Total requests withdrawn
    pub fn cancel_count(&self) -> usize {
        self.state.borrow().cancelled
    }
}

impl FrameHost for ManualFrameHost {
    fn request_animation_frame(&self, root: RootId) -> FrameRequestId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = FrameRequestId(state.next_id);
        state.pending.push((id, root));
        state.requested += 1;
        id
    }

    fn cancel_animation_frame(&self, id: FrameRequestId) {
        let mut state = self.state.borrow_mut();
        let before = state.pending.len();
        state.pending.retain(|(pending, _)| *pending != id);
        if state.pending.len() != before {
            state.cancelled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_removes_pending_request() {
        let host = ManualFrameHost::new();
        let a = host.request_animation_frame(RootId(1));
        host.request_animation_frame(RootId(2));
        host.cancel_animation_frame(a);
        assert!(!host.has_pending(RootId(1)));
        assert!(host.has_pending(RootId(2)));
        assert_eq!(host.cancel_count(), 1);
        assert_eq!(host.take_pending().len(), 1);
        assert_eq!(host.pending_count(), 0);
    }
}
