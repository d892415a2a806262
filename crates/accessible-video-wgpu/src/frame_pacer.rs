//! Bounds the number of frames the GPU may have in flight

use futures_intrusive::sync::{SharedSemaphore, SharedSemaphoreReleaser};
use std::collections::VecDeque;

/// Counting semaphore with one permit per frame the GPU may be working on
///
/// The renderer acquires a permit before recording a frame and hands the
/// resulting [`FrameCompletion`] to the queue's completion callback.
#[derive(Clone)]
pub struct FramePacer {
    semaphore: SharedSemaphore,
}

impl std::fmt::Debug for FramePacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePacer").field("available", &self.available()).finish()
    }
}

impl FramePacer {
    /// Creates a pacer allowing `capacity` frames in flight
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: SharedSemaphore::new(true, capacity),
        }
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.permits()
    }

    /// Takes a permit, blocking the calling thread until one is free
    ///
    /// When no permit is free, `pump` runs once before blocking so completion
    /// callbacks that would free a permit get a chance to fire.
    pub fn acquire(&self, pump: impl FnOnce()) -> FrameCompletion {
        if let Some(releaser) = self.semaphore.try_acquire(1) {
            return FrameCompletion { _releaser: releaser };
        }

        pump();
        FrameCompletion {
            _releaser: pollster::block_on(self.semaphore.acquire(1)),
        }
    }
}

/// A held frame permit
///
/// The permit returns to the pacer exactly once: when [`Self::signal`] is
/// called or, if the completion callback never runs, when the guard drops.
#[must_use = "dropping a frame completion releases its permit immediately"]
pub struct FrameCompletion {
    _releaser: SharedSemaphoreReleaser,
}

impl FrameCompletion {
    pub fn signal(self) {}
}

impl std::fmt::Debug for FrameCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCompletion").finish_non_exhaustive()
    }
}

/// The most recent frame submissions, oldest first
///
/// Holds one entry per frame the pacer allows in flight. When every permit is
/// taken, the oldest entry is the submission whose completion frees the next
/// one, so waiting on it is enough.
#[derive(Debug)]
pub struct Submissions<T> {
    pending: VecDeque<T>,
    capacity: usize,
}

impl<T> Submissions<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a submission, forgetting the oldest once full
    pub fn record(&mut self, submission: T) {
        if self.pending.len() == self.capacity {
            self.pending.pop_front();
        }
        self.pending.push_back(submission);
    }

    /// The earliest submission still tracked
    pub fn oldest(&self) -> Option<&T> {
        self.pending.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::mpsc, thread, time::Duration};

    #[test]
    fn test_acquire_does_not_pump_while_permits_are_free() {
        let pacer = FramePacer::new(2);
        let _first = pacer.acquire(|| panic!("pumped with a free permit"));
        let _second = pacer.acquire(|| panic!("pumped with a free permit"));
        assert_eq!(pacer.available(), 0);
    }

    #[test]
    fn test_acquire_blocks_past_capacity() {
        let buffered_frames = 2;
        let pacer = FramePacer::new(buffered_frames);
        let mut held: Vec<_> = (0..buffered_frames).map(|_| pacer.acquire(|| {})).collect();

        let (sender, receiver) = mpsc::channel();
        let waiter = {
            let pacer = pacer.clone();
            thread::spawn(move || {
                let completion = pacer.acquire(|| {});
                sender.send(()).unwrap();
                completion
            })
        };

        assert!(receiver.recv_timeout(Duration::from_millis(100)).is_err());

        held.pop().unwrap().signal();
        receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(waiter.join().unwrap());
        drop(held);

        assert_eq!(pacer.available(), buffered_frames);
    }

    #[test]
    fn test_dropped_completion_releases_once() {
        let pacer = FramePacer::new(1);
        let completion = pacer.acquire(|| {});
        assert_eq!(pacer.available(), 0);

        // A completion callback that never runs drops its guard instead
        let callback = move || completion.signal();
        drop(callback);

        assert_eq!(pacer.available(), 1);
    }

    #[test]
    fn test_pump_runs_when_saturated() {
        let pacer = FramePacer::new(1);
        let held = pacer.acquire(|| {});

        let mut pending = Some(held);
        let _next = pacer.acquire(|| {
            pending.take().unwrap().signal();
        });

        assert!(pending.is_none());
        assert_eq!(pacer.available(), 0);
    }

    #[test]
    fn test_submissions_keep_the_frames_in_flight() {
        let mut submissions = Submissions::new(2);
        assert_eq!(submissions.oldest(), None);

        submissions.record(1);
        assert_eq!(submissions.oldest(), Some(&1));
        submissions.record(2);
        assert_eq!(submissions.oldest(), Some(&1));

        // The third frame can only start once the first one finished
        submissions.record(3);
        assert_eq!(submissions.oldest(), Some(&2));
        assert_eq!(submissions.pending.len(), 2);
    }

    #[test]
    fn test_submissions_never_track_zero_frames() {
        let mut submissions = Submissions::new(0);
        submissions.record("frame");
        assert_eq!(submissions.oldest(), Some(&"frame"));
    }
}
