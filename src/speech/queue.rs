//! FIFO of pending speech tasks shared between the UI thread and workers.
//!
//! The queue is a `Mutex<VecDeque>` plus a `Condvar`.  It outlives any one
//! worker: a restart swaps the worker, not the queue, so text queued before
//! the restart is still spoken by the next worker.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::speech::engine::SpeechError;

// ---------------------------------------------------------------------------
// SpeechTask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechTask {
    /// Text to be spoken, in queue order.
    Speak(String),

    /// Terminate the worker of this generation.  Workers of any other
    /// generation discard it.
    Shutdown { generation: u64 },
}

// ---------------------------------------------------------------------------
// SpeechQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SpeechQueue {
    tasks: Mutex<VecDeque<SpeechTask>>,
    available: Condvar,
}

impl SpeechQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SpeechTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `text` to the back of the queue.  Never blocks on the worker.
    ///
    /// Blank (empty or whitespace-only) text is rejected.
    pub fn enqueue(&self, text: impl Into<String>) -> Result<(), SpeechError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }
        self.lock().push_back(SpeechTask::Speak(text));
        self.available.notify_one();
        Ok(())
    }

    /// Drop every queued text task and return how many were dropped.
    ///
    /// Runs under the queue lock, so an `enqueue` racing with it lands either
    /// before (and is dropped) or after (and is kept).  Shutdown sentinels
    /// stay in place for the worker they address.
    pub fn flush(&self) -> usize {
        let mut tasks = self.lock();
        let before = tasks.len();
        tasks.retain(|task| matches!(task, SpeechTask::Shutdown { .. }));
        before - tasks.len()
    }

    /// Put `task` at the front so it is the next one popped.
    pub fn push_front(&self, task: SpeechTask) {
        self.lock().push_front(task);
        self.available.notify_all();
    }

    /// Remove the shutdown sentinel(s) addressed to `generation`, if no
    /// worker consumed them.
    pub fn remove_sentinels(&self, generation: u64) {
        self.lock()
            .retain(|task| *task != SpeechTask::Shutdown { generation });
    }

    /// Pop the front task, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SpeechTask> {
        let deadline = Instant::now() + timeout;
        let mut tasks = self.lock();
        loop {
            if let Some(task) = tasks.pop_front() {
                return Some(task);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(tasks, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            tasks = guard;
        }
    }

    /// Number of queued text tasks.
    pub fn pending(&self) -> usize {
        self.lock()
            .iter()
            .filter(|task| matches!(task, SpeechTask::Speak(_)))
            .count()
    }

    /// Snapshot of the queued text, front first.
    pub fn pending_text(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|task| match task {
                SpeechTask::Speak(text) => Some(text.clone()),
                SpeechTask::Shutdown { .. } => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn enqueue_preserves_fifo_order() {
        let q = SpeechQueue::new();
        q.enqueue("hello").unwrap();
        q.enqueue("world").unwrap();
        assert_eq!(
            q.pop_timeout(Duration::ZERO),
            Some(SpeechTask::Speak("hello".into()))
        );
        assert_eq!(
            q.pop_timeout(Duration::ZERO),
            Some(SpeechTask::Speak("world".into()))
        );
        assert_eq!(q.pop_timeout(Duration::ZERO), None);
    }

    #[test]
    fn blank_text_is_rejected() {
        let q = SpeechQueue::new();
        assert!(matches!(q.enqueue(""), Err(SpeechError::EmptyText)));
        assert!(matches!(q.enqueue("  \n\t"), Err(SpeechError::EmptyText)));
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn flush_drops_text_but_keeps_sentinels() {
        let q = SpeechQueue::new();
        q.enqueue("hello").unwrap();
        q.push_front(SpeechTask::Shutdown { generation: 3 });
        q.enqueue("world").unwrap();

        assert_eq!(q.flush(), 2);
        assert_eq!(q.pending(), 0);
        assert_eq!(
            q.pop_timeout(Duration::ZERO),
            Some(SpeechTask::Shutdown { generation: 3 })
        );
    }

    #[test]
    fn push_front_overtakes_queued_text() {
        let q = SpeechQueue::new();
        q.enqueue("later").unwrap();
        q.push_front(SpeechTask::Speak("first".into()));
        assert_eq!(q.pending_text(), vec!["first", "later"]);
    }

    #[test]
    fn remove_sentinels_only_touches_one_generation() {
        let q = SpeechQueue::new();
        q.push_front(SpeechTask::Shutdown { generation: 1 });
        q.push_front(SpeechTask::Shutdown { generation: 2 });
        q.remove_sentinels(1);
        assert_eq!(
            q.pop_timeout(Duration::ZERO),
            Some(SpeechTask::Shutdown { generation: 2 })
        );
        assert_eq!(q.pop_timeout(Duration::ZERO), None);
    }

    #[test]
    fn pop_timeout_wakes_on_enqueue_from_other_thread() {
        let q = Arc::new(SpeechQueue::new());
        let producer = Arc::clone(&q);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.enqueue("late").unwrap();
        });

        let task = q.pop_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(task, Some(SpeechTask::Speak("late".into())));
    }

    #[test]
    fn concurrent_flush_accounts_for_every_task() {
        use std::collections::HashSet;
        use std::sync::atomic::{AtomicBool, Ordering};

        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 500;
        const SENTINELS: u64 = 50;

        let q = Arc::new(SpeechQueue::new());
        let done = Arc::new(AtomicBool::new(false));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.enqueue(format!("{p}-{i}")).unwrap();
                        if i % 10 == 0 {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let sentinel_pusher = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for generation in 0..SENTINELS {
                    q.push_front(SpeechTask::Shutdown { generation });
                    thread::yield_now();
                }
            })
        };

        let flusher = {
            let q = Arc::clone(&q);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut dropped = 0;
                while !done.load(Ordering::Acquire) {
                    dropped += q.flush();
                    thread::yield_now();
                }
                dropped
            })
        };

        let consumer = {
            let q = Arc::clone(&q);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut spoken = Vec::new();
                let mut sentinels = 0;
                loop {
                    match q.pop_timeout(Duration::from_millis(1)) {
                        Some(SpeechTask::Speak(text)) => spoken.push(text),
                        Some(SpeechTask::Shutdown { .. }) => sentinels += 1,
                        None if done.load(Ordering::Acquire) => break,
                        None => {}
                    }
                }
                (spoken, sentinels)
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        sentinel_pusher.join().unwrap();
        done.store(true, Ordering::Release);
        let dropped = flusher.join().unwrap();
        let (mut spoken, mut sentinels) = consumer.join().unwrap();

        // whatever is still queued after both threads stopped
        while let Some(task) = q.pop_timeout(Duration::ZERO) {
            match task {
                SpeechTask::Speak(text) => spoken.push(text),
                SpeechTask::Shutdown { .. } => sentinels += 1,
            }
        }

        let unique: HashSet<&String> = spoken.iter().collect();
        assert_eq!(unique.len(), spoken.len(), "no task is delivered twice");
        assert_eq!(dropped + spoken.len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(sentinels, SENTINELS as usize, "flush never drops a sentinel");
    }

    #[test]
    fn pop_timeout_returns_none_when_idle() {
        let q = SpeechQueue::new();
        let start = Instant::now();
        assert_eq!(q.pop_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
