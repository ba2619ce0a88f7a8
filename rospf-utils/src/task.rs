//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use derive_new::new;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio::{task, time};
use tracing::error;

// Maximum jitter applied to every tick of a periodic timer whose period
// is one second or more.
const TICK_JITTER: Duration = Duration::from_millis(500);

/// A spawned task tied to its handle: dropping the handle aborts the
/// task unless [`Task::detach`] was called.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

/// A one-shot timer. Dropping the handle cancels it; [`reset`]
/// restarts it with the same or a new timeout.
///
/// [`reset`]: TimeoutTask::reset
#[derive(Debug)]
pub struct TimeoutTask {
    #[cfg(not(feature = "testing"))]
    inner: TimeoutTaskInner,
}

#[derive(Debug, new)]
struct TimeoutTaskInner {
    _task: Task<()>,
    control: UnboundedSender<Message>,
    next: Arc<Mutex<Instant>>,
}

/// A periodic timer. Dropping the handle cancels it. Ticks carry a
/// small random jitter so independent timers don't synchronize.
#[derive(Debug)]
pub struct IntervalTask {
    #[cfg(not(feature = "testing"))]
    inner: IntervalTaskInner,
}

#[derive(Debug, new)]
struct IntervalTaskInner {
    _task: Task<()>,
    control: UnboundedSender<Message>,
    next: Arc<Mutex<Instant>>,
}

#[derive(Debug)]
enum Message {
    Reset(Option<Duration>),
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
            detached: false,
        }
    }

    /// Runs the provided closure on a thread where blocking is acceptable.
    pub fn spawn_blocking<F>(f: F) -> Task<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn_blocking(f),
            detached: false,
        }
    }

    /// Detach the task, meaning it will no longer be canceled if its handle
    /// is dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Spawns a new task that will call the provided async closure when the
    /// specified timeout expires.
    ///
    /// Returns a handle that can be used to manipulate the timeout task.
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let next = Instant::now() + timeout;
        let next = Arc::new(Mutex::new(next));
        let next_child = next.clone();

        let task = Task::spawn(async move {
            let timeout_fut = time::sleep(timeout);
            tokio::pin!(timeout_fut);

            loop {
                tokio::select! {
                    // Timeout has expired.
                    _ = &mut timeout_fut => {
                        (cb)().await;
                        break;
                    }
                    message = control_rx.recv() => {
                        match message {
                            // Timeout has been refreshed/updated.
                            Some(Message::Reset(None)) => {
                                let next = Instant::now() + timeout;
                                timeout_fut.as_mut().reset(next);
                                *next_child.lock().unwrap() = next;
                            },
                            Some(Message::Reset(Some(new_timeout))) => {
                                let next = Instant::now() + new_timeout;
                                timeout_fut.as_mut().reset(next);
                                *next_child.lock().unwrap() = next;
                            },
                            // Timeout has been aborted.
                            None => break,
                        }
                    }
                }
            }
        });

        TimeoutTask {
            inner: TimeoutTaskInner::new(task, control_tx, next),
        }
    }

    /// Resets the timeout, regardless if it has already expired or not.
    ///
    /// If a new timeout value isn't specified, the last value will be reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        #[cfg(not(feature = "testing"))]
        {
            if self.inner.control.send(Message::Reset(timeout)).is_err() {
                error!("failed to reset timeout");
            }
        }
    }

    /// Returns the remaining time before the timeout expires.
    pub fn remaining(&self) -> Duration {
        #[cfg(not(feature = "testing"))]
        {
            let next = self.inner.next.lock().unwrap();
            next.saturating_duration_since(Instant::now())
        }
        #[cfg(feature = "testing")]
        {
            Duration::ZERO
        }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a new task that will call the provided async closure whenever
    /// the specified interval elapses.
    ///
    /// When `jitter` is set, the first firing is delayed by a uniformly
    /// random fraction of the interval, and every subsequent tick is offset
    /// by up to half a second in either direction (intervals of one second
    /// or more only).
    ///
    /// Returns a handle that can be used to manipulate the interval task.
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        jitter: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let next = Instant::now() + interval;
        let next = Arc::new(Mutex::new(next));
        let next_child = next.clone();

        let task = Task::spawn(async move {
            let mut interval = interval;
            let first_delay = if tick_on_start {
                Duration::ZERO
            } else if jitter {
                rand::rng().random_range(Duration::ZERO..=interval)
            } else {
                interval
            };
            let sleep_fut = time::sleep(first_delay);
            tokio::pin!(sleep_fut);

            loop {
                tokio::select! {
                    // Interval timer has ticked.
                    _ = &mut sleep_fut => {
                        (cb)().await;
                        let delay = tick_delay(interval, jitter);
                        let next = Instant::now() + delay;
                        sleep_fut.as_mut().reset(next);
                        *next_child.lock().unwrap() = next;
                    }
                    message = control_rx.recv() => {
                        match message {
                            // Interval timer has been updated.
                            Some(Message::Reset(new_interval)) => {
                                if let Some(new_interval) = new_interval {
                                    interval = new_interval;
                                }
                                let next = Instant::now() + interval;
                                sleep_fut.as_mut().reset(next);
                                *next_child.lock().unwrap() = next;
                            },
                            // Interval timer has been aborted.
                            None => break,
                        }
                    }
                }
            }
        });

        IntervalTask {
            inner: IntervalTaskInner::new(task, control_tx, next),
        }
    }

    /// Resets the interval.
    ///
    /// If a new interval value isn't specified, the last value will be
    /// reused.
    pub fn reset(&mut self, interval: Option<Duration>) {
        #[cfg(not(feature = "testing"))]
        {
            if self.inner.control.send(Message::Reset(interval)).is_err() {
                error!("failed to reset interval");
            }
        }
    }

    /// Returns the remaining time before the next interval tick.
    pub fn remaining(&self) -> Duration {
        #[cfg(not(feature = "testing"))]
        {
            let next = self.inner.next.lock().unwrap();
            next.saturating_duration_since(Instant::now())
        }
        #[cfg(feature = "testing")]
        {
            Duration::ZERO
        }
    }
}

// ===== helper functions =====

#[cfg(not(feature = "testing"))]
fn tick_delay(interval: Duration, jitter: bool) -> Duration {
    if !jitter || interval < Duration::from_secs(1) {
        return interval;
    }

    let offset = rand::rng().random_range(Duration::ZERO..=TICK_JITTER * 2);
    interval + offset - TICK_JITTER
}
