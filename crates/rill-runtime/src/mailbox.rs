//! Process mailbox for message delivery.
//!
//! Each process owns exactly one mailbox. Any number of producers may push
//! into it concurrently; only the owning process ever dequeues. A single lock
//! guards "check the queue, else register the waker", which is what makes a
//! timed receive racing a delivery deterministic: if the message was enqueued
//! before the timeout check completes, the receiver gets the message.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::current;
use crate::process::WaitKind;

/// A message delivered to a process mailbox.
///
/// Messages cross the isolation boundary as owned byte buffers; the sender
/// encodes into a fresh allocation and the receiver takes ownership of it.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The raw message bytes.
    pub data: Vec<u8>,
}

impl Envelope {
    /// Creates a new envelope with the given data.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

struct Inner {
    queue: VecDeque<Envelope>,
    /// Waker of the owning process, present only while it is parked in a
    /// receive with an empty queue.
    waker: Option<Waker>,
}

/// The per-process message queue.
///
/// Unbounded and insertion-ordered: pushes are serialized by the internal
/// lock, which is the mailbox's linearization point.
pub(crate) struct Mailbox {
    inner: Mutex<Inner>,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                waker: None,
            }),
        }
    }

    /// Enqueues a message. Never blocks the sender beyond the queue lock.
    ///
    /// Wakes the owning process if it is parked waiting on receive. The wake
    /// happens after the lock is released.
    pub(crate) fn push(&self, envelope: Envelope) {
        let waker = {
            let mut inner = self.inner.lock();
            inner.queue.push_back(envelope);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Dequeue attempt made by the owning process.
    ///
    /// Returns `Ready(Some(_))` with the oldest message, `Ready(None)` once
    /// `deadline` has passed with nothing queued, or `Pending` after parking
    /// the caller's waker. The queue check and waker registration happen
    /// under one lock.
    pub(crate) fn poll_receive(
        &self,
        cx: &mut Context<'_>,
        deadline: Option<Instant>,
    ) -> Poll<Option<Envelope>> {
        let mut inner = self.inner.lock();
        if let Some(envelope) = inner.queue.pop_front() {
            return Poll::Ready(Some(envelope));
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Poll::Ready(None);
            }
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Number of queued messages.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

/// Future returned by the process-facing `receive`.
///
/// Only constructible through the owning process's own API surface, which is
/// what enforces the at-most-one-consumer invariant: there is no way to
/// obtain a receive future for another process's mailbox.
pub struct Receive {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    timer_registered: bool,
}

impl Receive {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            deadline: None,
            timer_registered: false,
        }
    }
}

impl Future for Receive {
    type Output = Option<Vec<u8>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        current::with_current(|cur| {
            // The timeout clock starts at the first poll, not at call time.
            if this.deadline.is_none() {
                this.deadline = this.timeout.map(|d| Instant::now() + d);
            }
            match cur.process.mailbox().poll_receive(cx, this.deadline) {
                Poll::Ready(result) => {
                    cur.process.set_wait(WaitKind::None);
                    Poll::Ready(result.map(|env| env.data))
                }
                Poll::Pending => {
                    if let Some(deadline) = this.deadline {
                        // Registered once; the entry stays in the timer heap
                        // until the deadline even if a message arrives first,
                        // which at worst causes one spurious wake.
                        if !this.timer_registered {
                            cur.process
                                .shared()
                                .timer
                                .register(deadline, cx.waker().clone());
                            this.timer_registered = true;
                        }
                    }
                    cur.process.set_wait(WaitKind::Mailbox);
                    Poll::Pending
                }
            }
        })
    }
}
