//! Bounded message queues between the submitter and executor threads.
//!
//! Each direction is one bounded `mpsc` channel owned by exactly one
//! producer and one consumer. Posting never blocks: when the channel is
//! full the message waits in a producer-side backlog that is flushed, in
//! order, before anything newer is sent. Consumers drain their queue once
//! per tick.

use std::collections::VecDeque;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::events::SessionEvent;
use crate::task::{PartialResult, TaskId};

/// Submitter to executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExecutorMessage {
    StartTaskRunning(TaskId),
}

/// Executor to submitter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SubmitterMessage {
    EndTask(TaskId),
    Partial { task: TaskId, result: PartialResult },
    Event(SessionEvent),
}

/// Producing half of one direction.
#[derive(Debug)]
pub struct Outbound<T> {
    tx: mpsc::Sender<T>,
    backlog: VecDeque<T>,
}

impl<T> Outbound<T> {
    /// Queue `message` behind everything posted earlier.
    pub fn post(&mut self, message: T) {
        self.flush();
        if !self.backlog.is_empty() {
            self.backlog.push_back(message);
            return;
        }
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                debug!(backlog = self.backlog.len() + 1, "Dispatch queue full, deferring");
                self.backlog.push_back(message);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dispatch peer gone, message dropped");
            }
        }
    }

    /// Move as much of the backlog into the channel as fits.
    pub fn flush(&mut self) {
        while let Some(message) = self.backlog.pop_front() {
            match self.tx.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(message)) => {
                    self.backlog.push_front(message);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(
                        dropped = self.backlog.len() + 1,
                        "Dispatch peer gone, discarding backlog"
                    );
                    self.backlog.clear();
                    return;
                }
            }
        }
    }

    /// Messages still waiting for room in the channel.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }
}

/// Consuming half of one direction.
#[derive(Debug)]
pub struct Inbound<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Inbound<T> {
    /// Everything queued right now, in posting order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

pub fn channel<T>(capacity: usize) -> (Outbound<T>, Inbound<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Outbound {
            tx,
            backlog: VecDeque::new(),
        },
        Inbound { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_survives_a_full_channel() {
        let (mut tx, mut rx) = channel::<u32>(2);
        for n in 0..5 {
            tx.post(n);
        }
        assert_eq!(tx.backlog(), 3);

        assert_eq!(rx.drain(), vec![0, 1]);
        tx.flush();
        assert_eq!(rx.drain(), vec![2, 3]);
        tx.post(5);
        assert_eq!(rx.drain(), vec![4, 5]);
        assert_eq!(tx.backlog(), 0);
    }

    #[test]
    fn closed_peer_discards_backlog() {
        let (mut tx, rx) = channel::<u32>(1);
        tx.post(1);
        tx.post(2);
        drop(rx);
        tx.flush();
        assert_eq!(tx.backlog(), 0);
    }
}
