//! Single-slot drop-latest mailbox.
//!
//! A bounded(1) crossbeam channel where the sender keeps a receiver clone so
//! it can evict a pending value: posting never blocks, and a slow consumer
//! only ever sees the most recent value. Dropping the sender disconnects the
//! receiver once the pending value (if any) has been taken; closing it
//! discards the pending value first.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::time::Duration;

/// Create a connected mailbox pair
#[must_use]
pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = channel::bounded(1);
    (
        MailboxSender {
            tx,
            evict: rx.clone(),
        },
        MailboxReceiver { rx },
    )
}

/// Producer half; overwrites any value the consumer has not taken yet
#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
}

impl<T> MailboxSender<T> {
    /// Post a value, replacing the pending one
    ///
    /// Returns `true` if a pending value was overwritten.
    pub fn post(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => false,
            Err(TrySendError::Full(value)) => {
                let evicted = self.evict.try_recv().is_ok();
                // Single producer: the slot is free unless the consumer raced us to it,
                // in which case it was emptied either way.
                if let Err(TrySendError::Full(value)) = self.tx.try_send(value) {
                    let _ = self.evict.try_recv();
                    let _ = self.tx.try_send(value);
                }
                evicted
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Discard any pending value and disconnect the receiver
    ///
    /// Unlike dropping the sender, the receiver sees the end of the sequence
    /// immediately instead of after one last stale value.
    pub fn close(self) {
        while self.evict.try_recv().is_ok() {}
    }
}

/// Consumer half
#[derive(Debug)]
pub struct MailboxReceiver<T> {
    rx: Receiver<T>,
}

impl<T> MailboxReceiver<T> {
    /// Block until a value is available; `None` once the sender is gone
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Block up to `timeout`
    ///
    /// # Errors
    ///
    /// `RecvTimeoutError::Disconnected` once the sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, RecvTimeoutError> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Take the pending value without blocking
    ///
    /// # Errors
    ///
    /// `TryRecvError::Disconnected` once the sender is gone and nothing is pending.
    pub fn try_take(&self) -> Result<Option<T>, TryRecvError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T> Iterator for MailboxReceiver<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_post_overwrites_pending() {
        let (tx, rx) = mailbox();
        assert!(!tx.post(1));
        assert!(tx.post(2));
        assert!(tx.post(3));

        assert_eq!(rx.try_take().unwrap(), Some(3));
        assert_eq!(rx.try_take().unwrap(), None);
    }

    #[test]
    fn test_disconnect_after_sender_drop() {
        let (tx, rx) = mailbox();
        tx.post(7);
        drop(tx);

        // The pending value is still delivered, then the sequence ends
        assert_eq!(rx.recv(), Some(7));
        assert_eq!(rx.recv(), None);
        assert!(rx.try_take().is_err());
    }

    #[test]
    fn test_close_discards_pending() {
        let (tx, rx) = mailbox();
        tx.post(7);
        tx.close();

        assert_eq!(rx.recv(), None);
        assert!(rx.try_take().is_err());
    }

    #[test]
    fn test_close_wakes_blocked_receiver() {
        let (tx, rx) = mailbox::<u8>();
        let consumer = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(10));
        tx.close();

        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_iterator_ends_on_disconnect() {
        let (tx, rx) = mailbox();
        let producer = thread::spawn(move || {
            for i in 0..100 {
                tx.post(i);
            }
        });
        producer.join().unwrap();

        let received: Vec<i32> = rx.collect();
        // Only the latest value survives a burst the consumer did not keep up with
        assert_eq!(received, vec![99]);
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (tx, rx) = mailbox::<u8>();
        assert_eq!(rx.recv_timeout(Duration::from_millis(5)).unwrap(), None);
        drop(tx);
        assert!(rx.recv_timeout(Duration::from_millis(5)).is_err());
    }
}
