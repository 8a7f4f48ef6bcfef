use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("{peer} is unreachable")]
    Unreachable { peer: &'static str },
    #[error("{peer} did not answer within {waited:?}")]
    Timeout {
        peer: &'static str,
        waited: Duration,
    },
}

/// Sending half of a context's inbox.
///
/// Two ways to send, chosen at every call site:
/// - [`Outbox::send`] when the caller must react to an unreachable peer;
/// - [`Outbox::notify`] for best-effort fan-out, where a missed delivery is
///   immaterial and is swallowed.
pub struct Outbox<T> {
    tx: Sender<T>,
    peer: &'static str,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            peer: self.peer,
        }
    }
}

impl<T> Outbox<T> {
    pub fn new(tx: Sender<T>, peer: &'static str) -> Self {
        Self { tx, peer }
    }

    /// Creates an unbounded inbox for `peer` and the outbox feeding it.
    pub fn channel(peer: &'static str) -> (Outbox<T>, Receiver<T>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx, peer), rx)
    }

    pub fn peer(&self) -> &'static str {
        self.peer
    }

    pub fn send(&self, msg: T) -> Result<(), ChannelError> {
        self.tx
            .send(msg)
            .map_err(|_| ChannelError::Unreachable { peer: self.peer })
    }

    /// Best-effort delivery: an unreachable peer is logged and ignored.
    pub fn notify(&self, msg: T) {
        if self.tx.send(msg).is_err() {
            log::debug!("Dropped notification for unreachable {}", self.peer);
        }
    }

    /// Sends a message carrying a one-shot reply slot and waits for the reply.
    pub fn request<R>(
        &self,
        build: impl FnOnce(Ack<R>) -> T,
        timeout: Duration,
    ) -> Result<R, ChannelError> {
        let (ack, pending) = Ack::pair(self.peer);
        self.send(build(ack))?;
        pending.wait(timeout)
    }
}

/// One-shot acknowledgment slot carried inside a request message.
pub struct Ack<R> {
    tx: Sender<R>,
}

impl<R> Ack<R> {
    pub fn pair(peer: &'static str) -> (Ack<R>, PendingAck<R>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (Ack { tx }, PendingAck { rx, peer })
    }

    /// Replies to the requester. A requester that stopped waiting is not an error.
    pub fn reply(self, value: R) {
        let _ = self.tx.send(value);
    }
}

/// Receiving side of an [`Ack`]; every wait is bounded.
pub struct PendingAck<R> {
    rx: Receiver<R>,
    peer: &'static str,
}

impl<R> PendingAck<R> {
    pub fn wait(self, timeout: Duration) -> Result<R, ChannelError> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(ChannelError::Timeout {
                peer: self.peer,
                waited: timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ChannelError::Unreachable { peer: self.peer })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_delivers() {
        let (outbox, rx) = Outbox::channel("peer");
        outbox.send(7).unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn test_send_to_dropped_inbox_is_unreachable() {
        let (outbox, rx) = Outbox::<u8>::channel("overlay");
        drop(rx);
        assert_eq!(
            outbox.send(1),
            Err(ChannelError::Unreachable { peer: "overlay" })
        );
    }

    #[test]
    fn test_notify_to_dropped_inbox_is_silent() {
        let (outbox, rx) = Outbox::<u8>::channel("overlay");
        drop(rx);
        outbox.notify(1);
    }

    #[test]
    fn test_ack_reply_is_received() {
        let (ack, pending) = Ack::pair("peer");
        ack.reply("done");
        assert_eq!(pending.wait(Duration::from_millis(10)), Ok("done"));
    }

    #[test]
    fn test_unanswered_ack_times_out() {
        let (_ack, pending) = Ack::<()>::pair("pipeline");
        let err = pending.wait(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { peer: "pipeline", .. }));
    }

    #[test]
    fn test_dropped_ack_is_unreachable() {
        let (ack, pending) = Ack::<()>::pair("pipeline");
        drop(ack);
        assert_eq!(
            pending.wait(Duration::from_millis(10)),
            Err(ChannelError::Unreachable { peer: "pipeline" })
        );
    }

    #[test]
    fn test_request_roundtrip_through_peer_thread() {
        let (outbox, rx) = Outbox::<Ack<u32>>::channel("echo");
        let peer = std::thread::spawn(move || {
            let ack = rx.recv().unwrap();
            ack.reply(42);
        });
        let answer = outbox.request(|ack| ack, Duration::from_secs(1)).unwrap();
        assert_eq!(answer, 42);
        peer.join().unwrap();
    }
}
