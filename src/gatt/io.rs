use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::name_of;

use super::*;

/// Characteristic I/O result type.
pub type IoResult<T = ()> = Result<T, ErrorCode>;

/// Single-shot reply handle shared by every clone of a request. The first
/// response is delivered to the client and later ones are ignored.
pub struct Reply<T>(Arc<Mutex<Option<oneshot::Sender<IoResult<T>>>>>);

impl<T> Reply<T> {
    /// Creates a new reply handle and the receiver for its result. The
    /// receiver reports an error if every handle is dropped without a reply.
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<IoResult<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    /// Sends the result to the client. Returns `false` if a result was already
    /// sent.
    pub fn send(&self, r: IoResult<T>) -> bool {
        let Some(tx) = self.0.lock().take() else {
            debug!("Ignoring duplicate reply");
            return false;
        };
        // The client may have given up on the request
        let _ = tx.send(r);
        true
    }

    /// Returns whether a result was sent.
    #[inline]
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.0.lock().is_none()
    }
}

impl<T> Clone for Reply<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Debug for Reply<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct("Reply"))
            .field("sent", &self.is_sent())
            .finish()
    }
}

/// Characteristic read request.
#[derive(Clone, Debug)]
pub struct ReadReq {
    pub(crate) off: usize,
    pub(crate) reply: Reply<Vec<u8>>,
}

impl ReadReq {
    /// Returns the value offset.
    #[inline(always)]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.off
    }

    /// Responds with the attribute value starting at the requested offset.
    #[inline]
    pub fn respond(&self, v: impl Into<Vec<u8>>) -> bool {
        self.reply.send(Ok(v.into()))
    }

    /// Responds with the complete attribute value, applying the requested
    /// offset. Offsets past the end of the value return `InvalidOffset`.
    #[inline]
    pub fn complete(&self, v: impl AsRef<[u8]>) -> bool {
        let r = v.as_ref().get(self.off..).ok_or(ErrorCode::InvalidOffset);
        self.reply.send(r.map(<[u8]>::to_vec))
    }

    /// Rejects the request.
    #[inline]
    pub fn error(&self, e: ErrorCode) -> bool {
        self.reply.send(Err(e))
    }
}

/// Characteristic write request.
#[derive(Clone, Debug)]
pub struct WriteReq {
    pub(crate) off: usize,
    pub(crate) val: Arc<[u8]>,
    pub(crate) without_response: bool,
    pub(crate) reply: Reply<()>,
}

impl WriteReq {
    /// Returns the value offset.
    #[inline(always)]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.off
    }

    /// Returns the value to be written at the specified offset.
    #[inline(always)]
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.val
    }

    /// Returns whether the client does not expect a response. Replies to such
    /// requests are discarded.
    #[inline(always)]
    #[must_use]
    pub const fn without_response(&self) -> bool {
        self.without_response
    }

    /// Accepts the write.
    #[inline]
    pub fn ok(&self) -> bool {
        self.reply.send(Ok(()))
    }

    /// Rejects the write.
    #[inline]
    pub fn error(&self, e: ErrorCode) -> bool {
        self.reply.send(Err(e))
    }

    /// Updates `dst` with the written value. Returns either `InvalidOffset` or
    /// `InvalidAttributeValueLength` if the written value is not a subslice of
    /// `dst`.
    pub fn update(&self, mut dst: impl AsMut<[u8]>) -> IoResult {
        let Some(dst) = dst.as_mut().get_mut(self.off..) else {
            return Err(ErrorCode::InvalidOffset);
        };
        let Some(dst) = dst.get_mut(..self.val.len()) else {
            return Err(ErrorCode::InvalidAttributeValueLength);
        };
        dst.copy_from_slice(&self.val);
        Ok(())
    }
}

/// Client subscription request. The receiver is expected to keep the
/// [`Notifier`] and use it to send value updates until the session closes.
#[derive(Clone, Debug)]
pub struct SubscribeReq {
    pub(crate) max_len: usize,
    pub(crate) notifier: Notifier,
}

impl SubscribeReq {
    /// Returns the maximum notification value length.
    #[inline(always)]
    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    /// Returns the update callback for this subscription.
    #[inline(always)]
    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// Error returned when notifying a closed subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("notification session closed")]
pub struct NotifyClosed;

/// Update callback of a notification session.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    ct: CancellationToken,
    max_len: usize,
}

impl Notifier {
    /// Sends an updated value to the client, truncating it to the maximum
    /// notification length.
    pub fn notify(&self, v: impl AsRef<[u8]>) -> Result<(), NotifyClosed> {
        if self.ct.is_cancelled() {
            return Err(NotifyClosed);
        }
        let v = v.as_ref();
        let v = &v[..v.len().min(self.max_len)];
        self.tx.send(v.to_vec()).map_err(|_| NotifyClosed)
    }

    /// Returns whether the notification session is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.ct.is_cancelled() || self.tx.is_closed()
    }

    /// Returns when the notification session is closed. This method is cancel
    /// safe.
    #[inline]
    pub async fn closed(&self) {
        self.ct.cancelled().await;
    }

    /// Returns whether both notifiers belong to the same session.
    #[inline]
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Client side of a notification session. Dropping it closes the session.
pub struct Notifications {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ct: CancellationToken,
    delivered: Option<Handler>,
}

impl Notifications {
    /// Creates a new session and its server-side notifier.
    pub(crate) fn new(max_len: usize, delivered: Option<Handler>) -> (Self, Notifier) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ct = CancellationToken::new();
        let n = Notifier {
            tx,
            ct: ct.clone(),
            max_len,
        };
        (Self { rx, ct, delivered }, n)
    }

    /// Receives the next value update. Returns [`None`] once the session is
    /// closed and all pending values were received.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let v = tokio::select! {
            biased;
            v = self.rx.recv() => v?,
            _ = self.ct.cancelled() => return self.rx.try_recv().ok(),
        };
        if let Some(f) = self.delivered.as_ref() {
            f();
        }
        Some(v)
    }

    /// Closes the session.
    #[inline]
    pub fn close(&self) {
        self.ct.cancel();
    }

    /// Returns whether the session is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.ct.is_cancelled()
    }
}

impl Debug for Notifications {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct(name_of!(Notifications)))
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Notifications {
    fn drop(&mut self) {
        if !self.ct.is_cancelled() {
            debug!("Client dropped notification session");
            self.ct.cancel();
        }
    }
}
