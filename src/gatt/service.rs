use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::gap::{Descriptor as Desc, Uuid};
use crate::name_of;

use super::*;

/// Read request handler.
pub type ReadFn = Arc<dyn Fn(ReadReq) + Send + Sync>;
/// Write request handler.
pub type WriteFn = Arc<dyn Fn(WriteReq) + Send + Sync>;
/// Subscription request handler.
pub type SubscribeFn = Arc<dyn Fn(SubscribeReq) + Send + Sync>;
/// Parameterless event handler.
pub type Handler = Arc<dyn Fn() + Send + Sync>;

/// Default value of descriptors that are not managed by the radio stack.
pub const PLACEHOLDER_VALUE: &[u8] = b"notifs";

/// Primary service declaration.
#[derive(Clone, Debug)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    /// Creates an empty service.
    #[inline]
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    /// Adds a characteristic to the service.
    #[inline]
    #[must_use]
    pub fn with(mut self, c: Characteristic) -> Self {
        self.characteristics.push(c);
        self
    }

    /// Returns the characteristic with the specified UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Characteristic declaration, its descriptors, and the I/O handlers that
/// serve client operations.
#[derive(Clone, Debug)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub props: Props,
    pub descriptors: Vec<Descriptor>,
    pub io: Io,
}

impl Characteristic {
    /// Creates a characteristic without descriptors or handlers.
    #[inline]
    #[must_use]
    pub fn new(uuid: Uuid, props: Props) -> Self {
        Self {
            uuid,
            props,
            descriptors: Vec::new(),
            io: Io::default(),
        }
    }

    /// Adds a descriptor.
    #[inline]
    #[must_use]
    pub fn with_descriptor(mut self, d: Descriptor) -> Self {
        self.descriptors.push(d);
        self
    }

    /// Sets the I/O handlers.
    #[inline]
    #[must_use]
    pub fn with_io(mut self, io: Io) -> Self {
        self.io = io;
        self
    }

    /// Executes a client read at the specified offset. Returns
    /// `ReadNotPermitted` if there is no read handler and `UnlikelyError` if
    /// the handler dropped the request without a reply.
    pub async fn read(&self, off: usize) -> IoResult<Vec<u8>> {
        let Some(f) = self.io.read.as_ref() else {
            return Err(ErrorCode::ReadNotPermitted);
        };
        trace!("Read {} at offset {off}", self.uuid);
        let (reply, rx) = Reply::new();
        f(ReadReq { off, reply });
        rx.await.unwrap_or_else(|_| {
            debug!("No reply to read of {}", self.uuid);
            Err(ErrorCode::UnlikelyError)
        })
    }

    /// Executes a client write. Writes without response return as soon as the
    /// handler is called.
    pub async fn write(&self, off: usize, val: &[u8], without_response: bool) -> IoResult {
        let Some(f) = self.io.write.as_ref() else {
            return Err(ErrorCode::WriteNotPermitted);
        };
        trace!("Write {} at offset {off}: {val:02X?}", self.uuid);
        let (reply, rx) = Reply::new();
        f(WriteReq {
            off,
            val: Arc::from(val),
            without_response,
            reply,
        });
        if without_response {
            return Ok(());
        }
        rx.await.unwrap_or_else(|_| {
            debug!("No reply to write of {}", self.uuid);
            Err(ErrorCode::UnlikelyError)
        })
    }

    /// Opens a notification session. Returns `RequestNotSupported` if the
    /// characteristic does not support subscriptions.
    pub fn subscribe(&self, max_len: usize) -> IoResult<Notifications> {
        let Some(f) = self.io.subscribe.as_ref() else {
            return Err(ErrorCode::RequestNotSupported);
        };
        debug!("Subscribe to {}", self.uuid);
        let (n, notifier) = Notifications::new(max_len, self.io.notify.clone());
        f(SubscribeReq { max_len, notifier });
        Ok(n)
    }

    /// Reports the end of a notification session.
    pub fn unsubscribe(&self) {
        debug!("Unsubscribe from {}", self.uuid);
        if let Some(f) = self.io.unsubscribe.as_ref() {
            f();
        }
    }
}

/// Characteristic descriptor declaration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub value: DescValue,
}

impl Descriptor {
    /// Creates a descriptor for an emulated characteristic. The Client
    /// Characteristic Configuration descriptor is left to the radio stack and
    /// every other descriptor gets [`PLACEHOLDER_VALUE`]. Device descriptions
    /// do not capture descriptor values, so user descriptions, presentation
    /// formats, and similar descriptors will not match the original device.
    #[must_use]
    pub fn placeholder(uuid: Uuid) -> Self {
        let value = if uuid == Desc::ClientCharacteristicConfiguration {
            DescValue::Managed
        } else {
            DescValue::Static(PLACEHOLDER_VALUE.to_vec())
        };
        Self { uuid, value }
    }
}

/// Descriptor value source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DescValue {
    /// Value maintained by the radio stack.
    Managed,
    /// Fixed value.
    Static(Vec<u8>),
}

/// Characteristic I/O handlers. Missing handlers reject the corresponding
/// client operation.
#[derive(Clone, Default)]
pub struct Io {
    read: Option<ReadFn>,
    write: Option<WriteFn>,
    subscribe: Option<SubscribeFn>,
    unsubscribe: Option<Handler>,
    notify: Option<Handler>,
}

impl Io {
    /// Sets the read request handler.
    #[inline]
    #[must_use]
    pub fn on_read(mut self, f: impl Fn(ReadReq) + Send + Sync + 'static) -> Self {
        self.read = Some(Arc::new(f));
        self
    }

    /// Sets the write request handler.
    #[inline]
    #[must_use]
    pub fn on_write(mut self, f: impl Fn(WriteReq) + Send + Sync + 'static) -> Self {
        self.write = Some(Arc::new(f));
        self
    }

    /// Sets the subscription handler.
    #[inline]
    #[must_use]
    pub fn on_subscribe(mut self, f: impl Fn(SubscribeReq) + Send + Sync + 'static) -> Self {
        self.subscribe = Some(Arc::new(f));
        self
    }

    /// Sets the unsubscription handler.
    #[inline]
    #[must_use]
    pub fn on_unsubscribe(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.unsubscribe = Some(Arc::new(f));
        self
    }

    /// Sets the handler called after each notification is delivered to the
    /// client.
    #[inline]
    #[must_use]
    pub fn on_notify(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.notify = Some(Arc::new(f));
        self
    }

    /// Returns whether a read handler is set.
    #[inline(always)]
    #[must_use]
    pub const fn can_read(&self) -> bool {
        self.read.is_some()
    }

    /// Returns whether a write handler is set.
    #[inline(always)]
    #[must_use]
    pub const fn can_write(&self) -> bool {
        self.write.is_some()
    }

    /// Returns whether a subscription handler is set.
    #[inline(always)]
    #[must_use]
    pub const fn can_subscribe(&self) -> bool {
        self.subscribe.is_some()
    }
}

impl Debug for Io {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct(name_of!(Io)))
            .field("read", &self.can_read())
            .field("write", &self.can_write())
            .field("subscribe", &self.can_subscribe())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::gap::{Characteristic as Char, Service as Svc};

    use super::*;

    fn battery() -> Characteristic {
        let io = Io::default()
            .on_read(|r| {
                r.complete([0x64]);
            })
            .on_write(|w| {
                if w.value().len() == 1 {
                    w.ok();
                } else {
                    w.error(ErrorCode::InvalidAttributeValueLength);
                }
            });
        Characteristic::new(Char::BatteryLevel.uuid(), Props::READ | Props::WRITE).with_io(io)
    }

    #[tokio::test]
    async fn read_write() {
        let c = battery();
        assert_eq!(c.read(0).await, Ok(vec![0x64]));
        assert_eq!(c.read(1).await, Ok(vec![]));
        assert_eq!(c.read(2).await, Err(ErrorCode::InvalidOffset));
        assert_eq!(c.write(0, &[1], false).await, Ok(()));
        assert_eq!(
            c.write(0, &[1, 2], false).await,
            Err(ErrorCode::InvalidAttributeValueLength)
        );
        assert_eq!(c.write(0, &[1, 2], true).await, Ok(()));
        assert_eq!(c.subscribe(20).unwrap_err(), ErrorCode::RequestNotSupported);
    }

    #[tokio::test]
    async fn missing_handlers() {
        let c = Characteristic::new(Char::AlertLevel.uuid(), Props::READ);
        assert_eq!(c.read(0).await, Err(ErrorCode::ReadNotPermitted));
        assert_eq!(c.write(0, &[0], false).await, Err(ErrorCode::WriteNotPermitted));
        let c = c.with_io(Io::default().on_read(|_| {}));
        assert_eq!(c.read(0).await, Err(ErrorCode::UnlikelyError));
    }

    #[tokio::test]
    async fn notifications() {
        static DELIVERED: AtomicUsize = AtomicUsize::new(0);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let io = Io::default()
            .on_subscribe(move |s| {
                let _ = tx.send(s.notifier().clone());
            })
            .on_notify(|| {
                DELIVERED.fetch_add(1, Ordering::Relaxed);
            });
        let c = Characteristic::new(Char::BatteryLevel.uuid(), Props::NOTIFY).with_io(io);
        let mut n = c.subscribe(1).unwrap();
        let notifier = rx.recv().await.unwrap();
        notifier.notify([0x63, 0x62]).unwrap();
        assert_eq!(n.recv().await, Some(vec![0x63]));
        assert_eq!(DELIVERED.load(Ordering::Relaxed), 1);
        drop(n);
        assert!(notifier.is_closed());
        c.unsubscribe();
    }

    #[test]
    fn placeholder() {
        let cccd = Descriptor::placeholder(Desc::ClientCharacteristicConfiguration.uuid());
        assert_eq!(cccd.value, DescValue::Managed);
        let d = Descriptor::placeholder(Desc::CharacteristicUserDescription.uuid());
        assert_eq!(d.value, DescValue::Static(b"notifs".to_vec()));
        let s = Service::new(Svc::Battery.uuid()).with(battery());
        assert!(s.characteristic(Char::BatteryLevel.uuid()).is_some());
        assert!(s.characteristic(Char::AlertLevel.uuid()).is_none());
    }
}
