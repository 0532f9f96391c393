use crate::gap::Uuid;
use crate::gatt::{ReadReq, SubscribeReq, WriteReq};

/// Client operation on an emulated characteristic.
#[derive(Clone, Debug)]
pub struct Event {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub op: Op,
}

impl Event {
    /// Returns the operation kind.
    #[inline(always)]
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        self.op.kind()
    }
}

/// Client operation and its request, if any. Requests share one reply handle
/// across every listener that receives the event.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Op {
    Read(ReadReq),
    Write(WriteReq),
    Subscribe(SubscribeReq),
    Unsubscribe,
    /// A notification was delivered to the client.
    Notify,
}

impl Op {
    /// Returns the operation kind.
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        match *self {
            Self::Read(_) => OpKind::Read,
            Self::Write(_) => OpKind::Write,
            Self::Subscribe(_) => OpKind::Subscribe,
            Self::Unsubscribe => OpKind::Unsubscribe,
            Self::Notify => OpKind::Notify,
        }
    }
}

/// Operation kind used as the key of global listeners.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OpKind {
    Read,
    Write,
    Subscribe,
    Unsubscribe,
    Notify,
}
