use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::device::Device;
use crate::gap::Uuid;
use crate::gatt::{self, Notifier, NotifyClosed};
use crate::name_of;
use crate::radio::{Peripheral, PeripheralEvent};

use super::registry::NotifyRegistry;
use super::*;

/// Event listener. Listeners run synchronously on the radio task and must not
/// block.
pub type Listener = Arc<dyn Fn(&Mock, &Event) + Send + Sync>;

/// Emulator configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MockConfig {
    /// Advertised device name overriding the described one.
    pub name: Option<String>,
}

/// Emulated peripheral. Clones share listeners and notification callbacks.
#[derive(Clone)]
pub struct Mock(Arc<Inner>);

struct Inner {
    dev: Device,
    cfg: MockConfig,
    listeners: Mutex<Listeners>,
    ntf: Mutex<NotifyRegistry>,
}

#[derive(Default)]
struct Listeners {
    global: HashMap<OpKind, Vec<Listener>>,
    scoped: HashMap<Uuid, Vec<Listener>>,
}

impl Mock {
    /// Creates an emulator for the specified device.
    #[inline]
    #[must_use]
    pub fn new(dev: Device) -> Self {
        Self::with_config(dev, MockConfig::default())
    }

    /// Creates an emulator with an explicit configuration.
    #[must_use]
    pub fn with_config(dev: Device, cfg: MockConfig) -> Self {
        match dev.name.as_deref() {
            Some(name) => info!("Creating mock for device {name} ({})", dev.address),
            None => info!("Creating mock for device {}", dev.address),
        }
        Self(Arc::new(Inner {
            dev,
            cfg,
            listeners: Mutex::default(),
            ntf: Mutex::default(),
        }))
    }

    /// Returns the emulated device description.
    #[inline(always)]
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.0.dev
    }

    /// Returns the advertised GAP device name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        (self.0.cfg.name.as_deref()).or_else(|| self.0.dev.local_name())
    }

    /// Adds a listener for all operations of the specified kind.
    pub fn on(&self, kind: OpKind, f: impl Fn(&Self, &Event) + Send + Sync + 'static) -> &Self {
        let mut ls = self.0.listeners.lock();
        ls.global.entry(kind).or_default().push(Arc::new(f));
        self
    }

    /// Adds a listener for all operations on characteristics of the specified
    /// service.
    pub fn on_service(&self, svc: Uuid, f: impl Fn(&Self, &Event) + Send + Sync + 'static) -> &Self {
        let mut ls = self.0.listeners.lock();
        ls.scoped.entry(svc).or_default().push(Arc::new(f));
        self
    }

    /// Delivers an event to every global listener for its kind and then to
    /// every listener of its service. Listeners added during dispatch receive
    /// subsequent events only.
    pub fn dispatch(&self, e: &Event) {
        let (global, scoped) = {
            let ls = self.0.listeners.lock();
            (
                ls.global.get(&e.kind()).cloned().unwrap_or_default(),
                ls.scoped.get(&e.service).cloned().unwrap_or_default(),
            )
        };
        trace!(
            "{} {}/{} to {} global and {} scoped listener(s)",
            e.kind(),
            e.service,
            e.characteristic,
            global.len(),
            scoped.len()
        );
        for f in global.iter().chain(scoped.iter()) {
            f(self, e);
        }
    }

    /// Builds the live GATT surface. Handlers are attached according to the
    /// characteristic properties and hold only a weak reference to the
    /// emulator.
    #[must_use]
    pub fn services(&self) -> Vec<gatt::Service> {
        let w = Arc::downgrade(&self.0);
        let mut v = Vec::with_capacity(self.0.dev.services.len());
        for s in &self.0.dev.services {
            let mut svc = gatt::Service::new(s.uuid);
            for c in &s.characteristics {
                let (sid, cid, p) = (s.uuid, c.uuid, c.properties);
                let mut io = gatt::Io::default();
                if p.is_readable() {
                    let w = Weak::clone(&w);
                    io = io.on_read(move |r| emit(&w, sid, cid, Op::Read(r)));
                }
                if p.is_writable() {
                    let w = Weak::clone(&w);
                    io = io.on_write(move |r| emit(&w, sid, cid, Op::Write(r)));
                }
                if p.is_notifiable() {
                    let w1 = Weak::clone(&w);
                    let w2 = Weak::clone(&w);
                    let w3 = Weak::clone(&w);
                    io = io
                        .on_subscribe(move |r| emit(&w1, sid, cid, Op::Subscribe(r)))
                        .on_unsubscribe(move || emit(&w2, sid, cid, Op::Unsubscribe))
                        .on_notify(move || emit(&w3, sid, cid, Op::Notify));
                }
                let mut chr = gatt::Characteristic::new(cid, p).with_io(io);
                chr.descriptors = (c.descriptors.iter())
                    .map(|&d| gatt::Descriptor::placeholder(d))
                    .collect();
                svc.characteristics.push(chr);
            }
            v.push(svc);
        }
        v
    }

    /// Sets the update callback for a characteristic, replacing any previous
    /// one.
    pub fn register_notify_callback(&self, svc: Uuid, chr: Uuid, n: Notifier) {
        debug!("Registered notify callback for {svc}/{chr}");
        self.0.ntf.lock().register(svc, chr, n);
    }

    /// Returns the update callback for a characteristic.
    #[must_use]
    pub fn get_callback(&self, svc: Uuid, chr: Uuid) -> Option<Notifier> {
        self.0.ntf.lock().get(svc, chr).cloned()
    }

    /// Clears the update callback for a characteristic.
    pub fn unregister_notify_callback(&self, svc: Uuid, chr: Uuid) {
        if self.0.ntf.lock().unregister(svc, chr) {
            debug!("Unregistered notify callback for {svc}/{chr}");
        }
    }

    /// Sends a value update through the registered callback. Returns
    /// `Ok(false)` if no callback is registered.
    pub fn notify(&self, svc: Uuid, chr: Uuid, v: impl AsRef<[u8]>) -> Result<bool, NotifyClosed> {
        let Some(n) = self.get_callback(svc, chr) else {
            return Ok(false);
        };
        n.notify(v).map(|_| true)
    }

    /// Runs the peripheral lifecycle until the peripheral event stream ends.
    /// Advertising and registration errors are logged.
    pub async fn serve<P: Peripheral + ?Sized>(&self, p: &P) {
        let Some(mut events) = p.events() else {
            error!("Peripheral event stream is already taken");
            return;
        };
        while let Some(evt) = events.recv().await {
            match evt {
                PeripheralEvent::Ready(true) => self.advertise(p),
                PeripheralEvent::Ready(false) => {
                    warn!("Peripheral is not ready, stopping advertising");
                    p.stop_advertising();
                }
                PeripheralEvent::Accept(addr) => info!("Accepted connection from {addr}"),
                PeripheralEvent::Disconnect(addr) => info!("Disconnected from {addr}"),
            }
        }
        debug!("Peripheral event stream closed");
    }

    /// Spawns [`Self::serve`] on the current runtime.
    pub fn start<P: Peripheral + 'static>(&self, p: Arc<P>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.serve(&*p).await })
    }

    /// Starts advertising the captured payloads and registers the services
    /// once advertising has started. Advertising is stopped again if the
    /// services cannot be registered.
    fn advertise<P: Peripheral + ?Sized>(&self, p: &P) {
        if let Some(name) = self.name() {
            p.set_name(name);
        }
        let dev = &self.0.dev;
        let scan = dev.scan_data.as_deref().unwrap_or_default();
        if let Err(e) = p.start_advertising(&dev.adv_data, scan) {
            error!("Failed to start advertising: {e}");
            return;
        }
        info!("Advertising as {}", dev.address);
        match p.set_services(self.services()) {
            Ok(()) => info!("Registered {} service(s)", dev.services.len()),
            Err(e) => {
                error!("Failed to register services: {e}");
                p.stop_advertising();
            }
        }
    }
}

impl Debug for Mock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct(name_of!(Mock)))
            .field("address", &self.0.dev.address)
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Dispatches an event if the emulator still exists.
fn emit(w: &Weak<Inner>, service: Uuid, characteristic: Uuid, op: Op) {
    let Some(inner) = w.upgrade() else {
        debug!("Dropping {} for {service}/{characteristic}", op.kind());
        return;
    };
    Mock(inner).dispatch(&Event {
        service,
        characteristic,
        op,
    });
}
