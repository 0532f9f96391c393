//! In-process radio that connects emulated peripherals to centrals without
//! hardware.
//!
//! All stations share one [`Air`]. Peripherals become visible to scanning
//! centrals while they advertise, and centrals connected to them exercise the
//! registered GATT services directly.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use futures_core::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::gap::{Characteristic as Char, Descriptor as Desc, ResponseData, Service as Svc, Uuid};
use crate::gatt::{self, IoResult, Notifications, Props};
use crate::le::Addr;
use crate::name_of;

use super::*;

/// Default maximum value length (`ATT_MTU` of 23 minus the notification
/// header).
pub const MAX_VAL_LEN: usize = 20;

/// Signal strength of every advertising report.
const RSSI: i8 = -40;

/// Peripheral configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Config {
    /// Controller index of the emulated adapter.
    pub device_id: u16,
}

/// Shared medium of the loopback radio.
#[derive(Clone, Default)]
pub struct Air(Arc<Mutex<State>>);

#[derive(Default)]
struct State {
    stations: HashMap<Addr, Station>,
    scanners: HashMap<Addr, Scanner>,
    links: HashSet<(Addr, Addr)>,
    next_central: u32,
}

struct Station {
    device_id: u16,
    name: Option<String>,
    powered: bool,
    adv: Option<(Vec<u8>, Vec<u8>)>,
    services: Arc<Vec<gatt::Service>>,
    events: mpsc::UnboundedSender<PeripheralEvent>,
}

impl Station {
    /// Returns the events announcing the station to a scanner.
    fn announce(&self, addr: Addr) -> Vec<ScanEvent> {
        let Some((adv, scan)) = self.adv.as_ref() else {
            return Vec::new();
        };
        let mut v = Vec::with_capacity(3);
        v.push(ScanEvent::Report(AdvReport {
            addr,
            data: adv.clone(),
            rssi: RSSI,
            kind: Some(ReportKind::Adv),
        }));
        if !scan.is_empty() {
            v.push(ScanEvent::Report(AdvReport {
                addr,
                data: scan.clone(),
                rssi: RSSI,
                kind: Some(ReportKind::ScanRsp),
            }));
        }
        let local_name = (ResponseData::new(adv).local_name())
            .or_else(|| ResponseData::new(scan).local_name())
            .map(str::to_owned);
        v.push(ScanEvent::Discovered(Discovered {
            addr,
            local_name,
            connectable: true,
        }));
        v
    }

    /// Returns the served services, starting with the services that the stack
    /// provides implicitly.
    fn all_services(&self) -> Vec<gatt::Service> {
        let name = self.name.clone().unwrap_or_default();
        let gap = gatt::Service::new(Svc::GenericAccess.uuid())
            .with(
                gatt::Characteristic::new(Char::DeviceName.uuid(), Props::READ).with_io(
                    gatt::Io::default().on_read(move |r| {
                        r.complete(name.as_bytes());
                    }),
                ),
            )
            .with(
                gatt::Characteristic::new(Char::Appearance.uuid(), Props::READ)
                    .with_io(gatt::Io::default().on_read(|r| {
                        r.complete([0, 0]);
                    })),
            );
        let gatt = gatt::Service::new(Svc::GenericAttribute.uuid()).with(
            gatt::Characteristic::new(Char::ServiceChanged.uuid(), Props::INDICATE)
                .with_descriptor(gatt::Descriptor::placeholder(
                    Desc::ClientCharacteristicConfiguration.uuid(),
                )),
        );
        let mut v = Vec::with_capacity(2 + self.services.len());
        v.push(gap);
        v.push(gatt);
        v.extend(self.services.iter().cloned());
        v
    }
}

struct Scanner {
    events: mpsc::UnboundedSender<ScanEvent>,
    scanning: bool,
}

impl Air {
    /// Creates an empty medium.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a powered-on peripheral with the specified address.
    ///
    /// # Panics
    ///
    /// Panics if the address is already in use.
    #[must_use]
    pub fn peripheral(&self, addr: Addr, cfg: &Config) -> LoopbackPeripheral {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut st = self.0.lock();
        assert!(
            !st.stations.contains_key(&addr) && !st.scanners.contains_key(&addr),
            "address {addr} already in use"
        );
        info!("Peripheral {addr} on hci{}", cfg.device_id);
        let _ = tx.send(PeripheralEvent::Ready(true));
        st.stations.insert(
            addr,
            Station {
                device_id: cfg.device_id,
                name: None,
                powered: true,
                adv: None,
                services: Arc::default(),
                events: tx,
            },
        );
        LoopbackPeripheral {
            air: self.clone(),
            addr,
            events: Mutex::new(Some(rx)),
        }
    }

    /// Creates a powered-on central with an automatically assigned address.
    #[must_use]
    pub fn central(&self) -> LoopbackCentral {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut st = self.0.lock();
        let addr = loop {
            st.next_central += 1;
            let [a, b, c, d] = st.next_central.to_le_bytes();
            let addr = Addr::from_le_bytes([a, b, c, d, 0x00, 0xC0]);
            if !st.stations.contains_key(&addr) {
                break addr;
            }
        };
        debug!("Central {addr}");
        let _ = tx.send(ScanEvent::PoweredOn);
        st.scanners.insert(
            addr,
            Scanner {
                events: tx,
                scanning: false,
            },
        );
        LoopbackCentral {
            air: self.clone(),
            addr,
            events: Mutex::new(Some(rx)),
        }
    }

    /// Returns the characteristic served by `peer` to `central`.
    fn characteristic(
        &self,
        central: Addr,
        peer: Addr,
        svc: Uuid,
        chr: Uuid,
    ) -> Result<gatt::Characteristic> {
        let s = self.services(central, peer)?;
        let s = s.iter().find(|s| s.uuid == svc);
        (s.and_then(|s| s.characteristic(chr)).cloned()).ok_or(Error::Att(ErrorCode::AttributeNotFound))
    }

    /// Returns the services served by `peer` to `central`.
    fn services(&self, central: Addr, peer: Addr) -> Result<Vec<gatt::Service>> {
        let st = self.0.lock();
        if !st.links.contains(&(central, peer)) {
            return Err(Error::Disconnected);
        }
        (st.stations.get(&peer).map(Station::all_services)).ok_or(Error::Disconnected)
    }

    /// Drops all links to `peer`, notifying the peripheral.
    fn drop_links(st: &mut State, peer: Addr) {
        let Some(stn) = st.stations.get(&peer) else {
            st.links.retain(|&(_, p)| p != peer);
            return;
        };
        st.links.retain(|&(c, p)| {
            if p != peer {
                return true;
            }
            let _ = stn.events.send(PeripheralEvent::Disconnect(c));
            false
        });
    }
}

impl Debug for Air {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let st = self.0.lock();
        (f.debug_struct(name_of!(Air)))
            .field("stations", &st.stations.keys().collect::<Vec<_>>())
            .field("scanners", &st.scanners.keys().collect::<Vec<_>>())
            .field("links", &st.links)
            .finish()
    }
}

/// Emulated peripheral-mode adapter.
pub struct LoopbackPeripheral {
    air: Air,
    addr: Addr,
    events: Mutex<Option<mpsc::UnboundedReceiver<PeripheralEvent>>>,
}

impl LoopbackPeripheral {
    /// Returns the peripheral address.
    #[inline(always)]
    #[must_use]
    pub const fn addr(&self) -> Addr {
        self.addr
    }

    /// Powers the adapter on or off. Powering off stops advertising and drops
    /// all connections.
    pub fn power(&self, on: bool) {
        let mut st = self.air.0.lock();
        if !on {
            Air::drop_links(&mut st, self.addr);
        }
        let Some(stn) = st.stations.get_mut(&self.addr) else {
            return;
        };
        if stn.powered == on {
            return;
        }
        debug!("Peripheral {} powered {}", self.addr, if on { "on" } else { "off" });
        stn.powered = on;
        if !on {
            stn.adv = None;
        }
        let _ = stn.events.send(PeripheralEvent::Ready(on));
    }

    fn with<T>(&self, f: impl FnOnce(&mut Station) -> Result<T>) -> Result<T> {
        let mut st = self.air.0.lock();
        let stn = st.stations.get_mut(&self.addr).ok_or(Error::UnknownPeer(self.addr))?;
        if !stn.powered {
            return Err(Error::NotPowered);
        }
        f(stn)
    }
}

impl Peripheral for LoopbackPeripheral {
    fn events(&self) -> Option<mpsc::UnboundedReceiver<PeripheralEvent>> {
        self.events.lock().take()
    }

    fn set_name(&self, name: &str) {
        if let Some(stn) = self.air.0.lock().stations.get_mut(&self.addr) {
            stn.name = Some(name.to_owned());
        }
    }

    fn start_advertising(&self, adv: &[u8], scan: &[u8]) -> Result<()> {
        let mut st = self.air.0.lock();
        let st = &mut *st;
        let stn = (st.stations.get_mut(&self.addr)).ok_or(Error::UnknownPeer(self.addr))?;
        if !stn.powered {
            return Err(Error::NotPowered);
        }
        debug!(
            "Peripheral {} (hci{}) advertising {adv:02X?} {scan:02X?}",
            self.addr, stn.device_id
        );
        stn.adv = Some((adv.to_vec(), scan.to_vec()));
        let evts = stn.announce(self.addr);
        for sc in st.scanners.values().filter(|sc| sc.scanning) {
            for e in &evts {
                let _ = sc.events.send(e.clone());
            }
        }
        Ok(())
    }

    fn stop_advertising(&self) {
        if let Some(stn) = self.air.0.lock().stations.get_mut(&self.addr) {
            if stn.adv.take().is_some() {
                debug!("Peripheral {} stopped advertising", self.addr);
            }
        }
    }

    fn set_services(&self, svcs: Vec<gatt::Service>) -> Result<()> {
        self.with(|stn| {
            debug!("Peripheral {} serving {} service(s)", self.addr, svcs.len());
            stn.services = Arc::new(svcs);
            Ok(())
        })
    }
}

impl Debug for LoopbackPeripheral {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct(name_of!(LoopbackPeripheral)))
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Drop for LoopbackPeripheral {
    fn drop(&mut self) {
        let mut st = self.air.0.lock();
        Air::drop_links(&mut st, self.addr);
        st.stations.remove(&self.addr);
    }
}

/// Emulated central-mode adapter.
pub struct LoopbackCentral {
    air: Air,
    addr: Addr,
    events: Mutex<Option<mpsc::UnboundedReceiver<ScanEvent>>>,
}

impl LoopbackCentral {
    /// Returns the central address.
    #[inline(always)]
    #[must_use]
    pub const fn addr(&self) -> Addr {
        self.addr
    }

    /// Scans until the specified peer is discovered and connects to it. This
    /// consumes the scan event stream.
    pub async fn scan_connect(&self, peer: Addr) -> Result<LoopbackLink> {
        let Some(mut events) = self.events() else {
            return Err(Error::Backend("scan event stream is already taken".to_owned()));
        };
        self.start_scan()?;
        while let Some(evt) = events.recv().await {
            if matches!(evt, ScanEvent::Discovered(ref d) if d.addr == peer) {
                self.stop_scan();
                return self.connect(peer).await;
            }
        }
        Err(Error::NotPowered)
    }
}

impl Central for LoopbackCentral {
    type Link = LoopbackLink;

    fn events(&self) -> Option<mpsc::UnboundedReceiver<ScanEvent>> {
        self.events.lock().take()
    }

    fn start_scan(&self) -> Result<()> {
        let mut st = self.air.0.lock();
        let st = &mut *st;
        let sc = st.scanners.get_mut(&self.addr).ok_or(Error::NotPowered)?;
        if sc.scanning {
            return Ok(());
        }
        debug!("Central {} scanning", self.addr);
        sc.scanning = true;
        for (&addr, stn) in &st.stations {
            for e in stn.announce(addr) {
                let _ = sc.events.send(e);
            }
        }
        Ok(())
    }

    fn stop_scan(&self) {
        if let Some(sc) = self.air.0.lock().scanners.get_mut(&self.addr) {
            if sc.scanning {
                debug!("Central {} stopped scanning", self.addr);
                sc.scanning = false;
            }
        }
    }

    fn connect(&self, peer: Addr) -> BoxFuture<'static, Result<LoopbackLink>> {
        let (air, central) = (self.air.clone(), self.addr);
        Box::pin(async move {
            let mut st = air.0.lock();
            let stn = st.stations.get(&peer).ok_or(Error::UnknownPeer(peer))?;
            if !stn.powered {
                return Err(Error::NotPowered);
            }
            if stn.adv.is_none() {
                return Err(Error::UnknownPeer(peer));
            }
            let _ = stn.events.send(PeripheralEvent::Accept(central));
            st.links.insert((central, peer));
            drop(st);
            info!("Central {central} connected to {peer}");
            Ok(LoopbackLink { air, central, peer })
        })
    }
}

impl Debug for LoopbackCentral {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct(name_of!(LoopbackCentral)))
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Drop for LoopbackCentral {
    fn drop(&mut self) {
        let mut st = self.air.0.lock();
        st.scanners.remove(&self.addr);
        let central = self.addr;
        let st = &mut *st;
        st.links.retain(|&(c, p)| {
            if c != central {
                return true;
            }
            if let Some(stn) = st.stations.get(&p) {
                let _ = stn.events.send(PeripheralEvent::Disconnect(c));
            }
            false
        });
    }
}

/// Connection from a loopback central to a loopback peripheral.
#[derive(Clone, Debug)]
pub struct LoopbackLink {
    air: Air,
    central: Addr,
    peer: Addr,
}

impl LoopbackLink {
    /// Returns the peer address.
    #[inline(always)]
    #[must_use]
    pub const fn peer(&self) -> Addr {
        self.peer
    }

    /// Reads a characteristic value at the specified offset.
    pub async fn read(&self, svc: Uuid, chr: Uuid, off: usize) -> Result<Vec<u8>> {
        let c = self.air.characteristic(self.central, self.peer, svc, chr)?;
        Ok(att(c.read(off).await)?)
    }

    /// Writes a characteristic value.
    pub async fn write(&self, svc: Uuid, chr: Uuid, val: &[u8], without_response: bool) -> Result<()> {
        let c = self.air.characteristic(self.central, self.peer, svc, chr)?;
        Ok(att(c.write(0, val, without_response).await)?)
    }

    /// Subscribes to characteristic value updates.
    pub fn subscribe(&self, svc: Uuid, chr: Uuid) -> Result<Subscription> {
        let c = self.air.characteristic(self.central, self.peer, svc, chr)?;
        if !c.props.is_notifiable() {
            return Err(Error::Att(ErrorCode::RequestNotSupported));
        }
        let n = att(c.subscribe(MAX_VAL_LEN))?;
        Ok(Subscription { chr: c, n })
    }

    /// Disconnects from the peer.
    pub fn disconnect(&self) {
        let mut st = self.air.0.lock();
        let st = &mut *st;
        if st.links.remove(&(self.central, self.peer)) {
            info!("Central {} disconnected from {}", self.central, self.peer);
            if let Some(stn) = st.stations.get(&self.peer) {
                let _ = stn.events.send(PeripheralEvent::Disconnect(self.central));
            }
        }
    }
}

/// Logs ATT errors returned to the client.
fn att<T>(r: IoResult<T>) -> IoResult<T> {
    if let Err(e) = r {
        trace!("ATT error: {e}");
    }
    r
}

impl Link for LoopbackLink {
    fn discover_services(&self) -> BoxFuture<'static, Result<Vec<Uuid>>> {
        let this = self.clone();
        Box::pin(async move {
            let v = this.air.services(this.central, this.peer)?;
            Ok(v.iter().map(|s| s.uuid).collect())
        })
    }

    fn discover_characteristics(&self, svc: Uuid) -> BoxFuture<'static, Result<Vec<CharInfo>>> {
        let this = self.clone();
        Box::pin(async move {
            let v = this.air.services(this.central, this.peer)?;
            let s = (v.iter().find(|s| s.uuid == svc))
                .ok_or(Error::Att(ErrorCode::AttributeNotFound))?;
            Ok((s.characteristics.iter())
                .map(|c| CharInfo {
                    uuid: c.uuid,
                    props: c.props,
                })
                .collect())
        })
    }

    fn discover_descriptors(&self, svc: Uuid, chr: Uuid) -> BoxFuture<'static, Result<Vec<Uuid>>> {
        let this = self.clone();
        Box::pin(async move {
            let c = this.air.characteristic(this.central, this.peer, svc, chr)?;
            Ok(c.descriptors.iter().map(|d| d.uuid).collect())
        })
    }
}

/// Client notification subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    chr: gatt::Characteristic,
    n: Notifications,
}

impl Subscription {
    /// Receives the next notification. Returns [`None`] when the session is
    /// closed by the server.
    #[inline]
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.n.recv().await
    }

    /// Unsubscribes from value updates.
    #[inline]
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.n.close();
        self.chr.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    const ADV: &[u8] = &[0x02, 0x01, 0x06, 0x04, 0x09, b'b', b'a', b't'];

    fn addr(s: &str) -> Addr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn scan_and_connect() {
        let air = Air::new();
        let p = air.peripheral(addr("00:11:22:33:44:55"), &Config::default());
        let mut pev = p.events().unwrap();
        assert!(p.events().is_none());
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Ready(true)));

        let c = air.central();
        let mut cev = c.events().unwrap();
        assert_eq!(cev.recv().await, Some(ScanEvent::PoweredOn));
        c.start_scan().unwrap();
        assert!(cev.try_recv().is_err());
        assert_matches!(c.connect(p.addr()).await, Err(Error::UnknownPeer(_)));

        p.start_advertising(ADV, &[0x02, 0x0A, 0x00]).unwrap();
        let Some(ScanEvent::Report(r)) = cev.recv().await else { panic!() };
        assert_eq!((r.data.as_slice(), r.kind), (ADV, Some(ReportKind::Adv)));
        let Some(ScanEvent::Report(r)) = cev.recv().await else { panic!() };
        assert_eq!(r.kind, Some(ReportKind::ScanRsp));
        let Some(ScanEvent::Discovered(d)) = cev.recv().await else { panic!() };
        assert_eq!(d.local_name.as_deref(), Some("bat"));
        c.stop_scan();

        let link = c.connect(p.addr()).await.unwrap();
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Accept(c.addr())));
        let svcs = link.discover_services().await.unwrap();
        assert_eq!(svcs, [Svc::GenericAccess.uuid(), Svc::GenericAttribute.uuid()]);
        p.set_name("battery");
        let name = link
            .read(Svc::GenericAccess.uuid(), Char::DeviceName.uuid(), 0)
            .await
            .unwrap();
        assert_eq!(name, b"battery");

        link.disconnect();
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Disconnect(c.addr())));
        assert_eq!(link.discover_services().await, Err(Error::Disconnected));
    }

    #[tokio::test]
    async fn power_off() {
        let air = Air::new();
        let p = air.peripheral(addr("00:11:22:33:44:55"), &Config { device_id: 1 });
        let mut pev = p.events().unwrap();
        p.start_advertising(ADV, &[]).unwrap();
        let c = air.central();
        let link = c.connect(p.addr()).await.unwrap();
        p.power(false);
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Ready(true)));
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Accept(c.addr())));
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Disconnect(c.addr())));
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Ready(false)));
        assert_eq!(link.discover_services().await, Err(Error::Disconnected));
        assert_eq!(p.start_advertising(ADV, &[]), Err(Error::NotPowered));
        assert_eq!(p.set_services(Vec::new()), Err(Error::NotPowered));
        assert_matches!(c.connect(p.addr()).await, Err(Error::NotPowered));
        p.power(true);
        assert_eq!(pev.recv().await, Some(PeripheralEvent::Ready(true)));
    }

    #[tokio::test]
    async fn scan_response_omitted() {
        let air = Air::new();
        let p = air.peripheral(addr("00:11:22:33:44:55"), &Config::default());
        p.start_advertising(ADV, &[]).unwrap();
        let c = air.central();
        let mut cev = c.events().unwrap();
        c.start_scan().unwrap();
        assert_eq!(cev.recv().await, Some(ScanEvent::PoweredOn));
        assert_matches!(cev.recv().await, Some(ScanEvent::Report(_)));
        assert_matches!(cev.recv().await, Some(ScanEvent::Discovered(_)));
        drop(p);
        assert_matches!(c.connect(addr("00:11:22:33:44:55")).await, Err(Error::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn scan_connect() {
        let air = Air::new();
        let p = air.peripheral(addr("00:11:22:33:44:55"), &Config::default());
        let c = air.central();
        let t = tokio::spawn({
            let c = air.central();
            async move { c.scan_connect(addr("00:11:22:33:44:55")).await.map(|l| l.peer()) }
        });
        tokio::task::yield_now().await;
        assert!(!t.is_finished());
        p.start_advertising(ADV, &[]).unwrap();
        assert_eq!(t.await.unwrap(), Ok(p.addr()));

        assert!(c.events().is_some());
        assert_matches!(c.scan_connect(p.addr()).await, Err(Error::Backend(_)));
    }
}
