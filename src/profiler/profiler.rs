use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::device::{Characteristic, Device, Service};
use crate::gap::{Service as Svc, Uuid};
use crate::le::Addr;
use crate::radio::{self, CharInfo, Central, Link, ScanEvent};

use super::tracker::Tracker;
use super::*;

/// Single-use discovery coordinator for one target peripheral.
#[derive(Debug)]
pub struct Profiler<C: Central> {
    central: C,
    target: Addr,
    peers: ScanTable,
}

/// Completed discovery procedure.
enum Step {
    /// Characteristics of the service at the specified index.
    Chars(usize, Vec<CharInfo>),
    /// Descriptors of the characteristic at the specified service and
    /// characteristic indices.
    Descs(usize, usize, Vec<Uuid>),
}

impl<C: Central> Profiler<C> {
    /// Creates a profiler for the peripheral with the specified address.
    #[inline]
    #[must_use]
    pub fn new(central: C, target: Addr) -> Self {
        Self {
            central,
            target,
            peers: ScanTable::default(),
        }
    }

    /// Returns the target address.
    #[inline(always)]
    #[must_use]
    pub const fn target(&self) -> Addr {
        self.target
    }

    /// Scans for the target, connects to it, and discovers its GATT database.
    pub async fn profile(mut self) -> Result<Device> {
        let link = self.connect().await?;
        let services = discover(&link).await?;
        let p = self.peers.remove(self.target).unwrap_or_default();
        let dev = Device {
            address: self.target,
            name: p.local_name().map(str::to_owned),
            adv_data: p.adv_data.unwrap_or_default(),
            scan_data: p.scan_data,
            services,
        };
        info!(
            "Profiled {} ({:?}) with {} service(s)",
            dev.address,
            dev.name.as_deref().unwrap_or_default(),
            dev.services.len()
        );
        Ok(dev)
    }

    /// Runs the scan until the target is discovered and connects to it.
    async fn connect(&mut self) -> Result<C::Link> {
        let mut events = (self.central.events()).ok_or(Error::ScanClosed(self.target))?;
        info!("Waiting for {}", self.target);
        while let Some(evt) = events.recv().await {
            match evt {
                ScanEvent::PoweredOn => {
                    debug!("Radio powered on, starting scan");
                    self.central.start_scan().map_err(Error::Scan)?;
                }
                ScanEvent::PoweredOff => {
                    warn!("Radio powered off, stopping scan");
                    self.central.stop_scan();
                }
                ScanEvent::Report(r) => self.peers.report(&r),
                ScanEvent::Discovered(d) => {
                    if d.addr != self.target {
                        trace!("Ignoring {} ({:?})", d.addr, d.local_name);
                        continue;
                    }
                    let p = self.peers.peer(d.addr);
                    if p.connected {
                        debug!("Ignoring duplicate discovery of {}", d.addr);
                        continue;
                    }
                    if d.local_name.is_some() {
                        p.name = d.local_name;
                    }
                    if !d.connectable {
                        warn!("{} is advertising as non-connectable", d.addr);
                    }
                    self.central.stop_scan();
                    info!("Connecting to {}", d.addr);
                    let link = (self.central.connect(d.addr).await).map_err(Error::Connect)?;
                    self.peers.peer(d.addr).connected = true;
                    return Ok(link);
                }
            }
        }
        Err(Error::ScanClosed(self.target))
    }
}

/// Discovers all services, characteristics, and descriptors. The implicit GAP
/// and GATT services are skipped.
async fn discover<L: Link>(link: &L) -> Result<Vec<Service>> {
    let uuids = (link.discover_services().await).map_err(Error::Discovery)?;
    debug!("Discovered services: {uuids:?}");
    let mut t = Tracker::default();
    let mut out: Vec<Service> = Vec::with_capacity(uuids.len());
    let mut tasks = JoinSet::new();
    let mut done = t.start(uuids.len());
    for uuid in uuids {
        if uuid == Svc::GenericAccess || uuid == Svc::GenericAttribute {
            trace!("Skipping implicit service {uuid}");
            done = t.service_done();
            continue;
        }
        let i = (out.iter().position(|s| s.uuid == uuid)).unwrap_or_else(|| {
            out.push(Service::new(uuid));
            out.len() - 1
        });
        let link = link.clone();
        tasks.spawn(async move {
            let v = link.discover_characteristics(uuid).await?;
            Ok::<_, radio::Error>(Step::Chars(i, v))
        });
    }
    while !done {
        let Some(r) = tasks.join_next().await else {
            unreachable!("discovery tasks exhausted before completion");
        };
        let r = r.map_err(|e| Error::Discovery(radio::Error::Backend(e.to_string())))?;
        done = match r.map_err(Error::Discovery)? {
            Step::Chars(i, chars) => {
                let svc = &mut out[i];
                trace!("Service {} characteristics: {chars:?}", svc.uuid);
                t.add_chars(chars.len());
                for c in chars {
                    let j = if let Some(j) = (svc.characteristics.iter()).position(|v| v.uuid == c.uuid) {
                        svc.characteristics[j].properties = c.props;
                        j
                    } else {
                        svc.characteristics.push(Characteristic {
                            uuid: c.uuid,
                            properties: c.props,
                            descriptors: Vec::new(),
                        });
                        svc.characteristics.len() - 1
                    };
                    let (link, s) = (link.clone(), svc.uuid);
                    tasks.spawn(async move {
                        let v = link.discover_descriptors(s, c.uuid).await?;
                        Ok::<_, radio::Error>(Step::Descs(i, j, v))
                    });
                }
                t.service_done()
            }
            Step::Descs(i, j, descs) => {
                let c = &mut out[i].characteristics[j];
                trace!("Characteristic {} descriptors: {descs:?}", c.uuid);
                t.add_descs(descs.len());
                c.descriptors.extend(descs);
                t.char_done()
            }
        };
    }
    debug_assert!(t.is_done() && tasks.is_empty());
    debug!(
        "Discovery complete: {} service(s), {} descriptor(s)",
        out.len(),
        t.descriptors()
    );
    Ok(out)
}
