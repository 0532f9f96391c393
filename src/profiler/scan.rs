use std::collections::HashMap;

use tracing::trace;

use crate::gap::ResponseData;
use crate::le::Addr;
use crate::radio::{AdvReport, ReportKind};

/// Advertising state captured for one peer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PeerRecord {
    /// Payload of the first advertising report.
    pub adv_data: Option<Vec<u8>>,
    /// First scan response payload. Never replaced once set.
    pub scan_data: Option<Vec<u8>>,
    /// Local name reported by the scanner.
    pub name: Option<String>,
    /// Signal strength of the latest report.
    pub rssi: Option<i8>,
    /// Whether a connection was established.
    pub connected: bool,
}

impl PeerRecord {
    /// Returns the reported name or the local name contained in the captured
    /// advertising data or scan response.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        (self.name.as_deref())
            .or_else(|| ResponseData::new(self.adv_data.as_deref()?).local_name())
            .or_else(|| ResponseData::new(self.scan_data.as_deref()?).local_name())
    }
}

/// Advertising state of every peer seen during a scan.
#[derive(Debug, Default)]
pub struct ScanTable(HashMap<Addr, PeerRecord>);

impl ScanTable {
    /// Records an advertising report.
    ///
    /// The first payload from a new peer becomes its advertising data. A
    /// report explicitly typed as a scan response is stored as the scan
    /// response if none was stored yet. Untyped reports are classified by
    /// content: a payload that differs from the advertising data is assumed to
    /// be the scan response. Reports typed as advertising data never become
    /// scan responses.
    pub fn report(&mut self, r: &AdvReport) {
        let p = self.0.entry(r.addr).or_default();
        p.rssi = Some(r.rssi);
        match (r.kind, p.adv_data.as_deref()) {
            (Some(ReportKind::ScanRsp), _) => {
                if p.scan_data.is_none() {
                    trace!("Scan response from {}: {:02X?}", r.addr, r.data);
                    p.scan_data = Some(r.data.clone());
                }
            }
            (_, None) => {
                trace!("Advertising data from {}: {:02X?}", r.addr, r.data);
                p.adv_data = Some(r.data.clone());
            }
            (Some(ReportKind::Adv), Some(_)) => {}
            (None, Some(adv)) => {
                if p.scan_data.is_none() && adv != r.data {
                    trace!("Assumed scan response from {}: {:02X?}", r.addr, r.data);
                    p.scan_data = Some(r.data.clone());
                }
            }
        }
    }

    /// Returns the record of the specified peer.
    #[inline]
    #[must_use]
    pub fn get(&self, addr: Addr) -> Option<&PeerRecord> {
        self.0.get(&addr)
    }

    /// Returns the record of the specified peer, creating it if needed.
    #[inline]
    pub fn peer(&mut self, addr: Addr) -> &mut PeerRecord {
        self.0.entry(addr).or_default()
    }

    /// Removes and returns the record of the specified peer.
    #[inline]
    pub fn remove(&mut self, addr: Addr) -> Option<PeerRecord> {
        self.0.remove(&addr)
    }

    /// Returns the number of peers seen.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no peers were seen.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
