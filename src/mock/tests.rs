use std::sync::Arc;

use matches::assert_matches;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::att::ErrorCode;
use crate::device::Device;
use crate::gap::{Characteristic as Char, Descriptor as Desc, Service as Svc, Uuid};
use crate::gatt::{self, DescValue, Notifications, Props};
use crate::profiler::Profiler;
use crate::radio::loopback::{Air, Config};
use crate::radio::{self, Central, Peripheral, PeripheralEvent, ScanEvent};

use super::*;

const VENDOR_SVC: &str = "4f1728011867a89628c01bfbc156fa45";
const VENDOR_CHR: &str = "4f1728021867a89628c01bfbc156fa45";

const DEVICE: &str = r#"{
    "address": "00:11:22:33:44:55",
    "name": "bat",
    "ad_records": "02010603020f18",
    "scan_data": "0409626174",
    "services": [
        {
            "uuid": "180f",
            "characteristics": [
                {"uuid": "2a19", "properties": ["read", "notify"], "descriptors": ["2902"]}
            ]
        },
        {
            "uuid": "1803",
            "characteristics": [
                {"uuid": "2a06", "properties": ["read", "write"], "descriptors": []}
            ]
        },
        {
            "uuid": "4f1728011867a89628c01bfbc156fa45",
            "characteristics": [
                {
                    "uuid": "4f1728021867a89628c01bfbc156fa45",
                    "properties": ["writeWithoutResponse", "indicate"],
                    "descriptors": ["2901", "2902"]
                }
            ]
        }
    ]
}"#;

fn device() -> Device {
    serde_json::from_str(DEVICE).unwrap()
}

fn uuid(s: &str) -> Uuid {
    s.parse().unwrap()
}

fn chr(svcs: &[gatt::Service], svc: Uuid, chr: Uuid) -> &gatt::Characteristic {
    let s = svcs.iter().find(|s| s.uuid == svc).unwrap();
    s.characteristic(chr).unwrap()
}

/// Responds to battery level and alert level reads.
fn responder(_: &Mock, e: &Event) {
    let Op::Read(r) = &e.op else { return };
    if e.service == Svc::Battery && e.characteristic == Char::BatteryLevel {
        r.complete([0x64]);
    } else if e.service == Svc::LinkLoss && e.characteristic == Char::AlertLevel {
        r.complete([0x00, 0x00]);
    } else {
        r.error(ErrorCode::UnlikelyError);
    }
}

#[tokio::test]
async fn fan_out() {
    let m = Mock::new(device());
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&log);
    m.on(OpKind::Read, move |_, e| {
        let Op::Read(r) = &e.op else { unreachable!() };
        l.lock().push(("global", e.service, e.characteristic, r.offset()));
        r.complete([0x64]);
    });
    let l = Arc::clone(&log);
    m.on_service(Svc::Battery.uuid(), move |_, e| {
        let Op::Read(r) = &e.op else { unreachable!() };
        l.lock().push(("scoped", e.service, e.characteristic, r.offset()));
        assert!(!r.respond([0xFF]));
    });
    m.on_service(Svc::LinkLoss.uuid(), |_, _| panic!("wrong service"));
    m.on(OpKind::Write, |_, _| panic!("wrong kind"));

    let svcs = m.services();
    let c = chr(&svcs, Svc::Battery.uuid(), Char::BatteryLevel.uuid());
    assert_eq!(c.read(0).await, Ok(vec![0x64]));
    let (bas, lvl) = (Svc::Battery.uuid(), Char::BatteryLevel.uuid());
    assert_eq!(*log.lock(), [("global", bas, lvl, 0), ("scoped", bas, lvl, 0)]);
}

#[tokio::test]
async fn read_handlers() {
    let m = Mock::new(device());
    m.on(OpKind::Read, responder);
    let svcs = m.services();
    let c = chr(&svcs, Svc::Battery.uuid(), Char::BatteryLevel.uuid());
    assert_eq!(c.read(0).await, Ok(vec![0x64]));
    assert_eq!(c.read(2).await, Err(ErrorCode::InvalidOffset));
    let c = chr(&svcs, Svc::LinkLoss.uuid(), Char::AlertLevel.uuid());
    assert_eq!(c.read(0).await, Ok(vec![0x00, 0x00]));
}

#[tokio::test]
async fn no_listener() {
    let m = Mock::new(device());
    let svcs = m.services();
    let c = chr(&svcs, Svc::LinkLoss.uuid(), Char::AlertLevel.uuid());
    assert_eq!(c.read(0).await, Err(ErrorCode::UnlikelyError));
    assert_eq!(c.write(0, &[1], false).await, Err(ErrorCode::UnlikelyError));
    drop(m);
    assert_eq!(c.read(0).await, Err(ErrorCode::UnlikelyError));
}

#[tokio::test]
async fn conditional_handlers() {
    let m = Mock::new(device());
    m.on(OpKind::Write, |_, e| {
        let Op::Write(w) = &e.op else { unreachable!() };
        w.ok();
    });
    let svcs = m.services();

    let c = chr(&svcs, Svc::Battery.uuid(), Char::BatteryLevel.uuid());
    assert!(c.io.can_read() && !c.io.can_write() && c.io.can_subscribe());
    assert_eq!(c.write(0, &[1], false).await, Err(ErrorCode::WriteNotPermitted));
    assert_eq!(c.descriptors[0].value, DescValue::Managed);

    let c = chr(&svcs, Svc::LinkLoss.uuid(), Char::AlertLevel.uuid());
    assert!(c.io.can_read() && c.io.can_write() && !c.io.can_subscribe());
    assert_eq!(c.write(0, &[1], false).await, Ok(()));
    assert_eq!(c.subscribe(20).unwrap_err(), ErrorCode::RequestNotSupported);

    let c = chr(&svcs, uuid(VENDOR_SVC), uuid(VENDOR_CHR));
    assert!(!c.io.can_read() && c.io.can_write() && c.io.can_subscribe());
    assert_eq!(c.props, Props::WRITE_WITHOUT_RESPONSE | Props::INDICATE);
    assert_eq!(c.read(0).await, Err(ErrorCode::ReadNotPermitted));
    assert_eq!(c.write(0, &[1, 2], true).await, Ok(()));
    assert_eq!(c.descriptors.len(), 2);
    assert_eq!(
        c.descriptors[0],
        gatt::Descriptor::placeholder(Desc::CharacteristicUserDescription.uuid())
    );
    assert_eq!(c.descriptors[0].value, DescValue::Static(b"notifs".to_vec()));
    assert_eq!(c.descriptors[1].value, DescValue::Managed);
}

#[test]
fn notify_registry() {
    let m = Mock::new(device());
    let (bas, lvl) = (Svc::Battery.uuid(), Char::BatteryLevel.uuid());
    assert!(m.get_callback(bas, lvl).is_none());
    m.unregister_notify_callback(bas, lvl);
    assert!(m.get_callback(bas, lvl).is_none());

    let (_n1, a) = Notifications::new(20, None);
    let (_n2, b) = Notifications::new(20, None);
    m.register_notify_callback(bas, lvl, a.clone());
    assert!(m.get_callback(bas, lvl).unwrap().same_session(&a));
    m.register_notify_callback(bas, lvl, b.clone());
    assert!(m.get_callback(bas, lvl).unwrap().same_session(&b));
    assert!(m.get_callback(bas, Char::AlertLevel.uuid()).is_none());
    assert!(m.get_callback(Svc::LinkLoss.uuid(), lvl).is_none());

    m.unregister_notify_callback(bas, lvl);
    assert!(m.get_callback(bas, lvl).is_none());
    m.unregister_notify_callback(bas, lvl);
    assert!(m.get_callback(bas, lvl).is_none());
    assert_eq!(m.notify(bas, lvl, [1]), Ok(false));
}

#[tokio::test]
async fn subscriptions() {
    let m = Mock::new(device());
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let k = Arc::clone(&kinds);
    m.on_service(Svc::Battery.uuid(), move |m, e| {
        k.lock().push(e.kind());
        match &e.op {
            Op::Subscribe(s) => {
                assert_eq!(s.max_len(), 20);
                m.register_notify_callback(e.service, e.characteristic, s.notifier().clone());
            }
            Op::Unsubscribe => m.unregister_notify_callback(e.service, e.characteristic),
            _ => {}
        }
    });
    let (bas, lvl) = (Svc::Battery.uuid(), Char::BatteryLevel.uuid());
    let svcs = m.services();
    let c = chr(&svcs, bas, lvl);
    let mut n = c.subscribe(20).unwrap();
    assert_eq!(m.notify(bas, lvl, [0x63]), Ok(true));
    assert_eq!(n.recv().await, Some(vec![0x63]));
    c.unsubscribe();
    assert_eq!(m.notify(bas, lvl, [0x62]), Ok(false));
    assert_eq!(
        *kinds.lock(),
        [OpKind::Subscribe, OpKind::Notify, OpKind::Unsubscribe]
    );
}

#[tokio::test]
async fn register_during_dispatch() {
    let m = Mock::new(device());
    let hits = Arc::new(Mutex::new(0));
    let h = Arc::clone(&hits);
    m.on(OpKind::Read, move |m, e| {
        let Op::Read(r) = &e.op else { return };
        r.complete([0]);
        let h = Arc::clone(&h);
        m.on_service(e.service, move |_, _| *h.lock() += 1);
    });
    let svcs = m.services();
    let c = chr(&svcs, Svc::Battery.uuid(), Char::BatteryLevel.uuid());
    c.read(0).await.unwrap();
    assert_eq!(*hits.lock(), 0);
    c.read(0).await.unwrap();
    assert_eq!(*hits.lock(), 1);
}

#[test]
fn name() {
    let m = Mock::new(device());
    assert_eq!(m.name(), Some("bat"));
    assert_eq!(
        format!("{m:?}"),
        r#"Mock { address: 00:11:22:33:44:55, name: Some("bat"), .. }"#
    );
    let mut dev = device();
    dev.name = None;
    assert_eq!(Mock::new(dev.clone()).name(), Some("bat"));
    let cfg = MockConfig {
        name: Some("spoof".to_owned()),
    };
    assert_eq!(Mock::with_config(dev, cfg).name(), Some("spoof"));
}

#[tokio::test]
async fn serve() {
    let air = Air::new();
    let dev = device();
    let c = air.central();
    let mut cev = c.events().unwrap();
    c.start_scan().unwrap();

    let m = Mock::new(dev.clone());
    m.on(OpKind::Read, responder);
    let p = Arc::new(air.peripheral(dev.address, &Config::default()));
    let task = m.start(Arc::clone(&p));

    let mut reports = Vec::new();
    loop {
        match cev.recv().await.unwrap() {
            ScanEvent::Report(r) => reports.push(r.data),
            ScanEvent::Discovered(d) => {
                assert_eq!(d.addr, dev.address);
                assert_eq!(d.local_name.as_deref(), Some("bat"));
                break;
            }
            _ => {}
        }
    }
    assert_eq!(reports, [dev.adv_data.clone(), dev.scan_data.clone().unwrap()]);

    let link = c.connect(dev.address).await.unwrap();
    let v = link.read(Svc::Battery.uuid(), Char::BatteryLevel.uuid(), 0).await;
    assert_eq!(v, Ok(vec![0x64]));
    let v = link.read(Svc::GenericAccess.uuid(), Char::DeviceName.uuid(), 0).await;
    assert_eq!(v, Ok(b"bat".to_vec()));
    let v = link.read(uuid(VENDOR_SVC), uuid(VENDOR_CHR), 0).await;
    assert_eq!(v, Err(radio::Error::Att(ErrorCode::ReadNotPermitted)));

    p.power(false);
    tokio::task::yield_now().await;
    assert_eq!(
        link.read(Svc::Battery.uuid(), Char::BatteryLevel.uuid(), 0).await,
        Err(radio::Error::Disconnected)
    );
    assert_matches!(c.connect(dev.address).await, Err(radio::Error::NotPowered));

    // Readiness restarts advertising
    p.power(true);
    loop {
        if let ScanEvent::Discovered(_) = cev.recv().await.unwrap() {
            break;
        }
    }
    let link = c.connect(dev.address).await.unwrap();
    let v = link.read(Svc::LinkLoss.uuid(), Char::AlertLevel.uuid(), 0).await;
    assert_eq!(v, Ok(vec![0x00, 0x00]));

    task.abort();
}

#[tokio::test]
async fn clone_round_trip() {
    let air = Air::new();
    let dev = device();
    let m = Mock::new(dev.clone());
    let p = Arc::new(air.peripheral(dev.address, &Config { device_id: 1 }));
    let task = m.start(p);

    let cloned = Profiler::new(air.central(), dev.address).profile().await.unwrap();
    assert_eq!(cloned, dev);
    assert!(cloned.services.iter().all(|s| s.uuid != Svc::GenericAccess));
    task.abort();
}

/// Peripheral state recorded by [`FlakyPeripheral`].
#[derive(Debug, Default)]
struct FlakyState {
    fail_adv: bool,
    fail_svcs: bool,
    advertising: bool,
    name: Option<String>,
    services: Option<usize>,
}

/// Peripheral whose advertising and service registration fail on demand.
#[derive(Debug)]
struct FlakyPeripheral {
    events: Mutex<Option<mpsc::UnboundedReceiver<PeripheralEvent>>>,
    st: Mutex<FlakyState>,
}

impl FlakyPeripheral {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<PeripheralEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let p = Self {
            events: Mutex::new(Some(rx)),
            st: Mutex::default(),
        };
        (Arc::new(p), tx)
    }
}

impl Peripheral for FlakyPeripheral {
    fn events(&self) -> Option<mpsc::UnboundedReceiver<PeripheralEvent>> {
        self.events.lock().take()
    }

    fn set_name(&self, name: &str) {
        self.st.lock().name = Some(name.to_owned());
    }

    fn start_advertising(&self, _: &[u8], _: &[u8]) -> radio::Result<()> {
        let mut st = self.st.lock();
        if st.fail_adv {
            return Err(radio::Error::NotPowered);
        }
        st.advertising = true;
        Ok(())
    }

    fn stop_advertising(&self) {
        self.st.lock().advertising = false;
    }

    fn set_services(&self, svcs: Vec<gatt::Service>) -> radio::Result<()> {
        let mut st = self.st.lock();
        if st.fail_svcs {
            return Err(radio::Error::Unsupported);
        }
        st.services = Some(svcs.len());
        Ok(())
    }
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn serve_errors() {
    let (p, tx) = FlakyPeripheral::new();
    let m = Mock::new(device());
    let task = m.start(Arc::clone(&p));

    p.st.lock().fail_adv = true;
    tx.send(PeripheralEvent::Ready(true)).unwrap();
    settle().await;
    assert!(!task.is_finished());
    assert!(!p.st.lock().advertising);
    assert_eq!(p.st.lock().services, None);

    // Rejected service list must not leave the peripheral advertising
    {
        let mut st = p.st.lock();
        st.fail_adv = false;
        st.fail_svcs = true;
    }
    tx.send(PeripheralEvent::Ready(true)).unwrap();
    settle().await;
    assert!(!task.is_finished());
    assert!(!p.st.lock().advertising);
    assert_eq!(p.st.lock().services, None);

    p.st.lock().fail_svcs = false;
    tx.send(PeripheralEvent::Ready(true)).unwrap();
    settle().await;
    {
        let st = p.st.lock();
        assert!(st.advertising);
        assert_eq!(st.services, Some(3));
        assert_eq!(st.name.as_deref(), Some("bat"));
    }

    tx.send(PeripheralEvent::Ready(false)).unwrap();
    settle().await;
    assert!(!p.st.lock().advertising);

    drop(tx);
    task.await.unwrap();

    // Event stream is already taken
    m.serve(&*p).await;
    assert!(!p.st.lock().advertising);
}
