//! Emulates a read-only battery and reads its level over the loopback radio.

#![allow(clippy::print_stdout)]

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use mockle::att::ErrorCode;
use mockle::device::Device;
use mockle::gap::{Characteristic, Service};
use mockle::mock::{Mock, Op, OpKind};
use mockle::radio::loopback::{Air, Config};

const DEVICE: &str = r#"{
  "address": "c4:be:84:12:34:56",
  "name": "Battery",
  "ad_records": "02010603020f18",
  "scan_data": "080942617474657279",
  "services": [
    {
      "uuid": "180f",
      "characteristics": [
        { "uuid": "2a19", "properties": ["read", "notify"], "descriptors": ["2902"] }
      ]
    },
    {
      "uuid": "1803",
      "characteristics": [
        { "uuid": "2a06", "properties": ["read", "write"], "descriptors": [] }
      ]
    }
  ]
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let dev: Device = serde_json::from_str(DEVICE)?;
    let mock = Mock::new(dev.clone());
    mock.on(OpKind::Read, |_, e| {
        let Op::Read(ref r) = e.op else { return };
        if e.service == Service::Battery && e.characteristic == Characteristic::BatteryLevel {
            r.complete([0x64]);
        } else if e.service == Service::LinkLoss && e.characteristic == Characteristic::AlertLevel {
            r.complete([0x00, 0x00]);
        } else {
            r.error(ErrorCode::UnlikelyError);
        }
    });

    let air = Air::new();
    let p = Arc::new(air.peripheral(dev.address, &Config::default()));
    let task = mock.start(p);

    let link = air.central().scan_connect(dev.address).await?;
    let v = (link.read(Service::Battery.uuid(), Characteristic::BatteryLevel.uuid(), 0)).await?;
    info!("Battery level: {v:02X?}");
    println!("Battery level: {}%", v.first().copied().unwrap_or_default());
    task.abort();
    Ok(())
}
