//! Profiles a Bluetooth LE peripheral and writes its description to a mock
//! file.
//!
//! The target is reached over the in-process loopback radio, so it must be
//! emulated by one of the `--peer` mock files.

#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::info;

use mockle::device::Device;
use mockle::le::Addr;
use mockle::mock::Mock;
use mockle::profiler::Profiler;
use mockle::radio::loopback::{Air, Config};
use mockle_fs::MockFile;

/// Exit code for an invalid target address.
const INVALID_TARGET: u8 = 255;

#[derive(Debug, clap::Parser)]
#[command(about = "Mockle device duplicator tool")]
struct Args {
    /// MAC address of the device to duplicate (aa:bb:cc:dd:ee:ff).
    #[arg(short, long)]
    target: String,

    /// Mock settings output file [default: <address>.mock].
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Mock file of a peripheral to emulate on the loopback radio. May be
    /// repeated. The loopback radio is the only one available, so one of the
    /// peers must have the target address.
    #[arg(long = "peer", value_name = "MOCK_FILE")]
    peers: Vec<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let target: Addr = match args.target.parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("[!] Target address is not a valid MAC address: {e}");
            return Ok(ExitCode::from(INVALID_TARGET));
        }
    };

    let air = Air::new();
    let mut peers = Vec::with_capacity(args.peers.len());
    for (i, dev) in load_peers(&args.peers, target)?.into_iter().enumerate() {
        let cfg = Config {
            device_id: u16::try_from(i).context("too many peers")?,
        };
        let p = Arc::new(air.peripheral(dev.address, &cfg));
        peers.push(Mock::new(dev).start(p));
    }

    println!("Profiling target {target}...");
    let dev = tokio::select! {
        r = Profiler::new(air.central(), target).profile() => {
            r.with_context(|| format!("failed to profile {target}"))?
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            return Ok(ExitCode::FAILURE);
        }
    };
    let out = args.output.map_or_else(|| MockFile::for_peer(target), MockFile::new);
    out.save(&dev)?;
    println!("[i] Device information extracted to {}", out.path().display());
    for t in peers {
        t.abort();
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads the peer descriptions, ensuring that addresses are unique and that
/// one of them is the target.
fn load_peers(paths: &[PathBuf], target: Addr) -> Result<Vec<Device>> {
    let mut seen = HashSet::new();
    let mut devs = Vec::with_capacity(paths.len());
    for path in paths {
        let dev = MockFile::new(path).load()?;
        ensure!(seen.insert(dev.address), "duplicate peer address {}", dev.address);
        devs.push(dev);
    }
    ensure!(
        seen.contains(&target),
        "no --peer mock file emulates {target} on the loopback radio"
    );
    Ok(devs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(dir: &std::path::Path, addr: &str) -> PathBuf {
        let dev: Device = serde_json::from_value(serde_json::json!({
            "address": addr,
            "name": null,
            "ad_records": "020106",
            "scan_data": null,
            "services": [],
        }))
        .unwrap();
        let f = MockFile::for_peer(dev.address);
        let path = dir.join(f.path());
        MockFile::new(&path).save(&dev).unwrap();
        path
    }

    #[test]
    fn peers() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save(tmp.path(), "00:11:22:33:44:55");
        let b = save(tmp.path(), "00:11:22:33:44:66");
        let target: Addr = "00:11:22:33:44:66".parse().unwrap();

        let devs = load_peers(&[a.clone(), b.clone()], target).unwrap();
        assert_eq!(devs.len(), 2);
        assert_eq!(devs[1].address, target);

        let e = load_peers(&[a.clone()], target).unwrap_err();
        assert!(e.to_string().starts_with("no --peer mock file emulates"));
        assert!(load_peers(&[], target).is_err());

        let e = load_peers(&[b.clone(), b], target).unwrap_err();
        assert!(e.to_string().starts_with("duplicate peer address"));
    }
}
