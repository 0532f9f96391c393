//! Emulates a Bluetooth LE peripheral described by a mock file.
//!
//! Only services, characteristics, and descriptors are cloned. Characteristic
//! values start empty and are updated by writes, which are also forwarded to
//! subscribed clients. A line-oriented console acts as a central connected to
//! the emulator.

#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use mockle::att::ErrorCode;
use mockle::gap::Uuid;
use mockle::le::Addr;
use mockle::mock::{Event, Mock, Op, OpKind};
use mockle::radio::loopback::{Air, Config, LoopbackLink};
use mockle_fs::MockFile;

#[derive(Debug, clap::Parser)]
#[command(about = "Mockle device spoofing tool")]
struct Args {
    /// Mock file (created by mockle-create).
    #[arg(short, long = "mock-file", value_name = "MOCK_FILE")]
    mock: Option<PathBuf>,

    /// Device id (hci0 -> 0).
    #[arg(short, long, default_value_t = 0)]
    device_id: u16,
}

/// Characteristic values keyed by service and characteristic UUIDs.
type Values = Arc<Mutex<HashMap<(Uuid, Uuid), Vec<u8>>>>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let Some(path) = args.mock else {
        Args::command().print_help()?;
        return Ok(());
    };
    let dev = MockFile::new(path).load()?;
    let addr = dev.address;
    let mock = Mock::new(dev);
    install(&mock);

    info!("Using device #{}", args.device_id);
    let air = Air::new();
    let p = Arc::new(air.peripheral(addr, &Config { device_id: args.device_id }));
    let task = mock.start(p);
    let r = console(&mock, &air, addr).await;
    task.abort();
    r
}

/// Installs listeners that log every operation and keep characteristic
/// values in memory.
fn install(mock: &Mock) {
    let vals = Values::default();
    let v = Arc::clone(&vals);
    mock.on(OpKind::Read, move |_, e| {
        let Op::Read(ref r) = e.op else { return };
        let val = v.lock().get(&(e.service, e.characteristic)).cloned();
        println!("[read] {}/{} @{} -> {}", e.service, e.characteristic, r.offset(), show(val.as_deref()));
        r.complete(val.unwrap_or_default());
    });
    mock.on(OpKind::Write, move |m, e| {
        let Op::Write(ref w) = e.op else { return };
        println!(
            "[write] {}/{} @{} <- {}",
            e.service,
            e.characteristic,
            w.offset(),
            hex::encode(w.value())
        );
        let val = {
            let mut vals = vals.lock();
            let cur = vals.entry((e.service, e.characteristic)).or_default();
            if w.offset() > cur.len() {
                w.error(ErrorCode::InvalidOffset);
                return;
            }
            cur.truncate(w.offset());
            cur.extend_from_slice(w.value());
            cur.clone()
        };
        w.ok();
        if let Err(e) = m.notify(e.service, e.characteristic, val) {
            warn!("Failed to forward write: {e}");
        }
    });
    mock.on(OpKind::Subscribe, |m, e| {
        let Op::Subscribe(ref s) = e.op else { return };
        println!("[subscribe] {}/{} (max {} bytes)", e.service, e.characteristic, s.max_len());
        m.register_notify_callback(e.service, e.characteristic, s.notifier().clone());
    });
    mock.on(OpKind::Unsubscribe, |m, e| {
        println!("[unsubscribe] {}/{}", e.service, e.characteristic);
        m.unregister_notify_callback(e.service, e.characteristic);
    });
    mock.on(OpKind::Notify, |_, e: &Event| {
        println!("[notify] {}/{}", e.service, e.characteristic);
    });
}

fn show(v: Option<&[u8]>) -> String {
    v.map_or_else(|| "(empty)".to_owned(), hex::encode)
}

/// Runs the console until EOF or Ctrl-C.
async fn console(mock: &Mock, air: &Air, addr: Addr) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    std::thread::spawn(move || {
        // https://github.com/tokio-rs/tokio/issues/2466
        for ln in std::io::BufReader::new(std::io::stdin()).lines() {
            tx.blocking_send(ln?)?;
        }
        Ok::<_, anyhow::Error>(())
    });
    let central = air.central();
    let link = tokio::select! {
        r = central.scan_connect(addr) => r.context("failed to connect to the emulator")?,
        _ = tokio::signal::ctrl_c() => return Ok(()),
    };
    println!("Connected to {addr}. Commands: read, write, sub, unsub, notify");
    let mut subs = HashMap::new();
    loop {
        let ln = tokio::select! {
            ln = rx.recv() => match ln {
                None => break,
                Some(ln) => ln,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        if let Err(e) = exec(mock, &link, &mut subs, &ln).await {
            eprintln!("[!] {e}");
        }
    }
    for t in subs.into_values() {
        t.abort();
    }
    Ok(())
}

/// Executes one console command.
async fn exec(
    mock: &Mock,
    link: &LoopbackLink,
    subs: &mut HashMap<(Uuid, Uuid), JoinHandle<()>>,
    ln: &str,
) -> Result<()> {
    let mut tok = ln.split_ascii_whitespace();
    let Some(cmd) = tok.next() else { return Ok(()) };
    let cmd: Cmd = cmd.parse()?;
    let mut uuid = || -> Result<Uuid> {
        let s = tok.next().context("missing UUID")?;
        s.parse().with_context(|| format!("invalid UUID {s:?}"))
    };
    let (svc, chr) = (uuid()?, uuid()?);
    let arg = tok.next();
    match cmd {
        Cmd::Read => {
            let off = arg.map_or(Ok(0), str::parse).context("invalid offset")?;
            let v = link.read(svc, chr, off).await?;
            println!("{svc}/{chr}: {}", hex::encode(v));
        }
        Cmd::Write => {
            let v = hex::decode(arg.context("missing value")?).context("invalid hex value")?;
            link.write(svc, chr, &v, false).await?;
        }
        Cmd::Sub => {
            let mut sub = link.subscribe(svc, chr)?;
            let t = tokio::spawn(async move {
                while let Some(v) = sub.recv().await {
                    println!("{svc}/{chr} notified: {}", hex::encode(v));
                }
            });
            if let Some(t) = subs.insert((svc, chr), t) {
                t.abort();
            }
        }
        Cmd::Unsub => match subs.remove(&(svc, chr)) {
            Some(t) => t.abort(),
            None => bail!("not subscribed to {svc}/{chr}"),
        },
        Cmd::Notify => {
            let v = hex::decode(arg.context("missing value")?).context("invalid hex value")?;
            if !mock.notify(svc, chr, v)? {
                bail!("no subscriber for {svc}/{chr}");
            }
        }
    }
    Ok(())
}

/// Console command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Cmd {
    Read,
    Write,
    Sub,
    Unsub,
    Notify,
}

impl FromStr for Cmd {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "read" | "r" => Self::Read,
            "write" | "w" => Self::Write,
            "sub" | "s" => Self::Sub,
            "unsub" | "u" => Self::Unsub,
            "notify" | "n" => Self::Notify,
            _ => bail!("unknown command {s:?}"),
        })
    }
}
