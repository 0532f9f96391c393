//! File system storage for Bluetooth LE device descriptions.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use mockle::device::{Device, Invalid};
use mockle::le::Addr;

/// Error type returned by description file operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: invalid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: invalid description: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: Invalid,
    },
}

/// Common description file result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Device description stored as a JSON file.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct MockFile(PathBuf);

impl MockFile {
    const EXT: &'static str = "mock";

    /// Returns a handle for the specified file path.
    #[inline(always)]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Returns a handle for the default file of the specified peer in the
    /// current directory.
    #[inline]
    #[must_use]
    pub fn for_peer(addr: Addr) -> Self {
        Self(Self::default_path(addr))
    }

    /// Returns the default file name for the specified peer
    /// (`aabbccddeeff.mock`).
    #[must_use]
    pub fn default_path(addr: Addr) -> PathBuf {
        PathBuf::from(addr.compact()).with_extension(Self::EXT)
    }

    /// Returns the file path.
    #[inline(always)]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Writes the description as pretty-printed JSON, replacing any existing
    /// file.
    pub fn save(&self, dev: &Device) -> Result<()> {
        let s = serde_json::to_string_pretty(dev).map_err(|source| self.json(source))?;
        // TODO: Write to a temporary file and rename it into place
        let r = fs::File::create(&self.0).and_then(|mut f| {
            f.write_all(s.as_bytes())?;
            f.write_all(b"\n")?;
            f.sync_data()
        });
        match r {
            Ok(()) => {
                debug!("Wrote: {}", self.0.display());
                Ok(())
            }
            Err(e) => {
                error!("Failed to write: {} ({e})", self.0.display());
                Err(self.io(e))
            }
        }
    }

    /// Reads and validates a description.
    pub fn load(&self) -> Result<Device> {
        let s = fs::read_to_string(&self.0).map_err(|e| {
            error!("Failed to read: {} ({e})", self.0.display());
            self.io(e)
        })?;
        let dev: Device = serde_json::from_str(&s).map_err(|e| {
            error!("Invalid file contents: {} ({e})", self.0.display());
            self.json(e)
        })?;
        dev.validate().map_err(|source| Error::Invalid {
            path: self.0.clone(),
            source,
        })?;
        debug!("Read: {} ({} service(s))", self.0.display(), dev.services.len());
        Ok(dev)
    }

    #[inline]
    fn io(&self, source: std::io::Error) -> Error {
        Error::Io {
            path: self.0.clone(),
            source,
        }
    }

    #[inline]
    fn json(&self, source: serde_json::Error) -> Error {
        Error::Json {
            path: self.0.clone(),
            source,
        }
    }
}

impl AsRef<Path> for MockFile {
    #[inline(always)]
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use tempfile::Builder;

    use mockle::device::{Characteristic, Service};
    use mockle::gap::{Characteristic as Char, Descriptor as Desc, Service as Svc};
    use mockle::gatt::Props;

    use super::*;

    const PEER: &str = "00:11:22:33:aa:BB";

    fn device() -> Device {
        let mut bas = Service::new(Svc::Battery.uuid());
        bas.characteristics.push(Characteristic {
            uuid: Char::BatteryLevel.uuid(),
            properties: Props::READ | Props::NOTIFY,
            descriptors: vec![Desc::ClientCharacteristicConfiguration.uuid()],
        });
        Device {
            address: PEER.parse().unwrap(),
            name: Some("bat".to_owned()),
            adv_data: vec![0x02, 0x01, 0x06],
            scan_data: None,
            services: vec![bas],
        }
    }

    #[test]
    fn default_path() {
        let p = MockFile::default_path(PEER.parse().unwrap());
        assert_eq!(p, Path::new("00112233aabb.mock"));
    }

    #[test]
    fn save_load() {
        let tmp = (Builder::new().prefix("mockle-test-")).tempdir().unwrap();
        let dev = device();
        let f = MockFile::new(tmp.path().join(MockFile::default_path(dev.address)));
        f.save(&dev).unwrap();
        assert!(tmp.path().join("00112233aabb.mock").exists());
        assert_eq!(f.load().unwrap(), dev);

        let s = fs::read_to_string(f.path()).unwrap();
        assert!(s.contains(r#""ad_records": "020106""#));
        assert!(s.contains(r#""scan_data": null"#));
    }

    #[test]
    fn load_errors() {
        let tmp = (Builder::new().prefix("mockle-test-")).tempdir().unwrap();
        let f = MockFile::new(tmp.path().join("missing.mock"));
        assert!(matches!(f.load(), Err(Error::Io { ref path, .. }) if path == f.path()));

        fs::write(f.path(), "{").unwrap();
        assert!(matches!(f.load(), Err(Error::Json { .. })));

        let mut dev = device();
        dev.services.push(Service::new(Svc::GenericAttribute.uuid()));
        f.save(&dev).unwrap();
        let e = f.load().unwrap_err();
        assert!(matches!(e, Error::Invalid { source: Invalid::ImplicitService(_), .. }));
        assert!(e.to_string().starts_with(&f.path().display().to_string()));
    }
}
