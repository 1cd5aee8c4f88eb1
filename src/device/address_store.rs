//! Durable single-slot store for the device's IPv4 address.
//!
//! The address is the only piece of device configuration that survives a
//! restart. It is kept as a plain dotted-quad string in one file under the
//! data directory.

use anyhow::{Context, Result};
use log::warn;
use std::{fmt, fs, io::ErrorKind, net::Ipv4Addr, path::PathBuf};

/// Rejected device address. Carries the offending input for the error text;
/// never propagated beyond the save call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidAddress(pub String);

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid device address: {:?}", self.0)
    }
}

impl std::error::Error for InvalidAddress {}

/// Validate a dotted-quad string: four decimal octets, each in 0..=255.
pub fn parse_address(raw: &str) -> Result<Ipv4Addr, InvalidAddress> {
    raw.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| InvalidAddress(raw.to_string()))
}

#[derive(Clone)]
pub struct AddressStore {
    path: PathBuf,
}

impl AddressStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted address. Absence (or unreadable content, which is
    /// logged) means unconfigured; this never errors to the caller.
    pub fn load(&self) -> Option<Ipv4Addr> {
        let raw = fs::read_to_string(&self.path).ok()?;

        match parse_address(&raw) {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("ignoring persisted device address: {e}");
                None
            }
        }
    }

    /// Validate and persist an address. On any failure the previously stored
    /// address is left untouched.
    pub fn save(&self, raw: &str) -> Result<Ipv4Addr> {
        let addr = parse_address(raw)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("failed to create data directory")?;
        }
        fs::write(&self.path, addr.to_string()).context("failed to write device address")?;

        Ok(addr)
    }

    /// Remove the persisted address. NotFound is silently ignored.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("failed to remove device address"),
        }
    }
}
