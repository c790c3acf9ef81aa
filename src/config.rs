//! Loading of the node configuration from an ini file.
//!
//! Only the listen address is mandatory; every other key falls back to the
//! reference value of the deployment.
//!
//! ```ini
//! [overlay]
//! listen_address = 127.0.0.1:8154
//! workers = 10
//! timeout_ms = 400
//! stabilization_period_ms = 5000
//! ```

use crate::network::DEFAULT_WORKERS;
use crate::node::LOOKUP_TIMEOUT;
use crate::stabilization::STABILIZATION_PERIOD;
use ini::Ini;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    /// Address this node listens on for peer connections.
    pub listen_address: SocketAddr,
    /// Number of worker threads executing inbound operations.
    pub workers: usize,
    /// Timeout in milliseconds for connecting to and writing at peers.
    pub timeout_ms: u64,
    /// Delay between two stabilization passes.
    pub stabilization_period: Duration,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
        let conf = Ini::load_from_file(path)?;

        let section = conf
            .section(Some("overlay"))
            .ok_or("missing section `overlay`")?;

        let listen_address = section
            .get("listen_address")
            .ok_or("missing value `listen_address`")?
            .parse()?;

        let workers = match section.get("workers") {
            Some(value) => value.parse()?,
            None => DEFAULT_WORKERS,
        };

        let timeout_ms = match section.get("timeout_ms") {
            Some(value) => value.parse()?,
            None => LOOKUP_TIMEOUT.as_millis() as u64,
        };

        let stabilization_period = match section.get("stabilization_period_ms") {
            Some(value) => Duration::from_millis(value.parse()?),
            None => STABILIZATION_PERIOD,
        };

        Ok(Config {
            listen_address,
            workers,
            timeout_ms,
            stabilization_period,
        })
    }
}
