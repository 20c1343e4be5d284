//! TCP proxy configuration.

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// One transparent TCP proxy: bind `listen`, dial `upstream`, perturb the
/// byte streams according to `faults`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpRule {
    pub listen: String,
    pub upstream: String,
    #[serde(default)]
    pub faults: TcpFaults,
}

/// Network failure knobs applied per connection and per chunk.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TcpFaults {
    /// Applied once before dialing and again before every chunk read.
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub drop_probability: f64,
    /// Drawn once after accept.
    #[serde(default)]
    pub reset_probability: f64,
    /// 0 disables throttling.
    #[serde(default)]
    pub bandwidth_kbps: u64,
    #[serde(default)]
    pub refuse_connections: bool,
}

impl TcpRule {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for (name, addr) in [("listen", &self.listen), ("upstream", &self.upstream)] {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
                _ => bail!("tcp rule {name} address {addr:?} is not host:port"),
            }
        }
        for (name, p) in [
            ("drop_probability", self.faults.drop_probability),
            ("reset_probability", self.faults.reset_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                bail!(
                    "tcp rule {} -> {}: {name} {p} outside [0, 1]",
                    self.listen,
                    self.upstream
                );
            }
        }
        Ok(())
    }
}
