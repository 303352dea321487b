//! Configuration records for the resolver socket and the directory engine.
//!
//! Mirrors the teacher's pattern of giving each client a `Default` impl with
//! explicit, sensible constants rather than parsing environment variables or
//! files here; loading configuration from the outside world is the
//! out-of-scope HTTP shell's job.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Resolver socket tuning: per-request timeout, retry count, how long an idle
/// transport is kept open, and the server list to query.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolverConfig {
    /// How long to wait for a response before retrying (or giving up).
    pub timeout: Duration,

    /// Number of retries a UDP request gets beyond its first transmission.
    pub retries: u32,

    /// How long an idle transport (no in-flight or queued tasks) is kept
    /// open before it is closed.
    pub keep_open_for: Duration,

    /// Name servers to query, tried in order.
    pub servers: Vec<SocketAddr>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            timeout: Duration::from_secs(5),
            retries: 2,
            keep_open_for: Duration::from_secs(30),
            servers: vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 53)],
        }
    }
}

/// Directory engine configuration: where the memory-mapped database lives,
/// how large its address space is reserved to be, and which named
/// sub-database holds the path-indexed entries.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryConfig {
    /// Filesystem path to the LMDB environment directory. Created on first
    /// use if it does not already exist.
    pub map_path: PathBuf,

    /// Maximum size, in bytes, the memory map may grow to. LMDB reserves
    /// this much address space up front but only commits pages as used.
    pub map_size: usize,

    /// Name of the single sub-database holding directory entries.
    pub sub_database_name: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig {
            map_path: PathBuf::from("./directory.mdb"),
            map_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            sub_database_name: "directory".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_config_defaults_to_localhost() {
        let cfg = ResolverConfig::default();
        assert_eq!(cfg.retries, 2);
        assert_eq!(cfg.servers.len(), 1);
    }

    #[test]
    fn directory_config_defaults_to_two_gibibytes() {
        let cfg = DirectoryConfig::default();
        assert_eq!(cfg.map_size, 2 * 1024 * 1024 * 1024);
    }
}
