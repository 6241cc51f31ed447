use std::{
    collections::BTreeMap,
    io::{self, Error, ErrorKind},
};

use serde::{Deserialize, Serialize};

/// Upstream manifest mapping each protocol (RPC) version to the
/// avalanchego releases that speak it.
pub const DEFAULT_URL: &str =
    "https://raw.githubusercontent.com/ava-labs/avalanchego/master/version/compatibility.json";

/// Deployed subnets record the protocol version their VM was built
/// against; the manifest answers which node releases can validate them.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
pub struct Manifest {
    /// Protocol version (as a decimal string, upstream format)
    /// mapped to compatible release tags (e.g., "v1.10.3").
    #[serde(flatten)]
    pub releases_by_rpc: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    /// Downloads the manifest.
    pub async fn fetch(url: &str) -> io::Result<Self> {
        log::info!("fetching compatibility manifest from {url}");
        let resp = reqwest::get(url).await.map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to fetch compatibility manifest ({})", e),
            )
        })?;
        resp.json::<Self>().await.map_err(|e| {
            Error::new(
                ErrorKind::InvalidData,
                format!("invalid compatibility manifest ({})", e),
            )
        })
    }

    /// Resolves the newest release tag compatible with "rpc_version".
    pub fn latest_for_rpc(&self, rpc_version: u32) -> io::Result<String> {
        let tags = self
            .releases_by_rpc
            .get(&rpc_version.to_string())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("no release is compatible with RPC version {rpc_version}"),
                )
            })?;
        tags.iter()
            .max_by_key(|tag| release_ord(tag))
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("empty release list for RPC version {rpc_version}"),
                )
            })
    }
}

/// Orders release tags like "v1.10.3" numerically per component,
/// so "v1.10.0" sorts after "v1.9.9".
fn release_ord(tag: &str) -> (u64, u64, u64) {
    let mut parts = tag
        .trim_start_matches('v')
        .splitn(3, '.')
        .map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// RUST_LOG=debug cargo test --package node-ops --lib -- avalanchego::compatibility::test_latest_for_rpc --exact --show-output
#[test]
fn test_latest_for_rpc() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let contents = r#"
{
    "18": ["v1.9.5", "v1.9.4"],
    "19": ["v1.9.9", "v1.9.10", "v1.10.0"],
    "20": ["v1.10.1"]
}
"#;
    let manifest: Manifest = serde_json::from_str(contents).unwrap();

    // newest tag wins, with numeric (not lexicographic) ordering
    assert_eq!(manifest.latest_for_rpc(19).unwrap(), "v1.10.0");
    assert_eq!(manifest.latest_for_rpc(18).unwrap(), "v1.9.5");
    assert_eq!(manifest.latest_for_rpc(20).unwrap(), "v1.10.1");

    // unlisted protocol version is a hard error
    assert!(manifest.latest_for_rpc(42).is_err());
}
