use std::{
    fs::{self, File},
    io::{self, Error, ErrorKind, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

/// Local record of a previously deployed subnet, written at deploy time.
/// The provisioning flow only reads it back to pin the node software
/// version to what the subnet's VM speaks.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Sidecar {
    #[serde(default)]
    pub name: String,
    /// VM the subnet runs (e.g., "subnet-evm").
    #[serde(default)]
    pub vm: String,
    /// Protocol (RPC) version the subnet's VM was built against.
    #[serde(default)]
    pub rpc_version: u32,
}

impl Sidecar {
    /// Converts to string in YAML format.
    pub fn encode_yaml(&self) -> io::Result<String> {
        serde_yaml::to_string(&self).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to serialize Sidecar to YAML {}", e),
            )
        })
    }

    /// Saves the sidecar to disk and overwrites the file.
    pub fn sync(&self, file_path: &str) -> io::Result<()> {
        log::info!("syncing Sidecar to '{}'", file_path);

        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
        }

        let d = self.encode_yaml()?;
        let mut f = File::create(file_path)?;
        f.write_all(d.as_bytes())
    }

    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading Sidecar from {}", file_path);

        if !Path::new(file_path).exists() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("file {} does not exists", file_path),
            ));
        }

        let f = File::open(file_path).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to open {} ({})", file_path, e),
            )
        })?;
        serde_yaml::from_reader(f)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("invalid YAML: {}", e)))
    }
}

/// RUST_LOG=debug cargo test --package node-ops --lib -- subnet::test_sidecar --exact --show-output
#[test]
fn test_sidecar() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let tmp_dir = tempfile::tempdir().unwrap();
    let sidecar_path = tmp_dir.path().join("sidecar.yaml");
    let sidecar_path = sidecar_path.to_str().unwrap();

    let sidecar = Sidecar {
        name: String::from("myevm"),
        vm: String::from("subnet-evm"),
        rpc_version: 19,
    };
    sidecar.sync(sidecar_path).unwrap();

    let loaded = Sidecar::load(sidecar_path).unwrap();
    assert_eq!(loaded, sidecar);
    assert_eq!(loaded.rpc_version, 19);
}
