use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Error, ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub const VERSION: usize = 1;

/// Directory under the user's home that holds all local state.
pub const DEFAULT_BASE_DIR: &str = ".nodeup-aws";
/// Suffix for the private-key file matching an EC2 key pair.
pub const CERT_SUFFIX: &str = "-keypair.pem";

/// Avalanche node HTTP API port, opened alongside SSH.
pub const NODE_API_PORT: u32 = 9650;
pub const SSH_PORT: u32 = 22;

/// Represents a single provisioned cloud node.
/// Written once per instance to its own file; a later provisioning run of
/// the same node overwrites the whole record.
/// "Clone" is for deep-copying.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct NodeConfig {
    #[serde(default)]
    pub version: usize,

    /// Cloud instance ID, the node's identity in all local state.
    /// This is NOT the avalanche node ID.
    #[serde(default)]
    pub node_id: String,
    /// AWS region the instance runs in.
    #[serde(default)]
    pub region: String,
    /// AMI the instance was launched from.
    #[serde(default)]
    pub ami: String,
    /// EC2 key pair name for SSH access.
    #[serde(default)]
    pub key_pair: String,
    /// Local path of the private key matching "key_pair".
    #[serde(default)]
    pub cert_path: String,
    /// Security group name guarding the instance.
    #[serde(default)]
    pub security_group: String,
    /// Static public IP attached to the instance.
    #[serde(default)]
    pub elastic_ip: String,
}

impl NodeConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: &str,
        region: &str,
        ami: &str,
        key_pair: &str,
        cert_path: &str,
        security_group: &str,
        elastic_ip: &str,
    ) -> Self {
        Self {
            version: VERSION,

            node_id: String::from(node_id),
            region: String::from(region),
            ami: String::from(ami),
            key_pair: String::from(key_pair),
            cert_path: String::from(cert_path),
            security_group: String::from(security_group),
            elastic_ip: String::from(elastic_ip),
        }
    }

    /// Converts to string in YAML format.
    pub fn encode_yaml(&self) -> io::Result<String> {
        serde_yaml::to_string(&self).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to serialize NodeConfig to YAML {}", e),
            )
        })
    }

    /// Saves the current node config to disk
    /// and overwrites the file.
    pub fn sync(&self, file_path: &str) -> io::Result<()> {
        log::info!("syncing NodeConfig to '{}'", file_path);

        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
        }

        let d = self.encode_yaml()?;
        let mut f = File::create(file_path)?;
        f.write_all(d.as_bytes())
    }

    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading NodeConfig from {}", file_path);

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

    /// Validates the node config.
    pub fn validate(&self) -> io::Result<()> {
        if self.node_id.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'node_id' cannot be empty",
            ));
        }
        if self.region.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'region' cannot be empty",
            ));
        }
        if self.key_pair.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'key_pair' cannot be empty",
            ));
        }
        if self.cert_path.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'cert_path' cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Cluster-level state shared by all nodes the CLI ever created:
/// which certificate backs each key pair, and which nodes belong to
/// which cluster. One file, read-modify-write per create.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    /// Key pair name mapped to the local certificate path.
    /// A name maps to exactly one path, first registration wins.
    #[serde(default)]
    pub key_pairs: BTreeMap<String, String>,

    /// Cluster name mapped to its member node IDs, in creation order.
    /// Append-only.
    #[serde(default)]
    pub clusters: BTreeMap<String, Vec<String>>,
}

impl ClusterConfig {
    /// Registers a newly provisioned node under "cluster_name".
    pub fn register_node(
        &mut self,
        cluster_name: &str,
        node_id: &str,
        key_pair: &str,
        cert_path: &str,
    ) {
        self.key_pairs
            .entry(String::from(key_pair))
            .or_insert_with(|| String::from(cert_path));
        self.clusters
            .entry(String::from(cluster_name))
            .or_insert_with(Vec::new)
            .push(String::from(node_id));
    }

    /// Converts to string in YAML format.
    pub fn encode_yaml(&self) -> io::Result<String> {
        serde_yaml::to_string(&self).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to serialize ClusterConfig to YAML {}", e),
            )
        })
    }

    /// Saves the current cluster config to disk
    /// and overwrites the file.
    pub fn sync(&self, file_path: &str) -> io::Result<()> {
        log::info!("syncing ClusterConfig to '{}'", file_path);

        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
        }

        let d = self.encode_yaml()?;
        let mut f = File::create(file_path)?;
        f.write_all(d.as_bytes())
    }

    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading ClusterConfig from {}", file_path);

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

    /// Loads the cluster config, or starts an empty one on first use.
    pub fn load_or_default(file_path: &str) -> io::Result<Self> {
        if Path::new(file_path).exists() {
            Self::load(file_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Local directory layout for everything the CLI persists.
/// Passed explicitly to the components that read or write files,
/// so tests can point it at a scratch directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub ssh_dir: PathBuf,
}

impl Paths {
    pub fn new(base_dir: &Path, ssh_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            ssh_dir: ssh_dir.to_path_buf(),
        }
    }

    /// Resolves the default layout under the user's home directory.
    pub fn from_home() -> io::Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no home directory found"))?;
        Ok(Self {
            base_dir: home.join(DEFAULT_BASE_DIR),
            ssh_dir: home.join(".ssh"),
        })
    }

    pub fn nodes_dir(&self) -> PathBuf {
        self.base_dir.join("nodes")
    }

    /// Per-node directory, also the landing place for staking files.
    pub fn node_dir(&self, instance_id: &str) -> PathBuf {
        self.nodes_dir().join(instance_id)
    }

    pub fn node_config_file(&self, instance_id: &str) -> PathBuf {
        self.node_dir(instance_id).join("node.yaml")
    }

    pub fn cluster_config_file(&self) -> PathBuf {
        self.nodes_dir().join("clusters.yaml")
    }

    pub fn sidecar_file(&self, subnet_name: &str) -> PathBuf {
        self.base_dir
            .join("subnets")
            .join(subnet_name)
            .join("sidecar.yaml")
    }

    /// Scratch directory for the generated terraform document,
    /// recreated per run.
    pub fn terraform_dir(&self) -> PathBuf {
        self.base_dir.join("terraform")
    }

    /// Playbooks are re-written here from the embedded copies per run.
    pub fn ansible_dir(&self) -> PathBuf {
        self.base_dir.join("ansible")
    }

    pub fn inventory_file(&self, cluster_name: &str) -> PathBuf {
        self.ansible_dir().join("inventories").join(cluster_name)
    }

    /// Name of the private-key file matching an EC2 key pair.
    pub fn cert_name(key_pair: &str) -> String {
        format!("{key_pair}{CERT_SUFFIX}")
    }

    /// Final location of a private key, under the SSH directory.
    pub fn cert_file(&self, key_pair: &str) -> PathBuf {
        self.ssh_dir.join(Self::cert_name(key_pair))
    }
}

/// RUST_LOG=debug cargo test --package node-ops --lib -- aws::spec::test_node_config --exact --show-output
#[test]
fn test_node_config() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let contents = r#"

version: 1

node_id: i-0f1e2d3c4b5a69788
region: us-west-2
ami: ami-0123456789abcdef0
key_pair: dev-us-west-2-nodeup
cert_path: /home/dev/.ssh/dev-us-west-2-nodeup-keypair.pem
security_group: dev-us-west-2-nodeup-security-group
elastic_ip: 52.10.11.12

"#;
    let mut f = tempfile::NamedTempFile::new().unwrap();
    let ret = f.write_all(contents.as_bytes());
    assert!(ret.is_ok());
    let config_path = f.path().to_str().unwrap();

    let loaded = NodeConfig::load(config_path).unwrap();
    loaded.validate().unwrap();

    let expected = NodeConfig::new(
        "i-0f1e2d3c4b5a69788",
        "us-west-2",
        "ami-0123456789abcdef0",
        "dev-us-west-2-nodeup",
        "/home/dev/.ssh/dev-us-west-2-nodeup-keypair.pem",
        "dev-us-west-2-nodeup-security-group",
        "52.10.11.12",
    );
    assert_eq!(loaded, expected);

    // overwrite and reload
    let synced_path = random_manager::tmp_path(10, Some(".yaml")).unwrap();
    expected.sync(&synced_path).unwrap();
    let reloaded = NodeConfig::load(&synced_path).unwrap();
    assert_eq!(reloaded, expected);
    fs::remove_file(&synced_path).unwrap();
}

/// RUST_LOG=debug cargo test --package node-ops --lib -- aws::spec::test_cluster_config --exact --show-output
#[test]
fn test_cluster_config() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let tmp_dir = tempfile::tempdir().unwrap();
    let config_path = tmp_dir.path().join("clusters.yaml");
    let config_path = config_path.to_str().unwrap();

    let mut config = ClusterConfig::load_or_default(config_path).unwrap();
    assert!(config.clusters.is_empty());

    config.register_node(
        "testnet",
        "i-aaa",
        "dev-us-west-2-nodeup",
        "/home/dev/.ssh/dev-us-west-2-nodeup-keypair.pem",
    );
    config.sync(config_path).unwrap();

    // repeated creates only ever append, never reorder or drop
    let mut config = ClusterConfig::load_or_default(config_path).unwrap();
    config.register_node(
        "testnet",
        "i-bbb",
        "dev-us-west-2-nodeup",
        "/tmp/some-other-path.pem",
    );
    config.register_node("devnet", "i-ccc", "dev-us-east-1-nodeup", "/tmp/east.pem");
    config.sync(config_path).unwrap();

    let reloaded = ClusterConfig::load(config_path).unwrap();
    assert_eq!(
        reloaded.clusters.get("testnet").unwrap(),
        &vec![String::from("i-aaa"), String::from("i-bbb")]
    );
    assert_eq!(
        reloaded.clusters.get("devnet").unwrap(),
        &vec![String::from("i-ccc")]
    );

    // first registration of a key pair wins
    assert_eq!(
        reloaded.key_pairs.get("dev-us-west-2-nodeup").unwrap(),
        "/home/dev/.ssh/dev-us-west-2-nodeup-keypair.pem"
    );
    assert_eq!(reloaded.key_pairs.get("dev-us-east-1-nodeup").unwrap(), "/tmp/east.pem");
}
