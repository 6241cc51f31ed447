use std::{
    fs,
    io::{self, Error, ErrorKind},
    path::{Path, PathBuf},
};

use async_trait::async_trait;

pub const SETUP_NODE_PLAYBOOK: &str = "setup_node.yaml";
pub const COPY_STAKING_FILES_PLAYBOOK: &str = "copy_staking_files.yaml";

/// Writes the host inventory consumed by ansible-playbook.
/// One host per cluster create: the new node's elastic IP and the
/// private key that unlocks it.
pub fn write_inventory(inventory_path: &Path, host_ip: &str, cert_path: &str) -> io::Result<()> {
    log::info!("writing inventory to '{}'", inventory_path.display());
    if let Some(parent_dir) = inventory_path.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    let host_line = format!(
        "aws_node ansible_host={host_ip} ansible_user=ubuntu ansible_ssh_private_key_file={cert_path} ansible_ssh_common_args='-o IdentitiesOnly=yes -o StrictHostKeyChecking=no'\n"
    );
    fs::write(inventory_path, host_line.as_bytes())
}

/// (Re)writes the embedded playbooks into the ansible directory,
/// in case they changed since the last run.
pub fn setup_playbooks(ansible_dir: &Path) -> io::Result<()> {
    log::info!("writing playbooks to '{}'", ansible_dir.display());
    fs::create_dir_all(ansible_dir)?;
    fs::write(
        ansible_dir.join(SETUP_NODE_PLAYBOOK),
        node_ops::artifacts::setup_node_yaml()?.as_bytes(),
    )?;
    fs::write(
        ansible_dir.join(COPY_STAKING_FILES_PLAYBOOK),
        node_ops::artifacts::copy_staking_files_yaml()?.as_bytes(),
    )?;
    Ok(())
}

/// Installs and bootstraps the node software on the provisioned host,
/// then pulls generated credentials back. Substitutable with an
/// in-memory implementation for tests.
#[async_trait]
pub trait Configurator: Send + Sync {
    /// Installs and starts the node software at "avalanchego_version".
    async fn install_node(
        &self,
        inventory_path: &str,
        avalanchego_version: &str,
    ) -> io::Result<()>;
    /// Copies the generated staking certificate and key into "node_dir".
    async fn fetch_staking_files(&self, inventory_path: &str, node_dir: &str) -> io::Result<()>;
}

/// Shells out to the ansible-playbook binary.
pub struct Runner {
    ansible_dir: PathBuf,
}

impl Runner {
    pub fn new(ansible_dir: &Path) -> Self {
        Self {
            ansible_dir: ansible_dir.to_path_buf(),
        }
    }

    /// Fails fast when the ansible-playbook binary is not installed.
    pub fn check_installed() -> io::Result<()> {
        command_manager::run("ansible-playbook --version").map_err(|e| {
            Error::new(
                ErrorKind::NotFound,
                format!(
                    "ansible-playbook not found in PATH ({e}); install it first, see https://docs.ansible.com/ansible/latest/installation_guide/"
                ),
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl Configurator for Runner {
    async fn install_node(
        &self,
        inventory_path: &str,
        avalanchego_version: &str,
    ) -> io::Result<()> {
        setup_playbooks(&self.ansible_dir)?;
        let playbook = self.ansible_dir.join(SETUP_NODE_PLAYBOOK);
        command_manager::run(&format!(
            "ansible-playbook -i {inventory_path} {} --extra-vars avalanchego_version={avalanchego_version}",
            playbook.display()
        ))?;
        Ok(())
    }

    async fn fetch_staking_files(&self, inventory_path: &str, node_dir: &str) -> io::Result<()> {
        setup_playbooks(&self.ansible_dir)?;
        let playbook = self.ansible_dir.join(COPY_STAKING_FILES_PLAYBOOK);
        command_manager::run(&format!(
            "ansible-playbook -i {inventory_path} {} --extra-vars node_dir={node_dir}/",
            playbook.display()
        ))?;
        Ok(())
    }
}

/// RUST_LOG=debug cargo test --package nodeup-aws --bin nodeup-aws -- ansible::test_inventory --exact --show-output
#[test]
fn test_inventory() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let inventory_path = tmp_dir.path().join("inventories").join("testnet");

    write_inventory(
        &inventory_path,
        "52.10.11.12",
        "/home/dev/.ssh/dev-us-west-2-nodeup-keypair.pem",
    )
    .unwrap();

    let contents = fs::read_to_string(&inventory_path).unwrap();
    assert!(contents.starts_with("aws_node ansible_host=52.10.11.12 "));
    assert!(contents.contains("ansible_user=ubuntu"));
    assert!(contents
        .contains("ansible_ssh_private_key_file=/home/dev/.ssh/dev-us-west-2-nodeup-keypair.pem"));
}

/// RUST_LOG=debug cargo test --package nodeup-aws --bin nodeup-aws -- ansible::test_setup_playbooks --exact --show-output
#[test]
fn test_setup_playbooks() {
    let tmp_dir = tempfile::tempdir().unwrap();
    setup_playbooks(tmp_dir.path()).unwrap();
    assert!(tmp_dir.path().join(SETUP_NODE_PLAYBOOK).exists());
    assert!(tmp_dir.path().join(COPY_STAKING_FILES_PLAYBOOK).exists());

    // re-running only overwrites, never fails
    setup_playbooks(tmp_dir.path()).unwrap();
}
