use std::io::{self, Error, ErrorKind};

use rust_embed::RustEmbed;

/// Playbook that installs and starts the avalanche node software.
pub fn setup_node_yaml() -> io::Result<String> {
    #[derive(RustEmbed)]
    #[folder = "src/playbooks/"]
    #[prefix = "src/playbooks/"]
    struct Asset;
    let f = Asset::get("src/playbooks/setup_node.yaml").unwrap();
    let s = std::str::from_utf8(f.data.as_ref()).map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("failed to convert embed file to str {}", e),
        )
    })?;
    Ok(s.to_string())
}

/// Playbook that fetches the generated staking certificate and key
/// back to the local machine.
pub fn copy_staking_files_yaml() -> io::Result<String> {
    #[derive(RustEmbed)]
    #[folder = "src/playbooks/"]
    #[prefix = "src/playbooks/"]
    struct Asset;
    let f = Asset::get("src/playbooks/copy_staking_files.yaml").unwrap();
    let s = std::str::from_utf8(f.data.as_ref()).map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("failed to convert embed file to str {}", e),
        )
    })?;
    Ok(s.to_string())
}

/// RUST_LOG=debug cargo test --package node-ops --lib -- artifacts::test_playbooks --exact --show-output
#[test]
fn test_playbooks() {
    let setup = setup_node_yaml().unwrap();
    assert!(setup.contains("hosts: all"));
    assert!(setup.contains("avalanchego_version"));

    let copy = copy_staking_files_yaml().unwrap();
    assert!(copy.contains("staker.crt"));
    assert!(copy.contains("staker.key"));
}
