/// How a create run satisfies the key-pair requirement, derived from
/// whether the pair is registered in the cloud account and whether its
/// private key is present on this machine.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Plan {
    /// Cloud pair and local certificate both present, use as-is.
    ReuseExisting,
    /// Neither exists, declare the default name and keep the new cert.
    CreateBoth,
    /// Exactly one side exists, so the pair is unusable; create a new
    /// one under a name the user picks.
    CreateFreshName,
}

/// A declared key pair always ends up with a matching local certificate:
/// either both sides already exist, or both are created together.
pub fn resolve(key_pair_in_cloud: bool, cert_on_disk: bool) -> Plan {
    match (key_pair_in_cloud, cert_on_disk) {
        (true, true) => Plan::ReuseExisting,
        (false, false) => Plan::CreateBoth,
        _ => Plan::CreateFreshName,
    }
}

/// RUST_LOG=debug cargo test --package nodeup-aws --bin nodeup-aws -- create::keypair::test_resolve --exact --show-output
#[test]
fn test_resolve() {
    // every combination resolves to exactly one plan
    assert_eq!(resolve(true, true), Plan::ReuseExisting);
    assert_eq!(resolve(false, false), Plan::CreateBoth);
    // a cloud pair without its private key cannot be used
    assert_eq!(resolve(true, false), Plan::CreateFreshName);
    // a local cert without a cloud pair cannot be reused either
    assert_eq!(resolve(false, true), Plan::CreateFreshName);
}
