use aws_sdk_ec2::{error::SdkError, types::Filter, Client};
use aws_types::SdkConfig as AwsSdkConfig;
use thiserror::Error;

/// Canonical's AWS account, the publisher of official Ubuntu images.
pub const UBUNTU_AMI_OWNER: &str = "099720109477";
/// Image name pattern for the Ubuntu release installed on new nodes.
pub const UBUNTU_AMI_NAME_FILTER: &str =
    "ubuntu/images/hvm-ssd/ubuntu-focal-20.04-amd64-server-*";

pub type Result<T> = std::result::Result<T, Error>;

/// Backing errors for all EC2 read/stop operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed API")]
    API { message: String, is_retryable: bool },
    #[error("failed for other reasons")]
    Other { message: String, is_retryable: bool },
}

impl Error {
    /// Returns the error message in "String".
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Error::API { message, .. } | Error::Other { message, .. } => message.clone(),
        }
    }

    /// Returns if the error is retryable.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::API { is_retryable, .. } | Error::Other { is_retryable, .. } => *is_retryable,
        }
    }
}

#[inline]
fn is_err_retryable<E>(e: &SdkError<E>) -> bool {
    match e {
        SdkError::TimeoutError(_) | SdkError::ResponseError { .. } => true,
        SdkError::DispatchFailure(e) => e.is_timeout() || e.is_io(),
        _ => false,
    }
}

/// Ingress rule of an existing security group.
/// A point-in-time view read once per run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IngressRule {
    /// "tcp", "udp", or "-1" for all protocols.
    pub protocol: String,
    pub from_port: i64,
    pub to_port: i64,
    pub ipv4_cidrs: Vec<String>,
}

/// Existing security group with its current ingress rule set.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub ingress: Vec<IngressRule>,
}

impl SecurityGroup {
    /// Returns true if inbound TCP from "ip" to "port" is already permitted,
    /// either via the caller's /32 or an open 0.0.0.0/0 range.
    pub fn allows_tcp(&self, ip: &str, port: u32) -> bool {
        let caller_cidr = format!("{ip}/32");
        for rule in self.ingress.iter() {
            if rule.protocol != "tcp" && rule.protocol != "-1" {
                continue;
            }
            if rule.protocol == "tcp"
                && !(rule.from_port <= port as i64 && port as i64 <= rule.to_port)
            {
                continue;
            }
            if rule
                .ipv4_cidrs
                .iter()
                .any(|cidr| cidr == &caller_cidr || cidr == "0.0.0.0/0")
            {
                return true;
            }
        }
        false
    }

    /// Returns the subset of "ports" that do not yet permit inbound TCP
    /// from "ip". Feeding the returned ports back into new rules and calling
    /// this again yields an empty set.
    pub fn missing_tcp_ports(&self, ip: &str, ports: &[u32]) -> Vec<u32> {
        ports
            .iter()
            .copied()
            .filter(|port| !self.allows_tcp(ip, *port))
            .collect()
    }
}

/// Implements the EC2 reads (and the one stop call) that the provisioning
/// flow needs outside of terraform.
#[derive(Debug, Clone)]
pub struct Manager {
    #[allow(dead_code)]
    shared_config: AwsSdkConfig,
    cli: Client,
}

impl Manager {
    pub fn new(shared_config: &AwsSdkConfig) -> Self {
        let cloned = shared_config.clone();
        let cli = Client::new(shared_config);
        Self {
            shared_config: cloned,
            cli,
        }
    }

    /// Checks whether the key pair is registered in the current region.
    /// ref. https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeKeyPairs.html
    pub async fn key_pair_exists(&self, key_name: &str) -> Result<bool> {
        log::info!("checking if key pair '{key_name}' exists");
        let resp = self
            .cli
            .describe_key_pairs()
            .filters(Filter::builder().name("key-name").values(key_name).build())
            .send()
            .await
            .map_err(|e| Error::API {
                message: format!("failed describe_key_pairs {:?}", e),
                is_retryable: is_err_retryable(&e),
            })?;
        Ok(!resp.key_pairs().unwrap_or_default().is_empty())
    }

    /// Looks up a security group by name, returning its current ingress
    /// rules, or None if no group with that name exists.
    /// ref. https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeSecurityGroups.html
    pub async fn find_security_group(&self, group_name: &str) -> Result<Option<SecurityGroup>> {
        log::info!("looking up security group '{group_name}'");
        let resp = self
            .cli
            .describe_security_groups()
            .filters(
                Filter::builder()
                    .name("group-name")
                    .values(group_name)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Error::API {
                message: format!("failed describe_security_groups {:?}", e),
                is_retryable: is_err_retryable(&e),
            })?;

        let groups = resp.security_groups().unwrap_or_default();
        if groups.is_empty() {
            return Ok(None);
        }

        let group = &groups[0];
        let group_id = group.group_id().unwrap_or_default().to_string();
        if group_id.is_empty() {
            return Err(Error::Other {
                message: format!("security group '{group_name}' has an empty group Id"),
                is_retryable: false,
            });
        }

        let mut ingress = Vec::new();
        for perm in group.ip_permissions().unwrap_or_default() {
            let mut ipv4_cidrs = Vec::new();
            for ip_range in perm.ip_ranges().unwrap_or_default() {
                if let Some(cidr) = ip_range.cidr_ip() {
                    ipv4_cidrs.push(cidr.to_string());
                }
            }
            ingress.push(IngressRule {
                protocol: perm.ip_protocol().unwrap_or("-1").to_string(),
                from_port: perm.from_port().unwrap_or(0) as i64,
                to_port: perm.to_port().unwrap_or(65535) as i64,
                ipv4_cidrs,
            });
        }

        Ok(Some(SecurityGroup {
            id: group_id,
            name: group_name.to_string(),
            ingress,
        }))
    }

    /// Resolves the newest Ubuntu AMI for the current region.
    /// Region-scoped since AMI Ids differ across regions.
    /// ref. https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeImages.html
    pub async fn latest_ubuntu_ami(&self) -> Result<String> {
        log::info!("resolving the latest Ubuntu AMI");
        let resp = self
            .cli
            .describe_images()
            .owners(UBUNTU_AMI_OWNER)
            .filters(
                Filter::builder()
                    .name("name")
                    .values(UBUNTU_AMI_NAME_FILTER)
                    .build(),
            )
            .filters(Filter::builder().name("state").values("available").build())
            .send()
            .await
            .map_err(|e| Error::API {
                message: format!("failed describe_images {:?}", e),
                is_retryable: is_err_retryable(&e),
            })?;

        let mut images = resp.images().unwrap_or_default().to_vec();
        if images.is_empty() {
            return Err(Error::Other {
                message: "no Ubuntu AMI found in this region".to_string(),
                is_retryable: false,
            });
        }

        // creation dates are ISO-8601, lexicographic order is chronological
        images.sort_by(|a, b| {
            a.creation_date()
                .unwrap_or_default()
                .cmp(b.creation_date().unwrap_or_default())
        });
        let latest = images.last().unwrap();
        let ami = latest.image_id().unwrap_or_default().to_string();
        if ami.is_empty() {
            return Err(Error::Other {
                message: "latest Ubuntu AMI has an empty image Id".to_string(),
                is_retryable: false,
            });
        }

        log::info!("resolved Ubuntu AMI '{ami}'");
        Ok(ami)
    }

    /// Stops the instance, best-effort cleanup after a failed provisioning.
    /// ref. https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_StopInstances.html
    pub async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        log::info!("stopping instance '{instance_id}'");
        self.cli
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| Error::API {
                message: format!("failed stop_instances {:?}", e),
                is_retryable: is_err_retryable(&e),
            })?;
        log::info!("requested stop for instance '{instance_id}'");
        Ok(())
    }
}

/// RUST_LOG=debug cargo test --package node-ops --lib -- aws::ec2::test_security_group_rules --exact --show-output
#[test]
fn test_security_group_rules() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut sg = SecurityGroup {
        id: String::from("sg-0123456789abcdef0"),
        name: String::from("dev-us-west-2-nodeup-security-group"),
        ingress: vec![IngressRule {
            protocol: String::from("tcp"),
            from_port: 22,
            to_port: 22,
            ipv4_cidrs: vec![String::from("1.2.3.4/32")],
        }],
    };

    assert!(sg.allows_tcp("1.2.3.4", 22));
    assert!(!sg.allows_tcp("1.2.3.4", 9650));
    assert!(!sg.allows_tcp("5.6.7.8", 22));

    // only the API port is missing for the known caller
    assert_eq!(sg.missing_tcp_ports("1.2.3.4", &[22, 9650]), vec![9650]);

    // add the missing rule, then the same request must be a no-op
    sg.ingress.push(IngressRule {
        protocol: String::from("tcp"),
        from_port: 9650,
        to_port: 9650,
        ipv4_cidrs: vec![String::from("1.2.3.4/32")],
    });
    assert!(sg.missing_tcp_ports("1.2.3.4", &[22, 9650]).is_empty());

    // an open range covers every caller
    sg.ingress.push(IngressRule {
        protocol: String::from("tcp"),
        from_port: 0,
        to_port: 65535,
        ipv4_cidrs: vec![String::from("0.0.0.0/0")],
    });
    assert!(sg.missing_tcp_ports("5.6.7.8", &[22, 9650]).is_empty());
}
