use std::{
    fs,
    io::{self, Error, ErrorKind},
    path::{Path, PathBuf},
};

use async_trait::async_trait;

/// File name of the generated document inside the terraform directory.
pub const DOCUMENT_FILE: &str = "node.tf";

/// EC2 instance type for validator nodes.
pub const INSTANCE_TYPE: &str = "c5.2xlarge";
/// Root volume size for validator nodes, in GiB.
pub const VOLUME_SIZE_IN_GB: u32 = 1000;

/// Marker AWS returns when the account hit its elastic IP quota,
/// surfaced verbatim through terraform's error output.
pub const EIP_LIMIT_ERR: &str = "AddressLimitExceeded";

/// Returns true if the provisioning failure is the elastic IP quota error,
/// in which case retrying in a different region may succeed.
pub fn is_eip_quota_error(err: &str) -> bool {
    err.contains(EIP_LIMIT_ERR)
}

/// Declarative document describing the cloud resources for one node.
/// Regenerated per run and discarded after a successful apply.
pub struct Document {
    body: String,
}

impl Document {
    pub fn new(region: &str) -> Self {
        let body = format!(
            r#"terraform {{
  required_providers {{
    aws = {{
      source = "hashicorp/aws"
    }}
    tls = {{
      source = "hashicorp/tls"
    }}
    local = {{
      source = "hashicorp/local"
    }}
  }}
}}

provider "aws" {{
  region = "{region}"
}}
"#
        );
        Self { body }
    }

    /// Declares a new key pair and writes its private key next to the
    /// document, for the caller to move under the SSH directory.
    pub fn add_key_pair(&mut self, key_pair: &str, cert_file: &Path) {
        self.body.push_str(&format!(
            r#"
resource "tls_private_key" "node_key" {{
  algorithm = "RSA"
  rsa_bits  = 4096
}}

resource "aws_key_pair" "node_key_pair" {{
  key_name   = "{key_pair}"
  public_key = tls_private_key.node_key.public_key_openssh
}}

resource "local_sensitive_file" "node_cert" {{
  content         = tls_private_key.node_key.private_key_pem
  filename        = "{}"
  file_permission = "0400"
}}
"#,
            cert_file.display()
        ));
    }

    /// Declares a new security group permitting inbound TCP from "ip"
    /// on each of "ports", with open egress.
    pub fn add_security_group(&mut self, group_name: &str, ip: &str, ports: &[u32]) {
        let mut ingress = String::new();
        for port in ports.iter() {
            ingress.push_str(&format!(
                r#"
  ingress {{
    from_port   = {port}
    to_port     = {port}
    protocol    = "tcp"
    cidr_blocks = ["{ip}/32"]
  }}
"#
            ));
        }
        self.body.push_str(&format!(
            r#"
resource "aws_security_group" "node_security_group" {{
  name        = "{group_name}"
  description = "validator node security group"
{ingress}
  egress {{
    from_port   = 0
    to_port     = 0
    protocol    = "-1"
    cidr_blocks = ["0.0.0.0/0"]
  }}
}}
"#
        ));
    }

    /// Extends an existing security group with the rules it is missing.
    /// No-op for an empty "ports".
    pub fn add_security_group_rules(&mut self, group_id: &str, ip: &str, ports: &[u32]) {
        for port in ports.iter() {
            self.body.push_str(&format!(
                r#"
resource "aws_security_group_rule" "ingress_{port}" {{
  type              = "ingress"
  from_port         = {port}
  to_port           = {port}
  protocol          = "tcp"
  cidr_blocks       = ["{ip}/32"]
  security_group_id = "{group_id}"
}}
"#
            ));
        }
    }

    /// Declares the static public IP, always allocated fresh.
    pub fn add_elastic_ip(&mut self) {
        self.body.push_str(
            r#"
resource "aws_eip" "node_eip" {
  vpc = true
}

resource "aws_eip_association" "node_eip_assoc" {
  instance_id   = aws_instance.node.id
  allocation_id = aws_eip.node_eip.id
}
"#,
        );
    }

    /// Declares the instance itself. References the declared key pair and
    /// security group unless the run reuses existing ones.
    pub fn add_instance(
        &mut self,
        ami: &str,
        key_pair: &str,
        use_existing_key_pair: bool,
        security_group: &str,
        use_existing_security_group: bool,
    ) {
        let key_name = if use_existing_key_pair {
            format!("\"{key_pair}\"")
        } else {
            String::from("aws_key_pair.node_key_pair.key_name")
        };
        let group_name = if use_existing_security_group {
            format!("\"{security_group}\"")
        } else {
            String::from("aws_security_group.node_security_group.name")
        };
        self.body.push_str(&format!(
            r#"
resource "aws_instance" "node" {{
  ami             = "{ami}"
  instance_type   = "{INSTANCE_TYPE}"
  key_name        = {key_name}
  security_groups = [{group_name}]

  root_block_device {{
    volume_size = {VOLUME_SIZE_IN_GB}
  }}
}}
"#
        ));
    }

    /// Declares the outputs read back after apply.
    pub fn add_outputs(&mut self) {
        self.body.push_str(
            r#"
output "instance_id" {
  value = aws_instance.node.id
}

output "elastic_ip" {
  value = aws_eip.node_eip.public_ip
}
"#,
        );
    }

    pub fn encode_hcl(&self) -> String {
        self.body.clone()
    }

    /// Writes the document into the terraform directory.
    pub fn sync(&self, tf_dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(tf_dir)?;
        let file_path = tf_dir.join(DOCUMENT_FILE);
        log::info!("syncing terraform document to '{}'", file_path.display());
        fs::write(&file_path, self.body.as_bytes())?;
        Ok(file_path)
    }
}

/// Reconciles real cloud state with the generated document.
/// The create flow never sees the underlying tool's argument conventions,
/// so tests can substitute an in-memory implementation.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Applies the document, returning (instance Id, elastic IP).
    async fn apply(&self) -> io::Result<(String, String)>;
    /// Reads the instance Id back from a partially applied run.
    async fn instance_id(&self) -> io::Result<String>;
}

/// Shells out to the terraform binary against the terraform directory.
pub struct Runner {
    tf_dir: PathBuf,
}

impl Runner {
    pub fn new(tf_dir: &Path) -> Self {
        Self {
            tf_dir: tf_dir.to_path_buf(),
        }
    }

    /// Fails fast when the terraform binary is not installed.
    pub fn check_installed() -> io::Result<()> {
        command_manager::run("terraform version").map_err(|e| {
            Error::new(
                ErrorKind::NotFound,
                format!(
                    "terraform not found in PATH ({e}); install it first, see https://developer.hashicorp.com/terraform/downloads"
                ),
            )
        })?;
        Ok(())
    }

    fn output(&self, name: &str) -> io::Result<String> {
        let output = command_manager::run(&format!(
            "terraform -chdir={} output -raw {name}",
            self.tf_dir.display()
        ))?;
        Ok(output.stdout.trim().to_string())
    }
}

#[async_trait]
impl Provisioner for Runner {
    async fn apply(&self) -> io::Result<(String, String)> {
        log::info!("running terraform init/apply in '{}'", self.tf_dir.display());
        command_manager::run(&format!(
            "terraform -chdir={} init -input=false",
            self.tf_dir.display()
        ))?;
        command_manager::run(&format!(
            "terraform -chdir={} apply -auto-approve -input=false",
            self.tf_dir.display()
        ))?;

        let instance_id = self.output("instance_id")?;
        let elastic_ip = self.output("elastic_ip")?;
        Ok((instance_id, elastic_ip))
    }

    async fn instance_id(&self) -> io::Result<String> {
        self.output("instance_id")
    }
}

/// RUST_LOG=debug cargo test --package nodeup-aws --bin nodeup-aws -- terraform::test_document --exact --show-output
#[test]
fn test_document() {
    let mut doc = Document::new("us-west-2");
    doc.add_key_pair("dev-us-west-2-nodeup", Path::new("/tmp/tf/cert.pem"));
    doc.add_security_group("dev-us-west-2-nodeup-security-group", "1.2.3.4", &[22, 9650]);
    doc.add_elastic_ip();
    doc.add_instance(
        "ami-0123456789abcdef0",
        "dev-us-west-2-nodeup",
        false,
        "dev-us-west-2-nodeup-security-group",
        false,
    );
    doc.add_outputs();

    let hcl = doc.encode_hcl();
    assert!(hcl.contains("region = \"us-west-2\""));
    assert!(hcl.contains("key_name   = \"dev-us-west-2-nodeup\""));
    assert!(hcl.contains("from_port   = 22"));
    assert!(hcl.contains("from_port   = 9650"));
    assert!(hcl.contains("cidr_blocks = [\"1.2.3.4/32\"]"));
    assert!(hcl.contains("key_name        = aws_key_pair.node_key_pair.key_name"));
    assert!(hcl.contains("output \"instance_id\""));
    assert!(hcl.contains("output \"elastic_ip\""));
}

/// RUST_LOG=debug cargo test --package nodeup-aws --bin nodeup-aws -- terraform::test_document_existing_resources --exact --show-output
#[test]
fn test_document_existing_resources() {
    let mut doc = Document::new("us-east-1");
    // only the API port is missing for this caller
    doc.add_security_group_rules("sg-0123456789abcdef0", "1.2.3.4", &[9650]);
    doc.add_elastic_ip();
    doc.add_instance(
        "ami-0123456789abcdef0",
        "dev-us-east-1-nodeup",
        true,
        "dev-us-east-1-nodeup-security-group",
        true,
    );
    doc.add_outputs();

    let hcl = doc.encode_hcl();
    assert!(hcl.contains("key_name        = \"dev-us-east-1-nodeup\""));
    assert!(hcl.contains("security_groups = [\"dev-us-east-1-nodeup-security-group\"]"));
    assert!(hcl.contains("ingress_9650"));
    assert!(!hcl.contains("ingress_22"));
    assert!(!hcl.contains("tls_private_key"));
}

/// RUST_LOG=debug cargo test --package nodeup-aws --bin nodeup-aws -- terraform::test_eip_quota_error --exact --show-output
#[test]
fn test_eip_quota_error() {
    assert!(is_eip_quota_error(
        "Error: creating EC2 EIP: AddressLimitExceeded: The maximum number of addresses has been reached."
    ));
    assert!(!is_eip_quota_error(
        "Error: creating EC2 Instance: InvalidKeyPair.NotFound"
    ));
}
