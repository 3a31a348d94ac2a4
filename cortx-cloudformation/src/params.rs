// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Template parameters and their defaults
//!
//! Everything here ends up in the template's `Parameters` section, where the
//! stack's creator may still override it.  Only the defaults are ours to
//! choose, and they can be changed through the config file; they are
//! validated here so that we never emit a default CloudFormation would
//! reject.

use cloudformation_types::{
    Parameter, ParameterType, TemplateBuilder, TemplateError,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pattern of a `kubeadm` bootstrap token, as written into the template.
pub const BOOTSTRAP_TOKEN_PATTERN: &str = "[a-z0-9]{6}\\.[a-z0-9]{16}";

static BOOTSTRAP_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^{BOOTSTRAP_TOKEN_PATTERN}$"))
        .expect("bootstrap token pattern is a valid regex")
});

const DEFAULT_CORTX_IMAGE: &str =
    "ghcr.io/seagate/cortx-all:2.0.0-642-custom-ci";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("durability {0:?} is not of the form N+K+S with N >= 1")]
    InvalidDurability(String),

    #[error(
        "Kubernetes token {0:?} does not match {pattern}",
        pattern = BOOTSTRAP_TOKEN_PATTERN
    )]
    InvalidToken(String),

    #[error("{0} must be at least 1 GiB")]
    ZeroDiskSize(&'static str),

    #[error("deployment repo version {0:?} must be a non-empty branch or tag")]
    InvalidRepoVersion(String),

    #[error("image reference for {0} must not be empty")]
    EmptyImage(&'static str),
}

/// Data durability of the form `N+K+S`: data units, parity units and spare
/// units per parity group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Durability {
    pub data: u32,
    pub parity: u32,
    pub spare: u32,
}

impl Durability {
    pub const NONE: Durability = Durability { data: 1, parity: 0, spare: 0 };
}

impl FromStr for Durability {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParameterError::InvalidDurability(s.to_string());
        let parts = s
            .split('+')
            .map(|part| {
                if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(invalid());
                }
                part.parse::<u32>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            &[data, parity, spare] if data >= 1 => {
                Ok(Durability { data, parity, spare })
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Durability {
    type Error = ParameterError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}+{}+{}", self.data, self.parity, self.spare)
    }
}

/// A `kubeadm` bootstrap token (`abcdef.0123456789abcdef`)
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct BootstrapToken(String);

impl BootstrapToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BootstrapToken {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if BOOTSTRAP_TOKEN_RE.is_match(s) {
            Ok(BootstrapToken(s.to_string()))
        } else {
            Err(ParameterError::InvalidToken(s.to_string()))
        }
    }
}

impl TryFrom<String> for BootstrapToken {
    type Error = ParameterError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Default for BootstrapToken {
    fn default() -> Self {
        BootstrapToken("abcdef.1234567890abcdef".to_string())
    }
}

/// How aggressively CORTX allocates memory
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SetupSize {
    #[default]
    Small,
    Large,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, strum::Display,
    strum::EnumIter,
)]
pub enum InstanceType {
    #[default]
    #[serde(rename = "c5.2xlarge")]
    #[strum(serialize = "c5.2xlarge")]
    C5_2xlarge,
    #[serde(rename = "c5.4xlarge")]
    #[strum(serialize = "c5.4xlarge")]
    C5_4xlarge,
    #[serde(rename = "c5.9xlarge")]
    #[strum(serialize = "c5.9xlarge")]
    C5_9xlarge,
}

/// Container images for each CORTX component and its 3rd-party services
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Images {
    pub cortx_control: String,
    pub cortx_data: String,
    pub cortx_server: String,
    pub cortx_ha: String,
    pub cortx_client: String,
    pub openldap: String,
    pub consul: String,
    pub kafka: String,
    pub zookeeper: String,
    pub rancher: String,
    pub busybox: String,
}

impl Default for Images {
    fn default() -> Self {
        Images {
            cortx_control: DEFAULT_CORTX_IMAGE.to_string(),
            cortx_data: DEFAULT_CORTX_IMAGE.to_string(),
            cortx_server: DEFAULT_CORTX_IMAGE.to_string(),
            cortx_ha: DEFAULT_CORTX_IMAGE.to_string(),
            cortx_client: DEFAULT_CORTX_IMAGE.to_string(),
            openldap: "ghcr.io/seagate/symas-openldap:2.4.58".to_string(),
            consul: "ghcr.io/seagate/consul:1.10.0".to_string(),
            kafka: "ghcr.io/seagate/kafka:3.0.0-debian-10-r7".to_string(),
            zookeeper: "ghcr.io/seagate/zookeeper:3.7.0-debian-10-r182"
                .to_string(),
            rancher: "ghcr.io/seagate/local-path-provisioner:v0.0.20"
                .to_string(),
            busybox: "ghcr.io/seagate/busybox:latest".to_string(),
        }
    }
}

/// Template parameter name and `solution.yaml` image key of each image, in
/// the order they are declared and patched.
pub const IMAGE_PARAMETERS: [(&str, &str); 11] = [
    ("ImageCORTXControl", "cortxcontrol"),
    ("ImageCORTXData", "cortxdata"),
    ("ImageCORTXServer", "cortxserver"),
    ("ImageCORTXHA", "cortxha"),
    ("ImageCORTXClient", "cortxclient"),
    ("ImageOpenLDAP", "openldap"),
    ("ImageConsul", "consul"),
    ("ImageKafka", "kafka"),
    ("ImageZookeeper", "zookeeper"),
    ("ImageRancher", "rancher"),
    ("ImageBusybox", "busybox"),
];

impl Images {
    fn values(&self) -> [&str; 11] {
        [
            &self.cortx_control,
            &self.cortx_data,
            &self.cortx_server,
            &self.cortx_ha,
            &self.cortx_client,
            &self.openldap,
            &self.consul,
            &self.kafka,
            &self.zookeeper,
            &self.rancher,
            &self.busybox,
        ]
    }

    /// Pairs each image's template parameter name with its value.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        IMAGE_PARAMETERS.iter().map(|(name, _)| *name).zip(self.values())
    }
}

/// Default values of the template's parameters
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterDefaults {
    pub setup_size: SetupSize,
    pub disk_size_os: u32,
    pub disk_size_application: u32,
    pub disk_size_log: u32,
    pub disk_size_motr: u32,
    pub version_deployment_repo: String,
    pub images: Images,
    pub durability_sns: Durability,
    pub durability_dix: Durability,
    pub instance_type: InstanceType,
    pub kubernetes_token: BootstrapToken,
}

impl Default for ParameterDefaults {
    fn default() -> Self {
        ParameterDefaults {
            setup_size: SetupSize::default(),
            disk_size_os: 50,
            disk_size_application: 25,
            disk_size_log: 25,
            disk_size_motr: 25,
            // The prereq invocation in `phases` matches this release's
            // arguments; check it before bumping.
            version_deployment_repo: "v0.0.22".to_string(),
            images: Images::default(),
            durability_sns: Durability::NONE,
            durability_dix: Durability::NONE,
            instance_type: InstanceType::default(),
            kubernetes_token: BootstrapToken::default(),
        }
    }
}

impl ParameterDefaults {
    /// Checks the constraints the field types can't express.
    pub fn validate(&self) -> Result<(), ParameterError> {
        for (name, size) in [
            ("DiskSizeOS", self.disk_size_os),
            ("DiskSizeApplication", self.disk_size_application),
            ("DiskSizeLog", self.disk_size_log),
            ("DiskSizeMotr", self.disk_size_motr),
        ] {
            if size == 0 {
                return Err(ParameterError::ZeroDiskSize(name));
            }
        }

        let version = &self.version_deployment_repo;
        if version.is_empty() || version.chars().any(char::is_whitespace) {
            return Err(ParameterError::InvalidRepoVersion(version.clone()));
        }

        for (name, image) in self.images.entries() {
            if image.trim().is_empty() {
                return Err(ParameterError::EmptyImage(name));
            }
        }
        Ok(())
    }

    /// Adds the `Parameters` section to `builder`.
    pub fn declare(
        &self,
        builder: &mut TemplateBuilder,
    ) -> Result<(), TemplateError> {
        builder.parameter(
            "SetupSize",
            Parameter::string()
                .description(
                    "Resource utilization to configure. \"large\" \
                     aggressively allocates memory, and requires larger \
                     amounts of RAM on nodes.",
                )
                .default_value(self.setup_size)
                .allowed_values(
                    <SetupSize as strum::IntoEnumIterator>::iter()
                        .map(|size| size.to_string()),
                ),
        )?;

        builder.parameter(
            "DiskSizeOS",
            Parameter::number()
                .description("Size of OS disk in GiB.")
                .default_value(self.disk_size_os),
        )?;
        builder.parameter(
            "DiskSizeApplication",
            Parameter::number()
                .description(
                    "Size of disk in GiB for 3rd party applications required \
                     for normal CORTX installation. This disk is used also \
                     to store various CORTX logs -- for a long-running \
                     clusters under heavy load we recommend at least 50GB of \
                     capacity for this disk",
                )
                .default_value(self.disk_size_application),
        )?;
        builder.parameter(
            "DiskSizeLog",
            Parameter::number()
                .description(
                    "Size of disk in GiB for internal logs. (Not used)",
                )
                .default_value(self.disk_size_log),
        )?;
        builder.parameter(
            "DiskSizeMotr",
            Parameter::number()
                .description("Size of Motr data and metadata disks in GiB.")
                .default_value(self.disk_size_motr),
        )?;

        builder.parameter(
            "VersionDeploymentRepo",
            Parameter::string()
                .description(
                    "Version of cortx-k8s repo to build from. Can be either a \
                     branch or tagged release.",
                )
                .default_value(&self.version_deployment_repo),
        )?;
        for (name, image) in self.images.entries() {
            builder.parameter(name, Parameter::string().default_value(image))?;
        }

        builder.parameter(
            "DurabilitySNS",
            Parameter::string()
                .description("Durability for data, of the form N+K+S.")
                .default_value(self.durability_sns),
        )?;
        builder.parameter(
            "DurabilityDIX",
            Parameter::string()
                .description("Durability for metadata, of the form N+K+S.")
                .default_value(self.durability_dix),
        )?;

        builder.parameter(
            "Subnet",
            Parameter::new(ParameterType::SubnetId).description(
                "Name of a private subnet for the cluster. Note that all \
                 nodes will reside in the same availability zone.",
            ),
        )?;
        builder.parameter(
            "SecurityGroup",
            Parameter::new(ParameterType::SecurityGroupId).description(
                "Name of an existing security group with SSH (tcp/22) access \
                 from the bastion subnet.",
            ),
        )?;
        builder.parameter(
            "KeyPair",
            Parameter::new(ParameterType::KeyPairName).description(
                "Name of an existing EC2 key pair to enable SSH access to the \
                 nodes.",
            ),
        )?;
        builder.parameter(
            "InstanceType",
            Parameter::string()
                .description("EC2 instance type.")
                .default_value(self.instance_type)
                .allowed_values(
                    <InstanceType as strum::IntoEnumIterator>::iter()
                        .map(|t| t.to_string()),
                )
                .constraint_description(
                    "must be a valid EC2 instance type. c5.2xlarge is \
                     sufficient for 3 node clusters.",
                ),
        )?;

        builder.parameter(
            "KubernetesToken",
            Parameter::string()
                .description(
                    "Token to use to bootstrap the Kubernetes cluster. Can be \
                     generated in advance by running `kubeadm token generate` \
                     on your local machine.",
                )
                .default_value(self.kubernetes_token.as_str())
                .allowed_pattern(BOOTSTRAP_TOKEN_PATTERN),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_durability() {
        assert_eq!("1+0+0".parse(), Ok(Durability::NONE));
        assert_eq!(
            "4+2+0".parse(),
            Ok(Durability { data: 4, parity: 2, spare: 0 })
        );
        assert_eq!(
            Durability { data: 8, parity: 2, spare: 1 }.to_string(),
            "8+2+1"
        );

        for bad in [
            "", "1+0", "1+0+0+0", "0+1+0", "a+b+c", "1++0", "+1+0+0", "1 +0+0",
        ] {
            assert_eq!(
                bad.parse::<Durability>(),
                Err(ParameterError::InvalidDurability(bad.to_string())),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_bootstrap_token() {
        assert!("abcdef.1234567890abcdef".parse::<BootstrapToken>().is_ok());
        assert!("07401b.f395accd246ae52d".parse::<BootstrapToken>().is_ok());
        for bad in [
            "",
            "ABCDEF.1234567890abcdef",
            "abcdef-1234567890abcdef",
            "abcde.1234567890abcdef",
            "abcdef.1234567890abcdef0",
            "xabcdef.1234567890abcdef",
        ] {
            assert_eq!(
                bad.parse::<BootstrapToken>(),
                Err(ParameterError::InvalidToken(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let defaults = ParameterDefaults::default();
        defaults.validate().unwrap();
        assert_eq!(defaults.setup_size.to_string(), "small");
        assert_eq!(defaults.instance_type.to_string(), "c5.2xlarge");
    }

    #[test]
    fn test_validate() {
        let mut defaults = ParameterDefaults::default();
        defaults.disk_size_motr = 0;
        assert_eq!(
            defaults.validate(),
            Err(ParameterError::ZeroDiskSize("DiskSizeMotr"))
        );

        let mut defaults = ParameterDefaults::default();
        defaults.version_deployment_repo = "v0.0.22 main".to_string();
        assert!(matches!(
            defaults.validate(),
            Err(ParameterError::InvalidRepoVersion(_))
        ));

        let mut defaults = ParameterDefaults::default();
        defaults.images.kafka = " ".to_string();
        assert_eq!(
            defaults.validate(),
            Err(ParameterError::EmptyImage("ImageKafka"))
        );
    }

    #[test]
    fn test_declare() {
        let mut builder = TemplateBuilder::new("test");
        ParameterDefaults::default().declare(&mut builder).unwrap();

        // Declaring twice collides on every name.
        assert!(ParameterDefaults::default().declare(&mut builder).is_err());
    }
}
