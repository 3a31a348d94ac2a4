// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembles the CloudFormation template for a CORTX cluster

use crate::params::{ParameterDefaults, ParameterError};
use crate::phases::{self, ADDRESS_ATTRIBUTE, SIGNAL_TIMEOUT};
use crate::script::UserDataRenderer;
use crate::topology::{NodeRole, Topology, BOOT_DEVICES};
use cloudformation_types::ec2::{
    BlockDeviceMapping, Instance, LaunchTemplate, LaunchTemplateData,
    LaunchTemplateSpecification, NetworkInterface, NetworkInterfaceAttachment,
};
use cloudformation_types::{
    CreationPolicy, Expr, Mapping, Output, Resource, ResourceProperties,
    Template, TemplateBuilder, TemplateError,
};
use slog::{debug, info, Logger};
use thiserror::Error;

pub const DESCRIPTION: &str = "AWS CloudFormation Template for CORTX on \
    Kubernetes. See https://github.com/Seagate/cortx-k8s/blob/main/doc/\
    cortx-aws-k8s-installation.md for details.";

pub const REGION_MAP: &str = "RegionMap";
pub const NODE_TEMPLATE: &str = "NodeTemplate";
pub const CONTROL_PLANE_OUTPUT: &str = "ClusterControlPlane";

/// Base image (CentOS 7) for each supported region.
pub const REGION_AMIS: [(&str, &str); 20] = [
    ("us-east-2", "ami-00f8e2c955f7ffa9b"),
    ("us-east-1", "ami-00e87074e52e6c9f9"),
    ("us-west-1", "ami-08d2d8b00f270d03b"),
    ("us-west-2", "ami-0686851c4e7b1a8e1"),
    ("af-south-1", "ami-0b761332115c38669"),
    ("ap-east-1", "ami-09611bd6fa5dd0e3d"),
    ("ap-south-1", "ami-0ffc7af9c06de0077"),
    ("ap-northeast-1", "ami-0ddea5e0f69c193a4"),
    ("ap-northeast-2", "ami-0e4214f08b51e23cc"),
    ("ap-southeast-1", "ami-0adfdaea54d40922b"),
    ("ap-southeast-2", "ami-03d56f451ca110e99"),
    ("ca-central-1", "ami-0a7c5b189b6460115"),
    ("eu-central-1", "ami-08b6d44b4f6f7b279"),
    ("eu-west-1", "ami-04f5641b0d178a27a"),
    ("eu-west-2", "ami-0b22fcaf3564fb0c9"),
    ("eu-west-3", "ami-072ec828dae86abe5"),
    ("eu-south-1", "ami-0fe3899b62205176a"),
    ("eu-north-1", "ami-0358414bac2039369"),
    ("me-south-1", "ami-0ac17dcdd6f6f4eb6"),
    ("sa-east-1", "ami-02334c45dd95ca1fc"),
];

const AMI_KEY: &str = "AMI";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid parameter default")]
    Parameter(#[from] ParameterError),

    #[error("generated template is inconsistent")]
    Template(#[from] TemplateError),
}

fn region_map() -> Mapping {
    let mut map = Mapping::new();
    for (region, ami) in REGION_AMIS {
        map.insert(region, AMI_KEY, ami);
    }
    map
}

/// The launch template every node starts from.
///
/// Motr disks are attached here rather than per instance, so every node gets
/// the same three boot disks followed by the same Motr device range.
fn node_template(topology: &Topology) -> Resource {
    let boot_sizes = ["DiskSizeOS", "DiskSizeApplication", "DiskSizeLog"];
    let boot_disks = BOOT_DEVICES.iter().zip(boot_sizes).map(|(device, size)| {
        BlockDeviceMapping::ephemeral(*device, Expr::reference(size))
    });
    let motr_disks = topology.devices().into_iter().map(|device| {
        BlockDeviceMapping::ephemeral(device, Expr::reference("DiskSizeMotr"))
    });

    Resource::new(ResourceProperties::LaunchTemplate(LaunchTemplate {
        launch_template_data: LaunchTemplateData {
            image_id: Expr::find_in_map(
                REGION_MAP,
                Expr::reference("AWS::Region"),
                AMI_KEY,
            ),
            instance_type: Expr::reference("InstanceType"),
            key_name: Expr::reference("KeyPair"),
            block_device_mappings: boot_disks.chain(motr_disks).collect(),
        },
    }))
}

fn network_interface() -> Resource {
    Resource::new(ResourceProperties::NetworkInterface(NetworkInterface {
        source_dest_check: false,
        group_set: vec![Expr::reference("SecurityGroup")],
        subnet_id: Expr::reference("Subnet"),
    }))
}

fn instance(node: NodeRole, topology: &Topology) -> Resource {
    let script = phases::boot_script(node, topology);
    Resource::new(ResourceProperties::Instance(Instance {
        launch_template: LaunchTemplateSpecification {
            launch_template_id: Expr::reference(NODE_TEMPLATE),
            version: Expr::get_att(NODE_TEMPLATE, "LatestVersionNumber"),
        },
        network_interfaces: vec![NetworkInterfaceAttachment {
            network_interface_id: Expr::reference(node.eni_logical_id()),
            device_index: "0".to_string(),
        }],
        user_data: script.render(&UserDataRenderer),
    }))
    .with_creation_policy(CreationPolicy::signal_within(SIGNAL_TIMEOUT))
}

/// Builds the complete template for `topology`.
///
/// The result depends only on the arguments: generating twice from the same
/// inputs yields identical templates.
pub fn generate(
    log: &Logger,
    topology: &Topology,
    defaults: &ParameterDefaults,
) -> Result<Template, GenerateError> {
    defaults.validate()?;
    info!(
        log,
        "generating template";
        "nodes" => topology.node_count(),
        "workers" => topology.worker_count(),
        "cvgs" => topology.cvgs(),
        "data_per_cvg" => topology.data_per_cvg(),
        "motr_disks" => topology.disk_count()
    );

    let mut builder = TemplateBuilder::new(DESCRIPTION);
    defaults.declare(&mut builder)?;
    builder.mapping(REGION_MAP, region_map())?;
    builder.resource(NODE_TEMPLATE, node_template(topology))?;

    for node in topology.nodes() {
        let eni = node.eni_logical_id();
        debug!(log, "adding node"; "node" => %node, "eni" => &eni);
        builder.resource(eni, network_interface())?;
        builder.resource(node.logical_id(), instance(node, topology))?;
    }

    builder.output(
        CONTROL_PLANE_OUTPUT,
        Output::new(Expr::get_att(
            NodeRole::ControlPlane.eni_logical_id(),
            ADDRESS_ATTRIBUTE,
        ))
        .description("IP of the k8s control plane node"),
    )?;

    Ok(builder.build()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use cloudformation_types::ec2::{INSTANCE_TYPE, NETWORK_INTERFACE_TYPE};
    use serde_json::{json, Value};

    fn log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn generate_for(nodes: u32, cvgs: u32, data: u32) -> Template {
        let topology = Topology::new(nodes, cvgs, data).unwrap();
        generate(&log(), &topology, &ParameterDefaults::default()).unwrap()
    }

    fn user_data_lines(value: &Value, node: &str) -> Vec<Value> {
        value["Resources"][node]["Properties"]["UserData"]["Fn::Base64"]
            ["Fn::Join"][1]
            .as_array()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_resource_counts() {
        for nodes in 1..=5 {
            for (cvgs, data) in [(1, 2), (2, 2), (3, 4)] {
                let template = generate_for(nodes, cvgs, data);
                let instances: Vec<_> =
                    template.resources_of_type(INSTANCE_TYPE).collect();
                let enis: Vec<_> = template
                    .resources_of_type(NETWORK_INTERFACE_TYPE)
                    .collect();
                assert_eq!(instances.len(), nodes as usize);
                assert_eq!(enis.len(), nodes as usize);

                let mut expected = vec!["ControlPlane".to_string()];
                expected.extend((0..nodes - 1).map(|i| format!("Worker{i}")));
                assert_eq!(instances, expected);
            }
        }
    }

    #[test]
    fn test_three_node_scenario() {
        let template = generate_for(3, 2, 2);
        let names: Vec<_> =
            template.resources.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "NodeTemplate",
                "ControlPlaneENI",
                "ControlPlane",
                "Worker0ENI",
                "Worker0",
                "Worker1ENI",
                "Worker1",
            ]
        );

        let launch_template = template.resources[NODE_TEMPLATE]
            .as_launch_template()
            .unwrap();
        let devices: Vec<_> = launch_template
            .launch_template_data
            .block_device_mappings
            .iter()
            .map(|m| m.device_name.as_str())
            .collect();
        assert_eq!(
            devices,
            vec![
                "/dev/sda1", "/dev/sdb", "/dev/sdc", "/dev/sdd", "/dev/sde",
                "/dev/sdf", "/dev/sdg", "/dev/sdh", "/dev/sdi",
            ]
        );

        // Every instance launches from the shared template.
        for name in ["ControlPlane", "Worker0", "Worker1"] {
            let instance = template.resources[name].as_instance().unwrap();
            assert_eq!(
                instance.launch_template.launch_template_id,
                Expr::reference(NODE_TEMPLATE)
            );
            assert_eq!(
                instance.network_interfaces[0].network_interface_id,
                Expr::reference(format!("{name}ENI"))
            );
        }

        let value = serde_json::to_value(&template).unwrap();
        let join = json!({"Fn::Sub": "kubeadm join \
            ${ControlPlaneENI.PrimaryPrivateIpAddress}:6443 \
            --token ${KubernetesToken} \
            --discovery-token-unsafe-skip-ca-verification"});
        let init = json!("kubeadm init --config kubeadm-config.yaml");
        let control_plane = user_data_lines(&value, "ControlPlane");
        assert!(control_plane.contains(&init));
        assert!(!control_plane.contains(&join));
        for worker in ["Worker0", "Worker1"] {
            let lines = user_data_lines(&value, worker);
            assert!(lines.contains(&join));
            assert!(!lines.contains(&init));
        }
        for node in ["ControlPlane", "Worker0", "Worker1"] {
            assert_eq!(
                user_data_lines(&value, node).last(),
                Some(&json!("DEPLOY_SUCCESS=true"))
            );
        }
    }

    #[test]
    fn test_document_sections() {
        let value = serde_json::to_value(generate_for(1, 1, 2)).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(
            value["Parameters"]["KubernetesToken"]["AllowedPattern"],
            "[a-z0-9]{6}\\.[a-z0-9]{16}"
        );
        assert_eq!(
            value["Parameters"]["InstanceType"]["AllowedValues"],
            json!(["c5.2xlarge", "c5.4xlarge", "c5.9xlarge"])
        );
        assert_eq!(value["Parameters"]["SetupSize"]["Default"], "small");
        assert_eq!(value["Parameters"]["DurabilitySNS"]["Default"], "1+0+0");
        assert!(value["Parameters"]["Subnet"].get("Default").is_none());
        assert_eq!(
            value["Mappings"]["RegionMap"].as_object().unwrap().len(),
            20
        );
        assert_eq!(
            value["Mappings"]["RegionMap"]["eu-west-1"]["AMI"],
            "ami-04f5641b0d178a27a"
        );
        assert_eq!(
            value["Outputs"]["ClusterControlPlane"]["Value"],
            json!({
                "Fn::GetAtt": ["ControlPlaneENI", "PrimaryPrivateIpAddress"]
            })
        );
        assert_eq!(
            value["Resources"]["ControlPlane"]["CreationPolicy"],
            json!({"ResourceSignal": {"Timeout": "PT30M"}})
        );
        assert_eq!(
            value["Resources"]["NodeTemplate"]["Properties"]
                ["LaunchTemplateData"]["BlockDeviceMappings"]
                .as_array()
                .unwrap()
                .len(),
            6
        );
        assert!(value["Resources"].get("Worker0").is_none());
    }

    #[test]
    fn test_custom_defaults() {
        let mut defaults = ParameterDefaults::default();
        defaults.durability_sns = "4+2+0".parse().unwrap();
        defaults.disk_size_motr = 100;
        defaults.images.consul = "example.com/consul:2".to_string();
        let topology = Topology::new(2, 1, 2).unwrap();
        let template = generate(&log(), &topology, &defaults).unwrap();
        let value = serde_json::to_value(template).unwrap();
        assert_eq!(value["Parameters"]["DurabilitySNS"]["Default"], "4+2+0");
        assert_eq!(value["Parameters"]["DiskSizeMotr"]["Default"], "100");
        assert_eq!(
            value["Parameters"]["ImageConsul"]["Default"],
            "example.com/consul:2"
        );

        defaults.disk_size_os = 0;
        assert!(matches!(
            generate(&log(), &topology, &defaults),
            Err(GenerateError::Parameter(ParameterError::ZeroDiskSize(
                "DiskSizeOS"
            )))
        ));
    }

    #[test]
    fn test_deterministic() {
        let a = generate_for(4, 3, 2).to_json_pretty().unwrap();
        let b = generate_for(4, 3, 2).to_json_pretty().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, generate_for(4, 2, 3).to_json_pretty().unwrap());
    }
}
