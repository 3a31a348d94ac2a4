// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property types for the EC2 resources we emit

use crate::expr::Expr;
use serde::Serialize;

pub const LAUNCH_TEMPLATE_TYPE: &str = "AWS::EC2::LaunchTemplate";
pub const NETWORK_INTERFACE_TYPE: &str = "AWS::EC2::NetworkInterface";
pub const INSTANCE_TYPE: &str = "AWS::EC2::Instance";

/// `AWS::EC2::LaunchTemplate`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchTemplate {
    pub launch_template_data: LaunchTemplateData,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchTemplateData {
    pub image_id: Expr,
    pub instance_type: Expr,
    pub key_name: Expr,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

/// Attaches an EBS volume to an instance under the given device name
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub ebs: Ebs,
}

impl BlockDeviceMapping {
    /// A volume of `volume_size` GiB that goes away with its instance.
    pub fn ephemeral(
        device_name: impl Into<String>,
        volume_size: Expr,
    ) -> Self {
        BlockDeviceMapping {
            device_name: device_name.into(),
            ebs: Ebs { volume_size, delete_on_termination: true },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ebs {
    pub volume_size: Expr,
    pub delete_on_termination: bool,
}

/// `AWS::EC2::NetworkInterface`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInterface {
    pub source_dest_check: bool,
    pub group_set: Vec<Expr>,
    pub subnet_id: Expr,
}

/// `AWS::EC2::Instance`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub launch_template: LaunchTemplateSpecification,
    pub network_interfaces: Vec<NetworkInterfaceAttachment>,
    pub user_data: Expr,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchTemplateSpecification {
    pub launch_template_id: Expr,
    pub version: Expr,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInterfaceAttachment {
    pub network_interface_id: Expr,
    pub device_index: String,
}

impl LaunchTemplate {
    pub(crate) fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        let data = &self.launch_template_data;
        out.extend([&data.image_id, &data.instance_type, &data.key_name]);
        out.extend(
            data.block_device_mappings.iter().map(|m| &m.ebs.volume_size),
        );
    }
}

impl NetworkInterface {
    pub(crate) fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        out.extend(self.group_set.iter());
        out.push(&self.subnet_id);
    }
}

impl Instance {
    pub(crate) fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        out.push(&self.launch_template.launch_template_id);
        out.push(&self.launch_template.version);
        out.extend(
            self.network_interfaces.iter().map(|n| &n.network_interface_id),
        );
        out.push(&self.user_data);
    }
}
