// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level template document and its sections

use crate::ec2;
use crate::expr::Expr;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

pub const FORMAT_VERSION: &str = "2010-09-09";

/// A complete CloudFormation template
///
/// Sections serialize in a fixed order, and the entries of each section in
/// the order they were added to the [`crate::TemplateBuilder`], so the same
/// inputs always produce byte-identical JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Parameter>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub mappings: IndexMap<String, Mapping>,
    pub resources: IndexMap<String, Resource>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

impl Template {
    /// Renders the template as JSON indented by two spaces.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Returns the logical IDs of all resources of the given type, in
    /// document order.
    pub fn resources_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.type_name() == type_name)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ParameterType {
    String,
    Number,
    #[serde(rename = "AWS::EC2::Subnet::Id")]
    SubnetId,
    #[serde(rename = "AWS::EC2::SecurityGroup::Id")]
    SecurityGroupId,
    #[serde(rename = "AWS::EC2::KeyPair::KeyName")]
    KeyPairName,
}

/// An input the stack's creator may supply
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Type")]
    pub kind: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_description: Option<String>,
}

impl Parameter {
    pub fn new(kind: ParameterType) -> Self {
        Parameter {
            description: None,
            kind,
            default: None,
            allowed_values: Vec::new(),
            allowed_pattern: None,
            constraint_description: None,
        }
    }

    pub fn string() -> Self {
        Self::new(ParameterType::String)
    }

    pub fn number() -> Self {
        Self::new(ParameterType::Number)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, default: impl ToString) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_pattern = Some(pattern.into());
        self
    }

    pub fn constraint_description(
        mut self,
        description: impl Into<String>,
    ) -> Self {
        self.constraint_description = Some(description.into());
        self
    }
}

/// A two-level lookup table for `Fn::FindInMap`
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Mapping(IndexMap<String, IndexMap<String, String>>);

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        top_level_key: impl Into<String>,
        second_level_key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.0
            .entry(top_level_key.into())
            .or_default()
            .insert(second_level_key.into(), value.into());
    }
}

/// The typed properties of a resource; the variant determines `Type`.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ResourceProperties {
    LaunchTemplate(ec2::LaunchTemplate),
    NetworkInterface(ec2::NetworkInterface),
    Instance(ec2::Instance),
}

impl ResourceProperties {
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceProperties::LaunchTemplate(_) => ec2::LAUNCH_TEMPLATE_TYPE,
            ResourceProperties::NetworkInterface(_) => {
                ec2::NETWORK_INTERFACE_TYPE
            }
            ResourceProperties::Instance(_) => ec2::INSTANCE_TYPE,
        }
    }

    fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            ResourceProperties::LaunchTemplate(p) => p.collect_expressions(out),
            ResourceProperties::NetworkInterface(p) => {
                p.collect_expressions(out)
            }
            ResourceProperties::Instance(p) => p.collect_expressions(out),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Resource {
    pub properties: ResourceProperties,
    pub creation_policy: Option<CreationPolicy>,
}

impl Resource {
    pub fn new(properties: ResourceProperties) -> Self {
        Resource { properties, creation_policy: None }
    }

    pub fn with_creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.creation_policy = Some(policy);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.properties.type_name()
    }

    /// Every expression that appears in this resource's properties.
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.properties.collect_expressions(&mut out);
        out
    }

    pub fn as_instance(&self) -> Option<&ec2::Instance> {
        match &self.properties {
            ResourceProperties::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_launch_template(&self) -> Option<&ec2::LaunchTemplate> {
        match &self.properties {
            ResourceProperties::LaunchTemplate(template) => Some(template),
            _ => None,
        }
    }
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.creation_policy.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("Type", self.type_name())?;
        map.serialize_entry("Properties", &self.properties)?;
        if let Some(policy) = &self.creation_policy {
            map.serialize_entry("CreationPolicy", policy)?;
        }
        map.end()
    }
}

/// Makes CloudFormation wait for a success signal (sent by `cfn-signal` from
/// the instance) before it marks the resource complete.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreationPolicy {
    pub resource_signal: ResourceSignal,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceSignal {
    /// ISO 8601 duration, e.g. `PT30M`
    pub timeout: String,
}

impl CreationPolicy {
    pub fn signal_within(timeout: impl Into<String>) -> Self {
        CreationPolicy {
            resource_signal: ResourceSignal { timeout: timeout.into() },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Expr,
}

impl Output {
    pub fn new(value: Expr) -> Self {
        Output { description: None, value }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
