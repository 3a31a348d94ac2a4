// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validating construction of a [`Template`]

use crate::expr::{is_pseudo, Reference};
use crate::template::{
    Mapping, Output, Parameter, Resource, Template, FORMAT_VERSION,
};
use indexmap::IndexMap;
use thiserror::Error;

/// Errors which can be returned while assembling a template
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("logical ID {0:?} must be non-empty and alphanumeric")]
    InvalidLogicalId(String),

    #[error(
        "multiple definitions for {name:?} (previously a {previous}, now a \
         {current})"
    )]
    Duplicate { name: String, previous: &'static str, current: &'static str },

    #[error("{referrer} refers to undefined {kind} {target:?}")]
    Dangling { referrer: String, kind: &'static str, target: String },

    #[error("template must declare at least one resource")]
    NoResources,
}

/// Builder for assembling a [`Template`]
///
/// CloudFormation shares one namespace between parameters and resources, and
/// rejects a template whose `Ref`, `Fn::GetAtt`, `Fn::FindInMap` or `Fn::Sub`
/// names something that isn't declared.  The builder enforces both while the
/// template is still in our hands, so a broken template fails generation
/// instead of stack creation.
#[derive(Clone, Debug)]
pub struct TemplateBuilder {
    description: String,
    parameters: IndexMap<String, Parameter>,
    mappings: IndexMap<String, Mapping>,
    resources: IndexMap<String, Resource>,
    outputs: IndexMap<String, Output>,
}

impl TemplateBuilder {
    pub fn new(description: impl Into<String>) -> Self {
        TemplateBuilder {
            description: description.into(),
            parameters: IndexMap::new(),
            mappings: IndexMap::new(),
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn parameter(
        &mut self,
        name: impl Into<String>,
        parameter: Parameter,
    ) -> Result<(), TemplateError> {
        let name = self.check_new_name(name.into(), "parameter")?;
        self.parameters.insert(name, parameter);
        Ok(())
    }

    pub fn mapping(
        &mut self,
        name: impl Into<String>,
        mapping: Mapping,
    ) -> Result<(), TemplateError> {
        let name = check_logical_id(name.into())?;
        if self.mappings.contains_key(&name) {
            return Err(TemplateError::Duplicate {
                name,
                previous: "mapping",
                current: "mapping",
            });
        }
        self.mappings.insert(name, mapping);
        Ok(())
    }

    pub fn resource(
        &mut self,
        name: impl Into<String>,
        resource: Resource,
    ) -> Result<(), TemplateError> {
        let name = self.check_new_name(name.into(), "resource")?;
        self.resources.insert(name, resource);
        Ok(())
    }

    pub fn output(
        &mut self,
        name: impl Into<String>,
        output: Output,
    ) -> Result<(), TemplateError> {
        let name = check_logical_id(name.into())?;
        if self.outputs.contains_key(&name) {
            return Err(TemplateError::Duplicate {
                name,
                previous: "output",
                current: "output",
            });
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    /// Checks every reference in the template and returns the finished
    /// document.
    pub fn build(self) -> Result<Template, TemplateError> {
        if self.resources.is_empty() {
            return Err(TemplateError::NoResources);
        }

        for (name, resource) in &self.resources {
            let referrer = format!("resource {name:?}");
            for expr in resource.expressions() {
                for reference in expr.references() {
                    self.check_reference(&referrer, &reference)?;
                }
            }
        }
        for (name, output) in &self.outputs {
            let referrer = format!("output {name:?}");
            for reference in output.value.references() {
                self.check_reference(&referrer, &reference)?;
            }
        }

        Ok(Template {
            format_version: FORMAT_VERSION.to_string(),
            description: self.description,
            parameters: self.parameters,
            mappings: self.mappings,
            resources: self.resources,
            outputs: self.outputs,
        })
    }

    fn check_new_name(
        &self,
        name: String,
        current: &'static str,
    ) -> Result<String, TemplateError> {
        let name = check_logical_id(name)?;
        let previous = if self.parameters.contains_key(&name) {
            Some("parameter")
        } else if self.resources.contains_key(&name) {
            Some("resource")
        } else {
            None
        };
        match previous {
            Some(previous) => {
                Err(TemplateError::Duplicate { name, previous, current })
            }
            None => Ok(name),
        }
    }

    fn check_reference(
        &self,
        referrer: &str,
        reference: &Reference,
    ) -> Result<(), TemplateError> {
        let (defined, kind) = match reference {
            Reference::Ref(name) => (
                is_pseudo(name)
                    || self.parameters.contains_key(name)
                    || self.resources.contains_key(name),
                "parameter or resource",
            ),
            Reference::Attribute(name) => {
                (self.resources.contains_key(name), "resource")
            }
            Reference::Mapping(name) => {
                (self.mappings.contains_key(name), "mapping")
            }
        };
        if defined {
            Ok(())
        } else {
            Err(TemplateError::Dangling {
                referrer: referrer.to_string(),
                kind,
                target: reference.name().to_string(),
            })
        }
    }
}

fn check_logical_id(name: String) -> Result<String, TemplateError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(name)
    } else {
        Err(TemplateError::InvalidLogicalId(name))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ec2::NetworkInterface;
    use crate::expr::Expr;
    use crate::template::ResourceProperties;

    fn eni(subnet: Expr) -> Resource {
        Resource::new(ResourceProperties::NetworkInterface(NetworkInterface {
            source_dest_check: false,
            group_set: vec![Expr::reference("SecurityGroup")],
            subnet_id: subnet,
        }))
    }

    fn builder() -> TemplateBuilder {
        let mut builder = TemplateBuilder::new("test");
        builder.parameter("Subnet", Parameter::string()).unwrap();
        builder.parameter("SecurityGroup", Parameter::string()).unwrap();
        builder
    }

    #[test]
    fn test_build_preserves_insertion_order() {
        let mut builder = builder();
        builder.resource("WorkerENI", eni(Expr::reference("Subnet"))).unwrap();
        builder.resource("AlphaENI", eni(Expr::reference("Subnet"))).unwrap();
        builder
            .output(
                "Address",
                Output::new(Expr::get_att(
                    "AlphaENI",
                    "PrimaryPrivateIpAddress",
                )),
            )
            .unwrap();
        let template = builder.build().unwrap();
        let names: Vec<_> = template.resources.keys().collect();
        assert_eq!(names, vec!["WorkerENI", "AlphaENI"]);
        assert_eq!(template.format_version, "2010-09-09");
        assert_eq!(
            template
                .resources_of_type("AWS::EC2::NetworkInterface")
                .collect::<Vec<_>>(),
            vec!["WorkerENI", "AlphaENI"]
        );
    }

    #[test]
    fn test_duplicate_names() {
        let mut builder = builder();
        builder.resource("NodeENI", eni(Expr::reference("Subnet"))).unwrap();
        assert_eq!(
            builder.resource("NodeENI", eni(Expr::reference("Subnet"))),
            Err(TemplateError::Duplicate {
                name: "NodeENI".to_string(),
                previous: "resource",
                current: "resource",
            })
        );
        assert_eq!(
            builder.resource("Subnet", eni(Expr::reference("Subnet"))),
            Err(TemplateError::Duplicate {
                name: "Subnet".to_string(),
                previous: "parameter",
                current: "resource",
            })
        );
        assert_eq!(
            builder.parameter("NodeENI", Parameter::string()),
            Err(TemplateError::Duplicate {
                name: "NodeENI".to_string(),
                previous: "resource",
                current: "parameter",
            })
        );
    }

    #[test]
    fn test_invalid_logical_id() {
        let mut builder = builder();
        assert_eq!(
            builder.resource("Worker-0", eni(Expr::reference("Subnet"))),
            Err(TemplateError::InvalidLogicalId("Worker-0".to_string()))
        );
        assert_eq!(
            builder.parameter("", Parameter::string()),
            Err(TemplateError::InvalidLogicalId(String::new()))
        );
    }

    #[test]
    fn test_dangling_references() {
        let mut builder = builder();
        builder.resource("NodeENI", eni(Expr::reference("Nope"))).unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            TemplateError::Dangling {
                referrer: "resource \"NodeENI\"".to_string(),
                kind: "parameter or resource",
                target: "Nope".to_string(),
            }
        );

        let mut builder = self::builder();
        builder
            .resource(
                "NodeENI",
                eni(Expr::sub("${Missing.PrimaryPrivateIpAddress}")),
            )
            .unwrap();
        assert!(matches!(
            builder.build(),
            Err(TemplateError::Dangling { kind: "resource", .. })
        ));

        let mut builder = self::builder();
        builder
            .resource(
                "NodeENI",
                eni(Expr::find_in_map(
                    "RegionMap",
                    Expr::reference("AWS::Region"),
                    "AMI",
                )),
            )
            .unwrap();
        assert!(matches!(
            builder.build(),
            Err(TemplateError::Dangling { kind: "mapping", .. })
        ));

        let mut builder = self::builder();
        builder.resource("NodeENI", eni(Expr::reference("Subnet"))).unwrap();
        builder
            .output("Address", Output::new(Expr::get_att("Gone", "Ip")))
            .unwrap();
        assert!(matches!(
            builder.build(),
            Err(TemplateError::Dangling { kind: "resource", .. })
        ));
    }

    #[test]
    fn test_pseudo_parameters_are_always_defined() {
        let mut builder = builder();
        builder
            .resource(
                "NodeENI",
                eni(Expr::sub("${AWS::StackName} ${AWS::Region} ${Subnet}")),
            )
            .unwrap();
        let template = builder.build().unwrap();
        assert_eq!(template.resources.len(), 1);
    }

    #[test]
    fn test_no_resources() {
        assert_eq!(builder().build().unwrap_err(), TemplateError::NoResources);
    }
}
