// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Strongly-typed CloudFormation templates
//!
//! This crate models the subset of the CloudFormation template format used to
//! stand up clusters of EC2 instances: parameters, mappings, EC2 launch
//! templates, network interfaces and instances, and outputs.  Values that
//! CloudFormation resolves at stack-creation time are represented by
//! [`Expr`].  Templates are assembled with [`TemplateBuilder`], which checks
//! that every reference resolves before handing back a [`Template`] that
//! serializes to the JSON CloudFormation expects.

pub mod builder;
pub mod ec2;
pub mod expr;
pub mod template;

pub use builder::{TemplateBuilder, TemplateError};
pub use expr::{Expr, Reference};
pub use template::{
    CreationPolicy, Mapping, Output, Parameter, ParameterType, Resource,
    ResourceProperties, Template,
};
