// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Generates the CloudFormation template that stands up CORTX on a
//! Kubernetes cluster of EC2 instances
//!
//! Given the number of nodes and the storage layout, [`assemble::generate`]
//! produces a template with one launch template shared by all nodes, and a
//! network interface and instance per node.  Each instance carries a boot
//! script ([`phases::boot_script`]) that prepares the host, brings up or
//! joins Kubernetes and, on the control plane, deploys CORTX once every node
//! has reported in.

pub mod assemble;
pub mod config;
pub mod params;
pub mod phases;
pub mod script;
pub mod topology;

pub use assemble::{generate, GenerateError};
pub use config::{Config, ConfigError};
pub use topology::{NodeRole, Topology, TopologyError};
