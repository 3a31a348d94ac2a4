// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cluster shape: nodes, storage groups and the block devices behind them

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Devices every node boots with, in attachment order: OS, 3rd-party
/// applications, logs.
pub const BOOT_DEVICES: [&str; 3] = ["/dev/sda1", "/dev/sdb", "/dev/sdc"];

/// Device holding 3rd-party application data; handed to the prereq script.
pub const APPLICATION_DEVICE: &str = "/dev/sdb";

/// Motr devices start right after the three boot devices (`/dev/sdd`).
const MOTR_DEVICE_OFFSET: usize = 3;

const DEVICE_LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";

/// Upper bound on Motr disks per node imposed by the `/dev/sdX` naming.
pub const MAX_MOTR_DISKS: u64 =
    (DEVICE_LETTERS.len() - MOTR_DEVICE_OFFSET) as u64;

/// Suffix of the network interface logical ID for each node.
const ENI_SUFFIX: &str = "ENI";

/// Number of Motr disks per node for the given storage group layout.
///
/// Every storage group (CVG) gets one metadata disk on top of its data disks.
pub fn disk_count(cvgs: u32, data_per_cvg: u32) -> u64 {
    u64::from(cvgs) * (u64::from(data_per_cvg) + 1)
}

/// Returns the device paths of the first `count` Motr disks.
///
/// Paths beyond `/dev/sdz` do not exist; callers go through
/// [`Topology::new`], which rejects layouts that would need them.
pub fn devices(count: u64) -> Vec<String> {
    DEVICE_LETTERS
        .chars()
        .skip(MOTR_DEVICE_OFFSET)
        .take(usize::try_from(count).unwrap_or(usize::MAX))
        .map(|letter| format!("/dev/sd{letter}"))
        .collect()
}

/// Errors describing a cluster shape we refuse to generate
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("cluster needs at least one node (got --nodes 0)")]
    NoNodes,

    #[error("cluster needs at least one CVG (got --cvgs 0)")]
    NoStorageGroups,

    #[error("each CVG needs at least 2 data disks (got --data {0})")]
    TooFewDataDisks(u32),

    #[error(
        "{cvgs} CVGs of {data} data disks need {disk_count} Motr disks \
         per node, but at most {max} fit after {last_boot_device}",
        max = MAX_MOTR_DISKS,
        last_boot_device = BOOT_DEVICES[2]
    )]
    TooManyDisks { cvgs: u32, data: u32, disk_count: u64 },

    #[error("unknown node {0:?} (expected \"ControlPlane\" or \"Worker<N>\")")]
    UnknownNode(String),
}

/// The role (and identity) of one node in the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRole {
    /// The sole node that initializes the Kubernetes cluster.
    ControlPlane,
    /// A node joining the cluster the control plane initialized.
    Worker(u32),
}

impl NodeRole {
    /// Logical ID of this node's instance resource.
    pub fn logical_id(&self) -> String {
        self.to_string()
    }

    /// Logical ID of this node's network interface resource.
    pub fn eni_logical_id(&self) -> String {
        format!("{self}{ENI_SUFFIX}")
    }

    pub fn is_control_plane(&self) -> bool {
        matches!(self, NodeRole::ControlPlane)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodeRole::ControlPlane => write!(f, "ControlPlane"),
            NodeRole::Worker(i) => write!(f, "Worker{i}"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "ControlPlane" {
            return Ok(NodeRole::ControlPlane);
        }
        s.strip_prefix("Worker")
            // Only the names `Display` produces: no sign, no leading zeros.
            .filter(|index| {
                index.chars().all(|c| c.is_ascii_digit())
                    && (*index == "0" || !index.starts_with('0'))
            })
            .and_then(|index| index.parse().ok())
            .map(NodeRole::Worker)
            .ok_or_else(|| TopologyError::UnknownNode(s.to_string()))
    }
}

/// A validated cluster shape
///
/// Holding a `Topology` means every precondition of generation holds: at
/// least one node, at least one CVG, at least two data disks per CVG, and a
/// Motr disk range that fits within the device names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Topology {
    nodes: u32,
    cvgs: u32,
    data_per_cvg: u32,
}

impl Topology {
    pub fn new(
        nodes: u32,
        cvgs: u32,
        data_per_cvg: u32,
    ) -> Result<Self, TopologyError> {
        if nodes == 0 {
            return Err(TopologyError::NoNodes);
        }
        if cvgs == 0 {
            return Err(TopologyError::NoStorageGroups);
        }
        if data_per_cvg < 2 {
            return Err(TopologyError::TooFewDataDisks(data_per_cvg));
        }
        let disk_count = disk_count(cvgs, data_per_cvg);
        if disk_count > MAX_MOTR_DISKS {
            return Err(TopologyError::TooManyDisks {
                cvgs,
                data: data_per_cvg,
                disk_count,
            });
        }
        Ok(Topology { nodes, cvgs, data_per_cvg })
    }

    pub fn node_count(&self) -> u32 {
        self.nodes
    }

    pub fn worker_count(&self) -> u32 {
        self.nodes - 1
    }

    pub fn cvgs(&self) -> u32 {
        self.cvgs
    }

    pub fn data_per_cvg(&self) -> u32 {
        self.data_per_cvg
    }

    pub fn disk_count(&self) -> u64 {
        disk_count(self.cvgs, self.data_per_cvg)
    }

    /// Motr device paths, identical on every node.
    pub fn devices(&self) -> Vec<String> {
        devices(self.disk_count())
    }

    /// All nodes in document order: the control plane, then workers by
    /// index.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRole> {
        std::iter::once(NodeRole::ControlPlane).chain(self.workers())
    }

    /// All nodes in inventory order: workers by index, then the control
    /// plane.
    ///
    /// Each node writes its `nodes.txt` and `/etc/hosts` from this list on
    /// its own, so it must only depend on the topology.
    pub fn peers(&self) -> impl Iterator<Item = NodeRole> {
        self.workers().chain(std::iter::once(NodeRole::ControlPlane))
    }

    pub fn workers(&self) -> impl Iterator<Item = NodeRole> {
        (0..self.worker_count()).map(NodeRole::Worker)
    }

    pub fn contains(&self, node: NodeRole) -> bool {
        match node {
            NodeRole::ControlPlane => true,
            NodeRole::Worker(i) => i < self.worker_count(),
        }
    }
}
