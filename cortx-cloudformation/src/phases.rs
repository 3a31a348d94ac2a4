// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The phases of a node's boot script
//!
//! Every node runs the same preparation, writes the same inventory files and
//! prepares the same CORTX checkout; the control plane additionally
//! initializes Kubernetes and drives the final deployment, while workers
//! join the cluster the control plane created.  Nodes never talk to us or to
//! each other while booting: anything a node needs to know about its peers
//! is baked into its script as a placeholder CloudFormation resolves.

use crate::params::IMAGE_PARAMETERS;
use crate::script::{BootScript, Fragment, Line};
use crate::topology::{NodeRole, Topology, APPLICATION_DEVICE};

/// How long CloudFormation waits for a node's completion signal.
pub const SIGNAL_TIMEOUT: &str = "PT30M";

/// Address attribute of a network interface, used to reach each node.
pub const ADDRESS_ATTRIBUTE: &str = "PrimaryPrivateIpAddress";

/// Kubernetes API server port on the control plane.
const API_SERVER_PORT: u16 = 6443;

const DEPLOYMENT_REPO: &str = "https://github.com/Seagate/cortx-k8s.git";
const CORTX_DIR: &str = "cortx-k8s/k8_cortx_cloud";

/// Written by the inventory phase, read by CVG generation and by the
/// control plane's readiness wait.
pub const NODES_FILE: &str = "nodes.txt";
pub const DEVICES_FILE: &str = "devices.txt";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    /// OS packages, container runtime, Kubernetes packages, EBS device
    /// naming, and the exit trap that reports back to CloudFormation.
    Prepare,
    /// Writes `nodes.txt` and `/etc/hosts` entries for every node.
    NodeInventory,
    /// Writes `devices.txt` with the Motr device paths.
    DeviceInventory,
    /// `kubeadm init` and the pod network (control plane only).
    KubernetesInit,
    /// `kubeadm join` against the control plane (workers only).
    KubernetesJoin,
    /// Checks out the deployment scripts and writes `solution.yaml`.
    CortxPrepare,
    /// Waits for all nodes and deploys CORTX (control plane only).
    CortxDeploy,
}

const CONTROL_PLANE_PHASES: &[Phase] = &[
    Phase::Prepare,
    Phase::NodeInventory,
    Phase::DeviceInventory,
    Phase::KubernetesInit,
    Phase::CortxPrepare,
    Phase::CortxDeploy,
];

const WORKER_PHASES: &[Phase] = &[
    Phase::Prepare,
    Phase::NodeInventory,
    Phase::DeviceInventory,
    Phase::KubernetesJoin,
    Phase::CortxPrepare,
];

/// The phases `node` runs, in order.
pub fn plan(node: NodeRole) -> &'static [Phase] {
    match node {
        NodeRole::ControlPlane => CONTROL_PLANE_PHASES,
        NodeRole::Worker(_) => WORKER_PHASES,
    }
}

impl Phase {
    pub fn fragment(&self, node: NodeRole, topology: &Topology) -> Fragment {
        match self {
            Phase::Prepare => prepare(node),
            Phase::NodeInventory => node_inventory(topology),
            Phase::DeviceInventory => device_inventory(topology),
            Phase::KubernetesInit => kubernetes_init(),
            Phase::KubernetesJoin => kubernetes_join(),
            Phase::CortxPrepare => cortx_prepare(topology),
            Phase::CortxDeploy => cortx_deploy(),
        }
    }
}

/// Assembles `node`'s complete boot script.
pub fn boot_script(node: NodeRole, topology: &Topology) -> BootScript {
    let mut script = BootScript::new();
    for phase in plan(node) {
        script.append(phase.fragment(node, topology));
    }
    script
}

fn literals(lines: &[&str]) -> Fragment {
    lines.iter().map(|&line| Line::from(line)).collect()
}

fn prepare(node: NodeRole) -> Fragment {
    let mut out = literals(&[
        "#!/bin/bash",
        "set -xeuo pipefail",
        "env",
        "cd /root",
        "yum update -y",
        "yum install -y yum-utils git wget nvme-cli python3",
        "wget --no-verbose https://s3.amazonaws.com/cloudformation-examples/aws-cfn-bootstrap-py3-latest.tar.gz",
        "tar -xf aws-cfn-bootstrap-py3-latest.tar.gz",
        "(cd aws-cfn-bootstrap-2.0/ && python3 setup.py install)",
        // Flipped by the completion marker; reported on any exit.
        "DEPLOY_SUCCESS=false",
        "function signal_cloudformation() {",
    ]);
    out.push(Line::sub(format!(
        "/usr/local/bin/cfn-signal --stack ${{AWS::StackName}} \
         --resource {} --region ${{AWS::Region}} --success $DEPLOY_SUCCESS",
        node.logical_id()
    )));
    out.extend(literals(&[
        "}",
        "trap signal_cloudformation EXIT",
        "wget --no-verbose https://github.com/mikefarah/yq/releases/download/v4.19.1/yq_linux_amd64 -O /usr/bin/yq",
        "chmod +x /usr/bin/yq",
        "cat <<EOF | tee /etc/modules-load.d/containerd.conf",
        "overlay",
        "br_netfilter",
        "EOF",
        "modprobe overlay",
        "modprobe br_netfilter",
        "cat <<EOF | tee /etc/sysctl.d/99-kubernetes-cri.conf",
        "net.bridge.bridge-nf-call-iptables  = 1",
        "net.ipv4.ip_forward = 1",
        "net.bridge.bridge-nf-call-ip6tables = 1",
        "EOF",
        "sysctl --system",
        "yum-config-manager --add-repo https://download.docker.com/linux/centos/docker-ce.repo",
        "yum install -y containerd.io",
        "mkdir -p /etc/containerd",
        "containerd config default > /etc/containerd/config.toml",
        "systemctl enable containerd",
        "systemctl restart containerd",
        "cat <<EOF | tee /etc/yum.repos.d/kubernetes.repo",
        "[kubernetes]",
        "name=Kubernetes",
        r"baseurl=https://packages.cloud.google.com/yum/repos/kubernetes-el7-\$basearch",
        "enabled=1",
        "gpgcheck=1",
        // https://cloud.google.com/compute/docs/troubleshooting/known-issues#keyexpired
        "repo_gpgcheck=0",
        "gpgkey=https://packages.cloud.google.com/yum/doc/yum-key.gpg https://packages.cloud.google.com/yum/doc/rpm-package-key.gpg",
        "exclude=kubelet kubeadm kubectl",
        "EOF",
        "setenforce 0",
        "sed -i 's/^SELINUX=enforcing$/SELINUX=permissive/' /etc/selinux/config",
        "yum install -y kubelet kubeadm kubectl --disableexcludes=kubernetes",
        "systemctl enable --now kubelet",
        // Nitro instances expose EBS volumes as NVMe devices; name them after
        // the block device mapping instead.
        // https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/nvme-ebs-volumes.html
        "cat <<EOF | tee /etc/udev/rules.d/99-ebs-names.rules",
        r#"ACTION=="add", KERNEL=="nvme[0-9]*n[0-9]*", ENV{DEVTYPE}=="disk", ATTRS{model}=="Amazon Elastic Block Store", PROGRAM="/bin/sh -c 'set -eo pipefail; /sbin/nvme id-ctrl -b /dev/%k | cut -b 3073-3075'", SYMLINK+="%c""#,
        r#"ACTION=="add", KERNEL=="nvme[0-9]*n[0-9]*p[0-9]*", ENV{DEVTYPE}=="partition", ATTRS{model}=="Amazon Elastic Block Store", PROGRAM="/bin/sh -c 'set -eo pipefail; /sbin/nvme id-ctrl -b /dev/%k | cut -b 3073-3075'", SYMLINK+="%c%n""#,
        "EOF",
        "udevadm control --reload-rules",
        "udevadm trigger -c add -s block",
    ]));
    out
}

fn kubernetes_init() -> Fragment {
    let mut out = literals(&[
        "cat <<EOF | tee kubeadm-config.yaml",
        "kind: ClusterConfiguration",
        "apiVersion: kubeadm.k8s.io/v1beta3",
        "kubernetesVersion: v1.23.0",
        "networking:",
        "  podSubnet: 192.168.0.0/16",
        "---",
        "kind: KubeletConfiguration",
        "apiVersion: kubelet.config.k8s.io/v1beta1",
        "cgroupDriver: cgroupfs",
        "---",
        "apiVersion: kubeadm.k8s.io/v1beta3",
        "kind: InitConfiguration",
        "bootstrapTokens:",
    ]);
    out.push(Line::sub("- token: \"${KubernetesToken}\""));
    out.extend(literals(&[
        "EOF",
        "kubeadm init --config kubeadm-config.yaml",
        "export KUBECONFIG=/etc/kubernetes/admin.conf",
        "mkdir -p /root/.kube",
        "cp /etc/kubernetes/admin.conf /root/.kube/config",
        "mkdir -p ~centos/.kube",
        "cp /etc/kubernetes/admin.conf ~centos/.kube/config",
        "chown -R $(id -u centos):$(id -g centos) ~centos/.kube",
        "sudo -u centos kubectl create -f https://docs.projectcalico.org/manifests/tigera-operator.yaml",
        "sudo -u centos kubectl create -f https://docs.projectcalico.org/manifests/custom-resources.yaml",
        // Single-node clusters must schedule CORTX on the control plane.
        "sudo -u centos kubectl taint nodes --all node-role.kubernetes.io/master-",
    ]));
    out
}

fn kubernetes_join() -> Fragment {
    // The control plane's certificate isn't known when the template is
    // generated, so the join trusts whatever answers at its address.
    vec![Line::sub(format!(
        "kubeadm join ${{{}.{ADDRESS_ATTRIBUTE}}}:{API_SERVER_PORT} \
         --token ${{KubernetesToken}} \
         --discovery-token-unsafe-skip-ca-verification",
        NodeRole::ControlPlane.eni_logical_id(),
    ))]
}

/// Resolves every peer's address and records its host names.
///
/// The peer list comes from [`Topology::peers`], the same function on every
/// node, so all nodes agree on `nodes.txt` without a coordinator.
fn node_inventory(topology: &Topology) -> Fragment {
    let mut out = vec![Line::from(
        "NODE_DOMAIN=$(cat /etc/resolv.conf | grep search | awk '{print $2}')",
    )];
    for peer in topology.peers() {
        out.push(Line::sub(format!(
            "NODE_IP=${{{}.{ADDRESS_ATTRIBUTE}}}",
            peer.eni_logical_id()
        )));
        out.extend(literals(&[
            r#"SHORT_NAME=ip-$(echo "$NODE_IP" | sed 's/\./-/g')"#,
            "NODE_NAME=$SHORT_NAME.$NODE_DOMAIN",
            r#"echo "$NODE_NAME" >> nodes.txt"#,
            r#"echo "$NODE_IP" "$NODE_NAME" "$SHORT_NAME" >> /etc/hosts"#,
        ]));
    }
    out
}

fn device_inventory(topology: &Topology) -> Fragment {
    let mut out =
        vec![Line::literal(format!("cat <<EOF | tee {DEVICES_FILE}"))];
    out.extend(topology.devices().into_iter().map(Line::Literal));
    out.push(Line::from("EOF"));
    out
}

fn cortx_prepare(topology: &Topology) -> Fragment {
    let mut out = vec![
        Line::sub(format!(
            "git clone -b ${{VersionDeploymentRepo}} {DEPLOYMENT_REPO}"
        )),
        Line::literal(format!(
            "mv ./{CORTX_DIR}/solution.yaml ./{CORTX_DIR}/solution.yaml.orig"
        )),
        Line::sub(format!(
            "./{CORTX_DIR}/generate-cvg-yaml.sh --nodes {NODES_FILE} \
             --devices {DEVICES_FILE} --cvgs {} --data {} \
             --solution ./{CORTX_DIR}/solution.yaml.orig  \
             --datasize ${{DiskSizeMotr}}Gi \
             --metadatasize ${{DiskSizeMotr}}Gi \
             > ./{CORTX_DIR}/solution.yaml",
            topology.cvgs(),
            topology.data_per_cvg(),
        )),
        // TODO: once VersionDeploymentRepo includes cortx-k8s PR 144 the
        // prereq script takes the device as `-d /dev/sdb`.
        Line::literal(format!(
            "(cd {CORTX_DIR}/ && ./prereq-deploy-cortx-cloud.sh \
             {APPLICATION_DEVICE})"
        )),
        Line::from("yq -i '"),
        Line::sub("  .solution.common.setup_size = \"${SetupSize}\""),
        Line::sub(
            "| .solution.common.storage_sets.durability.sns = \
             \"${DurabilitySNS}\"",
        ),
        Line::sub(
            "| .solution.common.storage_sets.durability.dix = \
             \"${DurabilityDIX}\"",
        ),
    ];
    out.extend(IMAGE_PARAMETERS.iter().map(|(parameter, key)| {
        Line::sub(format!("| .solution.images.{key} = \"${{{parameter}}}\""))
    }));
    out.push(Line::literal(format!("' {CORTX_DIR}/solution.yaml")));
    out.push(Line::literal(format!("cat {CORTX_DIR}/solution.yaml")));
    out
}

fn cortx_deploy() -> Fragment {
    vec![
        Line::literal(format!(
            "for n in $(cat {NODES_FILE}); do while ! kubectl wait \
             --for=condition=Ready \"node/$n\"; do sleep 5; done; done"
        )),
        Line::literal(format!("(cd {CORTX_DIR}/ && ./deploy-cortx-cloud.sh)")),
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::script::PreviewRenderer;

    fn topology() -> Topology {
        Topology::new(3, 2, 2).unwrap()
    }

    const INIT: &str = "kubeadm init --config kubeadm-config.yaml";
    const JOIN: &str = "kubeadm join \
                        ${ControlPlaneENI.PrimaryPrivateIpAddress}:6443 \
                        --token ${KubernetesToken} \
                        --discovery-token-unsafe-skip-ca-verification";
    const DEPLOY: &str =
        "(cd cortx-k8s/k8_cortx_cloud/ && ./deploy-cortx-cloud.sh)";
    const PREREQ: &str =
        "(cd cortx-k8s/k8_cortx_cloud/ && ./prereq-deploy-cortx-cloud.sh \
         /dev/sdb)";
    const YQ_INSTALL: &str = "wget --no-verbose \
        https://github.com/mikefarah/yq/releases/download/v4.19.1/yq_linux_amd64 \
        -O /usr/bin/yq";

    #[test]
    fn test_plans() {
        assert!(plan(NodeRole::ControlPlane).contains(&Phase::KubernetesInit));
        assert!(!plan(NodeRole::ControlPlane).contains(&Phase::KubernetesJoin));
        assert!(plan(NodeRole::Worker(4)).contains(&Phase::KubernetesJoin));
        assert!(!plan(NodeRole::Worker(4)).contains(&Phase::KubernetesInit));
        assert!(!plan(NodeRole::Worker(4)).contains(&Phase::CortxDeploy));
        assert_eq!(Phase::KubernetesInit.to_string(), "kubernetes-init");
    }

    #[test]
    fn test_control_plane_script() {
        let script = boot_script(NodeRole::ControlPlane, &topology());
        assert_eq!(script.position("#!/bin/bash"), Some(0));
        assert!(script.position(INIT).is_some());
        assert!(script.position(JOIN).is_none());
        assert!(script.mentions("--resource ControlPlane --region"));

        // Inventory files exist before anything reads them, and the deploy
        // comes last.
        let devices = script.position("cat <<EOF | tee devices.txt").unwrap();
        let nodes =
            script.position(r#"echo "$NODE_NAME" >> nodes.txt"#).unwrap();
        let generate = script
            .lines()
            .iter()
            .position(|l| l.text().contains("generate-cvg-yaml.sh"))
            .unwrap();
        let deploy = script.position(DEPLOY).unwrap();
        assert!(nodes < devices);
        assert!(devices < generate);
        assert!(script.position(INIT).unwrap() < generate);
        assert_eq!(deploy, script.len() - 1);
    }

    #[test]
    fn test_worker_script() {
        let script = boot_script(NodeRole::Worker(1), &topology());
        let join = script.position(JOIN).expect("worker joins");
        assert_eq!(script.lines()[join], Line::sub(JOIN));
        assert!(script.position(INIT).is_none());
        // Every node runs the prereq script; only the control plane deploys.
        assert!(script.position(PREREQ).is_some());
        assert!(script.position(DEPLOY).is_none());
        assert!(!script.mentions("&& ./deploy-cortx-cloud.sh"));
        for line in
            Phase::CortxDeploy.fragment(NodeRole::Worker(1), &topology())
        {
            assert!(script.position(line.text()).is_none(), "{line:?}");
        }
        assert!(script.mentions("--resource Worker1 --region"));
        assert!(script
            .lines()
            .last()
            .unwrap()
            .text()
            .starts_with("cat cortx-k8s/k8_cortx_cloud/solution.yaml"));
    }

    #[test]
    fn test_signal_trap() {
        let script = boot_script(NodeRole::Worker(0), &topology());
        let flag = script.position("DEPLOY_SUCCESS=false").unwrap();
        let trap = script.position("trap signal_cloudformation EXIT").unwrap();
        let first_install = script.position(YQ_INSTALL).unwrap();
        assert!(flag < trap);
        assert!(trap < first_install);
        assert!(script.lines().contains(&Line::sub(
            "/usr/local/bin/cfn-signal --stack ${AWS::StackName} --resource \
             Worker0 --region ${AWS::Region} --success $DEPLOY_SUCCESS"
        )));
    }

    #[test]
    fn test_node_inventory_is_shared() {
        let topology = topology();
        let expected = node_inventory(&topology);
        for node in topology.nodes() {
            let script = boot_script(node, &topology);
            let start = script.position(expected[0].text()).unwrap();
            assert_eq!(
                &script.lines()[start..start + expected.len()],
                expected.as_slice()
            );
        }

        let addresses: Vec<_> = expected
            .iter()
            .filter(|line| matches!(line, Line::Substitution(_)))
            .map(Line::text)
            .collect();
        assert_eq!(
            addresses,
            vec![
                "NODE_IP=${Worker0ENI.PrimaryPrivateIpAddress}",
                "NODE_IP=${Worker1ENI.PrimaryPrivateIpAddress}",
                "NODE_IP=${ControlPlaneENI.PrimaryPrivateIpAddress}",
            ]
        );
    }

    #[test]
    fn test_device_inventory() {
        let topology = Topology::new(1, 1, 2).unwrap();
        let text = device_inventory(&topology)
            .iter()
            .map(Line::text)
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(
            text,
            "cat <<EOF | tee devices.txt\n/dev/sdd\n/dev/sde\n/dev/sdf\nEOF"
        );
    }

    #[test]
    fn test_cortx_prepare() {
        let fragment = cortx_prepare(&Topology::new(3, 4, 3).unwrap());
        assert!(fragment.contains(&Line::sub(
            "git clone -b ${VersionDeploymentRepo} \
             https://github.com/Seagate/cortx-k8s.git"
        )));
        assert!(fragment.iter().any(|line| matches!(line,
            Line::Substitution(text) if text.contains("--cvgs 4 --data 3 ")
                && text.contains("--datasize ${DiskSizeMotr}Gi"))));
        assert!(fragment.contains(&Line::sub(
            "| .solution.images.cortxha = \"${ImageCORTXHA}\""
        )));
        assert!(fragment.contains(&Line::sub(
            "| .solution.images.busybox = \"${ImageBusybox}\""
        )));
        assert!(fragment.contains(&Line::literal(PREREQ)));
    }

    #[test]
    fn test_single_node_preview() {
        let topology = Topology::new(1, 1, 2).unwrap();
        let text = boot_script(NodeRole::ControlPlane, &topology)
            .render(&PreviewRenderer);
        assert!(text.contains(INIT));
        assert!(!text.contains("kubeadm join"));
        assert!(!text.contains("Worker0ENI"));
        assert!(text.ends_with("DEPLOY_SUCCESS=true\n"));
    }
}
