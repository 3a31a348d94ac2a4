// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Emits the CloudFormation template for CORTX on Kubernetes

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use cortx_cloudformation::config::{Config, ConfigLoggingLevel};
use cortx_cloudformation::script::PreviewRenderer;
use cortx_cloudformation::{generate, phases, NodeRole, Topology};
use slog::{debug, info, Logger};
use std::io::Write;

const NAME: &str = "cortx-cfn-template";

/// Generate an AWS CloudFormation template for CORTX on Kubernetes.
///
/// The template is written to stdout unless `--output` is given.
#[derive(Debug, Parser)]
#[command(name = NAME, version)]
struct Args {
    /// Number of nodes, including the control plane
    #[clap(long, default_value_t = 3)]
    nodes: u32,

    /// Number of CVGs (storage groups) per node
    #[clap(long, default_value_t = 2)]
    cvgs: u32,

    /// Number of data disks per CVG
    #[clap(long, default_value_t = 2)]
    data: u32,

    /// TOML file overriding parameter defaults and logging
    #[clap(long)]
    config: Option<Utf8PathBuf>,

    /// Write the template here instead of stdout
    #[clap(long, short)]
    output: Option<Utf8PathBuf>,

    /// Print the boot script of one node (`ControlPlane` or `Worker<N>`)
    /// instead of the template
    #[clap(long, value_name = "NODE")]
    boot_script: Option<NodeRole>,

    /// Log level filter (overrides the config file)
    #[clap(long, value_enum)]
    log_level: Option<ConfigLoggingLevel>,
}

fn main() {
    let args = Args::parse();
    if let Err(error) = args.exec() {
        eprintln!("{NAME}: {error:#}");
        std::process::exit(1);
    }
}

impl Args {
    fn exec(self) -> Result<()> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(level) = self.log_level {
            config.log.set_level(level);
        }
        let log = config
            .log
            .to_logger(NAME)
            .context("failed to create logger")?;

        let topology = Topology::new(self.nodes, self.cvgs, self.data)?;
        debug!(log, "topology"; "topology" => ?topology);

        let document = match self.boot_script {
            Some(node) => {
                if !topology.contains(node) {
                    bail!(
                        "{node} is not part of a {}-node cluster",
                        topology.node_count()
                    );
                }
                phases::boot_script(node, &topology).render(&PreviewRenderer)
            }
            None => {
                let template = generate(&log, &topology, &config.parameters)?;
                let mut json = template
                    .to_json_pretty()
                    .context("failed to serialize template")?;
                json.push('\n');
                json
            }
        };

        self.write(&log, &document)
    }

    fn write(&self, log: &Logger, document: &str) -> Result<()> {
        match &self.output {
            Some(path) => {
                fs_err::write(path, document)?;
                info!(log, "wrote output"; "path" => %path);
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(document.as_bytes())
                    .and_then(|()| stdout.flush())
                    .context("failed to write to stdout")?;
            }
        }
        Ok(())
    }
}
