//! mkqdisk: create and inspect qdisk quorum disks.
//!
//! # Usage
//!
//! ```bash
//! # Label a partition as a quorum disk (destroys existing qdisk state)
//! mkqdisk -c /dev/sdb1 -l "rack-a quorum"
//!
//! # Show the header of an existing quorum disk
//! mkqdisk -L /dev/sdb1
//!
//! # Find the device carrying a label
//! mkqdisk -f "rack-a quorum"
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use qdisk_disk::{find_device_by_label, FileDisk, QuorumDisk};
use qdisk_types::{NodeId, NodeState, MAX_NODES};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Create and inspect qdisk quorum disks.
#[derive(Parser, Debug)]
#[command(name = "mkqdisk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Create a quorum disk on this device
    #[arg(short = 'c', long, value_name = "DEVICE")]
    create: Option<PathBuf>,

    /// Label to write when creating (required with -c)
    #[arg(short = 'l', long)]
    label: Option<String>,

    /// Show the header and node slots of an existing quorum disk
    #[arg(short = 'L', long, value_name = "DEVICE")]
    list: Option<PathBuf>,

    /// Find the device carrying a label
    #[arg(short = 'f', long, value_name = "LABEL")]
    find: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match (cli.create, cli.list, cli.find) {
        (Some(device), None, None) => {
            let label = match cli.label {
                Some(label) => label,
                None => bail!("creating a quorum disk requires a label (-l)"),
            };
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let disk = FileDisk::create(&device, &label, now)
                .with_context(|| format!("cannot initialize {}", device.display()))?;
            println!(
                "Initialized {} as quorum disk '{}' ({} byte blocks, {} node slots)",
                device.display(),
                disk.header().label,
                disk.block_size(),
                disk.header().max_nodes,
            );
            Ok(())
        }
        (None, Some(device), None) => {
            let mut disk = FileDisk::open(&device)
                .with_context(|| format!("{} is not a quorum disk", device.display()))?;
            let header = disk.header().clone();
            println!("Device: {}", device.display());
            println!("Label: {}", header.label);
            println!("Version: {:#010x}", header.version);
            println!("Block size: {}", header.block_size);
            println!("Node slots: {}", header.max_nodes);
            println!("Created: {}", header.created);
            println!();
            for slot in 0..MAX_NODES {
                let node = NodeId::from_slot(slot);
                match disk.read_block(node) {
                    Ok(block) if block.state != NodeState::None => {
                        println!(
                            "Node {}: {} (incarnation {:#x}, seq {}, timestamp {})",
                            node, block.state, block.incarnation, block.seq, block.timestamp
                        );
                    }
                    Ok(_) => {}
                    Err(err) => println!("Node {node}: unreadable ({err})"),
                }
            }
            Ok(())
        }
        (None, None, Some(label)) => {
            let device = find_device_by_label(&label)?;
            println!("{}", device.display());
            Ok(())
        }
        _ => bail!("exactly one of -c, -L, or -f is required"),
    }
}
