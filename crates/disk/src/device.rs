//! The quorum disk device.

use crate::{
    block::{decode_status_block, encode_status_block},
    header::QuorumHeader,
    nodeid_offset, required_size, DiskError, MIN_BLOCK_SIZE,
};
use qdisk_types::{NodeId, StatusBlock, MAX_NODES};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read/write access to per-node status blocks.
///
/// Each node writes only its own slot (plus eviction notices) and reads
/// every slot; the disk is the cluster's broadcast medium, so writes must
/// be one-block and atomically observable.
pub trait QuorumDisk {
    /// The device's block (sector) size.
    fn block_size(&self) -> u32;

    /// Read and decode the status block for `node`.
    fn read_block(&mut self, node: NodeId) -> Result<StatusBlock, DiskError>;

    /// Encode and write the status block for `node`.
    fn write_block(&mut self, node: NodeId, block: &StatusBlock) -> Result<(), DiskError>;
}

/// A quorum disk backed by a block device (or a regular file, for tests
/// and development).
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    header: QuorumHeader,
    path: PathBuf,
}

impl FileDisk {
    /// Open and validate an existing quorum disk.
    ///
    /// The header must carry the expected magic and version, and the block
    /// size recorded at creation time must match the sector size the
    /// device reports now.
    pub fn open(path: &Path) -> Result<Self, DiskError> {
        let mut file = open_sync(path)?;
        let sector_size = device_sector_size(&file);

        let mut raw = vec![0u8; MIN_BLOCK_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut raw)?;
        let header = QuorumHeader::decode(&raw)?;

        if header.block_size != sector_size {
            return Err(DiskError::SectorMismatch {
                header: header.block_size,
                device: sector_size,
            });
        }

        let needed = required_size(header.block_size);
        let actual = file.seek(SeekFrom::End(0))?;
        if actual < needed {
            return Err(DiskError::DeviceTooSmall { needed, actual });
        }

        debug!(
            path = %path.display(),
            block_size = header.block_size,
            label = %header.label,
            "opened quorum disk"
        );

        Ok(FileDisk {
            file,
            header,
            path: path.to_path_buf(),
        })
    }

    /// Create (or re-label) a quorum disk: write a fresh header and an
    /// empty status block into every node slot.
    pub fn create(path: &Path, label: &str, now: u64) -> Result<Self, DiskError> {
        let mut file = open_sync(path)?;
        let sector_size = device_sector_size(&file);
        let header = QuorumHeader::new(label, sector_size, now)?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode(sector_size)?)?;

        for slot in 0..MAX_NODES {
            let node = NodeId::from_slot(slot);
            let empty = StatusBlock::empty(node);
            file.seek(SeekFrom::Start(nodeid_offset(node, sector_size)))?;
            file.write_all(&encode_status_block(&empty, sector_size))?;
        }
        file.flush()?;

        info!(
            path = %path.display(),
            block_size = sector_size,
            label,
            "initialized quorum disk"
        );

        Ok(FileDisk {
            file,
            header,
            path: path.to_path_buf(),
        })
    }

    /// The validated header.
    pub fn header(&self) -> &QuorumHeader {
        &self.header
    }

    /// The device path this disk was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QuorumDisk for FileDisk {
    fn block_size(&self) -> u32 {
        self.header.block_size
    }

    fn read_block(&mut self, node: NodeId) -> Result<StatusBlock, DiskError> {
        let mut raw = vec![0u8; self.header.block_size as usize];
        self.file
            .seek(SeekFrom::Start(nodeid_offset(node, self.header.block_size)))?;
        self.file.read_exact(&mut raw)?;
        decode_status_block(&raw)
    }

    fn write_block(&mut self, node: NodeId, block: &StatusBlock) -> Result<(), DiskError> {
        let raw = encode_status_block(block, self.header.block_size);
        self.file
            .seek(SeekFrom::Start(nodeid_offset(node, self.header.block_size)))?;
        self.file.write_all(&raw)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Resolve a quorum-disk label to a device path by scanning the block
/// devices listed in `/proc/partitions` and reading each candidate's
/// header.
pub fn find_device_by_label(label: &str) -> Result<PathBuf, DiskError> {
    find_device_by_label_in(label, Path::new("/proc/partitions"), Path::new("/dev"))
}

fn find_device_by_label_in(
    label: &str,
    partitions: &Path,
    dev_dir: &Path,
) -> Result<PathBuf, DiskError> {
    let listing = std::fs::read_to_string(partitions)?;

    for line in listing.lines().skip(2) {
        // major minor #blocks name
        let name = match line.split_whitespace().nth(3) {
            Some(name) => name,
            None => continue,
        };
        let path = dev_dir.join(name);

        let header = match read_header(&path) {
            Ok(header) => header,
            Err(err) => {
                debug!(device = %path.display(), %err, "not a quorum disk");
                continue;
            }
        };

        if header.label == label {
            info!(device = %path.display(), label, "matched quorum disk label");
            return Ok(path);
        }
    }

    Err(DiskError::LabelNotFound(label.to_string()))
}

fn read_header(path: &Path) -> Result<QuorumHeader, DiskError> {
    let mut file = File::open(path)?;
    let mut raw = vec![0u8; MIN_BLOCK_SIZE as usize];
    file.read_exact(&mut raw)?;
    QuorumHeader::decode(&raw)
}

/// Open with O_SYNC so every status-block write reaches the device before
/// the tick completes.
#[cfg(unix)]
fn open_sync(path: &Path) -> Result<File, DiskError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(path)?)
}

#[cfg(not(unix))]
fn open_sync(path: &Path) -> Result<File, DiskError> {
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

/// The sector size the kernel reports for a block device; regular files
/// fall back to [`MIN_BLOCK_SIZE`].
#[cfg(target_os = "linux")]
fn device_sector_size(file: &File) -> u32 {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::io::AsRawFd;

    let is_block = file
        .metadata()
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false);
    if !is_block {
        return MIN_BLOCK_SIZE;
    }

    let mut size: libc::c_int = 0;
    // SAFETY: BLKSSZGET writes a single c_int through the pointer.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), libc::BLKSSZGET as _, &mut size) };
    if rc == 0 && size >= MIN_BLOCK_SIZE as libc::c_int {
        size as u32
    } else {
        MIN_BLOCK_SIZE
    }
}

#[cfg(not(target_os = "linux"))]
fn device_sector_size(_file: &File) -> u32 {
    MIN_BLOCK_SIZE
}
