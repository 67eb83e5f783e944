use crate::error::SiteError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use sysinfo::Disks;

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpaceFormat {
    Bytes,
    #[default]
    Human,
}

impl FromStr for SpaceFormat {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bytes" => Ok(SpaceFormat::Bytes),
            "human" => Ok(SpaceFormat::Human),
            other => Err(SiteError::InvalidArgument(format!("Invalid format: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SpaceValue {
    Bytes(u64),
    Human(String),
}

impl SpaceValue {
    fn new(bytes: u64, format: SpaceFormat) -> Self {
        match format {
            SpaceFormat::Bytes => SpaceValue::Bytes(bytes),
            SpaceFormat::Human => SpaceValue::Human(format_bytes(bytes)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeSpace {
    pub volume: String,
    pub totalspace: SpaceValue,
    pub freespace: SpaceValue,
    pub usedspace: SpaceValue,
    pub usedpercentage: f64,
}

impl VolumeSpace {
    pub fn new(volume: &Path, total: u64, free: u64, format: SpaceFormat) -> Self {
        let used = total.saturating_sub(free);
        let percentage = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        Self {
            volume: volume.display().to_string(),
            totalspace: SpaceValue::new(total, format),
            freespace: SpaceValue::new(free, format),
            usedspace: SpaceValue::new(used, format),
            usedpercentage: percentage,
        }
    }
}

/// Space on the filesystem holding `volume`.
pub fn volume_space(volume: &Path, format: SpaceFormat) -> Result<VolumeSpace, SiteError> {
    let resolved = std::fs::canonicalize(volume)?;
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<PathBuf> = disks
        .list()
        .iter()
        .map(|disk| disk.mount_point().to_path_buf())
        .collect();
    let index = best_mount(&resolved, &mounts).ok_or_else(|| {
        SiteError::InvalidArgument(format!("No filesystem found for {}", volume.display()))
    })?;
    let disk = &disks.list()[index];
    Ok(VolumeSpace::new(
        volume,
        disk.total_space(),
        disk.available_space(),
        format,
    ))
}

/// Index of the deepest mount point containing `path`.
fn best_mount(path: &Path, mounts: &[PathBuf]) -> Option<usize> {
    mounts
        .iter()
        .enumerate()
        .filter(|(_, mount)| path.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .map(|(index, _)| index)
}

/// Renders a byte count with two decimals in 1024-based units.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
