//! Filesystem persistence for replicated point sets
//!
//! Each region group gets one CSV file per frame, laid out as
//! `study-<uid>/series-<uid>/instance-<uid>/frame-<n>_uid-<group>_<graphic>.txt`
//! under a root directory.

use directories::{BaseDirs, UserDirs};
use log::debug;
use regionmark_core::{Point, PointLog, PointLogError, PointLogKey, PointRecord};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory created under the user's desktop or home directory
pub const POINTS_DIR_NAME: &str = "regionmark-roi-points";

const HEADER: [&str; 3] = ["region", "x", "y"];
const NO_REGION: &str = "-1";
const DELETED_SUFFIX: &str = ".deleted";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve a desktop or home directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid point record at line {line}: {message}")]
    Format { line: u64, message: String },
}

impl From<StorageError> for PointLogError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(error) => PointLogError::Io(error),
            other => PointLogError::Format(other.to_string()),
        }
    }
}

/// Point log writing CSV files below a root directory
#[derive(Debug, Clone)]
pub struct FilePointLog {
    root: PathBuf,
}

impl FilePointLog {
    /// Root under the user's desktop, or home directory when there is no desktop
    pub fn from_default_location() -> Result<Self, StorageError> {
        let base = UserDirs::new()
            .and_then(|dirs| dirs.desktop_dir().map(Path::to_path_buf))
            .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()))
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: base.join(POINTS_DIR_NAME) })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the log for `key`
    pub fn path_for(&self, key: &PointLogKey) -> PathBuf {
        self.root
            .join(format!("study-{}", sanitize(&key.identity.study_uid)))
            .join(format!("series-{}", sanitize(&key.identity.series_uid)))
            .join(format!("instance-{}", sanitize(&key.identity.instance_uid)))
            .join(format!("frame-{}_uid-{}_{}.txt", key.frame, key.group, sanitize(&key.graphic)))
    }

    fn write_records(&self, path: &Path, records: &[PointRecord]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
        writer.write_record(HEADER)?;
        for record in records {
            let region = record.region.map_or_else(|| NO_REGION.to_string(), |index| index.to_string());
            writer.write_record([region, record.point.x.to_string(), record.point.y.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl PointLog for FilePointLog {
    fn write(&self, key: &PointLogKey, records: &[PointRecord]) -> Result<Option<PathBuf>, PointLogError> {
        let path = self.path_for(key);
        self.write_records(&path, records)?;
        debug!("Wrote {} points to {}", records.len(), path.display());
        Ok(Some(path))
    }

    fn remove(&self, path: &Path) -> Result<(), PointLogError> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn mark_deleted(&self, path: &Path) -> Result<(), PointLogError> {
        if path.exists() {
            fs::rename(path, deleted_path(path))?;
        }
        Ok(())
    }
}

/// Name a point log gets once its graphics are deleted
pub fn deleted_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(DELETED_SUFFIX);
    PathBuf::from(name)
}

/// Read a point log back
pub fn read_points(path: &Path) -> Result<Vec<PointRecord>, StorageError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        // Header is line 1
        let line = index as u64 + 2;
        let field = |position: usize| {
            row.get(position).map(str::trim).ok_or_else(|| StorageError::Format {
                line,
                message: format!("expected 3 fields, found {}", row.len()),
            })
        };
        let region: i64 = parse(field(0)?, line)?;
        let x: f64 = parse(field(1)?, line)?;
        let y: f64 = parse(field(2)?, line)?;
        let region = usize::try_from(region).ok();
        records.push(PointRecord::new(region, Point::new(x, y)));
    }
    Ok(records)
}

fn parse<T: std::str::FromStr>(value: &str, line: u64) -> Result<T, StorageError> {
    value
        .parse()
        .map_err(|_| StorageError::Format { line, message: format!("cannot parse {value:?}") })
}

/// Keep path components portable
fn sanitize(value: &str) -> String {
    if value.is_empty() {
        return "unknown".to_string();
    }
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}
