//! Applying a plan: moving files into their category folders

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::orchestrator::OrganizePlan;
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink};

/// Thin filesystem seam for moves
pub trait FileMover: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Moves files with `fs::rename`
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMover;

impl FileMover for FsMover {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

/// Outcome of applying a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub moved: usize,
    /// Unprocessable files, left where they are
    pub skipped: usize,
    pub failed: usize,
}

/// First free name in `dir`: `name`, then `stem_1.ext`, `stem_2.ext`, ...
pub fn unique_destination(mover: &dyn FileMover, dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !mover.exists(&candidate) {
        return candidate;
    }

    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = dir.join(name);
        if !mover.exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Move every processable file of `plan` into `folder/<category>/`.
///
/// Records are applied in order. Failures are logged and counted.
pub fn apply_plan(
    folder: &Path,
    plan: &OrganizePlan,
    mover: &dyn FileMover,
    progress: &dyn ProgressSink,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    let total = plan.records.len();

    for (index, record) in plan.records.iter().enumerate() {
        if record.is_unprocessable() {
            tracing::debug!("[Mover] Leaving unprocessable '{}' in place", record.filename);
            report.skipped += 1;
        } else {
            match move_one(folder, &record.filename, &record.category, mover) {
                Ok(dest) => {
                    tracing::debug!("[Mover] '{}' -> {}", record.filename, dest.display());
                    report.moved += 1;
                }
                Err(e) => {
                    tracing::warn!("[Mover] Failed to move '{}': {}", record.filename, e);
                    report.failed += 1;
                }
            }
        }

        progress.report(ProgressEvent {
            phase: ProgressPhase::Moving,
            current: index + 1,
            total,
            current_file: Some(record.filename.clone()),
        });
    }

    tracing::info!(
        "[Mover] Moved {} files ({} skipped, {} failed)",
        report.moved,
        report.skipped,
        report.failed
    );
    report
}

fn move_one(
    folder: &Path,
    filename: &str,
    category: &str,
    mover: &dyn FileMover,
) -> io::Result<PathBuf> {
    let source = folder.join(filename);
    if !mover.exists(&source) {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} no longer exists", source.display()),
        ));
    }

    if !is_plain_folder_name(category) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' is not a folder name", category),
        ));
    }

    let target_dir = folder.join(category);
    mover.create_dir_all(&target_dir)?;

    let dest = unique_destination(mover, &target_dir, filename);
    mover.move_file(&source, &dest)?;
    Ok(dest)
}

/// Exactly one normal path component
fn is_plain_folder_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    ) && !name.contains('\\')
}
