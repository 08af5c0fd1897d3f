//! Batch classification and bulk-import packaging

use crate::discovery::DicomFileRef;
use crate::error::{Result, SyncError};
use crate::roi::RoiType;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// ROI file left out of the batch because another type was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub file: DicomFileRef,
    pub roi: RoiType,
}

/// A batch split by destination, each list in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadManifest {
    /// Plain image files for the import service
    pub bulk: Vec<DicomFileRef>,
    /// Files of the requested ROI type for the collection store
    pub collections: Vec<DicomFileRef>,
    pub skipped: Vec<SkippedFile>,
}

impl UploadManifest {
    pub fn classify(files: impl IntoIterator<Item = DicomFileRef>, requested: RoiType) -> Self {
        let mut manifest = Self::default();

        for file in files {
            match RoiType::classify(&file) {
                None => manifest.bulk.push(file),
                Some(roi) if roi == requested => manifest.collections.push(file),
                Some(roi) => {
                    debug!(
                        path = %file.path.display(),
                        found = %roi,
                        requested = %requested,
                        "Skipping ROI file of another type"
                    );
                    manifest.skipped.push(SkippedFile { file, roi });
                }
            }
        }

        manifest
    }

    pub fn has_bulk(&self) -> bool {
        !self.bulk.is_empty()
    }

    /// Package the bulk files as `dir/import.zip`. `None` when there are none.
    ///
    /// Compression runs on the blocking pool.
    pub async fn write_archive(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if !self.has_bulk() {
            return Ok(None);
        }

        let path = dir.join("import.zip");
        let entries: Vec<(String, PathBuf)> = self
            .bulk
            .iter()
            .enumerate()
            .map(|(index, f)| (format!("{:05}_{}", index, f.file_name()), f.path.clone()))
            .collect();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_zip(&target, &entries))
            .await
            .map_err(|e| SyncError::Other(e.into()))??;

        debug!(path = %path.display(), files = self.bulk.len(), "Wrote import archive");
        Ok(Some(path))
    }
}

/// Entry names only need to be unique inside the archive.
fn write_zip(path: &Path, entries: &[(String, PathBuf)]) -> Result<()> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, file) in entries {
        zip.start_file(name.as_str(), options)?;
        io::copy(&mut File::open(file)?, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}
