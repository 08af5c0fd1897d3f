//! DICOM metadata store
//!
//! Field-level read/write access to DICOM files plus content sniffing.
//! Callers address attributes either by keyword ("SeriesDescription") or by
//! numeric `(group, element)` pair, and never hold a parsed object between
//! calls: every read parses the header once, every write rewrites the file
//! in place.

use crate::error::{CommonError, Result};
use dicom::core::dictionary::DataDictionary;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::{open_file, DefaultDicomObject, OpenFileOptions};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::trace;

/// Bytes inspected when sniffing file content.
const SNIFF_LEN: u64 = 8192;

/// Attribute address in a DICOM data set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DicomKey {
    /// Standard dictionary keyword, e.g. `StudyInstanceUID`
    Name(String),
    /// Raw `(group, element)` pair
    Tag(u16, u16),
}

impl DicomKey {
    pub fn name(keyword: impl Into<String>) -> Self {
        Self::Name(keyword.into())
    }

    pub fn tag(group: u16, element: u16) -> Self {
        Self::Tag(group, element)
    }

    fn resolve(&self) -> Result<Tag> {
        match self {
            DicomKey::Tag(group, element) => Ok(Tag(*group, *element)),
            DicomKey::Name(name) => StandardDataDictionary
                .parse_tag(name)
                .ok_or_else(|| CommonError::UnknownAttribute(name.clone())),
        }
    }
}

impl fmt::Display for DicomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DicomKey::Name(name) => f.write_str(name),
            DicomKey::Tag(group, element) => write!(f, "({:04X},{:04X})", group, element),
        }
    }
}

/// Read/write seam over DICOM files.
///
/// Implementations must be cheap to share; the sync engine holds one behind
/// an `Arc` for the whole run.
pub trait DicomStore: Send + Sync {
    /// Value of `key` as text, or `None` when the attribute is absent.
    fn read_field(&self, path: &Path, key: &DicomKey) -> Result<Option<String>>;

    /// Values of `keys`, in order. Stores that parse files should override
    /// this to parse once.
    fn read_fields(&self, path: &Path, keys: &[DicomKey]) -> Result<Vec<Option<String>>> {
        keys.iter().map(|key| self.read_field(path, key)).collect()
    }

    /// Overwrite (or insert) `key` with `value` encoded as `vr`.
    fn write_field(&self, path: &Path, key: &DicomKey, vr: &str, value: &str) -> Result<()>;

    /// File content starts like a DICOM Part 10 file.
    fn is_dicom(&self, path: &Path) -> bool;

    /// File content is a zip archive.
    fn is_zip(&self, path: &Path) -> bool;

    /// Like [`DicomStore::read_field`] with a fallback for absent attributes.
    fn read_field_or(&self, path: &Path, key: &DicomKey, default: &str) -> Result<String> {
        Ok(self
            .read_field(path, key)?
            .unwrap_or_else(|| default.to_string()))
    }
}

/// [`DicomStore`] backed by files on local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDicomStore;

impl DicomStore for FileDicomStore {
    fn read_field(&self, path: &Path, key: &DicomKey) -> Result<Option<String>> {
        let tag = key.resolve()?;
        element_text(&open_header(path)?, path, tag)
    }

    fn read_fields(&self, path: &Path, keys: &[DicomKey]) -> Result<Vec<Option<String>>> {
        let tags = keys.iter().map(DicomKey::resolve).collect::<Result<Vec<_>>>()?;
        let obj = open_header(path)?;
        tags.into_iter()
            .map(|tag| element_text(&obj, path, tag))
            .collect()
    }

    fn write_field(&self, path: &Path, key: &DicomKey, vr: &str, value: &str) -> Result<()> {
        if !self.is_dicom(path) {
            return Err(CommonError::NotDicom {
                path: path.display().to_string(),
            });
        }

        let tag = key.resolve()?;
        let vr: VR = vr
            .parse()
            .map_err(|_| CommonError::InvalidVr(vr.to_string()))?;

        let mut obj = open_file(path).map_err(|e| CommonError::dicom(path, e))?;
        obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        obj.write_to_file(path)
            .map_err(|e| CommonError::dicom(path, e))?;

        trace!(path = %path.display(), key = %key, "Rewrote DICOM attribute");
        Ok(())
    }

    fn is_dicom(&self, path: &Path) -> bool {
        sniff(path).map(|buf| infer::archive::is_dcm(&buf)).unwrap_or(false)
    }

    fn is_zip(&self, path: &Path) -> bool {
        sniff(path).map(|buf| infer::archive::is_zip(&buf)).unwrap_or(false)
    }
}

/// Parse everything up to the pixel data.
fn open_header(path: &Path) -> Result<DefaultDicomObject> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| CommonError::dicom(path, e))
}

fn element_text(obj: &DefaultDicomObject, path: &Path, tag: Tag) -> Result<Option<String>> {
    let element = match obj.element_opt(tag) {
        Ok(Some(element)) => element,
        Ok(None) => return Ok(None),
        Err(e) => return Err(CommonError::dicom(path, e)),
    };

    let value = element
        .to_str()
        .map_err(|e| CommonError::dicom(path, e))?;

    Ok(Some(
        value
            .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string(),
    ))
}

fn sniff(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(SNIFF_LEN as usize);
    std::fs::File::open(path)?.take(SNIFF_LEN).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Fixture helpers for tests in this and dependent crates.
#[cfg(any(test, feature = "test-support"))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub mod testing {
    use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
    use dicom::dictionary_std::tags;
    use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
    use std::path::Path;

    /// Segmentation Storage SOP class
    pub const SEG_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.66.4";
    /// RT Structure Set Storage SOP class
    pub const RTSTRUCT_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.481.3";
    /// CT Image Storage SOP class
    pub const CT_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.2";

    /// Attributes written into a fixture file
    #[derive(Debug, Clone)]
    pub struct Fixture {
        pub sop_class_uid: String,
        pub modality: String,
        pub study_instance_uid: String,
        pub series_instance_uid: String,
        pub series_description: String,
        pub series_number: String,
        pub patient_id: String,
        pub software_versions: Option<String>,
        pub study_id: Option<String>,
    }

    impl Fixture {
        pub fn ct() -> Self {
            Self {
                sop_class_uid: CT_SOP_CLASS.to_string(),
                modality: "CT".to_string(),
                study_instance_uid: "1.2.3.4".to_string(),
                series_instance_uid: "1.2.3.4.1".to_string(),
                series_description: "Chest Axial".to_string(),
                series_number: "1".to_string(),
                patient_id: "PAT01".to_string(),
                software_versions: Some("scanner 1.0".to_string()),
                study_id: Some("42".to_string()),
            }
        }

        pub fn seg() -> Self {
            Self {
                sop_class_uid: SEG_SOP_CLASS.to_string(),
                modality: "SEG".to_string(),
                series_instance_uid: "1.2.3".to_string(),
                series_description: "Tumor Outline".to_string(),
                series_number: "300".to_string(),
                ..Self::ct()
            }
        }

        pub fn rtstruct() -> Self {
            Self {
                sop_class_uid: RTSTRUCT_SOP_CLASS.to_string(),
                modality: "RTSTRUCT".to_string(),
                series_instance_uid: "1.2.9".to_string(),
                series_description: "Organs At Risk".to_string(),
                series_number: "400".to_string(),
                ..Self::ct()
            }
        }

        /// Write this fixture as a Part 10 file at `path`.
        pub fn write(&self, path: &Path) {
            let sop_instance = format!("{}.{}", self.series_instance_uid, self.series_number);
            let mut elements = vec![
                text(tags::SOP_CLASS_UID, VR::UI, &self.sop_class_uid),
                text(tags::SOP_INSTANCE_UID, VR::UI, &sop_instance),
                text(tags::MODALITY, VR::CS, &self.modality),
                text(tags::STUDY_INSTANCE_UID, VR::UI, &self.study_instance_uid),
                text(tags::SERIES_INSTANCE_UID, VR::UI, &self.series_instance_uid),
                text(tags::SERIES_DESCRIPTION, VR::LO, &self.series_description),
                text(tags::SERIES_NUMBER, VR::IS, &self.series_number),
                text(tags::PATIENT_ID, VR::LO, &self.patient_id),
                text(tags::STUDY_DATE, VR::DA, "20240131"),
            ];
            if let Some(ref versions) = self.software_versions {
                elements.push(text(tags::SOFTWARE_VERSIONS, VR::LO, versions));
            }
            if let Some(ref study_id) = self.study_id {
                elements.push(text(tags::STUDY_ID, VR::SH, study_id));
            }

            InMemDicomObject::from_element_iter(elements)
                .with_meta(
                    FileMetaTableBuilder::new()
                        .transfer_syntax("1.2.840.10008.1.2.1")
                        .media_storage_sop_class_uid(self.sop_class_uid.as_str())
                        .media_storage_sop_instance_uid(sop_instance.as_str()),
                )
                .expect("fixture meta table")
                .write_to_file(path)
                .expect("fixture write");
        }
    }

    fn text(tag: Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
        DataElement::new(tag, vr, PrimitiveValue::from(value))
    }
}
