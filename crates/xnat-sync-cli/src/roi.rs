//! ROI collection types
//!
//! A closed table: each type names the header that identifies it, the value
//! that header must hold, and the modality the file must declare.

use crate::discovery::DicomFileRef;
use clap::ValueEnum;
use std::fmt;

/// One row of the ROI type table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiSpec {
    /// Name sent as the `type` parameter of the collection store
    pub name: &'static str,
    /// Identifying header keyword and its expected value; `None` when the
    /// type has no DICOM representation
    pub header: Option<(&'static str, &'static str)>,
    /// Modalities compatible with this type
    pub modalities: &'static [&'static str],
}

const ROI_TABLE: [RoiSpec; 3] = [
    RoiSpec {
        name: "SEG",
        header: Some(("SOPClassUID", "1.2.840.10008.5.1.4.1.1.66.4")),
        modalities: &["SEG"],
    },
    RoiSpec {
        name: "RTSTRUCT",
        header: Some(("SOPClassUID", "1.2.840.10008.5.1.4.1.1.481.3")),
        modalities: &["RTSTRUCT"],
    },
    RoiSpec {
        name: "AIM",
        header: None,
        modalities: &[],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum RoiType {
    #[default]
    #[value(name = "SEG")]
    Seg,
    #[value(name = "RTSTRUCT")]
    RtStruct,
    #[value(name = "AIM")]
    Aim,
}

impl RoiType {
    pub const ALL: [RoiType; 3] = [RoiType::Seg, RoiType::RtStruct, RoiType::Aim];

    pub fn spec(self) -> &'static RoiSpec {
        match self {
            RoiType::Seg => &ROI_TABLE[0],
            RoiType::RtStruct => &ROI_TABLE[1],
            RoiType::Aim => &ROI_TABLE[2],
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    /// `file` carries this type's identifying header value and modality.
    pub fn matches(self, file: &DicomFileRef) -> bool {
        let spec = self.spec();
        let Some((header, expected)) = spec.header else {
            return false;
        };

        file.get(header) == Some(expected)
            && file
                .get("Modality")
                .is_some_and(|modality| spec.modalities.contains(&modality))
    }

    /// The first ROI type `file` matches, if any.
    pub fn classify(file: &DicomFileRef) -> Option<RoiType> {
        Self::ALL.into_iter().find(|roi| roi.matches(file))
    }
}

impl fmt::Display for RoiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(sop_class: &str, modality: &str) -> DicomFileRef {
        DicomFileRef::from_fields(
            "x.dcm",
            [("SOPClassUID", sop_class), ("Modality", modality)],
        )
    }

    #[test]
    fn test_seg_matches_header_and_modality() {
        let seg = file("1.2.840.10008.5.1.4.1.1.66.4", "SEG");
        assert!(RoiType::Seg.matches(&seg));
        assert!(!RoiType::RtStruct.matches(&seg));
        assert_eq!(RoiType::classify(&seg), Some(RoiType::Seg));
    }

    #[test]
    fn test_modality_mismatch_is_not_roi() {
        let odd = file("1.2.840.10008.5.1.4.1.1.66.4", "CT");
        assert_eq!(RoiType::classify(&odd), None);
    }

    #[test]
    fn test_plain_image_is_not_roi() {
        let ct = file("1.2.840.10008.5.1.4.1.1.2", "CT");
        assert_eq!(RoiType::classify(&ct), None);
    }

    #[test]
    fn test_aim_never_matches_dicom() {
        let seg = file("1.2.840.10008.5.1.4.1.1.66.4", "SEG");
        assert!(!RoiType::Aim.matches(&seg));
        assert_eq!(RoiType::Aim.as_str(), "AIM");
    }

    #[test]
    fn test_rtstruct_row() {
        let rt = file("1.2.840.10008.5.1.4.1.1.481.3", "RTSTRUCT");
        assert_eq!(RoiType::classify(&rt), Some(RoiType::RtStruct));
        assert_eq!(RoiType::RtStruct.to_string(), "RTSTRUCT");
    }
}
