//! Site sort rules: map a DICOM file to its place in the archive tree.
//!
//! Research (CFMM) layout:
//!
//! ```text
//! PI/project/StudyDate/patient/StudyID.hash(StudyInstanceUID)/series/<file>
//! ```
//!
//! Clinical layout:
//!
//! ```text
//! StudyDate/patient/Modality/series/<file>
//! ```
//!
//! `<file>` is `PATIENT.Modality.STUDYDESCRIPTION.series.instance.StudyDate.hash(SOPInstanceUID).dcm`.

use dicom_object::InMemDicomObject;
use dicom_sorter_core::{Classification, Classifier, ClassifyError};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortRule {
    Cfmm,
    Clinical,
}

impl SortRule {
    /// Bundle depth covering the study level of the layout.
    pub fn default_depth(&self) -> usize {
        match self {
            // pi/project/study_date/patient/studyID_and_hash
            SortRule::Cfmm => 5,
            // study_date/patient/modality/series
            SortRule::Clinical => 4,
        }
    }

    fn layout(&self, attrs: &StudyAttributes) -> Result<PathBuf, ClassifyError> {
        match self {
            SortRule::Cfmm => cfmm_path(attrs),
            SortRule::Clinical => Ok(clinical_path(attrs)),
        }
    }
}

impl Classifier for SortRule {
    fn classify(&self, path: &Path) -> Result<Classification, ClassifyError> {
        let object = match dicom_object::open_file(path) {
            Ok(object) => object,
            Err(e) => {
                debug!("Not a DICOM file {}: {}", path.display(), e);
                return Ok(Classification::Skip);
            }
        };
        let attrs = StudyAttributes::read(&object)?;
        Classification::sorted(self.layout(&attrs)?)
    }
}

/// The attributes the sort rules need, read from one DICOM object.
#[derive(Debug, Clone, Default)]
pub struct StudyAttributes {
    pub study_description: String,
    pub study_date: String,
    pub patient_name: String,
    pub study_id: Option<String>,
    pub study_instance_uid: String,
    pub series_number: i32,
    pub instance_number: i32,
    pub modality: String,
    pub sop_instance_uid: String,
}

impl StudyAttributes {
    fn read(object: &InMemDicomObject) -> Result<Self, ClassifyError> {
        Ok(Self {
            study_description: required_text(object, "StudyDescription")?,
            study_date: required_text(object, "StudyDate")?,
            patient_name: required_text(object, "PatientName")?,
            study_id: text(object, "StudyID"),
            study_instance_uid: required_text(object, "StudyInstanceUID")?,
            series_number: required_int(object, "SeriesNumber")?,
            instance_number: required_int(object, "InstanceNumber")?,
            modality: required_text(object, "Modality")?,
            sop_instance_uid: required_text(object, "SOPInstanceUID")?,
        })
    }

    /// Family name component of the patient name.
    fn patient(&self) -> String {
        clean_path(self.patient_name.split('^').next().unwrap_or_default())
    }

    fn file_name(&self) -> String {
        format!(
            "{}.{}.{}.{:04}.{:04}.{}.{}.dcm",
            self.patient().to_uppercase(),
            self.modality,
            self.study_description.to_uppercase(),
            self.series_number,
            self.instance_number,
            self.study_date,
            hashcode(&self.sop_instance_uid),
        )
    }
}

fn text(object: &InMemDicomObject, name: &str) -> Option<String> {
    let element = object.element_by_name(name).ok()?;
    let value = element.to_str().ok()?;
    let value = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn required_text(object: &InMemDicomObject, name: &str) -> Result<String, ClassifyError> {
    text(object, name).ok_or_else(|| format!("missing attribute {}", name).into())
}

fn required_int(object: &InMemDicomObject, name: &str) -> Result<i32, ClassifyError> {
    object
        .element_by_name(name)
        .map_err(|e| format!("missing attribute {}: {}", name, e))?
        .to_int::<i32>()
        .map_err(|e| format!("attribute {} is not a number: {}", name, e).into())
}

pub fn cfmm_path(attrs: &StudyAttributes) -> Result<PathBuf, ClassifyError> {
    // 'PI^project' on newer data, 'PI project' on older GE data
    let normalized = attrs.study_description.replace('^', " ");
    let mut parts = normalized.split_whitespace();
    let (pi, project) = match (parts.next(), parts.next()) {
        (Some(pi), Some(project)) => (clean_path(pi), clean_path(project)),
        _ => {
            return Err(format!(
                "StudyDescription '{}' is not PI^project",
                attrs.study_description
            )
            .into())
        }
    };

    let study = clean_path(&format!(
        "{}.{}",
        attrs.study_id.as_deref().unwrap_or("NA"),
        hashcode(&attrs.study_instance_uid)
    ));

    Ok([
        pi,
        project,
        clean_path(&attrs.study_date),
        attrs.patient(),
        study,
        format!("{:04}", attrs.series_number),
        attrs.file_name(),
    ]
    .iter()
    .collect())
}

pub fn clinical_path(attrs: &StudyAttributes) -> PathBuf {
    [
        clean_path(&attrs.study_date),
        attrs.patient(),
        clean_path(&attrs.modality),
        format!("{:04}", attrs.series_number),
        attrs.file_name(),
    ]
    .iter()
    .collect()
}

/// Replace everything outside `[a-zA-Z0-9.-]` with `_`.
pub fn clean_path(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 32-bit `code * 31 + char` string hash as eight upper-case hex digits.
pub fn hashcode(value: &str) -> String {
    let code = value
        .chars()
        .fold(0u32, |code, c| code.wrapping_mul(31).wrapping_add(c as u32));
    format!("{:08X}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StudyAttributes {
        StudyAttributes {
            study_description: "Khan^NeuroAnalytics".to_string(),
            study_date: "20180803".to_string(),
            patient_name: "2018_08_03_C001^^".to_string(),
            study_id: Some("1".to_string()),
            study_instance_uid: "1.3.12.2.1107.5.2.34.18932".to_string(),
            series_number: 3,
            instance_number: 194,
            modality: "MR".to_string(),
            sop_instance_uid: "1.3.12.2.1107.5.2.34.18932.30000".to_string(),
        }
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("Khan^Neuro Analytics/x"), "Khan_Neuro_Analytics_x");
        assert_eq!(clean_path("1.AC168B21-x"), "1.AC168B21-x");
    }

    #[test]
    fn test_hashcode() {
        assert_eq!(hashcode(""), "00000000");
        assert_eq!(hashcode("a"), "00000061");
        // 97 * 31 + 98
        assert_eq!(hashcode("ab"), "00000C21");
        // wraps at 32 bits like the Java String hash
        assert_eq!(hashcode("polygenelubricants"), "80000000");
    }

    #[test]
    fn test_cfmm_layout() {
        let attrs = sample();
        let path = cfmm_path(&attrs).unwrap();
        let segments: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        let study = format!("1.{}", hashcode(&attrs.study_instance_uid));
        assert_eq!(
            &segments[..6],
            &[
                "Khan".to_string(),
                "NeuroAnalytics".to_string(),
                "20180803".to_string(),
                "2018_08_03_C001".to_string(),
                study,
                "0003".to_string(),
            ]
        );
        assert_eq!(
            segments[6],
            format!(
                "2018_08_03_C001.MR.KHAN^NEUROANALYTICS.0003.0194.20180803.{}.dcm",
                hashcode(&attrs.sop_instance_uid)
            )
        );
    }

    #[test]
    fn test_cfmm_missing_study_id_uses_na() {
        let attrs = StudyAttributes {
            study_id: None,
            study_description: "Khan NeuroAnalytics".to_string(),
            ..sample()
        };
        let path = cfmm_path(&attrs).unwrap();
        let fifth = path.components().nth(4).unwrap();
        assert!(fifth
            .as_os_str()
            .to_string_lossy()
            .starts_with("NA."));
    }

    #[test]
    fn test_cfmm_rejects_single_word_description() {
        let attrs = StudyAttributes {
            study_description: "Localizer".to_string(),
            ..sample()
        };
        assert!(cfmm_path(&attrs).is_err());
    }

    #[test]
    fn test_clinical_layout() {
        let path = clinical_path(&sample());
        let segments: Vec<String> = path
            .components()
            .take(4)
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        assert_eq!(segments, vec!["20180803", "2018_08_03_C001", "MR", "0003"]);
        assert_eq!(SortRule::Clinical.default_depth(), 4);
        assert_eq!(SortRule::Cfmm.default_depth(), 5);
    }

    #[test]
    fn test_non_dicom_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, b"not dicom").unwrap();
        assert_eq!(SortRule::Cfmm.classify(&path).unwrap(), Classification::Skip);
    }
}
