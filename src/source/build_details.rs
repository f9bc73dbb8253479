use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A downloadable file belonging to a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub url: Option<String>,
}

/// One version discovered in an external repository, before it becomes an artifact.
///
/// Every field except `number` is optional; repositories fill in what they know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildDetails {
    pub number: String,
    pub revision: Option<String>,
    pub description: Option<String>,
    pub artifact_path: Option<String>,
    pub build_url: Option<String>,
    pub build_display_name: Option<String>,
    pub build_full_display_name: Option<String>,
    pub artifact_file_size: Option<String>,
    pub ui_display_name: Option<String>,
    pub build_parameters: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub file_metadata: Vec<FileMetadata>,
}

impl BuildDetails {
    pub fn with_number(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            ..Default::default()
        }
    }

    /// Repository path of the build: the reported path, else the `artifactPath`
    /// entry of the parameter bag. Both the dedup filter and the stored
    /// metadata read the path through here.
    pub fn resolved_artifact_path(&self) -> Option<&str> {
        let reported = self.artifact_path.as_deref().filter(|path| !path.is_empty());
        reported.or_else(|| {
            self.build_parameters
                .get("artifactPath")
                .map(String::as_str)
                .filter(|path| !path.is_empty())
        })
    }

    /// File name derived from the last segment of the build number.
    pub fn file_name_from_number(&self) -> &str {
        self.number
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_number() {
        assert_eq!(
            BuildDetails::with_number("libs/app/1.0/app-1.0.jar").file_name_from_number(),
            "app-1.0.jar"
        );
        assert_eq!(BuildDetails::with_number("42").file_name_from_number(), "42");
    }

    #[test]
    fn test_resolved_artifact_path_falls_back_to_parameters() {
        let reported = BuildDetails {
            artifact_path: Some("a/1.zip".to_string()),
            ..BuildDetails::with_number("1.zip")
        };
        assert_eq!(reported.resolved_artifact_path(), Some("a/1.zip"));

        let mut from_params = BuildDetails::with_number("1.zip");
        from_params
            .build_parameters
            .insert("artifactPath".to_string(), "b/1.zip".to_string());
        assert_eq!(from_params.resolved_artifact_path(), Some("b/1.zip"));

        let mut blank = BuildDetails::with_number("1.zip");
        blank.artifact_path = Some(String::new());
        assert_eq!(blank.resolved_artifact_path(), None);
    }

    #[test]
    fn test_partial_json_deserializes() {
        let build: BuildDetails = serde_json::from_str(r#"{"number": "7"}"#).unwrap();
        assert_eq!(build.number, "7");
        assert!(build.artifact_path.is_none());
        assert!(build.build_parameters.is_empty());
    }
}
