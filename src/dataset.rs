use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cataloged dataset's metadata.
///
/// The named fields are the columnized attributes the search layer knows
/// about; anything else a record carries lands in `extra` and is preserved
/// verbatim, so structured filters can still inspect it. The whole record is
/// serialized as the payload row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Unique identifier: a dataset slug or remote path.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub used_in_projects: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_coverage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_coverage: Option<String>,
    #[serde(default)]
    pub is_remote: bool,
    /// Any further metadata keys, schemaless per record.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl DatasetRecord {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Text fed to the full-text shadow row for the tags field.
    pub fn tags_text(&self) -> String {
        self.tags.join(" ")
    }

    /// Text fed to the full-text shadow row for the projects field.
    pub fn projects_text(&self) -> String {
        self.used_in_projects.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut record = DatasetRecord::new("rainfall-2023", "Rainfall 2023");
        record.description = "Daily rainfall measurements".to_string();
        record.tags = vec!["weather".to_string(), "rain".to_string()];
        record.file_format = Some("csv".to_string());
        record.size = Some(1024);
        record
            .extra
            .insert("station_count".to_string(), Value::from(42));

        let bytes = serde_json::to_vec(&record).unwrap();
        let back: DatasetRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.extra["station_count"], Value::from(42));
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let json = r#"{
            "id": "x",
            "name": "X",
            "access_method": "webdav",
            "data_type": ["raster", "timeseries"]
        }"#;
        let record: DatasetRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.extra["access_method"], Value::from("webdav"));
        assert!(record.extra["data_type"].is_array());
    }

    #[test]
    fn joined_text_helpers() {
        let mut record = DatasetRecord::new("x", "X");
        record.tags = vec!["a".to_string(), "b".to_string()];
        record.used_in_projects = vec!["ML".to_string()];
        assert_eq!(record.tags_text(), "a b");
        assert_eq!(record.projects_text(), "ML");
    }
}
