use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub mod buffer2;
pub mod file_utils;
pub mod log_setup;
pub mod parallel;

pub use buffer2::Buffer2;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|os_str| os_str.to_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> FileFormatResult<Self> {
        let extension = get_file_extension(path)
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or(FileExtensionError::MissingFileExtension)?;

        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(FileExtensionError::UnsupportedFileExtension(
                path.display().to_string(),
            )),
        }
    }
}

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> SerdeFormatResult<String> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::to_string(value)?),
        FileFormat::Json => Ok(serde_json::to_string_pretty(value)?),
    }
}

/// `T` must own its data: `serde_yml` only yields owned values.
pub fn deserialize<T: DeserializeOwned + 'static>(
    serialized: &str,
    format: FileFormat,
) -> SerdeFormatResult<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        threshold: f32,
        radii: Vec<usize>,
    }

    #[test]
    fn format_from_path_is_case_insensitive() {
        assert_eq!(
            FileFormat::from_path(Path::new("cfg/pipeline.YML")).unwrap(),
            FileFormat::Yaml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("pipeline.json")).unwrap(),
            FileFormat::Json
        );
    }

    #[test]
    fn format_from_path_rejects_unknown_extension() {
        assert!(matches!(
            FileFormat::from_path(Path::new("pipeline.toml")),
            Err(FileExtensionError::UnsupportedFileExtension(_))
        ));
        assert!(matches!(
            FileFormat::from_path(Path::new("pipeline")),
            Err(FileExtensionError::MissingFileExtension)
        ));
    }

    #[test]
    fn yaml_and_json_agree() {
        let value = Sample {
            threshold: 12.0,
            radii: vec![4, 6, 8, 10],
        };
        for format in [FileFormat::Yaml, FileFormat::Json] {
            let text = serialize(&value, format).unwrap();
            let back: Sample = deserialize(&text, format).unwrap();
            assert_eq!(back, value);
        }
    }
}
