use serde::de::DeserializeOwned;

/// Deserialization failure with the document path it happened at.
#[derive(Debug, Clone)]
pub struct PathError {
    pub path: String,
    pub message: String,
}

/// Deserialize one YAML document with path context in error messages.
pub fn from_yaml_with_path<T: DeserializeOwned>(doc: serde_yaml::Value) -> Result<T, PathError> {
    serde_path_to_error::deserialize::<_, T>(doc).map_err(|err| PathError {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}
