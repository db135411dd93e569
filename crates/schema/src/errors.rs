use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}
