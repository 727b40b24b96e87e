use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClimatologyError {
    #[error("No effort layer for year {year}")]
    MissingEffortYear { year: i32 },

    #[error("Misaligned grid: {0}")]
    MisalignedGrid(String),

    #[error("Invalid breakpoints: {0}")]
    InvalidBreakpoints(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ProjError {
    #[error("Unknown CRS: {0}")]
    UnknownCrs(String),

    #[error("Transform failed: {0}")]
    TransformFailed(String),
}
