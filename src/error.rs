use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeftError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("out of range: offset {offset} + length {length} exceeds file size {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("inconsistent state: {0}")]
    State(String),
}

pub type Result<T> = std::result::Result<T, WeftError>;
