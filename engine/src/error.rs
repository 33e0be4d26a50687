use std::io;

use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid or corrupt table file: {0}")]
    Corrupt(&'static str),

    #[error(
        "unable to access the table file. Make sure the right permissions are available: {0}"
    )]
    Io(#[from] io::Error),

    #[error("the keyspace needs about {0} bits but only 128-bit indices are supported")]
    Space(u32),

    #[error("{0}")]
    Unsupported(&'static str),

    #[error("crack target is neither a valid digest nor an existing file: {0}")]
    InvalidTarget(String),
}
