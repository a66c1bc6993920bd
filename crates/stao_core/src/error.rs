//! Error types for geometry validation and resource loading.

use thiserror::Error;

/// Errors raised while validating renderable objects or loading data.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{what} is empty")]
    Empty { what: &'static str },

    #[error("{what} has {found} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{what} index {index} out of range ({count} vertices)")]
    IndexOutOfRange {
        what: &'static str,
        index: u32,
        count: usize,
    },

    #[error("Invalid grid resolution {0:?}, every axis needs at least 2 samples")]
    InvalidResolution([u32; 3]),

    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: f32 },

    #[error("Failed to load transfer function: {0}")]
    TransferFunctionLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Check that an optional per-vertex array matches the vertex count.
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> CoreResult<()> {
    if expected != found {
        return Err(CoreError::LengthMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

/// Check that every index addresses an existing vertex.
pub(crate) fn check_indices<'a, I>(what: &'static str, indices: I, count: usize) -> CoreResult<()>
where
    I: IntoIterator<Item = &'a u32>,
{
    for &index in indices {
        if index as usize >= count {
            return Err(CoreError::IndexOutOfRange { what, index, count });
        }
    }
    Ok(())
}

/// Check a scalar parameter lies in a closed range and is finite.
pub(crate) fn check_range(what: &'static str, value: f32, min: f32, max: f32) -> CoreResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(CoreError::InvalidValue { what, value });
    }
    Ok(())
}
