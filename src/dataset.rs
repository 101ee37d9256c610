//! Dataset access boundary.
//!
//! Backends open a local granule or a remote address and load the header
//! eagerly. Array values are only read on demand so header-only checks never
//! pay for a data transfer.
mod json;
#[cfg(feature = "netcdf")]
mod netcdf;

pub use json::JsonAccessor;
#[cfg(test)]
pub use json::{DatasetDocument, JsonDataset};
#[cfg(feature = "netcdf")]
pub use self::netcdf::NetcdfAccessor;

use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("open {dataset}: {reason}")]
    Open { dataset: String, reason: String },

    #[error("{dataset}: no variable named {variable:?}")]
    MissingVariable { dataset: String, variable: String },

    #[error("read {variable} from {dataset}: {reason}")]
    Read {
        dataset: String,
        variable: String,
        reason: String,
    },
}

/// Where a dataset comes from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Local(&'a Path),
    Remote(&'a str),
}

impl fmt::Display for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local(path) => write!(f, "{}", path.display()),
            Source::Remote(address) => f.write_str(address),
        }
    }
}

/// Attribute value as exposed by the header.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Equality that treats numbers bit for bit, so a NaN `_FillValue`
    /// equals itself.
    pub fn same_as(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Text(left), AttrValue::Text(right)) => left == right,
            (AttrValue::Number(left), AttrValue::Number(right)) => left.to_bits() == right.to_bits(),
            (AttrValue::Numbers(left), AttrValue::Numbers(right)) => {
                left.len() == right.len()
                    && left.iter().zip(right).all(|(l, r)| l.to_bits() == r.to_bits())
            }
            _ => false,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(text) => write!(f, "{text:?}"),
            AttrValue::Number(value) => write!(f, "{value}"),
            AttrValue::Numbers(values) => write!(f, "{values:?}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableHeader {
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub attributes: BTreeMap<String, AttrValue>,
    /// Character or string data; has no numeric values to read.
    pub text: bool,
}

impl VariableHeader {
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn first_dimension(&self) -> Option<&str> {
        self.dimensions.first().map(String::as_str)
    }

    pub fn attribute_text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttrValue::as_text)
    }
}

/// Structural metadata of an opened dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub dimensions: BTreeMap<String, usize>,
    pub variables: BTreeMap<String, VariableHeader>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Header {
    pub fn variable_names(&self) -> BTreeSet<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableHeader> {
        self.variables.get(name)
    }
}

/// Read-only handle on an opened dataset.
pub trait Dataset {
    fn source(&self) -> &str;

    fn header(&self) -> &Header;

    /// Reads the full array of `variable`.
    fn read(&self, variable: &str) -> Result<ArrayD<f64>, DatasetError>;

    /// Reads the slice at `index` along the first axis of `variable`.
    ///
    /// Backends that can subset on the wire should override this.
    fn read_index(&self, variable: &str, index: usize) -> Result<ArrayD<f64>, DatasetError> {
        let array = self.read(variable)?;
        slice_first_axis(self.source(), variable, &array, index)
    }
}

/// Opens datasets from local paths or remote addresses.
pub trait Accessor {
    fn open(&self, source: Source<'_>) -> Result<Box<dyn Dataset>, DatasetError>;
}

pub(crate) fn slice_first_axis(
    dataset: &str,
    variable: &str,
    array: &ArrayD<f64>,
    index: usize,
) -> Result<ArrayD<f64>, DatasetError> {
    let len = array.shape().first().copied().unwrap_or(0);
    if index >= len {
        return Err(DatasetError::Read {
            dataset: dataset.to_string(),
            variable: variable.to_string(),
            reason: format!("index {index} out of range for first axis of length {len}"),
        });
    }
    Ok(array.index_axis(Axis(0), index).to_owned())
}
