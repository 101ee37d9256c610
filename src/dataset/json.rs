//! JSON dataset backend.
//!
//! A document lists dimensions, global attributes and variables with their
//! dimension names, attributes and row-major values. Remote addresses resolve
//! through a mirror directory holding one `<dataset id>.json` per dataset.
use super::{Accessor, AttrValue, Dataset, DatasetError, Header, Source, VariableHeader};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetDocument {
    #[serde(default)]
    pub dimensions: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableDocument>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDocument {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub data: Vec<f64>,
    /// Values of a character or string variable, in place of `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strings: Option<Vec<String>>,
}

pub struct JsonDataset {
    source: String,
    header: Header,
    values: BTreeMap<String, ArrayD<f64>>,
}

impl JsonDataset {
    pub fn from_document(source: &str, document: DatasetDocument) -> Result<Self, DatasetError> {
        let invalid = |reason: String| DatasetError::Open {
            dataset: source.to_string(),
            reason,
        };
        let mut variables = BTreeMap::new();
        let mut values = BTreeMap::new();
        for (name, variable) in document.variables {
            let mut shape = Vec::with_capacity(variable.dimensions.len());
            for dim in &variable.dimensions {
                let size = document.dimensions.get(dim).ok_or_else(|| {
                    invalid(format!("variable {name} uses undeclared dimension {dim}"))
                })?;
                shape.push(*size);
            }
            let text = match variable.strings {
                Some(strings) => {
                    let expected: usize = shape.iter().product();
                    if strings.len() != expected || !variable.data.is_empty() {
                        return Err(invalid(format!(
                            "text variable {name} needs {expected} strings and no data"
                        )));
                    }
                    true
                }
                None => {
                    let array = ArrayD::from_shape_vec(IxDyn(&shape), variable.data)
                        .map_err(|err| {
                            invalid(format!(
                                "variable {name} data does not fit shape {shape:?}: {err}"
                            ))
                        })?;
                    values.insert(name.clone(), array);
                    false
                }
            };
            variables.insert(
                name,
                VariableHeader {
                    dimensions: variable.dimensions,
                    shape,
                    attributes: variable.attributes,
                    text,
                },
            );
        }
        Ok(Self {
            source: source.to_string(),
            header: Header {
                dimensions: document.dimensions,
                variables,
                attributes: document.attributes,
            },
            values,
        })
    }
}

impl Dataset for JsonDataset {
    fn source(&self) -> &str {
        &self.source
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read(&self, variable: &str) -> Result<ArrayD<f64>, DatasetError> {
        if self.header.variable(variable).is_some_and(|header| header.text) {
            return Err(DatasetError::Read {
                dataset: self.source.clone(),
                variable: variable.to_string(),
                reason: "text variable has no numeric values".to_string(),
            });
        }
        self.values
            .get(variable)
            .cloned()
            .ok_or_else(|| DatasetError::MissingVariable {
                dataset: self.source.clone(),
                variable: variable.to_string(),
            })
    }
}

/// Opens JSON documents from disk, mapping remote addresses into a mirror.
#[derive(Debug, Clone, Default)]
pub struct JsonAccessor {
    mirror: Option<PathBuf>,
}

impl JsonAccessor {
    pub fn with_mirror(mirror: impl Into<PathBuf>) -> Self {
        Self {
            mirror: Some(mirror.into()),
        }
    }

    fn resolve(&self, source: Source<'_>) -> Result<PathBuf, DatasetError> {
        match source {
            Source::Local(path) => Ok(path.to_path_buf()),
            Source::Remote(address) => {
                let mirror = self.mirror.as_deref().ok_or_else(|| DatasetError::Open {
                    dataset: address.to_string(),
                    reason: "remote addresses need a mirror directory".to_string(),
                })?;
                let dataset_id = address
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .filter(|segment| !segment.is_empty() && !segment.contains(':'))
                    .ok_or_else(|| DatasetError::Open {
                        dataset: address.to_string(),
                        reason: "address has no dataset path segment".to_string(),
                    })?;
                Ok(mirror.join(format!("{dataset_id}.json")))
            }
        }
    }
}

impl Accessor for JsonAccessor {
    fn open(&self, source: Source<'_>) -> Result<Box<dyn Dataset>, DatasetError> {
        let name = source.to_string();
        let path = self.resolve(source)?;
        let document = read_document(&path).map_err(|reason| DatasetError::Open {
            dataset: name.clone(),
            reason,
        })?;
        Ok(Box::new(JsonDataset::from_document(&name, document)?))
    }
}

fn read_document(path: &Path) -> Result<DatasetDocument, String> {
    let bytes = fs::read(path).map_err(|err| format!("read {}: {err}", path.display()))?;
    serde_json::from_slice(&bytes).map_err(|err| format!("parse {}: {err}", path.display()))
}

#[cfg(test)]
impl DatasetDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(mut self, name: &str, size: usize) -> Self {
        self.dimensions.insert(name.to_string(), size);
        self
    }

    pub fn variable(mut self, name: &str, dimensions: &[&str], data: Vec<f64>) -> Self {
        let entry = self.variables.entry(name.to_string()).or_default();
        entry.dimensions = dimensions.iter().map(|dim| dim.to_string()).collect();
        entry.data = data;
        entry.strings = None;
        self
    }

    pub fn text_variable(mut self, name: &str, dimensions: &[&str], strings: &[&str]) -> Self {
        let entry = self.variables.entry(name.to_string()).or_default();
        entry.dimensions = dimensions.iter().map(|dim| dim.to_string()).collect();
        entry.data = Vec::new();
        entry.strings = Some(strings.iter().map(|text| text.to_string()).collect());
        self
    }

    pub fn attribute(mut self, variable: &str, name: &str, value: &str) -> Self {
        self.variables
            .entry(variable.to_string())
            .or_default()
            .attributes
            .insert(name.to_string(), AttrValue::Text(value.to_string()));
        self
    }

    pub fn build(self, source: &str) -> JsonDataset {
        JsonDataset::from_document(source, self).expect("valid test document")
    }
}
