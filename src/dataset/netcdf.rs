//! libnetcdf backend for local granules and OPeNDAP addresses.
use super::{Accessor, AttrValue, Dataset, DatasetError, Header, Source, VariableHeader};
use ::netcdf::types::NcVariableType;
use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeMap;

pub struct NetcdfAccessor;

impl Accessor for NetcdfAccessor {
    fn open(&self, source: Source<'_>) -> Result<Box<dyn Dataset>, DatasetError> {
        let name = source.to_string();
        let opened = match source {
            Source::Local(path) => ::netcdf::open(path),
            Source::Remote(address) => ::netcdf::open(address),
        };
        let file = opened.map_err(|err| DatasetError::Open {
            dataset: name.clone(),
            reason: err.to_string(),
        })?;
        let header = read_header(&file);
        Ok(Box::new(NetcdfDataset {
            source: name,
            file,
            header,
        }))
    }
}

struct NetcdfDataset {
    source: String,
    file: ::netcdf::File,
    header: Header,
}

impl NetcdfDataset {
    fn variable(&self, name: &str) -> Result<(::netcdf::Variable<'_>, &VariableHeader), DatasetError> {
        let missing = || DatasetError::MissingVariable {
            dataset: self.source.clone(),
            variable: name.to_string(),
        };
        let variable = self.file.variable(name).ok_or_else(missing)?;
        let header = self.header.variable(name).ok_or_else(missing)?;
        if header.text {
            return Err(self.read_error(name, "text variable has no numeric values"));
        }
        Ok((variable, header))
    }

    fn read_error(&self, variable: &str, reason: impl ToString) -> DatasetError {
        DatasetError::Read {
            dataset: self.source.clone(),
            variable: variable.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Dataset for NetcdfDataset {
    fn source(&self) -> &str {
        &self.source
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read(&self, name: &str) -> Result<ArrayD<f64>, DatasetError> {
        let (variable, header) = self.variable(name)?;
        let values: Vec<f64> = variable
            .get_values::<f64, _>(..)
            .map_err(|err| self.read_error(name, err))?;
        ArrayD::from_shape_vec(IxDyn(&header.shape), values).map_err(|err| self.read_error(name, err))
    }

    // Subsets on the wire so a remote slice does not pull the whole time axis.
    fn read_index(&self, name: &str, index: usize) -> Result<ArrayD<f64>, DatasetError> {
        let (variable, header) = self.variable(name)?;
        let len = header.shape.first().copied().unwrap_or(0);
        if index >= len {
            return Err(self.read_error(
                name,
                format!("index {index} out of range for first axis of length {len}"),
            ));
        }
        let mut extents = vec![::netcdf::Extent::from(index..index + 1)];
        extents.extend(header.shape[1..].iter().map(|&size| ::netcdf::Extent::from(0..size)));
        let values: Vec<f64> = variable
            .get_values::<f64, _>(extents)
            .map_err(|err| self.read_error(name, err))?;
        ArrayD::from_shape_vec(IxDyn(&header.shape[1..]), values)
            .map_err(|err| self.read_error(name, err))
    }
}

fn read_header(file: &::netcdf::File) -> Header {
    let dimensions = file
        .dimensions()
        .map(|dim| (dim.name().to_string(), dim.len()))
        .collect();
    let variables = file
        .variables()
        .map(|variable| {
            let dims = variable.dimensions();
            let header = VariableHeader {
                dimensions: dims.iter().map(|dim| dim.name().to_string()).collect(),
                shape: dims.iter().map(|dim| dim.len()).collect(),
                attributes: collect_attributes(variable.attributes()),
                text: matches!(
                    variable.vartype(),
                    NcVariableType::Char | NcVariableType::String
                ),
            };
            (variable.name().to_string(), header)
        })
        .collect();
    Header {
        dimensions,
        variables,
        attributes: collect_attributes(file.attributes()),
    }
}

fn collect_attributes<'a>(
    attributes: impl Iterator<Item = ::netcdf::Attribute<'a>>,
) -> BTreeMap<String, AttrValue> {
    attributes
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            Some((attr.name().to_string(), convert_attribute(value)))
        })
        .collect()
}

fn convert_attribute(value: ::netcdf::AttributeValue) -> AttrValue {
    use ::netcdf::AttributeValue as V;
    match value {
        V::Str(text) => AttrValue::Text(text),
        V::Strs(texts) => AttrValue::Text(texts.join(",")),
        V::Double(v) => AttrValue::Number(v),
        V::Float(v) => AttrValue::Number(f64::from(v)),
        V::Int(v) => AttrValue::Number(f64::from(v)),
        V::Uint(v) => AttrValue::Number(f64::from(v)),
        V::Short(v) => AttrValue::Number(f64::from(v)),
        V::Ushort(v) => AttrValue::Number(f64::from(v)),
        V::Schar(v) => AttrValue::Number(f64::from(v)),
        V::Uchar(v) => AttrValue::Number(f64::from(v)),
        V::Longlong(v) => AttrValue::Number(v as f64),
        V::Ulonglong(v) => AttrValue::Number(v as f64),
        V::Doubles(vs) => AttrValue::Numbers(vs),
        V::Floats(vs) => AttrValue::Numbers(vs.into_iter().map(f64::from).collect()),
        V::Ints(vs) => AttrValue::Numbers(vs.into_iter().map(f64::from).collect()),
        V::Uints(vs) => AttrValue::Numbers(vs.into_iter().map(f64::from).collect()),
        V::Shorts(vs) => AttrValue::Numbers(vs.into_iter().map(f64::from).collect()),
        V::Ushorts(vs) => AttrValue::Numbers(vs.into_iter().map(f64::from).collect()),
        V::Schars(vs) => AttrValue::Numbers(vs.into_iter().map(f64::from).collect()),
        V::Uchars(vs) => AttrValue::Numbers(vs.into_iter().map(f64::from).collect()),
        V::Longlongs(vs) => AttrValue::Numbers(vs.into_iter().map(|v| v as f64).collect()),
        V::Ulonglongs(vs) => AttrValue::Numbers(vs.into_iter().map(|v| v as f64).collect()),
        #[allow(unreachable_patterns)]
        other => AttrValue::Text(format!("{other:?}")),
    }
}
