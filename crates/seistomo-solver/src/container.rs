//! Hierarchical solver input container.
//!
//! A [`Container`] is a tree of named groups, each holding typed n-d arrays
//! as attributes and datasets, mirroring the HDF5 object model. The solver
//! only reads HDF5, so [`Hdf5Writer`] (the `hdf5` feature) is the one
//! production writer.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

use crate::error::ContainerError;

/// Typed element storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Values {
    F64(Vec<f64>),
    I64(Vec<i64>),
    U8(Vec<u8>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Self::F64(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major n-d array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub values: Values,
}

impl NdArray {
    pub fn f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values: Values::F64(values),
        }
    }

    pub fn i64(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            values: Values::I64(values),
        }
    }

    pub fn u8(values: Vec<u8>) -> Self {
        Self {
            shape: vec![values.len()],
            values: Values::U8(values),
        }
    }

    /// Copy an ndarray in logical (row-major) order.
    pub fn from_ndarray<D: Dimension>(array: &Array<f64, D>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            values: Values::F64(array.iter().copied().collect()),
        }
    }

    /// Rows of three, as an `N x 3` array.
    pub fn rows3(rows: &[[f64; 3]]) -> Self {
        Self {
            shape: vec![rows.len(), 3],
            values: Values::F64(rows.iter().flatten().copied().collect()),
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.values {
            Values::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.values {
            Values::I64(v) => Some(v),
            _ => None,
        }
    }

    fn check(&self, name: &str) -> Result<(), ContainerError> {
        let expected: usize = self.shape.iter().product();
        if expected != self.values.len() {
            return Err(ContainerError::Schema(format!(
                "{} has shape {:?} but {} values",
                name,
                self.shape,
                self.values.len()
            )));
        }
        Ok(())
    }
}

/// A named node of the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub attributes: BTreeMap<String, NdArray>,
    pub datasets: BTreeMap<String, NdArray>,
    pub groups: BTreeMap<String, Group>,
}

impl Group {
    pub fn set_attr(&mut self, name: &str, value: NdArray) -> &mut Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn set_dataset(&mut self, name: &str, value: NdArray) -> &mut Self {
        self.datasets.insert(name.to_string(), value);
        self
    }

    /// Child group, created when missing.
    pub fn group_mut(&mut self, name: &str) -> &mut Group {
        self.groups.entry(name.to_string()).or_default()
    }

    /// Descend a `/`-separated path of group names.
    pub fn group(&self, path: &str) -> Option<&Group> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |group, name| group.groups.get(name))
    }

    fn check(&self, path: &str) -> Result<(), ContainerError> {
        for (name, array) in self.attributes.iter().chain(&self.datasets) {
            array.check(&format!("{}/{}", path, name))?;
        }
        for (name, group) in &self.groups {
            group.check(&format!("{}/{}", path, name))?;
        }
        Ok(())
    }
}

/// Root of a container file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub root: Group,
}

impl Container {
    /// Verify that every array's shape matches its length.
    pub fn validate(&self) -> Result<(), ContainerError> {
        self.root.check("")
    }

    pub fn group(&self, path: &str) -> Option<&Group> {
        self.root.group(path)
    }

    /// Attribute at `group/path/name`.
    pub fn attr(&self, path: &str) -> Option<&NdArray> {
        let (group, name) = split_leaf(path);
        self.group(group)?.attributes.get(name)
    }

    /// Dataset at `group/path/name`.
    pub fn dataset(&self, path: &str) -> Option<&NdArray> {
        let (group, name) = split_leaf(path);
        self.group(group)?.datasets.get(name)
    }
}

fn split_leaf(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

/// Serializes a [`Container`] to a file.
pub trait ContainerWriter: Send + Sync {
    fn write(&self, container: &Container, path: &Path) -> Result<(), ContainerError>;
}

/// Writes containers as HDF5 files.
#[cfg(feature = "hdf5")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Hdf5Writer;

#[cfg(feature = "hdf5")]
impl ContainerWriter for Hdf5Writer {
    fn write(&self, container: &Container, path: &Path) -> Result<(), ContainerError> {
        container.validate()?;
        let file = hdf5::File::create(path)?;
        write_hdf5_group(&file, &container.root)?;
        file.close()?;
        Ok(())
    }
}

#[cfg(feature = "hdf5")]
fn write_hdf5_group(target: &hdf5::Group, group: &Group) -> Result<(), ContainerError> {
    use ndarray::{ArrayViewD, IxDyn};

    fn view<'a, T>(shape: &[usize], values: &'a [T]) -> Result<ArrayViewD<'a, T>, ContainerError> {
        ArrayViewD::from_shape(IxDyn(shape), values)
            .map_err(|e| ContainerError::Schema(e.to_string()))
    }

    for (name, array) in &group.attributes {
        let builder = target.new_attr_builder();
        match &array.values {
            Values::F64(v) => builder.with_data(view(&array.shape, v)?).create(name.as_str())?,
            Values::I64(v) => builder.with_data(view(&array.shape, v)?).create(name.as_str())?,
            Values::U8(v) => builder.with_data(view(&array.shape, v)?).create(name.as_str())?,
        };
    }
    for (name, array) in &group.datasets {
        let builder = target.new_dataset_builder();
        match &array.values {
            Values::F64(v) => builder.with_data(view(&array.shape, v)?).create(name.as_str())?,
            Values::I64(v) => builder.with_data(view(&array.shape, v)?).create(name.as_str())?,
            Values::U8(v) => builder.with_data(view(&array.shape, v)?).create(name.as_str())?,
        };
    }
    for (name, child) in &group.groups {
        let created = target.create_group(name)?;
        write_hdf5_group(&created, child)?;
    }
    Ok(())
}

/// The HDF5 writer, or [`ContainerError::Unsupported`] when the crate was
/// built without the `hdf5` feature.
pub fn hdf5_writer() -> Result<Arc<dyn ContainerWriter>, ContainerError> {
    #[cfg(feature = "hdf5")]
    {
        Ok(Arc::new(Hdf5Writer))
    }
    #[cfg(not(feature = "hdf5"))]
    {
        Err(ContainerError::Unsupported(
            "built without the `hdf5` feature; the solver only reads HDF5",
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::Array2;
    use std::fs::File;
    use std::io::{BufReader, BufWriter, Read, Write};

    const BINCODE_MAGIC: &[u8; 4] = b"STC1";

    /// Writes containers as a magic number followed by bincode. Lets tests
    /// read back what was written without the native HDF5 library.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BincodeWriter;

    impl ContainerWriter for BincodeWriter {
        fn write(&self, container: &Container, path: &Path) -> Result<(), ContainerError> {
            container.validate()?;
            let mut out = BufWriter::new(File::create(path)?);
            out.write_all(BINCODE_MAGIC)?;
            bincode::serialize_into(&mut out, container).map_err(encode_error)?;
            out.flush()?;
            Ok(())
        }
    }

    pub fn read_bincode(path: &Path) -> Result<Container, ContainerError> {
        let mut input = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != BINCODE_MAGIC {
            return Err(ContainerError::Schema(format!(
                "{} is not a container file",
                path.display()
            )));
        }
        bincode::deserialize_from(input).map_err(encode_error)
    }

    fn encode_error(e: bincode::Error) -> ContainerError {
        ContainerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn sample() -> Container {
        let mut container = Container::default();
        let input = container.root.group_mut("HPS_ST3D").group_mut("Input");
        input
            .set_attr("IterMax", NdArray::i64(vec![3]))
            .set_attr("ParamType", NdArray::u8(vec![2]));
        input
            .group_mut("Rcvs")
            .set_dataset("Coords", NdArray::rows3(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
        input.set_dataset(
            "Topography",
            NdArray::from_ndarray(&Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64)),
        );
        container
    }

    #[test]
    fn test_path_lookup() {
        let c = sample();
        assert_eq!(c.attr("HPS_ST3D/Input/IterMax").unwrap().as_i64(), Some(&[3][..]));
        let coords = c.dataset("HPS_ST3D/Input/Rcvs/Coords").unwrap();
        assert_eq!(coords.shape, vec![2, 3]);
        let topo = c.dataset("HPS_ST3D/Input/Topography").unwrap();
        assert_eq!(topo.as_f64().unwrap()[4], 4.0);
        assert!(c.dataset("HPS_ST3D/Input/Missing").is_none());
        assert!(c.group("HPS_ST3D/Nope").is_none());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut c = sample();
        c.root.set_dataset(
            "Bad",
            NdArray {
                shape: vec![2, 2],
                values: Values::F64(vec![1.0]),
            },
        );
        assert!(matches!(c.validate(), Err(ContainerError::Schema(_))));
    }

    #[test]
    fn test_bincode_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.h5");
        let c = sample();
        BincodeWriter.write(&c, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], BINCODE_MAGIC);
        assert_eq!(read_bincode(&path).unwrap(), c);
    }

    #[test]
    fn test_read_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.bin");
        std::fs::write(&path, b"\x89HDF\r\n").unwrap();
        assert!(read_bincode(&path).is_err());
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_no_writer_without_hdf5() {
        assert!(matches!(hdf5_writer(), Err(ContainerError::Unsupported(_))));
    }

    #[cfg(feature = "hdf5")]
    #[test]
    fn test_hdf5_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.h5");
        hdf5_writer().unwrap().write(&sample(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89HDF\r\n\x1a\n");

        let file = hdf5::File::open(&path).unwrap();
        let input = file.group("HPS_ST3D/Input").unwrap();
        let mut attrs = input.attr_names().unwrap();
        attrs.sort();
        assert_eq!(attrs, vec!["IterMax", "ParamType"]);
        let mut members = input.member_names().unwrap();
        members.sort();
        assert_eq!(members, vec!["Rcvs", "Topography"]);

        let iter_max: Vec<i64> = input.attr("IterMax").unwrap().read_raw().unwrap();
        assert_eq!(iter_max, vec![3]);
        let coords = input.dataset("Rcvs/Coords").unwrap();
        assert_eq!(coords.shape(), vec![2, 3]);
        let values: Vec<f64> = coords.read_raw().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let topo = input.dataset("Topography").unwrap();
        assert_eq!(topo.shape(), vec![2, 3]);
    }
}
