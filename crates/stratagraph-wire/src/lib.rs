//! Wire codec for path result values.
//!
//! A path records, for every step of a traversal that a result passed
//! through, the value produced at that step and the set of output labels
//! attached to it. On the wire a path is two length-matched ordered
//! sequences packed as two independently length-prefixed components:
//!
//! ```text
//! [u32 label-component byte length][label sequence]
//! [u32 value-component byte length][value sequence]
//! ```
//!
//! The label component always precedes the value component. Decoding
//! rejects a buffer whose two sequences differ in length with
//! [`FormatError::LengthMismatch`]: a labels entry without its value (or
//! vice versa) cannot be a valid path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// One step value recorded in a path.
///
/// Externally tagged: the components are bincode, a positional format that
/// cannot decode internally tagged (`tag = "kind"`) enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathValue {
    Vertex { id: u64 },
    Edge { id: u64 },
    Text { value: String },
    Int { value: i64 },
}

/// An ordered record of the values a result passed through, with the label
/// sets under which each value was produced. The two sequences are always
/// the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    labels: Vec<BTreeSet<String>>,
    values: Vec<PathValue>,
}

impl Path {
    pub fn new() -> Path {
        Path::default()
    }

    /// Append one step to the path.
    pub fn extend(&mut self, value: PathValue, labels: BTreeSet<String>) {
        self.labels.push(labels);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn labels(&self) -> &[BTreeSet<String>] {
        &self.labels
    }

    pub fn values(&self) -> &[PathValue] {
        &self.values
    }
}

/// Wire-format failure at the path codec boundary.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("path requires labels and values of the same length (labels: {labels}, values: {values})")]
    LengthMismatch { labels: usize, values: usize },
    #[error("path component is truncated: need {expected} more bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("path component of {0} bytes exceeds the frame limit")]
    Oversize(usize),
    #[error("path component failed to decode: {0}")]
    Component(#[from] bincode::Error),
}

/// Encode a path: label component first, then value component, each
/// independently length-prefixed.
pub fn encode_path(path: &Path) -> Result<Vec<u8>, FormatError> {
    let labels = bincode::serialize(path.labels())?;
    let values = bincode::serialize(path.values())?;
    let mut out = Vec::with_capacity(8 + labels.len() + values.len());
    write_component(&mut out, &labels)?;
    write_component(&mut out, &values)?;
    Ok(out)
}

/// Decode a path, verifying that the label and value sequences match in
/// length.
pub fn decode_path(buf: &[u8]) -> Result<Path, FormatError> {
    let (label_bytes, rest) = split_component(buf)?;
    let (value_bytes, _) = split_component(rest)?;

    let labels: Vec<BTreeSet<String>> = bincode::deserialize(label_bytes)?;
    let values: Vec<PathValue> = bincode::deserialize(value_bytes)?;
    if labels.len() != values.len() {
        return Err(FormatError::LengthMismatch {
            labels: labels.len(),
            values: values.len(),
        });
    }

    let mut path = Path::new();
    for (value, labels) in values.into_iter().zip(labels) {
        path.extend(value, labels);
    }
    Ok(path)
}

fn write_component(out: &mut Vec<u8>, component: &[u8]) -> Result<(), FormatError> {
    let len = u32::try_from(component.len()).map_err(|_| FormatError::Oversize(component.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(component);
    Ok(())
}

fn split_component(buf: &[u8]) -> Result<(&[u8], &[u8]), FormatError> {
    if buf.len() < 4 {
        return Err(FormatError::Truncated {
            expected: 4,
            found: buf.len(),
        });
    }
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&buf[..4]);
    let len = u32::from_be_bytes(prefix) as usize;
    let rest = &buf[4..];
    if rest.len() < len {
        return Err(FormatError::Truncated {
            expected: len,
            found: rest.len(),
        });
    }
    Ok(rest.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn three_step_path() -> Path {
        let mut path = Path::new();
        path.extend(PathValue::Vertex { id: 1 }, labels(&["a"]));
        path.extend(PathValue::Edge { id: 7 }, labels(&[]));
        path.extend(
            PathValue::Text {
                value: "marko".into(),
            },
            labels(&["b", "c"]),
        );
        path
    }

    #[test]
    fn every_value_variant_round_trips() {
        let mut path = three_step_path();
        path.extend(PathValue::Int { value: -3 }, labels(&[]));
        let bytes = encode_path(&path).unwrap();
        assert_eq!(decode_path(&bytes).unwrap(), path);
    }

    #[test]
    fn encode_decode_round_trips() {
        let path = three_step_path();
        let bytes = encode_path(&path).unwrap();
        let decoded = decode_path(&bytes).unwrap();
        assert_eq!(decoded.labels(), path.labels());
        assert_eq!(decoded.values(), path.values());
        assert_eq!(decoded, path);
    }

    #[test]
    fn empty_path_round_trips() {
        let path = Path::new();
        let bytes = encode_path(&path).unwrap();
        assert_eq!(decode_path(&bytes).unwrap(), path);
    }

    #[test]
    fn label_component_precedes_value_component() {
        let path = three_step_path();
        let bytes = encode_path(&path).unwrap();

        let expected_labels = bincode::serialize(path.labels()).unwrap();
        let label_len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(label_len, expected_labels.len());
        assert_eq!(&bytes[4..4 + label_len], expected_labels.as_slice());
    }

    #[test]
    fn mismatched_sequence_lengths_are_rejected() {
        // Hand-pack components with two label sets but three values.
        let label_sets = vec![labels(&["a"]), labels(&["b"])];
        let values = vec![
            PathValue::Vertex { id: 1 },
            PathValue::Vertex { id: 2 },
            PathValue::Vertex { id: 3 },
        ];
        let label_bytes = bincode::serialize(&label_sets).unwrap();
        let value_bytes = bincode::serialize(&values).unwrap();

        let mut buf = Vec::new();
        buf.extend_from_slice(&(label_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&label_bytes);
        buf.extend_from_slice(&(value_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&value_bytes);

        let err = decode_path(&buf).unwrap_err();
        assert!(matches!(
            err,
            FormatError::LengthMismatch {
                labels: 2,
                values: 3
            }
        ));
    }

    #[test]
    fn truncated_buffers_are_rejected() {
        let bytes = encode_path(&three_step_path()).unwrap();
        assert!(matches!(
            decode_path(&bytes[..2]),
            Err(FormatError::Truncated { .. })
        ));
        assert!(matches!(
            decode_path(&bytes[..bytes.len() - 1]),
            Err(FormatError::Truncated { .. })
        ));
    }
}
