//! Model serialization/deserialization (feature: `serde`).
//!
//! Defines a versioned, stable on-disk format for a trained [`Network`].
//! Only the affine parameters are persisted; the ReLU/softmax stack is
//! re-interleaved on load. Deserialization validates dimensions, parameter
//! lengths, and that all parameters are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::layer::{Affine, Layer};
use crate::{Error, Network, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNetwork {
    pub format_version: u32,
    pub layers: Vec<SerializedAffine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedAffine {
    pub in_dim: usize,
    pub out_dim: usize,
    /// Row-major `(out_dim, in_dim)`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl SerializedNetwork {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {MODEL_FORMAT_VERSION}",
                self.format_version
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                let prev_out = self.layers[i - 1].out_dim;
                if layer.in_dim != prev_out {
                    return Err(Error::InvalidData(format!(
                        "layer {i} in_dim {} does not match previous out_dim {prev_out}",
                        layer.in_dim
                    )));
                }
            }
        }

        Ok(())
    }
}

impl From<&Network> for SerializedNetwork {
    fn from(net: &Network) -> Self {
        let mut layers = Vec::new();
        for i in 0..net.num_layers() {
            if let Some(Layer::Affine(affine)) = net.layer(i) {
                layers.push(SerializedAffine {
                    in_dim: affine.in_dim(),
                    out_dim: affine.out_dim(),
                    weights: affine.weights().data().to_vec(),
                    bias: affine.bias().data().to_vec(),
                });
            }
        }
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers,
        }
    }
}

impl TryFrom<SerializedNetwork> for Network {
    type Error = Error;

    fn try_from(value: SerializedNetwork) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let mut affines = Vec::with_capacity(value.layers.len());
        for (i, layer) in value.layers.into_iter().enumerate() {
            // Affine::from_parts validates shapes and finiteness.
            let affine = Affine::from_parts(layer.in_dim, layer.out_dim, layer.weights, layer.bias)
                .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;
            affines.push(affine);
        }

        Network::from_affine_layers(affines)
    }
}

impl Network {
    /// Serialize the trained parameters to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedNetwork::from(self);
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Serialize the trained parameters to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = SerializedNetwork::from(self);
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a network from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedNetwork = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the trained parameters to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))?;
        Ok(())
    }

    /// Load a network from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_json_is_stable_and_roundtrips() {
        let l0 = Affine::from_parts(
            2,
            3,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![0.5, 0.25, -0.5],
        )
        .unwrap();
        let l1 = Affine::from_parts(
            3,
            2,
            vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0],
            vec![0.5, -0.25],
        )
        .unwrap();

        let net = Network::from_affine_layers(vec![l0, l1]).unwrap();
        let json = net.to_json_string_pretty().unwrap();

        let golden = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/golden/network_v1.json"
        ))
        .trim_end();
        assert_eq!(json, golden);

        let loaded = Network::from_json_str(golden).unwrap();
        assert_eq!(loaded.num_layers(), net.num_layers());
        let json2 = loaded.to_json_string_pretty().unwrap();
        assert_eq!(json2, golden);
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"layers":[]}"#;
        let err = Network::from_json_str(bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_broken_dimension_chain() {
        let bad = r#"{
            "format_version": 1,
            "layers": [
                {"in_dim": 2, "out_dim": 3, "weights": [0,0,0,0,0,0], "bias": [0,0,0]},
                {"in_dim": 4, "out_dim": 2, "weights": [0,0,0,0,0,0,0,0], "bias": [0,0]}
            ]
        }"#;
        assert!(Network::from_json_str(bad).is_err());
    }

    #[test]
    fn rejects_non_finite_parameters() {
        let l = SerializedAffine {
            in_dim: 1,
            out_dim: 1,
            weights: vec![f32::NAN],
            bias: vec![0.0],
        };
        let ser = SerializedNetwork {
            format_version: MODEL_FORMAT_VERSION,
            layers: vec![l],
        };
        assert!(Network::try_from(ser).is_err());
    }
}
