use serde_json::{Map, Number, Value};

use loam_core::{bail, Error, NdArray, Result};

use crate::tree::Tree;

// JSON encoding of whole trees.
//
// Wire format (the exact on-disk contract for saved models):
//   leaf     -> {"@type": "ndarray", "shape": [...], "buffer": [...]}
//   sequence -> JSON array of encoded children
//   keyed    -> JSON object, one field per key
//
// serde_json's default object map is ordered, so encoding is
// deterministic: keyed fields appear in sorted order, matching every other
// traversal in this crate.

/// Encode a tree as a JSON string.
///
/// Fails if any leaf holds a non-finite value (JSON has no representation
/// for NaN or infinity).
pub fn json_encode(t: &Tree) -> Result<String> {
    Ok(encode_value(t)?.to_string())
}

fn encode_value(t: &Tree) -> Result<Value> {
    match t {
        Tree::Leaf(a) => {
            let shape: Vec<Value> = a.dims().iter().map(|&d| Value::from(d as u64)).collect();
            let mut buffer = Vec::with_capacity(a.elem_count());
            for v in a.to_vec() {
                match Number::from_f64(v as f64) {
                    Some(n) => buffer.push(Value::Number(n)),
                    None => bail!("cannot encode non-finite value {} as JSON", v),
                }
            }
            let mut obj = Map::new();
            obj.insert("@type".to_string(), Value::from("ndarray"));
            obj.insert("shape".to_string(), Value::Array(shape));
            obj.insert("buffer".to_string(), Value::Array(buffer));
            Ok(Value::Object(obj))
        }
        Tree::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for child in items {
                out.push(encode_value(child)?);
            }
            Ok(Value::Array(out))
        }
        Tree::Keyed(m) => {
            let mut obj = Map::new();
            for (key, child) in m {
                obj.insert(key.clone(), encode_value(child)?);
            }
            Ok(Value::Object(obj))
        }
    }
}

/// Decode a tree from a JSON string; the exact inverse of [`json_encode`]
/// for well-formed trees.
pub fn json_decode(s: &str) -> Result<Tree> {
    let v: Value =
        serde_json::from_str(s).map_err(|e| Error::msg(format!("json parse error: {}", e)))?;
    decode_value(&v)
}

fn decode_value(v: &Value) -> Result<Tree> {
    match v {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(decode_value(item)?);
            }
            Ok(Tree::Seq(out))
        }
        Value::Object(obj) => match obj.get("@type") {
            Some(tag) => {
                if tag.as_str() != Some("ndarray") {
                    bail!("unknown @type tag: {}", tag);
                }
                let shape = decode_shape(obj.get("shape"))?;
                let buffer = decode_buffer(obj.get("buffer"))?;
                NdArray::make(shape, buffer)
            }
            None => {
                let mut m = std::collections::BTreeMap::new();
                for (key, item) in obj {
                    m.insert(key.clone(), decode_value(item)?);
                }
                Ok(Tree::Keyed(m))
            }
        },
        _ => bail!("cannot decode {} as a tree node", v),
    }
}

fn decode_shape(v: Option<&Value>) -> Result<Vec<usize>> {
    let items = match v.and_then(Value::as_array) {
        Some(items) => items,
        None => bail!("ndarray node is missing a shape list"),
    };
    let mut dims = Vec::with_capacity(items.len());
    for item in items {
        match item.as_u64() {
            Some(d) => dims.push(d as usize),
            None => bail!("invalid dimension in shape: {}", item),
        }
    }
    Ok(dims)
}

fn decode_buffer(v: Option<&Value>) -> Result<Vec<f32>> {
    let items = match v.and_then(Value::as_array) {
        Some(items) => items,
        None => bail!("ndarray node is missing a buffer list"),
    };
    let mut data = Vec::with_capacity(items.len());
    for item in items {
        match item.as_f64() {
            Some(x) => data.push(x as f32),
            None => bail!("invalid number in buffer: {}", item),
        }
    }
    Ok(data)
}
