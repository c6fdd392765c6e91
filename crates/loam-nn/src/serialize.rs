use std::fs;
use std::path::Path;

use loam_core::Result;
use loam_tree::{self as tree, json_decode, json_encode};

use crate::module::Model;

// Model persistence: the parameter tree as a UTF-8 JSON document (see
// loam-tree's json module for the wire format).

/// Write a model's parameters to a JSON file.
pub fn save_model_json(path: impl AsRef<Path>, model: &dyn Model) -> Result<()> {
    let encoded = json_encode(&model.params())?;
    fs::write(path, encoded)?;
    Ok(())
}

/// Restore a model's parameters from a JSON file, in place.
///
/// The file's tree must match the model's parameter structure exactly.
pub fn load_model_json(model: &dyn Model, path: impl AsRef<Path>) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let restored = json_decode(&text)?;
    tree::set(&model.params(), &restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::Dense;
    use crate::init::xavier;
    use loam_core::NdArray;
    use loam_tree::Tree;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("loam-serialize-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn save_load_roundtrip() {
        let saved = Dense::new(3, 2, xavier, None);
        let path = temp_path("dense.json");
        save_model_json(&path, &saved).unwrap();

        let restored = Dense::new(3, 2, |s| NdArray::zeros(s), None);
        load_model_json(&restored, &path).unwrap();
        tree::assert_equal_all(&restored.params(), &saved.params());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_rejects_structure_mismatch() {
        let saved = Dense::new(3, 2, xavier, None);
        let path = temp_path("mismatch.json");
        save_model_json(&path, &saved).unwrap();

        let other = Dense::new(2, 2, |s| NdArray::zeros(s), None);
        // Same tree structure but incompatible leaf shapes.
        assert!(load_model_json(&other, &path).is_err());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let model = Dense::new(2, 2, xavier, None);
        let err = load_model_json(&model, "/nonexistent/loam-params.json").unwrap_err();
        assert!(matches!(err, loam_core::Error::Io(_)));
    }

    #[test]
    fn keyed_trees_survive_the_file_format() {
        let t = Tree::keyed([
            ("w", Tree::leaf(xavier(&[2, 2]))),
            ("b", Tree::leaf(NdArray::zeros(2))),
        ]);
        let s = json_encode(&t).unwrap();
        let back = json_decode(&s).unwrap();
        tree::assert_equal_all(&back, &t);
    }
}
