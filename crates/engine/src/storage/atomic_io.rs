use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::StorageError;

/// Writes through a sibling temp file and a rename so readers never observe
/// a half-written file.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes)?;
    replace_file(&tmp_path, path)
}

pub fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    write_bytes_atomic(path, text.as_bytes())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes_atomic(path, &json).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = fs::read(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    match fs::remove_file(final_path) {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(tmp_path);
            return Err(error);
        }
    }

    if let Err(error) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("save.tmp");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces_existing_file() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("slot.json");

        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn json_helpers_round_trip_and_report_decode_errors() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("values.json");
        let mut values = BTreeMap::new();
        values.insert("gold".to_string(), 30u32);

        write_json_atomic(&path, &values).expect("write json");
        let loaded: BTreeMap<String, u32> = read_json(&path).expect("read json");
        assert_eq!(loaded, values);

        fs::write(&path, "{ not json").expect("corrupt");
        let error = read_json::<BTreeMap<String, u32>>(&path).expect_err("decode must fail");
        assert!(matches!(error, StorageError::Decode { .. }));
    }

    #[test]
    fn read_json_reports_missing_file() {
        let temp = TempDir::new().expect("tempdir");
        let error = read_json::<u32>(&temp.path().join("absent.json")).expect_err("missing");
        assert!(matches!(error, StorageError::Read { .. }));
    }
}
