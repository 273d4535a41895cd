//! Global template data.
//!
//! One JSON object shared read-only by every page of a build. The file is
//! optional, and a broken file must not break the build: the loader reports
//! the problem and hands out an empty object instead.

use crate::{error::DataLoadError, log};
use serde_json::{Map, Value};
use std::{fs, io, path::Path};

/// Top-level keys of the global data file.
pub type GlobalData = Map<String, Value>;

/// Read and parse the global data file.
///
/// An absent file is not an error and yields an empty object.
pub fn load_global_data(path: &Path) -> Result<GlobalData, DataLoadError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(GlobalData::new()),
        Err(err) => return Err(DataLoadError::Io(path.to_path_buf(), err)),
    };

    match serde_json::from_str(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DataLoadError::NotAnObject(path.to_path_buf())),
        Err(err) => Err(DataLoadError::Parse(path.to_path_buf(), err)),
    }
}

/// Like [`load_global_data`], degrading every failure to an empty object
/// plus a warning.
pub fn load_or_default(path: &Path) -> GlobalData {
    load_global_data(path).unwrap_or_else(|err| {
        log!("warn"; "{}, rendering with empty global data", crate::error::error_chain(&err));
        GlobalData::new()
    })
}
