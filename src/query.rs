//! SQL query source.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{ExportError, Result};

/// Read the SQL statement to execute.
///
/// The content is opaque to this crate and passed to the coordinator
/// verbatim apart from surrounding whitespace. An empty file is rejected
/// here rather than round-tripping to the engine.
pub fn read_query(path: &Path) -> Result<String> {
    info!("reading SQL query from {}", path.display());
    let text = fs::read_to_string(path).map_err(|source| ExportError::QuerySource {
        path: path.to_path_buf(),
        source,
    })?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExportError::EmptyQuery {
            path: path.to_path_buf(),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_and_trims_query() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\nSELECT 1 AS a\n\n").unwrap();

        let query = read_query(file.path()).unwrap();
        assert_eq!(query, "SELECT 1 AS a");
    }

    #[test]
    fn test_missing_file() {
        let err = read_query(Path::new("/nonexistent/query.sql")).unwrap_err();
        assert!(matches!(err, ExportError::QuerySource { .. }));
    }

    #[test]
    fn test_empty_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"   \n\t\n").unwrap();

        let err = read_query(file.path()).unwrap_err();
        assert!(matches!(err, ExportError::EmptyQuery { .. }));
    }
}
