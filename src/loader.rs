//! Reading zip code occurrence records.
//!
//! Every non-blank line holds one occurrence, `zip_code,item_id` or `zip_code|item_id`. Lines
//! starting with `#` are comments. The quantity of an item is the number of its occurrences.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Item, ZipOccurrences};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Line {line}: expected 'zip_code,item_id', got '{content}'")]
    Malformed { line: usize, content: String },
}

/// Splits a record into zip code and item id. A comma wins over a pipe.
fn split_record(record: &str) -> Option<(&str, &str)> {
    let (zip, item) = record.split_once(',').or_else(|| record.split_once('|'))?;
    let (zip, item) = (zip.trim(), item.trim());
    if zip.is_empty() || item.is_empty() {
        return None;
    }
    Some((zip, item))
}

/// Appends the records read from `reader` to `target`.
pub fn parse_into(reader: impl BufRead, target: &mut ZipOccurrences) -> Result<usize, LoadError> {
    let mut parsed = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| LoadError::Io {
            path: PathBuf::from("<input>"),
            source,
        })?;
        let record = line.trim();
        if record.is_empty() || record.starts_with('#') {
            continue;
        }
        let Some((zip, item)) = split_record(record) else {
            return Err(LoadError::Malformed {
                line: idx + 1,
                content: record.to_string(),
            });
        };
        target.push(zip, Arc::from(item));
        parsed += 1;
    }
    Ok(parsed)
}

/// Parses occurrence records from a single reader.
pub fn parse_occurrences(reader: impl BufRead) -> Result<ZipOccurrences, LoadError> {
    let mut occurrences = ZipOccurrences::new();
    parse_into(reader, &mut occurrences)?;
    Ok(occurrences)
}

/// Loads and merges several record files, deriving the item list from the occurrences.
pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<(Vec<Item>, ZipOccurrences), LoadError> {
    let mut occurrences = ZipOccurrences::new();
    for path in paths {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = parse_into(BufReader::new(file), &mut occurrences).map_err(|err| match err {
            LoadError::Io { source, .. } => LoadError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        debug!(path = %path.display(), records = parsed, "occurrence file loaded");
    }

    let items = occurrences.item_counts();
    info!(
        files = paths.len(),
        zip_codes = occurrences.len(),
        items = items.len(),
        occurrences = occurrences.occurrence_count(),
        "occurrence records loaded"
    );
    Ok((items, occurrences))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_both_separators() {
        let text = "10001,a\n10001|b\n\n# comment\n20002 , a \n";
        let occurrences = parse_occurrences(text.as_bytes()).unwrap();
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences.occurrence_count(), 3);

        let first = occurrences.iter().next().unwrap();
        assert_eq!(first.zip_code, "10001");
        let items: Vec<&str> = first.items.iter().map(|i| i.as_ref()).collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn comma_takes_precedence_over_pipe() {
        let occurrences = parse_occurrences("30301,x|y\n".as_bytes()).unwrap();
        let zip = occurrences.iter().next().unwrap();
        assert_eq!(zip.zip_code, "30301");
        assert_eq!(zip.items[0].as_ref(), "x|y");
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let err = parse_occurrences("10001,a\nbroken\n".as_bytes()).unwrap_err();
        match err {
            LoadError::Malformed { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_occurrences(",a\n".as_bytes()).is_err());
    }

    #[test]
    fn load_files_merges_sources() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        writeln!(first, "10001,a").unwrap();
        writeln!(first, "10001,b").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(second, "20002|a").unwrap();
        writeln!(second, "10001|a").unwrap();

        let (items, occurrences) = load_files(&[first.path(), second.path()]).unwrap();
        assert_eq!(occurrences.len(), 2);
        let counts: Vec<(&str, u64)> = items.iter().map(|i| (i.id.as_ref(), i.quantity)).collect();
        assert_eq!(counts, vec![("a", 3), ("b", 1)]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        let err = load_files(&[missing.as_path()]).unwrap_err();
        assert!(matches!(err, LoadError::Io { ref path, .. } if path == &missing));
    }
}
