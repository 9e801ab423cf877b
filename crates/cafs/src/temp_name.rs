//! Names for the temporary files a write goes through before it is committed.
//!
//! A temporary file lives next to its destination so the final rename never
//! crosses a filesystem boundary. Its name is the destination's file name with
//! any suffix removed, followed by the id of the current process. Deriving the
//! name from the process id instead of generating a random one keeps the hot
//! path cheap. Two writes of the same process can only collide if their
//! destinations collapse to the same base name, which the content addressed
//! naming scheme rules out for distinct content.
//!
//! Stale temporary files left behind by a crashed process are never checked
//! for: a new write truncates them and the rename replaces or ignores them.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use crate::EXEC_SUFFIX;

/// Separates the content part of a file name from its attribute suffix.
const SUFFIX_DELIMITER: char = '-';

/// Replaces [`EXEC_SUFFIX`] in temporary names.
const EXEC_MARKER: char = 'x';

/// Returns the path of the temporary file used to write `destination` from the
/// current process.
pub fn temp_path(destination: &Path) -> PathBuf {
    temp_path_for_process(destination, std::process::id())
}

/// Returns the path of the temporary file used to write `destination` from the
/// process with the given id.
pub fn temp_path_for_process(destination: &Path, process_id: u32) -> PathBuf {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let base = remove_suffix(&file_name);
    destination.with_file_name(format!("{base}{process_id}"))
}

/// Truncates a file name at the first [`SUFFIX_DELIMITER`]. An executable
/// suffix is kept as a single [`EXEC_MARKER`] so executable and regular
/// variants of the same content get different temporary names.
fn remove_suffix(file_name: &str) -> Cow<'_, str> {
    match file_name.find(SUFFIX_DELIMITER) {
        None => Cow::Borrowed(file_name),
        Some(index) => {
            let (base, suffix) = file_name.split_at(index);
            if suffix == EXEC_SUFFIX {
                Cow::Owned(format!("{base}{EXEC_MARKER}"))
            } else {
                Cow::Borrowed(base)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cd1234", "cd1234")]
    #[case("cd1234-exec", "cd1234x")]
    #[case("cd1234-index.json", "cd1234")]
    #[case("cd1234-exec-other", "cd1234")]
    #[case("-exec", "x")]
    #[case("", "")]
    fn test_remove_suffix(#[case] file_name: &str, #[case] expected: &str) {
        assert_eq!(remove_suffix(file_name), expected);
    }

    #[test]
    fn test_temp_path_stays_in_destination_directory() {
        let destination = Path::new("store").join("files").join("ab").join("cd1234-exec");
        let temp = temp_path_for_process(&destination, 42);
        assert_eq!(temp, Path::new("store").join("files").join("ab").join("cd1234x42"));
    }

    #[test]
    fn test_executable_marker_is_distinct() {
        let pid = std::process::id();
        let exec = temp_path(Path::new("foo-exec"));
        let other = temp_path(Path::new("foo-other"));
        let plain = temp_path(Path::new("foo"));

        assert_eq!(exec, PathBuf::from(format!("foox{pid}")));
        assert!(exec.to_string_lossy().ends_with(&format!("x{pid}")));
        assert_ne!(exec, other);
        assert_ne!(exec, plain);

        // Any other suffix only carries attributes of the same content and
        // collapses onto the plain name.
        assert_eq!(other, plain);
    }
}
