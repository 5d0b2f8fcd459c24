//! Interactive dataset file picker.
//!
//! This is intentionally kept separate from clap parsing:
//! - clap handles structured flags/subcommands
//! - the picker provides the "run `histfit fit --pick` and choose a file" UX
//!
//! The picker searches for `*.json` and `*.csv` files under the current working directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Default directory recursion depth for finding dataset files.
const DEFAULT_SEARCH_DEPTH: usize = 4;

const DATASET_EXTENSIONS: [&str; 2] = ["json", "csv"];

/// Prompt the user to select a dataset file from the current directory tree.
///
/// Behavior:
/// - list discovered `*.json`/`*.csv` files
/// - accept either a number (from the list) or an explicit path
/// - `q` cancels
pub fn prompt_for_dataset_path() -> Result<PathBuf, AppError> {
    let files = discover_dataset_files(Path::new("."));
    if files.is_empty() {
        return Err(AppError::new(
            2,
            "No .json or .csv files found. Provide one with `histfit fit -f <file>`.",
        ));
    }

    println!("Found {} dataset file(s):", files.len());
    for (idx, path) in files.iter().enumerate() {
        println!("{:>3}) {}", idx + 1, pretty_path(path));
    }

    loop {
        print!("Select a file by number (1-{}) or type a path (q to quit): ", files.len());
        io::stdout()
            .flush()
            .map_err(|e| AppError::new(2, format!("Failed to write prompt: {e}")))?;

        let mut input = String::new();
        let bytes = io::stdin()
            .read_line(&mut input)
            .map_err(|e| AppError::new(2, format!("Failed to read input: {e}")))?;

        if bytes == 0 {
            return Err(AppError::new(
                2,
                "No input received. Provide a dataset path with `histfit fit -f <file>`.",
            ));
        }

        let input = input.trim();
        if input.eq_ignore_ascii_case("q") {
            return Err(AppError::new(2, "Canceled."));
        }

        if let Ok(choice) = input.parse::<usize>() {
            if (1..=files.len()).contains(&choice) {
                return validate_dataset_path(&files[choice - 1]);
            }
            println!("Invalid choice: {choice}. Enter a number between 1 and {}.", files.len());
            continue;
        }

        let candidate = PathBuf::from(input);
        match validate_dataset_path(&candidate) {
            Ok(path) => return Ok(path),
            Err(err) => {
                println!("{err}");
                continue;
            }
        }
    }
}

/// Validate the provided path points to a `.json` or `.csv` file.
pub fn validate_dataset_path(path: &Path) -> Result<PathBuf, AppError> {
    if !path.exists() {
        return Err(AppError::new(
            2,
            format!("Dataset file not found: {}", path.display()),
        ));
    }
    if path.is_dir() {
        return Err(AppError::new(
            2,
            format!("Expected a file, got a directory: {}", path.display()),
        ));
    }
    if !has_dataset_extension(path) {
        return Err(AppError::new(
            2,
            format!("Expected a .json or .csv file (got: {}).", path.display()),
        ));
    }

    Ok(path.to_path_buf())
}

/// Discover dataset files under `root` (deterministic order).
pub fn discover_dataset_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    find_dataset_files_inner(root, 0, DEFAULT_SEARCH_DEPTH, &mut out);
    out.sort_by(|a, b| pretty_path(a).cmp(&pretty_path(b)));
    out
}

fn find_dataset_files_inner(root: &Path, depth: usize, max_depth: usize, out: &mut Vec<PathBuf>) {
    if depth > max_depth {
        return;
    }

    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            if should_skip_dir(&path) {
                continue;
            }
            find_dataset_files_inner(&path, depth + 1, max_depth, out);
            continue;
        }

        if file_type.is_file() && has_dataset_extension(&path) {
            out.push(path);
        }
    }
}

fn has_dataset_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DATASET_EXTENSIONS.iter().any(|d| ext.eq_ignore_ascii_case(d)))
        == Some(true)
}

fn should_skip_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    matches!(name, ".git" | "target" | "node_modules")
}

fn pretty_path(path: &Path) -> String {
    let stripped = path.strip_prefix("./").unwrap_or(path);
    stripped.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_finds_json_and_csv_but_skips_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("b.csv"), "x\n1\n").unwrap();
        fs::write(root.join("data/a.JSON"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();
        fs::write(root.join("target/c.json"), "{}").unwrap();

        let found: Vec<PathBuf> = discover_dataset_files(root)
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(found, vec![PathBuf::from("b.csv"), PathBuf::from("data/a.JSON")]);
    }

    #[test]
    fn validation_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        fs::write(&txt, "").unwrap();

        assert_eq!(validate_dataset_path(&txt).unwrap_err().exit_code(), 2);
        assert_eq!(validate_dataset_path(&dir.path().join("missing.json")).unwrap_err().exit_code(), 2);
    }
}
