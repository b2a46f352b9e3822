//! Resolve-version command - look up the CRD schema for a platform version

use console::style;
use shipyard_core::VersionMatrix;
use std::path::Path;

use crate::error::Result;

pub fn run(matrix_path: &Path, target: &str, verbose: bool) -> Result<()> {
    let content = std::fs::read_to_string(matrix_path)?;
    let matrix = VersionMatrix::from_json(&content)?;
    let schema = matrix.resolve(target)?;

    if verbose {
        eprintln!(
            "{} {} entries in {}",
            style("matrix").dim(),
            matrix.len(),
            matrix_path.display()
        );
    }
    println!("{}", schema);
    Ok(())
}
