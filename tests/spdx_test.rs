// SPDX-License-Identifier: Apache-2.0

//! Every Rust source in the crate opens with the license header.

use std::fs;
use std::path::{Path, PathBuf};

const HEADER: &str = "// SPDX-License-Identifier: Apache-2.0";

fn rust_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("listing {}: {}", dir.display(), e))
        .map(|entry| entry.unwrap().path())
        .collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            rust_sources(&path, out);
        } else if path.extension().map_or(false, |ext| ext == "rs") {
            out.push(path);
        }
    }
}

fn first_line(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    text.lines().next().map(str::to_string)
}

#[test]
fn sources_carry_license_header() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut sources = Vec::new();
    for dir in ["src", "tests"] {
        rust_sources(&root.join(dir), &mut sources);
    }
    assert!(sources.iter().any(|p| p.ends_with("src/lib.rs")));

    let unlicensed: Vec<String> = sources
        .iter()
        .filter(|p| first_line(p).as_deref() != Some(HEADER))
        .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
        .collect();
    assert!(
        unlicensed.is_empty(),
        "sources without `{}` on the first line:\n  {}",
        HEADER,
        unlicensed.join("\n  ")
    );
}
