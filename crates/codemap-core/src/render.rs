//! Markdown and tab-separated renderings of a [`Codemap`], and the hash
//! header both carry.

use std::fmt::Write as _;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::model::Codemap;

/// Marker of the header line carrying the aggregate hash
pub const HASH_MARKER: &str = "codemap-hash:";

/// Lines scanned for a hash header
const HEADER_SCAN_LINES: usize = 20;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn render_markdown(codemap: &Codemap) -> String {
    let mut out = String::new();
    let generated = codemap.generated_at.format(TIMESTAMP_FORMAT);

    let _ = writeln!(out, "<!-- {} {} -->", HASH_MARKER, codemap.content_hash);
    let _ = writeln!(out, "<!-- Generated: {} -->", generated);
    let _ = writeln!(out, "<!-- Regenerate: codemap -->");
    out.push('\n');
    out.push_str("# Codemap\n\n");
    out.push_str(
        "Prefer `CODEMAP.paths` for the most token-efficient routing to the files agents should open/edit.\n\n",
    );

    out.push_str("## Package Entry Points\n\n");
    out.push_str("| Package | Entry File | Purpose |\n");
    out.push_str("|---------|------------|---------|\n");
    for package in &codemap.packages {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            package.relative_path,
            package.entry_path(),
            escape_cell(&truncate(&package.purpose, 60))
        );
    }

    if !codemap.concerns.is_empty() {
        out.push_str("\n## Concerns (Summary)\n\n");
        out.push_str("| Concern | Files |\n");
        out.push_str("|---------|-------|\n");
        for concern in &codemap.concerns {
            let _ = writeln!(out, "| {} | {} |", concern.name, concern.total_files);
        }
    }

    out
}

/// One `package<TAB>entry[<TAB>purpose]` line per unit
pub fn render_paths(codemap: &Codemap) -> String {
    let mut out = String::new();
    let generated = codemap.generated_at.format(TIMESTAMP_FORMAT);

    let _ = writeln!(out, "# {} {}", HASH_MARKER, codemap.content_hash);
    let _ = writeln!(out, "# Generated: {}", generated);
    let _ = writeln!(out, "# Regenerate: codemap");
    let _ = writeln!(out, "# Format: <package>\\t<entry_file>\\t[purpose]");

    for package in &codemap.packages {
        let purpose = package.purpose.trim().replace(['\t', '\n'], " ");
        if purpose.is_empty() {
            let _ = writeln!(out, "{}\t{}", package.relative_path, package.entry_path());
        } else {
            let _ = writeln!(
                out,
                "{}\t{}\t{}",
                package.relative_path,
                package.entry_path(),
                truncate(&purpose, 80)
            );
        }
    }

    out
}

/// Cut to `max` characters, ending in `...` when shortened
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Hash from one header line in either output format
pub fn parse_hash_line(line: &str) -> Option<String> {
    let mut text = line.trim();
    if let Some(inner) = text.strip_prefix("<!--").and_then(|t| t.strip_suffix("-->")) {
        text = inner.trim();
    } else if let Some(rest) = text.strip_prefix('#') {
        text = rest.trim();
    }

    let value = text.strip_prefix(HASH_MARKER)?;
    let hash = value.split_whitespace().next()?;
    hash.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        .then(|| hash.to_string())
}

/// Hash recorded near the top of an output file; empty when the file is
/// missing or carries no header.
pub fn read_existing_hash(path: &Path) -> std::io::Result<String> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e),
    };

    for line in BufReader::new(file).lines().take(HEADER_SCAN_LINES) {
        let line = match line {
            Ok(line) => line,
            // Binary junk has no header.
            Err(e) if e.kind() == ErrorKind::InvalidData => break,
            Err(e) => return Err(e),
        };
        if let Some(hash) = parse_hash_line(&line) {
            return Ok(hash);
        }
    }
    Ok(String::new())
}
