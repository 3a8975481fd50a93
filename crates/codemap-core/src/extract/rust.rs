use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    cargo_package_name, comment_text, extract_first_sentence, read_sources, unit_dir_name, FileSymbols,
    LanguageExtractor, UnitContext, UnitSummary,
};
use crate::errors::Result;
use crate::language::Language;
use crate::model::{Package, TypeInfo};
use crate::planner::PackagePlan;

const VISIBILITY: &str = r"^\s*pub(?:\([^)]*\))?\s+";

static STRUCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{}struct\s+([A-Za-z_][A-Za-z0-9_]*)", VISIBILITY)).unwrap());
static ENUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{}enum\s+([A-Za-z_][A-Za-z0-9_]*)", VISIBILITY)).unwrap());
static TRAIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{}trait\s+([A-Za-z_][A-Za-z0-9_]*)", VISIBILITY)).unwrap());
static TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{}type\s+([A-Za-z_][A-Za-z0-9_]*)", VISIBILITY)).unwrap());
static FN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{}(?:async\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)", VISIBILITY)).unwrap()
});
static USE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*use\s+(crate|super)::([^;]+);").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct RustExtractor;

impl LanguageExtractor for RustExtractor {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn analyze(&self, ctx: &UnitContext<'_>, plan: &PackagePlan) -> Result<Option<Package>> {
        let sources = read_sources(ctx.root, plan)?;
        let symbols = sources.iter().map(|s| parse_rust_file(&s.content)).collect();
        let mut summary = UnitSummary::fold(&sources, symbols, score_entry_point);

        let name = crate_name(&plan.abs_path.join("Cargo.toml"))
            .unwrap_or_else(|| unit_dir_name(ctx.root, &plan.rel_path));
        if summary.purpose.is_empty() {
            summary.purpose = format!("Rust crate {}", name);
        }
        Ok(Some(summary.into_package(
            name,
            &plan.rel_path,
            ctx.large_package_files,
        )))
    }
}

fn crate_name(manifest: &std::path::Path) -> Option<String> {
    let content = std::fs::read_to_string(manifest).ok()?;
    cargo_package_name(&content)
}

/// Public items and `crate::`/`super::` imports of one Rust file
pub fn parse_rust_file(content: &str) -> FileSymbols {
    let mut symbols = FileSymbols {
        purpose: leading_comment(content),
        ..FileSymbols::default()
    };

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        let typed = [
            (&*STRUCT_RE, "struct"),
            (&*ENUM_RE, "enum"),
            (&*TRAIT_RE, "trait"),
            (&*TYPE_RE, "type"),
        ]
        .into_iter()
        .find_map(|(re, kind)| re.captures(line).map(|caps| TypeInfo::new(&caps[1], kind)));
        if let Some(info) = typed {
            symbols.types.push(info);
            continue;
        }

        if let Some(caps) = FN_RE.captures(line) {
            symbols.funcs.push(caps[1].to_string());
        } else if let Some(caps) = USE_RE.captures(line) {
            let path: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();
            symbols.imports.push(format!("{}::{}", &caps[1], path));
        }
    }

    symbols
}

fn leading_comment(content: &str) -> String {
    let Some(first) = content.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return String::new();
    };
    ["//!", "///", "//"]
        .iter()
        .find_map(|marker| comment_text(first, marker))
        .map(extract_first_sentence)
        .unwrap_or_default()
}

fn score_entry_point(path: &str, file: &FileSymbols) -> i32 {
    let mut score = match path {
        "src/main.rs" => 120,
        "src/lib.rs" => 110,
        p if p.starts_with("src/bin/") && p.ends_with(".rs") => 100,
        "main.rs" => 80,
        "lib.rs" => 70,
        p if p == "mod.rs" || p.ends_with("/mod.rs") => 40,
        _ => 0,
    };
    score += 10 * file
        .funcs
        .iter()
        .filter(|f| f.eq_ignore_ascii_case("main") || f.starts_with("new"))
        .count() as i32;
    if !file.types.is_empty() {
        score += 5;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_rust_file() {
        let src = indoc! {r#"
            //! Storage backend. Keeps blobs on disk.

            use crate::errors::{Error, Result};
            use super::hash;
            use std::fs;

            pub struct Store;
            pub(crate) enum Mode { A }
            pub trait Backend {}
            pub type Handle = u32;
            struct Private;

            impl Store {
                pub fn new() -> Self { Store }
                pub async fn flush(&self) {}
                fn helper() {}
            }
            // pub fn commented() {}
        "#};
        let symbols = parse_rust_file(src);
        assert_eq!(symbols.purpose, "Storage backend.");
        assert_eq!(
            symbols.type_names(),
            vec!["Store", "Mode", "Backend", "Handle"]
        );
        assert_eq!(symbols.types[1].kind, "enum");
        assert_eq!(symbols.funcs, vec!["new", "flush"]);
        assert_eq!(
            symbols.imports,
            vec!["crate::errors::{Error,Result}", "super::hash"]
        );
    }

    #[test]
    fn test_purpose_only_from_first_line() {
        assert_eq!(parse_rust_file("use x;\n//! late\n").purpose, "");
        assert_eq!(parse_rust_file("\n/// Doc line\nfn a() {}\n").purpose, "Doc line");
    }

    #[test]
    fn test_score_entry_point() {
        let empty = FileSymbols::default();
        assert_eq!(score_entry_point("src/main.rs", &empty), 120);
        assert_eq!(score_entry_point("src/bin/tool.rs", &empty), 100);
        assert_eq!(score_entry_point("src/store/mod.rs", &empty), 40);
        assert_eq!(score_entry_point("src/util.rs", &empty), 0);

        let file = FileSymbols {
            funcs: vec!["main".into(), "new_store".into(), "other".into()],
            types: vec![TypeInfo::new("T", "struct")],
            ..FileSymbols::default()
        };
        assert_eq!(score_entry_point("src/lib.rs", &file), 135);
    }

    #[test]
    fn test_analyze_crate() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("crates/store/src")).unwrap();
        fs::write(
            root.join("crates/store/Cargo.toml"),
            "[package]\nname = \"blob-store\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        fs::write(root.join("crates/store/src/lib.rs"), "pub mod disk;\npub struct Store;\n").unwrap();
        fs::write(root.join("crates/store/src/disk.rs"), "// Disk layout.\npub fn write() {}\n").unwrap();

        let plan = PackagePlan {
            rel_path: "crates/store".to_string(),
            abs_path: root.join("crates/store"),
            files: vec![
                "crates/store/src/lib.rs".to_string(),
                "crates/store/src/disk.rs".to_string(),
            ],
            fingerprint: String::new(),
        };
        let ctx = UnitContext {
            root,
            module_path: "rust",
            large_package_files: 10,
        };
        let package = RustExtractor.analyze(&ctx, &plan).unwrap().unwrap();
        assert_eq!(package.import_path, "blob-store");
        assert_eq!(package.entry_point, "src/lib.rs");
        assert_eq!(package.entry_path(), "crates/store/src/lib.rs");
        assert_eq!(package.purpose, "Disk layout.");
        assert_eq!(package.file_count, 2);
        assert!(package.files.is_empty());
    }

    #[test]
    fn test_analyze_without_manifest_falls_back_to_dir_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("tools")).unwrap();
        fs::write(root.join("tools/main.rs"), "fn main() {}\n").unwrap();

        let plan = PackagePlan {
            rel_path: "tools".to_string(),
            abs_path: root.join("tools"),
            files: vec!["tools/main.rs".to_string()],
            fingerprint: String::new(),
        };
        let ctx = UnitContext {
            root,
            module_path: "rust",
            large_package_files: 1,
        };
        let package = RustExtractor.analyze(&ctx, &plan).unwrap().unwrap();
        assert_eq!(package.import_path, "tools");
        assert_eq!(package.purpose, "Rust crate tools");
        assert_eq!(package.files.len(), 1);
    }
}
