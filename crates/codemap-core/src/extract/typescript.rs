use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{
    extract_first_sentence, read_sources, unit_dir_name, FileSymbols, LanguageExtractor,
    UnitContext, UnitSummary,
};
use crate::errors::Result;
use crate::language::Language;
use crate::model::{Package, TypeInfo};
use crate::planner::PackagePlan;

static EXPORT_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^export\s+(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:const\s+)?(class|interface|type|enum)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .unwrap()
});
static EXPORT_FUNC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^export\s+(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)")
        .unwrap()
});
static EXPORT_VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^export\s+(?:declare\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap()
});
static EXPORT_LIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^export\s+(?:type\s+)?\{([^}]*)\}").unwrap());
static FROM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:from|import)\s*\(?\s*['"](\.[^'"]*)['"]"#).unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScriptExtractor;

impl LanguageExtractor for TypeScriptExtractor {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn analyze(&self, ctx: &UnitContext<'_>, plan: &PackagePlan) -> Result<Option<Package>> {
        let sources = read_sources(ctx.root, plan)?;
        let symbols = sources.iter().map(|s| parse_typescript_file(&s.content)).collect();
        let mut summary = UnitSummary::fold(&sources, symbols, score_entry_point);

        let name = package_json_name(&plan.abs_path)
            .unwrap_or_else(|| unit_dir_name(ctx.root, &plan.rel_path));
        if summary.purpose.is_empty() {
            summary.purpose = format!("TypeScript package {}", name);
        }
        Ok(Some(summary.into_package(
            name,
            &plan.rel_path,
            ctx.large_package_files,
        )))
    }
}

fn package_json_name(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    value
        .get("name")
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Exported declarations and relative imports of one TypeScript file
pub fn parse_typescript_file(content: &str) -> FileSymbols {
    let mut symbols = FileSymbols {
        purpose: leading_comment(content),
        ..FileSymbols::default()
    };

    for line in content.lines() {
        let line = line.trim();

        if let Some(caps) = FROM_RE.captures(line) {
            let source = &caps[1];
            if !symbols.imports.iter().any(|i| i == source) {
                symbols.imports.push(source.to_string());
            }
        }

        if !line.starts_with("export") {
            continue;
        }
        if let Some(caps) = EXPORT_TYPE_RE.captures(line) {
            symbols.types.push(TypeInfo::new(&caps[2], &caps[1]));
        } else if let Some(caps) = EXPORT_FUNC_RE.captures(line) {
            push_func(&mut symbols, &caps[1]);
        } else if let Some(caps) = EXPORT_VAR_RE.captures(line) {
            push_func(&mut symbols, &caps[1]);
        } else if let Some(caps) = EXPORT_LIST_RE.captures(line) {
            for spec in caps[1].split(',') {
                // `a as b` exports `b`
                let exported = spec.split_whitespace().last().unwrap_or("");
                if !exported.is_empty() && exported != "default" {
                    push_func(&mut symbols, exported);
                }
            }
        }
    }

    symbols
}

fn push_func(symbols: &mut FileSymbols, name: &str) {
    if !symbols.funcs.iter().any(|f| f == name) {
        symbols.funcs.push(name.to_string());
    }
}

/// First block or line comment, if it opens the file
fn leading_comment(content: &str) -> String {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("/*") {
        let body = rest.split("*/").next().unwrap_or("");
        let text: Vec<&str> = body
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty() && !l.starts_with('@'))
            .collect();
        return extract_first_sentence(&text.join(" "));
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        let line = rest.lines().next().unwrap_or("");
        return extract_first_sentence(line.trim_start_matches('/'));
    }
    String::new()
}

fn score_entry_point(path: &str, file: &FileSymbols) -> i32 {
    const INDEX_EXTS: [&str; 4] = ["ts", "tsx", "mts", "cts"];
    let (stem, ext) = path.rsplit_once('.').unwrap_or((path, ""));

    let mut score = if INDEX_EXTS.contains(&ext) && stem == "src/index" {
        120
    } else if stem == "index" || stem.ends_with("/index") {
        110
    } else if stem == "src/main" && (ext == "ts" || ext == "tsx") {
        100
    } else {
        0
    };
    if path.starts_with("src/bin/") {
        score += 80;
    }
    if !file.types.is_empty() {
        score += 5;
    }
    if !file.funcs.is_empty() {
        score += 5;
    }
    score
}
