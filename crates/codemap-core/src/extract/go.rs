use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{extract_first_sentence, read_sources, FileSymbols, LanguageExtractor, UnitContext, UnitSummary};
use crate::errors::Result;
use crate::language::Language;
use crate::model::{Package, TypeInfo};
use crate::planner::PackagePlan;

static PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^package\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:type\s+)?([A-Z][A-Za-z0-9_]*)(?:\[[^\]]*\])?\s*(=\s*)?([A-Za-z_*\[\]]+)?").unwrap()
});
static FUNC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^func\s+([A-Z][A-Za-z0-9_]*)\s*[\[(]").unwrap());
static IMPORT_SPEC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:[A-Za-z_.][A-Za-z0-9_]*\s+)?"([^"]+)""#).unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct GoExtractor;

impl LanguageExtractor for GoExtractor {
    fn language(&self) -> Language {
        Language::Go
    }

    /// The `go.mod` module path, or `go` without one
    fn module_path(&self, root: &Path) -> String {
        find_module_path(root).unwrap_or_else(|| "go".to_string())
    }

    fn analyze(&self, ctx: &UnitContext<'_>, plan: &PackagePlan) -> Result<Option<Package>> {
        let sources = read_sources(ctx.root, plan)?;
        let module = (ctx.module_path != "go").then_some(ctx.module_path);

        let parsed: Vec<(Option<String>, FileSymbols)> = sources
            .iter()
            .map(|s| parse_go_file(&s.content, module))
            .collect();

        // External test packages never name the unit.
        let Some(package_name) = parsed
            .iter()
            .filter_map(|(name, _)| name.as_deref())
            .filter(|name| !name.ends_with("_test"))
            .min()
            .map(str::to_string)
        else {
            return Ok(None);
        };

        let mut members = Vec::new();
        let mut symbols = Vec::new();
        for (source, (name, file)) in sources.iter().zip(parsed) {
            if name.as_deref() == Some(package_name.as_str()) {
                members.push(source.clone());
                symbols.push(file);
            }
        }

        let doc_purpose = members
            .iter()
            .zip(&symbols)
            .find(|(s, f)| s.within == "doc.go" && !f.purpose.is_empty())
            .map(|(_, f)| f.purpose.clone());

        let mut summary = UnitSummary::fold(&members, symbols, |path, file| {
            score_entry_point(path, &package_name, file)
        });
        if let Some(purpose) = doc_purpose {
            summary.purpose = purpose;
        }

        let import_path = match (module, plan.rel_path.as_str()) {
            (Some(module), ".") => module.to_string(),
            (Some(module), rel) => format!("{}/{}", module, rel),
            (None, rel) => rel.to_string(),
        };
        Ok(Some(summary.into_package(
            import_path,
            &plan.rel_path,
            ctx.large_package_files,
        )))
    }
}

/// Module path declared in `<root>/go.mod`
pub fn find_module_path(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("go.mod")).ok()?;
    content.lines().find_map(|line| {
        line.trim()
            .strip_prefix("module ")
            .map(|m| m.trim().trim_matches('"').to_string())
            .filter(|m| !m.is_empty())
    })
}

/// Package clause and exported symbols of one Go file.
///
/// Only imports under `module` are kept.
pub fn parse_go_file(content: &str, module: Option<&str>) -> (Option<String>, FileSymbols) {
    let mut symbols = FileSymbols::default();
    let mut package = None;
    let mut doc: Vec<String> = Vec::new();
    let mut in_block_comment = false;
    let mut in_type_group = false;
    let mut type_depth = 0i32;
    let mut in_import_group = false;

    for raw in content.lines() {
        let line = raw.trim();

        if in_block_comment {
            if let Some(idx) = line.find("*/") {
                in_block_comment = false;
                push_doc_line(&mut doc, &line[..idx]);
            } else {
                push_doc_line(&mut doc, line);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("/*") {
            match rest.find("*/") {
                Some(idx) => push_doc_line(&mut doc, &rest[..idx]),
                None => {
                    in_block_comment = true;
                    push_doc_line(&mut doc, rest);
                }
            }
            continue;
        }
        if let Some(text) = line.strip_prefix("//") {
            // Directives are not documentation.
            if !text.starts_with("go:") && !text.starts_with("+build") {
                push_doc_line(&mut doc, text);
            }
            continue;
        }
        if line.is_empty() {
            doc.clear();
            continue;
        }

        let comment = extract_first_sentence(&doc.join("\n"));
        doc.clear();

        if in_import_group {
            if line.starts_with(')') {
                in_import_group = false;
            } else {
                push_import(&mut symbols, line, module);
            }
            continue;
        }
        if in_type_group {
            if type_depth == 0 && line.starts_with(')') {
                in_type_group = false;
            } else if type_depth == 0 {
                push_type(&mut symbols, line, comment);
            }
            type_depth += brace_delta(line);
            continue;
        }

        if package.is_none() {
            if let Some(caps) = PACKAGE_RE.captures(line) {
                package = Some(caps[1].to_string());
                symbols.purpose = comment;
                continue;
            }
        }

        if let Some(rest) = keyword_rest(raw, "import") {
            if rest.starts_with('(') {
                in_import_group = true;
            } else {
                push_import(&mut symbols, rest, module);
            }
        } else if let Some(rest) = keyword_rest(raw, "type") {
            if rest.starts_with('(') {
                in_type_group = true;
                type_depth = 0;
            } else {
                push_type(&mut symbols, rest, comment);
            }
        } else if let Some(caps) = FUNC_RE.captures(raw) {
            symbols.funcs.push(caps[1].to_string());
        }
    }

    (package, symbols)
}

/// Remainder of a top-level declaration starting with `keyword`
fn keyword_rest<'a>(raw: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = raw.strip_prefix(keyword)?;
    rest.starts_with([' ', '\t', '(']).then(|| rest.trim())
}

fn brace_delta(line: &str) -> i32 {
    line.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

fn push_doc_line(doc: &mut Vec<String>, text: &str) {
    let text = text.trim_start_matches('*').trim();
    doc.push(text.to_string());
}

fn push_type(symbols: &mut FileSymbols, spec: &str, comment: String) {
    let Some(caps) = TYPE_RE.captures(spec) else {
        return;
    };
    let kind = match (caps.get(2), caps.get(3).map(|m| m.as_str())) {
        (None, Some(k)) if k.starts_with("struct") => "struct",
        (None, Some(k)) if k.starts_with("interface") => "interface",
        _ => "type",
    };
    let mut info = TypeInfo::new(&caps[1], kind);
    info.comment = comment;
    symbols.types.push(info);
}

fn push_import(symbols: &mut FileSymbols, spec: &str, module: Option<&str>) {
    let Some(module) = module else {
        return;
    };
    let Some(caps) = IMPORT_SPEC_RE.captures(spec) else {
        return;
    };
    let import = &caps[1];
    let internal = import == module
        || import
            .strip_prefix(module)
            .is_some_and(|rest| rest.starts_with('/'));
    if internal && !symbols.imports.iter().any(|i| i == import) {
        symbols.imports.push(import.to_string());
    }
}

fn score_entry_point(file_name: &str, package_name: &str, file: &FileSymbols) -> i32 {
    let base = file_name.strip_suffix(".go").unwrap_or(file_name);
    let mut score = 0;
    if base == package_name {
        score += 100;
    }
    if matches!(base, "main" | "server" | "client") {
        score += 50;
    }
    score += 30 * file
        .types
        .iter()
        .filter(|t| t.name.eq_ignore_ascii_case(package_name))
        .count() as i32;
    score += 20 * file.funcs.iter().filter(|f| f.starts_with("New")).count() as i32;
    score
}
