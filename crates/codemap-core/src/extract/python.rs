use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{
    comment_text, extract_first_sentence, ini_value, pyproject_name, read_sources, unit_dir_name, FileSymbols,
    LanguageExtractor, UnitContext, UnitSummary,
};
use crate::errors::Result;
use crate::language::Language;
use crate::model::{Package, TypeInfo};
use crate::planner::PackagePlan;

static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^class\s+([A-Za-z_][A-Za-z0-9_]*)\b").unwrap());
static DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^import\s+(.+)$").unwrap());
static FROM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^from\s+([\.A-Za-z_][A-Za-z0-9_\.]*)\s+import\s+").unwrap());
static CONST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9_]*)\s*=").unwrap());
static SETUP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name\s*=\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct PythonExtractor;

impl LanguageExtractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn analyze(&self, ctx: &UnitContext<'_>, plan: &PackagePlan) -> Result<Option<Package>> {
        let sources = read_sources(ctx.root, plan)?;
        let name = package_name(&plan.abs_path)
            .unwrap_or_else(|| unit_dir_name(ctx.root, &plan.rel_path));
        let prefix = import_prefix(&name, &plan.rel_path);

        let symbols = sources
            .iter()
            .map(|s| parse_python_file(&s.content, &prefix))
            .collect();
        let mut summary = UnitSummary::fold(&sources, symbols, score_entry_point);
        if summary.purpose.is_empty() {
            summary.purpose = format!("Python package {}", name);
        }
        Ok(Some(summary.into_package(
            name,
            &plan.rel_path,
            ctx.large_package_files,
        )))
    }
}

/// Declared distribution name: pyproject.toml, then setup.cfg, then setup.py
fn package_name(dir: &Path) -> Option<String> {
    let read = |file: &str| std::fs::read_to_string(dir.join(file)).ok();

    read("pyproject.toml")
        .and_then(|c| pyproject_name(&c))
        .or_else(|| read("setup.cfg").and_then(|c| ini_value(&c, "metadata", "name")))
        .or_else(|| {
            read("setup.py")
                .and_then(|c| SETUP_NAME_RE.captures(&c).map(|caps| caps[1].to_string()))
        })
}

/// Top-level module name imports of this unit start with
fn import_prefix(name: &str, rel_path: &str) -> String {
    let candidate = name.replace('-', "_");
    let candidate = candidate.split('.').next().unwrap_or("");
    if is_identifier(candidate) {
        return candidate.to_string();
    }
    rel_path.rsplit('/').next().unwrap_or(rel_path).to_string()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn is_internal(import: &str, prefix: &str) -> bool {
    import.starts_with('.')
        || import == prefix
        || import
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Module-level public symbols and internal imports of one Python file
pub fn parse_python_file(content: &str, prefix: &str) -> FileSymbols {
    let mut symbols = FileSymbols {
        purpose: module_docstring(content),
        ..FileSymbols::default()
    };

    for line in content.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with([' ', '\t', '#']) {
            continue;
        }

        if let Some(caps) = CLASS_RE.captures(line) {
            let name = &caps[1];
            if !name.starts_with('_') && !symbols.types.iter().any(|t| t.name == name) {
                symbols.types.push(TypeInfo::new(name, "class"));
            }
        } else if let Some(caps) = DEF_RE.captures(line) {
            push_func(&mut symbols, &caps[1]);
        } else if let Some(caps) = IMPORT_RE.captures(line) {
            for part in caps[1].split(',') {
                let module = part
                    .trim()
                    .trim_matches(|c| c == '(' || c == ')')
                    .split_whitespace()
                    .next()
                    .unwrap_or("");
                push_import(&mut symbols, module, prefix);
            }
        } else if let Some(caps) = FROM_RE.captures(line) {
            push_import(&mut symbols, &caps[1], prefix);
        } else if let Some(caps) = CONST_RE.captures(line) {
            push_func(&mut symbols, &caps[1]);
        }
    }

    symbols
}

fn push_func(symbols: &mut FileSymbols, name: &str) {
    if !name.starts_with('_') && !symbols.funcs.iter().any(|f| f == name) {
        symbols.funcs.push(name.to_string());
    }
}

fn push_import(symbols: &mut FileSymbols, module: &str, prefix: &str) {
    if !module.is_empty()
        && is_internal(module, prefix)
        && !symbols.imports.iter().any(|i| i == module)
    {
        symbols.imports.push(module.to_string());
    }
}

/// Leading `#` comment or module docstring
fn module_docstring(content: &str) -> String {
    let mut lines = content.lines().map(str::trim).skip_while(|l| l.is_empty() || l.starts_with("#!"));
    let Some(first) = lines.next() else {
        return String::new();
    };
    if let Some(text) = comment_text(first, "#") {
        return extract_first_sentence(text);
    }

    for quote in ["\"\"\"", "'''"] {
        let Some(rest) = first.strip_prefix(quote) else {
            continue;
        };
        if let Some(end) = rest.find(quote) {
            return extract_first_sentence(&rest[..end]);
        }
        let mut body = vec![rest.to_string()];
        for line in lines.by_ref() {
            if let Some(end) = line.find(quote) {
                body.push(line[..end].to_string());
                break;
            }
            body.push(line.to_string());
        }
        let text = body.join(" ");
        return extract_first_sentence(text.trim());
    }
    String::new()
}

fn score_entry_point(path: &str, file: &FileSymbols) -> i32 {
    let mut score = match path {
        "__main__.py" => 140,
        p if p.ends_with("/__main__.py") => 140,
        "main.py" | "src/main.py" => 120,
        "cli.py" | "src/cli.py" => 110,
        p if p == "__init__.py" || p.ends_with("/__init__.py") => 80,
        _ => 0,
    };
    let mut dirs = path.split('/').rev().skip(1);
    if dirs.clone().any(|d| d == "bin") {
        score += 100;
    }
    if dirs.any(|d| d == "scripts") {
        score += 90;
    }
    score += 10 * file
        .funcs
        .iter()
        .filter(|f| *f == "main" || *f == "cli" || f.starts_with("run"))
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
    fn test_parse_python_file() {
        let src = indoc! {r#"
            """Fetch and cache remote feeds.

            More detail here.
            """
            import os, json
            import feedkit.core as core
            from . import util
            from feedkit.net import fetch
            from requests import get

            MAX_ITEMS = 50

            class Feed:
                def inner(self):
                    pass

            class _Hidden:
                pass

            async def run_forever():
                pass

            def _private():
                pass

            def main():
                pass

            def main():
                pass
        "#};
        let symbols = parse_python_file(src, "feedkit");
        assert_eq!(symbols.purpose, "Fetch and cache remote feeds.");
        assert_eq!(symbols.type_names(), vec!["Feed"]);
        assert_eq!(symbols.funcs, vec!["MAX_ITEMS", "run_forever", "main"]);
        assert_eq!(symbols.imports, vec!["feedkit.core", ".", "feedkit.net"]);
    }

    #[test]
    fn test_module_docstring_variants() {
        assert_eq!(module_docstring("#!/usr/bin/env python\n# Tool entry.\n"), "Tool entry.");
        assert_eq!(module_docstring("'''One liner'''\n"), "One liner");
        assert_eq!(module_docstring("\"\"\"\nSpans\nlines.\n\"\"\"\n"), "Spans lines.");
        assert_eq!(module_docstring("import os\n"), "");
    }

    #[test]
    fn test_import_prefix() {
        assert_eq!(import_prefix("feed-kit", "src"), "feed_kit");
        assert_eq!(import_prefix("zope.interface", "x"), "zope");
        assert_eq!(import_prefix("9lives", "pkgs/cats"), "cats");
    }

    #[test]
    fn test_score_entry_point() {
        let empty = FileSymbols::default();
        assert_eq!(score_entry_point("__main__.py", &empty), 140);
        assert_eq!(score_entry_point("pkg/__init__.py", &empty), 80);
        assert_eq!(score_entry_point("bin/tool.py", &empty), 100);
        assert_eq!(score_entry_point("scripts/sync.py", &empty), 90);
        let file = FileSymbols {
            funcs: vec!["main".into(), "run_all".into()],
            ..FileSymbols::default()
        };
        assert_eq!(score_entry_point("cli.py", &file), 130);
    }

    #[test]
    fn test_analyze_uses_pyproject_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("svc/feedkit")).unwrap();
        fs::write(
            root.join("svc/pyproject.toml"),
            "[build-system]\nrequires = []\n\n[project]\nname = \"feedkit\"\n",
        )
        .unwrap();
        fs::write(root.join("svc/feedkit/__init__.py"), "from .core import Feed\n").unwrap();
        fs::write(root.join("svc/feedkit/core.py"), "class Feed:\n    pass\n").unwrap();

        let plan = PackagePlan {
            rel_path: "svc".to_string(),
            abs_path: root.join("svc"),
            files: vec![
                "svc/feedkit/__init__.py".to_string(),
                "svc/feedkit/core.py".to_string(),
            ],
            fingerprint: String::new(),
        };
        let ctx = UnitContext {
            root,
            module_path: "python",
            large_package_files: 10,
        };
        let package = PythonExtractor.analyze(&ctx, &plan).unwrap().unwrap();
        assert_eq!(package.import_path, "feedkit");
        assert_eq!(package.purpose, "Python package feedkit");
        assert_eq!(package.entry_point, "feedkit/__init__.py");
        assert_eq!(package.imports, vec![".core"]);
        assert_eq!(package.exported_types[0].name, "Feed");
    }

    #[test]
    fn test_setup_py_name() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("setup.py"),
            "from setuptools import setup\nsetup(name='legacy-tool', version='1')\n",
        )
        .unwrap();
        assert_eq!(package_name(temp_dir.path()).as_deref(), Some("legacy-tool"));
    }
}
