use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    comment_text, extract_first_sentence, read_sources, unit_dir_name, FileSymbols,
    LanguageExtractor, UnitContext, UnitSummary,
};
use crate::errors::Result;
use crate::language::Language;
use crate::model::Package;
use crate::planner::PackagePlan;

static FUNC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:function\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(\))?\s*\{").unwrap()
});
static SOURCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:source|\.)\s+([^\s;#]+)").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExtractor;

impl LanguageExtractor for ShellExtractor {
    fn language(&self) -> Language {
        Language::Shell
    }

    fn analyze(&self, ctx: &UnitContext<'_>, plan: &PackagePlan) -> Result<Option<Package>> {
        let sources = read_sources(ctx.root, plan)?;
        let symbols = sources.iter().map(|s| parse_shell_file(&s.content)).collect();
        let mut summary = UnitSummary::fold(&sources, symbols, score_entry_point);

        let name = unit_dir_name(ctx.root, &plan.rel_path);
        if summary.purpose.is_empty() {
            summary.purpose = format!("Shell scripts in {}", name);
        }
        Ok(Some(summary.into_package(
            name,
            &plan.rel_path,
            ctx.large_package_files,
        )))
    }
}

/// Top-level functions and sourced files of one shell script
pub fn parse_shell_file(content: &str) -> FileSymbols {
    let mut symbols = FileSymbols::default();
    let mut header = true;

    for line in content.lines() {
        let line = line.trim_end();
        if header {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with("#!") {
                continue;
            }
            header = false;
            if let Some(text) = comment_text(trimmed, "#") {
                symbols.purpose = extract_first_sentence(text);
            }
        }

        if line.is_empty() || line.starts_with([' ', '\t', '#']) {
            continue;
        }
        if let Some(caps) = SOURCE_RE.captures(line) {
            let target = caps[1].trim_matches(|c| c == '"' || c == '\'');
            if !target.is_empty() && !symbols.imports.iter().any(|i| i == target) {
                symbols.imports.push(target.to_string());
            }
        } else if let Some(caps) = FUNC_RE.captures(line) {
            let name = &caps[1];
            if !symbols.funcs.iter().any(|f| f == name) {
                symbols.funcs.push(name.to_string());
            }
        }
    }

    symbols
}

fn score_entry_point(path: &str, file: &FileSymbols) -> i32 {
    let mut score = match path {
        "scripts/main.sh" | "scripts/main.bash" => 140,
        "main.sh" | "main.bash" => 130,
        p if p.ends_with("/main.sh") => 110,
        _ => 0,
    };
    let mut dirs = path.split('/').rev().skip(1);
    if dirs.clone().any(|d| d == "bin") {
        score += 120;
    }
    if dirs.any(|d| d == "scripts") {
        score += 100;
    }
    if [".sh", ".bash", ".bats"].iter().any(|ext| path.ends_with(ext)) {
        score += 20;
    }
    score += 10 * file.funcs.iter().filter(|f| *f == "main").count() as i32;
    if !file.funcs.is_empty() {
        score += 5;
    }
    score
}
