//! Structural tests for layer boundary enforcement.
//!
//! These tests scan source files to verify that the domain, application and
//! infra layers only depend inward.

use std::path::{Path, PathBuf};

fn src_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
        .replace('\\', "/")
}

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Read a file and strip comment lines to avoid false positives.
fn read_non_comment_lines(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| {
            let trimmed = l.trim();
            !trimmed.starts_with("//") && !trimmed.starts_with("/*") && !trimmed.starts_with('*')
        })
        .map(String::from)
        .collect()
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Lines of non-test code in `dir` containing any of `patterns`.
fn forbidden_lines(dir: &Path, patterns: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(dir) {
        let rel = relative(&file);
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") {
                continue;
            }
            for pattern in patterns {
                if line.contains(pattern) {
                    violations.push(format!("{rel}:{}: `{pattern}`: {trimmed}", i + 1));
                }
            }
        }
    }
    violations
}

// ── Layer imports ─────────────────────────────────────────────────────────────

#[test]
fn domain_is_pure() {
    let violations = forbidden_lines(
        &src_dir().join("domain"),
        &[
            "crate::application",
            "crate::infra",
            "crate::commands",
            "crate::output",
            "tokio::",
            "reqwest::",
            "std::fs",
            "std::process",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay free of I/O and outer layers:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_does_not_import_outer_layers() {
    let violations = forbidden_lines(
        &src_dir().join("application"),
        &["crate::infra", "crate::commands", "crate::output", "reqwest::"],
    );
    assert!(
        violations.is_empty(),
        "application/ must only depend on domain/ and its own ports:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = forbidden_lines(&src_dir().join("infra"), &["crate::commands", "crate::output"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn output_does_not_reach_into_infra() {
    let violations = forbidden_lines(&src_dir().join("output"), &["crate::infra", "crate::commands"]);
    assert!(
        violations.is_empty(),
        "output/ must not import from infra/ or commands/:\n{}",
        violations.join("\n")
    );
}

// ── Printing ──────────────────────────────────────────────────────────────────

#[test]
fn inner_layers_have_no_print_macros_outside_tests() {
    let mut violations = Vec::new();
    for layer in ["domain", "application", "infra"] {
        violations.extend(forbidden_lines(
            &src_dir().join(layer),
            &["println!", "eprintln!", "print!(", "eprint!("],
        ));
    }
    assert!(
        violations.is_empty(),
        "domain/, application/ and infra/ report through ProgressReporter or tracing:\n{}",
        violations.join("\n")
    );
}

// ── Command handlers ──────────────────────────────────────────────────────────

#[test]
fn command_handlers_accept_app_context() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("commands")) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let has_run = content.contains("pub async fn run(") || content.contains("pub fn run(");
        if has_run && !content.contains("app: &AppContext") {
            violations.push(format!("{}: run() does not accept &AppContext", relative(&file)));
        }
    }
    assert!(
        violations.is_empty(),
        "Command handlers must accept &AppContext:\n{}",
        violations.join("\n")
    );
}

#[test]
fn no_inline_json_branching_in_commands() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("commands")) {
        let rel = relative(&file);
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            if line.contains("json: bool") {
                violations.push(format!("{rel}:{}: found `json: bool` parameter: {line}", i + 1));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Found loose JSON flags in commands/; use app.is_json() instead:\n{}",
        violations.join("\n")
    );
}

#[test]
fn commands_use_standardized_confirmation() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("commands")) {
        let rel = relative(&file);
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            if line.contains("io::stdin()") || line.contains("Confirm::new()") {
                violations.push(format!("{rel}:{}: direct prompt: {line}", i + 1));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Commands must use app.confirm() for user prompts:\n{}",
        violations.join("\n")
    );
}

/// No module-level `#![allow(dead_code)]` in domain/, application/, or infra/.
#[test]
fn no_module_level_dead_code_allows_in_layers() {
    let mut violations = Vec::new();
    for layer in ["domain", "application", "infra"] {
        for file in collect_rs_files(&src_dir().join(layer)) {
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if line.trim() == "#![allow(dead_code)]" {
                    violations.push(format!("{}:{}", relative(&file), i + 1));
                }
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Module-level #![allow(dead_code)] found in architecture layers:\n{}",
        violations.join("\n")
    );
}

#[test]
fn tracker_skips_cfg_test_blocks() {
    let source = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { println!(); }\n}\nfn c() {}\n";
    let mut tracker = CfgTestTracker::new();
    let flags: Vec<bool> = source.lines().map(|l| tracker.process_line(l)).collect();
    assert_eq!(flags, vec![false, true, true, true, false, false]);
}
