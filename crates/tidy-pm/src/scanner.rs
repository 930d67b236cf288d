//! Source scanning
//!
//! Walks the project sources looking for imported packages that the
//! manifest does not declare yet. Found packages are classified through
//! the optional `deps.json` hint file and added to the manifest with a
//! `"*"` range, ready for the next resolve.

use crossbeam_channel::unbounded;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::manifest::{ManifestError, PackageJson};

/// Directories never scanned.
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "public",
    ".git",
    ".next",
    "dist",
    "build",
    "out",
];

/// Source extensions considered.
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// Hint file classifying scanned packages as prod or dev.
pub const DEPS_HINT_FILE: &str = "deps.json";

/// Errors that can occur during a scan
#[derive(Debug, Error)]
pub enum ScanError {
    /// Walking the tree failed
    #[error("Failed to scan project sources: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest could not be read or written back
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Prod/dev classification hints from `deps.json`.
#[derive(Debug, Default, Deserialize)]
pub struct DepsHint {
    #[serde(default)]
    pub prod: Vec<String>,

    #[serde(default)]
    pub dev: Vec<String>,
}

impl DepsHint {
    /// Load `<root>/deps.json` if present and readable.
    pub fn load(project_root: &Path) -> Self {
        let path = project_root.join(DEPS_HINT_FILE);
        let Ok(data) = std::fs::read(&path) else {
            return Self::default();
        };

        match serde_json::from_slice(&data) {
            Ok(hint) => hint,
            Err(err) => {
                debug!(%err, "ignoring unreadable deps.json");
                Self::default()
            }
        }
    }
}

/// Packages added to the manifest by a scan.
#[derive(Debug, Default, PartialEq)]
pub struct ScanReport {
    pub added: Vec<String>,
    pub added_dev: Vec<String>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.added_dev.is_empty()
    }
}

/// Scan the project and add missing packages to the manifest file.
///
/// Packages listed under `dev` in `deps.json` land in `devDependencies`;
/// everything else lands in `dependencies`. The manifest is rewritten
/// only when something was added, preserving unknown keys.
pub fn scan_and_update(project_root: &Path) -> Result<ScanReport, ScanError> {
    let manifest_path = project_root.join(crate::paths::MANIFEST_FILE);
    let mut manifest = if manifest_path.exists() {
        PackageJson::load(project_root)?
    } else {
        PackageJson::default()
    };

    let found = scan_project(project_root)?;
    let hint = DepsHint::load(project_root);
    let dev_hint: BTreeSet<&str> = hint.dev.iter().map(String::as_str).collect();

    let mut report = ScanReport::default();

    for package in found {
        if manifest.dependencies.contains_key(&package)
            || manifest.dev_dependencies.contains_key(&package)
        {
            continue;
        }

        if dev_hint.contains(package.as_str()) {
            manifest
                .dev_dependencies
                .insert(package.clone(), "*".to_string());
            report.added_dev.push(package);
        } else {
            manifest.dependencies.insert(package.clone(), "*".to_string());
            report.added.push(package);
        }
    }

    if !report.is_empty() {
        manifest.save(project_root)?;
    }

    Ok(report)
}

/// Collect every external package imported by the project sources.
pub fn scan_project(project_root: &Path) -> Result<BTreeSet<String>, ScanError> {
    let files = collect_source_files(project_root)?;

    let (path_tx, path_rx) = unbounded::<PathBuf>();
    let (pkg_tx, pkg_rx) = unbounded::<String>();

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let path_rx = path_rx.clone();
            let pkg_tx = pkg_tx.clone();

            scope.spawn(move || {
                for path in path_rx {
                    let Ok(content) = std::fs::read_to_string(&path) else {
                        continue;
                    };
                    for package in extract_packages(&content) {
                        if pkg_tx.send(package).is_err() {
                            return;
                        }
                    }
                }
            });
        }

        for file in files {
            if path_tx.send(file).is_err() {
                break;
            }
        }
        drop(path_tx);
    });
    drop(pkg_tx);

    Ok(pkg_rx.into_iter().collect())
}

fn collect_source_files(root: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();
    walk(root, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if entry.file_type()?.is_dir() {
            if !IGNORED_DIRS.contains(&name.as_ref()) {
                walk(&path, files)?;
            }
            continue;
        }

        if is_source_file(&name) {
            files.push(path);
        }
    }

    Ok(())
}

fn is_source_file(name: &str) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };

    if SOURCE_EXTENSIONS.contains(&ext) {
        return true;
    }

    // Config files like vite.config.mjs sit outside the usual extensions.
    name.contains(".config.") && matches!(ext, "js" | "ts" | "mjs" | "cjs")
}

fn import_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r#"import\s+.*\s+from\s+["']([^"']+)["']"#).unwrap(),
            Regex::new(r#"import\s+["']([^"']+)["']"#).unwrap(),
            Regex::new(r#"require\(["']([^"']+)["']\)"#).unwrap(),
            Regex::new(r#"import\(["']([^"']+)["']\)"#).unwrap(),
        ]
    })
}

/// Extract external package names from one source file.
fn extract_packages(content: &str) -> BTreeSet<String> {
    let mut packages = BTreeSet::new();

    for pattern in import_patterns() {
        for capture in pattern.captures_iter(content) {
            let Some(specifier) = capture.get(1) else {
                continue;
            };
            let specifier = specifier.as_str();

            if specifier.starts_with('.')
                || specifier.starts_with('/')
                || specifier.starts_with("@/")
                || specifier.starts_with("node:")
            {
                continue;
            }

            if let Some(name) = package_name(specifier) {
                packages.insert(name);
            }
        }
    }

    packages
}

/// Reduce an import specifier to its package name.
///
/// Deep imports are truncated (`lodash/merge` -> `lodash`), scoped
/// packages keep both segments, query strings and fragments are dropped.
fn package_name(specifier: &str) -> Option<String> {
    let specifier = specifier
        .split(['?', '#'])
        .next()
        .unwrap_or(specifier);

    if let Some(rest) = specifier.strip_prefix('@') {
        let mut parts = rest.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        if scope.is_empty() || name.is_empty() {
            return None;
        }
        return Some(format!("@{}/{}", scope, name));
    }

    let name = specifier.split('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_static_imports() {
        let content = r#"
            import React from "react";
            import { useState } from 'react';
            import "./styles.css";
            import utils from "../utils";
        "#;

        let packages = extract_packages(content);
        assert_eq!(packages, BTreeSet::from(["react".to_string()]));
    }

    #[test]
    fn test_extract_require_and_dynamic_import() {
        let content = r#"
            const chalk = require("chalk");
            const lazy = await import("lodash/debounce");
        "#;

        let packages = extract_packages(content);
        assert!(packages.contains("chalk"));
        assert!(packages.contains("lodash"));
    }

    #[test]
    fn test_scoped_packages_keep_scope() {
        let content = r#"import { z } from "@hookform/resolvers/zod";"#;
        let packages = extract_packages(content);
        assert_eq!(
            packages,
            BTreeSet::from(["@hookform/resolvers".to_string()])
        );
    }

    #[test]
    fn test_node_and_alias_specifiers_ignored() {
        let content = r#"
            import fs from "node:fs";
            import config from "@/config";
            import abs from "/abs/path";
        "#;

        assert!(extract_packages(content).is_empty());
    }

    #[test]
    fn test_package_name_strips_query_and_fragment() {
        assert_eq!(package_name("three?module"), Some("three".to_string()));
        assert_eq!(package_name("pkg#frag"), Some("pkg".to_string()));
    }

    #[test]
    fn test_is_source_file() {
        assert!(is_source_file("app.tsx"));
        assert!(is_source_file("index.js"));
        assert!(is_source_file("vite.config.mjs"));
        assert!(!is_source_file("readme.md"));
        assert!(!is_source_file("Makefile"));
    }
}
