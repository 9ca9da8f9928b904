//! Frontend utilities for parsing and import expansion.

use std::fs;
use std::path::{Path, PathBuf};

use llang::parser::ast::{Decl, Document};
use llang::parser::Parser;
use rustc_hash::FxHashSet;

use crate::CompileError;

/// Parses llang source and loads every `import` it names.
///
/// A file is loaded at most once per frontend; later imports of the same
/// file resolve to an empty document.
#[derive(Debug, Default)]
pub struct Frontend {
    loaded_files: FxHashSet<PathBuf>,
    import_stack: Vec<PathBuf>,
}

impl Frontend {
    /// Create a new frontend instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read, parse and expand a source file.
    pub fn parse_file(&mut self, path: &Path) -> Result<Document, CompileError> {
        let source = fs::read_to_string(path).map_err(|err| {
            CompileError::Import(format!("failed to read '{}': {}", path.display(), err))
        })?;
        self.parse_source(&source, Some(path))
    }

    /// Parse source and expand its imports relative to `origin_path`.
    pub fn parse_source(
        &mut self,
        source: &str,
        origin_path: Option<&Path>,
    ) -> Result<Document, CompileError> {
        let base_dir = origin_path
            .map(resolve_base_dir)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        // The root takes part in cycle detection when it lives on disk.
        let root = origin_path.and_then(|path| fs::canonicalize(path).ok());
        if let Some(root) = &root {
            self.loaded_files.insert(root.clone());
            self.import_stack.push(root.clone());
        }

        let result = parse_document(source).and_then(|mut document| {
            self.expand_imports(&mut document, &base_dir)?;
            Ok(document)
        });

        if root.is_some() {
            self.import_stack.pop();
        }
        result
    }

    fn expand_imports(
        &mut self,
        document: &mut Document,
        base_dir: &Path,
    ) -> Result<(), CompileError> {
        for item in &mut document.items {
            if let Decl::Import(import) = item {
                let imported = self.load_import(&import.path, base_dir)?;
                import.document = Some(imported);
            }
        }
        Ok(())
    }

    fn load_import(&mut self, import_path: &str, base_dir: &Path) -> Result<Document, CompileError> {
        let resolved = resolve_local_import_path(import_path, base_dir)?;

        if self.import_stack.contains(&resolved) {
            let mut chain = self
                .import_stack
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>();
            chain.push(resolved.display().to_string());
            return Err(CompileError::Import(format!(
                "circular import detected: {}",
                chain.join(" -> ")
            )));
        }

        if self.loaded_files.contains(&resolved) {
            return Ok(Document::default());
        }

        let source = fs::read_to_string(&resolved).map_err(|err| {
            CompileError::Import(format!(
                "failed to read import '{}': {}",
                resolved.display(),
                err
            ))
        })?;

        self.import_stack.push(resolved.clone());
        let result = parse_document(&source)
            .map_err(|err| CompileError::Import(format!("in '{}': {}", resolved.display(), err)))
            .and_then(|mut document| {
                let imported_base_dir = resolve_base_dir(&resolved);
                self.expand_imports(&mut document, &imported_base_dir)?;
                Ok(document)
            });
        self.import_stack.pop();

        let document = result?;
        self.loaded_files.insert(resolved);
        Ok(document)
    }
}

fn parse_document(source: &str) -> Result<Document, CompileError> {
    let tokens = llang::lexer::lex(source)?;
    let mut parser = Parser::new(tokens);
    Ok(parser.parse_document()?)
}

fn resolve_local_import_path(import_path: &str, base_dir: &Path) -> Result<PathBuf, CompileError> {
    let candidate = PathBuf::from(import_path);
    let joined = if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    };
    let normalized = normalize_path(joined);

    if !normalized.exists() {
        return Err(CompileError::Import(format!(
            "import not found: '{}'",
            normalized.display()
        )));
    }

    fs::canonicalize(&normalized).map_err(|err| {
        CompileError::Import(format!(
            "failed to canonicalize import '{}': {}",
            normalized.display(),
            err
        ))
    })
}

fn resolve_base_dir(origin_path: &Path) -> PathBuf {
    if origin_path.as_os_str().is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let absolute_origin = if origin_path.is_absolute() {
        origin_path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(origin_path)
    };

    let normalized = normalize_path(absolute_origin);
    if normalized.is_dir() {
        normalized
    } else {
        normalized
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            _ => normalized.push(component.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_dot_components() {
        let path = normalize_path(PathBuf::from("/a/./b/../c.ll"));
        assert_eq!(path, PathBuf::from("/a/c.ll"));
    }

    #[test]
    fn source_without_imports_is_returned_as_parsed() {
        let mut frontend = Frontend::new();
        let document = frontend
            .parse_source("function main(): i64 { return 0; }", None)
            .unwrap();
        assert_eq!(document.items.len(), 1);
    }
}
