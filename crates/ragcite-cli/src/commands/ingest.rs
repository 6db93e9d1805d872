//! Ingest command

use crate::app::{IngestArgs, OutputFormat};
use crate::output::{self, Skipped};
use crate::progress::ProgressReporter;
use anyhow::Result;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagEngine, RagError};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file selected for ingestion and the document id it will be stored under
#[derive(Debug)]
struct Source {
    id: String,
    path: PathBuf,
}

pub async fn run(args: IngestArgs, config: Config, format: OutputFormat) -> Result<i32> {
    let sources = collect_sources(&args)?;
    let engine = RagEngine::open(config)?;

    let show_progress = format == OutputFormat::Cli && std::io::stderr().is_terminal();
    let mut progress = ProgressReporter::new(sources.len(), show_progress);
    let mut reports = Vec::with_capacity(sources.len());
    let mut skipped = Vec::new();

    for source in &sources {
        progress.set_message(&source.id);
        let bytes = std::fs::read(&source.path)?;
        match String::from_utf8(bytes) {
            Ok(text) => {
                let source_path = source.path.display().to_string();
                reports.push(engine.ingest(&source.id, &source_path, &text).await?);
            }
            Err(_) => {
                tracing::warn!(path = %source.path.display(), "Skipping non UTF-8 file");
                skipped.push(Skipped {
                    path: source.path.display().to_string(),
                    reason: "not valid UTF-8".to_string(),
                });
            }
        }
        progress.increment();
    }
    progress.finish();
    engine.close();

    print!("{}", output::format_ingest(&reports, &skipped, format));
    Ok(exit_codes::SUCCESS)
}

fn collect_sources(args: &IngestArgs) -> Result<Vec<Source>> {
    if args.id.is_some() && (args.paths.len() != 1 || args.paths[0].is_dir()) {
        return Err(RagError::InvalidInput("--id requires exactly one file".into()).into());
    }

    let extensions: Vec<String> = args
        .ext
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut sources = Vec::new();
    for path in &args.paths {
        if path.is_dir() {
            sources.extend(walk_dir(path, &extensions)?);
        } else if path.is_file() {
            let id = match &args.id {
                Some(id) => id.clone(),
                None => file_name(path)?,
            };
            sources.push(Source {
                id,
                path: path.clone(),
            });
        } else {
            return Err(
                RagError::InvalidInput(format!("no such file or directory: {}", path.display()))
                    .into(),
            );
        }
    }
    Ok(sources)
}

/// Files under `root` with a matching extension, ids relative to `root`
fn walk_dir(root: &Path, extensions: &[String]) -> Result<Vec<Source>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        let relative = entry.path().strip_prefix(root)?;
        let id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        sources.push(Source {
            id,
            path: entry.into_path(),
        });
    }
    Ok(sources)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RagError::InvalidInput(format!("not a file: {}", path.display())).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_dir_ids_are_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("guides")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("guides/b.md"), "beta").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "skip").unwrap();

        let sources = walk_dir(dir.path(), &["txt".to_string(), "md".to_string()]).unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "guides/b.md"]);
    }

    #[test]
    fn test_id_needs_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let args = IngestArgs {
            paths: vec![dir.path().to_path_buf()],
            id: Some("doc".to_string()),
            ext: vec!["txt".to_string()],
        };
        let err = collect_sources(&args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::InvalidInput(_))
        ));
    }
}
