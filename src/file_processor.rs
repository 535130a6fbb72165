//! File discovery and batch cleaning.
//!
//! `docmend clean` without explicit proposals operates on files: the walker
//! here finds Markdown documents under the given paths, and [`clean_file`]
//! pushes each one through the processor pipeline, rewriting it in place
//! when asked to.

use crate::config::Config;
use crate::context::{MARKDOWN_EXTENSIONS, ProcessingContext};
use crate::pipeline::Pipeline;
use crate::utils::{LineEnding, detect_line_ending, normalize_line_ending};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use memmap2::Mmap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Threshold for using memory-mapped I/O (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Errors surfaced while discovering or cleaning files on disk.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}: not valid UTF-8")]
    InvalidUtf8 { path: String },
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Discovery options, normally bridged from CLI flags.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Comma-separated include globs. Overrides config include patterns and
    /// the built-in Markdown extension filter.
    pub include: Option<String>,
    /// Comma-separated exclude globs. Overrides config exclude patterns.
    pub exclude: Option<String>,
    /// Drop every exclude pattern, CLI and config alike.
    pub no_exclude: bool,
    /// Honor `.gitignore` and friends while walking.
    pub respect_gitignore: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            no_exclude: false,
            respect_gitignore: true,
        }
    }
}

/// Expands directory-style patterns to also match files within them.
/// Pattern "dir/path" becomes ["dir/path", "dir/path/**"] so both the
/// directory itself and everything underneath are covered. Patterns that
/// already contain glob characters are returned unchanged.
fn expand_directory_pattern(pattern: &str) -> Vec<String> {
    if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
        return vec![pattern.to_string()];
    }

    let base = pattern.trim_end_matches('/');
    vec![base.to_string(), format!("{base}/**")]
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Compiled exclude patterns, kept alongside their sources so a diagnostic
/// can name the pattern that matched.
struct ExcludeSet {
    set: globset::GlobSet,
    patterns: Vec<String>,
}

impl ExcludeSet {
    fn build(patterns: &[String]) -> Option<Self> {
        if patterns.is_empty() {
            return None;
        }
        let mut builder = globset::GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            match globset::Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                    kept.push(pattern.clone());
                }
                Err(e) => log::warn!("ignoring invalid exclude pattern '{pattern}': {e}"),
            }
        }
        match builder.build() {
            Ok(set) => Some(Self { set, patterns: kept }),
            Err(e) => {
                log::warn!("failed to compile exclude patterns: {e}");
                None
            }
        }
    }

    fn first_match(&self, path: &str) -> Option<&str> {
        self.set.matches(path).first().map(|&i| self.patterns[i].as_str())
    }
}

/// Find the Markdown files to clean under `paths`.
///
/// Empty `paths` (or a bare `.`) means discovery mode: walk the current
/// directory using the config's include patterns, or every known Markdown
/// extension when none are configured. Explicit paths are taken at face
/// value: directories are walked, files are returned as given even when
/// their extension is not a Markdown one. Exclude patterns apply in both
/// modes unless `no_exclude` is set; an explicitly named file that matches
/// one is skipped with a warning.
pub fn find_markdown_files(paths: &[String], opts: &WalkOptions, config: &Config) -> Result<Vec<String>, FileError> {
    let is_discovery_mode = paths.is_empty() || paths == ["."];

    // Include patterns: CLI > config (discovery only) > every Markdown
    // extension (discovery only). Explicit paths need none.
    let include_patterns: Vec<String> = if let Some(cli_include) = opts.include.as_deref() {
        split_patterns(cli_include)
    } else if is_discovery_mode && !config.global.include.is_empty() {
        config.global.include.clone()
    } else if is_discovery_mode {
        MARKDOWN_EXTENSIONS.iter().map(|ext| format!("*.{ext}")).collect()
    } else {
        Vec::new()
    };

    // Exclude patterns: CLI > config, with directory-only patterns expanded
    // to cover their contents. `no_exclude` drops them all.
    let exclude_patterns: Vec<String> = if opts.no_exclude {
        Vec::new()
    } else if let Some(cli_exclude) = opts.exclude.as_deref() {
        split_patterns(cli_exclude)
            .iter()
            .flat_map(|p| expand_directory_pattern(p))
            .collect()
    } else {
        config
            .global
            .exclude
            .iter()
            .flat_map(|p| expand_directory_pattern(p))
            .collect()
    };
    log::debug!("exclude patterns: {exclude_patterns:?}");

    let exclude_set = ExcludeSet::build(&exclude_patterns);

    let mut file_paths: Vec<String> = Vec::new();
    let mut walk_roots: Vec<String> = Vec::new();

    if is_discovery_mode {
        walk_roots.push(".".to_string());
    } else {
        for path_str in paths {
            let path = Path::new(path_str);
            if !path.exists() {
                return Err(FileError::NotFound(path_str.clone()));
            }
            if path.is_file() {
                let cleaned = path_str.strip_prefix("./").unwrap_or(path_str).to_string();
                match exclude_set.as_ref().and_then(|set| set.first_match(&cleaned)) {
                    Some(pattern) => {
                        log::warn!(
                            "skipping {cleaned}: matches exclude pattern '{pattern}' (use --no-exclude to override)"
                        );
                    }
                    None => file_paths.push(cleaned),
                }
            } else {
                walk_roots.push(path_str.clone());
            }
        }
    }

    if !walk_roots.is_empty() {
        let mut walked = walk_directories(&walk_roots, opts, &include_patterns, &exclude_patterns)?;

        if let Some(set) = &exclude_set {
            // Overrides only see paths under their root, so absolute walk
            // roots sidestep them. Filter again here.
            walked.retain(|p| set.first_match(p).is_none());
        }

        // An explicit --include states which files to take. Without one,
        // keep only Markdown extensions regardless of how the override and
        // type filters interacted.
        if opts.include.is_none() {
            walked.retain(|path_str| {
                Path::new(path_str).extension().is_some_and(|ext| {
                    ext.to_str()
                        .is_some_and(|e| MARKDOWN_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                })
            });
        }

        file_paths.append(&mut walked);
    }

    file_paths.sort();
    file_paths.dedup();
    Ok(file_paths)
}

fn walk_directories(
    roots: &[String],
    opts: &WalkOptions,
    include_patterns: &[String],
    exclude_patterns: &[String],
) -> Result<Vec<String>, FileError> {
    let first_root = roots.first().cloned().unwrap_or_else(|| ".".to_string());
    let mut walk_builder = WalkBuilder::new(first_root);
    for root in roots.iter().skip(1) {
        walk_builder.add(root);
    }

    // Let explicit include patterns decide what to take; otherwise restrict
    // the walk to Markdown files up front.
    if opts.include.is_none() {
        let mut types_builder = ignore::types::TypesBuilder::new();
        types_builder.add_defaults();
        for ext in MARKDOWN_EXTENSIONS {
            types_builder.add("markdown", &format!("*.{ext}"))?;
        }
        types_builder.select("markdown");
        walk_builder.types(types_builder.build()?);
    }

    if !include_patterns.is_empty() || !exclude_patterns.is_empty() {
        let mut override_builder = OverrideBuilder::new(Path::new("."));
        for pattern in include_patterns {
            if let Err(e) = override_builder.add(pattern) {
                log::warn!("ignoring invalid include pattern '{pattern}': {e}");
            }
        }
        // Exclude patterns must carry a '!' prefix in override position.
        for pattern in exclude_patterns {
            let rule = if pattern.starts_with('!') {
                pattern.clone()
            } else {
                format!("!{pattern}")
            };
            if let Err(e) = override_builder.add(&rule) {
                log::warn!("ignoring invalid exclude pattern '{pattern}': {e}");
            }
        }
        match override_builder.build() {
            Ok(overrides) => {
                walk_builder.overrides(overrides);
            }
            Err(e) => log::warn!("failed to build path overrides: {e}"),
        }
    }

    let use_gitignore = opts.respect_gitignore;
    walk_builder.ignore(use_gitignore);
    walk_builder.git_ignore(use_gitignore);
    walk_builder.git_global(use_gitignore);
    walk_builder.git_exclude(use_gitignore);
    walk_builder.parents(use_gitignore);
    walk_builder.hidden(false);
    walk_builder.require_git(false);
    walk_builder.add_custom_ignore_filename(".docmendignore");

    let mut found = Vec::new();
    for result in walk_builder.build() {
        match result {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() {
                    let file_path = path.to_string_lossy().to_string();
                    let cleaned = file_path.strip_prefix("./").unwrap_or(&file_path).to_string();
                    found.push(cleaned);
                }
            }
            Err(err) => log::warn!("error walking directory: {err}"),
        }
    }
    Ok(found)
}

/// Efficiently read file content, memory-mapping past [`MMAP_THRESHOLD`].
pub fn read_file_efficiently(path: &Path) -> Result<String, FileError> {
    let metadata = fs::metadata(path).map_err(|e| io_error(path, e))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file = fs::File::open(path).map_err(|e| io_error(path, e))?;
        let mmap = unsafe { Mmap::map(&file).map_err(|e| io_error(path, e))? };
        // Still a copy, but cheaper than buffered reads at this size.
        String::from_utf8(mmap.to_vec()).map_err(|_| FileError::InvalidUtf8 {
            path: path.display().to_string(),
        })
    } else {
        fs::read_to_string(path).map_err(|e| io_error(path, e))
    }
}

fn io_error(path: &Path, source: io::Error) -> FileError {
    FileError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Outcome of cleaning a single file on disk.
#[derive(Debug, Clone)]
pub struct CleanedFile {
    pub path: String,
    /// Whether any pipeline stage changed the text.
    pub changed: bool,
    /// Whether the cleaned text was written back to disk.
    pub written: bool,
    pub warnings: Vec<String>,
    /// Line ending convention of the on-disk file.
    pub line_ending: LineEnding,
    /// Input text, normalized to LF.
    pub original: String,
    /// Cleaned text, normalized to LF.
    pub cleaned: String,
}

/// Clean one file through `pipeline`, honoring per-file disables from
/// `config`. With `write` set, changed files are rewritten in place using
/// their original line endings.
pub fn clean_file(path: &str, pipeline: &Pipeline, config: &Config, write: bool) -> Result<CleanedFile, FileError> {
    let raw = read_file_efficiently(Path::new(path))?;
    let line_ending = detect_line_ending(&raw);
    let text = normalize_line_ending(&raw, LineEnding::Lf);

    let ctx = ProcessingContext::new(path, &text);
    let disabled = config.disabled_for_file(path);
    let outcome = pipeline.run_with_disabled(&text, &ctx, &disabled);

    let mut written = false;
    if write && outcome.modified {
        let to_disk = normalize_line_ending(&outcome.text, line_ending);
        fs::write(path, &to_disk).map_err(|e| io_error(Path::new(path), e))?;
        written = true;
    }

    Ok(CleanedFile {
        path: path.to_string(),
        changed: outcome.modified,
        written,
        warnings: outcome.warnings,
        line_ending,
        original: text,
        cleaned: outcome.text,
    })
}

/// Clean every file in `paths`, in parallel when the `parallel` feature is
/// enabled. Results come back in the same order as `paths`.
pub fn clean_files(
    paths: &[String],
    pipeline: &Pipeline,
    config: &Config,
    write: bool,
) -> Vec<Result<CleanedFile, FileError>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        paths
            .par_iter()
            .map(|path| clean_file(path, pipeline, config, write))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        paths.iter().map(|path| clean_file(path, pipeline, config, write)).collect()
    }
}
