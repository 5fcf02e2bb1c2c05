use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use similar::TextDiff;
use walkdir::WalkDir;

use crate::reformat::{FormatOptions, FormatStats, format_post};

pub const POST_EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatJob {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub format: FormatOptions,
    pub check: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub source: String,
    pub destination: String,
    pub changed: bool,
    pub stats: FormatStats,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FormatBatchReport {
    pub check: bool,
    pub files: Vec<FileOutcome>,
    pub failures: Vec<FileFailure>,
    pub totals: FormatStats,
}

impl FormatBatchReport {
    pub fn changed_files(&self) -> usize {
        self.files.iter().filter(|file| file.changed).count()
    }
}

/// Pair sources with destinations.
///
/// - file -> file, or file -> existing directory (same file name inside it)
/// - directory -> directory: every `.md` file directly inside the source
pub fn plan_jobs(source: &Path, destination: &Path) -> Result<Vec<FormatJob>> {
    if source.is_dir() {
        if destination.exists() && !destination.is_dir() {
            bail!(
                "destination must be a directory when the source is one: {}",
                destination.display()
            );
        }
        let mut jobs = Vec::new();
        for entry in WalkDir::new(source).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("failed to list {}", source.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(POST_EXTENSION)
            {
                continue;
            }
            jobs.push(FormatJob {
                source: path.to_path_buf(),
                destination: destination.join(entry.file_name()),
            });
        }
        jobs.sort_by(|left, right| left.source.cmp(&right.source));
        return Ok(jobs);
    }

    if !source.is_file() {
        bail!("source not found: {}", source.display());
    }
    let destination = if destination.is_dir() {
        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("source has no file name: {}", source.display()))?;
        destination.join(file_name)
    } else {
        destination.to_path_buf()
    };
    Ok(vec![FormatJob {
        source: source.to_path_buf(),
        destination,
    }])
}

/// Format every job. A failing file is recorded and the rest still run.
pub fn run_batch(jobs: &[FormatJob], options: &BatchOptions) -> FormatBatchReport {
    let mut report = FormatBatchReport {
        check: options.check,
        ..FormatBatchReport::default()
    };

    for job in jobs {
        match run_job(job, options) {
            Ok(outcome) => {
                add_stats(&mut report.totals, &outcome.stats);
                report.files.push(outcome);
            }
            Err(err) => report.failures.push(FileFailure {
                source: display_path(&job.source),
                message: format!("{err:#}"),
            }),
        }
    }
    report
}

fn run_job(job: &FormatJob, options: &BatchOptions) -> Result<FileOutcome> {
    let source = fs::read_to_string(&job.source)
        .with_context(|| format!("failed to read {}", job.source.display()))?;
    let formatted = format_post(&source, &options.format)
        .with_context(|| format!("failed to format {}", job.source.display()))?;
    let changed = formatted.text != source;

    let diff = if options.check && changed {
        let old_header = display_path(&job.source);
        let new_header = display_path(&job.destination);
        Some(
            TextDiff::from_lines(source.as_str(), formatted.text.as_str())
                .unified_diff()
                .context_radius(2)
                .header(&old_header, &new_header)
                .to_string(),
        )
    } else {
        None
    };

    if !options.check {
        if let Some(parent) = job
            .destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&job.destination, &formatted.text)
            .with_context(|| format!("failed to write {}", job.destination.display()))?;
    }

    Ok(FileOutcome {
        source: display_path(&job.source),
        destination: display_path(&job.destination),
        changed,
        stats: formatted.stats,
        diff,
    })
}

fn add_stats(totals: &mut FormatStats, stats: &FormatStats) {
    totals.wrapped_lines += stats.wrapped_lines;
    totals.unwrappable_lines += stats.unwrappable_lines;
    totals.code_blocks += stats.code_blocks;
    totals.images += stats.images;
    totals.split_markers += stats.split_markers;
    totals.rewritten_refs += stats.rewritten_refs;
    totals.rewritten_links += stats.rewritten_links;
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
