//! Writes every artifact of a run as one set.
//!
//! Each artifact is first written to a temporary file in the output
//! directory. Only when all of them are staged are they renamed into place.
//! If anything fails, the files of the run that already landed are removed
//! again, so a run either leaves a complete set or nothing. Existing files
//! are never replaced.

use crate::markdown::render_markdown;
use crate::tabular::{write_comments, write_records};
use insight_engine::Report;
use painpoint_core::{CategoryTable, CommentRecord, CoreError, ExportError, Record};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

/// Everything produced by one run.
#[derive(Debug, Clone, Copy)]
pub struct RunOutput<'a> {
    pub records: &'a [Record],
    pub comments: Option<&'a [CommentRecord]>,
    pub report: &'a Report,
    pub categories: &'a CategoryTable,
}

impl RunOutput<'_> {
    pub fn run_id(&self) -> &str {
        &self.report.metadata.run_id
    }
}

/// Paths of a committed artifact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedRun {
    pub run_id: String,
    pub posts_csv: PathBuf,
    pub comments_csv: Option<PathBuf>,
    pub report_json: PathBuf,
    pub report_markdown: PathBuf,
}

impl ExportedRun {
    pub fn files(&self) -> Vec<&Path> {
        let mut files = vec![self.posts_csv.as_path()];
        if let Some(comments) = &self.comments_csv {
            files.push(comments.as_path());
        }
        files.push(self.report_json.as_path());
        files.push(self.report_markdown.as_path());
        files
    }
}

enum Artifact {
    Posts,
    Comments,
    ReportJson,
    ReportMarkdown,
}

impl Artifact {
    fn file_name(&self, run_id: &str) -> String {
        match self {
            Artifact::Posts => format!("posts_{}.csv", run_id),
            Artifact::Comments => format!("comments_{}.csv", run_id),
            Artifact::ReportJson => format!("report_{}.json", run_id),
            Artifact::ReportMarkdown => format!("report_{}.md", run_id),
        }
    }

    fn write(&self, out: &mut dyn Write, run: &RunOutput<'_>) -> Result<(), CoreError> {
        match self {
            Artifact::Posts => write_records(out, run.records),
            Artifact::Comments => write_comments(out, run.comments.unwrap_or(&[])),
            Artifact::ReportJson => {
                serde_json::to_writer_pretty(&mut *out, run.report)?;
                writeln!(out)?;
                Ok(())
            }
            Artifact::ReportMarkdown => {
                out.write_all(render_markdown(run.report, run.categories).as_bytes())?;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn incomplete(&self, run_id: &str, artifact: &str, reason: impl ToString) -> CoreError {
        ExportError::IncompleteRun {
            run_id: run_id.to_string(),
            artifact: artifact.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    /// Write the posts CSV, the comments CSV (when comments were collected
    /// and there are any), the JSON report and the Markdown report.
    pub fn export(&self, run: RunOutput<'_>) -> Result<ExportedRun, CoreError> {
        let run_id = run.run_id();
        let dir_name = self.output_dir.display().to_string();
        fs::create_dir_all(&self.output_dir).map_err(|e| self.incomplete(run_id, &dir_name, e))?;

        let mut artifacts = vec![Artifact::Posts];
        let with_comments = run.comments.map_or(false, |c| !c.is_empty());
        if with_comments {
            artifacts.push(Artifact::Comments);
        }
        artifacts.push(Artifact::ReportJson);
        artifacts.push(Artifact::ReportMarkdown);

        let mut staged = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let name = artifact.file_name(run_id);
            let file = self
                .stage(artifact, &run)
                .map_err(|e| self.incomplete(run_id, &name, e))?;
            debug!("Staged {} at {}", name, file.path().display());
            staged.push((name, file));
        }

        let mut committed: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (name, file) in staged.into_iter() {
            let target = self.output_dir.join(&name);
            if let Err(e) = file.persist_noclobber(&target) {
                error!("Could not place {}: {}", name, e.error);
                rollback(&committed);
                return Err(self.incomplete(run_id, &name, e.error));
            }
            committed.push(target);
        }

        let mut paths = committed.into_iter();
        let exported = ExportedRun {
            run_id: run_id.to_string(),
            posts_csv: next_path(&mut paths)?,
            comments_csv: if with_comments {
                Some(next_path(&mut paths)?)
            } else {
                None
            },
            report_json: next_path(&mut paths)?,
            report_markdown: next_path(&mut paths)?,
        };
        info!(
            "Wrote {} files for run {} to {}",
            exported.files().len(),
            run_id,
            self.output_dir.display()
        );
        Ok(exported)
    }

    fn stage(&self, artifact: &Artifact, run: &RunOutput<'_>) -> Result<NamedTempFile, CoreError> {
        let file = NamedTempFile::new_in(&self.output_dir)?;
        {
            let mut out = BufWriter::new(file.as_file());
            artifact.write(&mut out, run)?;
            out.flush()?;
        }
        file.as_file().sync_all()?;
        Ok(file)
    }
}

fn next_path(paths: &mut impl Iterator<Item = PathBuf>) -> Result<PathBuf, CoreError> {
    paths.next().ok_or_else(|| CoreError::Internal {
        message: "artifact list and committed files disagree".to_string(),
    })
}

fn rollback(committed: &[PathBuf]) {
    for path in committed {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => error!("Could not remove {}: {}", path.display(), e),
        }
    }
}
