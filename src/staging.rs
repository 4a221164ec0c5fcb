//! Idempotent archive staging.
//!
//! Archives are listed before anything is written, then only members that
//! are not already present in the destination (compared by file name) are
//! extracted. Every member is written to a temporary file in the destination
//! and renamed into place once complete, so an interrupted or truncated
//! extraction never leaves a placeholder behind. Existing files are never
//! overwritten or deleted.
//!
//! Staging into one destination must not run concurrently with itself; the
//! pipeline gives every archive its own directory.

use crate::constants::{INNER_STAGING_DIR, OUTER_STAGING_DIR, PARTIAL_PREFIX};
use crate::error::{RadolanError, Result};
use crate::filesystem::{archive_stem, file_name_string, is_archive_name, open_maybe_gzip};
use crate::models::NestingMode;
use glob::Pattern;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of staging one archive
#[derive(Debug, Clone, Default)]
pub struct StagingReport {
    /// Needed member files, sorted by file name
    pub members: Vec<PathBuf>,
    /// Members written by this call
    pub extracted: usize,
    /// Members that were already on disk
    pub already_present: usize,
}

impl StagingReport {
    fn absorb(&mut self, other: StagingReport) {
        self.members.extend(other.members);
        self.extracted += other.extracted;
        self.already_present += other.already_present;
    }

    fn sort_members(&mut self) {
        self.members.sort_by_key(|path| file_name_string(path));
    }
}

/// Extraction state of one archive into one destination directory
#[derive(Debug, Clone)]
pub struct ArchiveStaging {
    archive: PathBuf,
    dest_dir: PathBuf,
    pattern: Option<Pattern>,
}

impl ArchiveStaging {
    pub fn new(archive: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            dest_dir: dest_dir.into(),
            pattern: None,
        }
    }

    /// Restrict the needed members to names matching a glob pattern
    pub fn with_pattern(mut self, pattern: Option<&str>) -> Result<Self> {
        self.pattern = pattern
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    RadolanError::configuration(format!("invalid member pattern '{p}': {e}"))
                })
            })
            .transpose()?;
        Ok(self)
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Regular-file members in table-of-contents order, without extracting
    pub fn declared_members(&self) -> Result<Vec<String>> {
        let reader = open_maybe_gzip(&self.archive).map_err(|e| self.unreadable(Vec::new(), e))?;
        let mut archive = tar::Archive::new(reader);
        let mut names = Vec::new();

        let entries = archive
            .entries()
            .map_err(|e| self.unreadable(Vec::new(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| self.unreadable(Vec::new(), e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().map_err(|e| self.unreadable(Vec::new(), e))?;
            names.push(file_name_string(&path));
        }

        Ok(names)
    }

    /// Declared members the caller needs
    pub fn needed_members(&self) -> Result<Vec<String>> {
        Ok(self
            .declared_members()?
            .into_iter()
            .filter(|name| self.is_needed(name))
            .collect())
    }

    /// Member files already in the destination directory
    pub fn present_members(&self) -> Result<HashSet<String>> {
        if !self.dest_dir.exists() {
            return Ok(HashSet::new());
        }

        let mut present = HashSet::new();
        for entry in WalkDir::new(&self.dest_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| RadolanError::Io(e.into()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_file() && !name.starts_with(PARTIAL_PREFIX) {
                present.insert(name);
            }
        }
        Ok(present)
    }

    /// Make sure every needed member is on disk, extracting only missing ones
    pub fn ensure_extracted(&self) -> Result<StagingReport> {
        let needed: BTreeSet<String> = self.needed_members()?.into_iter().collect();
        let present = self.present_members()?;
        let missing: BTreeSet<String> = needed
            .iter()
            .filter(|name| !present.contains(*name))
            .cloned()
            .collect();

        let mut extracted = 0;
        if missing.is_empty() {
            debug!(
                "All {} members of {} already staged",
                needed.len(),
                self.archive.display()
            );
        } else {
            fs::create_dir_all(&self.dest_dir)?;
            extracted = self.extract_members(&missing)?;
            info!(
                "Extracted {} of {} members from {}",
                extracted,
                needed.len(),
                self.archive.display()
            );
        }

        let mut report = StagingReport {
            members: needed.iter().map(|name| self.dest_dir.join(name)).collect(),
            extracted,
            already_present: needed.len() - missing.len(),
        };
        report.sort_members();
        Ok(report)
    }

    fn is_needed(&self, name: &str) -> bool {
        self.pattern
            .as_ref()
            .is_none_or(|pattern| pattern.matches(name))
    }

    fn extract_members(&self, missing: &BTreeSet<String>) -> Result<usize> {
        let reader = open_maybe_gzip(&self.archive)
            .map_err(|e| self.unreadable(missing.iter().cloned().collect(), e))?;
        let mut archive = tar::Archive::new(reader);
        let mut remaining = missing.clone();
        let mut extracted = 0;

        let result: io::Result<()> = (|| {
            for entry in archive.entries()? {
                let mut entry = entry?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = file_name_string(&entry.path()?);
                if !remaining.contains(&name) {
                    continue;
                }

                let mut partial = tempfile::Builder::new()
                    .prefix(PARTIAL_PREFIX)
                    .tempfile_in(&self.dest_dir)?;
                let size = entry.size();
                let copied = io::copy(&mut entry, partial.as_file_mut())?;
                if copied != size {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("member {name} truncated after {copied} of {size} bytes"),
                    ));
                }
                partial
                    .persist_noclobber(self.dest_dir.join(&name))
                    .map_err(|e| e.error)?;

                remaining.remove(&name);
                extracted += 1;
                if remaining.is_empty() {
                    break;
                }
            }
            Ok(())
        })();

        if let Err(e) = result {
            warn!(
                "Extraction of {} stopped after {} members: {}",
                self.archive.display(),
                extracted,
                e
            );
            return Err(self.unreadable(remaining.into_iter().collect(), e));
        }

        if !remaining.is_empty() {
            return Err(RadolanError::extraction(
                &self.archive,
                remaining.into_iter().collect(),
                "declared members were not found during extraction",
            ));
        }

        Ok(extracted)
    }

    fn unreadable(&self, missing_members: Vec<String>, source: io::Error) -> RadolanError {
        RadolanError::extraction(&self.archive, missing_members, source.to_string())
    }
}

/// Stage a single-layer archive and return its member paths sorted by name
pub fn ensure_extracted(
    archive: &Path,
    dest_dir: &Path,
    inner_pattern: Option<&str>,
) -> Result<Vec<PathBuf>> {
    Ok(ArchiveStaging::new(archive, dest_dir)
        .with_pattern(inner_pattern)?
        .ensure_extracted()?
        .members)
}

/// Stage an outer archive of per-period inner archives
///
/// Outer members go to `dest_dir/outer`, the members of each inner archive to
/// `dest_dir/inner/<inner stem>`, so outer and inner names never collide.
pub fn ensure_extracted_nested(
    archive: &Path,
    dest_dir: &Path,
    inner_pattern: Option<&str>,
) -> Result<StagingReport> {
    let outer = ArchiveStaging::new(archive, dest_dir.join(OUTER_STAGING_DIR)).ensure_extracted()?;

    let mut report = StagingReport {
        members: Vec::new(),
        extracted: outer.extracted,
        already_present: outer.already_present,
    };

    for inner_archive in &outer.members {
        let name = file_name_string(inner_archive);
        if !is_archive_name(&name) {
            debug!("Skipping non-archive outer member {}", name);
            continue;
        }

        let inner_dir = dest_dir
            .join(INNER_STAGING_DIR)
            .join(archive_stem(inner_archive));
        let inner = ArchiveStaging::new(inner_archive, inner_dir)
            .with_pattern(inner_pattern)?
            .ensure_extracted()?;
        report.absorb(inner);
    }

    report.sort_members();
    Ok(report)
}

/// Decide whether an archive holds composites or further archives
pub fn detect_nesting(archive: &Path) -> Result<NestingMode> {
    let members = ArchiveStaging::new(archive, PathBuf::new()).declared_members()?;
    let nested = !members.is_empty() && members.iter().all(|name| is_archive_name(name));
    Ok(if nested {
        NestingMode::Nested
    } else {
        NestingMode::Single
    })
}

/// Stage an archive according to the requested nesting mode
pub fn stage_archive(
    archive: &Path,
    dest_dir: &Path,
    inner_pattern: Option<&str>,
    nesting: NestingMode,
) -> Result<StagingReport> {
    let nesting = match nesting {
        NestingMode::Auto => detect_nesting(archive)?,
        explicit => explicit,
    };

    match nesting {
        NestingMode::Nested => ensure_extracted_nested(archive, dest_dir, inner_pattern),
        _ => ArchiveStaging::new(archive, dest_dir)
            .with_pattern(inner_pattern)?
            .ensure_extracted(),
    }
}
