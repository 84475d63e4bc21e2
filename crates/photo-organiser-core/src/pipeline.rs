//! Run orchestration.
//!
//! A run moves through `Scanning → Resolving → Hashing → Deduplicating →
//! Planning → Copying` and ends in `Done`, `Cancelled` or `Failed`. Every
//! ending produces a report and writes it to the destination root, unless
//! setup failed before a writable destination was established. Per-file
//! failures are recorded on the record and never stop sibling files or the run.

use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::dating::{DateEvidence, DateResolver};
use crate::deduplication::{group_duplicates, DuplicateGroup};
use crate::discovery::discover_images;
use crate::error::{Error, Result};
use crate::labels::LabelExtractor;
use crate::logging::{log_file_error, log_file_skipped};
use crate::metadata::{embed_labels, read_capture_timestamp, EmbeddedLabels};
use crate::placement::{plan_placements, PlacementPlan};
use crate::processing::{execute_with_timeout, fingerprint_file, Fingerprint, Fingerprinter};
use crate::report::{write_report, ReportEntry, RunOutcome, RunReport};
use crate::safety::SafetyManager;
use crate::sidecar::{write_sidecar, SidecarContent};
use crate::types::{ImageFormat, PhotoId, PhotoRecord};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Idle,
    Scanning,
    Resolving,
    Hashing,
    Deduplicating,
    Planning,
    Copying,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Scanning => "scanning",
            RunState::Resolving => "resolving",
            RunState::Hashing => "hashing",
            RunState::Deduplicating => "deduplicating",
            RunState::Planning => "planning",
            RunState::Copying => "copying",
            RunState::Done => "done",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot handed to the progress callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: RunState,

    /// Files finished in the current stage
    pub processed: usize,

    /// Files the current stage will look at
    pub total: usize,

    /// Files copied so far in the run
    pub copied: usize,

    /// Per-file errors so far in the run
    pub errors: usize,
}

/// Called after each file and at every stage change, possibly from several workers at once
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Shared flag that stops a run between files
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run state threaded through the stages
pub struct RunContext {
    stage: RunState,
    total: usize,
    processed: AtomicUsize,
    copied: AtomicUsize,
    errors: AtomicUsize,
    progress: Option<ProgressCallback>,
    cancellation: CancellationToken,
    started: Instant,
}

impl RunContext {
    fn new(progress: Option<ProgressCallback>, cancellation: CancellationToken) -> Self {
        Self {
            stage: RunState::Idle,
            total: 0,
            processed: AtomicUsize::new(0),
            copied: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            progress,
            cancellation,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> RunState {
        self.stage
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn enter(&mut self, stage: RunState, total: usize) {
        debug!("Run state {} -> {} ({} items)", self.stage, stage, total);
        self.stage = stage;
        self.total = total;
        self.processed.store(0, Ordering::SeqCst);
        self.emit(0);
    }

    fn file_done(&self, failed: bool) {
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(processed);
    }

    fn copy_done(&self) {
        self.copied.fetch_add(1, Ordering::Relaxed);
    }

    fn emit(&self, processed: usize) {
        if let Some(callback) = &self.progress {
            callback(&ProgressEvent {
                stage: self.stage,
                processed,
                total: self.total,
                copied: self.copied.load(Ordering::Relaxed),
                errors: self.errors.load(Ordering::Relaxed),
            });
        }
    }
}

/// Result of trying to copy one representative
enum CopyResult {
    /// Copied; labels may still have failed to land
    Copied {
        destination: PathBuf,
        metadata_error: Option<String>,
    },
    Failed(String),
}

/// Main entry point for organising a photo collection
pub struct PhotoOrganiser {
    config: Config,
    safety: SafetyManager,
    resolver: DateResolver,
    labels: LabelExtractor,
    fingerprinter: Arc<dyn Fingerprinter>,
    pool: rayon::ThreadPool,
    progress: Option<ProgressCallback>,
    cancellation: CancellationToken,
}

impl PhotoOrganiser {
    /// Validate the configuration and set up the worker pool
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads())
            .thread_name(|i| format!("organiser-worker-{}", i))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build thread pool: {}", e)))?;

        Ok(Self {
            safety: SafetyManager::new(&config),
            resolver: DateResolver::new(),
            labels: LabelExtractor::new(&config),
            fingerprinter: Arc::from(config.hash_algorithm.fingerprinter()),
            pool,
            progress: None,
            cancellation: CancellationToken::new(),
            config,
        })
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve, label and fingerprint a single file without copying anything
    pub fn inspect(&self, path: &Path, source_root: &Path) -> PhotoRecord {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let mut record = PhotoRecord::new(0, path.to_path_buf(), size);
        self.resolve_record(&mut record, source_root);
        if record.is_ok() {
            self.hash_record(&mut record);
        }
        record
    }

    /// Organise `source_root` into `destination_root`.
    ///
    /// Never returns early without a report: setup failures produce a
    /// `Failed` report, cancellation a `Cancelled` one.
    pub fn run(&self, source_root: &Path, destination_root: &Path) -> RunReport {
        let mut ctx = RunContext::new(self.progress.clone(), self.cancellation.clone());
        info!(
            "Organising '{}' into '{}'",
            source_root.display(),
            destination_root.display()
        );

        let roots = match self.safety.check_roots(source_root, destination_root) {
            Ok(roots) => roots,
            Err(e) => {
                error!("Setup failed: {}", e);
                let report_dir = failure_report_dir(source_root, destination_root);
                return self.finish(&mut ctx, RunReport::failed(e.to_string()), report_dir.as_deref());
            }
        };

        // Scanning
        ctx.enter(RunState::Scanning, 0);
        let scan = match discover_images(&roots.source, roots.nested_destination(), &self.config) {
            Ok(scan) => scan,
            Err(e) => {
                error!("Scan failed: {}", e);
                return self.finish(
                    &mut ctx,
                    RunReport::failed(e.to_string()),
                    Some(roots.destination.as_path()),
                );
            }
        };
        info!("Found {} images", scan.files.len());

        let scan_errors: Vec<ReportEntry> = scan
            .errors
            .into_iter()
            .map(|(path, reason)| ReportEntry::scan_error(path, reason))
            .collect();
        ctx.errors.fetch_add(scan_errors.len(), Ordering::Relaxed);

        let mut records: Vec<PhotoRecord> = scan
            .files
            .into_iter()
            .enumerate()
            .map(|(id, file)| PhotoRecord::new(id, file.path, file.size))
            .collect();

        let scanned = records.len();
        let assemble = |ctx: &mut RunContext,
                        records: &[PhotoRecord],
                        groups: &[DuplicateGroup],
                        copies: &HashMap<PhotoId, PathBuf>,
                        outcome: RunOutcome| {
            let report = build_report(records, groups, copies, scan_errors.clone(), scanned, outcome);
            self.finish(ctx, report, Some(roots.destination.as_path()))
        };

        // Resolving
        ctx.enter(RunState::Resolving, records.len());
        self.pool.install(|| {
            records.par_iter_mut().for_each(|record| {
                if ctx.is_cancelled() {
                    return;
                }
                self.resolve_record(record, &roots.source);
                ctx.file_done(!record.is_ok());
            });
        });
        if ctx.is_cancelled() {
            return assemble(&mut ctx, &records, &[], &HashMap::new(), RunOutcome::Cancelled);
        }

        // Hashing
        let hashable = records.iter().filter(|r| r.is_ok()).count();
        ctx.enter(RunState::Hashing, hashable);
        self.pool.install(|| {
            records
                .par_iter_mut()
                .filter(|record| record.is_ok())
                .for_each(|record| {
                    if ctx.is_cancelled() {
                        return;
                    }
                    self.hash_record(record);
                    ctx.file_done(!record.is_ok());
                });
        });
        if ctx.is_cancelled() {
            return assemble(&mut ctx, &records, &[], &HashMap::new(), RunOutcome::Cancelled);
        }

        // Deduplicating
        ctx.enter(RunState::Deduplicating, hashable);
        let groups = group_duplicates(&records, self.config.similarity_threshold);
        for group in &groups {
            for &member in &group.members {
                records[member].group_id = Some(group.id);
            }
        }

        // Planning
        ctx.enter(RunState::Planning, groups.len());
        let plan = plan_placements(&records, &groups, &roots.destination);
        if ctx.is_cancelled() {
            return assemble(&mut ctx, &records, &groups, &HashMap::new(), RunOutcome::Cancelled);
        }

        // Copying
        ctx.enter(RunState::Copying, plan.len());
        let results = self.copy_planned(&ctx, &records, &plan);

        let mut copies = HashMap::new();
        for (id, result) in results {
            match result {
                CopyResult::Copied {
                    destination,
                    metadata_error,
                } => {
                    records[id].metadata_error = metadata_error;
                    copies.insert(id, destination);
                }
                CopyResult::Failed(reason) => records[id].error = Some(reason),
            }
        }

        let outcome = if ctx.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Done
        };
        assemble(&mut ctx, &records, &groups, &copies, outcome)
    }

    /// Metadata, date and labels for one record
    fn resolve_record(&self, record: &mut PhotoRecord, source_root: &Path) {
        if record.format.may_carry_exif() {
            match read_capture_timestamp(&record.source) {
                Ok(timestamp) => record.metadata_timestamp = timestamp,
                Err(e) => {
                    log_file_skipped(&record.source, "metadata", &e.to_string());
                    record.error = Some(e.to_string());
                }
            }
        }

        // Path-derived facts are still worth reporting for unreadable files
        let (date, confidence) = self.resolver.resolve(&DateEvidence {
            path: &record.source,
            metadata_timestamp: record.metadata_timestamp,
        });
        record.date = date;
        record.confidence = confidence;
        record.event_label = self.labels.event_label(&record.source, source_root);
        record.location_token = self.labels.location_token(&record.source);
    }

    /// Fingerprint one record under the per-file timeout
    fn hash_record(&self, record: &mut PhotoRecord) {
        match self.fingerprint_with_timeout(&record.source) {
            Ok(Some(fingerprint)) => record.fingerprint = Some(fingerprint),
            Ok(None) => debug!(
                "'{}' has no fingerprint and will not be matched against other photos",
                record.source.display()
            ),
            Err(e) => {
                log_file_skipped(&record.source, "fingerprint", &e.to_string());
                record.error = Some(e.to_string());
            }
        }
    }

    fn fingerprint_with_timeout(&self, path: &Path) -> Result<Option<Fingerprint>> {
        let fingerprinter = Arc::clone(&self.fingerprinter);
        let owned = path.to_path_buf();
        let timeout = Duration::from_secs(self.config.hash_timeout_secs);

        execute_with_timeout(path, "Fingerprint", timeout, move || {
            fingerprint_file(&owned, fingerprinter.as_ref())
        })
        .map_err(|e| Error::unreadable(path, e))?
    }

    /// Copy every planned representative, in parallel
    fn copy_planned(
        &self,
        ctx: &RunContext,
        records: &[PhotoRecord],
        plan: &PlacementPlan,
    ) -> Vec<(PhotoId, CopyResult)> {
        let planned: Vec<(PhotoId, &Path)> = plan.iter().collect();

        self.pool.install(|| {
            planned
                .par_iter()
                .filter_map(|&(id, destination)| {
                    if ctx.is_cancelled() {
                        return None;
                    }
                    let record = &records[id];

                    let result = match self.safety.copy_photo(&record.source, destination) {
                        Ok(_) => {
                            ctx.copy_done();
                            CopyResult::Copied {
                                destination: destination.to_path_buf(),
                                metadata_error: self.write_labels(record, destination),
                            }
                        }
                        Err(e) => {
                            log_file_skipped(&record.source, "copy", &e.to_string());
                            CopyResult::Failed(e.to_string())
                        }
                    };

                    ctx.file_done(matches!(result, CopyResult::Failed(_)));
                    Some((id, result))
                })
                .collect()
        })
    }

    /// Embed labels into the copy and write its sidecar.
    ///
    /// Returns the failures, joined, so the report can carry them.
    fn write_labels(&self, record: &PhotoRecord, destination: &Path) -> Option<String> {
        let mut failures = Vec::new();

        if self.config.embed_labels && record.format == ImageFormat::Jpeg {
            let labels = EmbeddedLabels {
                event_label: record.event_label.as_deref(),
                location_token: record.location_token.as_deref(),
            };
            if let Err(e) = embed_labels(destination, &labels) {
                log_file_error(destination, "embed labels", &e);
                failures.push(e.to_string());
            }
        }

        if self.config.write_sidecars {
            if let Err(e) = write_sidecar(destination, &SidecarContent::from_record(record)) {
                log_file_error(destination, "write sidecar", &e);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }

    /// Enter the terminal state matching the report and write it out
    fn finish(
        &self,
        ctx: &mut RunContext,
        mut report: RunReport,
        report_dir: Option<&Path>,
    ) -> RunReport {
        let state = match report.outcome() {
            RunOutcome::Done => RunState::Done,
            RunOutcome::Cancelled => RunState::Cancelled,
            RunOutcome::Failed => RunState::Failed,
        };
        ctx.enter(state, report.entries.len());

        match report_dir {
            Some(dir) => match write_report(&report, dir, &self.config.report_file_name) {
                Ok(path) => report.report_path = Some(path),
                Err(e) => error!("Could not write report into '{}': {}", dir.display(), e),
            },
            None => warn!("No safe destination for the report; it was not written"),
        }

        let elapsed = ctx.started.elapsed();
        info!(
            "Run {} in {:.2?}: {} scanned, {} copied, {} duplicates skipped, {} errors",
            state,
            elapsed,
            report.summary.scanned,
            report.summary.copied,
            report.summary.duplicates_skipped,
            report.summary.errors
        );
        report
    }
}

/// Where a failed setup may still leave its report.
///
/// Only an existing directory that is not the source root qualifies, so a
/// failed run never writes into the source tree.
fn failure_report_dir(source_root: &Path, destination_root: &Path) -> Option<PathBuf> {
    if !destination_root.is_dir() {
        return None;
    }
    let destination = destination_root.canonicalize().ok()?;
    match source_root.canonicalize() {
        Ok(source) if destination == source => None,
        _ => Some(destination),
    }
}

/// One entry per record (plus scan failures), sorted by source path
fn build_report(
    records: &[PhotoRecord],
    groups: &[DuplicateGroup],
    copies: &HashMap<PhotoId, PathBuf>,
    scan_errors: Vec<ReportEntry>,
    scanned: usize,
    outcome: RunOutcome,
) -> RunReport {
    let representatives: HashSet<PhotoId> = groups.iter().map(|g| g.representative).collect();

    let mut entries: Vec<ReportEntry> = records
        .iter()
        .map(|record| {
            ReportEntry::from_record(
                record,
                copies.get(&record.id).cloned(),
                representatives.contains(&record.id),
            )
        })
        .chain(scan_errors)
        .collect();
    entries.sort_by(|a, b| a.source.cmp(&b.source));

    let failure = match outcome {
        RunOutcome::Cancelled => Some(Error::Cancelled.to_string()),
        _ => None,
    };
    RunReport::new(entries, scanned, outcome, failure)
}

impl fmt::Debug for PhotoOrganiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoOrganiser")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Copying.is_terminal());
        assert_eq!(RunState::Deduplicating.to_string(), "deduplicating");
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            similarity_threshold: 100,
            ..Default::default()
        };
        assert!(matches!(
            PhotoOrganiser::new(config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_context_reports_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |event: &ProgressEvent| {
            sink.lock().unwrap().push(event.clone());
        });

        let mut ctx = RunContext::new(Some(callback), CancellationToken::new());
        ctx.enter(RunState::Hashing, 2);
        ctx.file_done(false);
        ctx.file_done(true);

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].stage, RunState::Hashing);
        assert_eq!(events[0].processed, 0);
        assert_eq!(events[2].processed, 2);
        assert_eq!(events[2].total, 2);
        assert_eq!(events[2].errors, 1);
    }

    #[test]
    fn test_missing_source_fails_with_report() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");
        std::fs::create_dir(&destination).unwrap();

        let organiser = PhotoOrganiser::new(Config::default()).unwrap();
        let report = organiser.run(&dir.path().join("missing"), &destination);

        assert_eq!(report.outcome(), RunOutcome::Failed);
        assert!(report.summary.failure.is_some());
        assert_eq!(report.report_path, Some(destination.join("photo_index.json")));
    }
}
