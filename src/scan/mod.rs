//! Multi-repository scan pipeline.
//!
//! A fixed-size worker pool consumes a closed queue of repository
//! handles. Each worker loads one repository's state (blocking I/O),
//! walks either the object graph ([`ScanMode::History`] /
//! [`ScanMode::Branches`]) or the working tree ([`ScanMode::Files`]), and
//! emits a [`RepoResult`] on the shared results channel.
//!
//! # Ordering
//! Within one repository, findings follow encounter order (byte offset
//! within each scanned blob, blobs in tree order). There is no ordering
//! guarantee across repositories.
//!
//! # Failure policy
//! A failing worker logs and skips its repository; the run continues and
//! the consumer drains the channel until it closes. Statistics counters
//! are shared atomics.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver};
use tracing::warn;

use crate::git::{ObjectId, RepoSource, RepoState, SourceError, StateError};
use crate::search::{Search, SearchMatch};

mod files;
mod history;
mod stats;

pub use stats::ScanStats;

/// What a worker walks per repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    /// Every commit reachable from every remote branch, plus dangling
    /// commits.
    History,
    /// Branch tips only.
    Branches,
    /// The working tree on disk.
    Files,
}

/// One repository to scan.
#[derive(Clone, Debug)]
pub struct RepoHandle {
    pub org: String,
    pub name: String,
    pub root: PathBuf,
    /// Restrict a files-mode scan to a subdirectory.
    pub sub_path: Option<String>,
}

/// Per-repository scan failure; logged, never propagated across repos.
#[derive(Debug)]
#[non_exhaustive]
pub enum ScanError {
    /// The repository backend could not be opened.
    Open(SourceError),
    /// State loading failed.
    State(StateError),
    /// An object referenced during the walk is missing.
    MissingObject { id: ObjectId },
    /// Filesystem walk failed.
    Walk { detail: String },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(err) => write!(f, "failed to open repository: {err}"),
            Self::State(err) => write!(f, "failed to load repository state: {err}"),
            Self::MissingObject { id } => write!(f, "missing object {id}"),
            Self::Walk { detail } => write!(f, "failed to walk files: {detail}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<SourceError> for ScanError {
    fn from(err: SourceError) -> Self {
        Self::Open(err)
    }
}

impl From<StateError> for ScanError {
    fn from(err: StateError) -> Self {
        Self::State(err)
    }
}

/// A finding produced by a [`Scanner`], identified well enough to be
/// coalesced across commits and branches.
pub trait ScanResult: Clone + Send + 'static {
    /// Identity of the matched content (with context).
    fn match_id(&self) -> String;
    /// Identity of the originating search term.
    fn term_id(&self) -> &str;
}

impl ScanResult for SearchMatch {
    fn match_id(&self) -> String {
        SearchMatch::match_id(self)
    }

    fn term_id(&self) -> &str {
        SearchMatch::term_id(self)
    }
}

/// Per-worker blob/file processor.
///
/// `load` is lazy: implementations that filter by path can skip the read
/// entirely. `id` is the blob id for object-graph scans and `None` for
/// files-mode scans.
pub trait Scanner: Send {
    type Finding: ScanResult;

    fn process(
        &mut self,
        id: Option<&ObjectId>,
        load: &mut dyn FnMut() -> Vec<u8>,
        path: &str,
    ) -> Vec<Self::Finding>;
}

/// The default scanner: runs the shared search engine over each blob.
pub struct SearchScanner {
    engine: Arc<Search>,
}

impl SearchScanner {
    #[must_use]
    pub fn new(engine: Arc<Search>) -> Self {
        Self { engine }
    }
}

impl Scanner for SearchScanner {
    type Finding = SearchMatch;

    fn process(
        &mut self,
        _id: Option<&ObjectId>,
        load: &mut dyn FnMut() -> Vec<u8>,
        path: &str,
    ) -> Vec<SearchMatch> {
        let data = load();
        match self.engine.matches(&data) {
            Ok(results) => results,
            Err(err) => {
                warn!(%err, path, "skipping content with invalid characters");
                Vec::new()
            }
        }
    }
}

/// Where one branch carries a finding.
#[derive(Clone, Debug)]
pub struct BranchHit {
    pub name: String,
    /// Commits that introduced the finding on this branch's history.
    pub first_commits: Vec<ObjectId>,
    /// The most recent commit containing it.
    pub last_commit: ObjectId,
    /// Still present at the branch tip.
    pub on_tip: bool,
}

/// One finding with its location and attribution.
#[derive(Clone, Debug)]
pub struct FoundFinding<T> {
    pub finding: T,
    pub path: String,
    pub branches: Vec<BranchHit>,
    /// Tags pointing at commits that contain the finding.
    pub tags: Vec<String>,
    /// Set when the finding only appears in a commit unreachable from any
    /// branch.
    pub dangling_commit: Option<ObjectId>,
}

/// Everything found in one repository.
#[derive(Clone, Debug)]
pub struct RepoResult<T> {
    pub repo: RepoHandle,
    pub head: Option<ObjectId>,
    pub findings: Vec<FoundFinding<T>>,
}

/// Pipeline configuration.
#[derive(Clone, Copy, Debug)]
pub struct ScanOptions {
    pub mode: ScanMode,
    pub concurrency: usize,
}

impl ScanOptions {
    /// Default worker count.
    pub const DEFAULT_CONCURRENCY: usize = 9;

    #[must_use]
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            concurrency: Self::DEFAULT_CONCURRENCY,
        }
    }
}

/// Runs the worker pool over `repos`.
///
/// `open` supplies each worker's repository backend; `new_scanner` builds
/// one scanner per repository (scanners are not shared, so per-scan
/// buffers need no synchronization). Returns the results channel —
/// which closes when every worker finishes — and the shared statistics.
///
/// Repositories that fail to open, load, or walk are logged and skipped.
pub fn scan_repositories<S, NS, O>(
    repos: Vec<RepoHandle>,
    open: O,
    new_scanner: NS,
    options: ScanOptions,
) -> (Receiver<RepoResult<S::Finding>>, Arc<ScanStats>)
where
    S: Scanner + 'static,
    NS: Fn(&RepoHandle) -> S + Send + Sync + 'static,
    O: Fn(&RepoHandle) -> Result<Box<dyn RepoSource>, SourceError> + Send + Sync + 'static,
{
    let stats = Arc::new(ScanStats::new());

    let (task_sender, task_receiver) = bounded::<RepoHandle>(repos.len().max(1));
    for repo in repos {
        task_sender.send(repo).expect("queue sized to hold all repos");
    }
    drop(task_sender);

    let (result_sender, result_receiver) = unbounded();
    let open = Arc::new(open);
    let new_scanner = Arc::new(new_scanner);

    for _ in 0..options.concurrency.max(1) {
        let tasks = task_receiver.clone();
        let results = result_sender.clone();
        let stats = Arc::clone(&stats);
        let open = Arc::clone(&open);
        let new_scanner = Arc::clone(&new_scanner);
        let mode = options.mode;

        std::thread::spawn(move || {
            for repo in tasks.iter() {
                let mut scanner = new_scanner(&repo);
                match scan_one(&repo, mode, &*open, &mut scanner, &stats) {
                    Ok(result) => {
                        stats.add_repo();
                        if !result.findings.is_empty() && results.send(result).is_err() {
                            // Consumer went away; stop quietly.
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(repo = %repo.root.display(), %err, "skipping repository");
                    }
                }
            }
        });
    }
    drop(result_sender);

    (result_receiver, stats)
}

fn scan_one<S, O>(
    repo: &RepoHandle,
    mode: ScanMode,
    open: &O,
    scanner: &mut S,
    stats: &ScanStats,
) -> Result<RepoResult<S::Finding>, ScanError>
where
    S: Scanner,
    O: Fn(&RepoHandle) -> Result<Box<dyn RepoSource>, SourceError> + ?Sized,
{
    if mode == ScanMode::Files {
        let findings = files::scan_files(&repo.root, repo.sub_path.as_deref(), scanner, stats)?;
        return Ok(RepoResult {
            repo: repo.clone(),
            head: None,
            findings,
        });
    }

    let source = open(repo)?;

    let load_started = Instant::now();
    let state = RepoState::load(source.as_ref())?;
    stats.add_list_files_nanos(load_started.elapsed().as_nanos() as u64);

    let references = source.references()?;
    let head = source.head().ok();

    let findings = history::HistoryScan::new(&state, scanner, stats).run(&references, mode)?;

    Ok(RepoResult {
        repo: repo.clone(),
        head,
        findings,
    })
}
