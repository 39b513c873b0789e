//! Object-graph scan of one repository.
//!
//! Walks every remote branch (and, in history mode, the full ancestry of
//! each plus dangling commits), scanning each blob once. Tree results are
//! memoized by tree id, so unchanged subtrees across thousands of commits
//! cost one scan. Findings are interned by `(path, match-id, term-id)`
//! and attributed to the branches, first/last commits, and tags they
//! appear under.

use std::time::Instant;

use ahash::AHashMap;

use crate::git::refs::is_origin_branch;
use crate::git::{ObjectId, RepoState};
use crate::stdx::KeySet;

use super::stats::ScanStats;
use super::{BranchHit, FoundFinding, ScanError, ScanMode, ScanResult, Scanner};

/// Per-finding propagation state along the commit graph.
#[derive(Clone, Debug)]
struct Propagated {
    /// Commits where the finding first appeared on this walk.
    first: KeySet<ObjectId>,
    /// Most recent commit (toward the tip) still containing it.
    last: ObjectId,
}

/// One interned finding.
struct Record<T> {
    finding: T,
    path: String,
    branches: Vec<BranchHit>,
    tags: Vec<String>,
    dangling: Option<ObjectId>,
}

/// Scans branches (tips only) or full history over loaded state.
pub(super) struct HistoryScan<'a, S: Scanner> {
    state: &'a RepoState,
    scanner: &'a mut S,
    stats: &'a ScanStats,
    records: Vec<Record<S::Finding>>,
    /// `(path, match-id, term-id)` to record index.
    index: AHashMap<(String, String, String), usize>,
    /// Tree id to the records its blobs produced (recursively).
    tree_results: AHashMap<ObjectId, Vec<usize>>,
    /// Commit id to per-record propagation.
    commit_results: AHashMap<ObjectId, AHashMap<usize, Propagated>>,
}

impl<'a, S: Scanner> HistoryScan<'a, S> {
    pub(super) fn new(state: &'a RepoState, scanner: &'a mut S, stats: &'a ScanStats) -> Self {
        Self {
            state,
            scanner,
            stats,
            records: Vec::new(),
            index: AHashMap::new(),
            tree_results: AHashMap::new(),
            commit_results: AHashMap::new(),
        }
    }

    /// Runs the walk and returns the attributed findings.
    pub(super) fn run(
        mut self,
        references: &[crate::git::Ref],
        mode: ScanMode,
    ) -> Result<Vec<FoundFinding<S::Finding>>, ScanError> {
        let recurse = mode == ScanMode::History;
        let mut branch_count = 0u64;

        for reference in references {
            if !is_origin_branch(&reference.name) {
                continue;
            }
            branch_count += 1;

            self.process_commit_chain(reference.target, recurse)?;

            let tip_results = self
                .commit_results
                .get(&reference.target)
                .cloned()
                .unwrap_or_default();
            for (record_index, propagated) in tip_results {
                self.records[record_index].branches.push(BranchHit {
                    name: reference.name.clone(),
                    first_commits: propagated.first.values(),
                    last_commit: propagated.last,
                    on_tip: propagated.last == reference.target,
                });
            }
        }
        self.stats.add_branches(branch_count);

        if recurse {
            let dangling: Vec<ObjectId> = self
                .state
                .commits
                .keys()
                .filter(|id| !self.commit_results.contains_key(id))
                .copied()
                .collect();

            for commit_id in dangling {
                self.process_commit_chain(commit_id, true)?;
                let results = self
                    .commit_results
                    .get(&commit_id)
                    .cloned()
                    .unwrap_or_default();
                for (record_index, propagated) in results {
                    let record = &mut self.records[record_index];
                    if record.dangling.is_none()
                        && propagated.first.len() == 1
                        && propagated.first.contains(&commit_id)
                    {
                        record.dangling = Some(commit_id);
                    }
                }
            }
        }

        Ok(self
            .records
            .into_iter()
            .map(|record| FoundFinding {
                finding: record.finding,
                path: record.path,
                branches: record.branches,
                tags: record.tags,
                dangling_commit: record.dangling,
            })
            .collect())
    }

    /// Processes a commit and (when recursing) its ancestry, parents
    /// first, with an explicit work stack.
    fn process_commit_chain(&mut self, start: ObjectId, recurse: bool) -> Result<(), ScanError> {
        let mut stack = vec![start];

        while let Some(&current) = stack.last() {
            if self.commit_results.contains_key(&current) {
                stack.pop();
                continue;
            }

            let commit = self
                .state
                .commits
                .get(&current)
                .ok_or(ScanError::MissingObject { id: current })?;

            if recurse {
                let mut blocked = false;
                for parent in &commit.parents {
                    if !self.commit_results.contains_key(parent) {
                        stack.push(*parent);
                        blocked = true;
                    }
                }
                if blocked {
                    continue;
                }
            }

            self.process_commit(current, recurse)?;
            stack.pop();
        }

        Ok(())
    }

    fn process_commit(&mut self, commit_id: ObjectId, recurse: bool) -> Result<(), ScanError> {
        let state = self.state;
        let commit = state
            .commits
            .get(&commit_id)
            .ok_or(ScanError::MissingObject { id: commit_id })?;

        let tree_records = self.process_tree(commit.tree, String::new())?;

        let mut propagated: AHashMap<usize, Propagated> = AHashMap::new();
        if recurse {
            for parent in &commit.parents {
                if let Some(parent_results) = self.commit_results.get(parent) {
                    for (&record_index, incoming) in parent_results {
                        propagated
                            .entry(record_index)
                            .and_modify(|existing| {
                                existing.first.extend(incoming.first.iter().copied());
                            })
                            .or_insert_with(|| incoming.clone());
                    }
                }
            }
        }

        let tags_here: Vec<String> = state
            .tags_by_target
            .get(&commit_id)
            .map(|tag_ids| {
                tag_ids
                    .iter()
                    .filter_map(|id| state.tags.get(id).map(|t| t.name.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for record_index in tree_records {
            propagated
                .entry(record_index)
                .and_modify(|existing| existing.last = commit_id)
                .or_insert_with(|| {
                    let mut first = KeySet::new();
                    first.insert(commit_id);
                    Propagated {
                        first,
                        last: commit_id,
                    }
                });

            for tag in &tags_here {
                let tags = &mut self.records[record_index].tags;
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        self.commit_results.insert(commit_id, propagated);
        Ok(())
    }

    /// Scans a tree's blobs (memoized by tree id), descending into
    /// subtrees first.
    fn process_tree(&mut self, tree_id: ObjectId, path: String) -> Result<Vec<usize>, ScanError> {
        if let Some(memoized) = self.tree_results.get(&tree_id) {
            return Ok(memoized.clone());
        }

        let state = self.state;
        let tree = state
            .trees
            .get(&tree_id)
            .ok_or(ScanError::MissingObject { id: tree_id })?;

        let mut found: KeySet<usize> = KeySet::new();

        for entry in &tree.entries {
            if entry.mode.is_tree() {
                let child_path = format!("{path}{}/", entry.name);
                for record_index in self.process_tree(entry.id, child_path)? {
                    found.insert(record_index);
                }
            }
        }

        for entry in &tree.entries {
            if !entry.mode.is_file() {
                continue;
            }
            let current_path = format!("{path}{}", entry.name);

            let blob = state
                .blobs
                .get(&entry.id)
                .ok_or(ScanError::MissingObject { id: entry.id })?;

            let stats = self.stats;
            let mut load_nanos = 0u64;
            let mut loader = || {
                let started = Instant::now();
                let data = blob.data.clone();
                load_nanos = started.elapsed().as_nanos() as u64;
                stats.add_data_load_nanos(load_nanos);
                stats.add_file(data.len() as u64);
                data
            };

            let started = Instant::now();
            let findings = self
                .scanner
                .process(Some(&entry.id), &mut loader, &current_path);
            let elapsed = started.elapsed().as_nanos() as u64;
            self.stats
                .add_query_nanos(elapsed.saturating_sub(load_nanos));

            for finding in findings {
                let key = (
                    current_path.clone(),
                    finding.match_id(),
                    finding.term_id().to_owned(),
                );
                let record_index = match self.index.get(&key) {
                    Some(&existing) => existing,
                    None => {
                        let fresh = self.records.len();
                        self.records.push(Record {
                            finding,
                            path: current_path.clone(),
                            branches: Vec::new(),
                            tags: Vec::new(),
                            dangling: None,
                        });
                        self.index.insert(key, fresh);
                        fresh
                    }
                };
                found.insert(record_index);
            }
        }

        let mut result = found.values();
        result.sort_unstable();
        self.tree_results.insert(tree_id, result.clone());
        Ok(result)
    }
}
