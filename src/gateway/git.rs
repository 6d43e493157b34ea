//! Git-CLI-backed VCS gateway.
//!
//! Operates on pre-cloned repositories under a base directory
//! (`<base>/<owner>/<repo>`). Port branches are built in throwaway detached
//! worktrees so concurrent jobs never fight over the main checkout.
//!
//! All pushes go to the forward-port remote and carry
//! `--force-with-lease=<ref>:<expected>` preconditions; `--porcelain` output
//! is parsed to report each ref's outcome independently.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{BranchName, ConflictReport, RepoId, Sha};

use super::{
    GatewayError, PortOutcome, RefEdit, RefPush, RefPushOutcome, RefPushResult, VcsGateway,
};

/// Commit identity used for port commits.
const COMMITTER_NAME: &str = "forwardport-bot";
const COMMITTER_EMAIL: &str = "forwardport@localhost";

/// VCS gateway shelling out to the `git` binary.
#[derive(Debug)]
pub struct CliVcs {
    /// Directory containing `<owner>/<repo>` clones.
    base_dir: PathBuf,

    /// Remote name pushes go to (the forward-port namespace, distinct from
    /// the canonical remote).
    fp_remote: String,

    /// Counter for unique worktree names.
    worktree_seq: AtomicU64,
}

impl CliVcs {
    pub fn new(base_dir: impl Into<PathBuf>, fp_remote: impl Into<String>) -> Self {
        CliVcs {
            base_dir: base_dir.into(),
            fp_remote: fp_remote.into(),
            worktree_seq: AtomicU64::new(0),
        }
    }

    fn repo_dir(&self, repo: &RepoId) -> PathBuf {
        self.base_dir.join(&repo.owner).join(&repo.repo)
    }
}

/// Runs git with a non-interactive, identity-pinned environment.
///
/// `GIT_TERMINAL_PROMPT=0` prevents hangs on auth prompts.
fn run_git(dir: &Path, args: &[&str]) -> Result<Output, GatewayError> {
    let output = Command::new("git")
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .args([
            "-c",
            &format!("user.name={}", COMMITTER_NAME),
            "-c",
            &format!("user.email={}", COMMITTER_EMAIL),
        ])
        .args(args)
        .output()?;
    Ok(output)
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Categorizes a failed git invocation.
///
/// Unknown revisions and malformed refs will not fix themselves on retry;
/// everything else (network, remote hung up) is assumed transient.
fn categorize_git_failure(command: &str, stderr: &str) -> GatewayError {
    let lower = stderr.to_lowercase();
    let message = format!("git {} failed: {}", command, stderr.trim());
    if lower.contains("unknown revision")
        || lower.contains("bad revision")
        || lower.contains("not a valid ref")
        || lower.contains("pathspec")
    {
        GatewayError::permanent(message)
    } else {
        GatewayError::transient(message)
    }
}

/// Formats the lease option for one ref edit.
///
/// A `Create` uses an empty expected value, which git takes to mean "the ref
/// must not exist yet".
fn lease_arg(push: &RefPush) -> String {
    let expected = match &push.edit {
        RefEdit::Create { .. } => String::new(),
        RefEdit::Update { expected, .. } | RefEdit::Delete { expected } => {
            expected.as_str().to_string()
        }
    };
    format!("--force-with-lease=refs/heads/{}:{}", push.branch, expected)
}

/// Formats the refspec for one ref edit.
fn refspec_arg(push: &RefPush) -> String {
    match &push.edit {
        RefEdit::Create { new } | RefEdit::Update { new, .. } => {
            format!("{}:refs/heads/{}", new, push.branch)
        }
        RefEdit::Delete { .. } => format!(":refs/heads/{}", push.branch),
    }
}

/// Parses `git push --porcelain` output into per-ref outcomes.
///
/// Porcelain lines look like `<flag>\t<from>:<to>\t<summary>`; a `!` flag
/// marks a rejected ref.
fn parse_porcelain(stdout: &str, edits: &[RefPush]) -> Vec<RefPushResult> {
    let mut results = Vec::with_capacity(edits.len());
    for push in edits {
        let suffix = format!(":refs/heads/{}", push.branch);
        let line = stdout
            .lines()
            .find(|l| l.split('\t').nth(1).is_some_and(|spec| spec.ends_with(&suffix)));
        let outcome = match line {
            Some(l) if l.starts_with('!') => RefPushOutcome::LeaseRejected { actual: None },
            Some(_) => RefPushOutcome::Applied,
            // No porcelain line for the ref: treat as rejected rather than
            // silently assuming success.
            None => RefPushOutcome::LeaseRejected { actual: None },
        };
        results.push(RefPushResult {
            branch: push.branch.clone(),
            outcome,
        });
    }
    results
}

impl VcsGateway for CliVcs {
    async fn fetch(&self, repo: &RepoId, refspecs: &[String]) -> Result<(), GatewayError> {
        let dir = self.repo_dir(repo);
        let mut args = vec!["fetch", "origin"];
        args.extend(refspecs.iter().map(String::as_str));
        let output = run_git(&dir, &args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(categorize_git_failure("fetch", &stderr_of(&output)))
        }
    }

    async fn push(
        &self,
        repo: &RepoId,
        edits: &[RefPush],
    ) -> Result<Vec<RefPushResult>, GatewayError> {
        if edits.is_empty() {
            return Ok(Vec::new());
        }
        let dir = self.repo_dir(repo);

        let mut args: Vec<String> = vec!["push".into(), "--porcelain".into()];
        for push in edits {
            args.push(lease_arg(push));
        }
        args.push(self.fp_remote.clone());
        for push in edits {
            args.push(refspec_arg(push));
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = run_git(&dir, &arg_refs)?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        // git push exits non-zero when any ref is rejected; the porcelain
        // output still describes every ref, so only a missing report is a
        // hard failure.
        if !output.status.success() && stdout.trim().is_empty() {
            return Err(categorize_git_failure("push", &stderr_of(&output)));
        }

        Ok(parse_porcelain(&stdout, edits))
    }

    async fn create_port_branch(
        &self,
        repo: &RepoId,
        source: &Sha,
        target: &BranchName,
    ) -> Result<PortOutcome, GatewayError> {
        let dir = self.repo_dir(repo);
        let seq = self.worktree_seq.fetch_add(1, Ordering::Relaxed);
        let wt = dir.join(".worktrees").join(format!("port-{}", seq));
        let wt_str = wt.to_string_lossy().to_string();

        // Prefer the remote-tracking ref; fall back to a local branch for
        // repositories maintained without a canonical remote.
        let remote_target = format!("origin/{}", target);
        let added = run_git(&dir, &["worktree", "add", "--detach", &wt_str, &remote_target])?;
        if !added.status.success() {
            let added = run_git(
                &dir,
                &["worktree", "add", "--detach", &wt_str, target.as_str()],
            )?;
            if !added.status.success() {
                return Err(categorize_git_failure("worktree add", &stderr_of(&added)));
            }
        }

        let result = cherry_pick_in_worktree(&wt, source);

        // Always drop the worktree, even when the pick failed.
        let removed = run_git(&dir, &["worktree", "remove", "--force", &wt_str])?;
        if !removed.status.success() {
            tracing::warn!(
                worktree = %wt_str,
                stderr = %stderr_of(&removed),
                "failed to remove port worktree"
            );
        }

        result
    }

    async fn rev_list_count(&self, repo: &RepoId, range: &str) -> Result<u64, GatewayError> {
        let dir = self.repo_dir(repo);
        let output = run_git(&dir, &["rev-list", "--count", range])?;
        if !output.status.success() {
            return Err(categorize_git_failure("rev-list", &stderr_of(&output)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse()
            .map_err(|_| GatewayError::permanent(format!("unparsable rev-list count: {}", stdout)))
    }
}

/// Cherry-picks `source` in the worktree, committing conflict markers when the
/// pick does not apply cleanly.
fn cherry_pick_in_worktree(wt: &Path, source: &Sha) -> Result<PortOutcome, GatewayError> {
    let pick = run_git(wt, &["cherry-pick", source.as_str()])?;
    if pick.status.success() {
        let head = rev_parse_head(wt)?;
        return Ok(PortOutcome {
            new_head: head,
            conflict: None,
        });
    }

    let report = ConflictReport::new(
        pick.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&pick.stdout).to_string(),
        stderr_of(&pick),
    );

    // Commit the conflicted state, markers included, so reviewers see exactly
    // what failed to apply.
    let staged = run_git(wt, &["add", "-A"])?;
    if !staged.status.success() {
        return Err(categorize_git_failure("add", &stderr_of(&staged)));
    }
    let message = format!("forward-port of {} (with conflicts)", source.short());
    let committed = run_git(wt, &["commit", "--no-verify", "-m", &message])?;
    if !committed.status.success() {
        return Err(categorize_git_failure("commit", &stderr_of(&committed)));
    }

    let head = rev_parse_head(wt)?;
    Ok(PortOutcome {
        new_head: head,
        conflict: Some(report),
    })
}

fn rev_parse_head(dir: &Path) -> Result<Sha, GatewayError> {
    let output = run_git(dir, &["rev-parse", "HEAD"])?;
    if !output.status.success() {
        return Err(categorize_git_failure("rev-parse", &stderr_of(&output)));
    }
    Ok(Sha::new(
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}
