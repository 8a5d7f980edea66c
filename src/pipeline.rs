//! Orchestration (spec §4.8 "State machines", §6 "Updater invocation
//! surface"): wires the Git Worker, Metadata Store Adapter, TUF
//! Verifier, Auth-Chain Walker, Target Comparator, Dependency Recursor
//! and Persistence/LVC together behind three entry points.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::comparator::{self, ComparisonOutcome};
use crate::config_files::{self, RepositoriesJson};
use crate::dependency::{self, VisitContext};
use crate::error::Error;
use crate::event::{AuthRepoRecord, BranchCommitsRecord, CommitsRecord, Event, TargetRepoRecord};
use crate::git::worker;
use crate::handler::HandlerSink;
use crate::persistence::{self, CommitPlan};
use crate::tuf;
use crate::types::{CommitId, ExpectedType, FullName, Outcome, UpdateOptions};
use crate::urls;
use crate::walker;

/// Everything one top-level invocation needs beyond the per-AR
/// arguments already carried by [`UpdateOptions`].
pub struct PipelineContext<'a> {
    pub library_dir: &'a Path,
    pub conf_dir_root: &'a Path,
    pub scratch_root: &'a Path,
    pub sink: &'a dyn HandlerSink,
}

/// Per-target-repository result of one invocation, the same shape the
/// event record's `target_repos` map carries (spec §6).
pub struct TargetSummary {
    pub branch: String,
    pub before_pull: Option<CommitId>,
    pub after_pull: Option<CommitId>,
    pub new: Vec<CommitId>,
    pub unauthenticated: Vec<CommitId>,
}

pub struct RunSummary {
    pub outcome: Outcome,
    pub ar: FullName,
    pub ar_first_commit: CommitId,
    pub lvc_before: Option<CommitId>,
    pub lvc_after: Option<CommitId>,
    pub ar_authenticated: Vec<CommitId>,
    pub targets: HashMap<FullName, TargetSummary>,
    pub dependency_results: Vec<(FullName, Result<(), Error>)>,
}

/// `clone(auth_repo_url, library_dir, expected_type, ...)` (spec §6).
/// Equivalent to `update` against an empty library (R2).
///
/// `expected_type` is accepted at the API surface but has no further
/// effect: `protected/info.json` (checked below, when present, against
/// `name`) only ever declares `{namespace, name}`, nothing that
/// distinguishes a "test" from an "official" repository.
pub fn clone(
    ctx: &PipelineContext,
    auth_repo_url: &str,
    name: &FullName,
    _expected_type: ExpectedType,
    options: &UpdateOptions,
) -> Result<RunSummary, Error> {
    run(ctx, auth_repo_url, name, options, &mut VisitContext::new())
}

/// `update(auth_repo_path, ...)` (spec §6).
pub fn update(
    ctx: &PipelineContext,
    auth_repo_url: &str,
    name: &FullName,
    options: &UpdateOptions,
) -> Result<RunSummary, Error> {
    run(ctx, auth_repo_url, name, options, &mut VisitContext::new())
}

/// `validate(auth_repo_path, from_commit?, ...)` (spec §6): identical
/// pipeline with `options.validate_only` forced on.
pub fn validate(
    ctx: &PipelineContext,
    auth_repo_url: &str,
    name: &FullName,
    options: &UpdateOptions,
) -> Result<RunSummary, Error> {
    let mut options = options.clone();
    options.validate_only = true;
    run(ctx, auth_repo_url, name, &options, &mut VisitContext::new())
}

fn ar_local_path(library_dir: &Path, name: &FullName) -> PathBuf {
    library_dir.join(&name.namespace).join(&name.name)
}

fn lvc_dir(conf_dir_root: &Path, name: &FullName) -> PathBuf {
    conf_dir_root.join(format!("_{}_{}", name.namespace, name.name))
}

/// Runs the full pipeline for one authentication repository, recursing
/// into its dependencies. `visit_ctx` is shared across the whole
/// recursive descent of one top-level invocation. Emits exactly one
/// [`Event`] for this AR, win or lose, once the outcome is known (spec
/// §6 "event record").
fn run(
    ctx: &PipelineContext,
    auth_repo_url: &str,
    name: &FullName,
    options: &UpdateOptions,
    visit_ctx: &mut VisitContext,
) -> Result<RunSummary, Error> {
    visit_ctx.enter(name)?;
    let local_path = ar_local_path(ctx.library_dir, name);
    let conf_dir = lvc_dir(ctx.conf_dir_root, name);

    // Read once, before `run_one` can possibly advance it (`run_one` may
    // write a new LVC on success), so the event records the state as it
    // was at the start of this invocation rather than after.
    let lvc_before = persistence::read_lvc(&conf_dir);
    let result = match lvc_before {
        Ok(lvc_before) => run_one(
            ctx,
            auth_repo_url,
            name,
            options,
            visit_ctx,
            &local_path,
            &conf_dir,
            lvc_before.clone(),
        )
        .map(|summary| (lvc_before, summary)),
        Err(e) => Err(e),
    };
    visit_ctx.leave(name);

    let (lvc_before, result) = match result {
        Ok((lvc_before, summary)) => (lvc_before, Ok(summary)),
        Err(e) => (None, Err(e)),
    };
    let event = build_event(name, auth_repo_url, &local_path, lvc_before, &result);
    ctx.sink.handle(&event);

    result
}

fn build_event(
    name: &FullName,
    auth_repo_url: &str,
    local_path: &Path,
    lvc_before: Option<CommitId>,
    result: &Result<RunSummary, Error>,
) -> Event {
    let (outcome, ar_new, ar_after, target_repos, error_msg) = match result {
        Ok(summary) => {
            let target_repos = summary
                .targets
                .iter()
                .map(|(tr_name, t)| {
                    let branch_record = BranchCommitsRecord {
                        before_pull: t.before_pull.clone(),
                        after_pull: t.after_pull.clone(),
                        new: t.new.clone(),
                        unauthenticated: t.unauthenticated.clone(),
                    };
                    (
                        tr_name.to_string(),
                        TargetRepoRecord {
                            commits_by_branch: HashMap::from([(t.branch.clone(), branch_record)]),
                        },
                    )
                })
                .collect();
            (
                summary.outcome,
                summary.ar_authenticated.clone(),
                summary.lvc_after.clone(),
                target_repos,
                None,
            )
        }
        Err(e) => (Outcome::Failed, Vec::new(), None, HashMap::new(), Some(e.to_string())),
    };

    Event {
        event: outcome,
        auth_repo: AuthRepoRecord {
            name: name.clone(),
            path: local_path.display().to_string(),
            urls: vec![auth_repo_url.to_string()],
            commits: CommitsRecord {
                before_pull: lvc_before,
                new: ar_new,
                after_pull: ar_after,
            },
        },
        target_repos,
        error_msg,
    }
}

#[allow(clippy::too_many_arguments)]
fn run_one(
    ctx: &PipelineContext,
    auth_repo_url: &str,
    name: &FullName,
    options: &UpdateOptions,
    visit_ctx: &mut VisitContext,
    local_path: &Path,
    conf_dir: &Path,
    lvc_before: Option<CommitId>,
) -> Result<RunSummary, Error> {
    let scratch_dir = ctx
        .scratch_root
        .join(format!("{}-{}-ar", name.namespace, name.name));

    let outcome = run_inner(
        ctx,
        auth_repo_url,
        name,
        options,
        visit_ctx,
        local_path,
        conf_dir,
        lvc_before,
        &scratch_dir,
    );
    persistence::cleanup_scratch(&scratch_dir);
    outcome
}

#[allow(clippy::too_many_arguments)]
fn run_inner(
    ctx: &PipelineContext,
    auth_repo_url: &str,
    name: &FullName,
    options: &UpdateOptions,
    visit_ctx: &mut VisitContext,
    local_path: &Path,
    conf_dir: &Path,
    lvc_before: Option<CommitId>,
    scratch_dir: &Path,
) -> Result<RunSummary, Error> {
    info!("fetching auth repo {name} from {auth_repo_url}");
    let ar_handle = worker::fetch_bare(auth_repo_url, scratch_dir)?;
    let default_branch = "main";
    let remote_head: CommitId = worker::top_of_branch(&ar_handle, default_branch)?.parse()?;

    let should_cancel = || false;
    let mut walk_result = walker::walk(
        &ar_handle,
        default_branch,
        &remote_head,
        lvc_before.as_ref(),
        options.out_of_band.as_ref(),
        &should_cancel,
    )?;

    if let Some((bad_commit, err)) = walk_result.first_bad.take() {
        warn!("verification of {name} failed at {bad_commit}: {err}");
        if walk_result.authenticated.is_empty() {
            return Err(Error::Metadata(err));
        }
    }

    visit_ctx.pin(name, &walk_result.first_commit)?;

    let last_good = walk_result.last_good.clone();
    let mut authenticated_so_far: Vec<CommitId> = lvc_before.iter().cloned().collect();
    authenticated_so_far.extend(walk_result.authenticated.iter().cloned());
    if authenticated_so_far.is_empty() {
        authenticated_so_far.push(last_good.clone());
    }
    let ar_commit_positions: HashMap<CommitId, usize> = authenticated_so_far
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, c)| (c, i))
        .collect();

    let last_good_state = walk_result
        .states
        .get(&last_good)
        .ok_or_else(|| Error::MalformedConfig {
            file: "<auth repo>".to_string(),
            reason: "no verified TUF state at the last validated commit".to_string(),
        })?;

    let repos_bytes = worker::read_blob(&ar_handle, last_good.as_str(), "targets/repositories.json")?
        .ok_or_else(|| Error::MalformedConfig {
            file: "repositories.json".to_string(),
            reason: "missing at validated commit".to_string(),
        })?;
    tuf::verify_target_bytes(last_good_state, "repositories.json", &repos_bytes)?;
    let repositories: RepositoriesJson = config_files::parse_repositories(&repos_bytes)?;

    let mirrors_bytes = worker::read_blob(&ar_handle, last_good.as_str(), "targets/mirrors.json")?
        .ok_or_else(|| Error::NoMirrors(name.to_string()))?;
    tuf::verify_target_bytes(last_good_state, "mirrors.json", &mirrors_bytes)?;
    let mirrors = config_files::parse_mirrors(&mirrors_bytes)?;

    check_protected_info(&ar_handle, last_good.as_str(), last_good_state, name)?;

    // Declaration order, not HashMap iteration order: breadth-first
    // cross-TR comparison attributes a failure to the lowest-indexed TR
    // in `repositories.json` on a tie (spec §4.5 rule 6 / §5).
    let tr_order: Vec<FullName> = repositories
        .repositories
        .keys()
        .map(|s| s.parse())
        .collect::<Result<_, Error>>()?;

    let mut targets = HashMap::new();
    let mut failures: HashMap<FullName, (CommitId, Error)> = HashMap::new();

    for tr_name in &tr_order {
        if urls::matches_any_glob(&options.exclude_target_globs, tr_name) {
            continue;
        }

        let expected = comparator::build_expected_sequence(
            &ar_handle,
            &authenticated_so_far,
            &walk_result.states,
            tr_name,
        )?;
        if expected.is_empty() {
            // No commit file was ever published for this TR at any
            // authenticated commit: nothing to check yet (spec §9 Open
            // Question, resolved "ignored" in DESIGN.md).
            continue;
        }
        let branch = expected[0].branch.clone();

        let tr_path = ar_local_path(ctx.library_dir, tr_name);
        let before_pull = worker::local_head(&tr_path)
            .map(|s| s.parse())
            .transpose()?;

        let tr_scratch = ctx
            .scratch_root
            .join(format!("{}-{}-tr", tr_name.namespace, tr_name.name));
        let tr_handle = comparator::fetch_target_mirror(&tr_scratch, &mirrors.mirrors, tr_name)?;
        let compare_result = comparator::compare(&tr_handle, &branch, &expected, options);
        persistence::cleanup_scratch(&tr_scratch);

        match compare_result {
            Ok(ComparisonOutcome::Authorized(check)) => {
                info!("target {tr_name} authorized through {}", check.advance_to);
                targets.insert(
                    tr_name.clone(),
                    TargetSummary {
                        branch,
                        before_pull,
                        after_pull: Some(check.advance_to),
                        new: check.new,
                        unauthenticated: check.unauthenticated,
                    },
                );
            }
            Ok(ComparisonOutcome::NoAuthorizedHistory) => {}
            Err((ar_commit, e)) => {
                warn!("target {tr_name} diverged at auth commit {ar_commit}: {e}");
                failures.insert(tr_name.clone(), (ar_commit, e));
            }
        }
    }

    if !failures.is_empty() {
        let min_pos = failures
            .values()
            .map(|(c, _)| ar_commit_positions.get(c).copied().unwrap_or(usize::MAX))
            .min()
            .expect("failures is non-empty");
        let tied: HashMap<FullName, ()> = failures
            .iter()
            .filter(|(_, (c, _))| ar_commit_positions.get(c).copied().unwrap_or(usize::MAX) == min_pos)
            .map(|(n, _)| (n.clone(), ()))
            .collect();
        let attributed = comparator::attribute_first_divergence(&tr_order, &tied)
            .cloned()
            .expect("tied is drawn from failures, and every failing TR is in tr_order");
        let (_, err) = failures
            .remove(&attributed)
            .expect("attributed came from failures' own keys");
        return Err(err);
    }

    // C6: recurse into each dependency's own authentication repository,
    // reusing this AR's own mirror templates to resolve its URL (spec
    // §6 "URL template resolution" is generic over any repo name).
    let mut dependency_results = Vec::new();
    for edge in dependency::read_dependencies(&ar_handle, last_good.as_str(), last_good_state)? {
        if visit_ctx.already_pinned(&edge.name) {
            dependency_results.push((edge.name.clone(), Ok(())));
            continue;
        }

        info!("entering dependency {} of {name}", edge.name);

        let child_urls = urls::resolve_urls(&mirrors.mirrors, &edge.name);
        let mut child_options = options.clone();
        child_options.out_of_band = edge.out_of_band_authentication.clone();

        let outcome = urls::first_success(&child_urls, |url| {
            run(ctx, url, &edge.name, &child_options, visit_ctx)
        })
        .map(|_| ())
        .map_err(|errors| {
            errors
                .into_iter()
                .last()
                .map(|(_, e)| e)
                .unwrap_or_else(|| Error::NoMirrors(edge.name.to_string()))
        });
        dependency_results.push((edge.name.clone(), outcome));
    }

    let changed = !walk_result.cancelled && lvc_before.as_ref() != Some(&last_good);

    let commit_plan = CommitPlan {
        conf_dir,
        new_lvc: last_good.clone(),
        validate_only: options.validate_only,
    };
    persistence::commit(commit_plan, || {
        worker::ensure_working_copy(auth_repo_url, local_path, last_good.as_str(), options.forced)?;
        for (tr_name, summary) in &targets {
            if let Some(after) = &summary.after_pull {
                let tr_path = ar_local_path(ctx.library_dir, tr_name);
                let resolved = urls::resolve_urls(&mirrors.mirrors, tr_name);
                if let Some(url) = resolved.first() {
                    worker::ensure_working_copy(url, &tr_path, after.as_str(), options.forced)?;
                }
            }
        }
        Ok(())
    })?;

    if !options.validate_only {
        std::fs::create_dir_all(conf_dir)?;
        info!("LVC for {name} advanced to {last_good}");
    }

    let outcome = if walk_result.cancelled {
        Outcome::Cancelled
    } else if changed {
        Outcome::Changed
    } else {
        Outcome::Unchanged
    };

    Ok(RunSummary {
        outcome,
        ar: name.clone(),
        ar_first_commit: walk_result.first_commit,
        lvc_before,
        lvc_after: Some(last_good),
        ar_authenticated: walk_result.authenticated,
        targets,
        dependency_results,
    })
}

/// Rule out that this authentication repository's own tracked identity
/// disagrees with the name it's being cloned/updated as. `protected/
/// info.json` is optional (spec §9 Open Question pattern: absent means
/// not checked, same treatment as an absent per-target commit file).
fn check_protected_info(
    ar_handle: &crate::git::BareHandle,
    commit: &str,
    state: &tuf::TufState,
    name: &FullName,
) -> Result<(), Error> {
    let Some(bytes) = worker::read_blob(ar_handle, commit, "targets/protected/info.json")? else {
        return Ok(());
    };
    tuf::verify_target_bytes(state, "protected/info.json", &bytes)?;
    let info = config_files::parse_protected_info(&bytes)?;
    if info.namespace != name.namespace || info.name != name.name {
        return Err(Error::MalformedConfig {
            file: "protected/info.json".to_string(),
            reason: format!(
                "declares identity {}/{}, but was cloned/updated as {name}",
                info.namespace, info.name
            ),
        });
    }
    Ok(())
}
