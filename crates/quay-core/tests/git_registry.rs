mod support;

use std::rc::Rc;

use quay_core::error::QuayError;
use quay_core::metrics::DefineMetric;
use quay_core::prelude::*;
use quay_core::registry::{make_git_registry, Registry, RegistrySet};
use tempfile::TempDir;

use support::{baseline_json, ScriptedGitBackend};

const REPO: &str = "https://example.com/ports.git";
const REFERENCE: &str = "main";

struct Fixture {
    _tmp: TempDir,
    ctx: Rc<AppContext>,
    git: Rc<ScriptedGitBackend>,
}

fn fixture() -> Fixture {
    support::init_tracing();
    let tmp = TempDir::new().expect("tempdir should succeed");
    let root = tmp.path().join("root");
    let cache = tmp.path().join("cache");
    std::fs::create_dir_all(&root).unwrap();

    let git = Rc::new(ScriptedGitBackend::new(&tmp.path().join("trees")));
    let ctx = support::make_context(&root, &cache, tmp.path(), git.clone());
    Fixture {
        _tmp: tmp,
        ctx,
        git,
    }
}

/// Persist a lock file pinning `REFERENCE` to `commit`, then reload it so
/// the entry is stale, as at the start of any process.
fn seed_stale_lock(f: &Fixture, commit: &str) {
    std::fs::create_dir_all(f.ctx.lockfile_path().parent().unwrap()).unwrap();
    std::fs::write(
        f.ctx.lockfile_path(),
        format!(r#"{{"{REPO}": {{"{REFERENCE}": {{"commit": "{commit}"}}}}}}"#),
    )
    .unwrap();
    f.ctx.load_lockfile().unwrap();
}

#[test]
fn a_stale_lock_commit_answers_without_fetching() {
    let f = fixture();
    let stale_commit = "a".repeat(40);
    let tree = "1".repeat(40);
    let port_tree = "2".repeat(40);

    seed_stale_lock(&f, &stale_commit);
    f.git.set_versions_tree(
        &stale_commit,
        &tree,
        &[("zlib", &format!(r#"{{"version": "1.0", "git-tree": "{port_tree}"}}"#))],
    );
    f.git.set_tree_file(&port_tree, "port.json", r#"{"name": "zlib", "version": "1.0"}"#);

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        "b".repeat(40),
    );
    assert_eq!(registry.kind(), "git");

    let found = registry
        .get_port(&VersionSpec::new("zlib", Version::new("1.0", 0)))
        .unwrap()
        .unwrap();
    assert_eq!(found.location, format!("git+{REPO}@{port_tree}"));
    assert!(found.path.ends_with(&port_tree));

    // The stale database answered; the reference was never re-fetched.
    assert_eq!(f.git.ref_fetches.get(), 0);
    assert!(f.ctx.lockfile().borrow().entry(REPO, REFERENCE).unwrap().stale);
}

#[test]
fn a_stale_miss_refreshes_and_retries_live() {
    let f = fixture();
    let stale_commit = "a".repeat(40);
    let live_commit = "b".repeat(40);
    let stale_tree = "1".repeat(40);
    let live_tree = "2".repeat(40);
    let old_port_tree = "3".repeat(40);
    let new_port_tree = "4".repeat(40);

    seed_stale_lock(&f, &stale_commit);
    f.git.set_ref(REPO, REFERENCE, &live_commit);
    f.git.set_versions_tree(
        &stale_commit,
        &stale_tree,
        &[("zlib", &format!(r#"{{"version": "1.0", "git-tree": "{old_port_tree}"}}"#))],
    );
    f.git.set_versions_tree(
        &live_commit,
        &live_tree,
        &[(
            "zlib",
            &format!(
                r#"{{"version": "1.0", "git-tree": "{old_port_tree}"}},
                   {{"version": "2.0", "git-tree": "{new_port_tree}"}}"#
            ),
        )],
    );
    f.git.set_tree_file(&new_port_tree, "port.json", r#"{"name": "zlib", "version": "2.0"}"#);

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        "c".repeat(40),
    );

    // 2.0 is not at the stale commit: the registry refreshes and retries.
    let found = registry
        .get_port(&VersionSpec::new("zlib", Version::new("2.0", 0)))
        .unwrap()
        .unwrap();
    assert_eq!(found.location, format!("git+{REPO}@{new_port_tree}"));
    assert_eq!(f.git.ref_fetches.get(), 1);

    let lock = f.ctx.lockfile().borrow();
    let entry = lock.entry(REPO, REFERENCE).unwrap();
    assert_eq!(entry.commit_id, live_commit);
    assert!(!entry.stale);
    drop(lock);

    // Version lists come from the live database, with no further fetch.
    assert_eq!(
        registry.get_all_port_versions("zlib").unwrap(),
        Some(vec![Version::new("1.0", 0), Version::new("2.0", 0)])
    );
    assert_eq!(f.git.ref_fetches.get(), 1);

    // An unknown port at the live commit is a miss, not an error.
    assert!(registry
        .get_port(&VersionSpec::new("curl", Version::new("1.0", 0)))
        .unwrap()
        .is_none());
    assert_eq!(f.git.ref_fetches.get(), 1);
}

#[test]
fn a_missing_lock_entry_is_fetched_fresh() {
    let f = fixture();
    let live_commit = "b".repeat(40);
    let live_tree = "2".repeat(40);
    let port_tree = "5".repeat(40);

    f.git.set_ref(REPO, REFERENCE, &live_commit);
    f.git.set_versions_tree(
        &live_commit,
        &live_tree,
        &[("zlib", &format!(r#"{{"version": "1.0", "git-tree": "{port_tree}"}}"#))],
    );
    f.git.set_tree_file(&port_tree, "port.json", r#"{"name": "zlib", "version": "1.0"}"#);

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        "c".repeat(40),
    );
    registry
        .get_port(&VersionSpec::new("zlib", Version::new("1.0", 0)))
        .unwrap()
        .unwrap();

    // One fetch seeds the lock entry; the fresh entry never re-fetches.
    assert_eq!(f.git.ref_fetches.get(), 1);
    assert!(f.ctx.lockfile().borrow().is_modified());

    registry
        .get_port(&VersionSpec::new("zlib", Version::new("1.0", 0)))
        .unwrap()
        .unwrap();
    assert_eq!(f.git.ref_fetches.get(), 1);
}

#[test]
fn baseline_resolution_retries_show_refresh_then_fetch() {
    let f = fixture();
    let stale_commit = "a".repeat(40);
    let baseline_sha = "e".repeat(40);

    seed_stale_lock(&f, &stale_commit);
    f.git.set_ref(REPO, REFERENCE, &"b".repeat(40));
    // The baseline contents only become visible after the explicit fetch of
    // the baseline commit.
    f.git.reveal_on_fetch(
        &baseline_sha,
        &baseline_sha,
        "versions/baseline.json",
        &baseline_json(&[("zlib", "1.3")]),
    );

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        baseline_sha.clone(),
    );

    assert_eq!(
        registry.get_baseline_version("zlib").unwrap(),
        Some(Version::new("1.3", 0))
    );
    // show failed twice: once stale, once after the reference refresh.
    assert_eq!(f.git.ref_fetches.get(), 1);
    assert_eq!(f.git.object_fetches.get(), 1);
    assert_eq!(
        f.ctx
            .metrics()
            .count(DefineMetric::RegistriesErrorCouldNotFindBaseline),
        0
    );

    // The parsed baseline is memoized.
    assert!(registry.get_baseline_version("curl").unwrap().is_none());
    assert_eq!(f.git.object_fetches.get(), 1);
}

#[test]
fn baseline_resolution_failure_bumps_the_metric() {
    let f = fixture();
    let stale_commit = "a".repeat(40);
    let baseline_sha = "e".repeat(40);

    seed_stale_lock(&f, &stale_commit);
    f.git.set_ref(REPO, REFERENCE, &"b".repeat(40));
    // Nothing reveals the baseline: show fails before and after the
    // refresh, and again after the fetch.

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        baseline_sha,
    );

    let err = registry.get_baseline_version("zlib").unwrap_err();
    assert!(matches!(err, QuayError::CouldNotFindBaseline { .. }));
    assert_eq!(f.git.object_fetches.get(), 1);
    assert_eq!(
        f.ctx
            .metrics()
            .count(DefineMetric::RegistriesErrorCouldNotFindBaseline),
        1
    );

    // The cached failure does not re-run the protocol or re-count.
    let again = registry.get_baseline_version("zlib").unwrap_err();
    assert_eq!(err, again);
    assert_eq!(
        f.ctx
            .metrics()
            .count(DefineMetric::RegistriesErrorCouldNotFindBaseline),
        1
    );
}

#[test]
fn a_non_sha_baseline_identifier_names_the_current_head() {
    let f = fixture();
    let live_commit = "b".repeat(40);
    f.git.set_ref(REPO, REFERENCE, &live_commit);

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        "main".to_string(),
    );

    let err = registry.get_baseline_version("zlib").unwrap_err();
    match err {
        QuayError::GitRegistryMustHaveBaseline { repo, commit } => {
            assert_eq!(repo, REPO);
            assert_eq!(commit, live_commit);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn a_commit_without_a_versions_database_is_reported() {
    let f = fixture();
    let live_commit = "b".repeat(40);
    f.git.set_ref(REPO, REFERENCE, &live_commit);
    // No tree id scripted for (live_commit, "versions").

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        "c".repeat(40),
    );

    let err = registry
        .get_port(&VersionSpec::new("zlib", Version::new("1.0", 0)))
        .unwrap_err();
    assert!(matches!(err, QuayError::NoVersionsAtCommit { .. }));
    assert_eq!(
        f.ctx
            .metrics()
            .count(DefineMetric::RegistriesErrorNoVersionsAtCommit),
        1
    );
}

#[test]
fn offline_enumeration_substitutes_exact_patterns() {
    let f = fixture();
    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        "c".repeat(40),
    );

    let mut names = Vec::new();
    assert!(!registry
        .try_append_all_port_names_no_network(&mut names)
        .unwrap());
    assert!(names.is_empty());

    let set = RegistrySet::new(
        vec![Registry::new(
            vec!["boost-*".to_string(), "openssl".to_string()],
            make_git_registry(
                &f.ctx,
                REPO.to_string(),
                REFERENCE.to_string(),
                "c".repeat(40),
            ),
        )],
        None,
    );
    let names = set.get_all_known_reachable_port_names_no_network().unwrap();
    assert_eq!(names, vec!["openssl"]);
}

#[test]
fn live_enumeration_reads_the_versions_tree() {
    let f = fixture();
    let live_commit = "b".repeat(40);
    let live_tree = "2".repeat(40);
    f.git.set_ref(REPO, REFERENCE, &live_commit);
    f.git.set_versions_tree(
        &live_commit,
        &live_tree,
        &[
            ("zlib", r#"{"version": "1.0", "git-tree": "0000000000000000000000000000000000000000"}"#),
            ("curl", r#"{"version": "8.0", "git-tree": "0000000000000000000000000000000000000000"}"#),
        ],
    );

    let registry = make_git_registry(
        &f.ctx,
        REPO.to_string(),
        REFERENCE.to_string(),
        "c".repeat(40),
    );
    let mut names = Vec::new();
    registry.append_all_port_names(&mut names).unwrap();
    names.sort();
    assert_eq!(names, vec!["curl", "zlib"]);
}
