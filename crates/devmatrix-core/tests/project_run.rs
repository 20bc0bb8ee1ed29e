//! Integration tests for whole-project runs: registry, selection, hooks and results.

use std::path::Path;
use std::sync::{Arc, Mutex};

use devmatrix_core::fakes::{MemoryProbe, RecordingShell, SharedBuffer};
use devmatrix_core::{
    DispatchTable, EnvOptions, Environment, Family, LifecycleHook, Logger, MatrixError, OperationKind, Project,
    Registry, Status,
};

fn registry(dir: &Path, names: &[&str]) -> Registry {
    let mut registry = Registry::load_or_default(&dir.join("registry.json")).unwrap();
    for name in names {
        registry.add(&format!("https://github.com/acme/{name}"));
    }
    registry
}

fn env(root: &Path, family: &Family, options: EnvOptions) -> Environment {
    let options = EnvOptions {
        root: Some(root.to_path_buf()),
        ..options
    };
    Environment::resolve(family, &options, Path::new("/"), |_| None)
}

struct Harness {
    project: Project,
    shell: Arc<RecordingShell>,
    buffer: SharedBuffer,
}

fn harness(env: Environment, family: Family, registry: &Registry, cwd: &Path) -> Harness {
    let shell = Arc::new(RecordingShell::new());
    let buffer = SharedBuffer::default();
    let logger = Logger::with_sink(&env.flags, Box::new(buffer.clone()));
    let project = Project::from_registry(env, family, registry, cwd)
        .with_shell(shell.clone())
        .with_probe(Arc::new(MemoryProbe::over_filesystem()))
        .with_logger(logger);
    Harness { project, shell, buffer }
}

// ---- Registry ----

#[test]
fn registry_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = Registry::load_or_default(&dir.path().join("nested").join("registry.json")).unwrap();
    assert!(registry.repositories.is_empty());
    assert!(registry.add("https://github.com/acme/acme-core"));
    assert!(registry.add("git@github.com:acme/acme-types.git"));
    assert!(!registry.add("https://github.com/acme/acme-core"));
    registry.save().unwrap();

    let loaded = Registry::load(registry.path()).unwrap();
    let names: Vec<&str> = loaded.repositories.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["acme-core", "acme-types"]);
}

#[test]
fn missing_registry_aborts_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let env = env(
        dir.path(),
        &family,
        EnvOptions {
            registry: Some(dir.path().join("absent.json")),
            ..Default::default()
        },
    );
    let err = Project::load(env, family).err().unwrap();
    assert!(matches!(err, MatrixError::ConfigurationMissing(_)));
}

#[test]
fn running_inside_a_checkout_narrows_selection() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let registry = registry(dir.path(), &["acme-a", "acme-b", "acme-c"]);
    let env = env(dir.path(), &family, EnvOptions::default());
    let cwd = dir.path().join("acme-b").join("lib");

    let h = harness(env, family, &registry, &cwd);
    let names: Vec<&str> = h.project.repositories().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["acme-b"]);
}

// ---- Running ----

#[tokio::test]
async fn failing_repository_does_not_stop_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let registry = registry(dir.path(), &["acme-a", "acme-b", "acme-c"]);
    let env = env(dir.path(), &family, EnvOptions::default());
    let mut h = harness(env, family, &registry, Path::new("/"));
    h.shell.fail_when("'acme-b'");

    let results = h.project.run(OperationKind::Implode).await;
    let statuses: Vec<Status> = results
        .repositories
        .iter()
        .map(|r| r.primary().unwrap().result.status)
        .collect();
    assert_eq!(statuses, vec![Status::Pass, Status::Fail, Status::Pass]);
    assert!(results.has_failures());
    assert_eq!(h.shell.invocations().len(), 3);
    assert_eq!(h.shell.invocations()[0].working_dir, dir.path().to_path_buf());

    let lines = h.buffer.lines();
    assert_eq!(
        lines,
        vec![
            "[01/03] Deleting acme-a".to_string(),
            "[02/03] Deleting acme-b".to_string(),
            "[03/03] Deleting acme-c".to_string(),
        ]
    );
}

#[tokio::test]
async fn silent_run_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let registry = registry(dir.path(), &["acme-a", "acme-b"]);
    let env = env(
        dir.path(),
        &family,
        EnvOptions {
            silent: Some(true),
            ..Default::default()
        },
    );
    let mut h = harness(env, family, &registry, Path::new("/"));

    let results = h.project.run(OperationKind::Release).await;
    assert_eq!(results.tally().pass, 2);
    assert!(h.buffer.contents().is_empty());
}

#[tokio::test]
async fn pretend_implode_executes_nothing_but_status_still_runs() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let registry = registry(dir.path(), &["acme-a"]);
    let env = env(
        dir.path(),
        &family,
        EnvOptions {
            pretend: Some(true),
            ..Default::default()
        },
    );
    let mut h = harness(env, family, &registry, Path::new("/"));

    let results = h.project.run(OperationKind::Implode).await;
    assert_eq!(results.tally().pass, 1);
    assert!(h.shell.invocations().is_empty());
    assert_eq!(h.buffer.lines(), vec!["[01/01] Deleting acme-a: rm -rf 'acme-a'".to_string()]);

    h.project.run(OperationKind::Status).await;
    assert_eq!(h.shell.command_lines(), vec!["git status".to_string()]);
}

#[tokio::test]
async fn missing_constructor_fails_each_repository() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let registry = registry(dir.path(), &["acme-a", "acme-b"]);
    let env = env(dir.path(), &family, EnvOptions::default());
    let h = harness(env, family, &registry, Path::new("/"));
    let mut project = h.project.with_dispatch(DispatchTable::empty());

    let results = project.run(OperationKind::Spec).await;
    assert_eq!(results.tally().fail, 2);
    let output = results.repositories[0].cells[0].result.output.clone().unwrap();
    assert!(output.contains("unknown operation"));
    assert!(h.shell.invocations().is_empty());
}

// ---- Hooks ----

#[tokio::test]
async fn hooks_run_around_matching_operation_only() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let registry = registry(dir.path(), &["acme-a"]);
    let env = env(dir.path(), &family, EnvOptions::default());
    let h = harness(env, family, &registry, Path::new("/"));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let (before, after, other) = (calls.clone(), calls.clone(), calls.clone());
    let shell = h.shell.clone();
    let mut project = h
        .project
        .add_hook(LifecycleHook::before("broken", OperationKind::Release, |_, _| {
            Err(MatrixError::Shell("boom".to_string()))
        }))
        .add_hook(LifecycleHook::before("before", OperationKind::Release, move |_, repos| {
            before.lock().unwrap().push(format!("before:{}", repos.len()));
            Ok(())
        }))
        .add_hook(LifecycleHook::after("after", OperationKind::Release, move |_, _| {
            after.lock().unwrap().push("after".to_string());
            Ok(())
        }))
        .add_hook(LifecycleHook::before("other", OperationKind::Sync, move |_, _| {
            other.lock().unwrap().push("other".to_string());
            Ok(())
        }));

    let results = project.run(OperationKind::Release).await;
    assert_eq!(results.tally().pass, 1);
    assert_eq!(shell.invocations().len(), 1);
    assert_eq!(*calls.lock().unwrap(), vec!["before:1".to_string(), "after".to_string()]);
}

#[tokio::test]
async fn full_implode_purges_bundle_root() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::datamapper();
    let env = env(dir.path(), &family, EnvOptions::default());
    let bundle_root = env.bundle_root.clone();
    std::fs::create_dir_all(bundle_root.join("1.9.2")).unwrap();
    let registry = registry(dir.path(), &["dm-core"]);

    let mut h = harness(env, family, &registry, Path::new("/"));
    h.project.run(OperationKind::Implode).await;
    assert!(!bundle_root.exists());
}

#[tokio::test]
async fn filtered_implode_keeps_bundle_root() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::datamapper();
    let env = env(
        dir.path(),
        &family,
        EnvOptions {
            include: Some(vec!["dm-core".to_string()]),
            ..Default::default()
        },
    );
    let bundle_root = env.bundle_root.clone();
    std::fs::create_dir_all(&bundle_root).unwrap();
    let registry = registry(dir.path(), &["dm-core", "dm-types"]);

    let mut h = harness(env, family, &registry, Path::new("/"));
    let results = h.project.run(OperationKind::Implode).await;
    assert!(bundle_root.exists());
    assert_eq!(results.repositories.len(), 1);
    assert_eq!(h.shell.command_lines(), vec!["rm -rf 'dm-core'".to_string()]);
}

// ---- Results ----

#[tokio::test]
async fn results_serialize_per_repository() {
    let dir = tempfile::tempdir().unwrap();
    let family = Family::generic();
    let registry = registry(dir.path(), &["acme-a"]);
    let env = env(
        dir.path(),
        &family,
        EnvOptions {
            rubies: Some(vec!["1.9.2".to_string()]),
            ..Default::default()
        },
    );
    let mut h = harness(env, family, &registry, Path::new("/"));

    let results = h.project.run(OperationKind::Release).await;
    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json["operation"], "release");
    assert_eq!(json["repositories"][0]["repository"], "acme-a");
    assert_eq!(json["repositories"][0]["cells"][0]["status"], "pass");
    assert!(json["repositories"][0]["cells"][0].get("ruby").is_none());
    assert_eq!(results.pass_ratio(), Some(1.0));
}
