//! Integration tests for spec runs over the interpreter x adapter matrix.

use std::path::Path;

use devmatrix_core::command::spec;
use devmatrix_core::fakes::{MemoryProbe, RecordingShell, SharedBuffer};
use devmatrix_core::{
    Cell, CellResult, EnvOptions, Environment, Family, Logger, OutputMode, Repository, RunContext,
    SkipReason, Status,
};

struct Fixture {
    root: tempfile::TempDir,
}

impl Fixture {
    /// Checkout with a Gemfile and a lock file per interpreter version.
    fn new(name: &str, rubies: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let repo = root.path().join(name);
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("Gemfile"), "gem 'rspec'\n").unwrap();
        for ruby in rubies {
            std::fs::write(repo.join(format!("Gemfile.{ruby}")), "gem 'rspec'\n").unwrap();
            std::fs::write(repo.join(format!("Gemfile.{ruby}.lock")), "").unwrap();
        }
        Self { root }
    }

    fn repo(&self, name: &str) -> Repository {
        Repository::new(self.root.path(), name, format!("https://github.com/datamapper/{name}"))
    }

    fn env(&self, options: EnvOptions) -> Environment {
        let options = EnvOptions {
            root: Some(self.root.path().to_path_buf()),
            ..options
        };
        Environment::resolve(&Family::generic(), &options, Path::new("/"), |_| None)
    }
}

fn strings(items: &[&str]) -> Option<Vec<String>> {
    Some(items.iter().map(|s| s.to_string()).collect())
}

fn matrix(rubies: &[&str], adapters: &[&str]) -> EnvOptions {
    EnvOptions {
        rubies: strings(rubies),
        adapters: strings(adapters),
        ..Default::default()
    }
}

async fn run_spec(
    repo: &Repository,
    env: &Environment,
    shell: &RecordingShell,
    probe: &MemoryProbe,
) -> (Vec<CellResult>, SharedBuffer) {
    let family = Family::generic();
    let buffer = SharedBuffer::default();
    let mut logger = Logger::with_sink(&env.flags, Box::new(buffer.clone()));
    logger.reset(1);
    logger.advance();
    let command = spec::build(repo, env, &family, probe);
    let mut ctx = RunContext {
        env,
        family: &family,
        shell,
        probe,
        logger: &mut logger,
    };
    let results = command.run(&mut ctx).await;
    (results, buffer)
}

fn spec_lines(shell: &RecordingShell) -> Vec<String> {
    shell
        .command_lines()
        .into_iter()
        .filter(|line| line.contains("rake spec"))
        .collect()
}

// ---- Ordering ----

#[tokio::test]
async fn results_follow_version_outer_adapter_inner_order() {
    let fx = Fixture::new("dm-core", &["1.8.7", "1.9.2"]);
    let env = fx.env(matrix(&["1.8.7", "1.9.2"], &["sqlite", "yaml"]));
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (results, _) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    let cells: Vec<Cell> = results.iter().map(|r| r.cell.clone()).collect();
    assert_eq!(
        cells,
        vec![
            Cell::matrix("1.8.7", "sqlite"),
            Cell::matrix("1.8.7", "yaml"),
            Cell::matrix("1.9.2", "sqlite"),
            Cell::matrix("1.9.2", "yaml"),
        ]
    );
    assert!(results.iter().all(|r| r.result.status == Status::Pass));
    assert_eq!(spec_lines(&shell).len(), 4);
}

#[tokio::test]
async fn adapter_named_repository_only_runs_its_adapter() {
    let fx = Fixture::new("dm-postgres-adapter", &["1.9.2"]);
    let env = fx.env(matrix(&["1.9.2"], &["in_memory", "yaml", "sqlite", "postgres", "mysql"]));
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (results, _) = run_spec(&fx.repo("dm-postgres-adapter"), &env, &shell, &probe).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].cell, Cell::matrix("1.9.2", "postgres"));
}

// ---- Subprocess environment ----

#[tokio::test]
async fn each_cell_embeds_bundle_adapter_and_timezone() {
    let fx = Fixture::new("dm-core", &["1.9.2"]);
    let env = fx.env(matrix(&["1.9.2"], &["sqlite"]));
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    let bundle_path = fx.root.path().join(".bundle_root").join("1.9.2");
    let expected = format!(
        "rvm 1.9.2 exec bash -c \"BUNDLE_PATH='{}' BUNDLE_GEMFILE='Gemfile.1.9.2' ADAPTER='sqlite' TZ='utc' bundle exec rake spec\"",
        bundle_path.display()
    );
    assert_eq!(spec_lines(&shell), vec![expected]);

    let calls = shell.invocations();
    assert_eq!(calls[0].working_dir, fx.root.path().join("dm-core"));
    assert_eq!(calls[0].output, OutputMode::Discard);
}

#[tokio::test]
async fn capture_mode_records_output() {
    let fx = Fixture::new("dm-core", &["1.9.2"]);
    let env = fx.env(EnvOptions {
        capture_output: Some(true),
        ..matrix(&["1.9.2"], &["sqlite"])
    });
    let shell = RecordingShell::new();
    shell.respond_with("rake spec", "12 examples, 0 failures");
    let probe = MemoryProbe::over_filesystem();

    let (results, _) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert_eq!(
        results[0].result.output.as_deref(),
        Some("12 examples, 0 failures")
    );
    assert!(results[0].result.duration_ms.is_some());
}

// ---- Skip policy ----

#[tokio::test]
async fn dirty_tree_with_revision_skips_every_cell() {
    let fx = Fixture::new("dm-core", &["1.8.7", "1.9.2"]);
    let env = fx.env(EnvOptions {
        revision: Some("abc123".to_string()),
        ..matrix(&["1.8.7", "1.9.2"], &["sqlite", "yaml"])
    });
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();
    probe.set_dirty(fx.root.path().join("dm-core"), true);

    let (results, _) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert_eq!(results.len(), 4);
    assert!(results
        .iter()
        .all(|r| r.result.reason == Some(SkipReason::DirtyWorkingTree)));
    assert!(shell.invocations().is_empty());
}

#[tokio::test]
async fn dirty_tree_without_revision_still_runs() {
    let fx = Fixture::new("dm-core", &["1.9.2"]);
    let env = fx.env(matrix(&["1.9.2"], &["sqlite"]));
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();
    probe.set_dirty(fx.root.path().join("dm-core"), true);

    let (results, _) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert_eq!(results[0].result.status, Status::Pass);
}

#[tokio::test]
async fn unavailable_adapter_skips_only_its_cells() {
    let fx = Fixture::new("dm-core", &["1.9.2"]);
    let env = fx.env(EnvOptions {
        available_adapters: strings(&["sqlite"]),
        ..matrix(&["1.9.2"], &["sqlite", "mysql"])
    });
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (results, _) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert_eq!(results[0].result.status, Status::Pass);
    assert_eq!(results[1].result.status, Status::Skip);
    assert_eq!(results[1].result.reason, Some(SkipReason::AdapterUnavailable));
    assert_eq!(spec_lines(&shell).len(), 1);
}

#[tokio::test]
async fn missing_manifest_is_not_executable() {
    let fx = Fixture::new("dm-core", &[]);
    std::fs::remove_file(fx.root.path().join("dm-core").join("Gemfile")).unwrap();
    let env = fx.env(matrix(&["1.9.2"], &["sqlite", "yaml"]));
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (results, _) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.result.reason == Some(SkipReason::MissingManifest)));
    assert!(shell.invocations().is_empty());
}

// ---- Pre-install ----

#[tokio::test]
async fn missing_lock_installs_that_version_first() {
    let fx = Fixture::new("dm-core", &["1.8.7"]);
    let env = fx.env(matrix(&["1.8.7", "1.9.2"], &["sqlite"]));
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    let lines = shell.command_lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("rvm 1.8.7 ") && lines[0].contains("rake spec"));
    assert!(lines[1].starts_with("rvm 1.9.2 ") && lines[1].contains("bundle install"));
    assert!(lines[2].starts_with("rvm 1.9.2 ") && lines[2].contains("rake spec"));
    assert!(fx.root.path().join("dm-core").join("Gemfile.1.9.2").is_file());
}

#[tokio::test]
async fn failed_install_fails_the_row_without_running_specs() {
    let fx = Fixture::new("dm-core", &["1.8.7"]);
    let env = fx.env(EnvOptions {
        capture_output: Some(true),
        ..matrix(&["1.8.7", "1.9.2"], &["sqlite", "yaml"])
    });
    let shell = RecordingShell::new();
    shell.fail_when("bundle install");
    shell.respond_with("bundle install", "Could not find gem 'do_sqlite3'");
    let probe = MemoryProbe::over_filesystem();

    let (results, buffer) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    let statuses: Vec<Status> = results.iter().map(|r| r.result.status).collect();
    assert_eq!(statuses, vec![Status::Pass, Status::Pass, Status::Fail, Status::Fail]);
    let detail = results[2].result.output.as_deref().unwrap();
    assert!(detail.contains("1.9.2"), "{detail}");
    assert!(detail.contains("do_sqlite3"), "{detail}");

    assert_eq!(spec_lines(&shell).len(), 2);
    assert!(spec_lines(&shell).iter().all(|l| l.starts_with("rvm 1.8.7 ")));
    assert_eq!(buffer.lines().last().unwrap(), "| 1.9.2 | fail   | fail |");
}

// ---- Presentation ----

#[tokio::test]
async fn grid_shows_one_status_per_adapter() {
    let fx = Fixture::new("dm-core", &["1.8.7", "1.9.2"]);
    let env = fx.env(matrix(&["1.8.7", "1.9.2"], &["sqlite", "yaml"]));
    let shell = RecordingShell::new();
    shell.fail_when("ADAPTER='yaml'");
    let probe = MemoryProbe::over_filesystem();

    let (results, buffer) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert_eq!(results[1].result.status, Status::Fail);
    assert_eq!(
        buffer.lines(),
        vec![
            "h2. dm-core".to_string(),
            String::new(),
            "| RUBY  | sqlite | yaml |".to_string(),
            "| 1.8.7 | pass   | fail |".to_string(),
            "| 1.9.2 | pass   | fail |".to_string(),
        ]
    );
}

#[tokio::test]
async fn grid_stays_intact_when_a_lock_is_missing() {
    let fx = Fixture::new("dm-core", &["1.8.7"]);
    let env = fx.env(matrix(&["1.8.7", "1.9.2"], &["sqlite"]));
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (results, buffer) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert!(results.iter().all(|r| r.result.status == Status::Pass));
    assert!(shell.command_lines().iter().any(|l| l.contains("bundle install")));
    assert_eq!(
        buffer.lines(),
        vec![
            "h2. dm-core".to_string(),
            String::new(),
            "| RUBY  | sqlite |".to_string(),
            "| 1.8.7 | pass   |".to_string(),
            "| 1.9.2 | pass   |".to_string(),
        ]
    );
}

#[tokio::test]
async fn verbose_shows_the_install_before_the_spec() {
    let fx = Fixture::new("dm-core", &[]);
    let env = fx.env(EnvOptions {
        verbose: Some(true),
        ..matrix(&["1.9.2"], &["sqlite"])
    });
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (_, buffer) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    let lines = buffer.lines();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].starts_with("[01/01] [1.9.2] bundle install dm-core: "));
    assert!(lines[1].starts_with("[01/01] [1.9.2 sqlite] spec dm-core: "));
}

#[tokio::test]
async fn verbose_prints_command_lines_instead_of_grid() {
    let fx = Fixture::new("dm-core", &["1.9.2"]);
    let env = fx.env(EnvOptions {
        verbose: Some(true),
        ..matrix(&["1.9.2"], &["sqlite"])
    });
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (_, buffer) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("[01/01] [1.9.2 sqlite] spec dm-core: rvm 1.9.2 exec"));
    assert!(!buffer.contents().contains("h2."));
    assert_eq!(shell.invocations()[0].output, OutputMode::Stream);
}

#[tokio::test]
async fn pretend_logs_but_never_executes() {
    let fx = Fixture::new("dm-core", &["1.9.2"]);
    let env = fx.env(EnvOptions {
        pretend: Some(true),
        ..matrix(&["1.9.2"], &["sqlite", "yaml"])
    });
    let shell = RecordingShell::new();
    let probe = MemoryProbe::over_filesystem();

    let (results, buffer) = run_spec(&fx.repo("dm-core"), &env, &shell, &probe).await;
    assert!(shell.invocations().is_empty());
    assert!(results
        .iter()
        .all(|r| r.result.status == Status::Pass && r.result.duration_ms.is_none()));
    assert_eq!(buffer.lines().len(), 2);
}
