//! Matrix helpers: adapter applicability and the pass/fail grid.

use crate::result::Status;

const RUBY_COLUMN: &str = "RUBY";

/// Adapters that apply to a repository.
///
/// Repositories named after one or more configured adapters (e.g.
/// `dm-postgres-adapter`) only run against those; everything else runs
/// against the full list.
pub fn applicable_adapters(configured: &[String], repo_name: &str) -> Vec<String> {
    let matching: Vec<String> = configured
        .iter()
        .filter(|adapter| repo_name.contains(adapter.as_str()))
        .cloned()
        .collect();
    if matching.is_empty() {
        configured.to_vec()
    } else {
        matching
    }
}

/// Renders the per-repository grid one row at a time, so rows appear while
/// the matrix is still running.
#[derive(Debug, Clone)]
pub struct Grid {
    adapters: Vec<String>,
    ruby_width: usize,
}

impl Grid {
    pub fn new(rubies: &[String], adapters: &[String]) -> Self {
        let ruby_width = rubies
            .iter()
            .map(String::len)
            .chain(std::iter::once(RUBY_COLUMN.len()))
            .max()
            .unwrap_or(RUBY_COLUMN.len());
        Self {
            adapters: adapters.to_vec(),
            ruby_width,
        }
    }

    /// Title and column header lines.
    pub fn header(&self, repo: &str) -> Vec<String> {
        let columns: Vec<String> = self
            .adapters
            .iter()
            .map(|a| format!("{a:<width$}", width = column_width(a)))
            .collect();
        vec![
            format!("h2. {repo}"),
            String::new(),
            format!(
                "| {RUBY_COLUMN:<width$} | {} |",
                columns.join(" | "),
                width = self.ruby_width
            ),
        ]
    }

    pub fn row(&self, ruby: &str, statuses: &[Status]) -> String {
        let cells: Vec<String> = self
            .adapters
            .iter()
            .zip(statuses)
            .map(|(adapter, status)| format!("{:<width$}", status.as_str(), width = column_width(adapter)))
            .collect();
        format!(
            "| {ruby:<width$} | {} |",
            cells.join(" | "),
            width = self.ruby_width
        )
    }
}

fn column_width(adapter: &str) -> usize {
    adapter.len().max(Status::Pass.as_str().len())
}
