//! Environment checks run before a session starts.

use minijinja::{Environment, UndefinedBehavior, context};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

const COMMIT_MSG_HOOK_TEMPLATE: &str = include_str!("templates/commit_msg_hook.jinja2");

/// Trailer the commit-msg hook adds to agent commits.
pub const COMMIT_TRAILER: &str = "Assisted-by: tiller";

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Preflight checks failed:\n  - {}", .0.join("\n  - "))]
    ChecksFailed(Vec<String>),
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Failed to render commit-msg hook: {0}")]
    Render(#[from] minijinja::Error),

    #[error("Failed to write commit-msg hook: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to set core.hooksPath: {0}")]
    GitConfig(String),
}

/// What preflight learned about the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub github_repo: Option<String>,
    pub branch_name: Option<String>,
    pub warnings: Vec<String>,
}

pub async fn run_preflight_checks(
    repo_path: &Path,
    github_token_set: bool,
) -> Result<PreflightReport, PreflightError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match is_inside_git_repo(repo_path).await {
        Ok(true) => {}
        Ok(false) => errors.push(format!(
            "Path '{}' is not inside a Git worktree.",
            repo_path.display()
        )),
        Err(e) => errors.push(e),
    }

    match which::which("npx") {
        Ok(path) => info!("Found npx at {}", path.display()),
        Err(_) => errors.push("npx (Node.js) not found on PATH; the file-system provider needs it.".to_string()),
    }

    if github_token_set && which::which("docker").is_err() {
        let warning =
            "docker not found on PATH; the GitHub provider will be unavailable.".to_string();
        warn!("{}", warning);
        warnings.push(warning);
    }

    if !errors.is_empty() {
        return Err(PreflightError::ChecksFailed(errors));
    }

    let github_repo = git_output(repo_path, &["config", "--get", "remote.origin.url"])
        .await
        .and_then(|url| parse_github_slug(&url));
    let head = git_output(repo_path, &["rev-parse", "--abbrev-ref", "HEAD"]).await;
    let branch_name = resolve_branch(head, std::env::var("GITHUB_REF").ok());

    if let Some(repo) = &github_repo {
        info!("Detected GitHub repository: {}", repo);
    }
    if let Some(branch) = &branch_name {
        info!("Detected git branch: {}", branch);
    }

    if let Some(dir) = crate::utils::hooks_dir()
        && let Err(e) = install_commit_msg_hook(repo_path, &dir).await
    {
        let warning = format!("Commit-msg hook not installed: {e}");
        warn!("{}", warning);
        warnings.push(warning);
    }

    Ok(PreflightReport {
        github_repo,
        branch_name,
        warnings,
    })
}

async fn is_inside_git_repo(repo_path: &Path) -> Result<bool, String> {
    let output = Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(repo_path)
        .output()
        .await
        .map_err(|e| format!("Failed to run git: {e}"))?;
    Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
}

async fn git_output(repo_path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

pub fn render_commit_msg_hook() -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.add_template("commit_msg_hook", COMMIT_MSG_HOOK_TEMPLATE)?;
    env.get_template("commit_msg_hook")?
        .render(context! { trailer => COMMIT_TRAILER })
}

/// Write the commit-msg hook into `hooks_dir` and point the repository's
/// `core.hooksPath` at it. The file is only rewritten when its content
/// changed; returns whether it was.
pub async fn install_commit_msg_hook(repo_path: &Path, hooks_dir: &Path) -> Result<bool, HookError> {
    let script = render_commit_msg_hook()?;
    fs::create_dir_all(hooks_dir).await?;

    let hook_file = hooks_dir.join("commit-msg");
    let existing = fs::read_to_string(&hook_file).await.ok();
    let rewritten = existing.as_deref() != Some(script.as_str());
    if rewritten {
        fs::write(&hook_file, &script).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&hook_file, std::fs::Permissions::from_mode(0o755)).await?;
        }
        info!("Installed commit-msg hook at {}", hook_file.display());
    } else {
        debug!("Commit-msg hook at {} is up to date", hook_file.display());
    }

    let output = Command::new("git")
        .arg("config")
        .arg("core.hooksPath")
        .arg(hooks_dir)
        .current_dir(repo_path)
        .output()
        .await?;
    if !output.status.success() {
        return Err(HookError::GitConfig(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(rewritten)
}

/// `owner/repo` from a github.com origin URL in SSH or HTTPS form.
pub fn parse_github_slug(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_suffix(".git").unwrap_or(url);

    let (host, path) = if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/')?
    } else if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':')?
    } else {
        return None;
    };

    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split_once(':').map_or(host, |(h, _)| h);
    if !host.eq_ignore_ascii_case("github.com") {
        return None;
    }

    let slug = path.trim_matches('/');
    (!slug.is_empty()).then(|| slug.to_string())
}

/// The checked-out branch, or the last segment of `GITHUB_REF` when HEAD is
/// detached or unknown.
pub fn resolve_branch(head: Option<String>, github_ref: Option<String>) -> Option<String> {
    match head {
        Some(branch) if branch != "HEAD" => Some(branch),
        _ => github_ref
            .as_deref()
            .and_then(|r| r.rsplit_once('/'))
            .map(|(_, last)| last.to_string())
            .filter(|b| !b.is_empty()),
    }
}
