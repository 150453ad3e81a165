//! Mode-specific system instructions.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::debug;

use crate::config::SessionConfig;

const DEFAULT_TEMPLATE: &str = "prompt_default";

const TEMPLATES: &[(&str, &str)] = &[
    ("prompt_default", include_str!("templates/prompt_default.jinja2")),
    ("prompt_plan", include_str!("templates/prompt_plan.jinja2")),
    ("prompt_autonomous", include_str!("templates/prompt_autonomous.jinja2")),
];

#[derive(Debug, Serialize)]
struct InstructionVars<'a> {
    repo_path: String,
    mode: &'a str,
    github_repository: &'a str,
    branch_name: &'a str,
}

fn environment() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    for (name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// Render the instructions for the session's mode.
pub fn render(config: &SessionConfig) -> Result<String, minijinja::Error> {
    let vars = InstructionVars {
        repo_path: config.repo_path.display().to_string(),
        mode: config.mode.as_str(),
        github_repository: config.github_repo.as_deref().unwrap_or_default(),
        branch_name: config.branch_name.as_deref().unwrap_or_default(),
    };
    render_template(&format!("prompt_{}", config.mode), &vars)
}

fn render_template(name: &str, vars: &InstructionVars<'_>) -> Result<String, minijinja::Error> {
    let env = environment()?;
    let template = match env.get_template(name) {
        Ok(template) => template,
        Err(e) if e.kind() == minijinja::ErrorKind::TemplateNotFound => {
            debug!("No instruction template '{}', using {}", name, DEFAULT_TEMPLATE);
            env.get_template(DEFAULT_TEMPLATE)?
        }
        Err(e) => return Err(e),
    };
    template.render(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;
    use std::path::PathBuf;
    use tiller_tools::Mode;

    fn config(mode: Mode) -> SessionConfig {
        SessionConfig::new(PathBuf::from("/work/repo"), ApiKey::new("k")).with_mode(mode)
    }

    #[test]
    fn test_every_mode_has_a_template() {
        for (mode, marker) in [
            (Mode::Default, "Work in small, verifiable steps"),
            (Mode::Plan, "planning mode"),
            (Mode::Autonomous, "running unattended"),
        ] {
            let text = render(&config(mode)).unwrap();
            assert!(text.contains("/work/repo"), "{mode}");
            assert!(text.contains(marker), "{mode}");
        }
    }

    #[test]
    fn test_github_details_are_optional() {
        let without = render(&config(Mode::Default)).unwrap();
        assert!(!without.contains("GitHub repository"));

        let mut with = config(Mode::Default);
        with.github_repo = Some("acme/widgets".to_string());
        with.branch_name = Some("feature/x".to_string());
        let text = render(&with).unwrap();
        assert!(text.contains("The GitHub repository is acme/widgets and the current branch is feature/x."));
    }

    #[test]
    fn test_unknown_template_falls_back_to_default() {
        let vars = InstructionVars {
            repo_path: "/r".to_string(),
            mode: "review",
            github_repository: "",
            branch_name: "",
        };
        let text = render_template("prompt_review", &vars).unwrap();
        assert!(text.contains("Work in small, verifiable steps"));
    }
}
