use std::collections::HashMap;

use crate::error::{ConfigError, Result, ValidationProblem};
use crate::model::{Configuration, RepoConfig};

impl Configuration {
    /// Check the rules the reconciliation core relies on.
    ///
    /// Every problem in the document is reported at once so a single issue
    /// comment can list them all.
    pub fn validate(&self) -> Result<()> {
        let problems: Vec<ValidationProblem> = self
            .repos
            .iter()
            .flat_map(|(name, repo)| repo_problems(name, repo))
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}

fn repo_problems(repo_name: &str, repo: &RepoConfig) -> Vec<ValidationProblem> {
    let mut problems = Vec::new();
    // legacy name -> label that claimed it first
    let mut claims: HashMap<&str, &str> = HashMap::new();

    for (name, label) in &repo.labels {
        if name.trim().is_empty() {
            problems.push(ValidationProblem::EmptyLabelName {
                repo: repo_name.to_string(),
            });
            continue;
        }

        if !is_hex_color(&label.color) {
            problems.push(ValidationProblem::InvalidColor {
                repo: repo_name.to_string(),
                label: name.clone(),
                color: label.color.clone(),
            });
        }

        for alias in &label.alias {
            if alias == name {
                problems.push(ValidationProblem::SelfAlias {
                    repo: repo_name.to_string(),
                    label: name.clone(),
                });
                continue;
            }
            if repo.labels.contains_key(alias) {
                problems.push(ValidationProblem::AliasShadowsLabel {
                    repo: repo_name.to_string(),
                    label: name.clone(),
                    alias: alias.clone(),
                });
                continue;
            }
            match claims.get(alias.as_str()) {
                Some(first) if *first != name.as_str() => {
                    problems.push(ValidationProblem::DuplicateAlias {
                        repo: repo_name.to_string(),
                        alias: alias.clone(),
                        first: (*first).to_string(),
                        second: name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    claims.insert(alias, name);
                }
            }
        }

        for sibling in &label.siblings {
            if !repo.labels.contains_key(sibling) {
                problems.push(ValidationProblem::UnknownSibling {
                    repo: repo_name.to_string(),
                    label: name.clone(),
                    sibling: sibling.clone(),
                });
            }
        }
    }

    problems
}

fn is_hex_color(color: &str) -> bool {
    let hex = color.strip_prefix('#').unwrap_or(color);
    hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelConfig;

    fn config_with(labels: Vec<(&str, LabelConfig)>) -> Configuration {
        let mut repo = RepoConfig::default();
        for (name, label) in labels {
            repo.labels.insert(name.to_string(), label);
        }
        let mut config = Configuration::default();
        config.repos.insert("api".to_string(), repo);
        config
    }

    fn problems(config: &Configuration) -> Vec<ValidationProblem> {
        match config.validate() {
            Err(ConfigError::Invalid { problems }) => problems,
            other => panic!("expected validation problems, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_configuration_passes() {
        let config = config_with(vec![
            (
                "bug",
                LabelConfig::new("d73a4a")
                    .with_alias(["kind/bug"])
                    .with_siblings(["triage"]),
            ),
            ("triage", LabelConfig::new("#fbca04")),
        ]);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_alias_claim_is_rejected() {
        let config = config_with(vec![
            ("bug", LabelConfig::new("d73a4a").with_alias(["old"])),
            ("defect", LabelConfig::new("d73a4a").with_alias(["old"])),
        ]);

        assert_eq!(
            problems(&config),
            vec![ValidationProblem::DuplicateAlias {
                repo: "api".to_string(),
                alias: "old".to_string(),
                first: "bug".to_string(),
                second: "defect".to_string(),
            }]
        );
    }

    #[test]
    fn test_self_alias_is_rejected() {
        let config = config_with(vec![("bug", LabelConfig::new("d73a4a").with_alias(["bug"]))]);

        assert_eq!(
            problems(&config),
            vec![ValidationProblem::SelfAlias {
                repo: "api".to_string(),
                label: "bug".to_string(),
            }]
        );
    }

    #[test]
    fn test_alias_onto_configured_label_is_rejected() {
        let config = config_with(vec![
            ("bug", LabelConfig::new("d73a4a")),
            ("defect", LabelConfig::new("d73a4a").with_alias(["bug"])),
        ]);

        assert!(matches!(
            problems(&config).as_slice(),
            [ValidationProblem::AliasShadowsLabel { alias, .. }] if alias == "bug"
        ));
    }

    #[test]
    fn test_reports_every_problem() {
        let config = config_with(vec![
            ("bug", LabelConfig::new("red").with_siblings(["missing"])),
            ("", LabelConfig::new("d73a4a")),
        ]);

        let found = problems(&config);
        assert_eq!(found.len(), 3);
        assert!(found
            .iter()
            .any(|p| matches!(p, ValidationProblem::InvalidColor { color, .. } if color == "red")));
        assert!(found
            .iter()
            .any(|p| matches!(p, ValidationProblem::UnknownSibling { sibling, .. } if sibling == "missing")));
        assert!(found
            .iter()
            .any(|p| matches!(p, ValidationProblem::EmptyLabelName { .. })));
    }

    #[test]
    fn test_problem_display_names_repo_and_label() {
        let problem = ValidationProblem::SelfAlias {
            repo: "api".to_string(),
            label: "bug".to_string(),
        };
        assert_eq!(problem.to_string(), "api: `bug` lists itself as an alias");
    }
}
