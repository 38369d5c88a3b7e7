use std::io::{self, BufRead, Write};
use std::path::Path;

use clap::{Args, Subcommand};

use crate::config::{AppConfig, StoredConfig, config_file_path};
use crate::error::AppResult;
use crate::infra::jira::JiraMappingConfiguration;

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Store Jira credentials and the default mapping file.
    Init,
    /// Show stored and effective settings (secrets masked) and check the mapping file.
    Show,
}

pub fn run(command: ConfigCommand) -> AppResult<()> {
    match command {
        ConfigCommand::Init => run_init(),
        ConfigCommand::Show => run_show(),
    }
}

fn run_init() -> AppResult<()> {
    let mut cfg = StoredConfig::load()?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    writeln!(output, "Connect ims to Jira.")?;
    writeln!(
        output,
        "Enter keeps a value, '-' clears it. IMS_JIRA_* and IMS_MAPPING override these at run time."
    )?;
    writeln!(output)?;

    let fields: [(&str, &mut Option<String>, bool); 3] = [
        (
            "Jira site (e.g., https://company.atlassian.net)",
            &mut cfg.jira_base_url,
            false,
        ),
        ("Jira account email", &mut cfg.jira_email, false),
        ("Jira API token", &mut cfg.jira_token, true),
    ];
    for (label, target, secret) in fields {
        apply_prompt(&mut input, &mut output, label, target, secret)?;
    }

    // Re-ask while the user keeps typing paths that do not load.
    loop {
        let action = prompt(
            &mut input,
            &mut output,
            "Mapping file for the game project (JSON)",
            cfg.default_mapping.as_deref(),
            false,
        )?;
        let retry = matches!(action, PromptAction::Set(_));
        match action {
            PromptAction::Keep => {}
            PromptAction::Clear => cfg.default_mapping = None,
            PromptAction::Set(value) => cfg.default_mapping = Some(value),
        }

        let Some(path) = cfg.default_mapping.as_deref() else {
            writeln!(output, "No default mapping; pass --mapping on each call.")?;
            break;
        };
        match JiraMappingConfiguration::load(Path::new(path)) {
            Ok(mapping) => {
                writeln!(output, "{}", mapping_summary(&mapping))?;
                break;
            }
            Err(err) if retry => writeln!(output, "Cannot use {path}: {err}")?,
            Err(err) => {
                writeln!(output, "Keeping {path}, which does not load yet: {err}")?;
                break;
            }
        }
    }

    cfg.save()?;
    writeln!(
        output,
        "\nConfiguration saved to {}",
        config_file_path()?.display()
    )?;
    Ok(())
}

fn run_show() -> AppResult<()> {
    let stored = StoredConfig::load()?;
    let effective = AppConfig::load(None)?;

    println!("Configuration file: {}", config_file_path()?.display());
    println!(
        "Jira site: {}",
        with_origin(&effective.jira_base_url, &stored.jira_base_url)
    );
    println!(
        "Jira email: {}",
        with_origin(&effective.jira_email, &stored.jira_email)
    );
    println!("Jira API token: {}", mask_secret(&effective.jira_token));

    match effective.mapping_path.as_deref() {
        None => println!("Mapping file: <not set>"),
        Some(path) => {
            println!("Mapping file: {}", path.display());
            match JiraMappingConfiguration::load(path) {
                Ok(mapping) => println!("{}", mapping_summary(&mapping)),
                Err(err) => println!("  unusable: {err}"),
            }
        }
    }
    Ok(())
}

/// One indented line per vocabulary table so gaps show before the first sync.
fn mapping_summary(mapping: &JiraMappingConfiguration) -> String {
    let vocabulary = &mapping.vocabulary;
    let listed = |names: Vec<String>| {
        if names.is_empty() {
            "<none>".to_string()
        } else {
            names.join(", ")
        }
    };
    [
        format!(
            "  project {} -> Jira {}",
            mapping.project_id, mapping.project_key
        ),
        format!(
            "  states: {}",
            listed(vocabulary.states.supported().map(|s| s.to_string()).collect())
        ),
        format!(
            "  priorities: {}",
            listed(vocabulary.priorities.supported().map(|p| p.to_string()).collect())
        ),
        format!(
            "  estimations: {}",
            listed(vocabulary.estimations.supported().map(|e| e.to_string()).collect())
        ),
        format!(
            "  issue types: {}",
            listed(vocabulary.issue_types.supported().cloned().collect())
        ),
        format!(
            "  users: {}, sprints: {}",
            vocabulary.users.supported().count(),
            mapping.sprints.len()
        ),
    ]
    .join("\n")
}

fn with_origin(effective: &Option<String>, stored: &Option<String>) -> String {
    let shown = display_value(effective);
    if effective.is_some() && effective != stored {
        format!("{shown} (from environment)")
    } else {
        shown
    }
}

fn apply_prompt(
    input: &mut impl BufRead,
    output: &mut impl Write,
    field: &str,
    target: &mut Option<String>,
    secret: bool,
) -> AppResult<()> {
    match prompt(input, output, field, target.as_deref(), secret)? {
        PromptAction::Keep => {}
        PromptAction::Clear => *target = None,
        PromptAction::Set(value) => *target = Some(value),
    }
    Ok(())
}

fn prompt(
    input: &mut impl BufRead,
    output: &mut impl Write,
    field: &str,
    current: Option<&str>,
    secret: bool,
) -> AppResult<PromptAction> {
    match (current, secret) {
        (Some(_), true) => write!(output, "{field} [****]: ")?,
        (Some(value), false) => write!(output, "{field} [{value}]: ")?,
        (None, _) => write!(output, "{field}: ")?,
    }
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(match line.trim() {
        "" => PromptAction::Keep,
        "-" => PromptAction::Clear,
        value => PromptAction::Set(value.to_string()),
    })
}

fn display_value(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<not set>".to_string())
}

fn mask_secret(value: &Option<String>) -> String {
    let Some(token) = value.as_deref().filter(|token| !token.is_empty()) else {
        return "<not set>".to_string();
    };
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{prefix}***{suffix}")
}

#[derive(Debug, PartialEq)]
enum PromptAction {
    Keep,
    Clear,
    Set(String),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Cursor;

    use uuid::Uuid;

    use super::*;
    use crate::domain::issue::IssueState;
    use crate::domain::mapping::{Vocabulary, VocabularyMap};

    #[test]
    fn masks_long_secrets_keeping_edges() {
        assert_eq!(mask_secret(&Some("ATATT3xFfGF0".to_string())), "ATA***GF0");
        assert_eq!(mask_secret(&Some("short".to_string())), "***");
        assert_eq!(mask_secret(&Some(String::new())), "<not set>");
        assert_eq!(mask_secret(&None), "<not set>");
    }

    #[test]
    fn masks_multibyte_secrets_by_character() {
        assert_eq!(mask_secret(&Some("ééé-token-ñññ".to_string())), "ééé***ñññ");
        assert_eq!(mask_secret(&Some("ümlaut".to_string())), "***");
    }

    #[test]
    fn blank_values_display_as_unset() {
        assert_eq!(display_value(&Some("mapping.json".to_string())), "mapping.json");
        assert_eq!(display_value(&Some(String::new())), "<not set>");
        assert_eq!(display_value(&None), "<not set>");
    }

    #[test]
    fn prompt_keeps_clears_or_sets() {
        let mut output = Vec::new();
        let mut target = Some("old".to_string());

        apply_prompt(&mut Cursor::new("\n"), &mut output, "Site", &mut target, false).unwrap();
        assert_eq!(target.as_deref(), Some("old"));

        apply_prompt(&mut Cursor::new("  new \n"), &mut output, "Site", &mut target, false)
            .unwrap();
        assert_eq!(target.as_deref(), Some("new"));

        apply_prompt(&mut Cursor::new("-\n"), &mut output, "Site", &mut target, false).unwrap();
        assert_eq!(target, None);

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.starts_with("Site [old]: Site [old]: Site [new]: "));
    }

    #[test]
    fn prompt_hides_current_secret() {
        let mut output = Vec::new();
        let action = prompt(
            &mut Cursor::new(""),
            &mut output,
            "Token",
            Some("ATATT3xFfGF0"),
            true,
        )
        .unwrap();
        assert_eq!(action, PromptAction::Keep);
        assert_eq!(String::from_utf8(output).unwrap(), "Token [****]: ");
    }

    #[test]
    fn environment_values_are_labelled() {
        let stored = Some("https://stored.atlassian.net".to_string());
        assert_eq!(
            with_origin(&Some("https://env.atlassian.net".to_string()), &stored),
            "https://env.atlassian.net (from environment)"
        );
        assert_eq!(with_origin(&stored, &stored), "https://stored.atlassian.net");
        assert_eq!(with_origin(&None, &None), "<not set>");
    }

    #[test]
    fn summary_lists_mapped_vocabulary() {
        let mapping = JiraMappingConfiguration {
            project_id: Uuid::from_u128(7),
            project_key: "SG".to_string(),
            sprint_field: "customfield_10020".to_string(),
            estimation_field: None,
            sprints: BTreeMap::from([(1, 101)]),
            vocabulary: Vocabulary {
                states: VocabularyMap::new()
                    .with(IssueState::Todo, "To Do")
                    .with(IssueState::Done, "Done"),
                ..Vocabulary::default()
            },
        };
        let summary = mapping_summary(&mapping);
        assert!(summary.contains("-> Jira SG"));
        assert!(summary.contains("  states: TODO, DONE"));
        assert!(summary.contains("  priorities: <none>"));
        assert!(summary.contains("users: 0, sprints: 1"));
    }
}
