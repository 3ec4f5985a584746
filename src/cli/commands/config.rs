use crate::cli::output::Output;
use crate::cli::{ConfigAction, GlobalArgs};
use crate::config::{config_file_for_repo, Settings};
use crate::errors::Result;
use crate::git::find_repository_root;
use std::path::Path;

/// Handle configuration commands
pub fn run(global: &GlobalArgs, action: ConfigAction) -> Result<()> {
    let repo_root = find_repository_root(&global.repo_path()?)?;
    let config_file = config_file_for_repo(&repo_root);

    match action {
        ConfigAction::Set { key, value } => set_config_value(&config_file, &key, &value),
        ConfigAction::Get { key } => get_config_value(&config_file, &key),
        ConfigAction::List => list_config_values(&config_file),
    }
}

fn set_config_value(config_file: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load_from_file(config_file)?;
    settings.set_value(key, value)?;
    settings.validate()?;
    settings.save_to_file(config_file)?;

    Output::success(format!("Configuration updated: {key} = {value}"));
    Output::sub_item(format!("Written to {}", config_file.display()));

    if key == "branches.upstream_tag" && !value.contains(crate::config::VERSION_PLACEHOLDER) {
        Output::tip("Use '%(version)s' in the tag to follow the packaged upstream version");
    }

    Ok(())
}

fn display_value(value: String) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value
    }
}

fn get_config_value(config_file: &Path, key: &str) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;
    let value = settings.get_value(key)?;

    println!("{key} = {}", display_value(value));
    Ok(())
}

fn list_config_values(config_file: &Path) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;

    Output::section(format!("Configuration ({})", config_file.display()));
    let mut current_section = String::new();
    for (key, value) in settings.list_values()? {
        let section = key.split('.').next().unwrap_or_default().to_string();
        if section != current_section {
            println!();
            println!("{section}:");
            current_section = section;
        }
        println!("  {key} = {}", display_value(value));
    }

    Ok(())
}
