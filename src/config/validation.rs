use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_log_level(config)?;
    validate_translator(config)?;
    validate_model_aliases(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_translator(config: &AppConfig) -> Result<(), ConfigError> {
    let translator = &config.translator;
    if translator.default_model.trim().is_empty() {
        return Err(validation_err("translator.default_model cannot be empty"));
    }
    if translator.cutoff_marker.trim().is_empty() {
        return Err(validation_err("translator.cutoff_marker cannot be empty"));
    }
    Ok(())
}

fn validate_model_aliases(config: &AppConfig) -> Result<(), ConfigError> {
    for (alias, upstream) in &config.translator.model_aliases {
        if alias.trim().is_empty() {
            return Err(validation_err("translator.model_aliases contains an empty alias"));
        }
        if upstream.trim().is_empty() {
            return Err(validation_err(format!(
                "translator.model_aliases: alias '{alias}' maps to an empty model id"
            )));
        }
    }
    Ok(())
}
