//! Configuration validation rules.

use super::schema::{Config, ModelConfig};

fn validate_model(section: &str, model: &ModelConfig, errors: &mut Vec<String>) {
    if model.max_tokens == 0 {
        errors.push(format!("{}.max_tokens must be > 0", section));
    }
    if !(0.0..=2.0).contains(&model.temperature) {
        errors.push(format!("{}.temperature must be in [0.0, 2.0]", section));
    }
    if model.request_timeout_secs == 0 {
        errors.push(format!("{}.request_timeout_secs must be > 0", section));
    }
}

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.coordinator.model.trim().is_empty() {
        errors.push("coordinator.model must not be empty".to_string());
    }
    if config.coordinator.api_base.trim().is_empty() {
        errors.push("coordinator.api_base must not be empty".to_string());
    }
    validate_model("coordinator", &config.coordinator, &mut errors);
    validate_model("experts", &config.experts, &mut errors);

    let consultation = &config.consultation;
    if consultation.max_rounds == 0 {
        errors.push("consultation.max_rounds must be > 0".to_string());
    }
    if consultation.retry.max_attempts == 0 {
        errors.push("consultation.retry.max_attempts must be > 0".to_string());
    }
    if consultation
        .completion_phrases
        .iter()
        .any(|phrase| phrase.trim().is_empty())
    {
        errors.push("consultation.completion_phrases must not contain blank phrases".to_string());
    }
    if consultation.session_ttl_secs == Some(0) {
        errors.push("consultation.session_ttl_secs must be > 0 when set".to_string());
    }
    if let Some(dir) = &consultation.sessions_dir {
        if dir.trim().is_empty() {
            errors.push("consultation.sessions_dir must not be empty when set".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
