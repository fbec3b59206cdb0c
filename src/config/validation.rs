//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross references
//! (projects pointing at configured chains, unique chain entries) and returns
//! every problem found rather than stopping at the first.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.chains.is_empty() {
        errors.push(ValidationError::new("chains", "at least one chain is required"));
    }

    let mut seen = HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        let field = format!("chains[{}]", i);
        if !seen.insert(chain.chain) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate entry for chain '{}'", chain.chain),
            ));
        }
        if url::Url::parse(&chain.rpc_url).is_err() {
            errors.push(ValidationError::new(
                format!("{}.rpc_url", field),
                format!("invalid URL '{}'", chain.rpc_url),
            ));
        }
        if chain.rpc_timeout_secs == 0 {
            errors.push(ValidationError::new(format!("{}.rpc_timeout_secs", field), "must be > 0"));
        }
        if chain.receipt_poll_interval_ms == 0 {
            errors.push(ValidationError::new(
                format!("{}.receipt_poll_interval_ms", field),
                "must be > 0",
            ));
        }
        if !(1.0..=3.0).contains(&chain.gas_price_multiplier) {
            errors.push(ValidationError::new(
                format!("{}.gas_price_multiplier", field),
                "must be between 1.0 and 3.0",
            ));
        }
        if chain.wrapped_native.is_zero() || chain.dex_router.is_zero() {
            errors.push(ValidationError::new(
                &field,
                "wrapped_native and dex_router must be non-zero addresses",
            ));
        }
    }

    let settlement = &config.settlement;
    if settlement.max_slippage_bps == 0 || settlement.max_slippage_bps >= 10_000 {
        errors.push(ValidationError::new(
            "settlement.max_slippage_bps",
            "must be between 1 and 9999",
        ));
    }
    if !(10..=600).contains(&settlement.receipt_timeout_secs) {
        errors.push(ValidationError::new(
            "settlement.receipt_timeout_secs",
            "must be between 10 and 600",
        ));
    }
    if settlement.swap_deadline_secs < 60 {
        errors.push(ValidationError::new(
            "settlement.swap_deadline_secs",
            "must be at least 60",
        ));
    }
    if settlement.workers == 0 {
        errors.push(ValidationError::new("settlement.workers", "must be > 0"));
    }
    if settlement.queue_capacity == 0 {
        errors.push(ValidationError::new("settlement.queue_capacity", "must be > 0"));
    }

    let mut project_ids = HashSet::new();
    for (i, project) in config.projects.iter().enumerate() {
        let field = format!("projects[{}]", i);
        if !project_ids.insert(project.id) {
            errors.push(ValidationError::new(&field, format!("duplicate project id {}", project.id)));
        }
        if config.chain(project.chain).is_none() {
            errors.push(ValidationError::new(
                format!("{}.chain", field),
                format!("chain '{}' is not configured", project.chain),
            ));
        }
        if project.token_address.is_zero() || project.staking_contract.is_zero() {
            errors.push(ValidationError::new(
                &field,
                "token_address and staking_contract must be non-zero addresses",
            ));
        }
    }

    if config.chain(config.gateway.chain).is_none() {
        errors.push(ValidationError::new(
            "gateway.chain",
            format!("chain '{}' is not configured", config.gateway.chain),
        ));
    }

    if let Some(url) = &config.ledger.webhook_url {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::new("ledger.webhook_url", format!("invalid URL '{}'", url)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
