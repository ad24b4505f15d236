// src/routing/validator.rs
//! Structural checks applied before a route is trusted. Errors block use of a
//! route; warnings are informational.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::aggregator::RouteCandidate;
use crate::types::{ExternalRoute, UniversalRoute};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub max_price_impact: f64,
    pub allow_high_impact: bool,
    pub warn_price_impact: f64,
    pub expiry_warning: Duration,
    pub warn_hops: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_price_impact: 0.5,
            allow_high_impact: false,
            warn_price_impact: 0.05,
            expiry_warning: Duration::from_secs(10),
            warn_hops: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteValidator {
    config: ValidatorConfig,
}

impl RouteValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, route: &UniversalRoute) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if route.path.len() < 2 {
            errors.push(format!("Path has {} tokens, need at least 2", route.path.len()));
        }
        if route.path.len() != route.steps.len() + 1 {
            errors.push(format!(
                "Path has {} tokens but route has {} steps",
                route.path.len(),
                route.steps.len()
            ));
        }

        for (i, step) in route.steps.iter().enumerate() {
            if route.path.get(i) != Some(&step.from_token) || route.path.get(i + 1) != Some(&step.to_token) {
                errors.push(format!("Step {} does not match the path", i));
            }
            if let Some(next) = route.steps.get(i + 1) {
                if step.to_token != next.from_token {
                    errors.push(format!(
                        "Step {} ends in {} but step {} starts from {}",
                        i,
                        step.to_token,
                        i + 1,
                        next.from_token
                    ));
                }
            }
            if !(step.amount_in > 0.0 && step.amount_in.is_finite()) {
                errors.push(format!("Step {} has non-positive input {}", i, step.amount_in));
            }
            if !(step.amount_out > 0.0 && step.amount_out.is_finite()) {
                errors.push(format!("Step {} has non-positive output {}", i, step.amount_out));
            }
        }

        self.check_output(route.amount_out(), &mut errors);
        self.check_impact(route.price_impact, &mut errors, &mut warnings);

        if route.steps.len() > self.config.warn_hops {
            warnings.push(format!("Route has {} hops", route.steps.len()));
        }

        let now = Utc::now();
        if route.expires_at <= now {
            errors.push(format!("Route expired at {}", route.expires_at));
        } else if (route.expires_at - now).to_std().map(|left| left < self.config.expiry_warning).unwrap_or(false) {
            warnings.push(format!("Route expires soon ({})", route.expires_at));
        }

        ValidationResult::from_findings(errors, warnings)
    }

    /// Checks that apply to the flat external shape: endpoints, amounts, impact, expiry.
    pub fn validate_external(&self, route: &ExternalRoute) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if route.path.len() < 2 {
            errors.push(format!("Path has {} tokens, need at least 2", route.path.len()));
        }
        if route.amounts.len() != route.path.len() {
            errors.push(format!(
                "Route has {} amounts for {} tokens",
                route.amounts.len(),
                route.path.len()
            ));
        }
        if route.path.windows(2).any(|w| w[0] == w[1]) {
            errors.push("Path repeats a token in consecutive positions".to_string());
        }
        if !(route.amount_in() > 0.0 && route.amount_in().is_finite()) {
            errors.push(format!("Non-positive input amount {}", route.amount_in()));
        }

        self.check_output(route.amount_out(), &mut errors);
        self.check_impact(route.price_impact, &mut errors, &mut warnings);

        if route.path.len() > self.config.warn_hops + 1 {
            warnings.push(format!("Route has {} hops", route.path.len() - 1));
        }

        if let Some(expires_at) = route.expires_at {
            let now = Utc::now();
            if expires_at <= now {
                errors.push(format!("Route expired at {}", expires_at));
            } else if (expires_at - now).to_std().map(|left| left < self.config.expiry_warning).unwrap_or(false) {
                warnings.push(format!("Route expires soon ({})", expires_at));
            }
        }

        ValidationResult::from_findings(errors, warnings)
    }

    pub fn validate_candidate(&self, candidate: &RouteCandidate) -> ValidationResult {
        match candidate {
            RouteCandidate::Internal(route) => self.validate(route),
            RouteCandidate::External(route) => self.validate_external(route),
        }
    }

    fn check_output(&self, amount_out: f64, errors: &mut Vec<String>) {
        if !amount_out.is_finite() || amount_out <= 0.0 {
            errors.push(format!("Output amount {} is not positive", amount_out));
        }
    }

    fn check_impact(&self, impact: f64, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        if !impact.is_finite() || impact < 0.0 {
            errors.push(format!("Invalid price impact {}", impact));
            return;
        }
        if impact > self.config.max_price_impact {
            if self.config.allow_high_impact {
                warnings.push(format!(
                    "Price impact {:.2}% exceeds {:.2}% (allowed)",
                    impact * 100.0,
                    self.config.max_price_impact * 100.0
                ));
            } else {
                errors.push(format!(
                    "Price impact {:.2}% exceeds {:.2}%",
                    impact * 100.0,
                    self.config.max_price_impact * 100.0
                ));
            }
        } else if impact > self.config.warn_price_impact {
            warnings.push(format!("High price impact {:.2}%", impact * 100.0));
        }
    }
}
