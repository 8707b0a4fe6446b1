use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{admin::posts::ViewError, gateway::GatewayError},
    config::LoadError,
    infra::error::InfraError,
};

/// Error chain flattened into displayable lines, outermost first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Validation(_) => 2,
            AppError::Gateway(GatewayError::NotFound { .. })
            | AppError::View(ViewError::Gateway(GatewayError::NotFound { .. })) => 3,
            AppError::Gateway(_) | AppError::View(ViewError::Gateway(_)) => 4,
            AppError::Infra(_) | AppError::View(_) | AppError::Unexpected(_) => 1,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Config(_) => "Configuration could not be loaded",
            AppError::Validation(_) => "Request could not be processed",
            AppError::Gateway(GatewayError::NotFound { .. })
            | AppError::View(ViewError::Gateway(GatewayError::NotFound { .. })) => {
                "Post not found"
            }
            AppError::Gateway(GatewayError::Timeout)
            | AppError::View(ViewError::Gateway(GatewayError::Timeout)) => {
                "The server did not answer in time"
            }
            AppError::Gateway(_) | AppError::View(ViewError::Gateway(_)) => {
                "The server rejected the request"
            }
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(_) => "Client misconfigured",
            AppError::View(_) | AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
