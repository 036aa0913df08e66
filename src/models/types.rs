//! Normalized model metadata
//!
//! Both provider variants report their inventory as `ModelDescriptor`s.
//! Descriptors live only as long as the request that produced them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::providers::ProviderKind;

/// Metadata for one model offered by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Identifier passed back to the provider (e.g. "llama3.1:8b", "gpt-4o")
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Parameter count label (e.g. "7B")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_count: Option<String>,

    /// Quantization label (e.g. "Q4_K_M"); remote APIs do not expose it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,

    /// Context window in tokens, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,

    /// On-disk size for locally installed models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// Provider that reported this model
    pub provider: ProviderKind,
}

impl ModelDescriptor {
    /// Descriptor with only an id, as remote list endpoints return
    pub fn bare(id: impl Into<String>, provider: ProviderKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            parameter_count: None,
            quantization: None,
            context_length: None,
            size_bytes: None,
            provider,
        }
    }

    /// Get a short description of the model
    pub fn description(&self) -> String {
        let mut parts = Vec::new();

        if let Some(ref param) = self.parameter_count {
            parts.push(param.clone());
        }
        if let Some(ref quant) = self.quantization {
            parts.push(quant.clone());
        }
        if let Some(ctx) = self.context_length {
            parts.push(format!("{} ctx", ctx));
        }
        if parts.is_empty() {
            if let Some(size) = self.size_bytes {
                parts.push(format_size(size));
            }
        }

        parts.join(" ")
    }
}

impl fmt::Display for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = self.description();
        if description.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, description)
        }
    }
}

/// Format bytes into human-readable size
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base: f64 = 1024.0;
    let exponent = (bytes as f64).log(base).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let size = bytes as f64 / base.powi(exponent as i32);

    format!("{:.2} {}", size, UNITS[exponent])
}
