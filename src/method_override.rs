//! HTTP method override for clients that can only send `POST`.
//!
//! A `POST` carrying `X-HTTP-Method-Override: PATCH` is treated as a
//! `PATCH` before routing, on the configured route groups only.

use crate::config::MethodOverrideConfig;

/// Decides the effective request method under an override policy.
#[derive(Debug, Clone, Copy)]
pub struct MethodOverride<'c> {
    config: &'c MethodOverrideConfig,
}

impl<'c> MethodOverride<'c> {
    pub fn new(config: &'c MethodOverrideConfig) -> Self {
        Self { config }
    }

    /// Whether requests routed through `group` are subject to overriding.
    pub fn applies_to(&self, group: &str) -> bool {
        self.config.enabled && self.config.apply_to_groups.iter().any(|g| g == group)
    }

    /// The method a request should be routed as.
    ///
    /// `header` looks up a request header by name. The method is rewritten
    /// only when the policy applies to `group`, the inbound method is the
    /// configured source method, and the header names the configured target
    /// method; comparisons ignore case. Otherwise `method` is returned as is.
    pub fn effective_method<'h, F>(&self, group: &str, method: &str, header: F) -> String
    where
        F: FnOnce(&str) -> Option<&'h str>,
    {
        if !self.applies_to(group) || !method.eq_ignore_ascii_case(&self.config.from) {
            return method.to_string();
        }
        match header(self.config.header.as_str()) {
            Some(value) if value.trim().eq_ignore_ascii_case(&self.config.to) => {
                tracing::trace!(from = method, to = %self.config.to, "method overridden");
                self.config.to.to_ascii_uppercase()
            }
            _ => method.to_string(),
        }
    }
}
