//! Resolved adapter capabilities.

use crate::protocol::Capabilities;

/// Capabilities of the debug adapter, stored as plain booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DapCapabilities {
    /// Whether the adapter supports `configurationDone`.
    pub supports_configuration_done_request: bool,
    /// Whether the adapter supports conditional breakpoints.
    pub supports_conditional_breakpoints: bool,
    /// Whether the adapter supports hit-count breakpoints.
    pub supports_hit_conditional_breakpoints: bool,
    /// Whether the adapter supports the `terminate` request.
    pub supports_terminate_request: bool,
    /// Whether the adapter supports the `modules` request.
    pub supports_modules_request: bool,
}

impl DapCapabilities {
    /// Resolve the protocol-level [`Capabilities`] returned by `initialize`.
    pub fn from_initialize_response(caps: &Capabilities) -> Self {
        Self {
            supports_configuration_done_request: caps
                .supports_configuration_done_request
                .unwrap_or(false),
            supports_conditional_breakpoints: caps
                .supports_conditional_breakpoints
                .unwrap_or(false),
            supports_hit_conditional_breakpoints: caps
                .supports_hit_conditional_breakpoints
                .unwrap_or(false),
            supports_terminate_request: caps.supports_terminate_request.unwrap_or(false),
            supports_modules_request: caps.supports_modules_request.unwrap_or(false),
        }
    }

    /// Hit condition for a breakpoint that should skip `ignore_count` hits.
    ///
    /// lldb-dap reads a numeric hit condition as the hit to stop on, so
    /// skipping `n` hits is `n + 1`. `None` when there is nothing to skip
    /// or the adapter cannot honour it.
    pub fn hit_condition(&self, ignore_count: u32) -> Option<String> {
        (ignore_count > 0 && self.supports_hit_conditional_breakpoints)
            .then(|| (u64::from(ignore_count) + 1).to_string())
    }

    /// Condition to send for a breakpoint, dropped when unsupported.
    pub fn condition(&self, condition: Option<&str>) -> Option<String> {
        condition
            .filter(|_| self.supports_conditional_breakpoints)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_from_full_response() {
        let caps = Capabilities {
            supports_configuration_done_request: Some(true),
            supports_conditional_breakpoints: Some(true),
            supports_hit_conditional_breakpoints: Some(false),
            supports_terminate_request: Some(true),
            supports_modules_request: Some(true),
            supports_disassemble_request: None,
        };
        let resolved = DapCapabilities::from_initialize_response(&caps);
        assert!(resolved.supports_configuration_done_request);
        assert!(resolved.supports_conditional_breakpoints);
        assert!(!resolved.supports_hit_conditional_breakpoints);
        assert!(resolved.supports_terminate_request);
        assert!(resolved.supports_modules_request);
    }

    #[test]
    fn capabilities_from_empty_response() {
        let resolved = DapCapabilities::from_initialize_response(&Capabilities::default());
        assert_eq!(resolved, DapCapabilities::default());
    }

    #[test]
    fn hit_condition_only_when_skipping() {
        let caps = DapCapabilities {
            supports_hit_conditional_breakpoints: true,
            ..Default::default()
        };
        assert_eq!(caps.hit_condition(0), None);
        assert_eq!(caps.hit_condition(3).as_deref(), Some("4"));
        assert_eq!(DapCapabilities::default().hit_condition(3), None);
    }

    #[test]
    fn condition_dropped_when_unsupported() {
        let caps = DapCapabilities {
            supports_conditional_breakpoints: true,
            ..Default::default()
        };
        assert_eq!(caps.condition(Some("i > 2")).as_deref(), Some("i > 2"));
        assert_eq!(caps.condition(None), None);
        assert_eq!(DapCapabilities::default().condition(Some("i > 2")), None);
    }
}
