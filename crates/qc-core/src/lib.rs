pub mod config;
pub mod events;
pub mod state;
pub mod types;
pub mod validation;

pub use config::*;
pub use events::*;
pub use state::*;
pub use types::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::{parse_quality_config, ExecutionMode, ResultStatus, RunId, SuiteId, Validate};
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_core_types() {
        let _ = TypeId::of::<SuiteId>();
        let _ = TypeId::of::<RunId>();
        let _ = TypeId::of::<ExecutionMode>();
        let _ = TypeId::of::<ResultStatus>();
    }

    #[test]
    fn crate_root_reexports_parse_and_validate_helpers() {
        let mut config = parse_quality_config(
            r#"
[engine]
default_case_timeout_ms = 45000
keep_artifacts = true

[judge]
enabled = true
default_min_quality = 0.6

[rollout]
review_reject_delta_warn = 0.05
qa_failure_delta_warn = 0.03
default_minimum_sample_size = 50
"#,
        )
        .expect("parse config");

        assert!(config.validate().is_empty());

        config.engine.default_case_timeout_ms = 0;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|issue| issue.code == "engine.case_timeout.zero"));
    }
}
