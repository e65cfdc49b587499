//! Process exit codes.

use accelbench_core::{BenchError, ConfigError};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
/// Discovery unavailable, enumeration failed, or no compute adapter.
pub const EXIT_NO_ACCELERATOR: i32 = 3;
pub const EXIT_PROVISION: i32 = 4;
/// Model open, session creation or tensor binding failed.
pub const EXIT_MODEL_LOAD: i32 = 5;
/// A run or fence signal was rejected.
pub const EXIT_SUBMISSION: i32 = 6;
pub const EXIT_SYNC_TIMEOUT: i32 = 7;

/// Map an error chain to its exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(bench) = err.downcast_ref::<BenchError>() {
        return match bench {
            BenchError::Config(_) => EXIT_CONFIG,
            BenchError::EnumerationUnavailable(_)
            | BenchError::EnumerationFailed(_)
            | BenchError::NoSuitableAdapter { .. } => EXIT_NO_ACCELERATOR,
            BenchError::Provision(_) => EXIT_PROVISION,
            BenchError::ModelLoad { .. } | BenchError::Binding(_) => EXIT_MODEL_LOAD,
            BenchError::Submission { .. } | BenchError::Sync(_) => EXIT_SUBMISSION,
            BenchError::SyncTimeout { .. } => EXIT_SYNC_TIMEOUT,
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    EXIT_GENERIC_FAIL
}

#[cfg(test)]
mod tests {
    use super::*;
    use accelbench_backend::BackendError;
    use accelbench_core::engine::EngineError;
    use accelbench_core::{ProvisionError, SyncError};
    use std::time::Duration;

    #[test]
    fn codes_follow_error_taxonomy() {
        let e = anyhow::Error::new(BenchError::NoSuitableAdapter { enumerated: 0 });
        assert_eq!(exit_code(&e), EXIT_NO_ACCELERATOR);
        let e = anyhow::Error::new(BenchError::SyncTimeout {
            target: 2,
            completed: 1,
            timeout: Duration::from_millis(5),
        });
        assert_eq!(exit_code(&e), EXIT_SYNC_TIMEOUT);
        let e = anyhow::Error::new(BenchError::Provision(ProvisionError::Queue(
            BackendError::call_failed("CreateCommandQueue", "out of memory"),
        )));
        assert_eq!(exit_code(&e), EXIT_PROVISION);
        let e = anyhow::Error::new(BenchError::Submission {
            fence_value: 2,
            source: EngineError::Incompatible("device removed".into()),
        });
        assert_eq!(exit_code(&e), EXIT_SUBMISSION);
        let e = anyhow::Error::new(BenchError::Sync(SyncError::NonMonotonic {
            last: 3,
            requested: 3,
        }));
        assert_eq!(exit_code(&e), EXIT_SUBMISSION);
        let e = anyhow::Error::new(ConfigError::Validation("bad".into()));
        assert_eq!(exit_code(&e), EXIT_CONFIG);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), EXIT_GENERIC_FAIL);
    }

    #[test]
    fn context_does_not_hide_the_code() {
        let e = anyhow::Error::new(BenchError::NoSuitableAdapter { enumerated: 0 })
            .context("benchmark failed");
        assert_eq!(exit_code(&e), EXIT_NO_ACCELERATOR);
    }
}
