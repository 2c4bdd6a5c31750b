use media_migrate_models::RunOutcome;
use media_migrate_sources::MigrateError;

pub const SUCCESS: i32 = 0;
/// Bad configuration, failed prompt, or any error outside the taxonomy
pub const CONFIG_ERROR: i32 = 1;
pub const AUTH_FAILURE: i32 = 2;
pub const PARTIAL: i32 = 3;
pub const TOTAL_FAILURE: i32 = 4;
/// Migration was clean but `migration.log` missed lines
pub const LOG_INCOMPLETE: i32 = 5;
pub const INTERRUPTED: i32 = 130;

pub fn for_outcome(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success => SUCCESS,
        RunOutcome::Partial => PARTIAL,
        RunOutcome::TotalFailure => TOTAL_FAILURE,
        RunOutcome::Interrupted => INTERRUPTED,
        RunOutcome::LogIncomplete => LOG_INCOMPLETE,
    }
}

/// Exit code for an error raised before the migration loop started
pub fn for_error(error: &MigrateError) -> i32 {
    match error {
        MigrateError::Interrupted => INTERRUPTED,
        MigrateError::AuthExpired { .. } => AUTH_FAILURE,
        e if e.is_auth_failure() => AUTH_FAILURE,
        MigrateError::ServiceUnavailable { .. } => TOTAL_FAILURE,
        _ => CONFIG_ERROR,
    }
}
