use copilot_core::config::{AppConfig, LoadOptions};
use copilot_db::{GuardPolicy, QueryGuard};

use crate::commands::{CommandResult, EXIT_CONFIG_INVALID, EXIT_QUERY_REJECTED};

const COMMAND: &str = "check-query";

pub fn run(sql: &str, limit: Option<u32>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                error.to_string(),
                EXIT_CONFIG_INVALID,
            );
        }
    };

    check(&QueryGuard::new(GuardPolicy::from_config(&config.guard)), sql, limit)
}

/// Validates then caps `sql`. The success message is the SQL that would run.
pub fn check(guard: &QueryGuard, sql: &str, limit: Option<u32>) -> CommandResult {
    if let Err(rejection) = guard.validate(sql) {
        return CommandResult::failure(
            COMMAND,
            "rejected_query",
            rejection.to_string(),
            EXIT_QUERY_REJECTED,
        );
    }

    let limit = limit.unwrap_or_else(|| guard.policy().default_row_limit());
    CommandResult::success(COMMAND, guard.enforce_row_cap(sql, limit))
}
