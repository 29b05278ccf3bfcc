use boqtrack_core::domain::site::SiteId;
use chrono::{DateTime, Utc};

use crate::commands::{
    block_on, load_config, open_services, CommandResult, EXIT_BAD_REQUEST,
};

pub fn run(site_id: &str, start: &str, end: &str, materials: &[String]) -> CommandResult {
    let (start, end) = match (parse_timestamp("start", start), parse_timestamp("end", end)) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(message), _) | (_, Err(message)) => {
            return CommandResult::failure("duplicates", "bad_request", message, EXIT_BAD_REQUEST)
        }
    };
    let config = match load_config("duplicates") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let site_id = SiteId(site_id.trim().to_string());

    let outcome = block_on("duplicates", async {
        let services = open_services("duplicates", &config).await?;
        services
            .requests
            .find_duplicates(&site_id, materials, start, end)
            .await
            .map_err(|error| CommandResult::from_application_error("duplicates", error))
    });

    match outcome.and_then(|inner| inner) {
        Ok(warnings) => CommandResult::success_with(
            "duplicates",
            format!("{} overlapping request(s) at site {}", warnings.len(), site_id.0),
            warnings,
        ),
        Err(failure) => failure,
    }
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| format!("invalid {field} timestamp '{value}': {error}"))
}
