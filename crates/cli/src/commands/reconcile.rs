use boqtrack_core::domain::request::RequestId;
use serde::Serialize;

use crate::commands::{block_on, load_config, open_services, operator, CommandResult};

#[derive(Debug, Serialize)]
struct ReconcileSummary {
    request_id: String,
    changed: bool,
    from: Option<&'static str>,
    to: Option<&'static str>,
}

pub fn run(request_id: &str) -> CommandResult {
    let config = match load_config("reconcile") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let request_id = RequestId(request_id.trim().to_string());

    let outcome = block_on("reconcile", async {
        let services = open_services("reconcile", &config).await?;
        services
            .deliveries
            .reconcile(&operator(), &request_id)
            .await
            .map_err(|error| CommandResult::from_application_error("reconcile", error))
    });

    match outcome.and_then(|inner| inner) {
        Ok(Some(change)) => CommandResult::success_with(
            "reconcile",
            format!("request moved from {} to {}", change.from.as_str(), change.to.as_str()),
            ReconcileSummary {
                request_id: request_id.0,
                changed: true,
                from: Some(change.from.as_str()),
                to: Some(change.to.as_str()),
            },
        ),
        Ok(None) => CommandResult::success_with(
            "reconcile",
            "request status already current",
            ReconcileSummary { request_id: request_id.0, changed: false, from: None, to: None },
        ),
        Err(failure) => failure,
    }
}
