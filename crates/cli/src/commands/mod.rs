pub mod close;
pub mod config;
pub mod doctor;
pub mod duplicates;
pub mod migrate;
pub mod reconcile;

use std::future::Future;
use std::sync::Arc;

use boqtrack_core::audit::TracingAuditSink;
use boqtrack_core::config::{AppConfig, LoadOptions};
use boqtrack_core::services::ProcurementServices;
use boqtrack_core::{Actor, ActorRole, ApplicationError, InterfaceError};
use boqtrack_db::{connect_with_settings, migrations, SqlProcurementStore};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_NOT_FOUND: u8 = 6;
pub const EXIT_CONFLICT: u8 = 7;
pub const EXIT_BAD_REQUEST: u8 = 8;
pub const EXIT_UNAVAILABLE: u8 = 9;
pub const EXIT_INTERNAL: u8 = 10;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, Value::Null)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), EXIT_INTERNAL)
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Maps a service error onto the operator-facing error classes.
    pub fn from_application_error(command: &str, error: ApplicationError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let interface = error.into_interface(correlation_id.clone());
        let (error_class, exit_code, detail) = match &interface {
            InterfaceError::BadRequest { message, .. } => {
                ("bad_request", EXIT_BAD_REQUEST, message)
            }
            InterfaceError::NotFound { message, .. } => ("not_found", EXIT_NOT_FOUND, message),
            InterfaceError::Conflict { message, .. } => ("conflict", EXIT_CONFLICT, message),
            InterfaceError::ServiceUnavailable { message, .. } => {
                ("service_unavailable", EXIT_UNAVAILABLE, message)
            }
            InterfaceError::Internal { message, .. } => ("internal", EXIT_INTERNAL, message),
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: format!("{} ({detail})", interface.user_message()),
            correlation_id: Some(correlation_id),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// The identity recorded in audit events for operator commands.
pub fn operator() -> Actor {
    Actor::new("boqtrack-cli", ActorRole::Admin)
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

/// Runs `task` on a fresh current-thread runtime.
pub(crate) fn block_on<F>(command: &str, task: F) -> Result<F::Output, CommandResult>
where
    F: Future,
{
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        })?;
    Ok(runtime.block_on(task))
}

/// Connects, applies pending migrations, and wires the services against the
/// SQL store with audit events forwarded to tracing.
pub(crate) async fn open_services(
    command: &str,
    config: &AppConfig,
) -> Result<ProcurementServices, CommandResult> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| {
        CommandResult::failure(
            command,
            "db_connectivity",
            format!("failed to connect to database: {error}"),
            EXIT_DB_CONNECTIVITY,
        )
    })?;

    migrations::run_pending(&pool).await.map_err(|error| {
        CommandResult::failure(command, "migration", error.to_string(), EXIT_MIGRATION)
    })?;
    info!(
        event_name = "cli.bootstrap.migrations_applied",
        command,
        "database migrations applied"
    );

    let store = Arc::new(SqlProcurementStore::new(pool));
    Ok(ProcurementServices::new(store, Arc::new(TracingAuditSink), config))
}
