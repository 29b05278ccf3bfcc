use boqtrack_core::domain::purchase_order::PurchaseOrderId;
use serde_json::json;

use crate::commands::{block_on, load_config, open_services, operator, CommandResult};

pub fn run(purchase_order_id: &str) -> CommandResult {
    let config = match load_config("close") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let purchase_order_id = PurchaseOrderId(purchase_order_id.trim().to_string());

    let outcome = block_on("close", async {
        let services = open_services("close", &config).await?;
        services
            .purchase_orders
            .close_if_complete(&operator(), &purchase_order_id)
            .await
            .map_err(|error| CommandResult::from_application_error("close", error))
    });

    match outcome.and_then(|inner| inner) {
        Ok(closed) => {
            let message = if closed {
                "purchase order closed"
            } else {
                "purchase order left unchanged (already closed or not fully delivered)"
            };
            CommandResult::success_with(
                "close",
                message,
                json!({ "purchase_order_id": purchase_order_id.0, "closed": closed }),
            )
        }
        Err(failure) => failure,
    }
}
