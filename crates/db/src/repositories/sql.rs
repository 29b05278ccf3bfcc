use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::warn;

use boqtrack_core::domain::delivery::{
    Delivery, DeliveryCondition, DeliveryId, DeliveryItem, DeliveryItemId,
};
use boqtrack_core::domain::material::{Material, MaterialId, MaterialStatus, ResourceType};
use boqtrack_core::domain::purchase_order::{
    PurchaseOrder, PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId, PurchaseOrderStatus,
};
use boqtrack_core::domain::request::{
    PlannedWindow, Priority, Request, RequestId, RequestStatus,
};
use boqtrack_core::domain::site::{ProjectId, SiteId};
use boqtrack_core::store::{ChangeSet, ProcurementStore, StoreError, Versioned};

use super::RepositoryError;
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, reference_code, project_id, site_id, title, description, \
     created_by, planned_start, planned_end, emergency, status, duplicate_of, \
     duplicate_explanation, version, created_at, updated_at";

const MATERIAL_COLUMNS: &str = "id, request_id, position, name, quantity, unit, rate_estimate, \
     resource_type, status, revision, review_note, version, updated_at";

const PURCHASE_ORDER_COLUMNS: &str =
    "id, number, project_id, site_id, status, created_by, version, created_at, updated_at";

const PURCHASE_ORDER_ITEM_COLUMNS: &str =
    "id, purchase_order_id, request_id, position, description, quantity, unit_price, total_price";

const DELIVERY_COLUMNS: &str =
    "id, purchase_order_id, delivered_at, verified_by, notes, created_at";

const DELIVERY_ITEM_COLUMNS: &str =
    "id, delivery_id, purchase_order_item_id, quantity, condition, remarks";

pub struct SqlProcurementStore {
    pool: DbPool,
}

impl SqlProcurementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_all<T>(
        &self,
        sql: &str,
        key: &str,
        decode: fn(&SqliteRow) -> Result<T, RepositoryError>,
    ) -> Result<Vec<T>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?)
    }

    async fn fetch_optional<T>(
        &self,
        sql: &str,
        key: &str,
        decode: fn(&SqliteRow) -> Result<T, RepositoryError>,
    ) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(row.as_ref().map(decode).transpose()?)
    }

    async fn exists(&self, sql: &str, key: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(count > 0)
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for request in &changes.new_requests {
            insert_request(&mut tx, request).await?;
        }
        for material in &changes.new_materials {
            insert_material(&mut tx, material).await?;
        }
        for order in &changes.new_purchase_orders {
            insert_purchase_order(&mut tx, order).await?;
        }
        for item in &changes.new_purchase_order_items {
            insert_purchase_order_item(&mut tx, item).await?;
        }
        for delivery in &changes.new_deliveries {
            insert_delivery(&mut tx, delivery).await?;
        }
        for item in &changes.new_delivery_items {
            insert_delivery_item(&mut tx, item).await?;
        }

        for update in &changes.updated_requests {
            update_request(&mut tx, update).await?;
        }
        for update in &changes.updated_materials {
            update_material(&mut tx, update).await?;
        }
        for update in &changes.updated_purchase_orders {
            update_purchase_order(&mut tx, update).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ProcurementStore for SqlProcurementStore {
    async fn find_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?");
        self.fetch_optional(&sql, &id.0, request_from_row).await
    }

    async fn request_reference_exists(&self, reference_code: &str) -> Result<bool, StoreError> {
        self.exists("SELECT COUNT(*) FROM request WHERE reference_code = ?", reference_code).await
    }

    async fn requests_overlapping(
        &self,
        site_id: &SiteId,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Request>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM request
             WHERE site_id = ? AND planned_start < ? AND planned_end > ?
             ORDER BY planned_start ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(&site_id.0)
            .bind(format_timestamp(window_end))
            .bind(format_timestamp(window_start))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.iter().map(request_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_material(&self, id: &MaterialId) -> Result<Option<Material>, StoreError> {
        let sql = format!("SELECT {MATERIAL_COLUMNS} FROM material WHERE id = ?");
        self.fetch_optional(&sql, &id.0, material_from_row).await
    }

    async fn materials_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Material>, StoreError> {
        let sql = format!(
            "SELECT {MATERIAL_COLUMNS} FROM material WHERE request_id = ? ORDER BY position ASC"
        );
        self.fetch_all(&sql, &request_id.0, material_from_row).await
    }

    async fn find_purchase_order(
        &self,
        id: &PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        let sql = format!("SELECT {PURCHASE_ORDER_COLUMNS} FROM purchase_order WHERE id = ?");
        self.fetch_optional(&sql, &id.0, purchase_order_from_row).await
    }

    async fn purchase_order_number_exists(&self, number: &str) -> Result<bool, StoreError> {
        self.exists("SELECT COUNT(*) FROM purchase_order WHERE number = ?", number).await
    }

    async fn purchase_order_items_for_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        let sql = format!(
            "SELECT {PURCHASE_ORDER_ITEM_COLUMNS} FROM purchase_order_item
             WHERE purchase_order_id = ? ORDER BY position ASC"
        );
        self.fetch_all(&sql, &purchase_order_id.0, purchase_order_item_from_row).await
    }

    async fn purchase_order_items_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        let sql = format!(
            "SELECT {PURCHASE_ORDER_ITEM_COLUMNS} FROM purchase_order_item
             WHERE request_id = ? ORDER BY purchase_order_id ASC, position ASC"
        );
        self.fetch_all(&sql, &request_id.0, purchase_order_item_from_row).await
    }

    async fn deliveries_for_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<Delivery>, StoreError> {
        let sql = format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery
             WHERE purchase_order_id = ? ORDER BY delivered_at ASC, id ASC"
        );
        self.fetch_all(&sql, &purchase_order_id.0, delivery_from_row).await
    }

    async fn delivery_items_for_order_item(
        &self,
        purchase_order_item_id: &PurchaseOrderItemId,
    ) -> Result<Vec<DeliveryItem>, StoreError> {
        let sql = format!(
            "SELECT {DELIVERY_ITEM_COLUMNS} FROM delivery_item
             WHERE purchase_order_item_id = ? ORDER BY rowid ASC"
        );
        self.fetch_all(&sql, &purchase_order_item_id.0, delivery_item_from_row).await
    }

    async fn reserve_sequence(&self, key: &str) -> Result<u32, StoreError> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO sequence_counter (name, current_value) VALUES (?, 1)
             ON CONFLICT(name) DO UPDATE SET current_value = current_value + 1
             RETURNING current_value",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        u32::try_from(value)
            .map_err(|_| StoreError::Backend(format!("sequence `{key}` overflowed: {value}")))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        self.apply(&changes).await.map_err(|error| {
            let error = StoreError::from(error);
            warn!(
                event_name = "store.commit.rejected",
                conflict = matches!(error, StoreError::Conflict(_)),
                error = %error,
                "change set rolled back"
            );
            error
        })
    }
}

async fn insert_request(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO request (id, reference_code, project_id, site_id, title, description,
                              created_by, planned_start, planned_end, emergency, priority, status,
                              duplicate_of, duplicate_explanation, version, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.id.0)
    .bind(&request.reference_code)
    .bind(&request.project_id.0)
    .bind(&request.site_id.0)
    .bind(&request.title)
    .bind(&request.description)
    .bind(&request.created_by)
    .bind(format_timestamp(request.window.start()))
    .bind(format_timestamp(request.window.end()))
    .bind(request.emergency)
    .bind(request.priority.as_str())
    .bind(request.status.as_str())
    .bind(request.duplicate_of.as_ref().map(|id| id.0.as_str()))
    .bind(&request.duplicate_explanation)
    .bind(request.version)
    .bind(format_timestamp(request.created_at))
    .bind(format_timestamp(request.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_material(
    conn: &mut SqliteConnection,
    material: &Material,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO material (id, request_id, position, name, quantity, unit, rate_estimate,
                               resource_type, status, revision, review_note, version, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&material.id.0)
    .bind(&material.request_id.0)
    .bind(i64::from(material.position))
    .bind(&material.name)
    .bind(material.quantity.to_string())
    .bind(&material.unit)
    .bind(material.rate_estimate.to_string())
    .bind(material.resource_type.as_str())
    .bind(material.status.as_str())
    .bind(i64::from(material.revision))
    .bind(&material.review_note)
    .bind(material.version)
    .bind(format_timestamp(material.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_purchase_order(
    conn: &mut SqliteConnection,
    order: &PurchaseOrder,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO purchase_order (id, number, project_id, site_id, status, created_by,
                                     version, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.id.0)
    .bind(&order.number)
    .bind(&order.project_id.0)
    .bind(order.site_id.as_ref().map(|id| id.0.as_str()))
    .bind(order.status.as_str())
    .bind(&order.created_by)
    .bind(order.version)
    .bind(format_timestamp(order.created_at))
    .bind(format_timestamp(order.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_purchase_order_item(
    conn: &mut SqliteConnection,
    item: &PurchaseOrderItem,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO purchase_order_item (id, purchase_order_id, request_id, position,
                                          description, quantity, unit_price, total_price)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&item.id.0)
    .bind(&item.purchase_order_id.0)
    .bind(&item.request_id.0)
    .bind(i64::from(item.position))
    .bind(&item.description)
    .bind(item.quantity.to_string())
    .bind(item.unit_price.to_string())
    .bind(item.total_price.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_delivery(
    conn: &mut SqliteConnection,
    delivery: &Delivery,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO delivery (id, purchase_order_id, delivered_at, verified_by, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&delivery.id.0)
    .bind(&delivery.purchase_order_id.0)
    .bind(format_timestamp(delivery.delivered_at))
    .bind(&delivery.verified_by)
    .bind(&delivery.notes)
    .bind(format_timestamp(delivery.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_delivery_item(
    conn: &mut SqliteConnection,
    item: &DeliveryItem,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO delivery_item (id, delivery_id, purchase_order_item_id, quantity, condition,
                                    remarks)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&item.id.0)
    .bind(&item.delivery_id.0)
    .bind(&item.purchase_order_item_id.0)
    .bind(item.quantity.to_string())
    .bind(item.condition.as_str())
    .bind(&item.remarks)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_request(
    conn: &mut SqliteConnection,
    update: &Versioned<Request>,
) -> Result<(), RepositoryError> {
    let request = &update.value;
    let result = sqlx::query(
        "UPDATE request
         SET title = ?, description = ?, planned_start = ?, planned_end = ?, emergency = ?,
             priority = ?, status = ?, duplicate_of = ?, duplicate_explanation = ?,
             version = ?, updated_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(&request.title)
    .bind(&request.description)
    .bind(format_timestamp(request.window.start()))
    .bind(format_timestamp(request.window.end()))
    .bind(request.emergency)
    .bind(request.priority.as_str())
    .bind(request.status.as_str())
    .bind(request.duplicate_of.as_ref().map(|id| id.0.as_str()))
    .bind(&request.duplicate_explanation)
    .bind(update.expected_version + 1)
    .bind(format_timestamp(request.updated_at))
    .bind(&request.id.0)
    .bind(update.expected_version)
    .execute(&mut *conn)
    .await?;

    ensure_updated(result.rows_affected(), "request", &request.id.0, update.expected_version)
}

async fn update_material(
    conn: &mut SqliteConnection,
    update: &Versioned<Material>,
) -> Result<(), RepositoryError> {
    let material = &update.value;
    let result = sqlx::query(
        "UPDATE material
         SET name = ?, quantity = ?, unit = ?, rate_estimate = ?, resource_type = ?, status = ?,
             revision = ?, review_note = ?, version = ?, updated_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(&material.name)
    .bind(material.quantity.to_string())
    .bind(&material.unit)
    .bind(material.rate_estimate.to_string())
    .bind(material.resource_type.as_str())
    .bind(material.status.as_str())
    .bind(i64::from(material.revision))
    .bind(&material.review_note)
    .bind(update.expected_version + 1)
    .bind(format_timestamp(material.updated_at))
    .bind(&material.id.0)
    .bind(update.expected_version)
    .execute(&mut *conn)
    .await?;

    ensure_updated(result.rows_affected(), "material", &material.id.0, update.expected_version)
}

async fn update_purchase_order(
    conn: &mut SqliteConnection,
    update: &Versioned<PurchaseOrder>,
) -> Result<(), RepositoryError> {
    let order = &update.value;
    let result = sqlx::query(
        "UPDATE purchase_order
         SET site_id = ?, status = ?, version = ?, updated_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(order.site_id.as_ref().map(|id| id.0.as_str()))
    .bind(order.status.as_str())
    .bind(update.expected_version + 1)
    .bind(format_timestamp(order.updated_at))
    .bind(&order.id.0)
    .bind(update.expected_version)
    .execute(&mut *conn)
    .await?;

    ensure_updated(result.rows_affected(), "purchase order", &order.id.0, update.expected_version)
}

fn ensure_updated(
    rows_affected: u64,
    entity: &str,
    id: &str,
    expected_version: i64,
) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        return Err(RepositoryError::VersionConflict(format!(
            "{entity} `{id}` is missing or no longer at version {expected_version}"
        )));
    }
    Ok(())
}

fn request_from_row(row: &SqliteRow) -> Result<Request, RepositoryError> {
    let status: String = row.try_get("status")?;
    let planned_start: String = row.try_get("planned_start")?;
    let planned_end: String = row.try_get("planned_end")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let emergency: bool = row.try_get("emergency")?;

    let window = PlannedWindow::new(
        parse_rfc3339("planned_start", &planned_start)?,
        parse_rfc3339("planned_end", &planned_end)?,
    )
    .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Request {
        id: RequestId(row.try_get("id")?),
        reference_code: row.try_get("reference_code")?,
        project_id: ProjectId(row.try_get("project_id")?),
        site_id: SiteId(row.try_get("site_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        window,
        emergency,
        priority: Priority::from_emergency(emergency),
        status: RequestStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid request status: {status}")))?,
        duplicate_of: row.try_get::<Option<String>, _>("duplicate_of")?.map(RequestId),
        duplicate_explanation: row.try_get("duplicate_explanation")?,
        version: row.try_get("version")?,
        created_at: parse_rfc3339("created_at", &created_at)?,
        updated_at: parse_rfc3339("updated_at", &updated_at)?,
    })
}

fn material_from_row(row: &SqliteRow) -> Result<Material, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let rate_estimate: String = row.try_get("rate_estimate")?;
    let resource_type: String = row.try_get("resource_type")?;
    let status: String = row.try_get("status")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Material {
        id: MaterialId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        position: parse_u32("position", row.try_get("position")?)?,
        name: row.try_get("name")?,
        quantity: parse_decimal("quantity", &quantity)?,
        unit: row.try_get("unit")?,
        rate_estimate: parse_decimal("rate_estimate", &rate_estimate)?,
        resource_type: ResourceType::parse(&resource_type).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid resource type: {resource_type}"))
        })?,
        status: MaterialStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid material status: {status}")))?,
        revision: parse_u32("revision", row.try_get("revision")?)?,
        review_note: row.try_get("review_note")?,
        version: row.try_get("version")?,
        updated_at: parse_rfc3339("updated_at", &updated_at)?,
    })
}

fn purchase_order_from_row(row: &SqliteRow) -> Result<PurchaseOrder, RepositoryError> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(PurchaseOrder {
        id: PurchaseOrderId(row.try_get("id")?),
        number: row.try_get("number")?,
        project_id: ProjectId(row.try_get("project_id")?),
        site_id: row.try_get::<Option<String>, _>("site_id")?.map(SiteId),
        status: PurchaseOrderStatus::parse(&status).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid purchase order status: {status}"))
        })?,
        created_by: row.try_get("created_by")?,
        version: row.try_get("version")?,
        created_at: parse_rfc3339("created_at", &created_at)?,
        updated_at: parse_rfc3339("updated_at", &updated_at)?,
    })
}

fn purchase_order_item_from_row(row: &SqliteRow) -> Result<PurchaseOrderItem, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let unit_price: String = row.try_get("unit_price")?;
    let total_price: String = row.try_get("total_price")?;

    Ok(PurchaseOrderItem {
        id: PurchaseOrderItemId(row.try_get("id")?),
        purchase_order_id: PurchaseOrderId(row.try_get("purchase_order_id")?),
        request_id: RequestId(row.try_get("request_id")?),
        position: parse_u32("position", row.try_get("position")?)?,
        description: row.try_get("description")?,
        quantity: parse_decimal("quantity", &quantity)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        total_price: parse_decimal("total_price", &total_price)?,
    })
}

fn delivery_from_row(row: &SqliteRow) -> Result<Delivery, RepositoryError> {
    let delivered_at: String = row.try_get("delivered_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Delivery {
        id: DeliveryId(row.try_get("id")?),
        purchase_order_id: PurchaseOrderId(row.try_get("purchase_order_id")?),
        delivered_at: parse_rfc3339("delivered_at", &delivered_at)?,
        verified_by: row.try_get("verified_by")?,
        notes: row.try_get("notes")?,
        created_at: parse_rfc3339("created_at", &created_at)?,
    })
}

fn delivery_item_from_row(row: &SqliteRow) -> Result<DeliveryItem, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let condition: String = row.try_get("condition")?;

    Ok(DeliveryItem {
        id: DeliveryItemId(row.try_get("id")?),
        delivery_id: DeliveryId(row.try_get("delivery_id")?),
        purchase_order_item_id: PurchaseOrderItemId(row.try_get("purchase_order_item_id")?),
        quantity: parse_decimal("quantity", &quantity)?,
        condition: DeliveryCondition::parse(&condition).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid delivery condition: {condition}"))
        })?,
        remarks: row.try_get("remarks")?,
    })
}

/// Fixed-width UTC timestamps keep lexicographic and chronological order equal,
/// which the window overlap query relies on.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} decimal '{}': {}", field, value, err))
    })
}

fn parse_u32(field: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{field} out of range: {value}")))
}
