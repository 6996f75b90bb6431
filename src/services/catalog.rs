use crate::{
    db::DbPool,
    entities::inventory_log_entry::EntryType,
    entities::product::{self, ActiveModel as ProductActiveModel, Entity as ProductEntity, Model as ProductModel},
    errors::ServiceError,
    services::inventory::{AdjustStockRequest, InventoryService},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0, message = "Initial stock cannot be negative"))]
    pub initial_stock: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub properties: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub low_stock_threshold: Option<i32>,
    pub is_active: Option<bool>,
    pub properties: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

/// Product catalog management. Stock is never written here directly; a
/// creation with initial stock routes through the inventory ledger.
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    inventory: InventoryService,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, inventory: InventoryService) -> Self {
        Self { db_pool, inventory }
    }

    #[instrument(skip(self))]
    pub async fn list_active(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let db = &*self.db_pool;
        let paginator = ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        let db = &*self.db_pool;
        ProductEntity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductModel, ServiceError> {
        request.validate()?;
        if request.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price cannot be negative".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let product_id = Uuid::new_v4();
        let product = ProductActiveModel {
            id: Set(product_id),
            name: Set(request.name),
            description: Set(request.description),
            price: Set(request.price),
            stock_quantity: Set(0),
            low_stock_threshold: Set(request.low_stock_threshold.unwrap_or(5)),
            is_active: Set(true),
            properties: Set(encode_list(request.properties)?),
            colors: Set(encode_list(request.colors)?),
            images: Set(encode_list(request.images)?),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        // Initial stock arrives through the ledger like any other restock
        let initial = request.initial_stock.unwrap_or(0);
        let mut snapshot = product;
        if initial > 0 {
            let (_, updated) = self
                .inventory
                .apply_adjustment(
                    &txn,
                    &AdjustStockRequest {
                        product_id,
                        delta: initial,
                        entry_type: EntryType::Restock,
                        reason: Some("initial_stock".to_string()),
                        reference: None,
                    },
                )
                .await?;
            snapshot = updated;
        }

        txn.commit().await?;
        info!(%product_id, "product created");
        Ok(snapshot)
    }

    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductModel, ServiceError> {
        request.validate()?;
        if let Some(price) = request.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Price cannot be negative".to_string(),
                ));
            }
        }

        let db = &*self.db_pool;
        let current = self.get(product_id).await?;

        let mut active: ProductActiveModel = current.clone().into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(threshold) = request.low_stock_threshold {
            active.low_stock_threshold = Set(threshold);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(properties) = request.properties {
            active.properties = Set(encode_list(Some(properties))?);
        }
        if let Some(colors) = request.colors {
            active.colors = Set(encode_list(Some(colors))?);
        }
        if let Some(images) = request.images {
            active.images = Set(encode_list(Some(images))?);
        }
        active.version = Set(current.version + 1);
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await?;
        info!(%product_id, "product updated");
        Ok(updated)
    }

    /// Soft delete: the product leaves the public catalog but its orders
    /// and ledger history stay intact.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        let db = &*self.db_pool;
        let current = self.get(product_id).await?;
        let version = current.version;

        let mut active: ProductActiveModel = current.into();
        active.is_active = Set(false);
        active.version = Set(version + 1);
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await?;
        info!(%product_id, "product deactivated");
        Ok(updated)
    }
}

fn encode_list(list: Option<Vec<String>>) -> Result<Option<String>, ServiceError> {
    match list {
        Some(items) => Ok(Some(serde_json::to_string(&items)?)),
        None => Ok(None),
    }
}
