use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    /// Mutated only through the inventory ledger.
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub properties: Option<String>,
    pub colors: Option<String>,
    pub images: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Model {
    pub fn properties_list(&self) -> Vec<String> {
        parse_string_list(self.properties.as_deref())
    }

    pub fn colors_list(&self) -> Vec<String> {
        parse_string_list(self.colors.as_deref())
    }

    pub fn images_list(&self) -> Vec<String> {
        parse_string_list(self.images.as_deref())
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }
}

/// Parses a JSON-encoded string array stored in a text column. Legacy rows
/// sometimes hold a doubly-encoded array (a JSON string whose content is
/// itself a JSON array), and a few hold a bare string. Never errors; bad
/// data degrades to an empty or single-element list.
pub fn parse_string_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Ok(serde_json::Value::String(inner)) => {
            match serde_json::from_str::<Vec<String>>(&inner) {
                Ok(items) => items,
                Err(_) if !inner.trim().is_empty() => vec![inner],
                Err(_) => Vec::new(),
            }
        }
        _ => vec![trimmed.to_string()],
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_log_entry::Entity")]
    InventoryLogEntry,
}

impl Related<super::inventory_log_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryLogEntry.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        } else {
            active_model.updated_at = Set(Some(Utc::now()));
        }
        Ok(active_model)
    }
}
