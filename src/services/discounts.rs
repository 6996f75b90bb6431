use crate::{
    db::DbPool,
    entities::discount_code::{
        self, ActiveModel as DiscountActiveModel, CodeType, Entity as DiscountEntity,
        Model as DiscountModel,
    },
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::user::{self, Entity as UserEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const WELCOME_PERCENTAGE: i32 = 15;
const WELCOME_VALIDITY_DAYS: i64 = 30;
const CODE_SUFFIX_LEN: usize = 8;
const ISSUE_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateDiscountRequest {
    #[validate(length(min = 3, max = 40, message = "Code must be 3 to 40 characters"))]
    pub code: String,
    /// Scope to one customer; None creates a shared code
    pub email: Option<String>,
    #[validate(range(min = 1, max = 100, message = "Percentage must be 1 to 100"))]
    pub percentage: i32,
    pub code_type: Option<CodeType>,
    pub usage_limit: Option<i32>,
    pub expires_in_days: Option<i64>,
    pub reason: Option<String>,
}

/// Discount issuance, lookup, and redemption.
#[derive(Clone)]
pub struct DiscountService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl DiscountService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Best live code for the email, auto-issuing the welcome discount for
    /// first-time customers with no code and no completed order.
    #[instrument(skip(self))]
    pub async fn check_user_discounts(
        &self,
        email: &str,
    ) -> Result<Option<DiscountModel>, ServiceError> {
        let email = normalize_email(email)?;
        let db = &*self.db_pool;
        let now = Utc::now();

        let best = DiscountEntity::find()
            .filter(discount_code::Column::Email.eq(email.clone()))
            .filter(discount_code::Column::IsValid.eq(true))
            .order_by_desc(discount_code::Column::Percentage)
            .all(db)
            .await?
            .into_iter()
            .find(|code| code.is_redeemable(now));

        if best.is_some() {
            return Ok(best);
        }

        if self.has_order_history(&email).await? {
            return Ok(None);
        }

        let issued = self.issue_welcome_code(&email).await?;
        Ok(Some(issued))
    }

    async fn has_order_history(&self, email: &str) -> Result<bool, ServiceError> {
        let db = &*self.db_pool;
        let Some(account) = UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .one(db)
            .await?
        else {
            return Ok(false);
        };

        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(account.id))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled.as_str()))
            .count(db)
            .await?;
        Ok(orders > 0)
    }

    async fn issue_welcome_code(&self, email: &str) -> Result<DiscountModel, ServiceError> {
        let db = &*self.db_pool;

        for _ in 0..ISSUE_MAX_ATTEMPTS {
            let code = format!("WELCOME-{}", random_suffix());
            let model = DiscountActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set(code.clone()),
                email: Set(Some(email.to_string())),
                percentage: Set(WELCOME_PERCENTAGE),
                code_type: Set(CodeType::Percentage.as_str().to_string()),
                is_valid: Set(true),
                usage_limit: Set(None),
                usage_count: Set(0),
                expires_at: Set(Some(Utc::now() + Duration::days(WELCOME_VALIDITY_DAYS))),
                reason: Set(Some("welcome".to_string())),
                created_at: Set(Utc::now()),
                updated_at: Set(None),
            };

            match model.insert(db).await {
                Ok(issued) => {
                    info!(code = %issued.code, "welcome discount issued");
                    if let Some(sender) = &self.event_sender {
                        sender
                            .send(Event::DiscountIssued {
                                code: issued.code.clone(),
                                email: issued.email.clone(),
                            })
                            .await;
                    }
                    return Ok(issued);
                }
                Err(e) => match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        warn!(code, "welcome code collided, regenerating");
                        continue;
                    }
                    _ => return Err(e.into()),
                },
            }
        }

        Err(ServiceError::InternalError(
            "Could not generate a unique welcome code".to_string(),
        ))
    }

    /// Unified redemption for personal and shared codes. Re-validates at
    /// redemption time; the invalidation/increment is guarded so concurrent
    /// redemptions cannot double-spend a personal code or overrun a shared
    /// code's usage limit.
    #[instrument(skip(self))]
    pub async fn redeem(&self, code: &str, email: &str) -> Result<DiscountModel, ServiceError> {
        let email = normalize_email(email)?;
        let code = code.trim().to_ascii_uppercase();
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await?;

        let discount = DiscountEntity::find()
            .filter(discount_code::Column::Code.eq(code.clone()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {code} not found")))?;

        if let Some(owner) = &discount.email {
            if !owner.eq_ignore_ascii_case(&email) {
                txn.rollback().await?;
                return Err(ServiceError::ValidationError(
                    "Discount code is not valid for this customer".to_string(),
                ));
            }
        }

        if !discount.is_redeemable(now) {
            txn.rollback().await?;
            return Err(ServiceError::ValidationError(
                "Discount code is no longer valid".to_string(),
            ));
        }

        if !apply_redemption(&txn, &discount, now).await? {
            txn.rollback().await?;
            return Err(ServiceError::Conflict(
                "Discount code was redeemed concurrently".to_string(),
            ));
        }

        let redeemed = DiscountEntity::find_by_id(discount.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Discount row vanished".to_string()))?;
        txn.commit().await?;

        info!(code = %redeemed.code, "discount redeemed");
        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::DiscountRedeemed {
                    code: redeemed.code.clone(),
                    email,
                })
                .await;
        }
        Ok(redeemed)
    }

    /// Admin issuance. Duplicate codes surface as 409.
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_discount(
        &self,
        request: CreateDiscountRequest,
    ) -> Result<DiscountModel, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let email = match &request.email {
            Some(raw) => Some(normalize_email(raw)?),
            None => None,
        };

        let model = DiscountActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(request.code.trim().to_ascii_uppercase()),
            email: Set(email),
            percentage: Set(request.percentage),
            code_type: Set(request
                .code_type
                .unwrap_or(CodeType::Percentage)
                .as_str()
                .to_string()),
            is_valid: Set(true),
            usage_limit: Set(request.usage_limit),
            usage_count: Set(0),
            expires_at: Set(request
                .expires_in_days
                .map(|days| Utc::now() + Duration::days(days))),
            reason: Set(request.reason),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        match model.insert(db).await {
            Ok(created) => {
                info!(code = %created.code, "discount created");
                Ok(created)
            }
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(ServiceError::Conflict(
                    format!("Discount code {} already exists", request.code.trim()),
                )),
                _ => Err(e.into()),
            },
        }
    }

    /// Marks a code invalid without deleting its history.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, id: Uuid) -> Result<DiscountModel, ServiceError> {
        let db = &*self.db_pool;
        let discount = DiscountEntity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount {id} not found")))?;

        let mut active: DiscountActiveModel = discount.into();
        active.is_valid = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<DiscountModel>, u64), ServiceError> {
        let db = &*self.db_pool;
        let paginator = DiscountEntity::find()
            .order_by_desc(discount_code::Column::CreatedAt)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let codes = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((codes, total))
    }
}

fn normalize_email(raw: &str) -> Result<String, ServiceError> {
    let email = raw.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ServiceError::ValidationError(
            "A valid email address is required".to_string(),
        ));
    }
    Ok(email)
}

fn random_suffix() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect()
}

/// Guarded redemption write against the row as the caller read it.
/// Personal codes flip to invalid in one use; shared codes take a guarded
/// increment that also invalidates the row when it exhausts the limit.
/// A concurrent redemption in between makes the write miss and returns
/// `false` without touching anything.
async fn apply_redemption<C: ConnectionTrait>(
    conn: &C,
    discount: &DiscountModel,
    now: DateTime<Utc>,
) -> Result<bool, ServiceError> {
    let guarded = if discount.email.is_some() {
        DiscountEntity::update_many()
            .col_expr(
                discount_code::Column::IsValid,
                sea_orm::sea_query::Expr::value(false),
            )
            .col_expr(
                discount_code::Column::UsageCount,
                sea_orm::sea_query::Expr::value(discount.usage_count + 1),
            )
            .col_expr(
                discount_code::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(now),
            )
            .filter(discount_code::Column::Id.eq(discount.id))
            .filter(discount_code::Column::IsValid.eq(true))
            .exec(conn)
            .await?
    } else {
        let next_count = discount.usage_count + 1;
        let exhausted = discount
            .usage_limit
            .map(|limit| next_count >= limit)
            .unwrap_or(false);
        DiscountEntity::update_many()
            .col_expr(
                discount_code::Column::UsageCount,
                sea_orm::sea_query::Expr::value(next_count),
            )
            .col_expr(
                discount_code::Column::IsValid,
                sea_orm::sea_query::Expr::value(!exhausted),
            )
            .col_expr(
                discount_code::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(now),
            )
            .filter(discount_code::Column::Id.eq(discount.id))
            .filter(discount_code::Column::UsageCount.eq(discount.usage_count))
            .filter(discount_code::Column::IsValid.eq(true))
            .exec(conn)
            .await?
    };
    Ok(guarded.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrator::Migrator;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    async fn test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        Migrator::up(&db, None).await.expect("migrations");
        db
    }

    async fn seed_code(
        db: &DatabaseConnection,
        code: &str,
        email: Option<&str>,
        usage_limit: Option<i32>,
    ) -> DiscountModel {
        DiscountActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            email: Set(email.map(str::to_string)),
            percentage: Set(10),
            code_type: Set(CodeType::Percentage.as_str().to_string()),
            is_valid: Set(true),
            usage_limit: Set(usage_limit),
            usage_count: Set(0),
            expires_at: Set(None),
            reason: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .expect("seed discount")
    }

    #[tokio::test]
    async fn personal_code_spends_once() {
        let db = test_db().await;
        let code = seed_code(&db, "LUNA-ONLY", Some("luna@example.com"), None).await;

        assert!(apply_redemption(&db, &code, Utc::now()).await.unwrap());

        // The first spend invalidated the row; a writer still holding the
        // original snapshot misses
        assert!(!apply_redemption(&db, &code, Utc::now()).await.unwrap());

        let row = DiscountEntity::find_by_id(code.id)
            .one(&db)
            .await
            .unwrap()
            .expect("row");
        assert!(!row.is_valid);
        assert_eq!(row.usage_count, 1);
    }

    #[tokio::test]
    async fn shared_code_increment_is_guarded_and_exhausts_the_limit() {
        let db = test_db().await;
        let code = seed_code(&db, "SPRING", None, Some(2)).await;

        assert!(apply_redemption(&db, &code, Utc::now()).await.unwrap());

        // Stale snapshot (usage_count still 0) loses the increment race
        assert!(!apply_redemption(&db, &code, Utc::now()).await.unwrap());

        let row = DiscountEntity::find_by_id(code.id)
            .one(&db)
            .await
            .unwrap()
            .expect("row");
        assert!(row.is_valid);
        assert_eq!(row.usage_count, 1);

        // Second real redemption reaches the limit and invalidates
        assert!(apply_redemption(&db, &row, Utc::now()).await.unwrap());
        let row = DiscountEntity::find_by_id(code.id)
            .one(&db)
            .await
            .unwrap()
            .expect("row");
        assert!(!row.is_valid);
        assert_eq!(row.usage_count, 2);
    }

    #[test]
    fn email_normalization() {
        assert_eq!(
            normalize_email(" Luna@CrystalShop.example ").unwrap(),
            "luna@crystalshop.example"
        );
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("   ").is_err());
    }

    #[test]
    fn suffix_is_uppercase_alphanumeric() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), CODE_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!suffix.chars().any(|c| c.is_ascii_lowercase()));
    }
}
