use crate::{
    db::{TenantContext, TenantDb},
    entities::tenant,
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenant {
    pub slug: String,
}

/// Slugs become URL path segments and realtime room names, so the charset
/// is locked down at creation.
fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 63
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Tenant lifecycle: signup, lookup, and the active check every
/// tenant-scoped request goes through.
#[derive(Clone)]
pub struct TenantService {
    db: TenantDb,
}

impl TenantService {
    pub fn new(db: TenantDb) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, input: CreateTenant) -> Result<tenant::Model, ServiceError> {
        if !valid_slug(&input.slug) {
            return Err(ServiceError::ValidationError(
                "slug must be lowercase letters, digits and hyphens".into(),
            ));
        }

        let slug = input.slug;
        let created = self
            .db
            .transaction(TenantContext::System, move |txn| {
                Box::pin(async move {
                    let taken = tenant::Entity::find()
                        .filter(tenant::Column::Slug.eq(slug.clone()))
                        .one(txn)
                        .await?;
                    if taken.is_some() {
                        return Err(ServiceError::Conflict(format!(
                            "slug '{}' is already in use",
                            slug
                        )));
                    }

                    let model = tenant::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        slug: Set(slug),
                        plan_status: Set("trial".to_string()),
                        active: Set(true),
                        created_at: Set(Utc::now()),
                        updated_at: Set(None),
                    }
                    .insert(txn)
                    .await?;
                    Ok(model)
                })
            })
            .await?;

        info!(tenant_id = %created.id, slug = %created.slug, "tenant created");
        Ok(created)
    }

    pub async fn get(&self, tenant_id: Uuid) -> Result<tenant::Model, ServiceError> {
        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    tenant::Entity::find_by_id(tenant_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::TenantNotFound(tenant_id.to_string()))
                })
            })
            .await
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<tenant::Model, ServiceError> {
        let slug = slug.to_string();
        self.db
            .transaction(TenantContext::System, move |txn| {
                Box::pin(async move {
                    tenant::Entity::find()
                        .filter(tenant::Column::Slug.eq(slug.clone()))
                        .one(txn)
                        .await?
                        .ok_or(ServiceError::TenantNotFound(slug))
                })
            })
            .await
    }

    /// Gate used by every tenant-scoped handler before touching data.
    /// A missing or deactivated tenant looks identical from the outside.
    pub async fn require_active(&self, tenant_id: Uuid) -> Result<tenant::Model, ServiceError> {
        let found = self.get(tenant_id).await?;
        if !found.active {
            return Err(ServiceError::TenantNotFound(tenant_id.to_string()));
        }
        Ok(found)
    }
}
