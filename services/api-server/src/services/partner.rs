use bauxite_database::{PartnerEntityRepository, PartnerRepository};
use bauxite_models::{
    merge_changes, DeleteMode, EntityStatistics, ListOptions, NewPartner, NewPartnerEntity, Page,
    Partner, PartnerEntity, PartnerEntityFilter, PartnerEntityView, PartnerFilter, PartnerView,
};
use bauxite_utils::{log_info, log_warn, validate_model, BauxiteError, BauxiteResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::ServiceContext;

const SERVICE: &str = "partner";
const CACHE_PREFIX: &str = "partner:";

/// Partner entities and the partners that belong to them.
#[derive(Clone)]
pub struct PartnerService {
    entities: Arc<dyn PartnerEntityRepository>,
    partners: Arc<dyn PartnerRepository>,
    ctx: ServiceContext,
}

impl PartnerService {
    pub fn new(
        entities: Arc<dyn PartnerEntityRepository>,
        partners: Arc<dyn PartnerRepository>,
        ctx: ServiceContext,
    ) -> Self {
        Self { entities, partners, ctx }
    }

    pub async fn get_entity(
        &self,
        id: i64,
        include_partners: bool,
        include_deleted: bool,
    ) -> BauxiteResult<PartnerEntityView> {
        let key = format!(
            "{}entity:{}:partners={}:deleted={}",
            CACHE_PREFIX, id, include_partners, include_deleted
        );
        let load = async {
            let entity = self.require_entity(id, include_deleted).await?;
            self.entity_view(entity, include_partners).await
        };
        self.ctx
            .track(SERVICE, "get_entity", self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), load))
            .await
    }

    pub async fn list_entities(
        &self,
        filter: &PartnerEntityFilter,
        options: &ListOptions,
        include_partners: bool,
    ) -> BauxiteResult<Page<PartnerEntityView>> {
        self.ctx
            .track(SERVICE, "list_entities", async {
                let mut page = self.entities.list(filter, options).await?;
                let mut views = Vec::with_capacity(page.items.len());
                for entity in std::mem::take(&mut page.items) {
                    views.push(self.entity_view(entity, include_partners).await?);
                }
                Ok(page.with_items(views))
            })
            .await
    }

    pub async fn create_entity(&self, new: NewPartnerEntity, actor: Option<&str>) -> BauxiteResult<PartnerEntityView> {
        self.ctx
            .track(SERVICE, "create_entity", async {
                validate_model(&new)?;
                self.ensure_entity_code_free(&new.code, None).await?;

                let entity = self.entities.create(new, actor).await?;
                self.invalidate().await;
                log_info!("Partner entity created", entity_id = entity.id, code = %entity.code);
                self.entity_view(entity, false).await
            })
            .await
    }

    pub async fn update_entity(
        &self,
        id: i64,
        changes: Map<String, Value>,
        actor: Option<&str>,
    ) -> BauxiteResult<PartnerEntityView> {
        self.ctx
            .track(SERVICE, "update_entity", async {
                let mut entity = self.require_entity(id, false).await?;
                let form: NewPartnerEntity = merge_changes(&entity.form(), &changes)?;
                validate_model(&form)?;
                self.ensure_entity_code_free(&form.code, Some(id)).await?;

                entity.apply(form);
                let entity = self.entities.update(entity, actor).await?;
                self.invalidate().await;
                log_info!("Partner entity updated", entity_id = id);
                self.entity_view(entity, false).await
            })
            .await
    }

    pub async fn delete_entity(&self, id: i64, permanent: bool, actor: Option<&str>) -> BauxiteResult<()> {
        self.ctx
            .track(SERVICE, "delete_entity", async {
                self.entities
                    .delete(id, DeleteMode::from_permanent(permanent), actor)
                    .await?;
                self.invalidate().await;
                log_info!("Partner entity deleted", entity_id = id, permanent = permanent);
                Ok(())
            })
            .await
    }

    pub async fn restore_entity(&self, id: i64, actor: Option<&str>) -> BauxiteResult<PartnerEntityView> {
        self.ctx
            .track(SERVICE, "restore_entity", async {
                let entity = self.entities.restore(id, actor).await?;
                self.invalidate().await;
                log_info!("Partner entity restored", entity_id = id);
                self.entity_view(entity, false).await
            })
            .await
    }

    pub async fn entity_statistics(&self) -> BauxiteResult<EntityStatistics> {
        let key = format!("{}entity:statistics", CACHE_PREFIX);
        self.ctx
            .track(
                SERVICE,
                "entity_statistics",
                self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), self.entities.statistics()),
            )
            .await
    }

    pub async fn get_partner(&self, id: i64, include_deleted: bool) -> BauxiteResult<PartnerView> {
        let key = format!("{}{}:deleted={}", CACHE_PREFIX, id, include_deleted);
        let load = async {
            let partner = self
                .partners
                .get(id, include_deleted)
                .await?
                .ok_or_else(|| BauxiteError::not_found(format!("Partner {}", id)))?;
            let entity = self.require_entity(partner.entity_id, true).await?;
            BauxiteResult::Ok(PartnerView::new(partner, &entity))
        };
        self.ctx
            .track(SERVICE, "get_partner", self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), load))
            .await
    }

    pub async fn list_partners(&self, filter: &PartnerFilter, options: &ListOptions) -> BauxiteResult<Page<PartnerView>> {
        self.ctx
            .track(SERVICE, "list_partners", async {
                let mut page = self.partners.list(filter, options).await?;
                let partners = std::mem::take(&mut page.items);
                let views = self.partner_views(partners).await?;
                Ok(page.with_items(views))
            })
            .await
    }

    pub async fn create_partner(&self, new: NewPartner, actor: Option<&str>) -> BauxiteResult<PartnerView> {
        self.ctx
            .track(SERVICE, "create_partner", async {
                validate_model(&new)?;
                let entity = self.require_entity(new.entity_id, false).await?;
                self.ensure_partner_free(&new, None).await?;

                let partner = self.partners.create(new, actor).await?;
                self.invalidate().await;
                log_info!("Partner created", partner_id = partner.id, entity_id = entity.id);
                Ok(PartnerView::new(partner, &entity))
            })
            .await
    }

    pub async fn update_partner(
        &self,
        id: i64,
        changes: Map<String, Value>,
        actor: Option<&str>,
    ) -> BauxiteResult<PartnerView> {
        self.ctx
            .track(SERVICE, "update_partner", async {
                let mut partner = self
                    .partners
                    .get(id, false)
                    .await?
                    .ok_or_else(|| BauxiteError::not_found(format!("Partner {}", id)))?;
                let form: NewPartner = merge_changes(&partner.form(), &changes)?;
                validate_model(&form)?;
                let entity = self.require_entity(form.entity_id, false).await?;
                self.ensure_partner_free(&form, Some(id)).await?;

                partner.apply(form);
                let partner = self.partners.update(partner, actor).await?;
                self.invalidate().await;
                log_info!("Partner updated", partner_id = id);
                Ok(PartnerView::new(partner, &entity))
            })
            .await
    }

    pub async fn delete_partner(&self, id: i64, permanent: bool, actor: Option<&str>) -> BauxiteResult<()> {
        self.ctx
            .track(SERVICE, "delete_partner", async {
                self.partners
                    .delete(id, DeleteMode::from_permanent(permanent), actor)
                    .await?;
                self.invalidate().await;
                log_info!("Partner deleted", partner_id = id, permanent = permanent);
                Ok(())
            })
            .await
    }

    pub async fn restore_partner(&self, id: i64, actor: Option<&str>) -> BauxiteResult<PartnerView> {
        self.ctx
            .track(SERVICE, "restore_partner", async {
                let partner = self.partners.restore(id, actor).await?;
                let entity = self.require_entity(partner.entity_id, true).await?;
                self.invalidate().await;
                log_info!("Partner restored", partner_id = id);
                Ok(PartnerView::new(partner, &entity))
            })
            .await
    }

    pub async fn partner_statistics(&self) -> BauxiteResult<EntityStatistics> {
        let key = format!("{}statistics", CACHE_PREFIX);
        self.ctx
            .track(
                SERVICE,
                "partner_statistics",
                self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), self.partners.statistics()),
            )
            .await
    }

    pub fn health(&self) -> Value {
        self.ctx.metrics.snapshot(SERVICE)
    }

    async fn invalidate(&self) {
        self.ctx.invalidate(CACHE_PREFIX).await;
        // enrollment views embed partner and entity names
        self.ctx.invalidate("production:").await;
    }

    async fn require_entity(&self, id: i64, include_deleted: bool) -> BauxiteResult<PartnerEntity> {
        self.entities
            .get(id, include_deleted)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Partner entity {}", id)))
    }

    async fn ensure_entity_code_free(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<()> {
        if self.entities.exists_by_code(code, exclude_id).await? {
            log_warn!("Rejected duplicate partner entity code", code = %code);
            return Err(BauxiteError::duplicate(format!(
                "A partner entity with the code '{}' already exists",
                code
            )));
        }
        Ok(())
    }

    async fn ensure_partner_free(&self, form: &NewPartner, exclude_id: Option<i64>) -> BauxiteResult<()> {
        if self.partners.exists_by_code(&form.code, exclude_id).await? {
            log_warn!("Rejected duplicate partner code", code = %form.code);
            return Err(BauxiteError::duplicate(format!(
                "A partner with the code '{}' already exists",
                form.code
            )));
        }
        if self
            .partners
            .exists_by_name(form.entity_id, &form.name, exclude_id)
            .await?
        {
            return Err(BauxiteError::duplicate(format!(
                "A partner named '{}' already exists for entity {}",
                form.name, form.entity_id
            )));
        }
        Ok(())
    }

    async fn entity_view(&self, entity: PartnerEntity, include_partners: bool) -> BauxiteResult<PartnerEntityView> {
        if include_partners {
            let partners = self.partners.list_for_entity(entity.id).await?;
            Ok(PartnerEntityView {
                entity,
                partners_count: Some(partners.len() as i64),
                partners: Some(partners),
            })
        } else {
            let count = self.partners.count_by_entity(entity.id).await?;
            Ok(PartnerEntityView {
                entity,
                partners_count: Some(count),
                partners: None,
            })
        }
    }

    async fn partner_views(&self, partners: Vec<Partner>) -> BauxiteResult<Vec<PartnerView>> {
        let mut ids: Vec<i64> = partners.iter().map(|partner| partner.entity_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let entities: HashMap<i64, PartnerEntity> = self
            .entities
            .get_by_ids(&ids, true)
            .await?
            .into_iter()
            .map(|entity| (entity.id, entity))
            .collect();

        partners
            .into_iter()
            .map(|partner| {
                let entity = entities.get(&partner.entity_id).ok_or_else(|| {
                    BauxiteError::internal(format!("Partner {} has no entity", partner.id))
                })?;
                Ok(PartnerView::new(partner, entity))
            })
            .collect()
    }
}
