//! In-process storage backend.
//!
//! Implements every repository trait over plain maps behind one
//! `tokio::sync::Mutex`. It enforces the same unique, foreign-key and check
//! constraints as the Postgres schema and reports their violations with the
//! same constraint names. Multi-row writes work on a staged copy of the state
//! that replaces the original only on success.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use bauxite_models::{
    AuditFields, CountryCount, DeleteMode, Enrollment, EnrollmentDetail, EntityStatistics,
    ListOptions, Mine, MineFilter, NewEnrollment, NewMine, NewPartner, NewPartnerEntity,
    NewProduct, NewProduction, Page, Partner, PartnerEntity, PartnerEntityFilter, PartnerFilter,
    Product, ProductFilter, Production, ProductionFilter, ProductionStatus, MINE_SORT_FIELDS,
    PARTNER_ENTITY_SORT_FIELDS, PARTNER_SORT_FIELDS, PRODUCTION_SORT_FIELDS, PRODUCT_SORT_FIELDS,
};
use bauxite_utils::{
    check_violation, foreign_key_violation, unique_violation, BauxiteError, BauxiteResult,
    ACTIVE_PER_YEAR_INDEX,
};

use crate::repositories::query::missing;
use crate::repositories::{
    EnrollmentRepository, MineRepository, PartnerEntityRepository, PartnerRepository,
    ProductRepository, ProductionRepository,
};

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortKey {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
}

impl From<Option<&String>> for SortKey {
    fn from(value: Option<&String>) -> Self {
        value.map_or(SortKey::Missing, |text| SortKey::Text(text.clone()))
    }
}

trait Stored: Clone {
    fn id(&self) -> i64;
    fn audit(&self) -> &AuditFields;
    fn sort_key(&self, field: &str) -> SortKey;
}

fn audit_key(audit: &AuditFields, field: &str) -> SortKey {
    match field {
        "created_at" => SortKey::Time(audit.created_at),
        "updated_at" => SortKey::Time(audit.updated_at),
        _ => SortKey::Missing,
    }
}

impl Stored for Mine {
    fn id(&self) -> i64 {
        self.id
    }
    fn audit(&self) -> &AuditFields {
        &self.audit
    }
    fn sort_key(&self, field: &str) -> SortKey {
        match field {
            "id" => SortKey::Int(self.id),
            "name" => SortKey::Text(self.name.clone()),
            "country" => SortKey::Text(self.country.clone()),
            other => audit_key(&self.audit, other),
        }
    }
}

impl Stored for Product {
    fn id(&self) -> i64 {
        self.id
    }
    fn audit(&self) -> &AuditFields {
        &self.audit
    }
    fn sort_key(&self, field: &str) -> SortKey {
        match field {
            "id" => SortKey::Int(self.id),
            "name" => SortKey::Text(self.name.clone()),
            "code" => self.code.as_ref().into(),
            "mine_id" => SortKey::Int(self.mine_id),
            other => audit_key(&self.audit, other),
        }
    }
}

impl Stored for PartnerEntity {
    fn id(&self) -> i64 {
        self.id
    }
    fn audit(&self) -> &AuditFields {
        &self.audit
    }
    fn sort_key(&self, field: &str) -> SortKey {
        match field {
            "id" => SortKey::Int(self.id),
            "name" => SortKey::Text(self.name.clone()),
            "code" => SortKey::Text(self.code.clone()),
            other => audit_key(&self.audit, other),
        }
    }
}

impl Stored for Partner {
    fn id(&self) -> i64 {
        self.id
    }
    fn audit(&self) -> &AuditFields {
        &self.audit
    }
    fn sort_key(&self, field: &str) -> SortKey {
        match field {
            "id" => SortKey::Int(self.id),
            "name" => SortKey::Text(self.name.clone()),
            "code" => SortKey::Text(self.code.clone()),
            "entity_id" => SortKey::Int(self.entity_id),
            other => audit_key(&self.audit, other),
        }
    }
}

impl Stored for Production {
    fn id(&self) -> i64 {
        self.id
    }
    fn audit(&self) -> &AuditFields {
        &self.audit
    }
    fn sort_key(&self, field: &str) -> SortKey {
        match field {
            "id" => SortKey::Int(self.id),
            "scenario_name" => SortKey::Text(self.scenario_name.clone()),
            "contractual_year" => SortKey::Int(i64::from(self.contractual_year)),
            "status" => SortKey::Text(self.status.as_str().to_string()),
            "version" => SortKey::Int(i64::from(self.version)),
            "standard_moisture_content" => SortKey::Float(self.standard_moisture_content),
            other => audit_key(&self.audit, other),
        }
    }
}

/// Sorts, counts and slices rows that already passed the filters.
fn paginate<T: Stored>(mut rows: Vec<T>, options: &ListOptions, sort_fields: &[&'static str]) -> BauxiteResult<Page<T>> {
    let field = options.sort_field(sort_fields)?;
    let descending = options.sort_direction.as_sql() == "DESC";

    rows.sort_by(|a, b| {
        let by_field = a
            .sort_key(field)
            .partial_cmp(&b.sort_key(field))
            .unwrap_or(Ordering::Equal);
        let by_field = if descending { by_field.reverse() } else { by_field };
        by_field.then_with(|| a.id().cmp(&b.id()))
    });

    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(options.offset() as usize)
        .take(options.limit() as usize)
        .collect();
    Ok(Page::new(items, options, total))
}

fn statistics_of<'a, T: Stored + 'a>(rows: impl Iterator<Item = &'a T>) -> EntityStatistics {
    let (total, deleted) = rows.fold((0, 0), |(total, deleted), row| {
        (total + 1, deleted + i64::from(row.audit().is_deleted()))
    });
    EntityStatistics::from_counts(total, deleted)
}

fn visible<T: Stored>(row: &T, include_deleted: bool) -> bool {
    include_deleted || !row.audit().is_deleted()
}

fn soft_delete<T: Stored>(
    table: &mut BTreeMap<i64, T>,
    id: i64,
    actor: Option<&str>,
    resource: &str,
    mark: impl FnOnce(&mut T, Option<&str>),
) -> BauxiteResult<()> {
    match table.get_mut(&id) {
        Some(row) if !row.audit().is_deleted() => {
            mark(row, actor);
            Ok(())
        }
        _ => Err(missing(resource, id)),
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_id: i64,
    mines: BTreeMap<i64, Mine>,
    products: BTreeMap<i64, Product>,
    entities: BTreeMap<i64, PartnerEntity>,
    partners: BTreeMap<i64, Partner>,
    productions: BTreeMap<i64, Production>,
    enrollments: BTreeMap<i64, Enrollment>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn check_mine(&self, mine: &Mine) -> BauxiteResult<()> {
        let others = || self.mines.values().filter(|other| other.id != mine.id);
        if others().any(|other| other.name == mine.name) {
            return Err(unique_violation(Some("uq_mines_name")));
        }
        if mine.code.is_some() && others().any(|other| other.code == mine.code) {
            return Err(unique_violation(Some("uq_mines_code")));
        }
        Ok(())
    }

    fn check_product(&self, product: &Product) -> BauxiteResult<()> {
        if !self.mines.contains_key(&product.mine_id) {
            return Err(foreign_key_violation(Some("fk_products_mine")));
        }
        let others = || self.products.values().filter(|other| other.id != product.id);
        if others().any(|other| other.mine_id == product.mine_id && other.name == product.name) {
            return Err(unique_violation(Some("uq_products_mine_name")));
        }
        if product.code.is_some() && others().any(|other| other.code == product.code) {
            return Err(unique_violation(Some("uq_products_code")));
        }
        Ok(())
    }

    fn check_entity(&self, entity: &PartnerEntity) -> BauxiteResult<()> {
        if self
            .entities
            .values()
            .any(|other| other.id != entity.id && other.code == entity.code)
        {
            return Err(unique_violation(Some("uq_partner_entities_code")));
        }
        Ok(())
    }

    fn check_partner(&self, partner: &Partner) -> BauxiteResult<()> {
        if !self.entities.contains_key(&partner.entity_id) {
            return Err(foreign_key_violation(Some("fk_partners_entity")));
        }
        let others = || self.partners.values().filter(|other| other.id != partner.id);
        if others().any(|other| other.code == partner.code) {
            return Err(unique_violation(Some("uq_partners_code")));
        }
        if others().any(|other| other.entity_id == partner.entity_id && other.name == partner.name) {
            return Err(unique_violation(Some("uq_partners_entity_name")));
        }
        Ok(())
    }

    fn check_production(&self, production: &Production) -> BauxiteResult<()> {
        if let Some(base_id) = production.base_scenario_id {
            if !self.productions.contains_key(&base_id) {
                return Err(foreign_key_violation(Some("fk_productions_base")));
            }
        }
        let others = || self.productions.values().filter(|other| other.id != production.id);
        if others().any(|other| {
            other.contractual_year == production.contractual_year
                && other.scenario_name == production.scenario_name
                && other.version == production.version
        }) {
            return Err(unique_violation(Some("uq_productions_year_name_version")));
        }
        if production.is_active()
            && others().any(|other| other.is_active() && other.contractual_year == production.contractual_year)
        {
            let violation = unique_violation(Some(ACTIVE_PER_YEAR_INDEX));
            return Err(violation.with_active_year(production.contractual_year));
        }
        Ok(())
    }

    fn check_enrollment(&self, enrollment: &Enrollment) -> BauxiteResult<()> {
        if !self.productions.contains_key(&enrollment.production_id) {
            return Err(foreign_key_violation(Some("fk_enrollments_production")));
        }
        if !self.partners.contains_key(&enrollment.partner_id) {
            return Err(foreign_key_violation(Some("fk_enrollments_partner")));
        }
        if enrollment.manual_incentive_tonnage.is_some() && enrollment.calculated_incentive_tonnage.is_some() {
            return Err(check_violation(Some("ck_enrollments_incentive_exclusive")));
        }
        if self.enrollments.values().any(|other| {
            other.id != enrollment.id
                && other.production_id == enrollment.production_id
                && other.partner_id == enrollment.partner_id
        }) {
            return Err(unique_violation(Some("uq_enrollments_production_partner")));
        }
        Ok(())
    }

    fn insert_mine(&mut self, new: NewMine, actor: Option<&str>) -> BauxiteResult<Mine> {
        let mine = Mine::from_new(self.next_id(), new, AuditFields::new(actor));
        self.check_mine(&mine)?;
        self.mines.insert(mine.id, mine.clone());
        Ok(mine)
    }

    fn insert_product(&mut self, new: NewProduct, actor: Option<&str>) -> BauxiteResult<Product> {
        let product = Product::from_new(self.next_id(), new, AuditFields::new(actor));
        self.check_product(&product)?;
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    fn replace_product(&mut self, mut product: Product, actor: Option<&str>) -> BauxiteResult<Product> {
        let stored = self
            .products
            .get(&product.id)
            .ok_or_else(|| missing("Product", product.id))?;
        product.audit = stored.audit.clone();
        product.audit.touch(actor);
        self.check_product(&product)?;
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    fn insert_production(&mut self, new: NewProduction, actor: Option<&str>) -> BauxiteResult<Production> {
        let version = new.version.unwrap_or(1);
        let production = Production::from_new(self.next_id(), new, version, AuditFields::new(actor));
        self.check_production(&production)?;
        self.productions.insert(production.id, production.clone());
        Ok(production)
    }

    fn insert_enrollment(&mut self, production_id: i64, new: NewEnrollment) -> BauxiteResult<Enrollment> {
        let minimum_tonnage = new
            .minimum_tonnage
            .ok_or_else(|| BauxiteError::validation("minimum_tonnage is required"))?;
        let now = Utc::now();
        let enrollment = Enrollment {
            id: self.next_id(),
            production_id,
            partner_id: new.partner_id,
            vessel_size_t: new.vessel_size_t,
            minimum_tonnage,
            adjusted_tonnage: new.adjusted_tonnage,
            manual_incentive_tonnage: new.manual_incentive_tonnage,
            calculated_incentive_tonnage: new.calculated_incentive_tonnage,
            calculated_vld_count: new.calculated_vld_count,
            calculated_vld_total_tonnage: new.calculated_vld_total_tonnage,
            vld_tonnage_variance: new.vld_tonnage_variance,
            created_at: now,
            updated_at: now,
        };
        self.check_enrollment(&enrollment)?;
        self.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    fn detail(&self, enrollment: &Enrollment) -> Option<EnrollmentDetail> {
        let partner = self.partners.get(&enrollment.partner_id)?;
        let entity = self.entities.get(&partner.entity_id)?;
        Some(EnrollmentDetail {
            enrollment: enrollment.clone(),
            partner_name: partner.name.clone(),
            partner_code: partner.code.clone(),
            entity_id: entity.id,
            entity_name: entity.name.clone(),
            is_halco_buyer: entity.is_halco_buyer,
        })
    }

    fn is_enrolled(&self, partner_id: i64) -> bool {
        self.enrollments.values().any(|enrollment| enrollment.partner_id == partner_id)
    }
}

/// Storage backend that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MineRepository for MemoryStore {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Mine>> {
        let state = self.state.lock().await;
        Ok(state.mines.get(&id).filter(|mine| visible(*mine, include_deleted)).cloned())
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Mine>> {
        let state = self.state.lock().await;
        Ok(state
            .mines
            .values()
            .filter(|mine| ids.contains(&mine.id) && visible(*mine, include_deleted))
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &MineFilter, options: &ListOptions) -> BauxiteResult<Page<Mine>> {
        let state = self.state.lock().await;
        let rows = state
            .mines
            .values()
            .filter(|mine| options.admits(&mine.audit) && filter.matches(mine))
            .cloned()
            .collect();
        paginate(rows, options, MINE_SORT_FIELDS)
    }

    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .mines
            .values()
            .any(|mine| mine.name == name && Some(mine.id) != exclude_id))
    }

    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let state = self.state.lock().await;
        Ok(state.mines.values().any(|mine| {
            mine.code.as_deref() == Some(code) && Some(mine.id) != exclude_id
        }))
    }

    async fn create(&self, new: NewMine, actor: Option<&str>) -> BauxiteResult<Mine> {
        let mut state = self.state.lock().await;
        state.insert_mine(new, actor)
    }

    async fn create_with_products(
        &self,
        new: NewMine,
        products: Vec<NewProduct>,
        actor: Option<&str>,
    ) -> BauxiteResult<(Mine, Vec<Product>)> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let mine = staged.insert_mine(new, actor)?;
        let mut created = Vec::with_capacity(products.len());
        for product in products {
            let product = NewProduct {
                mine_id: mine.id,
                ..product
            };
            created.push(staged.insert_product(product, actor)?);
        }

        *state = staged;
        Ok((mine, created))
    }

    async fn update(&self, mut mine: Mine, actor: Option<&str>) -> BauxiteResult<Mine> {
        let mut state = self.state.lock().await;
        let stored = state.mines.get(&mine.id).ok_or_else(|| missing("Mine", mine.id))?;
        mine.audit = stored.audit.clone();
        mine.audit.touch(actor);
        state.check_mine(&mine)?;
        state.mines.insert(mine.id, mine.clone());
        Ok(mine)
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let mut state = self.state.lock().await;
        match mode {
            DeleteMode::Soft => soft_delete(&mut state.mines, id, actor, "Mine", |mine, actor| {
                mine.audit.mark_deleted(actor)
            }),
            DeleteMode::Hard => {
                state.mines.remove(&id).ok_or_else(|| missing("Mine", id))?;
                state.products.retain(|_, product| product.mine_id != id);
                Ok(())
            }
        }
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Mine> {
        let mut state = self.state.lock().await;
        let mine = state.mines.get_mut(&id).ok_or_else(|| missing("Mine", id))?;
        mine.audit.restore(actor);
        Ok(mine.clone())
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let state = self.state.lock().await;
        Ok(statistics_of(state.mines.values()))
    }

    async fn count_by_country(&self) -> BauxiteResult<Vec<CountryCount>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for mine in state.mines.values().filter(|mine| !mine.audit.is_deleted()) {
            *counts.entry(mine.country.as_str()).or_default() += 1;
        }

        let mut counts: Vec<CountryCount> = counts
            .into_iter()
            .map(|(country, count)| CountryCount {
                country: country.to_string(),
                count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.country.cmp(&b.country)));
        Ok(counts)
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Product>> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .get(&id)
            .filter(|product| visible(*product, include_deleted))
            .cloned())
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .filter(|product| ids.contains(&product.id) && visible(*product, include_deleted))
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &ProductFilter, options: &ListOptions) -> BauxiteResult<Page<Product>> {
        let state = self.state.lock().await;
        let rows = state
            .products
            .values()
            .filter(|product| options.admits(&product.audit) && filter.matches(product))
            .cloned()
            .collect();
        paginate(rows, options, PRODUCT_SORT_FIELDS)
    }

    async fn list_for_mine(&self, mine_id: i64) -> BauxiteResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|product| product.mine_id == mine_id && !product.audit.is_deleted())
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn exists_by_name(&self, mine_id: i64, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let state = self.state.lock().await;
        Ok(state.products.values().any(|product| {
            product.mine_id == mine_id
                && product.name == name
                && Some(product.id) != exclude_id
        }))
    }

    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let state = self.state.lock().await;
        Ok(state.products.values().any(|product| {
            product.code.as_deref() == Some(code)
                && Some(product.id) != exclude_id
        }))
    }

    async fn create(&self, new: NewProduct, actor: Option<&str>) -> BauxiteResult<Product> {
        let mut state = self.state.lock().await;
        state.insert_product(new, actor)
    }

    async fn create_batch(&self, products: Vec<NewProduct>, actor: Option<&str>) -> BauxiteResult<Vec<Product>> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let mut created = Vec::with_capacity(products.len());
        for product in products {
            created.push(staged.insert_product(product, actor)?);
        }

        *state = staged;
        Ok(created)
    }

    async fn update(&self, product: Product, actor: Option<&str>) -> BauxiteResult<Product> {
        let mut state = self.state.lock().await;
        state.replace_product(product, actor)
    }

    async fn update_batch(&self, products: Vec<Product>, actor: Option<&str>) -> BauxiteResult<Vec<Product>> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let mut updated = Vec::with_capacity(products.len());
        for product in products {
            updated.push(staged.replace_product(product, actor)?);
        }

        *state = staged;
        Ok(updated)
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let mut state = self.state.lock().await;
        match mode {
            DeleteMode::Soft => soft_delete(&mut state.products, id, actor, "Product", |product, actor| {
                product.audit.mark_deleted(actor)
            }),
            DeleteMode::Hard => {
                state.products.remove(&id).ok_or_else(|| missing("Product", id))?;
                Ok(())
            }
        }
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Product> {
        let mut state = self.state.lock().await;
        let product = state.products.get_mut(&id).ok_or_else(|| missing("Product", id))?;
        product.audit.restore(actor);
        Ok(product.clone())
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let state = self.state.lock().await;
        Ok(statistics_of(state.products.values()))
    }

    async fn count_by_mine(&self, mine_id: i64) -> BauxiteResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .filter(|product| product.mine_id == mine_id && !product.audit.is_deleted())
            .count() as i64)
    }
}

#[async_trait]
impl PartnerEntityRepository for MemoryStore {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<PartnerEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .entities
            .get(&id)
            .filter(|entity| visible(*entity, include_deleted))
            .cloned())
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<PartnerEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .entities
            .values()
            .filter(|entity| ids.contains(&entity.id) && visible(*entity, include_deleted))
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        filter: &PartnerEntityFilter,
        options: &ListOptions,
    ) -> BauxiteResult<Page<PartnerEntity>> {
        let state = self.state.lock().await;
        let rows = state
            .entities
            .values()
            .filter(|entity| options.admits(&entity.audit) && filter.matches(entity))
            .cloned()
            .collect();
        paginate(rows, options, PARTNER_ENTITY_SORT_FIELDS)
    }

    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let state = self.state.lock().await;
        Ok(state.entities.values().any(|entity| {
            entity.code == code && Some(entity.id) != exclude_id
        }))
    }

    async fn create(&self, new: NewPartnerEntity, actor: Option<&str>) -> BauxiteResult<PartnerEntity> {
        let mut state = self.state.lock().await;
        let entity = PartnerEntity::from_new(state.next_id(), new, AuditFields::new(actor));
        state.check_entity(&entity)?;
        state.entities.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn update(&self, mut entity: PartnerEntity, actor: Option<&str>) -> BauxiteResult<PartnerEntity> {
        let mut state = self.state.lock().await;
        let stored = state
            .entities
            .get(&entity.id)
            .ok_or_else(|| missing("Partner entity", entity.id))?;
        entity.audit = stored.audit.clone();
        entity.audit.touch(actor);
        state.check_entity(&entity)?;
        state.entities.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let mut state = self.state.lock().await;
        match mode {
            DeleteMode::Soft => soft_delete(&mut state.entities, id, actor, "Partner entity", |entity, actor| {
                entity.audit.mark_deleted(actor)
            }),
            DeleteMode::Hard => {
                if !state.entities.contains_key(&id) {
                    return Err(missing("Partner entity", id));
                }
                let enrolled = state
                    .partners
                    .values()
                    .any(|partner| partner.entity_id == id && state.is_enrolled(partner.id));
                if enrolled {
                    return Err(foreign_key_violation(Some("fk_enrollments_partner")));
                }
                state.partners.retain(|_, partner| partner.entity_id != id);
                state.entities.remove(&id);
                Ok(())
            }
        }
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<PartnerEntity> {
        let mut state = self.state.lock().await;
        let entity = state
            .entities
            .get_mut(&id)
            .ok_or_else(|| missing("Partner entity", id))?;
        entity.audit.restore(actor);
        Ok(entity.clone())
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let state = self.state.lock().await;
        Ok(statistics_of(state.entities.values()))
    }
}

#[async_trait]
impl PartnerRepository for MemoryStore {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Partner>> {
        let state = self.state.lock().await;
        Ok(state
            .partners
            .get(&id)
            .filter(|partner| visible(*partner, include_deleted))
            .cloned())
    }

    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Partner>> {
        let state = self.state.lock().await;
        Ok(state
            .partners
            .values()
            .filter(|partner| ids.contains(&partner.id) && visible(*partner, include_deleted))
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &PartnerFilter, options: &ListOptions) -> BauxiteResult<Page<Partner>> {
        let state = self.state.lock().await;
        let rows = state
            .partners
            .values()
            .filter(|partner| options.admits(&partner.audit) && filter.matches(partner))
            .cloned()
            .collect();
        paginate(rows, options, PARTNER_SORT_FIELDS)
    }

    async fn list_for_entity(&self, entity_id: i64) -> BauxiteResult<Vec<Partner>> {
        let state = self.state.lock().await;
        let mut partners: Vec<Partner> = state
            .partners
            .values()
            .filter(|partner| partner.entity_id == entity_id)
            .cloned()
            .collect();
        partners.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(partners)
    }

    async fn exists_by_name(&self, entity_id: i64, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let state = self.state.lock().await;
        Ok(state.partners.values().any(|partner| {
            partner.entity_id == entity_id
                && partner.name == name
               
                && Some(partner.id) != exclude_id
        }))
    }

    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool> {
        let state = self.state.lock().await;
        Ok(state.partners.values().any(|partner| {
            partner.code == code && Some(partner.id) != exclude_id
        }))
    }

    async fn create(&self, new: NewPartner, actor: Option<&str>) -> BauxiteResult<Partner> {
        let mut state = self.state.lock().await;
        let partner = Partner::from_new(state.next_id(), new, AuditFields::new(actor));
        state.check_partner(&partner)?;
        state.partners.insert(partner.id, partner.clone());
        Ok(partner)
    }

    async fn update(&self, mut partner: Partner, actor: Option<&str>) -> BauxiteResult<Partner> {
        let mut state = self.state.lock().await;
        let stored = state
            .partners
            .get(&partner.id)
            .ok_or_else(|| missing("Partner", partner.id))?;
        partner.audit = stored.audit.clone();
        partner.audit.touch(actor);
        state.check_partner(&partner)?;
        state.partners.insert(partner.id, partner.clone());
        Ok(partner)
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let mut state = self.state.lock().await;
        match mode {
            DeleteMode::Soft => soft_delete(&mut state.partners, id, actor, "Partner", |partner, actor| {
                partner.audit.mark_deleted(actor)
            }),
            DeleteMode::Hard => {
                if !state.partners.contains_key(&id) {
                    return Err(missing("Partner", id));
                }
                if state.is_enrolled(id) {
                    return Err(foreign_key_violation(Some("fk_enrollments_partner")));
                }
                state.partners.remove(&id);
                Ok(())
            }
        }
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Partner> {
        let mut state = self.state.lock().await;
        let partner = state.partners.get_mut(&id).ok_or_else(|| missing("Partner", id))?;
        partner.audit.restore(actor);
        Ok(partner.clone())
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let state = self.state.lock().await;
        Ok(statistics_of(state.partners.values()))
    }

    async fn count_by_entity(&self, entity_id: i64) -> BauxiteResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .partners
            .values()
            .filter(|partner| partner.entity_id == entity_id)
            .count() as i64)
    }
}

#[async_trait]
impl ProductionRepository for MemoryStore {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Production>> {
        let state = self.state.lock().await;
        Ok(state
            .productions
            .get(&id)
            .filter(|production| visible(*production, include_deleted))
            .cloned())
    }

    async fn list(
        &self,
        filter: &ProductionFilter,
        options: &ListOptions,
    ) -> BauxiteResult<Page<Production>> {
        let state = self.state.lock().await;
        let rows = state
            .productions
            .values()
            .filter(|production| options.admits(&production.audit) && filter.matches(production))
            .cloned()
            .collect();
        paginate(rows, options, PRODUCTION_SORT_FIELDS)
    }

    async fn find_active(&self, year: i32, exclude_id: Option<i64>) -> BauxiteResult<Option<Production>> {
        let state = self.state.lock().await;
        Ok(state
            .productions
            .values()
            .find(|production| {
                production.contractual_year == year
                    && production.is_active()
                    && Some(production.id) != exclude_id
            })
            .cloned())
    }

    async fn completed_before(&self, year: i32) -> BauxiteResult<Vec<Production>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Production> = state
            .productions
            .values()
            .filter(|production| {
                production.status == ProductionStatus::Completed
                    && production.contractual_year < year
                    && !production.audit.is_deleted()
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.contractual_year
                .cmp(&a.contractual_year)
                .then_with(|| a.scenario_name.cmp(&b.scenario_name))
                .then_with(|| b.version.cmp(&a.version))
        });
        Ok(rows)
    }

    async fn latest_version(&self, year: i32, scenario_name: &str) -> BauxiteResult<Option<i32>> {
        let state = self.state.lock().await;
        Ok(state
            .productions
            .values()
            .filter(|production| {
                production.contractual_year == year && production.scenario_name == scenario_name
            })
            .map(|production| production.version)
            .max())
    }

    async fn create(&self, new: NewProduction, actor: Option<&str>) -> BauxiteResult<Production> {
        let mut state = self.state.lock().await;
        state.insert_production(new, actor)
    }

    async fn create_with_enrollments(
        &self,
        new: NewProduction,
        enrollments: Vec<NewEnrollment>,
        actor: Option<&str>,
    ) -> BauxiteResult<(Production, Vec<Enrollment>)> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let production = staged.insert_production(new, actor)?;
        let mut created = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            created.push(staged.insert_enrollment(production.id, enrollment)?);
        }

        *state = staged;
        Ok((production, created))
    }

    async fn update(&self, mut production: Production, actor: Option<&str>) -> BauxiteResult<Production> {
        let mut state = self.state.lock().await;
        let stored = state
            .productions
            .get(&production.id)
            .ok_or_else(|| missing("Production", production.id))?;
        production.audit = stored.audit.clone();
        production.audit.touch(actor);

        if production.is_active()
            && state.productions.values().any(|other| {
                other.id != production.id
                    && other.is_active()
                    && other.contractual_year == production.contractual_year
            })
        {
            return Err(BauxiteError::active_conflict(production.contractual_year));
        }

        state.check_production(&production)?;
        state.productions.insert(production.id, production.clone());
        Ok(production)
    }

    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()> {
        let mut state = self.state.lock().await;
        match mode {
            DeleteMode::Soft => soft_delete(&mut state.productions, id, actor, "Production", |production, actor| {
                production.audit.mark_deleted(actor)
            }),
            DeleteMode::Hard => {
                state
                    .productions
                    .remove(&id)
                    .ok_or_else(|| missing("Production", id))?;
                state.enrollments.retain(|_, enrollment| enrollment.production_id != id);
                for production in state.productions.values_mut() {
                    if production.base_scenario_id == Some(id) {
                        production.base_scenario_id = None;
                    }
                }
                Ok(())
            }
        }
    }

    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Production> {
        let mut state = self.state.lock().await;
        let production = state
            .productions
            .get_mut(&id)
            .ok_or_else(|| missing("Production", id))?;
        production.audit.restore(actor);
        Ok(production.clone())
    }

    async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let state = self.state.lock().await;
        Ok(statistics_of(state.productions.values()))
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryStore {
    async fn list_for_production(
        &self,
        production_id: i64,
        halco_buyer: Option<bool>,
    ) -> BauxiteResult<Vec<EnrollmentDetail>> {
        let state = self.state.lock().await;
        let mut details: Vec<EnrollmentDetail> = state
            .enrollments
            .values()
            .filter(|enrollment| enrollment.production_id == production_id)
            .filter_map(|enrollment| state.detail(enrollment))
            .filter(|detail| halco_buyer.map_or(true, |flag| detail.is_halco_buyer == flag))
            .collect();
        details.sort_by(|a, b| {
            a.partner_name
                .cmp(&b.partner_name)
                .then_with(|| a.enrollment.id.cmp(&b.enrollment.id))
        });
        Ok(details)
    }

    async fn get(&self, production_id: i64, id: i64) -> BauxiteResult<Option<EnrollmentDetail>> {
        let state = self.state.lock().await;
        Ok(state
            .enrollments
            .get(&id)
            .filter(|enrollment| enrollment.production_id == production_id)
            .and_then(|enrollment| state.detail(enrollment)))
    }

    async fn create(&self, production_id: i64, new: NewEnrollment) -> BauxiteResult<Enrollment> {
        let mut state = self.state.lock().await;
        state.insert_enrollment(production_id, new)
    }

    async fn update(&self, mut enrollment: Enrollment) -> BauxiteResult<Enrollment> {
        let mut state = self.state.lock().await;
        let stored = state
            .enrollments
            .get(&enrollment.id)
            .filter(|stored| stored.production_id == enrollment.production_id)
            .ok_or_else(|| missing("Enrollment", enrollment.id))?;
        enrollment.created_at = stored.created_at;
        enrollment.updated_at = Utc::now();
        state.check_enrollment(&enrollment)?;
        state.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn delete(&self, production_id: i64, id: i64) -> BauxiteResult<()> {
        let mut state = self.state.lock().await;
        let owned = state
            .enrollments
            .get(&id)
            .map_or(false, |enrollment| enrollment.production_id == production_id);
        if !owned {
            return Err(missing("Enrollment", id));
        }
        state.enrollments.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bauxite_models::{ProductDraft, SortDirection};
    use chrono::NaiveDate;

    fn new_mine(name: &str, code: Option<&str>) -> NewMine {
        NewMine {
            name: name.to_string(),
            code: code.map(str::to_string),
            country: "Guinea".to_string(),
            port_location: "Kamsar".to_string(),
            port_latitude: 10.65,
            port_longitude: -14.61,
            port_berths: 1,
            shiploaders: 1,
        }
    }

    fn new_product(mine_id: i64, name: &str) -> NewProduct {
        NewProduct {
            mine_id,
            name: name.to_string(),
            code: None,
            description: None,
        }
    }

    fn new_production(name: &str, status: ProductionStatus) -> NewProduction {
        NewProduction {
            scenario_name: name.to_string(),
            scenario_description: None,
            contractual_year: 2025,
            total_planned_tonnage: 1_000_000,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            standard_moisture_content: 3.0,
            status,
            base_scenario_id: None,
            version: None,
        }
    }

    async fn partner(store: &MemoryStore, code: &str) -> Partner {
        let entity = PartnerEntityRepository::create(
            store,
            NewPartnerEntity {
                name: format!("{} group", code),
                code: format!("{}-G", code),
                description: None,
                is_halco_buyer: true,
            },
            None,
        )
        .await
        .unwrap();
        PartnerRepository::create(
            store,
            NewPartner {
                entity_id: entity.id,
                name: code.to_string(),
                code: code.to_string(),
                description: None,
                minimum_contractual_tonnage: Some(1_000),
            },
            None,
        )
        .await
        .unwrap()
    }

    fn enrollment_for(partner_id: i64) -> NewEnrollment {
        NewEnrollment {
            partner_id,
            vessel_size_t: 60_000,
            minimum_tonnage: Some(1_000),
            adjusted_tonnage: None,
            manual_incentive_tonnage: None,
            calculated_incentive_tonnage: None,
            calculated_vld_count: 0,
            calculated_vld_total_tonnage: 0,
            vld_tonnage_variance: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_mine_name_reports_constraint() {
        let store = MemoryStore::new();
        MineRepository::create(&store, new_mine("Sangaredi", None), None).await.unwrap();

        let error = MineRepository::create(&store, new_mine("Sangaredi", None), None)
            .await
            .unwrap_err();
        assert_eq!(error, unique_violation(Some("uq_mines_name")));
    }

    #[tokio::test]
    async fn test_product_names_unique_per_mine() {
        let store = MemoryStore::new();
        let first = MineRepository::create(&store, new_mine("Sangaredi", None), None).await.unwrap();
        let second = MineRepository::create(&store, new_mine("Boke", None), None).await.unwrap();

        ProductRepository::create(&store, new_product(first.id, "CBG"), None).await.unwrap();
        assert!(ProductRepository::create(&store, new_product(first.id, "CBG"), None)
            .await
            .is_err());
        assert!(ProductRepository::create(&store, new_product(second.id, "CBG"), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_product_requires_existing_mine() {
        let store = MemoryStore::new();
        let error = ProductRepository::create(&store, new_product(99, "CBG"), None)
            .await
            .unwrap_err();
        assert_eq!(error.error_code(), "OPERATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_with_products_is_atomic() {
        let store = MemoryStore::new();
        let products = vec![
            ProductDraft {
                name: "CBG".to_string(),
                code: None,
                description: None,
            },
            ProductDraft {
                name: "CBG".to_string(),
                code: None,
                description: None,
            },
        ];
        let products = products.into_iter().map(|draft| draft.for_mine(0)).collect();

        assert!(MineRepository::create_with_products(&store, new_mine("Sangaredi", None), products, None)
            .await
            .is_err());
        assert_eq!(MineRepository::statistics(&store).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_and_restore_returns() {
        let store = MemoryStore::new();
        let mine = MineRepository::create(&store, new_mine("Sangaredi", None), None).await.unwrap();
        ProductRepository::create(&store, new_product(mine.id, "CBG"), None).await.unwrap();

        MineRepository::delete(&store, mine.id, DeleteMode::Soft, Some("admin")).await.unwrap();
        let page = MineRepository::list(&store, &MineFilter::default(), &ListOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(ProductRepository::count_by_mine(&store, mine.id).await.unwrap(), 1);

        let restored = MineRepository::restore(&store, mine.id, Some("admin")).await.unwrap();
        assert!(!restored.audit.is_deleted());
        let stats = MineRepository::statistics(&store).await.unwrap();
        assert_eq!(stats, EntityStatistics { total: 1, active: 1, deleted: 0 });
    }

    #[tokio::test]
    async fn test_hard_delete_cascades_products() {
        let store = MemoryStore::new();
        let mine = MineRepository::create(&store, new_mine("Sangaredi", None), None).await.unwrap();
        ProductRepository::create(&store, new_product(mine.id, "CBG"), None).await.unwrap();

        MineRepository::delete(&store, mine.id, DeleteMode::Hard, None).await.unwrap();
        assert_eq!(ProductRepository::statistics(&store).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_list_sorts_and_pages() {
        let store = MemoryStore::new();
        for name in ["Charlie", "Alpha", "Bravo"] {
            MineRepository::create(&store, new_mine(name, None), None).await.unwrap();
        }
        let options = ListOptions {
            sort_by: Some("name".to_string()),
            sort_direction: SortDirection::Desc,
            ..ListOptions::page(1, 2)
        };
        let page = MineRepository::list(&store, &MineFilter::default(), &options).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|mine| mine.name.as_str()).collect();
        assert_eq!(names, vec!["Charlie", "Bravo"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
    }

    #[tokio::test]
    async fn test_exists_checks_include_soft_deleted() {
        let store = MemoryStore::new();
        let mine = MineRepository::create(&store, new_mine("Sangaredi", Some("SNG")), None).await.unwrap();
        MineRepository::delete(&store, mine.id, DeleteMode::Soft, None).await.unwrap();

        assert!(MineRepository::exists_by_name(&store, "Sangaredi", None).await.unwrap());
        assert!(MineRepository::exists_by_code(&store, "SNG", None).await.unwrap());
        assert!(!MineRepository::exists_by_name(&store, "Sangaredi", Some(mine.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_active_scenario_rejected() {
        let store = MemoryStore::new();
        ProductionRepository::create(&store, new_production("Base", ProductionStatus::Active), None)
            .await
            .unwrap();

        let error = ProductionRepository::create(&store, new_production("Alt", ProductionStatus::Active), None)
            .await
            .unwrap_err();
        assert_eq!(error, BauxiteError::active_conflict(2025));

        let mut draft = ProductionRepository::create(&store, new_production("Alt", ProductionStatus::Draft), None)
            .await
            .unwrap();
        draft.set_status(ProductionStatus::Active).unwrap();
        let error = ProductionRepository::update(&store, draft, None).await.unwrap_err();
        assert_eq!(error, BauxiteError::active_conflict(2025));
    }

    #[tokio::test]
    async fn test_enrolled_partner_cannot_be_hard_deleted() {
        let store = MemoryStore::new();
        let partner = partner(&store, "ALC").await;
        let production = ProductionRepository::create(&store, new_production("Base", ProductionStatus::Draft), None)
            .await
            .unwrap();
        EnrollmentRepository::create(&store, production.id, enrollment_for(partner.id))
            .await
            .unwrap();

        let error = PartnerRepository::delete(&store, partner.id, DeleteMode::Hard, None)
            .await
            .unwrap_err();
        assert_eq!(error.error_code(), "OPERATION_ERROR");

        ProductionRepository::delete(&store, production.id, DeleteMode::Hard, None)
            .await
            .unwrap();
        PartnerRepository::delete(&store, partner.id, DeleteMode::Hard, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_enrollment_pair_unique_and_filtered_by_halco_flag() {
        let store = MemoryStore::new();
        let partner = partner(&store, "ALC").await;
        let production = ProductionRepository::create(&store, new_production("Base", ProductionStatus::Draft), None)
            .await
            .unwrap();

        EnrollmentRepository::create(&store, production.id, enrollment_for(partner.id))
            .await
            .unwrap();
        assert!(EnrollmentRepository::create(&store, production.id, enrollment_for(partner.id))
            .await
            .is_err());

        let buyers = EnrollmentRepository::list_for_production(&store, production.id, Some(true))
            .await
            .unwrap();
        assert_eq!(buyers.len(), 1);
        assert_eq!(buyers[0].partner_code, "ALC");
        let offtakers = EnrollmentRepository::list_for_production(&store, production.id, Some(false))
            .await
            .unwrap();
        assert!(offtakers.is_empty());
    }

    #[tokio::test]
    async fn test_latest_version_and_completed_before() {
        let store = MemoryStore::new();
        let mut first = new_production("Base", ProductionStatus::Completed);
        first.contractual_year = 2023;
        ProductionRepository::create(&store, first.clone(), None).await.unwrap();
        first.version = Some(2);
        ProductionRepository::create(&store, first, None).await.unwrap();

        assert_eq!(
            ProductionRepository::latest_version(&store, 2023, "Base").await.unwrap(),
            Some(2)
        );
        assert_eq!(ProductionRepository::latest_version(&store, 2024, "Base").await.unwrap(), None);

        let finalized = ProductionRepository::completed_before(&store, 2025).await.unwrap();
        let versions: Vec<i32> = finalized.iter().map(|production| production.version).collect();
        assert_eq!(versions, vec![2, 1]);
    }
}
