//! Repository module for database CRUD operations
//!
//! One async trait per aggregate. Each trait has a Postgres implementation
//! (`Pg*Repository`) and is also implemented by [`crate::memory::MemoryStore`].

pub mod enrollment;
pub mod mine;
pub mod partner;
pub mod product;
pub mod production;
pub(crate) mod query;

pub use enrollment::PgEnrollmentRepository;
pub use mine::PgMineRepository;
pub use partner::{PgPartnerEntityRepository, PgPartnerRepository};
pub use product::PgProductRepository;
pub use production::PgProductionRepository;

use async_trait::async_trait;
use bauxite_models::{
    CountryCount, DeleteMode, Enrollment, EnrollmentDetail, EntityStatistics, ListOptions, Mine,
    MineFilter, NewEnrollment, NewMine, NewPartner, NewPartnerEntity, NewProduct, NewProduction,
    Page, Partner, PartnerEntity, PartnerEntityFilter, PartnerFilter, Product, ProductFilter,
    Production, ProductionFilter,
};
use bauxite_utils::BauxiteResult;

#[async_trait]
pub trait MineRepository: Send + Sync {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Mine>>;
    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Mine>>;
    async fn list(&self, filter: &MineFilter, options: &ListOptions) -> BauxiteResult<Page<Mine>>;
    /// Soft-deleted rows count, as they do for the unique constraints.
    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool>;
    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool>;
    async fn create(&self, new: NewMine, actor: Option<&str>) -> BauxiteResult<Mine>;
    /// Inserts the mine and its products in one transaction.
    async fn create_with_products(
        &self,
        new: NewMine,
        products: Vec<NewProduct>,
        actor: Option<&str>,
    ) -> BauxiteResult<(Mine, Vec<Product>)>;
    async fn update(&self, mine: Mine, actor: Option<&str>) -> BauxiteResult<Mine>;
    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()>;
    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Mine>;
    async fn statistics(&self) -> BauxiteResult<EntityStatistics>;
    async fn count_by_country(&self) -> BauxiteResult<Vec<CountryCount>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Product>>;
    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Product>>;
    async fn list(&self, filter: &ProductFilter, options: &ListOptions) -> BauxiteResult<Page<Product>>;
    /// Live products of a mine, ordered by name.
    async fn list_for_mine(&self, mine_id: i64) -> BauxiteResult<Vec<Product>>;
    async fn exists_by_name(&self, mine_id: i64, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool>;
    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool>;
    async fn create(&self, new: NewProduct, actor: Option<&str>) -> BauxiteResult<Product>;
    async fn create_batch(&self, products: Vec<NewProduct>, actor: Option<&str>) -> BauxiteResult<Vec<Product>>;
    async fn update(&self, product: Product, actor: Option<&str>) -> BauxiteResult<Product>;
    async fn update_batch(&self, products: Vec<Product>, actor: Option<&str>) -> BauxiteResult<Vec<Product>>;
    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()>;
    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Product>;
    async fn statistics(&self) -> BauxiteResult<EntityStatistics>;
    async fn count_by_mine(&self, mine_id: i64) -> BauxiteResult<i64>;
}

#[async_trait]
pub trait PartnerEntityRepository: Send + Sync {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<PartnerEntity>>;
    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<PartnerEntity>>;
    async fn list(
        &self,
        filter: &PartnerEntityFilter,
        options: &ListOptions,
    ) -> BauxiteResult<Page<PartnerEntity>>;
    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool>;
    async fn create(&self, new: NewPartnerEntity, actor: Option<&str>) -> BauxiteResult<PartnerEntity>;
    async fn update(&self, entity: PartnerEntity, actor: Option<&str>) -> BauxiteResult<PartnerEntity>;
    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()>;
    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<PartnerEntity>;
    async fn statistics(&self) -> BauxiteResult<EntityStatistics>;
}

#[async_trait]
pub trait PartnerRepository: Send + Sync {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Partner>>;
    async fn get_by_ids(&self, ids: &[i64], include_deleted: bool) -> BauxiteResult<Vec<Partner>>;
    async fn list(&self, filter: &PartnerFilter, options: &ListOptions) -> BauxiteResult<Page<Partner>>;
    /// Live partners of an entity, ordered by name.
    async fn list_for_entity(&self, entity_id: i64) -> BauxiteResult<Vec<Partner>>;
    async fn exists_by_name(&self, entity_id: i64, name: &str, exclude_id: Option<i64>) -> BauxiteResult<bool>;
    async fn exists_by_code(&self, code: &str, exclude_id: Option<i64>) -> BauxiteResult<bool>;
    async fn create(&self, new: NewPartner, actor: Option<&str>) -> BauxiteResult<Partner>;
    async fn update(&self, partner: Partner, actor: Option<&str>) -> BauxiteResult<Partner>;
    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()>;
    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Partner>;
    async fn statistics(&self) -> BauxiteResult<EntityStatistics>;
    async fn count_by_entity(&self, entity_id: i64) -> BauxiteResult<i64>;
}

#[async_trait]
pub trait ProductionRepository: Send + Sync {
    async fn get(&self, id: i64, include_deleted: bool) -> BauxiteResult<Option<Production>>;
    async fn list(
        &self,
        filter: &ProductionFilter,
        options: &ListOptions,
    ) -> BauxiteResult<Page<Production>>;
    /// The ACTIVE scenario of a year other than `exclude_id`. Soft-deleted
    /// rows count, as they do for `uq_one_active_per_year`.
    async fn find_active(&self, year: i32, exclude_id: Option<i64>) -> BauxiteResult<Option<Production>>;
    /// COMPLETED scenarios with a contractual year before `year`.
    async fn completed_before(&self, year: i32) -> BauxiteResult<Vec<Production>>;
    async fn latest_version(&self, year: i32, scenario_name: &str) -> BauxiteResult<Option<i32>>;
    /// `new.version` must already be resolved.
    async fn create(&self, new: NewProduction, actor: Option<&str>) -> BauxiteResult<Production>;
    /// Inserts the scenario and its enrollments in one transaction.
    async fn create_with_enrollments(
        &self,
        new: NewProduction,
        enrollments: Vec<NewEnrollment>,
        actor: Option<&str>,
    ) -> BauxiteResult<(Production, Vec<Enrollment>)>;
    async fn update(&self, production: Production, actor: Option<&str>) -> BauxiteResult<Production>;
    async fn delete(&self, id: i64, mode: DeleteMode, actor: Option<&str>) -> BauxiteResult<()>;
    async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<Production>;
    async fn statistics(&self) -> BauxiteResult<EntityStatistics>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Enrollments of a scenario joined with partner details, optionally
    /// narrowed to halco buyers (`Some(true)`) or offtakers (`Some(false)`).
    async fn list_for_production(
        &self,
        production_id: i64,
        halco_buyer: Option<bool>,
    ) -> BauxiteResult<Vec<EnrollmentDetail>>;
    async fn get(&self, production_id: i64, id: i64) -> BauxiteResult<Option<EnrollmentDetail>>;
    /// `new.minimum_tonnage` must already be resolved.
    async fn create(&self, production_id: i64, new: NewEnrollment) -> BauxiteResult<Enrollment>;
    async fn update(&self, enrollment: Enrollment) -> BauxiteResult<Enrollment>;
    async fn delete(&self, production_id: i64, id: i64) -> BauxiteResult<()>;
}
