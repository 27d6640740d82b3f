use bauxite_database::{EnrollmentRepository, PartnerRepository, ProductionRepository};
use bauxite_models::{
    merge_changes, summarize, CreateProductionRequest, DeleteMode, EnrollmentSummary, EnrollmentView,
    EntityStatistics, ListOptions, NewEnrollment, NewProduction, NewVersionRequest, Page, Production,
    ProductionFilter, ProductionStatus, ProductionView, StatusChange,
};
use bauxite_utils::{
    find_duplicates, format_validation_errors, log_info, log_warn, validate_model, BauxiteError,
    BauxiteResult,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use validator::Validate;

use super::{prefixed, ServiceContext};

const SERVICE: &str = "production";
const CACHE_PREFIX: &str = "production:";

/// Tonnage totals of one scenario together with its enrollments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionSummary {
    pub production_id: i64,
    pub scenario_name: String,
    pub contractual_year: i32,
    pub summary: EnrollmentSummary,
    pub enrollments: Vec<EnrollmentView>,
}

/// Field rules for each enrollment of a batch plus partner clashes inside it.
fn check_enrollments(enrollments: &[NewEnrollment]) -> BauxiteResult<()> {
    let mut errors = Vec::new();

    for (index, enrollment) in enrollments.iter().enumerate() {
        if let Err(e) = enrollment.validate() {
            let prefix = format!("Enrollment {}", index + 1);
            errors.extend(prefixed(&prefix, format_validation_errors(&e)));
        }
    }

    let ids: Vec<String> = enrollments.iter().map(|e| e.partner_id.to_string()).collect();
    let duplicates = find_duplicates(ids.iter().map(String::as_str));
    if !duplicates.is_empty() {
        errors.push(format!("Duplicate partner ids in enrollments: {}", duplicates.join(", ")));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(BauxiteError::validation_errors(errors))
    }
}

fn current_year() -> i32 {
    Utc::now().year()
}

/// Production scenarios, their lifecycle and their partner enrollments.
#[derive(Clone)]
pub struct ProductionService {
    productions: Arc<dyn ProductionRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    partners: Arc<dyn PartnerRepository>,
    ctx: ServiceContext,
}

impl ProductionService {
    pub fn new(
        productions: Arc<dyn ProductionRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        partners: Arc<dyn PartnerRepository>,
        ctx: ServiceContext,
    ) -> Self {
        Self {
            productions,
            enrollments,
            partners,
            ctx,
        }
    }

    pub async fn get(&self, id: i64, include_enrollments: bool, include_deleted: bool) -> BauxiteResult<ProductionView> {
        let key = format!(
            "{}{}:enrollments={}:deleted={}",
            CACHE_PREFIX, id, include_enrollments, include_deleted
        );
        let load = async {
            let production = self.require(id, include_deleted).await?;
            self.view(production, include_enrollments).await
        };
        self.ctx
            .track(SERVICE, "get", self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), load))
            .await
    }

    pub async fn list(&self, filter: &ProductionFilter, options: &ListOptions) -> BauxiteResult<Page<ProductionView>> {
        self.ctx
            .track(SERVICE, "list", async {
                let page = self.productions.list(filter, options).await?;
                Ok(page.map(ProductionView::from))
            })
            .await
    }

    pub async fn create(&self, request: CreateProductionRequest, actor: Option<&str>) -> BauxiteResult<ProductionView> {
        self.ctx
            .track(SERVICE, "create", async {
                let CreateProductionRequest {
                    mut production,
                    enrollments,
                } = request;
                validate_model(&production)?;
                check_enrollments(&enrollments)?;
                self.check_base(&production, None).await?;
                if production.status == ProductionStatus::Active {
                    self.ensure_no_active(production.contractual_year, None).await?;
                }
                if production.version.is_none() {
                    production.version = Some(self.next_version(&production).await?);
                }

                let mut resolved = Vec::with_capacity(enrollments.len());
                for (index, enrollment) in enrollments.into_iter().enumerate() {
                    let prefix = format!("Enrollment {}", index + 1);
                    resolved.push(self.resolve_minimum(enrollment, &prefix).await?);
                }

                let production = if resolved.is_empty() {
                    self.productions.create(production, actor).await?
                } else {
                    let (production, _) = self
                        .productions
                        .create_with_enrollments(production, resolved, actor)
                        .await?;
                    production
                };

                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!(
                    "Production created",
                    production_id = production.id,
                    year = production.contractual_year,
                    status = %production.status
                );
                self.view(production, true).await
            })
            .await
    }

    pub async fn update(&self, id: i64, changes: Map<String, Value>, actor: Option<&str>) -> BauxiteResult<ProductionView> {
        self.ctx
            .track(SERVICE, "update", async {
                let mut production = self.require(id, false).await?;
                let form: NewProduction = merge_changes(&production.form(), &changes)?;
                validate_model(&form)?;
                self.check_base(&form, Some(id)).await?;

                production.apply(form)?;
                if production.is_active() {
                    self.ensure_no_active(production.contractual_year, Some(id)).await?;
                }
                let production = self.productions.update(production, actor).await?;
                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!("Production updated", production_id = id, status = %production.status);

                self.view(production, false).await
            })
            .await
    }

    pub async fn set_status(&self, id: i64, change: StatusChange, actor: Option<&str>) -> BauxiteResult<ProductionView> {
        self.ctx
            .track(SERVICE, "set_status", async {
                let mut production = self.require(id, false).await?;
                let previous = production.status;
                production.set_status(change.status)?;
                if production.is_active() {
                    self.ensure_no_active(production.contractual_year, Some(id)).await?;
                }

                let production = self.productions.update(production, actor).await?;
                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!(
                    "Production status changed",
                    production_id = id,
                    from = %previous,
                    to = %production.status
                );
                self.view(production, false).await
            })
            .await
    }

    pub async fn delete(&self, id: i64, permanent: bool, actor: Option<&str>) -> BauxiteResult<()> {
        self.ctx
            .track(SERVICE, "delete", async {
                self.productions
                    .delete(id, DeleteMode::from_permanent(permanent), actor)
                    .await?;
                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!("Production deleted", production_id = id, permanent = permanent);
                Ok(())
            })
            .await
    }

    pub async fn restore(&self, id: i64, actor: Option<&str>) -> BauxiteResult<ProductionView> {
        self.ctx
            .track(SERVICE, "restore", async {
                let production = self.require(id, true).await?;
                if production.is_active() {
                    self.ensure_no_active(production.contractual_year, Some(id)).await?;
                }

                let production = self.productions.restore(id, actor).await?;
                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!("Production restored", production_id = id);
                self.view(production, false).await
            })
            .await
    }

    /// The ACTIVE scenario of `year` (current year by default) with its
    /// enrollments and summary.
    pub async fn active(&self, year: Option<i32>) -> BauxiteResult<ProductionView> {
        let year = year.unwrap_or_else(current_year);
        self.ctx
            .track(SERVICE, "active", async {
                let production = self
                    .productions
                    .find_active(year, None)
                    .await?
                    .filter(|production| !production.audit.is_deleted())
                    .ok_or_else(|| BauxiteError::not_found(format!("Active production for year {}", year)))?;
                self.view(production, true).await
            })
            .await
    }

    /// COMPLETED scenarios of the years before `up_to_year`.
    pub async fn finalized(&self, up_to_year: Option<i32>) -> BauxiteResult<Vec<ProductionView>> {
        let year = up_to_year.unwrap_or_else(current_year);
        self.ctx
            .track(SERVICE, "finalized", async {
                let rows = self.productions.completed_before(year).await?;
                Ok(rows.into_iter().map(ProductionView::from).collect())
            })
            .await
    }

    /// Copies a scenario into a new DRAFT version. Enrollments come along
    /// with their VLD figures reset.
    pub async fn new_version(&self, id: i64, request: NewVersionRequest, actor: Option<&str>) -> BauxiteResult<ProductionView> {
        self.ctx
            .track(SERVICE, "new_version", async {
                validate_model(&request)?;
                let source = self.require(id, false).await?;
                let name = request
                    .scenario_name
                    .clone()
                    .unwrap_or_else(|| source.scenario_name.clone());
                let version = self
                    .productions
                    .latest_version(source.contractual_year, &name)
                    .await?
                    .unwrap_or(0)
                    + 1;
                let form = source.next_version_form(request.scenario_name, version);

                let copies: Vec<NewEnrollment> = self
                    .enrollments
                    .list_for_production(id, None)
                    .await?
                    .iter()
                    .map(|detail| detail.enrollment.carry_over())
                    .collect();
                let production = if copies.is_empty() {
                    self.productions.create(form, actor).await?
                } else {
                    self.productions
                        .create_with_enrollments(form, copies, actor)
                        .await?
                        .0
                };

                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!(
                    "Production version created",
                    source_id = id,
                    production_id = production.id,
                    version = production.version
                );
                self.view(production, true).await
            })
            .await
    }

    pub async fn summary(&self, id: i64) -> BauxiteResult<ProductionSummary> {
        self.ctx
            .track(SERVICE, "summary", async {
                let production = self.require(id, false).await?;
                let details = self.enrollments.list_for_production(id, None).await?;
                let (enrollments, summary) = summarize(details);
                Ok(ProductionSummary {
                    production_id: production.id,
                    scenario_name: production.scenario_name,
                    contractual_year: production.contractual_year,
                    summary,
                    enrollments,
                })
            })
            .await
    }

    /// Enrolled partners, narrowed to halco buyers or offtakers when
    /// `halco_buyer` is given.
    pub async fn partners(&self, id: i64, halco_buyer: Option<bool>) -> BauxiteResult<Vec<EnrollmentView>> {
        self.ctx
            .track(SERVICE, "partners", async {
                self.require(id, false).await?;
                let details = self.enrollments.list_for_production(id, halco_buyer).await?;
                Ok(summarize(details).0)
            })
            .await
    }

    pub async fn list_enrollments(&self, id: i64) -> BauxiteResult<Vec<EnrollmentView>> {
        self.partners(id, None).await
    }

    pub async fn add_enrollment(&self, id: i64, new: NewEnrollment) -> BauxiteResult<EnrollmentView> {
        self.ctx
            .track(SERVICE, "add_enrollment", async {
                validate_model(&new)?;
                self.require(id, false).await?;
                self.ensure_not_enrolled(id, new.partner_id, None).await?;
                let new = self.resolve_minimum(new, "Enrollment").await?;

                let enrollment = self.enrollments.create(id, new).await?;
                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!(
                    "Enrollment added",
                    production_id = id,
                    enrollment_id = enrollment.id,
                    partner_id = enrollment.partner_id
                );
                self.enrollment_view(id, enrollment.id).await
            })
            .await
    }

    pub async fn get_enrollment(&self, id: i64, enrollment_id: i64) -> BauxiteResult<EnrollmentView> {
        self.ctx
            .track(SERVICE, "get_enrollment", self.enrollment_view(id, enrollment_id))
            .await
    }

    pub async fn update_enrollment(
        &self,
        id: i64,
        enrollment_id: i64,
        changes: Map<String, Value>,
    ) -> BauxiteResult<EnrollmentView> {
        self.ctx
            .track(SERVICE, "update_enrollment", async {
                self.require(id, false).await?;
                let detail = self
                    .enrollments
                    .get(id, enrollment_id)
                    .await?
                    .ok_or_else(|| BauxiteError::not_found(format!("Enrollment {}", enrollment_id)))?;
                let mut enrollment = detail.enrollment;

                let mut form: NewEnrollment = merge_changes(&enrollment.form(), &changes)?;
                validate_model(&form)?;
                if form.partner_id != enrollment.partner_id {
                    self.ensure_not_enrolled(id, form.partner_id, Some(enrollment_id)).await?;
                    form = self.resolve_minimum(form, "Enrollment").await?;
                }

                enrollment.apply(form);
                let enrollment = self.enrollments.update(enrollment).await?;
                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!("Enrollment updated", production_id = id, enrollment_id = enrollment.id);
                self.enrollment_view(id, enrollment.id).await
            })
            .await
    }

    pub async fn delete_enrollment(&self, id: i64, enrollment_id: i64) -> BauxiteResult<()> {
        self.ctx
            .track(SERVICE, "delete_enrollment", async {
                self.enrollments.delete(id, enrollment_id).await?;
                self.ctx.invalidate(CACHE_PREFIX).await;
                log_info!("Enrollment deleted", production_id = id, enrollment_id = enrollment_id);
                Ok(())
            })
            .await
    }

    pub async fn statistics(&self) -> BauxiteResult<EntityStatistics> {
        let key = format!("{}statistics", CACHE_PREFIX);
        self.ctx
            .track(
                SERVICE,
                "statistics",
                self.ctx.cached(SERVICE, key, self.ctx.default_ttl(), self.productions.statistics()),
            )
            .await
    }

    pub fn health(&self) -> Value {
        self.ctx.metrics.snapshot(SERVICE)
    }

    async fn require(&self, id: i64, include_deleted: bool) -> BauxiteResult<Production> {
        self.productions
            .get(id, include_deleted)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Production {}", id)))
    }

    async fn ensure_no_active(&self, year: i32, exclude_id: Option<i64>) -> BauxiteResult<()> {
        if let Some(active) = self.productions.find_active(year, exclude_id).await? {
            log_warn!("Rejected second active scenario", year = year, active_id = active.id);
            return Err(BauxiteError::active_conflict(year));
        }
        Ok(())
    }

    async fn check_base(&self, form: &NewProduction, self_id: Option<i64>) -> BauxiteResult<()> {
        let Some(base_id) = form.base_scenario_id else {
            return Ok(());
        };
        if Some(base_id) == self_id {
            return Err(BauxiteError::validation("A scenario cannot be its own base scenario"));
        }
        self.productions
            .get(base_id, true)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Base scenario {}", base_id)))?;
        Ok(())
    }

    async fn next_version(&self, form: &NewProduction) -> BauxiteResult<i32> {
        let latest = self
            .productions
            .latest_version(form.contractual_year, &form.scenario_name)
            .await?;
        Ok(latest.unwrap_or(0) + 1)
    }

    /// Fills a missing minimum from the partner's contractual minimum.
    async fn resolve_minimum(&self, new: NewEnrollment, prefix: &str) -> BauxiteResult<NewEnrollment> {
        let partner = self
            .partners
            .get(new.partner_id, false)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Partner {}", new.partner_id)))?;
        let new = new.with_default_minimum(partner.minimum_contractual_tonnage);
        if new.minimum_tonnage.is_none() {
            return Err(BauxiteError::validation(format!(
                "{}: minimum_tonnage is required because partner {} has no minimum contractual tonnage",
                prefix, partner.id
            )));
        }
        Ok(new)
    }

    async fn ensure_not_enrolled(&self, id: i64, partner_id: i64, exclude_id: Option<i64>) -> BauxiteResult<()> {
        let enrolled = self
            .enrollments
            .list_for_production(id, None)
            .await?
            .iter()
            .any(|detail| {
                detail.enrollment.partner_id == partner_id && Some(detail.enrollment.id) != exclude_id
            });
        if enrolled {
            return Err(BauxiteError::duplicate(format!(
                "Partner {} is already enrolled in production {}",
                partner_id, id
            )));
        }
        Ok(())
    }

    async fn enrollment_view(&self, id: i64, enrollment_id: i64) -> BauxiteResult<EnrollmentView> {
        let detail = self
            .enrollments
            .get(id, enrollment_id)
            .await?
            .ok_or_else(|| BauxiteError::not_found(format!("Enrollment {}", enrollment_id)))?;
        Ok(EnrollmentView::from(detail))
    }

    async fn view(&self, production: Production, include_enrollments: bool) -> BauxiteResult<ProductionView> {
        let mut view = ProductionView::from(production);
        if include_enrollments {
            let details = self
                .enrollments
                .list_for_production(view.production.id, None)
                .await?;
            let (enrollments, summary) = summarize(details);
            view.enrollments = Some(enrollments);
            view.summary = Some(summary);
        }
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(partner_id: i64, manual: Option<i64>, calculated: Option<i64>) -> NewEnrollment {
        NewEnrollment {
            partner_id,
            vessel_size_t: 60_000,
            minimum_tonnage: Some(1_000),
            adjusted_tonnage: None,
            manual_incentive_tonnage: manual,
            calculated_incentive_tonnage: calculated,
            calculated_vld_count: 0,
            calculated_vld_total_tonnage: 0,
            vld_tonnage_variance: None,
        }
    }

    #[test]
    fn test_duplicate_partners_rejected() {
        let error = check_enrollments(&[enrollment(3, None, None), enrollment(3, None, None)]).unwrap_err();
        assert_eq!(error.messages(), vec!["Duplicate partner ids in enrollments: 3".to_string()]);
    }

    #[test]
    fn test_incentive_exclusivity_prefixed() {
        let error =
            check_enrollments(&[enrollment(1, None, None), enrollment(2, Some(10), Some(20))]).unwrap_err();
        let messages = error.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Enrollment 2: "));
        assert!(messages[0].contains("mutually exclusive"));
    }

    #[test]
    fn test_clean_enrollments_pass() {
        assert!(check_enrollments(&[]).is_ok());
        assert!(check_enrollments(&[enrollment(1, Some(10), None), enrollment(2, None, Some(5))]).is_ok());
    }
}
