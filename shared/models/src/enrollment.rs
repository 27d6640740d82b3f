//! Partner enrollments in a production scenario and the tonnage figures
//! derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Upper bound for any single tonnage figure (one trillion tonnes). Keeps
/// the derived sums far inside `i64`.
pub const MAX_TONNAGE: i64 = 1_000_000_000_000;
const MIN_VARIANCE: i64 = -MAX_TONNAGE;

pub const INCENTIVE_EXCLUSIVITY_MESSAGE: &str =
    "manual_incentive_tonnage and calculated_incentive_tonnage are mutually exclusive";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Enrollment {
    pub id: i64,
    pub production_id: i64,
    pub partner_id: i64,
    pub vessel_size_t: i64,
    pub minimum_tonnage: i64,
    pub adjusted_tonnage: Option<i64>,
    pub manual_incentive_tonnage: Option<i64>,
    pub calculated_incentive_tonnage: Option<i64>,
    pub calculated_vld_count: i32,
    pub calculated_vld_total_tonnage: i64,
    pub vld_tonnage_variance: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enrollment payload. `minimum_tonnage` falls back to the partner's
/// contractual minimum when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_incentive", skip_on_field_errors = false))]
pub struct NewEnrollment {
    pub partner_id: i64,
    #[validate(range(min = 1, max = "MAX_TONNAGE", message = "Vessel size must be between 1 and 1000000000000"))]
    pub vessel_size_t: i64,
    #[validate(range(min = 0, max = "MAX_TONNAGE", message = "Minimum tonnage must be between 0 and 1000000000000"))]
    pub minimum_tonnage: Option<i64>,
    #[validate(range(min = 0, max = "MAX_TONNAGE", message = "Adjusted tonnage must be between 0 and 1000000000000"))]
    pub adjusted_tonnage: Option<i64>,
    #[validate(range(min = 0, max = "MAX_TONNAGE", message = "Manual incentive tonnage must be between 0 and 1000000000000"))]
    pub manual_incentive_tonnage: Option<i64>,
    #[validate(range(min = 0, max = "MAX_TONNAGE", message = "Calculated incentive tonnage must be between 0 and 1000000000000"))]
    pub calculated_incentive_tonnage: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0, message = "VLD count must be zero or more"))]
    pub calculated_vld_count: i32,
    #[serde(default)]
    #[validate(range(min = 0, max = "MAX_TONNAGE", message = "VLD total tonnage must be between 0 and 1000000000000"))]
    pub calculated_vld_total_tonnage: i64,
    #[validate(range(min = "MIN_VARIANCE", max = "MAX_TONNAGE", message = "VLD tonnage variance must be between -1000000000000 and 1000000000000"))]
    pub vld_tonnage_variance: Option<i64>,
}

fn validate_incentive(enrollment: &NewEnrollment) -> Result<(), ValidationError> {
    if enrollment.manual_incentive_tonnage.is_some()
        && enrollment.calculated_incentive_tonnage.is_some()
    {
        let mut error = ValidationError::new("incentive_exclusivity");
        error.message = Some(INCENTIVE_EXCLUSIVITY_MESSAGE.into());
        return Err(error);
    }
    Ok(())
}

impl NewEnrollment {
    /// Fills `minimum_tonnage` from the partner's contractual minimum.
    pub fn with_default_minimum(mut self, contractual_minimum: Option<i64>) -> Self {
        if self.minimum_tonnage.is_none() {
            self.minimum_tonnage = contractual_minimum;
        }
        self
    }
}

impl Enrollment {
    pub fn incentive_tonnage(&self) -> i64 {
        self.manual_incentive_tonnage
            .or(self.calculated_incentive_tonnage)
            .unwrap_or(0)
    }

    /// Saturates rather than overflows on rows written outside the API.
    pub fn planned_tonnage(&self) -> i64 {
        self.adjusted_tonnage
            .unwrap_or_else(|| self.minimum_tonnage.saturating_add(self.incentive_tonnage()))
    }

    /// Stored variance if present, else actual VLD tonnage minus plan.
    pub fn variance(&self) -> i64 {
        self.vld_tonnage_variance.unwrap_or_else(|| {
            self.calculated_vld_total_tonnage
                .saturating_sub(self.planned_tonnage())
        })
    }

    pub fn form(&self) -> NewEnrollment {
        NewEnrollment {
            partner_id: self.partner_id,
            vessel_size_t: self.vessel_size_t,
            minimum_tonnage: Some(self.minimum_tonnage),
            adjusted_tonnage: self.adjusted_tonnage,
            manual_incentive_tonnage: self.manual_incentive_tonnage,
            calculated_incentive_tonnage: self.calculated_incentive_tonnage,
            calculated_vld_count: self.calculated_vld_count,
            calculated_vld_total_tonnage: self.calculated_vld_total_tonnage,
            vld_tonnage_variance: self.vld_tonnage_variance,
        }
    }

    /// Applies a validated form. The caller resolves `minimum_tonnage` first;
    /// a missing value keeps the current one.
    pub fn apply(&mut self, form: NewEnrollment) {
        self.partner_id = form.partner_id;
        self.vessel_size_t = form.vessel_size_t;
        if let Some(minimum) = form.minimum_tonnage {
            self.minimum_tonnage = minimum;
        }
        self.adjusted_tonnage = form.adjusted_tonnage;
        self.manual_incentive_tonnage = form.manual_incentive_tonnage;
        self.calculated_incentive_tonnage = form.calculated_incentive_tonnage;
        self.calculated_vld_count = form.calculated_vld_count;
        self.calculated_vld_total_tonnage = form.calculated_vld_total_tonnage;
        self.vld_tonnage_variance = form.vld_tonnage_variance;
    }

    /// Copy for a new scenario version. Plan figures carry over, VLD
    /// figures start again from zero.
    pub fn carry_over(&self) -> NewEnrollment {
        NewEnrollment {
            calculated_vld_count: 0,
            calculated_vld_total_tonnage: 0,
            vld_tonnage_variance: None,
            ..self.form()
        }
    }
}

/// An enrollment joined with its partner and the partner's entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentDetail {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub partner_name: String,
    pub partner_code: String,
    pub entity_id: i64,
    pub entity_name: String,
    pub is_halco_buyer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentView {
    #[serde(flatten)]
    pub detail: EnrollmentDetail,
    pub incentive_tonnage: i64,
    pub planned_tonnage: i64,
    pub variance: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<f64>,
}

impl From<EnrollmentDetail> for EnrollmentView {
    fn from(detail: EnrollmentDetail) -> Self {
        Self {
            incentive_tonnage: detail.enrollment.incentive_tonnage(),
            planned_tonnage: detail.enrollment.planned_tonnage(),
            variance: detail.enrollment.variance(),
            share: None,
            detail,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentSummary {
    pub partners_count: i64,
    pub total_planned_tonnage: i64,
    pub total_actual_vld_tonnage: i64,
    pub total_vld_variance: i64,
}

/// Totals over a scenario's enrollments, plus each enrollment's share of
/// the planned total (0.0 everywhere when nothing is planned).
pub fn summarize(details: Vec<EnrollmentDetail>) -> (Vec<EnrollmentView>, EnrollmentSummary) {
    let mut views: Vec<EnrollmentView> = details.into_iter().map(EnrollmentView::from).collect();

    let summary = views.iter().fold(EnrollmentSummary::default(), |mut acc, view| {
        acc.partners_count += 1;
        acc.total_planned_tonnage = acc.total_planned_tonnage.saturating_add(view.planned_tonnage);
        acc.total_actual_vld_tonnage = acc
            .total_actual_vld_tonnage
            .saturating_add(view.detail.enrollment.calculated_vld_total_tonnage);
        acc.total_vld_variance = acc.total_vld_variance.saturating_add(view.variance);
        acc
    });

    for view in &mut views {
        view.share = Some(if summary.total_planned_tonnage == 0 {
            0.0
        } else {
            view.planned_tonnage as f64 / summary.total_planned_tonnage as f64
        });
    }

    (views, summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn enrollment(
        minimum: i64,
        adjusted: Option<i64>,
        manual: Option<i64>,
        calculated: Option<i64>,
    ) -> Enrollment {
        let now = Utc::now();
        Enrollment {
            id: 1,
            production_id: 1,
            partner_id: 1,
            vessel_size_t: 60_000,
            minimum_tonnage: minimum,
            adjusted_tonnage: adjusted,
            manual_incentive_tonnage: manual,
            calculated_incentive_tonnage: calculated,
            calculated_vld_count: 0,
            calculated_vld_total_tonnage: 0,
            vld_tonnage_variance: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn detail(enrollment: Enrollment) -> EnrollmentDetail {
        EnrollmentDetail {
            enrollment,
            partner_name: "Alcoa Europe".to_string(),
            partner_code: "ALC-EU".to_string(),
            entity_id: 1,
            entity_name: "Alcoa".to_string(),
            is_halco_buyer: true,
        }
    }

    fn new_enrollment() -> NewEnrollment {
        NewEnrollment {
            partner_id: 1,
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

    #[test]
    fn test_incentive_prefers_manual() {
        assert_eq!(enrollment(0, None, Some(300), None).incentive_tonnage(), 300);
        assert_eq!(enrollment(0, None, None, Some(200)).incentive_tonnage(), 200);
        assert_eq!(enrollment(0, None, None, None).incentive_tonnage(), 0);
    }

    #[test]
    fn test_variance_falls_back_to_vld_minus_plan() {
        let mut record = enrollment(1_000, None, None, None);
        record.calculated_vld_total_tonnage = 900;
        assert_eq!(record.variance(), -100);

        record.vld_tonnage_variance = Some(42);
        assert_eq!(record.variance(), 42);
    }

    #[test]
    fn test_vessel_size_must_be_positive() {
        let mut form = new_enrollment();
        form.vessel_size_t = 0;
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_default_minimum_from_partner() {
        let mut form = new_enrollment();
        form.minimum_tonnage = None;
        assert_eq!(form.clone().with_default_minimum(Some(750)).minimum_tonnage, Some(750));
        assert_eq!(form.with_default_minimum(None).minimum_tonnage, None);

        let explicit = new_enrollment().with_default_minimum(Some(750));
        assert_eq!(explicit.minimum_tonnage, Some(1_000));
    }

    #[test]
    fn test_carry_over_resets_vld() {
        let mut record = enrollment(1_000, Some(1_200), None, Some(100));
        record.calculated_vld_count = 4;
        record.calculated_vld_total_tonnage = 240_000;
        record.vld_tonnage_variance = Some(-5);

        let copy = record.carry_over();
        assert_eq!(copy.calculated_vld_count, 0);
        assert_eq!(copy.calculated_vld_total_tonnage, 0);
        assert_eq!(copy.vld_tonnage_variance, None);
        assert_eq!(copy.adjusted_tonnage, Some(1_200));
        assert_eq!(copy.calculated_incentive_tonnage, Some(100));
    }

    #[test]
    fn test_summary_totals() {
        let mut first = enrollment(1_000, None, Some(500), None);
        first.calculated_vld_total_tonnage = 1_400;
        let second = enrollment(500, None, None, None);

        let (views, summary) = summarize(vec![detail(first), detail(second)]);
        assert_eq!(summary.partners_count, 2);
        assert_eq!(summary.total_planned_tonnage, 2_000);
        assert_eq!(summary.total_actual_vld_tonnage, 1_400);
        assert_eq!(summary.total_vld_variance, -100 + -500);
        assert_eq!(views[0].share, Some(0.75));
        assert_eq!(views[1].share, Some(0.25));
    }

    #[test]
    fn test_tonnage_upper_bound() {
        let mut form = new_enrollment();
        form.minimum_tonnage = Some(i64::MAX);
        form.manual_incentive_tonnage = Some(1);
        let errors = form.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("minimum_tonnage"));

        let mut form = new_enrollment();
        form.minimum_tonnage = Some(MAX_TONNAGE);
        form.adjusted_tonnage = Some(MAX_TONNAGE);
        form.manual_incentive_tonnage = Some(MAX_TONNAGE);
        assert!(form.validate().is_ok());

        form.vld_tonnage_variance = Some(i64::MIN);
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_extreme_stored_figures_saturate() {
        let mut record = enrollment(i64::MAX, Some(10), Some(1), None);
        assert_eq!(record.planned_tonnage(), 10);

        record.adjusted_tonnage = None;
        assert_eq!(record.planned_tonnage(), i64::MAX);
        assert_eq!(record.variance(), -i64::MAX);

        let (_, summary) = summarize(vec![detail(record.clone()), detail(record)]);
        assert_eq!(summary.total_planned_tonnage, i64::MAX);
        assert_eq!(summary.total_vld_variance, i64::MIN);
    }

    #[test]
    fn test_empty_summary() {
        let (views, summary) = summarize(Vec::new());
        assert!(views.is_empty());
        assert_eq!(summary, EnrollmentSummary::default());
    }
}
