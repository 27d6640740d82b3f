//! Production planning scenarios.
//!
//! A scenario covers one contractual year and moves through
//! `draft -> planned -> active -> completed`. `archived` can be reached from
//! any other state and is terminal. At most one scenario per contractual
//! year may be `active`.

use bauxite_utils::{BauxiteError, BauxiteResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::audit::AuditFields;
use crate::enrollment::MAX_TONNAGE;
use crate::enrollment::{EnrollmentSummary, EnrollmentView, NewEnrollment};

pub const PRODUCTION_SORT_FIELDS: &[&str] = &[
    "id",
    "scenario_name",
    "contractual_year",
    "status",
    "version",
    "created_at",
    "updated_at",
];

pub const DEFAULT_MOISTURE_CONTENT: f64 = 3.0;

/// Scenario lifecycle states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductionStatus {
    /// Being drafted
    #[default]
    Draft,
    /// Agreed, not yet running
    Planned,
    /// The scenario in force for its year
    Active,
    /// Year closed
    Completed,
    /// Retired
    Archived,
}

impl ProductionStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Planned => 1,
            Self::Active => 2,
            Self::Completed => 3,
            Self::Archived => 4,
        }
    }

    /// Check if transition is valid
    pub fn can_transition_to(&self, target: ProductionStatus) -> bool {
        use ProductionStatus::*;

        match (self, target) {
            (current, target) if *current == target => true,

            // Terminal
            (Archived, _) => false,

            // Side exit
            (_, Archived) => true,

            // Forward only along the main line
            (current, target) => target.rank() > current.rank(),
        }
    }

    pub fn ensure_transition(&self, target: ProductionStatus) -> BauxiteResult<()> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(BauxiteError::operation(format!(
                "Invalid status transition from {} to {}",
                self, target
            )))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProductionStatus::Archived)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for ProductionStatus {
    type Err = BauxiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "planned" => Ok(Self::Planned),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(BauxiteError::validation(format!(
                "Invalid status '{}'. Allowed: draft, planned, active, completed, archived",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Production {
    pub id: i64,
    pub scenario_name: String,
    pub scenario_description: Option<String>,
    pub contractual_year: i32,
    pub total_planned_tonnage: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub standard_moisture_content: f64,
    pub status: ProductionStatus,
    pub base_scenario_id: Option<i64>,
    pub version: i32,
    pub activated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

/// Editable scenario fields. `version` is assigned automatically when absent.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_schedule", skip_on_field_errors = false))]
pub struct NewProduction {
    #[validate(length(min = 1, max = 255, message = "Scenario name must be between 1 and 255 characters"))]
    pub scenario_name: String,
    #[validate(length(max = 5000, message = "Scenario description must be at most 5000 characters"))]
    pub scenario_description: Option<String>,
    #[validate(range(min = 2000, max = 2100, message = "Contractual year must be between 2000 and 2100"))]
    pub contractual_year: i32,
    #[validate(range(min = 1, max = "MAX_TONNAGE", message = "Total planned tonnage must be between 1 and 1000000000000"))]
    pub total_planned_tonnage: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_moisture")]
    #[validate(range(min = 0.0, max = 100.0, message = "Standard moisture content must be between 0 and 100"))]
    pub standard_moisture_content: f64,
    #[serde(default)]
    pub status: ProductionStatus,
    pub base_scenario_id: Option<i64>,
    #[validate(range(min = 1, message = "Version must be at least 1"))]
    pub version: Option<i32>,
}

fn default_moisture() -> f64 {
    DEFAULT_MOISTURE_CONTENT
}

fn validate_schedule(production: &NewProduction) -> Result<(), ValidationError> {
    if production.start_date >= production.end_date {
        let mut error = ValidationError::new("date_range");
        error.message = Some("start_date must be before end_date".into());
        return Err(error);
    }
    Ok(())
}

impl Production {
    /// Builds a stored scenario. The status is applied afterwards through
    /// [`Production::set_status`] so timestamps are stamped consistently.
    pub fn from_new(id: i64, new: NewProduction, version: i32, audit: AuditFields) -> Self {
        let mut production = Self {
            id,
            scenario_name: new.scenario_name,
            scenario_description: new.scenario_description,
            contractual_year: new.contractual_year,
            total_planned_tonnage: new.total_planned_tonnage,
            start_date: new.start_date,
            end_date: new.end_date,
            standard_moisture_content: new.standard_moisture_content,
            status: ProductionStatus::Draft,
            base_scenario_id: new.base_scenario_id,
            version,
            activated_at: None,
            completed_at: None,
            audit,
        };
        production.stamp(new.status);
        production.status = new.status;
        production
    }

    pub fn form(&self) -> NewProduction {
        NewProduction {
            scenario_name: self.scenario_name.clone(),
            scenario_description: self.scenario_description.clone(),
            contractual_year: self.contractual_year,
            total_planned_tonnage: self.total_planned_tonnage,
            start_date: self.start_date,
            end_date: self.end_date,
            standard_moisture_content: self.standard_moisture_content,
            status: self.status,
            base_scenario_id: self.base_scenario_id,
            version: Some(self.version),
        }
    }

    /// Applies edited fields, enforcing the transition table on `status`.
    pub fn apply(&mut self, form: NewProduction) -> BauxiteResult<()> {
        self.status.ensure_transition(form.status)?;

        self.scenario_name = form.scenario_name;
        self.scenario_description = form.scenario_description;
        self.contractual_year = form.contractual_year;
        self.total_planned_tonnage = form.total_planned_tonnage;
        self.start_date = form.start_date;
        self.end_date = form.end_date;
        self.standard_moisture_content = form.standard_moisture_content;
        self.base_scenario_id = form.base_scenario_id;
        if let Some(version) = form.version {
            self.version = version;
        }
        self.set_status(form.status)
    }

    pub fn set_status(&mut self, target: ProductionStatus) -> BauxiteResult<()> {
        self.status.ensure_transition(target)?;
        if self.status != target {
            self.stamp(target);
            self.status = target;
        }
        Ok(())
    }

    fn stamp(&mut self, target: ProductionStatus) {
        let now = Utc::now();
        match target {
            ProductionStatus::Active => self.activated_at = Some(now),
            ProductionStatus::Completed => {
                self.completed_at.get_or_insert(now);
            }
            _ => {}
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductionStatus::Active
    }

    /// Inclusive length of the scenario window in days.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Form for the next version of this scenario: a draft pointing back
    /// at this one.
    pub fn next_version_form(&self, scenario_name: Option<String>, version: i32) -> NewProduction {
        NewProduction {
            scenario_name: scenario_name.unwrap_or_else(|| self.scenario_name.clone()),
            scenario_description: self.scenario_description.clone(),
            contractual_year: self.contractual_year,
            total_planned_tonnage: self.total_planned_tonnage,
            start_date: self.start_date,
            end_date: self.end_date,
            standard_moisture_content: self.standard_moisture_content,
            status: ProductionStatus::Draft,
            base_scenario_id: Some(self.id),
            version: Some(version),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductionFilter {
    pub scenario_name: Option<String>,
    pub contractual_year: Option<i32>,
    pub status: Option<ProductionStatus>,
    pub q: Option<String>,
}

impl ProductionFilter {
    pub fn matches(&self, production: &Production) -> bool {
        if self
            .scenario_name
            .as_ref()
            .is_some_and(|name| *name != production.scenario_name)
        {
            return false;
        }
        if self
            .contractual_year
            .is_some_and(|year| year != production.contractual_year)
        {
            return false;
        }
        if self.status.is_some_and(|status| status != production.status) {
            return false;
        }
        self.q.as_deref().map_or(true, |q| {
            crate::contains_ci(&production.scenario_name, q)
                || production
                    .scenario_description
                    .as_deref()
                    .is_some_and(|description| crate::contains_ci(description, q))
        })
    }
}

/// A scenario as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionView {
    #[serde(flatten)]
    pub production: Production,
    pub duration_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollments: Option<Vec<EnrollmentView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<EnrollmentSummary>,
}

impl From<Production> for ProductionView {
    fn from(production: Production) -> Self {
        Self {
            duration_days: production.duration_days(),
            production,
            enrollments: None,
            summary: None,
        }
    }
}

/// `POST /api/productions` body: the scenario plus optional enrollments.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductionRequest {
    #[serde(flatten)]
    #[validate]
    pub production: NewProduction,
    #[serde(default)]
    #[validate]
    pub enrollments: Vec<NewEnrollment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: ProductionStatus,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewVersionRequest {
    #[validate(length(min = 1, max = 255, message = "Scenario name must be between 1 and 255 characters"))]
    pub scenario_name: Option<String>,
}
