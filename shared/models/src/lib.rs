//! # Bauxite Planning Domain Models
//!
//! Records, payloads and derived figures for the bauxite planning service.
//!
//! ## Key Models
//!
//! - **Mine**: an extraction site and the port it ships from
//! - **Product**: a bauxite grade produced at a mine
//! - **PartnerEntity** / **Partner**: buyer groups and the contracted partners under them
//! - **Production**: a yearly planning scenario with a status lifecycle
//! - **Enrollment**: a partner's participation in a scenario, with tonnage math
//!
//! ## Validation
//!
//! Every create/update payload (`New*`) derives `validator::Validate`:
//! - Length limits on names, codes and descriptions
//! - Code format `^[A-Za-z0-9_.-]+$`
//! - Coordinate and tonnage ranges
//! - Cross-field rules (date windows, exclusive incentive sources)
//!
//! Updates merge a JSON change set over the record's current form
//! (see [`forms::merge_changes`]) and validate the result like a create.

pub mod audit;
pub mod enrollment;
pub mod forms;
pub mod mine;
pub mod pagination;
pub mod partner;
pub mod product;
pub mod production;

#[cfg(test)]
pub mod property_tests;

pub use audit::*;
pub use enrollment::*;
pub use forms::merge_changes;
pub use mine::*;
pub use pagination::*;
pub use partner::*;
pub use product::*;
pub use production::*;

/// Case-insensitive substring match used by the `q` filters.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::tests::{detail, enrollment};
    use validator::Validate;

    #[test]
    fn test_contains_ci() {
        assert!(contains_ci("Sangaredi", "GARE"));
        assert!(contains_ci("anything", ""));
        assert!(!contains_ci("Boke", "kamsar"));
    }

    #[test]
    fn test_planned_from_minimum_plus_manual_incentive() {
        let record = enrollment(1_000, None, Some(500), None);
        assert_eq!(record.incentive_tonnage(), 500);
        assert_eq!(record.planned_tonnage(), 1_500);
    }

    #[test]
    fn test_adjusted_overrides_incentives() {
        assert_eq!(enrollment(1_000, Some(1_800), Some(500), None).planned_tonnage(), 1_800);
        assert_eq!(enrollment(1_000, Some(1_800), None, Some(900)).planned_tonnage(), 1_800);
    }

    #[test]
    fn test_both_incentives_rejected() {
        let form = NewEnrollment {
            partner_id: 1,
            vessel_size_t: 60_000,
            minimum_tonnage: Some(1_000),
            adjusted_tonnage: None,
            manual_incentive_tonnage: Some(500),
            calculated_incentive_tonnage: Some(200),
            calculated_vld_count: 0,
            calculated_vld_total_tonnage: 0,
            vld_tonnage_variance: None,
        };
        let errors = form.validate().unwrap_err();
        let messages = bauxite_utils::format_validation_errors(&errors);
        assert_eq!(messages, vec![INCENTIVE_EXCLUSIVITY_MESSAGE.to_string()]);
    }

    #[test]
    fn test_share_is_zero_without_planned_tonnage() {
        let details = vec![
            detail(enrollment(0, None, None, None)),
            detail(enrollment(0, Some(0), None, None)),
        ];
        let (views, summary) = summarize(details);
        assert_eq!(summary.total_planned_tonnage, 0);
        assert!(views.iter().all(|view| view.share == Some(0.0)));
    }

    #[test]
    fn test_archived_is_terminal() {
        for target in [
            ProductionStatus::Draft,
            ProductionStatus::Planned,
            ProductionStatus::Active,
            ProductionStatus::Completed,
        ] {
            assert!(!ProductionStatus::Archived.can_transition_to(target));
        }
    }
}
