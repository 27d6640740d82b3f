//! Property-based tests for the planning models
//!
//! Covers the enrollment tonnage math, share distribution and the
//! production status machine.

use proptest::option;
use proptest::prelude::*;

use crate::enrollment::tests::{detail, enrollment};
use crate::{summarize, Enrollment, ProductionStatus};

fn arb_status() -> impl Strategy<Value = ProductionStatus> {
    prop_oneof![
        Just(ProductionStatus::Draft),
        Just(ProductionStatus::Planned),
        Just(ProductionStatus::Active),
        Just(ProductionStatus::Completed),
        Just(ProductionStatus::Archived),
    ]
}

prop_compose! {
    fn arb_enrollment()(
        minimum in 0i64..5_000_000,
        adjusted in option::of(0i64..5_000_000),
        incentive in option::of(0i64..1_000_000),
        manual in any::<bool>(),
        vld_total in 0i64..5_000_000,
    ) -> Enrollment {
        let (manual_incentive, calculated_incentive) = if manual {
            (incentive, None)
        } else {
            (None, incentive)
        };
        let mut record = enrollment(minimum, adjusted, manual_incentive, calculated_incentive);
        record.calculated_vld_total_tonnage = vld_total;
        record
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Planned tonnage is the adjusted figure when present, otherwise the
    /// minimum plus whichever incentive is set.
    #[test]
    fn property_planned_tonnage(record in arb_enrollment()) {
        let incentive = record
            .manual_incentive_tonnage
            .or(record.calculated_incentive_tonnage)
            .unwrap_or(0);
        match record.adjusted_tonnage {
            Some(adjusted) => prop_assert_eq!(record.planned_tonnage(), adjusted),
            None => prop_assert_eq!(record.planned_tonnage(), record.minimum_tonnage + incentive),
        }
        prop_assert_eq!(
            record.variance(),
            record.calculated_vld_total_tonnage - record.planned_tonnage()
        );
    }

    /// Shares sum to 1 whenever anything is planned, and are all zero otherwise.
    #[test]
    fn property_shares_sum_to_one(records in prop::collection::vec(arb_enrollment(), 0..12)) {
        let (views, summary) = summarize(records.into_iter().map(detail).collect());

        let planned: i64 = views.iter().map(|view| view.planned_tonnage).sum();
        prop_assert_eq!(summary.total_planned_tonnage, planned);
        prop_assert_eq!(summary.partners_count, views.len() as i64);

        let shares: Vec<f64> = views.iter().filter_map(|view| view.share).collect();
        prop_assert_eq!(shares.len(), views.len());
        if summary.total_planned_tonnage == 0 {
            prop_assert!(shares.iter().all(|share| *share == 0.0));
        } else {
            let total: f64 = shares.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9, "shares summed to {}", total);
        }
    }

    /// No transition leaves archived, and no transition moves backwards
    /// along draft -> planned -> active -> completed.
    #[test]
    fn property_transitions_never_go_back(from in arb_status(), to in arb_status()) {
        let allowed = from.can_transition_to(to);
        if from == to {
            prop_assert!(allowed);
        } else if from == ProductionStatus::Archived {
            prop_assert!(!allowed);
        } else if to == ProductionStatus::Archived {
            prop_assert!(allowed);
        }
        prop_assert_eq!(allowed, from.ensure_transition(to).is_ok());
        if allowed && from != to && to != ProductionStatus::Archived {
            prop_assert!(!to.can_transition_to(from));
        }
    }
}
