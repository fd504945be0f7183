//! Unit tests for profile vocabulary

use core_types::{BranchOutcome, BranchProfile, TypeFeedback, TypeInfo};

#[test]
fn test_feedback_stays_monomorphic_on_repeat() {
    let mut feedback = TypeFeedback::Uninitialized;
    for _ in 0..10 {
        feedback = feedback.merge(TypeInfo::Int);
    }
    assert_eq!(feedback.monomorphic(), Some(TypeInfo::Int));
}

#[test]
fn test_feedback_goes_polymorphic_on_second_type() {
    let feedback = TypeFeedback::Uninitialized
        .merge(TypeInfo::Null)
        .merge(TypeInfo::Int);
    assert_eq!(feedback, TypeFeedback::Polymorphic);
    assert_eq!(feedback.monomorphic(), None);
}

#[test]
fn test_branch_profile_total_saturates() {
    let profile = BranchProfile::new(u64::MAX, 1);
    assert_eq!(profile.total(), u64::MAX);
}

#[test]
fn test_branch_profile_requires_zero_on_other_side() {
    assert_eq!(BranchProfile::new(1000, 1).one_sided(), None);
    assert_eq!(
        BranchProfile::new(1000, 0).one_sided(),
        Some(BranchOutcome::Taken)
    );
}
