use crate::model::role::Role;

/// The person whose request is being reviewed.
#[derive(Debug, Clone, Copy)]
pub struct RequestOwner {
    pub user_id: u64,
    pub supervisor_id: Option<u64>,
}

/// Who may approve or reject a request.
///
/// Supervisors review their direct reports, managers and above review
/// anyone. Nobody reviews their own request.
pub fn can_review(reviewer_id: u64, reviewer_role: Role, owner: RequestOwner) -> bool {
    if reviewer_id == owner.user_id {
        return false;
    }
    match reviewer_role {
        Role::Employee => false,
        Role::Supervisor => owner.supervisor_id == Some(reviewer_id),
        Role::Manager | Role::Hr | Role::Admin => true,
    }
}

/// A swap rewrites two rosters, so the reviewer must cover both people.
pub fn can_approve_swap(
    reviewer_id: u64,
    reviewer_role: Role,
    requester: RequestOwner,
    target: RequestOwner,
) -> bool {
    can_review(reviewer_id, reviewer_role, requester) && can_review(reviewer_id, reviewer_role, target)
}

/// Requests raised by HR or Admin need no second pair of eyes.
pub fn auto_approves(requester_role: Role) -> bool {
    requester_role.is_hr_or_admin()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: RequestOwner = RequestOwner {
        user_id: 10,
        supervisor_id: Some(3),
    };

    #[test]
    fn supervisor_reviews_only_direct_reports() {
        assert!(can_review(3, Role::Supervisor, OWNER));
        assert!(!can_review(4, Role::Supervisor, OWNER));
    }

    #[test]
    fn higher_roles_review_anyone() {
        assert!(can_review(5, Role::Manager, OWNER));
        assert!(can_review(1, Role::Admin, OWNER));
        assert!(can_review(2, Role::Hr, OWNER));
    }

    #[test]
    fn employees_and_self_never_review() {
        assert!(!can_review(11, Role::Employee, OWNER));
        assert!(!can_review(10, Role::Admin, OWNER));
    }

    #[test]
    fn swap_needs_both_people_in_the_team() {
        let colleague = RequestOwner {
            user_id: 11,
            supervisor_id: Some(3),
        };
        let outsider = RequestOwner {
            user_id: 20,
            supervisor_id: Some(8),
        };
        assert!(can_approve_swap(3, Role::Supervisor, OWNER, colleague));
        assert!(!can_approve_swap(3, Role::Supervisor, OWNER, outsider));
        assert!(can_approve_swap(5, Role::Manager, OWNER, outsider));

        // the target never approves their own swap
        let target_supervisor = RequestOwner {
            user_id: 3,
            supervisor_id: Some(5),
        };
        assert!(!can_approve_swap(3, Role::Supervisor, OWNER, target_supervisor));
    }

    #[test]
    fn only_hr_and_admin_auto_approve() {
        assert!(auto_approves(Role::Hr));
        assert!(auto_approves(Role::Admin));
        assert!(!auto_approves(Role::Manager));
        assert!(!auto_approves(Role::Employee));
    }
}
