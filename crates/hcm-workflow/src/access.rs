//! 访问守卫
//!
//! 访问规则不是"仅当前持有人"，而是"曾经持有过的任何人加当前持有人"，
//! 以支持交接后的协作复查。两个判定只返回布尔值，从不报错；
//! 是否对外表现为 NotFound 还是 Forbidden 由调用方决定。

use crate::assignment;
use hcm_core::{AuthUser, Case, CaseAssignment, Role};

/// 用户是否可以查看/操作该病例
///
/// 租户检查最先执行且不可被任何规则覆盖。
pub fn can_access(case: &Case, assignments: &[CaseAssignment], acting: &AuthUser) -> bool {
    if case.hospital_id != acting.hospital_id {
        return false;
    }

    case.current_user_id == Some(acting.id)
        || assignment::was_ever_assigned(case, assignments, acting.id)
}

/// 用户是否可以将该病例移交给目标角色
///
/// 要求可访问、全局状态未冻结、且移交方向符合
/// 技师 → 检验师 → 医生 的流水线顺序（允许同级横向转派）。
pub fn can_assign(
    case: &Case,
    assignments: &[CaseAssignment],
    acting: &AuthUser,
    target_role: Role,
) -> bool {
    can_access(case, assignments, acting)
        && !case.global_status.is_terminal()
        && acting.role.can_hand_to(target_role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hcm_core::{CaseStatus, Priority};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn hospital_case(hospital_id: Uuid, holder: Uuid) -> Case {
        Case {
            id: Uuid::new_v4(),
            case_number: "HCM-20260101-0123456789ab".to_string(),
            hospital_id,
            patient_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            priority: Priority::Medium,
            global_status: CaseStatus::Assigned,
            status_by_role: HashMap::from([(Role::Technician, CaseStatus::Draft)]),
            current_user_id: Some(holder),
            current_version_id: Some(Uuid::new_v4()),
            revision: 0,
            created_by: holder,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user(id: Uuid, role: Role, hospital_id: Uuid) -> AuthUser {
        AuthUser {
            id,
            role,
            hospital_id,
        }
    }

    #[test]
    fn test_tenant_mismatch_is_never_overridable() {
        let hospital = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let case = hospital_case(hospital, holder);

        // 即使是当前持有人，租户不符也拒绝
        let outsider = user(holder, Role::Doctor, Uuid::new_v4());
        assert!(!can_access(&case, &[], &outsider));
    }

    #[test]
    fn test_current_holder_and_creator_have_access() {
        let hospital = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let case = hospital_case(hospital, holder);

        assert!(can_access(&case, &[], &user(holder, Role::Technician, hospital)));
        assert!(!can_access(
            &case,
            &[],
            &user(Uuid::new_v4(), Role::Doctor, hospital)
        ));
    }

    #[test]
    fn test_can_assign_respects_pipeline_direction() {
        let hospital = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let case = hospital_case(hospital, holder);

        let scientist = user(holder, Role::Scientist, hospital);
        assert!(can_assign(&case, &[], &scientist, Role::Doctor));
        assert!(can_assign(&case, &[], &scientist, Role::Scientist));
        assert!(!can_assign(&case, &[], &scientist, Role::Technician));

        let doctor = user(holder, Role::Doctor, hospital);
        assert!(!can_assign(&case, &[], &doctor, Role::Scientist));
    }

    #[test]
    fn test_terminal_case_blocks_assignment() {
        let hospital = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let mut case = hospital_case(hospital, holder);
        case.global_status = CaseStatus::Completed;

        let technician = user(holder, Role::Technician, hospital);
        assert!(!can_assign(&case, &[], &technician, Role::Scientist));

        case.global_status = CaseStatus::Cancelled;
        assert!(!can_assign(&case, &[], &technician, Role::Scientist));
    }
}
