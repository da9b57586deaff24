//! 分派历史判定
//!
//! 分派记录仅追加，是"谁曾经持有过此病例"的唯一权威来源。
//! 指针与日志的并集判断集中在这里，调用方不得自行重新实现。

use hcm_core::{Case, CaseAssignment};
use uuid::Uuid;

/// 当前持有人：时间戳最大的分派记录的接收人
///
/// 引擎保证 Case.current_user_id 与该值在同一次提交内同步。
pub fn current_assignee(assignments: &[CaseAssignment]) -> Option<Uuid> {
    assignments
        .iter()
        .max_by_key(|row| row.assigned_at)
        .map(|row| row.assigned_to_user_id)
}

/// 用户是否曾经持有过该病例
///
/// 三个来源取并集：历史分派记录、当前持有人指针、
/// 创建人（初始持有人可能没有显式分派记录）。
pub fn was_ever_assigned(case: &Case, assignments: &[CaseAssignment], user_id: Uuid) -> bool {
    assignments
        .iter()
        .any(|row| row.assigned_to_user_id == user_id)
        || case.current_user_id == Some(user_id)
        || case.created_by == user_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use hcm_core::{CaseStatus, Priority, Role};
    use std::collections::HashMap;

    fn case_with(current: Option<Uuid>, created_by: Uuid) -> Case {
        Case {
            id: Uuid::new_v4(),
            case_number: "HCM-20260101-0123456789ab".to_string(),
            hospital_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            priority: Priority::Medium,
            global_status: CaseStatus::Draft,
            status_by_role: HashMap::from([(Role::Technician, CaseStatus::Draft)]),
            current_user_id: current,
            current_version_id: Some(Uuid::new_v4()),
            revision: 0,
            created_by,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn assignment_row(case_id: Uuid, to: Uuid, at_offset_secs: i64) -> CaseAssignment {
        CaseAssignment {
            id: Uuid::new_v4(),
            case_id,
            case_version_id: Uuid::new_v4(),
            assigned_by_user_id: Uuid::new_v4(),
            assigned_to_user_id: to,
            notes: None,
            assigned_at: Utc::now() + Duration::seconds(at_offset_secs),
        }
    }

    #[test]
    fn test_current_assignee_is_latest_row() {
        let case_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let rows = vec![
            assignment_row(case_id, first, 0),
            assignment_row(case_id, second, 10),
        ];

        assert_eq!(current_assignee(&rows), Some(second));
        assert_eq!(current_assignee(&[]), None);
    }

    #[test]
    fn test_creator_counts_without_explicit_row() {
        let creator = Uuid::new_v4();
        let case = case_with(None, creator);

        assert!(was_ever_assigned(&case, &[], creator));
        assert!(!was_ever_assigned(&case, &[], Uuid::new_v4()));
    }

    #[test]
    fn test_history_outlives_reassignment() {
        let creator = Uuid::new_v4();
        let earlier_holder = Uuid::new_v4();
        let current = Uuid::new_v4();
        let case = case_with(Some(current), creator);

        let rows = vec![
            assignment_row(case.id, earlier_holder, 0),
            assignment_row(case.id, current, 10),
        ];

        // 指针已指向新持有人，历史持有人依然保有访问资格
        assert!(was_ever_assigned(&case, &rows, earlier_holder));
        assert!(was_ever_assigned(&case, &rows, current));
        assert!(was_ever_assigned(&case, &rows, creator));
    }
}
