//! 病例状态策略
//!
//! 角色状态与全局状态的双轨转换规则。纯函数，无I/O。
//! 全局状态是各角色状态的投影：角色转换可以推动全局状态前进，
//! 但全局状态绝不回退，终态后一切转换退化为恒等。

use hcm_core::{Case, CaseStatus, Role};
use serde::{Deserialize, Serialize};

/// 一次分派产生的状态变更
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentTransition {
    pub global_status: CaseStatus,
    pub role_updates: Vec<(Role, CaseStatus)>,
}

impl AssignmentTransition {
    /// 恒等转换（终态防线）
    fn identity(case: &Case) -> Self {
        Self {
            global_status: case.global_status,
            role_updates: Vec::new(),
        }
    }

    /// 是否不改变任何状态字段
    pub fn is_identity(&self, case: &Case) -> bool {
        self.global_status == case.global_status
            && self
                .role_updates
                .iter()
                .all(|(role, status)| case.role_status(*role) == Some(*status))
    }
}

/// 状态策略
#[derive(Debug, Default)]
pub struct StatusPolicy;

impl StatusPolicy {
    pub fn new() -> Self {
        Self
    }

    /// 分派时的状态转换
    ///
    /// - 终态病例：恒等（调用方必须先行检查，这里是第二道防线）
    /// - 移交给医生：移交角色的状态置为Completed（已交接），全局进入InProgress
    /// - 其他目标（含同级横向转派）：目标角色状态重置为Assigned，
    ///   全局仅在Draft时前进到Assigned，否则保持不动
    pub fn on_assignment(
        &self,
        acting_role: Role,
        target_role: Role,
        case: &Case,
    ) -> AssignmentTransition {
        if case.is_terminal() {
            return AssignmentTransition::identity(case);
        }

        let mut role_updates = Vec::new();

        if target_role == Role::Doctor && acting_role != Role::Doctor {
            // 向医生移交：上游角色到达其"已交接"终值
            if acting_role.is_handling() {
                role_updates.push((acting_role, CaseStatus::Completed));
            }
            role_updates.push((Role::Doctor, CaseStatus::Assigned));

            AssignmentTransition {
                global_status: CaseStatus::InProgress,
                role_updates,
            }
        } else {
            role_updates.push((target_role, CaseStatus::Assigned));

            let global_status = match case.global_status {
                CaseStatus::Draft => CaseStatus::Assigned,
                other => other,
            };

            AssignmentTransition {
                global_status,
                role_updates,
            }
        }
    }

    /// 首次查看时的状态转换
    ///
    /// 打开病例即视为开始处理：Assigned前进到InProgress，其余恒等。
    pub fn on_first_view(&self, status: CaseStatus) -> CaseStatus {
        match status {
            CaseStatus::Assigned => CaseStatus::InProgress,
            other => other,
        }
    }

    /// 结案时的状态转换
    pub fn on_complete(&self, acting_role: Role, case: &Case) -> AssignmentTransition {
        if case.is_terminal() {
            return AssignmentTransition::identity(case);
        }

        let mut role_updates = Vec::new();
        if acting_role.is_handling() {
            role_updates.push((acting_role, CaseStatus::Completed));
        }

        AssignmentTransition {
            global_status: CaseStatus::Completed,
            role_updates,
        }
    }

    /// 取消时的状态转换
    pub fn on_cancel(&self, acting_role: Role, case: &Case) -> AssignmentTransition {
        if case.is_terminal() {
            return AssignmentTransition::identity(case);
        }

        let mut role_updates = Vec::new();
        if acting_role.is_handling() {
            role_updates.push((acting_role, CaseStatus::Cancelled));
        }

        AssignmentTransition {
            global_status: CaseStatus::Cancelled,
            role_updates,
        }
    }
}
