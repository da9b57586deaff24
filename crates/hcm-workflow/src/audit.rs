//! 字段变更审计
//!
//! 每次提交前对比新旧病例值，为每个实际变化的字段生成一条审计记录。
//! 无变化不产生记录，保持审计轨迹有信息量。

use chrono::Utc;
use hcm_core::{Case, CaseAudit, CaseStatus, Role};
use uuid::Uuid;

/// 角色状态字段在审计记录中的名称
pub fn role_status_field(role: Role) -> &'static str {
    match role {
        Role::Technician => "technician_status",
        Role::Scientist => "scientist_status",
        Role::Doctor => "doctor_status",
        Role::Admin | Role::Super => "admin_status",
    }
}

/// 构造单条字段变更记录
pub fn field_change(
    case_id: Uuid,
    case_version_id: Uuid,
    field_name: &str,
    old_value: Option<String>,
    new_value: Option<String>,
    changed_by: Uuid,
) -> CaseAudit {
    CaseAudit {
        id: Uuid::new_v4(),
        case_id,
        case_version_id,
        field_name: field_name.to_string(),
        old_value,
        new_value,
        changed_by_user_id: changed_by,
        changed_at: Utc::now(),
    }
}

fn status_value(status: Option<CaseStatus>) -> Option<String> {
    status.map(|s| s.as_str().to_string())
}

/// 对比新旧病例值，生成全部字段变更记录
///
/// 覆盖全局状态、各处理角色状态、当前持有人和当前版本指针。
pub fn diff_case(
    before: &Case,
    after: &Case,
    case_version_id: Uuid,
    changed_by: Uuid,
) -> Vec<CaseAudit> {
    let mut audits = Vec::new();

    if before.global_status != after.global_status {
        audits.push(field_change(
            before.id,
            case_version_id,
            "global_status",
            status_value(Some(before.global_status)),
            status_value(Some(after.global_status)),
            changed_by,
        ));
    }

    for role in [Role::Technician, Role::Scientist, Role::Doctor] {
        let old = before.role_status(role);
        let new = after.role_status(role);
        if old != new {
            audits.push(field_change(
                before.id,
                case_version_id,
                role_status_field(role),
                status_value(old),
                status_value(new),
                changed_by,
            ));
        }
    }

    if before.current_user_id != after.current_user_id {
        audits.push(field_change(
            before.id,
            case_version_id,
            "current_user_id",
            before.current_user_id.map(|id| id.to_string()),
            after.current_user_id.map(|id| id.to_string()),
            changed_by,
        ));
    }

    if before.current_version_id != after.current_version_id {
        audits.push(field_change(
            before.id,
            case_version_id,
            "current_version_id",
            before.current_version_id.map(|id| id.to_string()),
            after.current_version_id.map(|id| id.to_string()),
            changed_by,
        ));
    }

    audits
}
