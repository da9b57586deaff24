//! 数据库模型

use chrono::{DateTime, Utc};
use hcm_core::models::*;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库用户表（身份协作方的本地投影）
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub role: String, // 存储为字符串，转换为Role枚举
    pub hospital_id: Uuid,
}

impl DbUser {
    pub fn into_auth_user(self) -> Option<AuthUser> {
        Some(AuthUser {
            id: self.id,
            role: Role::from_str(&self.role)?,
            hospital_id: self.hospital_id,
        })
    }
}

/// 数据库病例表
#[derive(Debug, FromRow)]
pub struct DbCase {
    pub id: Uuid,
    pub case_number: String,
    pub hospital_id: Uuid,
    pub patient_id: Uuid,
    pub department_id: Uuid,
    pub priority: String,      // 存储为字符串，转换为Priority枚举
    pub global_status: String, // 存储为字符串，转换为CaseStatus枚举
    pub technician_status: Option<String>,
    pub scientist_status: Option<String>,
    pub doctor_status: Option<String>,
    pub current_user_id: Option<Uuid>,
    pub current_version_id: Option<Uuid>,
    pub revision: i64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbCase> for Case {
    fn from(db_case: DbCase) -> Self {
        let mut status_by_role = HashMap::new();
        for (role, column) in [
            (Role::Technician, &db_case.technician_status),
            (Role::Scientist, &db_case.scientist_status),
            (Role::Doctor, &db_case.doctor_status),
        ] {
            if let Some(status) = column.as_deref().and_then(CaseStatus::from_str) {
                status_by_role.insert(role, status);
            }
        }

        Case {
            id: db_case.id,
            case_number: db_case.case_number,
            hospital_id: db_case.hospital_id,
            patient_id: db_case.patient_id,
            department_id: db_case.department_id,
            priority: Priority::from_str(&db_case.priority).unwrap_or(Priority::Medium),
            global_status: CaseStatus::from_str(&db_case.global_status)
                .unwrap_or(CaseStatus::Draft), // 默认状态
            status_by_role,
            current_user_id: db_case.current_user_id,
            current_version_id: db_case.current_version_id,
            revision: db_case.revision,
            created_by: db_case.created_by,
            created_at: db_case.created_at,
            updated_at: db_case.updated_at,
        }
    }
}

/// 数据库版本表
#[derive(Debug, FromRow)]
pub struct DbCaseVersion {
    pub id: Uuid,
    pub case_id: Uuid,
    pub version_number: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<DbCaseVersion> for CaseVersion {
    fn from(db_version: DbCaseVersion) -> Self {
        CaseVersion {
            id: db_version.id,
            case_id: db_version.case_id,
            version_number: db_version.version_number,
            created_by: db_version.created_by,
            created_at: db_version.created_at,
        }
    }
}

/// 数据库分派表
#[derive(Debug, FromRow)]
pub struct DbCaseAssignment {
    pub id: Uuid,
    pub case_id: Uuid,
    pub case_version_id: Uuid,
    pub assigned_by_user_id: Uuid,
    pub assigned_to_user_id: Uuid,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

impl From<DbCaseAssignment> for CaseAssignment {
    fn from(db_assignment: DbCaseAssignment) -> Self {
        CaseAssignment {
            id: db_assignment.id,
            case_id: db_assignment.case_id,
            case_version_id: db_assignment.case_version_id,
            assigned_by_user_id: db_assignment.assigned_by_user_id,
            assigned_to_user_id: db_assignment.assigned_to_user_id,
            notes: db_assignment.notes,
            assigned_at: db_assignment.assigned_at,
        }
    }
}

/// 数据库审计表
#[derive(Debug, FromRow)]
pub struct DbCaseAudit {
    pub id: Uuid,
    pub case_id: Uuid,
    pub case_version_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by_user_id: Uuid,
    pub changed_at: DateTime<Utc>,
}

impl From<DbCaseAudit> for CaseAudit {
    fn from(db_audit: DbCaseAudit) -> Self {
        CaseAudit {
            id: db_audit.id,
            case_id: db_audit.case_id,
            case_version_id: db_audit.case_version_id,
            field_name: db_audit.field_name,
            old_value: db_audit.old_value,
            new_value: db_audit.new_value,
            changed_by_user_id: db_audit.changed_by_user_id,
            changed_at: db_audit.changed_at,
        }
    }
}

/// 角色状态列的写入值
pub fn role_status_column(case: &Case, role: Role) -> Option<&'static str> {
    case.role_status(role).map(|status| status.as_str())
}
