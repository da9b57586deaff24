//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 用户角色
///
/// 处理流水线固定为 技师 → 检验师 → 医生，Admin/Super 不在流水线内。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    /// 技师 - 创建病例并上传原始资料
    Technician,
    /// 检验师 - 分析并出具初步结论
    Scientist,
    /// 医生 - 最终诊断
    Doctor,
    /// 医院管理员
    Admin,
    /// 平台管理员
    Super,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Technician => "technician",
            Role::Scientist => "scientist",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::Super => "super",
        }
    }

    pub fn from_str(value: &str) -> Option<Role> {
        match value {
            "technician" => Some(Role::Technician),
            "scientist" => Some(Role::Scientist),
            "doctor" => Some(Role::Doctor),
            "admin" => Some(Role::Admin),
            "super" => Some(Role::Super),
            _ => None,
        }
    }

    /// 流水线位次，非处理角色返回None
    pub fn pipeline_rank(&self) -> Option<u8> {
        match self {
            Role::Technician => Some(0),
            Role::Scientist => Some(1),
            Role::Doctor => Some(2),
            Role::Admin | Role::Super => None,
        }
    }

    /// 是否为处理角色（持有角色状态）
    pub fn is_handling(&self) -> bool {
        self.pipeline_rank().is_some()
    }

    /// 流水线顺序检查：只允许向同级或下游角色移交
    ///
    /// Admin/Super 视为所有处理角色的上游；移交目标必须是处理角色。
    pub fn can_hand_to(&self, target: Role) -> bool {
        match (self.pipeline_rank(), target.pipeline_rank()) {
            (Some(from), Some(to)) => from <= to,
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 病例状态
///
/// 全局状态与角色状态共用同一词汇表；检验师没有Draft状态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    Draft,      // 草稿
    Assigned,   // 已分派
    InProgress, // 处理中
    Completed,  // 已完成
    Cancelled,  // 已取消
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Draft => "DRAFT",
            CaseStatus::Assigned => "ASSIGNED",
            CaseStatus::InProgress => "IN_PROGRESS",
            CaseStatus::Completed => "COMPLETED",
            CaseStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(value: &str) -> Option<CaseStatus> {
        match value {
            "DRAFT" => Some(CaseStatus::Draft),
            "ASSIGNED" => Some(CaseStatus::Assigned),
            "IN_PROGRESS" => Some(CaseStatus::InProgress),
            "COMPLETED" => Some(CaseStatus::Completed),
            "CANCELLED" => Some(CaseStatus::Cancelled),
            _ => None,
        }
    }

    /// 终态后所有状态字段冻结
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Cancelled)
    }
}

/// 病例优先级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }

    pub fn from_str(value: &str) -> Option<Priority> {
        match value {
            "LOW" => Some(Priority::Low),
            "MEDIUM" => Some(Priority::Medium),
            "HIGH" => Some(Priority::High),
            "URGENT" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// 病例信息
///
/// 不变式：current_user_id 一旦设置，必须等于该病例最新分派记录的
/// assigned_to_user_id，两者只由工作流引擎在同一次提交内写入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub case_number: String, // 医院内部病例号
    pub hospital_id: Uuid,   // 租户隔离边界
    pub patient_id: Uuid,
    pub department_id: Uuid,
    pub priority: Priority,
    pub global_status: CaseStatus, // 跨角色视图观察到的状态
    pub status_by_role: HashMap<Role, CaseStatus>, // 各处理角色独立跟踪的状态
    pub current_user_id: Option<Uuid>, // 当前责任人
    pub current_version_id: Option<Uuid>, // 最新内容版本
    pub revision: i64,       // 乐观并发序号，每次提交递增
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    /// 指定处理角色的状态
    pub fn role_status(&self, role: Role) -> Option<CaseStatus> {
        self.status_by_role.get(&role).copied()
    }

    /// 全局状态是否已冻结
    pub fn is_terminal(&self) -> bool {
        self.global_status.is_terminal()
    }
}

/// 病例内容版本
///
/// 不可变快照标记，只在病例内容实际变化时追加，状态转换不产生新版本。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseVersion {
    pub id: Uuid,
    pub case_id: Uuid,
    pub version_number: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// 病例分派记录
///
/// 仅追加。该表本身就是"谁曾经持有过此病例"的审计凭证，
/// 访问控制以它为准，而非 current_user_id 指针。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseAssignment {
    pub id: Uuid,
    pub case_id: Uuid,
    pub case_version_id: Uuid,
    pub assigned_by_user_id: Uuid,
    pub assigned_to_user_id: Uuid,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

/// 病例字段变更审计记录
///
/// 仅追加，纯诊断用途，不参与访问控制。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseAudit {
    pub id: Uuid,
    pub case_id: Uuid,
    pub case_version_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by_user_id: Uuid,
    pub changed_at: DateTime<Utc>,
}

/// 操作者身份三元组
///
/// 由认证协作方解析后传入，本系统不做认证。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub hospital_id: Uuid,
}

/// 新建病例参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCase {
    pub patient_id: Uuid,
    pub department_id: Uuid,
    pub priority: Priority,
}
