//! 病例工作流引擎
//!
//! 分派、状态转换、版本推进和审计写入的唯一编排者。
//! 引擎是 Case 及其附属记录的唯一写入方：每次操作把全部写入
//! 打包为一次存储提交，要么全部生效要么全部不生效；
//! 活动事件在提交成功后发布，发布失败不回滚病例变更。

use crate::{
    access, audit,
    status_policy::{AssignmentTransition, StatusPolicy},
    store::{CaseCommit, CaseStore},
};
use chrono::Utc;
use hcm_activity::{ActivityEvent, ActivityEventType, ActivityLogger};
use hcm_core::{
    utils, AuthUser, Case, CaseAssignment, CaseAudit, CaseStatus, CaseVersion, HcmError, NewCase,
    Result, Role,
};
use std::sync::Arc;
use uuid::Uuid;

/// 病例工作流引擎
pub struct CaseWorkflowEngine {
    store: Arc<dyn CaseStore>,
    policy: StatusPolicy,
    activity: ActivityLogger,
}

impl CaseWorkflowEngine {
    pub fn new(store: Arc<dyn CaseStore>, activity: ActivityLogger) -> Self {
        Self {
            store,
            policy: StatusPolicy::new(),
            activity,
        }
    }

    /// 创建新病例
    ///
    /// 技师在本院创建，初始为Draft，创建人即初始持有人，
    /// 同时生成第1号内容版本。
    pub async fn create_case(&self, acting: &AuthUser, new_case: NewCase) -> Result<Case> {
        if !matches!(acting.role, Role::Technician | Role::Admin | Role::Super) {
            return Err(HcmError::Forbidden(format!(
                "角色 {} 不能创建病例",
                acting.role
            )));
        }

        let case_id = Uuid::new_v4();
        let now = Utc::now();

        let version = CaseVersion {
            id: Uuid::new_v4(),
            case_id,
            version_number: 1,
            created_by: acting.id,
            created_at: now,
        };

        let mut status_by_role = std::collections::HashMap::new();
        status_by_role.insert(Role::Technician, CaseStatus::Draft);

        let case = Case {
            id: case_id,
            case_number: utils::generate_case_number(),
            hospital_id: acting.hospital_id,
            patient_id: new_case.patient_id,
            department_id: new_case.department_id,
            priority: new_case.priority,
            global_status: CaseStatus::Draft,
            status_by_role,
            current_user_id: Some(acting.id),
            current_version_id: Some(version.id),
            revision: 0,
            created_by: acting.id,
            created_at: now,
            updated_at: now,
        };

        let audits = vec![audit::field_change(
            case_id,
            version.id,
            "global_status",
            None,
            Some(CaseStatus::Draft.as_str().to_string()),
            acting.id,
        )];

        let created = self.store.insert_case(case, version, audits).await?;
        tracing::info!(
            "Created case {} ({}) in hospital {}",
            created.id,
            created.case_number,
            created.hospital_id
        );

        self.activity
            .emit(ActivityEvent::new(
                ActivityEventType::CaseCreated,
                acting.id,
                created.id,
                created.hospital_id,
                serde_json::json!({ "case_number": created.case_number }),
            ))
            .await;

        Ok(created)
    }

    /// 将病例移交给目标用户
    ///
    /// 全部校验通过后，分派记录、持有人指针、状态字段和审计记录
    /// 在同一次提交内写入。重复的相同移交会追加新的分派记录，
    /// 但状态结果是幂等的。
    pub async fn assign(
        &self,
        case_id: Uuid,
        acting: &AuthUser,
        target_user_id: Uuid,
        notes: Option<String>,
    ) -> Result<Case> {
        let case = self.load_visible_case(case_id, acting).await?;
        let assignments = self.store.assignments_for_case(case_id).await?;

        if !access::can_access(&case, &assignments, acting) {
            return Err(HcmError::Forbidden(format!("无权访问病例 {}", case_id)));
        }
        if case.is_terminal() {
            return Err(HcmError::Forbidden(format!(
                "病例 {} 已处于终态 {}",
                case_id,
                case.global_status.as_str()
            )));
        }

        // 身份协作方解析目标用户；跨租户目标按未找到处理
        let target = self
            .store
            .resolve_user(target_user_id)
            .await?
            .filter(|user| user.hospital_id == case.hospital_id)
            .ok_or_else(|| HcmError::NotFound(format!("目标用户 {} 不存在", target_user_id)))?;

        if !acting.role.can_hand_to(target.role) {
            return Err(HcmError::Forbidden(format!(
                "角色 {} 不能向 {} 移交病例",
                acting.role, target.role
            )));
        }

        let version_id = case.current_version_id.ok_or_else(|| {
            HcmError::Validation(format!("病例 {} 没有可关联的内容版本", case_id))
        })?;

        let transition = self.policy.on_assignment(acting.role, target.role, &case);
        let updated = self.apply_transition(&case, &transition, Some(target.id));

        let row = CaseAssignment {
            id: Uuid::new_v4(),
            case_id,
            case_version_id: version_id,
            assigned_by_user_id: acting.id,
            assigned_to_user_id: target.id,
            notes: notes.clone(),
            assigned_at: Utc::now(),
        };

        let audits = audit::diff_case(&case, &updated, version_id, acting.id);

        let committed = self
            .store
            .commit_case(CaseCommit {
                case: updated,
                expected_revision: case.revision,
                assignment: Some(row),
                new_version: None,
                audits,
            })
            .await?;

        tracing::info!(
            "Assigned case {} from {} to {} (global status {})",
            case_id,
            acting.id,
            target.id,
            committed.global_status.as_str()
        );

        self.activity
            .emit(ActivityEvent::new(
                ActivityEventType::CaseAssigned,
                acting.id,
                case_id,
                committed.hospital_id,
                serde_json::json!({
                    "assigned_to": target.id,
                    "target_role": target.role.as_str(),
                    "notes": notes,
                }),
            ))
            .await;

        Ok(committed)
    }

    /// 标记病例被查看
    ///
    /// 打开病例即视为开始处理：操作者角色状态 Assigned → InProgress，
    /// 全局状态仅在自身为 Assigned 时跟进。无实际变化时不写任何记录。
    pub async fn mark_viewed(&self, case_id: Uuid, acting: &AuthUser) -> Result<Case> {
        let case = self.load_visible_case(case_id, acting).await?;
        let assignments = self.store.assignments_for_case(case_id).await?;

        if !access::can_access(&case, &assignments, acting) {
            return Err(HcmError::Forbidden(format!("无权访问病例 {}", case_id)));
        }

        // 终态冻结：查看不再改变任何状态字段
        if case.is_terminal() || !acting.role.is_handling() {
            return Ok(case);
        }

        let Some(current) = case.role_status(acting.role) else {
            return Ok(case);
        };

        let advanced = self.policy.on_first_view(current);
        if advanced == current {
            return Ok(case);
        }

        let mut updated = case.clone();
        updated.status_by_role.insert(acting.role, advanced);
        if case.global_status == CaseStatus::Assigned {
            updated.global_status = CaseStatus::InProgress;
        }
        updated.revision = case.revision + 1;
        updated.updated_at = Utc::now();

        let version_id = case.current_version_id.ok_or_else(|| {
            HcmError::Validation(format!("病例 {} 没有可关联的内容版本", case_id))
        })?;
        let audits = audit::diff_case(&case, &updated, version_id, acting.id);

        let committed = self
            .store
            .commit_case(CaseCommit {
                case: updated,
                expected_revision: case.revision,
                assignment: None,
                new_version: None,
                audits,
            })
            .await?;

        tracing::debug!(
            "Case {} opened by {} ({} -> {})",
            case_id,
            acting.id,
            current.as_str(),
            advanced.as_str()
        );

        self.activity
            .emit(ActivityEvent::new(
                ActivityEventType::CaseViewed,
                acting.id,
                case_id,
                committed.hospital_id,
                serde_json::json!({ "role": acting.role.as_str() }),
            ))
            .await;

        Ok(committed)
    }

    /// 为病例附加文档，推进内容版本
    ///
    /// 文档字节已由存储协作方落盘，这里只登记路径、
    /// 追加新版本并更新版本指针。
    pub async fn attach_document(
        &self,
        case_id: Uuid,
        acting: &AuthUser,
        document_path: &str,
        label: &str,
    ) -> Result<Case> {
        let case = self.load_visible_case(case_id, acting).await?;
        let assignments = self.store.assignments_for_case(case_id).await?;

        if !access::can_access(&case, &assignments, acting) {
            return Err(HcmError::Forbidden(format!("无权访问病例 {}", case_id)));
        }
        if case.is_terminal() {
            return Err(HcmError::Forbidden(format!(
                "病例 {} 已处于终态，不能再附加文档",
                case_id
            )));
        }

        let versions = self.store.versions_for_case(case_id).await?;
        let next_number = versions
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;

        let version = CaseVersion {
            id: Uuid::new_v4(),
            case_id,
            version_number: next_number,
            created_by: acting.id,
            created_at: Utc::now(),
        };

        let mut updated = case.clone();
        updated.current_version_id = Some(version.id);
        updated.revision = case.revision + 1;
        updated.updated_at = Utc::now();

        let mut audits = audit::diff_case(&case, &updated, version.id, acting.id);
        audits.push(audit::field_change(
            case_id,
            version.id,
            "document_path",
            None,
            Some(document_path.to_string()),
            acting.id,
        ));

        let committed = self
            .store
            .commit_case(CaseCommit {
                case: updated,
                expected_revision: case.revision,
                assignment: None,
                new_version: Some(version),
                audits,
            })
            .await?;

        tracing::info!(
            "Attached document to case {} (version {})",
            case_id,
            next_number
        );

        self.activity
            .emit(ActivityEvent::new(
                ActivityEventType::DocumentAttached,
                acting.id,
                case_id,
                committed.hospital_id,
                serde_json::json!({
                    "document_path": document_path,
                    "label": label,
                    "version_number": next_number,
                }),
            ))
            .await;

        Ok(committed)
    }

    /// 结案
    pub async fn complete(&self, case_id: Uuid, acting: &AuthUser) -> Result<Case> {
        if !matches!(acting.role, Role::Doctor | Role::Admin | Role::Super) {
            return Err(HcmError::Forbidden(format!(
                "角色 {} 不能结案",
                acting.role
            )));
        }

        let transition_fn =
            |policy: &StatusPolicy, case: &Case| policy.on_complete(acting.role, case);
        self.close_case(case_id, acting, transition_fn, ActivityEventType::CaseCompleted)
            .await
    }

    /// 取消病例
    ///
    /// 取消是终态，不是删除；病例及其全部历史保留。
    pub async fn cancel(
        &self,
        case_id: Uuid,
        acting: &AuthUser,
        reason: Option<String>,
    ) -> Result<Case> {
        let case = self.load_visible_case(case_id, acting).await?;
        let allowed = matches!(acting.role, Role::Admin | Role::Super)
            || case.current_user_id == Some(acting.id);
        if !allowed {
            return Err(HcmError::Forbidden(format!(
                "只有管理员或当前持有人可以取消病例 {}",
                case_id
            )));
        }

        let transition_fn =
            |policy: &StatusPolicy, case: &Case| policy.on_cancel(acting.role, case);
        let committed = self
            .close_case(case_id, acting, transition_fn, ActivityEventType::CaseCancelled)
            .await?;

        if let Some(reason) = reason {
            tracing::info!("Case {} cancelled: {}", case_id, reason);
        }

        Ok(committed)
    }

    /// 查看病例详情
    ///
    /// 无访问权的同院用户也按未找到处理，避免泄露病例是否存在。
    pub async fn get_case(&self, case_id: Uuid, acting: &AuthUser) -> Result<Case> {
        let case = self.load_visible_case(case_id, acting).await?;
        let assignments = self.store.assignments_for_case(case_id).await?;

        if !access::can_access(&case, &assignments, acting) {
            return Err(HcmError::NotFound(format!("病例 {} 不存在", case_id)));
        }

        Ok(case)
    }

    /// 病例的分派历史
    pub async fn case_assignments(
        &self,
        case_id: Uuid,
        acting: &AuthUser,
    ) -> Result<Vec<CaseAssignment>> {
        self.get_case(case_id, acting).await?;
        self.store.assignments_for_case(case_id).await
    }

    /// 病例的审计轨迹
    pub async fn case_audits(&self, case_id: Uuid, acting: &AuthUser) -> Result<Vec<CaseAudit>> {
        self.get_case(case_id, acting).await?;
        self.store.audits_for_case(case_id).await
    }

    /// 病例的版本列表
    pub async fn case_versions(
        &self,
        case_id: Uuid,
        acting: &AuthUser,
    ) -> Result<Vec<CaseVersion>> {
        self.get_case(case_id, acting).await?;
        self.store.versions_for_case(case_id).await
    }

    /// 当前分派给操作者的病例列表
    pub async fn worklist(&self, acting: &AuthUser) -> Result<Vec<Case>> {
        self.store
            .cases_for_user(acting.hospital_id, acting.id)
            .await
    }

    /// 加载病例并执行租户检查
    ///
    /// 跨租户一律按未找到处理，该规则先于任何其他判定且不可覆盖。
    async fn load_visible_case(&self, case_id: Uuid, acting: &AuthUser) -> Result<Case> {
        let case = self
            .store
            .load_case(case_id)
            .await?
            .ok_or_else(|| HcmError::NotFound(format!("病例 {} 不存在", case_id)))?;

        if case.hospital_id != acting.hospital_id {
            return Err(HcmError::NotFound(format!("病例 {} 不存在", case_id)));
        }

        Ok(case)
    }

    /// 应用状态转换，生成新的病例值
    fn apply_transition(
        &self,
        case: &Case,
        transition: &AssignmentTransition,
        new_holder: Option<Uuid>,
    ) -> Case {
        let mut updated = case.clone();
        updated.global_status = transition.global_status;
        for (role, status) in &transition.role_updates {
            updated.status_by_role.insert(*role, *status);
        }
        if let Some(holder) = new_holder {
            updated.current_user_id = Some(holder);
        }
        updated.revision = case.revision + 1;
        updated.updated_at = Utc::now();
        updated
    }

    /// 结案/取消的公共路径
    async fn close_case<F>(
        &self,
        case_id: Uuid,
        acting: &AuthUser,
        transition_fn: F,
        event_type: ActivityEventType,
    ) -> Result<Case>
    where
        F: Fn(&StatusPolicy, &Case) -> AssignmentTransition,
    {
        let case = self.load_visible_case(case_id, acting).await?;
        let assignments = self.store.assignments_for_case(case_id).await?;

        if !access::can_access(&case, &assignments, acting) {
            return Err(HcmError::Forbidden(format!("无权访问病例 {}", case_id)));
        }
        if case.is_terminal() {
            return Err(HcmError::Forbidden(format!(
                "病例 {} 已处于终态 {}",
                case_id,
                case.global_status.as_str()
            )));
        }

        let version_id = case.current_version_id.ok_or_else(|| {
            HcmError::Validation(format!("病例 {} 没有可关联的内容版本", case_id))
        })?;

        let transition = transition_fn(&self.policy, &case);
        let updated = self.apply_transition(&case, &transition, None);
        let audits = audit::diff_case(&case, &updated, version_id, acting.id);

        let committed = self
            .store
            .commit_case(CaseCommit {
                case: updated,
                expected_revision: case.revision,
                assignment: None,
                new_version: None,
                audits,
            })
            .await?;

        tracing::info!(
            "Case {} closed with status {}",
            case_id,
            committed.global_status.as_str()
        );

        self.activity
            .emit(ActivityEvent::new(
                event_type,
                acting.id,
                case_id,
                committed.hospital_id,
                serde_json::json!({ "global_status": committed.global_status.as_str() }),
            ))
            .await;

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use hcm_activity::MemoryActivitySink;
    use hcm_core::Priority;

    struct Fixture {
        engine: CaseWorkflowEngine,
        sink: Arc<MemoryActivitySink>,
        hospital_id: Uuid,
        technician: AuthUser,
        scientist: AuthUser,
        scientist2: AuthUser,
        doctor: AuthUser,
        admin: AuthUser,
        outsider: AuthUser,
    }

    async fn fixture() -> Fixture {
        let hospital_id = Uuid::new_v4();
        let other_hospital = Uuid::new_v4();

        let technician = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Technician,
            hospital_id,
        };
        let scientist = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Scientist,
            hospital_id,
        };
        let scientist2 = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Scientist,
            hospital_id,
        };
        let doctor = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Doctor,
            hospital_id,
        };
        let admin = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Admin,
            hospital_id,
        };
        let outsider = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Doctor,
            hospital_id: other_hospital,
        };

        let store = Arc::new(MemoryStore::new());
        for user in [technician, scientist, scientist2, doctor, admin, outsider] {
            store.add_user(user).await;
        }

        let activity = ActivityLogger::new();
        let sink = Arc::new(MemoryActivitySink::new());
        activity.register(sink.clone()).await;

        let engine = CaseWorkflowEngine::new(store.clone(), activity);

        Fixture {
            engine,
            sink,
            hospital_id,
            technician,
            scientist,
            scientist2,
            doctor,
            admin,
            outsider,
        }
    }

    fn new_case() -> NewCase {
        NewCase {
            patient_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            priority: Priority::Medium,
        }
    }

    #[tokio::test]
    async fn test_create_case_starts_in_draft() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        assert_eq!(case.global_status, CaseStatus::Draft);
        assert_eq!(case.role_status(Role::Technician), Some(CaseStatus::Draft));
        assert_eq!(case.current_user_id, Some(f.technician.id));
        assert_eq!(case.hospital_id, f.hospital_id);
        assert!(case.current_version_id.is_some());

        let versions = f
            .engine
            .case_versions(case.id, &f.technician)
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
    }

    #[tokio::test]
    async fn test_doctor_cannot_create_case() {
        let f = fixture().await;
        let result = f.engine.create_case(&f.doctor, new_case()).await;
        assert!(matches!(result, Err(HcmError::Forbidden(_))));
    }

    // 规格场景：病例#42 技师 → 检验师 → 医生 的完整流转
    #[tokio::test]
    async fn test_full_pipeline_scenario() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        // 技师移交给检验师
        let case = f
            .engine
            .assign(case.id, &f.technician, f.scientist.id, Some("please review".to_string()))
            .await
            .unwrap();
        assert_eq!(case.global_status, CaseStatus::Assigned);
        assert_eq!(case.role_status(Role::Scientist), Some(CaseStatus::Assigned));
        assert_eq!(case.current_user_id, Some(f.scientist.id));

        let rows = f
            .engine
            .case_assignments(case.id, &f.scientist)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].assigned_by_user_id, f.technician.id);
        assert_eq!(rows[0].assigned_to_user_id, f.scientist.id);

        // 检验师打开病例
        let case = f.engine.mark_viewed(case.id, &f.scientist).await.unwrap();
        assert_eq!(
            case.role_status(Role::Scientist),
            Some(CaseStatus::InProgress)
        );
        assert_eq!(case.global_status, CaseStatus::InProgress);

        // 检验师移交给医生
        let case = f
            .engine
            .assign(case.id, &f.scientist, f.doctor.id, None)
            .await
            .unwrap();
        assert_eq!(case.global_status, CaseStatus::InProgress);
        assert_eq!(
            case.role_status(Role::Scientist),
            Some(CaseStatus::Completed)
        );
        assert_eq!(case.role_status(Role::Doctor), Some(CaseStatus::Assigned));
        assert_eq!(case.current_user_id, Some(f.doctor.id));

        // 历史持有人依然保有访问资格
        let rows = f
            .engine
            .case_assignments(case.id, &f.scientist)
            .await
            .unwrap();
        assert!(assignment::was_ever_assigned(&case, &rows, f.scientist.id));

        // 医生打开后全局状态不再变化
        let case = f.engine.mark_viewed(case.id, &f.doctor).await.unwrap();
        assert_eq!(case.role_status(Role::Doctor), Some(CaseStatus::InProgress));
        assert_eq!(case.global_status, CaseStatus::InProgress);
    }

    #[tokio::test]
    async fn test_assign_twice_is_status_idempotent() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        let first = f
            .engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();
        let second = f
            .engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();

        // 状态幂等
        assert_eq!(first.global_status, second.global_status);
        assert_eq!(first.status_by_role, second.status_by_role);
        assert_eq!(first.current_user_id, second.current_user_id);

        // 但每次移交都是一条独立的历史记录
        let rows = f
            .engine
            .case_assignments(case.id, &f.technician)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_lateral_reassignment_between_scientists() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        let case = f
            .engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();
        let case = f.engine.mark_viewed(case.id, &f.scientist).await.unwrap();
        assert_eq!(
            case.role_status(Role::Scientist),
            Some(CaseStatus::InProgress)
        );

        // 横向转派给另一位检验师，角色状态重置为Assigned
        let case = f
            .engine
            .assign(case.id, &f.scientist, f.scientist2.id, None)
            .await
            .unwrap();
        assert_eq!(case.role_status(Role::Scientist), Some(CaseStatus::Assigned));
        assert_eq!(case.current_user_id, Some(f.scientist2.id));
    }

    #[tokio::test]
    async fn test_terminal_freeze() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();
        let case = f
            .engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();
        let case = f
            .engine
            .assign(case.id, &f.scientist, f.doctor.id, None)
            .await
            .unwrap();

        let case = f.engine.complete(case.id, &f.doctor).await.unwrap();
        assert_eq!(case.global_status, CaseStatus::Completed);

        // 终态后移交被拒绝
        let result = f
            .engine
            .assign(case.id, &f.doctor, f.doctor.id, None)
            .await;
        assert!(matches!(result, Err(HcmError::Forbidden(_))));

        // 终态后查看不改变任何状态字段
        let viewed = f.engine.mark_viewed(case.id, &f.doctor).await.unwrap();
        assert_eq!(viewed.global_status, CaseStatus::Completed);
        assert_eq!(viewed.revision, case.revision);

        // 再次结案同样被拒绝
        let result = f.engine.complete(case.id, &f.doctor).await;
        assert!(matches!(result, Err(HcmError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_pointer_consistency_after_assignment_chain() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        f.engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();
        f.engine
            .assign(case.id, &f.scientist, f.scientist2.id, None)
            .await
            .unwrap();
        let current = f
            .engine
            .assign(case.id, &f.scientist2, f.doctor.id, None)
            .await
            .unwrap();

        let rows = f
            .engine
            .case_assignments(case.id, &f.technician)
            .await
            .unwrap();
        assert_eq!(
            current.current_user_id,
            assignment::current_assignee(&rows)
        );
    }

    #[tokio::test]
    async fn test_mark_viewed_suppresses_noop_writes() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();
        let case = f
            .engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();

        let first = f.engine.mark_viewed(case.id, &f.scientist).await.unwrap();
        let audits_after_first = f
            .engine
            .case_audits(case.id, &f.scientist)
            .await
            .unwrap()
            .len();

        // 第二次查看没有状态变化，不写审计也不推进序号
        let second = f.engine.mark_viewed(case.id, &f.scientist).await.unwrap();
        let audits_after_second = f
            .engine
            .case_audits(case.id, &f.scientist)
            .await
            .unwrap()
            .len();

        assert_eq!(first.revision, second.revision);
        assert_eq!(audits_after_first, audits_after_second);
    }

    #[tokio::test]
    async fn test_cross_tenant_case_is_reported_not_found() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        // 其他医院的用户看不到病例存在与否
        let result = f.engine.get_case(case.id, &f.outsider).await;
        assert!(matches!(result, Err(HcmError::NotFound(_))));

        let result = f
            .engine
            .assign(case.id, &f.outsider, f.doctor.id, None)
            .await;
        assert!(matches!(result, Err(HcmError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_same_tenant_stranger_cannot_view_case() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        // 同院但从未持有过病例的用户，读取同样按未找到处理
        let result = f.engine.get_case(case.id, &f.doctor).await;
        assert!(matches!(result, Err(HcmError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cross_tenant_target_is_reported_not_found() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        let result = f
            .engine
            .assign(case.id, &f.technician, f.outsider.id, None)
            .await;
        assert!(matches!(result, Err(HcmError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_access_is_monotonic_across_reassignment() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();
        let case = f
            .engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();
        f.engine
            .assign(case.id, &f.scientist, f.doctor.id, None)
            .await
            .unwrap();

        // 已移交出去的检验师和最初的技师都仍能查看
        assert!(f.engine.get_case(case.id, &f.scientist).await.is_ok());
        assert!(f.engine.get_case(case.id, &f.technician).await.is_ok());
    }

    #[tokio::test]
    async fn test_attach_document_advances_version() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();
        let v1 = case.current_version_id;

        let case = f
            .engine
            .attach_document(case.id, &f.technician, "ab/cd/abcdef", "blood-panel.pdf")
            .await
            .unwrap();

        assert_ne!(case.current_version_id, v1);
        let versions = f
            .engine
            .case_versions(case.id, &f.technician)
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions.iter().map(|v| v.version_number).max(), Some(2));
    }

    #[tokio::test]
    async fn test_worklist_tracks_current_holder() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();

        assert_eq!(f.engine.worklist(&f.technician).await.unwrap().len(), 1);
        assert!(f.engine.worklist(&f.scientist).await.unwrap().is_empty());

        f.engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();

        assert!(f.engine.worklist(&f.technician).await.unwrap().is_empty());
        assert_eq!(f.engine.worklist(&f.scientist).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_requires_holder_or_participating_admin() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();
        f.engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();

        // 管理员无法取消自己从未持有的病例（访问前提仍然成立）
        let result = f
            .engine
            .cancel(case.id, &f.admin, Some("duplicate entry".to_string()))
            .await;
        assert!(matches!(result, Err(HcmError::Forbidden(_))));

        // 当前持有人可以取消
        let case = f
            .engine
            .cancel(case.id, &f.scientist, Some("sample damaged".to_string()))
            .await
            .unwrap();
        assert_eq!(case.global_status, CaseStatus::Cancelled);
        assert_eq!(
            case.role_status(Role::Scientist),
            Some(CaseStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_activity_events_are_emitted_after_commit() {
        let f = fixture().await;
        let case = f.engine.create_case(&f.technician, new_case()).await.unwrap();
        f.engine
            .assign(case.id, &f.technician, f.scientist.id, None)
            .await
            .unwrap();
        f.engine.mark_viewed(case.id, &f.scientist).await.unwrap();

        let events = f.sink.recorded().await;
        let types: Vec<ActivityEventType> = events.iter().map(|e| e.event_type).collect();

        assert_eq!(
            types,
            vec![
                ActivityEventType::CaseCreated,
                ActivityEventType::CaseAssigned,
                ActivityEventType::CaseViewed,
            ]
        );
        assert!(events.iter().all(|e| e.hospital_id == f.hospital_id));
    }

    /// 提交必然失败的存储包装，用于验证原子性
    struct FailingCommitStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl CaseStore for FailingCommitStore {
        async fn load_case(&self, case_id: Uuid) -> Result<Option<Case>> {
            self.inner.load_case(case_id).await
        }

        async fn resolve_user(&self, user_id: Uuid) -> Result<Option<AuthUser>> {
            self.inner.resolve_user(user_id).await
        }

        async fn assignments_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAssignment>> {
            self.inner.assignments_for_case(case_id).await
        }

        async fn versions_for_case(&self, case_id: Uuid) -> Result<Vec<CaseVersion>> {
            self.inner.versions_for_case(case_id).await
        }

        async fn audits_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAudit>> {
            self.inner.audits_for_case(case_id).await
        }

        async fn cases_for_user(&self, hospital_id: Uuid, user_id: Uuid) -> Result<Vec<Case>> {
            self.inner.cases_for_user(hospital_id, user_id).await
        }

        async fn insert_case(
            &self,
            case: Case,
            version: CaseVersion,
            audits: Vec<CaseAudit>,
        ) -> Result<Case> {
            self.inner.insert_case(case, version, audits).await
        }

        async fn commit_case(&self, _commit: CaseCommit) -> Result<Case> {
            Err(HcmError::Database("audit write failed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_partial_state() {
        let hospital_id = Uuid::new_v4();
        let technician = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Technician,
            hospital_id,
        };
        let scientist = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Scientist,
            hospital_id,
        };

        let inner = MemoryStore::new();
        inner.add_user(technician).await;
        inner.add_user(scientist).await;

        let store = Arc::new(FailingCommitStore { inner });
        let engine = CaseWorkflowEngine::new(store.clone(), ActivityLogger::new());

        let case = engine.create_case(&technician, new_case()).await.unwrap();

        let result = engine.assign(case.id, &technician, scientist.id, None).await;
        assert!(matches!(result, Err(HcmError::Database(_))));

        // 分派记录、状态字段、审计记录都没有落下任何痕迹
        let reloaded = store.load_case(case.id).await.unwrap().unwrap();
        assert_eq!(reloaded.global_status, CaseStatus::Draft);
        assert_eq!(reloaded.current_user_id, Some(technician.id));
        assert_eq!(reloaded.revision, 0);
        assert!(store
            .assignments_for_case(case.id)
            .await
            .unwrap()
            .is_empty());
        // 只有创建时的那条审计记录
        assert_eq!(store.audits_for_case(case.id).await.unwrap().len(), 1);
    }
}
