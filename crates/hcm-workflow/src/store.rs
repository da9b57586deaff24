//! 病例存储抽象
//!
//! 引擎与持久化之间的接口。每个提交方法要么全部写入要么全部不写，
//! 读操作必须反映所有已提交的写入（无最终一致性）。
//! 内存实现用于测试与演示，Postgres实现位于 hcm-database。

use async_trait::async_trait;
use hcm_core::{
    AuthUser, Case, CaseAssignment, CaseAudit, CaseVersion, HcmError, Result,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 一次原子提交的全部写入内容
///
/// case 为已应用字段更新的新值；expected_revision 为提交前读到的
/// 并发序号，存储实现必须以比较交换方式校验，不匹配报 Conflict。
#[derive(Debug, Clone)]
pub struct CaseCommit {
    pub case: Case,
    pub expected_revision: i64,
    pub assignment: Option<CaseAssignment>,
    pub new_version: Option<CaseVersion>,
    pub audits: Vec<CaseAudit>,
}

/// 病例存储接口
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn load_case(&self, case_id: Uuid) -> Result<Option<Case>>;

    /// 身份协作方：解析用户身份三元组
    async fn resolve_user(&self, user_id: Uuid) -> Result<Option<AuthUser>>;

    async fn assignments_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAssignment>>;

    async fn versions_for_case(&self, case_id: Uuid) -> Result<Vec<CaseVersion>>;

    async fn audits_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAudit>>;

    /// 当前分派给该用户的病例（工作列表）
    async fn cases_for_user(&self, hospital_id: Uuid, user_id: Uuid) -> Result<Vec<Case>>;

    /// 创建新病例及其初始版本
    async fn insert_case(
        &self,
        case: Case,
        version: CaseVersion,
        audits: Vec<CaseAudit>,
    ) -> Result<Case>;

    /// 原子提交一次病例变更
    async fn commit_case(&self, commit: CaseCommit) -> Result<Case>;
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, AuthUser>,
    cases: HashMap<Uuid, Case>,
    versions: HashMap<Uuid, Vec<CaseVersion>>,
    assignments: HashMap<Uuid, Vec<CaseAssignment>>,
    audits: HashMap<Uuid, Vec<CaseAudit>>,
}

/// 内存病例存储
///
/// 单写锁临界区内先校验后写入，保证提交的原子性语义
/// 与数据库事务一致。
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册用户（身份协作方的测试替身）
    pub async fn add_user(&self, user: AuthUser) {
        self.state.write().await.users.insert(user.id, user);
    }

    fn validate_commit(state: &MemoryState, commit: &CaseCommit) -> Result<()> {
        let existing = state
            .cases
            .get(&commit.case.id)
            .ok_or_else(|| HcmError::NotFound(format!("病例 {} 不存在", commit.case.id)))?;

        if existing.revision != commit.expected_revision {
            return Err(HcmError::Conflict(format!(
                "病例 {} 已被并发修改 (期望序号 {}, 实际 {})",
                commit.case.id, commit.expected_revision, existing.revision
            )));
        }

        if let Some(assignment) = &commit.assignment {
            if !state.users.contains_key(&assignment.assigned_to_user_id) {
                return Err(HcmError::NotFound(format!(
                    "目标用户 {} 不存在",
                    assignment.assigned_to_user_id
                )));
            }

            let version_belongs = state
                .versions
                .get(&assignment.case_id)
                .map(|versions| {
                    versions.iter().any(|v| v.id == assignment.case_version_id)
                })
                .unwrap_or(false);
            let is_new_version = commit
                .new_version
                .as_ref()
                .map(|v| v.id == assignment.case_version_id)
                .unwrap_or(false);

            if !version_belongs && !is_new_version {
                return Err(HcmError::Validation(format!(
                    "版本 {} 不属于病例 {}",
                    assignment.case_version_id, assignment.case_id
                )));
            }
        }

        if let Some(version) = &commit.new_version {
            if version.case_id != commit.case.id {
                return Err(HcmError::Validation(format!(
                    "版本 {} 不属于病例 {}",
                    version.id, commit.case.id
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn load_case(&self, case_id: Uuid) -> Result<Option<Case>> {
        Ok(self.state.read().await.cases.get(&case_id).cloned())
    }

    async fn resolve_user(&self, user_id: Uuid) -> Result<Option<AuthUser>> {
        Ok(self.state.read().await.users.get(&user_id).copied())
    }

    async fn assignments_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .get(&case_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn versions_for_case(&self, case_id: Uuid) -> Result<Vec<CaseVersion>> {
        Ok(self
            .state
            .read()
            .await
            .versions
            .get(&case_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn audits_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAudit>> {
        Ok(self
            .state
            .read()
            .await
            .audits
            .get(&case_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cases_for_user(&self, hospital_id: Uuid, user_id: Uuid) -> Result<Vec<Case>> {
        Ok(self
            .state
            .read()
            .await
            .cases
            .values()
            .filter(|case| {
                case.hospital_id == hospital_id && case.current_user_id == Some(user_id)
            })
            .cloned()
            .collect())
    }

    async fn insert_case(
        &self,
        case: Case,
        version: CaseVersion,
        audits: Vec<CaseAudit>,
    ) -> Result<Case> {
        let mut state = self.state.write().await;

        if state.cases.contains_key(&case.id) {
            return Err(HcmError::Validation(format!("病例 {} 已存在", case.id)));
        }
        if version.case_id != case.id {
            return Err(HcmError::Validation(format!(
                "版本 {} 不属于病例 {}",
                version.id, case.id
            )));
        }

        state.versions.insert(case.id, vec![version]);
        state.audits.insert(case.id, audits);
        state.cases.insert(case.id, case.clone());

        Ok(case)
    }

    async fn commit_case(&self, commit: CaseCommit) -> Result<Case> {
        let mut state = self.state.write().await;

        // 先校验后写入，任何一步失败都不留下部分状态
        Self::validate_commit(&state, &commit)?;

        if let Some(version) = commit.new_version {
            state
                .versions
                .entry(version.case_id)
                .or_default()
                .push(version);
        }
        if let Some(assignment) = commit.assignment {
            state
                .assignments
                .entry(assignment.case_id)
                .or_default()
                .push(assignment);
        }
        state
            .audits
            .entry(commit.case.id)
            .or_default()
            .extend(commit.audits);
        state.cases.insert(commit.case.id, commit.case.clone());

        Ok(commit.case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hcm_core::{CaseStatus, Priority, Role};

    fn seed_case(store_user: Uuid) -> (Case, CaseVersion) {
        let case_id = Uuid::new_v4();
        let version = CaseVersion {
            id: Uuid::new_v4(),
            case_id,
            version_number: 1,
            created_by: store_user,
            created_at: Utc::now(),
        };
        let case = Case {
            id: case_id,
            case_number: "HCM-20260101-0123456789ab".to_string(),
            hospital_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            priority: Priority::Medium,
            global_status: CaseStatus::Draft,
            status_by_role: HashMap::from([(Role::Technician, CaseStatus::Draft)]),
            current_user_id: Some(store_user),
            current_version_id: Some(version.id),
            revision: 0,
            created_by: store_user,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        (case, version)
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let (case, version) = seed_case(user);
        store
            .insert_case(case.clone(), version, Vec::new())
            .await
            .unwrap();

        let mut updated = case.clone();
        updated.revision = 1;

        // 第一次提交成功
        store
            .commit_case(CaseCommit {
                case: updated.clone(),
                expected_revision: 0,
                assignment: None,
                new_version: None,
                audits: Vec::new(),
            })
            .await
            .unwrap();

        // 使用过期序号的提交被拒绝
        let result = store
            .commit_case(CaseCommit {
                case: updated,
                expected_revision: 0,
                assignment: None,
                new_version: None,
                audits: Vec::new(),
            })
            .await;

        assert!(matches!(result, Err(HcmError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_assignment_version_must_belong_to_case() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .add_user(AuthUser {
                id: user,
                role: Role::Scientist,
                hospital_id: Uuid::new_v4(),
            })
            .await;

        let (case, version) = seed_case(user);
        store
            .insert_case(case.clone(), version, Vec::new())
            .await
            .unwrap();

        let mut updated = case.clone();
        updated.revision = 1;

        let result = store
            .commit_case(CaseCommit {
                case: updated,
                expected_revision: 0,
                assignment: Some(CaseAssignment {
                    id: Uuid::new_v4(),
                    case_id: case.id,
                    case_version_id: Uuid::new_v4(), // 不属于该病例的版本
                    assigned_by_user_id: user,
                    assigned_to_user_id: user,
                    notes: None,
                    assigned_at: Utc::now(),
                }),
                new_version: None,
                audits: Vec::new(),
            })
            .await;

        assert!(matches!(result, Err(HcmError::Validation(_))));
        // 失败的提交不留下任何分派记录
        assert!(store.assignments_for_case(case.id).await.unwrap().is_empty());
    }
}
