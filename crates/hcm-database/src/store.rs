//! CaseStore 的 PostgreSQL 实现
//!
//! 每次提交在单个数据库事务内完成：锁定病例行、校验、
//! 写入分派/版本/审计、以比较交换方式更新病例行。
//! 任何一步失败整个事务回滚，不留下部分状态。

use crate::connection::DatabasePool;
use crate::models::{role_status_column, DbCase, DbCaseAssignment, DbCaseAudit, DbCaseVersion, DbUser};
use async_trait::async_trait;
use hcm_core::{
    AuthUser, Case, CaseAssignment, CaseAudit, CaseVersion, HcmError, Result, Role,
};
use hcm_workflow::store::{CaseCommit, CaseStore};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

/// PostgreSQL 病例存储
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn insert_version(tx: &mut Transaction<'_, Postgres>, version: &CaseVersion) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO case_versions (id, case_id, version_number, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
        "#)
        .bind(version.id)
        .bind(version.case_id)
        .bind(version.version_number)
        .bind(version.created_by)
        .bind(version.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(())
    }

    async fn insert_assignment(
        tx: &mut Transaction<'_, Postgres>,
        assignment: &CaseAssignment,
    ) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO case_assignments
                (id, case_id, case_version_id, assigned_by_user_id, assigned_to_user_id, notes, assigned_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(assignment.id)
        .bind(assignment.case_id)
        .bind(assignment.case_version_id)
        .bind(assignment.assigned_by_user_id)
        .bind(assignment.assigned_to_user_id)
        .bind(&assignment.notes)
        .bind(assignment.assigned_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(())
    }

    async fn insert_audits(tx: &mut Transaction<'_, Postgres>, audits: &[CaseAudit]) -> Result<()> {
        for audit in audits {
            sqlx::query(r#"
                INSERT INTO case_audits
                    (id, case_id, case_version_id, field_name, old_value, new_value, changed_by_user_id, changed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#)
            .bind(audit.id)
            .bind(audit.case_id)
            .bind(audit.case_version_id)
            .bind(&audit.field_name)
            .bind(&audit.old_value)
            .bind(&audit.new_value)
            .bind(audit.changed_by_user_id)
            .bind(audit.changed_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| HcmError::Database(e.to_string()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl CaseStore for PgStore {
    async fn load_case(&self, case_id: Uuid) -> Result<Option<Case>> {
        let result = sqlx::query_as::<_, DbCase>("SELECT * FROM cases WHERE id = $1")
            .bind(case_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(result.map(Case::from))
    }

    async fn resolve_user(&self, user_id: Uuid) -> Result<Option<AuthUser>> {
        let result = sqlx::query_as::<_, DbUser>(
            "SELECT id, role, hospital_id FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(result.and_then(DbUser::into_auth_user))
    }

    async fn assignments_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAssignment>> {
        let results = sqlx::query_as::<_, DbCaseAssignment>(
            "SELECT * FROM case_assignments WHERE case_id = $1 ORDER BY assigned_at",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(CaseAssignment::from).collect())
    }

    async fn versions_for_case(&self, case_id: Uuid) -> Result<Vec<CaseVersion>> {
        let results = sqlx::query_as::<_, DbCaseVersion>(
            "SELECT * FROM case_versions WHERE case_id = $1 ORDER BY version_number",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(CaseVersion::from).collect())
    }

    async fn audits_for_case(&self, case_id: Uuid) -> Result<Vec<CaseAudit>> {
        let results = sqlx::query_as::<_, DbCaseAudit>(
            "SELECT * FROM case_audits WHERE case_id = $1 ORDER BY changed_at",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(CaseAudit::from).collect())
    }

    async fn cases_for_user(&self, hospital_id: Uuid, user_id: Uuid) -> Result<Vec<Case>> {
        let results = sqlx::query_as::<_, DbCase>(
            "SELECT * FROM cases WHERE hospital_id = $1 AND current_user_id = $2 ORDER BY updated_at DESC",
        )
        .bind(hospital_id)
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Case::from).collect())
    }

    async fn insert_case(
        &self,
        case: Case,
        version: CaseVersion,
        audits: Vec<CaseAudit>,
    ) -> Result<Case> {
        if version.case_id != case.id {
            return Err(HcmError::Validation(format!(
                "版本 {} 不属于病例 {}",
                version.id, case.id
            )));
        }

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| HcmError::Database(e.to_string()))?;

        sqlx::query(r#"
            INSERT INTO cases
                (id, case_number, hospital_id, patient_id, department_id, priority,
                 global_status, technician_status, scientist_status, doctor_status,
                 current_user_id, current_version_id, revision, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#)
        .bind(case.id)
        .bind(&case.case_number)
        .bind(case.hospital_id)
        .bind(case.patient_id)
        .bind(case.department_id)
        .bind(case.priority.as_str())
        .bind(case.global_status.as_str())
        .bind(role_status_column(&case, Role::Technician))
        .bind(role_status_column(&case, Role::Scientist))
        .bind(role_status_column(&case, Role::Doctor))
        .bind(case.current_user_id)
        .bind(case.current_version_id)
        .bind(case.revision)
        .bind(case.created_by)
        .bind(case.created_at)
        .bind(case.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Self::insert_version(&mut tx, &version).await?;
        Self::insert_audits(&mut tx, &audits).await?;

        tx.commit()
            .await
            .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(case)
    }

    async fn commit_case(&self, commit: CaseCommit) -> Result<Case> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| HcmError::Database(e.to_string()))?;

        // 行级锁定，事务期间阻止并发分派读到同一旧状态
        let locked = sqlx::query("SELECT revision FROM cases WHERE id = $1 FOR UPDATE")
            .bind(commit.case.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| HcmError::Database(e.to_string()))?;

        let current_revision: i64 = match locked {
            Some(row) => row.get("revision"),
            None => {
                return Err(HcmError::NotFound(format!(
                    "病例 {} 不存在",
                    commit.case.id
                )))
            }
        };

        if current_revision != commit.expected_revision {
            return Err(HcmError::Conflict(format!(
                "病例 {} 已被并发修改 (期望序号 {}, 实际 {})",
                commit.case.id, commit.expected_revision, current_revision
            )));
        }

        if let Some(version) = &commit.new_version {
            if version.case_id != commit.case.id {
                return Err(HcmError::Validation(format!(
                    "版本 {} 不属于病例 {}",
                    version.id, commit.case.id
                )));
            }
            Self::insert_version(&mut tx, version).await?;
        }

        if let Some(assignment) = &commit.assignment {
            let target_exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
                .bind(assignment.assigned_to_user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| HcmError::Database(e.to_string()))?
                .is_some();
            if !target_exists {
                return Err(HcmError::NotFound(format!(
                    "目标用户 {} 不存在",
                    assignment.assigned_to_user_id
                )));
            }

            let version_belongs =
                sqlx::query("SELECT 1 FROM case_versions WHERE id = $1 AND case_id = $2")
                    .bind(assignment.case_version_id)
                    .bind(assignment.case_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| HcmError::Database(e.to_string()))?
                    .is_some();
            if !version_belongs {
                return Err(HcmError::Validation(format!(
                    "版本 {} 不属于病例 {}",
                    assignment.case_version_id, assignment.case_id
                )));
            }

            Self::insert_assignment(&mut tx, assignment).await?;
        }

        Self::insert_audits(&mut tx, &commit.audits).await?;

        // 比较交换更新：即使持有行锁，也保留序号条件作为第二道防线
        let updated = sqlx::query(r#"
            UPDATE cases SET
                global_status = $1,
                technician_status = $2,
                scientist_status = $3,
                doctor_status = $4,
                current_user_id = $5,
                current_version_id = $6,
                revision = $7,
                updated_at = $8
            WHERE id = $9 AND revision = $10
        "#)
        .bind(commit.case.global_status.as_str())
        .bind(role_status_column(&commit.case, Role::Technician))
        .bind(role_status_column(&commit.case, Role::Scientist))
        .bind(role_status_column(&commit.case, Role::Doctor))
        .bind(commit.case.current_user_id)
        .bind(commit.case.current_version_id)
        .bind(commit.case.revision)
        .bind(commit.case.updated_at)
        .bind(commit.case.id)
        .bind(commit.expected_revision)
        .execute(&mut *tx)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(HcmError::Conflict(format!(
                "病例 {} 已被并发修改",
                commit.case.id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(commit.case)
    }
}
