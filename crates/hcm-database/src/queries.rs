//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use hcm_core::{Case, CaseAssignment, CaseAudit, CaseVersion, HcmError, Result};
use uuid::Uuid;

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建用户表（身份协作方的本地投影）
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                role VARCHAR(16) NOT NULL,
                hospital_id UUID NOT NULL,
                name VARCHAR(255)
            )
        "#).execute(pool).await.map_err(|e| HcmError::Database(e.to_string()))?;

        // 创建病例表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS cases (
                id UUID PRIMARY KEY,
                case_number VARCHAR(64) UNIQUE NOT NULL,
                hospital_id UUID NOT NULL,
                patient_id UUID NOT NULL,
                department_id UUID NOT NULL,
                priority VARCHAR(16) NOT NULL DEFAULT 'MEDIUM',
                global_status VARCHAR(20) NOT NULL DEFAULT 'DRAFT',
                technician_status VARCHAR(20),
                scientist_status VARCHAR(20),
                doctor_status VARCHAR(20),
                current_user_id UUID,
                current_version_id UUID,
                revision BIGINT NOT NULL DEFAULT 0,
                created_by UUID NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| HcmError::Database(e.to_string()))?;

        // 创建版本表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS case_versions (
                id UUID PRIMARY KEY,
                case_id UUID NOT NULL REFERENCES cases(id),
                version_number INTEGER NOT NULL,
                created_by UUID NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                UNIQUE (case_id, version_number)
            )
        "#).execute(pool).await.map_err(|e| HcmError::Database(e.to_string()))?;

        // 创建分派表（仅追加）
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS case_assignments (
                id UUID PRIMARY KEY,
                case_id UUID NOT NULL REFERENCES cases(id),
                case_version_id UUID NOT NULL REFERENCES case_versions(id),
                assigned_by_user_id UUID NOT NULL,
                assigned_to_user_id UUID NOT NULL,
                notes TEXT,
                assigned_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| HcmError::Database(e.to_string()))?;

        // 创建审计表（仅追加）
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS case_audits (
                id UUID PRIMARY KEY,
                case_id UUID NOT NULL REFERENCES cases(id),
                case_version_id UUID NOT NULL REFERENCES case_versions(id),
                field_name VARCHAR(64) NOT NULL,
                old_value TEXT,
                new_value TEXT,
                changed_by_user_id UUID NOT NULL,
                changed_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| HcmError::Database(e.to_string()))?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_cases_hospital_id ON cases(hospital_id)",
            "CREATE INDEX IF NOT EXISTS idx_cases_case_number ON cases(case_number)",
            "CREATE INDEX IF NOT EXISTS idx_cases_current_user_id ON cases(current_user_id)",
            "CREATE INDEX IF NOT EXISTS idx_cases_global_status ON cases(global_status)",
            "CREATE INDEX IF NOT EXISTS idx_case_versions_case_id ON case_versions(case_id)",
            "CREATE INDEX IF NOT EXISTS idx_case_assignments_case_id ON case_assignments(case_id)",
            "CREATE INDEX IF NOT EXISTS idx_case_assignments_assigned_to ON case_assignments(assigned_to_user_id)",
            "CREATE INDEX IF NOT EXISTS idx_case_audits_case_id ON case_audits(case_id)",
            "CREATE INDEX IF NOT EXISTS idx_users_hospital_id ON users(hospital_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| HcmError::Database(e.to_string()))?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 病例相关操作 ==========

    /// 根据ID查找病例
    pub async fn get_case_by_id(&self, id: &Uuid) -> Result<Option<Case>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbCase>(
            "SELECT * FROM cases WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(result.map(Case::from))
    }

    /// 根据病例号查找病例
    pub async fn get_case_by_number(&self, case_number: &str) -> Result<Option<Case>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbCase>(
            "SELECT * FROM cases WHERE case_number = $1"
        )
        .bind(case_number)
        .fetch_optional(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(result.map(Case::from))
    }

    /// 当前分派给指定用户的所有病例
    pub async fn get_cases_by_current_user(
        &self,
        hospital_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Vec<Case>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbCase>(
            "SELECT * FROM cases WHERE hospital_id = $1 AND current_user_id = $2 ORDER BY updated_at DESC"
        )
        .bind(hospital_id)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Case::from).collect())
    }

    /// 医院内指定全局状态的病例
    pub async fn get_cases_by_status(
        &self,
        hospital_id: &Uuid,
        global_status: &str,
        limit: i64,
    ) -> Result<Vec<Case>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbCase>(
            "SELECT * FROM cases WHERE hospital_id = $1 AND global_status = $2 ORDER BY updated_at DESC LIMIT $3"
        )
        .bind(hospital_id)
        .bind(global_status)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Case::from).collect())
    }

    // ========== 版本相关操作 ==========

    /// 病例的全部版本
    pub async fn get_versions_by_case_id(&self, case_id: &Uuid) -> Result<Vec<CaseVersion>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbCaseVersion>(
            "SELECT * FROM case_versions WHERE case_id = $1 ORDER BY version_number"
        )
        .bind(case_id)
        .fetch_all(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(CaseVersion::from).collect())
    }

    // ========== 分派相关操作 ==========

    /// 病例的全部分派记录
    pub async fn get_assignments_by_case_id(&self, case_id: &Uuid) -> Result<Vec<CaseAssignment>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbCaseAssignment>(
            "SELECT * FROM case_assignments WHERE case_id = $1 ORDER BY assigned_at"
        )
        .bind(case_id)
        .fetch_all(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(CaseAssignment::from).collect())
    }

    // ========== 审计相关操作 ==========

    /// 病例的全部审计记录
    pub async fn get_audits_by_case_id(&self, case_id: &Uuid) -> Result<Vec<CaseAudit>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbCaseAudit>(
            "SELECT * FROM case_audits WHERE case_id = $1 ORDER BY changed_at"
        )
        .bind(case_id)
        .fetch_all(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))?;

        Ok(results.into_iter().map(CaseAudit::from).collect())
    }

    // ========== 用户相关操作 ==========

    /// 根据ID解析用户身份
    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<DbUser>> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbUser>(
            "SELECT id, role, hospital_id FROM users WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| HcmError::Database(e.to_string()))
    }
}
