//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 生成医院内部病例号
///
/// 格式: HCM-YYYYMMDD-简化UUID前12位
pub fn generate_case_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("HCM-{}-{}", date, &suffix[..12])
}

/// 验证病例号格式
pub fn is_valid_case_number(case_number: &str) -> bool {
    let parts: Vec<&str> = case_number.split('-').collect();
    parts.len() == 3
        && parts[0] == "HCM"
        && parts[1].len() == 8
        && parts[1].chars().all(|c| c.is_ascii_digit())
        && parts[2].len() == 12
        && parts[2].chars().all(|c| c.is_ascii_hexdigit())
}
