//! 病例工作流引擎演示程序
//!
//! 展示病例从创建到结案的完整生命周期：技师建档、逐级移交、
//! 首次查看推进状态、历史持有人保留访问资格、分派与审计轨迹

use hcm_activity::{ActivityLogger, MemoryActivitySink};
use hcm_core::{AuthUser, NewCase, Priority, Role};
use hcm_workflow::{CaseWorkflowEngine, MemoryStore};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🏥 HCM 病例工作流演示\n");

    // 1. 准备医院与用户
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
    let doctor = AuthUser {
        id: Uuid::new_v4(),
        role: Role::Doctor,
        hospital_id,
    };

    let store = Arc::new(MemoryStore::new());
    for user in [technician, scientist, doctor] {
        store.add_user(user).await;
    }

    let activity = ActivityLogger::new();
    let sink = Arc::new(MemoryActivitySink::new());
    activity.register(sink.clone()).await;

    let engine = CaseWorkflowEngine::new(store, activity);
    println!("✅ 工作流引擎初始化完成");

    // 2. 技师创建病例
    let case = engine
        .create_case(
            &technician,
            NewCase {
                patient_id: Uuid::new_v4(),
                department_id: Uuid::new_v4(),
                priority: Priority::High,
            },
        )
        .await?;
    println!(
        "📋 病例 {} 创建完成 (全局状态: {:?})",
        case.case_number, case.global_status
    );

    // 3. 技师移交给检验师
    let case = engine
        .assign(case.id, &technician, scientist.id, Some("请复核血样".to_string()))
        .await?;
    println!(
        "➡️  移交给检验师 (全局状态: {:?}, 检验师状态: {:?})",
        case.global_status,
        case.role_status(Role::Scientist)
    );

    // 4. 检验师打开病例，状态推进
    let case = engine.mark_viewed(case.id, &scientist).await?;
    println!(
        "👀 检验师打开病例 (全局状态: {:?}, 检验师状态: {:?})",
        case.global_status,
        case.role_status(Role::Scientist)
    );

    // 5. 检验师移交给医生
    let case = engine.assign(case.id, &scientist, doctor.id, None).await?;
    println!(
        "➡️  移交给医生 (检验师状态: {:?}, 医生状态: {:?})",
        case.role_status(Role::Scientist),
        case.role_status(Role::Doctor)
    );

    // 6. 历史持有人依然可以查看
    let visible = engine.get_case(case.id, &technician).await.is_ok();
    println!("🔓 技师在移交后仍可查看病例: {}", visible);

    // 7. 医生结案
    let case = engine.complete(case.id, &doctor).await?;
    println!("🏁 医生结案 (全局状态: {:?})", case.global_status);

    // 8. 分派历史与审计轨迹
    let assignments = engine.case_assignments(case.id, &doctor).await?;
    println!("\n📜 分派历史 ({} 条):", assignments.len());
    for row in &assignments {
        println!(
            "   - {} -> {} ({})",
            row.assigned_by_user_id,
            row.assigned_to_user_id,
            row.notes.as_deref().unwrap_or("无备注")
        );
    }

    let audits = engine.case_audits(case.id, &doctor).await?;
    println!("\n🔍 审计轨迹 ({} 条):", audits.len());
    for audit in &audits {
        println!(
            "   - {}: {:?} -> {:?}",
            audit.field_name, audit.old_value, audit.new_value
        );
    }

    let events = sink.recorded().await;
    println!("\n📣 活动事件 ({} 条):", events.len());
    for event in &events {
        println!("   - {}", event.event_type.as_str());
    }

    println!("\n✨ 演示完成");
    Ok(())
}
