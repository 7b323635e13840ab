use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;

/// Creates the configured first teacher account when it does not exist yet,
/// so a fresh deployment has someone able to author exams.
pub(crate) async fn ensure_first_teacher(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_teacher_password.is_empty() {
        tracing::warn!("FIRST_TEACHER_PASSWORD not set; skipping first teacher bootstrap");
        return Ok(());
    }

    let existing =
        repositories::users::find_by_email(state.db(), &admin.first_teacher_email).await?;
    if existing.is_some() {
        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_teacher_password)
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    let now = primitive_now_utc();

    repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            email: &admin.first_teacher_email,
            hashed_password,
            full_name: "StudyGate Teacher",
            role: UserRole::Teacher,
            grade_level: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await?;

    tracing::info!(email = %admin.first_teacher_email, "Created first teacher account");
    Ok(())
}
