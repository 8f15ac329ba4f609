//! 访问控制
//!
//! 每个请求一次同步检查：会话中的角色必须等于目标操作要求的角色。

use telerad_core::{Exam, RequestContext, Result, TeleradError, UserRole};
use tracing::warn;

/// 角色守卫
pub fn authorize(required: UserRole, session: Option<&RequestContext>) -> Result<&RequestContext> {
    match session {
        Some(ctx) if ctx.role == required => Ok(ctx),
        Some(ctx) => {
            warn!(
                "User {} with role {} denied access to {} operation",
                ctx.user_id, ctx.role, required
            );
            Err(TeleradError::AccessDenied("access denied".to_string()))
        }
        None => Err(TeleradError::AccessDenied("access denied".to_string())),
    }
}

/// 只有被指定的医生可以阅片和写报告
pub fn ensure_assigned(exam: &Exam, ctx: &RequestContext) -> Result<()> {
    if exam.is_assigned_to(ctx.user_id) {
        Ok(())
    } else {
        warn!("Physician {} is not assigned to exam {}", ctx.user_id, exam.id);
        Err(TeleradError::AccessDenied(format!("exam #{} is not assigned to you", exam.id)))
    }
}
