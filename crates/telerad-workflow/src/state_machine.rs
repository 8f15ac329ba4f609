//! 检查状态机
//!
//! 管理影像检查的生命周期状态转换

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use telerad_core::{Exam, ExamStatus, Result, TeleradError};

/// 检查状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExamEvent {
    PhysicianAssigned,
    ReportSubmitted,
    Printed,
}

impl fmt::Display for ExamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 检查状态机
#[derive(Debug)]
pub struct ExamStateMachine {
    transitions: HashMap<(ExamStatus, ExamEvent), ExamStatus>,
}

impl ExamStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((ExamStatus::Uploaded, ExamEvent::PhysicianAssigned), ExamStatus::Assigned);
        transitions.insert((ExamStatus::Assigned, ExamEvent::PhysicianAssigned), ExamStatus::Assigned);
        transitions.insert((ExamStatus::Assigned, ExamEvent::ReportSubmitted), ExamStatus::Completed);
        // 重新提交报告：生成新文件，状态不变，打印记录清除
        transitions.insert((ExamStatus::Completed, ExamEvent::ReportSubmitted), ExamStatus::Completed);
        transitions.insert((ExamStatus::Completed, ExamEvent::Printed), ExamStatus::Completed);

        Self { transitions }
    }

    /// 新建检查的初始状态：有医生即为已指定
    pub fn initial_status(has_physician: bool) -> ExamStatus {
        if has_physician {
            ExamStatus::Assigned
        } else {
            ExamStatus::Uploaded
        }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: ExamStatus, event: ExamEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: ExamStatus, event: ExamEvent) -> Result<ExamStatus> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| TeleradError::InvalidStateTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
    }

    /// 打印前检查：状态必须为已完成，且打印时间只能写一次
    pub fn ensure_printable(&self, exam: &Exam) -> Result<()> {
        self.transition(exam.status, ExamEvent::Printed)?;
        if exam.is_printed() {
            return Err(TeleradError::InvalidStateTransition {
                from: format!("{} (already printed)", exam.status),
                event: ExamEvent::Printed.to_string(),
            });
        }
        Ok(())
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: ExamStatus) -> Vec<ExamEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for ExamStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
