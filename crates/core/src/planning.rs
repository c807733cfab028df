//! Task lifecycle transitions over a run's plan.
//!
//! A task only moves `pending -> running -> {completed | failed}`. A retry
//! keeps it in `running` and bumps the attempt counter.

use crate::types::{ResultCode, Run, Task, TaskStatus};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("Task not found: {0}")]
    NotFound(String),
    #[error("Invalid transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("Task {active} is already running; cannot start {requested}")]
    AnotherTaskRunning { active: String, requested: String },
}

impl Run {
    pub fn has_failed_task(&self) -> bool {
        self.plan.iter().any(|t| t.status == TaskStatus::Failed)
    }

    pub fn running_task(&self) -> Option<&Task> {
        self.plan.iter().find(|t| t.status == TaskStatus::Running)
    }

    /// Next task to work on. An already-running task wins over a pending one
    /// so a retry is never skipped in favour of a different task.
    pub fn next_task_id(&self) -> Option<String> {
        self.running_task()
            .or_else(|| self.plan.iter().find(|t| t.status == TaskStatus::Pending))
            .map(|t| t.id.clone())
    }

    pub fn start_task(&mut self, task_id: &str) -> Result<(), PlanError> {
        if let Some(active) = self.running_task() {
            if active.id != task_id {
                return Err(PlanError::AnotherTaskRunning {
                    active: active.id.clone(),
                    requested: task_id.to_string(),
                });
            }
        }
        let task = self.task_mut_or_err(task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(invalid(task, TaskStatus::Running));
        }
        task.status = TaskStatus::Running;
        task.attempts = 1;
        Ok(())
    }

    pub fn retry_task(&mut self, task_id: &str, error: String) -> Result<u32, PlanError> {
        let task = self.task_mut_or_err(task_id)?;
        if task.status != TaskStatus::Running {
            return Err(invalid(task, TaskStatus::Running));
        }
        task.attempts += 1;
        task.last_error = Some(error);
        Ok(task.attempts)
    }

    pub fn complete_task(
        &mut self,
        task_id: &str,
        code: ResultCode,
        message: Option<String>,
        data: Option<serde_json::Value>,
    ) -> Result<(), PlanError> {
        let task = self.task_mut_or_err(task_id)?;
        if task.status != TaskStatus::Running {
            return Err(invalid(task, TaskStatus::Completed));
        }
        task.status = TaskStatus::Completed;
        task.result_code = Some(code);
        task.result_message = message;
        task.result_data = data;
        Ok(())
    }

    pub fn fail_task(
        &mut self,
        task_id: &str,
        error: String,
        code: ResultCode,
        data: Option<serde_json::Value>,
    ) -> Result<(), PlanError> {
        let task = self.task_mut_or_err(task_id)?;
        if task.status != TaskStatus::Running {
            return Err(invalid(task, TaskStatus::Failed));
        }
        task.status = TaskStatus::Failed;
        task.result_code = Some(code);
        task.result_message = Some(error.clone());
        task.last_error = Some(error);
        task.result_data = data;
        Ok(())
    }

    pub fn progress(&self) -> f32 {
        if self.plan.is_empty() {
            return 0.0;
        }
        let done = self
            .plan
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed))
            .count();
        done as f32 / self.plan.len() as f32
    }

    /// Human-readable trace of what each task did, fed to answer synthesis.
    pub fn execution_trace(&self) -> String {
        let mut lines = Vec::with_capacity(self.plan.len());
        for (idx, task) in self.plan.iter().enumerate() {
            let code = task.result_code.map(|c| c.as_str()).unwrap_or("-");
            let mut line = format!(
                "{}. [{}] {} ({:?}, result: {})",
                idx + 1,
                task.kind,
                task.title,
                task.status,
                code
            );
            if let Some(message) = &task.result_message {
                line.push_str("\n   ");
                line.push_str(message);
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    fn task_mut_or_err(&mut self, task_id: &str) -> Result<&mut Task, PlanError> {
        self.task_mut(task_id)
            .ok_or_else(|| PlanError::NotFound(task_id.to_string()))
    }
}

fn invalid(task: &Task, to: TaskStatus) -> PlanError {
    PlanError::InvalidTransition {
        task_id: task.id.clone(),
        from: task.status,
        to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_two_tasks() -> (Run, String, String) {
        let mut run = Run::new("run-1", "session-1", "do things");
        let a = Task::new("first", "retrieval", "look up");
        let b = Task::new("second", "command_execution", "ls");
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        run.plan = vec![a, b];
        (run, a_id, b_id)
    }

    #[test]
    fn test_next_task_prefers_running() {
        let (mut run, a, b) = run_with_two_tasks();
        assert_eq!(run.next_task_id(), Some(a.clone()));
        run.start_task(&a).unwrap();
        assert_eq!(run.next_task_id(), Some(a.clone()));
        run.complete_task(&a, ResultCode::Ok, None, None).unwrap();
        assert_eq!(run.next_task_id(), Some(b));
    }

    #[test]
    fn test_only_one_running_task() {
        let (mut run, a, b) = run_with_two_tasks();
        run.start_task(&a).unwrap();
        let err = run.start_task(&b).unwrap_err();
        assert!(matches!(err, PlanError::AnotherTaskRunning { .. }));
    }

    #[test]
    fn test_retry_stays_running_and_increments() {
        let (mut run, a, _) = run_with_two_tasks();
        run.start_task(&a).unwrap();
        assert_eq!(run.retry_task(&a, "not yet".into()).unwrap(), 2);
        let task = run.task(&a).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.last_error.as_deref(), Some("not yet"));
    }

    #[test]
    fn test_terminal_tasks_never_revisit() {
        let (mut run, a, _) = run_with_two_tasks();
        run.start_task(&a).unwrap();
        run.fail_task(&a, "boom".into(), ResultCode::Failed, None).unwrap();
        assert!(run.has_failed_task());
        assert!(run.start_task(&a).is_err());
        assert!(run.retry_task(&a, "again".into()).is_err());
        assert!(run.complete_task(&a, ResultCode::Ok, None, None).is_err());
    }

    #[test]
    fn test_progress_and_trace() {
        let (mut run, a, _) = run_with_two_tasks();
        assert_eq!(run.progress(), 0.0);
        run.start_task(&a).unwrap();
        run.complete_task(&a, ResultCode::Ok, Some("found 3 chunks".into()), None)
            .unwrap();
        assert_eq!(run.progress(), 0.5);
        let trace = run.execution_trace();
        assert!(trace.contains("found 3 chunks"));
        assert!(trace.contains("result: ok"));
    }
}
