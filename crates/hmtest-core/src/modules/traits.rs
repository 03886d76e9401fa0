use super::runner::{ToolInvocation, ToolLog};
use crate::domain::ToolOutcome;

/// Runs one external command to completion.
pub trait ToolExecutor {
    fn execute(&self, invocation: &ToolInvocation, log: &mut ToolLog) -> ToolOutcome;
}

impl<T> ToolExecutor for &T
where
    T: ToolExecutor + ?Sized,
{
    fn execute(&self, invocation: &ToolInvocation, log: &mut ToolLog) -> ToolOutcome {
        (**self).execute(invocation, log)
    }
}
