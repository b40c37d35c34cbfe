// ABOUTME: Passthrough task that aggregates its input contributions
// ABOUTME: Outputs every contribution it received, in arrival order, as one array

use async_trait::async_trait;
use serde_json::Value;

use crate::task::{Result, TaskBehavior, TaskContext};

pub struct PassthroughTask;

#[async_trait]
impl TaskBehavior for PassthroughTask {
    fn kind(&self) -> &str {
        "passthrough"
    }

    async fn on_work(&self, ctx: &TaskContext<'_>) -> Result<Option<Value>> {
        Ok(Some(Value::Array(ctx.input_data.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowDetails;
    use crate::task::{Task, TaskStatus};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_outputs_inputs_in_order() {
        let details = Arc::new(FlowDetails::new("flow1").unwrap());
        let mut task = Task::new("merge", details, Arc::new(PassthroughTask)).unwrap();
        task.append_input_data(json!("a")).unwrap();
        task.append_input_data(json!({ "b": 2 })).unwrap();

        task.execute().await.unwrap();

        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.output(), Some(&json!(["a", { "b": 2 }])));
    }
}
