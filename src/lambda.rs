use std::time::{Duration, Instant};

use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use tokio::runtime::Handle;

use crate::domain::Notification;
use crate::error::RegistryError;

pub trait ContinuationDispatcher: Send + Sync {
    fn invoke(&self, function_name: &str, payload: &Notification) -> Result<(), RegistryError>;
}

pub trait ExecutionContext {
    fn remaining_time(&self) -> Duration;
    fn function_name(&self) -> &str;
}

#[derive(Clone, Debug)]
pub struct LambdaDispatcher {
    inner: aws_sdk_lambda::Client,
    handle: Handle,
}

impl LambdaDispatcher {
    pub fn new(inner: aws_sdk_lambda::Client, handle: Handle) -> Self {
        Self { inner, handle }
    }
}

impl ContinuationDispatcher for LambdaDispatcher {
    #[tracing::instrument(skip(self, payload), fields(records = payload.records.len()))]
    fn invoke(&self, function_name: &str, payload: &Notification) -> Result<(), RegistryError> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| RegistryError::Dispatch(format!("unable to serialize payload: {err}")))?;

        let response = self
            .handle
            .block_on(
                self.inner
                    .invoke()
                    .function_name(function_name)
                    .invocation_type(InvocationType::Event)
                    .payload(Blob::new(body))
                    .send(),
            )
            .map_err(|err| {
                RegistryError::Dispatch(format!(
                    "unable to invoke {function_name}: {}",
                    DisplayErrorContext(err)
                ))
            })?;

        // 202 is the expected status code for Event invocations
        if response.status_code() != 202 {
            return Err(RegistryError::Dispatch(format!(
                "invocation of {function_name} returned status {}",
                response.status_code()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LambdaContext {
    deadline_ms: u64,
    function_name: String,
}

impl LambdaContext {
    pub fn new(deadline_ms: u64, function_name: impl Into<String>) -> Self {
        Self {
            deadline_ms,
            function_name: function_name.into(),
        }
    }
}

impl From<&lambda_runtime::Context> for LambdaContext {
    fn from(ctx: &lambda_runtime::Context) -> Self {
        Self::new(ctx.deadline, ctx.invoked_function_arn.clone())
    }
}

impl ExecutionContext for LambdaContext {
    fn remaining_time(&self) -> Duration {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Duration::from_millis(self.deadline_ms.saturating_sub(now))
    }

    fn function_name(&self) -> &str {
        &self.function_name
    }
}

#[derive(Debug, Clone)]
pub struct WallClock {
    deadline: Instant,
    function_name: String,
}

impl WallClock {
    pub fn new(budget: Duration, function_name: impl Into<String>) -> Self {
        Self {
            deadline: Instant::now() + budget,
            function_name: function_name.into(),
        }
    }
}

impl ExecutionContext for WallClock {
    fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn function_name(&self) -> &str {
        &self.function_name
    }
}
