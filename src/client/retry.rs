use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use crate::errors::{Error, Result};

/// 重试配置
pub struct RetryPolicy {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 线性退避的基础延迟
    pub base_delay: Duration,
    /// 是否重试的判断函数
    pub should_retry: Box<dyn Fn(&Error) -> bool + Send + Sync>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            should_retry: Box::new(Error::is_retryable),
        }
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: base,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次（从 1 开始）失败后的等待时间：`base_delay * attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// 执行带重试的操作，全部失败时返回最后一次的错误
///
/// `operation` 收到当前尝试序号（从 1 开始）。
pub async fn retry_with_policy<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        if attempt >= max_attempts || !(policy.should_retry)(&error) {
            return Err(error);
        }

        let delay = policy.delay(attempt);
        tracing::warn!(attempt, max_attempts, ?delay, "Attempt failed, retrying: {}", error);
        sleep(delay).await;
        attempt += 1;
    }
}
