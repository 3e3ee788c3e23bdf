//! # Run 状态轮询任务
//!
//! 以固定间隔执行一个异步步骤（查询 Run 状态），直到步骤返回 `Break` 或被外部停止。
//!
//! ## 单一所有权
//! `RunPoller` 同一时刻最多持有一个轮询任务：
//! - `start` 会先中止已有任务，再启动新任务
//! - `stop` 中止当前任务（取消 Run、删除对话、应用退出时调用）
//! - 任务自然结束时自行从槽位中移除
//!
//! ## 过期任务
//! 每个任务持有一张 `PollTicket`。任务被替换或停止后票据立即失效，
//! 步骤在 await 返回后应先检查 `is_current()` 再修改状态，
//! 保证已作废的任务不会写入任何状态。

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// 轮询间隔下限（毫秒），`tokio::time::interval` 不接受零间隔
const MIN_POLL_INTERVAL_MS: u64 = 10;

/// 当前活动的轮询任务
struct ActivePoll {
    id: u64,
    run_id: String,
    task: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<ActivePoll>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<ActivePoll>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 轮询任务票据
#[derive(Clone)]
pub struct PollTicket {
    id: u64,
    run_id: String,
    slot: Slot,
}

impl PollTicket {
    /// 被轮询的 Run ID
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 票据对应的任务是否仍是活动任务
    pub fn is_current(&self) -> bool {
        lock(&self.slot).as_ref().is_some_and(|active| active.id == self.id)
    }

    /// 任务自然结束：仅当槽位仍属于自己时清空
    fn release(&self) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|active| active.id == self.id) {
            *slot = None;
        }
    }
}

/// 单一所有权的轮询任务句柄
pub struct RunPoller {
    slot: Slot,
    next_id: AtomicU64,
}

impl RunPoller {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// 启动轮询任务
    ///
    /// 首次执行发生在一个完整间隔之后。已有任务会先被中止。
    /// 必须在 tokio runtime 上下文中调用。
    ///
    /// # 参数
    /// - `run_id` - 被轮询的 Run ID（用于日志和查询）
    /// - `period` - 轮询间隔
    /// - `step` - 每次触发执行的步骤，返回 `Break` 结束轮询
    pub fn start<F, Fut>(&self, run_id: &str, period: Duration, mut step: F)
    where
        F: FnMut(PollTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let period = period.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        let ticket = PollTicket {
            id,
            run_id: run_id.to_string(),
            slot: Arc::clone(&self.slot),
        };

        // 持锁期间完成 "中止旧任务 → 启动新任务 → 登记"，
        // 新任务的票据检查会等到登记完成后才能拿到锁
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.take() {
            log::info!("替换轮询任务: {} -> {}", previous.run_id, run_id);
            previous.task.abort();
        }

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即完成，跳过它
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !ticket.is_current() {
                    break;
                }
                if step(ticket.clone()).await.is_break() {
                    break;
                }
            }
            ticket.release();
        });

        *slot = Some(ActivePoll {
            id,
            run_id: run_id.to_string(),
            task,
        });
        log::info!("开始轮询 Run {}（间隔 {:?}）", run_id, period);
    }

    /// 停止当前轮询任务
    ///
    /// # 返回值
    /// 存在活动任务并已中止时返回 `true`
    pub fn stop(&self) -> bool {
        match lock(&self.slot).take() {
            Some(active) => {
                active.task.abort();
                log::info!("停止轮询 Run {}", active.run_id);
                true
            }
            None => false,
        }
    }

    /// 当前被轮询的 Run ID
    pub fn active_run(&self) -> Option<String> {
        lock(&self.slot).as_ref().map(|active| active.run_id.clone())
    }
}

impl Default for RunPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RunPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
