//! 优雅关闭：关闭信号广播与后台任务回收

use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 嵌入方订阅关闭信号后可以和编排器同步退出。`shutdown`幂等，
/// 重复调用只生效一次。
pub struct ShutdownManager {
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
    is_shutdown: Arc<RwLock<bool>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx: Arc::new(RwLock::new(Some(shutdown_tx))),
            is_shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// 订阅关闭信号
    ///
    /// 已经关闭时返回一个立即可读的接收器，晚到的订阅者不会永远等待。
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        let shutdown_tx = self.shutdown_tx.read().await;
        if let Some(ref tx) = *shutdown_tx {
            tx.subscribe()
        } else {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            rx
        }
    }

    /// 触发关闭并广播给所有订阅者
    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        if *is_shutdown {
            debug!("关闭已经触发过，忽略本次调用");
            return;
        }
        *is_shutdown = true;

        let shutdown_tx = self.shutdown_tx.read().await;
        if let Some(ref tx) = *shutdown_tx {
            debug!("向 {} 个订阅者广播关闭信号", tx.receiver_count());
            // 可能没有接收者，发送失败不算错误
            let _ = tx.send(());
        }
        drop(shutdown_tx);

        let mut shutdown_tx = self.shutdown_tx.write().await;
        *shutdown_tx = None;
        info!("关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.is_shutdown.read().await
    }

    /// 阻塞直到关闭被触发
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe().await;
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ShutdownManager {
    fn clone(&self) -> Self {
        Self {
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            is_shutdown: Arc::clone(&self.is_shutdown),
        }
    }
}

/// 在宽限期内回收后台循环任务
///
/// 周期循环在停止标志翻转或收到关闭信号后自行退出；宽限期耗尽
/// 仍未结束的任务将被中止。返回被中止的任务数。
pub async fn drain_tasks(mut handles: Vec<JoinHandle<()>>, grace: Duration) -> usize {
    match timeout(grace, future::join_all(handles.iter_mut())).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    warn!("后台任务异常结束: {}", e);
                }
            }
            0
        }
        Err(_) => {
            let mut aborted = 0;
            for handle in &handles {
                if !handle.is_finished() {
                    handle.abort();
                    aborted += 1;
                }
            }
            warn!("{} 个后台任务未在宽限期内退出，已中止", aborted);
            aborted
        }
    }
}
