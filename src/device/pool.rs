//! 设备资源池
//!
//! 固定的设备下标表上的计数信号量，每台设备同一时刻只属于一个执行。
//! 获取与释放只操作下标，每个租约在 drop 时恰好释放一次。

use super::types::{Device, DevicePoolError, DevicePoolEvent, ResourceInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};

/// 每台设备同时允许的租约数
const MAX_USERS_PER_DEVICE: usize = 1;

/// 设备资源槽位
struct Slot {
    name: String,
    users: usize,
}

struct PoolInner {
    slots: Mutex<Vec<Slot>>,
    /// 有租约释放时唤醒所有等待者
    released: Notify,
    release_count: AtomicUsize,
    event_tx: broadcast::Sender<DevicePoolEvent>,
}

impl PoolInner {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, index: usize) {
        let (name, users) = {
            let mut slots = self.slots();
            let slot = &mut slots[index];
            slot.users = slot.users.saturating_sub(1);
            (slot.name.clone(), slot.users)
        };
        self.release_count.fetch_add(1, Ordering::SeqCst);
        self.released.notify_waiters();

        let _ = self.event_tx.send(DevicePoolEvent::LeaseReleased {
            device: name.clone(),
            users,
        });
        debug!(device = %name, "设备租约已释放");
    }
}

/// 设备资源池
pub struct DeviceResourcePool {
    inner: Arc<PoolInner>,
    /// 设备名（UDID）到下标的映射
    index: HashMap<String, usize>,
}

impl DeviceResourcePool {
    /// 用设备列表创建资源池，重复的 UDID 只保留第一个
    pub fn new(devices: &[Device]) -> Self {
        let mut slots = Vec::new();
        let mut index = HashMap::new();

        for device in devices {
            if index.contains_key(&device.udid) {
                continue;
            }
            index.insert(device.udid.clone(), slots.len());
            slots.push(Slot {
                name: device.udid.clone(),
                users: 0,
            });
        }

        let (event_tx, _) = broadcast::channel(100);

        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(slots),
                released: Notify::new(),
                release_count: AtomicUsize::new(0),
                event_tx,
            }),
            index,
        }
    }

    /// 订阅事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<DevicePoolEvent> {
        self.inner.event_tx.subscribe()
    }

    /// 已释放的租约总数
    pub fn release_count(&self) -> usize {
        self.inner.release_count.load(Ordering::SeqCst)
    }

    /// 所有资源的占用情况
    pub fn resources(&self) -> Vec<ResourceInfo> {
        self.inner
            .slots()
            .iter()
            .map(|slot| ResourceInfo {
                name: slot.name.clone(),
                max_concurrent_users: MAX_USERS_PER_DEVICE,
                users: slot.users,
            })
            .collect()
    }

    /// 获取任意一台候选设备的租约，没有空闲设备时挂起等待
    pub async fn acquire_any(&self, candidates: &[Device]) -> Result<DeviceLease, DevicePoolError> {
        let indices = self.candidate_indices(candidates)?;

        loop {
            // 先注册唤醒再检查，避免错过检查与等待之间的释放
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(lease) = self.try_acquire(&indices) {
                return Ok(lease);
            }

            debug!("没有空闲的候选设备，等待释放");
            released.await;
        }
    }

    /// 与 [`acquire_any`](Self::acquire_any) 相同，但最多等待 `timeout`
    pub async fn acquire_any_timeout(
        &self,
        candidates: &[Device],
        timeout: Option<Duration>,
    ) -> Result<DeviceLease, DevicePoolError> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.acquire_any(candidates))
                .await
                .map_err(|_| DevicePoolError::Timeout(timeout))?,
            None => self.acquire_any(candidates).await,
        }
    }

    fn candidate_indices(&self, candidates: &[Device]) -> Result<Vec<usize>, DevicePoolError> {
        if candidates.is_empty() {
            return Err(DevicePoolError::NoCandidates);
        }

        let indices: Vec<usize> = candidates
            .iter()
            .filter_map(|device| self.index.get(&device.udid).copied())
            .collect();

        if indices.is_empty() {
            let names: Vec<&str> = candidates.iter().map(|d| d.udid.as_str()).collect();
            return Err(DevicePoolError::NoMatchingDevice(names.join(", ")));
        }

        Ok(indices)
    }

    fn try_acquire(&self, indices: &[usize]) -> Option<DeviceLease> {
        let (index, name, users) = {
            let mut slots = self.inner.slots();
            let index = indices
                .iter()
                .copied()
                .find(|&i| slots[i].users < MAX_USERS_PER_DEVICE)?;
            let slot = &mut slots[index];
            slot.users += 1;
            (index, slot.name.clone(), slot.users)
        };

        let _ = self.inner.event_tx.send(DevicePoolEvent::LeaseAcquired {
            device: name.clone(),
            users,
        });
        info!(device = %name, "设备租约已获取");

        Some(DeviceLease {
            inner: Arc::clone(&self.inner),
            index,
            name,
            released: false,
        })
    }
}

/// 设备租约
///
/// 持有期间独占一个设备下标的一个使用名额；drop 或 [`release`](Self::release) 时归还。
pub struct DeviceLease {
    inner: Arc<PoolInner>,
    index: usize,
    name: String,
    released: bool,
}

impl DeviceLease {
    /// 租约对应的设备名（UDID）
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 显式释放
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.release(self.index);
        }
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLease")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DevicePlatform;

    fn devices(names: &[&str]) -> Vec<Device> {
        names
            .iter()
            .map(|n| Device::new(*n, *n, DevicePlatform::Ios))
            .collect()
    }

    #[tokio::test]
    async fn test_acquire_any_picks_free_device() {
        let all = devices(&["a", "b"]);
        let pool = DeviceResourcePool::new(&all);

        let first = pool.acquire_any(&all).await.unwrap();
        let second = pool.acquire_any(&all).await.unwrap();

        assert_ne!(first.name(), second.name());
        assert_eq!(pool.resources().iter().map(|r| r.users).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_release_exactly_once() {
        let all = devices(&["a"]);
        let pool = DeviceResourcePool::new(&all);

        let lease = pool.acquire_any(&all).await.unwrap();
        lease.release();
        assert_eq!(pool.release_count(), 1);

        let lease = pool.acquire_any(&all).await.unwrap();
        drop(lease);
        assert_eq!(pool.release_count(), 2);
        assert_eq!(pool.resources()[0].users, 0);
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let all = devices(&["a"]);
        let pool = Arc::new(DeviceResourcePool::new(&all));

        let held = pool.acquire_any(&all).await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            let all = all.clone();
            tokio::spawn(async move { pool.acquire_any(&all).await.map(|l| l.name().to_string()) })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        let name = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(name, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_is_exclusive() {
        let all = devices(&["a"]);
        let pool = DeviceResourcePool::new(&all);

        let held = pool.acquire_any(&all).await.unwrap();
        let second =
            tokio::time::timeout(Duration::from_secs(60), pool.acquire_any(&all)).await;

        assert!(second.is_err());
        assert_eq!(pool.resources()[0].users, 1);
        assert_eq!(pool.resources()[0].max_concurrent_users, 1);
        drop(held);
    }

    #[tokio::test]
    async fn test_duplicate_udids_share_one_slot() {
        let all = devices(&["a", "a"]);
        let pool = DeviceResourcePool::new(&all);

        let _held = pool.acquire_any(&all).await.unwrap();

        assert_eq!(pool.resources().len(), 1);
        assert!(
            pool.acquire_any_timeout(&all, Some(Duration::ZERO))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_pool() {
        let all = devices(&["a", "b"]);
        let pool = Arc::new(DeviceResourcePool::new(&all));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            let all = all.clone();
            let running = Arc::clone(&running);
            let max_running = Arc::clone(&max_running);
            handles.push(tokio::spawn(async move {
                let _lease = pool.acquire_any(&all).await.unwrap();
                let current = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_running.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.release_count(), 8);
    }

    #[tokio::test]
    async fn test_unknown_candidates_rejected() {
        let pool = DeviceResourcePool::new(&devices(&["a"]));

        assert!(matches!(
            pool.acquire_any(&[]).await,
            Err(DevicePoolError::NoCandidates)
        ));
        assert!(matches!(
            pool.acquire_any(&devices(&["z"])).await,
            Err(DevicePoolError::NoMatchingDevice(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout() {
        let all = devices(&["a"]);
        let pool = DeviceResourcePool::new(&all);
        let _held = pool.acquire_any(&all).await.unwrap();

        let result = pool
            .acquire_any_timeout(&all, Some(Duration::from_secs(30)))
            .await;
        assert!(matches!(result, Err(DevicePoolError::Timeout(_))));
    }
}
