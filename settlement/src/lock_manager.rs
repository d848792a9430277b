//! Entity lock management for trades.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use marketsettle_common::{EntityRef, LockId, MarketError, Result, TradeId};

use crate::config::LockConfig;

/// Lock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// Lock is held by its trade.
    Active,
    /// Lock was released when its trade finished.
    Released,
    /// Lock outlived its duration.
    Expired,
}

/// Exclusive claim of one trade on one entity.
#[derive(Debug, Clone)]
pub struct EntityLock {
    /// Unique lock ID.
    pub id: LockId,
    /// Trade holding the lock.
    pub trade_id: TradeId,
    /// Locked entity.
    pub entity: EntityRef,
    /// Current status.
    pub status: LockStatus,
    /// When the lock was taken.
    pub created_at: Instant,
    /// When the lock expires.
    pub expires_at: Instant,
}

impl EntityLock {
    /// Create a new lock.
    pub fn new(trade_id: TradeId, entity: EntityRef, duration: Duration) -> Self {
        let now = Instant::now();
        Self {
            id: LockId::new(),
            trade_id,
            entity,
            status: LockStatus::Active,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Check if lock is active.
    pub fn is_active(&self) -> bool {
        self.status == LockStatus::Active && !self.is_expired()
    }

    /// Check if lock has expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    /// Get remaining time until expiry.
    pub fn remaining_time(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Mark lock as released.
    pub fn release(&mut self) {
        self.status = LockStatus::Released;
    }

    /// Mark lock as expired.
    pub fn expire(&mut self) {
        self.status = LockStatus::Expired;
    }
}

/// Manager for entity locks.
///
/// A trade takes all of its locks in one step or none of them, so two
/// trades touching a common entity never interleave and disjoint trades
/// never wait on each other.
pub struct LockManager {
    /// Locks by ID.
    locks: Arc<DashMap<LockId, EntityLock>>,
    /// Current holder of each locked entity.
    holders: Arc<DashMap<EntityRef, LockId>>,
    /// Locks by trade ID.
    locks_by_trade: Arc<DashMap<TradeId, Vec<LockId>>>,
    /// Serializes the check-then-take step across trades.
    acquisition: Mutex<()>,
    /// Configuration.
    config: LockConfig,
}

impl LockManager {
    /// Create a new lock manager.
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            holders: Arc::new(DashMap::new()),
            locks_by_trade: Arc::new(DashMap::new()),
            acquisition: Mutex::new(()),
            config,
        }
    }

    /// Take locks on every entity, or on none.
    ///
    /// Returns the first entity held by another trade on conflict.
    pub fn try_acquire(
        &self,
        trade_id: TradeId,
        entities: &[EntityRef],
    ) -> std::result::Result<Vec<LockId>, EntityRef> {
        let mut wanted: Vec<&EntityRef> = Vec::with_capacity(entities.len());
        for entity in entities {
            if !wanted.contains(&entity) {
                wanted.push(entity);
            }
        }

        let _guard = self.acquisition.lock();

        for entity in &wanted {
            if let Some(holder) = self.holder_of(entity) {
                if holder != trade_id {
                    return Err((*entity).clone());
                }
            }
        }

        let mut taken = Vec::with_capacity(wanted.len());
        for entity in wanted {
            let lock = EntityLock::new(trade_id, entity.clone(), self.config.default_duration);
            let lock_id = lock.id;

            self.locks.insert(lock_id, lock);
            self.holders.insert(entity.clone(), lock_id);
            taken.push(lock_id);

            debug!(lock_id = %lock_id, trade_id = %trade_id, entity = %entity, "Lock taken");
        }

        self.locks_by_trade
            .entry(trade_id)
            .or_insert_with(Vec::new)
            .extend(taken.iter().copied());

        Ok(taken)
    }

    /// Take locks on every entity, retrying until the acquisition timeout.
    pub async fn acquire(&self, trade_id: TradeId, entities: &[EntityRef]) -> Result<Vec<LockId>> {
        let deadline = tokio::time::Instant::now() + self.config.acquisition_timeout;

        loop {
            match self.try_acquire(trade_id, entities) {
                Ok(taken) => {
                    info!(trade_id = %trade_id, locks = taken.len(), "Locks acquired");
                    return Ok(taken);
                }
                Err(entity) => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(trade_id = %trade_id, entity = %entity, "Lock acquisition timeout");
                        return Err(MarketError::LockConflict { trade_id, entity });
                    }
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Take locks on every entity and hold them until the guard is dropped.
    pub async fn lock(self: &Arc<Self>, trade_id: TradeId, entities: &[EntityRef]) -> Result<LockGuard> {
        let locks = self.acquire(trade_id, entities).await?;
        Ok(LockGuard {
            manager: self.clone(),
            trade_id,
            entities: entities.to_vec(),
            locks,
        })
    }

    /// Extend the locks a trade still holds by the default duration.
    ///
    /// Fails with the first entity the trade no longer holds, because its
    /// lock was released, or expired and then swept or taken over. Nothing
    /// is extended on failure.
    pub fn renew(&self, trade_id: TradeId, entities: &[EntityRef]) -> std::result::Result<(), EntityRef> {
        let _guard = self.acquisition.lock();

        let mut held = Vec::with_capacity(entities.len());
        for entity in entities {
            let lock_id = self
                .holders
                .get(entity)
                .map(|h| *h)
                .filter(|lock_id| {
                    self.locks.get(lock_id).is_some_and(|l| {
                        l.trade_id == trade_id && l.status != LockStatus::Released
                    })
                })
                .ok_or_else(|| entity.clone())?;
            held.push(lock_id);
        }

        let expires_at = Instant::now() + self.config.default_duration;
        for lock_id in &held {
            if let Some(mut lock) = self.locks.get_mut(lock_id) {
                lock.status = LockStatus::Active;
                lock.expires_at = expires_at;
            }
        }

        debug!(trade_id = %trade_id, renewed = held.len(), "Locks renewed");
        Ok(())
    }

    /// Get a lock by ID.
    pub fn get_lock(&self, lock_id: &LockId) -> Option<EntityLock> {
        self.locks.get(lock_id).map(|l| l.clone())
    }

    /// Trade currently holding an active lock on `entity`.
    pub fn holder_of(&self, entity: &EntityRef) -> Option<TradeId> {
        let lock_id = self.holders.get(entity).map(|h| *h)?;
        self.locks
            .get(&lock_id)
            .filter(|l| l.is_active())
            .map(|l| l.trade_id)
    }

    /// Check whether `entity` is locked.
    pub fn is_locked(&self, entity: &EntityRef) -> bool {
        self.holder_of(entity).is_some()
    }

    /// Get all locks for a trade.
    pub fn get_locks_for_trade(&self, trade_id: &TradeId) -> Vec<EntityLock> {
        self.locks_by_trade
            .get(trade_id)
            .map(|lock_ids| lock_ids.iter().filter_map(|id| self.get_lock(id)).collect())
            .unwrap_or_default()
    }

    /// Release all locks held by a trade. Returns how many were released.
    pub fn release_for_trade(&self, trade_id: &TradeId) -> usize {
        let Some((_, lock_ids)) = self.locks_by_trade.remove(trade_id) else {
            return 0;
        };

        let mut released = 0;
        for lock_id in lock_ids {
            let entity = match self.locks.get_mut(&lock_id) {
                Some(mut lock) if lock.status == LockStatus::Active => {
                    lock.release();
                    lock.entity.clone()
                }
                _ => continue,
            };
            // An expired lock may already have been taken over by another trade.
            self.holders.remove_if(&entity, |_, holder| *holder == lock_id);
            released += 1;
        }

        debug!(trade_id = %trade_id, released, "Locks released");
        released
    }

    /// Get count of active locks.
    pub fn active_lock_count(&self) -> usize {
        self.locks.iter().filter(|l| l.is_active()).count()
    }

    /// Run cleanup loop to expire stale locks.
    pub async fn run_cleanup_loop(&self) {
        loop {
            tokio::time::sleep(self.config.cleanup_interval).await;
            self.cleanup_expired_locks();
        }
    }

    /// Expire stale locks and forget finished ones.
    pub fn cleanup_expired_locks(&self) {
        let expired: Vec<LockId> = self
            .locks
            .iter()
            .filter(|l| l.status == LockStatus::Active && l.is_expired())
            .map(|l| l.id)
            .collect();

        for lock_id in expired {
            let entity = match self.locks.get_mut(&lock_id) {
                Some(mut lock) => {
                    lock.expire();
                    warn!(lock_id = %lock_id, trade_id = %lock.trade_id, entity = %lock.entity, "Lock expired");
                    lock.entity.clone()
                }
                None => continue,
            };
            self.holders.remove_if(&entity, |_, holder| *holder == lock_id);
        }

        self.locks.retain(|_, lock| lock.status == LockStatus::Active);
    }
}

/// Locks held by one trade. Dropping the guard releases them, including
/// when the owning task panics or is cancelled.
pub struct LockGuard {
    manager: Arc<LockManager>,
    trade_id: TradeId,
    entities: Vec<EntityRef>,
    locks: Vec<LockId>,
}

impl LockGuard {
    /// Locks taken for the trade.
    pub fn locks(&self) -> &[LockId] {
        &self.locks
    }

    /// Check the locks are still held and extend them.
    pub fn renew(&self) -> std::result::Result<(), EntityRef> {
        self.manager.renew(self.trade_id, &self.entities)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.manager.release_for_trade(&self.trade_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketsettle_common::{ParticipantId, ProductId};

    fn create_test_lock_manager() -> LockManager {
        LockManager::new(LockConfig {
            acquisition_timeout: Duration::from_millis(200),
            retry_interval: Duration::from_millis(5),
            ..LockConfig::default()
        })
    }

    fn trade_entities(product: &str, buyer: &str, seller: &str) -> Vec<EntityRef> {
        vec![
            EntityRef::product(&ProductId::new(product)),
            EntityRef::participant(&ParticipantId::new(buyer)),
            EntityRef::participant(&ParticipantId::new(seller)),
        ]
    }

    #[test]
    fn test_lock_acquire_and_release() {
        let manager = create_test_lock_manager();
        let trade_id = TradeId::new();

        let taken = manager
            .try_acquire(trade_id, &trade_entities("product1", "alice", "bob"))
            .unwrap();
        assert_eq!(taken.len(), 3);
        assert_eq!(manager.active_lock_count(), 3);

        let lock = manager.get_lock(&taken[0]).unwrap();
        assert!(lock.is_active());
        assert!(lock.remaining_time() > Duration::ZERO);

        assert_eq!(manager.release_for_trade(&trade_id), 3);
        assert_eq!(manager.active_lock_count(), 0);
        assert_eq!(manager.get_lock(&taken[0]).unwrap().status, LockStatus::Released);
    }

    #[test]
    fn test_overlapping_trades_conflict() {
        let manager = create_test_lock_manager();
        let first = TradeId::new();
        let second = TradeId::new();

        manager
            .try_acquire(first, &trade_entities("product1", "alice", "bob"))
            .unwrap();

        let conflict = manager
            .try_acquire(second, &trade_entities("product2", "alice", "carol"))
            .unwrap_err();
        assert_eq!(conflict, EntityRef::participant(&ParticipantId::new("alice")));

        // Nothing was taken for the refused trade
        assert!(manager.get_locks_for_trade(&second).is_empty());
        assert!(!manager.is_locked(&EntityRef::product(&ProductId::new("product2"))));
    }

    #[test]
    fn test_disjoint_trades_do_not_conflict() {
        let manager = create_test_lock_manager();

        manager
            .try_acquire(TradeId::new(), &trade_entities("product1", "alice", "bob"))
            .unwrap();
        manager
            .try_acquire(TradeId::new(), &trade_entities("product2", "carol", "dave"))
            .unwrap();

        assert_eq!(manager.active_lock_count(), 6);
    }

    #[test]
    fn test_duplicate_entities_locked_once() {
        let manager = create_test_lock_manager();
        let taken = manager
            .try_acquire(TradeId::new(), &trade_entities("product1", "alice", "alice"))
            .unwrap();
        assert_eq!(taken.len(), 2);
    }

    #[test]
    fn test_expired_lock_can_be_taken_over() {
        let manager = LockManager::new(LockConfig {
            default_duration: Duration::ZERO,
            ..LockConfig::default()
        });
        let first = TradeId::new();
        let second = TradeId::new();
        let entities = trade_entities("product1", "alice", "bob");

        manager.try_acquire(first, &entities).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let taken = manager.try_acquire(second, &entities).unwrap();

        // The stale trade's release must not free the new holder
        manager.release_for_trade(&first);
        let holder = manager.holders.get(&entities[0]).map(|h| *h);
        assert_eq!(holder, Some(taken[0]));

        manager.cleanup_expired_locks();
        assert_eq!(manager.active_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let manager = Arc::new(create_test_lock_manager());
        let first = TradeId::new();
        let entities = trade_entities("product1", "alice", "bob");
        manager.try_acquire(first, &entities).unwrap();

        let releaser = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            releaser.release_for_trade(&first);
        });

        let taken = manager.acquire(TradeId::new(), &entities).await.unwrap();
        assert_eq!(taken.len(), 3);
    }

    #[tokio::test]
    async fn test_acquire_times_out_with_conflict() {
        let manager = create_test_lock_manager();
        let entities = trade_entities("product1", "alice", "bob");
        manager.try_acquire(TradeId::new(), &entities).unwrap();

        let trade_id = TradeId::new();
        let err = manager.acquire(trade_id, &entities).await.unwrap_err();
        assert_eq!(
            err,
            MarketError::LockConflict {
                trade_id,
                entity: entities[0].clone()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let manager = Arc::new(create_test_lock_manager());
        let entities = trade_entities("product1", "alice", "bob");

        let guard = manager.lock(TradeId::new(), &entities).await.unwrap();
        assert_eq!(guard.locks().len(), 3);
        assert_eq!(manager.active_lock_count(), 3);

        drop(guard);
        assert_eq!(manager.active_lock_count(), 0);
        assert!(!manager.is_locked(&entities[0]));
    }

    #[tokio::test]
    async fn test_guard_releases_when_task_panics() {
        let manager = Arc::new(create_test_lock_manager());
        let entities = trade_entities("product1", "alice", "bob");

        let task = tokio::spawn({
            let manager = manager.clone();
            let entities = entities.clone();
            async move {
                let _guard = manager.lock(TradeId::new(), &entities).await.unwrap();
                panic!("settlement crashed");
            }
        });

        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(manager.active_lock_count(), 0);
        manager.try_acquire(TradeId::new(), &entities).unwrap();
    }

    #[test]
    fn test_renew_extends_held_locks() {
        let manager = LockManager::new(LockConfig {
            default_duration: Duration::from_millis(50),
            ..LockConfig::default()
        });
        let trade_id = TradeId::new();
        let entities = trade_entities("product1", "alice", "bob");
        let taken = manager.try_acquire(trade_id, &entities).unwrap();
        let before = manager.get_lock(&taken[0]).unwrap().expires_at;

        std::thread::sleep(Duration::from_millis(5));
        manager.renew(trade_id, &entities).unwrap();

        let lock = manager.get_lock(&taken[0]).unwrap();
        assert!(lock.expires_at > before);
        assert!(lock.is_active());
    }

    #[test]
    fn test_renew_fails_once_lock_taken_over() {
        let manager = LockManager::new(LockConfig {
            default_duration: Duration::ZERO,
            ..LockConfig::default()
        });
        let first = TradeId::new();
        let entities = trade_entities("product1", "alice", "bob");

        manager.try_acquire(first, &entities).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        manager.try_acquire(TradeId::new(), &entities[..1]).unwrap();

        let lost = manager.renew(first, &entities).unwrap_err();
        assert_eq!(lost, entities[0]);
    }

    #[test]
    fn test_renew_fails_after_expired_lock_swept() {
        let manager = LockManager::new(LockConfig {
            default_duration: Duration::ZERO,
            ..LockConfig::default()
        });
        let trade_id = TradeId::new();
        let entities = trade_entities("product1", "alice", "bob");

        manager.try_acquire(trade_id, &entities).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        manager.cleanup_expired_locks();

        assert_eq!(manager.renew(trade_id, &entities), Err(entities[0].clone()));
    }
}
