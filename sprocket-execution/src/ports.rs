//! Bounded pool of TCP ports handed to tasks
//!
//! Slot `i` stands for port `base + 1 + i`. A slot is taken while exactly one
//! live task holds it. The pool itself is not synchronized; the supervisor
//! keeps it behind the same lock as its task registry.

use std::net::TcpListener;
use tracing::{debug, trace};

use crate::error::ExecutionError;

#[derive(Debug)]
pub struct PortPool {
    base: u16,
    slots: Vec<bool>,
    probe: bool,
}

impl PortPool {
    /// Pool of `size` ports starting right after `base`
    pub fn new(base: u16, size: usize) -> Self {
        let size = size.min((u16::MAX - base) as usize);
        Self {
            base,
            slots: vec![false; size],
            probe: true,
        }
    }

    /// Enable or disable the bind probe done before handing out a port
    pub fn with_probe(mut self, probe: bool) -> Self {
        self.probe = probe;
        self
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|taken| **taken).count()
    }

    fn port_at(&self, index: usize) -> u16 {
        self.base + 1 + index as u16
    }

    fn index_of(&self, port: u16) -> Option<usize> {
        let index = port.checked_sub(self.base)?.checked_sub(1)? as usize;
        (index < self.slots.len()).then_some(index)
    }

    pub fn is_taken(&self, port: u16) -> bool {
        self.index_of(port).map(|i| self.slots[i]).unwrap_or(false)
    }

    /// Reserve the first free port that can actually be bound
    pub fn acquire(&mut self) -> Result<u16, ExecutionError> {
        for index in 0..self.slots.len() {
            if self.slots[index] {
                continue;
            }

            let port = self.port_at(index);
            if self.probe && TcpListener::bind(("127.0.0.1", port)).is_err() {
                trace!("Port {} is held outside the pool, skipping", port);
                continue;
            }

            self.slots[index] = true;
            debug!("Acquired port {}", port);
            return Ok(port);
        }

        Err(ExecutionError::PoolExhausted)
    }

    /// Return a port; free or foreign ports are ignored
    pub fn release(&mut self, port: u16) {
        if let Some(index) = self.index_of(port) {
            if self.slots[index] {
                debug!("Released port {}", port);
            }
            self.slots[index] = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[test]
    fn test_exhaustion_at_capacity() {
        let mut pool = PortPool::new(41000, 2).with_probe(false);
        assert_eq!(pool.acquire().unwrap(), 41001);
        assert_eq!(pool.acquire().unwrap(), 41002);
        assert!(matches!(pool.acquire(), Err(ExecutionError::PoolExhausted)));

        pool.release(41001);
        assert_eq!(pool.acquire().unwrap(), 41001);
    }

    #[test]
    fn test_release_ignores_free_and_foreign_ports() {
        let mut pool = PortPool::new(41000, 2).with_probe(false);
        pool.release(41001);
        pool.release(41000);
        pool.release(50000);
        pool.release(0);
        assert_eq!(pool.in_use(), 0);

        let port = pool.acquire().unwrap();
        pool.release(port);
        pool.release(port);
        assert!(!pool.is_taken(port));
    }

    #[test]
    fn test_probe_skips_ports_held_elsewhere() {
        let holder = TcpListener::bind("127.0.0.1:0").unwrap();
        let held = holder.local_addr().unwrap().port();

        let mut pool = PortPool::new(held - 1, 2);
        let port = pool.acquire().unwrap();
        assert_ne!(port, held);
        assert!(!pool.is_taken(held));
    }

    #[test]
    fn test_pool_is_clamped_to_port_range() {
        let pool = PortPool::new(u16::MAX - 3, 64);
        assert_eq!(pool.capacity(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_acquire_release_is_exclusive() {
        let pool = Arc::new(Mutex::new(PortPool::new(42000, 6).with_probe(false)));
        let held = Arc::new(std::sync::Mutex::new(HashSet::new()));

        let mut workers = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let held = held.clone();
            workers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let acquired = pool.lock().await.acquire();
                    if let Ok(port) = acquired {
                        assert!(held.lock().unwrap().insert(port), "port {} handed out twice", port);
                        tokio::task::yield_now().await;
                        held.lock().unwrap().remove(&port);
                        pool.lock().await.release(port);
                    }
                }
            }));
        }

        for worker in workers {
            worker.await.unwrap();
        }
        assert_eq!(pool.lock().await.in_use(), 0);
    }
}
