use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use uuid::Uuid;

/// A live client connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub remote_ip: IpAddr,
    pub started_at: Instant,
}

/// Process-wide table of live client connections.
///
/// Entries hold no session state; each gateway owns its remote session
/// exclusively. The registry only counts and enforces the connection cap.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<Uuid, ConnectionInfo>>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_connections,
        }
    }

    /// Register a new connection, or `None` if the registry is full.
    pub fn try_register(&self, remote_ip: IpAddr) -> Option<ConnectionGuard> {
        let mut map = self.inner.lock().ok()?;
        if map.len() >= self.max_connections {
            return None;
        }
        let info = ConnectionInfo {
            id: Uuid::new_v4(),
            remote_ip,
            started_at: Instant::now(),
        };
        map.insert(info.id, info.clone());
        Some(ConnectionGuard {
            info,
            registry: self.inner.clone(),
        })
    }

    pub fn active(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<ConnectionInfo> {
        match self.inner.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Removes its registry entry when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    info: ConnectionInfo,
    registry: Arc<Mutex<HashMap<Uuid, ConnectionInfo>>>,
}

impl ConnectionGuard {
    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.registry.lock() {
            map.remove(&self.info.id);
        }
    }
}
