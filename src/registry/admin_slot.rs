//! Single-slot storage for the admin session and its outbound transport.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SinkError;

/// Outbound transport of an admin session.
///
/// `send_frame` must not block: the registry calls it from inside its own
/// bookkeeping.
pub trait AdminSink: Send + Sync {
    fn send_frame(&self, frame: Vec<u8>) -> Result<(), SinkError>;
}

impl AdminSink for mpsc::Sender<Vec<u8>> {
    fn send_frame(&self, frame: Vec<u8>) -> Result<(), SinkError> {
        self.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// The admitted admin session.
#[derive(Clone)]
pub struct AdminSession {
    id: u64,
    sink: Arc<dyn AdminSink>,
}

impl AdminSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sink(&self) -> &Arc<dyn AdminSink> {
        &self.sink
    }
}

/// Holds at most one admin session. A second admission is refused.
pub(crate) struct AdminSlot {
    current: Option<AdminSession>,
    next_id: u64,
}

impl Default for AdminSlot {
    fn default() -> Self {
        Self {
            current: None,
            next_id: 1,
        }
    }
}

impl AdminSlot {
    pub(crate) fn current(&self) -> Option<&AdminSession> {
        self.current.as_ref()
    }

    pub(crate) fn admit(&mut self, sink: Arc<dyn AdminSink>) -> Option<u64> {
        if self.current.is_some() {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(AdminSession { id, sink });
        Some(id)
    }

    pub(crate) fn evict(&mut self, id: u64) -> bool {
        match &self.current {
            Some(session) if session.id == id => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl AdminSink for NullSink {
        fn send_frame(&self, _frame: Vec<u8>) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn test_ids_keep_increasing_across_evictions() {
        let mut slot = AdminSlot::default();
        let first = slot.admit(Arc::new(NullSink)).unwrap();
        assert!(slot.admit(Arc::new(NullSink)).is_none());

        assert!(!slot.evict(first + 10));
        assert!(slot.evict(first));
        assert!(slot.current().is_none());

        let second = slot.admit(Arc::new(NullSink)).unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_full_and_closed() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        assert_eq!(tx.send_frame(vec![1]), Ok(()));
        assert_eq!(tx.send_frame(vec![2]), Err(SinkError::Full));

        drop(rx);
        assert_eq!(tx.send_frame(vec![3]), Err(SinkError::Closed));
    }
}
