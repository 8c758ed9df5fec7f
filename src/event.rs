//! Job lifecycle events for collaborators (log sink, uploaders, dashboards).

use std::path::PathBuf;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        job_id: String,
    },
    Finished {
        job_id: String,
        artifacts: Vec<PathBuf>,
    },
    Failed {
        job_id: String,
        reason: String,
    },
}

/// Fan-out channel for job lifecycle events. Publishing never blocks and
/// never fails; events are dropped when nobody is subscribed.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(JobEvent::Started {
            job_id: "2026-01-01-00-00-00".to_string(),
        });

        match rx.recv().await.unwrap() {
            JobEvent::Started { job_id } => assert_eq!(job_id, "2026-01-01-00-00-00"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(JobEvent::Failed {
            job_id: "x".to_string(),
            reason: "nobody listening".to_string(),
        });
    }
}
