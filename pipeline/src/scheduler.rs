//! Drives the orchestrator's ticks, each at the interval it asked for.

use std::time::{Duration, Instant};

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::host::SceneHost;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TickKind {
    Downloads,
    Appends,
    Processes,
}

/// Next due instant per tick
#[derive(Debug, Clone)]
pub struct Scheduler {
    due: [(TickKind, Instant); 3],
}

impl Scheduler {
    /// Every tick is due at `now`
    pub fn new(now: Instant) -> Self {
        Self {
            due: [
                (TickKind::Downloads, now),
                (TickKind::Appends, now),
                (TickKind::Processes, now),
            ],
        }
    }

    pub fn next_due(&self, kind: TickKind) -> Instant {
        self.due
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, due)| *due)
            .unwrap_or_else(Instant::now)
    }

    /// Run every tick that is due and return the delay until the next one
    pub fn poll<H: SceneHost>(
        &mut self,
        orchestrator: &mut Orchestrator<H>,
        now: Instant,
    ) -> Duration {
        for (kind, due) in self.due.iter_mut() {
            if *due > now {
                continue;
            }
            let delay = match kind {
                TickKind::Downloads => orchestrator.download_tick(),
                TickKind::Appends => orchestrator.append_tick(),
                TickKind::Processes => orchestrator.process_tick(),
            };
            *due = now + delay;
        }

        self.due
            .iter()
            .map(|(_, due)| due.saturating_duration_since(now))
            .min()
            .unwrap_or_default()
    }
}

/// Tick the orchestrator until `shutdown` is cancelled
pub async fn run<H: SceneHost>(orchestrator: &mut Orchestrator<H>, shutdown: CancellationToken) {
    drive(orchestrator, &shutdown, |_| false).await;
}

/// Tick the orchestrator until it has no work left or `shutdown` is cancelled
pub async fn run_until_idle<H: SceneHost>(
    orchestrator: &mut Orchestrator<H>,
    shutdown: CancellationToken,
) {
    drive(orchestrator, &shutdown, Orchestrator::is_idle).await;
}

async fn drive<H, F>(orchestrator: &mut Orchestrator<H>, shutdown: &CancellationToken, done: F)
where
    H: SceneHost,
    F: Fn(&Orchestrator<H>) -> bool,
{
    let mut scheduler = Scheduler::new(Instant::now());
    info!("Tick scheduler started");

    loop {
        let wait = scheduler.poll(orchestrator, Instant::now());
        if done(orchestrator) {
            info!("Pipeline idle, stopping scheduler");
            break;
        }
        debug!("Next tick in {:?}", wait);

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Tick scheduler shutting down");
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::downloads::{DownloadError, Transfer, Transport};
    use crate::host::HeadlessHost;
    use std::sync::Arc;

    struct Offline;

    impl Transport for Offline {
        fn fetch(&self, _url: &str) -> Result<Transfer, DownloadError> {
            Err(DownloadError::Request("offline".into()))
        }
    }

    fn orchestrator() -> Orchestrator<HeadlessHost> {
        Orchestrator::new(
            PipelineConfig::default(),
            HeadlessHost::new(),
            Arc::new(Offline),
        )
    }

    #[test]
    fn test_idle_intervals() {
        let mut orchestrator = orchestrator();
        let now = Instant::now();
        let mut scheduler = Scheduler::new(now);

        // Idle appends come back soonest (500ms)
        assert_eq!(scheduler.poll(&mut orchestrator, now), Duration::from_millis(500));
        assert_eq!(
            scheduler.next_due(TickKind::Downloads),
            now + Duration::from_millis(1000)
        );
        assert_eq!(
            scheduler.next_due(TickKind::Processes),
            now + Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_only_due_ticks_run() {
        let mut orchestrator = orchestrator();
        let start = Instant::now();
        let mut scheduler = Scheduler::new(start);
        scheduler.poll(&mut orchestrator, start);

        let later = start + Duration::from_millis(600);
        let wait = scheduler.poll(&mut orchestrator, later);

        assert_eq!(
            scheduler.next_due(TickKind::Appends),
            later + Duration::from_millis(500)
        );
        assert_eq!(
            scheduler.next_due(TickKind::Downloads),
            start + Duration::from_millis(1000)
        );
        assert_eq!(wait, Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut orchestrator = orchestrator();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), run(&mut orchestrator, shutdown))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_until_idle_returns_immediately_when_idle() {
        let mut orchestrator = orchestrator();
        tokio::time::timeout(
            Duration::from_secs(5),
            run_until_idle(&mut orchestrator, CancellationToken::new()),
        )
        .await
        .unwrap();
    }
}
