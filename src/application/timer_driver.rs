use crate::domain::models::TimerMode;
use crate::domain::timer::{TimerEngine, TimerEvent, TimerState};
use crate::infrastructure::error::InfraError;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Repeating callback on the tokio runtime.
///
/// At most one task is live: scheduling again cancels the previous task, and
/// dropping the scheduler cancels it too.
#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            handle: None,
        }
    }

    /// Returns `false` when called outside a tokio runtime.
    pub fn schedule<F>(&mut self, mut on_tick: F) -> bool
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        self.cancel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available; repeating callback not scheduled");
            return false;
        };

        let period = self.period;
        self.handle = Some(runtime.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                if on_tick().is_break() {
                    break;
                }
            }
        }));
        true
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A natural zero-crossing tagged with the schedule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub generation: u64,
    pub event: TimerEvent,
}

/// Couples a [`TimerEngine`] to a one-second [`TickScheduler`].
///
/// Natural zero-crossings are delivered on the event channel; `skip` returns
/// its event synchronously instead.
#[derive(Debug)]
pub struct TimerDriver {
    engine: Arc<Mutex<TimerEngine>>,
    generation: Arc<AtomicU64>,
    scheduler: TickScheduler,
    events: UnboundedSender<ScheduledEvent>,
}

impl TimerDriver {
    pub fn new(engine: TimerEngine, period: Duration) -> (Self, UnboundedReceiver<ScheduledEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let driver = Self {
            engine: Arc::new(Mutex::new(engine)),
            generation: Arc::new(AtomicU64::new(0)),
            scheduler: TickScheduler::new(period),
            events,
        };
        (driver, receiver)
    }

    pub fn state(&self) -> Result<TimerState, InfraError> {
        Ok(self.lock_engine()?.state())
    }

    pub fn next_break_mode(&self) -> Result<TimerMode, InfraError> {
        Ok(self.lock_engine()?.next_break_mode())
    }

    pub fn is_ticking(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Whether no start, stop or mode change happened since `generation` was scheduled.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Starts the countdown; returns `false` when it was already running or at zero.
    pub fn start(&mut self) -> Result<bool, InfraError> {
        let mut engine = lock(&self.engine)?;
        if !engine.start() {
            return Ok(false);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        drop(engine);

        let engine = Arc::clone(&self.engine);
        let current = Arc::clone(&self.generation);
        let events = self.events.clone();
        let scheduled = self.scheduler.schedule(move || {
            let Ok(mut engine) = engine.lock() else {
                return ControlFlow::Break(());
            };
            if current.load(Ordering::SeqCst) != generation {
                return ControlFlow::Break(());
            }
            if let Some(event) = engine.tick() {
                if events.send(ScheduledEvent { generation, event }).is_err() {
                    debug!("timer event receiver dropped");
                }
            }
            if engine.is_running() {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        });
        if !scheduled {
            self.lock_engine()?.pause();
            return Ok(false);
        }
        Ok(true)
    }

    pub fn pause(&mut self) -> Result<(), InfraError> {
        self.stop_with(|engine| engine.pause())
    }

    pub fn reset(&mut self) -> Result<(), InfraError> {
        self.stop_with(|engine| engine.reset())
    }

    pub fn switch_mode(&mut self, mode: TimerMode) -> Result<(), InfraError> {
        self.stop_with(|engine| engine.switch_mode(mode))
    }

    pub fn skip(&mut self) -> Result<TimerEvent, InfraError> {
        let mut event = None;
        self.stop_with(|engine| event = Some(engine.skip()))?;
        event.ok_or_else(|| InfraError::InvalidState("skip produced no event".to_string()))
    }

    fn stop_with(&mut self, action: impl FnOnce(&mut TimerEngine)) -> Result<(), InfraError> {
        {
            let mut engine = lock(&self.engine)?;
            action(&mut *engine);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.scheduler.cancel();
        Ok(())
    }

    fn lock_engine(&self) -> Result<MutexGuard<'_, TimerEngine>, InfraError> {
        lock(&self.engine)
    }
}

fn lock(engine: &Mutex<TimerEngine>) -> Result<MutexGuard<'_, TimerEngine>, InfraError> {
    engine
        .lock()
        .map_err(|error| InfraError::poisoned("timer engine", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timer::TimerDurations;
    use std::sync::atomic::AtomicUsize;

    fn short_durations() -> TimerDurations {
        TimerDurations {
            work_seconds: 3,
            short_break_seconds: 2,
            long_break_seconds: 4,
            sessions_until_long_break: 4,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_replaces_previous_task() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TickScheduler::new(Duration::from_secs(1));

        let counter = Arc::clone(&first);
        scheduler.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let counter = Arc::clone(&second);
        scheduler.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 3);

        scheduler.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(second.load(Ordering::SeqCst), 3);
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn driver_counts_down_and_emits_one_completion() {
        let (mut driver, mut events) =
            TimerDriver::new(TimerEngine::new(short_durations()), TICK_PERIOD);
        assert!(driver.start().expect("start"));
        assert!(!driver.start().expect("second start is a no-op"));

        let scheduled = events.recv().await.expect("completion event");
        assert_eq!(scheduled.event, TimerEvent::WorkCompleted { session_count: 1 });
        assert!(driver.is_current(scheduled.generation));

        let state = driver.state().expect("state");
        assert_eq!(state.time_remaining, 0);
        assert!(!state.is_running);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(events.try_recv().is_err());
        assert!(!driver.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_cancels_ticks_and_preserves_time() {
        let (mut driver, mut events) =
            TimerDriver::new(TimerEngine::default(), TICK_PERIOD);
        driver.start().expect("start");
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        driver.pause().expect("pause");
        assert_eq!(driver.state().expect("state").time_remaining, 1490);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(driver.state().expect("state").time_remaining, 1490);
        assert!(events.try_recv().is_err());

        driver.start().expect("resume");
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(driver.state().expect("state").time_remaining, 1485);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_returns_event_synchronously_and_stops_ticking() {
        let (mut driver, mut events) =
            TimerDriver::new(TimerEngine::new(short_durations()), TICK_PERIOD);
        driver.start().expect("start");
        let event = driver.skip().expect("skip");
        assert_eq!(event, TimerEvent::WorkCompleted { session_count: 1 });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(driver.state().expect("state").session_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mode_change_makes_queued_completion_stale() {
        let (mut driver, mut events) =
            TimerDriver::new(TimerEngine::new(short_durations()), TICK_PERIOD);
        driver.start().expect("start");
        let scheduled = events.recv().await.expect("completion event");

        driver.switch_mode(TimerMode::Work).expect("switch");
        assert!(!driver.is_current(scheduled.generation));
        driver.start().expect("restart");
        assert!(!driver.is_current(scheduled.generation));
    }

    #[test]
    fn start_outside_runtime_leaves_engine_stopped() {
        let (mut driver, _events) = TimerDriver::new(TimerEngine::default(), TICK_PERIOD);
        assert!(!driver.start().expect("start"));
        assert!(!driver.state().expect("state").is_running);
    }
}
