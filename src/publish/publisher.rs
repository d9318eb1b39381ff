use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BroadcastDownsampler, Clock, LatestValueSink, StreamSink};
use crate::device::info::DeviceInfo;
use crate::device::EventSource;
use crate::joystick::{
    DrainReport, JoystickState, JoystickStateSensorData, SensorDataHeader, SequenceCounter,
    StateAggregator, DRAIN_CAP, PUBLISH_PERIOD,
};

const STATS_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// One second of back-to-back faults at 50 Hz
const FAULT_STREAK_ALERT: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Publish task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// Counters for the periodic stats log
#[derive(Debug)]
struct CycleStats {
    cycles: u64,
    events: u64,
    faults: u64,
    deliveries: u64,
    dropped: u64,
    fault_streak: u64,
    since: Instant,
}

impl CycleStats {
    fn new() -> Self {
        Self {
            cycles: 0,
            events: 0,
            faults: 0,
            deliveries: 0,
            dropped: 0,
            fault_streak: 0,
            since: Instant::now(),
        }
    }

    fn record_drain(&mut self, report: &DrainReport) {
        self.cycles += 1;
        self.events += report.consumed as u64;

        if report.is_fault() {
            self.faults += 1;
            self.fault_streak += 1;
            if self.fault_streak == FAULT_STREAK_ALERT {
                error!(
                    "Input device has faulted on {} consecutive cycles, it may be disconnected",
                    self.fault_streak
                );
            }
        } else {
            if self.fault_streak >= FAULT_STREAK_ALERT {
                info!("Input device recovered after {} faulted cycles", self.fault_streak);
            }
            self.fault_streak = 0;
        }
    }

    fn maybe_log(&mut self) {
        let elapsed = self.since.elapsed();
        if elapsed < STATS_INTERVAL {
            return;
        }

        let seconds = elapsed.as_secs_f64();
        info!(
            "Publisher stats: {} cycles, {} events, {} faults in {:.0} seconds",
            self.cycles, self.events, self.faults, seconds
        );
        info!(
            "Average: {:.2} events/cycle, {:.2} cycles/sec, {} deliveries, {} dropped",
            self.events as f64 / self.cycles.max(1) as f64,
            self.cycles as f64 / seconds,
            self.deliveries,
            self.dropped
        );

        let streak = self.fault_streak;
        *self = Self::new();
        self.fault_streak = streak;
    }
}

// State touched by each publish cycle, guarded by a single lock
struct PublishCore {
    source: Box<dyn EventSource>,
    aggregator: StateAggregator,
    sequence: SequenceCounter,
    stats: CycleStats,
}

/// Fixed-rate publisher for one device session
///
/// Owns the event source, the aggregator and the sequence counter. A cycle
/// (drain, snapshot, stamp, deliver) runs entirely under one lock, so cycles never
/// interleave and diagnostic readers never see a half-applied batch. The
/// downsampler has its own locks and is shared with the subscriber management side.
pub struct JoystickPublisher {
    core: Mutex<PublishCore>,
    device_info: Arc<DeviceInfo>,
    downsampler: Arc<BroadcastDownsampler>,
    latest: Arc<dyn LatestValueSink>,
    stream: Arc<dyn StreamSink>,
    clock: Arc<dyn Clock>,
}

impl JoystickPublisher {
    pub fn new(
        source: Box<dyn EventSource>,
        device_info: Arc<DeviceInfo>,
        downsampler: Arc<BroadcastDownsampler>,
        latest: Arc<dyn LatestValueSink>,
        stream: Arc<dyn StreamSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!("Creating publisher for '{}'", device_info.name);
        Self {
            core: Mutex::new(PublishCore {
                source,
                aggregator: StateAggregator::new(),
                sequence: SequenceCounter::new(),
                stats: CycleStats::new(),
            }),
            device_info,
            downsampler,
            latest,
            stream,
            clock,
        }
    }

    /// Run one publish cycle and return the packet it produced.
    pub async fn publish_cycle(&self) -> JoystickStateSensorData {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        let report = core
            .aggregator
            .drain_and_update(core.source.as_mut(), DRAIN_CAP);
        core.stats.record_drain(&report);

        let state = core.aggregator.snapshot();
        let sequence_number = core.sequence.next();
        let packet = JoystickStateSensorData {
            header: SensorDataHeader {
                device_info: self.device_info.clone(),
                sequence_number,
                capture_timestamp: self.clock.now(),
            },
            state,
        };
        debug!(
            "Cycle {}: {} events ({:?}), axes {:?}, buttons {:?}",
            sequence_number,
            report.consumed,
            report.outcome,
            packet.state.axes,
            packet.state.buttons
        );

        self.latest.set_latest_value(packet.clone());

        for subscriber in self.downsampler.subscribers() {
            if !self.downsampler.should_deliver(subscriber) {
                continue;
            }
            match self.stream.send_packet(subscriber, packet.clone()) {
                Ok(()) => core.stats.deliveries += 1,
                Err(e) => {
                    debug!("Dropped packet {} for {}: {}", sequence_number, subscriber, e);
                    core.stats.dropped += 1;
                }
            }
        }

        core.stats.maybe_log();
        packet
    }

    /// Current state, read under the cycle lock
    pub async fn snapshot(&self) -> JoystickState {
        self.core.lock().await.aggregator.snapshot()
    }

    pub fn device_info(&self) -> &Arc<DeviceInfo> {
        &self.device_info
    }

    pub fn downsampler(&self) -> &Arc<BroadcastDownsampler> {
        &self.downsampler
    }

    /// Start the 50 Hz ticker on the current runtime.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> PublisherHandle {
        info!(
            "Spawning publisher task with {} ms period",
            PUBLISH_PERIOD.as_millis()
        );
        let task = tokio::spawn(run_publish_loop(self, cancel.clone()));
        PublisherHandle { cancel, task }
    }
}

/// Running ticker task
pub struct PublisherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PublisherHandle {
    /// Stop the ticker and wait for the in-flight cycle to finish.
    pub async fn shutdown(self) -> Result<(), PublisherError> {
        info!("Stopping publisher task");
        self.cancel.cancel();
        self.task.await?;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// Single task, so a cycle can only start once the previous one has returned.
// Late ticks are delayed instead of fired in a burst.
async fn run_publish_loop(publisher: Arc<JoystickPublisher>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(PUBLISH_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Entering publish loop");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Publish loop cancelled");
                break;
            }
            _ = interval.tick() => {
                let started = Instant::now();
                publisher.publish_cycle().await;
                let took = started.elapsed();
                if took > PUBLISH_PERIOD {
                    warn!(
                        "Publish cycle took {} ms, longer than the {} ms period",
                        took.as_millis(),
                        PUBLISH_PERIOD.as_millis()
                    );
                }
            }
        }
    }
}
