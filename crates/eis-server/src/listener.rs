//! Notification listeners owned by a session state machine

use eis_core::EisEvent;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Receives every event the state machine emits
pub trait EventListener: Send {
    fn on_event(&mut self, event: &EisEvent);
}

impl<F> EventListener for F
where
    F: FnMut(&EisEvent) + Send,
{
    fn on_event(&mut self, event: &EisEvent) {
        self(event)
    }
}

/// Listener list of one state machine instance
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Box<dyn EventListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn emit(&mut self, event: &EisEvent) {
        for listener in &mut self.listeners {
            listener.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Renders events as log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_event(&mut self, event: &EisEvent) {
        match event {
            EisEvent::TransferStarted(e) => {
                info!(session = %e.key, id = %e.session_id, declared = e.total_samples, "transfer started")
            }
            EisEvent::SampleReceived(e) => debug!(
                row = e.sample.row_index,
                progress = format_args!("{}/{}", e.sample_number, e.total_samples),
                "sample received"
            ),
            EisEvent::TransferCompleted(e) => {
                info!(session = %e.key, accepted = e.total_samples, "transfer completed")
            }
            EisEvent::ValidationWarning(e) => warn!(
                code = e.code,
                field = e.field.unwrap_or("-"),
                row = e.sample.map(|s| s.row_index),
                "{}",
                e.message
            ),
            EisEvent::VoltageSpike(e) => warn!(
                session = %e.session.key(),
                row = e.current.row_index,
                delta_v = e.delta_v,
                direction = %e.direction,
                mode = ?e.mode,
                "voltage spike"
            ),
            EisEvent::ImpedanceJump(e) => warn!(
                session = %e.session.key(),
                row = e.current.row_index,
                delta_z = e.delta_z,
                direction = %e.direction,
                mode = ?e.mode,
                "impedance jump"
            ),
            EisEvent::OutOfBand(e) => warn!(
                session = %e.session.key(),
                row = e.sample.row_index,
                z = e.current_z,
                mean = e.running_mean,
                deviation_percent = e.deviation_percent,
                direction = %e.direction,
                mode = ?e.mode,
                "impedance out of band"
            ),
            EisEvent::VoltageSummary(s) => info!(
                session = %s.key,
                samples = s.sample_count,
                min = s.stats.min,
                max = s.stats.max,
                spikes = s.stats.deltas_over_threshold,
                "voltage summary"
            ),
            EisEvent::ImpedanceSummary(s) => info!(
                session = %s.key,
                samples = s.sample_count,
                mean = s.running_mean,
                jumps = s.stats.deltas_over_threshold,
                out_of_band = s.out_of_band_count,
                "impedance summary"
            ),
        }
    }
}

/// Republishes events on a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    sender: broadcast::Sender<EisEvent>,
}

impl BroadcastListener {
    pub fn new(sender: broadcast::Sender<EisEvent>) -> Self {
        BroadcastListener { sender }
    }
}

impl EventListener for BroadcastListener {
    fn on_event(&mut self, event: &EisEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event.clone());
    }
}
