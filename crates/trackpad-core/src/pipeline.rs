//! Client-side input pipeline: contacts in, commands out.

use std::time::Instant;

use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};

use crate::{
    command::CommandMessage,
    config::GestureConfig,
    gesture::{ContactEvent, GestureClassifier},
    scheduler::DeltaScheduler,
};

/// Outbound side of the transport.
pub trait CommandSink: Send + Sync {
    /// Hand a command to the transport. Dropped silently if it is closed.
    fn send_command(&self, command: CommandMessage);
}

impl CommandSink for mpsc::UnboundedSender<CommandMessage> {
    fn send_command(&self, command: CommandMessage) {
        let _ = self.send(command);
    }
}

/// Classifier and scheduler glued together.
#[derive(Debug, Clone)]
pub struct InputPipeline {
    classifier: GestureClassifier,
    scheduler: DeltaScheduler,
}

impl InputPipeline {
    #[must_use]
    pub fn new(config: GestureConfig) -> Self {
        let scheduler = DeltaScheduler::new(config.flush_policy);
        Self {
            classifier: GestureClassifier::new(config),
            scheduler,
        }
    }

    /// Process one contact update; discrete gestures are sent immediately.
    pub fn handle(&mut self, event: ContactEvent, sink: &impl CommandSink) {
        for gesture in self.classifier.handle(event) {
            tracing::trace!(?gesture, "gesture");
            if let Some(command) = self.scheduler.accumulate(&gesture) {
                sink.send_command(command);
            }
        }
    }

    /// One scheduler period: fire pending long-presses, then flush.
    pub fn tick(&mut self, now: Instant, sink: &impl CommandSink) {
        if let Some(gesture) = self.classifier.poll(now) {
            if let Some(command) = self.scheduler.accumulate(&gesture) {
                sink.send_command(command);
            }
        }
        if let Some(command) = self.scheduler.tick() {
            sink.send_command(command);
        }
    }

    #[must_use]
    pub const fn scheduler(&self) -> &DeltaScheduler {
        &self.scheduler
    }
}

/// Drive the pipeline until the contact stream ends.
///
/// A tick can fire between any two contact events.
pub async fn run<S: CommandSink>(
    config: GestureConfig,
    mut contacts: mpsc::Receiver<ContactEvent>,
    sink: S,
) {
    let mut ticker = time::interval(config.tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pipeline = InputPipeline::new(config);

    loop {
        tokio::select! {
            event = contacts.recv() => match event {
                Some(event) => pipeline.handle(event, &sink),
                None => break,
            },
            tick = ticker.tick() => pipeline.tick(tick.into_std(), &sink),
        }
    }

    tracing::debug!("Contact stream closed, input pipeline stopped");
}
