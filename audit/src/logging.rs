use async_trait::async_trait;
use owo_colors::OwoColorize;

use crate::{Error, EventEnvelope, LifecycleEvent, LifecycleEventSink};

/// Prints each event to stdout, matching this codebase's colored
/// `println!`-based output convention. Never fails — useful as a
/// development-mode default or a fallback when no external sink is
/// configured.
pub struct LoggingSink;

#[async_trait]
impl LifecycleEventSink for LoggingSink {
    async fn publish(&self, event: EventEnvelope) -> Result<(), Error> {
        let kind = match &event.event {
            LifecycleEvent::Request(_) => "Request",
            LifecycleEvent::Authorise(_) => "Authorise",
            LifecycleEvent::Start(_) => "Start",
            LifecycleEvent::Attach(_) => "Attach",
            LifecycleEvent::Terminate(_) => "Terminate",
        };
        println!(
            "{} {} {}",
            "🎭 audit".magenta(),
            format!("[{kind}]").cyan(),
            event.id.dimmed(),
        );
        Ok(())
    }
}
