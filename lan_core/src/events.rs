//! Outbound events towards the presentation layer.

use std::fmt;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use crate::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

/// One timestamped line for the operator log.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamp = self.at.format("%Y-%m-%d %H:%M:%S");
        match self.level {
            LogLevel::Info => write!(f, "[{}] {}", stamp, self.message),
            LogLevel::Error => write!(f, "[{}] [Error] {}", stamp, self.message),
        }
    }
}

/// Cloneable handle every task uses to reach the UI.
///
/// Log lines are mirrored to `tracing` and then queued on the event channel.
/// A closed channel is ignored: the core keeps running without a UI.
#[derive(Debug, Clone)]
pub struct EventReporter {
    event_tx: mpsc::Sender<AppEvent>,
}

impl EventReporter {
    pub fn new(event_tx: mpsc::Sender<AppEvent>) -> Self {
        Self { event_tx }
    }

    pub async fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.emit(AppEvent::Log(LogLine::new(LogLevel::Info, message)))
            .await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.emit(AppEvent::Log(LogLine::new(LogLevel::Error, message)))
            .await;
    }

    pub async fn emit(&self, event: AppEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Queue an event without waiting; dropped when the channel is full.
    pub fn emit_now(&self, event: AppEvent) {
        let _ = self.event_tx.try_send(event);
    }
}
