//! Lifecycle notifications and the default tracing-backed sink.

use crate::chain::NotificationSink;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
	Info,
	Success,
	/// Outcome is unknown, e.g. a confirmation wait that timed out.
	Warning,
	Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
	pub kind: NotificationKind,
	pub title: String,
	pub message: String,
	pub timestamp: DateTime<Utc>,
}

impl Notification {
	pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			kind,
			title: title.into(),
			message: message.into(),
			timestamp: Utc::now(),
		}
	}

	pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
		Self::new(NotificationKind::Info, title, message)
	}

	pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
		Self::new(NotificationKind::Success, title, message)
	}

	pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
		Self::new(NotificationKind::Warning, title, message)
	}

	pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
		Self::new(NotificationKind::Error, title, message)
	}
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
	fn notify(&self, notification: Notification) {
		match notification.kind {
			NotificationKind::Info | NotificationKind::Success => {
				info!("[{}] {}", notification.title, notification.message)
			}
			NotificationKind::Warning => {
				warn!("[{}] {}", notification.title, notification.message)
			}
			NotificationKind::Error => {
				error!("[{}] {}", notification.title, notification.message)
			}
		}
	}
}
