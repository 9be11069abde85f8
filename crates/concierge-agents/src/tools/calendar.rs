//! Calendar, todo, and reminder access for the scheduler handler.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use concierge_types::error::BackendError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CalendarEvent {
    /// Half-open overlap test: touching boundaries do not conflict.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// Calendar operations the scheduler depends on.
pub trait CalendarBackend: Send + Sync {
    fn events_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, BackendError>> + Send;

    /// Existing events that overlap the candidate slot.
    fn check_conflicts(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, BackendError>> + Send;

    /// Returns the created event's id.
    fn create_event(
        &self,
        user_id: &str,
        event: CalendarEvent,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn create_todo(
        &self,
        user_id: &str,
        task: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn set_reminder(
        &self,
        user_id: &str,
        message: &str,
        remind_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}

impl<C: CalendarBackend> CalendarBackend for Arc<C> {
    fn events_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, BackendError>> + Send {
        (**self).events_between(user_id, start, end)
    }

    fn check_conflicts(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, BackendError>> + Send {
        (**self).check_conflicts(user_id, start, end)
    }

    fn create_event(
        &self,
        user_id: &str,
        event: CalendarEvent,
    ) -> impl Future<Output = Result<String, BackendError>> + Send {
        (**self).create_event(user_id, event)
    }

    fn create_todo(
        &self,
        user_id: &str,
        task: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send {
        (**self).create_todo(user_id, task)
    }

    fn set_reminder(
        &self,
        user_id: &str,
        message: &str,
        remind_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<String, BackendError>> + Send {
        (**self).set_reminder(user_id, message, remind_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub task: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub message: String,
    pub remind_at: DateTime<Utc>,
}

/// Calendar held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: DashMap<String, Vec<CalendarEvent>>,
    todos: DashMap<String, Vec<TodoItem>>,
    reminders: DashMap<String, Vec<Reminder>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A calendar pre-loaded with one weekly sync meeting.
    pub fn with_sample_events(user_id: &str, meeting_start: DateTime<Utc>) -> Self {
        let calendar = Self::new();
        calendar.add_event(
            user_id,
            CalendarEvent {
                id: "event_001".to_string(),
                title: "Team Meeting".to_string(),
                start: meeting_start,
                end: meeting_start + chrono::Duration::hours(1),
                location: Some("Zoom".to_string()),
                attendees: vec!["team@example.com".to_string()],
                description: Some("Weekly sync".to_string()),
            },
        );
        calendar
    }

    pub fn add_event(&self, user_id: &str, event: CalendarEvent) {
        self.events.entry(user_id.to_string()).or_default().push(event);
    }

    pub fn todos(&self, user_id: &str) -> Vec<TodoItem> {
        self.todos
            .get(user_id)
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    pub fn reminders(&self, user_id: &str) -> Vec<Reminder> {
        self.reminders
            .get(user_id)
            .map(|items| items.clone())
            .unwrap_or_default()
    }
}

impl CalendarBackend for InMemoryCalendar {
    async fn events_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, BackendError> {
        Ok(self
            .events
            .get(user_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.overlaps(start, end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn check_conflicts(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, BackendError> {
        self.events_between(user_id, start, end).await
    }

    async fn create_event(
        &self,
        user_id: &str,
        event: CalendarEvent,
    ) -> Result<String, BackendError> {
        if event.end <= event.start {
            return Err(BackendError::InvalidPayload(
                "event ends before it starts".to_string(),
            ));
        }
        let id = event.id.clone();
        self.add_event(user_id, event);
        Ok(id)
    }

    async fn create_todo(&self, user_id: &str, task: &str) -> Result<String, BackendError> {
        let id = Uuid::now_v7().to_string();
        self.todos.entry(user_id.to_string()).or_default().push(TodoItem {
            id: id.clone(),
            task: task.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn set_reminder(
        &self,
        user_id: &str,
        message: &str,
        remind_at: DateTime<Utc>,
    ) -> Result<String, BackendError> {
        let id = Uuid::now_v7().to_string();
        self.reminders
            .entry(user_id.to_string())
            .or_default()
            .push(Reminder {
                id: id.clone(),
                message: message.to_string(),
                remind_at,
            });
        Ok(id)
    }
}
