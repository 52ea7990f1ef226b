//! Scheduler management UI panel types and state.
//!
//! Provides types for managing the scheduler UI panel, including editing
//! tasks, form validation, and state management.

use crate::scheduler::tasks::{
    Schedule, ScheduledTask, TaskKind, TaskRunOutcome, TaskRunRecord, Weekday,
};
use serde::{Deserialize, Serialize};

/// State for the scheduler management panel.
#[derive(Debug, Clone, Default)]
pub struct SchedulerPanelState {
    /// Currently selected task ID for viewing/editing.
    pub selected_task_id: Option<String>,
    /// Task currently being edited (if any).
    pub editing_task: Option<EditingTask>,
    /// Whether execution history view is visible.
    pub showing_history: bool,
    /// Error message to display (if any).
    pub error_message: Option<String>,
}

/// Task being created or edited in the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct EditingTask {
    /// Task ID (None for new tasks, Some for existing).
    pub id: Option<String>,
    /// Task name (user-visible).
    pub name: String,
    /// Schedule configuration (form representation).
    pub schedule: ScheduleForm,
    /// Whether task is enabled.
    pub enabled: bool,
    /// Optional JSON payload (as string for editing).
    pub payload: Option<String>,
}

/// Form representation of schedule (uses Strings for user input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleForm {
    /// Interval schedule with seconds as string.
    Interval {
        /// Seconds between runs (as string for editing).
        secs: String,
    },
    /// Daily schedule with hour and minute as strings.
    Daily {
        /// Hour (0-23, as string for editing).
        hour: String,
        /// Minute (0-59, as string for editing).
        min: String,
    },
    /// Weekly schedule with weekdays and time as strings.
    Weekly {
        /// Selected weekdays (as short strings: "mon", "tue", etc.).
        weekdays: Vec<String>,
        /// Hour (0-23, as string for editing).
        hour: String,
        /// Minute (0-59, as string for editing).
        min: String,
    },
}

impl Default for ScheduleForm {
    fn default() -> Self {
        Self::Interval {
            secs: "3600".to_owned(),
        }
    }
}

/// Validation error for editing task forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Task name is empty or whitespace only.
    NameEmpty,
    /// Interval seconds is not a valid positive integer.
    IntervalSecsInvalid,
    /// Daily hour is not a valid integer 0-23.
    DailyHourInvalid,
    /// Daily minute is not a valid integer 0-59.
    DailyMinuteInvalid,
    /// Weekly hour is not a valid integer 0-23.
    WeeklyHourInvalid,
    /// Weekly minute is not a valid integer 0-59.
    WeeklyMinuteInvalid,
    /// Weekly weekdays list is empty.
    WeeklyWeekdaysEmpty,
    /// Weekly weekdays contains invalid values.
    WeeklyWeekdaysInvalid,
    /// Payload is not valid JSON (when present).
    PayloadInvalidJson,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameEmpty => write!(f, "Task name cannot be empty"),
            Self::IntervalSecsInvalid => write!(f, "Interval must be a positive number of seconds"),
            Self::DailyHourInvalid => write!(f, "Hour must be a number between 0 and 23"),
            Self::DailyMinuteInvalid => write!(f, "Minute must be a number between 0 and 59"),
            Self::WeeklyHourInvalid => write!(f, "Hour must be a number between 0 and 23"),
            Self::WeeklyMinuteInvalid => write!(f, "Minute must be a number between 0 and 59"),
            Self::WeeklyWeekdaysEmpty => write!(f, "At least one weekday must be selected"),
            Self::WeeklyWeekdaysInvalid => {
                write!(f, "Invalid weekday (use mon, tue, wed, thu, fri, sat, sun)")
            }
            Self::PayloadInvalidJson => write!(f, "Payload must be valid JSON"),
        }
    }
}

impl EditingTask {
    /// Create a new empty editing task with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: None,
            name: String::new(),
            schedule: ScheduleForm::default(),
            enabled: true,
            payload: None,
        }
    }

    /// Create an editing task from an existing scheduled task.
    #[must_use]
    pub fn from_scheduled_task(task: &ScheduledTask) -> Self {
        let schedule = match &task.schedule {
            Schedule::Interval { secs } => ScheduleForm::Interval {
                secs: secs.to_string(),
            },
            Schedule::Daily { hour, min } => ScheduleForm::Daily {
                hour: hour.to_string(),
                min: min.to_string(),
            },
            Schedule::Weekly {
                weekdays,
                hour,
                min,
            } => ScheduleForm::Weekly {
                weekdays: weekdays.iter().map(weekday_to_short).collect(),
                hour: hour.to_string(),
                min: min.to_string(),
            },
        };

        let payload = task
            .payload
            .as_ref()
            .map(|v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()));

        Self {
            id: Some(task.id.clone()),
            name: task.name.clone(),
            schedule,
            enabled: task.enabled,
            payload,
        }
    }

    /// Convert editing task to a scheduled task for persistence.
    ///
    /// # Errors
    /// Returns validation error if form values are invalid.
    pub fn to_scheduled_task(&self) -> Result<ScheduledTask, ValidationError> {
        self.validate()?;

        let schedule = match &self.schedule {
            ScheduleForm::Interval { secs } => {
                let secs_val = secs
                    .parse::<u64>()
                    .map_err(|_| ValidationError::IntervalSecsInvalid)?;
                if secs_val == 0 {
                    return Err(ValidationError::IntervalSecsInvalid);
                }
                Schedule::Interval { secs: secs_val }
            }
            ScheduleForm::Daily { hour, min } => {
                let hour_val = hour
                    .parse::<u8>()
                    .map_err(|_| ValidationError::DailyHourInvalid)?;
                let min_val = min
                    .parse::<u8>()
                    .map_err(|_| ValidationError::DailyMinuteInvalid)?;
                if hour_val > 23 {
                    return Err(ValidationError::DailyHourInvalid);
                }
                if min_val > 59 {
                    return Err(ValidationError::DailyMinuteInvalid);
                }
                Schedule::Daily {
                    hour: hour_val,
                    min: min_val,
                }
            }
            ScheduleForm::Weekly {
                weekdays,
                hour,
                min,
            } => {
                if weekdays.is_empty() {
                    return Err(ValidationError::WeeklyWeekdaysEmpty);
                }
                let weekdays_parsed: Result<Vec<Weekday>, _> =
                    weekdays.iter().map(|s| weekday_from_short(s)).collect();
                let weekdays_val =
                    weekdays_parsed.map_err(|_| ValidationError::WeeklyWeekdaysInvalid)?;

                let hour_val = hour
                    .parse::<u8>()
                    .map_err(|_| ValidationError::WeeklyHourInvalid)?;
                let min_val = min
                    .parse::<u8>()
                    .map_err(|_| ValidationError::WeeklyMinuteInvalid)?;
                if hour_val > 23 {
                    return Err(ValidationError::WeeklyHourInvalid);
                }
                if min_val > 59 {
                    return Err(ValidationError::WeeklyMinuteInvalid);
                }
                Schedule::Weekly {
                    weekdays: weekdays_val,
                    hour: hour_val,
                    min: min_val,
                }
            }
        };

        let payload_json = if let Some(ref payload_str) = self.payload {
            let trimmed = payload_str.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(
                    serde_json::from_str(trimmed)
                        .map_err(|_| ValidationError::PayloadInvalidJson)?,
                )
            }
        } else {
            None
        };

        let id = self
            .id
            .clone()
            .unwrap_or_else(|| slug_from_name(&self.name));

        Ok(ScheduledTask {
            id,
            name: self.name.clone(),
            schedule,
            last_run: None,
            next_run: None,
            enabled: self.enabled,
            kind: TaskKind::User,
            payload: payload_json,
            failure_streak: 0,
            max_retries: 3,
            retry_backoff_secs: 60,
            max_failure_streak_before_pause: 5,
            soft_timeout_secs: 300,
            last_error: None,
        })
    }

    /// Validate the editing task form.
    ///
    /// # Errors
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::NameEmpty);
        }

        match &self.schedule {
            ScheduleForm::Interval { secs } => {
                let secs_val = secs
                    .parse::<u64>()
                    .map_err(|_| ValidationError::IntervalSecsInvalid)?;
                if secs_val == 0 {
                    return Err(ValidationError::IntervalSecsInvalid);
                }
            }
            ScheduleForm::Daily { hour, min } => {
                let hour_val = hour
                    .parse::<u8>()
                    .map_err(|_| ValidationError::DailyHourInvalid)?;
                let min_val = min
                    .parse::<u8>()
                    .map_err(|_| ValidationError::DailyMinuteInvalid)?;
                if hour_val > 23 {
                    return Err(ValidationError::DailyHourInvalid);
                }
                if min_val > 59 {
                    return Err(ValidationError::DailyMinuteInvalid);
                }
            }
            ScheduleForm::Weekly {
                weekdays,
                hour,
                min,
            } => {
                if weekdays.is_empty() {
                    return Err(ValidationError::WeeklyWeekdaysEmpty);
                }
                for wd in weekdays {
                    weekday_from_short(wd).map_err(|_| ValidationError::WeeklyWeekdaysInvalid)?;
                }
                let hour_val = hour
                    .parse::<u8>()
                    .map_err(|_| ValidationError::WeeklyHourInvalid)?;
                let min_val = min
                    .parse::<u8>()
                    .map_err(|_| ValidationError::WeeklyMinuteInvalid)?;
                if hour_val > 23 {
                    return Err(ValidationError::WeeklyHourInvalid);
                }
                if min_val > 59 {
                    return Err(ValidationError::WeeklyMinuteInvalid);
                }
            }
        }

        if let Some(ref payload_str) = self.payload {
            let trimmed = payload_str.trim();
            if !trimmed.is_empty() {
                serde_json::from_str::<serde_json::Value>(trimmed)
                    .map_err(|_| ValidationError::PayloadInvalidJson)?;
            }
        }

        Ok(())
    }
}

impl Default for EditingTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert weekday enum to short string representation.
fn weekday_to_short(wd: &Weekday) -> String {
    match wd {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
    .to_owned()
}

/// Convert short string to weekday enum.
///
/// # Errors
/// Returns error if string is not a valid weekday.
fn weekday_from_short(s: &str) -> Result<Weekday, ()> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        _ => Err(()),
    }
}

/// Generate a slug ID from a task name.
fn slug_from_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_owned()
}

/// Task list view component — displays all scheduled tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskListView {
    /// Tasks to display.
    pub tasks: Vec<ScheduledTask>,
    /// Currently selected task ID.
    pub selected_id: Option<String>,
}

impl TaskListView {
    /// Create a new task list view.
    #[must_use]
    pub fn new(tasks: Vec<ScheduledTask>) -> Self {
        Self {
            tasks,
            selected_id: None,
        }
    }

    /// Set the selected task ID.
    pub fn set_selected(&mut self, task_id: Option<String>) {
        self.selected_id = task_id;
    }

    /// Get the currently selected task.
    #[must_use]
    pub fn selected_task(&self) -> Option<&ScheduledTask> {
        let id = self.selected_id.as_ref()?;
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Format a task for display in the list.
    #[must_use]
    pub fn format_task(&self, task: &ScheduledTask) -> String {
        let status = if task.enabled { "●" } else { "○" };
        let schedule = format_schedule(&task.schedule);
        let last_run = task
            .last_run
            .map(format_timestamp)
            .unwrap_or_else(|| "Never".to_owned());

        format!(
            "{} {} | {} | Last: {}",
            status, task.name, schedule, last_run
        )
    }
}

/// Format a schedule for human-readable display.
#[must_use]
pub fn format_schedule(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Interval { secs } => {
            if secs % 86400 == 0 {
                format!("Every {} day(s)", secs / 86400)
            } else if secs % 3600 == 0 {
                format!("Every {} hour(s)", secs / 3600)
            } else if secs % 60 == 0 {
                format!("Every {} minute(s)", secs / 60)
            } else {
                format!("Every {} second(s)", secs)
            }
        }
        Schedule::Daily { hour, min } => {
            format!("Daily at {:02}:{:02}", hour, min)
        }
        Schedule::Weekly {
            weekdays,
            hour,
            min,
        } => {
            let days: Vec<String> = weekdays.iter().map(weekday_to_short).collect();
            format!("Weekly on {} at {:02}:{:02}", days.join(", "), hour, min)
        }
    }
}

/// Format a timestamp for human-readable display.
#[must_use]
pub fn format_timestamp(timestamp: u64) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let elapsed = now.saturating_sub(timestamp);

    if elapsed < 60 {
        "Just now".to_owned()
    } else if elapsed < 3600 {
        format!("{} minute(s) ago", elapsed / 60)
    } else if elapsed < 86400 {
        format!("{} hour(s) ago", elapsed / 3600)
    } else if elapsed < 604800 {
        format!("{} day(s) ago", elapsed / 86400)
    } else {
        // For older timestamps, show date
        use chrono::{DateTime, Utc};
        let dt: DateTime<Utc> = DateTime::from_timestamp(timestamp as i64, 0)
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap_or_default());
        dt.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Task edit form component — for creating or editing scheduled tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskEditForm {
    /// The task being edited.
    pub editing_task: EditingTask,
    /// Validation errors (if any).
    pub validation_errors: Vec<ValidationError>,
}

impl TaskEditForm {
    /// Create a new form for creating a task.
    #[must_use]
    pub fn new() -> Self {
        Self {
            editing_task: EditingTask::new(),
            validation_errors: Vec::new(),
        }
    }

    /// Create a form for editing an existing task.
    #[must_use]
    pub fn from_task(task: &ScheduledTask) -> Self {
        Self {
            editing_task: EditingTask::from_scheduled_task(task),
            validation_errors: Vec::new(),
        }
    }

    /// Validate the current form state.
    ///
    /// Returns true if valid, false if errors exist.
    /// Updates `validation_errors` field.
    pub fn validate(&mut self) -> bool {
        self.validation_errors.clear();
        match self.editing_task.validate() {
            Ok(()) => true,
            Err(e) => {
                self.validation_errors.push(e);
                false
            }
        }
    }

    /// Save the task (convert to ScheduledTask).
    ///
    /// # Errors
    /// Returns validation error if form is invalid.
    pub fn save(&self) -> Result<ScheduledTask, ValidationError> {
        self.editing_task.to_scheduled_task()
    }

    /// Update the task name field.
    pub fn set_name(&mut self, name: String) {
        self.editing_task.name = name;
    }

    /// Update the enabled field.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.editing_task.enabled = enabled;
    }

    /// Update the payload field.
    pub fn set_payload(&mut self, payload: Option<String>) {
        self.editing_task.payload = payload;
    }

    /// Update the schedule to Interval.
    pub fn set_schedule_interval(&mut self, secs: String) {
        self.editing_task.schedule = ScheduleForm::Interval { secs };
    }

    /// Update the schedule to Daily.
    pub fn set_schedule_daily(&mut self, hour: String, min: String) {
        self.editing_task.schedule = ScheduleForm::Daily { hour, min };
    }

    /// Update the schedule to Weekly.
    pub fn set_schedule_weekly(&mut self, weekdays: Vec<String>, hour: String, min: String) {
        self.editing_task.schedule = ScheduleForm::Weekly {
            weekdays,
            hour,
            min,
        };
    }
}

/// Execution history viewer component — displays task run records.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistoryView {
    /// Task run records to display.
    pub records: Vec<TaskRunRecord>,
    /// Filter by task ID (None = show all tasks).
    pub filter_task_id: Option<String>,
}

impl ExecutionHistoryView {
    /// Create a new execution history view with all records.
    #[must_use]
    pub fn new(records: Vec<TaskRunRecord>) -> Self {
        Self {
            records,
            filter_task_id: None,
        }
    }

    /// Create a view filtered to a specific task.
    #[must_use]
    pub fn for_task(records: Vec<TaskRunRecord>, task_id: String) -> Self {
        Self {
            records,
            filter_task_id: Some(task_id),
        }
    }

    /// Get filtered records based on current filter.
    #[must_use]
    pub fn filtered_records(&self) -> Vec<&TaskRunRecord> {
        match &self.filter_task_id {
            None => self.records.iter().collect(),
            Some(id) => self.records.iter().filter(|r| &r.task_id == id).collect(),
        }
    }

    /// Format a single record for display.
    #[must_use]
    pub fn format_record(&self, record: &TaskRunRecord) -> String {
        let outcome_symbol = format_outcome(&record.outcome);
        let started = format_timestamp(record.started_at);
        let duration = record.finished_at.saturating_sub(record.started_at);
        let duration_str = format_duration(duration);

        format!(
            "{} {} | {} | {} | {}",
            outcome_symbol, record.task_id, started, duration_str, record.summary
        )
    }
}

/// Format a task run outcome as a symbol.
#[must_use]
pub fn format_outcome(outcome: &TaskRunOutcome) -> &str {
    match outcome {
        TaskRunOutcome::Success => "✓",
        TaskRunOutcome::Telemetry => "ⓘ",
        TaskRunOutcome::NeedsUserAction => "⚠",
        TaskRunOutcome::Error => "✗",
        TaskRunOutcome::SoftTimeout => "⏱",
    }
}

/// Format a duration in seconds as human-readable string.
#[must_use]
pub fn format_duration(secs: u64) -> String {
    if secs < 1 {
        "< 1s".to_owned()
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
