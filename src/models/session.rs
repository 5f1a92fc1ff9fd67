//! Training sessions, trainee enrollment and attendance.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Record, SortKey};
use crate::validation::Validator;

// =============================================================================
// Session
// =============================================================================

/// One delivery of a course by a facilitator at a formation.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: i64,
    pub course_id: i64,
    pub formation_id: i64,
    pub facilitator_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn validate(&self, v: &mut Validator) {
        v.positive_id("course_id", self.course_id);
        v.positive_id("formation_id", self.formation_id);
        v.positive_id("facilitator_id", self.facilitator_id);
    }
}

impl Record for Session {
    const TABLE: &'static str = "sessions";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, _column: &str) -> SortKey<'_> {
        SortKey::Int(self.id)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub course_id: i64,
    pub formation_id: i64,
    pub facilitator_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSessionRequest {
    pub course_id: Option<i64>,
    pub formation_id: Option<i64>,
    pub facilitator_id: Option<i64>,
}

impl UpdateSessionRequest {
    pub fn apply(self, session: &mut Session) {
        if let Some(v) = self.course_id {
            session.course_id = v;
        }
        if let Some(v) = self.formation_id {
            session.formation_id = v;
        }
        if let Some(v) = self.facilitator_id {
            session.facilitator_id = v;
        }
    }
}

// =============================================================================
// UserSession
// =============================================================================

/// A trainee's enrollment in a session and its outcome.
///
/// Updates are optimistic: the version read is checked on write.
#[derive(Debug, Clone, Serialize)]
pub struct UserSession {
    pub id: i64,
    pub trainee_id: i64,
    pub session_id: i64,
    pub credithours_completed: i64,
    pub grade: String,
    pub feedback: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl UserSession {
    pub fn validate(&self, v: &mut Validator) {
        v.positive_id("trainee_id", self.trainee_id);
        v.positive_id("session_id", self.session_id);
        v.non_negative("credithours_completed", self.credithours_completed);
        v.required_text("grade", &self.grade, 25);
        v.required_text("feedback", &self.feedback, 255);
    }
}

impl Record for UserSession {
    const TABLE: &'static str = "user_sessions";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, column: &str) -> SortKey<'_> {
        match column {
            "trainee_id" => SortKey::Int(self.trainee_id),
            "session_id" => SortKey::Int(self.session_id),
            "grade" => SortKey::Text(&self.grade),
            _ => SortKey::Int(self.id),
        }
    }

    fn version(&self) -> Option<i32> {
        Some(self.version)
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateUserSessionRequest {
    pub trainee_id: i64,
    pub session_id: i64,
    pub credithours_completed: i64,
    pub grade: String,
    pub feedback: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserSessionRequest {
    pub trainee_id: Option<i64>,
    pub session_id: Option<i64>,
    pub credithours_completed: Option<i64>,
    pub grade: Option<String>,
    pub feedback: Option<String>,
}

impl UpdateUserSessionRequest {
    pub fn apply(self, record: &mut UserSession) {
        if let Some(v) = self.trainee_id {
            record.trainee_id = v;
        }
        if let Some(v) = self.session_id {
            record.session_id = v;
        }
        if let Some(v) = self.credithours_completed {
            record.credithours_completed = v;
        }
        if let Some(v) = self.grade {
            record.grade = v;
        }
        if let Some(v) = self.feedback {
            record.feedback = v;
        }
    }
}

// =============================================================================
// Attendance
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Attendance {
    pub id: i64,
    pub user_session_id: i64,
    pub attendance: bool,
    /// Calendar day, rendered as `YYYY-MM-DD`.
    pub date: NaiveDate,
}

impl Record for Attendance {
    const TABLE: &'static str = "attendance";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, _column: &str) -> SortKey<'_> {
        SortKey::Int(self.id)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateAttendanceRequest {
    pub user_session_id: i64,
    pub attendance: bool,
    pub date: Option<NaiveDate>,
}

impl CreateAttendanceRequest {
    pub fn validate(&self, v: &mut Validator) {
        v.positive_id("user_session_id", self.user_session_id);
        v.check(self.date.is_some(), "date", "must be provided");
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAttendanceRequest {
    pub user_session_id: Option<i64>,
    pub attendance: Option<bool>,
    pub date: Option<NaiveDate>,
}

impl UpdateAttendanceRequest {
    pub fn apply(self, record: &mut Attendance) {
        if let Some(v) = self.user_session_id {
            record.user_session_id = v;
        }
        if let Some(v) = self.attendance {
            record.attendance = v;
        }
        if let Some(v) = self.date {
            record.date = v;
        }
    }
}
