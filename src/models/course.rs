use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Record, SortKey};
use crate::validation::Validator;

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: i64,
    pub course: String,
    pub description: String,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

impl Course {
    pub fn validate(&self, v: &mut Validator) {
        v.required_text("course", &self.course, 25);
        v.required_text("description", &self.description, 100);
    }
}

impl Record for Course {
    const TABLE: &'static str = "courses";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, column: &str) -> SortKey<'_> {
        match column {
            "course" => SortKey::Text(&self.course),
            _ => SortKey::Int(self.id),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateCourseRequest {
    pub course: String,
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCourseRequest {
    pub course: Option<String>,
    pub description: Option<String>,
}

impl UpdateCourseRequest {
    pub fn apply(self, course: &mut Course) {
        if let Some(v) = self.course {
            course.course = v;
        }
        if let Some(v) = self.description {
            course.description = v;
        }
    }
}

/// Links a course to a posting and rank, with the credit hours it is worth.
#[derive(Debug, Clone, Serialize)]
pub struct CoursePosting {
    pub id: i64,
    pub course_id: i64,
    pub posting_id: i64,
    pub mandatory: bool,
    pub credithours: i64,
    pub rank_id: i64,
}

impl CoursePosting {
    pub fn validate(&self, v: &mut Validator) {
        v.positive_id("course_id", self.course_id);
        v.positive_id("posting_id", self.posting_id);
        v.non_negative("credithours", self.credithours);
        v.positive_id("rank_id", self.rank_id);
    }
}

impl Record for CoursePosting {
    const TABLE: &'static str = "course_postings";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, column: &str) -> SortKey<'_> {
        match column {
            "course_id" => SortKey::Int(self.course_id),
            "posting_id" => SortKey::Int(self.posting_id),
            "mandatory" => SortKey::Bool(self.mandatory),
            "credithours" => SortKey::Int(self.credithours),
            "rank_id" => SortKey::Int(self.rank_id),
            _ => SortKey::Int(self.id),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateCoursePostingRequest {
    pub course_id: i64,
    pub posting_id: i64,
    pub mandatory: bool,
    pub credithours: i64,
    pub rank_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCoursePostingRequest {
    pub course_id: Option<i64>,
    pub posting_id: Option<i64>,
    pub mandatory: Option<bool>,
    pub credithours: Option<i64>,
    pub rank_id: Option<i64>,
}

impl UpdateCoursePostingRequest {
    pub fn apply(self, posting: &mut CoursePosting) {
        if let Some(v) = self.course_id {
            posting.course_id = v;
        }
        if let Some(v) = self.posting_id {
            posting.posting_id = v;
        }
        if let Some(v) = self.mandatory {
            posting.mandatory = v;
        }
        if let Some(v) = self.credithours {
            posting.credithours = v;
        }
        if let Some(v) = self.rank_id {
            posting.rank_id = v;
        }
    }
}
