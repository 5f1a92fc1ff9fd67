use serde::{Deserialize, Serialize};

use crate::store::{Record, SortKey};
use crate::validation::Validator;

/// Score given to a facilitator, from 1 to 5.
#[derive(Debug, Clone, Serialize)]
pub struct FacilitatorRating {
    pub id: i64,
    pub user_id: i64,
    pub rating: i64,
}

impl FacilitatorRating {
    pub fn validate(&self, v: &mut Validator) {
        v.positive_id("user_id", self.user_id);
        v.check(
            (1..=5).contains(&self.rating),
            "rating",
            "must be between 1 and 5",
        );
    }
}

impl Record for FacilitatorRating {
    const TABLE: &'static str = "facilitator_ratings";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, column: &str) -> SortKey<'_> {
        match column {
            "user_id" => SortKey::Int(self.user_id),
            "rating" => SortKey::Int(self.rating),
            _ => SortKey::Int(self.id),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateRatingRequest {
    pub user_id: i64,
    pub rating: i64,
}
