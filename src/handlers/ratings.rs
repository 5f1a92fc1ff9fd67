//! Facilitator ratings. Ratings are append-only: no update or delete.

use axum::Json;
use axum::extract::State;
use axum::response::Response;
use serde_json::{Value, json};
use tracing::instrument;

use super::util::{JsonBody, ResourceId, created};
use crate::error::AppResult;
use crate::filters::{Filters, ListSpec, QueryParams};
use crate::models::{CreateRatingRequest, FacilitatorRating};
use crate::state::AppState;
use crate::store::matches_exact;
use crate::validation::Validator;

const RATINGS: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id", "user_id", "rating"],
};

#[instrument(skip(state, body))]
pub async fn create_rating(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateRatingRequest>,
) -> AppResult<Response> {
    let rating = FacilitatorRating {
        id: 0,
        user_id: body.user_id,
        rating: body.rating,
    };

    let mut v = Validator::new();
    rating.validate(&mut v);
    v.finish()?;

    let rating = state.db.facilitator_ratings.insert(rating)?;
    Ok(created(
        format!("/v1/facilitator-rating/{}", rating.id),
        json!({ "facilitator_rating": rating }),
    ))
}

#[instrument(skip(state))]
pub async fn show_rating(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let rating = state.db.facilitator_ratings.get(id)?;
    Ok(Json(json!({ "facilitator_rating": rating })))
}

#[instrument(skip(state))]
pub async fn list_ratings(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let user_id = query.optional_integer("user_id", &mut v);
    let filters = Filters::parse(&query, &RATINGS, &mut v);
    v.finish()?;

    let (ratings, metadata) = state
        .db
        .facilitator_ratings
        .list(&filters, |r| matches_exact(user_id, r.user_id))?;

    Ok(Json(
        json!({ "facilitator_ratings": ratings, "@metadata": metadata }),
    ))
}
