use rocket::{
    http::{Cookie, CookieJar},
    serde::json::Json,
    Route, State,
};

use crate::{
    ballot_box::BallotBox,
    error::Result,
    model::{
        api::{
            auth::{AuthToken, AUTH_TOKEN_COOKIE},
            ballot::{BallotRequest, CastBallot},
        },
        db::voting_code::VotingCode,
    },
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

/// Cast a ballot. The voting code ID comes from the request body if given,
/// otherwise from the voter's auth token.
#[post("/vote", data = "<ballot>", format = "json")]
pub async fn cast_vote(
    token: Option<AuthToken<VotingCode>>,
    ballot: Json<BallotRequest>,
    cookies: &CookieJar<'_>,
    ballot_box: &State<BallotBox>,
) -> Result<Json<CastBallot>> {
    let BallotRequest {
        voting_code_id,
        candidate_id,
    } = ballot.0;
    let voting_code_id = voting_code_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| token.map(|token| token.id.to_string()));

    let cast = ballot_box
        .commit_vote(voting_code_id.as_deref(), candidate_id.as_deref())
        .await?;

    // The code is spent, so the voter session is over.
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));

    Ok(Json(cast))
}
