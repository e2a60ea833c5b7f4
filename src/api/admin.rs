use rocket::{serde::json::Json, Route, State};

use crate::{
    ballot_box::BallotBox,
    error::Result,
    model::{
        api::{
            admin::CodeBatchRequest,
            auth::AuthToken,
            candidate::{CandidateDescription, CandidateSpec},
            statistics::AdminDashboard,
        },
        db::admin::Admin,
    },
};

pub fn routes() -> Vec<Route> {
    routes![statistics, generate_codes, create_candidate]
}

#[get("/admin/statistics")]
async fn statistics(
    _token: AuthToken<Admin>,
    ballot_box: &State<BallotBox>,
) -> Result<Json<AdminDashboard>> {
    Ok(Json(ballot_box.dashboard().await?))
}

/// Generate a batch of fresh voting codes for distribution to voters.
#[post("/admin/codes", data = "<request>", format = "json")]
async fn generate_codes(
    _token: AuthToken<Admin>,
    request: Json<CodeBatchRequest>,
    ballot_box: &State<BallotBox>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(ballot_box.generate_codes(request.count).await?))
}

#[post("/admin/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    _token: AuthToken<Admin>,
    spec: Json<CandidateSpec>,
    ballot_box: &State<BallotBox>,
) -> Result<Json<CandidateDescription>> {
    Ok(Json(ballot_box.add_candidate(spec.0).await?))
}
