use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    ballot_box::BallotBox,
    config::Config,
    error::Result,
    model::{
        api::{
            admin::AdminCredentials,
            auth::{AuthToken, AUTH_TOKEN_COOKIE},
            ballot::{RedeemRequest, RedeemedCode},
        },
        db::voting_code::VotingCode,
    },
};

pub fn routes() -> Vec<Route> {
    routes![redeem, authenticate, logout]
}

#[post("/auth/voting-code", data = "<request>", format = "json")]
pub async fn redeem(
    request: Json<RedeemRequest>,
    cookies: &CookieJar<'_>,
    ballot_box: &State<BallotBox>,
    config: &State<Config>,
) -> Result<Json<RedeemedCode>> {
    let redeemed = ballot_box
        .redeem_code(&request.code, &request.voter_name)
        .await?;

    // The voter may now submit a ballot without resending the code ID.
    let token = AuthToken::<VotingCode>::for_id(*redeemed.voting_code_id);
    cookies.add(token.into_cookie(config));

    Ok(Json(redeemed))
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn authenticate(
    credentials: Json<AdminCredentials>,
    cookies: &CookieJar<'_>,
    ballot_box: &State<BallotBox>,
    config: &State<Config>,
) -> Result<()> {
    let admin = ballot_box.authenticate_admin(&credentials).await?;

    let token = AuthToken::new(&admin);
    cookies.add(token.into_cookie(config));

    Ok(())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}
