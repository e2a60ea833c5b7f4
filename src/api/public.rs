use rocket::{serde::json::Json, Route, State};

use crate::{
    ballot_box::BallotBox,
    error::Result,
    model::api::candidate::{CandidateDescription, CandidateResult},
};

pub fn routes() -> Vec<Route> {
    routes![candidates, results]
}

#[get("/candidates")]
pub async fn candidates(ballot_box: &State<BallotBox>) -> Result<Json<Vec<CandidateDescription>>> {
    Ok(Json(ballot_box.candidates().await?))
}

#[get("/results")]
pub async fn results(ballot_box: &State<BallotBox>) -> Result<Json<Vec<CandidateResult>>> {
    Ok(Json(ballot_box.list_results().await?))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use crate::model::db::candidate::CandidateCore;
    use crate::testing::{memory_client, Seeded};

    use super::*;

    #[rocket::async_test]
    async fn candidates_by_name() {
        let (client, _) = memory_client().await;

        let response = client.get(uri!(candidates)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        let names = response
            .into_json::<Vec<CandidateDescription>>()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["Alexander Roosevelt", "Marcus Green", "Victoria Sterling"]
        );
    }

    #[rocket::async_test]
    async fn results_before_voting() {
        let (client, Seeded { candidate_z, .. }) = memory_client().await;

        let response = client.get(uri!(results)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        let results = response
            .into_json::<Vec<CandidateResult>>()
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.votes == 0));
        assert!(results.iter().any(|r| *r.candidate_id == candidate_z));
    }

    #[backend_test]
    async fn results_against_database(client: Client, ballot_box: BallotBox) {
        let Seeded {
            voting_code,
            candidate_x,
            ..
        } = crate::testing::seed(ballot_box.clone()).await;
        ballot_box
            .commit_vote(
                Some(&voting_code.to_string()),
                Some(&candidate_x.to_string()),
            )
            .await
            .unwrap();
        ballot_box
            .store()
            .insert_candidate(&CandidateCore {
                name: "Aaron Abbott".to_string(),
                ..CandidateCore::example1()
            })
            .await
            .unwrap();

        let results = client
            .get(uri!(results))
            .dispatch()
            .await
            .into_json::<Vec<CandidateResult>>()
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].name, "Aaron Abbott");
        assert_eq!(results[0].votes, 0);
        let winner = results
            .iter()
            .find(|r| *r.candidate_id == candidate_x)
            .unwrap();
        assert_eq!(winner.votes, 1);
    }
}
