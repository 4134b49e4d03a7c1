//! Test fixtures for creating test data.
//!
//! These fixtures use the model methods and actions directly. The standard
//! election set mirrors the kind of data the register tracks: a current
//! general election, an earlier one, and a local election, with a couple of
//! constituency posts and parties.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::PgPool;

use register_core::domains::elections::models::{Ballot, Election, Party, Post};
use register_core::domains::people::actions::{create_person, PersonFields};
use register_core::domains::people::models::Person;

/// The standard election/post/party/ballot set most tests start from.
pub struct ElectionSet {
    pub election: Election,
    pub earlier_election: Election,
    pub local_election: Election,
    pub dulwich_post: Post,
    pub camberwell_post: Post,
    pub local_post: Post,
    pub labour: Party,
    pub green: Party,
    pub dulwich_ballot: Ballot,
    pub dulwich_ballot_earlier: Ballot,
    pub camberwell_ballot: Ballot,
    pub camberwell_ballot_earlier: Ballot,
    pub local_ballot: Ballot,
}

pub async fn create_election_set(pool: &PgPool) -> Result<ElectionSet> {
    let election = Election::create(
        "parl.2015-05-07",
        "2015 General Election",
        NaiveDate::from_ymd_opt(2015, 5, 7).unwrap(),
        true,
        pool,
    )
    .await?;
    let earlier_election = Election::create(
        "parl.2010-05-06",
        "2010 General Election",
        NaiveDate::from_ymd_opt(2010, 5, 6).unwrap(),
        false,
        pool,
    )
    .await?;
    let local_election = Election::create(
        "local.maidstone.2016-05-05",
        "Maidstone local election",
        NaiveDate::from_ymd_opt(2016, 5, 5).unwrap(),
        true,
        pool,
    )
    .await?;

    let dulwich_post = Post::create(
        "65808",
        "Dulwich and West Norwood",
        "House of Commons",
        pool,
    )
    .await?;
    let camberwell_post = Post::create(
        "65913",
        "Camberwell and Peckham",
        "House of Commons",
        pool,
    )
    .await?;
    let local_post = Post::create(
        "DIW:E05005004",
        "Shepway South ward",
        "Maidstone Borough Council",
        pool,
    )
    .await?;

    let labour = Party::create("PP53", "Labour Party", pool).await?;
    let green = Party::create("PP63", "Green Party", pool).await?;

    let dulwich_ballot = Ballot::create(
        "parl.65808.2015-05-07",
        election.id,
        dulwich_post.id,
        pool,
    )
    .await?;
    let dulwich_ballot_earlier = Ballot::create(
        "parl.65808.2010-05-06",
        earlier_election.id,
        dulwich_post.id,
        pool,
    )
    .await?;
    let camberwell_ballot = Ballot::create(
        "parl.65913.2015-05-07",
        election.id,
        camberwell_post.id,
        pool,
    )
    .await?;
    let camberwell_ballot_earlier = Ballot::create(
        "parl.65913.2010-05-06",
        earlier_election.id,
        camberwell_post.id,
        pool,
    )
    .await?;
    let local_ballot = Ballot::create(
        "local.maidstone.DIW:E05005004.2016-05-05",
        local_election.id,
        local_post.id,
        pool,
    )
    .await?;

    Ok(ElectionSet {
        election,
        earlier_election,
        local_election,
        dulwich_post,
        camberwell_post,
        local_post,
        labour,
        green,
        dulwich_ballot,
        dulwich_ballot_earlier,
        camberwell_ballot,
        camberwell_ballot_earlier,
        local_ballot,
    })
}

/// Create a person with just a name, recording the initial version.
pub async fn create_person_named(name: &str, pool: &PgPool) -> Result<Person> {
    create_person(
        PersonFields::named(name),
        "tester",
        "Just adding example data",
        pool,
    )
    .await
    .map_err(Into::into)
}
