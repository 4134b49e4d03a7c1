//! Integration tests for candidacy constraints and ballot locking.

mod common;

use common::fixtures::{create_election_set, create_person_named};
use common::TestHarness;
use test_context::test_context;

use register_core::domains::audit::LoggedAction;
use register_core::domains::candidacies::actions::{
    create_candidacy, delete_candidacy, CandidacyError, CandidacyRequest,
};
use register_core::domains::candidacies::models::Membership;
use register_core::domains::elections::actions::lock_ballot;
use register_core::domains::people::actions::{
    delete_person, set_not_standing, PersonError,
};
use register_core::domains::people::models::Person;

fn request(
    person: &Person,
    ballot: register_core::common::BallotId,
) -> CandidacyRequest {
    CandidacyRequest {
        person: person.id,
        ballot,
        username: "tester".to_string(),
        information_source: "Tests".to_string(),
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn create_candidacy_records_snapshot_and_action(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("Tessa Jowell", pool).await.unwrap();

    create_candidacy(
        &request(&person, set.camberwell_ballot.id),
        set.labour.id,
        None,
        pool,
    )
    .await
    .unwrap();

    let person = Person::find_by_id(person.id, pool).await.unwrap().unwrap();
    assert_eq!(person.versions.len(), 2);
    let latest = person.versions.first().unwrap();
    assert!(latest.data.standing_in.contains_key("parl.2015-05-07"));
    assert_eq!(
        latest.data.party_memberships.get("parl.2015-05-07").unwrap().name,
        "Labour Party"
    );

    let actions = LoggedAction::for_person(person.id, pool).await.unwrap();
    assert_eq!(actions[0].action_type, "candidacy-create");
    assert_eq!(actions[0].ballot_id, Some(set.camberwell_ballot.id));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn delete_candidacy_removes_it_and_snapshots(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("Tessa Jowell", pool).await.unwrap();

    create_candidacy(
        &request(&person, set.dulwich_ballot.id),
        set.green.id,
        None,
        pool,
    )
    .await
    .unwrap();
    assert_eq!(Membership::count(pool).await.unwrap(), 1);

    delete_candidacy(&request(&person, set.dulwich_ballot.id), pool)
        .await
        .unwrap();
    assert_eq!(Membership::count(pool).await.unwrap(), 0);

    let person = Person::find_by_id(person.id, pool).await.unwrap().unwrap();
    assert!(person
        .versions
        .first()
        .unwrap()
        .data
        .standing_in
        .is_empty());

    let actions = LoggedAction::for_person(person.id, pool).await.unwrap();
    assert_eq!(actions[0].action_type, "candidacy-delete");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn candidacy_conflicts_with_not_standing(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("John Doe", pool).await.unwrap();

    set_not_standing(person.id, set.election.id, "tester", "phone call", pool)
        .await
        .unwrap();

    let err = create_candidacy(
        &request(&person, set.camberwell_ballot.id),
        set.green.id,
        None,
        pool,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        CandidacyError::NotStanding { person: p, ref election_slug }
            if p == person.id && election_slug == "parl.2015-05-07"
    ));
    assert!(err.to_string().contains("not-standing list"));
    assert_eq!(Membership::count(pool).await.unwrap(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn not_standing_conflicts_with_existing_candidacy(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("John Doe", pool).await.unwrap();

    create_candidacy(
        &request(&person, set.camberwell_ballot.id),
        set.green.id,
        None,
        pool,
    )
    .await
    .unwrap();

    let err = set_not_standing(person.id, set.election.id, "tester", "rumour", pool)
        .await
        .unwrap_err();
    assert!(matches!(err, PersonError::StandingInElection { .. }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn one_candidacy_per_election(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("John Doe", pool).await.unwrap();

    create_candidacy(
        &request(&person, set.camberwell_ballot.id),
        set.labour.id,
        None,
        pool,
    )
    .await
    .unwrap();

    // Same ballot again
    let err = create_candidacy(
        &request(&person, set.camberwell_ballot.id),
        set.labour.id,
        None,
        pool,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CandidacyError::DuplicateCandidacy { .. }));

    // A different ballot in the same election
    let err = create_candidacy(
        &request(&person, set.dulwich_ballot.id),
        set.labour.id,
        None,
        pool,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CandidacyError::AlreadyStanding { .. }));

    // The same post in a different election is fine
    create_candidacy(
        &request(&person, set.camberwell_ballot_earlier.id),
        set.labour.id,
        None,
        pool,
    )
    .await
    .unwrap();
}

#[test_context(TestHarness)]
#[tokio::test]
async fn locked_ballots_reject_candidacy_edits(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("John Doe", pool).await.unwrap();

    create_candidacy(
        &request(&person, set.camberwell_ballot.id),
        set.labour.id,
        None,
        pool,
    )
    .await
    .unwrap();

    let ballot = lock_ballot(set.camberwell_ballot.id, "locker", "SOPN checked", pool)
        .await
        .unwrap();
    assert!(ballot.locked);

    let err = delete_candidacy(&request(&person, set.camberwell_ballot.id), pool)
        .await
        .unwrap_err();
    assert!(matches!(err, CandidacyError::BallotLocked(_)));

    let other = create_person_named("Jane Doe", pool).await.unwrap();
    let err = create_candidacy(
        &request(&other, set.camberwell_ballot.id),
        set.green.id,
        None,
        pool,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CandidacyError::BallotLocked(_)));

    // The lock itself was logged
    let actions = LoggedAction::recent(10, pool).await.unwrap();
    assert!(actions.iter().any(|a| a.action_type == "ballot-lock"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn deleting_a_person_with_candidacies_is_refused(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("John Doe", pool).await.unwrap();

    create_candidacy(
        &request(&person, set.camberwell_ballot.id),
        set.labour.id,
        None,
        pool,
    )
    .await
    .unwrap();

    let err = delete_person(person.id, pool).await.unwrap_err();
    assert!(matches!(
        err,
        PersonError::UnsafeToDelete { memberships: 1, .. }
    ));
    assert_eq!(Person::count(pool).await.unwrap(), 1);

    delete_candidacy(&request(&person, set.camberwell_ballot.id), pool)
        .await
        .unwrap();
    delete_person(person.id, pool).await.unwrap();
    assert_eq!(Person::count(pool).await.unwrap(), 0);
}
