//! Integration tests for version recording, reverting, and redirects.

mod common;

use common::fixtures::{create_election_set, create_person_named};
use common::TestHarness;
use test_context::test_context;

use register_core::domains::audit::LoggedAction;
use register_core::domains::candidacies::actions::{create_candidacy, CandidacyRequest};
use register_core::domains::candidacies::models::Membership;
use register_core::domains::people::actions::{
    add_other_name, remove_identifier, revert_person, set_identifier, update_person,
    PersonError, PersonFields,
};
use register_core::domains::people::models::{Person, PersonIdentifier, PersonRedirect};

#[test_context(TestHarness)]
#[tokio::test]
async fn history_grows_only_when_data_changes(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let person = create_person_named("Tessa Jowell", pool).await.unwrap();
    assert_eq!(person.versions.len(), 1);

    let fields = PersonFields {
        biography: "Now, this is a story all about how".to_string(),
        ..PersonFields::from(&person)
    };
    let (person, version_id) = update_person(
        person.id,
        fields.clone(),
        "tester",
        "West Philadelphia",
        pool,
    )
    .await
    .unwrap();
    assert!(version_id.is_some());
    assert_eq!(person.versions.len(), 2);

    // Submitting the identical data again records nothing
    let (person, version_id) =
        update_person(person.id, fields, "someone-else", "same form", pool)
            .await
            .unwrap();
    assert!(version_id.is_none());
    assert_eq!(person.versions.len(), 2);

    // ... and leaves no logged action either
    assert_eq!(LoggedAction::count(pool).await.unwrap(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn identifier_and_name_edits_are_versioned(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let person = create_person_named("Tessa Jowell", pool).await.unwrap();

    set_identifier(
        person.id,
        "twitter_username",
        "democlub",
        "tester",
        "their twitter bio",
        pool,
    )
    .await
    .unwrap();
    let person = Person::find_by_id(person.id, pool).await.unwrap().unwrap();
    assert_eq!(person.versions.len(), 2);
    assert_eq!(
        person.versions.first().unwrap().data.identifiers["twitter_username"],
        "democlub"
    );

    // Setting the same value again is a no-op
    set_identifier(
        person.id,
        "twitter_username",
        "democlub",
        "tester",
        "their twitter bio",
        pool,
    )
    .await
    .unwrap();
    let person = Person::find_by_id(person.id, pool).await.unwrap().unwrap();
    assert_eq!(person.versions.len(), 2);

    add_other_name(
        person.id,
        "Tessa Palmer",
        "maiden name",
        "tester",
        "Wikipedia",
        pool,
    )
    .await
    .unwrap();
    remove_identifier(person.id, "twitter_username", "tester", "account gone", pool)
        .await
        .unwrap();

    let person = Person::find_by_id(person.id, pool).await.unwrap().unwrap();
    assert_eq!(person.versions.len(), 4);
    let latest = person.versions.first().unwrap();
    assert!(latest.data.identifiers.is_empty());
    assert_eq!(latest.data.other_names[0].name, "Tessa Palmer");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn malformed_dates_are_rejected(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let person = create_person_named("Tessa Jowell", pool).await.unwrap();

    let err = update_person(
        person.id,
        PersonFields {
            birth_date: "17th September 1947".to_string(),
            ..PersonFields::from(&person)
        },
        "tester",
        "Wikipedia",
        pool,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PersonError::Date(_)));

    // Approximate dates are fine
    update_person(
        person.id,
        PersonFields {
            birth_date: "1947-09".to_string(),
            ..PersonFields::from(&person)
        },
        "tester",
        "Wikipedia",
        pool,
    )
    .await
    .unwrap();
}

#[test_context(TestHarness)]
#[tokio::test]
async fn edits_prevented_blocks_updates(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let person = create_person_named("Tessa Jowell", pool).await.unwrap();

    sqlx::query("UPDATE people SET edit_limitations = 'edits-prevented' WHERE id = $1")
        .bind(person.id)
        .execute(pool)
        .await
        .unwrap();

    let err = update_person(
        person.id,
        PersonFields {
            gender: "female".to_string(),
            ..PersonFields::from(&person)
        },
        "tester",
        "Wikipedia",
        pool,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PersonError::EditsPrevented(_)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn revert_restores_fields_and_candidacies(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let set = create_election_set(pool).await.unwrap();
    let person = create_person_named("Stuart Jeffery", pool).await.unwrap();

    create_candidacy(
        &CandidacyRequest {
            person: person.id,
            ballot: set.camberwell_ballot.id,
            username: "tester".to_string(),
            information_source: "nomination papers".to_string(),
        },
        set.green.id,
        None,
        pool,
    )
    .await
    .unwrap();
    PersonIdentifier::create(person.id, "sjeffery@fmail.co.uk", "email", None, pool)
        .await
        .unwrap();

    let (person, _) = update_person(
        person.id,
        PersonFields {
            name: "Someone Else Entirely".to_string(),
            gender: "male".to_string(),
            ..PersonFields::from(&person)
        },
        "vandal",
        "no source",
        pool,
    )
    .await
    .unwrap();
    assert_eq!(person.name, "Someone Else Entirely");

    // Revert to the version recorded by the candidacy creation
    let target = person
        .versions
        .iter()
        .find(|v| v.data.name == "Stuart Jeffery" && !v.data.standing_in.is_empty())
        .unwrap()
        .version_id
        .clone();
    revert_person(person.id, &target, "fixer", pool)
        .await
        .unwrap();

    let person = Person::find_by_id(person.id, pool).await.unwrap().unwrap();
    assert_eq!(person.name, "Stuart Jeffery");
    assert_eq!(person.gender, "");
    let memberships = Membership::for_person(person.id, pool).await.unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].party_id, set.green.id);

    let actions = LoggedAction::for_person(person.id, pool).await.unwrap();
    assert_eq!(actions[0].action_type, "person-revert");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn revert_to_unknown_version_fails(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let person = create_person_named("Tessa Jowell", pool).await.unwrap();

    let err = revert_person(person.id, "deadbeefdeadbeef", "fixer", pool)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("couldn't find version"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn redirect_cycles_do_not_hang_resolution(ctx: &mut TestHarness) {
    let pool = &ctx.db_pool;
    let a = register_core::common::PersonId::new();
    let b = register_core::common::PersonId::new();

    for (old, new) in [(a, b), (b, a)] {
        sqlx::query(
            "INSERT INTO person_redirects (old_person_id, new_person_id) VALUES ($1, $2)",
        )
        .bind(old)
        .bind(new)
        .execute(pool)
        .await
        .unwrap();
    }

    // Corrupt data, but resolution still terminates
    let resolved = PersonRedirect::resolve(a, pool).await.unwrap();
    assert!(resolved.is_some());
}
