//! Append-only version history for person records.
//!
//! Every edit serializes the person's editable state into a snapshot and
//! prepends it to the person's version list, but only when the data
//! actually changed, so repeated no-op form submissions don't grow the
//! history. Merge snapshots are the exception: they are always recorded,
//! even when the winner's data came out identical.
//!
//! The version list is stored newest-first as JSONB on the person row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::common::PersonId;

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("couldn't find version {version_id} for person with ID {person}")]
    VersionNotFound {
        person: PersonId,
        version_id: String,
    },
    #[error("election slug {slug:?} still present in versions for person {person}")]
    SlugSurvived { person: PersonId, slug: String },
    #[error("version history failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How a snapshot came to be recorded. Merge snapshots bypass the
/// identical-data check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Create,
    Edit,
    Merge,
    Revert,
}

/// Who made an edit, when, and on what authority.
#[derive(Debug, Clone)]
pub struct ChangeMetadata {
    pub username: String,
    pub information_source: String,
    pub action: EditAction,
    pub timestamp: DateTime<Utc>,
}

impl ChangeMetadata {
    pub fn new(username: &str, information_source: &str, action: EditAction) -> Self {
        Self {
            username: username.to_string(),
            information_source: information_source.to_string(),
            action,
            timestamp: Utc::now(),
        }
    }

    /// Override the timestamp, for importers replaying historical edits.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// An alternate or former name as it appears in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherNameData {
    pub name: String,
    #[serde(default)]
    pub note: String,
}

/// A candidacy as it appears in a snapshot's `standing_in` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingInData {
    pub post_slug: String,
    pub post_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elected: Option<bool>,
}

/// A party as it appears in a snapshot's `party_memberships` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyData {
    pub ec_id: String,
    pub name: String,
}

/// The full editable state of a person at one point in time.
///
/// Collections are BTreeMaps so equality is structural and serialization
/// order is stable; two snapshots compare equal iff an edit was a no-op.
/// `standing_in` maps election slug to a candidacy, or to `None` for an
/// explicit "not standing in this election" assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    pub id: PersonId,
    pub name: String,
    #[serde(default)]
    pub honorific_prefix: String,
    #[serde(default)]
    pub honorific_suffix: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub death_date: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub favourite_biscuit: String,
    #[serde(default)]
    pub other_names: Vec<OtherNameData>,
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub standing_in: BTreeMap<String, Option<StandingInData>>,
    #[serde(default)]
    pub party_memberships: BTreeMap<String, PartyData>,
}

/// One entry in a person's version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: String,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub information_source: String,
    #[serde(default = "default_action")]
    pub action: EditAction,
    pub data: VersionData,
}

fn default_action() -> EditAction {
    EditAction::Edit
}

/// Content-derived version id: sha-256 over the snapshot, its timestamp and
/// editor, truncated to 16 hex characters.
pub fn create_version_id(
    data: &VersionData,
    timestamp: DateTime<Utc>,
    username: &str,
) -> Result<String, VersionError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(data)?);
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(username.as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{:02x}", byte));
    }
    Ok(id)
}

/// Prepend a snapshot to the history unless it matches the most recent one.
///
/// Returns the new version id, or `None` when the edit was a no-op and
/// nothing was recorded. Merge snapshots are always recorded.
pub fn record_version(
    versions: &mut Vec<Version>,
    meta: &ChangeMetadata,
    data: VersionData,
) -> Result<Option<String>, VersionError> {
    let unchanged = versions.first().map_or(false, |latest| latest.data == data);
    if unchanged && meta.action != EditAction::Merge {
        return Ok(None);
    }

    let version_id = create_version_id(&data, meta.timestamp, &meta.username)?;
    versions.insert(
        0,
        Version {
            version_id: version_id.clone(),
            timestamp: meta.timestamp,
            username: meta.username.clone(),
            information_source: meta.information_source.clone(),
            action: meta.action,
            data,
        },
    );
    Ok(Some(version_id))
}

/// Look up a version by id.
pub fn find_version<'a>(
    versions: &'a [Version],
    person: PersonId,
    version_id: &str,
) -> Result<&'a Version, VersionError> {
    versions
        .iter()
        .find(|v| v.version_id == version_id)
        .ok_or_else(|| VersionError::VersionNotFound {
            person,
            version_id: version_id.to_string(),
        })
}

// ============================================================================
// Diffs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Add,
    Remove,
    Replace,
}

/// One field-level change between a version and its parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub op: DiffOp,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
}

/// A version together with its changes against the parent version.
#[derive(Debug, Clone, Serialize)]
pub struct VersionDiff {
    pub version_id: String,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub information_source: String,
    pub diffs: Vec<FieldDiff>,
}

/// Flatten a JSON value into path -> scalar pairs. Empty leaves (null,
/// empty strings, empty containers) are dropped so that diffs only show
/// fields that carry information.
fn flatten(value: &Value, prefix: &str, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Null => {}
        Value::String(s) if s.is_empty() => {}
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}/{}", prefix, key)
                };
                flatten(child, &path, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(child, &format!("{}/{}", prefix, index), out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

fn diff_data(parent: Option<&VersionData>, current: &VersionData) -> Result<Vec<FieldDiff>, VersionError> {
    let mut parent_flat = BTreeMap::new();
    if let Some(parent) = parent {
        flatten(&serde_json::to_value(parent)?, "", &mut parent_flat);
    }
    let mut current_flat = BTreeMap::new();
    flatten(&serde_json::to_value(current)?, "", &mut current_flat);

    let mut diffs = Vec::new();
    for (path, previous) in &parent_flat {
        match current_flat.get(path) {
            None => diffs.push(FieldDiff {
                op: DiffOp::Remove,
                path: path.clone(),
                previous: Some(previous.clone()),
                current: None,
            }),
            Some(value) if value != previous => diffs.push(FieldDiff {
                op: DiffOp::Replace,
                path: path.clone(),
                previous: Some(previous.clone()),
                current: Some(value.clone()),
            }),
            Some(_) => {}
        }
    }
    for (path, value) in &current_flat {
        if !parent_flat.contains_key(path) {
            diffs.push(FieldDiff {
                op: DiffOp::Add,
                path: path.clone(),
                previous: None,
                current: Some(value.clone()),
            });
        }
    }
    Ok(diffs)
}

/// Diffs for every version against its parent, newest first. The oldest
/// version diffs against an empty record, so it reads as the initial
/// "everything added" entry.
pub fn get_version_diffs(versions: &[Version]) -> Result<Vec<VersionDiff>, VersionError> {
    let mut result = Vec::with_capacity(versions.len());
    for (index, version) in versions.iter().enumerate() {
        let parent = versions.get(index + 1).map(|v| &v.data);
        result.push(VersionDiff {
            version_id: version.version_id.clone(),
            timestamp: version.timestamp,
            username: version.username.clone(),
            information_source: version.information_source.clone(),
            diffs: diff_data(parent, &version.data)?,
        });
    }
    Ok(result)
}

/// The diff for one version, by id.
pub fn diff_for_version(
    versions: &[Version],
    person: PersonId,
    version_id: &str,
) -> Result<VersionDiff, VersionError> {
    get_version_diffs(versions)?
        .into_iter()
        .find(|diff| diff.version_id == version_id)
        .ok_or_else(|| VersionError::VersionNotFound {
            person,
            version_id: version_id.to_string(),
        })
}

// ============================================================================
// Election slug re-pointing
// ============================================================================

/// Rewrite `standing_in` / `party_memberships` keys from a legacy election
/// slug to its canonical replacement, across the whole history.
///
/// Returns whether anything changed. Fails if the legacy slug somehow
/// survives in the serialized history after the rewrite; a half-moved
/// history is worse than a loud error.
pub fn move_election_slug(
    person: PersonId,
    versions: &mut Vec<Version>,
    old: &str,
    new: &str,
) -> Result<bool, VersionError> {
    let mut changed = false;
    for version in versions.iter_mut() {
        if let Some(entry) = version.data.standing_in.remove(old) {
            version.data.standing_in.insert(new.to_string(), entry);
            changed = true;
        }
        if let Some(entry) = version.data.party_memberships.remove(old) {
            version.data.party_memberships.insert(new.to_string(), entry);
            changed = true;
        }
    }

    if changed {
        let serialized = serde_json::to_string(&versions)?;
        if serialized.contains(&format!("\"{}\"", old)) {
            return Err(VersionError::SlugSurvived {
                person,
                slug: old.to_string(),
            });
        }
    }

    Ok(changed)
}

/// Interleave two version histories newest-first. Used by the merge
/// operation so the winner keeps the loser's edit trail.
pub fn interleave_versions(winner: Vec<Version>, loser: Vec<Version>) -> Vec<Version> {
    let mut combined: Vec<Version> = winner.into_iter().chain(loser).collect();
    combined.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_data(person: PersonId, name: &str) -> VersionData {
        VersionData {
            id: person,
            name: name.to_string(),
            honorific_prefix: String::new(),
            honorific_suffix: String::new(),
            gender: String::new(),
            birth_date: String::new(),
            death_date: String::new(),
            summary: String::new(),
            biography: String::new(),
            favourite_biscuit: String::new(),
            other_names: Vec::new(),
            identifiers: BTreeMap::new(),
            standing_in: BTreeMap::new(),
            party_memberships: BTreeMap::new(),
        }
    }

    fn ts(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, seconds).unwrap()
    }

    #[test]
    fn first_edit_is_always_recorded() {
        let person = PersonId::new();
        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "Initial import", EditAction::Create).at(ts(0));
        let recorded = record_version(&mut versions, &meta, sample_data(person, "Tessa Jowell"))
            .unwrap();
        assert!(recorded.is_some());
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_id, recorded.unwrap());
    }

    #[test]
    fn identical_consecutive_edits_are_deduplicated() {
        let person = PersonId::new();
        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "form edit", EditAction::Edit).at(ts(0));
        record_version(&mut versions, &meta, sample_data(person, "Tessa Jowell")).unwrap();

        let meta = ChangeMetadata::new("bob", "same data again", EditAction::Edit).at(ts(1));
        let recorded =
            record_version(&mut versions, &meta, sample_data(person, "Tessa Jowell")).unwrap();
        assert!(recorded.is_none());
        assert_eq!(versions.len(), 1);
    }

    #[test]
    fn changed_data_grows_the_history_newest_first() {
        let person = PersonId::new();
        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "import", EditAction::Create).at(ts(0));
        record_version(&mut versions, &meta, sample_data(person, "T Jowell")).unwrap();

        let meta = ChangeMetadata::new("bob", "fixed name", EditAction::Edit).at(ts(1));
        record_version(&mut versions, &meta, sample_data(person, "Tessa Jowell")).unwrap();

        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].data.name, "Tessa Jowell");
        assert_eq!(versions[1].data.name, "T Jowell");
    }

    #[test]
    fn merge_snapshots_are_recorded_even_when_identical() {
        let person = PersonId::new();
        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "import", EditAction::Edit).at(ts(0));
        record_version(&mut versions, &meta, sample_data(person, "Tessa Jowell")).unwrap();

        let meta =
            ChangeMetadata::new("merger", "After merging person", EditAction::Merge).at(ts(1));
        let recorded =
            record_version(&mut versions, &meta, sample_data(person, "Tessa Jowell")).unwrap();
        assert!(recorded.is_some());
        assert_eq!(versions.len(), 2);
    }

    #[test]
    fn version_ids_differ_for_different_content() {
        let person = PersonId::new();
        let a = create_version_id(&sample_data(person, "A"), ts(0), "alice").unwrap();
        let b = create_version_id(&sample_data(person, "B"), ts(0), "alice").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn diffs_show_replace_for_changed_field() {
        let person = PersonId::new();
        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "import", EditAction::Create).at(ts(0));
        let mut data = sample_data(person, "Tessa Jowell");
        data.gender = "female".to_string();
        record_version(&mut versions, &meta, data.clone()).unwrap();

        let meta = ChangeMetadata::new("bob", "bio", EditAction::Edit).at(ts(1));
        data.biography = "A story".to_string();
        data.name = "Dame Tessa Jowell".to_string();
        record_version(&mut versions, &meta, data).unwrap();

        let diffs = get_version_diffs(&versions).unwrap();
        assert_eq!(diffs.len(), 2);

        let latest = &diffs[0];
        let replace: Vec<_> = latest
            .diffs
            .iter()
            .filter(|d| d.op == DiffOp::Replace)
            .collect();
        assert_eq!(replace.len(), 1);
        assert_eq!(replace[0].path, "name");
        assert!(latest
            .diffs
            .iter()
            .any(|d| d.op == DiffOp::Add && d.path == "biography"));
        // unchanged gender produces no entry
        assert!(!latest.diffs.iter().any(|d| d.path == "gender"));
    }

    #[test]
    fn oldest_version_diffs_against_empty() {
        let person = PersonId::new();
        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "import", EditAction::Create).at(ts(0));
        record_version(&mut versions, &meta, sample_data(person, "Tessa Jowell")).unwrap();

        let diffs = get_version_diffs(&versions).unwrap();
        assert!(diffs[0]
            .diffs
            .iter()
            .all(|d| d.op == DiffOp::Add));
    }

    #[test]
    fn diff_for_unknown_version_errors() {
        let person = PersonId::new();
        let versions = Vec::new();
        let err = diff_for_version(&versions, person, "deadbeefdeadbeef").unwrap_err();
        assert!(matches!(err, VersionError::VersionNotFound { .. }));
    }

    #[test]
    fn move_election_slug_rewrites_both_maps() {
        let person = PersonId::new();
        let mut data = sample_data(person, "Stuart Jeffery");
        data.standing_in.insert(
            "2015".to_string(),
            Some(StandingInData {
                post_slug: "65936".to_string(),
                post_label: "Maidstone and The Weald".to_string(),
                elected: Some(false),
            }),
        );
        data.party_memberships.insert(
            "2015".to_string(),
            PartyData {
                ec_id: "PP63".to_string(),
                name: "Green Party".to_string(),
            },
        );

        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "import", EditAction::Create).at(ts(0));
        record_version(&mut versions, &meta, data).unwrap();

        let changed =
            move_election_slug(person, &mut versions, "2015", "parl.2015-05-07").unwrap();
        assert!(changed);
        let data = &versions[0].data;
        assert!(data.standing_in.contains_key("parl.2015-05-07"));
        assert!(!data.standing_in.contains_key("2015"));
        assert!(data.party_memberships.contains_key("parl.2015-05-07"));
    }

    #[test]
    fn move_election_slug_is_a_noop_for_absent_slug() {
        let person = PersonId::new();
        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "import", EditAction::Create).at(ts(0));
        record_version(&mut versions, &meta, sample_data(person, "Anyone")).unwrap();

        let changed =
            move_election_slug(person, &mut versions, "2010", "parl.2010-05-06").unwrap();
        assert!(!changed);
    }

    #[test]
    fn not_standing_assertions_survive_slug_moves() {
        let person = PersonId::new();
        let mut data = sample_data(person, "Shane Collins");
        data.standing_in.insert("2015".to_string(), None);

        let mut versions = Vec::new();
        let meta = ChangeMetadata::new("alice", "import", EditAction::Create).at(ts(0));
        record_version(&mut versions, &meta, data).unwrap();

        move_election_slug(person, &mut versions, "2015", "parl.2015-05-07").unwrap();
        assert_eq!(
            versions[0].data.standing_in.get("parl.2015-05-07"),
            Some(&None)
        );
    }

    #[test]
    fn interleave_orders_newest_first() {
        let person = PersonId::new();
        let make = |name: &str, second: u32| {
            let mut versions = Vec::new();
            let meta = ChangeMetadata::new("alice", "import", EditAction::Edit).at(ts(second));
            record_version(&mut versions, &meta, sample_data(person, name)).unwrap();
            versions
        };

        let winner = make("Winner v1", 0);
        let loser_versions = [make("Loser v1", 1), make("Loser v2", 2)]
            .concat();

        let combined = interleave_versions(winner, loser_versions);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[0].data.name, "Loser v2");
        assert_eq!(combined[2].data.name, "Winner v1");
    }
}
