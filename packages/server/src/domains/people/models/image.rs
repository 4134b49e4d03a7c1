use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{ImageId, PersonId};

/// PersonImage model - metadata for images of people uploaded by users.
///
/// It's important we keep track of the copyright the uploading user asserts
/// over the image, and any notes they have. Only metadata lives here; file
/// storage is someone else's problem.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PersonImage {
    pub id: ImageId,
    pub person_id: PersonId,
    pub filename: String,
    pub source: String,
    pub copyright: String,
    pub uploading_user: Option<String>,
    pub user_notes: String,
    pub md5sum: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Checksum helper for incoming image bytes.
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

impl PersonImage {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        person_id: PersonId,
        filename: &str,
        source: &str,
        copyright: &str,
        uploading_user: Option<&str>,
        user_notes: &str,
        md5sum: &str,
        is_primary: bool,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO person_images
                (id, person_id, filename, source, copyright, uploading_user,
                 user_notes, md5sum, is_primary)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(ImageId::new())
        .bind(person_id)
        .bind(filename)
        .bind(source)
        .bind(copyright)
        .bind(uploading_user)
        .bind(user_notes)
        .bind(md5sum)
        .bind(is_primary)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn for_person(person_id: PersonId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM person_images WHERE person_id = $1 ORDER BY created_at",
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_primary(person_id: PersonId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM person_images
             WHERE person_id = $1 AND is_primary = true
             LIMIT 1",
        )
        .bind(person_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Find an existing image by checksum, so re-uploads update in place
    pub async fn find_by_md5sum(
        person_id: PersonId,
        md5sum: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM person_images WHERE person_id = $1 AND md5sum = $2",
        )
        .bind(person_id)
        .bind(md5sum)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_hex_matches_known_digest() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
