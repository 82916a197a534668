use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, QueryError},
    form::QueryParams,
    pagination::PageRequest,
    schema::{UserProfile, UserRow, Uuid},
};

/// Authors `user_id` follows, ordered by username.
pub async fn fetch_subscriptions(
    user_id: Uuid,
    request: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<(Vec<UserProfile>, i64), Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    Ok((rows.into_iter().map(UserProfile::from).collect(), total_count))
}

/// `recipes_limit` caps the recipe preview per author; anything that is not a
/// non-negative integer leaves it unbounded.
pub fn recipes_limit(params: &QueryParams) -> Option<usize> {
    params.get_number::<usize>("recipes_limit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipes_limit_accepts_only_non_negative_integers() {
        assert_eq!(recipes_limit(&QueryParams::parse("recipes_limit=3")), Some(3));
        assert_eq!(recipes_limit(&QueryParams::parse("recipes_limit=0")), Some(0));
        assert_eq!(recipes_limit(&QueryParams::parse("recipes_limit=-1")), None);
        assert_eq!(recipes_limit(&QueryParams::parse("recipes_limit=lots")), None);
        assert_eq!(recipes_limit(&QueryParams::default()), None);
    }
}
