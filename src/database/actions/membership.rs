use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, QueryError},
    schema::Uuid,
};

/// The (user, target) relations that are toggled on and off as a whole row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipKind {
    Favorite,
    Cart,
    Follow,
}

impl MembershipKind {
    fn table(self) -> &'static str {
        match self {
            MembershipKind::Favorite => "favorites",
            MembershipKind::Cart => "carts",
            MembershipKind::Follow => "follows",
        }
    }

    fn target_column(self) -> &'static str {
        match self {
            MembershipKind::Favorite | MembershipKind::Cart => "recipe_id",
            MembershipKind::Follow => "author_id",
        }
    }

    fn target_table(self) -> &'static str {
        match self {
            MembershipKind::Favorite | MembershipKind::Cart => "recipes",
            MembershipKind::Follow => "users",
        }
    }

    fn allows_self_reference(self) -> bool {
        !matches!(self, MembershipKind::Follow)
    }

    pub fn conflict_message(self) -> &'static str {
        match self {
            MembershipKind::Favorite => "Recipe is already in favorites",
            MembershipKind::Cart => "Recipe is already in cart",
            MembershipKind::Follow => "Already subscribed to this author",
        }
    }

    pub fn missing_message(self) -> &'static str {
        match self {
            MembershipKind::Favorite => "Recipe is not in favorites",
            MembershipKind::Cart => "Recipe is not in cart",
            MembershipKind::Follow => "Not subscribed to this author",
        }
    }
}

pub fn check_self_reference(kind: MembershipKind, user_id: Uuid, target_id: Uuid) -> Result<(), Error> {
    if !kind.allows_self_reference() && user_id == target_id {
        return Err(Error::SelfReference(
            "You can not subscribe to yourself".to_owned(),
        ));
    }
    Ok(())
}

async fn ensure_target(kind: MembershipKind, target_id: Uuid, pool: &Pool<Postgres>) -> Result<(), Error> {
    let exists: (bool,) = sqlx::query_as(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
        kind.target_table()
    ))
    .bind(target_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    if !exists.0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

/// Creates the membership row. An existing row is a `Conflict`, never a silent success;
/// the primary key makes the second of two concurrent adds see zero affected rows.
pub async fn add_membership(
    kind: MembershipKind,
    user_id: Uuid,
    target_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    check_self_reference(kind, user_id, target_id)?;
    ensure_target(kind, target_id, pool).await?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        kind.table(),
        kind.target_column()
    ))
    .bind(user_id)
    .bind(target_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(kind.conflict_message().to_owned()));
    }

    log::debug!("{kind:?} added: user {user_id} -> {target_id}");
    Ok(())
}

/// Deletes the membership row; removing a non-member is an error.
pub async fn remove_membership(
    kind: MembershipKind,
    user_id: Uuid,
    target_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    ensure_target(kind, target_id, pool).await?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
        kind.table(),
        kind.target_column()
    ))
    .bind(user_id)
    .bind(target_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(Error::NotInMembership(kind.missing_message().to_owned()));
    }

    log::debug!("{kind:?} removed: user {user_id} -> {target_id}");
    Ok(())
}

/// Which of `target_ids` the user holds a membership of `kind` for.
pub async fn list_memberships(
    kind: MembershipKind,
    user_id: Uuid,
    target_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, Error> {
    if target_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as(&format!(
        "SELECT {column} FROM {table} WHERE user_id = $1 AND {column} = ANY($2)",
        column = kind.target_column(),
        table = kind.table()
    ))
    .bind(user_id)
    .bind(target_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_follow_always_fails() {
        assert!(matches!(
            check_self_reference(MembershipKind::Follow, 4, 4),
            Err(Error::SelfReference(_))
        ));
        assert!(check_self_reference(MembershipKind::Follow, 4, 5).is_ok());
    }

    #[test]
    fn recipes_can_be_favorited_by_any_id() {
        // A user id and a recipe id may coincide numerically.
        assert!(check_self_reference(MembershipKind::Favorite, 4, 4).is_ok());
        assert!(check_self_reference(MembershipKind::Cart, 4, 4).is_ok());
    }

    #[test]
    fn each_kind_has_its_own_table_and_messages() {
        let kinds = [MembershipKind::Favorite, MembershipKind::Cart, MembershipKind::Follow];

        let tables: HashSet<_> = kinds.iter().map(|kind| kind.table()).collect();
        assert_eq!(tables.len(), 3);
        assert!(kinds
            .iter()
            .all(|kind| kind.conflict_message() != kind.missing_message()));
        assert_eq!(MembershipKind::Follow.target_column(), "author_id");
    }

    async fn seed(pool: &Pool<Postgres>) -> (Uuid, Uuid, Uuid) {
        let mut users = Vec::new();
        for name in ["cook", "eater"] {
            let (id,): (Uuid,) = sqlx::query_as(
                "INSERT INTO users (email, username, first_name, last_name, password)
                 VALUES ($1, $2, 'First', 'Last', 'x') RETURNING id",
            )
            .bind(format!("{name}@example.com"))
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap();
            users.push(id);
        }

        let (recipe,): (Uuid,) = sqlx::query_as(
            "INSERT INTO recipes (author_id, name, text, cooking_time, image)
             VALUES ($1, 'Soup', 'Boil.', 10, 'recipes/soup.png') RETURNING id",
        )
        .bind(users[0])
        .fetch_one(pool)
        .await
        .unwrap();

        (users[0], users[1], recipe)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn second_add_is_a_conflict(pool: Pool<Postgres>) {
        let (_, eater, recipe) = seed(&pool).await;

        add_membership(MembershipKind::Favorite, eater, recipe, &pool).await.unwrap();
        let again = add_membership(MembershipKind::Favorite, eater, recipe, &pool).await;
        assert!(matches!(again, Err(Error::Conflict(_))));

        // The cart is a separate relation.
        add_membership(MembershipKind::Cart, eater, recipe, &pool).await.unwrap();

        let held = list_memberships(MembershipKind::Favorite, eater, &[recipe, recipe + 1], &pool)
            .await
            .unwrap();
        assert_eq!(held, HashSet::from([recipe]));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn second_remove_is_not_a_member(pool: Pool<Postgres>) {
        let (cook, eater, recipe) = seed(&pool).await;

        add_membership(MembershipKind::Follow, eater, cook, &pool).await.unwrap();
        remove_membership(MembershipKind::Follow, eater, cook, &pool).await.unwrap();

        let again = remove_membership(MembershipKind::Follow, eater, cook, &pool).await;
        assert!(matches!(again, Err(Error::NotInMembership(_))));

        let never = remove_membership(MembershipKind::Cart, eater, recipe, &pool).await;
        assert!(matches!(never, Err(Error::NotInMembership(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn missing_target_is_not_found(pool: Pool<Postgres>) {
        let (_, eater, recipe) = seed(&pool).await;

        let result = add_membership(MembershipKind::Favorite, eater, recipe + 100, &pool).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }
}
