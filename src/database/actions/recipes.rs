use std::collections::HashSet;

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    authentication::permissions::ActionType,
    error::{Error, QueryError},
    form::{IngredientEntry, RecipeDraft, FIELD_REQUIRED},
    jwt::SessionData,
    media::MediaStorage,
    pagination::PageRequest,
    schema::{AuthorRecipeCount, Recipe, RecipeRow, Uuid},
};

/// Listing filters. Membership filters are only ever set for an authenticated viewer.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub favorited_by: Option<Uuid>,
    pub in_cart_of: Option<Uuid>,
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    request: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<(Vec<Recipe>, i64), Error> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE",
    );

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(" AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(")
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if let Some(user_id) = filter.favorited_by {
        query
            .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
    if let Some(user_id) = filter.in_cart_of {
        query
            .push(" AND EXISTS (SELECT 1 FROM carts c WHERE c.recipe_id = r.id AND c.user_id = ")
            .push_bind(user_id)
            .push(")");
    }

    query
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(request.limit)
        .push(" OFFSET ")
        .push_bind(request.offset());

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    Ok((rows.into_iter().map(Recipe::from).collect(), total_count))
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Fetches a recipe the session is allowed to modify.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(id, pool).await?.ok_or(Error::NotFound)?;
    session.authenticate_owner(
        recipe.author_id,
        ActionType::ManageOwnRecipes,
        ActionType::ManageAllRecipes,
    )?;

    Ok(recipe)
}

/// Recipes of the given authors, newest first, at most `limit` per author.
pub async fn list_author_recipes(
    author_ids: &[Uuid],
    limit: Option<usize>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Recipe>, Error> {
    if author_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<Recipe> = sqlx::query_as(
        "
        SELECT id, author_id, name, text, cooking_time, image, pub_date
        FROM (
            SELECT r.*, ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, pub_date DESC, id DESC
    ",
    )
    .bind(author_ids)
    .bind(limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX)))
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn count_author_recipes(
    author_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<AuthorRecipeCount>, Error> {
    if author_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<AuthorRecipeCount> = sqlx::query_as(
        "SELECT author_id, COUNT(*) AS count FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Fails with `NotFound` unless every id exists in `table`.
async fn ensure_all_exist(
    table: &'static str,
    ids: &[Uuid],
    conn: &mut PgConnection,
) -> Result<(), Error> {
    let found: Vec<(Uuid,)> = sqlx::query_as(&format!("SELECT id FROM {table} WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    let found: HashSet<Uuid> = found.into_iter().map(|row| row.0).collect();
    if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
        log::debug!("Referenced {table} row {missing} does not exist");
        return Err(Error::NotFound);
    }
    Ok(())
}

async fn insert_relations(
    recipe_id: Uuid,
    tags: &[Uuid],
    ingredients: &[IngredientEntry],
    conn: &mut PgConnection,
) -> Result<(), Error> {
    ensure_all_exist("ingredients", &ingredients.iter().map(|e| e.id).collect::<Vec<_>>(), conn)
        .await?;
    ensure_all_exist("tags", tags, conn).await?;

    let mut parts = QueryBuilder::<Postgres>::new(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
    );
    parts.push_values(ingredients, |mut row, entry| {
        row.push_bind(recipe_id)
            .push_bind(entry.id)
            .push_bind(entry.amount);
    });
    parts
        .build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    let mut links = QueryBuilder::<Postgres>::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    links.push_values(tags, |mut row, tag_id| {
        row.push_bind(recipe_id).push_bind(*tag_id);
    });
    links
        .build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, Error> {
    value.ok_or_else(|| Error::field(field, FIELD_REQUIRED))
}

/// Persists the recipe with its ingredient lines and tags in one transaction.
pub async fn create_recipe(
    author_id: Uuid,
    draft: RecipeDraft,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<Uuid, Error> {
    let name = required(draft.name, "name")?;
    let text = required(draft.text, "text")?;
    let cooking_time = required(draft.cooking_time, "cooking_time")?;
    let image = required(draft.image, "image")?;

    let image_path = media.save_recipe_image(&image).await?;

    let result = async {
        let mut tr = pool.begin().await.map_err(QueryError::from)?;

        let id: (Uuid,) = sqlx::query_as(
            "
            INSERT INTO recipes (author_id, name, text, cooking_time, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
        ",
        )
        .bind(author_id)
        .bind(name)
        .bind(text)
        .bind(cooking_time)
        .bind(&image_path)
        .fetch_one(&mut *tr)
        .await
        .map_err(QueryError::from)?;

        insert_relations(id.0, &draft.tags, &draft.ingredients, &mut *tr).await?;

        tr.commit().await.map_err(QueryError::from)?;
        Ok::<Uuid, Error>(id.0)
    }
    .await;

    match result {
        Ok(id) => {
            log::info!("Recipe {id} created by user {author_id}");
            Ok(id)
        }
        Err(e) => {
            media.remove(&image_path).await;
            Err(e)
        }
    }
}

/// Updates scalar fields that are present and fully replaces tags and ingredients.
pub async fn update_recipe(
    recipe: &Recipe,
    draft: RecipeDraft,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let new_image = match &draft.image {
        Some(image) => Some(media.save_recipe_image(image).await?),
        None => None,
    };

    let result = async {
        let mut tr = pool.begin().await.map_err(QueryError::from)?;

        sqlx::query(
            "
            UPDATE recipes SET
            name = COALESCE($1, name),
            text = COALESCE($2, text),
            cooking_time = COALESCE($3, cooking_time),
            image = COALESCE($4, image)
            WHERE id = $5
        ",
        )
        .bind(&draft.name)
        .bind(&draft.text)
        .bind(draft.cooking_time)
        .bind(&new_image)
        .bind(recipe.id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(recipe.id)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;

        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(recipe.id)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;

        insert_relations(recipe.id, &draft.tags, &draft.ingredients, &mut *tr).await?;

        tr.commit().await.map_err(QueryError::from)?;
        Ok::<(), Error>(())
    }
    .await;

    match (result, new_image) {
        (Ok(()), Some(_)) => {
            media.remove(&recipe.image).await;
            log::info!("Recipe {} updated with a new image", recipe.id);
            Ok(())
        }
        (Ok(()), None) => {
            log::info!("Recipe {} updated", recipe.id);
            Ok(())
        }
        (Err(e), Some(path)) => {
            media.remove(&path).await;
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

/// Join and membership rows go with it through `ON DELETE CASCADE`.
pub async fn delete_recipe(
    recipe: &Recipe,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    media.remove(&recipe.image).await;
    log::info!("Recipe {} deleted", recipe.id);
    Ok(())
}
