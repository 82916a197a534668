use sqlx::{Pool, Postgres};

use crate::{
    constants::MAX_LENGTH_NAME,
    error::{Error, QueryError},
    form::Validator,
    schema::{Ingredient, RecipePart, Uuid},
};

/// Escapes LIKE wildcards so user input only ever matches literally.
fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

pub async fn list_ingredients(
    name_prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = match name_prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => {
            sqlx::query_as("SELECT * FROM ingredients WHERE LOWER(name) LIKE LOWER($1) ORDER BY name, id")
                .bind(like_prefix(prefix))
                .fetch_all(pool)
                .await
                .map_err(QueryError::from)?
        }
        None => sqlx::query_as("SELECT * FROM ingredients ORDER BY name, id")
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?,
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn create_ingredient(
    name: &str,
    measurement_unit: &str,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    let mut v = Validator::default();
    for (field, value) in [("name", name), ("measurement_unit", measurement_unit)] {
        v.check(!value.trim().is_empty(), field, "This field is required.");
        v.check(
            value.chars().count() <= MAX_LENGTH_NAME,
            field,
            &format!("Ensure this field has no more than {MAX_LENGTH_NAME} characters."),
        );
    }
    v.finish(())?;

    let row: Option<Ingredient> = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING RETURNING *
    ",
    )
    .bind(name.trim())
    .bind(measurement_unit.trim())
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| Error::Conflict("Ingredient with this unit already exists".to_owned()))
}

/// Ingredient lines of every recipe in `recipe_ids`, in one query.
pub async fn list_recipe_parts(
    pool: &Pool<Postgres>,
    recipe_ids: &[Uuid],
) -> Result<Vec<RecipePart>, Error> {
    if recipe_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<RecipePart> = sqlx::query_as("
        SELECT ri.recipe_id AS recipe_id, i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY i.name, i.id
    ")
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("сах"), "сах%");
        assert_eq!(like_prefix("50%_off"), "50\\%\\_off%");
        assert_eq!(like_prefix("a\\b"), "a\\\\b%");
    }
}
