use std::sync::OnceLock;

use regex::Regex;
use sqlx::{Pool, Postgres};

use crate::{
    constants::{COLOR_PATTERN, MAX_LENGTH_NAME, SLUG_PATTERN},
    error::{Error, QueryError},
    form::Validator,
    schema::{LinkedRecipeTag, Tag, Uuid},
};

fn color_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(COLOR_PATTERN).expect("static pattern compiles"))
}

fn slug_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(SLUG_PATTERN).expect("static pattern compiles"))
}

pub fn is_valid_color(color: &str) -> bool {
    color_regex().is_match(color)
}

fn validate_tag(name: &str, color: &str, slug: &str) -> Result<(), Error> {
    let mut v = Validator::default();
    v.check(!name.trim().is_empty(), "name", "name required");
    v.check(
        name.chars().count() <= MAX_LENGTH_NAME,
        "name",
        &format!("Ensure this field has no more than {MAX_LENGTH_NAME} characters."),
    );
    v.check(
        is_valid_color(color),
        "color",
        "Color must be a HEX value (#RRGGBB).",
    );
    v.check(
        slug_regex().is_match(slug) && slug.len() <= MAX_LENGTH_NAME,
        "slug",
        "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
    );
    v.finish(())
}

pub async fn create_tag(
    name: &str,
    color: &str,
    slug: &str,
    pool: &Pool<Postgres>,
) -> Result<Tag, Error> {
    validate_tag(name, color, slug)?;

    let tag: Option<Tag> = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING RETURNING *",
    )
    .bind(name.trim())
    .bind(color)
    .bind(slug)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    tag.ok_or_else(|| Error::Conflict("Tag with this name, color or slug already exists".to_owned()))
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

/// Tags of every recipe in `recipe_ids`, in one query.
pub async fn list_recipe_tags(
    pool: &Pool<Postgres>,
    recipe_ids: &[Uuid],
) -> Result<Vec<LinkedRecipeTag>, Error> {
    if recipe_ids.is_empty() {
        return Ok(vec![]);
    }

    let list: Vec<LinkedRecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id AS recipe_id, t.id AS id, t.name AS name, t.color AS color, t.slug AS slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_must_be_six_digit_hex() {
        assert!(is_valid_color("#E26C2D"));
        assert!(is_valid_color("#49b64e"));
        assert!(!is_valid_color("#12ab3G"));
        assert!(!is_valid_color("E26C2D"));
        assert!(!is_valid_color("#fff"));
        assert!(!is_valid_color("#E26C2D0"));
    }

    #[test]
    fn tag_fields_are_checked_together() {
        match validate_tag("", "red", "bad slug") {
            Err(Error::Validation(errors)) => {
                assert!(errors.contains_key("name"));
                assert!(errors.contains_key("color"));
                assert!(errors.contains_key("slug"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert!(validate_tag("Breakfast", "#E26C2D", "breakfast").is_ok());
    }
}
