use std::collections::BTreeMap;

use sqlx::{Pool, Postgres};

use crate::{
    constants::SHOPPING_LIST_HEADER,
    error::{Error, QueryError},
    schema::{ShoppingListEntry, Uuid},
};

const BOM: &str = "\u{feff}";

/// One ingredient line of a recipe sitting in a cart.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Groups lines by (name, unit) and sums their amounts, ordered by name then unit.
pub fn aggregate(lines: impl IntoIterator<Item = CartLine>) -> Vec<ShoppingListEntry> {
    let mut groups: BTreeMap<(String, String), i64> = BTreeMap::new();

    for line in lines {
        *groups
            .entry((line.name, line.measurement_unit))
            .or_default() += i64::from(line.amount);
    }

    groups
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListEntry {
            name,
            measurement_unit,
            total_amount,
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

/// CSV with a UTF-8 byte-order mark so spreadsheets pick the right encoding.
pub fn render_csv(entries: &[ShoppingListEntry]) -> String {
    let mut out = String::from(BOM);

    out.push_str(
        &SHOPPING_LIST_HEADER
            .iter()
            .map(|field| csv_field(field))
            .collect::<Vec<String>>()
            .join(","),
    );
    out.push_str("\r\n");

    for entry in entries {
        out.push_str(&format!(
            "{},{},{}\r\n",
            csv_field(&entry.name),
            csv_field(&entry.measurement_unit),
            entry.total_amount
        ));
    }

    out
}

pub async fn list_cart_lines(user_id: Uuid, pool: &Pool<Postgres>) -> Result<Vec<CartLine>, Error> {
    let lines: Vec<CartLine> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(lines)
}

pub async fn build_shopping_list(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingListEntry>, Error> {
    let lines = list_cart_lines(user_id, pool).await?;
    Ok(aggregate(lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, unit: &str, amount: i32) -> CartLine {
        CartLine {
            name: name.to_owned(),
            measurement_unit: unit.to_owned(),
            amount,
        }
    }

    fn entry(name: &str, unit: &str, total_amount: i64) -> ShoppingListEntry {
        ShoppingListEntry {
            name: name.to_owned(),
            measurement_unit: unit.to_owned(),
            total_amount,
        }
    }

    #[test]
    fn sums_amounts_across_recipes() {
        // recipe A: X 2; recipe B: X 3, Y 1
        let lines = vec![line("X", "g", 2), line("X", "g", 3), line("Y", "pcs", 1)];

        assert_eq!(aggregate(lines), vec![entry("X", "g", 5), entry("Y", "pcs", 1)]);
    }

    #[test]
    fn same_name_with_different_units_stays_apart() {
        let lines = vec![line("milk", "ml", 200), line("milk", "cup", 1), line("milk", "ml", 50)];

        assert_eq!(
            aggregate(lines),
            vec![entry("milk", "cup", 1), entry("milk", "ml", 250)]
        );
    }

    #[test]
    fn order_does_not_depend_on_input_order() {
        let forward = aggregate(vec![line("b", "g", 1), line("a", "g", 1)]);
        let backward = aggregate(vec![line("a", "g", 1), line("b", "g", 1)]);

        assert_eq!(forward, backward);
        assert_eq!(forward[0].name, "a");
    }

    #[test]
    fn empty_cart_renders_header_only() {
        let csv = render_csv(&aggregate(vec![]));

        assert_eq!(csv, "\u{feff}Ingredient,Unit,Amount\r\n");
    }

    #[test]
    fn rows_follow_the_header_and_are_quoted_when_needed() {
        let csv = render_csv(&[entry("salt, sea", "g", 5), entry("\"fancy\" oil", "ml", 30)]);
        let rows: Vec<&str> = csv.trim_start_matches(BOM).split("\r\n").collect();

        assert!(csv.starts_with(BOM));
        assert_eq!(rows[0], "Ingredient,Unit,Amount");
        assert_eq!(rows[1], "\"salt, sea\",g,5");
        assert_eq!(rows[2], "\"\"\"fancy\"\" oil\",ml,30");
        assert_eq!(rows[3], "");
    }
}
