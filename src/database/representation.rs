//! JSON shapes returned by the API and the per-request viewer snapshot used to fill
//! in `is_favorited`, `is_in_shopping_cart` and `is_subscribed`.
//!
//! Every builder batches its lookups: one query per relation for the whole page,
//! never one per rendered item.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::{
    actions::{
        ingredients::list_recipe_parts,
        membership::{list_memberships, MembershipKind},
        recipes::{count_author_recipes, list_author_recipes},
        tags::list_recipe_tags,
        users::list_profiles,
    },
    error::Error,
    jwt::SessionData,
    media::MediaStorage,
    schema::{AuthorRecipeCount, LinkedRecipeTag, Recipe, RecipePart, Tag, UserProfile, Uuid},
};

/// What the current viewer is related to, restricted to the ids being rendered.
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    pub user_id: Option<Uuid>,
    favorites: HashSet<Uuid>,
    cart: HashSet<Uuid>,
    following: HashSet<Uuid>,
}

impl ViewerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(
        user_id: Uuid,
        favorites: HashSet<Uuid>,
        cart: HashSet<Uuid>,
        following: HashSet<Uuid>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            favorites,
            cart,
            following,
        }
    }

    pub async fn load(
        session: Option<&SessionData>,
        recipe_ids: &[Uuid],
        author_ids: &[Uuid],
        pool: &Pool<Postgres>,
    ) -> Result<Self, Error> {
        let Some(session) = session else {
            return Ok(Self::anonymous());
        };
        let user_id = session.user_id;

        Ok(Self::new(
            user_id,
            list_memberships(MembershipKind::Favorite, user_id, recipe_ids, pool).await?,
            list_memberships(MembershipKind::Cart, user_id, recipe_ids, pool).await?,
            list_memberships(MembershipKind::Follow, user_id, author_ids, pool).await?,
        ))
    }

    pub fn is_favorited(&self, recipe_id: Uuid) -> bool {
        self.user_id.is_some() && self.favorites.contains(&recipe_id)
    }

    pub fn is_in_cart(&self, recipe_id: Uuid) -> bool {
        self.user_id.is_some() && self.cart.contains(&recipe_id)
    }

    pub fn is_subscribed(&self, author_id: Uuid) -> bool {
        self.user_id.is_some() && self.following.contains(&author_id)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(profile: UserProfile, viewer: &ViewerContext) -> Self {
        Self {
            is_subscribed: viewer.is_subscribed(profile.id),
            email: profile.email,
            id: profile.id,
            username: profile.username,
            first_name: profile.first_name,
            last_name: profile.last_name,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeView {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipePart>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeShortView {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShortView {
    pub fn new(recipe: Recipe, media: &MediaStorage) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: media.url_for(&recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct AuthorView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeShortView>,
    pub recipes_count: i64,
}

/// Related rows for a batch of recipes, keyed by recipe/author id.
#[derive(Debug, Default)]
pub struct RecipeRelations {
    pub authors: HashMap<Uuid, UserProfile>,
    pub tags: HashMap<Uuid, Vec<Tag>>,
    pub parts: HashMap<Uuid, Vec<RecipePart>>,
}

impl RecipeRelations {
    pub fn new(
        authors: Vec<UserProfile>,
        tags: Vec<LinkedRecipeTag>,
        parts: Vec<RecipePart>,
    ) -> Self {
        let mut relations = Self {
            authors: authors.into_iter().map(|a| (a.id, a)).collect(),
            ..Default::default()
        };
        for tag in tags {
            relations
                .tags
                .entry(tag.recipe_id)
                .or_default()
                .push(tag.into());
        }
        for part in parts {
            relations.parts.entry(part.recipe_id).or_default().push(part);
        }
        relations
    }
}

fn unique_ids(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Pure assembly step of [`build_recipe_views`]; recipes whose author row is
/// missing are skipped.
pub fn assemble_recipe_views(
    recipes: Vec<Recipe>,
    mut relations: RecipeRelations,
    viewer: &ViewerContext,
    media: &MediaStorage,
) -> Vec<RecipeView> {
    recipes
        .into_iter()
        .filter_map(|recipe| {
            let author = relations.authors.get(&recipe.author_id)?.clone();

            Some(RecipeView {
                id: recipe.id,
                tags: relations.tags.remove(&recipe.id).unwrap_or_default(),
                author: UserView::new(author, viewer),
                ingredients: relations.parts.remove(&recipe.id).unwrap_or_default(),
                is_favorited: viewer.is_favorited(recipe.id),
                is_in_shopping_cart: viewer.is_in_cart(recipe.id),
                name: recipe.name,
                image: media.url_for(&recipe.image),
                text: recipe.text,
                cooking_time: recipe.cooking_time,
            })
        })
        .collect()
}

/// Full representation of each recipe, in input order.
pub async fn build_recipe_views(
    recipes: Vec<Recipe>,
    session: Option<&SessionData>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeView>, Error> {
    let recipe_ids: Vec<Uuid> = recipes.iter().map(|r| r.id).collect();
    let author_ids = unique_ids(recipes.iter().map(|r| r.author_id));

    let relations = RecipeRelations::new(
        list_profiles(pool, &author_ids).await?,
        list_recipe_tags(pool, &recipe_ids).await?,
        list_recipe_parts(pool, &recipe_ids).await?,
    );
    let viewer = ViewerContext::load(session, &recipe_ids, &author_ids, pool).await?;

    Ok(assemble_recipe_views(recipes, relations, &viewer, media))
}

pub async fn build_recipe_view(
    recipe: Recipe,
    session: Option<&SessionData>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, Error> {
    build_recipe_views(vec![recipe], session, media, pool)
        .await?
        .pop()
        .ok_or(Error::NotFound)
}

pub async fn build_user_views(
    profiles: Vec<UserProfile>,
    session: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserView>, Error> {
    let ids: Vec<Uuid> = profiles.iter().map(|p| p.id).collect();
    let viewer = ViewerContext::load(session, &[], &ids, pool).await?;

    Ok(profiles
        .into_iter()
        .map(|profile| UserView::new(profile, &viewer))
        .collect())
}

/// Pure assembly step of [`build_author_views`]. `recipes` must be newest first;
/// each author keeps at most `recipes_limit` previews while `recipes_count`
/// always reports the full number.
pub fn assemble_author_views(
    authors: Vec<UserProfile>,
    recipes: Vec<Recipe>,
    counts: Vec<AuthorRecipeCount>,
    recipes_limit: Option<usize>,
    viewer: &ViewerContext,
    media: &MediaStorage,
) -> Vec<AuthorView> {
    let mut by_author: HashMap<Uuid, Vec<Recipe>> = HashMap::new();
    for recipe in recipes {
        by_author.entry(recipe.author_id).or_default().push(recipe);
    }
    let counts: HashMap<Uuid, i64> = counts.into_iter().map(|c| (c.author_id, c.count)).collect();

    authors
        .into_iter()
        .map(|author| {
            let recipes = by_author.remove(&author.id).unwrap_or_default();

            AuthorView {
                recipes_count: counts.get(&author.id).copied().unwrap_or(0),
                recipes: recipes
                    .into_iter()
                    .take(recipes_limit.unwrap_or(usize::MAX))
                    .map(|recipe| RecipeShortView::new(recipe, media))
                    .collect(),
                user: UserView::new(author, viewer),
            }
        })
        .collect()
}

/// Authors with a bounded preview of their recipes and their total recipe count.
pub async fn build_author_views(
    authors: Vec<UserProfile>,
    recipes_limit: Option<usize>,
    session: Option<&SessionData>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<Vec<AuthorView>, Error> {
    let author_ids: Vec<Uuid> = authors.iter().map(|a| a.id).collect();

    let recipes = list_author_recipes(&author_ids, recipes_limit, pool).await?;
    let counts = count_author_recipes(&author_ids, pool).await?;
    let viewer = ViewerContext::load(session, &[], &author_ids, pool).await?;

    Ok(assemble_author_views(
        authors,
        recipes,
        counts,
        recipes_limit,
        &viewer,
        media,
    ))
}

pub async fn build_author_view(
    author: UserProfile,
    recipes_limit: Option<usize>,
    session: Option<&SessionData>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<AuthorView, Error> {
    build_author_views(vec![author], recipes_limit, session, media, pool)
        .await?
        .pop()
        .ok_or(Error::NotFound)
}
