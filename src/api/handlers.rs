use serde::Serialize;
use serde_json::json;
use warp::{
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    path::FullPath,
    reject::Rejection,
    reply::{self, Reply, Response},
};

use crate::{
    actions::{
        ingredients,
        membership::{self, MembershipKind},
        recipes::{self, RecipeFilter},
        shopping_list::{build_shopping_list, render_csv},
        subscriptions::{fetch_subscriptions, recipes_limit},
        tags, users,
    },
    authentication::permissions::ActionType,
    constants::SHOPPING_LIST_FILENAME,
    error::Error,
    form::{
        IngredientForm, LoginForm, QueryParams, RecipeForm, RegisterForm, SetPasswordForm,
        TagForm, UserUpdateForm,
    },
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    representation::{
        build_author_view, build_author_views, build_recipe_view, build_recipe_views,
        build_user_views, RecipeShortView, UserView, ViewerContext,
    },
    schema::{UserProfile, Uuid},
};

use super::state::State;

type HandlerResult = Result<Response, Rejection>;

fn json_with_status<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

fn ok<T: Serialize>(value: &T) -> HandlerResult {
    Ok(json_with_status(value, StatusCode::OK))
}

fn created<T: Serialize>(value: &T) -> HandlerResult {
    Ok(json_with_status(value, StatusCode::CREATED))
}

fn no_content() -> HandlerResult {
    Ok(StatusCode::NO_CONTENT.into_response())
}

// Tags & ingredients

pub async fn list_tags(state: State) -> HandlerResult {
    ok(&tags::list_tags(&state.pool).await?)
}

pub async fn get_tag(id: Uuid, state: State) -> HandlerResult {
    let tag = tags::get_tag(id, &state.pool).await?.ok_or(Error::NotFound)?;
    ok(&tag)
}

pub async fn create_tag(session: SessionData, form: TagForm, state: State) -> HandlerResult {
    session.authenticate(ActionType::ManageCatalog)?;

    let tag = tags::create_tag(&form.name, &form.color, &form.slug, &state.pool).await?;
    log::info!("Tag {} created by {}", tag.slug, session.username);
    created(&tag)
}

pub async fn list_ingredients(params: QueryParams, state: State) -> HandlerResult {
    ok(&ingredients::list_ingredients(params.get_str("name"), &state.pool).await?)
}

pub async fn get_ingredient(id: Uuid, state: State) -> HandlerResult {
    let ingredient = ingredients::get_ingredient(id, &state.pool)
        .await?
        .ok_or(Error::NotFound)?;
    ok(&ingredient)
}

pub async fn create_ingredient(
    session: SessionData,
    form: IngredientForm,
    state: State,
) -> HandlerResult {
    session.authenticate(ActionType::ManageCatalog)?;

    let ingredient =
        ingredients::create_ingredient(&form.name, &form.measurement_unit, &state.pool).await?;
    created(&ingredient)
}

// Recipes

fn recipe_filter(params: &QueryParams, session: Option<&SessionData>) -> RecipeFilter {
    let viewer = session.map(|s| s.user_id);

    RecipeFilter {
        author: params.get_number("author"),
        tags: params.get_all("tags").into_iter().map(str::to_owned).collect(),
        favorited_by: viewer.filter(|_| params.get_flag("is_favorited")),
        in_cart_of: viewer.filter(|_| params.get_flag("is_in_shopping_cart")),
    }
}

pub async fn list_recipes(
    path: FullPath,
    params: QueryParams,
    session: Option<SessionData>,
    state: State,
) -> HandlerResult {
    let request = PageRequest::from_query(&params, state.config.page_size);
    let filter = recipe_filter(&params, session.as_ref());

    let (rows, total) = recipes::fetch_recipes(&filter, request, &state.pool).await?;
    let views = build_recipe_views(rows, session.as_ref(), &state.media, &state.pool).await?;

    ok(&PageContext::from_rows(views, total, request, path.as_str(), &params)?)
}

pub async fn get_recipe(id: Uuid, session: Option<SessionData>, state: State) -> HandlerResult {
    let recipe = recipes::get_recipe(id, &state.pool)
        .await?
        .ok_or(Error::NotFound)?;

    ok(&build_recipe_view(recipe, session.as_ref(), &state.media, &state.pool).await?)
}

pub async fn create_recipe(session: SessionData, form: RecipeForm, state: State) -> HandlerResult {
    session.authenticate(ActionType::CreateRecipes)?;
    let draft = form.validate(false)?;

    let id = recipes::create_recipe(session.user_id, draft, &state.media, &state.pool).await?;
    let recipe = recipes::get_recipe(id, &state.pool)
        .await?
        .ok_or(Error::NotFound)?;

    created(&build_recipe_view(recipe, Some(&session), &state.media, &state.pool).await?)
}

pub async fn update_recipe(
    id: Uuid,
    session: SessionData,
    form: RecipeForm,
    state: State,
) -> HandlerResult {
    let recipe = recipes::get_recipe_mut(id, &session, &state.pool).await?;
    let draft = form.validate(true)?;

    recipes::update_recipe(&recipe, draft, &state.media, &state.pool).await?;
    let recipe = recipes::get_recipe(id, &state.pool)
        .await?
        .ok_or(Error::NotFound)?;

    ok(&build_recipe_view(recipe, Some(&session), &state.media, &state.pool).await?)
}

pub async fn delete_recipe(id: Uuid, session: SessionData, state: State) -> HandlerResult {
    let recipe = recipes::get_recipe_mut(id, &session, &state.pool).await?;

    recipes::delete_recipe(&recipe, &state.media, &state.pool).await?;
    no_content()
}

// Favorites & shopping cart

pub async fn add_recipe_membership(
    kind: MembershipKind,
    id: Uuid,
    session: SessionData,
    state: State,
) -> HandlerResult {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    membership::add_membership(kind, session.user_id, id, &state.pool).await?;
    let recipe = recipes::get_recipe(id, &state.pool)
        .await?
        .ok_or(Error::NotFound)?;

    created(&RecipeShortView::new(recipe, &state.media))
}

pub async fn remove_recipe_membership(
    kind: MembershipKind,
    id: Uuid,
    session: SessionData,
    state: State,
) -> HandlerResult {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    membership::remove_membership(kind, session.user_id, id, &state.pool).await?;
    no_content()
}

pub async fn download_shopping_cart(session: SessionData, state: State) -> HandlerResult {
    let entries = build_shopping_list(session.user_id, &state.pool).await?;
    log::debug!(
        "Shopping list for {} has {} entries",
        session.username,
        entries.len()
    );

    let response = warp::http::Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
        )
        .body(render_csv(&entries).into())
        .map_err(|e| Error::Internal(format!("Could not build CSV response: {e}")))?;

    Ok(response)
}

// Users

pub async fn list_users(
    path: FullPath,
    params: QueryParams,
    session: Option<SessionData>,
    state: State,
) -> HandlerResult {
    let request = PageRequest::from_query(&params, state.config.page_size);

    let (profiles, total) = users::fetch_users(request, &state.pool).await?;
    let views = build_user_views(profiles, session.as_ref(), &state.pool).await?;

    ok(&PageContext::from_rows(views, total, request, path.as_str(), &params)?)
}

pub async fn get_user(id: Uuid, session: Option<SessionData>, state: State) -> HandlerResult {
    let user = users::get_user_by_id(&state.pool, id)
        .await?
        .ok_or(Error::NotFound)?;

    let view = build_user_views(vec![user.into()], session.as_ref(), &state.pool)
        .await?
        .pop()
        .ok_or(Error::NotFound)?;
    ok(&view)
}

pub async fn register(form: RegisterForm, state: State) -> HandlerResult {
    let form = form.validate()?;

    let user = users::register_user(form, &state.pool).await?;
    created(&UserProfile::from(user))
}

pub async fn me(session: SessionData, state: State) -> HandlerResult {
    let user = users::get_user_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(Error::unauthorized)?;

    ok(&UserView::new(user.into(), &ViewerContext::anonymous()))
}

pub async fn update_me(session: SessionData, form: UserUpdateForm, state: State) -> HandlerResult {
    let form = form.validate()?;

    let user = users::update_user(session.user_id, form, &state.pool).await?;
    ok(&UserView::new(user.into(), &ViewerContext::anonymous()))
}

pub async fn set_password(session: SessionData, form: SetPasswordForm, state: State) -> HandlerResult {
    let form = form.validate()?;

    users::set_password(session.user_id, form, &state.pool).await?;
    log::info!("Password changed for {}", session.username);
    no_content()
}

// Subscriptions

pub async fn list_subscriptions(
    path: FullPath,
    params: QueryParams,
    session: SessionData,
    state: State,
) -> HandlerResult {
    let request = PageRequest::from_query(&params, state.config.page_size);

    let (authors, total) = fetch_subscriptions(session.user_id, request, &state.pool).await?;
    let views = build_author_views(
        authors,
        recipes_limit(&params),
        Some(&session),
        &state.media,
        &state.pool,
    )
    .await?;

    ok(&PageContext::from_rows(views, total, request, path.as_str(), &params)?)
}

pub async fn subscribe(
    id: Uuid,
    params: QueryParams,
    session: SessionData,
    state: State,
) -> HandlerResult {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    membership::add_membership(MembershipKind::Follow, session.user_id, id, &state.pool).await?;
    let author = users::get_user_by_id(&state.pool, id)
        .await?
        .ok_or(Error::NotFound)?;

    let view = build_author_view(
        author.into(),
        recipes_limit(&params),
        Some(&session),
        &state.media,
        &state.pool,
    )
    .await?;
    created(&view)
}

pub async fn unsubscribe(id: Uuid, session: SessionData, state: State) -> HandlerResult {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    membership::remove_membership(MembershipKind::Follow, session.user_id, id, &state.pool)
        .await?;
    no_content()
}

// Tokens

pub async fn login(form: LoginForm, state: State) -> HandlerResult {
    let token = users::login_user(form, &state.secret, state.token_lifetime(), &state.pool).await?;
    ok(&json!({ "auth_token": token }))
}

/// Tokens are stateless, so there is nothing to revoke.
pub async fn logout(session: SessionData) -> HandlerResult {
    log::debug!("{} logged out", session.username);
    no_content()
}
