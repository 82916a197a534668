use std::convert::Infallible;

use serde::de::DeserializeOwned;
use warp::{
    filters::BoxedFilter,
    reject::Rejection,
    reply::{Reply, Response},
    Filter,
};

use crate::{
    actions::membership::MembershipKind,
    constants::MAX_BODY_SIZE,
    error::handle_rejection,
    form::{
        IngredientForm, LoginForm, QueryParams, RecipeForm, RegisterForm, SetPasswordForm,
        TagForm, UserUpdateForm,
    },
    jwt::SessionData,
    middleware::{with_possible_session, with_session},
    schema::Uuid,
};

use super::{handlers, state::State};

fn with_state(state: &State) -> impl Filter<Extract = (State,), Error = Infallible> + Clone {
    let state = state.clone();
    warp::any().map(move || state.clone())
}

/// Decoded query string; an absent one parses as empty.
fn with_query() -> impl Filter<Extract = (QueryParams,), Error = Infallible> + Clone {
    warp::query::<Vec<(String, String)>>()
        .or(warp::any().map(Vec::new))
        .unify()
        .map(QueryParams::from)
}

fn with_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

fn session(state: &State) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    with_session(state.secret.clone())
}

fn possible_session(
    state: &State,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    with_possible_session(state.secret.clone())
}

fn tag_routes(state: &State) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "tags")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::list_tags);

    let create = warp::path!("api" / "tags")
        .and(warp::post())
        .and(session(state))
        .and(with_body::<TagForm>())
        .and(with_state(state))
        .and_then(handlers::create_tag);

    let detail = warp::path!("api" / "tags" / Uuid)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::get_tag);

    list.or(create).unify().or(detail).unify().boxed()
}

fn ingredient_routes(state: &State) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "ingredients")
        .and(warp::get())
        .and(with_query())
        .and(with_state(state))
        .and_then(handlers::list_ingredients);

    let create = warp::path!("api" / "ingredients")
        .and(warp::post())
        .and(session(state))
        .and(with_body::<IngredientForm>())
        .and(with_state(state))
        .and_then(handlers::create_ingredient);

    let detail = warp::path!("api" / "ingredients" / Uuid)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::get_ingredient);

    list.or(create).unify().or(detail).unify().boxed()
}

/// `POST`/`DELETE /api/recipes/{id}/<segment>/` toggling one membership kind.
fn recipe_membership_routes(
    state: &State,
    segment: &'static str,
    kind: MembershipKind,
) -> BoxedFilter<(Response,)> {
    let path = warp::path("api")
        .and(warp::path("recipes"))
        .and(warp::path::param::<Uuid>())
        .and(warp::path(segment))
        .and(warp::path::end());

    let add = path
        .clone()
        .and(warp::post())
        .and(session(state))
        .and(with_state(state))
        .and_then(move |id: Uuid, session: SessionData, state: State| {
            handlers::add_recipe_membership(kind, id, session, state)
        });

    let remove = path
        .and(warp::delete())
        .and(session(state))
        .and(with_state(state))
        .and_then(move |id: Uuid, session: SessionData, state: State| {
            handlers::remove_recipe_membership(kind, id, session, state)
        });

    add.or(remove).unify().boxed()
}

fn recipe_routes(state: &State) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "recipes")
        .and(warp::get())
        .and(warp::path::full())
        .and(with_query())
        .and(possible_session(state))
        .and(with_state(state))
        .and_then(handlers::list_recipes);

    let create = warp::path!("api" / "recipes")
        .and(warp::post())
        .and(session(state))
        .and(with_body::<RecipeForm>())
        .and(with_state(state))
        .and_then(handlers::create_recipe);

    let download = warp::path!("api" / "recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(session(state))
        .and(with_state(state))
        .and_then(handlers::download_shopping_cart);

    let detail = warp::path!("api" / "recipes" / Uuid)
        .and(warp::get())
        .and(possible_session(state))
        .and(with_state(state))
        .and_then(handlers::get_recipe);

    let update = warp::path!("api" / "recipes" / Uuid)
        .and(warp::patch())
        .and(session(state))
        .and(with_body::<RecipeForm>())
        .and(with_state(state))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("api" / "recipes" / Uuid)
        .and(warp::delete())
        .and(session(state))
        .and(with_state(state))
        .and_then(handlers::delete_recipe);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(recipe_membership_routes(state, "favorite", MembershipKind::Favorite))
        .unify()
        .or(recipe_membership_routes(state, "shopping_cart", MembershipKind::Cart))
        .unify()
        .boxed()
}

fn user_routes(state: &State) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "users")
        .and(warp::get())
        .and(warp::path::full())
        .and(with_query())
        .and(possible_session(state))
        .and(with_state(state))
        .and_then(handlers::list_users);

    let register = warp::path!("api" / "users")
        .and(warp::post())
        .and(with_body::<RegisterForm>())
        .and(with_state(state))
        .and_then(handlers::register);

    let me = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(session(state))
        .and(with_state(state))
        .and_then(handlers::me);

    let update_me = warp::path!("api" / "users" / "me")
        .and(warp::patch())
        .and(session(state))
        .and(with_body::<UserUpdateForm>())
        .and(with_state(state))
        .and_then(handlers::update_me);

    let set_password = warp::path!("api" / "users" / "set_password")
        .and(warp::post())
        .and(session(state))
        .and(with_body::<SetPasswordForm>())
        .and(with_state(state))
        .and_then(handlers::set_password);

    let subscriptions = warp::path!("api" / "users" / "subscriptions")
        .and(warp::get())
        .and(warp::path::full())
        .and(with_query())
        .and(session(state))
        .and(with_state(state))
        .and_then(handlers::list_subscriptions);

    let detail = warp::path!("api" / "users" / Uuid)
        .and(warp::get())
        .and(possible_session(state))
        .and(with_state(state))
        .and_then(handlers::get_user);

    let subscribe = warp::path!("api" / "users" / Uuid / "subscribe")
        .and(warp::post())
        .and(with_query())
        .and(session(state))
        .and(with_state(state))
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("api" / "users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(session(state))
        .and(with_state(state))
        .and_then(handlers::unsubscribe);

    list.or(register)
        .unify()
        .or(me)
        .unify()
        .or(update_me)
        .unify()
        .or(set_password)
        .unify()
        .or(subscriptions)
        .unify()
        .or(detail)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .boxed()
}

fn auth_routes(state: &State) -> BoxedFilter<(Response,)> {
    let login = warp::path!("api" / "auth" / "token" / "login")
        .and(warp::post())
        .and(with_body::<LoginForm>())
        .and(with_state(state))
        .and_then(handlers::login);

    let logout = warp::path!("api" / "auth" / "token" / "logout")
        .and(warp::post())
        .and(session(state))
        .and_then(handlers::logout);

    login.or(logout).unify().boxed()
}

fn media_routes(state: &State) -> BoxedFilter<(Response,)> {
    warp::path("media")
        .and(warp::fs::dir(state.media.root().to_path_buf()))
        .map(|file: warp::fs::File| file.into_response())
        .boxed()
}

/// The whole HTTP surface, with every rejection rendered as JSON.
pub fn routes(state: State) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    tag_routes(&state)
        .or(ingredient_routes(&state))
        .unify()
        .or(recipe_routes(&state))
        .unify()
        .or(user_routes(&state))
        .unify()
        .or(auth_routes(&state))
        .unify()
        .or(media_routes(&state))
        .unify()
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}
