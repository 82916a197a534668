use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use crate::error::Error;

use super::jwt::{verify_jwt_session, SessionData};

const TOKEN_SCHEMES: &[&str] = &["Token ", "Bearer "];

fn parse_authorization(header: &str, secret: &str) -> Result<SessionData, Error> {
    let token = TOKEN_SCHEMES
        .iter()
        .find_map(|scheme| header.strip_prefix(scheme))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::Unauthorized("Invalid token header.".to_owned()))?;

    verify_jwt_session(token, secret).map(SessionData::from)
}

/// Requires a valid `Authorization: Token <jwt>` header.
pub fn with_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move {
            match header {
                Some(header) => parse_authorization(&header, &secret).map_err(Rejection::from),
                None => Err(Error::unauthorized().into()),
            }
        }
    })
}

/// Anonymous requests pass through as `None`; a present but broken token is still rejected.
pub fn with_possible_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move {
            match header {
                Some(header) => parse_authorization(&header, &secret)
                    .map(Some)
                    .map_err(Rejection::from),
                None => Ok(None),
            }
        }
    })
}
