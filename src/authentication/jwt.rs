use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::User;
use crate::error::Error;
use crate::schema::{UserRole, Uuid};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub username: String,
    pub user_uid: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Uuid, username: String, uid: UserRole, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = now
            .checked_add_signed(lifetime)
            .map_or(i64::MAX, |exp| exp.timestamp());

        Self {
            user_id: id,
            username,
            user_uid: uid,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
    pub user_uid: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(Error::Forbidden);
        }
        Ok(())
    }

    /// Owners may always touch their own rows; others need the broader action.
    pub fn authenticate_owner(
        &self,
        owner_id: Uuid,
        own: ActionType,
        all: ActionType,
    ) -> Result<(), Error> {
        if owner_id == self.user_id {
            self.authenticate(own)
        } else {
            self.authenticate(all)
        }
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            username: value.username,
            user_id: value.user_id,
            is_admin: value.user_uid == UserRole::Admin,
            user_uid: value.user_uid,
        }
    }
}

fn signing_key(secret: &str) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("Invalid signing key: {e}")))
}

pub fn generate_jwt_session(user: &User, secret: &str, lifetime: Duration) -> Result<String, Error> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(user.id, user.username.to_owned(), user.uid.to_owned(), lifetime);

    claims
        .sign_with_key(&key)
        .map_err(|e| Error::Internal(format!("Could not sign token: {e}")))
}

pub fn verify_jwt_session(token: &str, secret: &str) -> Result<JwtSessionData, Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| Error::Unauthorized("Invalid token.".to_owned()))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(Error::Unauthorized("Token expired.".to_owned()));
    }

    Ok(session)
}
