use crate::{jwt::SessionData, schema::UserRole};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnMemberships,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnMemberships,
            ActionType::ManageAllRecipes,
            ActionType::ManageCatalog,
        ],
    ),
];

#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum ActionType {
    CreateRecipes,
    ManageOwnRecipes,
    ManageOwnMemberships,
    ManageAllRecipes,
    /// Create tags and ingredients.
    ManageCatalog,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        let user_uid = &session.user_uid;

        ACTION_TABLE
            .iter()
            .find_map(|(uid, actions)| {
                if user_uid != uid {
                    return None;
                }

                Some(actions.contains(&self))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: i32, user_uid: UserRole) -> SessionData {
        SessionData {
            user_id,
            username: "cook".to_owned(),
            is_admin: user_uid == UserRole::Admin,
            user_uid,
        }
    }

    #[test]
    fn users_manage_only_their_own_recipes() {
        let user = session(1, UserRole::User);

        assert!(ActionType::ManageOwnRecipes.authenticate(&user));
        assert!(!ActionType::ManageAllRecipes.authenticate(&user));
        assert!(!ActionType::ManageCatalog.authenticate(&user));
        assert!(user
            .authenticate_owner(1, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes)
            .is_ok());
        assert!(user
            .authenticate_owner(2, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes)
            .is_err());
    }

    #[test]
    fn admins_manage_everything() {
        let admin = session(1, UserRole::Admin);

        assert!(admin.authenticate(ActionType::ManageCatalog).is_ok());
        assert!(admin
            .authenticate_owner(2, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes)
            .is_ok());
    }
}
