use std::{collections::HashSet, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::Deserialize;

use crate::{
    constants::{
        EMAIL_PATTERN, FORBIDDEN_USERNAME, MAX_LENGTH_EMAIL, MAX_LENGTH_NAME,
        MAX_LENGTH_USER_NAME, MIN_AMOUNT, MIN_COOKING_TIME, MIN_LENGTH_PASSWORD,
        USERNAME_PATTERN,
    },
    media::ImageUpload,
    schema::Uuid,
};

use super::error::{Error, FieldErrors};

pub const INGREDIENTS_REQUIRED: &str = "ingredients required";
pub const DUPLICATE_INGREDIENT: &str = "duplicate ingredient";
pub const AMOUNT_TOO_LOW: &str = "amount too low";
pub const TAGS_REQUIRED: &str = "tags required";
pub const DUPLICATE_TAG: &str = "duplicate tag";
pub const COOKING_TIME_TOO_LOW: &str = "cooking time too low";
pub const FIELD_REQUIRED: &str = "This field is required.";

/// Collects errors per field so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_owned())
            .or_default()
            .push(message.to_owned());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn finish<T>(self, value: T) -> Result<T, Error> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientEntry {
    pub id: Uuid,
    pub amount: i32,
}

/// Request body of recipe create/update.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeForm {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
    pub tags: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<IngredientEntry>>,
}

/// A validated recipe write. Scalar fields are `None` only on partial updates.
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<ImageUpload>,
    pub tags: Vec<Uuid>,
    pub ingredients: Vec<IngredientEntry>,
}

impl RecipeForm {
    /// Validates the whole form before anything touches the database.
    /// With `partial`, missing scalar fields keep their stored values;
    /// tags and ingredients are always required since they are replaced wholesale.
    pub fn validate(self, partial: bool) -> Result<RecipeDraft, Error> {
        let mut v = Validator::default();

        let name = self.name.map(|name| name.trim().to_owned());
        match &name {
            Some(name) => {
                v.check(!name.is_empty(), "name", "name required");
                v.check(
                    name.chars().count() <= MAX_LENGTH_NAME,
                    "name",
                    &format!("Ensure this field has no more than {MAX_LENGTH_NAME} characters."),
                );
            }
            None if !partial => v.add("name", FIELD_REQUIRED),
            None => {}
        }

        match &self.text {
            Some(text) => v.check(!text.trim().is_empty(), "text", "text required"),
            None if !partial => v.add("text", FIELD_REQUIRED),
            None => {}
        }

        match self.cooking_time {
            Some(time) => v.check(time >= MIN_COOKING_TIME, "cooking_time", COOKING_TIME_TOO_LOW),
            None if !partial => v.add("cooking_time", FIELD_REQUIRED),
            None => {}
        }

        let image = match self.image.as_deref() {
            Some(data) => match ImageUpload::from_data_uri(data) {
                Ok(image) => Some(image),
                Err(message) => {
                    v.add("image", message);
                    None
                }
            },
            None => {
                if !partial {
                    v.add("image", FIELD_REQUIRED);
                }
                None
            }
        };

        let ingredients = self.ingredients.unwrap_or_default();
        validate_ingredients(&ingredients, &mut v);

        let tags = self.tags.unwrap_or_default();
        validate_tags(&tags, &mut v);

        v.finish(RecipeDraft {
            name,
            text: self.text,
            cooking_time: self.cooking_time,
            image,
            tags,
            ingredients,
        })
    }
}

fn validate_ingredients(ingredients: &[IngredientEntry], v: &mut Validator) {
    if ingredients.is_empty() {
        v.add("ingredients", INGREDIENTS_REQUIRED);
        return;
    }

    let mut seen = HashSet::new();
    if !ingredients.iter().all(|entry| seen.insert(entry.id)) {
        v.add("ingredients", DUPLICATE_INGREDIENT);
    }
    if ingredients.iter().any(|entry| entry.amount < MIN_AMOUNT) {
        v.add("ingredients", AMOUNT_TOO_LOW);
    }
}

fn validate_tags(tags: &[Uuid], v: &mut Validator) {
    if tags.is_empty() {
        v.add("tags", TAGS_REQUIRED);
        return;
    }

    let mut seen = HashSet::new();
    if !tags.iter().all(|tag| seen.insert(*tag)) {
        v.add("tags", DUPLICATE_TAG);
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn username_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, USERNAME_PATTERN)
}

fn email_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, EMAIL_PATTERN)
}

pub fn validate_username(username: &str, v: &mut Validator) {
    if username.is_empty() {
        v.add("username", FIELD_REQUIRED);
        return;
    }
    if username.eq_ignore_ascii_case(FORBIDDEN_USERNAME) {
        v.add("username", "Username can not be \"me\".");
    }
    v.check(
        username.chars().count() <= MAX_LENGTH_USER_NAME,
        "username",
        &format!("Ensure this field has no more than {MAX_LENGTH_USER_NAME} characters."),
    );
    v.check(
        username_regex().is_match(username),
        "username",
        "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
    );
}

pub fn validate_email(email: &str, v: &mut Validator) {
    if email.is_empty() {
        v.add("email", FIELD_REQUIRED);
        return;
    }
    v.check(
        email.chars().count() <= MAX_LENGTH_EMAIL,
        "email",
        &format!("Ensure this field has no more than {MAX_LENGTH_EMAIL} characters."),
    );
    v.check(email_regex().is_match(email), "email", "Enter a valid email address.");
}

fn validate_person_name(field: &str, value: &str, v: &mut Validator) {
    v.check(!value.trim().is_empty(), field, FIELD_REQUIRED);
    v.check(
        value.chars().count() <= MAX_LENGTH_USER_NAME,
        field,
        &format!("Ensure this field has no more than {MAX_LENGTH_USER_NAME} characters."),
    );
}

fn validate_password(field: &str, password: &str, v: &mut Validator) {
    v.check(
        password.chars().count() >= MIN_LENGTH_PASSWORD,
        field,
        &format!("This password is too short. It must contain at least {MIN_LENGTH_PASSWORD} characters."),
    );
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterForm {
    pub fn validate(self) -> Result<Self, Error> {
        let mut v = Validator::default();
        validate_email(&self.email, &mut v);
        validate_username(&self.username, &mut v);
        validate_person_name("first_name", &self.first_name, &mut v);
        validate_person_name("last_name", &self.last_name, &mut v);
        validate_password("password", &self.password, &mut v);
        v.finish(self)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserUpdateForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserUpdateForm {
    pub fn validate(self) -> Result<Self, Error> {
        let mut v = Validator::default();
        if let Some(email) = &self.email {
            validate_email(email, &mut v);
        }
        if let Some(username) = &self.username {
            validate_username(username, &mut v);
        }
        if let Some(first_name) = &self.first_name {
            validate_person_name("first_name", first_name, &mut v);
        }
        if let Some(last_name) = &self.last_name {
            validate_person_name("last_name", last_name, &mut v);
        }
        v.finish(self)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SetPasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

impl SetPasswordForm {
    pub fn validate(self) -> Result<Self, Error> {
        let mut v = Validator::default();
        v.check(
            !self.current_password.is_empty(),
            "current_password",
            FIELD_REQUIRED,
        );
        validate_password("new_password", &self.new_password, &mut v);
        v.finish(self)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub measurement_unit: String,
}

/// Decoded query string. Keys may repeat (`tags=a&tags=b`).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    inner: Vec<(String, String)>,
}

impl From<Vec<(String, String)>> for QueryParams {
    fn from(inner: Vec<(String, String)>) -> Self {
        Self { inner }
    }
}

impl QueryParams {
    #[cfg(test)]
    pub fn parse(raw: &str) -> Self {
        serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
            .map(Self::from)
            .unwrap_or_default()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Values that do not parse are treated as absent.
    pub fn get_number<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr,
    {
        self.get_str(key).and_then(|value| value.trim().parse().ok())
    }

    /// `1`/`true` enable a filter flag; anything else leaves it off.
    pub fn get_flag(&self, key: &str) -> bool {
        matches!(self.get_str(key), Some("1") | Some("true"))
    }

    /// Re-encodes all pairs except `key`, which is set to `value`.
    pub fn with(&self, key: &str, value: &str) -> String {
        let pairs: Vec<(&str, &str)> = self
            .pairs_without(key)
            .chain(std::iter::once((key, value)))
            .collect();
        encode(&pairs)
    }

    pub fn without(&self, key: &str) -> String {
        encode(&self.pairs_without(key).collect::<Vec<_>>())
    }

    fn pairs_without<'a>(&'a self, key: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.inner
            .iter()
            .filter(move |(k, _)| k != key)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn encode(pairs: &[(&str, &str)]) -> String {
    // A sequence of string pairs always serializes.
    serde_urlencoded::to_string(pairs).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "data:image/png;base64,aGVsbG8=";

    fn entry(id: Uuid, amount: i32) -> IngredientEntry {
        IngredientEntry { id, amount }
    }

    fn full_form() -> RecipeForm {
        RecipeForm {
            name: Some("Borscht".to_owned()),
            text: Some("Boil everything.".to_owned()),
            cooking_time: Some(90),
            image: Some(PIXEL.to_owned()),
            tags: Some(vec![1, 2]),
            ingredients: Some(vec![entry(1, 200), entry(2, 3)]),
        }
    }

    fn field_errors(result: Result<RecipeDraft, Error>) -> FieldErrors {
        match result {
            Err(Error::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_form_passes() {
        let draft = full_form().validate(false).unwrap();

        assert_eq!(draft.name.as_deref(), Some("Borscht"));
        assert_eq!(draft.tags, vec![1, 2]);
        assert_eq!(draft.ingredients.len(), 2);
        assert_eq!(draft.image.map(|image| image.extension), Some("png".to_owned()));
    }

    #[test]
    fn empty_ingredients_are_rejected() {
        let form = RecipeForm {
            ingredients: Some(vec![]),
            ..full_form()
        };

        let errors = field_errors(form.validate(false));
        assert_eq!(errors["ingredients"], vec![INGREDIENTS_REQUIRED]);
    }

    #[test]
    fn duplicate_ingredient_is_rejected() {
        let form = RecipeForm {
            ingredients: Some(vec![entry(4, 1), entry(4, 2)]),
            ..full_form()
        };

        let errors = field_errors(form.validate(false));
        assert_eq!(errors["ingredients"], vec![DUPLICATE_INGREDIENT]);
    }

    #[test]
    fn zero_amount_is_rejected() {
        let form = RecipeForm {
            ingredients: Some(vec![entry(1, 0)]),
            ..full_form()
        };

        let errors = field_errors(form.validate(false));
        assert_eq!(errors["ingredients"], vec![AMOUNT_TOO_LOW]);
    }

    #[test]
    fn tag_rules() {
        let empty = RecipeForm {
            tags: Some(vec![]),
            ..full_form()
        };
        assert_eq!(field_errors(empty.validate(false))["tags"], vec![TAGS_REQUIRED]);

        let duplicate = RecipeForm {
            tags: Some(vec![3, 3]),
            ..full_form()
        };
        assert_eq!(field_errors(duplicate.validate(false))["tags"], vec![DUPLICATE_TAG]);
    }

    #[test]
    fn every_failing_field_is_reported() {
        let form = RecipeForm {
            cooking_time: Some(0),
            tags: None,
            ingredients: None,
            ..full_form()
        };

        let errors = field_errors(form.validate(false));
        assert_eq!(errors["cooking_time"], vec![COOKING_TIME_TOO_LOW]);
        assert_eq!(errors["tags"], vec![TAGS_REQUIRED]);
        assert_eq!(errors["ingredients"], vec![INGREDIENTS_REQUIRED]);
    }

    #[test]
    fn partial_update_still_requires_relations() {
        let form = RecipeForm {
            tags: Some(vec![1]),
            ingredients: Some(vec![entry(1, 1)]),
            ..Default::default()
        };
        let draft = form.validate(true).unwrap();
        assert!(draft.name.is_none());
        assert!(draft.image.is_none());

        let errors = field_errors(RecipeForm::default().validate(true));
        assert!(errors.contains_key("tags"));
        assert!(errors.contains_key("ingredients"));
        assert!(!errors.contains_key("name"));
    }

    #[test]
    fn create_requires_scalar_fields() {
        let form = RecipeForm {
            tags: Some(vec![1]),
            ingredients: Some(vec![entry(1, 1)]),
            ..Default::default()
        };

        let errors = field_errors(form.validate(false));
        for field in ["name", "text", "cooking_time", "image"] {
            assert_eq!(errors[field], vec![FIELD_REQUIRED], "{field}");
        }
    }

    #[test]
    fn username_me_is_forbidden_in_any_case() {
        for name in ["me", "Me", "ME", "mE"] {
            let mut v = Validator::default();
            validate_username(name, &mut v);
            assert!(v.finish(()).is_err(), "{name}");
        }

        let mut v = Validator::default();
        validate_username("meat.lover+1", &mut v);
        assert!(v.finish(()).is_ok());
    }

    #[test]
    fn username_pattern_rejects_spaces() {
        let mut v = Validator::default();
        validate_username("two words", &mut v);
        assert!(v.finish(()).is_err());
    }

    #[test]
    fn register_form_collects_errors() {
        let form = RegisterForm {
            email: "not-an-email".to_owned(),
            username: "me".to_owned(),
            first_name: String::new(),
            last_name: "Ivanov".to_owned(),
            password: "short".to_owned(),
        };

        match form.validate() {
            Err(Error::Validation(errors)) => {
                assert!(errors.contains_key("email"));
                assert!(errors.contains_key("username"));
                assert!(errors.contains_key("first_name"));
                assert!(errors.contains_key("password"));
                assert!(!errors.contains_key("last_name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn query_params_keep_repeated_keys() {
        let params = QueryParams::parse("tags=breakfast&tags=dinner&page=2&name=%D0%BC%D0%BE+x");

        assert_eq!(params.get_all("tags"), vec!["breakfast", "dinner"]);
        assert_eq!(params.get_number::<i64>("page"), Some(2));
        assert_eq!(params.get_str("name"), Some("мо x"));
        assert_eq!(params.get_str("missing"), None);
    }

    #[test]
    fn unparseable_numbers_are_absent() {
        let params = QueryParams::parse("recipes_limit=abc&limit=-1");

        assert_eq!(params.get_number::<usize>("recipes_limit"), None);
        assert_eq!(params.get_number::<usize>("limit"), None);
        assert_eq!(params.get_number::<i64>("limit"), Some(-1));
    }

    #[test]
    fn with_replaces_only_the_given_key() {
        let params = QueryParams::parse("tags=a&page=1&limit=6");

        assert_eq!(params.with("page", "2"), "tags=a&limit=6&page=2");
        assert_eq!(params.without("page"), "tags=a&limit=6");
    }

    #[test]
    fn links_are_reencoded() {
        let params = QueryParams::parse("name=%D0%BC%D0%BE+x&tags=a%26b&page=3");

        assert_eq!(params.get_str("tags"), Some("a&b"));
        assert_eq!(params.without("page"), "name=%D0%BC%D0%BE+x&tags=a%26b");
        assert_eq!(QueryParams::parse(&params.with("page", "4")).get_str("tags"), Some("a&b"));
    }

    #[test]
    fn stray_percent_is_kept() {
        let params = QueryParams::parse("q=100%&r=%zz");

        assert_eq!(params.get_str("q"), Some("100%"));
        assert_eq!(params.get_str("r"), Some("%zz"));
    }
}
