pub const MIN_AMOUNT: i32 = 1;
pub const MIN_COOKING_TIME: i32 = 1;

pub const MAX_LENGTH_NAME: usize = 200;
pub const MAX_LENGTH_USER_NAME: usize = 150;
pub const MAX_LENGTH_EMAIL: usize = 254;
pub const MIN_LENGTH_PASSWORD: usize = 8;

pub const FORBIDDEN_USERNAME: &str = "me";

pub const USERNAME_PATTERN: &str = r"^[\w.@+-]+$";
pub const SLUG_PATTERN: &str = r"^[-a-zA-Z0-9_]+$";
pub const COLOR_PATTERN: &str = r"^#[0-9a-fA-F]{6}$";
pub const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

pub const MAX_PAGE_SIZE: i64 = 100;

pub const SHOPPING_LIST_HEADER: [&str; 3] = ["Ingredient", "Unit", "Amount"];
pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.csv";

pub const RECIPE_IMAGE_DIR: &str = "recipes";

/// Request bodies carry base64 images inline.
pub const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;
