pub mod path_processing;
pub mod tokens;

pub use path_processing::{expand_tilde, join_object_key, normalize_prefix};
pub use tokens::{arn_resource_name, attribute_token, is_token};
