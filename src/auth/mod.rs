//! Permission tokens and allow-sets
//!
//! A token is a single alphabetic character. The set of tokens granted to a
//! subject is its allow-set, which downstream consumers use to filter text.

mod grants;
mod tokens;

pub use grants::{AllowDelta, AllowSet};
pub use tokens::{
    check_token, parse_subject_list, parse_subject_name, parse_token, parse_token_list,
    TokenError, MAX_SUBJECT_NAME_LEN,
};
