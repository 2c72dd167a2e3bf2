//! Autocomplete suggestions for the identifier under the caret

pub mod identifier;
pub mod popularity;
pub mod suggester;

pub use identifier::{locate, Located};
pub use popularity::PopularityCounts;
pub use suggester::{
    Completion, Completions, SuggestRequest, SuggestResponse, Suggester, Suggestion,
};
