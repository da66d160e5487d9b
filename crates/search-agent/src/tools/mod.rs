//! Tools the search agent hands to the model.

mod web_search;

pub use web_search::{WebSearchParameters, WebSearchTool};
