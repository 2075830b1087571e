pub mod error;
pub mod industry;
pub mod traits;
pub mod types;

pub use error::*;
pub use industry::{all_industries, industry_color, DEFAULT_INDUSTRY_COLOR, INDUSTRIES};
pub use traits::*;
pub use types::*;
