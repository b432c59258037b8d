mod value;
pub use value::*;

mod types;
pub use types::*;

mod string;
pub use string::*;

mod shared;
pub use shared::*;
