pub mod config;
pub mod errors;
pub mod model;
pub mod stage;
pub mod table;
pub mod tournament;
pub mod trial;

pub use config::*;
pub use errors::*;
pub use model::*;
pub use stage::*;
pub use table::*;
pub use tournament::*;
pub use trial::*;
