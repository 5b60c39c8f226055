mod claims;
mod dealer;
mod error;
mod game;
mod input;
mod player;
mod recording;
mod table;
mod timer;
pub use claims::*;
pub use dealer::*;
pub use error::*;
pub use game::*;
pub use input::*;
pub use player::*;
pub use recording::*;
pub use table::*;
pub use timer::*;
