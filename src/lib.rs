pub mod backends;
pub mod error;
pub mod keyboard;
pub mod keysym;
pub mod model;
pub mod modifiers;
pub mod session;
pub mod sim;
pub mod typing;
pub mod util;

pub use error::{KeyboardError, Result};
pub use keysym::LogicalKey;
pub use session::{Keyboard, SessionOptions};
pub use typing::{keyboard_group, keyboard_write, press_chord, type_text, Pacing, TypingReport};
