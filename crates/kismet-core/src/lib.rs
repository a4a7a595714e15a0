//! Core of Kismet: turn model output into displayable segments, drive a
//! generation screen through its states, and keep saved results in SQLite.

pub mod config;
pub mod error;
pub mod export;
pub mod files;
pub mod imagegen;
pub mod kind;
pub mod llm;
pub mod model;
pub mod parse;
pub mod screen;
pub mod state;
pub mod storage;
pub mod view;

pub use error::{KismetError, Result};
pub use screen::Screen;
