//! AI Dungeon Master module.
//!
//! Contains the DM agent and the chat model seam it talks through.

mod agent;
mod model;

pub use agent::{DmError, DmResponse, DungeonMaster};
pub use model::ChatModel;
