//! Game mechanics the model can invoke through tools.

mod characters;
mod dice;
mod tools;

pub use characters::{
    character_id, ChangeLogEntry, CharacterAttributes, CharacterError, CharacterManager,
    CharacterRecord, HitPoints, UpdateType,
};
pub use dice::{DiceError, DiceRoll, DiceRoller, DieType, MAX_MODIFIER};
pub use tools::{EndSession, GameTools, GetCharacterInfo, RollDice, UpdateCharacter};
