//! Dice rolling.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error type for dice rolling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice type: d{sides}. Valid types: {valid}")]
    InvalidDieType { sides: u32, valid: String },

    #[error("Invalid number of dice: {count}. Must be between 1 and {max}")]
    InvalidCount { count: u32, max: u32 },

    #[error("Invalid modifier: {modifier}. Must be between -{max} and {max}")]
    InvalidModifier { modifier: i32, max: i32 },

    #[error("Roll total out of range")]
    TotalOutOfRange,
}

/// Largest modifier accepted in either direction.
pub const MAX_MODIFIER: i32 = 1000;

/// Standard D&D die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// The outcome of a roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    /// `"2d6+3"`, `"1d20"`.
    pub expression: String,
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}

impl DiceRoll {
    fn new(count: u32, die: DieType, modifier: i32, rolls: Vec<u32>) -> Result<Self, DiceError> {
        let expression = if modifier != 0 {
            format!("{count}{die}{modifier:+}")
        } else {
            format!("{count}{die}")
        };
        let sum: i64 = rolls.iter().map(|&r| i64::from(r)).sum();
        let total = i32::try_from(sum + i64::from(modifier))
            .map_err(|_| DiceError::TotalOutOfRange)?;
        Ok(Self {
            expression,
            rolls,
            modifier,
            total,
        })
    }
}

impl fmt::Display for DiceRoll {
    /// `Rolling 2d6+3: [4, 2] +3 = 9`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rolls = self
            .rolls
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Rolling {}: [{}]", self.expression, rolls)?;
        if self.modifier != 0 {
            write!(f, " {:+}", self.modifier)?;
        }
        write!(f, " = {}", self.total)
    }
}

/// Rolls dice within configured limits.
#[derive(Debug, Clone)]
pub struct DiceRoller {
    max_dice: u32,
    valid_sides: Vec<u32>,
}

impl Default for DiceRoller {
    fn default() -> Self {
        Self::new(20, vec![4, 6, 8, 10, 12, 20, 100])
    }
}

impl DiceRoller {
    pub fn new(max_dice: u32, valid_sides: Vec<u32>) -> Self {
        Self {
            max_dice,
            valid_sides,
        }
    }

    pub fn roll(&self, count: u32, sides: u32, modifier: i32) -> Result<DiceRoll, DiceError> {
        self.roll_with_rng(count, sides, modifier, &mut rand::thread_rng())
    }

    pub fn roll_with_rng<R: Rng>(
        &self,
        count: u32,
        sides: u32,
        modifier: i32,
        rng: &mut R,
    ) -> Result<DiceRoll, DiceError> {
        let die = DieType::from_sides(sides)
            .filter(|_| self.valid_sides.contains(&sides))
            .ok_or_else(|| DiceError::InvalidDieType {
                sides,
                valid: self
                    .valid_sides
                    .iter()
                    .map(|s| format!("d{s}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        if count < 1 || count > self.max_dice {
            return Err(DiceError::InvalidCount {
                count,
                max: self.max_dice,
            });
        }

        if !(-MAX_MODIFIER..=MAX_MODIFIER).contains(&modifier) {
            return Err(DiceError::InvalidModifier {
                modifier,
                max: MAX_MODIFIER,
            });
        }

        let rolls = (0..count).map(|_| rng.gen_range(1..=sides)).collect();
        DiceRoll::new(count, die, modifier, rolls)
    }
}
