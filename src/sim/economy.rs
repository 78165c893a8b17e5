//! Per-player economy: elixir, hand and deck cycle

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::consts::{DECK_SIZE, HAND_SIZE};
use crate::error::ConfigError;
use crate::settings::ElixirConfig;

/// Elixir shortfalls smaller than this are treated as rounding noise
const ELIXIR_EPSILON: f32 = 1e-4;

/// Elixir and card state of one player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    elixir: f32,
    max_elixir: f32,
    /// Cards currently playable
    hand: Vec<String>,
    /// Remaining deck in draw order; the front is the next card
    queue: VecDeque<String>,
}

impl PlayerState {
    /// Deal a hand from an eight card deck. The deck must already be validated.
    pub fn new(deck: Vec<String>, elixir: &ElixirConfig) -> Result<Self, ConfigError> {
        if deck.len() != DECK_SIZE {
            return Err(ConfigError::InvalidDeck(format!(
                "expected {DECK_SIZE} cards, got {}",
                deck.len()
            )));
        }
        let mut queue: VecDeque<String> = deck.into();
        let hand: Vec<String> = queue.drain(..HAND_SIZE).collect();
        Ok(Self {
            elixir: elixir.start.clamp(0.0, elixir.max),
            max_elixir: elixir.max,
            hand,
            queue,
        })
    }

    pub fn elixir(&self) -> f32 {
        self.elixir
    }

    /// Elixir rounded to one decimal place for display
    pub fn elixir_display(&self) -> f32 {
        (self.elixir * 10.0).round() / 10.0
    }

    pub fn max_elixir(&self) -> f32 {
        self.max_elixir
    }

    pub fn hand(&self) -> &[String] {
        &self.hand
    }

    /// The card that enters the hand after the next play
    pub fn next_card(&self) -> &str {
        self.queue.front().map(String::as_str).unwrap_or_default()
    }

    /// Regenerate elixir for one tick
    pub fn regen(&mut self, dt: f32, per_second: f32, multiplier: f32) {
        let gained = per_second * multiplier * dt;
        self.elixir = (self.elixir + gained).clamp(0.0, self.max_elixir);
    }

    pub fn can_afford(&self, cost: f32) -> bool {
        self.elixir + ELIXIR_EPSILON >= cost
    }

    pub fn hand_slot(&self, card_id: &str) -> Option<usize> {
        self.hand.iter().position(|c| c == card_id)
    }

    /// Spend elixir and cycle the card in `slot` to the back of the deck.
    /// Returns the played card id.
    pub fn play(&mut self, slot: usize, cost: f32) -> String {
        debug_assert!(self.can_afford(cost), "play without enough elixir");
        self.elixir = (self.elixir - cost).clamp(0.0, self.max_elixir);
        let incoming = self
            .queue
            .pop_front()
            .unwrap_or_else(|| self.hand[slot].clone());
        let played = std::mem::replace(&mut self.hand[slot], incoming);
        self.queue.push_back(played.clone());
        played
    }

    #[cfg(test)]
    pub(crate) fn set_elixir(&mut self, elixir: f32) {
        self.elixir = elixir.clamp(0.0, self.max_elixir);
    }
}
