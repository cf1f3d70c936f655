//! Inline keyboard construction with a fixed column width.

use crate::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Collects buttons and wraps them into rows of `columns` buttons each.
#[derive(Debug, Clone)]
pub struct InlineKeyboard {
    columns: usize,
    buttons: Vec<InlineKeyboardButton>,
}

impl InlineKeyboard {
    /// A column count below 1 is treated as 1.
    pub fn new(columns: usize) -> Self {
        Self {
            columns: columns.max(1),
            buttons: Vec::new(),
        }
    }

    pub fn add_button(&mut self, text: impl Into<String>, data: impl Into<String>) -> &mut Self {
        self.buttons.push(InlineKeyboardButton::callback(text, data));
        self
    }

    pub fn add(&mut self, button: InlineKeyboardButton) -> &mut Self {
        self.buttons.push(button);
        self
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    pub fn into_markup(self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup {
            inline_keyboard: self
                .buttons
                .chunks(self.columns)
                .map(<[InlineKeyboardButton]>::to_vec)
                .collect(),
        }
    }
}
