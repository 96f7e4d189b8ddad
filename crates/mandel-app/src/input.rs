// SPDX-License-Identifier: CEPL-1.0
//! Mouse and keyboard → `ViewState` edits.
use mandel_math::{ColorMode, DVec2, ViewState};
use mandel_platform::winit::{
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta},
    keyboard::{Key, ModifiersState, NamedKey},
};
use tracing::debug;

/// Pixels of touchpad scroll that count as one wheel notch.
const PIXELS_PER_STEP: f64 = 50.0;
const ITERATION_STEP: i64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Color(ColorMode),
    Iterations(i64),
    ToggleAutoIterations,
    Reset,
    Exit,
}

pub fn key_action(key: &Key, ctrl: bool) -> Option<Action> {
    match key {
        Key::Named(NamedKey::Pause) => Some(Action::Exit),
        Key::Named(NamedKey::Escape) if ctrl => Some(Action::Exit),
        Key::Character(c) => match c.as_str() {
            "1" => Some(Action::Color(ColorMode::Rgb)),
            "2" => Some(Action::Color(ColorMode::BlackWhite)),
            "3" => Some(Action::Color(ColorMode::Glowing)),
            "+" | "=" => Some(Action::Iterations(ITERATION_STEP)),
            "-" => Some(Action::Iterations(-ITERATION_STEP)),
            "a" | "A" => Some(Action::ToggleAutoIterations),
            "r" | "R" => Some(Action::Reset),
            _ => None,
        },
        _ => None,
    }
}

/// Applies `action`; returns true when the app should exit.
pub fn apply(action: Action, view: &mut ViewState) -> bool {
    match action {
        Action::Color(mode) => view.color = mode,
        Action::Iterations(delta) => view.adjust_iterations(delta),
        Action::ToggleAutoIterations => view.toggle_auto_iterations(),
        Action::Reset => view.reset(),
        Action::Exit => return true,
    }
    debug!(
        "view: color={} iterations={} ({:?})",
        view.color.name(),
        view.max_iterations(),
        view.iterations
    );
    false
}

pub fn scroll_steps(delta: MouseScrollDelta) -> f64 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y as f64,
        MouseScrollDelta::PixelDelta(p) => p.y / PIXELS_PER_STEP,
    }
}

#[derive(Debug, Default)]
pub struct Input {
    cursor: DVec2,
    drag_from: Option<DVec2>,
    modifiers: ModifiersState,
}

impl Input {
    pub fn cursor_moved(&mut self, view: &mut ViewState, pos: DVec2) {
        if let Some(from) = self.drag_from {
            view.drag(pos - from);
            self.drag_from = Some(pos);
        }
        self.cursor = pos;
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Left {
            self.drag_from = state.is_pressed().then_some(self.cursor);
        }
    }

    pub fn scroll(&mut self, view: &mut ViewState, delta: MouseScrollDelta) {
        view.scroll(self.cursor, scroll_steps(delta));
    }

    pub fn modifiers(&mut self, state: ModifiersState) {
        self.modifiers = state;
    }

    /// Returns true when the key asks the app to exit.
    pub fn key(&mut self, view: &mut ViewState, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed {
            return false;
        }
        match key_action(&event.logical_key, self.modifiers.control_key()) {
            Some(action) => apply(action, view),
            None => false,
        }
    }
}
